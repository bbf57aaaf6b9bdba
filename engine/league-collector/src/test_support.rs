//! In-memory league site for tests
//!
//! [`FixtureSite`] serves generated pages for a small league through the
//! HTML automation backend. Pages can be made to time out, hang, redirect or
//! be replaced, and every automation call is counted.

use crate::config::{AutomationBackend, AutomationConfig, CollectorConfig, PacingConfig, SiteConfig};
use crate::error::DriverError;
use crate::html::{FetchedPage, HtmlAutomation, PageSource};
use crate::retry::RetryPolicy;
use crate::session::{Automation, Connector, ElementHandle};
use crate::site::SiteMap;
use crate::types::{LeagueId, SeasonId, TeamId, WeekId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const BASE_URL: &str = "http://fixture.test";
pub const LEAGUE: &str = "42";

/// Shape of the generated league
#[derive(Debug, Clone)]
pub struct LeagueFixture {
    pub seasons: Vec<u16>,
    pub teams: u32,
    pub weeks: u32,
}

impl Default for LeagueFixture {
    fn default() -> Self {
        Self { seasons: vec![2020, 2021, 2022], teams: 6, weeks: 7 }
    }
}

impl LeagueFixture {
    pub fn team_ids(&self) -> Vec<u32> {
        (1..=self.teams).collect()
    }

    /// Pairings for `week`; every team plays once
    pub fn pairings(&self, week: u32) -> Vec<(u32, u32)> {
        let half = self.teams / 2;
        if week % 2 == 1 {
            (1..=half).map(|i| (i, i + half)).collect()
        } else {
            (1..=half).map(|i| (i, self.teams + 1 - i)).collect()
        }
    }

    /// Targets in one fully collected season
    pub fn targets_per_season(&self) -> usize {
        let matchups = (self.teams / 2) * self.weeks;
        (3 + self.teams + self.weeks + matchups) as usize
    }

    /// Targets in a fully collected league, for `seasons` of its seasons
    pub fn total_targets(&self, seasons: usize) -> usize {
        1 + seasons * self.targets_per_season()
    }

    fn score(season: u16, week: u32, team: u32) -> String {
        let hundredths = 9_000 + (season as u32 % 10) * 311 + week * 127 + team * 531;
        format!("{}.{:02}", hundredths / 100, hundredths % 100)
    }
}

#[derive(Debug, Clone)]
enum Fault {
    Timeout { remaining: u32 },
    Hang { remaining: u32 },
    Replace { body: String, remaining: Option<u32> },
    Redirect { to: String },
}

enum Response {
    Page(FetchedPage),
    Timeout,
    Hang,
}

/// Generated pages plus injected faults
pub struct FixtureSite {
    site: SiteMap,
    pages: HashMap<String, String>,
    faults: Mutex<HashMap<String, Fault>>,
}

impl FixtureSite {
    pub fn new(fixture: &LeagueFixture) -> Self {
        let site = SiteMap::new(LeagueId::new(LEAGUE), site_config(), Default::default());
        let mut pages = HashMap::new();

        pages.insert(site.login_url(), login_page());
        pages.insert(site.league_home_url(), league_home_page());
        pages.insert(site.history_url(), history_page(&fixture.seasons));

        for &year in &fixture.seasons {
            let season = SeasonId(year);
            pages.insert(site.final_standings_url(season), final_standings_page(&site, fixture, year));
            pages.insert(site.regular_standings_url(season), regular_standings_page(&site, fixture, year));

            for team in fixture.team_ids() {
                let id = TeamId::new(team.to_string());
                pages.insert(site.team_home_url(season, &id), team_page(team, true));
            }

            for week in 1..=fixture.weeks {
                pages.insert(
                    site.schedule_url(season, WeekId(week)),
                    schedule_page(&site, fixture, year, week),
                );
                for (home, away) in fixture.pairings(week) {
                    let id = TeamId::new(home.to_string());
                    pages.insert(
                        site.game_center_url(season, WeekId(week), &id),
                        game_center_page(year, week, home, away),
                    );
                }
            }
        }

        Self { site, pages, faults: Mutex::new(HashMap::new()) }
    }

    pub fn site(&self) -> &SiteMap {
        &self.site
    }

    fn inject(&self, url: String, fault: Fault) {
        self.faults.lock().unwrap().insert(url, fault);
    }

    /// Time out the next `times` loads of `url`
    pub fn time_out(&self, url: String, times: u32) {
        self.inject(url, Fault::Timeout { remaining: times });
    }

    /// Never answer the next `times` loads of `url`
    pub fn hang(&self, url: String, times: u32) {
        self.inject(url, Fault::Hang { remaining: times });
    }

    /// Serve `body` instead of the generated page; `None` means forever
    pub fn replace(&self, url: String, body: String, times: Option<u32>) {
        self.inject(url, Fault::Replace { body, remaining: times });
    }

    /// Answer `url` with the page at `to`, as a redirect would
    pub fn redirect(&self, url: String, to: String) {
        self.inject(url, Fault::Redirect { to });
    }

    fn serve(&self, url: &str) -> Response {
        let page = |url: &str, body: String| Response::Page(FetchedPage { url: url.to_string(), body });
        let generated = || self.pages.get(url).cloned().unwrap_or_else(|| not_found_page(url));

        let mut faults = self.faults.lock().unwrap();
        let Some(fault) = faults.get_mut(url) else {
            return page(url, generated());
        };

        match fault {
            Fault::Timeout { remaining } if *remaining > 0 => {
                *remaining -= 1;
                Response::Timeout
            }
            Fault::Hang { remaining } if *remaining > 0 => {
                *remaining -= 1;
                Response::Hang
            }
            Fault::Replace { body, remaining: None } => page(url, body.clone()),
            Fault::Replace { body, remaining: Some(remaining) } if *remaining > 0 => {
                *remaining -= 1;
                page(url, body.clone())
            }
            Fault::Redirect { to } => {
                let to = to.clone();
                let body = self.pages.get(&to).cloned().unwrap_or_else(|| not_found_page(&to));
                page(&to, body)
            }
            _ => page(url, generated()),
        }
    }
}

#[async_trait::async_trait]
impl PageSource for FixtureSite {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, DriverError> {
        match self.serve(url) {
            Response::Page(page) => Ok(page),
            Response::Timeout => Err(DriverError::Timeout(format!("loading {url}"))),
            Response::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DriverError::Timeout(format!("loading {url}")))
            }
        }
    }
}

/// Automation calls observed across every session of a connector
#[derive(Default)]
pub struct CallLog {
    navigations: Mutex<Vec<String>>,
    reads: AtomicUsize,
    typed: Mutex<Vec<String>>,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl CallLog {
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn navigation_count(&self) -> usize {
        self.navigations.lock().unwrap().len()
    }

    /// Loads of exactly `url`
    pub fn loads_of(&self, url: &str) -> usize {
        self.navigations.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    /// Element lookups and reads
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn typed(&self) -> Vec<String> {
        self.typed.lock().unwrap().clone()
    }
}

/// Cancel a token when a given URL is loaded
#[derive(Clone)]
pub struct CancelOn {
    pub url: String,
    pub token: CancellationToken,
}

/// Counts every call made to the wrapped automation
pub struct CountingAutomation<A> {
    inner: A,
    log: Arc<CallLog>,
    cancel_on: Option<CancelOn>,
    accept_typing: bool,
}

impl<A> CountingAutomation<A> {
    pub fn new(inner: A, log: Arc<CallLog>) -> Self {
        log.opened.fetch_add(1, Ordering::SeqCst);
        Self { inner, log, cancel_on: None, accept_typing: false }
    }

    pub fn cancel_on(mut self, cancel_on: Option<CancelOn>) -> Self {
        self.cancel_on = cancel_on;
        self
    }

    /// Record typed text instead of delegating, for sign-in forms
    pub fn accept_typing(mut self) -> Self {
        self.accept_typing = true;
        self
    }

    fn read(&self) {
        self.log.reads.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl<A: Automation> Automation for CountingAutomation<A> {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.log.navigations.lock().unwrap().push(url.to_string());
        if let Some(cancel_on) = &self.cancel_on {
            if cancel_on.url == url {
                cancel_on.token.cancel();
            }
        }
        self.inner.navigate(url).await
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.inner.current_url().await
    }

    async fn find_elements(
        &self,
        scope: Option<&ElementHandle>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        self.read();
        self.inner.find_elements(scope, selector).await
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        self.read();
        self.inner.text(element).await
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>, DriverError> {
        self.read();
        self.inner.attribute(element, name).await
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        if self.accept_typing {
            // Form submission; the page stays put
            return Ok(());
        }
        self.inner.click(element).await
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        if self.accept_typing {
            self.log.typed.lock().unwrap().push(text.to_string());
            return Ok(());
        }
        self.inner.send_keys(element, text).await
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

/// Connects counted automations to a shared [`FixtureSite`]
#[derive(Clone)]
pub struct FixtureConnector {
    pub site: Arc<FixtureSite>,
    pub log: Arc<CallLog>,
    pub cancel_on: Option<CancelOn>,
}

impl FixtureConnector {
    pub fn new(site: Arc<FixtureSite>) -> Self {
        Self { site, log: Arc::new(CallLog::default()), cancel_on: None }
    }

    /// Fresh call log over the same site
    pub fn relaunch(&self) -> Self {
        Self::new(Arc::clone(&self.site))
    }
}

#[async_trait::async_trait]
impl Connector for FixtureConnector {
    async fn connect(&self, _config: &AutomationConfig) -> Result<Box<dyn Automation>, DriverError> {
        let automation = CountingAutomation::new(HtmlAutomation::new(Arc::clone(&self.site)), Arc::clone(&self.log))
            .cancel_on(self.cancel_on.clone());
        Ok(Box::new(automation))
    }
}

pub fn site_config() -> SiteConfig {
    SiteConfig { base_url: BASE_URL.to_string(), ..SiteConfig::default() }
}

/// Collector configuration pointed at the fixture site
pub fn fixture_config() -> CollectorConfig {
    let mut config = CollectorConfig::for_league(LEAGUE);
    config.site = site_config();
    config.automation.backend = AutomationBackend::Html;
    config.pacing = PacingConfig::immediate();
    config.retry = RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
        multiplier: 2.0,
        jitter: 0.0,
        attempt_timeout_ms: 5_000,
    };
    config
}

fn document(body: &str) -> String {
    format!("<!DOCTYPE html><html><head><title>Fixture</title></head><body>{body}</body></html>")
}

fn team_href(site: &SiteMap, year: u16, team: u32) -> String {
    site.team_home_url(SeasonId(year), &TeamId::new(team.to_string()))
}

fn team_anchor(site: &SiteMap, year: u16, team: u32) -> String {
    format!(
        r#"<a class="teamName teamId-{team}" href="{}">Team {team}</a>"#,
        team_href(site, year, team)
    )
}

pub fn not_found_page(url: &str) -> String {
    document(&format!("<h1>Page not found</h1><p>{url}</p>"))
}

pub fn login_page() -> String {
    document(
        r#"<form id="gigya-login-form">
             <input name="username" type="text">
             <input name="password" type="password">
             <input class="gigya-input-submit" type="submit" value="Sign In">
           </form>"#,
    )
}

pub fn league_home_page() -> String {
    document(r#"<h1 class="leagueName">Fixture League</h1><div id="leagueHomeStandings"></div>"#)
}

pub fn history_page(seasons: &[u16]) -> String {
    let items: String = seasons
        .iter()
        .map(|year| format!(r#"<li><a href="/league/{LEAGUE}/history/{year}">{year}</a></li>"#))
        .collect();
    document(&format!(
        r#"<h1 class="leagueName">Fixture League</h1>
           <div id="historySeasonNav"><ul class="st-menu">{items}</ul></div>"#
    ))
}

/// Final standings; teams listed by place, which is team id order here
pub fn final_standings_page(site: &SiteMap, fixture: &LeagueFixture, year: u16) -> String {
    let places: Vec<(u32, u32)> = fixture.team_ids().into_iter().map(|team| (team, team)).collect();
    final_standings_with_places(site, year, &places)
}

/// Final standings with explicit `(team, place)` rows
pub fn final_standings_with_places(site: &SiteMap, year: u16, places: &[(u32, u32)]) -> String {
    let rows: String = places
        .iter()
        .map(|(team, place)| {
            let suffix = match place {
                1 => "st",
                2 => "nd",
                3 => "rd",
                _ => "th",
            };
            format!(
                r#"<li><span class="place">{place}{suffix}</span>{}</li>"#,
                team_anchor(site, year, *team)
            )
        })
        .collect();
    document(&format!(r#"<div id="finalStandings"><ul class="results">{rows}</ul></div>"#))
}

pub fn regular_standings_page(site: &SiteMap, fixture: &LeagueFixture, year: u16) -> String {
    let rows: String = fixture
        .team_ids()
        .into_iter()
        .map(|team| {
            let wins = fixture.teams - team;
            format!(
                r#"<tr><td class="teamRank">{team}</td><td>{}</td><td class="teamRecord">{wins}-{}-0</td><td class="teamPts">1,{:03}.50</td><td class="teamPts">1,{:03}.25</td></tr>"#,
                team_anchor(site, year, team),
                team - 1,
                600 - team * 10,
                400 + team * 10
            )
        })
        .collect();
    document(&format!(
        r#"<table id="leagueHistoryStandings"><thead><tr><th>Rank</th><th>Team</th></tr></thead><tbody>{rows}</tbody></table>"#
    ))
}

fn player_row(slot: &str, id: u32, name: &str, position: &str) -> String {
    format!(
        r#"<tr><td class="teamPosition"><span>{slot}</span></td><td class="playerNameAndInfo"><div class="c"><a class="playerCard playerNameId-{id}" href="/players/card?playerId={id}">{name}</a> <em>{position} - BUF</em></div></td></tr>"#
    )
}

fn roster_rows(team: u32) -> String {
    [
        player_row("QB", team * 100 + 1, &format!("Quarterback {team}"), "QB"),
        player_row("RB", team * 100 + 2, &format!("Runner {team}"), "RB"),
        player_row("BN", team * 100 + 3, &format!("Backup {team}"), "WR"),
    ]
    .concat()
}

/// Team home page; `with_owner: false` drops the owner link
pub fn team_page(team: u32, with_owner: bool) -> String {
    let owners = if with_owner {
        format!(r#"<ul class="owners"><li><a class="userName userId-{}" href="/users/{team}">Owner {team}</a></li></ul>"#, 900 + team)
    } else {
        String::new()
    };
    document(&format!(
        r#"<div id="teamDetail"><h2 class="teamName">Team {team}</h2>{owners}</div>
           <table id="teamHomeRoster"><tbody>{}</tbody></table>"#,
        roster_rows(team)
    ))
}

pub fn schedule_page(site: &SiteMap, fixture: &LeagueFixture, year: u16, week: u32) -> String {
    let nav: String = (1..=fixture.weeks).map(|w| format!("<li><span>{w}</span></li>")).collect();
    let matchups: String = fixture
        .pairings(week)
        .into_iter()
        .map(|(home, away)| {
            format!(
                r#"<li class="matchup">{} <em>vs</em> {}</li>"#,
                team_anchor(site, year, home),
                team_anchor(site, year, away)
            )
        })
        .collect();
    document(&format!(
        r#"<ul class="scheduleWeekNav">{nav}<li><span>Playoffs</span></li></ul>
           <div class="scheduleContentWrap"><div class="scheduleContent"><ul>{matchups}</ul></div></div>"#
    ))
}

pub fn game_center_page(year: u16, week: u32, home: u32, away: u32) -> String {
    document(&format!(
        r#"<div id="teamMatchupHeader">
             <div class="teamTotal teamId-{home}">{}</div>
             <div class="teamTotal teamId-{away}">{}</div>
           </div>
           <div id="teamMatchupTrack">
             <div class="teamWrap"><table><tbody>{}</tbody></table></div>
             <div class="teamWrap"><table><tbody>{}</tbody></table></div>
           </div>"#,
        LeagueFixture::score(year, week, home),
        LeagueFixture::score(year, week, away),
        roster_rows(home),
        roster_rows(away)
    ))
}
