//! Page objects
//!
//! Each page adapter knows how to recognise its page and read raw values out
//! of it. Which page serves a target is decided by [`Page::for_target`] from
//! the target kind alone; page content never influences dispatch.

use crate::config::{Credentials, SelectorConfig};
use crate::error::{DriverError, ExtractionError, NavigationError};
use crate::session::{ElementHandle, Session};
use crate::site::SiteMap;
use crate::target::{CrawlTarget, TargetKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Shape of the raw data a page produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageShape {
    LeagueHome,
    SeasonList,
    FinalStandings,
    RegularStandings,
    TeamHome,
    WeekNav,
    WeekSchedule,
    GameCenter,
}

impl PageShape {
    /// Shape expected when collecting a target of `kind`
    pub fn for_kind(kind: TargetKind) -> Self {
        match kind {
            TargetKind::League => Self::SeasonList,
            TargetKind::Season => Self::FinalStandings,
            TargetKind::Standings => Self::RegularStandings,
            TargetKind::TeamRoster => Self::TeamHome,
            TargetKind::Schedule => Self::WeekNav,
            TargetKind::Week => Self::WeekSchedule,
            TargetKind::Matchup => Self::GameCenter,
        }
    }
}

/// A link or labelled element as found on a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLink {
    pub text: String,
    pub href: Option<String>,
    pub class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFinalRow {
    pub place: String,
    pub team: RawLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStandingsRow {
    pub team: RawLink,
    pub rank: String,
    pub record: String,
    /// Points for, then points against
    pub points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPlayerRow {
    /// Lineup slot label (`QB`, `BN`, ...)
    pub slot: String,
    pub card: RawLink,
    pub info: String,
}

/// Untyped values read from one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawPageData {
    LeagueHome { league_name: Option<String> },
    SeasonList { league_name: Option<String>, season_labels: Vec<String> },
    FinalStandings { rows: Vec<RawFinalRow> },
    RegularStandings { rows: Vec<RawStandingsRow> },
    TeamHome { team_name: String, owners: Vec<RawLink>, roster: Vec<RawPlayerRow> },
    WeekNav { week_labels: Vec<String> },
    WeekSchedule { matchups: Vec<Vec<RawLink>> },
    /// Team totals (home first) and one lineup per team
    GameCenter { totals: Vec<RawLink>, lineups: Vec<Vec<RawPlayerRow>> },
}

impl RawPageData {
    pub fn shape(&self) -> PageShape {
        match self {
            Self::LeagueHome { .. } => PageShape::LeagueHome,
            Self::SeasonList { .. } => PageShape::SeasonList,
            Self::FinalStandings { .. } => PageShape::FinalStandings,
            Self::RegularStandings { .. } => PageShape::RegularStandings,
            Self::TeamHome { .. } => PageShape::TeamHome,
            Self::WeekNav { .. } => PageShape::WeekNav,
            Self::WeekSchedule { .. } => PageShape::WeekSchedule,
            Self::GameCenter { .. } => PageShape::GameCenter,
        }
    }
}

/// Read-only helper used by page adapters
struct Reader<'s> {
    session: &'s Session,
    page: &'static str,
}

impl<'s> Reader<'s> {
    fn new(session: &'s Session, page: &'static str) -> Self {
        Self { session, page }
    }

    fn driver(&self, source: DriverError) -> ExtractionError {
        ExtractionError::Driver { page: self.page.to_string(), source }
    }

    fn layout(&self, detail: impl Into<String>) -> ExtractionError {
        ExtractionError::UnexpectedLayout { page: self.page.to_string(), detail: detail.into() }
    }

    /// Top-level container; absence means the page is not what we expect
    async fn container(&self, selector: &str) -> Result<ElementHandle, ExtractionError> {
        self.session.find_first(None, selector).await.map_err(|e| self.driver(e))?.ok_or_else(|| {
            ExtractionError::MissingSelector { page: self.page.to_string(), selector: selector.to_string() }
        })
    }

    async fn all(
        &self,
        scope: Option<&ElementHandle>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, ExtractionError> {
        self.session.find_all(scope, selector).await.map_err(|e| self.driver(e))
    }

    async fn optional(
        &self,
        scope: &ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, ExtractionError> {
        self.session.find_first(Some(scope), selector).await.map_err(|e| self.driver(e))
    }

    /// Field inside an existing container; absence is layout drift
    async fn required(
        &self,
        scope: &ElementHandle,
        selector: &str,
        field: &str,
    ) -> Result<ElementHandle, ExtractionError> {
        self.optional(scope, selector)
            .await?
            .ok_or_else(|| self.layout(format!("{field} ({selector:?}) is missing")))
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, ExtractionError> {
        self.session.text(element).await.map_err(|e| self.driver(e))
    }

    async fn text_content(&self, element: &ElementHandle) -> Result<String, ExtractionError> {
        let content = self
            .session
            .attribute(element, "textContent")
            .await
            .map_err(|e| self.driver(e))?
            .unwrap_or_default();
        Ok(content.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    async fn link(&self, element: &ElementHandle) -> Result<RawLink, ExtractionError> {
        let attr = |name: &'static str| async move {
            self.session.attribute(element, name).await.map_err(|e| self.driver(e))
        };

        Ok(RawLink {
            text: self.text(element).await?,
            href: attr("href").await?,
            class: attr("class").await?,
        })
    }

    async fn optional_text(
        &self,
        scope: &ElementHandle,
        selector: &str,
    ) -> Result<Option<String>, ExtractionError> {
        match self.optional(scope, selector).await? {
            Some(element) => Ok(Some(self.text(&element).await?)),
            None => Ok(None),
        }
    }

    /// Player rows; decorative rows and empty slots are skipped
    async fn player_rows(
        &self,
        rows: &[ElementHandle],
        selectors: &SelectorConfig,
    ) -> Result<Vec<RawPlayerRow>, ExtractionError> {
        let mut players = Vec::new();

        for row in rows {
            let Some(slot) = self.optional_text(row, &selectors.player_slot).await? else {
                continue;
            };
            let Some(card) = self.optional(row, &selectors.player_card).await? else {
                continue;
            };

            let card = self.link(&card).await?;
            let info = self.optional_text(row, &selectors.player_info).await?.unwrap_or_default();
            players.push(RawPlayerRow { slot, card, info });
        }

        Ok(players)
    }

    async fn league_name(&self, selectors: &SelectorConfig) -> Result<Option<String>, ExtractionError> {
        match self.all(None, &selectors.league_name).await?.first() {
            Some(element) => {
                let name = self.text(element).await?;
                Ok((!name.is_empty()).then_some(name))
            }
            None => Ok(None),
        }
    }
}

/// Behaviour shared by every page adapter
#[async_trait::async_trait]
pub trait PageObject: Send + Sync {
    fn shape(&self) -> PageShape;

    fn url(&self) -> &str;

    /// Element whose presence means the page has rendered
    fn anchor<'a>(&self, selectors: &'a SelectorConfig) -> &'a str;

    /// Read raw values from the page currently loaded in `session`
    async fn extract(&self, session: &Session) -> Result<RawPageData, ExtractionError>;

    /// Move the browser to the page serving `target`
    async fn navigate_to(
        &self,
        session: &mut Session,
        target: &CrawlTarget,
    ) -> Result<Page, NavigationError> {
        debug!("Leaving {} for {}", self.url(), target);
        Page::load(session, target).await
    }
}

/// League landing page; also where sign-in ends up
#[derive(Debug, Clone)]
pub struct LeagueHomePage {
    url: String,
}

/// League history page listing seasons
#[derive(Debug, Clone)]
pub struct SeasonListPage {
    url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandingsView {
    Final,
    Regular,
}

/// Final or regular-season standings of one season
#[derive(Debug, Clone)]
pub struct StandingsPage {
    url: String,
    view: StandingsView,
}

/// Team home page with managers and roster
#[derive(Debug, Clone)]
pub struct RosterPage {
    url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekView {
    /// Read the week navigation only
    Navigation,
    /// Read the week's matchups
    Matchups,
}

/// Schedule page of one week
#[derive(Debug, Clone)]
pub struct WeekPage {
    url: String,
    view: WeekView,
}

/// Game center page of one matchup, with full box score
#[derive(Debug, Clone)]
pub struct MatchupPage {
    url: String,
}

impl LeagueHomePage {
    pub fn new(site: &SiteMap) -> Self {
        Self { url: site.league_home_url() }
    }

    /// Sign in through the login form and land on the league home page
    ///
    /// Failing to land on the league afterwards is reported as a connection
    /// error, since no target can be collected without a valid sign-in.
    pub async fn sign_in(session: &mut Session, credentials: &Credentials) -> Result<Self, NavigationError> {
        let login_url = session.site().login_url();
        let selectors = session.site().selectors().clone();
        info!("Signing in at {}", login_url);

        let nav = |e| NavigationError::from_driver(login_url.clone(), e);
        session.navigate(&login_url).await.map_err(nav)?;

        let username = session.wait_for(&selectors.login_username).await.map_err(nav)?;
        let password = session.wait_for(&selectors.login_password).await.map_err(nav)?;
        let submit = session.wait_for(&selectors.login_submit).await.map_err(nav)?;

        session.send_keys(&username, &credentials.username).await.map_err(nav)?;
        session.send_keys(&password, &credentials.password).await.map_err(nav)?;
        session.click(&submit).await.map_err(nav)?;

        let home = Self::new(session.site());
        session.navigate(&home.url).await.map_err(|e| NavigationError::from_driver(home.url.clone(), e))?;

        let landed = session
            .current_url()
            .await
            .map_err(|e| NavigationError::from_driver(home.url.clone(), e))?;
        if landed.trim_end_matches('/') != home.url.trim_end_matches('/') {
            return Err(NavigationError::Driver {
                url: home.url.clone(),
                source: DriverError::Connection(format!(
                    "sign-in did not reach the league, browser is on {landed}"
                )),
            });
        }

        session.mark_signed_in();
        info!("Signed in to {}", home.url);
        Ok(home)
    }
}

#[async_trait::async_trait]
impl PageObject for LeagueHomePage {
    fn shape(&self) -> PageShape {
        PageShape::LeagueHome
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn anchor<'a>(&self, selectors: &'a SelectorConfig) -> &'a str {
        &selectors.league_home_anchor
    }

    async fn extract(&self, session: &Session) -> Result<RawPageData, ExtractionError> {
        let reader = Reader::new(session, "league home");
        reader.container(self.anchor(session.site().selectors())).await?;
        let league_name = reader.league_name(session.site().selectors()).await?;
        Ok(RawPageData::LeagueHome { league_name })
    }
}

#[async_trait::async_trait]
impl PageObject for SeasonListPage {
    fn shape(&self) -> PageShape {
        PageShape::SeasonList
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn anchor<'a>(&self, selectors: &'a SelectorConfig) -> &'a str {
        &selectors.season_nav
    }

    async fn extract(&self, session: &Session) -> Result<RawPageData, ExtractionError> {
        let selectors = session.site().selectors();
        let reader = Reader::new(session, "season list");

        reader.container(&selectors.season_nav).await?;
        let links = reader.all(None, &selectors.season_links).await?;
        if links.is_empty() {
            return Err(reader.layout("season menu lists no seasons"));
        }

        // The menu is collapsed, so visible text is empty; read textContent instead
        let mut season_labels = Vec::with_capacity(links.len());
        for link in &links {
            season_labels.push(reader.text_content(link).await?);
        }

        Ok(RawPageData::SeasonList { league_name: reader.league_name(selectors).await?, season_labels })
    }
}

#[async_trait::async_trait]
impl PageObject for StandingsPage {
    fn shape(&self) -> PageShape {
        match self.view {
            StandingsView::Final => PageShape::FinalStandings,
            StandingsView::Regular => PageShape::RegularStandings,
        }
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn anchor<'a>(&self, selectors: &'a SelectorConfig) -> &'a str {
        match self.view {
            StandingsView::Final => &selectors.final_standings,
            StandingsView::Regular => &selectors.regular_standings,
        }
    }

    async fn extract(&self, session: &Session) -> Result<RawPageData, ExtractionError> {
        let selectors = session.site().selectors();

        match self.view {
            StandingsView::Final => {
                let reader = Reader::new(session, "final standings");
                let container = reader.container(&selectors.final_standings).await?;

                let mut rows = Vec::new();
                for row in reader.all(Some(&container), &selectors.final_standings_rows).await? {
                    let place = reader.required(&row, &selectors.final_place, "place").await?;
                    let team = reader.required(&row, &selectors.team_link, "team link").await?;
                    rows.push(RawFinalRow { place: reader.text(&place).await?, team: reader.link(&team).await? });
                }

                if rows.is_empty() {
                    return Err(reader.layout("final standings list no teams"));
                }
                Ok(RawPageData::FinalStandings { rows })
            }
            StandingsView::Regular => {
                let reader = Reader::new(session, "regular standings");
                let container = reader.container(&selectors.regular_standings).await?;

                let mut rows = Vec::new();
                for row in reader.all(Some(&container), &selectors.regular_standings_rows).await? {
                    // Header rows carry no team link
                    let Some(team) = reader.optional(&row, &selectors.team_link).await? else {
                        continue;
                    };

                    let rank = reader.required(&row, &selectors.standings_rank, "rank").await?;
                    let record = reader.required(&row, &selectors.standings_record, "record").await?;

                    let mut points = Vec::new();
                    for cell in reader.all(Some(&row), &selectors.standings_points).await? {
                        points.push(reader.text(&cell).await?);
                    }
                    if points.len() < 2 {
                        return Err(reader.layout(format!(
                            "expected points for and against, found {} value(s)",
                            points.len()
                        )));
                    }

                    rows.push(RawStandingsRow {
                        team: reader.link(&team).await?,
                        rank: reader.text(&rank).await?,
                        record: reader.text(&record).await?,
                        points,
                    });
                }

                if rows.is_empty() {
                    return Err(reader.layout("standings table lists no teams"));
                }
                Ok(RawPageData::RegularStandings { rows })
            }
        }
    }
}

#[async_trait::async_trait]
impl PageObject for RosterPage {
    fn shape(&self) -> PageShape {
        PageShape::TeamHome
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn anchor<'a>(&self, selectors: &'a SelectorConfig) -> &'a str {
        &selectors.team_detail
    }

    async fn extract(&self, session: &Session) -> Result<RawPageData, ExtractionError> {
        let selectors = session.site().selectors();
        let reader = Reader::new(session, "team home");

        let detail = reader.container(&selectors.team_detail).await?;
        let name = reader.required(&detail, &selectors.team_name, "team name").await?;

        let owner_links = reader.all(Some(&detail), &selectors.team_owners).await?;
        if owner_links.is_empty() {
            return Err(reader.layout(format!("owner ({:?}) is missing", selectors.team_owners)));
        }
        let mut owners = Vec::with_capacity(owner_links.len());
        for link in &owner_links {
            owners.push(reader.link(link).await?);
        }

        let rows = reader.all(None, &selectors.roster_rows).await?;
        let roster = reader.player_rows(&rows, selectors).await?;

        Ok(RawPageData::TeamHome { team_name: reader.text(&name).await?, owners, roster })
    }
}

#[async_trait::async_trait]
impl PageObject for WeekPage {
    fn shape(&self) -> PageShape {
        match self.view {
            WeekView::Navigation => PageShape::WeekNav,
            WeekView::Matchups => PageShape::WeekSchedule,
        }
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn anchor<'a>(&self, selectors: &'a SelectorConfig) -> &'a str {
        match self.view {
            WeekView::Navigation => &selectors.week_nav,
            WeekView::Matchups => &selectors.schedule_content,
        }
    }

    async fn extract(&self, session: &Session) -> Result<RawPageData, ExtractionError> {
        let selectors = session.site().selectors();
        let reader = Reader::new(session, "schedule");

        match self.view {
            WeekView::Navigation => {
                let nav = reader.container(&selectors.week_nav).await?;
                let mut week_labels = Vec::new();
                for label in reader.all(Some(&nav), &selectors.week_labels).await? {
                    week_labels.push(reader.text(&label).await?);
                }
                if week_labels.is_empty() {
                    return Err(reader.layout("week navigation lists no weeks"));
                }
                Ok(RawPageData::WeekNav { week_labels })
            }
            WeekView::Matchups => {
                let content = reader.container(&selectors.schedule_content).await?;
                let mut matchups = Vec::new();
                for matchup in reader.all(Some(&content), &selectors.schedule_matchups).await? {
                    let mut teams = Vec::new();
                    for link in reader.all(Some(&matchup), &selectors.team_link).await? {
                        teams.push(reader.link(&link).await?);
                    }
                    matchups.push(teams);
                }
                if matchups.is_empty() {
                    return Err(reader.layout("schedule lists no matchups"));
                }
                Ok(RawPageData::WeekSchedule { matchups })
            }
        }
    }
}

#[async_trait::async_trait]
impl PageObject for MatchupPage {
    fn shape(&self) -> PageShape {
        PageShape::GameCenter
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn anchor<'a>(&self, selectors: &'a SelectorConfig) -> &'a str {
        &selectors.matchup_header
    }

    async fn extract(&self, session: &Session) -> Result<RawPageData, ExtractionError> {
        let selectors = session.site().selectors();
        let reader = Reader::new(session, "game center");

        let header = reader.container(&selectors.matchup_header).await?;
        let total_cells = reader.all(Some(&header), &selectors.matchup_totals).await?;
        if total_cells.len() != 2 {
            return Err(reader.layout(format!("expected 2 team totals, got {}", total_cells.len())));
        }
        let mut totals = Vec::with_capacity(2);
        for cell in &total_cells {
            totals.push(reader.link(cell).await?);
        }

        let mut lineups = Vec::new();
        for group in reader.all(None, &selectors.lineup_groups).await? {
            let rows = reader.all(Some(&group), &selectors.lineup_rows).await?;
            lineups.push(reader.player_rows(&rows, selectors).await?);
        }

        Ok(RawPageData::GameCenter { totals, lineups })
    }
}

/// Any page adapter
#[derive(Debug, Clone)]
pub enum Page {
    LeagueHome(LeagueHomePage),
    SeasonList(SeasonListPage),
    Standings(StandingsPage),
    Roster(RosterPage),
    Week(WeekPage),
    Matchup(MatchupPage),
}

impl Page {
    /// Dispatch table from target kind to page adapter
    pub fn for_target(site: &SiteMap, target: &CrawlTarget) -> Self {
        let url = site.url_for(&target.key);
        match target.kind() {
            TargetKind::League => Self::SeasonList(SeasonListPage { url }),
            TargetKind::Season => Self::Standings(StandingsPage { url, view: StandingsView::Final }),
            TargetKind::Standings => {
                Self::Standings(StandingsPage { url, view: StandingsView::Regular })
            }
            TargetKind::TeamRoster => Self::Roster(RosterPage { url }),
            TargetKind::Schedule => Self::Week(WeekPage { url, view: WeekView::Navigation }),
            TargetKind::Week => Self::Week(WeekPage { url, view: WeekView::Matchups }),
            TargetKind::Matchup => Self::Matchup(MatchupPage { url }),
        }
    }

    /// First page of a session, signing in when credentials are given
    pub async fn entry(
        session: &mut Session,
        credentials: Option<&Credentials>,
    ) -> Result<Self, NavigationError> {
        match credentials {
            Some(credentials) if !session.is_signed_in() => {
                Ok(Self::LeagueHome(LeagueHomePage::sign_in(session, credentials).await?))
            }
            _ => Ok(Self::LeagueHome(LeagueHomePage::new(session.site()))),
        }
    }

    /// Load the page serving `target` and wait for it to render
    pub async fn load(session: &mut Session, target: &CrawlTarget) -> Result<Self, NavigationError> {
        let page = Self::for_target(session.site(), target);
        let url = page.url().to_string();

        session.navigate(&url).await.map_err(|e| NavigationError::from_driver(url.clone(), e))?;

        let anchor = page.anchor(session.site().selectors()).to_string();
        session.wait_for(&anchor).await.map_err(|e| NavigationError::from_driver(url.clone(), e))?;

        debug!("Loaded {:?} page {}", page.shape(), url);
        Ok(page)
    }

    fn inner(&self) -> &dyn PageObject {
        match self {
            Self::LeagueHome(p) => p,
            Self::SeasonList(p) => p,
            Self::Standings(p) => p,
            Self::Roster(p) => p,
            Self::Week(p) => p,
            Self::Matchup(p) => p,
        }
    }
}

#[async_trait::async_trait]
impl PageObject for Page {
    fn shape(&self) -> PageShape {
        self.inner().shape()
    }

    fn url(&self) -> &str {
        self.inner().url()
    }

    fn anchor<'a>(&self, selectors: &'a SelectorConfig) -> &'a str {
        self.inner().anchor(selectors)
    }

    async fn extract(&self, session: &Session) -> Result<RawPageData, ExtractionError> {
        self.inner().extract(session).await
    }

    async fn navigate_to(
        &self,
        session: &mut Session,
        target: &CrawlTarget,
    ) -> Result<Page, NavigationError> {
        self.inner().navigate_to(session, target).await
    }
}
