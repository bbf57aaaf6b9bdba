//! Configuration for the collector

use crate::retry::RetryPolicy;
use crate::types::{LeagueId, SeasonId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the sign-in user name
pub const USERNAME_ENV: &str = "LEAGUE_COLLECTOR_USERNAME";
/// Environment variable holding the sign-in password
pub const PASSWORD_ENV: &str = "LEAGUE_COLLECTOR_PASSWORD";

/// Top-level collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// League to collect
    pub league_id: String,

    /// Seasons to collect; unbounded ends take whatever the site lists
    pub seasons: SeasonRange,

    /// Site base URL and URL templates
    pub site: SiteConfig,

    /// CSS selectors used by page adapters
    pub selectors: SelectorConfig,

    /// Automation backend configuration
    pub automation: AutomationConfig,

    /// Sign-in credentials; omitted when the browser profile is already signed in
    pub credentials: Option<Credentials>,

    /// Retry/backoff policy applied to every target
    pub retry: RetryPolicy,

    /// Page pacing and readiness polling
    pub pacing: PacingConfig,

    /// Per-season session sharding
    pub sharding: ShardingConfig,

    /// Re-attempt targets that previously failed for a fatal reason
    pub retry_fatal_failures: bool,
}

/// Inclusive season bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonRange {
    pub first: Option<u16>,
    pub last: Option<u16>,
}

impl SeasonRange {
    pub fn contains(&self, season: SeasonId) -> bool {
        self.first.map_or(true, |first| season.0 >= first)
            && self.last.map_or(true, |last| season.0 <= last)
    }

    /// Parse `2019..2022`, `2019..`, `..2022` or a single `2021`
    ///
    /// Both bounds are inclusive; `2019..=2022` is accepted as well.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let bound = |s: &str| -> Result<Option<u16>, String> {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<u16>().map(Some).map_err(|e| format!("invalid season {s:?}: {e}"))
        };

        match raw.split_once("..=").or_else(|| raw.split_once("..")) {
            Some((first, last)) => Ok(Self { first: bound(first)?, last: bound(last)? }),
            None => {
                let season = bound(raw)?;
                Ok(Self { first: season, last: season })
            }
        }
    }
}

/// Where pages live
///
/// Templates accept `{league}`, `{season}`, `{week}` and `{team}`
/// placeholders and are resolved against `base_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub login_path: String,
    pub league_home_path: String,
    pub history_path: String,
    pub final_standings_path: String,
    pub regular_standings_path: String,
    pub team_home_path: String,
    pub schedule_path: String,
    pub game_center_path: String,
}

/// CSS selectors for every page adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    // Sign-in form
    pub login_username: String,
    pub login_password: String,
    pub login_submit: String,

    // League home
    pub league_home_anchor: String,
    pub league_name: String,

    // Season list
    pub season_nav: String,
    pub season_links: String,

    // Final standings
    pub final_standings: String,
    pub final_standings_rows: String,
    pub final_place: String,

    // Regular season standings
    pub regular_standings: String,
    pub regular_standings_rows: String,
    pub standings_rank: String,
    pub standings_record: String,
    pub standings_points: String,

    /// Team link inside standings and schedule rows
    pub team_link: String,

    // Team home
    pub team_detail: String,
    pub team_name: String,
    pub team_owners: String,
    pub roster_rows: String,

    // Player rows (team home roster and game center box score)
    pub player_slot: String,
    pub player_card: String,
    pub player_info: String,

    // Schedule
    pub week_nav: String,
    pub week_labels: String,
    pub schedule_content: String,
    pub schedule_matchups: String,

    // Game center
    pub matchup_header: String,
    pub matchup_totals: String,
    pub lineup_groups: String,
    pub lineup_rows: String,
}

/// Which automation backend drives the pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationBackend {
    /// W3C WebDriver server (Selenium, chromedriver, geckodriver)
    WebDriver,
    /// Plain HTTP fetch of server-rendered pages
    Html,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub backend: AutomationBackend,

    /// WebDriver server URL
    pub endpoint: String,

    /// Capabilities passed through to the WebDriver new-session request
    pub capabilities: serde_json::Value,

    /// Timeout for a single driver command in milliseconds
    pub command_timeout_ms: u64,

    /// User agent for the HTML backend
    pub user_agent: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Page pacing and readiness polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Lower bound of the random interval between page loads in milliseconds
    pub min_page_interval_ms: u64,

    /// Upper bound of the random interval between page loads in milliseconds
    pub max_page_interval_ms: u64,

    /// How long to wait for a page's anchor element in milliseconds
    pub page_ready_timeout_ms: u64,

    /// Poll interval while waiting for an anchor in milliseconds
    pub ready_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingConfig {
    /// Run each season on its own session
    pub enabled: bool,

    /// Maximum sessions open at once
    pub max_sessions: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            league_id: String::new(),
            seasons: SeasonRange::default(),
            site: SiteConfig::default(),
            selectors: SelectorConfig::default(),
            automation: AutomationConfig::default(),
            credentials: None,
            retry: RetryPolicy::default(),
            pacing: PacingConfig::default(),
            sharding: ShardingConfig::default(),
            retry_fatal_failures: false,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        let history = "/league/{league}/history/{season}";
        Self {
            base_url: "https://fantasy.nfl.com".to_string(),
            login_path: "/account/sign-in".to_string(),
            league_home_path: "/league/{league}".to_string(),
            history_path: "/league/{league}/history".to_string(),
            final_standings_path: format!("{history}/standings?historyStandingsType=final"),
            regular_standings_path: format!("{history}/standings?historyStandingsType=regular"),
            team_home_path: format!("{history}/teamhome?teamId={{team}}"),
            schedule_path: format!(
                "{history}/schedule?gameSeason={{season}}&leagueId={{league}}&scheduleDetail={{week}}&scheduleType=week&standingsTab=schedule"
            ),
            game_center_path: format!(
                "{history}/teamgamecenter?teamId={{team}}&week={{week}}&trackType=fbs"
            ),
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        let s = |v: &str| v.to_string();
        Self {
            login_username: s("#gigya-login-form input[name='username']"),
            login_password: s("#gigya-login-form input[name='password']"),
            login_submit: s("#gigya-login-form input.gigya-input-submit[type='submit']"),
            league_home_anchor: s("#leagueHomeStandings"),
            league_name: s(".leagueName"),
            season_nav: s("#historySeasonNav"),
            season_links: s("#historySeasonNav .st-menu a"),
            final_standings: s("#finalStandings .results"),
            final_standings_rows: s("li"),
            final_place: s(".place"),
            regular_standings: s("#leagueHistoryStandings"),
            regular_standings_rows: s("tr"),
            standings_rank: s(".teamRank"),
            standings_record: s(".teamRecord"),
            standings_points: s(".teamPts"),
            team_link: s(".teamName"),
            team_detail: s("#teamDetail"),
            team_name: s(".teamName"),
            team_owners: s(".owners a"),
            roster_rows: s("#teamHomeRoster tbody tr"),
            player_slot: s(".teamPosition span"),
            player_card: s(".playerCard"),
            player_info: s(".playerNameAndInfo .c"),
            week_nav: s(".scheduleWeekNav"),
            week_labels: s("li span"),
            schedule_content: s(".scheduleContentWrap .scheduleContent"),
            schedule_matchups: s(".matchup"),
            matchup_header: s("#teamMatchupHeader"),
            matchup_totals: s(".teamTotal"),
            lineup_groups: s("#teamMatchupTrack .teamWrap"),
            lineup_rows: s("tbody tr"),
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            backend: AutomationBackend::WebDriver,
            endpoint: "http://localhost:4444".to_string(),
            capabilities: serde_json::json!({ "browserName": "chrome" }),
            command_timeout_ms: 30_000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_page_interval_ms: 2_000,
            max_page_interval_ms: 4_000,
            page_ready_timeout_ms: 10_000,
            ready_poll_interval_ms: 250,
        }
    }
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self { enabled: false, max_sessions: 2 }
    }
}

impl AutomationConfig {
    /// Get command timeout as Duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl PacingConfig {
    /// No pacing and fast polling, for local fixtures
    pub fn immediate() -> Self {
        Self {
            min_page_interval_ms: 0,
            max_page_interval_ms: 0,
            page_ready_timeout_ms: 200,
            ready_poll_interval_ms: 10,
        }
    }

    /// Get page ready timeout as Duration
    pub fn page_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.page_ready_timeout_ms)
    }

    /// Get ready poll interval as Duration
    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }
}

impl CollectorConfig {
    /// Configuration for one league with defaults elsewhere
    pub fn for_league(league_id: impl Into<String>) -> Self {
        Self { league_id: league_id.into(), ..Default::default() }
    }

    pub fn league(&self) -> LeagueId {
        LeagueId::new(self.league_id.clone())
    }

    /// Fill credentials from the environment when both variables are set
    pub fn apply_env_overrides(&mut self) {
        if let (Ok(username), Ok(password)) =
            (std::env::var(USERNAME_ENV), std::env::var(PASSWORD_ENV))
        {
            self.credentials = Some(Credentials { username, password });
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.league_id.trim().is_empty() {
            return Err("league_id must be set".to_string());
        }

        if !self.league_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(format!("league_id {:?} contains unsupported characters", self.league_id));
        }

        if let (Some(first), Some(last)) = (self.seasons.first, self.seasons.last) {
            if first > last {
                return Err(format!("season range {first}..{last} is empty"));
            }
        }

        if url::Url::parse(&self.site.base_url).is_err() {
            return Err(format!("site.base_url {:?} is not a valid URL", self.site.base_url));
        }

        if self.automation.backend == AutomationBackend::WebDriver
            && url::Url::parse(&self.automation.endpoint).is_err()
        {
            return Err(format!(
                "automation.endpoint {:?} is not a valid URL",
                self.automation.endpoint
            ));
        }

        if self.automation.backend == AutomationBackend::Html && self.credentials.is_some() {
            return Err("sign-in requires the web_driver automation backend".to_string());
        }

        if self.pacing.min_page_interval_ms > self.pacing.max_page_interval_ms {
            return Err("pacing.min_page_interval_ms exceeds max_page_interval_ms".to_string());
        }

        if self.pacing.ready_poll_interval_ms == 0 {
            return Err("pacing.ready_poll_interval_ms must be greater than 0".to_string());
        }

        if self.sharding.max_sessions == 0 {
            return Err("sharding.max_sessions must be greater than 0".to_string());
        }

        self.retry.validate()
    }
}
