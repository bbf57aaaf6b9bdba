//! URL construction for the league site

use crate::config::{SelectorConfig, SiteConfig};
use crate::target::TargetKey;
use crate::types::{LeagueId, SeasonId, TeamId, WeekId};

/// Resolves page URLs for one league
#[derive(Debug, Clone)]
pub struct SiteMap {
    base_url: String,
    league: LeagueId,
    paths: SiteConfig,
    selectors: SelectorConfig,
}

impl SiteMap {
    pub fn new(league: LeagueId, paths: SiteConfig, selectors: SelectorConfig) -> Self {
        let base_url = paths.base_url.trim_end_matches('/').to_string();
        Self { base_url, league, paths, selectors }
    }

    pub fn league(&self) -> &LeagueId {
        &self.league
    }

    pub fn selectors(&self) -> &SelectorConfig {
        &self.selectors
    }

    fn render(
        &self,
        template: &str,
        season: Option<SeasonId>,
        week: Option<WeekId>,
        team: Option<&TeamId>,
    ) -> String {
        let mut path = template.replace("{league}", self.league.as_str());
        if let Some(season) = season {
            path = path.replace("{season}", &season.to_string());
        }
        if let Some(week) = week {
            path = path.replace("{week}", &week.to_string());
        }
        if let Some(team) = team {
            path = path.replace("{team}", team.as_str());
        }

        if path.starts_with("http://") || path.starts_with("https://") {
            path
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    pub fn login_url(&self) -> String {
        self.render(&self.paths.login_path, None, None, None)
    }

    pub fn league_home_url(&self) -> String {
        self.render(&self.paths.league_home_path, None, None, None)
    }

    pub fn history_url(&self) -> String {
        self.render(&self.paths.history_path, None, None, None)
    }

    pub fn final_standings_url(&self, season: SeasonId) -> String {
        self.render(&self.paths.final_standings_path, Some(season), None, None)
    }

    pub fn regular_standings_url(&self, season: SeasonId) -> String {
        self.render(&self.paths.regular_standings_path, Some(season), None, None)
    }

    pub fn team_home_url(&self, season: SeasonId, team: &TeamId) -> String {
        self.render(&self.paths.team_home_path, Some(season), None, Some(team))
    }

    pub fn schedule_url(&self, season: SeasonId, week: WeekId) -> String {
        self.render(&self.paths.schedule_path, Some(season), Some(week), None)
    }

    pub fn game_center_url(&self, season: SeasonId, week: WeekId, team: &TeamId) -> String {
        self.render(&self.paths.game_center_path, Some(season), Some(week), Some(team))
    }

    /// Page a target is collected from
    pub fn url_for(&self, key: &TargetKey) -> String {
        match key {
            TargetKey::League { .. } => self.history_url(),
            TargetKey::Season { season, .. } => self.final_standings_url(*season),
            TargetKey::Standings { season, .. } => self.regular_standings_url(*season),
            TargetKey::TeamRoster { season, team, .. } => self.team_home_url(*season, team),
            TargetKey::Schedule { season, .. } => self.schedule_url(*season, WeekId(1)),
            TargetKey::Week { season, week, .. } => self.schedule_url(*season, *week),
            TargetKey::Matchup { season, week, home, .. } => {
                self.game_center_url(*season, *week, home)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteMap {
        SiteMap::new(LeagueId::new("42"), SiteConfig::default(), SelectorConfig::default())
    }

    #[test]
    fn test_urls_match_site_layout() {
        let site = site();
        assert_eq!(site.history_url(), "https://fantasy.nfl.com/league/42/history");
        assert_eq!(
            site.final_standings_url(SeasonId(2021)),
            "https://fantasy.nfl.com/league/42/history/2021/standings?historyStandingsType=final"
        );
        assert_eq!(
            site.game_center_url(SeasonId(2021), WeekId(7), &TeamId::new("3")),
            "https://fantasy.nfl.com/league/42/history/2021/teamgamecenter?teamId=3&week=7&trackType=fbs"
        );
        assert_eq!(site.login_url(), "https://fantasy.nfl.com/account/sign-in");
    }

    #[test]
    fn test_schedule_target_uses_first_week() {
        let key = TargetKey::Schedule { league: LeagueId::new("42"), season: SeasonId(2020) };
        let url = site().url_for(&key);
        assert!(url.contains("/history/2020/schedule?"));
        assert!(url.contains("scheduleDetail=1&"));
        assert!(url.contains("leagueId=42"));
    }

    #[test]
    fn test_absolute_templates_are_kept() {
        let mut paths = SiteConfig::default();
        paths.base_url = "http://fixture.test/".to_string();
        paths.login_path = "https://accounts.example/sign-in".to_string();
        let site = SiteMap::new(LeagueId::new("7"), paths, SelectorConfig::default());

        assert_eq!(site.login_url(), "https://accounts.example/sign-in");
        assert_eq!(site.league_home_url(), "http://fixture.test/league/7");
    }
}
