//! Crawl targets
//!
//! A target is one page visit in the crawl. Targets form a tree rooted at the
//! league: each target's children are only known after it has been visited.

use crate::types::{LeagueId, MatchupId, SeasonId, TeamId, WeekId};
use persistence::EntityKey;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    League,
    Season,
    Standings,
    TeamRoster,
    Schedule,
    Week,
    Matchup,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::League => "league",
            Self::Season => "season",
            Self::Standings => "standings",
            Self::TeamRoster => "team_roster",
            Self::Schedule => "schedule",
            Self::Week => "week",
            Self::Matchup => "matchup",
        };
        f.write_str(name)
    }
}

/// Composite identity of a target
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetKey {
    League { league: LeagueId },
    Season { league: LeagueId, season: SeasonId },
    Standings { league: LeagueId, season: SeasonId },
    TeamRoster { league: LeagueId, season: SeasonId, team: TeamId },
    Schedule { league: LeagueId, season: SeasonId },
    Week { league: LeagueId, season: SeasonId, week: WeekId },
    Matchup { league: LeagueId, season: SeasonId, week: WeekId, matchup: MatchupId, home: TeamId, away: TeamId },
}

impl TargetKey {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::League { .. } => TargetKind::League,
            Self::Season { .. } => TargetKind::Season,
            Self::Standings { .. } => TargetKind::Standings,
            Self::TeamRoster { .. } => TargetKind::TeamRoster,
            Self::Schedule { .. } => TargetKind::Schedule,
            Self::Week { .. } => TargetKind::Week,
            Self::Matchup { .. } => TargetKind::Matchup,
        }
    }

    pub fn league(&self) -> &LeagueId {
        match self {
            Self::League { league }
            | Self::Season { league, .. }
            | Self::Standings { league, .. }
            | Self::TeamRoster { league, .. }
            | Self::Schedule { league, .. }
            | Self::Week { league, .. }
            | Self::Matchup { league, .. } => league,
        }
    }

    /// Season the target belongs to; `None` for the league root
    pub fn season(&self) -> Option<SeasonId> {
        match self {
            Self::League { .. } => None,
            Self::Season { season, .. }
            | Self::Standings { season, .. }
            | Self::TeamRoster { season, .. }
            | Self::Schedule { season, .. }
            | Self::Week { season, .. }
            | Self::Matchup { season, .. } => Some(*season),
        }
    }

    /// Slash-separated path, shared by progress entries and stored records
    pub fn path(&self) -> String {
        match self {
            Self::League { league } => format!("league/{league}"),
            Self::Season { league, season } => format!("league/{league}/season/{season}"),
            Self::Standings { league, season } => {
                format!("league/{league}/season/{season}/standings")
            }
            Self::TeamRoster { league, season, team } => {
                format!("league/{league}/season/{season}/team/{team}")
            }
            Self::Schedule { league, season } => {
                format!("league/{league}/season/{season}/schedule")
            }
            Self::Week { league, season, week } => {
                format!("league/{league}/season/{season}/week/{week}")
            }
            Self::Matchup { league, season, week, matchup, .. } => {
                format!("league/{league}/season/{season}/week/{week}/matchup/{matchup}")
            }
        }
    }

    pub fn entity_key(&self) -> persistence::Result<EntityKey> {
        EntityKey::parse(self.path())
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// One unit of crawl work
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrawlTarget {
    pub key: TargetKey,
    /// Parent that must be `Done` before this target is scheduled
    pub depends_on: Option<TargetKey>,
}

impl CrawlTarget {
    /// Root target for a league
    pub fn league(league: LeagueId) -> Self {
        Self { key: TargetKey::League { league }, depends_on: None }
    }

    /// Target whose parent is `parent`
    pub fn child_of(parent: &CrawlTarget, key: TargetKey) -> Self {
        Self { key, depends_on: Some(parent.key.clone()) }
    }

    pub fn kind(&self) -> TargetKind {
        self.key.kind()
    }

    pub fn path(&self) -> String {
        self.key.path()
    }
}

impl fmt::Display for CrawlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.key)
    }
}
