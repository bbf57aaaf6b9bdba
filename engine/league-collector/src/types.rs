use persistence::EntityKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// League identifier as used in site URLs
    LeagueId
);
string_id!(
    /// Team identifier, unique within a season
    TeamId
);
string_id!(
    /// Matchup identifier, unique within a week (`"{home}-{away}"`)
    MatchupId
);
string_id!(
    /// Site user id of a team manager
    ManagerId
);
string_id!(
    /// NFL.com player id
    PlayerId
);

impl MatchupId {
    pub fn from_teams(home: &TeamId, away: &TeamId) -> Self {
        Self(format!("{home}-{away}"))
    }
}

/// Season, identified by its year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeasonId(pub u16);

impl fmt::Display for SeasonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Week number within a season
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekId(pub u32);

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A person managing a team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manager {
    pub id: ManagerId,
    /// Display name (e.g., "Pat Mahomes Fan")
    pub name: String,
}

/// A rostered player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    /// Player name (e.g., "Josh Allen")
    pub name: String,
    /// Position (QB, RB, WR, TE, K, DEF)
    pub position: String,
}

/// A team's lineup for one game
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineup {
    pub starters: Vec<Player>,
    pub bench: Vec<Player>,
}

/// A fantasy team in one season
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub league: LeagueId,
    pub season: SeasonId,
    pub name: String,
    /// Display name of the primary manager
    pub owner: String,
    /// All managers, primary first
    pub managers: Vec<Manager>,
    /// Roster as listed on the team home page, possibly empty
    pub roster: Vec<Player>,
}

/// One game between two teams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matchup {
    pub id: MatchupId,
    pub league: LeagueId,
    pub season: SeasonId,
    pub week: WeekId,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub home_score: Decimal,
    pub away_score: Decimal,
    pub home_lineup: Lineup,
    pub away_lineup: Lineup,
}

/// Regular season standing of one team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingsEntry {
    pub team_id: TeamId,
    pub season: SeasonId,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub rank: u32,
    pub points_for: Decimal,
    pub points_against: Decimal,
}

/// Final (post-playoff) place of one team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalStanding {
    pub team_id: TeamId,
    pub season: SeasonId,
    pub place: u32,
}

/// Team reference as listed on a season page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: TeamId,
    pub name: String,
}

/// Matchup reference as listed on a week's schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchupRef {
    pub id: MatchupId,
    pub home: TeamId,
    pub away: TeamId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueRecord {
    pub league: LeagueId,
    pub name: Option<String>,
    /// Seasons offered by the site, ascending
    pub seasons: Vec<SeasonId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonRecord {
    pub league: LeagueId,
    pub season: SeasonId,
    /// Teams in the site's listing order
    pub teams: Vec<TeamRef>,
    pub final_standings: Vec<FinalStanding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingsTable {
    pub league: LeagueId,
    pub season: SeasonId,
    pub entries: Vec<StandingsEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub league: LeagueId,
    pub season: SeasonId,
    /// Weeks with games, ascending
    pub weeks: Vec<WeekId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekSchedule {
    pub league: LeagueId,
    pub season: SeasonId,
    pub week: WeekId,
    pub matchups: Vec<MatchupRef>,
}

/// A validated record ready for the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DomainRecord {
    League(LeagueRecord),
    Season(SeasonRecord),
    Standings(StandingsTable),
    Team(Team),
    Schedule(ScheduleRecord),
    Week(WeekSchedule),
    Matchup(Matchup),
}

impl DomainRecord {
    /// Record type tag stored alongside the data
    pub fn kind(&self) -> &'static str {
        match self {
            Self::League(_) => "league",
            Self::Season(_) => "season",
            Self::Standings(_) => "standings",
            Self::Team(_) => "team",
            Self::Schedule(_) => "schedule",
            Self::Week(_) => "week",
            Self::Matchup(_) => "matchup",
        }
    }

    /// Key this record is stored under
    pub fn entity_key(&self) -> persistence::Result<EntityKey> {
        let path = match self {
            Self::League(r) => format!("league/{}", r.league),
            Self::Season(r) => format!("league/{}/season/{}", r.league, r.season),
            Self::Standings(r) => format!("league/{}/season/{}/standings", r.league, r.season),
            Self::Team(r) => format!("league/{}/season/{}/team/{}", r.league, r.season, r.id),
            Self::Schedule(r) => format!("league/{}/season/{}/schedule", r.league, r.season),
            Self::Week(r) => format!("league/{}/season/{}/week/{}", r.league, r.season, r.week),
            Self::Matchup(r) => format!(
                "league/{}/season/{}/week/{}/matchup/{}",
                r.league, r.season, r.week, r.id
            ),
        };
        EntityKey::parse(path)
    }

    /// Serialized payload without the type tag
    pub fn to_data(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::League(r) => serde_json::to_value(r),
            Self::Season(r) => serde_json::to_value(r),
            Self::Standings(r) => serde_json::to_value(r),
            Self::Team(r) => serde_json::to_value(r),
            Self::Schedule(r) => serde_json::to_value(r),
            Self::Week(r) => serde_json::to_value(r),
            Self::Matchup(r) => serde_json::to_value(r),
        }
    }
}
