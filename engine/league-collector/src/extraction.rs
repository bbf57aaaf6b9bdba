//! Raw page data to validated records
//!
//! Parsing is pure: it sees only the raw strings a page adapter read and the
//! target being collected. Every rule violation is a [`ValidationError`].

use crate::error::{FieldKind, ValidationError};
use crate::pages::{PageShape, RawFinalRow, RawLink, RawPageData, RawPlayerRow, RawStandingsRow};
use crate::target::{CrawlTarget, TargetKey};
use crate::types::{
    DomainRecord, FinalStanding, LeagueId, LeagueRecord, Lineup, Manager, ManagerId, Matchup,
    MatchupId, MatchupRef, Player, PlayerId, ScheduleRecord, SeasonId, SeasonRecord,
    StandingsEntry, StandingsTable, Team, TeamId, TeamRef, WeekId, WeekSchedule,
};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::str::FromStr;

const BENCH_SLOT: &str = "BN";

type Result<T> = std::result::Result<T, ValidationError>;

/// Turn raw page data into the record for `target`
pub fn parse(raw: RawPageData, target: &CrawlTarget) -> Result<DomainRecord> {
    let expected = PageShape::for_kind(target.kind());
    if raw.shape() != expected {
        return Err(ValidationError::new(
            FieldKind::PageShape,
            format!("{} needs {:?} data, got {:?}", target, expected, raw.shape()),
        ));
    }

    match (&target.key, raw) {
        (TargetKey::League { league }, RawPageData::SeasonList { league_name, season_labels }) => {
            parse_league(league, league_name, &season_labels)
        }
        (TargetKey::Season { league, season }, RawPageData::FinalStandings { rows }) => {
            parse_season(league, *season, &rows)
        }
        (TargetKey::Standings { league, season }, RawPageData::RegularStandings { rows }) => {
            parse_standings(league, *season, &rows)
        }
        (
            TargetKey::TeamRoster { league, season, team },
            RawPageData::TeamHome { team_name, owners, roster },
        ) => parse_team(league, *season, team, &team_name, &owners, &roster),
        (TargetKey::Schedule { league, season }, RawPageData::WeekNav { week_labels }) => {
            parse_schedule(league, *season, &week_labels)
        }
        (TargetKey::Week { league, season, week }, RawPageData::WeekSchedule { matchups }) => {
            parse_week(league, *season, *week, &matchups)
        }
        (
            TargetKey::Matchup { league, season, week, matchup, home, away },
            RawPageData::GameCenter { totals, lineups },
        ) => parse_matchup(league, *season, *week, matchup, home, away, &totals, &lineups),
        (key, raw) => Err(ValidationError::new(
            FieldKind::PageShape,
            format!("no parser for {:?} data at {}", raw.shape(), key),
        )),
    }
}

fn parse_league(
    league: &LeagueId,
    league_name: Option<String>,
    labels: &[String],
) -> Result<DomainRecord> {
    let mut seasons = BTreeSet::new();
    for label in labels {
        let year = label.split_whitespace().next().unwrap_or_default();
        let season = year
            .parse::<u16>()
            .map_err(|_| ValidationError::new(FieldKind::Season, format!("{label:?} is not a season year")))?;
        seasons.insert(SeasonId(season));
    }
    if seasons.is_empty() {
        return Err(ValidationError::new(FieldKind::Season, "league lists no seasons"));
    }

    Ok(DomainRecord::League(LeagueRecord {
        league: league.clone(),
        name: league_name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        seasons: seasons.into_iter().collect(),
    }))
}

fn parse_season(league: &LeagueId, season: SeasonId, rows: &[RawFinalRow]) -> Result<DomainRecord> {
    let mut teams = Vec::with_capacity(rows.len());
    let mut final_standings = Vec::with_capacity(rows.len());

    for row in rows {
        let id = team_id_from_href(&row.team)?;
        let name = required_text(&row.team.text, "team name")?;
        let place = leading_number(&row.place, FieldKind::Place)?;

        final_standings.push(FinalStanding { team_id: id.clone(), season, place });
        teams.push(TeamRef { id, name });
    }

    ensure_distinct(teams.iter().map(|t| &t.id), "season")?;
    check_permutation(&final_standings.iter().map(|s| s.place).collect::<Vec<_>>(), FieldKind::Place)?;

    Ok(DomainRecord::Season(SeasonRecord { league: league.clone(), season, teams, final_standings }))
}

fn parse_standings(
    league: &LeagueId,
    season: SeasonId,
    rows: &[RawStandingsRow],
) -> Result<DomainRecord> {
    let mut entries = Vec::with_capacity(rows.len());

    for row in rows {
        let team_id = team_id_from_href(&row.team)?;
        let rank = leading_number(&row.rank, FieldKind::Rank)?;
        let (wins, losses, ties) = parse_record(&row.record)?;
        let (points_for, points_against) = match row.points.as_slice() {
            [pf, pa, ..] => (decimal(pf, FieldKind::Points)?, decimal(pa, FieldKind::Points)?),
            _ => {
                return Err(ValidationError::new(
                    FieldKind::Points,
                    format!("team {team_id} is missing points for or against"),
                ))
            }
        };

        entries.push(StandingsEntry {
            team_id,
            season,
            wins,
            losses,
            ties,
            rank,
            points_for,
            points_against,
        });
    }

    ensure_distinct(entries.iter().map(|e| &e.team_id), "standings")?;
    check_permutation(&entries.iter().map(|e| e.rank).collect::<Vec<_>>(), FieldKind::Rank)?;

    Ok(DomainRecord::Standings(StandingsTable { league: league.clone(), season, entries }))
}

fn parse_team(
    league: &LeagueId,
    season: SeasonId,
    team: &TeamId,
    team_name: &str,
    owners: &[RawLink],
    roster: &[RawPlayerRow],
) -> Result<DomainRecord> {
    let name = required_text(team_name, "team name")?;

    let mut managers = Vec::with_capacity(owners.len());
    for owner in owners {
        let id = class_id(owner, "userId-", FieldKind::Manager)?;
        let name = required_text(&owner.text, "manager name")?;
        managers.push(Manager { id: ManagerId(id), name });
    }
    let owner = managers
        .first()
        .map(|m| m.name.clone())
        .ok_or_else(|| ValidationError::new(FieldKind::Manager, format!("team {team} has no manager")))?;

    let players = roster.iter().map(player).collect::<Result<Vec<_>>>()?;

    Ok(DomainRecord::Team(Team {
        id: team.clone(),
        league: league.clone(),
        season,
        name,
        owner,
        managers,
        roster: players,
    }))
}

fn parse_schedule(league: &LeagueId, season: SeasonId, labels: &[String]) -> Result<DomainRecord> {
    // The navigation also holds non-week entries (e.g. "Playoffs"); those are skipped
    let weeks: BTreeSet<WeekId> =
        labels.iter().filter_map(|label| label.trim().parse::<u32>().ok()).map(WeekId).collect();

    if weeks.is_empty() {
        return Err(ValidationError::new(FieldKind::Week, "schedule lists no numbered weeks"));
    }
    if weeks.contains(&WeekId(0)) {
        return Err(ValidationError::new(FieldKind::Week, "week numbers start at 1"));
    }

    Ok(DomainRecord::Schedule(ScheduleRecord {
        league: league.clone(),
        season,
        weeks: weeks.into_iter().collect(),
    }))
}

fn parse_week(
    league: &LeagueId,
    season: SeasonId,
    week: WeekId,
    matchups: &[Vec<RawLink>],
) -> Result<DomainRecord> {
    let mut refs = Vec::with_capacity(matchups.len());

    for links in matchups {
        let mut teams: Vec<TeamId> = Vec::with_capacity(2);
        for link in links {
            let id = team_id_from_href(link)?;
            if !teams.contains(&id) {
                teams.push(id);
            }
        }

        let [home, away] = <[TeamId; 2]>::try_from(teams).map_err(|teams| {
            ValidationError::new(
                FieldKind::Matchup,
                format!("week {week} matchup lists {} distinct team(s), expected 2", teams.len()),
            )
        })?;

        refs.push(MatchupRef { id: MatchupId::from_teams(&home, &away), home, away });
    }

    ensure_distinct(refs.iter().map(|r| &r.id), "week")?;

    Ok(DomainRecord::Week(WeekSchedule { league: league.clone(), season, week, matchups: refs }))
}

#[allow(clippy::too_many_arguments)]
fn parse_matchup(
    league: &LeagueId,
    season: SeasonId,
    week: WeekId,
    matchup: &MatchupId,
    home: &TeamId,
    away: &TeamId,
    totals: &[RawLink],
    lineups: &[Vec<RawPlayerRow>],
) -> Result<DomainRecord> {
    if home == away {
        return Err(ValidationError::new(FieldKind::Matchup, format!("team {home} plays itself")));
    }

    let [first, second] = totals else {
        return Err(ValidationError::new(
            FieldKind::Matchup,
            format!("expected 2 team totals, got {}", totals.len()),
        ));
    };

    let first_team = TeamId(class_id(first, "teamId-", FieldKind::Matchup)?);
    let second_team = TeamId(class_id(second, "teamId-", FieldKind::Matchup)?);
    let first_score = decimal(&first.text, FieldKind::Score)?;
    let second_score = decimal(&second.text, FieldKind::Score)?;

    let (home_score, away_score) = if (&first_team, &second_team) == (home, away) {
        (first_score, second_score)
    } else if (&first_team, &second_team) == (away, home) {
        (second_score, first_score)
    } else {
        return Err(ValidationError::new(
            FieldKind::Matchup,
            format!("page shows teams {first_team} and {second_team}, expected {home} and {away}"),
        ));
    };

    let mut lineups = lineups.iter().map(|rows| lineup(rows));
    let home_lineup = lineups.next().transpose()?.unwrap_or_default();
    let away_lineup = lineups.next().transpose()?.unwrap_or_default();

    Ok(DomainRecord::Matchup(Matchup {
        id: matchup.clone(),
        league: league.clone(),
        season,
        week,
        home_team: home.clone(),
        away_team: away.clone(),
        home_score,
        away_score,
        home_lineup,
        away_lineup,
    }))
}

fn lineup(rows: &[RawPlayerRow]) -> Result<Lineup> {
    let mut lineup = Lineup::default();
    for row in rows {
        let player = player(row)?;
        if row.slot.trim() == BENCH_SLOT {
            lineup.bench.push(player);
        } else {
            lineup.starters.push(player);
        }
    }
    Ok(lineup)
}

/// Player card class carries the id; info reads like "Josh Allen QB - BUF"
fn player(row: &RawPlayerRow) -> Result<Player> {
    let id = PlayerId(class_id(&row.card, "playerNameId-", FieldKind::Identifier)?);
    let name = required_text(&row.card.text, "player name")?;
    let position = row
        .info
        .split(" - ")
        .next()
        .and_then(|head| head.split_whitespace().last())
        .unwrap_or_default()
        .to_string();

    Ok(Player { id, name, position })
}

fn required_text(raw: &str, what: &str) -> Result<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ValidationError::new(FieldKind::Text, format!("{what} is empty")));
    }
    Ok(text.to_string())
}

fn numeric_id(raw: &str, field: FieldKind) -> Result<String> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new(field, format!("{raw:?} is not a numeric id")));
    }
    Ok(raw.to_string())
}

/// Team id from a link's `teamId=` query parameter
fn team_id_from_href(link: &RawLink) -> Result<TeamId> {
    let href = link.href.as_deref().unwrap_or_default();
    let value = href
        .split(['?', '&'])
        .find_map(|pair| pair.strip_prefix("teamId="))
        .ok_or_else(|| {
            ValidationError::new(FieldKind::Identifier, format!("link {:?} has no teamId", link.text))
        })?;

    Ok(TeamId(numeric_id(value, FieldKind::Identifier)?))
}

/// Id encoded as a `{prefix}{id}` class token
fn class_id(link: &RawLink, prefix: &str, field: FieldKind) -> Result<String> {
    let class = link.class.as_deref().unwrap_or_default();
    let value = class
        .split_whitespace()
        .find_map(|token| token.strip_prefix(prefix))
        .ok_or_else(|| {
            ValidationError::new(field, format!("{:?} has no {prefix} class", link.text))
        })?;

    numeric_id(value, field)
}

/// Leading digits of values like "1", "3rd" or "#2"
fn leading_number(raw: &str, field: FieldKind) -> Result<u32> {
    let digits: String = raw
        .trim()
        .trim_start_matches('#')
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();

    let value = digits
        .parse::<u32>()
        .map_err(|_| ValidationError::new(field, format!("{raw:?} is not a number")))?;
    if value == 0 {
        return Err(ValidationError::new(field, format!("{raw:?} must be at least 1")));
    }
    Ok(value)
}

/// Non-negative decimal, ignoring thousands separators
fn decimal(raw: &str, field: FieldKind) -> Result<Decimal> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    let value = Decimal::from_str(&cleaned)
        .map_err(|_| ValidationError::new(field, format!("{raw:?} is not a number")))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new(field, format!("negative value {raw}")));
    }
    Ok(value)
}

/// Win-loss-tie record such as "9-4-1"; a missing tie count means 0
fn parse_record(raw: &str) -> Result<(u32, u32, u32)> {
    let parts = raw
        .trim()
        .split('-')
        .map(|part| part.trim().parse::<u32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| ValidationError::new(FieldKind::Record, format!("{raw:?} is not W-L-T")))?;

    match parts.as_slice() {
        [w, l] => Ok((*w, *l, 0)),
        [w, l, t] => Ok((*w, *l, *t)),
        _ => Err(ValidationError::new(FieldKind::Record, format!("{raw:?} is not W-L-T"))),
    }
}

fn ensure_distinct<'a, T>(ids: impl Iterator<Item = &'a T>, scope: &str) -> Result<()>
where
    T: Ord + std::fmt::Display + 'a,
{
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ValidationError::new(
                FieldKind::Identifier,
                format!("{id} appears twice in {scope}"),
            ));
        }
    }
    Ok(())
}

/// Values must be exactly 1..=N in some order
pub fn check_permutation(values: &[u32], field: FieldKind) -> Result<()> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    for (expected, actual) in (1..).zip(&sorted) {
        if *actual != expected {
            return Err(ValidationError::new(
                field,
                format!("{:?} is not a permutation of 1..={}", values, values.len()),
            ));
        }
    }
    Ok(())
}
