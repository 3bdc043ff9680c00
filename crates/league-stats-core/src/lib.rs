use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum LeagueError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("store error: {0}")]
    Store(String),
}

/// Winner of a round. `Tie` covers both a draw and a round with no winner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Champion {
    Azul,
    Vermelho,
    Preto,
    #[serde(rename = "Empate/Nenhum")]
    Tie,
}

impl Champion {
    pub const ALL: [Self; 4] = [Self::Azul, Self::Vermelho, Self::Preto, Self::Tie];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Azul => "Azul",
            Self::Vermelho => "Vermelho",
            Self::Preto => "Preto",
            Self::Tie => "Empate/Nenhum",
        }
    }

    /// Case-insensitive parse of a champion label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "azul" => Some(Self::Azul),
            "vermelho" => Some(Self::Vermelho),
            "preto" => Some(Self::Preto),
            "empate/nenhum" | "empate" | "nenhum" | "tie" | "none" => Some(Self::Tie),
            _ => None,
        }
    }

    /// Team label a player row must carry to be credited with this title.
    #[must_use]
    pub fn team_label(self) -> Option<&'static str> {
        match self {
            Self::Tie => None,
            team => Some(team.as_str()),
        }
    }
}

impl Display for Champion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct MatchId(pub i64);

impl Display for MatchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Points {
    pub azul: u32,
    pub vermelho: u32,
    pub preto: u32,
}

/// Scoreboard of one round, as entered before the store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RoundResult {
    pub date: Date,
    pub champion: Champion,
    pub points: Points,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub date: Date,
    pub champion: Champion,
    pub points: Points,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PlayerStat {
    pub match_id: MatchId,
    pub player: String,
    pub team: String,
    pub goals: i64,
}

/// One `(player, team, goals)` row of a round roster.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RosterEntry {
    pub player: String,
    pub team: String,
    pub goals: i64,
}

impl RosterEntry {
    #[must_use]
    pub fn new(player: &str, team: &str, goals: i64) -> Self {
        Self {
            player: player.trim().to_string(),
            team: team.trim().to_string(),
            goals,
        }
    }

    /// Parses an edit row in `name, team, goals` form.
    ///
    /// Unlike roster lines, empty names or teams are allowed through so the
    /// editor can count them as skipped; only the goal count must be an integer.
    ///
    /// # Errors
    /// Returns [`LeagueError::Validation`] when the row has fewer than three
    /// fields or the goal count is not an integer.
    pub fn parse_edit_row(raw: &str) -> Result<Self, LeagueError> {
        let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
        let [player, team, goals_raw, ..] = fields.as_slice() else {
            return Err(LeagueError::Validation(format!(
                "edit row MUST be in <name>, <team>, <goals> form: {raw:?}"
            )));
        };

        let goals = goals_raw.parse::<i64>().map_err(|_| {
            LeagueError::Validation(format!("goal count MUST be an integer: {goals_raw:?}"))
        })?;

        Ok(Self::new(player, team, goals))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewRound {
    pub result: RoundResult,
    pub raw_lines: String,
}

impl NewRound {
    /// Validates a round submission before any line is parsed.
    ///
    /// # Errors
    /// Returns [`LeagueError::Validation`] when no player lines were supplied.
    pub fn validate(&self) -> Result<(), LeagueError> {
        if self.raw_lines.trim().is_empty() {
            return Err(LeagueError::Validation(
                "player lines MUST be provided for every round".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("line has no ',' separator")]
    MissingSeparator,
    #[error("expected at least 3 fields, found {found}")]
    TooFewFields { found: usize },
    #[error("player name is empty")]
    EmptyPlayer,
    #[error("team is empty")]
    EmptyTeam,
    #[error("goal count {raw:?} is not an integer")]
    InvalidGoals { raw: String },
    #[error("goal count {goals} is negative")]
    NegativeGoals { goals: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct LineRejection {
    pub line_number: usize,
    pub line: String,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ParsedRoster {
    pub accepted: Vec<RosterEntry>,
    pub rejected: Vec<LineRejection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RecordOutcome {
    pub match_id: MatchId,
    pub inserted: usize,
    pub rejected: Vec<LineRejection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct EditOutcome {
    pub match_id: MatchId,
    pub inserted: usize,
    pub skipped: usize,
}

/// Parses one `name, team, goals` roster line.
///
/// # Errors
/// Returns the [`RejectReason`] explaining why the line produces no row.
pub fn parse_roster_line(line: &str) -> Result<RosterEntry, RejectReason> {
    if !line.contains(',') {
        return Err(RejectReason::MissingSeparator);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [player, team, goals_raw, ..] = fields.as_slice() else {
        return Err(RejectReason::TooFewFields {
            found: fields.len(),
        });
    };

    if player.is_empty() {
        return Err(RejectReason::EmptyPlayer);
    }

    if team.is_empty() {
        return Err(RejectReason::EmptyTeam);
    }

    let goals = goals_raw
        .parse::<i64>()
        .map_err(|_| RejectReason::InvalidGoals {
            raw: (*goals_raw).to_string(),
        })?;

    if goals < 0 {
        return Err(RejectReason::NegativeGoals { goals });
    }

    Ok(RosterEntry::new(player, team, goals))
}

/// Splits free text into roster lines; blank lines are ignored.
#[must_use]
pub fn parse_roster_lines(raw: &str) -> ParsedRoster {
    let mut parsed = ParsedRoster::default();

    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        match parse_roster_line(line) {
            Ok(entry) => parsed.accepted.push(entry),
            Err(reason) => parsed.rejected.push(LineRejection {
                line_number: index + 1,
                line: line.to_string(),
                reason,
            }),
        }
    }

    parsed
}

/// Persistence seam for rounds and their player rows.
///
/// Every mutating method is atomic: it either applies completely or leaves
/// the store unchanged.
pub trait LeagueStore {
    #[allow(clippy::missing_errors_doc)]
    fn insert_round(
        &mut self,
        result: &RoundResult,
        entries: &[RosterEntry],
    ) -> Result<MatchId, LeagueError>;

    #[allow(clippy::missing_errors_doc)]
    fn replace_round_stats(
        &mut self,
        match_id: MatchId,
        entries: &[RosterEntry],
    ) -> Result<(), LeagueError>;

    #[allow(clippy::missing_errors_doc)]
    fn delete_round(&mut self, match_id: MatchId) -> Result<(), LeagueError>;

    #[allow(clippy::missing_errors_doc)]
    fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRecord>, LeagueError>;

    #[allow(clippy::missing_errors_doc)]
    fn list_matches(&self) -> Result<Vec<MatchRecord>, LeagueError>;

    #[allow(clippy::missing_errors_doc)]
    fn list_player_stats(&self) -> Result<Vec<PlayerStat>, LeagueError>;

    #[allow(clippy::missing_errors_doc)]
    fn list_round_stats(&self, match_id: MatchId) -> Result<Vec<PlayerStat>, LeagueError>;
}

/// Records a round and the roster lines that parse.
///
/// Lines that fail to parse are returned in [`RecordOutcome::rejected`]; the
/// match and all accepted rows are written in one store transaction.
///
/// # Errors
/// Returns [`LeagueError::Validation`] when no player lines were supplied and
/// propagates store failures.
pub fn record_round<S: LeagueStore + ?Sized>(
    store: &mut S,
    round: &NewRound,
) -> Result<RecordOutcome, LeagueError> {
    round.validate()?;

    let parsed = parse_roster_lines(&round.raw_lines);
    for rejection in &parsed.rejected {
        warn!(
            line_number = rejection.line_number,
            reason = %rejection.reason,
            "skipping roster line"
        );
    }

    let match_id = store.insert_round(&round.result, &parsed.accepted)?;
    info!(
        %match_id,
        inserted = parsed.accepted.len(),
        rejected = parsed.rejected.len(),
        "recorded round"
    );

    Ok(RecordOutcome {
        match_id,
        inserted: parsed.accepted.len(),
        rejected: parsed.rejected,
    })
}

/// Replaces every player row of a match with `rows`.
///
/// Rows without a player name or team are skipped.
///
/// # Errors
/// Returns [`LeagueError::NotFound`] when the match does not exist and
/// propagates store failures; on failure the previous rows are kept.
pub fn edit_round<S: LeagueStore + ?Sized>(
    store: &mut S,
    match_id: MatchId,
    rows: &[RosterEntry],
) -> Result<EditOutcome, LeagueError> {
    let kept: Vec<RosterEntry> = rows
        .iter()
        .filter(|row| !row.player.trim().is_empty() && !row.team.trim().is_empty())
        .map(|row| RosterEntry::new(&row.player, &row.team, row.goals))
        .collect();
    let skipped = rows.len() - kept.len();

    store.replace_round_stats(match_id, &kept)?;
    info!(%match_id, inserted = kept.len(), skipped, "replaced round stats");

    Ok(EditOutcome {
        match_id,
        inserted: kept.len(),
        skipped,
    })
}

/// Deletes a match together with its player rows.
///
/// # Errors
/// Returns [`LeagueError::NotFound`] when the match does not exist and
/// propagates store failures.
pub fn delete_round<S: LeagueStore + ?Sized>(
    store: &mut S,
    match_id: MatchId,
) -> Result<(), LeagueError> {
    store.delete_round(match_id)?;
    info!(%match_id, "deleted round");
    Ok(())
}

/// Current player rows of a match, for correction.
///
/// # Errors
/// Returns [`LeagueError::NotFound`] when the match does not exist.
pub fn round_stats<S: LeagueStore + ?Sized>(
    store: &S,
    match_id: MatchId,
) -> Result<Vec<PlayerStat>, LeagueError> {
    if store.get_match(match_id)?.is_none() {
        return Err(LeagueError::NotFound(format!("match {match_id}")));
    }

    store.list_round_stats(match_id)
}

/// All matches, newest id first.
///
/// # Errors
/// Propagates store failures.
pub fn match_history<S: LeagueStore + ?Sized>(store: &S) -> Result<Vec<MatchRecord>, LeagueError> {
    let mut matches = store.list_matches()?;
    matches.sort_by(|lhs, rhs| rhs.match_id.cmp(&lhs.match_id));
    Ok(matches)
}

/// Player rows joined with their match.
///
/// # Errors
/// Propagates store failures.
pub fn load_stat_rows<S: LeagueStore + ?Sized>(store: &S) -> Result<Vec<StatRow>, LeagueError> {
    let matches = store.list_matches()?;
    let stats = store.list_player_stats()?;
    Ok(join_stats(&matches, &stats))
}

/// Ranking table for `period`, read through `store`.
///
/// # Errors
/// Propagates store failures; an empty league yields an empty table.
pub fn rankings<S: LeagueStore + ?Sized>(
    store: &S,
    period: Period,
) -> Result<Vec<RankingRecord>, LeagueError> {
    Ok(compute_rankings(&load_stat_rows(store)?, period))
}

/// Career view of one player, read through `store`.
///
/// # Errors
/// Propagates store failures.
pub fn player_history_for<S: LeagueStore + ?Sized>(
    store: &S,
    player: &str,
) -> Result<PlayerHistory, LeagueError> {
    Ok(player_history(&load_stat_rows(store)?, player))
}

/// Year-month bucket used to filter rankings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(into = "String", try_from = "String")]
pub enum Period {
    AllTime,
    Month { year: i32, month: u8 },
}

impl Period {
    #[must_use]
    pub fn of(date: Date) -> Self {
        Self::Month {
            year: date.year(),
            month: u8::from(date.month()),
        }
    }

    #[must_use]
    pub fn contains(self, date: Date) -> bool {
        match self {
            Self::AllTime => true,
            Self::Month { .. } => Self::of(date) == self,
        }
    }

    /// Parses `all` (or an empty string) and `YYYY-MM` period labels.
    ///
    /// # Errors
    /// Returns [`LeagueError::Validation`] for any other label or a month
    /// outside `01..=12`.
    pub fn parse(value: &str) -> Result<Self, LeagueError> {
        let trimmed = value.trim();
        if trimmed.is_empty() || matches!(trimmed, "all" | "all-time" | "all_time") {
            return Ok(Self::AllTime);
        }

        let invalid = || {
            LeagueError::Validation(format!("period MUST be `all` or YYYY-MM: {trimmed:?}"))
        };

        let (year_raw, month_raw) = trimmed.split_once('-').ok_or_else(invalid)?;
        if year_raw.len() != 4 || month_raw.len() != 2 {
            return Err(invalid());
        }

        let year = year_raw.parse::<i32>().map_err(|_| invalid())?;
        let month = month_raw.parse::<u8>().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }

        Ok(Self::Month { year, month })
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllTime => f.write_str("all"),
            Self::Month { year, month } => write!(f, "{year:04}-{month:02}"),
        }
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Period {
    type Error = LeagueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// A player row joined with the match it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StatRow {
    pub match_id: MatchId,
    pub date: Date,
    pub champion: Champion,
    pub player: String,
    pub team: String,
    pub goals: i64,
}

impl StatRow {
    /// Exact label match between the row's team and the match champion.
    #[must_use]
    pub fn is_title(&self) -> bool {
        self.champion.team_label() == Some(self.team.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingRecord {
    pub player: String,
    pub titles: u32,
    pub goals: i64,
    pub games: u32,
    pub average: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LeaderMetric {
    Goals,
    Titles,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct LeaderEntry {
    pub player: String,
    pub value: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct CareerTotals {
    pub goals: i64,
    pub games: u32,
    pub titles: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct GoalProgressPoint {
    pub date: Date,
    pub match_id: MatchId,
    pub goals: i64,
    pub cumulative_goals: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct HistoryEntry {
    pub date: Date,
    pub match_id: MatchId,
    pub team: String,
    pub goals: i64,
    pub champion: Champion,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PlayerHistory {
    pub player: String,
    pub totals: CareerTotals,
    /// Oldest match first.
    pub progression: Vec<GoalProgressPoint>,
    /// Newest match first.
    pub matches: Vec<HistoryEntry>,
}

/// Inner join of player rows onto their match; orphan rows are dropped.
#[must_use]
pub fn join_stats(matches: &[MatchRecord], stats: &[PlayerStat]) -> Vec<StatRow> {
    let by_id: BTreeMap<MatchId, &MatchRecord> = matches
        .iter()
        .map(|record| (record.match_id, record))
        .collect();

    stats
        .iter()
        .filter_map(|stat| {
            by_id.get(&stat.match_id).map(|record| StatRow {
                match_id: stat.match_id,
                date: record.date,
                champion: record.champion,
                player: stat.player.clone(),
                team: stat.team.clone(),
                goals: stat.goals,
            })
        })
        .collect()
}

/// Builds the ranking table for the rows that fall in `period`.
///
/// Goals, titles and games are grouped in separate passes and merged by
/// player name, absent values counting as zero. Ordering is titles desc,
/// goals desc, games asc, then name.
#[must_use]
pub fn compute_rankings(rows: &[StatRow], period: Period) -> Vec<RankingRecord> {
    let filtered: Vec<&StatRow> = rows.iter().filter(|row| period.contains(row.date)).collect();

    let mut goals: BTreeMap<&str, i64> = BTreeMap::new();
    for row in &filtered {
        *goals.entry(row.player.as_str()).or_default() += row.goals;
    }

    let mut titles: BTreeMap<&str, u32> = BTreeMap::new();
    for row in filtered.iter().filter(|row| row.is_title()) {
        *titles.entry(row.player.as_str()).or_default() += 1;
    }

    let mut games: BTreeMap<&str, u32> = BTreeMap::new();
    for row in &filtered {
        *games.entry(row.player.as_str()).or_default() += 1;
    }

    let players: BTreeSet<&str> = goals
        .keys()
        .chain(titles.keys())
        .chain(games.keys())
        .copied()
        .collect();

    let mut records: Vec<RankingRecord> = players
        .into_iter()
        .map(|player| {
            let player_goals = goals.get(player).copied().unwrap_or(0);
            let player_games = games.get(player).copied().unwrap_or(0);
            RankingRecord {
                player: player.to_string(),
                titles: titles.get(player).copied().unwrap_or(0),
                goals: player_goals,
                games: player_games,
                average: scoring_average(player_goals, player_games),
            }
        })
        .collect();

    records.sort_by(compare_ranking);
    debug!(%period, rows = filtered.len(), players = records.len(), "computed rankings");
    records
}

/// Goals per game rounded half-to-even to two decimals; zero when no games
/// were played.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn scoring_average(goals: i64, games: u32) -> f64 {
    if games == 0 {
        return 0.0;
    }

    let raw = goals as f64 / f64::from(games);
    (raw * 100.0).round_ties_even() / 100.0
}

/// Top `limit` players by goals or by titles. Players without a title are
/// left out of the titles board.
#[must_use]
pub fn leaders(records: &[RankingRecord], metric: LeaderMetric, limit: usize) -> Vec<LeaderEntry> {
    let mut entries: Vec<LeaderEntry> = records
        .iter()
        .filter_map(|record| match metric {
            LeaderMetric::Goals => Some(LeaderEntry {
                player: record.player.clone(),
                value: record.goals,
            }),
            LeaderMetric::Titles if record.titles > 0 => Some(LeaderEntry {
                player: record.player.clone(),
                value: i64::from(record.titles),
            }),
            LeaderMetric::Titles => None,
        })
        .collect();

    entries.sort_by(|lhs, rhs| {
        rhs.value
            .cmp(&lhs.value)
            .then_with(|| lhs.player.cmp(&rhs.player))
    });
    entries.truncate(limit);
    entries
}

/// Distinct year-months that have player rows, most recent first.
#[must_use]
pub fn available_periods(rows: &[StatRow]) -> Vec<Period> {
    let periods: BTreeSet<Period> = rows.iter().map(|row| Period::of(row.date)).collect();
    periods.into_iter().rev().collect()
}

#[must_use]
pub fn player_names(rows: &[StatRow]) -> Vec<String> {
    let names: BTreeSet<&str> = rows.iter().map(|row| row.player.as_str()).collect();
    names.into_iter().map(str::to_string).collect()
}

#[must_use]
pub fn player_history(rows: &[StatRow], player: &str) -> PlayerHistory {
    let mut own: Vec<&StatRow> = rows.iter().filter(|row| row.player == player).collect();
    own.sort_by(|lhs, rhs| {
        lhs.date
            .cmp(&rhs.date)
            .then_with(|| lhs.match_id.cmp(&rhs.match_id))
    });

    let mut running = 0_i64;
    let progression = own
        .iter()
        .map(|row| {
            running += row.goals;
            GoalProgressPoint {
                date: row.date,
                match_id: row.match_id,
                goals: row.goals,
                cumulative_goals: running,
            }
        })
        .collect();

    let totals = CareerTotals {
        goals: own.iter().map(|row| row.goals).sum(),
        games: u32::try_from(own.len()).unwrap_or(u32::MAX),
        titles: u32::try_from(own.iter().filter(|row| row.is_title()).count()).unwrap_or(u32::MAX),
    };

    let matches = own
        .iter()
        .rev()
        .map(|row| HistoryEntry {
            date: row.date,
            match_id: row.match_id,
            team: row.team.clone(),
            goals: row.goals,
            champion: row.champion,
        })
        .collect();

    PlayerHistory {
        player: player.to_string(),
        totals,
        progression,
        matches,
    }
}

fn compare_ranking(lhs: &RankingRecord, rhs: &RankingRecord) -> Ordering {
    rhs.titles
        .cmp(&lhs.titles)
        .then_with(|| rhs.goals.cmp(&lhs.goals))
        .then_with(|| lhs.games.cmp(&rhs.games))
        .then_with(|| lhs.player.cmp(&rhs.player))
}

/// Parses a `YYYY-MM-DD` calendar date.
///
/// # Errors
/// Returns [`LeagueError::Validation`] when parsing fails.
pub fn parse_date(value: &str) -> Result<Date, LeagueError> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|err| LeagueError::Validation(format!("invalid date {value:?}: {err}")))
}

/// Formats a date as `YYYY-MM-DD`.
///
/// # Errors
/// Returns [`LeagueError::Validation`] when formatting fails.
pub fn format_date(value: Date) -> Result<String, LeagueError> {
    value
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(|err| LeagueError::Validation(format!("failed to format date: {err}")))
}

#[must_use]
pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Vector-backed [`LeagueStore`] that enforces the same row constraints as
/// the `SQLite` schema.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLeagueStore {
    matches: Vec<MatchRecord>,
    stats: Vec<PlayerStat>,
    last_match_id: i64,
}

impl InMemoryLeagueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn contains_match(&self, match_id: MatchId) -> bool {
        self.matches.iter().any(|record| record.match_id == match_id)
    }
}

impl LeagueStore for InMemoryLeagueStore {
    fn insert_round(
        &mut self,
        result: &RoundResult,
        entries: &[RosterEntry],
    ) -> Result<MatchId, LeagueError> {
        check_entries(entries)?;

        self.last_match_id += 1;
        let match_id = MatchId(self.last_match_id);
        self.matches.push(MatchRecord {
            match_id,
            date: result.date,
            champion: result.champion,
            points: result.points,
        });
        self.stats
            .extend(entries.iter().map(|entry| stat_from_entry(match_id, entry)));

        Ok(match_id)
    }

    fn replace_round_stats(
        &mut self,
        match_id: MatchId,
        entries: &[RosterEntry],
    ) -> Result<(), LeagueError> {
        if !self.contains_match(match_id) {
            return Err(LeagueError::NotFound(format!("match {match_id}")));
        }
        check_entries(entries)?;

        self.stats.retain(|stat| stat.match_id != match_id);
        self.stats
            .extend(entries.iter().map(|entry| stat_from_entry(match_id, entry)));
        Ok(())
    }

    fn delete_round(&mut self, match_id: MatchId) -> Result<(), LeagueError> {
        if !self.contains_match(match_id) {
            return Err(LeagueError::NotFound(format!("match {match_id}")));
        }

        self.stats.retain(|stat| stat.match_id != match_id);
        self.matches.retain(|record| record.match_id != match_id);
        Ok(())
    }

    fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRecord>, LeagueError> {
        Ok(self
            .matches
            .iter()
            .find(|record| record.match_id == match_id)
            .cloned())
    }

    fn list_matches(&self) -> Result<Vec<MatchRecord>, LeagueError> {
        Ok(self.matches.clone())
    }

    fn list_player_stats(&self) -> Result<Vec<PlayerStat>, LeagueError> {
        Ok(self.stats.clone())
    }

    fn list_round_stats(&self, match_id: MatchId) -> Result<Vec<PlayerStat>, LeagueError> {
        Ok(self
            .stats
            .iter()
            .filter(|stat| stat.match_id == match_id)
            .cloned()
            .collect())
    }
}

fn check_entries(entries: &[RosterEntry]) -> Result<(), LeagueError> {
    for entry in entries {
        if entry.player.trim().is_empty() || entry.team.trim().is_empty() {
            return Err(LeagueError::Constraint(
                "player and team MUST be non-empty".to_string(),
            ));
        }
        if entry.goals < 0 {
            return Err(LeagueError::Constraint(format!(
                "goals MUST be >= 0 (player {}: {})",
                entry.player, entry.goals
            )));
        }
    }
    Ok(())
}

fn stat_from_entry(match_id: MatchId, entry: &RosterEntry) -> PlayerStat {
    PlayerStat {
        match_id,
        player: entry.player.clone(),
        team: entry.team.clone(),
        goals: entry.goals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn stat_row(
        match_id: i64,
        date: Date,
        champion: Champion,
        player: &str,
        team: &str,
        goals: i64,
    ) -> StatRow {
        StatRow {
            match_id: MatchId(match_id),
            date,
            champion,
            player: player.to_string(),
            team: team.to_string(),
            goals,
        }
    }

    fn fixture_round(raw_lines: &str) -> NewRound {
        NewRound {
            result: RoundResult {
                date: date!(2024 - 01 - 05),
                champion: Champion::Azul,
                points: Points {
                    azul: 9,
                    vermelho: 4,
                    preto: 1,
                },
            },
            raw_lines: raw_lines.to_string(),
        }
    }

    fn find<'a>(records: &'a [RankingRecord], player: &str) -> &'a RankingRecord {
        match records.iter().find(|record| record.player == player) {
            Some(record) => record,
            None => panic!("missing ranking record for {player}"),
        }
    }

    #[test]
    fn malformed_line_is_reported_not_fatal() {
        let parsed = parse_roster_lines("Ana, Azul, 2\nBad Line\nBeto, Vermelho, 1");

        assert_eq!(
            parsed.accepted,
            vec![
                RosterEntry::new("Ana", "Azul", 2),
                RosterEntry::new("Beto", "Vermelho", 1),
            ]
        );
        assert_eq!(parsed.rejected.len(), 1);
        assert_eq!(parsed.rejected[0].line_number, 2);
        assert_eq!(parsed.rejected[0].reason, RejectReason::MissingSeparator);
    }

    #[test]
    fn roster_line_rejection_reasons_are_typed() {
        assert_eq!(
            parse_roster_line("Ana, Azul"),
            Err(RejectReason::TooFewFields { found: 2 })
        );
        assert_eq!(
            parse_roster_line(" , Azul, 2"),
            Err(RejectReason::EmptyPlayer)
        );
        assert_eq!(parse_roster_line("Ana, , 2"), Err(RejectReason::EmptyTeam));
        assert_eq!(
            parse_roster_line("Ana, Azul, two"),
            Err(RejectReason::InvalidGoals {
                raw: "two".to_string()
            })
        );
        assert_eq!(
            parse_roster_line("Ana, Azul, -1"),
            Err(RejectReason::NegativeGoals { goals: -1 })
        );
    }

    #[test]
    fn extra_fields_and_whitespace_are_tolerated() {
        let entry = must_ok(parse_roster_line("  Ana  ,Azul,  3 , capitã"));
        assert_eq!(entry, RosterEntry::new("Ana", "Azul", 3));

        let parsed = parse_roster_lines("\n   \nAna, Azul, 1\r\n");
        assert_eq!(parsed.accepted.len(), 1);
        assert!(parsed.rejected.is_empty());
    }

    #[test]
    fn record_round_inserts_only_accepted_lines() {
        let mut store = InMemoryLeagueStore::new();
        let outcome = must_ok(record_round(
            &mut store,
            &fixture_round("Ana, Azul, 2\nBad Line\nBeto, Vermelho, 1"),
        ));

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.rejected.len(), 1);

        let stats = must_ok(store.list_round_stats(outcome.match_id));
        let pairs: Vec<(&str, i64)> = stats
            .iter()
            .map(|stat| (stat.player.as_str(), stat.goals))
            .collect();
        assert_eq!(pairs, vec![("Ana", 2), ("Beto", 1)]);
    }

    #[test]
    fn record_round_requires_player_lines() {
        let mut store = InMemoryLeagueStore::new();
        let result = record_round(&mut store, &fixture_round("  \n "));

        assert!(matches!(result, Err(LeagueError::Validation(_))));
        assert!(must_ok(store.list_matches()).is_empty());
    }

    #[test]
    fn edit_round_is_idempotent_and_skips_blank_rows() {
        let mut store = InMemoryLeagueStore::new();
        let recorded = must_ok(record_round(&mut store, &fixture_round("Ana, Azul, 2")));

        let rows = vec![
            RosterEntry::new("Ana", "Azul", 3),
            RosterEntry::new("", "Preto", 1),
            RosterEntry::new("Caio", "Preto", 0),
        ];

        let first = must_ok(edit_round(&mut store, recorded.match_id, &rows));
        let after_first = must_ok(store.list_round_stats(recorded.match_id));
        let second = must_ok(edit_round(&mut store, recorded.match_id, &rows));
        let after_second = must_ok(store.list_round_stats(recorded.match_id));

        assert_eq!(first.inserted, 2);
        assert_eq!(first.skipped, 1);
        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn edit_round_keeps_previous_rows_on_constraint_failure() {
        let mut store = InMemoryLeagueStore::new();
        let recorded = must_ok(record_round(&mut store, &fixture_round("Ana, Azul, 2")));
        let before = must_ok(store.list_round_stats(recorded.match_id));

        let result = edit_round(
            &mut store,
            recorded.match_id,
            &[RosterEntry::new("Ana", "Azul", -4)],
        );

        assert!(matches!(result, Err(LeagueError::Constraint(_))));
        assert_eq!(must_ok(store.list_round_stats(recorded.match_id)), before);
    }

    #[test]
    fn missing_match_is_not_found_for_edit_delete_and_show() {
        let mut store = InMemoryLeagueStore::new();

        assert!(matches!(
            edit_round(&mut store, MatchId(42), &[]),
            Err(LeagueError::NotFound(_))
        ));
        assert!(matches!(
            delete_round(&mut store, MatchId(42)),
            Err(LeagueError::NotFound(_))
        ));
        assert!(matches!(
            round_stats(&store, MatchId(42)),
            Err(LeagueError::NotFound(_))
        ));
    }

    #[test]
    fn delete_round_removes_dependent_rows() {
        let mut store = InMemoryLeagueStore::new();
        let first = must_ok(record_round(&mut store, &fixture_round("Ana, Azul, 2")));
        let second = must_ok(record_round(&mut store, &fixture_round("Beto, Preto, 1")));

        must_ok(delete_round(&mut store, first.match_id));

        assert!(must_ok(store.list_round_stats(first.match_id)).is_empty());
        assert_eq!(must_ok(store.list_player_stats()).len(), 1);
        assert_eq!(
            must_ok(match_history(&store))
                .iter()
                .map(|record| record.match_id)
                .collect::<Vec<_>>(),
            vec![second.match_id]
        );
    }

    #[test]
    fn ranking_prefers_titles_then_goals_then_fewer_games() {
        let day = date!(2024 - 03 - 02);
        let rows = vec![
            // P1: 2 titles, 5 goals, 3 games
            stat_row(1, day, Champion::Azul, "P1", "Azul", 2),
            stat_row(2, day, Champion::Azul, "P1", "Azul", 2),
            stat_row(3, day, Champion::Azul, "P1", "Preto", 1),
            // P2: 2 titles, 5 goals, 2 games
            stat_row(1, day, Champion::Azul, "P2", "Azul", 3),
            stat_row(2, day, Champion::Azul, "P2", "Azul", 2),
            // P3: 1 title, 10 goals, 1 game
            stat_row(3, day, Champion::Azul, "P3", "Azul", 10),
        ];

        let records = compute_rankings(&rows, Period::AllTime);
        let order: Vec<&str> = records.iter().map(|record| record.player.as_str()).collect();

        assert_eq!(order, vec!["P2", "P1", "P3"]);
        assert_eq!(find(&records, "P1").titles, 2);
        assert_eq!(find(&records, "P1").games, 3);
        assert_eq!(find(&records, "P3").goals, 10);
    }

    #[test]
    fn scoring_average_rounds_to_two_decimals() {
        assert!((scoring_average(7, 3) - 2.33).abs() < 1e-9);
        assert!((scoring_average(1, 8) - 0.12).abs() < 1e-9);
        assert!((scoring_average(5, 8) - 0.62).abs() < 1e-9);
        assert!((scoring_average(3, 8) - 0.38).abs() < 1e-9);
        assert!(scoring_average(0, 0).abs() < f64::EPSILON);
        assert!(scoring_average(5, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn period_filter_selects_year_month() {
        let rows = vec![
            stat_row(1, date!(2024 - 01 - 05), Champion::Azul, "Ana", "Azul", 2),
            stat_row(2, date!(2024 - 02 - 10), Champion::Preto, "Ana", "Preto", 1),
            stat_row(2, date!(2024 - 02 - 10), Champion::Preto, "Beto", "Azul", 4),
        ];

        let january = compute_rankings(&rows, must_ok(Period::parse("2024-01")));
        assert_eq!(january.len(), 1);
        assert_eq!(january[0].player, "Ana");
        assert_eq!(january[0].goals, 2);
        assert_eq!(january[0].games, 1);

        let all = compute_rankings(&rows, Period::AllTime);
        assert_eq!(all.len(), 2);
        assert_eq!(find(&all, "Ana").goals, 3);
        assert_eq!(find(&all, "Ana").titles, 2);
        assert_eq!(find(&all, "Beto").titles, 0);
    }

    #[test]
    fn tie_champion_never_counts_as_title() {
        let rows = vec![
            stat_row(1, date!(2024 - 01 - 05), Champion::Tie, "Ana", "Empate/Nenhum", 1),
            stat_row(1, date!(2024 - 01 - 05), Champion::Tie, "Beto", "Azul", 0),
        ];

        let records = compute_rankings(&rows, Period::AllTime);
        assert!(records.iter().all(|record| record.titles == 0));
        assert_eq!(player_history(&rows, "Ana").totals.titles, 0);
    }

    #[test]
    fn empty_input_yields_empty_rankings() {
        assert!(compute_rankings(&[], Period::AllTime).is_empty());
        assert!(must_ok(rankings(&InMemoryLeagueStore::new(), Period::AllTime)).is_empty());
    }

    #[test]
    fn join_drops_stats_without_a_match() {
        let matches = vec![MatchRecord {
            match_id: MatchId(1),
            date: date!(2024 - 01 - 05),
            champion: Champion::Vermelho,
            points: Points::default(),
        }];
        let stats = vec![
            PlayerStat {
                match_id: MatchId(1),
                player: "Ana".to_string(),
                team: "Vermelho".to_string(),
                goals: 1,
            },
            PlayerStat {
                match_id: MatchId(9),
                player: "Ghost".to_string(),
                team: "Azul".to_string(),
                goals: 5,
            },
        ];

        let rows = join_stats(&matches, &stats);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_title());
    }

    #[test]
    fn player_history_accumulates_goals_in_date_order() {
        let rows = vec![
            stat_row(3, date!(2024 - 02 - 10), Champion::Preto, "Ana", "Preto", 1),
            stat_row(1, date!(2024 - 01 - 05), Champion::Azul, "Ana", "Azul", 2),
            stat_row(2, date!(2024 - 01 - 20), Champion::Azul, "Ana", "Vermelho", 0),
            stat_row(2, date!(2024 - 01 - 20), Champion::Azul, "Beto", "Azul", 7),
        ];

        let history = player_history(&rows, "Ana");

        let cumulative: Vec<i64> = history
            .progression
            .iter()
            .map(|point| point.cumulative_goals)
            .collect();
        assert_eq!(cumulative, vec![2, 2, 3]);
        assert_eq!(
            history.totals,
            CareerTotals {
                goals: 3,
                games: 3,
                titles: 2,
            }
        );

        let newest_first: Vec<MatchId> = history.matches.iter().map(|row| row.match_id).collect();
        assert_eq!(newest_first, vec![MatchId(3), MatchId(2), MatchId(1)]);
    }

    #[test]
    fn unknown_player_history_is_empty() {
        let history = player_history(&[], "Nobody");
        assert_eq!(history.totals, CareerTotals::default());
        assert!(history.progression.is_empty());
        assert!(history.matches.is_empty());
    }

    #[test]
    fn periods_and_players_are_listed_for_pickers() {
        let rows = vec![
            stat_row(1, date!(2023 - 12 - 30), Champion::Azul, "Caio", "Azul", 1),
            stat_row(2, date!(2024 - 02 - 10), Champion::Azul, "Ana", "Azul", 1),
            stat_row(3, date!(2024 - 02 - 17), Champion::Azul, "Ana", "Azul", 1),
        ];

        assert_eq!(
            available_periods(&rows),
            vec![
                Period::Month {
                    year: 2024,
                    month: 2
                },
                Period::Month {
                    year: 2023,
                    month: 12
                },
            ]
        );
        assert_eq!(player_names(&rows), vec!["Ana".to_string(), "Caio".to_string()]);
    }

    #[test]
    fn leaders_rank_scorers_and_title_holders() {
        let records = vec![
            RankingRecord {
                player: "Ana".to_string(),
                titles: 0,
                goals: 9,
                games: 3,
                average: 3.0,
            },
            RankingRecord {
                player: "Beto".to_string(),
                titles: 2,
                goals: 4,
                games: 2,
                average: 2.0,
            },
            RankingRecord {
                player: "Caio".to_string(),
                titles: 1,
                goals: 4,
                games: 4,
                average: 1.0,
            },
        ];

        let scorers = leaders(&records, LeaderMetric::Goals, 2);
        assert_eq!(
            scorers,
            vec![
                LeaderEntry {
                    player: "Ana".to_string(),
                    value: 9
                },
                LeaderEntry {
                    player: "Beto".to_string(),
                    value: 4
                },
            ]
        );

        let titles = leaders(&records, LeaderMetric::Titles, 5);
        let names: Vec<&str> = titles.iter().map(|entry| entry.player.as_str()).collect();
        assert_eq!(names, vec!["Beto", "Caio"]);
    }

    #[test]
    fn period_labels_round_trip_through_serde() {
        let january = must_ok(Period::parse("2024-01"));
        assert_eq!(january.to_string(), "2024-01");
        assert_eq!(must_ok(Period::parse("all")), Period::AllTime);

        for invalid in ["2024-13", "2024-1", "24-01", "january", "2024-01-05"] {
            assert!(Period::parse(invalid).is_err(), "{invalid} should be rejected");
        }

        let encoded = must_ok(serde_json::to_string(&january));
        assert_eq!(encoded, "\"2024-01\"");
        let decoded: Period = must_ok(serde_json::from_str("\"all\""));
        assert_eq!(decoded, Period::AllTime);
    }

    #[test]
    fn champion_labels_parse_case_insensitively() {
        assert_eq!(Champion::parse("azul"), Some(Champion::Azul));
        assert_eq!(Champion::parse("Empate/Nenhum"), Some(Champion::Tie));
        assert_eq!(Champion::parse("none"), Some(Champion::Tie));
        assert_eq!(Champion::parse("Verde"), None);
        assert_eq!(Champion::Tie.team_label(), None);
        assert_eq!(
            must_ok(serde_json::to_string(&Champion::Tie)),
            "\"Empate/Nenhum\""
        );
    }

    #[test]
    fn edit_rows_require_integer_goals() {
        assert_eq!(
            must_ok(RosterEntry::parse_edit_row("Ana , Azul, 4")),
            RosterEntry::new("Ana", "Azul", 4)
        );
        assert_eq!(
            must_ok(RosterEntry::parse_edit_row(", Azul, 0")),
            RosterEntry::new("", "Azul", 0)
        );
        assert!(RosterEntry::parse_edit_row("Ana, Azul").is_err());
        assert!(RosterEntry::parse_edit_row("Ana, Azul, 1.5").is_err());
    }

    #[test]
    fn dates_parse_and_format_as_iso() {
        let parsed = must_ok(parse_date("2024-01-05"));
        assert_eq!(parsed, date!(2024 - 01 - 05));
        assert_eq!(must_ok(format_date(parsed)), "2024-01-05");
        assert!(parse_date("05/01/2024").is_err());
    }
}
