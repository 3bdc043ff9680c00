//! Command surface for the weekly league database.
//!
//! Hosts can embed the CLI through:
//! - [`run_cli`] for full parsed CLI execution.
//! - [`run_command`] for direct [`Command`] execution against an open
//!   [`SqliteLeagueStore`].

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use league_stats_core::{
    available_periods, delete_round, edit_round, leaders, load_stat_rows, match_history,
    parse_date, player_history_for, player_names, rankings, record_round, today_utc,
    Champion, EditOutcome, LeaderEntry, LeaderMetric, LeagueError, LeagueStore,
    MatchId, MatchRecord, NewRound, Period, PlayerHistory, PlayerStat, Points, RankingRecord,
    RecordOutcome, RosterEntry, RoundResult,
};
use league_stats_store_sqlite::SqliteLeagueStore;
use serde::Serialize;
use time::Date;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "league")]
#[command(about = "Weekly league results, rankings and player history")]
pub struct Cli {
    #[arg(long, env = "LEAGUE_DB", default_value = "./league.sqlite3")]
    db: PathBuf,

    /// `tracing` filter directive for stderr logs.
    #[arg(long, env = "LEAGUE_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record, correct, delete and inspect rounds.
    Round {
        #[command(subcommand)]
        command: Box<RoundCommand>,
    },
    /// Ranking table, all-time or for one month.
    Rankings(RankingsArgs),
    /// Top scorers or title holders.
    Leaders(LeadersArgs),
    /// Months that have recorded stats.
    Periods(OutputArgs),
    /// Every player name on record.
    Players(OutputArgs),
    /// Per-player views.
    Player {
        #[command(subcommand)]
        command: Box<PlayerCommand>,
    },
}

#[derive(Debug, Subcommand)]
pub enum RoundCommand {
    /// Record a round from roster lines.
    Record(RecordArgs),
    /// Replace every player row of a round.
    Edit(EditArgs),
    /// Delete a round and its player rows.
    Delete(MatchArgs),
    /// Show a round with its player rows.
    Show(ShowArgs),
    /// List rounds, newest first.
    List(OutputArgs),
}

#[derive(Debug, Subcommand)]
pub enum PlayerCommand {
    /// Career totals and match history of one player.
    History(HistoryArgs),
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    #[arg(long, value_parser = parse_date_arg)]
    date: Option<Date>,
    #[arg(long, default_value_t = 0)]
    azul: u32,
    #[arg(long, default_value_t = 0)]
    vermelho: u32,
    #[arg(long, default_value_t = 0)]
    preto: u32,
    #[arg(long, value_parser = parse_champion_arg)]
    champion: Champion,
    /// Roster line in `Name, Team, Goals` form; repeatable.
    #[arg(long = "player")]
    players: Vec<String>,
    /// File with one roster line per row.
    #[arg(long)]
    lines_file: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    #[arg(long)]
    match_id: i64,
    /// Replacement row in `Name, Team, Goals` form; repeatable.
    #[arg(long = "row")]
    rows: Vec<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct MatchArgs {
    #[arg(long)]
    match_id: i64,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(long)]
    match_id: i64,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct RankingsArgs {
    #[arg(long, value_parser = parse_period_arg, default_value = "all")]
    period: Period,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct LeadersArgs {
    #[arg(long)]
    metric: LeaderMetricArg,
    #[arg(long, default_value_t = 5)]
    limit: usize,
    #[arg(long, value_parser = parse_period_arg, default_value = "all")]
    period: Period,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LeaderMetricArg {
    Goals,
    Titles,
}

#[derive(Debug, Serialize)]
struct RoundView<'a> {
    #[serde(rename = "match")]
    record: &'a MatchRecord,
    stats: &'a [PlayerStat],
}

#[derive(Debug, Serialize)]
struct RankingsView<'a> {
    period: Period,
    rankings: &'a [RankingRecord],
}

#[derive(Debug, Serialize)]
struct LeadersView<'a> {
    metric: LeaderMetric,
    period: Period,
    leaders: &'a [LeaderEntry],
}

/// Installs the stderr `tracing` subscriber using `--log-level`.
///
/// # Errors
/// Returns an error when the filter does not parse or a global subscriber is
/// already installed.
pub fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log filter {:?}", cli.log_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("failed to initialise logging: {err}"))
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when the store cannot be opened or migrated, or the
/// command fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let mut store = SqliteLeagueStore::open(&cli.db)
        .with_context(|| format!("failed to open league database {}", cli.db.display()))?;
    store.migrate()?;
    run_command(cli.command, &mut store)
}

/// Executes a parsed command against an existing store handle.
///
/// # Errors
/// Returns an error when input validation, persistence, or rendering fails.
pub fn run_command(command: Command, store: &mut SqliteLeagueStore) -> Result<()> {
    match command {
        Command::Round { command } => run_round(*command, store),
        Command::Rankings(args) => {
            let records = rankings(store, args.period)?;
            if args.json {
                print_json(&RankingsView {
                    period: args.period,
                    rankings: &records,
                })
            } else {
                print_rankings_table(args.period, &records);
                Ok(())
            }
        }
        Command::Leaders(args) => {
            let metric = map_metric(args.metric);
            let records = rankings(store, args.period)?;
            let board = leaders(&records, metric, args.limit);
            if args.json {
                print_json(&LeadersView {
                    metric,
                    period: args.period,
                    leaders: &board,
                })
            } else {
                print_leaders_table(metric, &board);
                Ok(())
            }
        }
        Command::Periods(args) => {
            let periods = available_periods(&load_stat_rows(store)?);
            if args.json {
                print_json(&periods)
            } else {
                println!("{}", Period::AllTime);
                for period in periods {
                    println!("{period}");
                }
                Ok(())
            }
        }
        Command::Players(args) => {
            let names = player_names(&load_stat_rows(store)?);
            if args.json {
                print_json(&names)
            } else {
                for name in names {
                    println!("{name}");
                }
                Ok(())
            }
        }
        Command::Player { command } => match *command {
            PlayerCommand::History(args) => {
                let history = player_history_for(store, args.name.trim())?;
                if args.json {
                    print_json(&history)
                } else {
                    print_player_history(&history);
                    Ok(())
                }
            }
        },
    }
}

fn run_round(command: RoundCommand, store: &mut SqliteLeagueStore) -> Result<()> {
    match command {
        RoundCommand::Record(args) => {
            let round = NewRound {
                result: RoundResult {
                    date: args.date.unwrap_or_else(today_utc),
                    champion: args.champion,
                    points: Points {
                        azul: args.azul,
                        vermelho: args.vermelho,
                        preto: args.preto,
                    },
                },
                raw_lines: collect_roster_text(&args.players, args.lines_file.as_deref())?,
            };

            let outcome = record_round(store, &round)?;
            if args.json {
                print_json(&outcome)
            } else {
                print_record_outcome(&outcome);
                Ok(())
            }
        }
        RoundCommand::Edit(args) => {
            let rows = args
                .rows
                .iter()
                .map(|raw| RosterEntry::parse_edit_row(raw.as_str()))
                .collect::<Result<Vec<_>, LeagueError>>()?;

            let outcome = edit_round(store, MatchId(args.match_id), &rows)?;
            if args.json {
                print_json(&outcome)
            } else {
                print_edit_outcome(&outcome);
                Ok(())
            }
        }
        RoundCommand::Delete(args) => {
            let match_id = MatchId(args.match_id);
            delete_round(store, match_id)?;
            println!("deleted match {match_id}");
            Ok(())
        }
        RoundCommand::Show(args) => {
            let match_id = MatchId(args.match_id);
            let record = store
                .get_match(match_id)?
                .ok_or_else(|| LeagueError::NotFound(format!("match {match_id}")))?;
            let stats = store.list_round_stats(match_id)?;
            if args.json {
                print_json(&RoundView {
                    record: &record,
                    stats: &stats,
                })
            } else {
                print_round(&record, &stats);
                Ok(())
            }
        }
        RoundCommand::List(args) => {
            let matches = match_history(store)?;
            if args.json {
                print_json(&matches)
            } else {
                print_match_table(&matches);
                Ok(())
            }
        }
    }
}

fn collect_roster_text(players: &[String], lines_file: Option<&Path>) -> Result<String> {
    let mut lines: Vec<String> = players.to_vec();

    if let Some(path) = lines_file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read roster file {}", path.display()))?;
        debug!(path = %path.display(), "read roster file");
        lines.extend(contents.lines().map(str::to_string));
    }

    Ok(lines.join("\n"))
}

fn parse_date_arg(raw: &str) -> std::result::Result<Date, String> {
    parse_date(raw).map_err(|err| err.to_string())
}

fn parse_period_arg(raw: &str) -> std::result::Result<Period, String> {
    Period::parse(raw).map_err(|err| err.to_string())
}

fn parse_champion_arg(raw: &str) -> std::result::Result<Champion, String> {
    Champion::parse(raw).ok_or_else(|| {
        format!(
            "unknown champion {raw:?}; expected one of {}",
            Champion::ALL.map(Champion::as_str).join(", ")
        )
    })
}

fn map_metric(value: LeaderMetricArg) -> LeaderMetric {
    match value {
        LeaderMetricArg::Goals => LeaderMetric::Goals,
        LeaderMetricArg::Titles => LeaderMetric::Titles,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_record_outcome(outcome: &RecordOutcome) {
    println!(
        "match_id={} inserted={} rejected={}",
        outcome.match_id,
        outcome.inserted,
        outcome.rejected.len()
    );
    for rejection in &outcome.rejected {
        println!(
            "  line {}: {} ({:?})",
            rejection.line_number, rejection.reason, rejection.line
        );
    }
}

fn print_edit_outcome(outcome: &EditOutcome) {
    println!(
        "match_id={} inserted={} skipped={}",
        outcome.match_id, outcome.inserted, outcome.skipped
    );
}

fn print_round(record: &MatchRecord, stats: &[PlayerStat]) {
    println!(
        "match {} on {} champion={} azul={} vermelho={} preto={}",
        record.match_id,
        record.date,
        record.champion,
        record.points.azul,
        record.points.vermelho,
        record.points.preto
    );
    println!("{:<24} {:<12} {:>5}", "player", "team", "goals");
    println!("{}", "-".repeat(43));
    for stat in stats {
        println!("{:<24} {:<12} {:>5}", stat.player, stat.team, stat.goals);
    }
}

fn print_match_table(matches: &[MatchRecord]) {
    println!(
        "{:<8} {:<10} {:<14} {:>5} {:>8} {:>5}",
        "match_id", "date", "champion", "azul", "vermelho", "preto"
    );
    println!("{}", "-".repeat(55));
    for record in matches {
        println!(
            "{:<8} {:<10} {:<14} {:>5} {:>8} {:>5}",
            record.match_id,
            record.date,
            record.champion,
            record.points.azul,
            record.points.vermelho,
            record.points.preto
        );
    }
}

fn print_rankings_table(period: Period, records: &[RankingRecord]) {
    println!("period: {period}");
    if records.is_empty() {
        println!("no stats recorded");
        return;
    }

    println!(
        "{:<4} {:<24} {:>6} {:>6} {:>6} {:>8}",
        "rank", "player", "titles", "goals", "games", "average"
    );
    println!("{}", "-".repeat(60));
    for (index, record) in records.iter().enumerate() {
        println!(
            "{:<4} {:<24} {:>6} {:>6} {:>6} {:>8.2}",
            index + 1,
            record.player,
            record.titles,
            record.goals,
            record.games,
            record.average
        );
    }
}

fn print_leaders_table(metric: LeaderMetric, entries: &[LeaderEntry]) {
    let label = match metric {
        LeaderMetric::Goals => "goals",
        LeaderMetric::Titles => "titles",
    };
    println!("{:<24} {:>6}", "player", label);
    println!("{}", "-".repeat(31));
    for entry in entries {
        println!("{:<24} {:>6}", entry.player, entry.value);
    }
}

fn print_player_history(history: &PlayerHistory) {
    println!(
        "player={} goals={} games={} titles={}",
        history.player, history.totals.goals, history.totals.games, history.totals.titles
    );
    if history.matches.is_empty() {
        return;
    }

    println!(
        "{:<10} {:<8} {:<12} {:>5} {:<14}",
        "date", "match_id", "team", "goals", "champion"
    );
    println!("{}", "-".repeat(53));
    for entry in &history.matches {
        println!(
            "{:<10} {:<8} {:<12} {:>5} {:<14}",
            entry.date, entry.match_id, entry.team, entry.goals, entry.champion
        );
    }

    let progression = history
        .progression
        .iter()
        .map(|point| format!("{}:{}", point.date, point.cumulative_goals))
        .collect::<Vec<_>>();
    println!("cumulative_goals={}", progression.join(" "));
}
