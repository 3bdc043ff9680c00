#![allow(clippy::missing_errors_doc)]

use std::path::Path;

use league_stats_core::{
    format_date, parse_date, Champion, LeagueError, LeagueStore, MatchId, MatchRecord, PlayerStat,
    Points, RosterEntry, RoundResult,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};

const LEAGUE_MIGRATION_VERSION: i64 = 1;

const SCHEMA_LEAGUE_V1: &str = r"
CREATE TABLE IF NOT EXISTS matches (
  match_id INTEGER PRIMARY KEY AUTOINCREMENT,
  played_on TEXT NOT NULL,
  champion TEXT NOT NULL CHECK (
    champion IN ('Azul', 'Vermelho', 'Preto', 'Empate/Nenhum')
  ),
  points_azul INTEGER NOT NULL CHECK (points_azul >= 0),
  points_vermelho INTEGER NOT NULL CHECK (points_vermelho >= 0),
  points_preto INTEGER NOT NULL CHECK (points_preto >= 0)
);

CREATE INDEX IF NOT EXISTS idx_matches_played_on
  ON matches(played_on, match_id);

CREATE TABLE IF NOT EXISTS player_stats (
  stat_id INTEGER PRIMARY KEY AUTOINCREMENT,
  match_id INTEGER NOT NULL,
  player TEXT NOT NULL CHECK (length(trim(player)) > 0),
  team TEXT NOT NULL CHECK (length(trim(team)) > 0),
  goals INTEGER NOT NULL CHECK (goals >= 0),
  FOREIGN KEY (match_id) REFERENCES matches(match_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_player_stats_match
  ON player_stats(match_id, stat_id);
CREATE INDEX IF NOT EXISTS idx_player_stats_player
  ON player_stats(player);
";

const SELECT_MATCH_COLUMNS: &str =
    "SELECT match_id, played_on, champion, points_azul, points_vermelho, points_preto FROM matches";

pub struct SqliteLeagueStore {
    conn: Connection,
}

impl SqliteLeagueStore {
    pub fn open(path: &Path) -> Result<Self, LeagueError> {
        let conn = Connection::open(path).store_context(&format!(
            "failed to open sqlite database at {}",
            path.display()
        ))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .store_context("failed to configure sqlite pragmas")?;

        debug!(path = %path.display(), "opened league database");
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<(), LeagueError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .store_context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_LEAGUE_V1)
            .store_context("failed to apply league schema")?;

        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| LeagueError::Store(format!("failed to format timestamp: {err}")))?;
        let applied = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![LEAGUE_MIGRATION_VERSION, now],
            )
            .store_context("failed to register league schema migration")?;

        if applied > 0 {
            info!(version = LEAGUE_MIGRATION_VERSION, "applied league schema");
        }

        Ok(())
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl LeagueStore for SqliteLeagueStore {
    fn insert_round(
        &mut self,
        result: &RoundResult,
        entries: &[RosterEntry],
    ) -> Result<MatchId, LeagueError> {
        let played_on = format_date(result.date)?;

        let tx = self
            .conn
            .transaction()
            .store_context("failed to start round transaction")?;

        tx.execute(
            "INSERT INTO matches(
                played_on, champion, points_azul, points_vermelho, points_preto
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                played_on,
                result.champion.as_str(),
                i64::from(result.points.azul),
                i64::from(result.points.vermelho),
                i64::from(result.points.preto),
            ],
        )
        .store_context("failed to insert match")?;

        let match_id = MatchId(tx.last_insert_rowid());
        insert_stats(&tx, match_id, entries)?;
        tx.commit()
            .store_context("failed to commit round transaction")?;

        debug!(%match_id, rows = entries.len(), "inserted round");
        Ok(match_id)
    }

    fn replace_round_stats(
        &mut self,
        match_id: MatchId,
        entries: &[RosterEntry],
    ) -> Result<(), LeagueError> {
        let tx = self
            .conn
            .transaction()
            .store_context("failed to start edit transaction")?;

        ensure_match_exists(&tx, match_id)?;
        let removed = tx
            .execute(
                "DELETE FROM player_stats WHERE match_id = ?1",
                params![match_id.0],
            )
            .store_context("failed to clear player stats")?;
        insert_stats(&tx, match_id, entries)?;
        tx.commit()
            .store_context("failed to commit edit transaction")?;

        debug!(%match_id, removed, inserted = entries.len(), "replaced player stats");
        Ok(())
    }

    fn delete_round(&mut self, match_id: MatchId) -> Result<(), LeagueError> {
        let tx = self
            .conn
            .transaction()
            .store_context("failed to start delete transaction")?;

        ensure_match_exists(&tx, match_id)?;
        tx.execute(
            "DELETE FROM player_stats WHERE match_id = ?1",
            params![match_id.0],
        )
        .store_context("failed to delete player stats")?;
        tx.execute("DELETE FROM matches WHERE match_id = ?1", params![match_id.0])
            .store_context("failed to delete match")?;
        tx.commit()
            .store_context("failed to commit delete transaction")?;

        Ok(())
    }

    fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRecord>, LeagueError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_MATCH_COLUMNS} WHERE match_id = ?1"))
            .store_context("failed to prepare match lookup")?;

        stmt.query_row(params![match_id.0], parse_match_row)
            .optional()
            .store_context("failed to load match")
    }

    fn list_matches(&self) -> Result<Vec<MatchRecord>, LeagueError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_MATCH_COLUMNS} ORDER BY match_id ASC"))
            .store_context("failed to prepare match listing")?;

        let rows = stmt
            .query_map([], parse_match_row)
            .store_context("failed to list matches")?;
        collect_rows(rows)
    }

    fn list_player_stats(&self) -> Result<Vec<PlayerStat>, LeagueError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT match_id, player, team, goals
                 FROM player_stats
                 ORDER BY stat_id ASC",
            )
            .store_context("failed to prepare player stat listing")?;

        let rows = stmt
            .query_map([], parse_stat_row)
            .store_context("failed to list player stats")?;
        collect_rows(rows)
    }

    fn list_round_stats(&self, match_id: MatchId) -> Result<Vec<PlayerStat>, LeagueError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT match_id, player, team, goals
                 FROM player_stats
                 WHERE match_id = ?1
                 ORDER BY stat_id ASC",
            )
            .store_context("failed to prepare round stat listing")?;

        let rows = stmt
            .query_map(params![match_id.0], parse_stat_row)
            .store_context("failed to list round stats")?;
        collect_rows(rows)
    }
}

trait StoreContext<T> {
    fn store_context(self, action: &str) -> Result<T, LeagueError>;
}

impl<T> StoreContext<T> for rusqlite::Result<T> {
    fn store_context(self, action: &str) -> Result<T, LeagueError> {
        self.map_err(|err| classify_sql_error(action, &err))
    }
}

fn classify_sql_error(action: &str, err: &rusqlite::Error) -> LeagueError {
    match err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            LeagueError::Constraint(format!("{action}: {err}"))
        }
        _ => LeagueError::Store(format!("{action}: {err}")),
    }
}

fn insert_stats(
    conn: &Connection,
    match_id: MatchId,
    entries: &[RosterEntry],
) -> Result<(), LeagueError> {
    let mut stmt = conn
        .prepare(
            "INSERT INTO player_stats(match_id, player, team, goals)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .store_context("failed to prepare player stat insert")?;

    for entry in entries {
        stmt.execute(params![match_id.0, entry.player, entry.team, entry.goals])
            .store_context(&format!("failed to insert player stat for {}", entry.player))?;
    }

    Ok(())
}

fn ensure_match_exists(conn: &Connection, match_id: MatchId) -> Result<(), LeagueError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM matches WHERE match_id = ?1 LIMIT 1",
            params![match_id.0],
            |_| Ok(()),
        )
        .optional()
        .store_context("failed to query matches")?
        .is_some();

    if !exists {
        return Err(LeagueError::NotFound(format!("match {match_id}")));
    }

    Ok(())
}

fn parse_match_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MatchRecord> {
    let played_on: String = row.get(1)?;
    let champion_raw: String = row.get(2)?;
    let champion = Champion::parse(&champion_raw)
        .ok_or_else(|| invalid_column(2, format!("invalid champion: {champion_raw}")))?;

    Ok(MatchRecord {
        match_id: MatchId(row.get(0)?),
        date: parse_date(&played_on).map_err(|err| invalid_column(1, err.to_string()))?,
        champion,
        points: Points {
            azul: points_column(row, 3)?,
            vermelho: points_column(row, 4)?,
            preto: points_column(row, 5)?,
        },
    })
}

fn parse_stat_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlayerStat> {
    Ok(PlayerStat {
        match_id: MatchId(row.get(0)?),
        player: row.get(1)?,
        team: row.get(2)?,
        goals: row.get(3)?,
    })
}

fn points_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<u32> {
    let raw: i64 = row.get(index)?;
    u32::try_from(raw).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Integer,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid points value: {raw}"),
            )),
        )
    })
}

fn invalid_column(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>, LeagueError> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row.store_context("failed to decode row")?);
    }
    Ok(values)
}
