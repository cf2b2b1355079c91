use crate::race_log::{Keystroke, RaceLog, Transition};
use chrono::NaiveDateTime;
use log::error;
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Speed and accuracy of one race, from the race history pages.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceSummary {
    pub user_id: i64,
    pub race_date: NaiveDateTime,
    pub race_id: i64,
    pub wpm: i64,
    pub accuracy: f64,
}

/// Persistence used by the scrapers. A race's keystrokes are written as one
/// unit: either all rows land or none do.
pub trait Store {
    fn user_exists_or_create(&mut self, username: &str) -> Result<i64>;
    /// Record a race text. Inserting a known `text_id` again is a no-op.
    fn text_upsert(&mut self, text_id: i64, raw_text: &str) -> Result<()>;
    fn keystrokes_exist(&self, user_id: i64, text_id: i64, race_id: i64) -> Result<bool>;
    /// Whether any text has keystrokes for this race; lets us skip the fetch.
    fn race_recorded(&self, user_id: i64, race_id: i64) -> Result<bool>;
    fn bulk_insert_keystrokes(&mut self, log: &RaceLog) -> Result<usize>;
    fn keystroke_count(&self, user_id: i64, text_id: i64, race_id: i64) -> Result<usize>;
    /// Insert history rows, ignoring races already stored. Returns rows added.
    fn insert_race_summaries(&mut self, rows: &[RaceSummary]) -> Result<usize>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS texts (
    text_id INTEGER PRIMARY KEY,
    raw_text TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS keystrokes (
    text_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL REFERENCES users(user_id),
    race_date TEXT NOT NULL,
    race_id INTEGER NOT NULL,
    seq_index INTEGER NOT NULL,
    ch_index INTEGER NOT NULL,
    ch TEXT NOT NULL,
    ms INTEGER NOT NULL,
    forward BOOLEAN NOT NULL,
    PRIMARY KEY (user_id, text_id, race_id, seq_index)
);

CREATE INDEX IF NOT EXISTS idx_keystrokes_user_race ON keystrokes(user_id, race_id);

CREATE VIEW IF NOT EXISTS keystroke_transitions AS
SELECT k.text_id, k.user_id, k.race_date, k.race_id,
       p.ch AS ch_prev, k.ch, k.ms, p.forward AS forward_prev, k.forward,
       k.ch_index, k.seq_index
FROM keystrokes k
JOIN keystrokes p
  ON p.user_id = k.user_id
 AND p.text_id = k.text_id
 AND p.race_id = k.race_id
 AND p.seq_index = k.seq_index - 1;

CREATE TABLE IF NOT EXISTS wpm (
    user_id INTEGER NOT NULL REFERENCES users(user_id),
    race_date TEXT NOT NULL,
    race_id INTEGER NOT NULL,
    wpm INTEGER NOT NULL,
    accuracy REAL NOT NULL,
    PRIMARY KEY (user_id, race_id)
);
"#;

/// SQLite-backed store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    rusqlite::Error::SqliteFailure(
                        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                        Some(format!("Failed to create directory: {}", e)),
                    )
                })?;
            }
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn insert_keystrokes_tx(&mut self, log: &RaceLog) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let race_date = log.race_date.format(DATE_FORMAT).to_string();
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO keystrokes
                (text_id, user_id, race_date, race_id, seq_index, ch_index, ch, ms, forward)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            for k in &log.keystrokes {
                stmt.execute(params![
                    log.text_id,
                    log.user_id,
                    race_date,
                    log.race_id,
                    k.seq_index as i64,
                    k.ch_index,
                    k.ch,
                    k.ms,
                    k.forward,
                ])?;
            }
        }
        tx.commit()?;
        Ok(log.keystrokes.len())
    }

    /// Keystrokes of a race in replay order.
    pub fn keystrokes(&self, user_id: i64, text_id: i64, race_id: i64) -> Result<Vec<Keystroke>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT seq_index, ch_index, ch, ms, forward
            FROM keystrokes
            WHERE user_id = ?1 AND text_id = ?2 AND race_id = ?3
            ORDER BY seq_index
            "#,
        )?;
        let rows = stmt.query_map(params![user_id, text_id, race_id], |row| {
            Ok(Keystroke {
                seq_index: row.get::<_, i64>(0)? as usize,
                ch_index: row.get(1)?,
                ch: row.get(2)?,
                ms: row.get(3)?,
                forward: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    /// Transitions of a race, read through the `keystroke_transitions` view.
    pub fn transitions(&self, user_id: i64, race_id: i64) -> Result<Vec<Transition>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT ch_prev, ch, ms, forward_prev, forward, ch_index, seq_index
            FROM keystroke_transitions
            WHERE user_id = ?1 AND race_id = ?2
            ORDER BY seq_index
            "#,
        )?;
        let rows = stmt.query_map(params![user_id, race_id], |row| {
            Ok(Transition {
                ch_prev: row.get(0)?,
                ch: row.get(1)?,
                ms: row.get(2)?,
                forward_prev: row.get(3)?,
                forward: row.get(4)?,
                ch_index: row.get(5)?,
                seq_index: row.get::<_, i64>(6)? as usize,
            })
        })?;
        rows.collect()
    }

    pub fn text(&self, text_id: i64) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT raw_text FROM texts WHERE text_id = ?1",
                [text_id],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn summary_count(&self, user_id: i64) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM wpm WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

impl Store for SqliteStore {
    fn user_exists_or_create(&mut self, username: &str) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT user_id FROM users WHERE username = ?1",
                [username],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn
            .execute("INSERT INTO users (username) VALUES (?1)", [username])?;
        Ok(self.conn.last_insert_rowid())
    }

    fn text_upsert(&mut self, text_id: i64, raw_text: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO texts (text_id, raw_text) VALUES (?1, ?2)",
            params![text_id, raw_text],
        )?;
        Ok(())
    }

    fn keystrokes_exist(&self, user_id: i64, text_id: i64, race_id: i64) -> Result<bool> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM keystrokes WHERE user_id = ?1 AND text_id = ?2 AND race_id = ?3)",
            params![user_id, text_id, race_id],
            |row| row.get(0),
        )
    }

    fn race_recorded(&self, user_id: i64, race_id: i64) -> Result<bool> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM keystrokes WHERE user_id = ?1 AND race_id = ?2)",
            params![user_id, race_id],
            |row| row.get(0),
        )
    }

    fn bulk_insert_keystrokes(&mut self, log: &RaceLog) -> Result<usize> {
        let result = self.insert_keystrokes_tx(log);
        if let Err(ref e) = result {
            error!(
                "write of race {} for user {} failed, rolled back: {e}",
                log.race_id, log.user_id
            );
        }
        result
    }

    fn keystroke_count(&self, user_id: i64, text_id: i64, race_id: i64) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM keystrokes WHERE user_id = ?1 AND text_id = ?2 AND race_id = ?3",
            params![user_id, text_id, race_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn insert_race_summaries(&mut self, rows: &[RaceSummary]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut added = 0;
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT OR IGNORE INTO wpm (user_id, race_date, race_id, wpm, accuracy)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for r in rows {
                added += stmt.execute(params![
                    r.user_id,
                    r.race_date.format(DATE_FORMAT).to_string(),
                    r.race_id,
                    r.wpm,
                    r.accuracy,
                ])?;
            }
        }
        tx.commit()?;
        Ok(added)
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Vec<String>,
    pub texts: HashMap<i64, String>,
    keystrokes: BTreeMap<(i64, i64, i64), RaceLog>,
    pub summaries: BTreeMap<(i64, i64), RaceSummary>,
    /// When set, every write fails like a read-only database would.
    pub fail_writes: bool,
    pub bulk_writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_READONLY),
                Some("writes disabled".to_string()),
            ));
        }
        Ok(())
    }

    pub fn race_log(&self, user_id: i64, text_id: i64, race_id: i64) -> Option<&RaceLog> {
        self.keystrokes.get(&(user_id, text_id, race_id))
    }

    pub fn race_count(&self) -> usize {
        self.keystrokes.len()
    }
}

impl Store for MemoryStore {
    fn user_exists_or_create(&mut self, username: &str) -> Result<i64> {
        if let Some(i) = self.users.iter().position(|u| u == username) {
            return Ok(i as i64 + 1);
        }
        self.check_writable()?;
        self.users.push(username.to_string());
        Ok(self.users.len() as i64)
    }

    fn text_upsert(&mut self, text_id: i64, raw_text: &str) -> Result<()> {
        self.check_writable()?;
        self.texts
            .entry(text_id)
            .or_insert_with(|| raw_text.to_string());
        Ok(())
    }

    fn keystrokes_exist(&self, user_id: i64, text_id: i64, race_id: i64) -> Result<bool> {
        Ok(self.keystrokes.contains_key(&(user_id, text_id, race_id)))
    }

    fn race_recorded(&self, user_id: i64, race_id: i64) -> Result<bool> {
        Ok(self
            .keystrokes
            .keys()
            .any(|&(u, _, r)| u == user_id && r == race_id))
    }

    fn bulk_insert_keystrokes(&mut self, log: &RaceLog) -> Result<usize> {
        self.check_writable()?;
        let key = (log.user_id, log.text_id, log.race_id);
        if self.keystrokes.contains_key(&key) {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
                Some("keystrokes already stored for race".to_string()),
            ));
        }
        self.keystrokes.insert(key, log.clone());
        self.bulk_writes += 1;
        Ok(log.keystrokes.len())
    }

    fn keystroke_count(&self, user_id: i64, text_id: i64, race_id: i64) -> Result<usize> {
        Ok(self
            .race_log(user_id, text_id, race_id)
            .map(|l| l.keystrokes.len())
            .unwrap_or(0))
    }

    fn insert_race_summaries(&mut self, rows: &[RaceSummary]) -> Result<usize> {
        self.check_writable()?;
        let mut added = 0;
        for r in rows {
            if let std::collections::btree_map::Entry::Vacant(e) =
                self.summaries.entry((r.user_id, r.race_id))
            {
                e.insert(r.clone());
                added += 1;
            }
        }
        Ok(added)
    }
}
