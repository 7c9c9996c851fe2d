use super::{ColumnInfo, ShowSession, ShowStore, StoreDiagnostics};
use crate::constants::SHOWS_TABLE;
use crate::error::{CrawlerError, Result};
use crate::types::{NewShow, ShowId, ShowKey, StoredShow};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS shows (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        artist      TEXT NOT NULL,
        tag         TEXT,
        city        TEXT,
        venue       TEXT,
        lineup      TEXT,
        date        TEXT NOT NULL,
        price       TEXT,
        status      TEXT,
        detail_url  TEXT,
        poster      TEXT,
        created_at  TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS ix_shows_id ON shows (id);
    CREATE INDEX IF NOT EXISTS ix_shows_match_key ON shows (artist, date, city, venue);
"#;

const SHOW_COLUMNS: &str =
    "id, name, artist, tag, city, venue, lineup, date, price, status, detail_url, poster, created_at";

const DATE_COLUMN_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_COLUMN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite-backed show table. One connection, serialized behind a mutex.
pub struct SqliteShowStore {
    conn: Mutex<Connection>,
}

impl SqliteShowStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened show database at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CrawlerError::StoreState("show database connection poisoned".into()))
    }
}

impl ShowStore for SqliteShowStore {
    fn begin(&self) -> Result<Box<dyn ShowSession + '_>> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        debug!("Opened show transaction");
        Ok(Box::new(SqliteSession {
            conn,
            finished: false,
        }))
    }

    fn shows_for_artist(&self, artist: &str) -> Result<Vec<StoredShow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SHOW_COLUMNS} FROM shows WHERE artist = ?1 ORDER BY date, id"
        ))?;
        let rows = stmt.query_map(params![artist], row_to_show)?;
        let mut shows = Vec::new();
        for row in rows {
            shows.push(row?);
        }
        Ok(shows)
    }

    fn diagnostics(&self) -> Result<StoreDiagnostics> {
        let conn = self.lock()?;
        let result: i64 = conn.query_row("SELECT 1", [], |r| r.get(0))?;
        let version: String = conn.query_row("SELECT sqlite_version()", [], |r| r.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let tables = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut shows_columns = Vec::new();
        if tables.iter().any(|t| t == SHOWS_TABLE) {
            let mut stmt = conn.prepare("PRAGMA table_info(shows)")?;
            let columns = stmt.query_map([], |r| {
                Ok(ColumnInfo {
                    name: r.get(1)?,
                    column_type: r.get(2)?,
                })
            })?;
            for column in columns {
                shows_columns.push(column?);
            }
        }

        Ok(StoreDiagnostics {
            result,
            version,
            tables,
            shows_columns,
        })
    }
}

struct SqliteSession<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl ShowSession for SqliteSession<'_> {
    fn find_by_key(&mut self, key: &ShowKey) -> Result<Option<StoredShow>> {
        let show = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SHOW_COLUMNS} FROM shows
                     WHERE artist = ?1 AND date = ?2 AND city = ?3 AND venue = ?4
                     ORDER BY id LIMIT 1"
                ),
                params![
                    key.artist,
                    key.date.format(DATE_COLUMN_FORMAT).to_string(),
                    key.city,
                    key.venue
                ],
                row_to_show,
            )
            .optional()?;
        Ok(show)
    }

    fn add(&mut self, show: &NewShow) -> Result<ShowId> {
        let created_at = Utc::now().naive_utc().format(TIMESTAMP_COLUMN_FORMAT).to_string();
        self.conn.execute(
            "INSERT INTO shows (name, artist, tag, city, venue, lineup, date, price, status, detail_url, poster, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                show.name,
                show.artist,
                show.tag,
                show.city,
                show.venue,
                show.lineup,
                show.date.format(DATE_COLUMN_FORMAT).to_string(),
                show.price,
                show.status,
                show.detail_url,
                show.poster,
                created_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn delete(&mut self, id: ShowId) -> Result<()> {
        let affected = self.conn.execute("DELETE FROM shows WHERE id = ?1", params![id])?;
        if affected == 0 {
            warn!("Delete of show {} matched no rows", id);
        }
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for SqliteSession<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("Rollback of abandoned show transaction failed: {}", e);
            }
        }
    }
}

fn row_to_show(row: &Row<'_>) -> rusqlite::Result<StoredShow> {
    let date: String = row.get(7)?;
    let created_at: String = row.get(12)?;
    Ok(StoredShow {
        id: row.get(0)?,
        name: row.get(1)?,
        artist: row.get(2)?,
        tag: row.get(3)?,
        city: row.get(4)?,
        venue: row.get(5)?,
        lineup: row.get(6)?,
        date: NaiveDate::parse_from_str(&date, DATE_COLUMN_FORMAT).map_err(|e| conversion(7, e))?,
        price: row.get(8)?,
        status: row.get(9)?,
        detail_url: row.get(10)?,
        poster: row.get(11)?,
        created_at: NaiveDateTime::parse_from_str(&created_at, TIMESTAMP_COLUMN_FORMAT)
            .map_err(|e| conversion(12, e))?,
    })
}

fn conversion(idx: usize, e: chrono::ParseError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_STATUS, DEFAULT_TAG};

    fn show(venue: &str, url: &str) -> NewShow {
        NewShow {
            name: "Night".into(),
            artist: "Band".into(),
            tag: DEFAULT_TAG.into(),
            city: "Beijing".into(),
            venue: venue.into(),
            lineup: Some("Band".into()),
            date: NaiveDate::from_ymd_opt(2024, 12, 20).unwrap(),
            price: "100".into(),
            status: DEFAULT_STATUS.into(),
            detail_url: Some(url.into()),
            poster: None,
        }
    }

    #[test]
    fn test_committed_rows_are_readable() {
        let store = SqliteShowStore::open_in_memory().unwrap();
        let mut session = store.begin().unwrap();
        let id = session.add(&show("MAO", "https://www.showstart.com/event/1")).unwrap();
        let found = session.find_by_key(&show("MAO", "").key()).unwrap().unwrap();
        assert_eq!(found.id, id);
        session.commit().unwrap();

        let rows = store.shows_for_artist("Band").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 12, 20).unwrap());
        assert_eq!(rows[0].tag.as_deref(), Some(DEFAULT_TAG));
    }

    #[test]
    fn test_rollback_discards_rows() {
        let store = SqliteShowStore::open_in_memory().unwrap();
        let mut session = store.begin().unwrap();
        session.add(&show("MAO", "https://www.showstart.com/event/1")).unwrap();
        session.rollback().unwrap();

        assert!(store.shows_for_artist("Band").unwrap().is_empty());
    }

    #[test]
    fn test_dropped_session_rolls_back() {
        let store = SqliteShowStore::open_in_memory().unwrap();
        {
            let mut session = store.begin().unwrap();
            session.add(&show("MAO", "https://www.showstart.com/event/1")).unwrap();
        }
        assert!(store.shows_for_artist("Band").unwrap().is_empty());
        // The connection is usable again after the implicit rollback.
        let session = store.begin().unwrap();
        session.commit().unwrap();
    }

    #[test]
    fn test_find_by_key_is_exact() {
        let store = SqliteShowStore::open_in_memory().unwrap();
        let mut session = store.begin().unwrap();
        session.add(&show("MAO", "https://www.showstart.com/event/1")).unwrap();

        assert!(session.find_by_key(&show("MAO Livehouse", "").key()).unwrap().is_none());
        let mut other_day = show("MAO", "").key();
        other_day.date = NaiveDate::from_ymd_opt(2024, 12, 21).unwrap();
        assert!(session.find_by_key(&other_day).unwrap().is_none());
    }

    #[test]
    fn test_delete_removes_row() {
        let store = SqliteShowStore::open_in_memory().unwrap();
        let mut session = store.begin().unwrap();
        let id = session.add(&show("MAO", "https://www.showstart.com/event/1")).unwrap();
        session.delete(id).unwrap();
        assert!(session.find_by_key(&show("MAO", "").key()).unwrap().is_none());
        session.commit().unwrap();
        assert!(store.shows_for_artist("Band").unwrap().is_empty());
    }

    #[test]
    fn test_diagnostics_lists_show_columns() {
        let store = SqliteShowStore::open_in_memory().unwrap();
        let diag = store.diagnostics().unwrap();

        assert_eq!(diag.result, 1);
        assert!(!diag.version.is_empty());
        assert!(diag.tables.iter().any(|t| t == "shows"));
        let names: Vec<_> = diag.shows_columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.first(), Some(&"id"));
        assert!(names.contains(&"detail_url"));
        assert!(names.contains(&"created_at"));
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shows.db");
        let store = SqliteShowStore::open(&path).unwrap();
        assert!(path.exists());
        assert!(store.shows_for_artist("nobody").unwrap().is_empty());
    }
}
