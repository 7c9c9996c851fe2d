//! Persistence boundary for show rows.
//!
//! The uploader only talks to a [`ShowSession`]: one transaction that can look
//! rows up by match key, stage inserts and deletes, and then commit or roll
//! back. Dropping a session that was neither committed nor rolled back rolls
//! it back.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryShowStore;
pub use sqlite::SqliteShowStore;

use crate::error::Result;
use crate::types::{NewShow, ShowId, ShowKey, StoredShow};
use serde::Serialize;

/// One open transaction against the show table
pub trait ShowSession {
    /// Oldest row matching the key exactly, including changes staged in this session.
    fn find_by_key(&mut self, key: &ShowKey) -> Result<Option<StoredShow>>;

    fn add(&mut self, show: &NewShow) -> Result<ShowId>;

    fn delete(&mut self, id: ShowId) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Store that hands out sessions and serves read-only queries
pub trait ShowStore: Send + Sync {
    fn begin(&self) -> Result<Box<dyn ShowSession + '_>>;

    /// All rows for an artist, ordered by date then id
    fn shows_for_artist(&self, artist: &str) -> Result<Vec<StoredShow>>;

    fn diagnostics(&self) -> Result<StoreDiagnostics>;
}

/// Connectivity report for the `/test-db` endpoint
#[derive(Debug, Clone, Serialize)]
pub struct StoreDiagnostics {
    pub result: i64,
    pub version: String,
    pub tables: Vec<String>,
    pub shows_columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}
