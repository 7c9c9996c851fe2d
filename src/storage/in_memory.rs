use super::{ColumnInfo, ShowSession, ShowStore, StoreDiagnostics};
use crate::constants::SHOWS_TABLE;
use crate::error::{CrawlerError, Result};
use crate::types::{NewShow, ShowId, ShowKey, StoredShow};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// In-memory storage implementation for development/testing
pub struct InMemoryShowStore {
    inner: Mutex<Inner>,
    fail_commit: AtomicBool,
    fail_delete: AtomicBool,
    /// Lookups left before `find_by_key` starts failing; `usize::MAX` never fails
    lookup_budget: AtomicUsize,
}

#[derive(Default)]
struct Inner {
    rows: BTreeMap<ShowId, StoredShow>,
    next_id: ShowId,
}

impl Default for InMemoryShowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryShowStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                rows: BTreeMap::new(),
                next_id: 1,
            }),
            fail_commit: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            lookup_budget: AtomicUsize::new(usize::MAX),
        }
    }

    /// Make every subsequent commit fail, as a lost connection would.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Let `n` more lookups succeed, then fail every one after.
    pub fn fail_lookups_after(&self, n: usize) {
        self.lookup_budget.store(n, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| CrawlerError::StoreState("in-memory show store poisoned".into()))
    }
}

impl ShowStore for InMemoryShowStore {
    fn begin(&self) -> Result<Box<dyn ShowSession + '_>> {
        Ok(Box::new(InMemorySession {
            inner: self.lock()?,
            fail_commit: &self.fail_commit,
            fail_delete: &self.fail_delete,
            lookup_budget: &self.lookup_budget,
            added: BTreeMap::new(),
            deleted: HashSet::new(),
        }))
    }

    fn shows_for_artist(&self, artist: &str) -> Result<Vec<StoredShow>> {
        let inner = self.lock()?;
        let mut shows: Vec<StoredShow> = inner
            .rows
            .values()
            .filter(|s| s.artist == artist)
            .cloned()
            .collect();
        shows.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Ok(shows)
    }

    fn diagnostics(&self) -> Result<StoreDiagnostics> {
        let _inner = self.lock()?;
        let shows_columns = [
            ("id", "INTEGER"),
            ("name", "TEXT"),
            ("artist", "TEXT"),
            ("tag", "TEXT"),
            ("city", "TEXT"),
            ("venue", "TEXT"),
            ("lineup", "TEXT"),
            ("date", "TEXT"),
            ("price", "TEXT"),
            ("status", "TEXT"),
            ("detail_url", "TEXT"),
            ("poster", "TEXT"),
            ("created_at", "TEXT"),
        ]
        .iter()
        .map(|(name, ty)| ColumnInfo {
            name: name.to_string(),
            column_type: ty.to_string(),
        })
        .collect();

        Ok(StoreDiagnostics {
            result: 1,
            version: format!("in-memory {}", env!("CARGO_PKG_VERSION")),
            tables: vec![SHOWS_TABLE.to_string()],
            shows_columns,
        })
    }
}

/// Holds the store lock for its whole life; staged changes land on commit.
struct InMemorySession<'a> {
    inner: MutexGuard<'a, Inner>,
    fail_commit: &'a AtomicBool,
    fail_delete: &'a AtomicBool,
    lookup_budget: &'a AtomicUsize,
    added: BTreeMap<ShowId, StoredShow>,
    deleted: HashSet<ShowId>,
}

impl InMemorySession<'_> {
    fn visible(&self) -> impl Iterator<Item = &StoredShow> {
        let deleted = &self.deleted;
        self.inner
            .rows
            .values()
            .filter(move |s| !deleted.contains(&s.id))
            .chain(self.added.values())
    }
}

impl ShowSession for InMemorySession<'_> {
    fn find_by_key(&mut self, key: &ShowKey) -> Result<Option<StoredShow>> {
        match self.lookup_budget.load(Ordering::SeqCst) {
            0 => return Err(CrawlerError::StoreState("lookup rejected by store".into())),
            usize::MAX => {}
            left => self.lookup_budget.store(left - 1, Ordering::SeqCst),
        }
        let found = self
            .visible()
            .filter(|s| {
                s.artist == key.artist
                    && s.date == key.date
                    && s.city.as_deref() == Some(key.city.as_str())
                    && s.venue.as_deref() == Some(key.venue.as_str())
            })
            .min_by_key(|s| s.id)
            .cloned();
        Ok(found)
    }

    fn add(&mut self, show: &NewShow) -> Result<ShowId> {
        let id = self.inner.next_id;
        self.inner.next_id += 1;
        self.added.insert(
            id,
            StoredShow {
                id,
                name: show.name.clone(),
                artist: show.artist.clone(),
                tag: Some(show.tag.clone()),
                city: Some(show.city.clone()),
                venue: Some(show.venue.clone()),
                lineup: show.lineup.clone(),
                date: show.date,
                price: Some(show.price.clone()),
                status: Some(show.status.clone()),
                detail_url: show.detail_url.clone(),
                poster: show.poster.clone(),
                created_at: Utc::now().naive_utc(),
            },
        );
        Ok(id)
    }

    fn delete(&mut self, id: ShowId) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(CrawlerError::StoreState(format!("delete of show {id} rejected by store")));
        }
        if self.added.remove(&id).is_none() {
            self.deleted.insert(id);
        }
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(CrawlerError::StoreState("commit rejected by store".into()));
        }
        let deleted = std::mem::take(&mut self.deleted);
        let added = std::mem::take(&mut self.added);
        for id in deleted {
            self.inner.rows.remove(&id);
        }
        debug!("Committing {} staged shows", added.len());
        self.inner.rows.extend(added);
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn show(url: &str) -> NewShow {
        NewShow {
            name: "Night".into(),
            artist: "Band".into(),
            tag: "performance".into(),
            city: "Chengdu".into(),
            venue: "Little Bar".into(),
            lineup: None,
            date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            price: "80".into(),
            status: "on sale".into(),
            detail_url: Some(url.into()),
            poster: None,
        }
    }

    #[test]
    fn test_staged_rows_visible_in_session_only() {
        let store = InMemoryShowStore::new();
        let mut session = store.begin().unwrap();
        session.add(&show("https://www.showstart.com/event/1")).unwrap();
        assert!(session.find_by_key(&show("").key()).unwrap().is_some());
        session.rollback().unwrap();

        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_commit_keeps_store_unchanged() {
        let store = InMemoryShowStore::new();
        store.fail_commits(true);
        let mut session = store.begin().unwrap();
        session.add(&show("https://www.showstart.com/event/1")).unwrap();
        assert!(session.commit().is_err());

        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_then_commit() {
        let store = InMemoryShowStore::new();
        let mut session = store.begin().unwrap();
        let id = session.add(&show("https://www.showstart.com/event/1")).unwrap();
        session.commit().unwrap();

        let mut session = store.begin().unwrap();
        session.delete(id).unwrap();
        assert!(session.find_by_key(&show("").key()).unwrap().is_none());
        session.commit().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_lookups_fail_once_budget_is_spent() {
        let store = InMemoryShowStore::new();
        store.fail_lookups_after(1);
        let mut session = store.begin().unwrap();
        let key = show("").key();

        assert!(session.find_by_key(&key).is_ok());
        assert!(session.find_by_key(&key).is_err());
        assert!(session.find_by_key(&key).is_err());
    }
}
