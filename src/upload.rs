//! Batch upload of one artist's scraped shows.
//!
//! The batch is a fold over the records: each one is validated, keyed and
//! reconciled, and the outcome lands in a [`BatchPlan`] of deletes and inserts.
//! The plan is then applied and committed inside the single session opened at
//! the start. Bad records are skipped; any store failure rolls back the lot.

use crate::error::{CrawlerError, Result};
use crate::metrics;
use crate::reconcile::{self, Decision, Reconciler, Verdict};
use crate::storage::{ShowSession, ShowStore};
use crate::types::{NewShow, ShowId, ShowKey, ShowRecord};
use crate::validation;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{error, info, instrument, warn};

/// Tally of one upload call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub committed: bool,
    /// Rows written, replacements included; zero when the batch rolled back
    pub new_count: usize,
    pub skip_count: usize,
    /// Written rows that superseded a lower-priority row
    pub replaced_count: usize,
    pub invalid_count: usize,
    /// Records dropped for an unparseable date
    pub failed_count: usize,
}

impl UploadReport {
    /// Nothing reached the store, so no row counts as written.
    fn discard_writes(&mut self) {
        self.new_count = 0;
        self.replaced_count = 0;
    }
}

/// Mutations collected during the fold, applied at the end
#[derive(Debug, Default)]
pub struct BatchPlan {
    deletes: Vec<ShowId>,
    inserts: Vec<NewShow>,
    staged: HashMap<ShowKey, usize>,
}

impl BatchPlan {
    pub fn deletes(&self) -> &[ShowId] {
        &self.deletes
    }

    pub fn inserts(&self) -> &[NewShow] {
        &self.inserts
    }

    fn staged_for(&self, key: &ShowKey) -> Option<(usize, &NewShow)> {
        self.staged.get(key).map(|&idx| (idx, &self.inserts[idx]))
    }

    fn insert(&mut self, show: NewShow) {
        self.staged.insert(show.key(), self.inserts.len());
        self.inserts.push(show);
    }

    fn swap_staged(&mut self, idx: usize, show: NewShow) {
        self.inserts[idx] = show;
    }

    fn delete(&mut self, id: ShowId) {
        if !self.deletes.contains(&id) {
            self.deletes.push(id);
        }
    }

    fn apply(self, session: &mut dyn ShowSession) -> Result<()> {
        for id in self.deletes {
            session.delete(id)?;
        }
        for show in &self.inserts {
            session.add(show)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Inserted,
    Replaced,
    /// An earlier record in this batch was swapped out before reaching the store
    SwappedStaged,
    Skipped,
}

pub struct UploadService {
    reconciler: Reconciler,
}

impl UploadService {
    pub fn new(reconciler: Reconciler) -> Self {
        Self { reconciler }
    }

    /// Upload a batch and report whether it committed. Never panics on bad input.
    pub fn upload_shows(&self, store: &dyn ShowStore, records: &[ShowRecord], artist: &str) -> bool {
        self.run_batch(store, records, artist).committed
    }

    #[instrument(skip(self, store, records), fields(records = records.len()))]
    pub fn run_batch(&self, store: &dyn ShowStore, records: &[ShowRecord], artist: &str) -> UploadReport {
        let mut report = UploadReport::default();

        let mut session = match store.begin() {
            Ok(session) => session,
            Err(e) => {
                error!("Could not open a store session: {}", e);
                metrics::record_upload(&report);
                return report;
            }
        };

        match self.plan_batch(session.as_mut(), records, artist, &mut report) {
            Ok(plan) => match plan.apply(session.as_mut()).and_then(|_| session.commit()) {
                Ok(()) => {
                    report.committed = true;
                    info!(
                        "Upload for {} committed: {} new ({} replacing), {} skipped, {} invalid, {} failed",
                        artist,
                        report.new_count,
                        report.replaced_count,
                        report.skip_count,
                        report.invalid_count,
                        report.failed_count
                    );
                }
                // The session was consumed by commit or dropped mid-apply; either
                // way nothing from this batch is visible.
                Err(e) => error!("Upload for {} rolled back: {}", artist, e),
            },
            Err(e) => {
                error!("Upload for {} aborted: {}", artist, e);
                if let Err(rollback_err) = session.rollback() {
                    warn!("Rollback failed: {}", rollback_err);
                }
            }
        }

        if !report.committed {
            report.discard_writes();
        }
        metrics::record_upload(&report);
        report
    }

    /// Fold the records into a plan. Only store failures escape.
    pub fn plan_batch(
        &self,
        session: &mut dyn ShowSession,
        records: &[ShowRecord],
        artist: &str,
        report: &mut UploadReport,
    ) -> Result<BatchPlan> {
        let mut plan = BatchPlan::default();

        for record in records {
            match self.plan_record(session, &mut plan, record, artist) {
                Ok(RecordOutcome::Inserted) => report.new_count += 1,
                Ok(RecordOutcome::Replaced) => {
                    report.new_count += 1;
                    report.replaced_count += 1;
                }
                Ok(RecordOutcome::SwappedStaged) => report.replaced_count += 1,
                Ok(RecordOutcome::Skipped) => {
                    report.skip_count += 1;
                    info!("Skipping duplicate show {:?}", record.display_name());
                }
                Err(e @ CrawlerError::Validation(_)) => {
                    report.invalid_count += 1;
                    warn!("Invalid show {:?}: {}", record.display_name(), e);
                }
                Err(e) if e.is_per_record() => {
                    report.failed_count += 1;
                    warn!("Dropping show {:?}: {}", record.display_name(), e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(plan)
    }

    fn plan_record(
        &self,
        session: &mut dyn ShowSession,
        plan: &mut BatchPlan,
        record: &ShowRecord,
        artist: &str,
    ) -> Result<RecordOutcome> {
        validation::check(record)?;
        let key = reconcile::match_key(record, artist)?;
        let show = NewShow::from_record(record, artist, key.date)?;

        if let Some((idx, staged)) = plan.staged_for(&key) {
            match reconcile::decide(
                self.reconciler.policy(),
                staged.detail_url.as_deref(),
                record.detail_url.as_deref(),
            ) {
                Verdict::Keep => return Ok(RecordOutcome::Skipped),
                Verdict::Supersede => {
                    plan.swap_staged(idx, show);
                    return Ok(RecordOutcome::SwappedStaged);
                }
                Verdict::NoRule => {
                    plan.insert(show);
                    return Ok(RecordOutcome::Inserted);
                }
            }
        }

        match self.reconciler.reconcile_key(session, &key, record)? {
            Decision::KeepExisting => Ok(RecordOutcome::Skipped),
            Decision::InsertNew => {
                plan.insert(show);
                Ok(RecordOutcome::Inserted)
            }
            Decision::Replace(id) => {
                plan.delete(id);
                plan.insert(show);
                Ok(RecordOutcome::Replaced)
            }
        }
    }
}

impl Default for UploadService {
    fn default() -> Self {
        Self::new(Reconciler::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryShowStore;

    const DAMAI: &str = "https://detail.damai.cn/item.htm?id=1";
    const SHOWSTART: &str = "https://www.showstart.com/event/1";

    fn record(name: &str, date: &str, venue: &str, url: &str) -> ShowRecord {
        ShowRecord {
            name: Some(name.into()),
            lineup: Some("The Band".into()),
            price: Some("150".into()),
            date: Some(date.into()),
            city: Some("Hangzhou".into()),
            venue: Some(venue.into()),
            detail_url: Some(url.into()),
            poster: Some("https://img.example/p.jpg".into()),
        }
    }

    #[test]
    fn test_partial_batch_still_commits() {
        let store = InMemoryShowStore::new();
        let mut invalid = record("Broken", "2025/03/01", "MAO", SHOWSTART);
        invalid.price = None;
        let records = vec![
            record("A", "2025/03/01 20:00", "MAO", SHOWSTART),
            invalid,
            record("B", "2025/03/02", "MAO", SHOWSTART),
        ];

        let report = UploadService::default().run_batch(&store, &records, "The Band");

        assert!(report.committed);
        assert_eq!(report.new_count, 2);
        assert_eq!(report.invalid_count, 1);
        assert_eq!(store.len(), 2);
        let names: Vec<_> = store
            .shows_for_artist("The Band")
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_bad_date_is_dropped_not_fatal() {
        let store = InMemoryShowStore::new();
        let records = vec![
            record("A", "sometime in March", "MAO", SHOWSTART),
            record("B", "2025-03-02", "MAO", SHOWSTART),
        ];

        let report = UploadService::default().run_batch(&store, &records, "The Band");

        assert!(report.committed);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.new_count, 1);
    }

    #[test]
    fn test_same_source_upload_is_idempotent() {
        let store = InMemoryShowStore::new();
        let service = UploadService::default();
        let records = vec![record("A", "2025/03/01 20:00", "MAO", SHOWSTART)];

        assert!(service.upload_shows(&store, &records, "The Band"));
        let second = service.run_batch(&store, &records, "The Band");

        assert!(second.committed);
        assert_eq!(second.new_count, 0);
        assert_eq!(second.skip_count, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_damai_replaces_showstart_row() {
        let store = InMemoryShowStore::new();
        let service = UploadService::default();
        assert!(service.upload_shows(
            &store,
            &[record("Showstart listing", "2025/03/01 20:00", "MAO", SHOWSTART)],
            "The Band"
        ));

        let report = service.run_batch(
            &store,
            &[record("Damai listing", "2025-03-01", "MAO", DAMAI)],
            "The Band",
        );

        assert_eq!(report.new_count, 1);
        assert_eq!(report.replaced_count, 1);
        let rows = store.shows_for_artist("The Band").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Damai listing");
        assert_eq!(rows[0].detail_url.as_deref(), Some(DAMAI));
    }

    #[test]
    fn test_damai_row_survives_showstart_batch() {
        let store = InMemoryShowStore::new();
        let service = UploadService::default();
        service.upload_shows(&store, &[record("Damai", "2025/03/01", "MAO", DAMAI)], "The Band");

        let report = service.run_batch(
            &store,
            &[record("Showstart", "2025/03/01 19:30", "MAO", SHOWSTART)],
            "The Band",
        );

        assert_eq!(report.skip_count, 1);
        let rows = store.shows_for_artist("The Band").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Damai");
    }

    #[test]
    fn test_commit_failure_leaves_no_rows() {
        let store = InMemoryShowStore::new();
        store.fail_commits(true);
        let records = vec![
            record("A", "2025/03/01", "MAO", SHOWSTART),
            record("B", "2025/03/02", "MAO", SHOWSTART),
        ];

        let ok = UploadService::default().upload_shows(&store, &records, "The Band");

        assert!(!ok);
        assert!(store.is_empty());
    }

    #[test]
    fn test_commit_failure_keeps_superseded_row() {
        let store = InMemoryShowStore::new();
        let service = UploadService::default();
        service.upload_shows(&store, &[record("Old", "2025/03/01", "MAO", SHOWSTART)], "The Band");
        store.fail_commits(true);

        assert!(!service.upload_shows(&store, &[record("New", "2025/03/01", "MAO", DAMAI)], "The Band"));

        let rows = store.shows_for_artist("The Band").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Old");
    }

    #[test]
    fn test_duplicates_within_one_batch_collapse() {
        let store = InMemoryShowStore::new();
        let records = vec![
            record("First", "2025/03/01 20:00", "MAO", SHOWSTART),
            record("Again", "2025/03/01", "MAO", SHOWSTART),
            record("Damai", "2025/03/01", "MAO", DAMAI),
            record("Late showstart", "2025/03/01", "MAO", SHOWSTART),
        ];

        let report = UploadService::default().run_batch(&store, &records, "The Band");

        assert_eq!(report.new_count, 1);
        assert_eq!(report.skip_count, 2);
        assert_eq!(report.replaced_count, 1);
        let rows = store.shows_for_artist("The Band").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Damai");
    }

    #[test]
    fn test_unknown_sources_do_not_suppress_each_other() {
        let store = InMemoryShowStore::new();
        let records = vec![
            record("One", "2025/03/01", "MAO", "https://a.example/1"),
            record("Two", "2025/03/01", "MAO", "https://b.example/2"),
        ];

        let report = UploadService::default().run_batch(&store, &records, "The Band");

        assert_eq!(report.new_count, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_plan_records_delete_for_replacement() {
        let store = InMemoryShowStore::new();
        let service = UploadService::default();
        service.upload_shows(&store, &[record("Old", "2025/03/01", "MAO", SHOWSTART)], "The Band");
        let old_id = store.shows_for_artist("The Band").unwrap()[0].id;

        let mut session = store.begin().unwrap();
        let mut report = UploadReport::default();
        let plan = service
            .plan_batch(
                session.as_mut(),
                &[record("New", "2025/03/01", "MAO", DAMAI)],
                "The Band",
                &mut report,
            )
            .unwrap();

        assert_eq!(plan.deletes(), &[old_id]);
        assert_eq!(plan.inserts().len(), 1);
        assert_eq!(plan.inserts()[0].tag, "performance");
        assert_eq!(plan.inserts()[0].status, "on sale");
    }

    #[test]
    fn test_lookup_failure_mid_batch_rolls_back() {
        let store = InMemoryShowStore::new();
        let service = UploadService::default();
        service.upload_shows(&store, &[record("Earlier", "2025/02/01", "MAO", SHOWSTART)], "The Band");
        store.fail_lookups_after(1);
        let records = vec![
            record("A", "2025/03/01", "MAO", SHOWSTART),
            record("B", "2025/03/02", "MAO", SHOWSTART),
            record("C", "2025/03/03", "MAO", SHOWSTART),
        ];

        let report = service.run_batch(&store, &records, "The Band");

        assert!(!report.committed);
        assert_eq!(report.new_count, 0);
        let names: Vec<_> = store
            .shows_for_artist("The Band")
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Earlier"]);
    }

    #[test]
    fn test_lookup_failure_is_not_a_per_record_skip() {
        let store = InMemoryShowStore::new();
        store.fail_lookups_after(0);
        let mut session = store.begin().unwrap();
        let mut report = UploadReport::default();

        let result = UploadService::default().plan_batch(
            session.as_mut(),
            &[record("A", "2025/03/01", "MAO", SHOWSTART)],
            "The Band",
            &mut report,
        );

        assert!(matches!(result, Err(CrawlerError::StoreState(_))));
        assert_eq!(report.invalid_count + report.failed_count, 0);
    }

    #[test]
    fn test_delete_failure_on_replace_keeps_old_row() {
        let store = InMemoryShowStore::new();
        let service = UploadService::default();
        service.upload_shows(&store, &[record("Old", "2025/03/01", "MAO", SHOWSTART)], "The Band");
        store.fail_deletes(true);

        let report = service.run_batch(
            &store,
            &[
                record("New", "2025/03/01", "MAO", DAMAI),
                record("Other", "2025/03/05", "MAO", SHOWSTART),
            ],
            "The Band",
        );

        assert!(!report.committed);
        assert_eq!(report.new_count, 0);
        assert_eq!(report.replaced_count, 0);
        let rows = store.shows_for_artist("The Band").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Old");
    }

    #[test]
    fn test_failed_commit_reports_nothing_written() {
        let store = InMemoryShowStore::new();
        store.fail_commits(true);
        let mut invalid = record("Broken", "2025/03/01", "MAO", SHOWSTART);
        invalid.city = None;

        let report = UploadService::default().run_batch(
            &store,
            &[record("A", "2025/03/01", "MAO", SHOWSTART), invalid],
            "The Band",
        );

        assert_eq!(
            report,
            UploadReport {
                committed: false,
                invalid_count: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_whitespace_only_field_is_invalid_in_batch() {
        let store = InMemoryShowStore::new();
        let mut blank_venue = record("Blank", "2025/03/01", "MAO", SHOWSTART);
        blank_venue.venue = Some("  \t ".into());

        let report = UploadService::default().run_batch(
            &store,
            &[blank_venue, record("Real", "2025/03/02", "MAO", SHOWSTART)],
            "The Band",
        );

        assert!(report.committed);
        assert_eq!(report.invalid_count, 1);
        assert_eq!(report.new_count, 1);
        let rows = store.shows_for_artist("The Band").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Real");
    }

    #[test]
    fn test_empty_batch_commits() {
        let store = InMemoryShowStore::new();
        let report = UploadService::default().run_batch(&store, &[], "The Band");
        assert!(report.committed);
        assert_eq!(report, UploadReport { committed: true, ..Default::default() });
    }
}
