//! Decides what happens to a freshly scraped show when the store may already
//! hold the same performance.
//!
//! Two records describe the same show when artist, calendar day, city and
//! venue all match exactly. When they collide, the source policy picks the
//! survivor. Nothing in here writes to the store: a `Replace` names the row to
//! delete and the uploader carries it out inside its transaction.

use crate::date;
use crate::error::{CrawlerError, Result};
use crate::provenance::SourcePolicy;
use crate::storage::ShowSession;
use crate::types::{ShowId, ShowKey, ShowRecord, StoredShow};
use tracing::{debug, info};

/// Outcome of comparing two records that share a match key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The incumbent stays and the candidate is dropped
    Keep,
    /// The candidate comes from a more authoritative source
    Supersede,
    /// The incumbent's provenance is unknown, so no priority rule applies
    NoRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    InsertNew,
    KeepExisting,
    Replace(ShowId),
}

/// Apply the source priority rules to a colliding pair.
///
/// | existing | candidate | verdict |
/// |---|---|---|
/// | known, rank r | known, rank < r | Supersede |
/// | known | anything else | Keep |
/// | unknown | any | NoRule |
pub fn decide(policy: &SourcePolicy, existing_url: Option<&str>, candidate_url: Option<&str>) -> Verdict {
    let Some(existing) = policy.classify(existing_url) else {
        return Verdict::NoRule;
    };
    match policy.classify(candidate_url) {
        Some(candidate) if candidate.rank < existing.rank => Verdict::Supersede,
        _ => Verdict::Keep,
    }
}

/// Build the match key for a candidate. Fails on an unparseable date or a
/// missing city/venue.
pub fn match_key(candidate: &ShowRecord, artist: &str) -> Result<ShowKey> {
    let raw_date = candidate
        .date
        .as_deref()
        .ok_or_else(|| CrawlerError::Validation("date".into()))?;
    let field = |name: &str| {
        candidate
            .field(name)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| CrawlerError::Validation(name.to_string()))
    };
    Ok(ShowKey {
        artist: artist.to_string(),
        date: date::normalize(raw_date)?,
        city: field("city")?,
        venue: field("venue")?,
    })
}

pub struct Reconciler {
    policy: SourcePolicy,
}

impl Reconciler {
    pub fn new(policy: SourcePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SourcePolicy {
        &self.policy
    }

    /// Full reconciliation of one candidate against the store.
    pub fn reconcile(
        &self,
        session: &mut dyn ShowSession,
        candidate: &ShowRecord,
        artist: &str,
    ) -> Result<Decision> {
        let key = match_key(candidate, artist)?;
        self.reconcile_key(session, &key, candidate)
    }

    pub fn reconcile_key(
        &self,
        session: &mut dyn ShowSession,
        key: &ShowKey,
        candidate: &ShowRecord,
    ) -> Result<Decision> {
        let existing = session.find_by_key(key)?;
        Ok(self.against(existing.as_ref(), candidate))
    }

    /// Decision for a candidate given the row (if any) it collides with.
    pub fn against(&self, existing: Option<&StoredShow>, candidate: &ShowRecord) -> Decision {
        let Some(existing) = existing else {
            return Decision::InsertNew;
        };

        let existing_source = self.policy.source_name(existing.detail_url.as_deref());
        let candidate_source = self.policy.source_name(candidate.detail_url.as_deref());

        match decide(
            &self.policy,
            existing.detail_url.as_deref(),
            candidate.detail_url.as_deref(),
        ) {
            Verdict::Keep => {
                info!(
                    "Keeping {} show {:?} over {} candidate",
                    existing_source, existing.name, candidate_source
                );
                Decision::KeepExisting
            }
            Verdict::Supersede => {
                info!(
                    "Replacing {} show {} with {} record {:?}",
                    existing_source,
                    existing.id,
                    candidate_source,
                    candidate.display_name()
                );
                Decision::Replace(existing.id)
            }
            Verdict::NoRule => {
                debug!(
                    "Show {} has unknown provenance; inserting {} candidate alongside it",
                    existing.id, candidate_source
                );
                Decision::InsertNew
            }
        }
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(SourcePolicy::default())
    }
}
