use crate::error::{CrawlerError, Result};
use crate::types::ShowRecord;
use tracing::warn;

/// Fields a record needs before it can become a row
pub const REQUIRED_FIELDS: [&str; 5] = ["name", "date", "city", "venue", "price"];

/// Returns the first required field that is absent or blank.
pub fn check(record: &ShowRecord) -> Result<()> {
    for field in REQUIRED_FIELDS {
        let present = record
            .field(field)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);
        if !present {
            return Err(CrawlerError::Validation(field.to_string()));
        }
    }
    Ok(())
}

pub fn validate(record: &ShowRecord) -> bool {
    match check(record) {
        Ok(()) => true,
        Err(e) => {
            warn!("Rejecting show {:?}: {}", record.display_name(), e);
            false
        }
    }
}
