//! Parsing of the free-text dates scraped from listing pages.

use crate::constants::{DATE_FORMATS, DISPLAY_DATE_FORMAT};
use crate::error::{CrawlerError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

/// Parse a scraped date into a calendar day, dropping any time of day.
pub fn normalize(text: &str) -> Result<NaiveDate> {
    parse_timestamp(text).map(|ts| ts.date())
}

/// Parse a scraped date keeping the time of day (midnight when absent).
///
/// Formats from [`DATE_FORMATS`] are tried in order and must match the whole
/// trimmed string.
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    let trimmed = text.trim();

    for format in DATE_FORMATS {
        let parsed = if format.contains("%H") {
            NaiveDateTime::parse_from_str(trimmed, format).ok()
        } else {
            NaiveDate::parse_from_str(trimmed, format)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        };
        if let Some(ts) = parsed {
            return Ok(ts);
        }
    }

    debug!("No date format matched {:?}", trimmed);
    Err(CrawlerError::DateParse {
        input: trimmed.to_string(),
    })
}

pub fn display(date: NaiveDate) -> String {
    date.format(DISPLAY_DATE_FORMAT).to_string()
}
