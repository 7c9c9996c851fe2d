use crate::constants::{DEFAULT_STATUS, DEFAULT_TAG};
use crate::error::Result;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A show as extracted from a listing page, before any checks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShowRecord {
    pub name: Option<String>,
    pub lineup: Option<String>,
    pub price: Option<String>,
    pub date: Option<String>,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub detail_url: Option<String>,
    pub poster: Option<String>,
}

impl ShowRecord {
    /// Look up a field by its wire name
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "name" => &self.name,
            "lineup" => &self.lineup,
            "price" => &self.price,
            "date" => &self.date,
            "city" => &self.city,
            "venue" => &self.venue,
            "detail_url" => &self.detail_url,
            "poster" => &self.poster,
            _ => return None,
        };
        value.as_deref()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

/// Row identifier assigned by the store
pub type ShowId = i64;

/// A persisted show row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredShow {
    pub id: ShowId,
    pub name: String,
    pub artist: String,
    pub tag: Option<String>,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub lineup: Option<String>,
    pub date: NaiveDate,
    pub price: Option<String>,
    pub status: Option<String>,
    pub detail_url: Option<String>,
    pub poster: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A show staged for insertion; the store assigns `id` and `created_at`
#[derive(Debug, Clone, PartialEq)]
pub struct NewShow {
    pub name: String,
    pub artist: String,
    pub tag: String,
    pub city: String,
    pub venue: String,
    pub lineup: Option<String>,
    pub date: NaiveDate,
    pub price: String,
    pub status: String,
    pub detail_url: Option<String>,
    pub poster: Option<String>,
}

impl NewShow {
    /// Build a row from a record that already passed validation.
    pub fn from_record(record: &ShowRecord, artist: &str, date: NaiveDate) -> Result<Self> {
        Ok(Self {
            name: required(record, "name")?,
            artist: artist.to_string(),
            tag: DEFAULT_TAG.to_string(),
            city: required(record, "city")?,
            venue: required(record, "venue")?,
            lineup: record.lineup.clone(),
            date,
            price: required(record, "price")?,
            status: DEFAULT_STATUS.to_string(),
            detail_url: record.detail_url.clone(),
            poster: record.poster.clone(),
        })
    }

    pub fn key(&self) -> ShowKey {
        ShowKey {
            artist: self.artist.clone(),
            date: self.date,
            city: self.city.clone(),
            venue: self.venue.clone(),
        }
    }
}

fn required(record: &ShowRecord, field: &str) -> Result<String> {
    record
        .field(field)
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| crate::error::CrawlerError::Validation(field.to_string()))
}

/// Two shows with equal keys are the same performance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShowKey {
    pub artist: String,
    pub date: NaiveDate,
    pub city: String,
    pub venue: String,
}

impl std::fmt::Display for ShowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {} {} on {}", self.artist, self.city, self.venue, self.date)
    }
}

/// A ticketing site that can be searched for an artist's upcoming shows
#[async_trait::async_trait]
pub trait ShowScraper: Send + Sync {
    /// Short identifier used in logs and metrics
    fn source_name(&self) -> &'static str;

    /// Listings for the artist. An empty list means the site has no shows,
    /// which is not an error.
    async fn search(&self, artist: &str) -> Result<Vec<ShowRecord>>;
}
