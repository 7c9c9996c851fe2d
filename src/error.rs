use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("Unparseable date string: {input:?}")]
    DateParse { input: String },

    #[error("Missing required field: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    StoreState(String),

    #[error("Scrape failed: {0}")]
    Scrape(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CrawlerError {
    /// Per-record failures skip the record; everything else aborts the batch.
    pub fn is_per_record(&self) -> bool {
        matches!(self, CrawlerError::DateParse { .. } | CrawlerError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, CrawlerError>;
