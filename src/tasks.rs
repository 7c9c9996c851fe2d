//! Crawl-and-upload flow shared by the HTTP API and the CLI.

use crate::date;
use crate::error::Result;
use crate::metrics;
use crate::storage::ShowStore;
use crate::types::{ShowRecord, ShowScraper, StoredShow};
use crate::upload::{UploadReport, UploadService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// Everything a crawl needs; cheap to clone
#[derive(Clone)]
pub struct CrawlContext {
    pub store: Arc<dyn ShowStore>,
    pub scraper: Arc<dyn ShowScraper>,
    pub uploader: Arc<UploadService>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateParams {
    pub artists: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistUpdateResult {
    pub artist: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<UploadReport>,
}

impl ArtistUpdateResult {
    fn failed(artist: &str, message: String) -> Self {
        Self {
            artist: artist.to_string(),
            success: false,
            message,
            report: None,
        }
    }
}

/// Stored show as returned to API clients, date as `YYYY/MM/DD`
#[derive(Debug, Clone, Serialize)]
pub struct ShowView {
    pub id: i64,
    pub name: String,
    pub artist: String,
    pub date: String,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub price: Option<String>,
    pub lineup: Option<String>,
    pub detail_url: Option<String>,
    pub poster: Option<String>,
}

impl From<StoredShow> for ShowView {
    fn from(show: StoredShow) -> Self {
        Self {
            id: show.id,
            name: show.name,
            artist: show.artist,
            date: date::display(show.date),
            city: show.city,
            venue: show.venue,
            price: show.price,
            lineup: show.lineup,
            detail_url: show.detail_url,
            poster: show.poster,
        }
    }
}

/// Crawl and upload each artist in turn. One artist failing never stops the rest.
pub async fn update_artists(ctx: &CrawlContext, artists: &[String]) -> Vec<ArtistUpdateResult> {
    let mut results = Vec::with_capacity(artists.len());
    for artist in artists {
        let span = info_span!("update_artist", artist = %artist);
        results.push(update_artist(ctx, artist).instrument(span).await);
    }
    results
}

pub async fn update_artist(ctx: &CrawlContext, artist: &str) -> ArtistUpdateResult {
    info!("Crawling {} for shows", ctx.scraper.source_name());

    let records = match ctx.scraper.search(artist).await {
        Ok(records) => records,
        Err(e) => {
            error!("Crawl failed: {}", e);
            metrics::record_crawl("error");
            return ArtistUpdateResult::failed(artist, format!("Failed to process artist {artist}: {e}"));
        }
    };

    if records.is_empty() {
        warn!("No shows found");
        metrics::record_crawl("empty");
        return ArtistUpdateResult::failed(artist, "No shows found".to_string());
    }

    let report = match upload_blocking(ctx, records, artist).await {
        Ok(report) => report,
        Err(message) => {
            metrics::record_crawl("error");
            return ArtistUpdateResult::failed(artist, message);
        }
    };

    metrics::record_crawl(if report.committed { "ok" } else { "upload_failed" });
    let message = if report.committed {
        format!(
            "Update succeeded: {} new, {} skipped",
            report.new_count, report.skip_count
        )
    } else {
        "Update failed".to_string()
    };

    ArtistUpdateResult {
        artist: artist.to_string(),
        success: report.committed,
        message,
        report: Some(report),
    }
}

async fn upload_blocking(
    ctx: &CrawlContext,
    records: Vec<ShowRecord>,
    artist: &str,
) -> std::result::Result<UploadReport, String> {
    let store = ctx.store.clone();
    let uploader = ctx.uploader.clone();
    let artist_owned = artist.to_string();

    tokio::task::spawn_blocking(move || uploader.run_batch(store.as_ref(), &records, &artist_owned))
        .await
        .map_err(|e| {
            error!("Upload task did not finish: {}", e);
            format!("Error while uploading shows: {e}")
        })
}

/// Crawl without persisting anything
pub async fn crawl_only(ctx: &CrawlContext, artist: &str) -> Result<Vec<ShowRecord>> {
    let records = ctx.scraper.search(artist).await?;
    for record in &records {
        info!(
            "Show {:?} on {:?} at {:?} - {:?}, price {:?}",
            record.display_name(),
            record.date,
            record.city,
            record.venue,
            record.price
        );
    }
    Ok(records)
}

pub async fn list_shows(ctx: &CrawlContext, artist: &str) -> Result<Vec<ShowView>> {
    let store = ctx.store.clone();
    let artist = artist.to_string();
    let shows = tokio::task::spawn_blocking(move || store.shows_for_artist(&artist))
        .await
        .map_err(|e| crate::error::CrawlerError::StoreState(format!("query task failed: {e}")))??;
    Ok(shows.into_iter().map(ShowView::from).collect())
}
