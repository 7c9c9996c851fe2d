//! Prometheus counters for crawls and uploads.
//!
//! Counters are recorded through the `metrics` facade; until [`init_metrics`]
//! installs a recorder they are no-ops, which is what unit tests rely on.

use crate::upload::UploadReport;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

pub const SHOWS_INSERTED: &str = "shows_inserted_total";
pub const SHOWS_REPLACED: &str = "shows_replaced_total";
pub const SHOWS_SKIPPED: &str = "shows_skipped_total";
pub const SHOWS_INVALID: &str = "shows_invalid_total";
pub const SHOWS_FAILED: &str = "shows_failed_total";
pub const UPLOAD_BATCHES: &str = "upload_batches_total";
pub const CRAWL_REQUESTS: &str = "crawl_requests_total";

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Idempotent.
pub fn init_metrics() {
    HANDLE.get_or_init(|| {
        let handle = match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
                // A detached recorder still renders, it just sees no global events.
                PrometheusBuilder::new().build_recorder().handle()
            }
        };
        describe();
        info!("Prometheus recorder installed");
        handle
    });
}

fn describe() {
    describe_counter!(SHOWS_INSERTED, "Show rows staged for insertion and committed");
    describe_counter!(SHOWS_REPLACED, "Rows superseded by a higher-priority source");
    describe_counter!(SHOWS_SKIPPED, "Scraped shows dropped as duplicates");
    describe_counter!(SHOWS_INVALID, "Scraped shows missing a required field");
    describe_counter!(SHOWS_FAILED, "Scraped shows with an unparseable date");
    describe_counter!(UPLOAD_BATCHES, "Upload batches by result");
    describe_counter!(CRAWL_REQUESTS, "Per-artist crawls by result");
}

/// Prometheus text exposition, if the recorder is installed
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

pub fn record_upload(report: &UploadReport) {
    let result = if report.committed { "committed" } else { "rolled_back" };
    counter!(UPLOAD_BATCHES, "result" => result).increment(1);
    if report.committed {
        counter!(SHOWS_INSERTED).increment(report.new_count as u64);
        counter!(SHOWS_REPLACED).increment(report.replaced_count as u64);
    }
    counter!(SHOWS_SKIPPED).increment(report.skip_count as u64);
    counter!(SHOWS_INVALID).increment(report.invalid_count as u64);
    counter!(SHOWS_FAILED).increment(report.failed_count as u64);
}

pub fn record_crawl(result: &'static str) {
    counter!(CRAWL_REQUESTS, "result" => result).increment(1);
}
