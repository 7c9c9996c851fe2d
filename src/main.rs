use anyhow::Context;
use clap::{Parser, Subcommand};
use show_crawler::apis::ShowstartCrawler;
use show_crawler::config::Config;
use show_crawler::reconcile::Reconciler;
use show_crawler::storage::SqliteShowStore;
use show_crawler::tasks::{self, CrawlContext};
use show_crawler::upload::UploadService;
use show_crawler::{logging, metrics, server};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "show_crawler")]
#[command(about = "Crawls ticketing sites for artist shows and keeps one row per performance")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port to listen on (overrides config and PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Crawl and upload shows for the given artists once
    Crawl {
        /// Artists to update (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        artists: Vec<String>,
    },
    /// Print stored shows for an artist
    Shows { artist: String },
}

fn build_context(config: &Config) -> anyhow::Result<CrawlContext> {
    let store = SqliteShowStore::open(&config.database.path)
        .with_context(|| format!("opening database at {}", config.database.path))?;
    let scraper = ShowstartCrawler::new(config.crawler.clone()).context("building crawler")?;
    let uploader = UploadService::new(Reconciler::new(config.source_policy()));

    Ok(CrawlContext {
        store: Arc::new(store),
        scraper: Arc::new(scraper),
        uploader: Arc::new(uploader),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;

    let _log_guard = logging::init_logging(&config.logging.dir);
    metrics::init_metrics();

    let ctx = build_context(&config)?;

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.server.port);
            server::start_server(ctx, port).await?;
        }
        Commands::Crawl { artists } => {
            let artists: Vec<String> = artists
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();
            info!("Running update for {} artists", artists.len());

            let results = tasks::update_artists(&ctx, &artists).await;
            for result in &results {
                let mark = if result.success { "ok" } else { "FAILED" };
                println!("{:<8} {}: {}", mark, result.artist, result.message);
                if let Some(report) = &result.report {
                    println!(
                        "         new {}, skipped {}, replaced {}, invalid {}, failed {}",
                        report.new_count,
                        report.skip_count,
                        report.replaced_count,
                        report.invalid_count,
                        report.failed_count
                    );
                }
            }
        }
        Commands::Shows { artist } => match tasks::list_shows(&ctx, &artist).await {
            Ok(shows) if shows.is_empty() => println!("No shows stored for {artist}"),
            Ok(shows) => {
                for show in shows {
                    println!(
                        "{}  {}  {} {}  {}",
                        show.date,
                        show.name,
                        show.city.as_deref().unwrap_or("-"),
                        show.venue.as_deref().unwrap_or("-"),
                        show.detail_url.as_deref().unwrap_or("")
                    );
                }
            }
            Err(e) => {
                error!("Failed to read shows: {}", e);
                return Err(e.into());
            }
        },
    }

    Ok(())
}
