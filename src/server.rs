use crate::metrics;
use crate::tasks::{crawl_only, list_shows, update_artists, CrawlContext, UpdateParams};
use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hyper::Server;
use serde_json::json;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn update_shows(
    State(ctx): State<CrawlContext>,
    Json(params): Json<UpdateParams>,
) -> impl IntoResponse {
    info!("Update requested for {} artists", params.artists.len());
    let results = update_artists(&ctx, &params.artists).await;
    Json(json!({ "success": true, "data": results }))
}

async fn get_shows(State(ctx): State<CrawlContext>, Path(artist_name): Path<String>) -> Response {
    match list_shows(&ctx, &artist_name).await {
        Ok(shows) if shows.is_empty() => Json(json!({
            "success": false,
            "message": format!("No shows found for {artist_name}"),
            "data": null
        }))
        .into_response(),
        Ok(shows) => Json(json!({
            "success": true,
            "message": format!("Found {} shows", shows.len()),
            "data": shows
        }))
        .into_response(),
        Err(e) => {
            error!("Failed to load shows for {}: {}", artist_name, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "message": e.to_string(), "data": null })),
            )
                .into_response()
        }
    }
}

/// Crawl an artist and return the raw listings without storing them
async fn test_crawl(State(ctx): State<CrawlContext>, Path(artist_name): Path<String>) -> Response {
    match crawl_only(&ctx, &artist_name).await {
        Ok(records) if records.is_empty() => Json(json!({
            "success": false,
            "message": format!("No shows found for {artist_name}"),
            "data": null
        }))
        .into_response(),
        Ok(records) => Json(json!({
            "success": true,
            "message": format!("Crawled {} shows", records.len()),
            "data": records
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "message": e.to_string(), "data": null })),
        )
            .into_response(),
    }
}

async fn test_db(State(ctx): State<CrawlContext>) -> Response {
    let store = ctx.store.clone();
    let diagnostics = tokio::task::spawn_blocking(move || store.diagnostics()).await;

    match diagnostics {
        Ok(Ok(report)) => Json(json!({
            "success": true,
            "message": "Database connection OK",
            "result": report.result,
            "version": report.version,
            "tables": report.tables,
            "shows_columns": report.shows_columns
        }))
        .into_response(),
        Ok(Err(e)) => db_failure(e.to_string()),
        Err(e) => db_failure(format!("diagnostics task failed: {e}")),
    }
}

fn db_failure(message: String) -> Response {
    error!("Database check failed: {}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "message": message })),
    )
        .into_response()
}

async fn metrics_text() -> Response {
    match metrics::render() {
        Some(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// Build the router with every API route
pub fn create_server(ctx: CrawlContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/crawler/update", post(update_shows))
        .route("/shows/:artist_name", get(get_shows))
        .route("/test/:artist_name", get(test_crawl))
        .route("/test-db", get(test_db))
        .route("/metrics", get(metrics_text))
        .with_state(ctx)
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(ctx: CrawlContext, port: u16) -> Result<(), hyper::Error> {
    let app = create_server(ctx);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server running on http://localhost:{}", port);
    info!("Health check: http://localhost:{}/health", port);

    Server::bind(&addr).serve(app.into_make_service()).await
}
