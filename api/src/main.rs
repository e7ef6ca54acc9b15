/// Songdrop API Server
///
/// Serves a landing page and a single download endpoint that runs yt-dlp
/// for the submitted URL and returns the transcoded audio as an attachment.
mod config;
mod error;
mod routes;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use songdrop_downloader::{FetchDispatcher, YtDlpFetcher};

use config::AppConfig;

/// Shared application state for all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub dispatcher: FetchDispatcher,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::index))
        .route("/download", post(routes::download))
        .route("/health", get(routes::health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "songdrop_api=info,songdrop_downloader=info,tower_http=info".into()
            }),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .with_context(|| format!("creating download dir {}", config.download_dir.display()))?;
    info!("Download dir: {}", config.download_dir.display());

    match &config.fallback_url {
        Some(url) => warn!("Empty submissions will download the fallback URL {}", url),
        None => info!("Fallback URL disabled, empty submissions are rejected"),
    }

    let fetcher = YtDlpFetcher::new(config.ytdlp_bin.clone(), config.ffmpeg_path.clone());
    info!("Using fetcher binary: {}", fetcher.bin());
    let dispatcher = FetchDispatcher::new(
        Arc::new(fetcher),
        config.max_concurrent_fetches,
        config.fetch_timeout,
    );

    match dispatcher.version().await {
        Ok(version) => info!("yt-dlp version {}", version),
        Err(e) => warn!("yt-dlp is not usable yet: {}", e),
    }

    let addr = config.bind_addr();
    let state = Arc::new(AppState { config, dispatcher });

    info!("Songdrop listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Songdrop stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
