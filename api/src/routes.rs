/// Route handlers for the Songdrop service.
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{Form, Json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Instrument};

use songdrop_downloader::ScratchDir;
use songdrop_shared::errors::UrlError;
use songdrop_shared::models::{DownloadRequest, FetchConfig};
use songdrop_shared::url_guard::validate_source_url;

use crate::error::ApiError;
use crate::AppState;

static INDEX_HTML: &str = include_str!("../assets/index.html");

/// Use the submitted URL as-is when non-empty, else the fallback.
pub fn resolve_url(submitted: Option<String>, fallback: Option<&str>) -> Result<String, UrlError> {
    match submitted {
        Some(url) if !url.is_empty() => Ok(url),
        _ => fallback.map(str::to_string).ok_or(UrlError::Missing),
    }
}

// ====== PAGES ======

/// GET /
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    match state.dispatcher.version().await {
        Ok(version) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "fetcher": version,
                "free_slots": state.dispatcher.available_slots(),
                "max_concurrent": state.dispatcher.max_concurrent(),
            })),
        ),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "degraded", "error": e.to_string() })),
            )
        }
    }
}

// ====== DOWNLOAD ROUTE ======

/// POST /download - fetch the audio for `url` and return it as an attachment
pub async fn download(
    State(state): State<Arc<AppState>>,
    Form(body): Form<DownloadRequest>,
) -> Result<Response, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("download", request_id = %request_id);
    fetch_and_stream(state, request_id, body).instrument(span).await
}

async fn fetch_and_stream(
    state: Arc<AppState>,
    request_id: String,
    body: DownloadRequest,
) -> Result<Response, ApiError> {
    let submitted_empty = body.url.as_deref().map_or(true, str::is_empty);
    let url = resolve_url(body.url, state.config.fallback_url.as_deref())?;
    if submitted_empty {
        info!("No URL submitted, using fallback {}", url);
    }

    let source = validate_source_url(&url)?;
    info!("Download requested: kind={} url={}", source.kind, source.url);

    // Dropped on any early return below, taking the partial output with it
    let scratch = ScratchDir::create(&state.config.download_dir, &request_id)?;
    let fetch_config = FetchConfig::audio(
        scratch.path(),
        state.config.audio_codec,
        state.config.audio_quality.clone(),
    );

    let started = Instant::now();
    state.dispatcher.run(&source.url, &fetch_config).await?;

    let artifact = scratch.into_artifact(fetch_config.expected_output()).await?;
    info!(
        "Fetched {} ({} bytes) in {:.1?}, streaming",
        artifact.path().display(),
        artifact.len(),
        started.elapsed()
    );

    let len = artifact.len();
    let codec = fetch_config.target_codec().unwrap_or(state.config.audio_codec);
    let disposition = format!("attachment; filename=\"{}\"", fetch_config.attachment_name());
    let stream = artifact.into_stream().await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, codec.content_type().to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
