/// HTTP mapping for Songdrop errors.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use songdrop_shared::errors::{FetchError, SongdropError, UrlError};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error returned by handlers; renders as `(status, {"error": ...})`.
#[derive(Debug)]
pub struct ApiError(pub SongdropError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SongdropError::Url(_) => StatusCode::BAD_REQUEST,
            SongdropError::Fetch(e) => match e {
                FetchError::UnsupportedUrl(_) => StatusCode::UNPROCESSABLE_ENTITY,
                FetchError::AuthRequired => StatusCode::FORBIDDEN,
                FetchError::Unavailable(_) => StatusCode::NOT_FOUND,
                FetchError::Network(_) | FetchError::Failed { .. } => StatusCode::BAD_GATEWAY,
                FetchError::SpawnFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
                FetchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                FetchError::TranscoderMissing
                | FetchError::OutputMissing(_)
                | FetchError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            SongdropError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Server-side details stay in the logs.
    fn public_message(&self) -> String {
        match &self.0 {
            SongdropError::Url(e) => e.to_string(),
            SongdropError::Fetch(e) => match e {
                FetchError::SpawnFailed(_) => "Downloader is not available".to_string(),
                FetchError::OutputMissing(_) => "Download produced no audio file".to_string(),
                FetchError::Io(_) => "Internal server error".to_string(),
                other => other.to_string(),
            },
            SongdropError::Io(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self.0);
        } else {
            warn!("Request rejected ({}): {}", status, self.0);
        }
        (status, Json(ErrorBody { error: self.public_message() })).into_response()
    }
}

impl From<SongdropError> for ApiError {
    fn from(e: SongdropError) -> Self {
        ApiError(e)
    }
}

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        ApiError(e.into())
    }
}

impl From<UrlError> for ApiError {
    fn from(e: UrlError) -> Self {
        ApiError(e.into())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from(UrlError::Missing).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(FetchError::UnsupportedUrl("x".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ApiError::from(FetchError::Timeout(300)).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ApiError::from(FetchError::SpawnFailed("yt-dlp".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(FetchError::Failed { code: 1, detail: "boom".into() }).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_server_paths_not_leaked() {
        let err = ApiError::from(FetchError::OutputMissing("/srv/downloads/abc/downloaded_song.mp3".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("/srv"));
    }

    #[test]
    fn test_io_errors_are_internal() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "/srv/downloads denied");
        let err = ApiError::from(io);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
    }
}
