//! Error types for build-relay
//!
//! This module provides the error taxonomy for the relay, including:
//! - Webhook rejections (authentication, authorization, build status)
//! - Per-stage pipeline failures (metadata fetch, download, upload)
//! - HTTP status code mapping for the webhook and API surface
//! - Structured error responses with machine-readable error codes

use crate::types::BuildStatus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for build-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for build-relay
///
/// Every pipeline-stage variant is terminal for the session that produced it.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "AUTH_KEY")
        key: Option<String>,
    },

    /// Webhook rejected before any pipeline work
    #[error("webhook rejected: {0}")]
    Auth(#[from] AuthError),

    /// Webhook accepted but carried no build-detail link
    #[error("No build link from Unity Cloud Build webhook")]
    LinkMissing,

    /// Build metadata could not be retrieved
    #[error("metadata fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Binary download failed
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    /// Upload to the distribution service failed
    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    /// Local artifact file operation failed
    #[error("file I/O error at {}: {source}", path.display())]
    FileIo {
        /// The artifact path being operated on
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Session exceeded its overall deadline
    #[error("session timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (malformed webhook body, etc.)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new sessions
    #[error("shutdown in progress: not accepting new sessions")]
    ShuttingDown,

    /// HTTP server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Wrap an I/O error with the artifact path it concerns
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::FileIo {
            path: path.into(),
            source,
        }
    }
}

/// Reasons a webhook is refused
///
/// All variants produce the same externally visible outcome (401); the
/// distinction only exists for logging.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Authorization header missing or not equal to the configured secret
    #[error("invalid authorization header")]
    InvalidSecret,

    /// Notification is for a different project
    #[error("invalid project guid {received:?}")]
    ProjectMismatch {
        /// The project GUID carried by the notification
        received: String,
    },

    /// Build did not succeed
    #[error("invalid build status {status}")]
    BuildNotSuccessful {
        /// The status carried by the notification
        status: BuildStatus,
    },
}

/// Build metadata retrieval failures
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection or protocol failure talking to the build API
    #[error("transport error requesting {url}: {source}")]
    Transport {
        /// The metadata URL
        url: String,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// Build API answered with a non-success status
    #[error("build API returned HTTP {status} for {url}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// The metadata URL
        url: String,
    },

    /// Response body was not usable build metadata
    #[error("could not decode build metadata from {url}: {reason}")]
    Decode {
        /// The metadata URL
        url: String,
        /// What was wrong with the body
        reason: String,
    },
}

/// Binary download failures
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Download host answered with a non-success status
    #[error("download host returned HTTP {status} for {url}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// The binary URL
        url: String,
    },

    /// Connection dropped or stream errored while downloading
    #[error("transport error downloading {url}: {source}")]
    Transport {
        /// The binary URL
        url: String,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },
}

/// Distribution upload failures
#[derive(Debug, Error)]
pub enum UploadError {
    /// Distribution service answered with something other than 200/201
    #[error("distribution service returned HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnosis
        body: String,
    },

    /// Connection failure or local read failure while streaming the upload
    #[error("transport error uploading to {url}: {source}")]
    Transport {
        /// The upload URL
        url: String,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "unauthorized",
///     "message": "webhook rejected"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "unauthorized", "bad_request")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }

    /// Create a "bad request" error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - unparseable webhook body
            Error::Serialization(_) => 400,

            // 401 Unauthorized - every rejection looks the same to the caller
            Error::Auth(_) => 401,

            // 200 OK - acknowledged with the ack's error flag set
            Error::LinkMissing => 200,

            // 502 Bad Gateway - upstream provider or sink failures
            Error::Fetch(_) => 502,
            Error::Download(_) => 502,
            Error::Upload(_) => 502,

            // 504 Gateway Timeout
            Error::Timeout(_) => 504,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,

            // 500 Internal Server Error
            Error::Config { .. } => 500,
            Error::FileIo { .. } => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Auth(_) => "unauthorized",
            Error::LinkMissing => "link_missing",
            Error::Fetch(e) => match e {
                FetchError::Transport { .. } => "fetch_transport",
                FetchError::HttpStatus { .. } => "fetch_http_status",
                FetchError::Decode { .. } => "fetch_decode",
            },
            Error::Download(e) => match e {
                DownloadError::HttpStatus { .. } => "download_http_status",
                DownloadError::Transport { .. } => "download_transport",
            },
            Error::Upload(e) => match e {
                UploadError::HttpStatus { .. } => "upload_http_status",
                UploadError::Transport { .. } => "upload_transport",
            },
            Error::FileIo { .. } => "file_io_error",
            Error::Timeout(_) => "timeout",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "bad_request",
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();

        // Rejection detail stays in the logs; the caller only learns it was denied.
        let message = match &error {
            Error::Auth(_) => "webhook rejected".to_string(),
            other => other.to_string(),
        };

        let details = match &error {
            Error::Fetch(FetchError::HttpStatus { status, url }) => Some(serde_json::json!({
                "status": status,
                "url": url,
            })),
            Error::Download(DownloadError::HttpStatus { status, url }) => {
                Some(serde_json::json!({
                    "status": status,
                    "url": url,
                }))
            }
            Error::Upload(UploadError::HttpStatus { status, .. }) => Some(serde_json::json!({
                "status": status,
            })),
            Error::FileIo { path, .. } => Some(serde_json::json!({
                "path": path,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
