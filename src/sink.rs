//! Artifact distribution sinks
//!
//! A [`DistributionSink`] receives the finished artifact from local storage.
//! [`HockeyApp`] streams it as a multipart form to the app-versions endpoint;
//! the file is never read into memory as a whole.

use crate::config::DistributionConfig;
use crate::error::{Error, Result, UploadError};
use crate::retry::{RetryPolicy, with_retry};
use crate::transfer::ProgressTracker;
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

/// Result of a successful upload
#[derive(Clone, Debug, PartialEq)]
pub struct UploadReceipt {
    /// HTTP status returned by the sink (200 or 201)
    pub status: u16,
    /// Bytes of the artifact that were streamed
    pub bytes: u64,
    /// Response body, when it was JSON
    pub response: Option<serde_json::Value>,
}

/// Destination for finished artifacts
#[async_trait]
pub trait DistributionSink: Send + Sync {
    /// Stream the file at `artifact` to the sink under `filename`
    ///
    /// `tracker` starts at zero with the file length as total; implementations
    /// advance a copy of it for every chunk sent.
    async fn upload(
        &self,
        artifact: &Path,
        filename: &str,
        tracker: &ProgressTracker,
    ) -> Result<UploadReceipt>;
}

/// HockeyApp app-versions upload
pub struct HockeyApp {
    client: reqwest::Client,
    config: DistributionConfig,
    retry: Arc<dyn RetryPolicy>,
}

impl HockeyApp {
    /// Create a sink for the configured application
    pub fn new(
        client: reqwest::Client,
        config: DistributionConfig,
        retry: Arc<dyn RetryPolicy>,
    ) -> Self {
        Self {
            client,
            config,
            retry,
        }
    }

    /// Multipart form streaming `artifact`, and the artifact's length
    async fn form(
        &self,
        artifact: &Path,
        filename: &str,
        tracker: &ProgressTracker,
    ) -> Result<(Form, u64)> {
        let file = tokio::fs::File::open(artifact)
            .await
            .map_err(|e| Error::file_io(artifact, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| Error::file_io(artifact, e))?
            .len();

        let mut tracker = tracker.clone();
        tracker.set_total(Some(len));
        let stream = ReaderStream::new(file).inspect_ok(move |chunk| tracker.advance(chunk.len()));

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), len)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|source| UploadError::Transport {
                url: self.config.upload_url(),
                source,
            })?;

        let form = Form::new()
            .text("status", self.config.release_status.to_string())
            .text("notes", self.config.release_notes.clone())
            .text("notes_type", self.config.notes_type.to_string())
            .text("notify", self.config.notify.to_string())
            .part(self.config.file_field.clone(), part);

        Ok((form, len))
    }

    async fn upload_once(
        &self,
        url: &str,
        artifact: &Path,
        filename: &str,
        tracker: &ProgressTracker,
    ) -> Result<UploadReceipt> {
        let (form, bytes) = self.form(artifact, filename, tracker).await?;

        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .header("X-HockeyAppToken", &self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|source| UploadError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status().as_u16();
        if status != 200 && status != 201 {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::HttpStatus { status, body }.into());
        }

        // Drain the body before the upload counts as complete
        let body = response
            .text()
            .await
            .map_err(|source| UploadError::Transport {
                url: url.to_string(),
                source,
            })?;
        tracing::debug!(status, body = %body, "distribution service response");

        Ok(UploadReceipt {
            status,
            bytes,
            response: serde_json::from_str(&body).ok(),
        })
    }
}

#[async_trait]
impl DistributionSink for HockeyApp {
    async fn upload(
        &self,
        artifact: &Path,
        filename: &str,
        tracker: &ProgressTracker,
    ) -> Result<UploadReceipt> {
        let url = self.config.upload_url();
        tracing::info!(url = %url, path = ?artifact, filename = %filename, "starting upload");

        with_retry(self.retry.as_ref(), "upload", || {
            self.upload_once(&url, artifact, filename, tracker)
        })
        .await
    }
}
