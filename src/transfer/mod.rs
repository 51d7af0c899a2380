//! Binary transfer pipeline
//!
//! A session moves through `Fetching → Downloading → Uploading → Cleaning →
//! Done`, or stops at `Failed`. Within one session every stage fully completes
//! before the next begins: the downloaded file is flushed, synced and closed
//! before the upload opens it, and the upload response is drained before the
//! file is deleted.
//!
//! # Submodules
//!
//! - [`download`] - Stream the binary from the download host into the session's file

pub mod download;

use crate::error::Result;
use crate::observer::TransferObserver;
use crate::retry::RetryPolicy;
use crate::sink::DistributionSink;
use crate::storage::ArtifactStore;
use crate::types::{BuildMetadata, Progress, SessionId, SessionOutcome, TransferStage};
use std::path::PathBuf;
use std::sync::Arc;

pub use download::download_to_file;

/// Mutable state of one relay run, from acceptance to terminal outcome
#[derive(Clone, Debug)]
pub struct TransferSession {
    /// Session identifier, also the artifact's directory name
    pub id: SessionId,
    /// Current stage
    pub stage: TransferStage,
    /// Artifact filename, known once metadata has been fetched
    pub filename: Option<String>,
    /// Local artifact path, known once metadata has been fetched
    pub local_path: Option<PathBuf>,
    /// Declared length of the current sub-stage, if any
    pub total_bytes: Option<u64>,
    /// Bytes moved in the current sub-stage
    pub bytes_transferred: u64,
}

impl TransferSession {
    /// A session that has just been accepted and is about to fetch metadata
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            stage: TransferStage::Fetching,
            filename: None,
            local_path: None,
            total_bytes: None,
            bytes_transferred: 0,
        }
    }

    /// Move to `stage`, resetting the byte counters
    pub fn enter(&mut self, stage: TransferStage, observer: &dyn TransferObserver) {
        self.stage = stage;
        self.total_bytes = None;
        self.bytes_transferred = 0;
        observer.on_stage(self.id, stage);
    }

    /// Terminal outcome for a finished run
    ///
    /// On failure the stage that was active when the error occurred is kept,
    /// along with the artifact path if a file was left on disk.
    pub fn outcome(&self, result: &Result<u64>) -> SessionOutcome {
        match result {
            Ok(bytes) => SessionOutcome::Done {
                filename: self.filename.clone().unwrap_or_default(),
                bytes: *bytes,
            },
            Err(e) => SessionOutcome::Failed {
                stage: self.stage,
                error: e.to_string(),
                artifact: self.local_path.clone().filter(|p| p.exists()),
            },
        }
    }
}

/// Cumulative byte counter for one sub-stage that reports every chunk
#[derive(Clone)]
pub struct ProgressTracker {
    session_id: SessionId,
    stage: TransferStage,
    bytes: u64,
    total: Option<u64>,
    observer: Arc<dyn TransferObserver>,
}

impl ProgressTracker {
    /// Start counting from zero for `stage`
    pub fn new(
        session_id: SessionId,
        stage: TransferStage,
        total: Option<u64>,
        observer: Arc<dyn TransferObserver>,
    ) -> Self {
        Self {
            session_id,
            stage,
            bytes: 0,
            total,
            observer,
        }
    }

    /// Record the declared length once the peer has announced it
    pub fn set_total(&mut self, total: Option<u64>) {
        self.total = total;
    }

    /// Account for `n` more bytes and emit a progress event
    pub fn advance(&mut self, n: usize) {
        self.bytes = self.bytes.saturating_add(n as u64);
        self.observer.on_progress(&self.snapshot());
    }

    /// Bytes counted so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Declared length, if known
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Current state as a progress event
    pub fn snapshot(&self) -> Progress {
        Progress {
            session_id: self.session_id,
            stage: self.stage,
            bytes: self.bytes,
            total: self.total,
        }
    }
}

/// Moves one artifact from the download host to the distribution sink
pub struct TransferPipeline {
    client: reqwest::Client,
    store: ArtifactStore,
    sink: Arc<dyn DistributionSink>,
    retry: Arc<dyn RetryPolicy>,
}

impl TransferPipeline {
    /// Create a pipeline over shared HTTP client, storage and sink
    pub fn new(
        client: reqwest::Client,
        store: ArtifactStore,
        sink: Arc<dyn DistributionSink>,
        retry: Arc<dyn RetryPolicy>,
    ) -> Self {
        Self {
            client,
            store,
            sink,
            retry,
        }
    }

    /// Local artifact storage
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Download, upload and clean up the artifact described by `metadata`
    ///
    /// Returns the number of bytes uploaded. The local file is deleted only
    /// after a successful upload; on any failure it is left where it is and
    /// `session.local_path` points at it.
    pub async fn transfer(
        &self,
        session: &mut TransferSession,
        metadata: BuildMetadata,
        observer: &Arc<dyn TransferObserver>,
    ) -> Result<u64> {
        let path = self.store.session_path(session.id, &metadata.filename);
        session.filename = Some(metadata.filename.clone());
        session.local_path = Some(path.clone());

        // Download
        session.enter(TransferStage::Downloading, observer.as_ref());
        self.store.prepare(&path).await?;
        let mut tracker = ProgressTracker::new(
            session.id,
            TransferStage::Downloading,
            None,
            observer.clone(),
        );
        let downloaded = download_to_file(
            &self.client,
            self.retry.as_ref(),
            &metadata.download_url,
            &path,
            &mut tracker,
        )
        .await?;
        session.total_bytes = tracker.total();
        session.bytes_transferred = downloaded;

        tracing::info!(
            session_id = %session.id,
            path = ?path,
            bytes = downloaded,
            "download complete"
        );

        // Upload
        session.enter(TransferStage::Uploading, observer.as_ref());
        let tracker = ProgressTracker::new(
            session.id,
            TransferStage::Uploading,
            Some(downloaded),
            observer.clone(),
        );
        let receipt = self
            .sink
            .upload(&path, &metadata.filename, &tracker)
            .await?;
        session.total_bytes = Some(receipt.bytes);
        session.bytes_transferred = receipt.bytes;

        tracing::info!(
            session_id = %session.id,
            status = receipt.status,
            bytes = receipt.bytes,
            "upload complete"
        );

        // Cleanup
        session.enter(TransferStage::Cleaning, observer.as_ref());
        self.store.delete(&path).await?;

        session.enter(TransferStage::Done, observer.as_ref());
        Ok(receipt.bytes)
    }
}
