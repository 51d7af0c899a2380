//! Progress and outcome reporting
//!
//! Pipeline stages report through the [`TransferObserver`] trait and never
//! print directly. Two observers ship with the crate: [`LoggingObserver`]
//! writes structured `tracing` records, and [`BroadcastObserver`] republishes
//! everything as [`Event`]s for [`crate::Relay::subscribe`] and the `/events`
//! stream.

use crate::types::{Event, Progress, SessionId, SessionOutcome, TransferStage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Progress log interval when the peer announced no length
const UNKNOWN_LENGTH_LOG_STEP: u64 = 10 * 1024 * 1024;

/// Sink for discrete progress and terminal-outcome events
///
/// Implementations are called inline from the transfer loop, so they must be
/// cheap and must not block.
pub trait TransferObserver: Send + Sync {
    /// A session entered `stage`
    fn on_stage(&self, _session_id: SessionId, _stage: TransferStage) {}

    /// Bytes were moved in the Downloading or Uploading stage
    fn on_progress(&self, progress: &Progress);

    /// A session finished
    fn on_outcome(&self, session_id: SessionId, outcome: &SessionOutcome);
}

/// Observer that logs through `tracing`
///
/// Progress is logged at `info` for the first chunk of a stage, then once per
/// tenth of the declared length (or every 10 MiB without one), and for the
/// final chunk.
#[derive(Debug, Default)]
pub struct LoggingObserver {
    last_logged: Mutex<HashMap<SessionId, (TransferStage, u64)>>,
}

impl LoggingObserver {
    /// Observer with no sessions seen yet
    pub fn new() -> Self {
        Self::default()
    }

    fn should_log(&self, progress: &Progress) -> bool {
        let step = progress
            .total
            .map(|total| (total / 10).max(1))
            .unwrap_or(UNKNOWN_LENGTH_LOG_STEP);
        let finished = progress.total == Some(progress.bytes);

        let mut last_logged = self.last_logged.lock().unwrap_or_else(|e| e.into_inner());
        match last_logged.get(&progress.session_id) {
            Some(&(stage, bytes))
                if stage == progress.stage && !finished && progress.bytes < bytes + step =>
            {
                false
            }
            _ => {
                last_logged.insert(progress.session_id, (progress.stage, progress.bytes));
                true
            }
        }
    }
}

impl TransferObserver for LoggingObserver {
    fn on_stage(&self, session_id: SessionId, stage: TransferStage) {
        tracing::info!(%session_id, %stage, "stage started");
    }

    fn on_progress(&self, progress: &Progress) {
        if !self.should_log(progress) {
            return;
        }

        let session_id = progress.session_id;
        let stage = progress.stage;
        match (progress.percent(), progress.total_megabytes()) {
            (Some(percent), Some(total_mb)) => tracing::info!(
                %session_id,
                %stage,
                bytes = progress.bytes,
                "{:.2}%, transferred: {:.2} mb, total: {:.2} mb",
                percent,
                progress.megabytes(),
                total_mb
            ),
            _ => tracing::info!(
                %session_id,
                %stage,
                bytes = progress.bytes,
                "transferred: {:.2} mb, total unknown",
                progress.megabytes()
            ),
        }
    }

    fn on_outcome(&self, session_id: SessionId, outcome: &SessionOutcome) {
        self.last_logged
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session_id);

        match outcome {
            SessionOutcome::Done { filename, bytes } => {
                tracing::info!(%session_id, filename = %filename, bytes, "session complete");
            }
            SessionOutcome::Failed {
                stage,
                error,
                artifact,
            } => {
                tracing::error!(
                    %session_id,
                    %stage,
                    error = %error,
                    artifact = ?artifact,
                    "session failed"
                );
            }
        }
    }
}

/// Observer that republishes events on a broadcast channel
///
/// Send errors (no subscribers) are ignored.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<Event>,
}

impl BroadcastObserver {
    /// Wrap an existing sender
    pub fn new(tx: broadcast::Sender<Event>) -> Self {
        Self { tx }
    }
}

impl TransferObserver for BroadcastObserver {
    fn on_stage(&self, session_id: SessionId, stage: TransferStage) {
        self.tx.send(Event::StageChanged { session_id, stage }).ok();
    }

    fn on_progress(&self, progress: &Progress) {
        self.tx.send(Event::Progress(progress.clone())).ok();
    }

    fn on_outcome(&self, session_id: SessionId, outcome: &SessionOutcome) {
        self.tx
            .send(Event::Finished {
                session_id,
                outcome: outcome.clone(),
                timestamp: chrono::Utc::now().timestamp(),
            })
            .ok();
    }
}

/// Fan-out to several observers in registration order
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn TransferObserver>>,
}

impl ObserverSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer
    pub fn push(&mut self, observer: Arc<dyn TransferObserver>) {
        self.observers.push(observer);
    }
}

impl TransferObserver for ObserverSet {
    fn on_stage(&self, session_id: SessionId, stage: TransferStage) {
        for observer in &self.observers {
            observer.on_stage(session_id, stage);
        }
    }

    fn on_progress(&self, progress: &Progress) {
        for observer in &self.observers {
            observer.on_progress(progress);
        }
    }

    fn on_outcome(&self, session_id: SessionId, outcome: &SessionOutcome) {
        for observer in &self.observers {
            observer.on_outcome(session_id, outcome);
        }
    }
}
