//! Session orchestration
//!
//! [`Relay`] owns the long-lived collaborators (metadata provider, transfer
//! pipeline, observers) and turns each accepted notification into a detached
//! session task. The webhook handler only calls [`Relay::spawn_session`]; it
//! never awaits the session, so its response cannot depend on the outcome.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::observer::{BroadcastObserver, LoggingObserver, ObserverSet, TransferObserver};
use crate::provider::{MetadataProvider, UnityCloudBuild};
use crate::retry::policy_from_config;
use crate::sink::{DistributionSink, HockeyApp};
use crate::storage::ArtifactStore;
use crate::transfer::{TransferPipeline, TransferSession};
use crate::types::{BuildNotification, Event, SessionId, TransferStage};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

/// Capacity of the event channel before slow subscribers start lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Summary of a successfully relayed artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    /// Session that relayed the artifact
    pub session_id: SessionId,
    /// Artifact filename
    pub filename: String,
    /// Bytes uploaded
    pub bytes: u64,
}

/// A spawned session
#[derive(Debug)]
pub struct SessionHandle {
    /// Session ID (also emitted in every event for the session)
    pub id: SessionId,
    /// The detached task; awaiting it is optional
    pub task: JoinHandle<Result<SessionReport>>,
}

/// Entry point wiring webhook intake to the transfer pipeline
#[derive(Clone)]
pub struct Relay {
    config: Arc<Config>,
    provider: Arc<dyn MetadataProvider>,
    pipeline: Arc<TransferPipeline>,
    observers: ObserverSet,
    event_tx: broadcast::Sender<Event>,
    tasks: TaskTracker,
    accepting: Arc<AtomicBool>,
}

impl Relay {
    /// Create a relay talking to the configured provider and distribution service
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("build-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config("http_client", format!("failed to build HTTP client: {}", e)))?;

        let retry = policy_from_config(&config.retry);
        let provider = Arc::new(UnityCloudBuild::new(
            client.clone(),
            &config.provider,
            retry.clone(),
        ));
        let sink = Arc::new(HockeyApp::new(
            client.clone(),
            config.distribution.clone(),
            retry,
        ));

        Ok(Self::with_components(config, client, provider, sink))
    }

    /// Create a relay with caller-supplied provider and sink
    pub fn with_components(
        config: Config,
        client: reqwest::Client,
        provider: Arc<dyn MetadataProvider>,
        sink: Arc<dyn DistributionSink>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let pipeline = TransferPipeline::new(
            client,
            ArtifactStore::new(config.transfer.artifact_dir.clone()),
            sink,
            policy_from_config(&config.retry),
        );

        let mut observers = ObserverSet::new();
        observers.push(Arc::new(LoggingObserver::new()));
        observers.push(Arc::new(BroadcastObserver::new(event_tx.clone())));

        Self {
            config: Arc::new(config),
            provider,
            pipeline: Arc::new(pipeline),
            observers,
            event_tx,
            tasks: TaskTracker::new(),
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Shared configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Subscribe to session events
    ///
    /// Each receiver sees every event sent after it subscribed. A receiver that
    /// falls more than 1000 events behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Number of sessions still running
    pub fn active_sessions(&self) -> usize {
        self.tasks.len()
    }

    /// False once shutdown has begun
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Start a detached session for an accepted notification
    ///
    /// Returns immediately; the session reports through the observers. The
    /// task yields once before fetching, but callers must not rely on any
    /// ordering beyond that: the session outcome is independent of whatever
    /// the caller does next.
    pub fn spawn_session(
        &self,
        notification: &BuildNotification,
        build_detail_link: &str,
    ) -> Result<SessionHandle> {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let id = SessionId::new();
        tracing::info!(
            session_id = %id,
            project = %notification.project_name,
            target = %notification.build_target_name,
            build_number = ?notification.build_number,
            "session accepted"
        );

        self.event_tx
            .send(Event::SessionStarted {
                session_id: id,
                project_name: notification.project_name.clone(),
                build_target_name: notification.build_target_name.clone(),
            })
            .ok();

        let span = tracing::info_span!("session", session_id = %id);
        let relay = self.clone();
        let link = build_detail_link.to_string();
        let task = self.tasks.spawn(
            async move {
                // Give the caller a chance to send its reply before upstream work starts
                tokio::task::yield_now().await;
                relay.run_session(id, &link).await
            }
            .instrument(span),
        );

        Ok(SessionHandle { id, task })
    }

    /// Run one session to completion under the configured deadline
    ///
    /// The outcome is always reported to the observers; the return value is
    /// for callers that await the session directly.
    pub async fn run_session(&self, id: SessionId, build_detail_link: &str) -> Result<SessionReport> {
        let observer: Arc<dyn TransferObserver> = Arc::new(self.observers.clone());
        let mut session = TransferSession::new(id);
        observer.on_stage(id, TransferStage::Fetching);

        let deadline = self.config.transfer.session_timeout;
        let result = match tokio::time::timeout(
            deadline,
            self.drive(&mut session, build_detail_link, &observer),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(deadline)),
        };

        let outcome = session.outcome(&result);
        if result.is_err() {
            if let Some(path) = &session.local_path {
                self.pipeline.store().prune(path).await;
            }
            session.enter(TransferStage::Failed, observer.as_ref());
        }
        observer.on_outcome(id, &outcome);

        result.map(|bytes| SessionReport {
            session_id: id,
            filename: session.filename.unwrap_or_default(),
            bytes,
        })
    }

    async fn drive(
        &self,
        session: &mut TransferSession,
        build_detail_link: &str,
        observer: &Arc<dyn TransferObserver>,
    ) -> Result<u64> {
        let metadata = self.provider.fetch(build_detail_link).await?;
        self.pipeline.transfer(session, metadata, observer).await
    }

    /// Stop accepting sessions and wait for running ones
    ///
    /// Waits at most `transfer.shutdown_grace`; sessions still running after
    /// that are left to the runtime.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting.store(false, Ordering::SeqCst);
        self.tasks.close();
        tracing::info!(active = self.tasks.len(), "Stopped accepting new sessions");

        let grace = self.config.transfer.shutdown_grace;
        match tokio::time::timeout(grace, self.tasks.wait()).await {
            Ok(()) => tracing::info!("All sessions completed"),
            Err(_) => tracing::warn!(
                remaining = self.tasks.len(),
                grace_secs = grace.as_secs(),
                "Timeout waiting for sessions to complete, proceeding with shutdown"
            ),
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
