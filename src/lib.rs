//! # build-relay
//!
//! Relays cloud build artifacts from a build provider's completion webhook
//! into an app distribution service.
//!
//! ## Pipeline
//!
//! For every accepted notification a detached session runs:
//!
//! 1. **Fetch** - resolve the notification's build-detail link into a download URL
//! 2. **Download** - stream the binary into `<artifact_dir>/<session-id>/<filename>`
//! 3. **Upload** - stream the file as a multipart form to the distribution service
//! 4. **Clean** - delete the local file once the upload succeeded
//!
//! The webhook answers before step 1 starts. Progress and outcomes are
//! reported through [`observer::TransferObserver`]s and can be followed with
//! [`Relay::subscribe`] or the `/events` stream.
//!
//! ## Quick Start
//!
//! ```no_run
//! use build_relay::{Config, Relay, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let relay = Relay::new(Config::from_env()?)?;
//!
//!     // Subscribe to events
//!     let mut events = relay.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     run_with_shutdown(relay).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Webhook server
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Progress and outcome reporting
pub mod observer;
/// Build metadata retrieval
pub mod provider;
/// Session orchestration
pub mod relay;
/// Retry policies for outbound calls
pub mod retry;
/// Distribution sinks
pub mod sink;
/// Local artifact lifecycle
pub mod storage;
/// Download and transfer pipeline
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{
    ApiError, AuthError, DownloadError, Error, ErrorDetail, FetchError, Result, ToHttpStatus,
    UploadError,
};
pub use observer::{LoggingObserver, TransferObserver};
pub use provider::{MetadataProvider, UnityCloudBuild};
pub use relay::{Relay, SessionHandle, SessionReport};
pub use sink::{DistributionSink, HockeyApp, UploadReceipt};
pub use types::{
    BuildMetadata, BuildNotification, BuildStatus, Event, Progress, SessionId, SessionOutcome,
    TransferStage, WebhookAck,
};

/// Serve the webhook until a termination signal, then shut the relay down.
///
/// The HTTP listener stops accepting first; in-flight sessions then get
/// `transfer.shutdown_grace` to finish.
///
/// SIGINT (Ctrl+C) triggers shutdown everywhere, SIGTERM on Unix as well. A
/// signal whose handler cannot be installed is logged and ignored.
///
/// # Example
///
/// ```no_run
/// use build_relay::{Config, Relay, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let relay = Relay::new(Config::from_env()?)?;
///     run_with_shutdown(relay).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(relay: Relay) -> Result<()> {
    api::start_api_server(relay.clone(), wait_for_signal()).await?;
    relay.shutdown().await
}

/// Resolve once the process is asked to stop
async fn wait_for_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "SIGINT handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => tracing::info!(signal = "SIGINT", "shutdown requested"),
        () = terminate => tracing::info!(signal = "SIGTERM", "shutdown requested"),
    }
}
