//! Core types and events for build-relay

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identifier for a transfer session
///
/// Time-ordered (UUIDv7), so session directories sort by creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a fresh session identifier
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Build outcome reported by the build provider
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    /// Build produced an artifact
    Success,
    /// Build failed
    Failure,
    /// Build was canceled
    Canceled,
    /// Any other status (queued, started, restarted, ...)
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BuildStatus::Success => "success",
            BuildStatus::Failure => "failure",
            BuildStatus::Canceled => "canceled",
            BuildStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A hypermedia link as published by the build provider
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Link target (relative path for API links, absolute URL for downloads)
    #[serde(default)]
    pub href: String,
}

/// Links block of a build notification
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationLinks {
    /// Link to the build's detail resource in the provider API
    #[serde(default)]
    pub api_self: Option<Link>,
}

/// Inbound build-completion webhook payload
///
/// Missing string fields deserialize as empty so that an incomplete payload
/// is rejected by validation rather than by parsing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildNotification {
    /// Provider project identifier
    #[serde(default)]
    pub project_guid: String,
    /// Build outcome
    #[serde(default)]
    pub build_status: BuildStatus,
    /// Provider build number, when present
    #[serde(default)]
    pub build_number: Option<u64>,
    /// Human-readable project name
    #[serde(default)]
    pub project_name: String,
    /// Build target (platform) name
    #[serde(default)]
    pub build_target_name: String,
    /// Hypermedia links
    #[serde(default)]
    pub links: NotificationLinks,
}

impl BuildNotification {
    /// Relative build-detail link, if the notification carries a non-empty one
    pub fn build_detail_link(&self) -> Option<&str> {
        self.links
            .api_self
            .as_ref()
            .map(|link| link.href.as_str())
            .filter(|href| !href.is_empty())
    }
}

/// Immediate JSON reply to an accepted webhook
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    /// True when no pipeline work was started
    pub error: bool,
    /// Human-readable summary
    pub message: String,
}

impl WebhookAck {
    /// Acknowledge a notification whose pipeline has been started
    pub fn accepted(project_name: &str, build_target_name: &str) -> Self {
        Self {
            error: false,
            message: format!(
                "Process begun for project '{}' platform '{}'.",
                project_name, build_target_name
            ),
        }
    }

    /// Reply for a valid notification that started no pipeline work
    pub fn not_started(reason: &crate::error::Error) -> Self {
        Self {
            error: true,
            message: reason.to_string(),
        }
    }
}

/// Download location of a build's primary artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildMetadata {
    /// Where the binary can be streamed from
    pub download_url: url::Url,
    /// Final path segment of `download_url`, percent-decoded
    pub filename: String,
}

/// Pipeline stage of a transfer session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStage {
    /// Querying the build provider for metadata
    Fetching,
    /// Streaming the binary to local storage
    Downloading,
    /// Streaming the binary to the distribution service
    Uploading,
    /// Removing the local artifact
    Cleaning,
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed,
}

impl std::fmt::Display for TransferStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferStage::Fetching => "fetching",
            TransferStage::Downloading => "downloading",
            TransferStage::Uploading => "uploading",
            TransferStage::Cleaning => "cleaning",
            TransferStage::Done => "done",
            TransferStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Progress snapshot emitted after every chunk of a download or upload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Session the bytes belong to
    pub session_id: SessionId,
    /// Downloading or Uploading
    pub stage: TransferStage,
    /// Bytes moved so far in this stage
    pub bytes: u64,
    /// Declared length, when the peer provided one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

const BYTES_PER_MEGABYTE: f64 = 1_048_576.0;

impl Progress {
    /// Percent complete, only defined when a non-zero total is known
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some(100.0 * self.bytes as f64 / total as f64),
            _ => None,
        }
    }

    /// Bytes moved so far, in megabytes
    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / BYTES_PER_MEGABYTE
    }

    /// Declared total, in megabytes
    pub fn total_megabytes(&self) -> Option<f64> {
        self.total.map(|t| t as f64 / BYTES_PER_MEGABYTE)
    }
}

/// Terminal result of a transfer session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Artifact delivered and local copy removed
    Done {
        /// Artifact filename
        filename: String,
        /// Bytes uploaded
        bytes: u64,
    },
    /// Session stopped at `stage`
    Failed {
        /// Stage that failed
        stage: TransferStage,
        /// Error description
        error: String,
        /// Artifact left on disk for inspection, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        artifact: Option<PathBuf>,
    },
}

/// Events broadcast to subscribers and the `/events` stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A webhook was accepted and a session spawned
    SessionStarted {
        /// Session ID
        session_id: SessionId,
        /// Project name from the notification
        project_name: String,
        /// Build target from the notification
        build_target_name: String,
    },

    /// A session moved to a new stage
    StageChanged {
        /// Session ID
        session_id: SessionId,
        /// The stage just entered
        stage: TransferStage,
    },

    /// Byte progress within Downloading or Uploading
    Progress(Progress),

    /// A session reached a terminal state
    Finished {
        /// Session ID
        session_id: SessionId,
        /// How it ended
        outcome: SessionOutcome,
        /// Unix timestamp of completion
        timestamp: i64,
    },
}
