//! Local artifact lifecycle
//!
//! Each session owns one directory under the artifact root, named after its
//! [`SessionId`], and at most one artifact file inside it. Concurrent sessions
//! therefore never share a path even when their artifacts have the same name.

use crate::error::{Error, Result};
use crate::types::SessionId;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Fallback name when the provider-supplied filename is unusable
const FALLBACK_FILENAME: &str = "artifact";

/// Owner of the artifact root directory
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root` (created lazily)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Artifact root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path for `filename` within the session's own directory
    ///
    /// The filename is reduced to its final component so a hostile URL
    /// segment cannot escape the session directory.
    pub fn session_path(&self, session_id: SessionId, filename: &str) -> PathBuf {
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty() && *n != "." && *n != "..")
            .unwrap_or(FALLBACK_FILENAME);

        self.root.join(session_id.to_string()).join(name)
    }

    /// Make `path` ready for a fresh download
    ///
    /// Creates the session directory and removes anything already at `path`.
    pub async fn prepare(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::file_io(parent, e))?;
        }
        remove_file_if_exists(path).await
    }

    /// Remove the artifact at `path`
    ///
    /// A missing file is not an error. The session directory is removed too
    /// once it is empty.
    pub async fn delete(&self, path: &Path) -> Result<()> {
        remove_file_if_exists(path).await?;
        self.prune(path).await;
        Ok(())
    }

    /// Remove the session directory holding `path` if nothing is left in it
    ///
    /// A kept artifact keeps its directory.
    pub async fn prune(&self, path: &Path) {
        let Some(parent) = path.parent() else {
            return;
        };
        if parent == self.root || !parent.starts_with(&self.root) {
            return;
        }

        match fs::remove_dir(parent).await {
            Ok(()) => debug!(path = ?parent, "removed session directory"),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::DirectoryNotEmpty
                ) => {}
            Err(e) => warn!(path = ?parent, error = %e, "could not remove session directory"),
        }
    }
}

async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!(?path, "removed artifact");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::file_io(path, e)),
    }
}
