//! Application state for the webhook server

use crate::{Config, Relay};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request; both fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// Session orchestrator
    pub relay: Relay,

    /// Configuration (same instance the relay holds)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(relay: Relay) -> Self {
        let config = relay.config().clone();
        Self { relay, config }
    }
}
