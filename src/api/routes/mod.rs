//! Route handlers
//!
//! - [`webhook`] - Build-completion notifications
//! - [`system`] - Health, events, OpenAPI

mod system;
mod webhook;

pub use system::*;
pub use webhook::*;
