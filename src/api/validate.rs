//! Webhook authentication and authorization
//!
//! A notification is accepted only when all three checks pass, in order:
//! the `Authorization` header equals the shared secret, the project GUID is
//! the configured one, and the build succeeded.

use crate::config::WebhookConfig;
use crate::error::AuthError;
use crate::types::{BuildNotification, BuildStatus};
use axum::http::{HeaderMap, header::AUTHORIZATION};

/// Check a parsed notification and its request headers
pub fn authorize(
    headers: &HeaderMap,
    notification: &BuildNotification,
    config: &WebhookConfig,
) -> Result<(), AuthError> {
    let provided = headers
        .get(AUTHORIZATION)
        .map(|value| value.as_bytes())
        .unwrap_or_default();

    if config.authorization_key.is_empty()
        || !constant_time_eq(provided, config.authorization_key.as_bytes())
    {
        return Err(AuthError::InvalidSecret);
    }

    if notification.project_guid != config.project_guid {
        return Err(AuthError::ProjectMismatch {
            received: notification.project_guid.clone(),
        });
    }

    if notification.build_status != BuildStatus::Success {
        return Err(AuthError::BuildNotSuccessful {
            status: notification.build_status,
        });
    }

    Ok(())
}

/// Constant-time byte comparison to prevent timing side-channel attacks.
/// Always compares all bytes regardless of where the first mismatch occurs.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
