//! Build-completion webhook

use crate::api::{AppState, validate};
use crate::error::Error;
use crate::types::{BuildNotification, WebhookAck};
use axum::{Json, body::Bytes, extract::State, http::HeaderMap};

/// POST /build - Build-completion notification
///
/// The reply never depends on the session: the session task is detached and
/// yields before fetching, and its progress and failures are only visible
/// through the event stream and logs.
#[utoipa::path(
    post,
    path = "/build",
    tag = "webhook",
    request_body(
        content = String,
        description = "Build notification as sent by the build provider",
        content_type = "application/json"
    ),
    params(
        ("Authorization" = String, Header, description = "Shared webhook secret")
    ),
    responses(
        (status = 200, description = "Notification accepted (error is true when it carried no build link)", body = WebhookAck),
        (status = 400, description = "Body is missing or not valid JSON", body = crate::error::ApiError),
        (status = 401, description = "Wrong secret, wrong project or unsuccessful build", body = crate::error::ApiError),
        (status = 503, description = "Server is shutting down", body = crate::error::ApiError)
    )
)]
pub async fn receive_build(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, Error> {
    let notification: BuildNotification = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, bytes = body.len(), "unparseable webhook body");
        Error::Serialization(e)
    })?;

    if let Err(reason) = validate::authorize(&headers, &notification, &state.config.webhook) {
        tracing::warn!(
            reason = %reason,
            project = %notification.project_name,
            target = %notification.build_target_name,
            "webhook rejected"
        );
        return Err(reason.into());
    }

    let link = match notification.build_detail_link() {
        Some(link) => link,
        None => {
            let reason = Error::LinkMissing;
            tracing::warn!(
                error = %reason,
                project = %notification.project_name,
                target = %notification.build_target_name,
                "nothing to relay"
            );
            return Ok(Json(WebhookAck::not_started(&reason)));
        }
    };

    let session = state.relay.spawn_session(&notification, link)?;
    tracing::debug!(session_id = %session.id, link = %link, "session spawned");

    Ok(Json(WebhookAck::accepted(
        &notification.project_name,
        &notification.build_target_name,
    )))
}
