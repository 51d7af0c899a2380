//! Common test utilities for build-relay integration tests
//!
//! One `wiremock` server plays all three upstreams: the build provider API,
//! the download host and the distribution service.

#![allow(dead_code)]

use build_relay::{Config, Event, Relay, SessionId, SessionOutcome};
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const BUILD_LINK: &str = "/api/orgs/acme/projects/game/buildtargets/ios/builds/42";
pub const DOWNLOAD_PATH: &str = "/cdn/builds/42/App-Release.ipa";
pub const UPLOAD_PATH: &str = "/api/2/apps/app-123/app_versions";

/// Configuration pointing every upstream at `upstream`
pub fn test_config(upstream: &str, artifact_dir: &Path) -> Config {
    let mut config = Config::from_lookup(|key| {
        let value = match key {
            "AUTH_KEY" => "webhook-secret",
            "PROJECT_GUID" => "project-guid",
            "UNITYCLOUD_KEY" => "provider-key",
            "HOCKEYAPPID" => "app-123",
            "HOCKEYAPP_KEY" => "sink-key",
            "UNITYCLOUD_API_BASE" | "HOCKEYAPP_BASE" => upstream,
            _ => return None,
        };
        Some(value.to_string())
    })
    .expect("test config is valid");
    config.transfer.artifact_dir = artifact_dir.to_path_buf();
    config.transfer.session_timeout = Duration::from_secs(10);
    config
}

/// Relay wired to `upstream`
pub fn create_test_relay(upstream: &MockServer, artifact_dir: &Path) -> Relay {
    Relay::new(test_config(&upstream.uri(), artifact_dir)).expect("relay builds")
}

/// Provider answers `link` with a build resource pointing at `download_path`
pub async fn mount_build(upstream: &MockServer, link: &str, download_path: &str) {
    let href = format!("{}{}?X-Amz-Signature=abc123", upstream.uri(), download_path);
    Mock::given(method("GET"))
        .and(path(link))
        .and(header("Authorization", "Basic provider-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "build": 42,
            "buildStatus": "success",
            "links": {
                "download_primary": { "method": "get", "href": href }
            }
        })))
        .mount(upstream)
        .await;
}

/// Download host serves `body` at `download_path`
pub async fn mount_download(upstream: &MockServer, download_path: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(download_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(upstream)
        .await;
}

/// Distribution service answers every upload with `status`, `expected` times
pub async fn mount_upload(upstream: &MockServer, status: u16, expected: u64) {
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .and(header("X-HockeyAppToken", "sink-key"))
        .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
            "id": 7,
            "version": "42",
        })))
        .expect(expected)
        .mount(upstream)
        .await;
}

/// Artifact bytes that are easy to recognise in a multipart body
pub fn artifact_body(len: usize) -> Vec<u8> {
    b"IPA-CONTENT-".iter().copied().cycle().take(len).collect()
}

/// Collect events for `session_id` until it finishes or `timeout` elapses
pub async fn collect_until_finished(
    events: &mut broadcast::Receiver<Event>,
    session_id: SessionId,
    timeout: Duration,
) -> (Vec<Event>, Option<SessionOutcome>) {
    let mut collected = Vec::new();

    let outcome = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let finished = match &event {
                        Event::Finished {
                            session_id: id,
                            outcome,
                            ..
                        } if *id == session_id => Some(outcome.clone()),
                        _ => None,
                    };
                    if event_session(&event) == session_id {
                        collected.push(event);
                    }
                    if finished.is_some() {
                        return finished;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .unwrap_or(None);

    (collected, outcome)
}

/// Session an event belongs to
pub fn event_session(event: &Event) -> SessionId {
    match event {
        Event::SessionStarted { session_id, .. }
        | Event::StageChanged { session_id, .. }
        | Event::Finished { session_id, .. } => *session_id,
        Event::Progress(progress) => progress.session_id,
    }
}
