use super::*;
use crate::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::MockServer;

mod system;

const SECRET: &str = "webhook-secret";
const PROJECT_GUID: &str = "0f4c2d6a-1234-4bcd-9abc-0123456789ab";
const BUILD_LINK: &str = "/api/orgs/acme/projects/game/buildtargets/ios/builds/42";

/// Config pointing both the provider and the distribution service at `upstream`
fn test_config(upstream: &str, artifact_dir: &std::path::Path) -> Config {
    let mut config = Config::from_lookup(|key| {
        let value = match key {
            "PORT" => "0",
            "AUTH_KEY" => SECRET,
            "PROJECT_GUID" => PROJECT_GUID,
            "UNITYCLOUD_KEY" => "provider-key",
            "HOCKEYAPPID" => "app-123",
            "HOCKEYAPP_KEY" => "sink-key",
            "UNITYCLOUD_API_BASE" | "HOCKEYAPP_BASE" => upstream,
            _ => return None,
        };
        Some(value.to_string())
    })
    .unwrap();
    config.webhook.bind_address = "127.0.0.1:0".parse().unwrap();
    config.transfer.artifact_dir = artifact_dir.to_path_buf();
    config.transfer.session_timeout = Duration::from_secs(10);
    config
}

/// Relay wired to `upstream`, with its artifact directory
fn create_test_relay(upstream: &MockServer) -> (Relay, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let relay = Relay::new(test_config(&upstream.uri(), temp_dir.path())).unwrap();
    (relay, temp_dir)
}

fn notification_json(guid: &str, status: &str, link: Option<&str>) -> String {
    let mut body = serde_json::json!({
        "projectName": "Space Game",
        "buildTargetName": "iOS Release",
        "projectGuid": guid,
        "buildNumber": 42,
        "buildStatus": status,
    });
    if let Some(link) = link {
        body["links"] = serde_json::json!({ "api_self": { "method": "get", "href": link } });
    }
    body.to_string()
}

fn webhook_request(secret: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/build")
        .header("Content-Type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header("Authorization", secret);
    }
    builder.body(body.into()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns_and_stops() {
    let upstream = MockServer::start().await;
    let (relay, _temp_dir) = create_test_relay(&upstream);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(start_api_server(relay, async move {
        stop_rx.await.ok();
    }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let upstream = MockServer::start().await;
    let (relay, _temp_dir) = create_test_relay(&upstream);

    let response = create_router(relay)
        .oneshot(Request::builder().uri("/downloads").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
