use super::*;
use crate::api::routes::event_name;
use crate::types::{Event, Progress, SessionId, TransferStage};

#[tokio::test]
async fn test_health_endpoint() {
    let upstream = MockServer::start().await;
    let (relay, _temp_dir) = create_test_relay(&upstream);

    let response = create_router(relay)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["accepting"], true);
    assert_eq!(json["active_sessions"], 0);
}

#[tokio::test]
async fn test_openapi_endpoint() {
    let upstream = MockServer::start().await;
    let (relay, _temp_dir) = create_test_relay(&upstream);

    let response = create_router(relay)
        .oneshot(
            Request::builder()
                .uri("/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["info"]["title"], "build-relay");
    assert!(json["paths"]["/build"].is_object());
}

#[tokio::test]
async fn test_sse_event_stream() {
    let upstream = MockServer::start().await;
    let (relay, _temp_dir) = create_test_relay(&upstream);

    let response = create_router(relay)
        .oneshot(
            Request::builder()
                .uri("/events")
                .header("Accept", "text/event-stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert!(
        content_type.contains("text/event-stream"),
        "Content-Type should be text/event-stream, got: {}",
        content_type
    );
}

#[test]
fn test_event_names() {
    let id = SessionId::new();

    assert_eq!(
        event_name(&Event::SessionStarted {
            session_id: id,
            project_name: String::new(),
            build_target_name: String::new(),
        }),
        "session_started"
    );
    assert_eq!(
        event_name(&Event::StageChanged {
            session_id: id,
            stage: TransferStage::Cleaning,
        }),
        "stage_changed"
    );
    assert_eq!(
        event_name(&Event::Progress(Progress {
            session_id: id,
            stage: TransferStage::Downloading,
            bytes: 1,
            total: None,
        })),
        "progress"
    );
}
