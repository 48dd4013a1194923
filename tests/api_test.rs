//! Ops API integration tests

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use callcore::domain::call::{Call, CallDirection, CallRepository, CallType};
use callcore::domain::shared::{Address, AddressType};
use callcore::infrastructure::metrics::Metrics;
use callcore::interface::api::{build_router, AppState};
use common::{harness, FakeRequester, Harness};
use serde_json::Value;
use tower::ServiceExt; // For `oneshot`
use uuid::Uuid;

fn app(h: &Harness) -> Router {
    let (_, prometheus_handle) = Metrics::prometheus().unwrap();
    build_router(
        AppState {
            core: h.core.clone(),
        },
        prometheus_handle,
        h.broadcaster.clone(),
    )
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health() {
    let h = harness(FakeRequester::default());
    let (status, json) = get(app(&h), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"], "OK");
}

#[tokio::test]
async fn test_get_call() {
    let h = harness(FakeRequester::default());
    let call = Call::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        "c1",
        CallType::Flow,
        CallDirection::Incoming,
        Address::new(AddressType::Tel, "+15550001"),
        Address::new(AddressType::Tel, "+15550002"),
    );
    h.store.call_create(&call).await.unwrap();

    let (status, json) = get(app(&h), &format!("/calls/{}", call.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["id"], call.id.to_string());
    assert_eq!(json["data"]["status"], "dialing");
    assert_eq!(json["data"]["channel_id"], "c1");
}

#[tokio::test]
async fn test_unknown_call_is_not_found() {
    let h = harness(FakeRequester::default());
    let (status, json) = get(app(&h), &format!("/calls/{}", Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_malformed_id_is_rejected() {
    let h = harness(FakeRequester::default());
    let (status, _) = get(app(&h), "/confbridges/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let h = harness(FakeRequester::default());
    let response = app(&h)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
