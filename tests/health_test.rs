// Integration tests against the router built by `create_router`, exercised
// the way a real client would: no database needed since `AppState::new_test`
// wires lazy pools and an in-memory session store.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use fir_pipeline_backend::state::AppState;

async fn test_app() -> axum::Router {
    let state = AppState::new_test().await.expect("test state");
    fir_pipeline_backend::create_router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let response = test_app()
        .await
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_endpoint_returns_json_with_status_field() {
    let response = test_app()
        .await
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = body_json(response).await;
    assert!(json.get("status").is_some(), "response should have a 'status' field");
    assert!(json.get("dependencies").is_some(), "response should have a 'dependencies' field");
}

#[tokio::test]
async fn readiness_endpoint_does_not_404() {
    let response = test_app()
        .await
        .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    // Readiness may be 503 before the dependency gate opens, but the route exists.
    assert_ne!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn nonexistent_route_returns_404() {
    let response = test_app()
        .await
        .oneshot(Request::builder().uri("/does-not-exist").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn protected_route_without_api_key_is_rejected() {
    let response = test_app()
        .await
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/list_firs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_route_with_api_key_passes_auth() {
    let response = test_app()
        .await
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/list_firs")
                .header("X-API-Key", "test-api-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Auth passes; the handler itself will fail against the unreachable lazy
    // MySQL pool, but that's a 5xx from the handler, never a 401/404.
    assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
    assert_ne!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn process_without_any_field_is_rejected() {
    let body = "--boundary\r\nContent-Disposition: form-data; name=\"unused\"\r\n\r\nvalue\r\n--boundary--\r\n";
    let response = test_app()
        .await
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/process")
                .header("X-API-Key", "test-api-key")
                .header("content-type", "multipart/form-data; boundary=boundary")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn swagger_ui_is_mounted() {
    let response = test_app()
        .await
        .oneshot(Request::builder().uri("/openapi.json").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
