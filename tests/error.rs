use axum::{
    body::to_bytes,
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::Value;
use srt_relay::error::AppError;

#[test]
fn into_response_sets_http_status() {
    let cases = [
        (AppError::invalid_request("sourceKey is required"), StatusCode::BAD_REQUEST),
        (AppError::invalid_options("frameRate must be positive"), StatusCode::BAD_REQUEST),
        (AppError::not_found("route"), StatusCode::NOT_FOUND),
        (AppError::already_running("srt://host:1"), StatusCode::CONFLICT),
        (AppError::spawn_failure("permission denied"), StatusCode::INTERNAL_SERVER_ERROR),
        (AppError::dependency("ffmpeg missing"), StatusCode::SERVICE_UNAVAILABLE),
    ];

    for (err, expected) in cases {
        assert_eq!(err.into_response().status(), expected);
    }
}

#[test]
fn helpers_format_messages() {
    let err = AppError::invalid_request("bad value");
    assert_eq!(err.to_string(), "invalid request: bad value");

    let err = AppError::already_running("srt://host:1");
    assert_eq!(err.to_string(), "encoder already running: srt://host:1");
}

#[tokio::test]
async fn error_body_is_json() {
    let response = AppError::dependency("gst-launch-1.0 missing").into_response();
    let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        value["error"],
        "external dependency unavailable: gst-launch-1.0 missing"
    );
}
