use axum::{
    Json,
    extract::{Path as AxumPath, State, rejection::JsonRejection},
};
use serde::Deserialize;

use crate::{
    encoder::{Backend, EncoderOptions, EncoderOverrides},
    error::AppError,
    state::AppState,
};

const RELAY_ACTION: &str = "srt2rtmp";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub source_key: String,
    pub destination: String,
    #[serde(default)]
    pub options: Option<EncoderOverrides>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub source_key: String,
}

pub async fn greeting() -> &'static str {
    "Hello from srt-relay! POST /srt2rtmp to start relaying an SRT stream to RTMP."
}

pub async fn not_found() -> AppError {
    AppError::not_found("route")
}

/// `POST /srt2rtmp` and `POST /srt2rtmp:<backend>`.
pub async fn start_relay(
    State(state): State<AppState>,
    AxumPath(action): AxumPath<String>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<&'static str, AppError> {
    let backend = resolve_backend(&action, state.default_backend)?;
    let Json(request) = payload.map_err(rejection_to_error)?;
    let options = request
        .options
        .map(EncoderOptions::from)
        .unwrap_or_default();

    state
        .supervisor
        .start(&request.source_key, &request.destination, backend, options)
        .await?;

    Ok("Encoder started")
}

/// `DELETE /srt2rtmp`; stopping an unknown source is not an error.
pub async fn stop_relay(
    State(state): State<AppState>,
    AxumPath(action): AxumPath<String>,
    payload: Result<Json<StopRequest>, JsonRejection>,
) -> Result<&'static str, AppError> {
    if action != RELAY_ACTION {
        return Err(AppError::not_found(format!("route /{action}")));
    }
    let Json(request) = payload.map_err(rejection_to_error)?;
    if request.source_key.trim().is_empty() {
        return Err(AppError::invalid_request("sourceKey is required"));
    }

    state.supervisor.stop(&request.source_key).await;
    Ok("Encoder stopped")
}

pub(crate) fn resolve_backend(action: &str, default_backend: Backend) -> Result<Backend, AppError> {
    let Some(rest) = action.strip_prefix(RELAY_ACTION) else {
        return Err(AppError::not_found(format!("route /{action}")));
    };

    if rest.is_empty() {
        return Ok(default_backend);
    }

    match rest.strip_prefix(':') {
        Some(name) if !name.is_empty() => name.parse::<Backend>(),
        _ => Err(AppError::not_found(format!("route /{action}"))),
    }
}

fn rejection_to_error(rejection: JsonRejection) -> AppError {
    AppError::invalid_request(rejection.body_text())
}
