mod relay;
mod status;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

pub use relay::{StartRequest, StopRequest, greeting, not_found, start_relay, stop_relay};
pub use status::list_jobs;

/// Every route answers 404 for methods it does not handle.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(greeting).fallback(not_found))
        .route("/jobs", get(list_jobs).fallback(not_found))
        .route(
            "/{action}",
            post(start_relay).delete(stop_relay).fallback(not_found),
        )
        .fallback(not_found)
        .with_state(state)
}
