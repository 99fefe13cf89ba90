use axum::{Json, extract::State};

use crate::{state::AppState, supervisor::JobSnapshot};

pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSnapshot>> {
    Json(state.supervisor.list().await)
}
