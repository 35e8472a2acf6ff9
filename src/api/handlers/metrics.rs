use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct MetricsResponse {
    pub uploads_total: u64,
    pub uploads_failed: u64,
    pub active_uploads: u64,
    pub staged_files: usize,
    pub storage_usage_bytes: u64,
}

#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Upload counters and staging usage", body = MetricsResponse)
    ),
    tag = "system"
)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let counters = state.upload_service.counters();

    // A listing failure reports an empty staging area rather than failing the scrape.
    let usage = state.store.usage().await.unwrap_or_else(|e| {
        tracing::warn!("Failed to measure staging usage: {}", e);
        Default::default()
    });

    Json(MetricsResponse {
        uploads_total: counters.total,
        uploads_failed: counters.failed,
        active_uploads: counters.active,
        staged_files: usage.files,
        storage_usage_bytes: usage.bytes,
    })
}
