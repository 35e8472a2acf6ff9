use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ServiceStatus {
    pub api: String,
    pub telegram_bot: String,
    pub session_client: String,
    pub storage: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub services: ServiceStatus,
    pub uptime_seconds: u64,
    pub version: String,
}

/// Which relay paths are available to callers.
#[derive(Serialize, ToSchema)]
pub struct CapabilityStatus {
    pub telegram_bot: String,
    pub file_upload: String,
    pub session_client: String,
}

#[derive(Serialize, ToSchema)]
pub struct ApiStatusResponse {
    pub status: String,
    pub version: String,
    pub services: CapabilityStatus,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

fn session_status(state: &AppState) -> &'static str {
    if state.relay.has_session() {
        "online"
    } else {
        "not_configured"
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let mut healthy = true;

    let bot_status = match state.relay.bot_identity().await {
        Ok(_) => "online".to_string(),
        Err(e) => {
            tracing::warn!("Bot health probe failed: {}", e);
            healthy = false;
            format!("offline: {}", e)
        }
    };

    let storage_status = if state.store.is_available().await {
        "online"
    } else {
        healthy = false;
        "offline"
    };

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: Utc::now(),
        services: ServiceStatus {
            api: "online".to_string(),
            telegram_bot: bot_status,
            session_client: session_status(&state).to_string(),
            storage: storage_status.to_string(),
        },
        uptime_seconds: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Relay capabilities", body = ApiStatusResponse)
    ),
    tag = "system"
)]
pub async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiStatusResponse {
        status: "operational".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: CapabilityStatus {
            telegram_bot: "active".to_string(),
            file_upload: "active".to_string(),
            session_client: session_status(&state).to_string(),
        },
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
    })
}
