pub mod api;
pub mod config;
pub mod services;
pub mod utils;

use crate::config::RelayConfig;
use crate::services::relay::RelayClient;
use crate::services::staging::StagingStore;
use crate::services::telegram::MessagingBackend;
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Headroom on top of the file limit for multipart framing.
const MULTIPART_OVERHEAD: u64 = 10 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_file,
        api::handlers::health::health_check,
        api::handlers::health::api_status,
        api::handlers::metrics::metrics,
    ),
    components(
        schemas(
            api::handlers::upload::UploadForm,
            services::upload_service::RelayResult,
            api::handlers::health::HealthResponse,
            api::handlers::health::ServiceStatus,
            api::handlers::health::CapabilityStatus,
            api::handlers::health::ApiStatusResponse,
            api::handlers::metrics::MetricsResponse,
        )
    ),
    tags(
        (name = "upload", description = "Relay uploads to the channel"),
        (name = "system", description = "Health and status endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StagingStore>,
    pub relay: Arc<RelayClient>,
    pub upload_service: Arc<UploadService>,
    pub config: RelayConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: RelayConfig,
        store: Arc<StagingStore>,
        bot: Arc<dyn MessagingBackend>,
        session: Option<Arc<dyn MessagingBackend>>,
    ) -> Self {
        let relay = Arc::new(RelayClient::new(
            bot,
            session,
            config.channel_id.clone(),
            config.simple_transport_limit,
        ));
        let upload_service = Arc::new(UploadService::new(store.clone(), relay.clone(), &config));

        Self {
            store,
            relay,
            upload_service,
            config,
            started_at: Instant::now(),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect::<Vec<_>>(),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_file_size.saturating_add(MULTIPART_OVERHEAD))
        .unwrap_or(usize::MAX);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/upload", post(api::handlers::upload::upload_file))
        .route("/health", get(api::handlers::health::health_check))
        .route("/api/status", get(api::handlers::health::api_status))
        .route("/metrics", get(api::handlers::metrics::metrics))
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
