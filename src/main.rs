use channel_relay::config::RelayConfig;
use channel_relay::services::janitor::Janitor;
use channel_relay::services::staging::StagingStore;
use channel_relay::services::telegram::{BotApiClient, MessagingBackend, SessionClient};
use channel_relay::{AppState, create_app};
use clap::Parser;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "channel_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Channel Relay...");

    let config = RelayConfig::from_env();
    config.validate()?;
    info!(
        "📦 Relay Config: Max Size={}MB, Simple Limit={}MB, Staging={}",
        config.max_file_size / 1024 / 1024,
        config.simple_transport_limit / 1024 / 1024,
        config.upload_dir.display()
    );

    // 2. Staging directory exists before anything can be staged
    let store = Arc::new(StagingStore::open(&config.upload_dir).await?);

    // 3. Backend clients, established once
    let bot: Arc<dyn MessagingBackend> = Arc::new(BotApiClient::from_config(&config));
    match bot.identity().await {
        Ok(username) => info!("🤖 Bot credential verified as @{}", username),
        Err(e) => warn!("❌ Bot credential check failed: {}", e),
    }

    let session: Option<Arc<dyn MessagingBackend>> = match SessionClient::connect(&config).await {
        Ok(Some(client)) => Some(Arc::new(client) as Arc<dyn MessagingBackend>),
        Ok(None) => {
            info!("ℹ️  No session credentials configured; large files will be refused");
            None
        }
        Err(e) => {
            warn!("❌ Session client initialization failed: {}", e);
            None
        }
    };

    // 4. Janitor
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let janitor = Janitor::from_config(store.clone(), &config, shutdown_rx);
    let janitor_handle = tokio::spawn(janitor.run());

    // 5. API
    let state = AppState::new(config, store, bot, session);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 6. Stop the janitor
    let _ = shutdown_tx.send(true);
    if let Err(e) = janitor_handle.await {
        warn!("Janitor task ended abnormally: {}", e);
    }

    info!("👋 Channel Relay exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
