use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wayfarer::api::{create_router, AppState};
use wayfarer::config::Config;
use wayfarer::db::{Database, DatabaseBackend, LibSqlBackend};
use wayfarer::embeddings::{Embedder, EmbeddingProvider};
use wayfarer::llm::LlmProvider;
use wayfarer::services::{spawn_dead_letter_logger, DeadLetterQueue};

#[derive(Parser)]
#[command(name = "wayfarer")]
#[command(about = "Conversational travel assistant with streamed itineraries")]
struct Args {
    /// Overrides WAYFARER_HOST
    #[arg(long)]
    host: Option<String>,

    /// Overrides WAYFARER_PORT
    #[arg(long)]
    port: Option<u16>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wayfarer=info,tower_http=debug".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    init_tracing();

    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing::info!("Loading embedding model: {}...", config.embeddings.model);
    let embedder = EmbeddingProvider::new(&config.embeddings)?;

    tracing::info!("Initializing database...");
    let raw_db = Database::new(&config.database, embedder.dimensions()).await?;
    let db: Arc<dyn DatabaseBackend> = Arc::new(LibSqlBackend::new(raw_db));

    if let Some(llm_config) = &config.llm {
        tracing::info!("Initializing LLM provider: {}...", llm_config.model);
    }
    let llm = LlmProvider::new(config.llm.as_ref());
    if !llm.is_available() {
        tracing::warn!("LLM unavailable - chat turns will fail until LLM_MODEL is configured");
    }

    let cancel_token = CancellationToken::new();

    let (dead_letters, dead_letter_rx) = DeadLetterQueue::new(config.chat.dead_letter_capacity);
    let dead_letter_logger = spawn_dead_letter_logger(dead_letter_rx, cancel_token.child_token());

    let state = AppState::new(
        config.clone(),
        db,
        llm,
        Arc::new(embedder),
        dead_letters,
    );

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Wayfarer starting on http://{}", addr);
    tracing::info!("  Health check: http://{}/api/v1/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await?;

    if let Err(e) = dead_letter_logger.await {
        tracing::error!(error = %e, "Dead-letter logger task failed");
    }

    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping background tasks...");
    cancel_token.cancel();
}
