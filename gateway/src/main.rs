mod api;
mod error;
mod routes;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::routes::{router, AppState};
use agent_core::{AgentAdapter, OpenAiRuntime, Pipeline, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging Setup
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .compact()
        .init();

    info!("Agent Gateway Initializing...");

    // 2. Settings (read once, passed down explicitly)
    let settings = Settings::from_env()?;
    if settings.api_key.is_none() {
        warn!("API_KEY is not set; /agent/query will answer 500 until it is configured.");
    }
    if settings.agent.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; agent queries will fail until it is configured.");
    }

    // 3. Load The Pipeline
    let pipeline = Pipeline::load(settings.agent.pipeline_path.as_deref())
        .await
        .context("Failed to load agent pipeline")?;

    // 4. Initialize The Runtime (shared by every request)
    let runtime = OpenAiRuntime::new(&settings.agent);
    if settings.agent.startup_check && settings.agent.api_key.is_some() {
        match runtime.say_hello().await {
            Ok(msg) => info!("Runtime Status: {}", msg),
            Err(e) => error!("Runtime is configured but unresponsive: {}", e),
        }
    }

    let adapter = AgentAdapter::new(settings.agent.clone(), pipeline, Arc::new(runtime));
    info!(
        "Pipeline '{}' ready with {} sub-agents.",
        adapter.pipeline().name,
        adapter.pipeline().sub_agents.len()
    );
    let state = AppState::new(adapter, settings.api_key.clone());

    // 5. Start Server
    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Gateway listening on {}...", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
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

    info!("Shutdown signal received, draining connections...");
}
