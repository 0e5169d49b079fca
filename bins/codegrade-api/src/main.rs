mod aggregator;
mod error;
mod feedback;
mod handlers;
mod judge;
mod llm;
mod metrics;
mod orchestrator;
mod poller;
mod routes;
mod submission;
#[cfg(test)]
mod testing;

use anyhow::Context;
use axum::Router;
use codegrade_common::Config;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::feedback::FeedbackRequester;
use crate::judge::{ExecutionBackend, Judge0Backend};
use crate::llm::{OllamaGenerator, TextGenerator};
use crate::orchestrator::CodeEvaluator;
use crate::poller::{PollSettings, PollingCoordinator};

pub struct AppState {
    pub redis: ConnectionManager,
    pub evaluator: Arc<CodeEvaluator>,
    pub report_ttl_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Codegrade API booting...");

    metrics::init_metrics();
    info!("Metrics registry initialized");

    let config = Config::from_env();

    // Connect to Redis
    let client = redis::Client::open(config.redis_url.as_str())
        .context("Failed to create Redis client")?;
    let redis_conn = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;
    info!("Connected to Redis: {}", config.redis_url);

    // Wire the evaluation pipeline
    let backend: Arc<dyn ExecutionBackend> = Arc::new(Judge0Backend::from_config(&config)?);
    let generator: Arc<dyn TextGenerator> = Arc::new(OllamaGenerator::from_config(&config)?);
    let settings = PollSettings::from_config(&config);
    info!(
        judge_url = %config.judge_url,
        llm_url = %config.llm_url,
        llm_model = %config.llm_model,
        interval_ms = settings.interval.as_millis() as u64,
        deadline_ms = settings.deadline.as_millis() as u64,
        max_retries = settings.max_retries,
        max_in_flight = settings.max_in_flight,
        "Evaluation pipeline configured"
    );

    let evaluator = CodeEvaluator::new(
        Arc::clone(&backend),
        PollingCoordinator::new(backend, settings),
        FeedbackRequester::new(generator).context("Failed to register prompt templates")?,
    );

    let state = Arc::new(AppState {
        redis: redis_conn,
        evaluator: Arc::new(evaluator),
        report_ttl_seconds: config.report_ttl_seconds,
    });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to accept evaluations");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("API shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_line_number(true)
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    warn!("Received shutdown signal, finishing in-flight evaluations...");
}
