//! Synapse binary: serve the HTTP API or run a single goal.
//!
//! Usage:
//!   synapse serve          start the API server and background tasks
//!   synapse goal "<text>"  process one goal and print the outcome
//!
//! Exit codes: 0 success, 1 configuration error, 2 uncaught runtime error.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use synapse::adapters::ai::{OllamaConfig, OllamaProvider};
use synapse::adapters::embedding::{OllamaEmbedder, OllamaEmbedderConfig};
use synapse::adapters::events::RedisEventBus;
use synapse::adapters::http::{router, HttpState};
use synapse::adapters::postgres::{PgExecutionStore, PgVersionStore};
use synapse::adapters::sandbox::ProcessSandbox;
use synapse::adapters::tools::FsToolSourceStore;
use synapse::application::{Engine, EngineDeps};
use synapse::config::AppConfig;
use synapse::ports::EventBus;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::from(1);
        }
    };
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return ExitCode::from(1);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.first().map(|s| s.as_str()) {
        Some("serve") | None => serve(config).await,
        Some("goal") => match args.get(1) {
            Some(goal) => run_goal(config, goal).await,
            None => {
                error!("usage: synapse goal \"<text>\"");
                return ExitCode::from(1);
            }
        },
        Some(other) => {
            error!(command = other, "unknown command; use 'serve' or 'goal'");
            return ExitCode::from(1);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "runtime error");
            ExitCode::from(2)
        }
    }
}

async fn build_engine(config: &AppConfig) -> Result<Engine, Box<dyn std::error::Error>> {
    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database.url())
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("database ready");

    let event_bus: Option<Arc<dyn EventBus>> = match &config.engine.redis_url {
        Some(url) => Some(Arc::new(RedisEventBus::new(
            url,
            config.engine.events_channel.clone(),
        )?)),
        None => None,
    };

    let deps = EngineDeps {
        execution_store: Arc::new(PgExecutionStore::new(pool.clone())),
        version_store: Arc::new(PgVersionStore::new(pool)),
        model: Arc::new(OllamaProvider::new(
            OllamaConfig::new(config.ai.endpoint.clone())
                .with_model(config.ai.model.clone())
                .with_token_limit(config.ai.token_limit),
        )),
        embedder: Arc::new(OllamaEmbedder::new(
            OllamaEmbedderConfig::new(config.ai.embedding_endpoint().to_string())
                .with_model(config.ai.embedding_model.clone()),
        )),
        sandbox: Arc::new(ProcessSandbox::new(
            config.engine.sandbox_command.clone(),
            config.engine.tool_directory.clone(),
        )),
        source_store: Arc::new(FsToolSourceStore::new(config.engine.tool_directory.clone())),
        event_bus,
    };

    Ok(Engine::build(config, deps).await?)
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(&config).await?;
    engine.start_background_tasks().await;

    let state = HttpState::new(
        Arc::clone(&engine.orchestrator),
        Arc::clone(&engine.execution_store),
        Arc::clone(&engine.registry),
        config
            .server
            .bearer_token
            .as_ref()
            .map(|t| t.expose_secret().clone()),
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    engine.shutdown().await;
    Ok(())
}

async fn run_goal(config: AppConfig, goal: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(&config).await?;
    let outcome = engine.orchestrator.process(goal).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    engine.shutdown().await;
    if outcome.success {
        Ok(())
    } else {
        Err(outcome
            .error
            .unwrap_or_else(|| "goal failed".to_string())
            .into())
    }
}
