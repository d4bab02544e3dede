//! waypoint - MCP research server.
//!
//! Boot sequence: load env, init tracing, parse CLI, connect the
//! database and run migrations, wire every repository/provider into a
//! single [`ServerContext`], start the job worker and background
//! sweepers, then hand off to whichever transport the CLI selected.

mod auth;
mod cli;
mod config;
mod middleware;
mod routes;
mod rpc_handler;
mod sse;
mod state;
mod stdio;
mod tools;
mod ws;

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use waypoint_core::EventBus;
use waypoint_db::{
    ensure_embedding_dimension, Database, PgDocumentIndexRepository, PgGraphRepository, PgJobRepository,
    PgReportRepository, PgSessionRepository,
};
use waypoint_inference::config::EmbeddingsProvider;
use waypoint_inference::{InferenceConfig, MockEmbeddingProvider, OpenAiChatProvider, OpenAiEmbeddingProvider};
use waypoint_jobs::{JobWorker, WorkerConfig};
use waypoint_orchestrator::ResearchJobHandler;
use waypoint_search::hybrid::HybridSearchEngine;
use waypoint_transport::session::{spawn_session_sweeper, SessionManager};

use crate::auth::{ApiKeyAuthenticator, SharedAuthenticator};
use crate::cli::Cli;
use crate::config::ServerConfig;
use crate::state::ServerContext;

/// Initialize tracing per `LOG_FORMAT`/`LOG_FILE`/`LOG_ANSI`/`RUST_LOG`
/// (spec.md §6 "Environment variables (recognized)").
///
/// STDIO mode redirects everything to a log file (or drops it entirely
/// if `LOG_FILE` is unset) — any byte on stdout outside the JSON-RPC
/// stream would corrupt the protocol for the client that launched us.
fn init_tracing(stdio_mode: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI").ok().map(|v| v == "true" || v == "1");

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "waypoint=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(path) = log_file {
        let dir = std::path::Path::new(&path).parent().unwrap_or(std::path::Path::new("."));
        let name = std::path::Path::new(&path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("waypoint.log");
        let appender = tracing_appender::rolling::daily(dir, name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if log_format == "json" {
            registry.with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking)).init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        return Some(guard);
    }

    if stdio_mode {
        // No log file configured and we can't use stdout: drop logging
        // entirely rather than risk corrupting the RPC stream.
        return None;
    }

    if log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        let mut layer = tracing_subscriber::fmt::layer();
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        registry.with(layer).init();
    }
    None
}

fn print_setup_snippet(client: &str, issuer: &str) {
    let snippet = match client {
        "claude" | "claude-desktop" => serde_json::json!({
            "mcpServers": {
                "waypoint": {
                    "command": "waypoint",
                    "args": ["--stdio"],
                }
            }
        }),
        _ => serde_json::json!({
            "name": "waypoint",
            "url": format!("{issuer}/mcp"),
            "transport": "streamable-http",
        }),
    };
    println!("{}", serde_json::to_string_pretty(&snippet).unwrap_or_default());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.stdio);

    if let Some(client) = cli.setup.as_deref() {
        let issuer = std::env::var("ISSUER_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        print_setup_snippet(client, &issuer);
        return Ok(());
    }

    let config = ServerConfig::from_env();
    let inference_config = InferenceConfig::from_env()?;

    info!(mode = ?config.mode, "connecting to database");
    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;
    ensure_embedding_dimension(db.pool(), inference_config.embeddings_dimension).await?;
    info!("database ready");

    let chat = Arc::new(OpenAiChatProvider::new(inference_config.chat.clone())?);
    let embedder: Arc<dyn waypoint_core::EmbeddingProvider> = match inference_config.embeddings_provider {
        EmbeddingsProvider::OpenAi => Arc::new(OpenAiEmbeddingProvider::new(
            inference_config.chat.clone(),
            inference_config.embeddings_model.clone(),
            inference_config.embeddings_dimension,
        )?),
        EmbeddingsProvider::Mock => Arc::new(MockEmbeddingProvider::new(inference_config.embeddings_dimension)),
    };

    let jobs: Arc<dyn waypoint_core::JobRepository> = Arc::new(PgJobRepository::new(db.pool.clone()));
    let job_events: Arc<dyn waypoint_core::EventRepository> = Arc::new(PgJobRepository::new(db.pool.clone()));
    let session_repo: Arc<dyn waypoint_core::SessionRepository> = Arc::new(PgSessionRepository::new(db.pool.clone()));
    let doc_index: Arc<dyn waypoint_core::DocumentIndexRepository> = Arc::new(PgDocumentIndexRepository::new(db.pool.clone()));
    let graph: Arc<dyn waypoint_core::GraphRepository> = Arc::new(PgGraphRepository::new(db.pool.clone()));
    let reports: Arc<dyn waypoint_core::ReportRepository> = Arc::new(PgReportRepository::new(db.pool.clone()));

    let search = Arc::new(HybridSearchEngine::new(doc_index, graph, Some(embedder.clone())));
    let events = Arc::new(EventBus::new(waypoint_core::defaults::EVENT_BUS_CAPACITY));
    let sessions = Arc::new(SessionManager::new(session_repo.clone()));

    let worker = JobWorker::new(jobs.clone(), job_events.clone(), events.clone(), WorkerConfig::from_env());
    worker
        .register_handler(ResearchJobHandler::new(
            chat.clone(),
            Some(embedder.clone()),
            reports,
            inference_config.model_tiers,
        ))
        .await;
    let cancellations = worker.cancellations();
    let _worker_handle = worker.start();

    let _lease_sweeper = waypoint_jobs::spawn_lease_sweeper(jobs.clone());
    let _idempotency_sweeper = waypoint_jobs::spawn_idempotency_sweeper(jobs.clone());
    let _session_sweeper = spawn_session_sweeper(sessions.clone());

    let authenticator: SharedAuthenticator = Arc::new(ApiKeyAuthenticator::new(
        config.server_api_key.clone(),
        config.allow_no_api_key,
    ));
    let rate_limiter = config
        .rate_limit_enabled
        .then(|| middleware::rate_limit::build(config.rate_limit_max_requests, config.rate_limit_period_secs));

    let host = config.host.clone();
    let port = config.port;

    let ctx = Arc::new(ServerContext {
        db,
        jobs,
        job_events,
        session_repo,
        search,
        chat,
        embedder,
        sessions,
        events,
        config: Arc::new(config),
        authenticator,
        cancellations,
        rate_limiter,
        legacy_connections: sse::new_registry(),
    });

    if cli.stdio {
        return stdio::run(ctx).await;
    }

    let app = routes::router(ctx);
    let addr: std::net::SocketAddr = format!("{host}:{port}").parse()?;
    info!(%addr, "starting waypoint");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
