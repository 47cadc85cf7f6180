//! Todo Service
//!
//! Serves the todo API with in-process collaborators: an in-memory record
//! store, an in-memory identity provider, and an outbox mailer that logs
//! verification and recovery links.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level (e.g., `debug`, `info`, `todo_service=debug`)
//! - `LOG_FORMAT`: `json` for structured log lines (default: human-readable)
//! - `HOST`: Server host address (default: `0.0.0.0`)
//! - `PORT`: Server port (default: `3000`)
//! - `SITE_URL`: Public base URL used in mailed links (default: `http://localhost:3000`)
//! - `SESSION_TTL_SECONDS`: Session lifetime (default: `3600`)
//! - `SIGNIN_MAX_FAILURES`: Failed sign-ins per email before throttling (default: `5`)
//! - `TODO_STORE_FAILURE_RATE`: Injected store failure probability (default: `0.0`)
//! - `TODO_STORE_DELAY_MS`: Injected store latency (default: `0`)
//! - `RNG_SEED`: Seed for failure injection
//! - `WORKER_THREADS`: Number of tokio worker threads (default: logical CPU count)

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use todo_service::api::{AppState, build_router};
use todo_service::config::ServerConfig;
use todo_service::infrastructure::{
    FlakyTodoRepository, InMemoryIdentityProvider, InMemoryTodoRepository, OutboxMailer,
    TodoRepository,
};

/// Result of parsing `WORKER_THREADS` environment variable.
struct WorkerThreadsResult {
    threads: Option<usize>,
    warning_emitted: bool,
}

fn parse_worker_threads() -> WorkerThreadsResult {
    let Ok(value) = std::env::var("WORKER_THREADS") else {
        return WorkerThreadsResult {
            threads: None,
            warning_emitted: false,
        };
    };

    match value.trim().parse::<usize>() {
        Ok(0) => {
            eprintln!("Warning: WORKER_THREADS=0 is invalid (must be > 0), using default");
            WorkerThreadsResult {
                threads: None,
                warning_emitted: true,
            }
        }
        Ok(threads) => WorkerThreadsResult {
            threads: Some(threads),
            warning_emitted: false,
        },
        Err(error) => {
            eprintln!(
                "Warning: WORKER_THREADS='{}' is not a valid number ({error}), using default",
                value.trim()
            );
            WorkerThreadsResult {
                threads: None,
                warning_emitted: true,
            }
        }
    }
}

fn main() {
    dotenvy::dotenv().ok();

    let result = parse_worker_threads();
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();

    if let Some(threads) = result.threads {
        builder.worker_threads(threads);
        if !result.warning_emitted {
            eprintln!("Tokio worker_threads set to: {threads}");
        }
    }

    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Failed to create tokio runtime: {error}");
            std::process::exit(1);
        }
    };
    runtime.block_on(async_main());
}

async fn async_main() {
    let json_logs =
        std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todo_service=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!("Starting Todo Service");

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!("Configuration error: {}", error);
            std::process::exit(1);
        }
    };

    tracing::info!(
        site_url = %config.app.site_url,
        session_ttl_seconds = config.identity.session_ttl.num_seconds(),
        fail_injection = config.fail_injection.is_enabled(),
        "Configuration loaded"
    );

    let store: Arc<dyn TodoRepository> = Arc::new(InMemoryTodoRepository::new());
    let todo_repository: Arc<dyn TodoRepository> = if config.fail_injection.is_enabled() {
        match FlakyTodoRepository::new(store, config.fail_injection.clone()) {
            Ok(flaky) => {
                tracing::warn!(
                    failure_rate = config.fail_injection.failure_rate,
                    delay_ms = config.fail_injection.delay_ms,
                    "Store failure injection enabled"
                );
                Arc::new(flaky)
            }
            Err(error) => {
                tracing::error!(%error, "Invalid failure injection settings");
                std::process::exit(1);
            }
        }
    } else {
        store
    };

    let identity = Arc::new(InMemoryIdentityProvider::new(
        Arc::new(OutboxMailer::new()),
        config.identity.clone(),
    ));
    let application_state = AppState::new(todo_repository, identity, config.app.clone());

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let application = build_router(application_state).layer(cors);

    let address: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(address) => address,
        Err(error) => {
            tracing::error!(%error, "Invalid server address: {}:{}", config.host, config.port);
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, "Failed to bind to address {}", address);
            std::process::exit(1);
        }
    };

    match listener.local_addr() {
        Ok(address) => tracing::info!("Listening on {}", address),
        Err(error) => tracing::warn!(%error, "Could not determine local address"),
    }

    if let Err(error) = axum::serve(listener, application)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%error, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Server shutdown complete");
}

/// Completes on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
