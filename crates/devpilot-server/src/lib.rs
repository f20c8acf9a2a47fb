//! DevPilot Server - Workflow Orchestration Backend
//!
//! A standalone Rust backend server for the DevPilot platform, providing:
//! - RESTful HTTP API via axum
//! - SQLite persistence with rusqlite
//! - Workflow execution against an Anthropic-compatible agent endpoint
//!
//! This crate can be used standalone or embedded in other applications
//! (e.g. the `devpilot` CLI).

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use devpilot_core::workflow::{AgentCapability, AgentEndpointConfig, HttpAgentCapability};
use devpilot_core::{
    AppState, AppStateInner, Database, EngineConfig, SqliteStorage, WorkflowEngine,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Configuration for the DevPilot backend server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    /// Optional YAML file with engine settings
    pub engine_config_path: Option<String>,
    /// Seconds between automatic schedule ticks; `0` disables the loop
    pub schedule_tick_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3220,
            db_path: "devpilot.db".to_string(),
            engine_config_path: None,
            schedule_tick_secs: 60,
        }
    }
}

/// Load engine settings from `path`, or the defaults when no path is given.
pub fn load_engine_config(path: Option<&str>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => EngineConfig::from_file(path),
        None => Ok(EngineConfig::default()),
    }
}

/// Create a shared `AppState` from a database path, calling agents over HTTP.
pub async fn create_app_state(db_path: &str, engine_config: EngineConfig) -> Result<AppState, String> {
    let db = Database::open(db_path).map_err(|e| format!("Failed to open database: {}", e))?;

    let endpoint = AgentEndpointConfig::from_env();
    if !endpoint.has_credentials() {
        tracing::warn!(
            "No agent credentials found (ANTHROPIC_AUTH_TOKEN / ANTHROPIC_API_KEY); step invocations will fail"
        );
    }
    let agent: Arc<dyn AgentCapability> = Arc::new(HttpAgentCapability::new(endpoint));

    create_app_state_with_agent(db, agent, engine_config).await
}

/// Build the state around an already-open database and a given agent.
///
/// This is useful for tests and for embedding with a custom capability.
pub async fn create_app_state_with_agent(
    db: Database,
    agent: Arc<dyn AgentCapability>,
    engine_config: EngineConfig,
) -> Result<AppState, String> {
    let storage = Arc::new(SqliteStorage::new(db.clone()));
    let engine = WorkflowEngine::new(agent, storage, engine_config)
        .await
        .map_err(|e| format!("Failed to initialize workflow engine: {}", e))?;

    engine
        .seed_builtins()
        .await
        .map_err(|e| format!("Failed to seed built-in workflows: {}", e))?;

    Ok(Arc::new(AppStateInner::new(db, engine)))
}

/// Start the embedded Rust backend server.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig) -> Result<SocketAddr, String> {
    // Initialize tracing; a host binary may already have installed a subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "devpilot_server=info,devpilot_core=info,tower_http=info".into()
            }),
        )
        .try_init();

    tracing::info!(
        "Starting DevPilot backend server on {}:{}",
        config.host,
        config.port
    );

    let engine_config = load_engine_config(config.engine_config_path.as_deref())?;
    let state = create_app_state(&config.db_path, engine_config).await?;

    start_server_with_state(config, state).await
}

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server with a pre-built `AppState`.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    if config.schedule_tick_secs > 0 {
        spawn_schedule_loop(state.clone(), Duration::from_secs(config.schedule_tick_secs));
    }

    let app = app(state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("DevPilot backend server listening on {}", local_addr);

    // Spawn the server in a background task
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

/// Periodically fire due schedules.
fn spawn_schedule_loop(state: AppState, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match state.engine.tick(chrono::Utc::now()).await {
                Ok(firings) if !firings.is_empty() => {
                    tracing::info!("[ScheduleLoop] Fired {} schedules", firings.len());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("[ScheduleLoop] Tick failed: {}", e),
            }
        }
    });
}

async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<serde_json::Value> {
    let (status, database) = match state.db.ping().await {
        Ok(_) => ("ok", "ok".to_string()),
        Err(e) => {
            tracing::warn!("[Health] Database check failed: {}", e);
            ("degraded", e.to_string())
        }
    };
    axum::Json(serde_json::json!({
        "status": status,
        "database": database,
        "server": "devpilot-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
