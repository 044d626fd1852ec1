mod activity;
mod ai;
mod config;
mod dashboard;
mod db;
mod dispatch;
mod errors;
mod ledger;
mod models;
mod scheduler;
mod sessions;
mod state;
mod transport;
mod workflows;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::ai::LlmClient;
use crate::config::Config;
use crate::db::create_pool;
use crate::sessions::SessionStore;
use crate::state::AppState;
use crate::transport::{ChatTransport, HttpChatTransport, Notifier};

/// Long-poll timeout for the update loop, in seconds.
const POLL_TIMEOUT_SECS: u64 = 50;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gigline bot v{}", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite store
    let db = create_pool(&config.database_path).await?;

    // Initialize chat platform transport
    let transport: Arc<dyn ChatTransport> =
        Arc::new(HttpChatTransport::new(&config.chat_api_base, &config.bot_token));
    info!("Chat transport initialized");

    // Initialize LLM client
    let llm = LlmClient::new(config.llm_api_key.clone());
    info!("LLM client initialized (model: {})", ai::MODEL);

    // Build app state
    let state = AppState {
        db: db.clone(),
        llm,
        transport: transport.clone(),
        notifier: Notifier::new(transport.clone()),
        sessions: Arc::new(SessionStore::new()),
        config: config.clone(),
    };

    // Read-only dashboard server
    let dashboard = dashboard::build_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());
    let addr: SocketAddr = format!("0.0.0.0:{}", config.dashboard_port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Dashboard listening on {addr}");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, dashboard).await {
            error!("dashboard server stopped: {e}");
        }
    });

    // Durable scheduler: pending deletions/unpins survive restarts
    tokio::spawn(scheduler::run(db.clone(), transport.clone()));

    activity::log(&db, "bot_start", None, "bot started").await;
    info!("Bot is polling for updates...");

    run_update_loop(state).await
}

/// Long-polls the platform and hands each update to its own task; events
/// from different chats interleave freely.
async fn run_update_loop(state: AppState) -> Result<()> {
    let mut offset = 0i64;
    loop {
        match state.transport.get_updates(offset, POLL_TIMEOUT_SECS).await {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let state = state.clone();
                    tokio::spawn(dispatch::handle_update(state, update));
                }
            }
            Err(e) => {
                warn!("update poll failed: {e}; retrying in 5s");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }
    }
}
