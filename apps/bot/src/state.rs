use std::sync::Arc;

use sqlx::SqlitePool;

use crate::ai::LlmClient;
use crate::config::Config;
use crate::sessions::SessionStore;
use crate::transport::{ChatTransport, Notifier};

/// Shared application state, cloned into every handler task and dashboard
/// route.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub llm: LlmClient,
    pub transport: Arc<dyn ChatTransport>,
    pub notifier: Notifier,
    pub sessions: Arc<SessionStore>,
    pub config: Config,
}
