use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub chat_api_base: String,
    pub llm_api_key: String,
    pub database_path: String,
    /// The community group chat where jobs and promotions are posted.
    pub group_chat_id: i64,
    /// Accounts allowed to run admin commands.
    pub admin_ids: Vec<i64>,
    pub dashboard_port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            bot_token: require_env("BOT_TOKEN")?,
            chat_api_base: std::env::var("CHAT_API_BASE")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            llm_api_key: require_env("LLM_API_KEY")?,
            database_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "bot.db".to_string()),
            group_chat_id: require_env("GROUP_CHAT_ID")?
                .parse::<i64>()
                .context("GROUP_CHAT_ID must be a chat id")?,
            admin_ids: parse_admin_ids(&require_env("ADMIN_IDS")?)?,
            dashboard_port: std::env::var("DASHBOARD_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse::<u16>()
                .context("DASHBOARD_PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_admin_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .with_context(|| format!("ADMIN_IDS entry '{part}' is not a user id"))
        })
        .collect()
}
