use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// One row of the append-only activity log. Observability only; nothing
/// reads this back except the dashboard.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActivityRow {
    pub id: i64,
    pub at: DateTime<Utc>,
    pub action: String,
    pub user_id: Option<i64>,
    pub description: String,
}
