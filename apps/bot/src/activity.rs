use chrono::Utc;
use sqlx::SqlitePool;
use tracing::warn;

use crate::models::activity::ActivityRow;

/// Appends one activity-log row. Logging must never break the workflow that
/// called it, so a write failure is warned about and swallowed.
pub async fn log(pool: &SqlitePool, action: &str, user_id: Option<i64>, description: &str) {
    let result = sqlx::query(
        "INSERT INTO activity_log (at, action, user_id, description) VALUES (?, ?, ?, ?)",
    )
    .bind(Utc::now())
    .bind(action)
    .bind(user_id)
    .bind(description)
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!("activity log write failed: {e}");
    }
}

pub async fn recent(pool: &SqlitePool, limit: i64) -> sqlx::Result<Vec<ActivityRow>> {
    sqlx::query_as(
        "SELECT id, at, action, user_id, description FROM activity_log ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
