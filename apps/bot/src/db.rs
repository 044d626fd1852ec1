use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Creates the SQLite connection pool and applies the schema.
///
/// `max_connections(1)` is deliberate: every logical operation runs as one
/// short-lived transaction on the single connection, which serializes all
/// read-then-write sequences without distributed coordination.
pub async fn create_pool(path: &str) -> Result<SqlitePool> {
    info!("Opening SQLite store at {path}...");

    let options = SqliteConnectOptions::new()
        .filename(Path::new(path))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;

    info!("SQLite store ready");
    Ok(pool)
}

/// Idempotent schema setup. Timestamps are bound from Rust as RFC 3339 UTC
/// text. No column defaults, so test clocks stay deterministic.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    const SCHEMA: &[&str] = &[
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            whatsapp TEXT NOT NULL,
            telegram TEXT NOT NULL,
            payment_method TEXT NOT NULL,
            payment_number TEXT NOT NULL,
            owner_name TEXT NOT NULL,
            referrer TEXT,
            points INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            fee TEXT NOT NULL,
            description TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL
        )
        "#,
        // The AUTOINCREMENT id doubles as apply order; the UNIQUE pair is
        // the storage-level duplicate guard for concurrent applies.
        r#"
        CREATE TABLE IF NOT EXISTS applicants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            applied_at TEXT NOT NULL,
            UNIQUE (job_id, user_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS achievements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            badge TEXT NOT NULL,
            awarded_at TEXT NOT NULL,
            UNIQUE (user_id, badge)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS promotions (
            id TEXT PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            link TEXT NOT NULL,
            kind TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS promotion_clicks (
            promo_id TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            clicked_at TEXT NOT NULL,
            PRIMARY KEY (promo_id, user_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            at TEXT NOT NULL,
            action TEXT NOT NULL,
            user_id INTEGER,
            description TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS group_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            username TEXT NOT NULL,
            body TEXT NOT NULL,
            sent_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS scheduled_tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action TEXT NOT NULL,
            chat_id INTEGER NOT NULL,
            message_id INTEGER NOT NULL,
            fire_at TEXT NOT NULL,
            UNIQUE (action, chat_id, message_id, fire_at)
        )
        "#,
    ];

    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").expect("in-memory uri");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("in-memory pool");
    migrate(&pool).await.expect("schema");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let pool = test_pool().await;
        migrate(&pool).await.expect("second migrate");
    }

    #[tokio::test]
    async fn test_file_backed_store_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bot.db");
        let pool = create_pool(path.to_str().expect("utf8 path"))
            .await
            .expect("file pool");

        sqlx::query("INSERT INTO activity_log (at, action, description) VALUES (?, ?, ?)")
            .bind(chrono::Utc::now())
            .bind("bot_start")
            .bind("smoke")
            .execute(&pool)
            .await
            .expect("insert");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activity_log")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 1);
    }
}
