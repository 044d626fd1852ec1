//! Durable scheduled-task queue. Delayed message deletions and unpins are
//! persisted, keyed by (action, target, fire time), so pending timers survive
//! a process restart instead of silently vanishing with the old process.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::transport::ChatTransport;

const POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
pub enum TaskAction {
    DeleteMessage,
    UnpinMessage,
}

#[derive(Debug, Clone, FromRow)]
pub struct ScheduledTask {
    pub id: i64,
    pub action: TaskAction,
    pub chat_id: i64,
    pub message_id: i64,
    pub fire_at: DateTime<Utc>,
}

/// Enqueues a task. Idempotent on the full (action, target, fire time) key,
/// so re-scheduling the same timer is harmless.
pub async fn schedule(
    pool: &SqlitePool,
    action: TaskAction,
    chat_id: i64,
    message_id: i64,
    fire_at: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO scheduled_tasks (action, chat_id, message_id, fire_at) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT (action, chat_id, message_id, fire_at) DO NOTHING",
    )
    .bind(action)
    .bind(chat_id)
    .bind(message_id)
    .bind(fire_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn due(pool: &SqlitePool, now: DateTime<Utc>) -> sqlx::Result<Vec<ScheduledTask>> {
    sqlx::query_as(
        "SELECT id, action, chat_id, message_id, fire_at FROM scheduled_tasks \
         WHERE fire_at <= ? ORDER BY fire_at, id",
    )
    .bind(now)
    .fetch_all(pool)
    .await
}

pub async fn complete(pool: &SqlitePool, task_id: i64) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM scheduled_tasks WHERE id = ?")
        .bind(task_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Executes every due task once. Transport failures are logged and the task
/// dropped; there is no retry queue for these best-effort cleanups.
pub async fn run_due_tasks(pool: &SqlitePool, transport: &Arc<dyn ChatTransport>, now: DateTime<Utc>) {
    let tasks = match due(pool, now).await {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!("scheduler poll failed: {e}");
            return;
        }
    };

    for task in tasks {
        let result = match task.action {
            TaskAction::DeleteMessage => transport.delete_message(task.chat_id, task.message_id).await,
            TaskAction::UnpinMessage => transport.unpin_message(task.chat_id, task.message_id).await,
        };
        if let Err(e) = result {
            warn!(
                "scheduled task {} on message {} failed: {e}",
                task.id, task.message_id
            );
        }
        if let Err(e) = complete(pool, task.id).await {
            warn!("failed to clear scheduled task {}: {e}", task.id);
        }
    }
}

/// Background loop; spawned once at startup.
pub async fn run(pool: SqlitePool, transport: Arc<dyn ChatTransport>) {
    info!("Scheduler loop started (poll every {}s)", POLL_INTERVAL.as_secs());
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        run_due_tasks(&pool, &transport, Utc::now()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::transport::testing::RecordingTransport;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_schedule_is_idempotent_on_full_key() {
        let pool = test_pool().await;
        let fire_at = Utc::now() + ChronoDuration::hours(24);

        schedule(&pool, TaskAction::DeleteMessage, -100, 7, fire_at).await.expect("first");
        schedule(&pool, TaskAction::DeleteMessage, -100, 7, fire_at).await.expect("second");

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scheduled_tasks")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_only_due_tasks_fire_and_are_cleared() {
        let pool = test_pool().await;
        let now = Utc::now();
        schedule(&pool, TaskAction::DeleteMessage, -100, 1, now - ChronoDuration::minutes(1))
            .await
            .expect("past");
        schedule(&pool, TaskAction::UnpinMessage, -100, 2, now - ChronoDuration::minutes(2))
            .await
            .expect("past unpin");
        schedule(&pool, TaskAction::DeleteMessage, -100, 3, now + ChronoDuration::hours(1))
            .await
            .expect("future");

        let recording = Arc::new(RecordingTransport::default());
        let transport: Arc<dyn ChatTransport> = recording.clone();
        run_due_tasks(&pool, &transport, now).await;

        assert_eq!(recording.deleted.lock().expect("lock").as_slice(), &[(-100, 1)]);
        assert_eq!(recording.unpinned.lock().expect("lock").as_slice(), &[(-100, 2)]);

        let remaining = due(&pool, now + ChronoDuration::hours(2)).await.expect("remaining");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message_id, 3);
    }

    #[tokio::test]
    async fn test_transport_failure_still_clears_task() {
        let pool = test_pool().await;
        let now = Utc::now();
        schedule(&pool, TaskAction::DeleteMessage, -100, 1, now - ChronoDuration::minutes(1))
            .await
            .expect("past");

        let failing = Arc::new(RecordingTransport {
            fail_mutations: true,
            ..Default::default()
        });
        let transport: Arc<dyn ChatTransport> = failing;
        run_due_tasks(&pool, &transport, now).await;

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scheduled_tasks")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(rows, 0);
    }
}
