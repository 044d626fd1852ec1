//! Job application workflow. Per (job, user) the only transition is
//! NOT_APPLIED → APPLIED; a second apply is rejected, not a state change.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::ledger;
use crate::models::badge::Badge;
use crate::models::job::Job;

#[derive(Debug, Error)]
pub enum ApplyError {
    /// The caller is not a registered member (validation failure).
    #[error("user is not a registered member")]
    NotRegistered,

    /// No job with the given id (validation failure).
    #[error("job not found")]
    JobNotFound,

    /// The (job, user) pair already exists (duplicate-action failure,
    /// reported distinctly so the UI can say "already done").
    #[error("already applied to this job")]
    AlreadyApplied,

    /// Store failure, fatal for this operation only; the transaction makes
    /// it all-or-nothing.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct ApplyReceipt {
    pub job: Job,
    /// 1-based position among this job's applicants, in apply order.
    pub rank: i64,
    /// Display handles of every applicant for the job, in apply order.
    pub applicants: Vec<String>,
    /// The user's total applications after this one.
    pub total_applications: i64,
    /// Badges newly earned by this application. The caller sends one
    /// best-effort notification per entry.
    pub new_badges: Vec<Badge>,
}

/// Applies `user_id` to `job_id`. The whole effect (applicant insert, point
/// reward, badge evaluation) is one transaction, so concurrent callers see
/// it atomically. Duplicate prevention rides on the UNIQUE (job_id, user_id)
/// constraint rather than a separate existence check.
pub async fn apply(
    pool: &SqlitePool,
    job_id: i64,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<ApplyReceipt, ApplyError> {
    let mut tx = pool.begin().await?;

    let registered: Option<i64> = sqlx::query_scalar("SELECT user_id FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    if registered.is_none() {
        return Err(ApplyError::NotRegistered);
    }

    let job: Option<Job> = sqlx::query_as(
        "SELECT id, title, fee, description, status, created_at FROM jobs WHERE id = ?",
    )
    .bind(job_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(job) = job else {
        return Err(ApplyError::JobNotFound);
    };

    // Atomic conditional insert: None means the pair already existed.
    let inserted: Option<i64> = sqlx::query_scalar(
        "INSERT INTO applicants (job_id, user_id, applied_at) VALUES (?, ?, ?) \
         ON CONFLICT (job_id, user_id) DO NOTHING RETURNING id",
    )
    .bind(job_id)
    .bind(user_id)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(applicant_id) = inserted else {
        return Err(ApplyError::AlreadyApplied);
    };

    // Apply order is the AUTOINCREMENT id, so the rank is a prefix count.
    let rank: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM applicants WHERE job_id = ? AND id <= ?")
            .bind(job_id)
            .bind(applicant_id)
            .fetch_one(&mut *tx)
            .await?;

    let total_applications: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM applicants WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

    ledger::add_points(&mut tx, user_id, ledger::APPLY_REWARD).await?;

    let new_badges =
        ledger::apply_badges(&mut tx, user_id, total_applications, job.created_at, now).await?;

    let applicants: Vec<String> = sqlx::query_scalar(
        "SELECT u.username FROM applicants a \
         JOIN users u ON u.user_id = a.user_id \
         WHERE a.job_id = ? ORDER BY a.id",
    )
    .bind(job_id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(ApplyReceipt {
        job,
        rank,
        applicants,
        total_applications,
        new_badges,
    })
}

/// All applicant handles for a job, in apply order.
pub async fn applicants_of(pool: &SqlitePool, job_id: i64) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar(
        "SELECT u.username FROM applicants a \
         JOIN users u ON u.user_id = a.user_id \
         WHERE a.job_id = ? ORDER BY a.id",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
}
