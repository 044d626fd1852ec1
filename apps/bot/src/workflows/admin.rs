//! Admin mutations. These are the only write paths besides the §4 workflows;
//! the dashboard never mutates anything.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::ledger;
use crate::models::job::{Job, JobStatus};
use crate::models::user::User;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("no member with that username")]
    UserNotFound,

    #[error("job not found")]
    JobNotFound,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Everything or one target, for the reset commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetTarget {
    All,
    Member(String),
}

pub async fn post_job(
    pool: &SqlitePool,
    title: &str,
    fee: &str,
    description: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<Job> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO jobs (title, fee, description, status, created_at) \
         VALUES (?, ?, ?, 'active', ?) RETURNING id",
    )
    .bind(title)
    .bind(fee)
    .bind(description)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(Job {
        id,
        title: title.to_string(),
        fee: fee.to_string(),
        description: description.to_string(),
        status: JobStatus::Active,
        created_at: now,
    })
}

pub async fn job_by_id(pool: &SqlitePool, job_id: i64) -> sqlx::Result<Option<Job>> {
    sqlx::query_as("SELECT id, title, fee, description, status, created_at FROM jobs WHERE id = ?")
        .bind(job_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_jobs(pool: &SqlitePool) -> sqlx::Result<Vec<Job>> {
    sqlx::query_as("SELECT id, title, fee, description, status, created_at FROM jobs ORDER BY id")
        .fetch_all(pool)
        .await
}

pub async fn update_job_status(
    pool: &SqlitePool,
    job_id: i64,
    status: JobStatus,
) -> Result<Job, AdminError> {
    let result = sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
        .bind(status)
        .bind(job_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AdminError::JobNotFound);
    }
    Ok(job_by_id(pool, job_id).await?.ok_or(AdminError::JobNotFound)?)
}

/// Deletes one job or every job, applicant rows included.
pub async fn reset_jobs(pool: &SqlitePool, target: Option<i64>) -> Result<u64, AdminError> {
    let mut tx = pool.begin().await?;
    let deleted = match target {
        Some(job_id) => {
            let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(AdminError::JobNotFound);
            }
            sqlx::query("DELETE FROM applicants WHERE job_id = ?")
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
            result.rows_affected()
        }
        None => {
            let result = sqlx::query("DELETE FROM jobs").execute(&mut *tx).await?;
            sqlx::query("DELETE FROM applicants").execute(&mut *tx).await?;
            result.rows_affected()
        }
    };
    tx.commit().await?;
    Ok(deleted)
}

pub async fn list_members(pool: &SqlitePool) -> sqlx::Result<Vec<User>> {
    sqlx::query_as("SELECT * FROM users ORDER BY username")
        .fetch_all(pool)
        .await
}

pub async fn member_by_username(pool: &SqlitePool, username: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await
}

#[derive(Debug)]
pub struct MemberDetail {
    pub user: User,
    pub badges: Vec<String>,
    pub total_applications: i64,
}

pub async fn member_info(pool: &SqlitePool, username: &str) -> Result<MemberDetail, AdminError> {
    let user = member_by_username(pool, username)
        .await?
        .ok_or(AdminError::UserNotFound)?;
    let badges = ledger::badges_of(pool, user.user_id).await?;
    let total_applications: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM applicants WHERE user_id = ?")
            .bind(user.user_id)
            .fetch_one(pool)
            .await?;
    Ok(MemberDetail {
        user,
        badges,
        total_applications,
    })
}

/// Removes a member. Applicant rows go with the account; badges survive only
/// until an explicit badge reset, per the admin contract.
pub async fn delete_member(pool: &SqlitePool, username: &str) -> Result<i64, AdminError> {
    let user = member_by_username(pool, username)
        .await?
        .ok_or(AdminError::UserNotFound)?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM applicants WHERE user_id = ?")
        .bind(user.user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM users WHERE user_id = ?")
        .bind(user.user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(user.user_id)
}

pub async fn reset_points(pool: &SqlitePool, username: &str) -> Result<i64, AdminError> {
    let user = member_by_username(pool, username)
        .await?
        .ok_or(AdminError::UserNotFound)?;
    sqlx::query("UPDATE users SET points = 0 WHERE user_id = ?")
        .bind(user.user_id)
        .execute(pool)
        .await?;
    Ok(user.user_id)
}

pub async fn add_points(pool: &SqlitePool, username: &str, delta: i64) -> Result<i64, AdminError> {
    let user = member_by_username(pool, username)
        .await?
        .ok_or(AdminError::UserNotFound)?;
    let mut conn = pool.acquire().await?;
    ledger::add_points(&mut conn, user.user_id, delta).await?;
    Ok(user.user_id)
}

/// Grants a badge by name (free-form names allowed for manual grants).
/// Returns the user id and whether this was the first grant.
pub async fn grant_badge(
    pool: &SqlitePool,
    username: &str,
    badge: &str,
    now: DateTime<Utc>,
) -> Result<(i64, bool), AdminError> {
    let user = member_by_username(pool, username)
        .await?
        .ok_or(AdminError::UserNotFound)?;
    let mut conn = pool.acquire().await?;
    let fresh = ledger::award_badge(&mut conn, user.user_id, badge, now).await?;
    Ok((user.user_id, fresh))
}

pub async fn reset_applications(pool: &SqlitePool, target: ResetTarget) -> Result<u64, AdminError> {
    match target {
        ResetTarget::All => {
            let result = sqlx::query("DELETE FROM applicants").execute(pool).await?;
            Ok(result.rows_affected())
        }
        ResetTarget::Member(username) => {
            let user = member_by_username(pool, &username)
                .await?
                .ok_or(AdminError::UserNotFound)?;
            let result = sqlx::query("DELETE FROM applicants WHERE user_id = ?")
                .bind(user.user_id)
                .execute(pool)
                .await?;
            Ok(result.rows_affected())
        }
    }
}

pub async fn reset_badges(pool: &SqlitePool, target: ResetTarget) -> Result<u64, AdminError> {
    match target {
        ResetTarget::All => {
            let result = sqlx::query("DELETE FROM achievements").execute(pool).await?;
            Ok(result.rows_affected())
        }
        ResetTarget::Member(username) => {
            let user = member_by_username(pool, &username)
                .await?
                .ok_or(AdminError::UserNotFound)?;
            let result = sqlx::query("DELETE FROM achievements WHERE user_id = ?")
                .bind(user.user_id)
                .execute(pool)
                .await?;
            Ok(result.rows_affected())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::workflows::applications;

    async fn seed_user(pool: &SqlitePool, user_id: i64, username: &str, points: i64) {
        sqlx::query(
            "INSERT INTO users (user_id, username, whatsapp, telegram, payment_method, \
             payment_number, owner_name, referrer, points, created_at) \
             VALUES (?, ?, '0811', '0811', 'Dana', '0811', 'Owner', NULL, ?, ?)",
        )
        .bind(user_id)
        .bind(username)
        .bind(points)
        .bind(Utc::now())
        .execute(pool)
        .await
        .expect("seed user");
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let pool = test_pool().await;
        let job = post_job(&pool, "logo", "50", "details", Utc::now()).await.expect("post");
        assert_eq!(job.status, JobStatus::Active);

        let paid = update_job_status(&pool, job.id, JobStatus::Paid).await.expect("update");
        assert_eq!(paid.status, JobStatus::Paid);

        let err = update_job_status(&pool, 999, JobStatus::Closed).await.unwrap_err();
        assert!(matches!(err, AdminError::JobNotFound));
    }

    #[tokio::test]
    async fn test_delete_member_cascades_to_applicants() {
        let pool = test_pool().await;
        seed_user(&pool, 1, "alice", 0).await;
        let job = post_job(&pool, "logo", "50", "details", Utc::now()).await.expect("post");
        applications::apply(&pool, job.id, 1, Utc::now()).await.expect("apply");

        delete_member(&pool, "alice").await.expect("delete");

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&pool).await.expect("users");
        let applicants: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM applicants").fetch_one(&pool).await.expect("applicants");
        assert_eq!(users, 0);
        assert_eq!(applicants, 0);
    }

    #[tokio::test]
    async fn test_reset_jobs_single_and_all() {
        let pool = test_pool().await;
        seed_user(&pool, 1, "alice", 0).await;
        let a = post_job(&pool, "a", "1", "d", Utc::now()).await.expect("a");
        let b = post_job(&pool, "b", "1", "d", Utc::now()).await.expect("b");
        applications::apply(&pool, a.id, 1, Utc::now()).await.expect("apply");

        reset_jobs(&pool, Some(a.id)).await.expect("reset one");
        assert!(job_by_id(&pool, a.id).await.expect("query").is_none());
        assert!(job_by_id(&pool, b.id).await.expect("query").is_some());
        let orphaned: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM applicants WHERE job_id = ?")
            .bind(a.id)
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(orphaned, 0);

        reset_jobs(&pool, None).await.expect("reset all");
        assert!(list_jobs(&pool).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_reset_points_and_badges() {
        let pool = test_pool().await;
        seed_user(&pool, 1, "alice", 42).await;
        grant_badge(&pool, "alice", "Rising Star", Utc::now()).await.expect("grant");

        reset_points(&pool, "alice").await.expect("reset points");
        let points: i64 = sqlx::query_scalar("SELECT points FROM users WHERE user_id = 1")
            .fetch_one(&pool)
            .await
            .expect("points");
        assert_eq!(points, 0);

        let removed = reset_badges(&pool, ResetTarget::Member("alice".to_string()))
            .await
            .expect("reset badges");
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_grant_badge_reports_first_grant() {
        let pool = test_pool().await;
        seed_user(&pool, 1, "alice", 0).await;

        let (_, fresh) = grant_badge(&pool, "alice", "Helper", Utc::now()).await.expect("first");
        assert!(fresh);
        let (_, repeat) = grant_badge(&pool, "alice", "Helper", Utc::now()).await.expect("second");
        assert!(!repeat);

        let err = grant_badge(&pool, "ghost", "Helper", Utc::now()).await.unwrap_err();
        assert!(matches!(err, AdminError::UserNotFound));
    }
}
