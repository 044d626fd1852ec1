use axum::{extract::State, Json};
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::activity;
use crate::errors::AppError;
use crate::models::activity::ActivityRow;
use crate::models::job::Job;
use crate::models::user::MemberSummary;
use crate::state::AppState;

const RECENT_ACTIVITY_LIMIT: i64 = 20;

/// GET /health
pub async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub total_members: i64,
    pub total_points: i64,
    pub top_member: Option<String>,
    pub active_jobs: i64,
    pub closed_jobs: i64,
    pub paid_jobs: i64,
    pub total_applications: i64,
    pub total_promotions: i64,
    pub weekly_promotions: i64,
}

/// Aggregates the store into one dashboard payload.
pub async fn collect_stats(pool: &SqlitePool) -> sqlx::Result<Stats> {
    let total_members: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    let total_points: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(points), 0) FROM users")
        .fetch_one(pool)
        .await?;
    let top_member: Option<String> =
        sqlx::query_scalar("SELECT username FROM users ORDER BY points DESC, user_id ASC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    let active_jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'active'")
        .fetch_one(pool)
        .await?;
    let closed_jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'closed'")
        .fetch_one(pool)
        .await?;
    let paid_jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'paid'")
        .fetch_one(pool)
        .await?;
    let total_applications: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM applicants")
        .fetch_one(pool)
        .await?;

    let total_promotions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM promotions")
        .fetch_one(pool)
        .await?;
    let week_ago = Utc::now() - Duration::days(7);
    let weekly_promotions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM promotions WHERE created_at >= ?")
            .bind(week_ago)
            .fetch_one(pool)
            .await?;

    Ok(Stats {
        total_members,
        total_points,
        top_member,
        active_jobs,
        closed_jobs,
        paid_jobs,
        total_applications,
        total_promotions,
        weekly_promotions,
    })
}

/// GET /api/stats
pub async fn handle_stats(State(state): State<AppState>) -> Result<Json<Stats>, AppError> {
    Ok(Json(collect_stats(&state.db).await?))
}

/// GET /api/members
pub async fn handle_members(
    State(state): State<AppState>,
) -> Result<Json<Vec<MemberSummary>>, AppError> {
    let members: Vec<MemberSummary> = sqlx::query_as(
        "SELECT user_id, username, referrer, points, created_at FROM users ORDER BY points DESC, username",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(members))
}

/// GET /api/jobs
pub async fn handle_jobs(State(state): State<AppState>) -> Result<Json<Vec<Job>>, AppError> {
    let jobs: Vec<Job> = sqlx::query_as(
        "SELECT id, title, fee, description, status, created_at FROM jobs ORDER BY id DESC",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(jobs))
}

/// GET /api/activity
pub async fn handle_activity(
    State(state): State<AppState>,
) -> Result<Json<Vec<ActivityRow>>, AppError> {
    Ok(Json(activity::recent(&state.db, RECENT_ACTIVITY_LIMIT).await?))
}
