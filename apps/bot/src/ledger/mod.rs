//! Points and badge ledger: the single owner of point-balance mutations and
//! badge-award idempotence. Badge thresholds are defined here and nowhere
//! else; the apply flow, profile view and leaderboard all call in.
//!
//! Operations take `&mut SqliteConnection` so callers can compose them into
//! their own transaction.

use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::badge::Badge;

/// Points paid for a successful job application.
pub const APPLY_REWARD: i64 = 2;
/// Points paid to a referrer per referred registration.
pub const REFERRAL_BONUS: i64 = 25;
/// Points paid to the first click from each distinct user on a promotion.
pub const CLICK_REWARD: i64 = 1;
/// Points paid for an answered group AI query.
pub const AI_CHAT_REWARD: i64 = 1;
/// Points paid to the requester of a group summary.
pub const SUMMARY_REWARD: i64 = 2;

const MEMBER_AKTIF_THRESHOLD: i64 = 10;
const WORKER_PRO_THRESHOLD: i64 = 50;
const FAST_RESPONDER_WINDOW_MINUTES: i64 = 5;
const VETERAN_AGE_DAYS: i64 = 180;

/// Adds `delta` (possibly negative) to a member's balance. A no-op for
/// unknown users; callers validate existence first.
pub async fn add_points(conn: &mut SqliteConnection, user_id: i64, delta: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET points = points + ? WHERE user_id = ?")
        .bind(delta)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Deducts `cost` only if the balance covers it. Returns false when the
/// balance is insufficient (or the user is unknown); the balance never goes
/// negative through this path.
pub async fn deduct_points_checked(
    conn: &mut SqliteConnection,
    user_id: i64,
    cost: i64,
) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE users SET points = points - ? WHERE user_id = ? AND points >= ?")
        .bind(cost)
        .bind(user_id)
        .bind(cost)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn has_badge(
    conn: &mut SqliteConnection,
    user_id: i64,
    badge: &str,
) -> sqlx::Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM achievements WHERE user_id = ? AND badge = ?")
            .bind(user_id)
            .bind(badge)
            .fetch_optional(conn)
            .await?;
    Ok(found.is_some())
}

/// Awards a badge exactly once per (user, badge). The UNIQUE constraint makes
/// the check-and-insert a single atomic step, so rapid repeated calls cannot
/// duplicate an award. Returns true only on the first award; callers use
/// that to send the one-time congratulation.
pub async fn award_badge(
    conn: &mut SqliteConnection,
    user_id: i64,
    badge: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "INSERT INTO achievements (user_id, badge, awarded_at) VALUES (?, ?, ?) \
         ON CONFLICT (user_id, badge) DO NOTHING",
    )
    .bind(user_id)
    .bind(badge)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn badges_of(pool: &SqlitePool, user_id: i64) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar("SELECT badge FROM achievements WHERE user_id = ? ORDER BY awarded_at, id")
        .bind(user_id)
        .fetch_all(pool)
        .await
}

/// Evaluates the application-triggered badge rules against post-insert
/// counts. Called inside the apply transaction; returns only badges newly
/// earned by this application.
pub async fn apply_badges(
    conn: &mut SqliteConnection,
    user_id: i64,
    total_applications: i64,
    job_created_at: DateTime<Utc>,
    applied_at: DateTime<Utc>,
) -> sqlx::Result<Vec<Badge>> {
    let mut earned = Vec::new();

    if total_applications == 1 && award_badge(conn, user_id, Badge::RisingStar.name(), applied_at).await? {
        earned.push(Badge::RisingStar);
    }
    if total_applications >= MEMBER_AKTIF_THRESHOLD
        && award_badge(conn, user_id, Badge::MemberAktif.name(), applied_at).await?
    {
        earned.push(Badge::MemberAktif);
    }
    if total_applications >= WORKER_PRO_THRESHOLD
        && award_badge(conn, user_id, Badge::WorkerPro.name(), applied_at).await?
    {
        earned.push(Badge::WorkerPro);
    }
    if applied_at - job_created_at <= Duration::minutes(FAST_RESPONDER_WINDOW_MINUTES)
        && award_badge(conn, user_id, Badge::FastResponder.name(), applied_at).await?
    {
        earned.push(Badge::FastResponder);
    }

    Ok(earned)
}

/// Veteran rule, evaluated on profile view: account age of 180 days or more.
pub async fn veteran_badge(
    conn: &mut SqliteConnection,
    user_id: i64,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> sqlx::Result<Option<Badge>> {
    if now - created_at >= Duration::days(VETERAN_AGE_DAYS)
        && award_badge(conn, user_id, Badge::Veteran.name(), now).await?
    {
        return Ok(Some(Badge::Veteran));
    }
    Ok(None)
}

/// Top Contributor rule, re-evaluated at each leaderboard view: whoever is
/// rank 1 by points gets the badge (once).
pub async fn top_contributor_badge(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> sqlx::Result<Option<(i64, Badge)>> {
    let top: Option<i64> =
        sqlx::query_scalar("SELECT user_id FROM users ORDER BY points DESC, user_id ASC LIMIT 1")
            .fetch_optional(&mut *conn)
            .await?;
    let Some(user_id) = top else {
        return Ok(None);
    };
    if award_badge(conn, user_id, Badge::TopContributor.name(), now).await? {
        return Ok(Some((user_id, Badge::TopContributor)));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

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

    async fn points_of(pool: &SqlitePool, user_id: i64) -> i64 {
        sqlx::query_scalar("SELECT points FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .expect("points")
    }

    #[tokio::test]
    async fn test_add_points_unknown_user_is_noop() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.expect("conn");
        add_points(&mut conn, 999, 5).await.expect("add");
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_award_badge_is_idempotent() {
        let pool = test_pool().await;
        seed_user(&pool, 1, "alice", 0).await;
        let mut conn = pool.acquire().await.expect("conn");
        let now = Utc::now();

        assert!(award_badge(&mut conn, 1, "Rising Star", now).await.expect("first"));
        assert!(!award_badge(&mut conn, 1, "Rising Star", now).await.expect("second"));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM achievements WHERE user_id = 1")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(rows, 1);
        assert!(has_badge(&mut conn, 1, "Rising Star").await.expect("has"));
    }

    #[tokio::test]
    async fn test_deduct_points_checked_guards_balance() {
        let pool = test_pool().await;
        seed_user(&pool, 1, "alice", 12).await;
        let mut conn = pool.acquire().await.expect("conn");

        assert!(deduct_points_checked(&mut conn, 1, 10).await.expect("first"));
        assert_eq!(points_of(&pool, 1).await, 2);

        // Balance 2 cannot cover another 10.
        assert!(!deduct_points_checked(&mut conn, 1, 10).await.expect("second"));
        assert_eq!(points_of(&pool, 1).await, 2);
    }

    #[tokio::test]
    async fn test_veteran_awarded_after_180_days() {
        let pool = test_pool().await;
        seed_user(&pool, 1, "alice", 0).await;
        let mut conn = pool.acquire().await.expect("conn");
        let created = Utc::now() - Duration::days(181);

        let fresh = veteran_badge(&mut conn, 1, Utc::now(), Utc::now()).await.expect("young");
        assert!(fresh.is_none());

        let aged = veteran_badge(&mut conn, 1, created, Utc::now()).await.expect("old");
        assert_eq!(aged, Some(Badge::Veteran));

        let again = veteran_badge(&mut conn, 1, created, Utc::now()).await.expect("again");
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_top_contributor_awarded_once_to_rank_one() {
        let pool = test_pool().await;
        seed_user(&pool, 1, "alice", 30).await;
        seed_user(&pool, 2, "bob", 50).await;
        let mut conn = pool.acquire().await.expect("conn");

        let crowned = top_contributor_badge(&mut conn, Utc::now()).await.expect("first");
        assert_eq!(crowned, Some((2, Badge::TopContributor)));

        let repeat = top_contributor_badge(&mut conn, Utc::now()).await.expect("second");
        assert!(repeat.is_none());
    }
}
