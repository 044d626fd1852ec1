//! Leaderboard queries. Viewing the board is where the Top Contributor rule
//! runs, so the badge follows whoever holds rank 1 at query time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use crate::ledger;
use crate::models::badge::Badge;

const BOARD_SIZE: i64 = 10;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PointsEntry {
    pub username: String,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReferrerEntry {
    pub username: String,
    pub referred: i64,
}

#[derive(Debug)]
pub struct LeaderboardView {
    pub top_points: Vec<PointsEntry>,
    pub top_referrers: Vec<ReferrerEntry>,
    /// Set when this view newly crowned the rank-1 member.
    pub crowned: Option<(i64, Badge)>,
}

pub async fn leaderboard(pool: &SqlitePool, now: DateTime<Utc>) -> sqlx::Result<LeaderboardView> {
    let top_points: Vec<PointsEntry> = sqlx::query_as(
        "SELECT username, points FROM users ORDER BY points DESC, user_id ASC LIMIT ?",
    )
    .bind(BOARD_SIZE)
    .fetch_all(pool)
    .await?;

    let top_referrers: Vec<ReferrerEntry> = sqlx::query_as(
        "SELECT u.username AS username, COUNT(*) AS referred \
         FROM users r JOIN users u ON u.username = r.referrer \
         GROUP BY u.username ORDER BY referred DESC, u.username ASC LIMIT ?",
    )
    .bind(BOARD_SIZE)
    .fetch_all(pool)
    .await?;

    let mut conn = pool.acquire().await?;
    let crowned = ledger::top_contributor_badge(&mut conn, now).await?;

    Ok(LeaderboardView {
        top_points,
        top_referrers,
        crowned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed_user(pool: &SqlitePool, user_id: i64, username: &str, referrer: Option<&str>, points: i64) {
        sqlx::query(
            "INSERT INTO users (user_id, username, whatsapp, telegram, payment_method, \
             payment_number, owner_name, referrer, points, created_at) \
             VALUES (?, ?, '0811', '0811', 'Dana', '0811', 'Owner', ?, ?, ?)",
        )
        .bind(user_id)
        .bind(username)
        .bind(referrer)
        .bind(points)
        .bind(Utc::now())
        .execute(pool)
        .await
        .expect("seed user");
    }

    #[tokio::test]
    async fn test_leaderboard_orders_and_crowns_once() {
        let pool = test_pool().await;
        seed_user(&pool, 1, "alice", None, 40).await;
        seed_user(&pool, 2, "bob", Some("alice"), 70).await;
        seed_user(&pool, 3, "carol", Some("alice"), 10).await;

        let view = leaderboard(&pool, Utc::now()).await.expect("board");
        assert_eq!(view.top_points[0].username, "bob");
        assert_eq!(view.top_points[1].username, "alice");
        assert_eq!(view.top_referrers[0].username, "alice");
        assert_eq!(view.top_referrers[0].referred, 2);
        assert_eq!(view.crowned, Some((2, Badge::TopContributor)));

        // Same rank 1 on the next view: already crowned, no repeat award.
        let second = leaderboard(&pool, Utc::now()).await.expect("board again");
        assert!(second.crowned.is_none());
    }
}
