//! Promotion posting and the per-promotion click ledger.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger;
use crate::models::promotion::{PromoKind, Promotion};

#[derive(Debug, Error)]
pub enum PromoteError {
    #[error("user is not a registered member")]
    NotRegistered,

    #[error("insufficient points: have {have}, need {need}")]
    InsufficientPoints { have: i64, need: i64 },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct PromoteReceipt {
    pub promotion: Promotion,
    pub cost: i64,
    pub owner_username: String,
}

/// Prefixes bare links with https:// so the stored link is always clickable.
fn normalize_link(link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else {
        format!("https://{link}")
    }
}

/// Short, shareable promotion id derived from a v4 uuid.
fn fresh_promo_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Posts a promotion. The kind-dependent cost is taken through the guarded
/// deduction, so an insufficient balance can never go negative: the reject
/// happens in the same atomic step as the charge.
pub async fn promote(
    pool: &SqlitePool,
    owner_id: i64,
    link: &str,
    kind: PromoKind,
    now: DateTime<Utc>,
) -> Result<PromoteReceipt, PromoteError> {
    let cost = kind.cost();
    let mut tx = pool.begin().await?;

    let owner: Option<(String, i64)> =
        sqlx::query_as("SELECT username, points FROM users WHERE user_id = ?")
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some((owner_username, have)) = owner else {
        return Err(PromoteError::NotRegistered);
    };

    if !ledger::deduct_points_checked(&mut tx, owner_id, cost).await? {
        return Err(PromoteError::InsufficientPoints { have, need: cost });
    }

    let promotion = Promotion {
        id: fresh_promo_id(),
        owner_id,
        link: normalize_link(link),
        kind,
        created_at: now,
    };
    sqlx::query("INSERT INTO promotions (id, owner_id, link, kind, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&promotion.id)
        .bind(promotion.owner_id)
        .bind(&promotion.link)
        .bind(promotion.kind)
        .bind(promotion.created_at)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(PromoteReceipt {
        promotion,
        cost,
        owner_username,
    })
}

#[derive(Debug, Error)]
pub enum ClickError {
    #[error("promotion not found")]
    PromotionNotFound,

    /// Same clicker, same promotion: rejected so a point is never paid
    /// twice for one follow.
    #[error("already clicked this promotion")]
    AlreadyClicked,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct ClickReceipt {
    pub link: String,
    /// None when the owner account was deleted after posting.
    pub owner_username: Option<String>,
}

/// Records a click. The PRIMARY KEY (promo_id, user_id) makes the
/// first-click check atomic; the point award rides in the same transaction.
pub async fn click(
    pool: &SqlitePool,
    promo_id: &str,
    clicker_id: i64,
    now: DateTime<Utc>,
) -> Result<ClickReceipt, ClickError> {
    let mut tx = pool.begin().await?;

    let promotion: Option<Promotion> = sqlx::query_as(
        "SELECT id, owner_id, link, kind, created_at FROM promotions WHERE id = ?",
    )
    .bind(promo_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(promotion) = promotion else {
        return Err(ClickError::PromotionNotFound);
    };

    let inserted = sqlx::query(
        "INSERT INTO promotion_clicks (promo_id, user_id, clicked_at) VALUES (?, ?, ?) \
         ON CONFLICT (promo_id, user_id) DO NOTHING",
    )
    .bind(promo_id)
    .bind(clicker_id)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    if inserted.rows_affected() == 0 {
        return Err(ClickError::AlreadyClicked);
    }

    ledger::add_points(&mut tx, clicker_id, ledger::CLICK_REWARD).await?;

    let owner_username: Option<String> =
        sqlx::query_scalar("SELECT username FROM users WHERE user_id = ?")
            .bind(promotion.owner_id)
            .fetch_optional(&mut *tx)
            .await?;

    tx.commit().await?;

    Ok(ClickReceipt {
        link: promotion.link,
        owner_username,
    })
}

#[derive(Debug, Error)]
pub enum FollowersError {
    #[error("promotion not found")]
    PromotionNotFound,

    #[error("only the promotion owner may view its clicks")]
    NotOwner,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct FollowersReport {
    pub promo_id: String,
    pub total: i64,
    /// Clicker handles in click order; deleted accounts show as None.
    pub handles: Vec<Option<String>>,
}

/// Owner-only report of who clicked a promotion.
pub async fn followers(
    pool: &SqlitePool,
    promo_id: &str,
    caller_id: i64,
) -> Result<FollowersReport, FollowersError> {
    let owner_id: Option<i64> = sqlx::query_scalar("SELECT owner_id FROM promotions WHERE id = ?")
        .bind(promo_id)
        .fetch_optional(pool)
        .await?;
    let Some(owner_id) = owner_id else {
        return Err(FollowersError::PromotionNotFound);
    };
    if owner_id != caller_id {
        return Err(FollowersError::NotOwner);
    }

    let handles: Vec<Option<String>> = sqlx::query_scalar(
        "SELECT u.username FROM promotion_clicks c \
         LEFT JOIN users u ON u.user_id = c.user_id \
         WHERE c.promo_id = ? ORDER BY c.clicked_at, c.user_id",
    )
    .bind(promo_id)
    .fetch_all(pool)
    .await?;

    Ok(FollowersReport {
        promo_id: promo_id.to_string(),
        total: handles.len() as i64,
        handles,
    })
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

    #[test]
    fn test_normalize_link() {
        assert_eq!(normalize_link("instagram.com/alice"), "https://instagram.com/alice");
        assert_eq!(normalize_link("https://x.com/alice"), "https://x.com/alice");
        assert_eq!(normalize_link("http://x.com/alice"), "http://x.com/alice");
    }

    #[tokio::test]
    async fn test_promote_charges_kind_cost() {
        let pool = test_pool().await;
        seed_user(&pool, 1, "alice", 30).await;

        let standard = promote(&pool, 1, "x.com/alice", PromoKind::Standard, Utc::now())
            .await
            .expect("standard");
        assert_eq!(standard.cost, 10);
        assert_eq!(points_of(&pool, 1).await, 20);

        let special = promote(&pool, 1, "x.com/alice", PromoKind::Special, Utc::now())
            .await
            .expect("special");
        assert_eq!(special.cost, 15);
        assert_eq!(points_of(&pool, 1).await, 5);
        assert_ne!(standard.promotion.id, special.promotion.id);
    }

    #[tokio::test]
    async fn test_promote_rejects_insufficient_balance() {
        let pool = test_pool().await;
        seed_user(&pool, 1, "alice", 9).await;

        let err = promote(&pool, 1, "x.com/alice", PromoKind::Standard, Utc::now()).await.unwrap_err();
        assert!(matches!(err, PromoteError::InsufficientPoints { have: 9, need: 10 }));
        assert_eq!(points_of(&pool, 1).await, 9);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM promotions")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_first_click_pays_then_duplicates_rejected() {
        let pool = test_pool().await;
        seed_user(&pool, 1, "alice", 20).await;
        seed_user(&pool, 2, "bob", 0).await;
        let receipt = promote(&pool, 1, "x.com/alice", PromoKind::Standard, Utc::now())
            .await
            .expect("promote");
        let promo_id = receipt.promotion.id;

        let first = click(&pool, &promo_id, 2, Utc::now()).await.expect("first click");
        assert_eq!(first.owner_username.as_deref(), Some("alice"));
        assert_eq!(points_of(&pool, 2).await, 1);

        let err = click(&pool, &promo_id, 2, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ClickError::AlreadyClicked));
        assert_eq!(points_of(&pool, 2).await, 1);
    }

    #[tokio::test]
    async fn test_click_unknown_promotion_rejected() {
        let pool = test_pool().await;
        seed_user(&pool, 2, "bob", 0).await;

        let err = click(&pool, "missing1", 2, Utc::now()).await.unwrap_err();
        assert!(matches!(err, ClickError::PromotionNotFound));
    }

    #[tokio::test]
    async fn test_followers_report_is_owner_only() {
        let pool = test_pool().await;
        seed_user(&pool, 1, "alice", 20).await;
        seed_user(&pool, 2, "bob", 0).await;
        seed_user(&pool, 3, "carol", 0).await;
        let receipt = promote(&pool, 1, "x.com/alice", PromoKind::Standard, Utc::now())
            .await
            .expect("promote");
        let promo_id = receipt.promotion.id;

        click(&pool, &promo_id, 2, Utc::now()).await.expect("bob clicks");
        click(&pool, &promo_id, 3, Utc::now()).await.expect("carol clicks");

        let err = followers(&pool, &promo_id, 2).await.unwrap_err();
        assert!(matches!(err, FollowersError::NotOwner));

        let report = followers(&pool, &promo_id, 1).await.expect("report");
        assert_eq!(report.total, 2);
        assert_eq!(
            report.handles,
            vec![Some("bob".to_string()), Some("carol".to_string())]
        );
    }
}
