//! Member registration, profile views/edits and the referral ledger.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::ledger;
use crate::models::badge::Badge;
use crate::models::user::User;

/// Profile data collected at registration. The referrer handle is optional;
/// when present it must resolve to an existing member; unresolved codes are
/// rejected here, at input validation, never silently dropped after commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMember {
    pub username: String,
    pub whatsapp: String,
    pub telegram: String,
    pub payment_method: String,
    pub payment_number: String,
    pub owner_name: String,
    pub referrer: Option<String>,
}

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("account is already registered")]
    AlreadyRegistered,

    #[error("username is already taken")]
    UsernameTaken,

    #[error("unknown referral code: {0}")]
    UnknownReferrer(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Referrer side of a successful referral, for the best-effort
/// congratulation DM.
#[derive(Debug)]
pub struct ReferralBonus {
    pub referrer_id: i64,
    pub referrer_username: String,
    pub total_referrals: i64,
}

#[derive(Debug)]
pub struct RegisterReceipt {
    pub user: User,
    pub referral: Option<ReferralBonus>,
}

/// Registers a new member. When the referral code resolves, the referrer is
/// paid the fixed bonus inside the same transaction, exactly once per
/// registration, since registration itself can only happen once per account.
pub async fn register(
    pool: &SqlitePool,
    user_id: i64,
    member: NewMember,
    now: DateTime<Utc>,
) -> Result<RegisterReceipt, RegisterError> {
    let mut tx = pool.begin().await?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT user_id FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    if existing.is_some() {
        return Err(RegisterError::AlreadyRegistered);
    }

    let taken: Option<i64> = sqlx::query_scalar("SELECT user_id FROM users WHERE username = ?")
        .bind(&member.username)
        .fetch_optional(&mut *tx)
        .await?;
    if taken.is_some() {
        return Err(RegisterError::UsernameTaken);
    }

    // Resolve the referral code before anything is written.
    let referrer: Option<(i64, String)> = match &member.referrer {
        Some(code) => {
            let row: Option<(i64, String)> =
                sqlx::query_as("SELECT user_id, username FROM users WHERE username = ?")
                    .bind(code)
                    .fetch_optional(&mut *tx)
                    .await?;
            match row {
                Some(found) => Some(found),
                None => return Err(RegisterError::UnknownReferrer(code.clone())),
            }
        }
        None => None,
    };

    let insert = sqlx::query(
        "INSERT INTO users (user_id, username, whatsapp, telegram, payment_method, \
         payment_number, owner_name, referrer, points, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(user_id)
    .bind(&member.username)
    .bind(&member.whatsapp)
    .bind(&member.telegram)
    .bind(&member.payment_method)
    .bind(&member.payment_number)
    .bind(&member.owner_name)
    .bind(referrer.as_ref().map(|(_, name)| name.clone()))
    .bind(now)
    .execute(&mut *tx)
    .await;

    // The UNIQUE constraint is the real duplicate guard; the pre-checks above
    // only pick the friendlier error. Map a lost race to the same reply.
    if let Err(e) = insert {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return Err(RegisterError::UsernameTaken);
            }
        }
        return Err(e.into());
    }

    let referral = match referrer {
        Some((referrer_id, referrer_username)) => {
            ledger::add_points(&mut tx, referrer_id, ledger::REFERRAL_BONUS).await?;
            let total_referrals: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE referrer = ?")
                    .bind(&referrer_username)
                    .fetch_one(&mut *tx)
                    .await?;
            Some(ReferralBonus {
                referrer_id,
                referrer_username,
                total_referrals,
            })
        }
        None => None,
    };

    let user: User = sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(RegisterReceipt { user, referral })
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("user is not a registered member")]
    NotRegistered,

    #[error("username is already taken")]
    UsernameTaken,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    Username,
    Whatsapp,
    Telegram,
    PaymentMethod,
    PaymentNumber,
    OwnerName,
}

impl ProfileField {
    fn column(self) -> &'static str {
        match self {
            ProfileField::Username => "username",
            ProfileField::Whatsapp => "whatsapp",
            ProfileField::Telegram => "telegram",
            ProfileField::PaymentMethod => "payment_method",
            ProfileField::PaymentNumber => "payment_number",
            ProfileField::OwnerName => "owner_name",
        }
    }
}

/// Updates a single profile field. Username edits respect the same
/// uniqueness rule as registration.
pub async fn update_profile(
    pool: &SqlitePool,
    user_id: i64,
    field: ProfileField,
    value: &str,
) -> Result<(), ProfileError> {
    let mut tx = pool.begin().await?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT user_id FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    if existing.is_none() {
        return Err(ProfileError::NotRegistered);
    }

    if let ProfileField::Username = field {
        let taken: Option<i64> =
            sqlx::query_scalar("SELECT user_id FROM users WHERE username = ? AND user_id != ?")
                .bind(value)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if taken.is_some() {
            return Err(ProfileError::UsernameTaken);
        }
    }

    // Column name comes from the enum above, never from user input.
    let statement = format!("UPDATE users SET {} = ? WHERE user_id = ?", field.column());
    sqlx::query(&statement)
        .bind(value)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

#[derive(Debug)]
pub struct ProfileView {
    pub user: User,
    pub badges: Vec<String>,
    /// Set when this very view triggered the Veteran award.
    pub new_badge: Option<Badge>,
}

/// The member's own profile. Viewing it is where the Veteran rule runs.
pub async fn profile(
    pool: &SqlitePool,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<ProfileView, ProfileError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    let Some(user) = user else {
        return Err(ProfileError::NotRegistered);
    };

    let mut conn = pool.acquire().await?;
    let new_badge = ledger::veteran_badge(&mut conn, user_id, user.created_at, now).await?;
    drop(conn);

    let badges = ledger::badges_of(pool, user_id).await?;

    Ok(ProfileView {
        user,
        badges,
        new_badge,
    })
}

#[derive(Debug)]
pub struct ReferralSummary {
    /// The member's referral code is simply their handle.
    pub code: String,
    pub points: i64,
    pub referred: Vec<String>,
}

/// Who this member has referred, with their code and balance.
pub async fn referral_summary(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<ReferralSummary, ProfileError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    let Some(user) = user else {
        return Err(ProfileError::NotRegistered);
    };

    let referred: Vec<String> =
        sqlx::query_scalar("SELECT username FROM users WHERE referrer = ? ORDER BY created_at, user_id")
            .bind(&user.username)
            .fetch_all(pool)
            .await?;

    Ok(ReferralSummary {
        code: user.username,
        points: user.points,
        referred,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn member(username: &str, referrer: Option<&str>) -> NewMember {
        NewMember {
            username: username.to_string(),
            whatsapp: "0811000".to_string(),
            telegram: "0811000".to_string(),
            payment_method: "Dana".to_string(),
            payment_number: "0811000".to_string(),
            owner_name: "Owner".to_string(),
            referrer: referrer.map(str::to_string),
        }
    }

    async fn points_of(pool: &SqlitePool, user_id: i64) -> i64 {
        sqlx::query_scalar("SELECT points FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .expect("points")
    }

    #[tokio::test]
    async fn test_register_without_referrer() {
        let pool = test_pool().await;
        let receipt = register(&pool, 1, member("alice", None), Utc::now())
            .await
            .expect("register");
        assert_eq!(receipt.user.username, "alice");
        assert_eq!(receipt.user.points, 0);
        assert!(receipt.referral.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let pool = test_pool().await;
        register(&pool, 1, member("alice", None), Utc::now()).await.expect("first");

        let err = register(&pool, 2, member("alice", None), Utc::now()).await.unwrap_err();
        assert!(matches!(err, RegisterError::UsernameTaken));
    }

    #[tokio::test]
    async fn test_double_registration_rejected() {
        let pool = test_pool().await;
        register(&pool, 1, member("alice", None), Utc::now()).await.expect("first");

        let err = register(&pool, 1, member("alice2", None), Utc::now()).await.unwrap_err();
        assert!(matches!(err, RegisterError::AlreadyRegistered));
    }

    #[tokio::test]
    async fn test_unresolved_referral_code_rejected_before_commit() {
        let pool = test_pool().await;
        let err = register(&pool, 1, member("alice", Some("ghost")), Utc::now()).await.unwrap_err();
        assert!(matches!(err, RegisterError::UnknownReferrer(_)));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_referral_bonus_paid_exactly_once_per_registration() {
        let pool = test_pool().await;
        register(&pool, 1, member("alice", None), Utc::now()).await.expect("referrer");

        let receipt = register(&pool, 2, member("bob", Some("alice")), Utc::now())
            .await
            .expect("referred");
        let bonus = receipt.referral.expect("bonus");
        assert_eq!(bonus.referrer_id, 1);
        assert_eq!(bonus.total_referrals, 1);
        assert_eq!(points_of(&pool, 1).await, ledger::REFERRAL_BONUS);

        // A second distinct registration pays again; the first one never re-pays.
        register(&pool, 3, member("carol", Some("alice")), Utc::now()).await.expect("third");
        assert_eq!(points_of(&pool, 1).await, 2 * ledger::REFERRAL_BONUS);

        // Both directions are visible.
        let summary = referral_summary(&pool, 1).await.expect("summary");
        assert_eq!(summary.referred, vec!["bob", "carol"]);
        let bob: User = sqlx::query_as("SELECT * FROM users WHERE user_id = 2")
            .fetch_one(&pool)
            .await
            .expect("bob");
        assert_eq!(bob.referrer.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_update_username_respects_uniqueness() {
        let pool = test_pool().await;
        register(&pool, 1, member("alice", None), Utc::now()).await.expect("alice");
        register(&pool, 2, member("bob", None), Utc::now()).await.expect("bob");

        let err = update_profile(&pool, 2, ProfileField::Username, "alice").await.unwrap_err();
        assert!(matches!(err, ProfileError::UsernameTaken));

        update_profile(&pool, 2, ProfileField::Username, "bobby").await.expect("rename");
        let renamed: String = sqlx::query_scalar("SELECT username FROM users WHERE user_id = 2")
            .fetch_one(&pool)
            .await
            .expect("name");
        assert_eq!(renamed, "bobby");
    }

    #[tokio::test]
    async fn test_profile_view_awards_veteran_once() {
        let pool = test_pool().await;
        let joined = Utc::now() - chrono::Duration::days(200);
        register(&pool, 1, member("alice", None), joined).await.expect("register");

        let view = profile(&pool, 1, Utc::now()).await.expect("profile");
        assert_eq!(view.new_badge, Some(Badge::Veteran));

        let again = profile(&pool, 1, Utc::now()).await.expect("profile again");
        assert!(again.new_badge.is_none());
        assert_eq!(again.badges, vec!["Veteran"]);
    }
}
