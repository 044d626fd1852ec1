use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered community member. `user_id` is the chat platform's account id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub whatsapp: String,
    pub telegram: String,
    pub payment_method: String,
    pub payment_number: String,
    pub owner_name: String,
    pub referrer: Option<String>,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

/// Member view for the dashboard. Payment fields are omitted; those stay on
/// the admin chat surface.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MemberSummary {
    pub user_id: i64,
    pub username: String,
    pub referrer: Option<String>,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}
