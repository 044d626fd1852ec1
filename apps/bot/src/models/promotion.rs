use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "lowercase")]
pub enum PromoKind {
    Standard,
    Special,
}

impl PromoKind {
    /// Point cost charged to the owner when the promotion is posted.
    pub fn cost(&self) -> i64 {
        match self {
            PromoKind::Standard => 10,
            PromoKind::Special => 15,
        }
    }
}

/// A shareable link post. Clicks are tracked per distinct user in
/// `promotion_clicks`; the first click from each user pays one point.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Promotion {
    pub id: String,
    pub owner_id: i64,
    pub link: String,
    pub kind: PromoKind,
    pub created_at: DateTime<Utc>,
}
