//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::ScoreKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub url_slug: String,
    pub is_temp: bool,
    pub is_private: bool,
    pub likes: i32,
    pub views: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub released_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl PostRecord {
    /// Whether `viewer` may see this post in listings and neighbour links.
    pub fn visible_to(&self, viewer: Option<Uuid>) -> bool {
        !self.is_private || viewer == Some(self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub url_slug: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One post's placement inside one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeriesPosition {
    pub series_id: Uuid,
    pub post_id: Uuid,
    pub index: i32,
}

/// Immutable entry of the score ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreEvent {
    pub id: Uuid,
    pub post_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub kind: ScoreKind,
    pub weight: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostReadRecord {
    pub id: Uuid,
    pub post_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub ip_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Summed ledger weight of one post inside a trending window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedPost {
    pub post_id: Uuid,
    pub score: f64,
}
