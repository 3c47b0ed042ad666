//! Keyset pagination over the post total order.
//!
//! Posts are listed by `(released_at DESC, id DESC)`. The cursor handed to
//! clients only names the last post of a page; the service resolves it back
//! to that post's [`PostKey`] before querying the next page.

use std::cmp::Ordering;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::PostRecord;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct PostCursorPayload {
    id: Uuid,
}

/// Opaque resume point naming the last post of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostCursor {
    id: Uuid,
}

impl PostCursor {
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn encode(&self) -> String {
        let payload = PostCursorPayload { id: self.id };
        let serialized =
            serde_json::to_vec(&payload).expect("serializing post cursor payload should succeed");
        URL_SAFE_NO_PAD.encode(serialized)
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor.trim())
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: PostCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Self { id: payload.id })
    }
}

/// Position of a post in the listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostKey {
    pub released_at: OffsetDateTime,
    pub id: Uuid,
}

impl PostKey {
    pub fn of(post: &PostRecord) -> Self {
        Self {
            released_at: post.released_at,
            id: post.id,
        }
    }

    /// Listing order: newer release first, larger id first on equal release times.
    pub fn listing_order(&self, other: &Self) -> Ordering {
        other
            .released_at
            .cmp(&self.released_at)
            .then_with(|| other.id.cmp(&self.id))
    }

    /// Whether `self` sorts strictly after `anchor` in listing order.
    pub fn follows(&self, anchor: &Self) -> bool {
        self.listing_order(anchor) == Ordering::Greater
    }
}

/// Cursor-aware pagination request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<C> {
    pub limit: u32,
    pub cursor: Option<C>,
}

impl<C> PageRequest<C> {
    pub fn new(limit: u32, cursor: Option<C>) -> Self {
        Self { limit, cursor }
    }
}

/// Cursor-aware page result.
///
/// `next_cursor` names the last item whenever the page is non-empty; an empty
/// page ends the iteration.
#[derive(Debug, Clone, Serialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl CursorPage<PostRecord> {
    pub fn from_posts(items: Vec<PostRecord>) -> Self {
        let next_cursor = items.last().map(|post| PostCursor::new(post.id).encode());
        Self { items, next_cursor }
    }
}

/// Resolve a requested page size, rejecting values outside `1..=MAX_PAGE_LIMIT`.
pub fn resolve_limit(limit: Option<u32>) -> Result<u32, PaginationError> {
    match limit {
        None => Ok(DEFAULT_PAGE_LIMIT),
        Some(0) => Err(PaginationError::LimitTooSmall),
        Some(value) if value > MAX_PAGE_LIMIT => Err(PaginationError::LimitTooLarge {
            max: MAX_PAGE_LIMIT,
        }),
        Some(value) => Ok(value),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("max limit is {max}")]
    LimitTooLarge { max: u32 },
    #[error("limit must be at least 1")]
    LimitTooSmall,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn post_cursor_round_trip() {
        let id = Uuid::new_v4();
        let encoded = PostCursor::new(id).encode();
        let decoded = PostCursor::decode(&encoded).expect("decoded cursor");

        assert_eq!(decoded.id(), id);
        assert!(!encoded.contains(&id.to_string()));
    }

    #[test]
    fn decoding_invalid_cursor_reports_error() {
        let err = PostCursor::decode("not-base64!").expect_err("invalid cursor rejected");
        assert!(matches!(err, PaginationError::InvalidCursor(_)));

        let not_json = URL_SAFE_NO_PAD.encode(b"plain text");
        assert!(PostCursor::decode(&not_json).is_err());
    }

    #[test]
    fn limit_is_bounded() {
        assert_eq!(resolve_limit(None), Ok(DEFAULT_PAGE_LIMIT));
        assert_eq!(resolve_limit(Some(100)), Ok(100));
        assert_eq!(
            resolve_limit(Some(101)),
            Err(PaginationError::LimitTooLarge { max: 100 })
        );
        assert_eq!(resolve_limit(Some(0)), Err(PaginationError::LimitTooSmall));
    }

    #[test]
    fn equal_release_times_order_by_descending_id() {
        let now = OffsetDateTime::now_utc();
        let low = PostKey {
            released_at: now,
            id: Uuid::from_u128(1),
        };
        let high = PostKey {
            released_at: now,
            id: Uuid::from_u128(2),
        };
        let older = PostKey {
            released_at: now - Duration::seconds(1),
            id: Uuid::from_u128(9),
        };

        assert!(low.follows(&high));
        assert!(!high.follows(&low));
        assert!(older.follows(&low));
        assert!(!low.follows(&low));
    }
}
