//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{PageRequest, PaginationError, PostKey};
use crate::domain::entities::{
    PostRecord, RankedPost, ScoreEvent, SeriesPosition, SeriesRecord, UserRecord,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("concurrent update conflict: {message}")]
    Conflict { message: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error(transparent)]
    Pagination(#[from] PaginationError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RepoError::Conflict { .. })
    }
}

/// Predicates applied to a post listing.
#[derive(Debug, Clone, Default)]
pub struct PostListFilter {
    pub author_id: Option<Uuid>,
    pub temp_only: bool,
    pub tag: Option<String>,
    /// Owner whose private posts are unioned into the public result set.
    pub include_private_of: Option<Uuid>,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError>;
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError>;

    /// Fetch the given posts in no particular order; unknown ids are skipped.
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<PostRecord>, RepoError>;

    /// One page in `(released_at DESC, id DESC)` order, strictly after the cursor key.
    async fn list_posts(
        &self,
        filter: &PostListFilter,
        page: PageRequest<PostKey>,
    ) -> Result<Vec<PostRecord>, RepoError>;

    /// The author's closest non-temp posts released before and after `post`.
    async fn adjacent_posts(
        &self,
        post: &PostRecord,
        viewer: Option<Uuid>,
    ) -> Result<(Option<PostRecord>, Option<PostRecord>), RepoError>;
}

#[derive(Debug, Clone, Copy)]
pub struct MoveSeriesPostParams {
    pub old_series_id: Uuid,
    pub old_index: i32,
    pub new_series_id: Uuid,
    pub post_id: Uuid,
}

/// Ordered-list store. Every mutating method is a single atomic unit.
#[async_trait]
pub trait SeriesRepo: Send + Sync {
    async fn find_series(&self, id: Uuid) -> Result<Option<SeriesRecord>, RepoError>;

    async fn find_position(&self, post_id: Uuid) -> Result<Option<SeriesPosition>, RepoError>;

    /// Positions of one series ordered by index.
    async fn list_positions(&self, series_id: Uuid) -> Result<Vec<SeriesPosition>, RepoError>;

    /// Place `post_id` at the tail of the series.
    ///
    /// Returns [`RepoError::Conflict`] when a concurrent append claimed the same
    /// tail index; nothing is persisted in that case.
    async fn append_post(&self, series_id: Uuid, post_id: Uuid)
    -> Result<SeriesPosition, RepoError>;

    /// Delete the entry at `index` and shift every later entry down by one.
    async fn remove_at(&self, series_id: Uuid, index: i32) -> Result<Uuid, RepoError>;

    /// Remove whatever position `post_id` holds, shifting later entries down.
    async fn detach_post(&self, post_id: Uuid) -> Result<Option<SeriesPosition>, RepoError>;

    /// Remove from the old series and append to the new one in one transaction.
    ///
    /// Fails with [`RepoError::NotFound`] unless `post_id` sits at `old_index`.
    async fn move_post(&self, params: MoveSeriesPostParams) -> Result<SeriesPosition, RepoError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeOutcome {
    /// Whether the call changed the like state.
    pub changed: bool,
    pub likes: i32,
}

#[derive(Debug, Clone)]
pub struct RecordReadParams {
    pub post_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub ip_hash: String,
    pub now: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A read from the same ip hash already exists inside the dedup window.
    Deduplicated,
    Counted { views: i32, scored: bool },
}

/// Score ledger writes and the counters kept next to them.
#[async_trait]
pub trait EngagementRepo: Send + Sync {
    async fn add_like(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<LikeOutcome, RepoError>;

    async fn remove_like(&self, post_id: Uuid, user_id: Uuid) -> Result<LikeOutcome, RepoError>;

    /// Check-then-insert a read; under a race two reads may both be counted.
    async fn record_read(&self, params: RecordReadParams) -> Result<ReadOutcome, RepoError>;

    async fn list_score_events(&self, post_id: Uuid) -> Result<Vec<ScoreEvent>, RepoError>;
}

#[async_trait]
pub trait RankingRepo: Send + Sync {
    /// Summed weights per post for events created after `since`, ranked.
    async fn trending(
        &self,
        since: OffsetDateTime,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<RankedPost>, RepoError>;
}
