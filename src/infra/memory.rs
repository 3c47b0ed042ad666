//! Process-local store implementing every repository trait.
//!
//! Series membership is held as one [`SeriesOrder`] per series, so indices are
//! derived from array positions and stay dense by construction. All state sits
//! behind a single mutex; each trait method takes it once, which makes every
//! mutation atomic with respect to the others.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::application::pagination::{PageRequest, PostKey};
use crate::application::repos::{
    EngagementRepo, LikeOutcome, MoveSeriesPostParams, PostListFilter, PostsRepo, RankingRepo,
    ReadOutcome, RecordReadParams, RepoError, SeriesRepo, UsersRepo,
};
use crate::domain::entities::{
    PostReadRecord, PostRecord, RankedPost, ScoreEvent, SeriesPosition, SeriesRecord, UserRecord,
};
use crate::domain::error::DomainError;
use crate::domain::ranking::aggregate;
use crate::domain::scoring::{dedup_cutoff, read_score_due, weight_of};
use crate::domain::series::SeriesOrder;
use crate::domain::types::ScoreKind;

const SOURCE: &str = "infra::memory";

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, UserRecord>,
    posts: HashMap<Uuid, PostRecord>,
    tags: HashMap<Uuid, BTreeSet<String>>,
    series: HashMap<Uuid, SeriesRecord>,
    orders: HashMap<Uuid, SeriesOrder>,
    likes: HashSet<(Uuid, Uuid)>,
    scores: Vec<ScoreEvent>,
    reads: Vec<PostReadRecord>,
    #[cfg(any(test, feature = "test-util"))]
    pending_conflicts: u32,
}

impl MemoryState {
    fn position_of(&self, post_id: Uuid) -> Option<SeriesPosition> {
        self.orders.values().find_map(|order| {
            order.index_of(post_id).map(|index| SeriesPosition {
                series_id: order.series_id(),
                post_id,
                index,
            })
        })
    }

    fn order_mut(&mut self, series_id: Uuid) -> Result<&mut SeriesOrder, RepoError> {
        if !self.series.contains_key(&series_id) {
            return Err(RepoError::NotFound);
        }
        Ok(self
            .orders
            .entry(series_id)
            .or_insert_with(|| SeriesOrder::new(series_id)))
    }

    #[cfg(any(test, feature = "test-util"))]
    fn take_injected_conflict(&mut self) -> bool {
        if self.pending_conflicts == 0 {
            return false;
        }
        self.pending_conflicts -= 1;
        true
    }

    #[cfg(not(any(test, feature = "test-util")))]
    fn take_injected_conflict(&mut self) -> bool {
        false
    }

    fn touch_series(&mut self, series_id: Uuid) {
        if let Some(series) = self.series.get_mut(&series_id) {
            series.updated_at = OffsetDateTime::now_utc();
        }
    }

    fn sync_likes(&mut self, post_id: Uuid) -> i32 {
        let count = self
            .likes
            .iter()
            .filter(|(liked_post, _)| *liked_post == post_id)
            .count();
        let likes = i32::try_from(count).unwrap_or(i32::MAX);
        if let Some(post) = self.posts.get_mut(&post_id) {
            post.likes = likes;
        }
        likes
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRepositories {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, op: &'static str) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    op,
                    target_module = SOURCE,
                    lock_kind = "mutex.lock",
                    result = "poisoned_recovered",
                    "Recovered from poisoned store lock"
                );
                poisoned.into_inner()
            }
        }
    }

    pub fn insert_user(&self, username: impl Into<String>) -> UserRecord {
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: username.into(),
        };
        self.lock("insert_user").users.insert(user.id, user.clone());
        user
    }

    pub fn insert_post(&self, post: PostRecord) -> PostRecord {
        self.lock("insert_post").posts.insert(post.id, post.clone());
        post
    }

    pub fn insert_series(
        &self,
        user_id: Uuid,
        name: impl Into<String>,
        url_slug: impl Into<String>,
    ) -> SeriesRecord {
        let now = OffsetDateTime::now_utc();
        let series = SeriesRecord {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            url_slug: url_slug.into(),
            created_at: now,
            updated_at: now,
        };
        let mut state = self.lock("insert_series");
        state.series.insert(series.id, series.clone());
        state.orders.insert(series.id, SeriesOrder::new(series.id));
        series
    }

    pub fn tag_post(&self, post_id: Uuid, tag: impl Into<String>) {
        self.lock("tag_post")
            .tags
            .entry(post_id)
            .or_default()
            .insert(tag.into());
    }

    pub fn insert_score_event(&self, event: ScoreEvent) {
        self.lock("insert_score_event").scores.push(event);
    }

    /// Remove a post the way the schema's cascades would.
    pub fn delete_post(&self, post_id: Uuid) -> Option<PostRecord> {
        let mut state = self.lock("delete_post");
        let removed = state.posts.remove(&post_id)?;
        if let Some(position) = state.position_of(post_id) {
            if let Some(order) = state.orders.get_mut(&position.series_id) {
                let _ = order.remove_at(position.index);
            }
        }
        state.tags.remove(&post_id);
        state.likes.retain(|(liked_post, _)| *liked_post != post_id);
        state.scores.retain(|event| event.post_id != post_id);
        state.reads.retain(|read| read.post_id != post_id);
        Some(removed)
    }

    /// Make the next `count` series writes fail as if another writer took the tail.
    #[cfg(any(test, feature = "test-util"))]
    pub fn inject_series_conflicts(&self, count: u32) {
        self.lock("inject_series_conflicts").pending_conflicts = count;
    }
}

fn domain_to_repo(err: DomainError) -> RepoError {
    match err {
        DomainError::IndexOutOfRange { .. } => RepoError::NotFound,
        DomainError::AlreadyInSeries { .. } => RepoError::Duplicate {
            constraint: "series_posts_post_id_key".to_string(),
        },
        other => RepoError::Integrity {
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl UsersRepo for InMemoryRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.lock("users.find_by_id").users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .lock("users.find_by_username")
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }
}

#[async_trait]
impl PostsRepo for InMemoryRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.lock("posts.find_by_id").posts.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<PostRecord>, RepoError> {
        let state = self.lock("posts.find_by_ids");
        Ok(ids
            .iter()
            .filter_map(|id| state.posts.get(id).cloned())
            .collect())
    }

    async fn list_posts(
        &self,
        filter: &PostListFilter,
        page: PageRequest<PostKey>,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let state = self.lock("posts.list_posts");
        let mut matching: Vec<&PostRecord> = state
            .posts
            .values()
            .filter(|post| post.is_temp == filter.temp_only)
            .filter(|post| filter.author_id.is_none_or(|author| post.user_id == author))
            .filter(|post| {
                filter.tag.as_ref().is_none_or(|tag| {
                    state
                        .tags
                        .get(&post.id)
                        .is_some_and(|tags| tags.contains(tag))
                })
            })
            .filter(|post| post.visible_to(filter.include_private_of))
            .filter(|post| {
                page.cursor
                    .as_ref()
                    .is_none_or(|anchor| PostKey::of(post).follows(anchor))
            })
            .collect();

        matching.sort_by(|a, b| PostKey::of(a).listing_order(&PostKey::of(b)));
        Ok(matching
            .into_iter()
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn adjacent_posts(
        &self,
        post: &PostRecord,
        viewer: Option<Uuid>,
    ) -> Result<(Option<PostRecord>, Option<PostRecord>), RepoError> {
        let state = self.lock("posts.adjacent_posts");
        let key = PostKey::of(post);
        let mut siblings: Vec<&PostRecord> = state
            .posts
            .values()
            .filter(|candidate| candidate.user_id == post.user_id && !candidate.is_temp)
            .filter(|candidate| candidate.visible_to(viewer))
            .collect();
        siblings.sort_by(|a, b| PostKey::of(a).listing_order(&PostKey::of(b)));

        // Listing order is newest first: older posts follow, newer posts precede.
        let previous = siblings
            .iter()
            .find(|candidate| PostKey::of(candidate).follows(&key))
            .map(|candidate| (*candidate).clone());
        let next = siblings
            .iter()
            .rev()
            .find(|candidate| key.follows(&PostKey::of(candidate)))
            .map(|candidate| (*candidate).clone());
        Ok((previous, next))
    }
}

#[async_trait]
impl SeriesRepo for InMemoryRepositories {
    async fn find_series(&self, id: Uuid) -> Result<Option<SeriesRecord>, RepoError> {
        Ok(self.lock("series.find_series").series.get(&id).cloned())
    }

    async fn find_position(&self, post_id: Uuid) -> Result<Option<SeriesPosition>, RepoError> {
        Ok(self.lock("series.find_position").position_of(post_id))
    }

    async fn list_positions(&self, series_id: Uuid) -> Result<Vec<SeriesPosition>, RepoError> {
        Ok(self
            .lock("series.list_positions")
            .orders
            .get(&series_id)
            .map(SeriesOrder::positions)
            .unwrap_or_default())
    }

    async fn append_post(
        &self,
        series_id: Uuid,
        post_id: Uuid,
    ) -> Result<SeriesPosition, RepoError> {
        let mut state = self.lock("series.append_post");
        if state.take_injected_conflict() {
            return Err(RepoError::conflict("series tail index already taken"));
        }
        if !state.posts.contains_key(&post_id) {
            return Err(RepoError::InvalidInput {
                message: format!("post `{post_id}` does not exist"),
            });
        }
        if state.position_of(post_id).is_some() {
            return Err(domain_to_repo(DomainError::AlreadyInSeries { post_id }));
        }
        let position = state
            .order_mut(series_id)?
            .append(post_id)
            .map_err(domain_to_repo)?;
        state.touch_series(series_id);
        Ok(position)
    }

    async fn remove_at(&self, series_id: Uuid, index: i32) -> Result<Uuid, RepoError> {
        let mut state = self.lock("series.remove_at");
        let post_id = state
            .order_mut(series_id)?
            .remove_at(index)
            .map_err(domain_to_repo)?;
        state.touch_series(series_id);
        Ok(post_id)
    }

    async fn detach_post(&self, post_id: Uuid) -> Result<Option<SeriesPosition>, RepoError> {
        let mut state = self.lock("series.detach_post");
        let Some(position) = state.position_of(post_id) else {
            return Ok(None);
        };
        state
            .order_mut(position.series_id)?
            .remove_at(position.index)
            .map_err(domain_to_repo)?;
        state.touch_series(position.series_id);
        Ok(Some(position))
    }

    async fn move_post(&self, params: MoveSeriesPostParams) -> Result<SeriesPosition, RepoError> {
        let mut state = self.lock("series.move_post");
        if state.take_injected_conflict() {
            return Err(RepoError::conflict("series tail index already taken"));
        }
        if !state.series.contains_key(&params.new_series_id) {
            return Err(RepoError::NotFound);
        }

        // Work on copies so a failure leaves both series untouched.
        let mut source = state.order_mut(params.old_series_id)?.clone();
        if source.post_at(params.old_index) != Some(params.post_id) {
            return Err(RepoError::NotFound);
        }
        source.remove_at(params.old_index).map_err(domain_to_repo)?;

        let position = if params.old_series_id == params.new_series_id {
            let position = source.append(params.post_id).map_err(domain_to_repo)?;
            state.orders.insert(params.old_series_id, source);
            position
        } else {
            let mut target = state.order_mut(params.new_series_id)?.clone();
            let position = target.append(params.post_id).map_err(domain_to_repo)?;
            state.orders.insert(params.old_series_id, source);
            state.orders.insert(params.new_series_id, target);
            position
        };

        state.touch_series(params.old_series_id);
        state.touch_series(params.new_series_id);
        Ok(position)
    }
}

#[async_trait]
impl EngagementRepo for InMemoryRepositories {
    async fn add_like(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<LikeOutcome, RepoError> {
        let mut state = self.lock("engagement.add_like");
        let current = state
            .posts
            .get(&post_id)
            .map(|post| post.likes)
            .ok_or(RepoError::NotFound)?;

        if !state.likes.insert((post_id, user_id)) {
            return Ok(LikeOutcome {
                changed: false,
                likes: current,
            });
        }

        let likes = state.sync_likes(post_id);
        state.scores.push(ScoreEvent {
            id: Uuid::new_v4(),
            post_id,
            actor_id: Some(user_id),
            kind: ScoreKind::Like,
            weight: weight_of(ScoreKind::Like),
            created_at: now,
        });
        Ok(LikeOutcome {
            changed: true,
            likes,
        })
    }

    async fn remove_like(&self, post_id: Uuid, user_id: Uuid) -> Result<LikeOutcome, RepoError> {
        let mut state = self.lock("engagement.remove_like");
        let current = state
            .posts
            .get(&post_id)
            .map(|post| post.likes)
            .ok_or(RepoError::NotFound)?;

        if !state.likes.remove(&(post_id, user_id)) {
            return Ok(LikeOutcome {
                changed: false,
                likes: current,
            });
        }

        let likes = state.sync_likes(post_id);
        state.scores.retain(|event| {
            !(event.post_id == post_id
                && event.kind == ScoreKind::Like
                && event.actor_id == Some(user_id))
        });
        Ok(LikeOutcome {
            changed: true,
            likes,
        })
    }

    async fn record_read(&self, params: RecordReadParams) -> Result<ReadOutcome, RepoError> {
        let mut state = self.lock("engagement.record_read");
        if !state.posts.contains_key(&params.post_id) {
            return Err(RepoError::NotFound);
        }

        let cutoff = dedup_cutoff(params.now);
        let seen = state.reads.iter().any(|read| {
            read.post_id == params.post_id
                && read.ip_hash == params.ip_hash
                && read.created_at > cutoff
        });
        if seen {
            return Ok(ReadOutcome::Deduplicated);
        }

        state.reads.push(PostReadRecord {
            id: Uuid::new_v4(),
            post_id: params.post_id,
            actor_id: params.actor_id,
            ip_hash: params.ip_hash,
            created_at: params.now,
        });

        let views = match state.posts.get_mut(&params.post_id) {
            Some(post) => {
                post.views = post.views.saturating_add(1);
                post.views
            }
            None => return Err(RepoError::NotFound),
        };

        let scored = read_score_due(i64::from(views));
        if scored {
            state.scores.push(ScoreEvent {
                id: Uuid::new_v4(),
                post_id: params.post_id,
                actor_id: params.actor_id,
                kind: ScoreKind::Read,
                weight: weight_of(ScoreKind::Read),
                created_at: params.now,
            });
        }
        Ok(ReadOutcome::Counted { views, scored })
    }

    async fn list_score_events(&self, post_id: Uuid) -> Result<Vec<ScoreEvent>, RepoError> {
        Ok(self
            .lock("engagement.list_score_events")
            .scores
            .iter()
            .filter(|event| event.post_id == post_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RankingRepo for InMemoryRepositories {
    async fn trending(
        &self,
        since: OffsetDateTime,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<RankedPost>, RepoError> {
        let state = self.lock("ranking.trending");
        Ok(aggregate(state.scores.iter(), since)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_for(user_id: Uuid, released_at: OffsetDateTime) -> PostRecord {
        PostRecord {
            id: Uuid::new_v4(),
            user_id,
            title: "draft".into(),
            url_slug: Uuid::new_v4().to_string(),
            is_temp: false,
            is_private: false,
            likes: 0,
            views: 0,
            released_at,
            created_at: released_at,
            updated_at: released_at,
        }
    }

    #[tokio::test]
    async fn failed_move_leaves_both_series_untouched() {
        let store = InMemoryRepositories::new();
        let user = store.insert_user("ada");
        let now = OffsetDateTime::now_utc();
        let a = store.insert_series(user.id, "A", "a");
        let b = store.insert_series(user.id, "B", "b");
        let post = store.insert_post(post_for(user.id, now));
        store.append_post(a.id, post.id).await.expect("append");

        let err = store
            .move_post(MoveSeriesPostParams {
                old_series_id: a.id,
                old_index: 3,
                new_series_id: b.id,
                post_id: post.id,
            })
            .await
            .expect_err("wrong index");

        assert!(matches!(err, RepoError::NotFound));
        assert_eq!(store.list_positions(a.id).await.expect("a").len(), 1);
        assert!(store.list_positions(b.id).await.expect("b").is_empty());
    }

    #[tokio::test]
    async fn deleting_a_post_closes_its_series_gap() {
        let store = InMemoryRepositories::new();
        let user = store.insert_user("ada");
        let now = OffsetDateTime::now_utc();
        let series = store.insert_series(user.id, "A", "a");
        let first = store.insert_post(post_for(user.id, now));
        let second = store.insert_post(post_for(user.id, now));
        store.append_post(series.id, first.id).await.expect("append");
        store.append_post(series.id, second.id).await.expect("append");

        store.delete_post(first.id).expect("deleted");

        let positions = store.list_positions(series.id).await.expect("positions");
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].post_id, second.id);
        assert_eq!(positions[0].index, 0);
    }

    #[tokio::test]
    async fn injected_conflicts_are_consumed() {
        let store = InMemoryRepositories::new();
        let user = store.insert_user("ada");
        let series = store.insert_series(user.id, "A", "a");
        let post = store.insert_post(post_for(user.id, OffsetDateTime::now_utc()));
        store.inject_series_conflicts(1);

        let first = store.append_post(series.id, post.id).await;
        assert!(first.expect_err("conflict").is_retryable());
        let second = store.append_post(series.id, post.id).await.expect("append");
        assert_eq!(second.index, 0);
    }
}
