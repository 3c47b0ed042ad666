//! Ordering coordinator for series membership.
//!
//! Every structural change goes through one atomic store call; this service
//! adds the ownership checks, bounded retries for tail-index races, and the
//! cache/search notifications that follow a committed change.

use std::{future::Future, num::NonZeroU32, sync::Arc};

use futures::future::join;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::context::RequestContext;
use crate::application::error::AppError;
use crate::application::loader::PostLoader;
use crate::application::repos::{
    MoveSeriesPostParams, PostsRepo, RepoError, SeriesRepo, UsersRepo,
};
use crate::application::sinks::{Notifier, cache_keys};
use crate::domain::entities::{PostRecord, SeriesPosition, SeriesRecord};
use crate::domain::error::DomainError;
use crate::domain::series::SeriesOrder;

pub const DEFAULT_APPEND_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct SeriesEntry {
    pub index: i32,
    pub post: PostRecord,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkedPosts {
    pub previous: Option<PostRecord>,
    pub next: Option<PostRecord>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MoveRequest {
    pub old_series_id: Uuid,
    pub old_index: i32,
    pub new_series_id: Uuid,
    pub post_id: Uuid,
}

#[derive(Clone)]
pub struct SeriesService {
    series: Arc<dyn SeriesRepo>,
    posts: Arc<dyn PostsRepo>,
    users: Arc<dyn UsersRepo>,
    notifier: Notifier,
    append_attempts: NonZeroU32,
}

impl SeriesService {
    pub fn new(
        series: Arc<dyn SeriesRepo>,
        posts: Arc<dyn PostsRepo>,
        users: Arc<dyn UsersRepo>,
        notifier: Notifier,
    ) -> Self {
        Self {
            series,
            posts,
            users,
            notifier,
            append_attempts: NonZeroU32::new(DEFAULT_APPEND_ATTEMPTS).unwrap_or(NonZeroU32::MIN),
        }
    }

    pub fn with_append_attempts(mut self, attempts: NonZeroU32) -> Self {
        self.append_attempts = attempts;
        self
    }

    /// Attach `post_id` at the tail of `series_id`.
    pub async fn append_to_series(
        &self,
        ctx: &RequestContext,
        series_id: Uuid,
        post_id: Uuid,
    ) -> Result<SeriesPosition, AppError> {
        let user_id = ctx.require_user()?;
        let series = self.owned_series(user_id, series_id).await?;
        let post = self.owned_post(user_id, post_id).await?;
        ensure_not_temp(&post)?;

        if self.series.find_position(post_id).await?.is_some() {
            return Err(DomainError::AlreadyInSeries { post_id }.into());
        }

        let repo = Arc::clone(&self.series);
        let position = self
            .retry_on_conflict("append_to_series", series_id, || {
                let repo = Arc::clone(&repo);
                async move { repo.append_post(series_id, post_id).await }
            })
            .await?;

        info!(
            target = "folio::application::series",
            %series_id,
            %post_id,
            index = position.index,
            "post appended to series"
        );
        self.announce(user_id, &post, &[&series]).await;
        Ok(position)
    }

    /// Detach the entry at `index`; later entries shift down by one.
    pub async fn remove_from_series(
        &self,
        ctx: &RequestContext,
        series_id: Uuid,
        index: i32,
    ) -> Result<Uuid, AppError> {
        let user_id = ctx.require_user()?;
        ensure_index(index)?;
        let series = self.owned_series(user_id, series_id).await?;

        let post_id = self
            .series
            .remove_at(series_id, index)
            .await
            .map_err(|err| match err {
                RepoError::NotFound => AppError::NotFound("series entry"),
                other => other.into(),
            })?;

        info!(
            target = "folio::application::series",
            %series_id,
            %post_id,
            index,
            "post removed from series"
        );
        if let Some(post) = self.posts.find_by_id(post_id).await? {
            self.announce(user_id, &post, &[&series]).await;
        }
        Ok(post_id)
    }

    /// Remove from one series and append to another as one atomic unit.
    pub async fn move_between_series(
        &self,
        ctx: &RequestContext,
        request: MoveRequest,
    ) -> Result<SeriesPosition, AppError> {
        let user_id = ctx.require_user()?;
        ensure_index(request.old_index)?;
        let old_series = self.owned_series(user_id, request.old_series_id).await?;
        let new_series = self.owned_series(user_id, request.new_series_id).await?;
        let post = self.owned_post(user_id, request.post_id).await?;
        ensure_not_temp(&post)?;

        let params = MoveSeriesPostParams {
            old_series_id: request.old_series_id,
            old_index: request.old_index,
            new_series_id: request.new_series_id,
            post_id: request.post_id,
        };
        let repo = Arc::clone(&self.series);
        let position = self
            .retry_on_conflict("move_between_series", request.new_series_id, || {
                let repo = Arc::clone(&repo);
                async move { repo.move_post(params).await }
            })
            .await?;

        info!(
            target = "folio::application::series",
            old_series_id = %request.old_series_id,
            new_series_id = %request.new_series_id,
            post_id = %request.post_id,
            index = position.index,
            "post moved between series"
        );
        self.announce(user_id, &post, &[&old_series, &new_series])
            .await;
        Ok(position)
    }

    /// Bring a post's membership in line with the series chosen while editing it.
    pub async fn assign_series(
        &self,
        ctx: &RequestContext,
        post_id: Uuid,
        series_id: Option<Uuid>,
    ) -> Result<Option<SeriesPosition>, AppError> {
        let user_id = ctx.require_user()?;
        self.owned_post(user_id, post_id).await?;
        let current = self.series.find_position(post_id).await?;

        match (current, series_id) {
            (None, None) => Ok(None),
            (None, Some(target)) => self.append_to_series(ctx, target, post_id).await.map(Some),
            (Some(position), Some(target)) if position.series_id == target => Ok(Some(position)),
            (Some(position), Some(target)) => self
                .move_between_series(
                    ctx,
                    MoveRequest {
                        old_series_id: position.series_id,
                        old_index: position.index,
                        new_series_id: target,
                        post_id,
                    },
                )
                .await
                .map(Some),
            (Some(_), None) => {
                self.detach_post(ctx, post_id).await?;
                Ok(None)
            }
        }
    }

    /// Take a post out of whatever series holds it, e.g. before deleting it.
    pub async fn detach_post(
        &self,
        ctx: &RequestContext,
        post_id: Uuid,
    ) -> Result<Option<SeriesPosition>, AppError> {
        let user_id = ctx.require_user()?;
        let post = self.owned_post(user_id, post_id).await?;

        let Some(removed) = self.series.detach_post(post_id).await? else {
            return Ok(None);
        };

        info!(
            target = "folio::application::series",
            series_id = %removed.series_id,
            %post_id,
            index = removed.index,
            "post detached from series"
        );
        match self.series.find_series(removed.series_id).await? {
            Some(series) => self.announce(user_id, &post, &[&series]).await,
            None => self.announce(user_id, &post, &[]).await,
        }
        Ok(Some(removed))
    }

    /// Members of a series in order; private posts are hidden from non-owners.
    pub async fn list_series_posts(
        &self,
        ctx: &RequestContext,
        series_id: Uuid,
    ) -> Result<Vec<SeriesEntry>, AppError> {
        self.series
            .find_series(series_id)
            .await?
            .ok_or(AppError::NotFound("series"))?;

        let order = self.load_order(series_id).await?;
        let loader = PostLoader::new(Arc::clone(&self.posts));
        let posts = loader.load_many(order.post_ids()).await?;

        Ok(order
            .positions()
            .into_iter()
            .zip(posts)
            .filter_map(|(position, post)| {
                post.filter(|post| post.visible_to(ctx.user_id))
                    .map(|post| SeriesEntry {
                        index: position.index,
                        post,
                    })
            })
            .collect())
    }

    /// Previous/next posts around `post_id`: series neighbours when it belongs
    /// to a series, otherwise the author's adjacent posts by release time.
    pub async fn linked_posts(
        &self,
        ctx: &RequestContext,
        post_id: Uuid,
    ) -> Result<LinkedPosts, AppError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .filter(|post| post.visible_to(ctx.user_id))
            .filter(|post| !post.is_temp || ctx.is_owner(post.user_id))
            .ok_or(AppError::NotFound("post"))?;

        let Some(position) = self.series.find_position(post_id).await? else {
            let (previous, next) = self.posts.adjacent_posts(&post, ctx.user_id).await?;
            return Ok(LinkedPosts { previous, next });
        };

        let order = self.load_order(position.series_id).await?;
        let neighbours = order.neighbours(post_id).unwrap_or_default();
        let ids: Vec<Uuid> = [neighbours.previous, neighbours.next]
            .into_iter()
            .flatten()
            .collect();

        let loader = PostLoader::new(Arc::clone(&self.posts));
        let mut loaded: Vec<Option<PostRecord>> = loader
            .load_many(&ids)
            .await?
            .into_iter()
            .map(|post| post.filter(|post| post.visible_to(ctx.user_id)))
            .collect();

        let mut take = |id: Option<Uuid>| {
            id.and_then(|id| {
                loaded
                    .iter_mut()
                    .find(|slot| slot.as_ref().is_some_and(|post| post.id == id))
                    .and_then(Option::take)
            })
        };
        let previous = take(neighbours.previous);
        let next = take(neighbours.next);

        Ok(LinkedPosts { previous, next })
    }

    async fn load_order(&self, series_id: Uuid) -> Result<SeriesOrder, AppError> {
        let positions = self.series.list_positions(series_id).await?;
        SeriesOrder::from_positions(series_id, positions).map_err(|err| {
            error!(
                target = "folio::application::series",
                %series_id,
                error = %err,
                "series ordering is not contiguous"
            );
            AppError::from(err)
        })
    }

    async fn owned_series(&self, user_id: Uuid, series_id: Uuid) -> Result<SeriesRecord, AppError> {
        let series = self
            .series
            .find_series(series_id)
            .await?
            .ok_or(AppError::NotFound("series"))?;
        if series.user_id != user_id {
            return Err(AppError::permission("This series is not yours"));
        }
        Ok(series)
    }

    async fn owned_post(&self, user_id: Uuid, post_id: Uuid) -> Result<PostRecord, AppError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(AppError::NotFound("post"))?;
        if post.user_id != user_id {
            return Err(AppError::permission("This post is not yours"));
        }
        Ok(post)
    }

    async fn retry_on_conflict<T, F, Fut>(
        &self,
        operation: &'static str,
        series_id: Uuid,
        mut attempt: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepoError>>,
    {
        let max_attempts = self.append_attempts.get();
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && tries < max_attempts => {
                    counter!("folio_series_append_conflicts_total").increment(1);
                    debug!(
                        target = "folio::application::series",
                        operation,
                        %series_id,
                        attempt = tries,
                        error = %err,
                        "series tail changed concurrently, retrying"
                    );
                }
                Err(err) if err.is_retryable() => {
                    counter!("folio_series_append_conflicts_total").increment(1);
                    warn!(
                        target = "folio::application::series",
                        operation,
                        %series_id,
                        attempts = tries,
                        error = %err,
                        "giving up on series update after repeated conflicts"
                    );
                    return Err(AppError::conflict(format!(
                        "series `{series_id}` changed concurrently; gave up after {tries} attempts"
                    )));
                }
                Err(RepoError::NotFound) => return Err(AppError::NotFound("series entry")),
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn announce(&self, user_id: Uuid, post: &PostRecord, series: &[&SeriesRecord]) {
        let keys = match self.users.find_by_id(user_id).await {
            Ok(Some(user)) => {
                let mut keys = vec![
                    cache_keys::post_page(&user.username, &post.url_slug),
                    cache_keys::user_page(&user.username),
                ];
                keys.extend(
                    series
                        .iter()
                        .map(|series| cache_keys::series_page(&user.username, &series.url_slug)),
                );
                keys
            }
            Ok(None) => {
                warn!(
                    target = "folio::application::series",
                    %user_id,
                    "author missing, skipping cache invalidation"
                );
                Vec::new()
            }
            Err(err) => {
                warn!(
                    target = "folio::application::series",
                    %user_id,
                    error = %err,
                    "author lookup failed, skipping cache invalidation"
                );
                Vec::new()
            }
        };
        join(self.notifier.invalidate(keys), self.notifier.reindex(post.id)).await;
    }
}

fn ensure_not_temp(post: &PostRecord) -> Result<(), AppError> {
    if post.is_temp {
        return Err(AppError::validation("Temp posts cannot join a series"));
    }
    Ok(())
}

fn ensure_index(index: i32) -> Result<(), AppError> {
    if index < 0 {
        return Err(AppError::validation("series index must not be negative"));
    }
    Ok(())
}
