//! Likes and views feeding the score ledger.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::context::RequestContext;
use crate::application::error::AppError;
use crate::application::repos::{
    EngagementRepo, PostsRepo, ReadOutcome, RecordReadParams, RepoError,
};
use crate::domain::entities::PostRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeSummary {
    pub post_id: Uuid,
    pub likes: i32,
    pub liked: bool,
}

#[derive(Clone)]
pub struct EngagementService {
    engagement: Arc<dyn EngagementRepo>,
    posts: Arc<dyn PostsRepo>,
}

impl EngagementService {
    pub fn new(engagement: Arc<dyn EngagementRepo>, posts: Arc<dyn PostsRepo>) -> Self {
        Self { engagement, posts }
    }

    /// Like a post once per user; repeated likes leave the count unchanged.
    pub async fn like_post(
        &self,
        ctx: &RequestContext,
        post_id: Uuid,
    ) -> Result<LikeSummary, AppError> {
        let user_id = ctx.require_user()?;
        self.visible_post(ctx, post_id).await?;

        let outcome = self
            .engagement
            .add_like(post_id, user_id, OffsetDateTime::now_utc())
            .await
            .map_err(not_found_as("post"))?;

        if outcome.changed {
            counter!("folio_likes_total").increment(1);
            info!(
                target = "folio::application::engagement",
                %post_id,
                %user_id,
                likes = outcome.likes,
                "post liked"
            );
        }
        Ok(LikeSummary {
            post_id,
            likes: outcome.likes,
            liked: true,
        })
    }

    /// Withdraw a like together with the score it contributed.
    pub async fn unlike_post(
        &self,
        ctx: &RequestContext,
        post_id: Uuid,
    ) -> Result<LikeSummary, AppError> {
        let user_id = ctx.require_user()?;
        self.visible_post(ctx, post_id).await?;

        let outcome = self
            .engagement
            .remove_like(post_id, user_id)
            .await
            .map_err(not_found_as("post"))?;

        if outcome.changed {
            info!(
                target = "folio::application::engagement",
                %post_id,
                %user_id,
                likes = outcome.likes,
                "post unliked"
            );
        }
        Ok(LikeSummary {
            post_id,
            likes: outcome.likes,
            liked: false,
        })
    }

    /// Count a view from the caller's address. Returns whether it was counted.
    pub async fn record_view(&self, ctx: &RequestContext, post_id: Uuid) -> Result<bool, AppError> {
        let ip_hash = ctx
            .ip_hash()
            .ok_or_else(|| AppError::validation("client address is missing"))?;
        self.record_view_hashed(post_id, ctx.user_id, ip_hash, OffsetDateTime::now_utc())
            .await
    }

    /// Same as [`Self::record_view`] for callers that already hold the hashed address.
    pub async fn record_view_hashed(
        &self,
        post_id: Uuid,
        actor_id: Option<Uuid>,
        ip_hash: String,
        now: OffsetDateTime,
    ) -> Result<bool, AppError> {
        let outcome = self
            .engagement
            .record_read(RecordReadParams {
                post_id,
                actor_id,
                ip_hash,
                now,
            })
            .await
            .map_err(not_found_as("post"))?;

        match outcome {
            ReadOutcome::Deduplicated => {
                counter!("folio_views_deduplicated_total").increment(1);
                debug!(
                    target = "folio::application::engagement",
                    %post_id,
                    "view deduplicated"
                );
                Ok(false)
            }
            ReadOutcome::Counted { views, scored } => {
                counter!("folio_views_counted_total").increment(1);
                debug!(
                    target = "folio::application::engagement",
                    %post_id,
                    views,
                    scored,
                    "view counted"
                );
                Ok(true)
            }
        }
    }

    async fn visible_post(&self, ctx: &RequestContext, post_id: Uuid) -> Result<PostRecord, AppError> {
        self.posts
            .find_by_id(post_id)
            .await?
            .filter(|post| post.visible_to(ctx.user_id))
            .ok_or(AppError::NotFound("post"))
    }
}

fn not_found_as(entity: &'static str) -> impl Fn(RepoError) -> AppError {
    move |err| match err {
        RepoError::NotFound => AppError::NotFound(entity),
        other => other.into(),
    }
}
