//! Trending posts over a sliding window.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::application::error::AppError;
use crate::application::loader::PostLoader;
use crate::application::pagination::resolve_limit;
use crate::application::repos::{PostsRepo, RankingRepo};
use crate::domain::entities::PostRecord;
use crate::domain::ranking::window_start;
use crate::domain::types::Timeframe;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrendingQuery {
    pub timeframe: Option<String>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendingPost {
    #[serde(flatten)]
    pub post: PostRecord,
    pub score: f64,
}

#[derive(Clone)]
pub struct TrendingService {
    ranking: Arc<dyn RankingRepo>,
    posts: Arc<dyn PostsRepo>,
}

impl TrendingService {
    pub fn new(ranking: Arc<dyn RankingRepo>, posts: Arc<dyn PostsRepo>) -> Self {
        Self { ranking, posts }
    }

    pub async fn trending(&self, query: TrendingQuery) -> Result<Vec<TrendingPost>, AppError> {
        self.trending_at(query, OffsetDateTime::now_utc()).await
    }

    /// Rank posts by score events created after `now - timeframe`.
    ///
    /// The page is cut to `offset`/`limit` on the ranking first. Posts that
    /// were deleted, made private or turned back into drafts after scoring are
    /// then dropped without backfilling, so a page may hold fewer than `limit`
    /// entries even when later pages exist. Callers page by advancing `offset`
    /// by `limit`, not by the number of entries returned.
    pub async fn trending_at(
        &self,
        query: TrendingQuery,
        now: OffsetDateTime,
    ) -> Result<Vec<TrendingPost>, AppError> {
        let timeframe = match query.timeframe.as_deref() {
            Some(raw) => raw.parse::<Timeframe>()?,
            None => Timeframe::default(),
        };
        let limit = resolve_limit(query.limit)?;
        let offset = query.offset.unwrap_or(0);

        let since = window_start(now, timeframe);
        let ranked = self.ranking.trending(since, offset, limit).await?;

        let ids: Vec<_> = ranked.iter().map(|entry| entry.post_id).collect();
        let loader = PostLoader::new(Arc::clone(&self.posts));
        let posts = loader.load_many(&ids).await?;

        let items: Vec<TrendingPost> = ranked
            .into_iter()
            .zip(posts)
            .filter_map(|(entry, post)| {
                post.filter(|post| !post.is_private && !post.is_temp)
                    .map(|post| TrendingPost {
                        post,
                        score: entry.score,
                    })
            })
            .collect();

        debug!(
            target = "folio::application::trending",
            timeframe = %timeframe,
            offset,
            limit,
            returned = items.len(),
            "computed trending posts"
        );
        Ok(items)
    }
}
