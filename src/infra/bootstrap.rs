//! Wiring of repositories, sinks and services into the HTTP state.

use std::{num::NonZeroU32, sync::Arc};

use crate::application::{
    engagement::EngagementService,
    listing::PostListingService,
    repos::{EngagementRepo, PostsRepo, RankingRepo, SeriesRepo, UsersRepo},
    series::SeriesService,
    sinks::{CacheInvalidator, Notifier, SearchIndexer},
    trending::TrendingService,
};
use crate::infra::db::PostgresRepositories;
use crate::infra::http::HttpState;
use crate::infra::sinks::{TracingCacheInvalidator, TracingSearchIndexer};

/// Store implementing every repository seam.
pub trait EngineStore:
    UsersRepo + PostsRepo + SeriesRepo + EngagementRepo + RankingRepo + 'static
{
}

impl<T> EngineStore for T where
    T: UsersRepo + PostsRepo + SeriesRepo + EngagementRepo + RankingRepo + 'static
{
}

pub struct EngineBuilder<S> {
    store: Arc<S>,
    cache: Arc<dyn CacheInvalidator>,
    search: Arc<dyn SearchIndexer>,
    append_attempts: Option<NonZeroU32>,
    db: Option<Arc<PostgresRepositories>>,
}

impl<S: EngineStore> EngineBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            cache: Arc::new(TracingCacheInvalidator),
            search: Arc::new(TracingSearchIndexer),
            append_attempts: None,
            db: None,
        }
    }

    pub fn with_sinks(
        mut self,
        cache: Arc<dyn CacheInvalidator>,
        search: Arc<dyn SearchIndexer>,
    ) -> Self {
        self.cache = cache;
        self.search = search;
        self
    }

    pub fn with_append_attempts(mut self, attempts: NonZeroU32) -> Self {
        self.append_attempts = Some(attempts);
        self
    }

    pub fn with_health_probe(mut self, db: Arc<PostgresRepositories>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn build(self) -> HttpState {
        let users: Arc<dyn UsersRepo> = self.store.clone();
        let posts: Arc<dyn PostsRepo> = self.store.clone();
        let series_repo: Arc<dyn SeriesRepo> = self.store.clone();
        let engagement: Arc<dyn EngagementRepo> = self.store.clone();
        let ranking: Arc<dyn RankingRepo> = self.store;

        let notifier = Notifier::new(self.cache, self.search);
        let mut series = SeriesService::new(series_repo, posts.clone(), users.clone(), notifier);
        if let Some(attempts) = self.append_attempts {
            series = series.with_append_attempts(attempts);
        }

        HttpState {
            listing: Arc::new(PostListingService::new(posts.clone(), users)),
            trending: Arc::new(TrendingService::new(ranking, posts.clone())),
            series: Arc::new(series),
            engagement: Arc::new(EngagementService::new(engagement, posts)),
            db: self.db,
        }
    }
}
