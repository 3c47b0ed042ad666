//! Default sink adapters that record notifications in the log stream.
//!
//! Deployments with a shared page cache or a search cluster plug their own
//! [`CacheInvalidator`] / [`SearchIndexer`] in at bootstrap.

use async_trait::async_trait;
use metrics::counter;
use tracing::info;
use uuid::Uuid;

use crate::application::sinks::{CacheInvalidator, SearchIndexer, SinkError};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCacheInvalidator;

#[async_trait]
impl CacheInvalidator for TracingCacheInvalidator {
    async fn invalidate(&self, keys: &[String]) -> Result<(), SinkError> {
        counter!("folio_cache_invalidations_total").increment(keys.len() as u64);
        info!(
            target = "folio::infra::sinks",
            keys = ?keys,
            "cache keys invalidated"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSearchIndexer;

#[async_trait]
impl SearchIndexer for TracingSearchIndexer {
    async fn upsert(&self, post_id: Uuid) -> Result<(), SinkError> {
        counter!("folio_search_upserts_total").increment(1);
        info!(
            target = "folio::infra::sinks",
            %post_id,
            "post queued for search indexing"
        );
        Ok(())
    }
}
