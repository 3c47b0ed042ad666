//! Outbound notifications to the cache layer and the search index.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("{sink} sink failed: {message}")]
pub struct SinkError {
    pub sink: &'static str,
    pub message: String,
}

impl SinkError {
    pub fn new(sink: &'static str, message: impl Into<String>) -> Self {
        Self {
            sink,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, keys: &[String]) -> Result<(), SinkError>;
}

#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn upsert(&self, post_id: Uuid) -> Result<(), SinkError>;
}

/// Page keys of the rendered site affected by series membership changes.
pub mod cache_keys {
    pub fn user_page(username: &str) -> String {
        format!("ssr:/@{username}")
    }

    pub fn post_page(username: &str, post_slug: &str) -> String {
        format!("ssr:/@{username}/{post_slug}")
    }

    pub fn series_page(username: &str, series_slug: &str) -> String {
        format!("ssr:/@{username}/series/{series_slug}")
    }
}

/// Fans structural changes out to the sinks. Sink failures are logged and
/// never fail the operation that triggered them.
#[derive(Clone)]
pub struct Notifier {
    cache: Arc<dyn CacheInvalidator>,
    search: Arc<dyn SearchIndexer>,
}

impl Notifier {
    pub fn new(cache: Arc<dyn CacheInvalidator>, search: Arc<dyn SearchIndexer>) -> Self {
        Self { cache, search }
    }

    pub async fn invalidate(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        if let Err(err) = self.cache.invalidate(&keys).await {
            warn!(
                target = "folio::application::sinks",
                error = %err,
                keys = ?keys,
                "cache invalidation failed"
            );
        }
    }

    pub async fn reindex(&self, post_id: Uuid) {
        if let Err(err) = self.search.upsert(post_id).await {
            warn!(
                target = "folio::application::sinks",
                error = %err,
                %post_id,
                "search index upsert failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FailingCache;

    #[async_trait]
    impl CacheInvalidator for FailingCache {
        async fn invalidate(&self, _keys: &[String]) -> Result<(), SinkError> {
            Err(SinkError::new("cache", "unreachable"))
        }
    }

    #[derive(Default)]
    struct RecordingSearch {
        upserts: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl SearchIndexer for RecordingSearch {
        async fn upsert(&self, post_id: Uuid) -> Result<(), SinkError> {
            self.upserts.lock().unwrap().push(post_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn sink_failures_do_not_propagate() {
        let search = Arc::new(RecordingSearch::default());
        let notifier = Notifier::new(Arc::new(FailingCache), search.clone());
        let post_id = Uuid::new_v4();

        notifier
            .invalidate(vec![cache_keys::user_page("ada")])
            .await;
        notifier.reindex(post_id).await;

        assert_eq!(search.upserts.lock().unwrap().as_slice(), &[post_id]);
    }

    #[test]
    fn cache_keys_follow_page_paths() {
        assert_eq!(cache_keys::user_page("ada"), "ssr:/@ada");
        assert_eq!(cache_keys::post_page("ada", "hello"), "ssr:/@ada/hello");
        assert_eq!(
            cache_keys::series_page("ada", "rust-notes"),
            "ssr:/@ada/series/rust-notes"
        );
    }
}
