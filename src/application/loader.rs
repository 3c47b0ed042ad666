//! Request-scoped batched post lookups.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::application::repos::{PostsRepo, RepoError};
use crate::domain::entities::PostRecord;

/// Memoizes post lookups for the lifetime of one call.
///
/// Construct one per inbound request and drop it with the request; it is not
/// shared across callers.
pub struct PostLoader {
    posts: Arc<dyn PostsRepo>,
    cache: Mutex<HashMap<Uuid, Option<PostRecord>>>,
}

impl PostLoader {
    pub fn new(posts: Arc<dyn PostsRepo>) -> Self {
        Self {
            posts,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn load(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let mut loaded = self.load_many(&[id]).await?;
        Ok(loaded.pop().flatten())
    }

    /// Resolve `ids` in the given order, fetching every miss in one batch.
    pub async fn load_many(&self, ids: &[Uuid]) -> Result<Vec<Option<PostRecord>>, RepoError> {
        let mut cache = self.cache.lock().await;

        let mut missing: Vec<Uuid> = ids
            .iter()
            .copied()
            .filter(|id| !cache.contains_key(id))
            .collect();
        missing.sort_unstable();
        missing.dedup();

        if !missing.is_empty() {
            let found = self.posts.find_by_ids(&missing).await?;
            for id in &missing {
                cache.insert(*id, None);
            }
            for post in found {
                cache.insert(post.id, Some(post));
            }
        }

        Ok(ids
            .iter()
            .map(|id| cache.get(id).cloned().flatten())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use crate::application::pagination::{PageRequest, PostKey};
    use crate::application::repos::PostListFilter;

    struct CountingPostsRepo {
        posts: Vec<PostRecord>,
        batches: AtomicUsize,
    }

    #[async_trait]
    impl PostsRepo for CountingPostsRepo {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
            Ok(self.posts.iter().find(|post| post.id == id).cloned())
        }

        async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<PostRecord>, RepoError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .posts
                .iter()
                .filter(|post| ids.contains(&post.id))
                .cloned()
                .collect())
        }

        async fn list_posts(
            &self,
            _filter: &PostListFilter,
            _page: PageRequest<PostKey>,
        ) -> Result<Vec<PostRecord>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn adjacent_posts(
            &self,
            _post: &PostRecord,
            _viewer: Option<Uuid>,
        ) -> Result<(Option<PostRecord>, Option<PostRecord>), RepoError> {
            unreachable!("not used in these tests")
        }
    }

    fn sample_post(id: Uuid) -> PostRecord {
        let now = OffsetDateTime::now_utc();
        PostRecord {
            id,
            user_id: Uuid::new_v4(),
            title: "sample".into(),
            url_slug: "sample".into(),
            is_temp: false,
            is_private: false,
            likes: 0,
            views: 0,
            released_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn preserves_requested_order_and_batches_misses() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let missing = Uuid::new_v4();
        let repo = Arc::new(CountingPostsRepo {
            posts: vec![sample_post(a), sample_post(b)],
            batches: AtomicUsize::new(0),
        });
        let loader = PostLoader::new(repo.clone());

        let loaded = loader.load_many(&[b, missing, a]).await.expect("loaded");
        let ids: Vec<Option<Uuid>> = loaded.iter().map(|post| post.as_ref().map(|p| p.id)).collect();
        assert_eq!(ids, vec![Some(b), None, Some(a)]);

        loader.load(a).await.expect("cached");
        loader.load(missing).await.expect("cached miss");
        assert_eq!(repo.batches.load(Ordering::SeqCst), 1);
    }
}
