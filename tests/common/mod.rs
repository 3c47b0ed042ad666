#![allow(dead_code)]

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use folio::application::context::RequestContext;
use folio::application::sinks::{CacheInvalidator, SearchIndexer, SinkError};
use folio::domain::entities::{PostRecord, UserRecord};
use folio::infra::bootstrap::EngineBuilder;
use folio::infra::http::HttpState;
use folio::infra::memory::InMemoryRepositories;

#[derive(Default)]
pub struct RecordingCache {
    pub keys: Mutex<Vec<String>>,
}

#[async_trait]
impl CacheInvalidator for RecordingCache {
    async fn invalidate(&self, keys: &[String]) -> Result<(), SinkError> {
        self.keys.lock().unwrap().extend_from_slice(keys);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSearch {
    pub upserts: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl SearchIndexer for RecordingSearch {
    async fn upsert(&self, post_id: Uuid) -> Result<(), SinkError> {
        self.upserts.lock().unwrap().push(post_id);
        Ok(())
    }
}

pub struct Fixture {
    pub store: Arc<InMemoryRepositories>,
    pub state: HttpState,
    pub cache: Arc<RecordingCache>,
    pub search: Arc<RecordingSearch>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_attempts(3)
    }

    pub fn with_attempts(attempts: u32) -> Self {
        let store = Arc::new(InMemoryRepositories::new());
        let cache = Arc::new(RecordingCache::default());
        let search = Arc::new(RecordingSearch::default());
        let state = EngineBuilder::new(store.clone())
            .with_sinks(cache.clone(), search.clone())
            .with_append_attempts(NonZeroU32::new(attempts).expect("non-zero attempts"))
            .build();
        Self {
            store,
            state,
            cache,
            search,
        }
    }

    pub fn user(&self, username: &str) -> (UserRecord, RequestContext) {
        let user = self.store.insert_user(username);
        let ctx = RequestContext::authenticated(user.id);
        (user, ctx)
    }

    pub fn post(&self, user_id: Uuid, released_at: OffsetDateTime) -> PostRecord {
        self.store.insert_post(post_record(user_id, released_at))
    }

    pub fn post_with(
        &self,
        user_id: Uuid,
        released_at: OffsetDateTime,
        adjust: impl FnOnce(&mut PostRecord),
    ) -> PostRecord {
        let mut post = post_record(user_id, released_at);
        adjust(&mut post);
        self.store.insert_post(post)
    }
}

pub fn post_record(user_id: Uuid, released_at: OffsetDateTime) -> PostRecord {
    let id = Uuid::new_v4();
    PostRecord {
        id,
        user_id,
        title: format!("post {id}"),
        url_slug: format!("post-{}", id.simple()),
        is_temp: false,
        is_private: false,
        likes: 0,
        views: 0,
        released_at,
        created_at: released_at,
        updated_at: released_at,
    }
}

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}
