mod common;

use std::collections::HashMap;

use folio::domain::scoring::hash_ip;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use time::Duration;

use common::{Fixture, now};

#[tokio::test]
async fn engagement_and_series_paths_emit_counters() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let fixture = Fixture::with_attempts(3);
    let (author, author_ctx) = fixture.user("ada");
    let (_, reader_ctx) = fixture.user("grace");
    let post = fixture.post(author.id, now());

    fixture
        .state
        .engagement
        .like_post(&reader_ctx, post.id)
        .await
        .expect("like");
    // A repeated like changes nothing and is not counted again.
    fixture
        .state
        .engagement
        .like_post(&reader_ctx, post.id)
        .await
        .expect("repeat like");

    let at = now();
    let ip_hash = hash_ip("192.0.2.10");
    for offset in [0, 1] {
        fixture
            .state
            .engagement
            .record_view_hashed(post.id, None, ip_hash.clone(), at + Duration::minutes(offset))
            .await
            .expect("view");
    }

    let series = fixture.store.insert_series(author.id, "Rust", "rust");
    fixture.store.inject_series_conflicts(1);
    fixture
        .state
        .series
        .append_to_series(&author_ctx, series.id, post.id)
        .await
        .expect("append after one retry");

    let counters: HashMap<String, u64> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter_map(|(composite_key, _, _, value)| match value {
            DebugValue::Counter(count) => Some((composite_key.key().name().to_string(), count)),
            _ => None,
        })
        .collect();

    let expected = [
        ("folio_likes_total", 1),
        ("folio_views_counted_total", 1),
        ("folio_views_deduplicated_total", 1),
        ("folio_series_append_conflicts_total", 1),
        ("folio_cache_invalidations_total", 0),
    ];
    for (name, count) in expected {
        if count == 0 {
            assert!(!counters.contains_key(name), "unexpected metric: {name}");
            continue;
        }
        assert_eq!(counters.get(name), Some(&count), "metric {name}");
    }
}
