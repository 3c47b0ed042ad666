mod common;

use std::collections::HashSet;

use folio::application::context::RequestContext;
use folio::application::error::ErrorKind;
use folio::application::listing::ListPostsQuery;
use folio::application::pagination::PostCursor;
use folio::domain::entities::PostRecord;
use time::Duration;
use uuid::Uuid;

use common::{Fixture, now};

async fn collect_pages(
    fixture: &Fixture,
    ctx: &RequestContext,
    query: ListPostsQuery,
) -> Vec<PostRecord> {
    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = fixture
            .state
            .listing
            .list_posts(
                ctx,
                ListPostsQuery {
                    cursor: cursor.clone(),
                    ..query.clone()
                },
            )
            .await
            .expect("page");
        if page.items.is_empty() {
            break;
        }
        seen.extend(page.items);
        cursor = page.next_cursor;
    }
    seen
}

#[tokio::test]
async fn pages_walk_ties_without_duplicates_or_gaps() {
    let fixture = Fixture::new();
    let (user, _) = fixture.user("ada");
    let shared = now();
    let mut expected: Vec<Uuid> = (0..7).map(|_| fixture.post(user.id, shared).id).collect();
    let newest = fixture.post(user.id, shared + Duration::minutes(1));
    expected.sort_by(|a, b| b.cmp(a));
    expected.insert(0, newest.id);

    let walked = collect_pages(
        &fixture,
        &RequestContext::anonymous(),
        ListPostsQuery {
            limit: Some(3),
            ..Default::default()
        },
    )
    .await;

    let ids: Vec<Uuid> = walked.iter().map(|post| post.id).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn limit_above_one_hundred_is_rejected() {
    let fixture = Fixture::new();
    let err = fixture
        .state
        .listing
        .list_posts(
            &RequestContext::anonymous(),
            ListPostsQuery {
                limit: Some(101),
                ..Default::default()
            },
        )
        .await
        .expect_err("limit too large");
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let page = fixture
        .state
        .listing
        .list_posts(
            &RequestContext::anonymous(),
            ListPostsQuery {
                limit: Some(100),
                ..Default::default()
            },
        )
        .await
        .expect("limit at the bound");
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn cursor_for_a_deleted_post_is_not_found() {
    let fixture = Fixture::new();
    let (user, _) = fixture.user("ada");
    let post = fixture.post(user.id, now());
    let cursor = PostCursor::new(post.id).encode();
    fixture.store.delete_post(post.id).expect("deleted");

    let err = fixture
        .state
        .listing
        .list_posts(
            &RequestContext::anonymous(),
            ListPostsQuery {
                cursor: Some(cursor),
                ..Default::default()
            },
        )
        .await
        .expect_err("stale cursor");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn malformed_cursor_is_a_bad_request() {
    let fixture = Fixture::new();
    let err = fixture
        .state
        .listing
        .list_posts(
            &RequestContext::anonymous(),
            ListPostsQuery {
                cursor: Some("%%%".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect_err("garbage cursor");
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn private_posts_are_visible_to_their_owner_only() {
    let fixture = Fixture::new();
    let (ada, ada_ctx) = fixture.user("ada");
    let (_, grace_ctx) = fixture.user("grace");
    let base = now();
    let public = fixture.post(ada.id, base - Duration::hours(2));
    let private = fixture.post_with(ada.id, base - Duration::hours(1), |post| {
        post.is_private = true
    });

    let by_owner = collect_pages(
        &fixture,
        &ada_ctx,
        ListPostsQuery {
            username: Some("ada".to_string()),
            ..Default::default()
        },
    )
    .await;
    let owner_ids: Vec<Uuid> = by_owner.iter().map(|post| post.id).collect();
    assert_eq!(owner_ids, vec![private.id, public.id]);

    for ctx in [grace_ctx, RequestContext::anonymous()] {
        let visible = collect_pages(
            &fixture,
            &ctx,
            ListPostsQuery {
                username: Some("ada".to_string()),
                ..Default::default()
            },
        )
        .await;
        let ids: Vec<Uuid> = visible.iter().map(|post| post.id).collect();
        assert_eq!(ids, vec![public.id]);
    }
}

#[tokio::test]
async fn global_listing_overlays_only_the_callers_private_posts() {
    let fixture = Fixture::new();
    let (ada, ada_ctx) = fixture.user("ada");
    let (grace, _) = fixture.user("grace");
    let base = now();
    let public = fixture.post(grace.id, base - Duration::hours(3));
    let own_private = fixture.post_with(ada.id, base - Duration::hours(2), |post| {
        post.is_private = true
    });
    let foreign_private = fixture.post_with(grace.id, base - Duration::hours(1), |post| {
        post.is_private = true
    });

    let ids: HashSet<Uuid> = collect_pages(&fixture, &ada_ctx, ListPostsQuery::default())
        .await
        .into_iter()
        .map(|post| post.id)
        .collect();

    assert!(ids.contains(&public.id));
    assert!(ids.contains(&own_private.id));
    assert!(!ids.contains(&foreign_private.id));
}

#[tokio::test]
async fn temp_posts_require_the_owner() {
    let fixture = Fixture::new();
    let (ada, ada_ctx) = fixture.user("ada");
    let (_, grace_ctx) = fixture.user("grace");
    let draft = fixture.post_with(ada.id, now(), |post| post.is_temp = true);
    let published = fixture.post(ada.id, now() - Duration::hours(1));

    let drafts = collect_pages(
        &fixture,
        &ada_ctx,
        ListPostsQuery {
            username: Some("ada".to_string()),
            temp_only: true,
            ..Default::default()
        },
    )
    .await;
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].id, draft.id);

    let regular = collect_pages(
        &fixture,
        &ada_ctx,
        ListPostsQuery {
            username: Some("ada".to_string()),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(regular.len(), 1);
    assert_eq!(regular[0].id, published.id);

    let err = fixture
        .state
        .listing
        .list_posts(
            &grace_ctx,
            ListPostsQuery {
                username: Some("ada".to_string()),
                temp_only: true,
                ..Default::default()
            },
        )
        .await
        .expect_err("someone else's drafts");
    assert_eq!(err.kind(), ErrorKind::NoPermission);

    let err = fixture
        .state
        .listing
        .list_posts(
            &ada_ctx,
            ListPostsQuery {
                temp_only: true,
                ..Default::default()
            },
        )
        .await
        .expect_err("drafts need a username");
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn unknown_username_lists_nothing() {
    let fixture = Fixture::new();
    let (ada, _) = fixture.user("ada");
    fixture.post(ada.id, now());

    let page = fixture
        .state
        .listing
        .list_posts(
            &RequestContext::anonymous(),
            ListPostsQuery {
                username: Some("nobody".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("public listing of an unknown author");
    assert!(page.items.is_empty());
    assert_eq!(page.next_cursor, None);
}

#[tokio::test]
async fn unknown_username_drafts_are_not_found() {
    let fixture = Fixture::new();
    let (ada, _) = fixture.user("ada");

    let err = fixture
        .state
        .listing
        .list_posts(
            &RequestContext::authenticated(ada.id),
            ListPostsQuery {
                username: Some("nobody".to_string()),
                temp_only: true,
                ..Default::default()
            },
        )
        .await
        .expect_err("drafts of an unknown author");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn tag_filter_narrows_the_listing() {
    let fixture = Fixture::new();
    let (ada, _) = fixture.user("ada");
    let tagged = fixture.post(ada.id, now());
    fixture.post(ada.id, now() - Duration::hours(1));
    fixture.store.tag_post(tagged.id, "rust");

    let page = fixture
        .state
        .listing
        .list_posts(
            &RequestContext::anonymous(),
            ListPostsQuery {
                tag: Some("rust".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("tagged page");

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, tagged.id);
}
