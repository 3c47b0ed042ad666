mod common;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use folio::infra::http::{build_router, context::USER_HEADER};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use common::{Fixture, now};

fn request(method: Method, uri: &str, user: Option<Uuid>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user {
        builder = builder.header(USER_HEADER, user_id.to_string());
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build"),
        None => builder.body(Body::empty()).expect("request should build"),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

#[tokio::test]
async fn oversized_limit_maps_to_bad_request() {
    let fixture = Fixture::new();
    let router = build_router(fixture.state.clone());

    let (status, body) = send(
        &router,
        request(Method::GET, "/posts?limit=101", None, None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn foreign_series_maps_to_forbidden() {
    let fixture = Fixture::new();
    let (owner, _) = fixture.user("ada");
    let (intruder, _) = fixture.user("grace");
    let series = fixture.store.insert_series(owner.id, "Rust", "rust");
    let post = fixture.post(owner.id, now());
    let router = build_router(fixture.state.clone());

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            &format!("/series/{}/posts", series.id),
            Some(intruder.id),
            Some(json!({ "post_id": post.id })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "no_permission");
}

#[tokio::test]
async fn series_round_trip_over_http() {
    let fixture = Fixture::new();
    let (owner, _) = fixture.user("ada");
    let series = fixture.store.insert_series(owner.id, "Rust", "rust");
    let first = fixture.post(owner.id, now());
    let second = fixture.post(owner.id, now());
    let router = build_router(fixture.state.clone());
    let members = format!("/series/{}/posts", series.id);

    for (expected_index, post_id) in [(0, first.id), (1, second.id)] {
        let (status, body) = send(
            &router,
            request(
                Method::POST,
                &members,
                Some(owner.id),
                Some(json!({ "post_id": post_id })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["index"], expected_index);
    }

    let (status, body) = send(
        &router,
        request(Method::DELETE, &format!("{members}/0"), Some(owner.id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post_id"], first.id.to_string());

    let (status, body) = send(&router, request(Method::GET, &members, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let posts = body["posts"].as_array().expect("posts array");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["index"], 0);
    assert_eq!(posts[0]["post"]["id"], second.id.to_string());

    let (status, body) = send(
        &router,
        request(Method::DELETE, &format!("{members}/7"), Some(owner.id), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn views_need_a_client_address() {
    let fixture = Fixture::new();
    let (owner, _) = fixture.user("ada");
    let post = fixture.post(owner.id, now());
    let router = build_router(fixture.state.clone());
    let uri = format!("/posts/{}/view", post.id);

    let (status, _) = send(&router, request(Method::POST, &uri, None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let forwarded = |ip: &'static str| {
        Request::builder()
            .method(Method::POST)
            .uri(&uri)
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .expect("request should build")
    };
    let (status, body) = send(&router, forwarded("203.0.113.5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counted"], true);

    let (_, body) = send(&router, forwarded("203.0.113.5")).await;
    assert_eq!(body["counted"], false);
}

#[tokio::test]
async fn malformed_user_header_is_rejected() {
    let fixture = Fixture::new();
    let router = build_router(fixture.state.clone());
    let request = Request::builder()
        .method(Method::GET)
        .uri("/posts")
        .header(USER_HEADER, "someone")
        .body(Body::empty())
        .expect("request should build");

    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn request_ids_are_echoed_or_minted() {
    let fixture = Fixture::new();
    let router = build_router(fixture.state.clone());

    let tagged = Request::builder()
        .uri("/health")
        .header("x-request-id", "gateway-42")
        .body(Body::empty())
        .expect("request should build");
    let response = router.clone().oneshot(tagged).await.expect("response");
    assert_eq!(
        response.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("gateway-42")
    );

    let response = router
        .oneshot(request(Method::GET, "/health", None, None))
        .await
        .expect("response");
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn health_reports_the_memory_store() {
    let fixture = Fixture::new();
    let router = build_router(fixture.state.clone());

    let (status, body) = send(&router, request(Method::GET, "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
}
