use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::listing::ListPostsQuery;
use crate::application::series::MoveRequest;
use crate::application::trending::TrendingQuery;

use super::HttpState;
use super::context::Caller;
use super::error::ApiError;
use super::models::*;

pub async fn list_posts(
    State(state): State<HttpState>,
    Caller(ctx): Caller,
    Query(query): Query<ListPostsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .listing
        .list_posts(&ctx, query)
        .await
        .map_err(|err| ApiError::from_app("infra::http::list_posts", err))?;
    Ok(Json(page))
}

pub async fn trending_posts(
    State(state): State<HttpState>,
    Query(query): Query<TrendingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let posts = state
        .trending
        .trending(query)
        .await
        .map_err(|err| ApiError::from_app("infra::http::trending_posts", err))?;
    Ok(Json(posts))
}

pub async fn linked_posts(
    State(state): State<HttpState>,
    Caller(ctx): Caller,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let linked = state
        .series
        .linked_posts(&ctx, post_id)
        .await
        .map_err(|err| ApiError::from_app("infra::http::linked_posts", err))?;
    Ok(Json(linked))
}

pub async fn like_post(
    State(state): State<HttpState>,
    Caller(ctx): Caller,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .engagement
        .like_post(&ctx, post_id)
        .await
        .map_err(|err| ApiError::from_app("infra::http::like_post", err))?;
    Ok(Json(summary))
}

pub async fn unlike_post(
    State(state): State<HttpState>,
    Caller(ctx): Caller,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .engagement
        .unlike_post(&ctx, post_id)
        .await
        .map_err(|err| ApiError::from_app("infra::http::unlike_post", err))?;
    Ok(Json(summary))
}

pub async fn record_view(
    State(state): State<HttpState>,
    Caller(ctx): Caller,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let counted = state
        .engagement
        .record_view(&ctx, post_id)
        .await
        .map_err(|err| ApiError::from_app("infra::http::record_view", err))?;
    Ok(Json(ViewResponse { post_id, counted }))
}

pub async fn list_series_posts(
    State(state): State<HttpState>,
    Caller(ctx): Caller,
    Path(series_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let posts = state
        .series
        .list_series_posts(&ctx, series_id)
        .await
        .map_err(|err| ApiError::from_app("infra::http::list_series_posts", err))?;
    Ok(Json(SeriesPostsResponse { series_id, posts }))
}

pub async fn append_to_series(
    State(state): State<HttpState>,
    Caller(ctx): Caller,
    Path(series_id): Path<Uuid>,
    Json(payload): Json<AppendPostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let position = state
        .series
        .append_to_series(&ctx, series_id, payload.post_id)
        .await
        .map_err(|err| ApiError::from_app("infra::http::append_to_series", err))?;
    Ok((StatusCode::CREATED, Json(position)))
}

pub async fn remove_from_series(
    State(state): State<HttpState>,
    Caller(ctx): Caller,
    Path((series_id, index)): Path<(Uuid, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = state
        .series
        .remove_from_series(&ctx, series_id, index)
        .await
        .map_err(|err| ApiError::from_app("infra::http::remove_from_series", err))?;
    Ok(Json(RemovedPostResponse {
        series_id,
        index,
        post_id,
    }))
}

pub async fn move_between_series(
    State(state): State<HttpState>,
    Caller(ctx): Caller,
    Path(old_series_id): Path<Uuid>,
    Json(payload): Json<MoveBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = MoveRequest {
        old_series_id,
        old_index: payload.old_index,
        new_series_id: payload.new_series_id,
        post_id: payload.post_id,
    };
    let position = state
        .series
        .move_between_series(&ctx, request)
        .await
        .map_err(|err| ApiError::from_app("infra::http::move_between_series", err))?;
    Ok(Json(position))
}

pub async fn assign_series(
    State(state): State<HttpState>,
    Caller(ctx): Caller,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<AssignSeriesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let position = state
        .series
        .assign_series(&ctx, post_id, payload.series_id)
        .await
        .map_err(|err| ApiError::from_app("infra::http::assign_series", err))?;
    Ok(Json(AssignSeriesResponse { post_id, position }))
}

pub async fn health(State(state): State<HttpState>) -> impl IntoResponse {
    match state.db.as_ref() {
        Some(db) => match db.health_check().await {
            Ok(()) => (
                StatusCode::OK,
                Json(HealthResponse {
                    status: "ok",
                    store: "postgres",
                }),
            ),
            Err(err) => {
                tracing::warn!(
                    target = "folio::http::health",
                    error = %err,
                    "database health check failed"
                );
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(HealthResponse {
                        status: "unavailable",
                        store: "postgres",
                    }),
                )
            }
        },
        None => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                store: "memory",
            }),
        ),
    }
}
