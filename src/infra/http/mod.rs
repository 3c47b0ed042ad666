//! JSON transport over the application services.

pub mod context;
pub mod error;
mod handlers;
mod middleware;
pub mod models;

use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use tokio::net::TcpListener;

use crate::application::{
    engagement::EngagementService, listing::PostListingService, series::SeriesService,
    trending::TrendingService,
};
use crate::infra::db::PostgresRepositories;
use crate::infra::error::InfraError;

use self::middleware::{log_responses, set_request_id};

#[derive(Clone)]
pub struct HttpState {
    pub listing: Arc<PostListingService>,
    pub trending: Arc<TrendingService>,
    pub series: Arc<SeriesService>,
    pub engagement: Arc<EngagementService>,
    /// Present when the services run on Postgres; probed by `/health`.
    pub db: Option<Arc<PostgresRepositories>>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/posts", get(handlers::list_posts))
        .route("/posts/trending", get(handlers::trending_posts))
        .route("/posts/{id}/linked", get(handlers::linked_posts))
        .route(
            "/posts/{id}/like",
            post(handlers::like_post).delete(handlers::unlike_post),
        )
        .route("/posts/{id}/view", post(handlers::record_view))
        .route("/posts/{id}/series", put(handlers::assign_series))
        .route(
            "/series/{id}/posts",
            get(handlers::list_series_posts).post(handlers::append_to_series),
        )
        .route(
            "/series/{id}/posts/move",
            post(handlers::move_between_series),
        )
        .route(
            "/series/{id}/posts/{index}",
            delete(handlers::remove_from_series),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_id))
}

/// Serve `router` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), InfraError> {
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(InfraError::from)
}
