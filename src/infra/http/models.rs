use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::series::SeriesEntry;
use crate::domain::entities::SeriesPosition;

#[derive(Debug, Deserialize)]
pub struct AppendPostRequest {
    pub post_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AssignSeriesRequest {
    pub series_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SeriesPostsResponse {
    pub series_id: Uuid,
    pub posts: Vec<SeriesEntry>,
}

#[derive(Debug, Serialize)]
pub struct RemovedPostResponse {
    pub series_id: Uuid,
    pub index: i32,
    pub post_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AssignSeriesResponse {
    pub post_id: Uuid,
    pub position: Option<SeriesPosition>,
}

#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub post_id: Uuid,
    pub counted: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct MoveBody {
    pub post_id: Uuid,
    pub old_index: i32,
    pub new_series_id: Uuid,
}
