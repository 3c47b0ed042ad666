use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{RankingRepo, RepoError};
use crate::domain::entities::RankedPost;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct RankedRow {
    post_id: Uuid,
    score: f64,
}

#[async_trait]
impl RankingRepo for PostgresRepositories {
    async fn trending(
        &self,
        since: OffsetDateTime,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<RankedPost>, RepoError> {
        let rows = sqlx::query_as::<_, RankedRow>(
            r#"
            SELECT post_id, SUM(score)::double precision AS score
            FROM post_scores
            WHERE created_at > $1
            GROUP BY post_id
            ORDER BY score DESC, post_id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(since)
        .bind(i64::from(offset))
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| RankedPost {
                post_id: row.post_id,
                score: row.score,
            })
            .collect())
    }
}
