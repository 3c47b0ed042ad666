use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{PageRequest, PostKey};
use crate::application::repos::{PostListFilter, PostsRepo, RepoError};
use crate::domain::entities::PostRecord;

use super::{PostgresRepositories, map_sqlx_error};

const POST_COLUMNS: &str = "p.id, p.user_id, p.title, p.url_slug, p.is_temp, p.is_private, \
    p.likes, p.views, p.released_at, p.created_at, p.updated_at";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    url_slug: String,
    is_temp: bool,
    is_private: bool,
    likes: i32,
    views: i32,
    released_at: OffsetDateTime,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            url_slug: row.url_slug,
            is_temp: row.is_temp,
            is_private: row.is_private,
            likes: row.likes,
            views: row.views,
            released_at: row.released_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresRepositories {
    fn push_visibility<'q>(qb: &mut QueryBuilder<'q, Postgres>, viewer: Option<Uuid>) {
        match viewer {
            Some(viewer) => {
                qb.push(" AND (NOT p.is_private OR p.user_id = ");
                qb.push_bind(viewer);
                qb.push(")");
            }
            None => {
                qb.push(" AND NOT p.is_private");
            }
        }
    }

    async fn adjacent_post(
        &self,
        post: &PostRecord,
        viewer: Option<Uuid>,
        older: bool,
    ) -> Result<Option<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(POST_COLUMNS);
        qb.push(" FROM posts p WHERE p.user_id = ");
        qb.push_bind(post.user_id);
        qb.push(" AND NOT p.is_temp");
        Self::push_visibility(&mut qb, viewer);

        let (comparison, direction) = if older { ("<", "DESC") } else { (">", "ASC") };
        qb.push(format!(" AND (p.released_at, p.id) {comparison} ("));
        qb.push_bind(post.released_at);
        qb.push(", ");
        qb.push_bind(post.id);
        qb.push(format!(
            ") ORDER BY p.released_at {direction}, p.id {direction} LIMIT 1"
        ));

        let row = qb
            .build_query_as::<PostRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<PostRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ANY($1)");
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(ids.to_vec())
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn list_posts(
        &self,
        filter: &PostListFilter,
        page: PageRequest<PostKey>,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(POST_COLUMNS);
        qb.push(" FROM posts p WHERE p.is_temp = ");
        qb.push_bind(filter.temp_only);

        if let Some(author_id) = filter.author_id {
            qb.push(" AND p.user_id = ");
            qb.push_bind(author_id);
        }

        if let Some(tag) = filter.tag.clone() {
            qb.push(
                " AND EXISTS (SELECT 1 FROM posts_tags pt INNER JOIN tags t ON t.id = pt.tag_id WHERE pt.post_id = p.id AND t.name = ",
            );
            qb.push_bind(tag);
            qb.push(")");
        }

        Self::push_visibility(&mut qb, filter.include_private_of);

        if let Some(anchor) = page.cursor {
            qb.push(" AND (p.released_at, p.id) < (");
            qb.push_bind(anchor.released_at);
            qb.push(", ");
            qb.push_bind(anchor.id);
            qb.push(")");
        }

        qb.push(" ORDER BY p.released_at DESC, p.id DESC LIMIT ");
        qb.push_bind(i64::from(page.limit));

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn adjacent_posts(
        &self,
        post: &PostRecord,
        viewer: Option<Uuid>,
    ) -> Result<(Option<PostRecord>, Option<PostRecord>), RepoError> {
        let previous = self.adjacent_post(post, viewer, true).await?;
        let next = self.adjacent_post(post, viewer, false).await?;
        Ok((previous, next))
    }
}
