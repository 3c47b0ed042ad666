//! Post listing with keyset pagination and the private-post overlay.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::application::context::RequestContext;
use crate::application::error::AppError;
use crate::application::pagination::{
    CursorPage, PageRequest, PostCursor, PostKey, resolve_limit,
};
use crate::application::repos::{PostListFilter, PostsRepo, UsersRepo};
use crate::domain::entities::PostRecord;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPostsQuery {
    pub username: Option<String>,
    #[serde(default)]
    pub temp_only: bool,
    pub tag: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Clone)]
pub struct PostListingService {
    posts: Arc<dyn PostsRepo>,
    users: Arc<dyn UsersRepo>,
}

impl PostListingService {
    pub fn new(posts: Arc<dyn PostsRepo>, users: Arc<dyn UsersRepo>) -> Self {
        Self { posts, users }
    }

    pub async fn list_posts(
        &self,
        ctx: &RequestContext,
        query: ListPostsQuery,
    ) -> Result<CursorPage<PostRecord>, AppError> {
        let limit = resolve_limit(query.limit)?;
        let cursor = query
            .cursor
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(PostCursor::decode)
            .transpose()?;

        let username = query
            .username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let author = match username {
            Some(name) => match self.users.find_by_username(name).await? {
                Some(user) => Some(user),
                // Drafts need a real owner; a public listing of nobody is just empty.
                None if query.temp_only => return Err(AppError::NotFound("user")),
                None => {
                    debug!(
                        target = "folio::application::listing",
                        username = name,
                        "listing for unknown author is empty"
                    );
                    return Ok(CursorPage::from_posts(Vec::new()));
                }
            },
            None => None,
        };

        if query.temp_only {
            let author = author
                .as_ref()
                .ok_or_else(|| AppError::validation("username is missing"))?;
            if !ctx.is_owner(author.id) {
                return Err(AppError::permission("You have no permission to load temp posts"));
            }
        }

        // The private overlay applies to the caller's own posts only.
        let include_private_of = match (&author, ctx.user_id) {
            (_, None) => None,
            (None, Some(viewer)) => Some(viewer),
            (Some(author), Some(viewer)) if author.id == viewer => Some(viewer),
            (Some(_), Some(_)) => None,
        };

        let anchor = match cursor {
            Some(cursor) => {
                let post = self
                    .posts
                    .find_by_id(cursor.id())
                    .await?
                    .ok_or(AppError::NotFound("cursor"))?;
                Some(PostKey::of(&post))
            }
            None => None,
        };

        let filter = PostListFilter {
            author_id: author.as_ref().map(|author| author.id),
            temp_only: query.temp_only,
            tag: query
                .tag
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty()),
            include_private_of,
        };

        let items = self
            .posts
            .list_posts(&filter, PageRequest::new(limit, anchor))
            .await?;

        debug!(
            target = "folio::application::listing",
            author = ?filter.author_id,
            tag = ?filter.tag,
            temp_only = filter.temp_only,
            returned = items.len(),
            "listed posts"
        );

        Ok(CursorPage::from_posts(items))
    }
}
