//! Caller identity resolved from request headers.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{HeaderMap, request::Parts};
use uuid::Uuid;

use crate::application::context::RequestContext;

use super::error::ApiError;

/// Header carrying the authenticated user id, set by the upstream gateway.
pub const USER_HEADER: &str = "x-folio-user";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Extractor producing the [`RequestContext`] of the current call.
pub struct Caller(pub RequestContext);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let mut ctx = match user_from_headers(&parts.headers)? {
            Some(user_id) => RequestContext::authenticated(user_id),
            None => RequestContext::anonymous(),
        };

        let socket = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        if let Some(ip) = forwarded_ip(&parts.headers).or(socket) {
            ctx = ctx.with_ip(ip);
        }

        Ok(Caller(ctx))
    }
}

fn user_from_headers(headers: &HeaderMap) -> Result<Option<Uuid>, ApiError> {
    let Some(value) = headers.get(USER_HEADER) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| ApiError::bad_request("infra::http::context", "invalid user header"))?;
    Uuid::parse_str(raw.trim())
        .map(Some)
        .map_err(|_| ApiError::bad_request("infra::http::context", "invalid user header"))
}

/// First hop of `x-forwarded-for`, which is the original client.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get(FORWARDED_FOR_HEADER)?
        .to_str()
        .ok()?
        .split(',')
        .map(str::trim)
        .find(|hop| !hop.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn first_forwarded_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn malformed_user_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(user_from_headers(&headers).is_err());
        assert_eq!(user_from_headers(&HeaderMap::new()).ok().flatten(), None);
    }
}
