use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use super::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation id of one inbound call, reused from the gateway when it sent one.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub async fn set_request_id(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Log every 4xx/5xx with the diagnostic chain the handler attached.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let report = response.extensions_mut().remove::<ErrorReport>();
    let failure = Failure {
        status,
        method: method.as_str(),
        path: &path,
        request_id: &request_id,
        elapsed_ms: start.elapsed().as_millis(),
        report: report.as_ref(),
    };
    failure.log();
    response
}

struct Failure<'a> {
    status: StatusCode,
    method: &'a str,
    path: &'a str,
    request_id: &'a str,
    elapsed_ms: u128,
    report: Option<&'a ErrorReport>,
}

impl Failure<'_> {
    fn log(&self) {
        let source = self.report.map_or("unknown", |report| report.source);
        let chain: &[String] = self.report.map_or(&[], |report| report.messages.as_slice());
        let detail = chain
            .first()
            .map_or("no diagnostic available", String::as_str);

        if self.status.is_server_error() {
            error!(
                target = "folio::http::response",
                status = self.status.as_u16(),
                method = self.method,
                path = self.path,
                elapsed_ms = self.elapsed_ms,
                source,
                detail,
                chain = ?chain,
                request_id = self.request_id,
                "request failed"
            );
        } else {
            warn!(
                target = "folio::http::response",
                status = self.status.as_u16(),
                method = self.method,
                path = self.path,
                elapsed_ms = self.elapsed_ms,
                source,
                detail,
                request_id = self.request_id,
                "request rejected"
            );
        }
    }
}
