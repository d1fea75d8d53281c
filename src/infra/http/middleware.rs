use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{Level, event};
use uuid::Uuid;

use crate::application::error::ErrorReport;

static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation id for one inbound trigger, echoed back as `x-request-id`.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: String,
}

impl RequestContext {
    fn from_request(request: &Request<Body>) -> Self {
        let request_id = request
            .headers()
            .get(&REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty() && value.len() <= 128)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self { request_id }
    }
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext::from_request(&request);
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Logs every failed trigger with the diagnostic chain the handler attached.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();
    let started_at = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let report = response.extensions_mut().remove::<ErrorReport>();
    let failure = FailedRequest {
        status,
        method: method.as_str(),
        path: &path,
        request_id: &request_id,
        elapsed_ms: started_at.elapsed().as_millis(),
        report: report.as_ref(),
    };
    failure.log();

    response
}

struct FailedRequest<'a> {
    status: StatusCode,
    method: &'a str,
    path: &'a str,
    request_id: &'a str,
    elapsed_ms: u128,
    report: Option<&'a ErrorReport>,
}

impl FailedRequest<'_> {
    fn log(&self) {
        let source = self.report.map_or("unknown", |report| report.source);
        let chain = self.report.map(|report| report.messages.as_slice()).unwrap_or(&[]);
        let detail = chain
            .first()
            .map_or("no diagnostic available", String::as_str);

        // Edge failures surface as 502, so they share the error level with 5xx.
        if self.status.is_server_error() {
            event!(
                target: "edgepurge::http::response",
                Level::ERROR,
                status = self.status.as_u16(),
                method = self.method,
                path = self.path,
                elapsed_ms = self.elapsed_ms,
                source,
                detail,
                chain = ?chain,
                request_id = self.request_id,
                "trigger failed"
            );
        } else {
            event!(
                target: "edgepurge::http::response",
                Level::WARN,
                status = self.status.as_u16(),
                method = self.method,
                path = self.path,
                elapsed_ms = self.elapsed_ms,
                source,
                detail,
                chain = ?chain,
                request_id = self.request_id,
                "trigger rejected"
            );
        }
    }
}
