use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::purge::queue::QueueError;

const REPORT_SOURCE: &str = "infra::http::api";

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const QUEUE_UNAVAILABLE: &str = "queue_unavailable";
    pub const JOB_PENDING: &str = "job_pending";
}

/// `{"error": {"code", "message", "hint"?}}`
#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

/// Rejection of an inbound trigger or query. Purge outcomes never take this path.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    report: Option<ErrorReport>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: &'static str) -> Self {
        Self {
            status,
            code,
            message,
            hint: None,
            report: None,
        }
    }

    fn with_hint(mut self, hint: Option<String>) -> Self {
        self.hint = hint;
        self
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message).with_hint(hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    pub fn queue_unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::QUEUE_UNAVAILABLE,
            "Deferred purge queue is not running",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        let base = match &err {
            QueueError::Full | QueueError::Closed => Self::queue_unavailable(),
            QueueError::UnknownJob(_) => Self::not_found("job not found"),
            QueueError::Timeout { .. } => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                codes::JOB_PENDING,
                "Job has not finished yet",
            ),
        };
        let report = ErrorReport::from_error(REPORT_SOURCE, base.status, &err);
        Self {
            report: Some(report),
            ..base.with_hint(Some(err.to_string()))
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                hint: self.hint.as_deref(),
            },
        };
        let mut response = (self.status, Json(body)).into_response();

        let report = self.report.unwrap_or_else(|| {
            let detail = format!(
                "{}: {}",
                self.code,
                self.hint.as_deref().unwrap_or(self.message)
            );
            ErrorReport::from_message(REPORT_SOURCE, self.status, detail)
        });
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn queue_errors_map_to_http_statuses() {
        assert_eq!(
            ApiError::from(QueueError::Full).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(QueueError::UnknownJob(Uuid::new_v4())).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn response_carries_report_for_logging() {
        let response = ApiError::from(QueueError::Closed).into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("error report attached");
        assert_eq!(report.source, REPORT_SOURCE);
        assert_eq!(report.messages[0], "purge queue worker is not running");
    }
}
