use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{config::LoadError, infra::error::InfraError};

/// Diagnostic chain attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_collects_source_chain() {
        let io = std::io::Error::other("socket closed");
        let error = InfraError::from(io);
        let report = ErrorReport::from_error("tests", StatusCode::BAD_GATEWAY, &error);

        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[0], "io error: socket closed");
        assert_eq!(report.messages[1], "socket closed");
    }

    #[test]
    fn startup_errors_keep_their_context() {
        let error = AppError::from(LoadError::Invalid {
            key: "dispatch.queue_capacity",
            reason: "must be greater than zero".to_string(),
        });
        assert!(error.to_string().starts_with("failed to load configuration: "));

        let error = AppError::from(InfraError::telemetry("subscriber already set"));
        assert_eq!(
            error.to_string(),
            "telemetry initialization failed: subscriber already set"
        );
    }
}
