use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Failure talking to one of the external services (sheet, quotes, FX, AI).
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {service} failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned an unexpected payload: {message}")]
    Payload {
        service: &'static str,
        message: String,
    },

    #[error("{service} authentication failed: {message}")]
    Auth {
        service: &'static str,
        message: String,
    },
}

impl UpstreamError {
    pub fn service(&self) -> &'static str {
        match self {
            Self::Http { service, .. }
            | Self::Status { service, .. }
            | Self::Payload { service, .. }
            | Self::Auth { service, .. } => service,
        }
    }

    /// Network errors, throttling and server-side failures are worth another
    /// attempt; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { source, .. } => source.is_timeout() || source.is_connect() || source.is_request(),
            Self::Status { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::Payload { .. } | Self::Auth { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation("body", rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, field) = match &self {
            Self::Config(detail) => {
                tracing::error!(%detail, "request rejected: missing configuration");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server configuration is incomplete".to_string(),
                    None,
                )
            }
            Self::Upstream(e) => {
                tracing::error!(service = e.service(), error = %e, "upstream call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    format!("Failed to reach {}", e.service()),
                    None,
                )
            }
            Self::Database(e) => {
                tracing::error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string(), None)
            }
            Self::Validation { field, message } => {
                (StatusCode::BAD_REQUEST, message.clone(), Some(field.clone()))
            }
            Self::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found"), None),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None),
        };

        (status, Json(ErrorBody { error, field })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::Config("GOOGLE_SHEETS_ID".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::validation("amount", "must be positive"), StatusCode::BAD_REQUEST),
            (AppError::NotFound("Transaction".into()), StatusCode::NOT_FOUND),
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                AppError::Upstream(UpstreamError::Payload {
                    service: "Finnhub",
                    message: "no price".into(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_retryable_statuses() {
        let status = |code| UpstreamError::Status {
            service: "Gemini",
            status: code,
            body: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(
            !UpstreamError::Payload {
                service: "Gemini",
                message: "bad json".into()
            }
            .is_retryable()
        );
    }
}
