//! Error types shared by the gateway, the handlers and the store

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use crate::response::{error_response, RateLimitInfo};

/// Every failure a request can end in.
///
/// The gateway produces `RateLimited`, `Unauthorized` and `Forbidden` before a
/// handler runs; handlers produce the rest and turn them into the error
/// envelope themselves.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Too many requests. Please try again later.")]
    RateLimited { reset_time: DateTime<Utc> },

    #[error("Unauthorized. Sign in with an admin account.")]
    Unauthorized,

    #[error("Forbidden. Active admin access required.")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    /// An extractor refused the request (bad path, query or body)
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

macro_rules! from_redb_error {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for AppError {
                fn from(err: $source) -> Self {
                    AppError::Database(err.into())
                }
            }
        )*
    };
}

from_redb_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

macro_rules! from_rejection {
    ($($rejection:ty),* $(,)?) => {
        $(
            impl From<$rejection> for AppError {
                fn from(rejection: $rejection) -> Self {
                    AppError::Rejected {
                        status: rejection.status(),
                        message: rejection.body_text(),
                    }
                }
            }
        )*
    };
}

from_rejection!(JsonRejection, PathRejection, QueryRejection);

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Rejected { status, .. } => *status,
            Self::Database(_) | Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Renders the error envelope, optionally with rate-limit headers.
    ///
    /// Server-side failures are logged in full and reported to the client as
    /// a generic message.
    pub fn to_response(&self, rate_limit: Option<&RateLimitInfo>) -> Response {
        let status = self.status_code();

        let mut response = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            error_response("Internal server error", status, rate_limit)
        } else {
            error_response(self.to_string(), status, rate_limit)
        };

        if let Self::RateLimited { reset_time } = self {
            let retry_after = (*reset_time - Utc::now()).num_seconds().max(1);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }

        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_response(None)
    }
}

/// Invalid configuration values read at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
