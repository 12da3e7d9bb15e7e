//! Uniform JSON envelope and response headers
//!
//! Every response produced behind the gateway has the same shape so clients
//! can branch on a single `success` flag:
//!
//! ```json
//! { "success": true,  "data": { ... } }
//! { "success": false, "error": "message" }
//! ```
//!
//! Both helpers attach the fixed security header set, and the rate-limit
//! headers when the caller passes the current [`RateLimitInfo`].

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::rate_limit::RateLimitDecision;

/// Security headers injected on every envelope.
pub const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    (
        "permissions-policy",
        "camera=(), microphone=(), geolocation=()",
    ),
];

pub const HEADER_RATE_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RATE_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RATE_RESET: &str = "x-ratelimit-reset";

/// Rate-limit state handed to a handler that passed the gateway.
///
/// Handlers pass it back into [`success_response`] / [`error_response`] so
/// the client sees its remaining quota on every answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Maximum requests allowed per window
    pub limit: u32,

    /// Requests left in the current window
    pub remaining: u32,

    /// Moment the current window ends
    pub reset_time: DateTime<Utc>,
}

impl From<RateLimitDecision> for RateLimitInfo {
    fn from(decision: RateLimitDecision) -> Self {
        Self {
            limit: decision.limit,
            remaining: decision.remaining,
            reset_time: decision.reset_time,
        }
    }
}

/// The `{success, data|error}` body shape.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Builds a `{"success": true, "data": ...}` response.
///
/// # Arguments
///
/// * `data` - Payload serialized under `data`
/// * `status` - HTTP status, normally `200 OK` or `201 Created`
/// * `rate_limit` - When present, adds `X-RateLimit-*` headers
pub fn success_response<T: Serialize>(
    data: T,
    status: StatusCode,
    rate_limit: Option<&RateLimitInfo>,
) -> Response {
    let body = Envelope {
        success: true,
        data: Some(data),
        error: None,
    };
    finish((status, Json(body)).into_response(), rate_limit)
}

/// Builds a `{"success": false, "error": "..."}` response.
pub fn error_response(
    message: impl Into<String>,
    status: StatusCode,
    rate_limit: Option<&RateLimitInfo>,
) -> Response {
    let body: Envelope<()> = Envelope {
        success: false,
        data: None,
        error: Some(message.into()),
    };
    finish((status, Json(body)).into_response(), rate_limit)
}

fn finish(mut response: Response, rate_limit: Option<&RateLimitInfo>) -> Response {
    let headers = response.headers_mut();
    apply_security_headers(headers);
    if let Some(info) = rate_limit {
        apply_rate_limit_headers(headers, info);
    }
    response
}

/// Inserts the fixed security header set, replacing any existing values.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
}

/// Inserts `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
/// `X-RateLimit-Reset` (unix seconds).
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    headers.insert(
        HeaderName::from_static(HEADER_RATE_LIMIT),
        HeaderValue::from(info.limit),
    );
    headers.insert(
        HeaderName::from_static(HEADER_RATE_REMAINING),
        HeaderValue::from(info.remaining),
    );
    headers.insert(
        HeaderName::from_static(HEADER_RATE_RESET),
        HeaderValue::from(info.reset_time.timestamp()),
    );
}
