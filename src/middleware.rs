//! Request gateway wrapped around every API route
//!
//! For each request the gateway, in order:
//! 1. derives the client key from proxy headers and counts the request
//! 2. rejects with `429` once the client's quota for the window is used up
//! 3. for protected routes, resolves the caller and rejects with `401`/`403`
//! 4. runs the handler with the caller's [`RateLimitInfo`]
//!
//! A rejected request never reaches the handler. Handler failures are not
//! caught here; handlers render their own error envelopes.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::IdentityResolver;
use crate::database::AppState;
use crate::error::AppError;
use crate::rate_limit::RateLimiter;
use crate::response::RateLimitInfo;

pub const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";
pub const HEADER_REAL_IP: &str = "x-real-ip";

/// Bucket shared by every client that cannot be attributed
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Access requirements of a wrapped route
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayOptions {
    /// Any resolved identity is enough
    pub require_auth: bool,

    /// The identity must be an active admin
    pub require_admin: bool,
}

impl GatewayOptions {
    pub const fn public() -> Self {
        Self {
            require_auth: false,
            require_admin: false,
        }
    }

    pub const fn authenticated() -> Self {
        Self {
            require_auth: true,
            require_admin: false,
        }
    }

    pub const fn admin() -> Self {
        Self {
            require_auth: true,
            require_admin: true,
        }
    }
}

/// Everything the gateway needs to screen a request
#[derive(Clone)]
pub struct Gateway {
    limiter: Arc<dyn RateLimiter>,
    identity: Arc<dyn IdentityResolver>,
    options: GatewayOptions,
}

impl Gateway {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        identity: Arc<dyn IdentityResolver>,
        options: GatewayOptions,
    ) -> Self {
        Self {
            limiter,
            identity,
            options,
        }
    }

    /// Gateway sharing the limiter and identity resolver of `state`.
    pub fn from_state(state: &AppState, options: GatewayOptions) -> Self {
        Self::new(state.limiter.clone(), state.identity.clone(), options)
    }
}

/// Derives the rate-limit key of a request.
///
/// Prefers the first entry of `X-Forwarded-For`, then `X-Real-IP`, then falls
/// back to [`UNKNOWN_CLIENT`]. Clients behind the same proxy address share one
/// counter.
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get(HEADER_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let real_ip = || {
        headers
            .get(HEADER_REAL_IP)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

/// Screens `request` and, if it passes, runs `handler` with it.
///
/// The resolved [`AdminUser`](crate::model::AdminUser) of a protected route is
/// added to the request extensions before the handler runs. The handler's
/// response is returned unchanged.
pub async fn with_middleware<H, Fut>(gateway: &Gateway, mut request: Request, handler: H) -> Response
where
    H: FnOnce(Request, RateLimitInfo) -> Fut,
    Fut: Future<Output = Response>,
{
    let key = client_key(request.headers());
    let decision = gateway.limiter.check_and_increment(&key);
    let rate_limit = RateLimitInfo::from(decision);

    if !decision.allowed {
        tracing::warn!(
            client = %key,
            path = %request.uri().path(),
            reset_time = %decision.reset_time,
            "rate limit exceeded"
        );
        return AppError::RateLimited {
            reset_time: decision.reset_time,
        }
        .to_response(Some(&rate_limit));
    }

    let options = gateway.options;
    if options.require_auth || options.require_admin {
        let user = match gateway.identity.resolve(request.headers()) {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(client = %key, path = %request.uri().path(), "no identity for protected route");
                return AppError::Unauthorized.to_response(Some(&rate_limit));
            }
            Err(err) => {
                tracing::warn!(client = %key, error = %err, "identity resolution failed");
                return AppError::Unauthorized.to_response(Some(&rate_limit));
            }
        };

        if options.require_admin && !user.is_active {
            tracing::warn!(client = %key, user_id = %user.id, "inactive admin rejected");
            return AppError::Forbidden.to_response(Some(&rate_limit));
        }

        request.extensions_mut().insert(user);
    }

    tracing::debug!(client = %key, remaining = rate_limit.remaining, "request admitted");
    handler(request, rate_limit).await
}

/// Axum middleware running [`with_middleware`] in front of the rest of the
/// stack. Downstream handlers read the quota via `Extension<RateLimitInfo>`.
///
/// ```no_run
/// # use axum::{middleware, routing::get, Router};
/// # use portfolio::middleware::{gateway_middleware, Gateway, GatewayOptions};
/// # fn build(state: portfolio::database::AppState) -> Router {
/// let gateway = Gateway::from_state(&state, GatewayOptions::admin());
/// Router::new()
///     .route("/api/admin/ping", get(|| async { "pong" }))
///     .layer(middleware::from_fn_with_state(gateway, gateway_middleware))
/// # }
/// ```
pub async fn gateway_middleware(State(gateway): State<Gateway>, request: Request, next: Next) -> Response {
    with_middleware(&gateway, request, move |mut request, rate_limit| async move {
        request.extensions_mut().insert(rate_limit);
        next.run(request).await
    })
    .await
}
