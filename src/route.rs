//! Route definitions for the comment API
//!
//! This module configures all HTTP routes, wraps them in the gateway and maps
//! them to their handlers.

use axum::routing::{get, patch};
use axum::{middleware, Router};

use crate::database::AppState;
use crate::handler::{
    admin_list_comments, create_comment, delete_comment, health, list_post_comments,
    moderate_comment,
};
use crate::middleware::{gateway_middleware, Gateway, GatewayOptions};

/// Creates and configures the Axum application router with all routes
///
/// # Route Definitions
///
/// - `GET /health` - Liveness probe, not rate limited
/// - `GET /api/posts/{post_id}/comments` - Approved comments as reply trees
/// - `POST /api/posts/{post_id}/comments` - Submit a comment or reply
/// - `GET /api/admin/comments` - All comments for moderation (admin)
/// - `PATCH /api/admin/comments/{id}` - Approve or hide a comment (admin)
/// - `DELETE /api/admin/comments/{id}` - Delete a comment (admin)
///
/// Public and admin routes share one rate limiter, so a client's quota covers
/// both.
pub fn create_app(state: AppState) -> Router {
    let public_gateway = Gateway::from_state(&state, GatewayOptions::public());
    let admin_gateway = Gateway::from_state(&state, GatewayOptions::admin());

    let public_routes = Router::new()
        .route(
            "/posts/{post_id}/comments",
            get(list_post_comments).post(create_comment),
        )
        .layer(middleware::from_fn_with_state(
            public_gateway,
            gateway_middleware,
        ));

    let admin_routes = Router::new()
        .route("/admin/comments", get(admin_list_comments))
        .route(
            "/admin/comments/{id}",
            patch(moderate_comment).delete(delete_comment),
        )
        .layer(middleware::from_fn_with_state(
            admin_gateway,
            gateway_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/api", public_routes.merge(admin_routes))
        .with_state(state)
}
