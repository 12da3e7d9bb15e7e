//! HTTP request handlers for the comment API
//!
//! Every handler here runs behind the gateway, receives its
//! [`RateLimitInfo`] through the request extensions and answers with the
//! standard envelope. Store failures are turned into error envelopes here,
//! never in the gateway.
//!
//! Path, query and body extractors are taken as `Result`s so a malformed
//! request is answered with the same envelope and headers as any other error.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use serde::Serialize;
use serde_json::json;

use crate::comment_tree::build_tree;
use crate::database::{self, AppState};
use crate::error::AppError;
use crate::model::{
    AdminUser, Comment, CommentFilter, CommentThread, CreateCommentRequest,
    ModerateCommentRequest,
};
use crate::response::{success_response, RateLimitInfo};

/// Renders `result` as a success envelope with `status`, or as the matching
/// error envelope. Both carry the caller's rate-limit headers.
fn respond<T: Serialize>(
    result: Result<T, AppError>,
    status: StatusCode,
    rate_limit: &RateLimitInfo,
) -> Response {
    match result {
        Ok(data) => success_response(data, status, Some(rate_limit)),
        Err(err) => err.to_response(Some(rate_limit)),
    }
}

/// Liveness probe, served outside the gateway
pub async fn health() -> Response {
    success_response(json!({ "status": "ok" }), StatusCode::OK, None)
}

/// Lists the approved comments of a post as reply trees
///
/// # Example Request
///
/// `GET /api/posts/3/comments`
///
/// # Response
///
/// ```json
/// {
///   "success": true,
///   "data": {
///     "post_id": 3,
///     "total": 2,
///     "comments": [{ "id": 1, "replies": [{ "id": 2, "replies": [] }] }]
///   }
/// }
/// ```
///
/// Replies whose parent is not approved are shown at the top level.
pub async fn list_post_comments(
    State(state): State<AppState>,
    Extension(rate_limit): Extension<RateLimitInfo>,
    post_id: Result<Path<u64>, PathRejection>,
) -> Response {
    let result = post_id.map_err(AppError::from).and_then(|Path(post_id)| {
        let comments = database::list_comments_for_post(&state.db, post_id, true)?;
        Ok(CommentThread {
            post_id,
            total: comments.len(),
            comments: build_tree(comments),
        })
    });

    respond(result, StatusCode::OK, &rate_limit)
}

/// Submits a comment or a reply on a post
///
/// # Request Body
///
/// ```json
/// {
///   "author_name": "Ada",
///   "author_email": "ada@example.com",
///   "content": "Nice post",
///   "parent_comment_id": 1
/// }
/// ```
///
/// # Response
///
/// - **201 Created** - Comment stored, pending approval
/// - **400 Bad Request** - Invalid fields, or parent missing / on another post
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(rate_limit): Extension<RateLimitInfo>,
    post_id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Response {
    let result = submit_comment(&state, post_id, payload);
    respond(result, StatusCode::CREATED, &rate_limit)
}

fn submit_comment(
    state: &AppState,
    post_id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Result<Comment, AppError> {
    let Path(post_id) = post_id?;
    let Json(payload) = payload?;

    let comment = database::insert_comment(&state.db, post_id, payload.validate()?)?;
    tracing::info!(
        comment_id = comment.id,
        post_id,
        depth = comment.depth,
        "comment submitted"
    );

    Ok(comment)
}

/// Lists all comments, approved or not, for moderation
///
/// `GET /api/admin/comments?post_id=3&approved=false`
pub async fn admin_list_comments(
    State(state): State<AppState>,
    Extension(rate_limit): Extension<RateLimitInfo>,
    filter: Result<Query<CommentFilter>, QueryRejection>,
) -> Response {
    let result = filter
        .map_err(AppError::from)
        .and_then(|Query(filter)| database::list_comments(&state.db, &filter));
    respond(result, StatusCode::OK, &rate_limit)
}

/// Approves or hides a comment
pub async fn moderate_comment(
    State(state): State<AppState>,
    Extension(rate_limit): Extension<RateLimitInfo>,
    Extension(admin): Extension<AdminUser>,
    id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<ModerateCommentRequest>, JsonRejection>,
) -> Response {
    let result = moderate(&state, &admin, id, payload);
    respond(result, StatusCode::OK, &rate_limit)
}

fn moderate(
    state: &AppState,
    admin: &AdminUser,
    id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<ModerateCommentRequest>, JsonRejection>,
) -> Result<Comment, AppError> {
    let Path(id) = id?;
    let Json(payload) = payload?;

    let comment = database::set_comment_approval(&state.db, id, payload.is_approved)?;
    tracing::info!(
        comment_id = id,
        admin_id = %admin.id,
        is_approved = payload.is_approved,
        "comment moderated"
    );

    Ok(comment)
}

/// Deletes a comment; its replies surface as top-level comments afterwards
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(rate_limit): Extension<RateLimitInfo>,
    Extension(admin): Extension<AdminUser>,
    id: Result<Path<u64>, PathRejection>,
) -> Response {
    let result = id.map_err(AppError::from).and_then(|Path(id)| {
        let comment = database::delete_comment(&state.db, id)?;
        tracing::info!(comment_id = id, admin_id = %admin.id, "comment deleted");
        Ok(json!({ "deleted_id": comment.id }))
    });

    respond(result, StatusCode::OK, &rate_limit)
}
