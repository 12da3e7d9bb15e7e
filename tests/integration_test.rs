//! Integration tests for the comment API
//!
//! These tests drive the whole stack through the router:
//! - gateway admission and envelope shape
//! - comment submission, validation and depth computation
//! - threaded listing of approved comments
//! - moderation and deletion

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use portfolio::auth::issue_session;
use portfolio::config::Config;
use portfolio::database::{init_db, AppState};
use portfolio::model::AdminUser;
use portfolio::route::create_app;

struct TestApp {
    app: axum::Router,
    admin_token: String,
    _temp_db: NamedTempFile,
}

/// Creates a test application with a temporary database and one admin session
fn setup_test_app() -> TestApp {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = temp_db.path().to_str().unwrap();
    let db = Arc::new(init_db(db_path).expect("Failed to initialize test database"));

    let admin = AdminUser {
        id: "admin-1".to_string(),
        email: "admin@example.com".to_string(),
        display_name: Some("Admin".to_string()),
        is_active: true,
    };
    let admin_token = issue_session(&db, admin, None).unwrap();

    let config = Config {
        rate_limit_max_requests: 1_000,
        ..Config::default()
    };
    let state = AppState::new(db, &config);

    TestApp {
        app: create_app(state),
        admin_token,
        _temp_db: temp_db,
    }
}

/// Helper function to parse response body as JSON
async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

async fn post_comment(app: &axum::Router, post_id: u64, payload: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/posts/{post_id}/comments"))
                .header("content-type", "application/json")
                .header("x-forwarded-for", "203.0.113.7")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    (status, response_json(response.into_body()).await)
}

async fn approve(test: &TestApp, id: u64) {
    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/admin/comments/{id}"))
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {}", test.admin_token))
                .body(Body::from(json!({ "is_approved": true }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn list_thread(app: &axum::Router, post_id: u64) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/api/posts/{post_id}/comments"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response.into_body()).await
}

fn comment_id(body: &Value) -> u64 {
    body["data"]["id"].as_u64().expect("comment id")
}

#[tokio::test]
async fn test_health_is_enveloped() {
    let test = setup_test_app();

    let response = test
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    assert!(response.headers().get("x-ratelimit-limit").is_none());

    let body = response_json(response.into_body()).await;
    assert_eq!(body, json!({ "success": true, "data": { "status": "ok" } }));
}

#[tokio::test]
async fn test_create_comment_success() {
    let test = setup_test_app();

    let (status, body) = post_comment(
        &test.app,
        7,
        json!({
            "author_name": "  Ada  ",
            "author_email": "ada@example.com",
            "content": "Great write-up!"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["post_id"], 7);
    assert_eq!(body["data"]["author_name"], "Ada");
    assert_eq!(body["data"]["depth"], 0);
    assert_eq!(body["data"]["is_approved"], false);
    assert!(body["data"]["parent_comment_id"].is_null());
}

#[tokio::test]
async fn test_create_comment_carries_rate_limit_headers() {
    let test = setup_test_app();

    let response = test
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/posts/1/comments")
                .header("content-type", "application/json")
                .header("x-real-ip", "198.51.100.4")
                .body(Body::from(
                    json!({ "author_name": "Bo", "content": "hi" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let headers = response.headers();
    assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "1000");
    assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "999");
    assert!(headers.get("x-ratelimit-reset").is_some());
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
}

#[tokio::test]
async fn test_create_comment_validation_error() {
    let test = setup_test_app();

    let (status, body) = post_comment(
        &test.app,
        1,
        json!({ "author_name": "   ", "content": "text" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "author_name is required");

    let (status, body) = post_comment(
        &test.app,
        1,
        json!({ "author_name": "Cy", "author_email": "not-an-email", "content": "text" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "author_email must be a valid email address");
}

#[tokio::test]
async fn test_reply_depth_is_parent_depth_plus_one() {
    let test = setup_test_app();

    let (_, root) = post_comment(&test.app, 1, json!({ "author_name": "A", "content": "root" })).await;
    let (_, reply) = post_comment(
        &test.app,
        1,
        json!({ "author_name": "B", "content": "reply", "parent_comment_id": comment_id(&root) }),
    )
    .await;
    let (status, nested) = post_comment(
        &test.app,
        1,
        json!({ "author_name": "C", "content": "nested", "parent_comment_id": comment_id(&reply) }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reply["data"]["depth"], 1);
    assert_eq!(nested["data"]["depth"], 2);
    assert_eq!(nested["data"]["parent_comment_id"], comment_id(&reply));
}

#[tokio::test]
async fn test_reply_to_missing_or_foreign_parent_rejected() {
    let test = setup_test_app();

    let (status, body) = post_comment(
        &test.app,
        1,
        json!({ "author_name": "A", "content": "x", "parent_comment_id": 999 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "parent comment does not exist");

    let (_, other_post) = post_comment(&test.app, 2, json!({ "author_name": "A", "content": "x" })).await;
    let (status, body) = post_comment(
        &test.app,
        1,
        json!({ "author_name": "B", "content": "y", "parent_comment_id": comment_id(&other_post) }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "parent comment belongs to another post");
}

#[tokio::test]
async fn test_list_only_shows_approved_comments_as_tree() {
    let test = setup_test_app();

    let (_, first) = post_comment(&test.app, 5, json!({ "author_name": "A", "content": "1" })).await;
    let first = comment_id(&first);
    let (_, reply) = post_comment(
        &test.app,
        5,
        json!({ "author_name": "B", "content": "2", "parent_comment_id": first }),
    )
    .await;
    let reply = comment_id(&reply);
    let (_, second) = post_comment(&test.app, 5, json!({ "author_name": "C", "content": "3" })).await;
    let second = comment_id(&second);
    // Pending comment on the same post stays hidden
    post_comment(&test.app, 5, json!({ "author_name": "D", "content": "4" })).await;

    for id in [first, reply, second] {
        approve(&test, id).await;
    }

    let body = list_thread(&test.app, 5).await;
    let data = &body["data"];
    assert_eq!(data["post_id"], 5);
    assert_eq!(data["total"], 3);

    let roots = data["comments"].as_array().unwrap();
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0]["id"], first);
    assert_eq!(roots[0]["replies"][0]["id"], reply);
    assert_eq!(roots[0]["replies"][0]["replies"], json!([]));
    assert_eq!(roots[1]["id"], second);
    assert_eq!(roots[1]["replies"], json!([]));
}

#[tokio::test]
async fn test_reply_with_unapproved_parent_is_promoted_to_root() {
    let test = setup_test_app();

    let (_, parent) = post_comment(&test.app, 9, json!({ "author_name": "A", "content": "p" })).await;
    let (_, reply) = post_comment(
        &test.app,
        9,
        json!({ "author_name": "B", "content": "r", "parent_comment_id": comment_id(&parent) }),
    )
    .await;
    approve(&test, comment_id(&reply)).await;

    let body = list_thread(&test.app, 9).await;
    let roots = body["data"]["comments"].as_array().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0]["id"], comment_id(&reply));
    assert_eq!(roots[0]["depth"], 1);
}

#[tokio::test]
async fn test_list_for_unknown_post_is_empty() {
    let test = setup_test_app();

    let body = list_thread(&test.app, 404).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total"], 0);
    assert_eq!(body["data"]["comments"], json!([]));
}

#[tokio::test]
async fn test_admin_list_filters_by_post_and_approval() {
    let test = setup_test_app();

    let (_, a) = post_comment(&test.app, 1, json!({ "author_name": "A", "content": "a" })).await;
    post_comment(&test.app, 1, json!({ "author_name": "B", "content": "b" })).await;
    post_comment(&test.app, 2, json!({ "author_name": "C", "content": "c" })).await;
    approve(&test, comment_id(&a)).await;

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/comments?post_id=1&approved=false")
                .header("authorization", format!("Bearer {}", test.admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response.into_body()).await;
    let comments = body["data"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["author_name"], "B");

    let response = test
        .app
        .oneshot(
            Request::builder()
                .uri("/api/admin/comments")
                .header("authorization", format!("Bearer {}", test.admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response_json(response.into_body()).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_moderate_unknown_comment_not_found() {
    let test = setup_test_app();

    let response = test
        .app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/api/admin/comments/42")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {}", test.admin_token))
                .body(Body::from(json!({ "is_approved": true }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response.into_body()).await;
    assert_eq!(body, json!({ "success": false, "error": "Comment not found" }));
}

#[tokio::test]
async fn test_delete_comment_orphans_replies() {
    let test = setup_test_app();

    let (_, parent) = post_comment(&test.app, 3, json!({ "author_name": "A", "content": "p" })).await;
    let parent = comment_id(&parent);
    let (_, reply) = post_comment(
        &test.app,
        3,
        json!({ "author_name": "B", "content": "r", "parent_comment_id": parent }),
    )
    .await;
    let reply = comment_id(&reply);
    approve(&test, parent).await;
    approve(&test, reply).await;

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/admin/comments/{parent}"))
                .header("authorization", format!("Bearer {}", test.admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["data"]["deleted_id"], parent);

    let body = list_thread(&test.app, 3).await;
    let roots = body["data"]["comments"].as_array().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0]["id"], reply);

    // Second delete of the same comment
    let response = test
        .app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/admin/comments/{parent}"))
                .header("authorization", format!("Bearer {}", test.admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_body_is_enveloped() {
    let test = setup_test_app();

    let response = test
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/posts/1/comments")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "1000");

    let body = response_json(response.into_body()).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("JSON"));
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_missing_content_type_is_enveloped() {
    let test = setup_test_app();

    let response = test
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/posts/1/comments")
                .body(Body::from(json!({ "author_name": "A", "content": "c" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    let body = response_json(response.into_body()).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_non_numeric_post_id_is_enveloped() {
    let test = setup_test_app();

    let response = test
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/posts/abc/comments")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert!(response.headers().get("x-ratelimit-remaining").is_some());

    let body = response_json(response.into_body()).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("abc"));
}

#[tokio::test]
async fn test_bad_admin_query_and_id_are_enveloped() {
    let test = setup_test_app();

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/admin/comments?approved=maybe")
                .header("authorization", format!("Bearer {}", test.admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    let body = response_json(response.into_body()).await;
    assert_eq!(body["success"], false);

    let response = test
        .app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/admin/comments/first")
                .header("authorization", format!("Bearer {}", test.admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["success"], false);
}
