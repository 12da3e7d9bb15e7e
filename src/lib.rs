//! Comment API for the portfolio site
//!
//! Exposes the request gateway, the comment tree builder and the HTTP layer
//! for the server binary and the integration tests.

pub mod auth;
pub mod comment_tree;
pub mod config;
pub mod database;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod model;
pub mod rate_limit;
pub mod response;
pub mod route;
