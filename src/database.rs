//! Database initialization, table definitions and comment persistence
//!
//! This module handles the setup of the embedded redb database and every read
//! and write the comment handlers need.

use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::auth::{IdentityResolver, SessionResolver};
use crate::config::Config;
use crate::error::AppError;
use crate::model::{Comment, CommentFilter, NewComment};
use crate::rate_limit::{InMemoryRateLimiter, RateLimiter};

/// Main table for storing comments
///
/// Key: Comment ID
/// Value: JSON-serialized Comment
pub const TABLE_COMMENTS: TableDefinition<u64, &str> = TableDefinition::new("comments_v1");

/// Index table for listing the comments of one post in chronological order
///
/// Key: Composite key in format "{post_id:020}:{created_micros:020}:{id:020}"
/// Value: Comment ID
///
/// Zero padding keeps lexicographic key order equal to numeric order.
pub const TABLE_POST_INDEX: TableDefinition<&str, u64> =
    TableDefinition::new("comment_post_index_v1");

/// Monotonic counters used for ID allocation
pub const TABLE_COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters_v1");

/// Admin sessions
///
/// Key: Bearer token
/// Value: JSON-serialized SessionRecord
pub const TABLE_SESSIONS: TableDefinition<&str, &str> = TableDefinition::new("sessions_v1");

const COMMENT_ID_COUNTER: &str = "comment_id";

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe reference to the embedded database
    pub db: Arc<Database>,

    /// Per-client request counters used by the gateway
    pub limiter: Arc<dyn RateLimiter>,

    /// Resolves the caller behind a request for admin routes
    pub identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    /// Wires the in-memory rate limiter and the session-backed identity
    /// resolver around `db`.
    pub fn new(db: Arc<Database>, config: &Config) -> Self {
        let limiter =
            InMemoryRateLimiter::new(config.rate_limit_max_requests, config.rate_limit_window);
        let identity = SessionResolver::new(db.clone());
        Self::with_parts(db, Arc::new(limiter), Arc::new(identity))
    }

    pub fn with_parts(
        db: Arc<Database>,
        limiter: Arc<dyn RateLimiter>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            db,
            limiter,
            identity,
        }
    }
}

/// Initializes the embedded database and creates required tables
///
/// # Arguments
///
/// * `db_path` - File path where the database should be stored (e.g., "data.db")
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_COMMENTS)?;
        write_txn.open_table(TABLE_POST_INDEX)?;
        write_txn.open_table(TABLE_COUNTERS)?;
        write_txn.open_table(TABLE_SESSIONS)?;
    }
    write_txn.commit()?;

    Ok(db)
}

fn post_index_key(comment: &Comment) -> String {
    format!(
        "{:020}:{:020}:{:020}",
        comment.post_id,
        comment.created_at.timestamp_micros().max(0),
        comment.id
    )
}

/// Stores a new, unapproved comment on `post_id`
///
/// When the comment is a reply, the parent must exist and belong to the same
/// post; the reply's depth is the parent's depth plus one. Top-level comments
/// have depth 0.
pub fn insert_comment(db: &Database, post_id: u64, new: NewComment) -> Result<Comment, AppError> {
    let write_txn = db.begin_write()?;
    let comment = {
        let mut table_comments = write_txn.open_table(TABLE_COMMENTS)?;

        let depth = match new.parent_comment_id {
            None => 0,
            Some(parent_id) => {
                let parent = table_comments
                    .get(parent_id)?
                    .map(|guard| serde_json::from_str::<Comment>(guard.value()))
                    .transpose()?
                    .ok_or_else(|| AppError::Validation("parent comment does not exist".to_string()))?;

                if parent.post_id != post_id {
                    return Err(AppError::Validation(
                        "parent comment belongs to another post".to_string(),
                    ));
                }
                parent.depth + 1
            }
        };

        let mut table_counters = write_txn.open_table(TABLE_COUNTERS)?;
        let id = table_counters
            .get(COMMENT_ID_COUNTER)?
            .map(|guard| guard.value())
            .unwrap_or(0)
            + 1;
        table_counters.insert(COMMENT_ID_COUNTER, id)?;

        let comment = Comment {
            id,
            post_id,
            parent_comment_id: new.parent_comment_id,
            depth,
            is_approved: false,
            author_name: new.author_name,
            author_email: new.author_email,
            content: new.content,
            created_at: Utc::now(),
        };

        let record_json = serde_json::to_string(&comment)?;
        table_comments.insert(id, record_json.as_str())?;

        let mut table_index = write_txn.open_table(TABLE_POST_INDEX)?;
        table_index.insert(post_index_key(&comment).as_str(), id)?;

        comment
    };
    write_txn.commit()?;

    Ok(comment)
}

/// Lists the comments of one post, oldest first
///
/// Uses a range query on the post index, so the cost depends on the size of
/// the thread rather than the whole table.
pub fn list_comments_for_post(
    db: &Database,
    post_id: u64,
    approved_only: bool,
) -> Result<Vec<Comment>, AppError> {
    let read_txn = db.begin_read()?;
    let table_index = read_txn.open_table(TABLE_POST_INDEX)?;
    let table_comments = read_txn.open_table(TABLE_COMMENTS)?;

    // '{' sorts after every digit, so this bounds all keys of the post
    let start_key = format!("{:020}:", post_id);
    let end_key = format!("{:020}:{{", post_id);

    let mut comments = Vec::new();
    for entry in table_index.range(start_key.as_str()..end_key.as_str())? {
        let (_, id) = entry?;
        let Some(guard) = table_comments.get(id.value())? else {
            continue;
        };
        let comment: Comment = serde_json::from_str(guard.value())?;
        if !approved_only || comment.is_approved {
            comments.push(comment);
        }
    }

    Ok(comments)
}

/// Lists every comment matching `filter`, in ID order
pub fn list_comments(db: &Database, filter: &CommentFilter) -> Result<Vec<Comment>, AppError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(TABLE_COMMENTS)?;

    let mut comments = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        let comment: Comment = serde_json::from_str(value.value())?;
        if filter.matches(&comment) {
            comments.push(comment);
        }
    }

    Ok(comments)
}

/// Sets the approval flag of a comment and returns the updated record
pub fn set_comment_approval(db: &Database, id: u64, is_approved: bool) -> Result<Comment, AppError> {
    let write_txn = db.begin_write()?;
    let comment = {
        let mut table = write_txn.open_table(TABLE_COMMENTS)?;

        let mut comment = table
            .get(id)?
            .map(|guard| serde_json::from_str::<Comment>(guard.value()))
            .transpose()?
            .ok_or(AppError::NotFound("Comment"))?;

        comment.is_approved = is_approved;
        let record_json = serde_json::to_string(&comment)?;
        table.insert(id, record_json.as_str())?;

        comment
    };
    write_txn.commit()?;

    Ok(comment)
}

/// Deletes a comment and its index entry, returning the removed record
///
/// Replies are left in place; they surface as top-level comments on the next
/// read because their parent is gone.
pub fn delete_comment(db: &Database, id: u64) -> Result<Comment, AppError> {
    let write_txn = db.begin_write()?;
    let comment = {
        let mut table_comments = write_txn.open_table(TABLE_COMMENTS)?;

        let comment = table_comments
            .remove(id)?
            .map(|guard| serde_json::from_str::<Comment>(guard.value()))
            .transpose()?
            .ok_or(AppError::NotFound("Comment"))?;

        let mut table_index = write_txn.open_table(TABLE_POST_INDEX)?;
        table_index.remove(post_index_key(&comment).as_str())?;

        comment
    };
    write_txn.commit()?;

    Ok(comment)
}
