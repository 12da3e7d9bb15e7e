//! Data models for the comment API
//!
//! Stored records, the nested read model, and the request payloads with their
//! boundary validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MAX_AUTHOR_NAME_CHARS: usize = 100;
pub const MAX_AUTHOR_EMAIL_CHARS: usize = 254;
pub const MAX_CONTENT_CHARS: usize = 5000;

/// A single comment on a blog post, as stored in the database
///
/// `depth` is computed once at creation from the parent and never changes.
/// Comments are never re-parented; moderation only flips `is_approved`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Unique, monotonically allocated identifier
    pub id: u64,

    /// Blog post this comment belongs to
    pub post_id: u64,

    /// Parent comment, `None` for top-level comments
    pub parent_comment_id: Option<u64>,

    /// Number of parent hops to the top-level ancestor
    pub depth: u32,

    /// Set by an admin; only approved comments are shown publicly
    #[serde(default)]
    pub is_approved: bool,

    pub author_name: String,

    #[serde(default)]
    pub author_email: Option<String>,

    pub content: String,

    pub created_at: DateTime<Utc>,
}

/// A comment together with its replies, built fresh on every read.
///
/// Serializes as the comment's own fields plus a `replies` array.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NestedComment {
    #[serde(flatten)]
    pub comment: Comment,

    pub replies: Vec<NestedComment>,
}

impl NestedComment {
    pub fn id(&self) -> u64 {
        self.comment.id
    }
}

/// Response body for the public comment listing
#[derive(Serialize, Debug)]
pub struct CommentThread {
    pub post_id: u64,

    /// Number of comments in the whole tree
    pub total: usize,

    pub comments: Vec<NestedComment>,
}

/// Request payload for submitting a comment
///
/// # Example
/// ```json
/// {
///   "author_name": "Ada",
///   "author_email": "ada@example.com",
///   "content": "Great write-up!",
///   "parent_comment_id": 12
/// }
/// ```
#[derive(Deserialize, Debug, Clone)]
pub struct CreateCommentRequest {
    pub author_name: String,

    #[serde(default)]
    pub author_email: Option<String>,

    pub content: String,

    /// Comment being replied to, if any
    #[serde(default)]
    pub parent_comment_id: Option<u64>,
}

/// A comment submission that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub author_name: String,
    pub author_email: Option<String>,
    pub content: String,
    pub parent_comment_id: Option<u64>,
}

impl CreateCommentRequest {
    /// Trims and checks every field, returning the normalized submission.
    pub fn validate(self) -> Result<NewComment, AppError> {
        let author_name = required("author_name", &self.author_name, MAX_AUTHOR_NAME_CHARS)?;
        let content = required("content", &self.content, MAX_CONTENT_CHARS)?;

        let author_email = match self.author_email.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(email) => {
                if email.chars().count() > MAX_AUTHOR_EMAIL_CHARS || !looks_like_email(email) {
                    return Err(AppError::Validation(
                        "author_email must be a valid email address".to_string(),
                    ));
                }
                Some(email.to_string())
            }
        };

        Ok(NewComment {
            author_name,
            author_email,
            content,
            parent_comment_id: self.parent_comment_id,
        })
    }
}

fn required(field: &str, value: &str, max_chars: usize) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    if trimmed.chars().count() > max_chars {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Request payload for approving or hiding a comment
#[derive(Deserialize, Debug, Clone, Copy)]
pub struct ModerateCommentRequest {
    pub is_approved: bool,
}

/// Query parameters for the admin comment listing
///
/// Query string: `?post_id=3&approved=false`
#[derive(Deserialize, Debug, Default, Clone, Copy)]
pub struct CommentFilter {
    /// Only comments on this post
    pub post_id: Option<u64>,

    /// Only comments with this approval state
    pub approved: Option<bool>,
}

impl CommentFilter {
    pub fn matches(&self, comment: &Comment) -> bool {
        self.post_id.map_or(true, |post_id| comment.post_id == post_id)
            && self
                .approved
                .map_or(true, |approved| comment.is_approved == approved)
    }
}

/// An admin account as returned by identity resolution
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AdminUser {
    pub id: String,

    pub email: String,

    #[serde(default)]
    pub display_name: Option<String>,

    /// Deactivated admins keep their sessions but fail admin checks
    pub is_active: bool,
}
