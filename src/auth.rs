//! Identity resolution for admin routes
//!
//! The gateway only needs to know who is calling and whether that caller is an
//! active admin. [`IdentityResolver`] is that capability; [`SessionResolver`]
//! implements it with bearer tokens stored in the `sessions_v1` table.

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use chrono::{DateTime, TimeDelta, Utc};
use rand::{distr::Alphanumeric, Rng};
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use crate::database::TABLE_SESSIONS;
use crate::error::AppError;
use crate::model::AdminUser;

const SESSION_TOKEN_LEN: usize = 32;

/// Resolves the caller of a request.
///
/// Returns `Ok(None)` when the request carries no usable credentials. An
/// `Err` means the lookup itself failed; the gateway treats both as
/// unauthorized.
pub trait IdentityResolver: Send + Sync + 'static {
    fn resolve(&self, headers: &HeaderMap) -> Result<Option<AdminUser>, AppError>;
}

/// A stored admin session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user: AdminUser,

    pub created_at: DateTime<Utc>,

    /// `None` for sessions that never expire (e.g. the seeded admin token)
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new(user: AdminUser, ttl: Option<TimeDelta>) -> Self {
        let created_at = Utc::now();
        Self {
            user,
            created_at,
            expires_at: ttl.map(|ttl| created_at + ttl),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Resolves `Authorization: Bearer <token>` against the session table
#[derive(Clone)]
pub struct SessionResolver {
    db: Arc<Database>,
}

impl SessionResolver {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl IdentityResolver for SessionResolver {
    fn resolve(&self, headers: &HeaderMap) -> Result<Option<AdminUser>, AppError> {
        let Some(token) = bearer_token(headers) else {
            return Ok(None);
        };

        match find_session(&self.db, token)? {
            Some(session) if !session.is_expired(Utc::now()) => Ok(Some(session.user)),
            Some(session) => {
                tracing::debug!(user_id = %session.user.id, "session expired");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// Extracts the token from an `Authorization: Bearer ...` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Creates a session for `user` under a fresh random token and returns the
/// token.
pub fn issue_session(
    db: &Database,
    user: AdminUser,
    ttl: Option<TimeDelta>,
) -> Result<String, AppError> {
    let token: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LEN)
        .map(char::from)
        .collect();

    insert_session(db, &token, &SessionRecord::new(user, ttl))?;
    Ok(token)
}

/// Stores `record` under `token`, replacing any existing session.
pub fn insert_session(db: &Database, token: &str, record: &SessionRecord) -> Result<(), AppError> {
    let record_json = serde_json::to_string(record)?;

    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(TABLE_SESSIONS)?;
        table.insert(token, record_json.as_str())?;
    }
    write_txn.commit()?;

    Ok(())
}

pub fn find_session(db: &Database, token: &str) -> Result<Option<SessionRecord>, AppError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(TABLE_SESSIONS)?;

    let session = table
        .get(token)?
        .map(|guard| serde_json::from_str::<SessionRecord>(guard.value()))
        .transpose()?;
    Ok(session)
}

/// Removes the session stored under `token`. Returns whether one existed.
pub fn revoke_session(db: &Database, token: &str) -> Result<bool, AppError> {
    let write_txn = db.begin_write()?;
    let removed = {
        let mut table = write_txn.open_table(TABLE_SESSIONS)?;
        let removed = table.remove(token)?;
        removed.is_some()
    };
    write_txn.commit()?;

    Ok(removed)
}
