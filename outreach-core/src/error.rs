//! Error types for outreach-core

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::SuppressionKind;

/// Main error type for the outreach-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed or missing input; user-correctable, no side effects applied
    #[error("validation error: {0}")]
    Validation(String),

    /// No resolvable caller identity
    #[error("unauthorized: missing caller identity")]
    Unauthorized,

    /// Caller does not hold the active claim on the addressed target
    #[error("user {user_id} does not own the active claim on target {target_id}")]
    NotOwner { target_id: String, user_id: String },

    /// Lost a claim race; expected and non-fatal, retry a different target
    #[error("target {0} is already claimed")]
    AlreadyClaimed(String),

    /// Target is opted out; never retry the same target
    #[error("target {target_id} is suppressed ({kind})")]
    Suppressed {
        target_id: String,
        kind: SuppressionKind,
        until: Option<DateTime<Utc>>,
    },

    /// A win record already exists for this target
    #[error("target {0} already has a win recorded")]
    DuplicateWin(String),

    /// No such record
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type alias for outreach-core
pub type Result<T> = std::result::Result<T, Error>;
