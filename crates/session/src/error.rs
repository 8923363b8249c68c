//! Session-Key Authority error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// No session key with the given id exists.
    #[error("session key not found")]
    NotFound,

    /// `validate` rejected the attempted use; see the accumulated reasons
    /// on the returned `ValidationOutcome` rather than this variant's
    /// message for the full list.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// Caller does not own the session key it's trying to act on.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Key-pair generation or AES-GCM encrypt/decrypt failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
