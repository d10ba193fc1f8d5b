//! Internal error type shared across Warden modules.

use thiserror::Error;

/// Errors surfaced by the crypto, session, database and client layers.
///
/// HTTP-facing error codes live in `server::api_error`; this enum is the
/// internal form that gets mapped onto the wire at the handler boundary.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("encryption failed: {0}")]
    EncryptionError(String),

    #[error("decryption failed: {0}")]
    DecryptionError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("server error: {0}")]
    ServerError(String),
}

pub type WardenResult<T> = Result<T, WardenError>;
