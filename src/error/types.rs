//! Error types for the heartbeat daemon.

use thiserror::Error;

/// Main error type for the coordinator and the initiator.
#[derive(Error, Debug)]
pub enum HeartbeatError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Beat authentication errors (coordinator side).
    #[error("Authentication error: {kind}")]
    Auth { kind: AuthErrorKind },

    /// Network failure or non-success status while contacting the coordinator.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Malformed or mistagged coordinator response (initiator side).
    #[error("Protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },

    /// External notification hook failures.
    #[error("Hook error: {message}")]
    Hook { message: String },

    /// Listener bind/serve errors.
    #[error("Server error: {message}")]
    Server { message: String },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authentication error kinds.
#[derive(Error, Debug)]
pub enum AuthErrorKind {
    #[error("Invalid signature")]
    InvalidSignature,

    /// Negative ages are future-dated timestamps.
    #[error("Stale timestamp: age {age_seconds}s outside freshness window")]
    StaleTimestamp { age_seconds: i64 },

    #[error("Unparseable timestamp: {value}")]
    MalformedTimestamp { value: String },

    #[error("Failed to read HMAC secret: {message}")]
    SecretUnavailable { message: String },
}

/// Protocol error kinds.
#[derive(Error, Debug)]
pub enum ProtocolErrorKind {
    #[error("Malformed response body: {body:?}")]
    MalformedResponse { body: String },

    #[error("Time key tag mismatch (replay or forgery)")]
    TimeKeyMismatch,
}

impl HeartbeatError {
    /// Whether the coordinator rejected a beat (bad tag or stale time key).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            HeartbeatError::Auth {
                kind: AuthErrorKind::InvalidSignature
                    | AuthErrorKind::StaleTimestamp { .. }
                    | AuthErrorKind::MalformedTimestamp { .. }
            }
        )
    }

    /// Whether the beat failed its freshness check rather than its tag check.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            HeartbeatError::Auth {
                kind: AuthErrorKind::StaleTimestamp { .. } | AuthErrorKind::MalformedTimestamp { .. }
            }
        )
    }
}

impl From<reqwest::Error> for HeartbeatError {
    fn from(e: reqwest::Error) -> Self {
        HeartbeatError::Transport {
            message: e.to_string(),
        }
    }
}

/// Result type alias for heartbeat operations.
pub type HeartbeatResult<T> = Result<T, HeartbeatError>;
