//! Response types for the beat protocol.

use std::fmt;

use crate::auth::MessageAuthenticator;
use crate::error::{HeartbeatError, ProtocolErrorKind};

/// Client-facing body for a rejected beat.
///
/// Detailed causes stay in the coordinator's logs.
pub fn rejection_body(error: &HeartbeatError) -> &'static str {
    if error.is_stale() {
        "Invalid timestamp, advanced or outdated"
    } else if error.is_rejection() {
        "messageMAC wrong"
    } else {
        "Internal server error"
    }
}

/// Coordinator-issued time value and its tag, valid for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeKey {
    /// Coordinator time in Unix seconds.
    pub value: i64,
    /// HMAC-SHA256 over `{value}:timestamp` (hex-encoded).
    pub tag: String,
}

impl TimeKey {
    /// Issue a time key for `now`.
    pub fn issue(now: i64, authenticator: &MessageAuthenticator) -> Self {
        Self {
            value: now,
            tag: authenticator.tag_time_key(&now.to_string()),
        }
    }

    /// Parse a `<seconds> <tag>` response body without checking the tag.
    pub fn parse(body: &str) -> Result<Self, HeartbeatError> {
        let malformed = || HeartbeatError::Protocol {
            kind: ProtocolErrorKind::MalformedResponse {
                body: body.to_string(),
            },
        };

        let mut tokens = body.split_whitespace();
        let (Some(value), Some(tag), None) = (tokens.next(), tokens.next(), tokens.next()) else {
            return Err(malformed());
        };
        let value = value.parse::<i64>().map_err(|_| malformed())?;

        Ok(Self {
            value,
            tag: tag.to_string(),
        })
    }

    /// Parse a response body and reject any pair this secret did not tag.
    pub fn parse_verified(
        body: &str,
        authenticator: &MessageAuthenticator,
    ) -> Result<Self, HeartbeatError> {
        let key = Self::parse(body)?;
        if !authenticator.verify_time_key(&key.value.to_string(), &key.tag) {
            return Err(HeartbeatError::Protocol {
                kind: ProtocolErrorKind::TimeKeyMismatch,
            });
        }
        Ok(key)
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.tag)
    }
}
