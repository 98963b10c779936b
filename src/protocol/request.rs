//! Request types for the beat protocol.

use serde::{Deserialize, Serialize};

use crate::auth::MessageAuthenticator;

use super::TimeKey;

/// One beat as sent by an initiator.
///
/// Missing form fields deserialize to empty strings so that an incomplete
/// form fails the tag check instead of the extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatRequest {
    /// Time key issued by the coordinator in the previous round, or empty
    /// for the bootstrap round.
    #[serde(default)]
    pub timestamp: String,

    /// Opaque peer identifier.
    #[serde(default)]
    pub identifier: String,

    /// HMAC-SHA256 over `{timestamp}:{identifier}` (hex-encoded).
    #[serde(default, rename = "messageMAC")]
    pub message_mac: String,
}

impl BeatRequest {
    /// Build a tagged beat. `None` produces a bootstrap request.
    pub fn signed(
        time_key: Option<&TimeKey>,
        identifier: &str,
        authenticator: &MessageAuthenticator,
    ) -> Self {
        let timestamp = time_key.map(|k| k.value.to_string()).unwrap_or_default();
        let message_mac = authenticator.tag_identifier(&timestamp, identifier);
        Self {
            timestamp,
            identifier: identifier.to_string(),
            message_mac,
        }
    }

    /// A bootstrap round only asks for a fresh time key.
    pub fn is_bootstrap(&self) -> bool {
        self.timestamp.is_empty()
    }
}
