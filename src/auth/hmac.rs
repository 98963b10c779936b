//! HMAC-SHA256 tagging of beat messages and coordinator time keys.

use std::fmt;
use std::path::Path;

use ring::hmac;

use crate::error::{AuthErrorKind, HeartbeatError};

/// Canonical message tagged by an initiator: `{time_key}:{identifier}`.
pub fn identifier_message(time_key: &str, identifier: &str) -> String {
    format!("{}:{}", time_key, identifier)
}

/// Canonical message tagged by the coordinator: `{time_key}:timestamp`.
pub fn time_key_message(time_key: &str) -> String {
    format!("{}:timestamp", time_key)
}

/// Keyed tagger shared by the coordinator and every initiator.
///
/// Tags are lowercase hex digests. Verification decodes the presented tag
/// and compares it in constant time.
#[derive(Clone)]
pub struct MessageAuthenticator {
    key: hmac::Key,
}

impl MessageAuthenticator {
    /// Create an authenticator from the shared secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Load the shared secret from a file.
    ///
    /// Security: Verifies the file has restrictive permissions (0600 or 0400)
    /// before loading. Trailing line breaks are stripped so the secret can be
    /// written with `echo`.
    pub fn load_secret(path: &Path) -> Result<Vec<u8>, HeartbeatError> {
        let metadata = std::fs::metadata(path).map_err(|e| HeartbeatError::Auth {
            kind: AuthErrorKind::SecretUnavailable {
                message: format!(
                    "Failed to read HMAC secret metadata from {}: {}",
                    path.display(),
                    e
                ),
            },
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(HeartbeatError::Auth {
                    kind: AuthErrorKind::SecretUnavailable {
                        message: format!(
                            "HMAC secret file {} has insecure permissions {:04o}, expected 0600 or 0400",
                            path.display(),
                            mode & 0o777
                        ),
                    },
                });
            }
        }
        #[cfg(not(unix))]
        let _ = metadata;

        let mut secret = std::fs::read(path).map_err(|e| HeartbeatError::Auth {
            kind: AuthErrorKind::SecretUnavailable {
                message: format!("Failed to read HMAC secret from {}: {}", path.display(), e),
            },
        })?;
        while matches!(secret.last(), Some(b'\n' | b'\r')) {
            secret.pop();
        }

        if secret.is_empty() {
            return Err(HeartbeatError::Auth {
                kind: AuthErrorKind::SecretUnavailable {
                    message: format!("HMAC secret file {} is empty", path.display()),
                },
            });
        }

        Ok(secret)
    }

    /// Tag an initiator beat.
    pub fn tag_identifier(&self, time_key: &str, identifier: &str) -> String {
        self.sign(&identifier_message(time_key, identifier))
    }

    /// Tag a coordinator-issued time key.
    pub fn tag_time_key(&self, time_key: &str) -> String {
        self.sign(&time_key_message(time_key))
    }

    /// Check a beat tag against `{time_key}:{identifier}`.
    pub fn verify_identifier(&self, time_key: &str, identifier: &str, tag: &str) -> bool {
        self.verify(&identifier_message(time_key, identifier), tag)
    }

    /// Check a time key tag against `{time_key}:timestamp`.
    pub fn verify_time_key(&self, time_key: &str, tag: &str) -> bool {
        self.verify(&time_key_message(time_key), tag)
    }

    fn sign(&self, message: &str) -> String {
        hex::encode(hmac::sign(&self.key, message.as_bytes()).as_ref())
    }

    fn verify(&self, message: &str, tag: &str) -> bool {
        let Ok(tag_bytes) = hex::decode(tag) else {
            return false;
        };
        hmac::verify(&self.key, message.as_bytes(), &tag_bytes).is_ok()
    }
}

impl fmt::Debug for MessageAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageAuthenticator")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
