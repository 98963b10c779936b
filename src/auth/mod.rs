//! Authentication module.
//!
//! Computes and verifies the HMAC tags carried by beats and time keys.

mod hmac;

pub use hmac::{identifier_message, time_key_message, MessageAuthenticator};
