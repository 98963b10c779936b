//! Wire protocol module.
//!
//! Defines the beat request form and the coordinator's time key response.
//!
//! ## Wire Format
//!
//! Request (form-encoded):
//! ```text
//! timestamp=<seconds or empty>&identifier=<id>&messageMAC=<hex hmac>
//! ```
//!
//! Response (`200 OK`, plain text):
//! ```text
//! <seconds> <hex hmac of "<seconds>:timestamp">
//! ```

mod request;
mod response;

pub use request::BeatRequest;
pub use response::{rejection_body, TimeKey};
