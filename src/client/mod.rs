//! Initiator module.
//!
//! Obtains a time key from the coordinator and keeps beating with it,
//! rotating the key every round.

mod initiator;
mod transport;

pub use initiator::{BeatCanceller, BeatHandle, BeatOutcome, Initiator};
pub use transport::{BeatTransport, HttpTransport};
