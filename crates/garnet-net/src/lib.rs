//! # Garnet Networking
//!
//! A reliable UDP connection layer for game networking, usable as either a
//! server or a client endpoint.
//!
//! The design follows the classic game-networking approach: every datagram
//! carries a per-peer sequence number, an acknowledgement of the highest
//! sequence received from the remote side, and a 32-bit bitfield of the
//! sequences before it. On top of that ride connection establishment and
//! liveness heartbeats, a smoothed round-trip-time estimate, a good/bad send
//! cadence heuristic, and optional retransmission of payloads that were
//! never acknowledged.
//!
//! The endpoint has no thread of its own. An external loop calls
//! [`Endpoint::tick`] with the elapsed time, and all callbacks fire
//! synchronously on the calling thread.

pub mod congestion;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod sequence;

mod peer;
mod reliability;

pub use endpoint::{Endpoint, ReceiveMeta, Role};
pub use error::NetError;
