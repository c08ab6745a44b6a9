//! Wire-level constants and the datagram header.
//!
//! Every value in this module is a build-time protocol parameter; changing
//! any of them breaks interoperability with peers built from other values.

use std::time::Duration;

pub mod header;

pub use header::Header;

/// Magic leading every datagram. Datagrams carrying a different value are
/// silently dropped.
pub const PROTOCOL_ID: u32 = 1_357_924_680;

/// Default UDP port a server binds to.
pub const DEFAULT_SERVER_PORT: u16 = 12_084;

/// Size of the fixed header in bytes; also the minimum valid datagram size.
pub const HEADER_LEN: usize = 20;

/// Largest datagram the receive path will accept.
pub const MAX_RECEIVED_SIZE: usize = 8192;

/// Hard cap on the per-peer sent-packet history.
pub const SENT_HISTORY_MAX: usize = 34;

/// Age after which an unacknowledged packet is considered lost.
pub const PACKET_LOST_TIMEOUT: Duration = Duration::from_millis(1000);

/// Silence after which a peer is disconnected.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Round-trip times at or below this limit count as "good".
pub const GOOD_RTT_LIMIT: Duration = Duration::from_millis(250);

/// Interval between client connection attempts, in seconds.
pub const CLIENT_RETRY_SECS: f32 = 5.0;

/// Send cadence while the connection is in good mode, in seconds.
pub const GOOD_MODE_SEND_INTERVAL: f32 = 1.0 / 30.0;

/// Send cadence while the connection is in bad mode, in seconds.
pub const BAD_MODE_SEND_INTERVAL: f32 = 1.0 / 10.0;

/// Interval between warnings while the endpoint is in an invalid state.
pub const INVALID_NOTICE_SECS: f32 = 5.0;

// The id word of the header carries four flag bits in its top nibble; the
// low 28 bits are the peer id.

/// Connection request (client to server).
pub const FLAG_CONNECT: u32 = 0x8000_0000;
/// Ping; asks the receiver to trigger a send.
pub const FLAG_PING: u32 = 0x4000_0000;
/// The sender does not track this packet for retransmission.
pub const FLAG_NO_ACK_CHECK: u32 = 0x2000_0000;
/// The payload is a retransmission of an earlier packet.
pub const FLAG_RESENDING: u32 = 0x1000_0000;

/// Mask selecting the flag nibble of the id word.
pub const FLAGS_MASK: u32 = 0xF000_0000;
/// Mask selecting the peer id bits of the id word.
pub const ID_MASK: u32 = 0x0FFF_FFFF;
