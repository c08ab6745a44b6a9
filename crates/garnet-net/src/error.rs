use garnet_binary::BinaryError;
use std::io;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors raised inside the connection layer.
///
/// Most of these never escape [`crate::Endpoint::tick`]: a datagram that
/// fails validation is logged and dropped, never surfaced to the caller.
#[derive(Error, Debug)]
pub enum NetError {
    /// An I/O error occurred on the underlying UDP socket.
    #[error("network I/O error: {0}")]
    Io(#[from] io::Error),

    /// An error occurred while decoding or encoding a datagram.
    #[error("binary handling error: {0}")]
    Binary(#[from] BinaryError),

    /// Creating, binding, or configuring the socket failed. The endpoint
    /// stays in an inert state until it is reset.
    #[error("socket setup failed: {0}")]
    SocketSetup(#[source] io::Error),

    /// The header's peer id does not match the id registered for the sender.
    #[error("peer id {got:#010x} does not match the id registered for {peer}")]
    IdMismatch { peer: Ipv4Addr, got: u32 },

    /// A non-connect datagram arrived from an address with no registered peer.
    #[error("datagram from unknown peer {0}")]
    UnknownPeer(Ipv4Addr),

    /// The sequence number was already received.
    #[error("duplicate sequence {0}")]
    Duplicate(u32),
}

/// Result type alias for connection-layer operations.
pub type Result<T> = std::result::Result<T, NetError>;
