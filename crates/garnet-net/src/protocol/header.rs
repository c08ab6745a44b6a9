//! The 20-byte header leading every datagram.

use bytes::{Buf, BufMut};
use garnet_binary::{BinaryError, Readable, Writable};

use super::{
    FLAG_CONNECT, FLAG_NO_ACK_CHECK, FLAG_PING, FLAG_RESENDING, FLAGS_MASK, ID_MASK, PROTOCOL_ID,
};

/// The fixed header of every datagram, in big-endian wire order:
///
/// | offset | bytes | field                               |
/// |--------|-------|-------------------------------------|
/// | 0      | 4     | protocol magic                      |
/// | 4      | 4     | flags (top nibble) + peer id        |
/// | 8      | 4     | sequence                            |
/// | 12     | 4     | ack (highest sequence received)     |
/// | 16     | 4     | ack bitfield                        |
///
/// Bytes after the header are the application payload and may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// 28-bit peer identifier. The flag nibble must be zero here.
    pub peer_id: u32,
    /// Flag nibble, already shifted into wire position.
    pub flags: u32,
    /// Sequence number of this datagram.
    pub sequence: u32,
    /// Highest sequence received from the remote side.
    pub ack: u32,
    /// Received-sequence bitfield; the MSB represents `ack - 1`.
    pub ack_bits: u32,
}

impl Header {
    /// The minimal datagram a client sends to initiate a connection.
    pub fn connect_request() -> Self {
        Self {
            peer_id: 0,
            flags: FLAG_CONNECT,
            sequence: 0,
            ack: 0,
            ack_bits: 0xFFFF_FFFF,
        }
    }

    pub fn is_connect(&self) -> bool {
        self.flags & FLAG_CONNECT != 0
    }

    pub fn is_ping(&self) -> bool {
        self.flags & FLAG_PING != 0
    }

    /// True when the sender does not track this packet for retransmission.
    pub fn is_no_ack_check(&self) -> bool {
        self.flags & FLAG_NO_ACK_CHECK != 0
    }

    pub fn is_resending(&self) -> bool {
        self.flags & FLAG_RESENDING != 0
    }
}

impl Writable for Header {
    fn write<B: BufMut>(&self, writer: &mut B) -> garnet_binary::Result<()> {
        PROTOCOL_ID.write(writer)?;
        ((self.peer_id & ID_MASK) | (self.flags & FLAGS_MASK)).write(writer)?;
        self.sequence.write(writer)?;
        self.ack.write(writer)?;
        self.ack_bits.write(writer)?;
        Ok(())
    }
}

impl Readable for Header {
    fn read<B: Buf>(reader: &mut B) -> garnet_binary::Result<Self> {
        let protocol_id = u32::read(reader)?;
        if protocol_id != PROTOCOL_ID {
            return Err(BinaryError::InvalidData(format!(
                "unexpected protocol id {protocol_id:#010x}"
            )));
        }
        let id_word = u32::read(reader)?;
        let sequence = u32::read(reader)?;
        let ack = u32::read(reader)?;
        let ack_bits = u32::read(reader)?;
        Ok(Self {
            peer_id: id_word & ID_MASK,
            flags: id_word & FLAGS_MASK,
            sequence,
            ack,
            ack_bits,
        })
    }
}
