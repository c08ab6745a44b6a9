//! Per-peer connection state and send scheduling.

use bytes::Bytes;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::congestion::FlowControl;
use crate::protocol::{CONNECTION_TIMEOUT, SENT_HISTORY_MAX};
use crate::sequence;

/// A payload waiting in the send queue.
#[derive(Debug, Clone)]
pub struct QueuedPacket {
    pub payload: Bytes,
    /// Set when this is a retransmission of an earlier payload.
    pub resending: bool,
    /// Set when the packet must not be tracked for retransmission.
    pub ack_exempt: bool,
}

impl QueuedPacket {
    /// An empty keep-alive packet, sent when the queue has nothing else.
    pub fn heartbeat() -> Self {
        Self {
            payload: Bytes::new(),
            resending: false,
            ack_exempt: true,
        }
    }
}

/// A record of a transmitted datagram, kept until acknowledged or evicted.
#[derive(Debug, Clone)]
pub struct SentPacket {
    pub sequence: u32,
    pub sent_at: Instant,
    /// Full datagram image (header plus payload) for tracked packets.
    /// `None` for ack-exempt records, which hold a history slot to keep the
    /// acknowledgement accounting aligned but are never replayed.
    pub datagram: Option<Bytes>,
    pub ack_exempt: bool,
    /// Set once the retransmission engine has re-queued this record, so it
    /// is re-queued at most once.
    pub retried: bool,
}

/// Classification of an incoming sequence number against the receive state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStatus {
    /// Already received; the datagram must be dropped.
    Duplicate,
    /// Newer than everything received so far.
    InOrder,
    /// Older than the highest received sequence but not yet seen.
    OutOfOrder,
}

/// State for one connected remote endpoint.
pub struct Peer {
    /// 28-bit identifier carried in every datagram of this connection.
    pub id: u32,
    /// Remote UDP port observed at connect time.
    pub port: u16,
    /// Next sequence to assign to an outbound datagram.
    pub local_seq: u32,
    /// Highest sequence received from the peer.
    pub remote_seq: u32,
    /// Received-sequence bitfield; the MSB represents `remote_seq - 1`.
    pub ack_bits: u32,
    /// Transmitted packets, newest first, capped at `SENT_HISTORY_MAX`.
    pub sent_history: VecDeque<SentPacket>,
    /// Outbound queue; enqueue pushes to the front, transmission pops from
    /// the back, giving first-in first-out order overall.
    pub send_queue: VecDeque<QueuedPacket>,
    /// Smoothed round-trip time.
    pub rtt: Duration,
    /// Whether the smoothed round-trip time is under the good limit.
    pub good_rtt: bool,
    pub last_recv_at: Instant,
    pub last_send_at: Instant,
    /// Latch requesting one transmission on the next flush.
    pub trigger_send: bool,
    send_timer: f32,
    pub flow: FlowControl,
}

impl Peer {
    pub fn new(id: u32, initial_seq: u32, port: u16) -> Self {
        let now = Instant::now();
        Self {
            id,
            port,
            local_seq: initial_seq,
            remote_seq: 0,
            ack_bits: 0xFFFF_FFFF,
            sent_history: VecDeque::new(),
            send_queue: VecDeque::new(),
            rtt: Duration::ZERO,
            good_rtt: false,
            last_recv_at: now,
            last_send_at: now,
            trigger_send: false,
            send_timer: 0.0,
            flow: FlowControl::new(),
        }
    }

    /// Advances the cadence timer, arming the send trigger when the current
    /// mode's interval has elapsed.
    pub fn advance_send_timer(&mut self, dt: f32) {
        self.send_timer += dt;
        if self.send_timer >= self.flow.send_interval() {
            self.send_timer = 0.0;
            self.trigger_send = true;
        }
    }

    /// Takes the next sequence number, post-incrementing with wrap-around.
    pub fn next_sequence(&mut self) -> u32 {
        let sequence = self.local_seq;
        self.local_seq = self.local_seq.wrapping_add(1);
        sequence
    }

    /// Pops the next packet to transmit, synthesising a heartbeat when the
    /// queue is empty.
    pub fn next_outgoing(&mut self) -> QueuedPacket {
        self.send_queue.pop_back().unwrap_or_else(QueuedPacket::heartbeat)
    }

    /// Queues a packet for transmission.
    pub fn enqueue(&mut self, packet: QueuedPacket) {
        self.send_queue.push_front(packet);
    }

    /// Records a transmitted datagram at the head of the history and trims
    /// the oldest entries past the cap.
    pub fn record_sent(&mut self, sequence: u32, datagram: Option<Bytes>, ack_exempt: bool, now: Instant) {
        self.sent_history.push_front(SentPacket {
            sequence,
            sent_at: now,
            datagram,
            ack_exempt,
            retried: false,
        });
        self.sent_history.truncate(SENT_HISTORY_MAX);
        self.last_send_at = now;
    }

    /// Classifies an incoming sequence number and folds it into the receive
    /// state.
    ///
    /// A newer sequence becomes the highest received one and shifts the
    /// bitfield; an older one inside the 32-sequence window is recorded in
    /// its bit unless that bit already marks it as received. Older sequences
    /// outside the window are accepted but cannot be recorded.
    pub fn accept_sequence(&mut self, seq: u32) -> SequenceStatus {
        if seq == self.remote_seq {
            return SequenceStatus::Duplicate;
        }
        if sequence::more_recent(seq, self.remote_seq) {
            let diff = seq.wrapping_sub(self.remote_seq);
            self.remote_seq = seq;
            self.ack_bits = sequence::shift_bitfield(self.ack_bits, diff);
            SequenceStatus::InOrder
        } else {
            let diff = self.remote_seq.wrapping_sub(seq);
            let mask = sequence::ack_mask(diff);
            if mask != 0 && self.ack_bits & mask != 0 {
                return SequenceStatus::Duplicate;
            }
            self.ack_bits |= mask;
            SequenceStatus::OutOfOrder
        }
    }

    /// True when nothing has been received from the peer for the connection
    /// timeout.
    pub fn timed_out(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_recv_at) >= CONNECTION_TIMEOUT
    }
}
