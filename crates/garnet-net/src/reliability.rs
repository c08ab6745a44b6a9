//! Round-trip-time estimation and the retransmission engine.

use log::{debug, trace};
use std::time::Instant;

use crate::peer::{Peer, QueuedPacket};
use crate::protocol::{GOOD_RTT_LIMIT, HEADER_LEN, PACKET_LOST_TIMEOUT};

const RTT_GAIN_DIVISOR: u32 = 10;

/// Folds the acknowledged packet's round trip into the peer's smoothed
/// estimate and refreshes the good-rtt verdict.
///
/// The estimate moves a tenth of the distance toward each sample, in either
/// direction. Does nothing when the acknowledged sequence has already been
/// evicted from the history.
pub(crate) fn update_rtt(peer: &mut Peer, ack: u32, now: Instant) {
    let Some(record) = peer.sent_history.iter().find(|p| p.sequence == ack) else {
        return;
    };
    let sample = now.saturating_duration_since(record.sent_at);
    peer.rtt = if sample > peer.rtt {
        peer.rtt + (sample - peer.rtt) / RTT_GAIN_DIVISOR
    } else {
        peer.rtt - (peer.rtt - sample) / RTT_GAIN_DIVISOR
    };
    peer.good_rtt = peer.rtt <= GOOD_RTT_LIMIT;
    trace!("({ack}) rtt is now {:?}", peer.rtt);
}

/// Scans a received acknowledgement bitfield for packets the remote side has
/// still not seen and re-queues the payload of each one that has been
/// outstanding past the lost-packet timeout.
///
/// Walks all 32 bit positions from the MSB, pairing position `k` with
/// sequence `ack - 1 - k`. Ack-exempt records and records already re-queued
/// once are skipped; re-queued payloads carry the resending flag and have
/// the stored header stripped.
pub(crate) fn requeue_timed_out(peer: &mut Peer, ack: u32, bitfield: u32, now: Instant) {
    let mut seq = ack;
    let mut bits = bitfield;
    let mut lost = Vec::new();

    for _ in 0..32 {
        seq = seq.wrapping_sub(1);
        let confirmed = bits & 0x8000_0000 != 0;
        bits <<= 1;
        if confirmed {
            continue;
        }
        let Some(record) = peer.sent_history.iter_mut().find(|p| p.sequence == seq) else {
            continue;
        };
        if record.ack_exempt || record.retried {
            continue;
        }
        if now.saturating_duration_since(record.sent_at) < PACKET_LOST_TIMEOUT {
            continue;
        }
        if let Some(datagram) = record.datagram.as_ref() {
            debug!("packet {seq} timed out, queueing for resend");
            lost.push(datagram.slice(HEADER_LEN..));
            record.retried = true;
        }
    }

    for payload in lost {
        peer.enqueue(QueuedPacket {
            payload,
            resending: true,
            ack_exempt: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, Bytes, BytesMut};
    use std::time::Duration;

    fn peer_with_sent(entries: &[(u32, Option<&'static [u8]>, Duration)], now: Instant) -> Peer {
        let mut peer = Peer::new(1, 0, 12_084);
        for &(sequence, payload, age) in entries.iter().rev() {
            let datagram = payload.map(|p| {
                let mut buf = BytesMut::with_capacity(HEADER_LEN + p.len());
                buf.put_bytes(0, HEADER_LEN);
                buf.put_slice(p);
                buf.freeze()
            });
            peer.record_sent(sequence, datagram.clone(), datagram.is_none(), now - age);
        }
        peer
    }

    #[test]
    fn test_rtt_moves_a_tenth_toward_each_sample() {
        let now = Instant::now();
        let mut peer = peer_with_sent(&[(3, Some(b"x"), Duration::from_millis(100))], now);
        update_rtt(&mut peer, 3, now);
        assert_eq!(peer.rtt, Duration::from_millis(10));
        assert!(peer.good_rtt);

        // A lower sample pulls the estimate back down by a tenth of the gap.
        peer.rtt = Duration::from_millis(500);
        peer.good_rtt = false;
        update_rtt(&mut peer, 3, now);
        assert_eq!(peer.rtt, Duration::from_millis(460));
        assert!(!peer.good_rtt);
    }

    #[test]
    fn test_rtt_good_verdict_at_threshold() {
        let now = Instant::now();
        let mut peer = peer_with_sent(&[(1, Some(b"x"), Duration::from_millis(250))], now);
        peer.rtt = Duration::from_millis(250);
        update_rtt(&mut peer, 1, now);
        assert_eq!(peer.rtt, Duration::from_millis(250));
        assert!(peer.good_rtt);
    }

    #[test]
    fn test_rtt_ignores_evicted_sequences() {
        let now = Instant::now();
        let mut peer = peer_with_sent(&[(1, Some(b"x"), Duration::from_millis(100))], now);
        peer.rtt = Duration::from_millis(42);
        update_rtt(&mut peer, 999, now);
        assert_eq!(peer.rtt, Duration::from_millis(42));
    }

    #[test]
    fn test_timed_out_packet_is_requeued_with_header_stripped() {
        let now = Instant::now();
        let mut peer = peer_with_sent(&[(9, Some(b"lost payload"), Duration::from_millis(1500))], now);

        // Ack 10 with an empty bitfield: sequence 9 is unconfirmed.
        requeue_timed_out(&mut peer, 10, 0, now);
        assert_eq!(peer.send_queue.len(), 1);
        let queued = peer.next_outgoing();
        assert_eq!(queued.payload.as_ref(), b"lost payload");
        assert!(queued.resending);
        assert!(!queued.ack_exempt);
    }

    #[test]
    fn test_requeue_happens_at_most_once() {
        let now = Instant::now();
        let mut peer = peer_with_sent(&[(9, Some(b"lost"), Duration::from_millis(1500))], now);

        requeue_timed_out(&mut peer, 10, 0, now);
        requeue_timed_out(&mut peer, 10, 0, now);
        requeue_timed_out(&mut peer, 10, 0, now + Duration::from_secs(5));
        assert_eq!(peer.send_queue.len(), 1);
    }

    #[test]
    fn test_confirmed_bits_are_skipped() {
        let now = Instant::now();
        let mut peer = peer_with_sent(&[(9, Some(b"acked"), Duration::from_millis(1500))], now);

        // MSB set: sequence 9 (ack - 1) was received by the remote side.
        requeue_timed_out(&mut peer, 10, 0x8000_0000, now);
        assert!(peer.send_queue.is_empty());
    }

    #[test]
    fn test_exempt_and_fresh_packets_are_not_requeued() {
        let now = Instant::now();
        let mut peer = peer_with_sent(
            &[
                (9, None, Duration::from_millis(1500)),
                (8, Some(b"fresh"), Duration::from_millis(100)),
            ],
            now,
        );

        requeue_timed_out(&mut peer, 10, 0, now);
        assert!(peer.send_queue.is_empty());
    }

    #[test]
    fn test_scan_covers_the_full_window() {
        let now = Instant::now();
        // The oldest sequence the bitfield can name: ack - 32.
        let mut peer = peer_with_sent(&[(0, Some(b"tail"), Duration::from_millis(2000))], now);

        requeue_timed_out(&mut peer, 32, 0, now);
        assert_eq!(peer.send_queue.len(), 1);
        assert_eq!(peer.next_outgoing().payload.as_ref(), b"tail");
    }

    #[test]
    fn test_requeued_payloads_keep_queue_order() {
        let now = Instant::now();
        let mut peer = peer_with_sent(
            &[
                (9, Some(b"nine"), Duration::from_millis(1500)),
                (8, Some(b"eight"), Duration::from_millis(1500)),
            ],
            now,
        );
        peer.enqueue(QueuedPacket {
            payload: Bytes::from_static(b"queued first"),
            resending: false,
            ack_exempt: false,
        });

        requeue_timed_out(&mut peer, 10, 0, now);
        assert_eq!(peer.next_outgoing().payload.as_ref(), b"queued first");
        assert_eq!(peer.next_outgoing().payload.as_ref(), b"nine");
        assert_eq!(peer.next_outgoing().payload.as_ref(), b"eight");
    }
}
