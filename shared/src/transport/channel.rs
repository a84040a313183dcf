//! Per-connection reliable ordered channel.
//!
//! Outgoing payloads get increasing sequence numbers and stay in flight until
//! acknowledged. Incoming payloads are acked individually, buffered when they
//! arrive early and released strictly in sequence order.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Payloads further than this ahead of the next expected sequence are dropped
/// unacked so the sender retries them later.
pub const MAX_REORDER_WINDOW: u32 = 256;

#[derive(Debug)]
struct InFlight {
    payload: Vec<u8>,
    last_sent: Instant,
    attempts: u32,
}

/// What to do with a received reliable payload.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Received {
    /// Whether the sender should get an ack for this sequence.
    pub ack: bool,
    /// Payloads now deliverable, in order.
    pub delivered: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct ReliableChannel {
    next_send: u32,
    in_flight: BTreeMap<u32, InFlight>,
    next_expected: u32,
    reorder: BTreeMap<u32, Vec<u8>>,
}

impl ReliableChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a payload for delivery and returns its sequence number.
    pub fn push(&mut self, payload: Vec<u8>, now: Instant) -> u32 {
        let sequence = self.next_send;
        self.next_send = self.next_send.wrapping_add(1);
        self.in_flight.insert(
            sequence,
            InFlight {
                payload,
                last_sent: now,
                attempts: 1,
            },
        );
        sequence
    }

    /// Unacked payload for `sequence`, if still in flight.
    pub fn payload(&self, sequence: u32) -> Option<&[u8]> {
        self.in_flight.get(&sequence).map(|f| f.payload.as_slice())
    }

    /// Stops resending `sequence`. False if it was not in flight.
    pub fn acknowledge(&mut self, sequence: u32) -> bool {
        self.in_flight.remove(&sequence).is_some()
    }

    /// Sent but unacknowledged payloads.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Payloads whose last send is older than `interval`, marked as resent.
    pub fn due_resends(&mut self, now: Instant, interval: Duration) -> Vec<(u32, Vec<u8>)> {
        self.in_flight
            .iter_mut()
            .filter(|(_, f)| now.saturating_duration_since(f.last_sent) >= interval)
            .map(|(&sequence, f)| {
                f.last_sent = now;
                f.attempts += 1;
                (sequence, f.payload.clone())
            })
            .collect()
    }

    /// True once any payload has been sent more than `max_attempts` times.
    pub fn exhausted(&self, max_attempts: u32) -> bool {
        self.in_flight.values().any(|f| f.attempts > max_attempts)
    }

    /// Buffers out-of-order arrivals and releases whatever is now contiguous.
    pub fn receive(&mut self, sequence: u32, payload: &[u8]) -> Received {
        let offset = sequence.wrapping_sub(self.next_expected);

        // Already delivered: ack again so the sender stops resending.
        if offset > u32::MAX / 2 {
            return Received {
                ack: true,
                delivered: Vec::new(),
            };
        }
        if offset >= MAX_REORDER_WINDOW {
            return Received::default();
        }

        self.reorder.entry(sequence).or_insert_with(|| payload.to_vec());

        let mut delivered = Vec::new();
        while let Some(next) = self.reorder.remove(&self.next_expected) {
            delivered.push(next);
            self.next_expected = self.next_expected.wrapping_add(1);
        }
        Received {
            ack: true,
            delivered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_delivery() {
        let mut channel = ReliableChannel::new();
        let r = channel.receive(0, b"a");
        assert!(r.ack);
        assert_eq!(r.delivered, vec![b"a".to_vec()]);
        assert_eq!(channel.receive(1, b"b").delivered, vec![b"b".to_vec()]);
    }

    #[test]
    fn test_out_of_order_is_buffered() {
        let mut channel = ReliableChannel::new();
        assert!(channel.receive(2, b"c").delivered.is_empty());
        assert!(channel.receive(1, b"b").delivered.is_empty());
        assert_eq!(
            channel.receive(0, b"a").delivered,
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn test_duplicates_are_acked_not_delivered() {
        let mut channel = ReliableChannel::new();
        channel.receive(0, b"a");
        let again = channel.receive(0, b"a");
        assert!(again.ack);
        assert!(again.delivered.is_empty());

        channel.receive(2, b"c");
        let buffered_again = channel.receive(2, b"c");
        assert!(buffered_again.ack);
        assert!(buffered_again.delivered.is_empty());
    }

    #[test]
    fn test_far_ahead_is_dropped() {
        let mut channel = ReliableChannel::new();
        let r = channel.receive(MAX_REORDER_WINDOW + 5, b"x");
        assert!(!r.ack);
        assert!(r.delivered.is_empty());
    }

    #[test]
    fn test_resend_until_acked() {
        let mut channel = ReliableChannel::new();
        let start = Instant::now();
        let seq = channel.push(b"hello".to_vec(), start);
        assert_eq!(seq, 0);
        assert_eq!(channel.push(b"world".to_vec(), start), 1);

        let interval = Duration::from_millis(100);
        assert!(channel.due_resends(start, interval).is_empty());

        let later = start + interval;
        let resends = channel.due_resends(later, interval);
        assert_eq!(resends.len(), 2);
        assert_eq!(resends[0], (0, b"hello".to_vec()));

        assert!(channel.acknowledge(0));
        assert!(!channel.acknowledge(0));
        assert_eq!(channel.in_flight(), 1);
        assert_eq!(channel.payload(1), Some(&b"world"[..]));
    }

    #[test]
    fn test_exhaustion() {
        let mut channel = ReliableChannel::new();
        let start = Instant::now();
        channel.push(vec![1], start);
        let interval = Duration::from_millis(10);
        for i in 1..=3 {
            channel.due_resends(start + interval * i, interval);
        }
        assert!(channel.exhausted(3));
        assert!(!channel.exhausted(4));
    }
}
