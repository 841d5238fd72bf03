//! Per-session fan-out with bounded buffering.
//!
//! Uses a tokio broadcast channel: one send reaches every subscriber and
//! never waits on any of them. Each participant's receiver buffers up to
//! `capacity` messages; a receiver that falls further behind sees
//! `RecvError::Lagged` and resynchronizes from a fresh snapshot instead of
//! slowing the session down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::protocol::ServerMessage;

/// Shared broadcast payload.
pub type Outbound = Arc<ServerMessage>;

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    /// Sends that found no subscriber.
    pub messages_dropped: u64,
    /// Messages skipped by lagging receivers.
    pub messages_lagged: u64,
    pub subscribers: usize,
}

/// Lock-free counters; read through [`BroadcastGroup::stats`].
#[derive(Default)]
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
    messages_lagged: AtomicU64,
}

/// Broadcast group for one game session.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Outbound>,
    capacity: usize,
    atomic_stats: AtomicBroadcastStats,
}

impl BroadcastGroup {
    /// `capacity` is the per-receiver buffer before lagging starts.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            atomic_stats: AtomicBroadcastStats::default(),
        }
    }

    /// New receiver. Sees only messages sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.sender.subscribe()
    }

    /// Send to every current subscriber, sender included.
    ///
    /// Returns the number of receivers the message was queued for.
    pub fn broadcast(&self, msg: ServerMessage) -> usize {
        self.broadcast_shared(Arc::new(msg))
    }

    /// Send an already shared message.
    pub fn broadcast_shared(&self, msg: Outbound) -> usize {
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(msg) {
            Ok(count) => count,
            Err(_) => {
                self.atomic_stats
                    .messages_dropped
                    .fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Record that a receiver skipped `skipped` messages.
    pub fn record_lag(&self, skipped: u64) {
        self.atomic_stats
            .messages_lagged
            .fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            messages_lagged: self.atomic_stats.messages_lagged.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }
}
