//! Connection lifecycle tracking.
//!
//! A pooled connection cycles through
//! `Unconnected -> Connecting -> Active -> Failed -> Connecting -> ...`
//! until the pool shuts it down for good.

use std::time::Instant;

/// Where a pooled connection currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Allocated but never dialed.
    #[default]
    Unconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Connected and usable.
    Active,
    /// Observed a failure; waiting on the dead queue for reconnection.
    Failed,
    /// Socket closed by the pool.
    Terminated,
}

impl ConnectionState {
    /// Whether the state carries an open socket.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Bookkeeping kept alongside each pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Pool slot the connection occupies.
    pub id: u64,
    /// When the slot was allocated.
    pub created_at: Instant,
    /// Last successful connect.
    pub last_connected_at: Option<Instant>,
    /// Total connect attempts, successful or not.
    pub connect_attempts: u64,
    /// Successful connects after the first one.
    pub reconnects: u64,
}

impl ConnectionMetadata {
    /// Create metadata for a fresh slot.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            last_connected_at: None,
            connect_attempts: 0,
            reconnects: 0,
        }
    }

    pub(crate) fn record_attempt(&mut self) {
        self.connect_attempts += 1;
    }

    pub(crate) fn record_connected(&mut self) {
        if self.last_connected_at.is_some() {
            self.reconnects += 1;
        }
        self.last_connected_at = Some(Instant::now());
    }
}
