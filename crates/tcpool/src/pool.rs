//! Connection pool implementation.
//!
//! The pool owns two hand-off queues: `active` holds connections ready for
//! callers, `dead` holds connections waiting for the reconnection loop.
//! Every connection is always in exactly one queue, inside a reconnection
//! attempt, or held by a caller.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::connection::Connection;
use crate::error::PoolError;
use crate::lifecycle::ConnectionState;
use crate::notifier::{NotificationDispatcher, Notifier, PoolEvent};
use crate::queue::HandoffQueue;
use crate::reconnect;

/// Timeout value that makes [`Pool::get`] wait indefinitely.
pub const INFINITE: Duration = Duration::MAX;

/// Extra queue room beyond capacity for connections in transit.
const QUEUE_SLACK: usize = 2;

/// A fixed-size pool of TCP connections to one remote endpoint.
///
/// Construction returns immediately; members connect in the background and
/// failed members are reconnected until the pool is shut down. Cloning the
/// pool is cheap and yields another handle to the same connections. When
/// the last handle is dropped the pool shuts itself down.
///
/// # Example
///
/// ```rust,ignore
/// use tcpool::{Pool, PoolConfig, INFINITE};
///
/// let pool = Pool::builder()
///     .address("127.0.0.1:9998")
///     .capacity(4)
///     .build()?;
///
/// let conn = pool.get(INFINITE).await?;
/// // Use connection...
/// conn.close();
/// ```
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
    _handle: Arc<ShutdownOnDrop>,
}

pub(crate) struct PoolInner {
    /// Pool configuration.
    pub(crate) config: PoolConfig,

    /// Connected connections waiting for a caller.
    pub(crate) active: HandoffQueue<Connection>,

    /// Connections waiting to be (re)connected.
    pub(crate) dead: HandoffQueue<Connection>,

    /// Connections in the active queue or held by callers.
    connected: AtomicU32,

    /// Whether the pool is closed.
    closed: AtomicBool,

    /// Cancelled once on shutdown; wakes the reconnection loop and backoffs.
    pub(crate) shutdown_token: CancellationToken,

    notifications: NotificationDispatcher,

    /// When the pool was created.
    created_at: Instant,

    /// Pool metrics.
    metrics: Mutex<PoolMetricsInner>,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    /// Successful connects, including reconnects.
    connections_established: u64,
    /// Failed connect attempts.
    connect_failures: u64,
    /// Connections handed back unusable and queued for reconnection.
    reconnections_queued: u64,
    /// Total successful checkouts.
    checkouts_successful: u64,
    /// Total failed checkouts (timeouts).
    checkouts_failed: u64,
}

/// Shuts the pool down once the last user-facing handle goes away.
struct ShutdownOnDrop(Arc<PoolInner>);

impl Drop for ShutdownOnDrop {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

impl Pool {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Create a pool and start connecting its members in the background.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`PoolError::InvalidConfiguration`] if the capacity is below one.
    pub fn new(config: PoolConfig, notifier: Option<Arc<dyn Notifier>>) -> Result<Self, PoolError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PoolError::NoRuntime)?;

        let queue_len = config.capacity as usize + QUEUE_SLACK;
        let inner = Arc::new(PoolInner {
            config: config.clone(),
            active: HandoffQueue::new(queue_len),
            dead: HandoffQueue::new(queue_len),
            connected: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
            notifications: NotificationDispatcher::spawn(notifier),
            created_at: Instant::now(),
            metrics: Mutex::new(PoolMetricsInner::default()),
        });

        for id in 0..config.capacity {
            inner.park(Connection::new(u64::from(id), config.address.clone()));
        }

        runtime.spawn(reconnect::run(Arc::clone(&inner)));

        tracing::info!(
            capacity = config.capacity,
            address = %config.address,
            "connection pool created"
        );

        Ok(Self {
            _handle: Arc::new(ShutdownOnDrop(Arc::clone(&inner))),
            inner,
        })
    }

    /// Get a connection from the pool.
    ///
    /// Waits until a connected member is free or `timeout` elapses. Pass
    /// [`INFINITE`] to wait without a deadline.
    pub async fn get(&self, timeout: Duration) -> Result<PooledConnection, PoolError> {
        if self.inner.is_closed() {
            return Err(PoolError::PoolClosed);
        }

        tracing::trace!("acquiring connection from pool");

        let acquire = async {
            tokio::select! {
                conn = self.inner.active.pop() => conn.ok_or(PoolError::PoolClosed),
                () = self.inner.shutdown_token.cancelled() => Err(PoolError::PoolClosed),
            }
        };

        let result = if timeout == INFINITE {
            acquire.await
        } else {
            tokio::time::timeout(timeout, acquire)
                .await
                .unwrap_or_else(|_| Err(PoolError::AcquireTimeout(timeout)))
        };

        match result {
            Ok(conn) => {
                self.inner.metrics.lock().checkouts_successful += 1;
                Ok(PooledConnection::new(conn, Arc::clone(&self.inner)))
            }
            Err(e) => {
                self.inner.metrics.lock().checkouts_failed += 1;
                if matches!(e, PoolError::AcquireTimeout(_)) {
                    tracing::warn!(?timeout, "timed out trying to get connection from the pool");
                }
                Err(e)
            }
        }
    }

    /// Try to get a connection without waiting.
    ///
    /// Returns `None` if no connected member is free right now.
    pub fn try_get(&self) -> Result<Option<PooledConnection>, PoolError> {
        if self.inner.is_closed() {
            return Err(PoolError::PoolClosed);
        }

        Ok(self.inner.active.try_pop().map(|conn| {
            self.inner.metrics.lock().checkouts_successful += 1;
            PooledConnection::new(conn, Arc::clone(&self.inner))
        }))
    }

    /// Whether at least one member is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected_count() > 0
    }

    /// Shut the pool down.
    ///
    /// Idempotent. Idle connections are closed immediately; connections held
    /// by callers are closed when released; no connection is handed out
    /// afterwards.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Get the current pool status.
    ///
    /// Each figure is read independently, so the snapshot is approximate
    /// while connections are moving.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let connected = self.inner.connected_count();
        let available = saturating_u32(self.inner.active.len());
        PoolStatus {
            available,
            in_use: connected.saturating_sub(available),
            connected,
            dead: saturating_u32(self.inner.dead.len()),
            capacity: self.inner.config.capacity,
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            connections_established: inner.connections_established,
            connect_failures: inner.connect_failures,
            reconnections_queued: inner.reconnections_queued,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("address", &self.inner.config.address)
            .field("capacity", &self.inner.config.capacity)
            .field("connected", &self.inner.connected_count())
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

impl PoolInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn connected_count(&self) -> u32 {
        self.connected.load(Ordering::Acquire)
    }

    /// Decrement the connected count, returning the new value.
    fn release_count(&self) -> u32 {
        let previous = self
            .connected
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or_else(|n| n);
        previous.saturating_sub(1)
    }

    /// Hand a released connection back.
    pub(crate) fn put(&self, mut conn: Connection) {
        if self.is_closed() {
            conn.shutdown();
            self.release_count();
            self.park(conn);
            return;
        }

        if !conn.is_usable() {
            self.queue_for_reconnection(conn);
            return;
        }

        if let Err(conn) = self.active.push(conn) {
            tracing::error!(
                connection_id = conn.id(),
                "active queue full, queueing connection for reconnection"
            );
            self.queue_for_reconnection(conn);
            return;
        }

        if self.is_closed() {
            self.drain_active();
        }
    }

    /// Put a failed connection on the dead queue so it gets reconnected.
    pub(crate) fn queue_for_reconnection(&self, mut conn: Connection) {
        let remaining = self.release_count();
        tracing::info!(
            connection_id = conn.id(),
            remote = %conn.remote(),
            local = ?conn.local_id(),
            "requeuing connection for reconnection because it disconnected"
        );

        conn.shutdown();
        conn.set_state(ConnectionState::Failed);
        self.metrics.lock().reconnections_queued += 1;
        self.park(conn);

        self.notifications.dispatch(PoolEvent::Disconnect);
        if remaining < 1 {
            tracing::warn!(address = %self.config.address, "no connected members left in pool");
            self.notifications.dispatch(PoolEvent::PoolEmpty);
        }
    }

    /// Move a freshly connected member onto the active queue.
    pub(crate) fn activate(&self, mut conn: Connection) {
        conn.set_read_timeout(self.config.read_timeout);
        let id = conn.id();

        let previous = self.connected.fetch_add(1, Ordering::AcqRel);
        if let Err(mut conn) = self.active.push(conn) {
            tracing::error!(connection_id = id, "active queue full, discarding connection");
            conn.shutdown();
            self.release_count();
            self.park(conn);
            return;
        }

        self.metrics.lock().connections_established += 1;
        tracing::info!(
            connection_id = id,
            address = %self.config.address,
            "successfully connected"
        );

        if previous == 0 {
            self.notifications.dispatch(PoolEvent::Connected);
        }

        if self.is_closed() {
            self.drain_active();
        }
    }

    pub(crate) fn record_connect_failure(&self) {
        self.metrics.lock().connect_failures += 1;
    }

    /// Store a connection on the dead queue.
    pub(crate) fn park(&self, conn: Connection) {
        if let Err(conn) = self.dead.push(conn) {
            tracing::error!(
                connection_id = conn.id(),
                "dead queue full, dropping connection"
            );
        }
    }

    pub(crate) fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shutdown_token.cancel();
        let drained = self.drain_active();

        tracing::info!(
            address = %self.config.address,
            drained,
            "connection pool closed"
        );
    }

    /// Close every idle connection and park it on the dead queue.
    fn drain_active(&self) -> usize {
        let mut drained = 0;
        while let Some(mut conn) = self.active.try_pop() {
            conn.shutdown();
            self.release_count();
            self.park(conn);
            drained += 1;
        }
        drained
    }
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder()
///     .address("127.0.0.1:9998")
///     .capacity(3)
///     .notifier(|event| println!("pool event: {event}"))
///     .build()?;
/// ```
pub struct PoolBuilder {
    pool_config: PoolConfig,
    notifier: Option<Arc<dyn Notifier>>,
}

impl PoolBuilder {
    /// Create a new pool builder with default settings.
    pub fn new() -> Self {
        Self {
            pool_config: PoolConfig::default(),
            notifier: None,
        }
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the remote address.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.pool_config.address = address.into();
        self
    }

    /// Set the number of pooled connections.
    #[must_use]
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.pool_config.capacity = capacity;
        self
    }

    /// Set the steady-state read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.read_timeout = timeout;
        self
    }

    /// Set the per-attempt connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.connect_timeout = timeout;
        self
    }

    /// Set the backoff between failed connect attempts.
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.pool_config.reconnect_delay = delay;
        self
    }

    /// Receive pool lifecycle events.
    #[must_use]
    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    /// Build the pool.
    pub fn build(self) -> Result<Pool, PoolError> {
        Pool::new(self.pool_config, self.notifier)
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Connected members waiting in the active queue.
    pub available: u32,
    /// Connected members currently held by callers.
    pub in_use: u32,
    /// Connected members, available or in use.
    pub connected: u32,
    /// Members waiting on the dead queue.
    pub dead: u32,
    /// Configured pool size.
    pub capacity: u32,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.capacity as f64) * 100.0
    }

    /// Check if every member is connected.
    #[must_use]
    pub fn is_fully_connected(&self) -> bool {
        self.connected >= self.capacity
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Successful connects since pool start, including reconnects.
    pub connections_established: u64,
    /// Failed connect attempts.
    pub connect_failures: u64,
    /// Connections released unusable and queued for reconnection.
    pub reconnections_queued: u64,
    /// Successful connection checkouts.
    pub checkouts_successful: u64,
    /// Failed connection checkouts (timeouts, pool closed).
    pub checkouts_failed: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Calculate connect attempt success rate (0.0 to 1.0).
    #[must_use]
    pub fn connect_success_rate(&self) -> f64 {
        let total = self.connections_established + self.connect_failures;
        if total == 0 {
            return 1.0;
        }
        self.connections_established as f64 / total as f64
    }
}

/// A connection checked out of the pool.
///
/// Dereferences to [`Connection`]. Call [`close`](Self::close) or drop it to
/// hand it back: usable connections return to the active queue, failed
/// ones are queued for reconnection.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    fn new(conn: Connection, pool: Arc<PoolInner>) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }

    /// Release the connection back to the pool.
    pub fn close(self) {
        drop(self);
    }
}

// `conn` is only taken in `Drop`, so it is always present while borrowed.
#[allow(clippy::expect_used)]
impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("connection already returned to pool")
    }
}

#[allow(clippy::expect_used)]
impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .expect("connection already returned to pool")
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::trace!(
                connection_id = conn.id(),
                usable = conn.is_usable(),
                "returning connection to pool"
            );
            self.pool.put(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_pool_status_utilization() {
        let status = PoolStatus {
            available: 1,
            in_use: 2,
            connected: 3,
            dead: 1,
            capacity: 4,
        };
        assert!((status.utilization() - 50.0).abs() < f64::EPSILON);
        assert!(!status.is_fully_connected());
    }

    #[test]
    fn test_pool_metrics_success_rates() {
        let metrics = PoolMetrics {
            connections_established: 3,
            connect_failures: 1,
            reconnections_queued: 2,
            checkouts_successful: 90,
            checkouts_failed: 10,
            uptime: Duration::from_secs(3600),
        };

        assert!((metrics.checkout_success_rate() - 0.9).abs() < f64::EPSILON);
        assert!((metrics.connect_success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_builder_default() {
        let builder = PoolBuilder::new();
        assert_eq!(builder.pool_config.capacity, 1);
        assert!(builder.notifier.is_none());
    }

    #[test]
    fn test_builder_fluent() {
        let builder = Pool::builder()
            .address("127.0.0.1:7000")
            .capacity(5)
            .reconnect_delay(Duration::from_millis(100))
            .notifier(|_event: PoolEvent| {});

        assert_eq!(builder.pool_config.address, "127.0.0.1:7000");
        assert_eq!(builder.pool_config.capacity, 5);
        assert_eq!(
            builder.pool_config.reconnect_delay,
            Duration::from_millis(100)
        );
        assert!(builder.notifier.is_some());
    }

    #[test]
    fn test_new_outside_runtime() {
        let err = Pool::new(PoolConfig::default(), None).unwrap_err();
        assert!(matches!(err, PoolError::NoRuntime));
    }

    #[tokio::test]
    async fn test_zero_capacity_rejected() {
        let err = Pool::builder().capacity(0).build().unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_new_seeds_dead_queue() {
        let pool = Pool::builder()
            .address("127.0.0.1:1")
            .capacity(3)
            .build()
            .unwrap();

        let status = pool.status();
        assert_eq!(status.capacity, 3);
        assert_eq!(status.connected, 0);
        assert!(!pool.is_connected());
        assert_eq!(pool.inner.active.capacity(), 3 + QUEUE_SLACK);
        pool.shutdown();
    }

    #[test]
    fn test_saturating_u32() {
        assert_eq!(saturating_u32(7), 7);
        assert_eq!(saturating_u32(usize::MAX), u32::MAX);
    }

    #[tokio::test]
    async fn test_pooled_connection_returns_once_on_drop() {
        let pool = Pool::builder()
            .address("127.0.0.1:1")
            .capacity(1)
            .build()
            .unwrap();
        pool.shutdown();

        let before = pool.inner.dead.len();
        let pooled = PooledConnection::new(
            Connection::new(7, "127.0.0.1:1".to_string()),
            Arc::clone(&pool.inner),
        );
        assert_eq!(pooled.id(), 7);
        pooled.close();

        assert_eq!(pool.inner.dead.len(), before + 1);
        assert_eq!(pool.status().connected, 0);
    }
}
