//! A single physical connection to the remote endpoint.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpSocket, TcpStream, lookup_host};

use crate::error::ConnectionError;
use crate::lifecycle::{ConnectionMetadata, ConnectionState};

/// One TCP connection owned by the pool.
///
/// Exactly one party holds a `Connection` at any time: a pool queue, a
/// reconnection attempt, or the caller that acquired it. Callers normally
/// see it through a [`PooledConnection`](crate::PooledConnection), whose
/// `close()` hands it back to the pool; [`shutdown`](Self::shutdown) is the
/// pool's way of destroying the socket.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    remote: String,
    local_id: Option<String>,
    usable: bool,
    read_timeout: Duration,
    state: ConnectionState,
    metadata: ConnectionMetadata,
    stream: Option<BufReader<TcpStream>>,
}

impl Connection {
    /// Create an unconnected connection for pool slot `id`.
    #[must_use]
    pub fn new(id: u64, remote: impl Into<String>) -> Self {
        Self {
            id,
            remote: remote.into(),
            local_id: None,
            usable: false,
            read_timeout: Duration::ZERO,
            state: ConnectionState::Unconnected,
            metadata: ConnectionMetadata::new(id),
            stream: None,
        }
    }

    /// Dial `endpoint`, bounded by `connect_timeout`.
    ///
    /// On failure the connection stays unusable.
    pub async fn connect(
        &mut self,
        endpoint: &str,
        connect_timeout: Duration,
        keep_alive: bool,
    ) -> Result<(), ConnectionError> {
        self.metadata.record_attempt();
        self.state = ConnectionState::Connecting;
        self.usable = false;
        self.stream = None;

        let dialed = tokio::time::timeout(connect_timeout, dial(endpoint, keep_alive)).await;
        let stream = match dialed {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.state = ConnectionState::Failed;
                return Err(e);
            }
            Err(_) => {
                self.state = ConnectionState::Failed;
                return Err(ConnectionError::ConnectTimeout {
                    endpoint: endpoint.to_string(),
                    timeout: connect_timeout,
                });
            }
        };

        self.local_id = stream.local_addr().ok().map(|addr| addr.to_string());
        self.remote = endpoint.to_string();
        self.stream = Some(BufReader::new(stream));
        self.usable = true;
        self.state = ConnectionState::Active;
        self.metadata.record_connected();

        tracing::debug!(
            connection_id = self.id,
            local = ?self.local_id,
            remote = %self.remote,
            "connection established"
        );
        Ok(())
    }

    /// Read whatever is available into `buf`.
    ///
    /// Applies the configured read timeout if it is non-zero. A timeout
    /// leaves the connection usable; end of stream does not.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        let read_timeout = self.read_timeout;
        let stream = self.usable_stream()?;

        let result = with_deadline(read_timeout, stream.read(buf)).await;
        match result {
            Ok(0) if !buf.is_empty() => {
                self.mark_unusable();
                Err(ConnectionError::EndOfStream)
            }
            Ok(n) => Ok(n),
            Err(e) => Err(self.settle(e)),
        }
    }

    /// Write all of `data`, looping until every byte is flushed.
    pub async fn send_data(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        let stream = self.usable_stream()?;

        let result = async {
            let mut written = 0;
            while written < data.len() {
                let n = stream.write(&data[written..]).await?;
                if n == 0 {
                    return Err(io::Error::from(io::ErrorKind::WriteZero));
                }
                written += n;
            }
            stream.flush().await
        }
        .await;

        result.map_err(|e| self.settle(e.into()))
    }

    /// Read exactly `size` bytes.
    ///
    /// `timeout` bounds this call and takes precedence over the connection's
    /// read timeout; `None` falls back to the read timeout. A timeout marks the
    /// connection unusable since a partial read leaves the stream mid-message.
    pub async fn read_data(
        &mut self,
        size: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, ConnectionError> {
        let deadline = timeout.unwrap_or(self.read_timeout);
        let stream = self.usable_stream()?;

        let mut buf = vec![0u8; size];
        let result = with_deadline(deadline, stream.read_exact(&mut buf)).await;
        match result {
            Ok(_) => Ok(buf),
            Err(ConnectionError::IoTimeout) => {
                self.mark_unusable();
                Err(ConnectionError::IoTimeout)
            }
            Err(e) => Err(self.settle(e)),
        }
    }

    /// Close the socket. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.stream.take().is_some() {
            tracing::trace!(connection_id = self.id, "socket closed");
        }
        self.usable = false;
        self.state = ConnectionState::Terminated;
    }

    /// Flag the connection as failed so the pool reconnects it on release.
    pub fn mark_unusable(&mut self) {
        self.usable = false;
        self.state = ConnectionState::Failed;
    }

    /// Pool slot id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote endpoint.
    #[must_use]
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Local socket address of the current connection, once connected.
    #[must_use]
    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    /// Whether the connection is open and has not failed.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    /// Read timeout applied to reads (zero means none).
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connection bookkeeping.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.metadata
    }

    pub(crate) fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    fn usable_stream(&mut self) -> Result<&mut BufReader<TcpStream>, ConnectionError> {
        if !self.usable {
            return Err(ConnectionError::Unusable);
        }
        self.stream.as_mut().ok_or(ConnectionError::Unusable)
    }

    /// Normalize an I/O failure and update the usable flag accordingly.
    fn settle(&mut self, err: ConnectionError) -> ConnectionError {
        let io_err = match err {
            ConnectionError::Io(io_err) => io_err,
            other => return other,
        };

        match io_err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectionError::IoTimeout,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::WriteZero => {
                self.mark_unusable();
                ConnectionError::EndOfStream
            }
            _ => {
                self.mark_unusable();
                ConnectionError::Io(io_err)
            }
        }
    }
}

async fn dial(endpoint: &str, keep_alive: bool) -> Result<TcpStream, ConnectionError> {
    let mut last_err = None;

    for addr in lookup_host(endpoint).await? {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(keep_alive)?;

        match socket.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.map_or_else(
        || ConnectionError::Resolve(endpoint.to_string()),
        ConnectionError::Io,
    ))
}

async fn with_deadline<F, T>(timeout: Duration, fut: F) -> Result<T, ConnectionError>
where
    F: Future<Output = io::Result<T>>,
{
    if timeout.is_zero() {
        return fut.await.map_err(ConnectionError::from);
    }
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(ConnectionError::from),
        Err(_) => Err(ConnectionError::IoTimeout),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut conn = Connection::new(0, addr.clone());
        let (connected, accepted) = tokio::join!(
            conn.connect(&addr, Duration::from_secs(1), true),
            listener.accept()
        );
        connected.unwrap();
        (conn, accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_connect_sets_identity() {
        let (conn, peer) = connected_pair().await;

        assert!(conn.is_usable());
        assert_eq!(conn.state(), ConnectionState::Active);
        assert_eq!(
            conn.local_id().unwrap(),
            peer.peer_addr().unwrap().to_string()
        );
        assert_eq!(conn.metadata().connect_attempts, 1);
    }

    #[tokio::test]
    async fn test_connect_failure_stays_unusable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut conn = Connection::new(0, addr.clone());
        let err = conn
            .connect(&addr, Duration::from_secs(1), true)
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(!conn.is_usable());
        assert_eq!(conn.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_send_and_read_data() {
        let (mut conn, mut peer) = connected_pair().await;

        conn.send_data(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        peer.write_all(b"abcdef").await.unwrap();
        let first = conn.read_data(2, None).await.unwrap();
        let rest = conn.read_data(4, None).await.unwrap();
        assert_eq!(first, b"ab");
        assert_eq!(rest, b"cdef");
    }

    #[tokio::test]
    async fn test_read_end_of_stream_marks_unusable() {
        let (mut conn, peer) = connected_pair().await;
        drop(peer);

        let mut buf = [0u8; 8];
        let err = conn.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, ConnectionError::EndOfStream));
        assert!(!conn.is_usable());

        let err = conn.send_data(b"x").await.unwrap_err();
        assert!(matches!(err, ConnectionError::Unusable));
    }

    #[tokio::test]
    async fn test_read_data_short_stream() {
        let (mut conn, mut peer) = connected_pair().await;
        peer.write_all(b"ab").await.unwrap();
        drop(peer);

        let err = conn.read_data(4, None).await.unwrap_err();
        assert!(matches!(err, ConnectionError::EndOfStream));
        assert!(!conn.is_usable());
    }

    #[tokio::test]
    async fn test_read_timeout_keeps_connection_usable() {
        let (mut conn, _peer) = connected_pair().await;
        conn.set_read_timeout(Duration::from_millis(50));

        let mut buf = [0u8; 4];
        let err = conn.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, ConnectionError::IoTimeout));
        assert!(conn.is_usable());
    }

    #[tokio::test]
    async fn test_read_data_call_timeout_overrides_read_timeout() {
        let (mut conn, _peer) = connected_pair().await;
        conn.set_read_timeout(Duration::from_secs(30));

        let start = std::time::Instant::now();
        let err = conn
            .read_data(4, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::IoTimeout));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_read_data_partial_timeout_marks_unusable() {
        let (mut conn, mut peer) = connected_pair().await;
        peer.write_all(b"ab").await.unwrap();

        let err = conn
            .read_data(4, Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::IoTimeout));
        assert!(!conn.is_usable());
        assert_eq!(conn.state(), ConnectionState::Failed);

        peer.write_all(b"cdXYZW").await.unwrap();
        let err = conn.read_data(4, None).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Unusable));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (mut conn, _peer) = connected_pair().await;

        conn.shutdown();
        conn.shutdown();

        assert!(!conn.is_usable());
        assert_eq!(conn.state(), ConnectionState::Terminated);
        let err = conn.read_data(1, None).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Unusable));
    }
}
