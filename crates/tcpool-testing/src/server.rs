//! Loopback TCP servers.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tcpool_frame::FrameStream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// How the server answers each accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    /// Write back every byte received.
    Echo,
    /// Answer each length-prefixed frame with a frame carrying the same payload.
    Framed,
    /// Accept and read, never reply.
    Silent,
}

/// A TCP server on `127.0.0.1` that runs until dropped.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    peers: Arc<Mutex<HashMap<SocketAddr, CancellationToken>>>,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Bind an ephemeral port and start accepting.
    pub async fn start(mode: ServerMode) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let server = Self {
            addr,
            accepted: Arc::new(AtomicUsize::new(0)),
            peers: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        };

        tokio::spawn(accept_loop(
            listener,
            mode,
            Arc::clone(&server.accepted),
            Arc::clone(&server.peers),
            server.shutdown.clone(),
        ));

        tracing::debug!(%addr, ?mode, "test server listening");
        Ok(server)
    }

    /// Bound socket address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound address as `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Connections accepted so far.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::Acquire)
    }

    /// Connections currently open on the server side.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.peers.lock().len()
    }

    /// Close the server side of the connection whose client end is `peer`.
    ///
    /// Returns `false` if no such connection is open.
    pub fn close_peer(&self, peer: SocketAddr) -> bool {
        match self.peers.lock().remove(&peer) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Close every open connection while continuing to accept new ones.
    pub fn close_all(&self) {
        for (_, token) in self.peers.lock().drain() {
            token.cancel();
        }
    }

    /// Wait until at least `count` connections have been accepted.
    pub async fn wait_for_accepted(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.accepted() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.close_all();
    }
}

async fn accept_loop(
    listener: TcpListener,
    mode: ServerMode,
    accepted: Arc<AtomicUsize>,
    peers: Arc<Mutex<HashMap<SocketAddr, CancellationToken>>>,
    shutdown: CancellationToken,
) {
    loop {
        let (stream, peer) = tokio::select! {
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "test server accept failed");
                    continue;
                }
            },
            () = shutdown.cancelled() => break,
        };

        let token = shutdown.child_token();
        peers.lock().insert(peer, token.clone());
        accepted.fetch_add(1, Ordering::AcqRel);

        let peers = Arc::clone(&peers);
        tokio::spawn(async move {
            tokio::select! {
                res = serve(stream, mode) => {
                    if let Err(e) = res {
                        tracing::debug!(%peer, error = %e, "test connection ended with error");
                    }
                }
                () = token.cancelled() => {
                    tracing::debug!(%peer, "test server closing connection");
                }
            }
            peers.lock().remove(&peer);
        });
    }
}

async fn serve(mut stream: TcpStream, mode: ServerMode) -> io::Result<()> {
    match mode {
        ServerMode::Echo => {
            let mut buf = vec![0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    return Ok(());
                }
                stream.write_all(&buf[..n]).await?;
            }
        }
        ServerMode::Framed => {
            let mut frames = FrameStream::new(stream);
            while let Some(frame) = frames.next().await {
                let frame = frame.map_err(io::Error::other)?;
                frames.send(frame).await.map_err(io::Error::other)?;
            }
            Ok(())
        }
        ServerMode::Silent => {
            let mut buf = vec![0u8; 4096];
            while stream.read(&mut buf).await? != 0 {}
            Ok(())
        }
    }
}

/// An address on `127.0.0.1` with nothing listening.
pub async fn unreachable_address() -> io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr.to_string())
}
