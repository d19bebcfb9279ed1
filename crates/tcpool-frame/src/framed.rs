//! Framed message stream for async I/O.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use futures_util::Sink;
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::codec::FrameCodec;
use crate::error::FrameError;

pin_project! {
    /// A stream of length-prefixed frames over an async I/O transport.
    ///
    /// This wraps a tokio-util `Framed` codec; reading yields payloads with
    /// the length prefix stripped, writing prepends it.
    pub struct FrameStream<T> {
        #[pin]
        inner: Framed<T, FrameCodec>,
    }
}

impl<T> FrameStream<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a new frame stream over the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            inner: Framed::new(transport, FrameCodec::new()),
        }
    }

    /// Create a new frame stream with a custom codec.
    pub fn with_codec(transport: T, codec: FrameCodec) -> Self {
        Self {
            inner: Framed::new(transport, codec),
        }
    }

    /// Get a reference to the underlying transport.
    pub fn get_ref(&self) -> &T {
        self.inner.get_ref()
    }

    /// Get a mutable reference to the underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Get a reference to the codec.
    pub fn codec(&self) -> &FrameCodec {
        self.inner.codec()
    }

    /// Consume the stream and return the underlying transport.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T> Stream for FrameStream<T>
where
    T: AsyncRead + Unpin,
{
    type Item = Result<Bytes, FrameError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

impl<T> Sink<Bytes> for FrameStream<T>
where
    T: AsyncWrite + Unpin,
{
    type Error = FrameError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

impl<T> std::fmt::Debug for FrameStream<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStream")
            .field("transport", self.inner.get_ref())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_frames_cross_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut client = FrameStream::new(client);
        let mut server = FrameStream::new(server);

        client.send(Bytes::from_static(b"ping")).await.unwrap();
        let frame = server.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"ping");

        server.send(Bytes::from_static(b"pong")).await.unwrap();
        let frame = client.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"pong");
    }

    #[tokio::test]
    async fn test_truncated_frame_reports_closed() {
        let (mut raw, server) = tokio::io::duplex(64);
        let mut server = FrameStream::new(server);

        raw.write_all(&[0, 0, 0, 10, 1, 2]).await.unwrap();
        drop(raw);

        let err = server.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }
}
