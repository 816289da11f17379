//! Rewindable byte stream
//!
//! Header parsing reads in fixed-size chunks and routinely overshoots the
//! header/body boundary. `RewindStream` lets the parser push the overshoot
//! back so the body phase (or a TLS handshake, for CONNECT) sees those bytes
//! untouched.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

/// Wraps a bidirectional byte stream with an unread (pushback) buffer.
///
/// Pushed-back bytes are returned by subsequent reads before any new data is
/// pulled from the underlying transport. Writes pass straight through.
#[derive(Debug)]
pub struct RewindStream<S> {
    inner: S,
    pushback: BytesMut,
}

impl<S> RewindStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pushback: BytesMut::new(),
        }
    }

    /// Prepend bytes to be returned by the next reads.
    pub fn unread(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut buf = BytesMut::with_capacity(data.len() + self.pushback.len());
        buf.extend_from_slice(data);
        buf.extend_from_slice(&self.pushback);
        self.pushback = buf;
    }

    /// Bytes currently pushed back and not yet re-read.
    pub fn pending(&self) -> usize {
        self.pushback.len()
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> RewindStream<S> {
    /// Read up to `max` bytes. Returns an empty buffer only on peer close.
    ///
    /// Pushback is drained first; the transport is only consulted once the
    /// pushback buffer is empty.
    pub async fn read_chunk(&mut self, max: usize) -> std::io::Result<Bytes> {
        if !self.pushback.is_empty() {
            let n = max.min(self.pushback.len());
            return Ok(self.pushback.split_to(n).freeze());
        }
        let mut buf = vec![0u8; max];
        let n = self.inner.read(&mut buf).await?;
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for RewindStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if !this.pushback.is_empty() {
            let n = this.pushback.len().min(buf.remaining());
            buf.put_slice(&this.pushback.split_to(n));
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for RewindStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
