use crate::chunk::Chunk;
use crate::packet::Packet;
use async_trait::async_trait;
use std::io::Result as IoResult;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Push side of a transport.
///
/// A chunk handed to `put()` belongs to the sink for the duration of the
/// call.
#[async_trait(?Send)]
pub trait DataSink {
    /// Buffer the output stream should fill before handing it back via `put()`.
    fn allocate_buffer(&self, size: usize) -> Chunk {
        Chunk::new(size)
    }

    async fn put(&mut self, chunk: Chunk) -> IoResult<()>;

    /// Accept a zero-copy chain. Fragments are put in order by default.
    async fn put_packet(&mut self, packet: Packet) -> IoResult<()> {
        for chunk in packet.into_chunks() {
            self.put(chunk).await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> IoResult<()>;
}

/// [`DataSink`] over any tokio `AsyncWrite`.
pub struct WriterSink<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait(?Send)]
impl<W: AsyncWrite + Unpin> DataSink for WriterSink<W> {
    async fn put(&mut self, mut chunk: Chunk) -> IoResult<()> {
        trace!(bytes = chunk.len(), "writing chunk");
        self.inner.write_all_buf(&mut chunk).await
    }

    async fn put_packet(&mut self, mut packet: Packet) -> IoResult<()> {
        trace!(bytes = packet.len(), frags = packet.nr_frags(), "writing packet");
        self.inner.write_all_buf(&mut packet).await
    }

    async fn flush(&mut self) -> IoResult<()> {
        self.inner.flush().await
    }

    async fn close(&mut self) -> IoResult<()> {
        self.inner.shutdown().await
    }
}
