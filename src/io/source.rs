use crate::chunk::Chunk;
use async_trait::async_trait;
use std::io::Result as IoResult;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Default number of bytes a [`ReaderSource`] pulls per `get()`.
pub const DEFAULT_READ_CHUNK: usize = 8192;

/// Pull side of a transport.
///
/// An empty chunk from `get()` signals end-of-stream.
#[async_trait(?Send)]
pub trait DataSource {
    async fn get(&mut self) -> IoResult<Chunk>;

    /// Discard `n` bytes and return whatever was fetched past them.
    ///
    /// The returned chunk is empty when the skip ended exactly on a chunk
    /// boundary or the source ran dry.
    async fn skip(&mut self, n: u64) -> IoResult<Chunk> {
        let mut remaining = n;
        loop {
            let mut buf = self.get().await?;
            if buf.is_empty() {
                return Ok(buf);
            }
            if buf.len() as u64 >= remaining {
                buf.trim_front(remaining as usize);
                return Ok(buf);
            }
            remaining -= buf.len() as u64;
        }
    }

    async fn close(&mut self) -> IoResult<()> {
        Ok(())
    }
}

/// [`DataSource`] over any tokio `AsyncRead`.
pub struct ReaderSource<R> {
    inner: R,
    chunk_size: usize,
}

impl<R: AsyncRead + Unpin> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self::with_chunk_size(inner, DEFAULT_READ_CHUNK)
    }

    pub fn with_chunk_size(inner: R, chunk_size: usize) -> Self {
        Self {
            inner,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[async_trait(?Send)]
impl<R: AsyncRead + Unpin> DataSource for ReaderSource<R> {
    async fn get(&mut self) -> IoResult<Chunk> {
        let mut chunk = Chunk::aligned(1, self.chunk_size)?;
        let n = match chunk.get_mut() {
            Some(dst) => self.inner.read(dst).await?,
            None => 0,
        };
        chunk.trim(n);
        trace!(bytes = n, "pulled chunk from reader");
        Ok(chunk)
    }
}
