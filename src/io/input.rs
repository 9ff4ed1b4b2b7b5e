use crate::chunk::Chunk;
use crate::error::{Error, Result};
use crate::io::consume::{Consumption, StreamConsumer};
use crate::io::source::DataSource;
use std::mem;
use tracing::trace;

/// Buffered reader over a [`DataSource`].
///
/// Bytes pulled from the source but not yet handed to the caller stay in a
/// residual chunk. Reads that can be served from it are allocation-free: the
/// residual is either handed over whole or shared.
///
/// Callers must not overlap operations on one stream: each `&mut self` call
/// has to complete before the next starts.
pub struct InputStream {
    source: Box<dyn DataSource>,
    buf: Chunk,
    eof: bool,
}

impl InputStream {
    pub fn new(source: Box<dyn DataSource>) -> Self {
        Self {
            source,
            buf: Chunk::empty(),
            eof: false,
        }
    }

    /// Bytes already buffered and readable without touching the source.
    pub fn available(&self) -> usize {
        self.buf.len()
    }

    /// True once the source reported end-of-stream.
    pub fn eof(&self) -> bool {
        self.eof
    }

    async fn pull(&mut self) -> Result<Chunk> {
        let chunk = self.source.get().await?;
        trace!(bytes = chunk.len(), "pulled chunk from source");
        Ok(chunk)
    }

    /// Read exactly `n` bytes, or fewer if the source ends first.
    pub async fn read_exactly(&mut self, n: usize) -> Result<Chunk> {
        loop {
            if self.buf.len() == n {
                return Ok(mem::take(&mut self.buf));
            }
            if self.buf.len() > n {
                let front = self.buf.share(0, n)?;
                self.buf.trim_front(n);
                return Ok(front);
            }
            if !self.buf.is_empty() {
                let out = Chunk::aligned(1, n)?;
                return self.read_exactly_part(n, out).await;
            }
            if self.eof {
                return Ok(Chunk::empty());
            }
            let chunk = self.pull().await?;
            if chunk.is_empty() {
                self.eof = true;
                return Ok(chunk);
            }
            self.buf = chunk;
        }
    }

    async fn read_exactly_part(&mut self, n: usize, mut out: Chunk) -> Result<Chunk> {
        let mut completed = 0;
        loop {
            if !self.buf.is_empty() {
                let now = (n - completed).min(self.buf.len());
                let dst = out
                    .get_mut()
                    .ok_or(Error::Logic("read_exactly target is shared"))?;
                dst[completed..completed + now].copy_from_slice(&self.buf[..now]);
                self.buf.trim_front(now);
                completed += now;
            }
            if completed == n {
                return Ok(out);
            }
            let chunk = self.pull().await?;
            if chunk.is_empty() {
                self.eof = true;
                out.trim(completed);
                return Ok(out);
            }
            self.buf = chunk;
        }
    }

    /// Read at most `n` bytes without copying.
    ///
    /// Only pulls from the source when nothing is buffered.
    pub async fn read_up_to(&mut self, n: usize) -> Result<Chunk> {
        loop {
            if self.buf.is_empty() {
                if self.eof {
                    return Ok(Chunk::empty());
                }
                let chunk = self.pull().await?;
                self.eof = chunk.is_empty();
                self.buf = chunk;
                continue;
            }
            if self.buf.len() <= n {
                return Ok(mem::take(&mut self.buf));
            }
            let front = self.buf.share(0, n)?;
            self.buf.trim_front(n);
            return Ok(front);
        }
    }

    /// Whatever is buffered, or the next chunk from the source.
    ///
    /// An empty result means end-of-stream.
    pub async fn read(&mut self) -> Result<Chunk> {
        if !self.buf.is_empty() {
            return Ok(mem::take(&mut self.buf));
        }
        if self.eof {
            return Ok(Chunk::empty());
        }
        let chunk = self.pull().await?;
        self.eof = chunk.is_empty();
        Ok(chunk)
    }

    /// Discard `n` bytes, residual first, then through the source.
    pub async fn skip(&mut self, n: u64) -> Result<()> {
        let from_buf = n.min(self.buf.len() as u64);
        self.buf.trim_front(from_buf as usize);
        let rest = n - from_buf;
        if rest == 0 || self.eof {
            return Ok(());
        }
        trace!(bytes = rest, "skipping through source");
        self.buf = self.source.skip(rest).await?;
        Ok(())
    }

    /// Feed buffered and incoming chunks to `consumer` until it stops or the
    /// source ends.
    ///
    /// The consumer sees an empty chunk once at end-of-stream.
    pub async fn consume<C: StreamConsumer>(&mut self, mut consumer: C) -> Result<()> {
        loop {
            if self.buf.is_empty() && !self.eof {
                let chunk = self.pull().await?;
                self.eof = chunk.is_empty();
                self.buf = chunk;
                continue;
            }
            match consumer.consume(mem::take(&mut self.buf)).await? {
                Consumption::Continue => {
                    if self.eof {
                        return Ok(());
                    }
                }
                Consumption::Stop(rest) => {
                    self.buf = rest;
                    return Ok(());
                }
                Consumption::Skip(n) => {
                    if self.eof {
                        return Ok(());
                    }
                    let rest = self.source.skip(n).await?;
                    if !rest.is_empty() {
                        self.buf = rest;
                    }
                }
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.source.close().await?;
        Ok(())
    }

    /// Take back the source. Fails while unread bytes are buffered.
    pub fn detach(self) -> Result<Box<dyn DataSource>> {
        if !self.buf.is_empty() {
            return Err(Error::Logic("detach() called on a used input stream"));
        }
        Ok(self.source)
    }
}
