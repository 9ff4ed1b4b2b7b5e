use crate::chunk::Chunk;
use crate::error::{Error, Result};
use crate::io::poller::FlushPoller;
use crate::io::sink::DataSink;
use crate::packet::Packet;
use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use std::alloc::Layout;
use std::cell::RefCell;
use std::mem;
use std::rc::Rc;
use tracing::{debug, trace, warn};

pub(crate) type SharedState = Rc<RefCell<OutputState>>;

/// Completion signal for an in-flight batched flush. Any number of waiters.
struct BatchSignal {
    tx: oneshot::Sender<()>,
    rx: Shared<oneshot::Receiver<()>>,
}

impl BatchSignal {
    fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self { tx, rx: rx.shared() }
    }

    fn waiter(&self) -> Shared<oneshot::Receiver<()>> {
        self.rx.clone()
    }

    fn complete(self) {
        let _ = self.tx.send(());
    }
}

enum Outgoing {
    Chunk(Chunk),
    Packet(Packet),
}

pub(crate) struct OutputState {
    /// Moved out while a sink call is in flight.
    sink: Option<Box<dyn DataSink>>,
    size: usize,
    buf: Chunk,
    end: usize,
    zc_bufs: Packet,
    trim_to_size: bool,
    ex: Option<Error>,
    flush: bool,
    flushing: bool,
    in_batch: Option<BatchSignal>,
}

impl OutputState {
    fn allocate(&self, size: usize) -> Result<Chunk> {
        Layout::from_size_align(size, 1).map_err(|_| Error::Alloc { size, align: 1 })?;
        match &self.sink {
            Some(sink) => Ok(sink.allocate_buffer(size)),
            None => Chunk::aligned(1, size),
        }
    }

    fn buffer_mut(&mut self) -> Result<&mut [u8]> {
        self.buf
            .get_mut()
            .ok_or(Error::Logic("output buffer is shared"))
    }

    /// Whatever is waiting to go to the sink, buffered or zero-copy.
    fn take_pending(&mut self) -> Option<Outgoing> {
        if self.end > 0 {
            let mut buf = mem::take(&mut self.buf);
            buf.trim(self.end);
            self.end = 0;
            Some(Outgoing::Chunk(buf))
        } else if !self.zc_bufs.is_empty() {
            Some(Outgoing::Packet(mem::take(&mut self.zc_bufs)))
        } else {
            None
        }
    }
}

fn fill(dst: &mut Chunk, data: &[u8]) -> Result<()> {
    let size = dst.len();
    dst.get_mut()
        .ok_or(Error::Logic("output buffer is shared"))?
        .get_mut(..data.len())
        .ok_or(Error::OutOfRange {
            offset: 0,
            len: data.len(),
            size,
        })?
        .copy_from_slice(data);
    Ok(())
}

fn take_sink(state: &SharedState) -> Result<Box<dyn DataSink>> {
    state
        .borrow_mut()
        .sink
        .take()
        .ok_or(Error::Logic("data sink is in use or detached"))
}

fn restore_sink(state: &SharedState, sink: Box<dyn DataSink>) {
    state.borrow_mut().sink = Some(sink);
}

/// Hand `out` to the sink right away.
async fn deliver(state: &SharedState, out: Outgoing) -> Result<()> {
    let mut sink = take_sink(state)?;
    let res = match out {
        Outgoing::Chunk(chunk) => sink.put(chunk).await,
        Outgoing::Packet(packet) => sink.put_packet(packet).await,
    };
    restore_sink(state, sink);
    Ok(res?)
}

async fn flush_sink(state: &SharedState) -> Result<()> {
    let mut sink = take_sink(state)?;
    let res = sink.flush().await;
    restore_sink(state, sink);
    Ok(res?)
}

/// Hand `out` to the sink, queueing behind an in-flight batched flush.
///
/// Cancels a flush that was requested but not started yet.
async fn put(state: &SharedState, out: Outgoing) -> Result<()> {
    let in_flight = {
        let mut s = state.borrow_mut();
        s.flush = false;
        if s.flushing {
            s.in_batch.as_ref().map(BatchSignal::waiter)
        } else {
            None
        }
    };
    if let Some(waiter) = in_flight {
        trace!("put waits for in-flight flush");
        let _ = waiter.await;
    }
    deliver(state, out).await
}

/// One poll of a stream registered with the [`FlushPoller`].
///
/// Ships pending data and flushes the sink for as long as new flush
/// requests keep arriving, then releases anyone waiting on the batch.
/// Failures are parked in the stream and reported by the next `flush()` or
/// `close()`.
pub(crate) async fn poll_flush(state: SharedState) {
    loop {
        let pending = {
            let mut s = state.borrow_mut();
            if !s.flush {
                s.flushing = false;
                if let Some(signal) = s.in_batch.take() {
                    signal.complete();
                }
                return;
            }
            s.flush = false;
            s.flushing = true;
            s.take_pending()
        };
        let mut res = Ok(());
        if let Some(out) = pending {
            res = deliver(&state, out).await;
        }
        if res.is_ok() {
            res = flush_sink(&state).await;
        }
        if let Err(e) = res {
            debug!(error = %e, "batched flush failed");
            state.borrow_mut().ex = Some(e);
        }
    }
}

/// Buffered writer over a [`DataSink`].
///
/// Small writes are copied into a buffer of fixed capacity and handed to the
/// sink when it fills; large writes bypass it. Chunks written through
/// [`write_chunk`](OutputStream::write_chunk) are chained without copying
/// instead. A stream must use one mode or the other: mixing them panics.
///
/// With [`batch_flushes`](OutputStream::batch_flushes), `flush()` only
/// registers with a [`FlushPoller`] and returns; the poller does the actual
/// flushing. `close()` on such a stream waits for the poller, so the poller
/// has to be driven concurrently.
///
/// Callers must not overlap operations on one stream.
pub struct OutputStream {
    state: SharedState,
    poller: Option<FlushPoller>,
}

impl OutputStream {
    /// Stream buffering up to `size` bytes before writing to `sink`.
    ///
    /// Panics if `size` is zero.
    pub fn new(sink: Box<dyn DataSink>, size: usize) -> Self {
        assert!(size > 0, "output stream buffer size must be non-zero");
        Self {
            state: Rc::new(RefCell::new(OutputState {
                sink: Some(sink),
                size,
                buf: Chunk::empty(),
                end: 0,
                zc_bufs: Packet::new(),
                trim_to_size: false,
                ex: None,
                flush: false,
                flushing: false,
                in_batch: None,
            })),
            poller: None,
        }
    }

    /// Never hand the sink more than `size` bytes per `put()`.
    pub fn trim_to_size(self, enabled: bool) -> Self {
        self.state.borrow_mut().trim_to_size = enabled;
        self
    }

    /// Defer flushes to `poller`.
    pub fn batch_flushes(mut self, poller: FlushPoller) -> Self {
        self.poller = Some(poller);
        self
    }

    pub fn is_batched(&self) -> bool {
        self.poller.is_some()
    }

    pub fn buffer_size(&self) -> usize {
        self.state.borrow().size
    }

    /// Bytes sitting in the copy buffer.
    pub fn buffered(&self) -> usize {
        self.state.borrow().end
    }

    /// Bytes chained by zero-copy writes and not yet handed to the sink.
    pub fn zero_copy_pending(&self) -> usize {
        self.state.borrow().zc_bufs.len()
    }

    /// True if a batched flush failed and nobody has been told yet.
    pub fn has_pending_error(&self) -> bool {
        self.state.borrow().ex.is_some()
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        {
            let mut s = self.state.borrow_mut();
            let end = s.end;
            if !s.buf.is_empty() && data.len() <= s.size - end {
                assert!(
                    s.zc_bufs.is_empty(),
                    "mixing buffered writes and zero-copy writes is not supported"
                );
                s.buffer_mut()?[end..end + data.len()].copy_from_slice(data);
                s.end += data.len();
                return Ok(());
            }
        }
        self.slow_write(data).await
    }

    pub async fn write_str(&mut self, data: &str) -> Result<()> {
        self.write(data.as_bytes()).await
    }

    async fn slow_write(&mut self, data: &[u8]) -> Result<()> {
        enum Next {
            Done,
            Swap(Chunk),
            Bulk {
                head: Option<Chunk>,
                tail: Chunk,
                split: bool,
            },
        }

        let n = data.len();
        let next = {
            let mut s = self.state.borrow_mut();
            assert!(
                s.zc_bufs.is_empty(),
                "mixing buffered writes and zero-copy writes is not supported"
            );
            let size = s.size;
            let end = s.end;
            let bulk_threshold = if end > 0 { 2 * size - end } else { size };
            if n >= bulk_threshold {
                trace!(bytes = n, buffered = end, "bulk write bypasses buffer");
                let split = s.trim_to_size;
                if end > 0 {
                    let now = size - end;
                    s.buffer_mut()?[end..size].copy_from_slice(&data[..now]);
                    let mut tail = s.allocate(n - now)?;
                    fill(&mut tail, &data[now..])?;
                    let mut head = mem::take(&mut s.buf);
                    head.trim(size);
                    s.end = 0;
                    Next::Bulk {
                        head: Some(head),
                        tail,
                        split,
                    }
                } else {
                    let mut tail = s.allocate(n)?;
                    fill(&mut tail, data)?;
                    Next::Bulk {
                        head: None,
                        tail,
                        split,
                    }
                }
            } else {
                if s.buf.is_empty() {
                    s.buf = s.allocate(size)?;
                }
                let now = n.min(size - end);
                s.buffer_mut()?[end..end + now].copy_from_slice(&data[..now]);
                s.end += now;
                if now == n {
                    Next::Done
                } else {
                    let mut next = s.allocate(size)?;
                    fill(&mut next, &data[now..])?;
                    s.end = n - now;
                    trace!(carried = n - now, "output buffer full, swapping");
                    Next::Swap(mem::replace(&mut s.buf, next))
                }
            }
        };

        match next {
            Next::Done => Ok(()),
            Next::Swap(full) => put(&self.state, Outgoing::Chunk(full)).await,
            Next::Bulk { head, tail, split } => {
                if let Some(head) = head {
                    put(&self.state, Outgoing::Chunk(head)).await?;
                }
                if split {
                    self.split_and_put(tail).await
                } else {
                    put(&self.state, Outgoing::Chunk(tail)).await
                }
            }
        }
    }

    /// Put `buf` in `size` pieces; a trailing piece smaller than that stays
    /// buffered.
    async fn split_and_put(&mut self, mut buf: Chunk) -> Result<()> {
        loop {
            {
                let mut s = self.state.borrow_mut();
                debug_assert_eq!(s.end, 0);
                let size = s.size;
                if buf.len() < size {
                    if s.buf.is_empty() {
                        s.buf = s.allocate(size)?;
                    }
                    s.buffer_mut()?[..buf.len()].copy_from_slice(&buf);
                    s.end = buf.len();
                    return Ok(());
                }
            }
            let size = self.buffer_size();
            let piece = buf.share(0, size)?;
            buf.trim_front(size);
            put(&self.state, Outgoing::Chunk(piece)).await?;
        }
    }

    /// Zero-copy write: chain `chunk` without copying it.
    ///
    /// Panics if the copy buffer holds unflushed bytes.
    pub async fn write_chunk(&mut self, chunk: Chunk) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.write_packet(Packet::from(chunk)).await
    }

    /// Zero-copy write of a whole chain.
    ///
    /// Panics if the copy buffer holds unflushed bytes.
    pub async fn write_packet(&mut self, packet: Packet) -> Result<()> {
        if packet.is_empty() {
            return Ok(());
        }
        let ready = {
            let mut s = self.state.borrow_mut();
            assert!(
                s.end == 0,
                "mixing buffered writes and zero-copy writes is not supported"
            );
            s.zc_bufs.append_packet(packet);
            if s.zc_bufs.len() >= s.size {
                Some((mem::take(&mut s.zc_bufs), s.trim_to_size))
            } else {
                None
            }
        };
        match ready {
            None => Ok(()),
            Some((chain, true)) => self.zero_copy_split_and_put(chain).await,
            Some((chain, false)) => put(&self.state, Outgoing::Packet(chain)).await,
        }
    }

    async fn zero_copy_split_and_put(&mut self, mut chain: Packet) -> Result<()> {
        loop {
            let size = self.buffer_size();
            if chain.len() < size {
                self.state.borrow_mut().zc_bufs = chain;
                return Ok(());
            }
            let piece = chain.share(0, size)?;
            chain.trim_front(size);
            put(&self.state, Outgoing::Packet(piece)).await?;
        }
    }

    /// Push pending data to the sink and flush it.
    ///
    /// In batched mode this only schedules the flush with the poller, after
    /// first reporting any failure left over from an earlier batched flush.
    pub async fn flush(&mut self) -> Result<()> {
        let Some(poller) = &self.poller else {
            let pending = self.state.borrow_mut().take_pending();
            return match pending {
                Some(out) => {
                    put(&self.state, out).await?;
                    flush_sink(&self.state).await
                }
                None => Ok(()),
            };
        };

        let register = {
            let mut s = self.state.borrow_mut();
            if let Some(e) = s.ex.take() {
                return Err(e);
            }
            s.flush = true;
            if s.in_batch.is_none() {
                s.in_batch = Some(BatchSignal::new());
                true
            } else {
                false
            }
        };
        if register {
            poller.register(self.state.clone());
        }
        Ok(())
    }

    /// Flush, wait for any batched flush, then close the sink.
    ///
    /// The sink is closed even when flushing failed. A failure from closing
    /// the sink wins over an earlier one.
    pub async fn close(&mut self) -> Result<()> {
        let flushed = self.flush().await;
        let batch = self
            .state
            .borrow()
            .in_batch
            .as_ref()
            .map(BatchSignal::waiter);
        if let Some(waiter) = batch {
            let _ = waiter.await;
        }
        let reported = flushed.and_then(|()| match self.state.borrow_mut().ex.take() {
            Some(e) => Err(e),
            None => Ok(()),
        });

        let closed = match take_sink(&self.state) {
            Ok(mut sink) => {
                let res = sink.close().await;
                restore_sink(&self.state, sink);
                res.map_err(Error::from)
            }
            Err(e) => Err(e),
        };

        match (reported, closed) {
            (Ok(()), closed) => closed,
            (Err(e), Ok(())) => Err(e),
            (Err(dropped), Err(e)) => {
                warn!(error = %dropped, "sink close failed, dropping earlier error");
                Err(e)
            }
        }
    }

    /// Take back the sink. Fails while unflushed bytes are held.
    pub fn detach(self) -> Result<Box<dyn DataSink>> {
        let mut s = self.state.borrow_mut();
        if s.end > 0 || !s.zc_bufs.is_empty() {
            return Err(Error::Logic("detach() called on a used output stream"));
        }
        let sink = s.sink.take();
        drop(s);
        sink.ok_or(Error::Logic("data sink is in use or detached"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mocks::{MemorySink, SinkEvent};
    use std::io::ErrorKind;
    use test_log::test;

    fn stream(size: usize) -> (OutputStream, MemorySink) {
        let sink = MemorySink::new();
        (OutputStream::new(Box::new(sink.clone()), size), sink)
    }

    #[test(tokio::test)]
    async fn test_fast_path_buffers() {
        let (mut out, sink) = stream(8);
        out.write(b"abc").await.unwrap();
        out.write(b"de").await.unwrap();
        assert_eq!(out.buffered(), 5);
        assert!(sink.events().is_empty());
    }

    #[test(tokio::test)]
    async fn test_overflow_swaps_buffer() {
        let (mut out, sink) = stream(8);
        out.write(b"abcdef").await.unwrap();
        out.write(b"ghijk").await.unwrap();
        assert_eq!(sink.puts(), vec![b"abcdefgh".to_vec()]);
        assert_eq!(out.buffered(), 3);
    }

    #[test(tokio::test)]
    async fn test_bulk_write_puts_whole_remainder() {
        let (mut out, sink) = stream(4);
        out.write(b"ab").await.unwrap();
        // Threshold is 2 * 4 - 2 = 6.
        out.write(b"cdefghijkl").await.unwrap();
        assert_eq!(sink.puts(), vec![b"abcd".to_vec(), b"efghijkl".to_vec()]);
        assert_eq!(out.buffered(), 0);
    }

    #[test(tokio::test)]
    async fn test_bulk_write_trim_to_size() {
        let sink = MemorySink::new();
        let mut out = OutputStream::new(Box::new(sink.clone()), 4).trim_to_size(true);
        out.write(b"ab").await.unwrap();
        out.write(b"cdefghijklm").await.unwrap();
        assert_eq!(
            sink.puts(),
            vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ijkl".to_vec()]
        );
        assert_eq!(out.buffered(), 1);
        out.flush().await.unwrap();
        assert_eq!(sink.data(), b"abcdefghijklm");
        assert_eq!(sink.events().last(), Some(&SinkEvent::Flush));
    }

    #[test(tokio::test)]
    async fn test_bulk_write_on_empty_buffer() {
        let (mut out, sink) = stream(4);
        out.write(b"0123456789").await.unwrap();
        assert_eq!(sink.puts(), vec![b"0123456789".to_vec()]);
        assert_eq!(out.buffered(), 0);
    }

    #[test(tokio::test)]
    async fn test_flush_without_data_skips_sink() {
        let (mut out, sink) = stream(4);
        out.flush().await.unwrap();
        assert!(sink.events().is_empty());
    }

    #[test(tokio::test)]
    async fn test_zero_copy_accumulates_until_size() {
        let (mut out, sink) = stream(8);
        let data = Chunk::from("abcd");
        out.write_chunk(data.share_all()).await.unwrap();
        assert_eq!(out.zero_copy_pending(), 4);
        assert!(sink.events().is_empty());
        out.write_chunk(Chunk::from("efghij")).await.unwrap();
        assert_eq!(sink.data(), b"abcdefghij");
        assert_eq!(out.zero_copy_pending(), 0);
    }

    #[test(tokio::test)]
    async fn test_zero_copy_trim_to_size() {
        let sink = MemorySink::new();
        let mut out = OutputStream::new(Box::new(sink.clone()), 4).trim_to_size(true);
        out.write_chunk(Chunk::from("abcdefghij")).await.unwrap();
        assert_eq!(sink.puts(), vec![b"abcd".to_vec(), b"efgh".to_vec()]);
        assert_eq!(out.zero_copy_pending(), 2);
        out.flush().await.unwrap();
        assert_eq!(sink.data(), b"abcdefghij");
    }

    #[tokio::test]
    #[should_panic(expected = "mixing buffered writes and zero-copy writes")]
    async fn test_zero_copy_after_buffered_panics() {
        let (mut out, _) = stream(8);
        out.write(b"abc").await.unwrap();
        let _ = out.write_chunk(Chunk::from("def")).await;
    }

    #[tokio::test]
    #[should_panic(expected = "mixing buffered writes and zero-copy writes")]
    async fn test_buffered_after_zero_copy_panics() {
        let (mut out, _) = stream(8);
        out.write_chunk(Chunk::from("abc")).await.unwrap();
        let _ = out.write(b"0123456789").await;
    }

    #[test(tokio::test)]
    async fn test_close_flushes_and_closes() {
        let (mut out, sink) = stream(16);
        out.write_str("hello").await.unwrap();
        out.close().await.unwrap();
        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::Put(b"hello".to_vec()),
                SinkEvent::Flush,
                SinkEvent::Close
            ]
        );
    }

    #[test(tokio::test)]
    async fn test_close_runs_sink_close_after_flush_failure() {
        let (mut out, sink) = stream(16);
        out.write_str("hello").await.unwrap();
        sink.fail_next_put(ErrorKind::BrokenPipe);
        let err = out.close().await.unwrap_err();
        assert!(err.is_transport());
        assert!(sink.is_closed());
    }

    #[test(tokio::test)]
    async fn test_close_failure_takes_precedence() {
        let (mut out, sink) = stream(16);
        out.write_str("hello").await.unwrap();
        sink.fail_next_flush(ErrorKind::BrokenPipe);
        sink.fail_close(ErrorKind::NotConnected);
        let err: std::io::Error = out.close().await.unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    #[test(tokio::test)]
    async fn test_detach() {
        let (mut out, _) = stream(16);
        out.write(b"abc").await.unwrap();
        assert!(matches!(out.detach(), Err(Error::Logic(_))));

        let (mut out, sink) = stream(16);
        out.write(b"abc").await.unwrap();
        out.flush().await.unwrap();
        let mut raw = out.detach().unwrap();
        raw.put(Chunk::from("def")).await.unwrap();
        assert_eq!(sink.data(), b"abcdef");
    }

    #[test(tokio::test)]
    async fn test_batched_flush_collapses_requests() {
        let poller = FlushPoller::new();
        let sink = MemorySink::new();
        let mut out = OutputStream::new(Box::new(sink.clone()), 16).batch_flushes(poller.clone());

        out.write(b"ab").await.unwrap();
        out.flush().await.unwrap();
        out.write(b"cd").await.unwrap();
        out.flush().await.unwrap();
        assert_eq!(poller.pending(), 1);
        assert!(sink.events().is_empty());

        assert_eq!(poller.tick().await, 1);
        assert_eq!(
            sink.events(),
            vec![SinkEvent::Put(b"abcd".to_vec()), SinkEvent::Flush]
        );
        assert_eq!(poller.pending(), 0);
    }

    #[test(tokio::test)]
    async fn test_put_cancels_requested_flush() {
        let poller = FlushPoller::new();
        let sink = MemorySink::new();
        let mut out = OutputStream::new(Box::new(sink.clone()), 4).batch_flushes(poller.clone());

        out.write(b"ab").await.unwrap();
        out.flush().await.unwrap();
        out.write(b"cdefgh").await.unwrap();
        poller.tick().await;
        assert_eq!(sink.flushes(), 0);
        assert_eq!(sink.data(), b"abcdefgh");
    }

    #[test(tokio::test)]
    async fn test_batched_failure_reported_on_next_flush() {
        let poller = FlushPoller::new();
        let sink = MemorySink::new();
        let mut out = OutputStream::new(Box::new(sink.clone()), 16).batch_flushes(poller.clone());

        out.write(b"abc").await.unwrap();
        out.flush().await.unwrap();
        sink.fail_next_flush(ErrorKind::BrokenPipe);
        poller.tick().await;
        assert!(out.has_pending_error());

        let err = out.flush().await.unwrap_err();
        assert!(err.is_transport());
        assert!(!out.has_pending_error());
        out.flush().await.unwrap();
    }

    #[test(tokio::test)]
    async fn test_batched_close_waits_for_poller() {
        let poller = FlushPoller::new();
        let sink = MemorySink::new().yielding();
        let mut out = OutputStream::new(Box::new(sink.clone()), 16).batch_flushes(poller.clone());

        out.write(b"tail").await.unwrap();
        let (closed, polled) = tokio::join!(out.close(), poller.tick());
        closed.unwrap();
        assert_eq!(polled, 1);
        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::Put(b"tail".to_vec()),
                SinkEvent::Flush,
                SinkEvent::Close
            ]
        );
    }

    #[test(tokio::test)]
    async fn test_batched_close_reports_stored_error() {
        let poller = FlushPoller::new();
        let sink = MemorySink::new();
        let mut out = OutputStream::new(Box::new(sink.clone()), 16).batch_flushes(poller.clone());

        out.write(b"abc").await.unwrap();
        out.flush().await.unwrap();
        out.write(b"def").await.unwrap();
        sink.fail_next_put(ErrorKind::ConnectionReset);
        let (closed, _) = tokio::join!(out.close(), poller.tick());
        assert!(closed.unwrap_err().is_transport());
        assert!(sink.is_closed());
    }

    #[test(tokio::test)]
    async fn test_put_waits_for_in_flight_flush() {
        let poller = FlushPoller::new();
        let sink = MemorySink::new().yielding();
        let mut out = OutputStream::new(Box::new(sink.clone()), 4).batch_flushes(poller.clone());

        out.write(b"AA").await.unwrap();
        out.flush().await.unwrap();
        // Bulk write issued while the poller is inside the sink.
        let writer = async {
            tokio::task::yield_now().await;
            out.write(b"BBBBBBBB").await
        };
        let (written, polled) = tokio::join!(writer, poller.tick());
        written.unwrap();
        assert_eq!(polled, 1);
        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::Put(b"AA".to_vec()),
                SinkEvent::Flush,
                SinkEvent::Put(b"BBBBBBBB".to_vec())
            ]
        );
        assert!(!sink.overlapped());

        let (closed, _) = tokio::join!(out.close(), poller.tick());
        closed.unwrap();
        assert_eq!(sink.events().last(), Some(&SinkEvent::Close));
        assert!(!sink.overlapped());
    }

    #[tokio::test]
    #[should_panic(expected = "mixing buffered writes and zero-copy writes")]
    async fn test_buffered_fast_path_after_zero_copy_panics() {
        let sink = MemorySink::new();
        let mut out = OutputStream::new(Box::new(sink.clone()), 4).trim_to_size(true);
        // Splits evenly, leaving an empty buffer allocated.
        out.write(b"abcdefgh").await.unwrap();
        assert_eq!(out.buffered(), 0);
        out.write_chunk(Chunk::from("xy")).await.unwrap();
        let _ = out.write(b"z").await;
    }

    #[test(tokio::test)]
    async fn test_unsatisfiable_buffer_size_is_an_error() {
        let (mut out, sink) = stream(usize::MAX);
        let err = out.write(b"a").await.unwrap_err();
        assert!(matches!(err, Error::Alloc { .. }));
        assert!(sink.events().is_empty());
    }
}
