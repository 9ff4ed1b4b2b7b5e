//! In-memory source and sink, handy for tests and demos.
//!
//! Both are cheap handles over shared state: clone one, hand the clone to a
//! stream, and inspect the original afterwards.

use crate::chunk::Chunk;
use crate::io::sink::DataSink;
use crate::io::source::DataSource;
use crate::packet::Packet;
use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::rc::Rc;

enum Step {
    Data(Chunk),
    Fail(ErrorKind),
}

#[derive(Default)]
struct SourceState {
    steps: RefCell<VecDeque<Step>>,
    gets: Cell<usize>,
    closed: Cell<bool>,
}

/// Scripted [`DataSource`]: yields the given chunks, then end-of-stream.
#[derive(Clone, Default)]
pub struct MemorySource {
    state: Rc<SourceState>,
}

impl MemorySource {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Chunk>,
    {
        let source = Self::default();
        for chunk in chunks {
            source.push(chunk);
        }
        source
    }

    pub fn push(&self, chunk: impl Into<Chunk>) {
        self.state
            .steps
            .borrow_mut()
            .push_back(Step::Data(chunk.into()));
    }

    /// Fail the `get()` after the scripted chunks.
    pub fn then_fail(self, kind: ErrorKind) -> Self {
        self.state.steps.borrow_mut().push_back(Step::Fail(kind));
        self
    }

    /// Number of `get()` calls seen so far.
    pub fn gets(&self) -> usize {
        self.state.gets.get()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.get()
    }
}

#[async_trait(?Send)]
impl DataSource for MemorySource {
    async fn get(&mut self) -> IoResult<Chunk> {
        self.state.gets.set(self.state.gets.get() + 1);
        let step = self.state.steps.borrow_mut().pop_front();
        match step {
            Some(Step::Data(chunk)) => Ok(chunk),
            Some(Step::Fail(kind)) => Err(IoError::new(kind, "injected source failure")),
            None => Ok(Chunk::empty()),
        }
    }

    async fn close(&mut self) -> IoResult<()> {
        self.state.closed.set(true);
        Ok(())
    }
}

/// Everything a [`MemorySink`] was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Put(Vec<u8>),
    Flush,
    Close,
}

#[derive(Default)]
struct SinkState {
    events: RefCell<Vec<SinkEvent>>,
    fail_put: Cell<Option<ErrorKind>>,
    fail_flush: Cell<Option<ErrorKind>>,
    fail_close: Cell<Option<ErrorKind>>,
    yielding: Cell<bool>,
    busy: Cell<bool>,
    overlapped: Cell<bool>,
}

/// Recording [`DataSink`] with failure injection.
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Rc<SinkState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `put()` and `flush()` yield to the scheduler once before they
    /// complete, so other tasks can interleave with them.
    pub fn yielding(self) -> Self {
        self.state.yielding.set(true);
        self
    }

    pub fn fail_next_put(&self, kind: ErrorKind) {
        self.state.fail_put.set(Some(kind));
    }

    pub fn fail_next_flush(&self, kind: ErrorKind) {
        self.state.fail_flush.set(Some(kind));
    }

    pub fn fail_close(&self, kind: ErrorKind) {
        self.state.fail_close.set(Some(kind));
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.state.events.borrow().clone()
    }

    pub fn puts(&self) -> Vec<Vec<u8>> {
        self.state
            .events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Put(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Concatenation of every accepted `put()`.
    pub fn data(&self) -> Vec<u8> {
        self.puts().concat()
    }

    pub fn flushes(&self) -> usize {
        self.state
            .events
            .borrow()
            .iter()
            .filter(|e| **e == SinkEvent::Flush)
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.state.events.borrow().contains(&SinkEvent::Close)
    }

    /// True if a call started while another one was still in flight.
    pub fn overlapped(&self) -> bool {
        self.state.overlapped.get()
    }

    async fn enter(&self) {
        if self.state.busy.replace(true) {
            self.state.overlapped.set(true);
        }
        if self.state.yielding.get() {
            tokio::task::yield_now().await;
        }
    }

    fn leave(&self, event: SinkEvent, fail: &Cell<Option<ErrorKind>>) -> IoResult<()> {
        self.state.busy.set(false);
        if let Some(kind) = fail.take() {
            return Err(IoError::new(kind, "injected sink failure"));
        }
        self.state.events.borrow_mut().push(event);
        Ok(())
    }
}

#[async_trait(?Send)]
impl DataSink for MemorySink {
    async fn put(&mut self, chunk: Chunk) -> IoResult<()> {
        self.enter().await;
        self.leave(SinkEvent::Put(chunk.to_vec()), &self.state.fail_put)
    }

    /// Records the whole chain as a single put.
    async fn put_packet(&mut self, packet: Packet) -> IoResult<()> {
        self.enter().await;
        self.leave(SinkEvent::Put(packet.to_vec()), &self.state.fail_put)
    }

    async fn flush(&mut self) -> IoResult<()> {
        self.enter().await;
        self.leave(SinkEvent::Flush, &self.state.fail_flush)
    }

    async fn close(&mut self) -> IoResult<()> {
        self.enter().await;
        self.leave(SinkEvent::Close, &self.state.fail_close)
    }
}
