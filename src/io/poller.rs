use crate::io::output::{SharedState, poll_flush};
use futures::future::join_all;
use std::cell::RefCell;
use std::mem;
use std::rc::Rc;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Default)]
struct PollerInner {
    pending: RefCell<Vec<SharedState>>,
    wake: Notify,
}

/// Scheduler hook that collapses batched flush requests.
///
/// An [`OutputStream`](crate::io::OutputStream) in batched mode registers
/// itself here on the first `flush()` of a batch instead of flushing the
/// sink. Each [`tick`](FlushPoller::tick) polls every registered stream
/// once; a stream keeps shipping buffered data and flushing its sink until a
/// poll finds no new flush request.
///
/// The handle is cheap to clone and single-threaded. Drive it either by
/// calling `tick()` from your own loop or by spawning [`run`](FlushPoller::run)
/// on a `LocalSet`.
#[derive(Clone, Default)]
pub struct FlushPoller {
    inner: Rc<PollerInner>,
}

impl FlushPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, stream: SharedState) {
        self.inner.pending.borrow_mut().push(stream);
        debug!(
            pending = self.inner.pending.borrow().len(),
            "stream registered for batched flush"
        );
        self.inner.wake.notify_one();
    }

    /// Streams waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Poll every registered stream and drive their flushes to completion.
    ///
    /// Returns the number of streams polled.
    pub async fn tick(&self) -> usize {
        let streams = mem::take(&mut *self.inner.pending.borrow_mut());
        let polled = streams.len();
        if polled > 0 {
            debug!(streams = polled, "flush poller tick");
            join_all(streams.into_iter().map(poll_flush)).await;
        }
        polled
    }

    /// Tick whenever streams register, forever.
    ///
    /// Yields once after each wake-up so flush requests issued in the same
    /// scheduling round land in one tick.
    pub async fn run(self) {
        loop {
            self.inner.wake.notified().await;
            tokio::task::yield_now().await;
            self.tick().await;
        }
    }
}
