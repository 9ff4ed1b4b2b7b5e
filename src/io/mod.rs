//! Buffered asynchronous streams over pluggable transports
//!
//! This module provides:
//! - `DataSource` / `DataSink` capabilities, plus adapters for tokio readers and writers
//! - `InputStream` for buffered, mostly zero-copy reads
//! - `OutputStream` for buffered or zero-copy writes with batched flushing
//! - `FlushPoller`, the scheduler hook that drives batched flushes
//! - `copy` from an input stream to an output stream

mod consume;
mod copy;
mod input;
pub mod mocks;
mod output;
mod poller;
mod sink;
mod source;

pub use consume::{Consumption, StreamConsumer};
pub use copy::copy;
pub use input::InputStream;
pub use output::OutputStream;
pub use poller::FlushPoller;
pub use sink::{DataSink, WriterSink};
pub use source::{DEFAULT_READ_CHUNK, DataSource, ReaderSource};
