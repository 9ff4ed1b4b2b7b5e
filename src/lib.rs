//! chunkstream
//!
//! Buffered asynchronous byte streams over pluggable transports: a
//! reference-counted chunk type, an input stream that hands out buffered
//! bytes mostly without copying, and an output stream with zero-copy writes
//! and batched flushing.

pub mod chunk;
pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod packet;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types for convenience
pub use chunk::Chunk;
pub use config::StreamConfig;
pub use error::{Error, Result};
pub use packet::Packet;
