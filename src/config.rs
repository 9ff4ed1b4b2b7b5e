use crate::error::{Error, Result};
use crate::io::{DataSink, FlushPoller, OutputStream, ReaderSource};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

/// Tunables for building streams.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamConfig {
    /// Output stream buffer capacity.
    pub buffer_size: usize,
    /// Bytes a reader source pulls per chunk.
    pub read_chunk_size: usize,
    pub trim_to_size: bool,
    pub batch_flushes: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            buffer_size: 8192,
            read_chunk_size: crate::io::DEFAULT_READ_CHUNK,
            trim_to_size: false,
            batch_flushes: false,
        }
    }
}

impl StreamConfig {
    pub async fn load(path: &str) -> Result<Self> {
        let s = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("read {path}: {e}")))?;
        Self::from_yaml(&s)
    }

    pub fn from_yaml(s: &str) -> Result<Self> {
        let cfg: StreamConfig =
            serde_yaml_ng::from_str(s).map_err(|e| Error::Config(format!("parse yaml: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::Config("bufferSize must be non-zero".into()));
        }
        if self.read_chunk_size == 0 {
            return Err(Error::Config("readChunkSize must be non-zero".into()));
        }
        Ok(())
    }

    pub fn reader_source<R: AsyncRead + Unpin>(&self, reader: R) -> ReaderSource<R> {
        ReaderSource::with_chunk_size(reader, self.read_chunk_size)
    }

    /// Output stream over `sink`; attached to `poller` only when
    /// `batch_flushes` is set.
    pub fn output_stream(&self, sink: Box<dyn DataSink>, poller: &FlushPoller) -> OutputStream {
        let out = OutputStream::new(sink, self.buffer_size).trim_to_size(self.trim_to_size);
        if self.batch_flushes {
            out.batch_flushes(poller.clone())
        } else {
            out
        }
    }
}
