use crate::chunk::Chunk;
use crate::error::Result;
use crate::io::consume::{Consumption, StreamConsumer};
use crate::io::input::InputStream;
use crate::io::output::OutputStream;
use tracing::debug;

struct CopyConsumer<'a> {
    out: &'a mut OutputStream,
    copied: &'a mut u64,
}

impl StreamConsumer for CopyConsumer<'_> {
    async fn consume(&mut self, data: Chunk) -> Result<Consumption> {
        if data.is_empty() {
            return Ok(Consumption::Stop(data));
        }
        self.out.write(&data).await?;
        *self.copied += data.len() as u64;
        Ok(Consumption::Continue)
    }
}

/// Copy everything `input` yields into `output` until end-of-stream.
///
/// Bytes stay buffered in `output`; flushing is left to the caller.
/// Returns the number of bytes copied.
pub async fn copy(input: &mut InputStream, output: &mut OutputStream) -> Result<u64> {
    let mut copied = 0;
    input
        .consume(CopyConsumer {
            out: output,
            copied: &mut copied,
        })
        .await?;
    debug!(bytes = copied, "stream copy finished");
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::io::mocks::{MemorySink, MemorySource};
    use std::io::ErrorKind;
    use test_log::test;

    #[test(tokio::test)]
    async fn test_copy_all() {
        let mut input = InputStream::new(Box::new(MemorySource::new(["He", "llo, ", "World"])));
        let sink = MemorySink::new();
        let mut output = OutputStream::new(Box::new(sink.clone()), 4);

        let copied = copy(&mut input, &mut output).await.unwrap();
        assert_eq!(copied, 12);
        assert!(input.eof());
        output.close().await.unwrap();
        assert_eq!(sink.data(), b"Hello, World");
    }

    #[test(tokio::test)]
    async fn test_copy_includes_residual() {
        let mut input = InputStream::new(Box::new(MemorySource::new(["header|body", "-more"])));
        input.read_exactly(7).await.unwrap();
        let sink = MemorySink::new();
        let mut output = OutputStream::new(Box::new(sink.clone()), 64);

        assert_eq!(copy(&mut input, &mut output).await.unwrap(), 9);
        output.flush().await.unwrap();
        assert_eq!(sink.data(), b"body-more");
    }

    #[test(tokio::test)]
    async fn test_copy_empty_source() {
        let mut input = InputStream::new(Box::new(MemorySource::default()));
        let sink = MemorySink::new();
        let mut output = OutputStream::new(Box::new(sink.clone()), 8);
        assert_eq!(copy(&mut input, &mut output).await.unwrap(), 0);
        assert!(sink.events().is_empty());
    }

    #[test(tokio::test)]
    async fn test_copy_stops_on_sink_error() {
        let mut input = InputStream::new(Box::new(MemorySource::new(["0123456789"])));
        let sink = MemorySink::new();
        sink.fail_next_put(ErrorKind::BrokenPipe);
        let mut output = OutputStream::new(Box::new(sink.clone()), 4);
        let err = copy(&mut input, &mut output).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
