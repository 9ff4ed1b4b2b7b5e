use crate::chunk::Chunk;
use crate::error::Result;
use std::future::Future;

/// What a consumer wants the input stream to do after being handed a chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum Consumption {
    /// The whole chunk was used; deliver the next one.
    Continue,
    /// Done. The chunk holds the bytes that were not used, and becomes the
    /// stream's residual buffer.
    Stop(Chunk),
    /// The whole chunk was used and the next `n` bytes from the source
    /// should be discarded.
    Skip(u64),
}

/// Older consumer form: `None` keeps going, `Some(rest)` stops with `rest`
/// left unread.
impl From<Option<Chunk>> for Consumption {
    fn from(remainder: Option<Chunk>) -> Self {
        match remainder {
            Some(rest) => Consumption::Stop(rest),
            None => Consumption::Continue,
        }
    }
}

/// Callback driven by [`InputStream::consume`](crate::io::InputStream::consume).
///
/// An empty chunk means the source reached end-of-stream.
#[allow(async_fn_in_trait)]
pub trait StreamConsumer {
    async fn consume(&mut self, data: Chunk) -> Result<Consumption>;
}

impl<F, Fut> StreamConsumer for F
where
    F: FnMut(Chunk) -> Fut,
    Fut: Future<Output = Result<Consumption>>,
{
    async fn consume(&mut self, data: Chunk) -> Result<Consumption> {
        (self)(data).await
    }
}
