use anyhow::Result;
use futures::stream::{self, BoxStream, StreamExt};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};

use super::ReadAt;

/// Largest positional read issued while streaming a byte range.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Owned chunks of a byte range, in order.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>>>;

/// Stream `len` bytes from `offset` as a sequence of positional reads of at
/// most [`CHUNK_SIZE`] bytes each.
///
/// Nothing is read until the stream is polled, and every read goes straight
/// to the shared source, so any number of ranges can be streamed at once.
///
/// # Arguments
///
/// * `reader` - Shared positional source
/// * `offset` - First byte of the range
/// * `len` - Length of the range in bytes
///
/// # Errors
///
/// Each item fails if the source comes up short.
pub fn chunks<R: ReadAt + 'static>(reader: Arc<R>, offset: u64, len: u64) -> ChunkStream {
    stream::try_unfold((offset, len), move |(offset, left)| {
        let reader = reader.clone();
        async move {
            if left == 0 {
                return Ok(None);
            }
            let n = left.min(CHUNK_SIZE as u64) as usize;
            let mut buf = vec![0u8; n];
            reader.read_exact_at(offset, &mut buf).await?;
            Ok(Some((buf, (offset + n as u64, left - n as u64))))
        }
    })
    .boxed()
}

/// [`AsyncRead`] over a [`ChunkStream`], copying bytes through unchanged.
pub struct ChunkReader {
    chunks: ChunkStream,
    chunk: Vec<u8>,
    pos: usize,
}

impl ChunkReader {
    pub fn new(chunks: ChunkStream) -> Self {
        Self {
            chunks,
            chunk: Vec::new(),
            pos: 0,
        }
    }
}

impl AsyncRead for ChunkReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            if this.pos < this.chunk.len() {
                let n = (this.chunk.len() - this.pos).min(buf.remaining());
                buf.put_slice(&this.chunk[this.pos..this.pos + n]);
                this.pos += n;
                return Poll::Ready(Ok(()));
            }
            match ready!(this.chunks.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    this.chunk = chunk;
                    this.pos = 0;
                }
                Some(Err(err)) => return Poll::Ready(Err(io::Error::other(err))),
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}
