//! Streaming member decompression.

use flate2::{Crc, Decompress, FlushDecompress, Status};
use futures::StreamExt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::WalkError;
use crate::io::ChunkStream;

/// Decoded content of one zip member.
///
/// Compressed data is pulled chunk by chunk from the archive and inflated
/// into the caller's buffer, so memory use does not depend on the member
/// size. The recorded uncompressed size bounds the output: producing more
/// fails at once, and at the end of the data both the size and the CRC-32
/// must match the central directory. A CRC mismatch is reported as an
/// [`io::ErrorKind::InvalidData`] error wrapping [`WalkError::Checksum`].
pub struct MemberReader {
    name: String,
    raw: ChunkStream,
    input: Vec<u8>,
    pos: usize,
    raw_done: bool,
    /// `None` for STORED members
    inflater: Option<Decompress>,
    decoded: bool,
    finished: bool,
    crc: Crc,
    produced: u64,
    expected_size: u64,
    expected_crc: u32,
}

impl MemberReader {
    pub(crate) fn new(
        name: String,
        raw: ChunkStream,
        deflated: bool,
        expected_size: u64,
        expected_crc: u32,
    ) -> Self {
        Self {
            name,
            raw,
            input: Vec::new(),
            pos: 0,
            raw_done: false,
            inflater: deflated.then(|| Decompress::new(false)),
            decoded: false,
            finished: false,
            crc: Crc::new(),
            produced: 0,
            expected_size,
            expected_crc,
        }
    }

    fn invalid(&self, message: String) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", self.name, message))
    }

    /// Account for `n` bytes just written at the end of `filled`.
    fn account(&mut self, filled: &[u8], n: usize) -> io::Result<()> {
        self.crc.update(&filled[filled.len() - n..]);
        self.produced += n as u64;
        if self.produced > self.expected_size {
            return Err(self.invalid(format!(
                "more than the recorded {} bytes",
                self.expected_size
            )));
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.finished = true;
        if self.produced != self.expected_size {
            return Err(self.invalid(format!(
                "{} bytes decoded, {} recorded",
                self.produced, self.expected_size
            )));
        }
        if self.crc.sum() != self.expected_crc {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                WalkError::Checksum {
                    name: self.name.clone(),
                },
            ));
        }
        Ok(())
    }
}

impl AsyncRead for MemberReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.finished || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if this.decoded {
                return Poll::Ready(this.finish());
            }

            if this.pos == this.input.len() && !this.raw_done {
                match ready!(this.raw.poll_next_unpin(cx)) {
                    Some(Ok(chunk)) => {
                        this.input = chunk;
                        this.pos = 0;
                    }
                    Some(Err(err)) => return Poll::Ready(Err(io::Error::other(err))),
                    None => this.raw_done = true,
                }
                continue;
            }

            // One byte past the recorded size is enough to detect overflow
            let room = (this.expected_size - this.produced)
                .saturating_add(1)
                .min(buf.remaining() as u64) as usize;

            let Some(inflater) = this.inflater.as_mut() else {
                if this.pos == this.input.len() {
                    this.decoded = true;
                    continue;
                }
                let n = room.min(this.input.len() - this.pos);
                buf.put_slice(&this.input[this.pos..this.pos + n]);
                this.pos += n;
                this.account(buf.filled(), n)?;
                return Poll::Ready(Ok(()));
            };

            let flush = if this.raw_done {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };
            let (in_before, out_before) = (inflater.total_in(), inflater.total_out());
            let out = &mut buf.initialize_unfilled()[..room];
            let status = inflater
                .decompress(&this.input[this.pos..], out, flush)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            let consumed = (inflater.total_in() - in_before) as usize;
            let written = (inflater.total_out() - out_before) as usize;
            this.pos += consumed;
            buf.advance(written);
            if status == Status::StreamEnd {
                this.decoded = true;
            }

            if written > 0 {
                this.account(buf.filled(), written)?;
                return Poll::Ready(Ok(()));
            }
            if consumed == 0 && status != Status::StreamEnd {
                if this.raw_done {
                    return Poll::Ready(Err(this.invalid("deflate stream is truncated".into())));
                }
                if this.pos < this.input.len() {
                    return Poll::Ready(Err(this.invalid("deflate stream is stuck".into())));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use futures::stream;
    use std::io::Write;
    use tokio::io::AsyncReadExt;

    fn crc32(data: &[u8]) -> u32 {
        let mut crc = Crc::new();
        crc.update(data);
        crc.sum()
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Split `data` into chunks of `size` bytes.
    fn raw(data: Vec<u8>, size: usize) -> ChunkStream {
        let pieces: Vec<anyhow::Result<Vec<u8>>> =
            data.chunks(size).map(|c| Ok(c.to_vec())).collect();
        stream::iter(pieces).boxed()
    }

    async fn read_all(mut reader: MemberReader) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await?;
        Ok(out)
    }

    #[tokio::test]
    async fn inflates_across_small_chunks() {
        let content = "streamed member ".repeat(5000).into_bytes();
        let reader = MemberReader::new(
            "m".into(),
            raw(deflate(&content), 7),
            true,
            content.len() as u64,
            crc32(&content),
        );
        assert_eq!(read_all(reader).await.unwrap(), content);
    }

    #[tokio::test]
    async fn stored_member_passes_through() {
        let content = b"stored bytes".to_vec();
        let reader = MemberReader::new(
            "m".into(),
            raw(content.clone(), 5),
            false,
            content.len() as u64,
            crc32(&content),
        );
        assert_eq!(read_all(reader).await.unwrap(), content);
    }

    #[tokio::test]
    async fn output_beyond_recorded_size_fails() {
        let content = vec![b'x'; 10_000];
        let reader = MemberReader::new(
            "m".into(),
            raw(deflate(&content), 1024),
            true,
            100,
            crc32(&content),
        );
        let err = read_all(reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn crc_mismatch_is_reported_at_the_end() {
        let content = b"payload".to_vec();
        let reader = MemberReader::new(
            "m".into(),
            raw(content.clone(), 3),
            false,
            content.len() as u64,
            crc32(b"other"),
        );
        let err = read_all(reader).await.unwrap_err();
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<WalkError>());
        assert!(matches!(inner, Some(WalkError::Checksum { .. })));
    }

    #[tokio::test]
    async fn truncated_deflate_fails() {
        let content = "abcdefgh".repeat(1000).into_bytes();
        let mut compressed = deflate(&content);
        compressed.truncate(compressed.len() / 2);
        let reader = MemberReader::new(
            "m".into(),
            raw(compressed, 64),
            true,
            content.len() as u64,
            crc32(&content),
        );
        assert!(read_all(reader).await.is_err());
    }
}
