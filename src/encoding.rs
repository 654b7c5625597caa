//! Text decoding for entry content.
//!
//! The first bytes of a stream are sniffed for a byte order mark. UTF-16
//! content is transcoded to UTF-8 on the fly, a UTF-8 BOM is dropped, and
//! anything else passes through untouched.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// Bytes inspected to classify a stream.
pub const SNIFF_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf16Be,
    Utf16Le,
    Utf8Bom,
    /// Plain UTF-8 or ASCII, the default for text
    Utf8,
    /// Control bytes found: not text, passed through as is
    Binary,
}

impl TextEncoding {
    fn bom_len(self) -> usize {
        match self {
            TextEncoding::Utf16Be | TextEncoding::Utf16Le => 2,
            TextEncoding::Utf8Bom => 3,
            TextEncoding::Utf8 | TextEncoding::Binary => 0,
        }
    }
}

/// Classify a stream from its first bytes (at most [`SNIFF_LEN`] are used).
pub fn detect(data: &[u8]) -> TextEncoding {
    let data = &data[..data.len().min(SNIFF_LEN)];

    if data.starts_with(&[0xFE, 0xFF]) {
        return TextEncoding::Utf16Be;
    }
    if data.starts_with(&[0xFF, 0xFE]) {
        return TextEncoding::Utf16Le;
    }
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return TextEncoding::Utf8Bom;
    }

    let binary = data.iter().any(|&b| {
        b <= 0x08 || b == 0x0B || (0x0E..=0x1A).contains(&b) || (0x1C..=0x1F).contains(&b)
    });
    if binary {
        TextEncoding::Binary
    } else {
        TextEncoding::Utf8
    }
}

/// Wrap `reader` so that it yields UTF-8, discarding any BOM.
pub async fn decode<R>(mut reader: R) -> io::Result<Pin<Box<dyn AsyncRead + Send>>>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    while prefix.len() < SNIFF_LEN {
        let mut chunk = [0u8; SNIFF_LEN];
        let want = SNIFF_LEN - prefix.len();
        let n = reader.read(&mut chunk[..want]).await?;
        if n == 0 {
            break;
        }
        prefix.extend_from_slice(&chunk[..n]);
    }

    let encoding = detect(&prefix);
    let rest = io::Cursor::new(prefix.split_off(encoding.bom_len()));
    let stream = rest.chain(reader);

    Ok(match encoding {
        TextEncoding::Utf16Be => Box::pin(Utf16Decoder::new(stream, true)),
        TextEncoding::Utf16Le => Box::pin(Utf16Decoder::new(stream, false)),
        TextEncoding::Utf8Bom | TextEncoding::Utf8 | TextEncoding::Binary => Box::pin(stream),
    })
}

/// Streaming UTF-16 to UTF-8 transcoder. Unpaired surrogates and a dangling
/// odd byte become U+FFFD.
struct Utf16Decoder<R> {
    inner: R,
    big_endian: bool,
    raw: Vec<u8>,
    high: Option<u16>,
    out: Vec<u8>,
    out_pos: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> Utf16Decoder<R> {
    fn new(inner: R, big_endian: bool) -> Self {
        Self {
            inner,
            big_endian,
            raw: Vec::new(),
            high: None,
            out: Vec::new(),
            out_pos: 0,
            eof: false,
        }
    }

    fn push_char(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out
            .extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn decode_units(&mut self) {
        let whole = self.raw.len() / 2 * 2;
        let units: Vec<u16> = self.raw[..whole]
            .chunks_exact(2)
            .map(|pair| {
                if self.big_endian {
                    u16::from_be_bytes([pair[0], pair[1]])
                } else {
                    u16::from_le_bytes([pair[0], pair[1]])
                }
            })
            .collect();
        self.raw.drain(..whole);

        for unit in units {
            if let Some(high) = self.high.take() {
                if (0xDC00..=0xDFFF).contains(&unit) {
                    let code = 0x10000 + (((high as u32) - 0xD800) << 10) + ((unit as u32) - 0xDC00);
                    self.push_char(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                    continue;
                }
                self.push_char(char::REPLACEMENT_CHARACTER);
            }
            match unit {
                0xD800..=0xDBFF => self.high = Some(unit),
                0xDC00..=0xDFFF => self.push_char(char::REPLACEMENT_CHARACTER),
                _ => self.push_char(char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER)),
            }
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Utf16Decoder<R> {
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
            if this.out_pos < this.out.len() {
                let n = (this.out.len() - this.out_pos).min(buf.remaining());
                buf.put_slice(&this.out[this.out_pos..this.out_pos + n]);
                this.out_pos += n;
                if this.out_pos == this.out.len() {
                    this.out.clear();
                    this.out_pos = 0;
                }
                return Poll::Ready(Ok(()));
            }

            if this.eof {
                if this.raw.is_empty() && this.high.is_none() {
                    return Poll::Ready(Ok(()));
                }
                this.raw.clear();
                this.high = None;
                this.push_char(char::REPLACEMENT_CHARACTER);
                continue;
            }

            let mut chunk = [0u8; 4096];
            let mut read = ReadBuf::new(&mut chunk);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut read))?;
            if read.filled().is_empty() {
                this.eof = true;
            } else {
                this.raw.extend_from_slice(read.filled());
                this.decode_units();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_boms_and_text() {
        let cases: &[(&[u8], TextEncoding)] = &[
            (b"\xfe\xff\x00\x32\x00\x38\x00\x2f\x00\x31", TextEncoding::Utf16Be),
            (b"\xff\xfe\x32\x00\x38\x00\x2f\x00\x31\x00", TextEncoding::Utf16Le),
            (b"\xef\xbb\xbfhello", TextEncoding::Utf8Bom),
            (b"\xbb\xef\x32\xbf\x2f\x38\x30\x31\x32\x2f\x31\x30\x20\x36\x31\x31", TextEncoding::Utf8),
            (b"Hi there!", TextEncoding::Utf8),
            ("中文Hi there!".as_bytes(), TextEncoding::Utf8),
            (b"\x00\x01\x02binary", TextEncoding::Binary),
            (b"", TextEncoding::Utf8),
        ];
        for (data, expected) in cases {
            assert_eq!(detect(data), *expected, "for {:?}", data);
        }
    }

    #[test]
    fn only_the_sniff_window_counts() {
        let mut data = vec![b'a'; SNIFF_LEN];
        data.push(0x01);
        assert_eq!(detect(&data), TextEncoding::Utf8);
    }

    async fn decoded(data: &'static [u8]) -> String {
        let mut reader = decode(io::Cursor::new(data)).await.unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn utf16_is_transcoded() {
        assert_eq!(decoded(b"\xff\xfeh\x00i\x00").await, "hi");
        assert_eq!(decoded(b"\xfe\xff\x00h\x00i").await, "hi");
        // U+1F600 as a surrogate pair
        assert_eq!(decoded(b"\xff\xfe\x3d\xd8\x00\xde").await, "\u{1F600}");
    }

    #[tokio::test]
    async fn broken_utf16_gets_replacement_chars() {
        assert_eq!(decoded(b"\xff\xfeh\x00i").await, "h\u{FFFD}");
        assert_eq!(decoded(b"\xff\xfe\x3d\xd8h\x00").await, "\u{FFFD}h");
    }

    #[tokio::test]
    async fn utf8_bom_is_dropped() {
        assert_eq!(decoded(b"\xef\xbb\xbfplain").await, "plain");
        assert_eq!(decoded(b"plain").await, "plain");
    }

    #[tokio::test]
    async fn long_utf16_stream_crosses_chunks() {
        let text = "abcdefghij".repeat(1000);
        let mut data = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        let mut reader = decode(io::Cursor::new(data)).await.unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, text);
    }
}
