use std::sync::Arc;

use anyhow::{Context, Result, bail};

use super::structures::*;
use crate::io::{ChunkReader, ReadAt, chunks};

/// Upper bound for GNU long-name and pax payloads kept in memory.
const MAX_META_SIZE: u64 = 1 << 20;

/// Sequential tar header reader over a positional source.
pub struct TarParser<R: ReadAt> {
    reader: Arc<R>,
    size: u64,
}

impl<R: ReadAt> TarParser<R> {
    /// Create a new tar parser with the given reader.
    ///
    /// # Arguments
    ///
    /// * `reader` - A shared reference to a reader implementing [`ReadAt`]
    ///
    /// # Returns
    ///
    /// A new parser instance. Nothing is read until
    /// [`next_member()`](Self::next_member) is called.
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Read the member whose header starts at `offset`.
    ///
    /// Meta records (GNU long names, pax headers) are folded into the member
    /// they describe.
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset of a header block; 0 for the first member
    ///
    /// # Returns
    ///
    /// The member and the offset of the following header, or `None` at the
    /// end of the archive.
    ///
    /// # Errors
    ///
    /// Returns an error for a corrupt or truncated header, or a member whose
    /// data would lie past the end of the archive.
    pub async fn next_member(&self, mut offset: u64) -> Result<Option<(TarMember, u64)>> {
        let mut long_name: Option<String> = None;
        let mut pax = PaxOverrides::default();

        loop {
            if offset + BLOCK_SIZE as u64 > self.size {
                if offset == self.size {
                    return Ok(None);
                }
                bail!("Truncated tar header at offset {}", offset);
            }

            let mut block = [0u8; BLOCK_SIZE];
            self.reader.read_exact_at(offset, &mut block).await?;
            let Some(header) = TarHeader::from_block(&block)
                .with_context(|| format!("header at offset {}", offset))?
            else {
                return Ok(None);
            };

            let data_offset = offset + BLOCK_SIZE as u64;
            let is_meta = matches!(
                header.typeflag,
                typeflag::GNU_LONG_NAME
                    | typeflag::GNU_LONG_LINK
                    | typeflag::PAX_EXTENDED
                    | typeflag::PAX_GLOBAL
            );
            // A pax size describes the member, never the meta record itself
            let size = if is_meta {
                header.size
            } else if is_header_only(header.typeflag) {
                0
            } else {
                pax.size.unwrap_or(header.size)
            };
            let in_bounds = data_offset
                .checked_add(size)
                .is_some_and(|end| end <= self.size);
            if !in_bounds {
                bail!(
                    "Member {} ({} bytes) extends past the end of the archive",
                    header.path(),
                    size
                );
            }
            // Bounded by the archive size now, so the padding can't overflow
            let next = data_offset + padded_size(size);

            match header.typeflag {
                typeflag::GNU_LONG_NAME => {
                    let data = self.read_meta(data_offset, header.size).await?;
                    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                    long_name = Some(String::from_utf8_lossy(&data[..end]).into_owned());
                }
                typeflag::PAX_EXTENDED => {
                    let data = self.read_meta(data_offset, header.size).await?;
                    pax = PaxOverrides::parse(&data).context("pax extended header")?;
                }
                typeflag::GNU_LONG_LINK | typeflag::PAX_GLOBAL => {}
                _ => {
                    let name = pax
                        .path
                        .take()
                        .or_else(|| long_name.take())
                        .unwrap_or_else(|| header.path());
                    let member = TarMember {
                        name,
                        size,
                        mode: header.mode,
                        mtime: pax.mtime.unwrap_or(header.mtime),
                        typeflag: header.typeflag,
                        data_offset,
                    };
                    return Ok(Some((member, next)));
                }
            }

            offset = next;
        }
    }

    async fn read_meta(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        if size > MAX_META_SIZE {
            bail!("Tar meta record of {} bytes is too large", size);
        }
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact_at(offset, &mut data).await?;
        Ok(data)
    }
}

impl<R: ReadAt + 'static> TarParser<R> {
    /// Stream a member's content.
    ///
    /// # Arguments
    ///
    /// * `member` - A member returned by [`next_member()`](Self::next_member)
    ///
    /// # Returns
    ///
    /// An [`AsyncRead`](tokio::io::AsyncRead) reading the member's data in
    /// bounded chunks from the shared reader.
    pub fn open_member(&self, member: &TarMember) -> ChunkReader {
        ChunkReader::new(chunks(self.reader.clone(), member.data_offset, member.size))
    }
}
