mod local;
mod stream;

pub use local::LocalFileReader;
pub use stream::{CHUNK_SIZE, ChunkReader, ChunkStream, chunks};

use anyhow::{Result, bail};
use async_trait::async_trait;

/// Trait for random access reading from a data source
///
/// Implementations must tolerate interleaved calls from several tasks: every
/// entry of an archive reads through the same shared handle.
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    ///
    /// # Arguments
    ///
    /// * `offset` - Absolute position in the source
    /// * `buf` - Destination, filled from its start
    ///
    /// # Returns
    ///
    /// The number of bytes read, 0 at the end of the source.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely from `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source ends before `buf` is full.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..]).await?;
            if n == 0 {
                bail!(
                    "Unexpected end of data at offset {} ({} of {} bytes read)",
                    offset,
                    filled,
                    buf.len()
                );
            }
            filled += n;
        }
        Ok(())
    }
}
