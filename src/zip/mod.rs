//! ZIP archive parsing.
//!
//! ## Architecture
//!
//! - [`structures`]: ZIP format records (EOCD, ZIP64 locator and EOCD,
//!   central directory entries) and member metadata
//! - [`parser`]: reads those records through a [`ReadAt`](crate::io::ReadAt)
//!   source and opens members
//! - [`MemberReader`]: streams one member, inflating and checking it as it
//!   goes
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The EOCD is read first, then the Central Directory, so an archive is
//! indexed without touching member data. Members are streamed in bounded
//! positional reads, which lets any number of them be decompressed at once
//! against a single open file.
//!
//! ## Supported Features
//!
//! - ZIP64 extensions for files > 4GB
//! - STORED and DEFLATE methods
//! - Unix permissions and DOS timestamps
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod parser;
mod stream;
mod structures;

pub use parser::ZipParser;
pub use stream::MemberReader;
pub use structures::*;
