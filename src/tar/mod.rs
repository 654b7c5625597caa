//! TAR archive parsing.
//!
//! A tar archive is a sequence of 512-byte headers, each followed by the
//! member's data padded to the next block boundary. The archive ends with
//! two zero blocks (a single one, or plain EOF, is accepted too).
//!
//! ## Supported Features
//!
//! - POSIX ustar headers, including the `prefix` field for long paths
//! - GNU `L` long-name records and base-256 encoded sizes
//! - pax extended headers (`x`) overriding `path` and `size`
//!
//! Member data is located by offset, so every member can be read
//! independently through a shared [`ReadAt`](crate::io::ReadAt) source.

mod parser;
mod structures;

pub use parser::TarParser;
pub use structures::*;
