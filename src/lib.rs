//! # walkpipe
//!
//! Walk folders, zip archives and tar archives as one tree, and stream the
//! files found through concurrent processing pipelines.
//!
//! Every source is a [`Container`] producing [`Entry`] values. A folder
//! that holds an archive yields the archive's members in place of the
//! archive file. Containers stay open for as long as any entry they emitted
//! is still alive: [`Container::close`] only asks for the release, the last
//! entry to be closed performs it.
//!
//! ## Features
//!
//! - Folder traversal in file name order, nested archives entered transparently
//! - ZIP (STORED, DEFLATE, ZIP64) with CRC-32 verification
//! - tar (ustar, GNU long names, pax headers)
//! - UTF-16 and BOM-aware text decoding of entry content
//! - Operators composed into sequential and fan-out pipelines
//!
//! ## Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use std::path::Path;
//! use walkpipe::Walker;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let walker = Walker::default();
//!     let container = walker.open(Path::new("backup.zip")).await?;
//!
//!     let mut entries = container.items();
//!     while let Some(entry) = entries.next().await {
//!         let entry = entry?;
//!         println!("{} ({} bytes)", entry.full_name(), entry.size());
//!     }
//!
//!     container.close();
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod encoding;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod tar;
pub mod walker;
pub mod wildcard;
pub mod zip;

pub use cli::Cli;
pub use error::{Result, WalkError};
pub use io::{LocalFileReader, ReadAt};
pub use pipeline::{Flow, Item, Operator, ParallelFlow, Shutdown};
pub use walker::{Container, ContainerKind, Entry, EntryState, Registry, Walker};
