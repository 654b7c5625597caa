//! Uniform traversal of folders and archives.
//!
//! ## Architecture
//!
//! - [`Registry`]: ordered (matcher, opener) pairs deciding which container
//!   type opens a path. First match wins.
//! - [`Container`]: one opened source. Implementations: [`Folder`],
//!   [`ZipArchive`], [`TarArchive`], [`SingleFile`].
//! - [`Entry`]: one file inside a container, with lazy content access.
//! - [`Walker`]: resolves a path through the registry, falling back to a
//!   folder or a single file.
//!
//! A folder walk delegates to the registry for every file it meets, so an
//! archive found inside a folder is entered transparently and its members
//! are emitted in place of the archive file.
//!
//! ## Closing
//!
//! Every emitted entry holds a claim on its container, and so does a
//! traversal while its stream is alive. [`Container::close`] returns
//! immediately; the underlying handle is dropped once the last claim is
//! gone. Dropping the container value is a close request, so a stream
//! obtained from [`Container::items`] keeps yielding after its container
//! was dropped.

mod entry;
mod facade;
mod folder;
mod lifecycle;
mod registry;
mod single;
mod tar;
mod zip;

pub use entry::{Entry, EntryMetadata, EntryReader, EntryState, OpenMember};
pub use facade::Walker;
pub use folder::Folder;
pub use lifecycle::{Lease, Lifecycle};
pub use registry::{Matcher, Opener, Registry, extension_matcher};
pub use single::SingleFile;
pub use tar::TarArchive;
pub use zip::ZipArchive;

use async_trait::async_trait;
use futures::Stream;
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{Result, WalkError};
use crate::io::LocalFileReader;

/// Lazy sequence of entries produced by [`Container::items`].
///
/// An `Err` item reports a traversal failure; for archives it ends the
/// stream, for folders it ends only the affected directory branch.
pub type EntryStream = Pin<Box<dyn Stream<Item = Result<Entry>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Folder,
    Zip,
    Tar,
    File,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContainerKind::Folder => "folder",
            ContainerKind::Zip => "zip",
            ContainerKind::Tar => "tar",
            ContainerKind::File => "file",
        })
    }
}

/// An openable source of entries.
#[async_trait]
pub trait Container: Send + Sync {
    fn path(&self) -> &Path;

    fn kind(&self) -> ContainerKind;

    /// Stream the entries. Must be called from within a tokio runtime.
    fn items(&self) -> EntryStream;

    /// Request release of the underlying handle. Never blocks: the release
    /// happens once every emitted entry is closed.
    fn close(&self);

    /// Entries emitted and not yet closed.
    fn pending(&self) -> usize;

    fn is_released(&self) -> bool;

    /// Wait until the handle has actually been released.
    async fn released(&self);
}

impl fmt::Debug for dyn Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("kind", &self.kind())
            .field("path", &self.path())
            .field("pending", &self.pending())
            .finish()
    }
}

impl fmt::Display for dyn Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path().display(), self.kind())
    }
}

/// A traversal of a container whose handle is already gone.
fn released(path: &Path) -> EntryStream {
    let err = WalkError::Released {
        path: path.to_path_buf(),
    };
    Box::pin(futures::stream::once(futures::future::ready(Err::<Entry, _>(err))))
}

/// Open an archive file for positional reads.
fn open_reader(path: &Path) -> Result<Arc<LocalFileReader>> {
    LocalFileReader::new(path)
        .map(Arc::new)
        .map_err(|err| match err.downcast::<std::io::Error>() {
            Ok(source) => WalkError::io(path, source),
            Err(err) => WalkError::archive(path, err),
        })
}
