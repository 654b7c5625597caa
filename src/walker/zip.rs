use async_trait::async_trait;
use futures::stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::entry::{Entry, EntryMetadata, EntryReader, OpenMember};
use super::lifecycle::Lifecycle;
use super::{Container, ContainerKind, EntryStream, open_reader, released};
use crate::error::{Result, WalkError};
use crate::io::LocalFileReader;
use crate::zip::{CompressionMethod, ZipFileEntry, ZipParser};

type Parser = ZipParser<LocalFileReader>;

/// A zip archive. The central directory is indexed once at open; member
/// content is streamed and inflated on demand through the shared parser.
pub struct ZipArchive {
    path: PathBuf,
    members: Arc<Vec<ZipFileEntry>>,
    lifecycle: Arc<Lifecycle<Parser>>,
}

impl ZipArchive {
    pub async fn open(path: &Path) -> Result<Self> {
        let parser = ZipParser::new(open_reader(path)?);
        let members: Vec<_> = parser
            .list_files()
            .await
            .map_err(|err| WalkError::archive(path, err))?
            .into_iter()
            .filter(|member| !member.is_directory)
            .collect();
        debug!(path = %path.display(), members = members.len(), "zip indexed");

        Ok(Self {
            path: path.to_path_buf(),
            members: Arc::new(members),
            lifecycle: Lifecycle::new(path, parser),
        })
    }

    /// Number of non-directory members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[async_trait]
impl Container for ZipArchive {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Zip
    }

    fn items(&self) -> EntryStream {
        let Some(walk) = self.lifecycle.walk() else {
            return released(&self.path);
        };
        let members = self.members.clone();
        let lifecycle = self.lifecycle.clone();

        // The walk lease rides in the state and goes when the stream ends
        Box::pin(stream::unfold((0usize, walk), move |(index, walk)| {
            let members = members.clone();
            let lifecycle = lifecycle.clone();
            async move {
                let member = members.get(index)?.clone();
                let Some(lease) = lifecycle.acquire() else {
                    let err = WalkError::Released {
                        path: lifecycle.path().to_path_buf(),
                    };
                    return Some((Err(err), (members.len(), walk)));
                };

                let metadata = EntryMetadata {
                    size: member.uncompressed_size,
                    mode: member.unix_mode(),
                    modified: member.modified(),
                };
                let entry = Entry::new(
                    lifecycle.path(),
                    member.file_name.clone(),
                    metadata,
                    Box::new(ZipMember {
                        lifecycle: lifecycle.clone(),
                        member,
                    }),
                    lease,
                );
                Some((Ok(entry), (index + 1, walk)))
            }
        }))
    }

    fn close(&self) {
        self.lifecycle.request_close();
    }

    fn pending(&self) -> usize {
        self.lifecycle.pending()
    }

    fn is_released(&self) -> bool {
        self.lifecycle.is_released()
    }

    async fn released(&self) {
        self.lifecycle.released().await
    }
}

impl Drop for ZipArchive {
    fn drop(&mut self) {
        self.lifecycle.request_close();
    }
}

struct ZipMember {
    lifecycle: Arc<Lifecycle<Parser>>,
    member: ZipFileEntry,
}

impl ZipMember {
    fn display_name(&self) -> String {
        format!("{}:{}", self.lifecycle.path().display(), self.member.file_name)
    }
}

#[async_trait]
impl OpenMember for ZipMember {
    async fn open(&self) -> Result<EntryReader> {
        if let CompressionMethod::Unknown(method) = self.member.compression_method {
            return Err(WalkError::Unsupported {
                name: self.display_name(),
                method,
            });
        }

        let parser = self.lifecycle.handle()?;
        let reader = parser
            .open_member(&self.member, self.display_name())
            .await
            .map_err(|err| WalkError::archive(self.lifecycle.path(), err))?;
        Ok(Box::pin(reader))
    }
}
