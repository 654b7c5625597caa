use async_trait::async_trait;
use futures::stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

use super::entry::{Entry, EntryMetadata, EntryReader, OpenMember};
use super::lifecycle::Lifecycle;
use super::{Container, ContainerKind, EntryStream, open_reader, released};
use crate::error::{Result, WalkError};
use crate::io::LocalFileReader;
use crate::tar::{TarMember, TarParser};

type Parser = TarParser<LocalFileReader>;

/// A tar archive. Headers are read lazily, one member per stream step, so
/// emission follows the archive's own order. Every member except
/// directories becomes an entry; links and special files read as empty.
pub struct TarArchive {
    path: PathBuf,
    lifecycle: Arc<Lifecycle<Parser>>,
}

impl TarArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let parser = TarParser::new(open_reader(path)?);
        Ok(Self {
            path: path.to_path_buf(),
            lifecycle: Lifecycle::new(path, parser),
        })
    }
}

#[async_trait]
impl Container for TarArchive {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Tar
    }

    fn items(&self) -> EntryStream {
        let Some(walk) = self.lifecycle.walk() else {
            return released(&self.path);
        };
        let lifecycle = self.lifecycle.clone();

        // State: next header offset and the walk lease, `None` once done
        Box::pin(stream::unfold(Some((0u64, walk)), move |state| {
            let lifecycle = lifecycle.clone();
            async move {
                let (mut offset, walk) = state?;
                let parser = match lifecycle.handle() {
                    Ok(parser) => parser,
                    Err(err) => return Some((Err(err), None)),
                };

                loop {
                    let (member, next) = match parser.next_member(offset).await {
                        Ok(Some(found)) => found,
                        Ok(None) => return None,
                        Err(err) => {
                            return Some((Err(WalkError::archive(lifecycle.path(), err)), None));
                        }
                    };
                    if member.is_directory() {
                        trace!(member = %member.name, "skipping tar directory");
                        offset = next;
                        continue;
                    }

                    let Some(lease) = lifecycle.acquire() else {
                        let err = WalkError::Released {
                            path: lifecycle.path().to_path_buf(),
                        };
                        return Some((Err(err), None));
                    };
                    let metadata = EntryMetadata {
                        size: member.size,
                        mode: Some(member.mode),
                        modified: member.modified(),
                    };
                    let entry = Entry::new(
                        lifecycle.path(),
                        member.name.clone(),
                        metadata,
                        Box::new(TarMemberSource {
                            lifecycle: lifecycle.clone(),
                            member,
                        }),
                        lease,
                    );
                    return Some((Ok(entry), Some((next, walk))));
                }
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

impl Drop for TarArchive {
    fn drop(&mut self) {
        self.lifecycle.request_close();
    }
}

struct TarMemberSource {
    lifecycle: Arc<Lifecycle<Parser>>,
    member: TarMember,
}

#[async_trait]
impl OpenMember for TarMemberSource {
    async fn open(&self) -> Result<EntryReader> {
        let parser = self.lifecycle.handle()?;
        Ok(Box::pin(parser.open_member(&self.member)))
    }
}
