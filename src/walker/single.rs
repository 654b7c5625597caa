use async_trait::async_trait;
use futures::stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::entry::{Entry, EntryMetadata, FileMember};
use super::lifecycle::Lifecycle;
use super::{Container, ContainerKind, EntryStream, released};
use crate::error::{Result, WalkError};

/// A plain file seen as a container holding exactly itself.
pub struct SingleFile {
    path: PathBuf,
    lifecycle: Arc<Lifecycle<()>>,
}

impl SingleFile {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::symlink_metadata(path).map_err(|source| WalkError::io(path, source))?;
        Ok(Self {
            path: path.to_path_buf(),
            lifecycle: Lifecycle::new(path, ()),
        })
    }
}

#[async_trait]
impl Container for SingleFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::File
    }

    fn items(&self) -> EntryStream {
        let Some(walk) = self.lifecycle.walk() else {
            return released(&self.path);
        };
        let path = self.path.clone();
        let lifecycle = self.lifecycle.clone();

        Box::pin(stream::once(async move {
            let _walk = walk;
            let meta = tokio::fs::metadata(&path)
                .await
                .map_err(|source| WalkError::io(path.clone(), source))?;
            let lease = lifecycle.acquire().ok_or_else(|| WalkError::Released {
                path: path.clone(),
            })?;
            let parent = path.parent().unwrap_or(Path::new(""));
            let member = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(Entry::new(
                parent,
                member,
                EntryMetadata::from(&meta),
                Box::new(FileMember { path: path.clone() }),
                lease,
            ))
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

impl Drop for SingleFile {
    fn drop(&mut self) {
        self.lifecycle.request_close();
    }
}
