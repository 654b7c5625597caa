use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::entry::{Entry, EntryMetadata, FileMember};
use super::lifecycle::Lifecycle;
use super::registry::Registry;
use super::{Container, ContainerKind, EntryStream, released};
use crate::error::{Result, WalkError};

/// Paths buffered between the directory walker thread and the async side.
const PATH_QUEUE: usize = 64;
/// Entries buffered ahead of the consumer.
const ENTRY_QUEUE: usize = 32;

type Found = Result<(PathBuf, std::fs::Metadata)>;

/// A directory tree.
///
/// Files are visited depth-first in file name order. A file the registry
/// recognizes is opened as a nested container and its entries are emitted
/// in place of the file; the nested container is closed once drained.
pub struct Folder {
    root: PathBuf,
    registry: Arc<Registry>,
    lifecycle: Arc<Lifecycle<()>>,
}

impl Folder {
    pub fn open(path: &Path, registry: Arc<Registry>) -> Result<Self> {
        let meta = std::fs::metadata(path).map_err(|source| WalkError::io(path, source))?;
        if !meta.is_dir() {
            return Err(WalkError::Traversal {
                path: path.to_path_buf(),
                message: "not a directory".to_string(),
            });
        }
        Ok(Self {
            root: path.to_path_buf(),
            registry,
            lifecycle: Lifecycle::new(path, ()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Container for Folder {
    fn path(&self) -> &Path {
        &self.root
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Folder
    }

    fn items(&self) -> EntryStream {
        let Some(walk) = self.lifecycle.walk() else {
            return released(&self.root);
        };
        let (path_tx, path_rx) = async_channel::bounded::<Found>(PATH_QUEUE);
        let (entry_tx, entry_rx) = async_channel::bounded::<Result<Entry>>(ENTRY_QUEUE);

        let root = self.root.clone();
        tokio::task::spawn_blocking(move || walk_tree(&root, &path_tx));

        let lifecycle = self.lifecycle.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            while let Ok(found) = path_rx.recv().await {
                let sent = match found {
                    Ok((path, meta)) => emit(&path, &meta, &registry, &lifecycle, &entry_tx).await,
                    Err(err) => {
                        warn!(error = %err, "folder traversal error");
                        entry_tx.send(Err(err)).await.is_ok()
                    }
                };
                if !sent {
                    debug!(root = %lifecycle.path().display(), "folder consumer gone, stopping");
                    break;
                }
            }
            // The claim goes before the consumer can see the end of the stream
            drop(walk);
            drop(entry_tx);
        });

        Box::pin(entry_rx)
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

impl Drop for Folder {
    fn drop(&mut self) {
        self.lifecycle.request_close();
    }
}

/// Runs on a blocking thread. Directories are not reported; an unreadable
/// directory yields one error and walkdir moves on to its siblings.
fn walk_tree(root: &Path, tx: &async_channel::Sender<Found>) {
    for item in WalkDir::new(root).sort_by_file_name() {
        let found = match item {
            Ok(dirent) if dirent.file_type().is_dir() => continue,
            Ok(dirent) => match std::fs::metadata(dirent.path()) {
                Ok(meta) if meta.is_dir() => continue,
                Ok(meta) => Ok((dirent.into_path(), meta)),
                Err(source) => Err(WalkError::io(dirent.path(), source)),
            },
            Err(err) => Err(WalkError::Traversal {
                path: err.path().unwrap_or(root).to_path_buf(),
                message: err.to_string(),
            }),
        };
        if tx.send_blocking(found).is_err() {
            return;
        }
    }
}

/// Emit one file, or the entries of the container it holds. Returns false
/// once the consumer has gone away.
async fn emit(
    path: &Path,
    meta: &std::fs::Metadata,
    registry: &Registry,
    lifecycle: &Arc<Lifecycle<()>>,
    tx: &async_channel::Sender<Result<Entry>>,
) -> bool {
    if let Some(opener) = registry.resolve(path) {
        return match opener.open(path).await {
            Ok(nested) => {
                debug!(path = %path.display(), kind = %nested.kind(), "entering nested container");
                let mut items = nested.items();
                let mut delivered = true;
                while let Some(item) = items.next().await {
                    if tx.send(item).await.is_err() {
                        delivered = false;
                        break;
                    }
                }
                nested.close();
                delivered
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "can't open nested container");
                tx.send(Err(err)).await.is_ok()
            }
        };
    }

    let Some(lease) = lifecycle.acquire() else {
        return false;
    };
    let parent = path.parent().unwrap_or(Path::new(""));
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let entry = Entry::new(
        parent,
        name,
        EntryMetadata::from(meta),
        Box::new(FileMember {
            path: path.to_path_buf(),
        }),
        lease,
    );
    tx.send(Ok(entry)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;

    #[tokio::test]
    async fn emits_every_regular_file_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("top.txt"), "1").unwrap();
        fs::write(dir.path().join("a/one.txt"), "2").unwrap();
        fs::write(dir.path().join("a/b/two.log"), "3").unwrap();

        let folder = Folder::open(dir.path(), Arc::new(Registry::new())).unwrap();
        let names: Vec<String> = folder
            .items()
            .map(|item| item.unwrap().full_name().to_string())
            .collect()
            .await;

        let expected: BTreeSet<String> = ["top.txt", "a/one.txt", "a/b/two.log"]
            .iter()
            .map(|p| dir.path().join(p).to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 3);
        assert_eq!(names.into_iter().collect::<BTreeSet<_>>(), expected);
    }

    #[tokio::test]
    async fn visits_in_file_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.txt", "a.txt", "b.txt"] {
            fs::write(dir.path().join(name), name).unwrap();
        }

        let folder = Folder::open(dir.path(), Arc::new(Registry::new())).unwrap();
        let names: Vec<String> = folder
            .items()
            .map(|item| item.unwrap().name().to_string())
            .collect()
            .await;
        assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn close_waits_for_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();

        let folder = Folder::open(dir.path(), Arc::new(Registry::new())).unwrap();
        let mut entries: Vec<Entry> = folder.items().map(|item| item.unwrap()).collect().await;
        assert_eq!(folder.pending(), 2);

        folder.close();
        entries[0].close();
        assert!(!folder.is_released());
        entries[1].close();
        assert!(folder.is_released());
    }

    #[tokio::test]
    async fn traversal_outlives_the_folder_value() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            fs::write(dir.path().join(name), name).unwrap();
        }

        let items = Folder::open(dir.path(), Arc::new(Registry::new()))
            .unwrap()
            .items();
        let found: Vec<Entry> = items.map(|item| item.unwrap()).collect().await;
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn open_rejects_missing_and_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();
        let registry = Arc::new(Registry::new());

        assert!(matches!(
            Folder::open(&dir.path().join("missing"), registry.clone()),
            Err(WalkError::NotFound { .. })
        ));
        assert!(matches!(
            Folder::open(&file, registry),
            Err(WalkError::Traversal { .. })
        ));
    }
}
