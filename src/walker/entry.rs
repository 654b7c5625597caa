use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

use super::lifecycle::Lease;
use crate::encoding;
use crate::error::{Result, WalkError};

/// Content stream of an opened entry.
pub type EntryReader = Pin<Box<dyn AsyncRead + Send>>;

/// Opens the content of one container member.
#[async_trait]
pub trait OpenMember: Send + Sync {
    async fn open(&self) -> Result<EntryReader>;
}

/// Whatever the source exposes about a member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub size: u64,
    /// Unix mode bits, when the source records them
    pub mode: Option<u32>,
    pub modified: Option<DateTime<Utc>>,
}

impl From<&std::fs::Metadata> for EntryMetadata {
    fn from(meta: &std::fs::Metadata) -> Self {
        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            Some(meta.permissions().mode())
        };
        #[cfg(not(unix))]
        let mode = None;

        Self {
            size: meta.len(),
            mode,
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        }
    }
}

/// Entry lifecycle: `Unopened -> Open -> Closed`, `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Unopened,
    Open,
    Closed,
}

/// One file inside a container.
///
/// The content reader is created lazily by [`Entry::open`], at most once.
/// [`Entry::close`] drops the reader and hands the entry's claim back to
/// its container; dropping the entry does the same. [`Entry::try_clone`]
/// gives another reader on the same member, with a claim of its own.
pub struct Entry {
    full_name: String,
    member_name: String,
    metadata: EntryMetadata,
    source: Arc<dyn OpenMember>,
    state: EntryState,
    reader: Option<EntryReader>,
    lease: Lease,
}

impl Entry {
    pub(crate) fn new(
        container: &Path,
        member_name: impl Into<String>,
        metadata: EntryMetadata,
        source: Box<dyn OpenMember>,
        lease: Lease,
    ) -> Self {
        let member_name = member_name.into();
        let full_name = full_name(container, &member_name);
        Self {
            full_name,
            member_name,
            metadata,
            source: Arc::from(source),
            state: EntryState::Unopened,
            reader: None,
            lease,
        }
    }

    /// Container path followed by the member path.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Path of the member inside its container.
    pub fn member_name(&self) -> &str {
        &self.member_name
    }

    /// Base name of the member.
    pub fn name(&self) -> &str {
        self.member_name
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.member_name)
    }

    pub fn metadata(&self) -> &EntryMetadata {
        &self.metadata
    }

    pub fn size(&self) -> u64 {
        self.metadata.size
    }

    pub fn mode(&self) -> Option<u32> {
        self.metadata.mode
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.metadata.modified
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    /// Open the raw content stream. A second call fails with `AlreadyOpen`.
    pub async fn open(&mut self) -> Result<&mut EntryReader> {
        self.check_openable()?;
        let reader = self.source.open().await?;
        self.state = EntryState::Open;
        Ok(self.reader.insert(reader))
    }

    /// Open the content decoded to UTF-8 (BOM sniffed, UTF-16 transcoded).
    pub async fn open_text(&mut self) -> Result<&mut EntryReader> {
        self.check_openable()?;
        let raw = self.source.open().await?;
        let decoded = encoding::decode(raw)
            .await
            .map_err(|source| WalkError::io(self.full_name.clone(), source))?;
        self.state = EntryState::Open;
        Ok(self.reader.insert(decoded))
    }

    /// A fresh, unopened entry for the same member.
    ///
    /// The copy holds its own claim on the container, so the handle stays
    /// until both have been closed.
    ///
    /// # Errors
    ///
    /// `EntryClosed` if this entry was already closed, `Released` if the
    /// container handle is gone.
    pub fn try_clone(&self) -> Result<Entry> {
        if self.state == EntryState::Closed {
            return Err(WalkError::EntryClosed {
                name: self.full_name.clone(),
            });
        }
        let lease = self.lease.duplicate().ok_or_else(|| WalkError::Released {
            path: PathBuf::from(&self.full_name),
        })?;
        Ok(Entry {
            full_name: self.full_name.clone(),
            member_name: self.member_name.clone(),
            metadata: self.metadata.clone(),
            source: self.source.clone(),
            state: EntryState::Unopened,
            reader: None,
            lease,
        })
    }

    /// Release the reader and the container claim. Idempotent.
    pub fn close(&mut self) {
        if self.state == EntryState::Closed {
            return;
        }
        self.reader = None;
        self.state = EntryState::Closed;
        self.lease.release();
    }

    fn check_openable(&self) -> Result<()> {
        match self.state {
            EntryState::Unopened => Ok(()),
            EntryState::Open => Err(WalkError::AlreadyOpen {
                name: self.full_name.clone(),
            }),
            EntryState::Closed => Err(WalkError::EntryClosed {
                name: self.full_name.clone(),
            }),
        }
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("full_name", &self.full_name)
            .field("member_name", &self.member_name)
            .field("metadata", &self.metadata)
            .field("state", &self.state)
            .finish()
    }
}

fn full_name(container: &Path, member: &str) -> String {
    if member.is_empty() {
        return container.to_string_lossy().into_owned();
    }
    let mut full = PathBuf::from(container);
    for part in member.split('/').filter(|p| !p.is_empty()) {
        full.push(part);
    }
    full.to_string_lossy().into_owned()
}

/// A member backed by a plain file on disk.
pub(crate) struct FileMember {
    pub path: PathBuf,
}

#[async_trait]
impl OpenMember for FileMember {
    async fn open(&self) -> Result<EntryReader> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|source| WalkError::io(self.path.clone(), source))?;
        Ok(Box::pin(file))
    }
}
