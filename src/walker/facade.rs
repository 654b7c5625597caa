use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{Container, Folder, Registry, SingleFile};
use crate::error::{Result, WalkError};

/// Opens any path as a [`Container`].
///
/// The registry is consulted first; otherwise a directory becomes a
/// [`Folder`] and anything else a [`SingleFile`].
#[derive(Debug, Clone)]
pub struct Walker {
    registry: Arc<Registry>,
}

impl Walker {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn open(&self, path: &Path) -> Result<Box<dyn Container>> {
        if let Some(opener) = self.registry.resolve(path) {
            return opener.open(path).await;
        }

        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|source| WalkError::io(path, source))?;
        let container: Box<dyn Container> = if meta.is_dir() {
            Box::new(Folder::open(path, self.registry.clone())?)
        } else {
            Box::new(SingleFile::open(path)?)
        };
        debug!(path = %path.display(), kind = %container.kind(), "opened");
        Ok(container)
    }
}

impl Default for Walker {
    fn default() -> Self {
        Self::new(Arc::new(Registry::with_defaults()))
    }
}
