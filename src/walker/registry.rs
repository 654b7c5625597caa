use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::trace;

use super::{Container, TarArchive, ZipArchive};
use crate::error::Result;

/// Decides whether a path is a container of some type.
pub type Matcher = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// Opens a path as a container.
pub struct Opener {
    name: &'static str,
    open: Box<dyn Fn(PathBuf) -> BoxFuture<'static, Result<Box<dyn Container>>> + Send + Sync>,
}

impl Opener {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn open(&self, path: &Path) -> BoxFuture<'static, Result<Box<dyn Container>>> {
        (self.open)(path.to_path_buf())
    }
}

struct Registration {
    matcher: Matcher,
    opener: Opener,
}

/// Ordered list of container types.
///
/// Built once at startup and shared by reference; registration is not
/// meant to race with walks.
#[derive(Default)]
pub struct Registry {
    registrations: Vec<Registration>,
}

impl Registry {
    /// An empty registry: every file is a plain file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zip first, then tar.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("zip", extension_matcher("zip"), |path| async move {
            ZipArchive::open(&path)
                .await
                .map(|archive| Box::new(archive) as Box<dyn Container>)
        });
        registry.register("tar", extension_matcher("tar"), |path| async move {
            TarArchive::open(&path).map(|archive| Box::new(archive) as Box<dyn Container>)
        });
        registry
    }

    /// Append a container type. Earlier registrations take precedence.
    pub fn register<M, O, F>(&mut self, name: &'static str, matcher: M, opener: O)
    where
        M: Fn(&Path) -> bool + Send + Sync + 'static,
        O: Fn(PathBuf) -> F + Send + Sync + 'static,
        F: Future<Output = Result<Box<dyn Container>>> + Send + 'static,
    {
        self.registrations.push(Registration {
            matcher: Box::new(matcher),
            opener: Opener {
                name,
                open: Box::new(move |path| opener(path).boxed()),
            },
        });
    }

    /// First opener whose matcher accepts `path`.
    pub fn resolve(&self, path: &Path) -> Option<&Opener> {
        let found = self
            .registrations
            .iter()
            .find(|registration| (registration.matcher)(path))
            .map(|registration| &registration.opener);
        if let Some(opener) = found {
            trace!(path = %path.display(), opener = opener.name(), "resolved container type");
        }
        found
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.registrations.iter().map(|r| r.opener.name)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Case-insensitive file extension matcher.
pub fn extension_matcher(extension: &'static str) -> impl Fn(&Path) -> bool + Send + Sync + 'static {
    move |path: &Path| {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::SingleFile;

    #[test]
    fn extension_matching_ignores_case() {
        let zip = extension_matcher("zip");
        assert!(zip(Path::new("a/b/archive.ZIP")));
        assert!(zip(Path::new("archive.zip")));
        assert!(!zip(Path::new("archive.zip.txt")));
        assert!(!zip(Path::new("zip")));
    }

    #[test]
    fn defaults_resolve_by_extension() {
        let registry = Registry::with_defaults();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["zip", "tar"]);
        assert_eq!(registry.resolve(Path::new("x.zip")).unwrap().name(), "zip");
        assert_eq!(registry.resolve(Path::new("x.tar")).unwrap().name(), "tar");
        assert!(registry.resolve(Path::new("x.txt")).is_none());
    }

    #[test]
    fn first_registration_wins() {
        let mut registry = Registry::new();
        registry.register("first", |_: &Path| true, |path| async move {
            SingleFile::open(&path).map(|file| Box::new(file) as Box<dyn Container>)
        });
        registry.register("second", |_: &Path| true, |path| async move {
            SingleFile::open(&path).map(|file| Box::new(file) as Box<dyn Container>)
        });
        assert_eq!(registry.resolve(Path::new("any")).unwrap().name(), "first");
        assert_eq!(registry.len(), 2);
    }
}
