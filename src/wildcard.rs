//! Wildcard expansion and file masks.

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Result, WalkError};

/// Whether `pattern` contains any wildcard metacharacter.
pub fn has_meta(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expand `pattern` into the existing paths it matches.
///
/// Paths come out in lexicographic order at every directory level, and
/// wildcards in intermediate segments are expanded too. A pattern without
/// metacharacters yields itself when the path exists. Unreadable
/// directories are skipped.
pub fn expand(pattern: &str) -> Result<Vec<PathBuf>> {
    if !has_meta(pattern) {
        return Ok(if Path::new(pattern).symlink_metadata().is_ok() {
            vec![PathBuf::from(pattern)]
        } else {
            Vec::new()
        });
    }

    let paths = glob::glob(pattern).map_err(|err| WalkError::Pattern {
        pattern: pattern.to_string(),
        message: err.msg.to_string(),
    })?;

    let mut matches = Vec::new();
    for path in paths {
        match path {
            Ok(path) => matches.push(path),
            Err(err) => warn!(path = %err.path().display(), error = %err.error(), "skipping unreadable path"),
        }
    }
    Ok(matches)
}

/// Glob mask matched against base names, e.g. `*.txt`.
#[derive(Debug, Clone)]
pub struct Mask {
    pattern: glob::Pattern,
}

impl Mask {
    pub fn new(mask: &str) -> Result<Self> {
        let pattern = glob::Pattern::new(mask).map_err(|err| WalkError::Pattern {
            pattern: mask.to_string(),
            message: err.msg.to_string(),
        })?;
        Ok(Self { pattern })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.matches_with(
            name,
            glob::MatchOptions {
                case_sensitive: true,
                require_literal_separator: true,
                require_literal_leading_dot: false,
            },
        )
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn expands_in_lexicographic_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.md", "a.md", "c.txt"] {
            fs::write(dir.path().join(name), name).unwrap();
        }
        for sub in ["z", "y"] {
            fs::create_dir(dir.path().join(sub)).unwrap();
            fs::write(dir.path().join(sub).join("n.md"), sub).unwrap();
        }

        let root = dir.path().display().to_string();
        let top = expand(&format!("{}/*.md", root)).unwrap();
        assert_eq!(top, vec![dir.path().join("a.md"), dir.path().join("b.md")]);

        let nested = expand(&format!("{}/*/n.md", root)).unwrap();
        assert_eq!(
            nested,
            vec![dir.path().join("y").join("n.md"), dir.path().join("z").join("n.md")]
        );
    }

    #[test]
    fn literal_patterns_need_an_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        let literal = file.display().to_string();
        assert_eq!(expand(&literal).unwrap(), vec![file.clone()]);
        assert!(expand(&format!("{}.missing", literal)).unwrap().is_empty());
    }

    #[test]
    fn no_match_is_empty_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*.nothing", dir.path().display());
        assert!(expand(&pattern).unwrap().is_empty());
    }

    #[test]
    fn malformed_pattern_is_reported() {
        assert!(matches!(expand("[unclosed"), Err(WalkError::Pattern { .. })));
        assert!(Mask::new("[").is_err());
    }

    #[test]
    fn mask_matches_base_names() {
        let mask = Mask::new("*.txt").unwrap();
        assert!(mask.matches("notes.txt"));
        assert!(!mask.matches("notes.md"));
        assert!(!mask.matches("dir/notes.txt"));
        assert_eq!(mask.as_str(), "*.txt");
    }
}
