//! Filesystem-backed activity registry.

use std::path::{Path, PathBuf};

use crate::core::{ActivityRegistry, PoolError};

/// Resolves relative references to files under a root directory.
///
/// A reference resolves if `root/reference` is a file, or failing that
/// `root/reference.<ext>` for each configured extension in order.
#[derive(Debug, Clone)]
pub struct FsActivityRegistry {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FsActivityRegistry {
    /// Registry rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: Vec::new(),
        }
    }

    /// Extensions tried when the bare reference does not exist, e.g. `["sh", "py"]`.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_owned())
            .collect();
        self
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ActivityRegistry for FsActivityRegistry {
    fn resolve(&self, reference: &str) -> Result<String, PoolError> {
        if Path::new(reference).is_absolute() {
            return Ok(reference.to_owned());
        }
        let base = self.root.join(reference);
        std::iter::once(base.clone())
            .chain(
                self.extensions
                    .iter()
                    .map(|ext| self.root.join(format!("{reference}.{ext}"))),
            )
            .find(|candidate| candidate.is_file())
            .map(|found| found.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PoolError::ActivityNotFound(format!("{reference} (under {})", self.root.display()))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_resolves_existing_files_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("plain"), "").unwrap();
        fs::write(dir.path().join("script.sh"), "").unwrap();
        let registry = FsActivityRegistry::new(dir.path()).with_extensions([".sh", "py"]);

        assert!(registry.resolve("plain").unwrap().ends_with("plain"));
        assert!(registry.resolve("script").unwrap().ends_with("script.sh"));
        assert!(matches!(registry.resolve("missing"), Err(PoolError::ActivityNotFound(_))));
    }

    #[test]
    fn test_directories_do_not_resolve() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        let registry = FsActivityRegistry::new(dir.path());
        assert!(registry.resolve("nested").is_err());
    }
}
