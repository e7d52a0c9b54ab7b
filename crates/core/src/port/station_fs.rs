// Station filesystem port
// Input discovery, product lookup, and sidecar metadata IO

use crate::domain::Metadata;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A candidate input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Filesystem operations needed by discovery and the runner
#[async_trait]
pub trait StationFs: Send + Sync {
    /// Recursively list files under `dir` ending in `.<ext>`
    ///
    /// A directory that does not exist yet yields an empty list. Results are
    /// in a stable (path-sorted) order.
    async fn list_inputs(&self, dir: &Path, ext: &str) -> Result<Vec<InputFile>>;

    /// Files next to `stem` whose name starts with the stem's file name and
    /// ends with `.<ext>`
    async fn list_products(&self, stem: &Path, ext: &str) -> Result<Vec<PathBuf>>;

    /// Read a sidecar metadata file (`None` if absent)
    async fn read_sidecar(&self, path: &Path) -> Result<Option<Metadata>>;

    /// Write (replace) a sidecar metadata file
    async fn write_sidecar(&self, path: &Path, metadata: &Metadata) -> Result<()>;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    async fn remove_file(&self, path: &Path) -> Result<()>;
}

/// Sidecar path for a file: same stem, `.txt` extension
pub fn sidecar_path(path: &Path) -> PathBuf {
    path.with_extension("txt")
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;

    /// In-memory filesystem: path -> contents, plus created directories
    #[derive(Default)]
    pub struct InMemoryFs {
        files: Mutex<BTreeMap<PathBuf, String>>,
        dirs: Mutex<BTreeSet<PathBuf>>,
    }

    impl InMemoryFs {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_file(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
            self.files
                .lock()
                .unwrap()
                .insert(path.into(), contents.into());
        }

        pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
            self.files.lock().unwrap().get(path.as_ref()).cloned()
        }

        pub fn exists(&self, path: impl AsRef<Path>) -> bool {
            self.files.lock().unwrap().contains_key(path.as_ref())
        }

        pub fn dir_created(&self, path: impl AsRef<Path>) -> bool {
            self.dirs.lock().unwrap().contains(path.as_ref())
        }
    }

    #[async_trait]
    impl StationFs for InMemoryFs {
        async fn list_inputs(&self, dir: &Path, ext: &str) -> Result<Vec<InputFile>> {
            let suffix = format!(".{}", ext);
            Ok(self
                .files
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p.starts_with(dir) && p.to_string_lossy().ends_with(&suffix))
                .map(|(p, c)| InputFile {
                    path: p.clone(),
                    size: c.len() as u64,
                })
                .collect())
        }

        async fn list_products(&self, stem: &Path, ext: &str) -> Result<Vec<PathBuf>> {
            let (Some(parent), Some(prefix)) = (stem.parent(), stem.file_name()) else {
                return Ok(Vec::new());
            };
            let prefix = prefix.to_string_lossy().to_string();
            let suffix = format!(".{}", ext);
            Ok(self
                .files
                .lock()
                .unwrap()
                .keys()
                .filter(|p| p.parent() == Some(parent))
                .filter(|p| {
                    let name = p.file_name().map(|n| n.to_string_lossy().to_string());
                    matches!(name, Some(n) if n.starts_with(&prefix) && n.ends_with(&suffix))
                })
                .cloned()
                .collect())
        }

        async fn read_sidecar(&self, path: &Path) -> Result<Option<Metadata>> {
            Ok(self.contents(path).map(|c| Metadata::parse(&c)))
        }

        async fn write_sidecar(&self, path: &Path, metadata: &Metadata) -> Result<()> {
            self.add_file(path, metadata.render());
            Ok(())
        }

        async fn create_dir_all(&self, path: &Path) -> Result<()> {
            self.dirs.lock().unwrap().insert(path.to_path_buf());
            Ok(())
        }

        async fn remove_file(&self, path: &Path) -> Result<()> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }
    }
}
