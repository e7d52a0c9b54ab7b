// Local filesystem adapter for StationFs
// reason: walkdir for recursive input discovery

use async_trait::async_trait;
use skywatch_core::domain::Metadata;
use skywatch_core::error::{AppError, Result};
use skywatch_core::port::{InputFile, StationFs};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::atomic_write::write_atomically;

/// StationFs backed by the local disk
#[derive(Debug, Default, Clone)]
pub struct LocalStationFs;

impl LocalStationFs {
    pub fn new() -> Self {
        Self
    }
}

fn has_ext(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(suffix))
        .unwrap_or(false)
}

fn walk_inputs(dir: &Path, ext: &str) -> Vec<InputFile> {
    let suffix = format!(".{}", ext);
    let mut inputs: Vec<InputFile> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_ext(e.path(), &suffix))
        .map(|e| InputFile {
            size: e.metadata().map(|m| m.len()).unwrap_or(0),
            path: e.into_path(),
        })
        .collect();
    inputs.sort_by(|a, b| a.path.cmp(&b.path));
    inputs
}

fn products_of(stem: &Path, ext: &str) -> std::io::Result<Vec<PathBuf>> {
    let (Some(parent), Some(prefix)) = (stem.parent(), stem.file_name()) else {
        return Ok(Vec::new());
    };
    let prefix = prefix.to_string_lossy().to_string();
    let suffix = format!(".{}", ext);

    let entries = match std::fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut products = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(&prefix) && name.ends_with(&suffix) && entry.path().is_file() {
            products.push(entry.path());
        }
    }
    products.sort();
    Ok(products)
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("filesystem task failed: {}", e)))?
        .map_err(AppError::from)
}

#[async_trait]
impl StationFs for LocalStationFs {
    async fn list_inputs(&self, dir: &Path, ext: &str) -> Result<Vec<InputFile>> {
        let dir = dir.to_path_buf();
        let ext = ext.to_string();
        let inputs = blocking(move || Ok(walk_inputs(&dir, &ext))).await?;
        debug!(count = inputs.len(), "Listed inputs");
        Ok(inputs)
    }

    async fn list_products(&self, stem: &Path, ext: &str) -> Result<Vec<PathBuf>> {
        let stem = stem.to_path_buf();
        let ext = ext.to_string();
        blocking(move || products_of(&stem, &ext)).await
    }

    async fn read_sidecar(&self, path: &Path) -> Result<Option<Metadata>> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(Metadata::parse(&text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_sidecar(&self, path: &Path, metadata: &Metadata) -> Result<()> {
        let path = path.to_path_buf();
        let contents = metadata.render();
        blocking(move || write_atomically(&path, contents.as_bytes())).await
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
