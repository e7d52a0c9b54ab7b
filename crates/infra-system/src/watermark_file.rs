// File-backed WatermarkStore
//
// One `<group> <seconds>` line per task group. Saves replace the file
// atomically so a crash mid-save leaves the previous checkpoint intact.

use async_trait::async_trait;
use skywatch_core::domain::{LogicalTime, Watermarks};
use skywatch_core::error::{AppError, Result};
use skywatch_core::port::WatermarkStore;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::atomic_write::write_atomically;

pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse the checkpoint file; malformed lines are skipped
pub fn parse_watermarks(text: &str) -> Watermarks {
    let mut marks = Watermarks::new();
    for (n, line) in text.lines().enumerate() {
        let mut words = line.split_whitespace();
        let (Some(group), Some(value)) = (words.next(), words.next()) else {
            if !line.trim().is_empty() {
                warn!(line = n + 1, "Watermark line without value, skipping");
            }
            continue;
        };
        match value.parse::<f64>() {
            Ok(secs) if secs.is_finite() => marks.restore(group, LogicalTime::from_secs(secs)),
            _ => warn!(line = n + 1, group, value, "Unparseable watermark, skipping"),
        }
    }
    marks
}

pub fn render_watermarks(marks: &Watermarks) -> String {
    marks
        .iter()
        .map(|(group, t)| format!("{:>16} {}\n", group, t.as_secs()))
        .collect()
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn load(&self) -> Result<Watermarks> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                let marks = parse_watermarks(&text);
                debug!(path = %self.path.display(), groups = marks.len(), "Watermarks loaded");
                Ok(marks)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Watermarks::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, watermarks: &Watermarks) -> Result<()> {
        let path = self.path.clone();
        let contents = render_watermarks(watermarks);

        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            write_atomically(&path, contents.as_bytes())
        })
        .await
        .map_err(|e| AppError::Internal(format!("watermark save task failed: {}", e)))??;

        debug!(path = %self.path.display(), groups = watermarks.len(), "Watermarks saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("highWaterMark.dat"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("state/highWaterMark.dat"));

        let mut marks = Watermarks::new();
        marks.restore("timelapse", LogicalTime::from_secs(1_425_938_400.1));
        marks.restore("video", LogicalTime::from_secs(1_425_938_455.0));
        store.save(&marks).await.unwrap();

        assert_eq!(store.load().await.unwrap(), marks);
    }

    #[test]
    fn test_parse_skips_bad_lines() {
        let marks = parse_watermarks("       timelapse 1425938400.1\nbroken\nvideo nan-ish\n\n");
        assert_eq!(marks.len(), 1);
        assert_eq!(
            marks.get("timelapse"),
            LogicalTime::from_secs(1_425_938_400.1)
        );
    }

    #[test]
    fn test_render_is_padded_and_sorted() {
        let mut marks = Watermarks::new();
        marks.restore("b", LogicalTime::from_secs(2.0));
        marks.restore("a", LogicalTime::from_secs(1.5));
        assert_eq!(
            render_watermarks(&marks),
            format!("{:>16} 1.5\n{:>16} 2\n", "a", "b")
        );
    }
}
