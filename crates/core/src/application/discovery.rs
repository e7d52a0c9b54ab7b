//! Job discovery
//!
//! Walks a task group's input directories and turns every file newer than the
//! group's watermark into a `Job`. Pure apart from filesystem reads: output
//! directories are created later by the runner.

use crate::domain::{
    day_name_from_filename, instant_from_filename, Job, JobParams, LogicalTime, Metadata,
    TaskGroup, TaskSpec,
};
use crate::error::Result;
use crate::port::station_fs::sidecar_path;
use crate::port::{InputFile, StationFs};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Station-wide values exposed to every command template
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub binary_path: PathBuf,
    pub camera_id: String,
    pub pid: u32,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("/usr/local/bin"),
            camera_id: String::new(),
            pid: std::process::id(),
        }
    }
}

pub struct Discoverer {
    fs: Arc<dyn StationFs>,
    settings: DiscoverySettings,
}

impl Discoverer {
    pub fn new(fs: Arc<dyn StationFs>, settings: DiscoverySettings) -> Self {
        Self { fs, settings }
    }

    /// Jobs for every input strictly newer than `watermark`, in discovery order
    ///
    /// Zero-size files (still being written) and names without a timestamp
    /// are skipped. An unreadable input directory skips that task only.
    pub async fn discover(&self, group: &TaskGroup, watermark: LogicalTime) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();

        for task in &group.tasks {
            let inputs = match self.fs.list_inputs(&task.input_dir, &task.input_ext).await {
                Ok(inputs) => inputs,
                Err(e) => {
                    warn!(
                        task_group = %group.key,
                        input_dir = %task.input_dir.display(),
                        error = %e,
                        "Cannot list input directory, skipping task"
                    );
                    continue;
                }
            };

            for input in inputs {
                if let Some(job) = self.candidate(group, task, &input, watermark).await {
                    jobs.push(job);
                }
            }
        }

        info!(
            task_group = %group.key,
            watermark = %watermark,
            discovered = jobs.len(),
            "Discovery finished"
        );
        Ok(jobs)
    }

    async fn candidate(
        &self,
        group: &TaskGroup,
        task: &TaskSpec,
        input: &InputFile,
        watermark: LogicalTime,
    ) -> Option<Job> {
        if input.size == 0 {
            debug!(input = %input.path.display(), "Skipping zero-size input (still being written)");
            return None;
        }

        let file_name = input.path.file_name()?.to_string_lossy().to_string();
        let Some(logical_time) = instant_from_filename(&file_name) else {
            warn!(input = %input.path.display(), "No timestamp in file name, skipping");
            return None;
        };
        if logical_time <= watermark {
            return None;
        }
        let date = day_name_from_filename(&file_name)?;

        let suffix = format!(".{}", task.input_ext);
        let stem = file_name
            .strip_suffix(&suffix)
            .unwrap_or(&file_name)
            .to_string();

        let output_dirs: Vec<PathBuf> = task.output_dirs.iter().map(|d| d.join(&date)).collect();
        let output_stem = output_dirs.first()?.join(&stem);

        let metadata = match self.fs.read_sidecar(&sidecar_path(&input.path)).await {
            Ok(md) => md.unwrap_or_default(),
            Err(e) => {
                warn!(input = %input.path.display(), error = %e, "Unreadable sidecar, ignoring");
                Metadata::new()
            }
        };

        let mut params = JobParams::new();
        params.insert("binary_path", self.settings.binary_path.display().to_string());
        params.insert("input", input.path.display().to_string());
        params.insert("outdir", task.output_dirs[0].display().to_string());
        params.insert("filename", stem.as_str());
        params.insert("in_ext", task.input_ext.as_str());
        params.insert("out_ext", task.output_ext.as_str());
        params.insert("date", date.as_str());
        params.insert("tstamp", format!("{}", logical_time.as_secs()));
        params.insert("camera_id", self.settings.camera_id.as_str());
        params.insert("pid", self.settings.pid.to_string());
        params.insert("filename_out", output_stem.display().to_string());
        params.extend_from_metadata(&metadata);

        Some(Job {
            logical_time,
            task_group: group.key.clone(),
            input_path: input.path.clone(),
            output_dirs,
            output_stem,
            output_ext: task.output_ext.clone(),
            command: task.command.clone(),
            params,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CommandTemplate;
    use crate::port::station_fs::mocks::InMemoryFs;

    fn group() -> TaskGroup {
        TaskGroup {
            key: "stills".to_string(),
            max_batch_size: 2,
            completion_margin_secs: 0.1,
            tasks: vec![TaskSpec {
                input_dir: PathBuf::from("/data/raw"),
                output_dirs: vec![PathBuf::from("/data/img"), PathBuf::from("/data/thumb")],
                input_ext: "rgb".to_string(),
                output_ext: "png".to_string(),
                command: CommandTemplate::new("{binary_path}/rgb2png", vec!["{input}".into()]),
            }],
        }
    }

    fn discoverer(fs: Arc<InMemoryFs>) -> Discoverer {
        Discoverer::new(
            fs,
            DiscoverySettings {
                binary_path: PathBuf::from("/opt/bin"),
                camera_id: "cam1".to_string(),
                pid: 42,
            },
        )
    }

    #[tokio::test]
    async fn test_only_newer_files_are_candidates() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/data/raw/20150309200000.rgb", "x"); // older
        fs.add_file("/data/raw/20150309220000.rgb", "x");
        fs.add_file("/data/raw/20150309230000.rgb", "x");
        let watermark = instant_from_filename("20150309210000").unwrap();

        let jobs = discoverer(fs).discover(&group(), watermark).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.logical_time > watermark));
    }

    #[tokio::test]
    async fn test_skips_empty_and_unparseable_files() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/data/raw/20150309220000.rgb", ""); // still being written
        fs.add_file("/data/raw/calibration.rgb", "x");
        fs.add_file("/data/raw/20150309230000.rgb", "x");

        let jobs = discoverer(fs)
            .discover(&group(), LogicalTime::ZERO)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].input_path.ends_with("20150309230000.rgb"));
    }

    #[tokio::test]
    async fn test_missing_input_directory_is_not_an_error() {
        let fs = Arc::new(InMemoryFs::new());
        let jobs = discoverer(fs)
            .discover(&group(), LogicalTime::ZERO)
            .await
            .unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn test_job_parameters_and_sidecar() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/data/raw/20150310030000.rgb", "x");
        fs.add_file("/data/raw/20150310030000.txt", "exposure 0.5\n");

        let jobs = discoverer(fs)
            .discover(&group(), LogicalTime::ZERO)
            .await
            .unwrap();
        let job = &jobs[0];

        assert_eq!(job.params.get("date"), Some("20150309"));
        assert_eq!(job.params.get("filename"), Some("20150310030000"));
        assert_eq!(
            job.params.get("filename_out"),
            Some("/data/img/20150309/20150310030000")
        );
        assert_eq!(job.params.get("camera_id"), Some("cam1"));
        assert_eq!(job.params.get("exposure"), Some("0.5"));
        assert_eq!(job.metadata.get("exposure"), Some("0.5"));
        assert_eq!(
            job.output_dirs,
            vec![
                PathBuf::from("/data/img/20150309"),
                PathBuf::from("/data/thumb/20150309")
            ]
        );
    }

    #[tokio::test]
    async fn test_rediscovery_after_watermark_is_empty() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/data/raw/20150309220000.rgb", "x");
        let d = discoverer(fs);

        let first = d.discover(&group(), LogicalTime::ZERO).await.unwrap();
        assert_eq!(first.len(), 1);

        let watermark = first[0].logical_time.offset(0.1);
        assert!(d.discover(&group(), watermark).await.unwrap().is_empty());
        assert!(d.discover(&group(), watermark).await.unwrap().is_empty());
    }
}
