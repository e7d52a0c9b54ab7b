// Job Domain Model
//
// Jobs are ephemeral: created by discovery, consumed by the runner, never
// persisted. A crash before the watermark moves simply rediscovers them.

use crate::domain::clock::LogicalTime;
use crate::domain::metadata::Metadata;
use crate::domain::task_group::CommandTemplate;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Substitution parameters for a job's command template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobParams(BTreeMap<String, String>);

impl JobParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Expose sidecar metadata as parameters (sidecar keys win)
    pub fn extend_from_metadata(&mut self, metadata: &Metadata) {
        for (k, v) in metadata.iter() {
            self.insert(k, v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One unit of discovered work
#[derive(Debug, Clone)]
pub struct Job {
    pub logical_time: LogicalTime,
    pub task_group: String,
    pub input_path: PathBuf,
    /// `<outdir>/<night>` for every output directory of the task
    pub output_dirs: Vec<PathBuf>,
    /// Stem used to find products: `<first output dir>/<night>/<input stem>`
    pub output_stem: PathBuf,
    pub output_ext: String,
    pub command: CommandTemplate,
    pub params: JobParams,
    /// Sidecar metadata of the input file
    pub metadata: Metadata,
}

impl Job {
    /// The primary output directory (`output_dirs[0]`)
    pub fn output_directory(&self) -> Option<&PathBuf> {
        self.output_dirs.first()
    }
}
