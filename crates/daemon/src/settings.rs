//! Daemon settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `SKYWATCH__*` environment variables (`__` separates nesting,
//! e.g. `SKYWATCH__EXPORT__MAX_ATTEMPTS=5`).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use skywatch_core::application::backoff::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS,
};
use skywatch_core::application::dispatcher::constants::DEFAULT_CLAIM_LEASE_MS;
use skywatch_core::application::{BackoffPolicy, DispatcherSettings, RunnerSettings};
use skywatch_core::domain::{FailurePolicy, TaskGroup};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "SKYWATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "~/.skywatch/skywatch.toml";
const ENV_PREFIX: &str = "SKYWATCH";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub watermark_path: String,
    pub binary_path: String,
    pub camera_id: String,
    /// Rolling log files go here when set; stdout otherwise
    pub log_dir: Option<String>,
    /// Run budget relative to process start
    pub deadline_secs: Option<u64>,
    /// Absolute deadline (unix seconds); wins over `deadline_secs`
    pub quit_at: Option<i64>,
    pub env_allowlist: Vec<String>,
    /// Extra environment for every external command, as `NAME=value`
    ///
    /// A list rather than a table: `config` lowercases table keys.
    pub command_env: Vec<String>,
    pub command_timeout_secs: Option<u64>,
    pub failure_policy: FailurePolicy,
    pub purge_ahead_of_watermark: bool,
    pub export: ExportSettings,
    pub task_groups: Vec<TaskGroup>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://~/.skywatch/skywatch.db".to_string(),
            watermark_path: "~/.skywatch/watermarks".to_string(),
            binary_path: "/usr/local/bin".to_string(),
            camera_id: String::new(),
            log_dir: None,
            deadline_secs: None,
            quit_at: None,
            env_allowlist: vec!["PATH".to_string(), "HOME".to_string(), "USER".to_string()],
            command_env: Vec::new(),
            command_timeout_secs: None,
            failure_policy: FailurePolicy::default(),
            purge_ahead_of_watermark: false,
            export: ExportSettings::default(),
            task_groups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub enabled: bool,
    pub max_attempts: i32,
    pub base_delay_ms: i64,
    pub max_delay_ms: i64,
    pub backoff_factor: f64,
    pub claim_lease_ms: i64,
    pub request_timeout_secs: u64,
    /// Keep dispatching after the cycle until interrupted
    pub follow: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            claim_lease_ms: DEFAULT_CLAIM_LEASE_MS,
            request_timeout_secs: 30,
            follow: false,
        }
    }
}

impl ExportSettings {
    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            claim_lease_ms: self.claim_lease_ms,
            backoff: BackoffPolicy {
                base_delay_ms: self.base_delay_ms,
                factor: self.backoff_factor,
                max_delay_ms: self.max_delay_ms,
                max_attempts: self.max_attempts,
            },
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Settings {
    /// Load from `SKYWATCH_CONFIG` (or the default path) plus the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = PathBuf::from(expand(&path));
        Self::load_from(&path, true)
    }

    /// Load from one file; a missing file is fine, a malformed one is not
    pub fn load_from(path: &Path, with_env: bool) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(
            config::File::from(path)
                .format(config::FileFormat::Toml)
                .required(false),
        );
        if with_env {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("env_allowlist"),
            );
        }

        let settings: Settings = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        settings.validate()?;
        Ok(settings.expanded())
    }

    fn validate(&self) -> Result<()> {
        for group in &self.task_groups {
            group
                .validate()
                .with_context(|| format!("task group '{}'", group.key))?;
        }
        let mut keys: Vec<&str> = self.task_groups.iter().map(|g| g.key.as_str()).collect();
        keys.sort_unstable();
        if let Some(pair) = keys.windows(2).find(|w| w[0] == w[1]) {
            bail!("duplicate task group key '{}'", pair[0]);
        }
        if let Some(bad) = self.command_env.iter().find(|e| !e.contains('=')) {
            bail!("command_env entry '{}' is not NAME=value", bad);
        }
        if self.export.max_attempts < 1 {
            bail!("export.max_attempts must be at least 1");
        }
        if self.export.base_delay_ms < 0 || self.export.max_delay_ms < self.export.base_delay_ms {
            bail!("export delays must satisfy 0 <= base_delay_ms <= max_delay_ms");
        }
        if self.export.backoff_factor.is_nan() || self.export.backoff_factor < 1.0 {
            bail!("export.backoff_factor must be >= 1.0");
        }
        Ok(())
    }

    /// `~` and `$VAR` expanded in every path-like setting
    fn expanded(mut self) -> Self {
        self.database_url = match self.database_url.strip_prefix("sqlite://") {
            Some(rest) => format!("sqlite://{}", expand(rest)),
            None => expand(&self.database_url),
        };
        self.watermark_path = expand(&self.watermark_path);
        self.binary_path = expand(&self.binary_path);
        self.log_dir = self.log_dir.as_deref().map(expand);
        for group in &mut self.task_groups {
            for task in &mut group.tasks {
                task.input_dir = expand_path(&task.input_dir);
                for dir in &mut task.output_dirs {
                    *dir = expand_path(dir);
                }
            }
        }
        self
    }

    /// Absolute deadline in unix milliseconds, if any
    pub fn deadline_ms(&self, started_at_ms: i64) -> Option<i64> {
        match (self.quit_at, self.deadline_secs) {
            (Some(at), _) => Some(at.saturating_mul(1000)),
            (None, Some(secs)) => Some(started_at_ms.saturating_add(secs as i64 * 1000)),
            (None, None) => None,
        }
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            failure_policy: self.failure_policy,
            purge_ahead_of_watermark: self.purge_ahead_of_watermark,
            env: self.command_env_map(),
            command_timeout_ms: self.command_timeout_secs.map(|s| s as i64 * 1000),
        }
    }

    fn command_env_map(&self) -> HashMap<String, String> {
        self.command_env
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.to_string()))
            .collect()
    }

    /// Filesystem location of a `sqlite://` database, for creating its directory
    pub fn database_file(&self) -> Option<PathBuf> {
        let rest = self.database_url.strip_prefix("sqlite://")?;
        let path = rest.split('?').next().unwrap_or(rest);
        if path.is_empty() || path.starts_with(':') {
            return None;
        }
        Some(PathBuf::from(path))
    }
}

fn expand(value: &str) -> String {
    shellexpand::full(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| shellexpand::tilde(value).into_owned())
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(expand(&path.to_string_lossy()))
}
