// Task Group Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::job::JobParams;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Margin added past the last completed job when a group drains (seconds)
pub const DEFAULT_COMPLETION_MARGIN_SECS: f64 = 0.1;

/// Amount the watermark stays below the next undone job (seconds)
pub const WATERMARK_EPSILON_SECS: f64 = 0.1;

/// What a failed external command means for watermark advancement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Treat a failed command as done; the input is never retried
    #[default]
    #[serde(alias = "advance")]
    AdvancePastFailures,
    /// Stop the group and leave the watermark just before the earliest failure
    #[serde(alias = "halt")]
    HaltGroupOnFailure,
}

/// External command with `{param}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Substitute job parameters into program and arguments
    pub fn render(&self, params: &JobParams) -> Result<(String, Vec<String>)> {
        let program = substitute(&self.program, params)?;
        let args = self
            .args
            .iter()
            .map(|a| substitute(a, params))
            .collect::<Result<Vec<_>>>()?;
        Ok((program, args))
    }
}

fn substitute(template: &str, params: &JobParams) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            DomainError::ValidationError(format!("Unclosed placeholder in '{}'", template))
        })?;
        let name = &after[..close];
        let value = params.get(name).ok_or_else(|| {
            DomainError::ValidationError(format!("Unknown placeholder '{{{}}}'", name))
        })?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

/// One input-directory rule inside a task group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub input_dir: PathBuf,
    pub output_dirs: Vec<PathBuf>,
    pub input_ext: String,
    pub output_ext: String,
    pub command: CommandTemplate,
}

/// A named category of file-processing work sharing one watermark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroup {
    pub key: String,
    pub max_batch_size: usize,
    #[serde(default = "default_margin")]
    pub completion_margin_secs: f64,
    pub tasks: Vec<TaskSpec>,
}

fn default_margin() -> f64 {
    DEFAULT_COMPLETION_MARGIN_SECS
}

impl TaskGroup {
    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(DomainError::InvalidTaskGroup("empty key".to_string()));
        }
        if self.key.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidTaskGroup(format!(
                "key '{}' contains whitespace",
                self.key
            )));
        }
        if self.max_batch_size == 0 {
            return Err(DomainError::InvalidTaskGroup(format!(
                "{}: max_batch_size must be at least 1",
                self.key
            )));
        }
        if !self.completion_margin_secs.is_finite() || self.completion_margin_secs < 0.0 {
            return Err(DomainError::InvalidTaskGroup(format!(
                "{}: completion margin must be a non-negative number",
                self.key
            )));
        }
        for task in &self.tasks {
            if task.output_dirs.is_empty() {
                return Err(DomainError::InvalidTaskGroup(format!(
                    "{}: task for {} has no output directory",
                    self.key,
                    task.input_dir.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> JobParams {
        let mut p = JobParams::new();
        p.insert("binary_path", "/opt/bin");
        p.insert("input", "/data/raw/20150309220000.rawvid");
        p.insert("filename_out", "/data/out/20150309/20150309220000");
        p
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let template = CommandTemplate::new(
            "{binary_path}/rawvid2frames",
            vec!["{input}".to_string(), "--out={filename_out}".to_string()],
        );
        let (program, args) = template.render(&params()).unwrap();
        assert_eq!(program, "/opt/bin/rawvid2frames");
        assert_eq!(args[0], "/data/raw/20150309220000.rawvid");
        assert_eq!(args[1], "--out=/data/out/20150309/20150309220000");
    }

    #[test]
    fn test_render_rejects_unknown_placeholder() {
        let template = CommandTemplate::new("convert", vec!["{nope}".to_string()]);
        assert!(template.render(&params()).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let group = TaskGroup {
            key: "stills".to_string(),
            max_batch_size: 0,
            completion_margin_secs: DEFAULT_COMPLETION_MARGIN_SECS,
            tasks: vec![],
        };
        assert!(group.validate().is_err());
    }

    #[test]
    fn test_failure_policy_short_names() {
        let p: FailurePolicy = serde_json::from_str("\"halt\"").unwrap();
        assert_eq!(p, FailurePolicy::HaltGroupOnFailure);
        let p: FailurePolicy = serde_json::from_str("\"advance_past_failures\"").unwrap();
        assert_eq!(p, FailurePolicy::AdvancePastFailures);
    }
}
