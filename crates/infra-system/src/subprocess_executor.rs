// Subprocess executor
// reason: tokio::process for async child management, nix for signal delivery
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use skywatch_core::port::{
    CommandExecutor, CommandSpec, ExecutionError, ExecutionResult, ExecutionStatus, TimeProvider,
};

/// Time a timed-out child gets between SIGTERM and SIGKILL (5 seconds)
pub const GRACEFUL_SHUTDOWN_TIMEOUT_MS: i64 = 5000;

/// Runs file-processing binaries as isolated child processes
///
/// Children start from an empty environment: only allowlisted variables of
/// this process are inherited, then the command's own `env` is applied.
pub struct SubprocessExecutor {
    time_provider: Arc<dyn TimeProvider>,
    env_allowlist: Vec<String>,
}

impl SubprocessExecutor {
    /// # Example
    /// ```ignore
    /// let executor = SubprocessExecutor::new(
    ///     Arc::new(SystemTimeProvider),
    ///     vec!["PATH".to_string(), "HOME".to_string()],
    /// );
    /// ```
    pub fn new(time_provider: Arc<dyn TimeProvider>, env_allowlist: Vec<String>) -> Self {
        Self {
            time_provider,
            env_allowlist,
        }
    }

    /// Allowlisted subset of an environment
    fn filter_env<I>(&self, env: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        env.into_iter()
            .filter(|(k, _)| self.env_allowlist.contains(k))
            .collect()
    }

    fn child_env(&self, command: &CommandSpec) -> HashMap<String, String> {
        let mut env = self.filter_env(std::env::vars());
        env.extend(command.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    async fn spawn_and_wait(&self, command: &CommandSpec) -> Result<Output, ExecutionError> {
        if command.program.trim().is_empty() {
            return Err(ExecutionError::InvalidCommand("empty program".to_string()));
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .env_clear()
            .envs(self.child_env(command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(format!("{}: {}", command.program, e)))?;

        // Drain pipes concurrently so a chatty child never blocks on a full pipe
        let stdout = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr = tokio::spawn(read_pipe(child.stderr.take()));

        let status = match command.timeout_ms {
            Some(timeout_ms) => {
                match timeout(Duration::from_millis(timeout_ms.max(0) as u64), child.wait()).await {
                    Ok(status) => status.map_err(|e| ExecutionError::IoError(e.to_string()))?,
                    Err(_) => {
                        warn!(command = %command.display(), timeout_ms, "Command timed out");
                        self.terminate(&mut child).await?;
                        return Err(ExecutionError::Timeout(timeout_ms));
                    }
                }
            }
            None => child
                .wait()
                .await
                .map_err(|e| ExecutionError::IoError(e.to_string()))?,
        };

        Ok(Output {
            status,
            stdout: stdout.await.unwrap_or_default(),
            stderr: stderr.await.unwrap_or_default(),
        })
    }

    fn build_result(&self, output: Output, duration_ms: i64) -> ExecutionResult {
        let status = if output.status.success() {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        };

        ExecutionResult {
            status,
            exit_code: output.status.code(),
            duration_ms,
            stdout: Some(String::from_utf8_lossy(&output.stdout).to_string()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        }
    }

    /// SIGTERM, then SIGKILL if the child outlives the grace period
    async fn terminate(&self, child: &mut Child) -> Result<(), ExecutionError> {
        let grace = Duration::from_millis(GRACEFUL_SHUTDOWN_TIMEOUT_MS as u64);

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            info!(pid, "Sending SIGTERM");
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                if let Ok(status) = timeout(grace, child.wait()).await {
                    debug!(pid, status = ?status, "Process exited after SIGTERM");
                    return Ok(());
                }
                warn!(pid, "Process ignored SIGTERM, sending SIGKILL");
            }
        }

        child
            .kill()
            .await
            .map_err(|e| ExecutionError::Killed(format!("SIGKILL failed: {}", e)))
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

#[async_trait]
impl CommandExecutor for SubprocessExecutor {
    async fn run(&self, command: &CommandSpec) -> Result<ExecutionResult, ExecutionError> {
        let start_time = self.time_provider.now_millis();
        debug!(command = %command.display(), timeout_ms = ?command.timeout_ms, "Spawning command");

        let output = self.spawn_and_wait(command).await?;
        let duration_ms = self.time_provider.now_millis() - start_time;
        let result = self.build_result(output, duration_ms);

        debug!(
            command = %command.program,
            duration_ms,
            exit_code = ?result.exit_code,
            status = ?result.status,
            "Command finished"
        );
        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use skywatch_core::port::time_provider::SystemTimeProvider;

    fn executor(allow: &[&str]) -> SubprocessExecutor {
        SubprocessExecutor::new(
            Arc::new(SystemTimeProvider),
            allow.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_run_success_captures_stdout() {
        let result = executor(&[]).run(&sh("echo hello")).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.unwrap_or_default().contains("hello"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failed_status() {
        let result = executor(&[]).run(&sh("exit 3")).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failure() {
        let command = CommandSpec::new("/nonexistent/skywatch-binary", vec![]);
        let result = executor(&[]).run(&command).await;
        assert!(matches!(result, Err(ExecutionError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let mut command = sh("sleep 10");
        command.timeout_ms = Some(100);

        let started = std::time::Instant::now();
        let result = executor(&[]).run(&command).await;
        assert!(matches!(result, Err(ExecutionError::Timeout(100))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_command_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut command = sh("echo \"$SKY_NIGHT\" && pwd");
        command.env.insert("SKY_NIGHT".to_string(), "20150309".to_string());
        command.working_dir = Some(dir.path().to_path_buf());

        let stdout = executor(&[]).run(&command).await.unwrap().stdout.unwrap();
        assert!(stdout.contains("20150309"));
        let name = dir.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(stdout.contains(&name));
    }

    #[test]
    fn test_env_filtering() {
        let exec = executor(&["ALLOWED_VAR"]);
        let filtered = exec.filter_env(vec![
            ("ALLOWED_VAR".to_string(), "value1".to_string()),
            ("BLOCKED_VAR".to_string(), "value2".to_string()),
        ]);

        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("ALLOWED_VAR"));
        assert!(!filtered.contains_key("BLOCKED_VAR"));
    }
}
