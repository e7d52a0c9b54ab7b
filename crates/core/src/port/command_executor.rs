// Command Executor Port
// The runner's only interface to file-processing binaries

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// A fully substituted external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout_ms: Option<i64>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: HashMap::new(),
            working_dir: None,
            timeout_ms: None,
        }
    }

    /// Human-readable command line for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of command execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub duration_ms: i64,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// Execution status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// Execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Process timeout after {0}ms")]
    Timeout(i64),

    #[error("Process killed: {0}")]
    Killed(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Command Executor trait
///
/// Implementations:
/// - SubprocessExecutor: spawns an external process and waits for exit
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion
    ///
    /// A non-zero exit is reported as `Ok` with `ExecutionStatus::Failed`;
    /// `Err` means the command could not be run or did not finish in time.
    async fn run(&self, command: &CommandSpec) -> Result<ExecutionResult, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Hook = Box<dyn Fn(&CommandSpec) + Send + Sync>;

    /// Mock executor behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always exit 0
        Success,
        /// Exit 1 when any argument contains the marker, else exit 0
        FailWhenArgContains(String),
        /// Spawn failure for every command
        SpawnFail(String),
        /// Panic (runner must survive it)
        Panic(String),
    }

    /// Mock Command Executor for testing
    ///
    /// Records every command, tracks peak concurrency, and can run a hook
    /// (e.g. to create product files) before returning.
    pub struct MockCommandExecutor {
        behavior: Mutex<MockBehavior>,
        delay: Duration,
        calls: Arc<Mutex<Vec<CommandSpec>>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        hook: Option<Hook>,
    }

    impl MockCommandExecutor {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                delay: Duration::from_millis(0),
                calls: Arc::new(Mutex::new(Vec::new())),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                hook: None,
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn with_hook(mut self, hook: impl Fn(&CommandSpec) + Send + Sync + 'static) -> Self {
            self.hook = Some(Box::new(hook));
            self
        }

        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Highest number of commands observed running at once
        pub fn peak_concurrency(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CommandExecutor for MockCommandExecutor {
        async fn run(&self, command: &CommandSpec) -> Result<ExecutionResult, ExecutionError> {
            self.calls.lock().unwrap().push(command.clone());
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(hook) = &self.hook {
                hook(command);
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let behavior = self.behavior.lock().unwrap().clone();
            let failed = match behavior {
                MockBehavior::Success => false,
                MockBehavior::FailWhenArgContains(marker) => {
                    command.args.iter().any(|a| a.contains(&marker))
                }
                MockBehavior::SpawnFail(msg) => return Err(ExecutionError::SpawnFailed(msg)),
                MockBehavior::Panic(msg) => panic!("{}", msg),
            };

            Ok(ExecutionResult {
                status: if failed {
                    ExecutionStatus::Failed
                } else {
                    ExecutionStatus::Success
                },
                duration_ms: self.delay.as_millis() as i64,
                exit_code: Some(if failed { 1 } else { 0 }),
                stdout: None,
                stderr: None,
            })
        }
    }
}
