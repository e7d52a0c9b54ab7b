//! Watermark-gated job runner
//!
//! One run: load watermarks, then per task group DISCOVER -> SORT -> run
//! batches of at most `max_batch_size` jobs concurrently -> advance and save
//! the group's watermark after every batch. A deadline is checked before each
//! group and each batch; an in-flight batch always finishes.

use crate::application::deadline::RunContext;
use crate::application::discovery::Discoverer;
use crate::domain::{
    instant_from_filename, FailurePolicy, Job, LogicalTime, Metadata, TaskGroup, Watermarks,
    WATERMARK_EPSILON_SECS,
};
use crate::error::Result;
use crate::port::station_fs::sidecar_path;
use crate::port::{
    CommandExecutor, CommandSpec, ExecutionError, ExecutionResult, ExecutionStatus, StationFs,
    WatermarkStore,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Runner configuration
#[derive(Debug, Clone, Default)]
pub struct RunnerSettings {
    pub failure_policy: FailurePolicy,
    /// Delete outputs newer than the watermark before discovery
    pub purge_ahead_of_watermark: bool,
    /// Environment handed to every external command
    pub env: HashMap<String, String>,
    pub command_timeout_ms: Option<i64>,
}

/// Outcome of one task group within a run
#[derive(Debug, Clone, PartialEq)]
pub struct GroupReport {
    pub key: String,
    pub discovered: usize,
    pub completed: usize,
    pub failed: usize,
    /// Watermark after the group finished (or stopped)
    pub watermark: LogicalTime,
}

/// Outcome of one run over all task groups
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub groups: Vec<GroupReport>,
    /// Work remained when the deadline stopped the run
    pub deadline_hit: bool,
}

impl RunReport {
    pub fn jobs_run(&self) -> usize {
        self.groups.iter().map(|g| g.completed + g.failed).sum()
    }

    pub fn group(&self, key: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.key == key)
    }
}

struct GroupOutcome {
    report: GroupReport,
    deadline_hit: bool,
}

pub struct Runner {
    discoverer: Discoverer,
    executor: Arc<dyn CommandExecutor>,
    fs: Arc<dyn StationFs>,
    watermark_store: Arc<dyn WatermarkStore>,
    settings: RunnerSettings,
}

impl Runner {
    pub fn new(
        discoverer: Discoverer,
        executor: Arc<dyn CommandExecutor>,
        fs: Arc<dyn StationFs>,
        watermark_store: Arc<dyn WatermarkStore>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            discoverer,
            executor,
            fs,
            watermark_store,
            settings,
        }
    }

    /// Process every task group in order until done or out of time
    ///
    /// Store errors abort the run; a failing command never does.
    pub async fn run(&self, groups: &[TaskGroup], ctx: &RunContext) -> Result<RunReport> {
        let mut marks = self.watermark_store.load().await?;
        let mut report = RunReport::default();

        for group in groups {
            if ctx.is_expired() {
                info!(task_group = %group.key, "Deadline reached before task group, stopping run");
                report.deadline_hit = true;
                break;
            }
            if let Err(e) = group.validate() {
                error!(task_group = %group.key, error = %e, "Invalid task group, skipping");
                continue;
            }

            let outcome = self.run_group(group, &mut marks, ctx).await?;
            report.groups.push(outcome.report);
            if outcome.deadline_hit {
                report.deadline_hit = true;
                break;
            }
        }

        self.watermark_store.save(&marks).await?;
        info!(
            groups = report.groups.len(),
            jobs = report.jobs_run(),
            deadline_hit = report.deadline_hit,
            "Run finished"
        );
        Ok(report)
    }

    async fn run_group(
        &self,
        group: &TaskGroup,
        marks: &mut Watermarks,
        ctx: &RunContext,
    ) -> Result<GroupOutcome> {
        let watermark = marks.get(&group.key);
        if self.settings.purge_ahead_of_watermark && marks.contains(&group.key) {
            self.purge_ahead_of_watermark(group, watermark).await;
        }

        let mut jobs = self.discoverer.discover(group, watermark).await?;
        // stable: equal times keep discovery order
        jobs.sort_by_key(|j| j.logical_time);

        let total = jobs.len();
        let mut report = GroupReport {
            key: group.key.clone(),
            discovered: total,
            completed: 0,
            failed: 0,
            watermark,
        };
        let mut deadline_hit = false;
        let mut start = 0;

        while start < total {
            if ctx.is_expired() {
                info!(
                    task_group = %group.key,
                    remaining = total - start,
                    "Deadline reached, leaving remaining jobs for the next run"
                );
                deadline_hit = true;
                break;
            }

            let end = usize::min(start + group.max_batch_size, total);
            let batch = &jobs[start..end];
            let results = self.run_batch(batch).await;

            let failures = results.iter().filter(|ok| !**ok).count();
            report.completed += results.len() - failures;
            report.failed += failures;

            let first_failure = results.iter().position(|ok| !*ok);
            let halted = self.settings.failure_policy == FailurePolicy::HaltGroupOnFailure
                && first_failure.is_some();

            let new_mark = match first_failure {
                Some(i) if halted => batch[i].logical_time.offset(-WATERMARK_EPSILON_SECS),
                _ if end < total => jobs[end].logical_time.offset(-WATERMARK_EPSILON_SECS),
                _ => batch[batch.len() - 1]
                    .logical_time
                    .offset(group.completion_margin_secs),
            };

            if marks.advance(&group.key, new_mark) {
                debug!(task_group = %group.key, watermark = %new_mark, "Watermark advanced");
            }
            self.watermark_store.save(marks).await?;

            if halted {
                warn!(
                    task_group = %group.key,
                    watermark = %marks.get(&group.key),
                    "Command failed, halting task group"
                );
                break;
            }
            start = end;
        }

        report.watermark = marks.get(&group.key);
        info!(
            task_group = %group.key,
            discovered = report.discovered,
            completed = report.completed,
            failed = report.failed,
            watermark = %report.watermark,
            "Task group finished"
        );
        Ok(GroupOutcome {
            report,
            deadline_hit,
        })
    }

    /// Run one batch concurrently and wait for all of it; true = job succeeded
    async fn run_batch(&self, batch: &[Job]) -> Vec<bool> {
        let mut handles = Vec::with_capacity(batch.len());

        for job in batch {
            for dir in &job.output_dirs {
                if let Err(e) = self.fs.create_dir_all(dir).await {
                    warn!(dir = %dir.display(), error = %e, "Cannot create output directory");
                }
            }

            let handle = match self.command_for(job) {
                Ok(command) => {
                    let executor = Arc::clone(&self.executor);
                    Some(tokio::spawn(async move {
                        let result = executor.run(&command).await;
                        (command, result)
                    }))
                }
                Err(e) => {
                    error!(input = %job.input_path.display(), error = %e, "Cannot build command");
                    None
                }
            };
            handles.push(handle);
        }

        // Barrier: the batch is done only when every job has finished
        let joined = join_all(handles.into_iter().map(|handle| async move {
            match handle {
                Some(handle) => Some(handle.await),
                None => None,
            }
        }))
        .await;

        let outcomes: Vec<bool> = batch
            .iter()
            .zip(joined)
            .map(|(job, joined)| match joined {
                Some(Ok(finished)) => Self::job_succeeded(job, finished),
                Some(Err(join_err)) => {
                    if join_err.is_panic() {
                        error!(input = %job.input_path.display(), "Job panicked: {:?}", join_err);
                    } else {
                        error!(input = %job.input_path.display(), "Job cancelled: {:?}", join_err);
                    }
                    false
                }
                None => false,
            })
            .collect();

        for job in batch {
            self.cascade_metadata(job).await;
        }

        outcomes
    }

    fn job_succeeded(
        job: &Job,
        (command, result): (CommandSpec, std::result::Result<ExecutionResult, ExecutionError>),
    ) -> bool {
        match result {
            Ok(result) if result.status == ExecutionStatus::Success => {
                debug!(
                    input = %job.input_path.display(),
                    duration_ms = result.duration_ms,
                    "Job completed"
                );
                true
            }
            Ok(result) => {
                warn!(
                    input = %job.input_path.display(),
                    command = %command.display(),
                    exit_code = ?result.exit_code,
                    stderr = ?result.stderr,
                    "Command failed"
                );
                false
            }
            Err(e) => {
                warn!(
                    input = %job.input_path.display(),
                    command = %command.display(),
                    error = %e,
                    "Command could not be run"
                );
                false
            }
        }
    }

    fn command_for(&self, job: &Job) -> Result<CommandSpec> {
        let (program, args) = job.command.render(&job.params)?;
        let mut command = CommandSpec::new(program, args);
        command.env = self.settings.env.clone();
        command.working_dir = job.output_directory().cloned();
        command.timeout_ms = self.settings.command_timeout_ms;
        Ok(command)
    }

    /// Merge the input's sidecar into every product's sidecar; existing
    /// input values win over values the command wrote
    async fn cascade_metadata(&self, job: &Job) {
        let products = match self.fs.list_products(&job.output_stem, &job.output_ext).await {
            Ok(products) => products,
            Err(e) => {
                warn!(stem = %job.output_stem.display(), error = %e, "Cannot list products");
                return;
            }
        };

        for product in products {
            let path = sidecar_path(&product);
            let produced = match self.fs.read_sidecar(&path).await {
                Ok(md) => md.unwrap_or_default(),
                Err(e) => {
                    warn!(sidecar = %path.display(), error = %e, "Unreadable product sidecar");
                    Metadata::new()
                }
            };
            let merged = Metadata::cascade(&job.metadata, &produced);
            if let Err(e) = self.fs.write_sidecar(&path, &merged).await {
                warn!(sidecar = %path.display(), error = %e, "Cannot write product sidecar");
            }
        }
    }

    /// Remove outputs newer than the group's watermark so they are
    /// regenerated from scratch
    pub async fn purge_ahead_of_watermark(&self, group: &TaskGroup, watermark: LogicalTime) {
        let mut removed = 0usize;

        for task in &group.tasks {
            for dir in &task.output_dirs {
                let outputs = match self.fs.list_inputs(dir, &task.output_ext).await {
                    Ok(outputs) => outputs,
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "Cannot list outputs for purge");
                        continue;
                    }
                };

                for output in outputs {
                    let ahead = output
                        .path
                        .file_name()
                        .and_then(|n| instant_from_filename(&n.to_string_lossy()))
                        .is_some_and(|t| t > watermark);
                    if !ahead {
                        continue;
                    }
                    for path in [output.path.clone(), sidecar_path(&output.path)] {
                        if let Err(e) = self.fs.remove_file(&path).await {
                            warn!(path = %path.display(), error = %e, "Cannot remove output");
                        }
                    }
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!(task_group = %group.key, removed, "Purged outputs ahead of watermark");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::discovery::DiscoverySettings;
    use crate::domain::{CommandTemplate, TaskSpec};
    use crate::port::command_executor::mocks::{MockBehavior, MockCommandExecutor};
    use crate::port::station_fs::mocks::InMemoryFs;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::watermark_store::mocks::InMemoryWatermarkStore;
    use std::path::PathBuf;
    use std::time::Duration;

    fn t(name: &str) -> LogicalTime {
        instant_from_filename(name).unwrap()
    }

    fn task(input_dir: &str, output_dir: &str) -> TaskSpec {
        TaskSpec {
            input_dir: PathBuf::from(input_dir),
            output_dirs: vec![PathBuf::from(output_dir)],
            input_ext: "rgb".to_string(),
            output_ext: "png".to_string(),
            command: CommandTemplate::new(
                "{binary_path}/rgb2png",
                vec!["{input}".into(), "{filename_out}.{out_ext}".into()],
            ),
        }
    }

    fn group(max_batch_size: usize) -> TaskGroup {
        TaskGroup {
            key: "stills".to_string(),
            max_batch_size,
            completion_margin_secs: 0.1,
            tasks: vec![task("/data/raw", "/data/img")],
        }
    }

    struct Harness {
        fs: Arc<InMemoryFs>,
        executor: Arc<MockCommandExecutor>,
        store: Arc<InMemoryWatermarkStore>,
        runner: Runner,
    }

    fn harness(
        fs: Arc<InMemoryFs>,
        executor: MockCommandExecutor,
        store: InMemoryWatermarkStore,
        settings: RunnerSettings,
    ) -> Harness {
        let executor = Arc::new(executor);
        let store = Arc::new(store);
        let runner = Runner::new(
            Discoverer::new(fs.clone(), DiscoverySettings::default()),
            executor.clone(),
            fs.clone(),
            store.clone(),
            settings,
        );
        Harness {
            fs,
            executor,
            store,
            runner,
        }
    }

    fn unbounded() -> RunContext {
        RunContext::unbounded(Arc::new(ManualTimeProvider::new(0)))
    }

    fn fs_with(names: &[&str]) -> Arc<InMemoryFs> {
        let fs = Arc::new(InMemoryFs::new());
        for name in names {
            fs.add_file(format!("/data/raw/{}.rgb", name), "pixels");
        }
        fs
    }

    #[tokio::test]
    async fn test_only_inputs_after_watermark_run() {
        let fs = fs_with(&["20150309215900", "20150309220100", "20150309220300"]);
        let mut initial = Watermarks::new();
        initial.restore("stills", t("20150309220000"));

        let h = harness(
            fs,
            MockCommandExecutor::new_success(),
            InMemoryWatermarkStore::with(initial),
            RunnerSettings::default(),
        );
        let report = h.runner.run(&[group(10)], &unbounded()).await.unwrap();

        assert_eq!(h.executor.call_count(), 2);
        let g = report.group("stills").unwrap();
        assert_eq!(g.discovered, 2);
        assert_eq!(g.completed, 2);
        assert_eq!(g.watermark, t("20150309220300").offset(0.1));
        assert_eq!(h.store.current().get("stills"), t("20150309220300").offset(0.1));

        // A second run over unchanged inputs does nothing
        let again = h.runner.run(&[group(10)], &unbounded()).await.unwrap();
        assert_eq!(again.jobs_run(), 0);
        assert_eq!(h.executor.call_count(), 2);
    }

    #[tokio::test]
    async fn test_batches_respect_limit_and_save_each_time() {
        let fs = fs_with(&[
            "20150309220000",
            "20150309220100",
            "20150309220200",
            "20150309220300",
            "20150309220400",
        ]);
        let h = harness(
            fs,
            MockCommandExecutor::new_success().with_delay(Duration::from_millis(20)),
            InMemoryWatermarkStore::new(),
            RunnerSettings::default(),
        );
        h.runner.run(&[group(2)], &unbounded()).await.unwrap();

        assert_eq!(h.executor.call_count(), 5);
        assert!(h.executor.peak_concurrency() <= 2);

        // one save per batch plus the final save
        let saves = h.store.saves();
        assert_eq!(saves.len(), 4);
        assert_eq!(saves[0].get("stills"), t("20150309220200").offset(-0.1));
        assert_eq!(saves[1].get("stills"), t("20150309220400").offset(-0.1));
        assert_eq!(saves[2].get("stills"), t("20150309220400").offset(0.1));

        // never decreases
        for pair in saves.windows(2) {
            assert!(pair[0].get("stills") <= pair[1].get("stills"));
        }
    }

    #[tokio::test]
    async fn test_jobs_run_in_time_order() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/data/raw/20150309220500.rgb", "x");
        fs.add_file("/data/other/20150309220000.rgb", "x");
        let mut g = group(1);
        g.tasks.push(task("/data/other", "/data/img2"));

        let h = harness(
            fs,
            MockCommandExecutor::new_success(),
            InMemoryWatermarkStore::new(),
            RunnerSettings::default(),
        );
        h.runner.run(&[g], &unbounded()).await.unwrap();

        let calls = h.executor.calls();
        assert!(calls[0].args[0].contains("20150309220000"));
        assert!(calls[1].args[0].contains("20150309220500"));
    }

    #[tokio::test]
    async fn test_failure_advances_past_by_default() {
        let fs = fs_with(&["20150309220000", "20150309220100", "20150309220200"]);
        let h = harness(
            fs,
            MockCommandExecutor::new(MockBehavior::FailWhenArgContains(
                "20150309220100".to_string(),
            )),
            InMemoryWatermarkStore::new(),
            RunnerSettings::default(),
        );
        let report = h.runner.run(&[group(10)], &unbounded()).await.unwrap();

        let g = report.group("stills").unwrap();
        assert_eq!(g.completed, 2);
        assert_eq!(g.failed, 1);
        assert_eq!(g.watermark, t("20150309220200").offset(0.1));
    }

    #[tokio::test]
    async fn test_halt_policy_stops_before_earliest_failure() {
        let fs = fs_with(&["20150309220000", "20150309220100", "20150309220200"]);
        let h = harness(
            fs,
            MockCommandExecutor::new(MockBehavior::FailWhenArgContains(
                "20150309220100".to_string(),
            )),
            InMemoryWatermarkStore::new(),
            RunnerSettings {
                failure_policy: FailurePolicy::HaltGroupOnFailure,
                ..Default::default()
            },
        );
        let report = h.runner.run(&[group(1)], &unbounded()).await.unwrap();

        let g = report.group("stills").unwrap();
        assert_eq!(g.completed, 1);
        assert_eq!(g.failed, 1);
        assert_eq!(g.watermark, t("20150309220100").offset(-0.1));
        // third job never started
        assert_eq!(h.executor.call_count(), 2);
    }

    #[tokio::test]
    async fn test_panicking_job_counts_as_failed() {
        let fs = fs_with(&["20150309220000"]);
        let h = harness(
            fs,
            MockCommandExecutor::new(MockBehavior::Panic("decoder crashed".to_string())),
            InMemoryWatermarkStore::new(),
            RunnerSettings::default(),
        );
        let report = h.runner.run(&[group(4)], &unbounded()).await.unwrap();

        let g = report.group("stills").unwrap();
        assert_eq!(g.failed, 1);
        assert_eq!(g.watermark, t("20150309220000").offset(0.1));
    }

    #[tokio::test]
    async fn test_expired_deadline_runs_nothing() {
        let fs = fs_with(&["20150309220000"]);
        let h = harness(
            fs,
            MockCommandExecutor::new_success(),
            InMemoryWatermarkStore::new(),
            RunnerSettings::default(),
        );
        let clock = Arc::new(ManualTimeProvider::new(10_000));
        let ctx = RunContext::new(Some(5_000), clock);

        let report = h.runner.run(&[group(4)], &ctx).await.unwrap();
        assert!(report.deadline_hit);
        assert!(report.groups.is_empty());
        assert_eq!(h.executor.call_count(), 0);
        assert_eq!(h.store.current().get("stills"), LogicalTime::ZERO);
    }

    #[tokio::test]
    async fn test_deadline_between_batches_keeps_progress() {
        let fs = fs_with(&["20150309220000", "20150309220100", "20150309220200"]);
        let clock = Arc::new(ManualTimeProvider::new(0));
        let ticking = clock.clone();
        let executor = MockCommandExecutor::new_success().with_hook(move |_| ticking.advance(1_000));

        let h = harness(
            fs,
            executor,
            InMemoryWatermarkStore::new(),
            RunnerSettings::default(),
        );
        let ctx = RunContext::new(Some(500), clock);

        let report = h.runner.run(&[group(1)], &ctx).await.unwrap();
        assert!(report.deadline_hit);
        assert_eq!(h.executor.call_count(), 1);
        assert_eq!(
            h.store.current().get("stills"),
            t("20150309220100").offset(-0.1)
        );
    }

    #[tokio::test]
    async fn test_product_sidecars_inherit_input_metadata() {
        let fs = fs_with(&["20150310030000"]);
        fs.add_file("/data/raw/20150310030000.txt", "exposure 0.5\nlens wide\n");

        let products = fs.clone();
        let executor = MockCommandExecutor::new_success().with_hook(move |_| {
            products.add_file("/data/img/20150309/20150310030000_0.png", "png");
            products.add_file(
                "/data/img/20150309/20150310030000_0.txt",
                "exposure 9\nstars 120\n",
            );
        });

        let h = harness(
            fs,
            executor,
            InMemoryWatermarkStore::new(),
            RunnerSettings::default(),
        );
        h.runner.run(&[group(1)], &unbounded()).await.unwrap();

        assert!(h.fs.dir_created("/data/img/20150309"));
        let sidecar = Metadata::parse(
            &h.fs
                .contents("/data/img/20150309/20150310030000_0.txt")
                .unwrap(),
        );
        assert_eq!(sidecar.get("exposure"), Some("0.5"));
        assert_eq!(sidecar.get("lens"), Some("wide"));
        assert_eq!(sidecar.get("stars"), Some("120"));
    }

    #[tokio::test]
    async fn test_command_gets_environment_and_timeout() {
        let fs = fs_with(&["20150309220000"]);
        let mut env = HashMap::new();
        env.insert("PATH".to_string(), "/usr/bin".to_string());
        let h = harness(
            fs,
            MockCommandExecutor::new_success(),
            InMemoryWatermarkStore::new(),
            RunnerSettings {
                env,
                command_timeout_ms: Some(60_000),
                ..Default::default()
            },
        );
        h.runner.run(&[group(1)], &unbounded()).await.unwrap();

        let call = &h.executor.calls()[0];
        assert_eq!(call.env.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert_eq!(call.timeout_ms, Some(60_000));
        assert_eq!(call.args[1], "/data/img/20150309/20150309220000.png");
    }

    #[tokio::test]
    async fn test_purge_removes_outputs_ahead_of_watermark() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/data/img/20150309/20150309210000.png", "old");
        fs.add_file("/data/img/20150309/20150309230000.png", "stale");
        fs.add_file("/data/img/20150309/20150309230000.txt", "k v\n");
        let mut initial = Watermarks::new();
        initial.restore("stills", t("20150309220000"));

        let h = harness(
            fs,
            MockCommandExecutor::new_success(),
            InMemoryWatermarkStore::with(initial),
            RunnerSettings {
                purge_ahead_of_watermark: true,
                ..Default::default()
            },
        );
        h.runner.run(&[group(1)], &unbounded()).await.unwrap();

        assert!(h.fs.exists("/data/img/20150309/20150309210000.png"));
        assert!(!h.fs.exists("/data/img/20150309/20150309230000.png"));
        assert!(!h.fs.exists("/data/img/20150309/20150309230000.txt"));
    }

    #[tokio::test]
    async fn test_invalid_group_is_skipped() {
        let fs = fs_with(&["20150309220000"]);
        let h = harness(
            fs,
            MockCommandExecutor::new_success(),
            InMemoryWatermarkStore::new(),
            RunnerSettings::default(),
        );
        let broken = TaskGroup {
            key: "broken".to_string(),
            ..group(0)
        };

        let report = h.runner.run(&[broken, group(4)], &unbounded()).await.unwrap();
        assert!(report.group("broken").is_none());
        assert_eq!(report.group("stills").unwrap().completed, 1);
        assert_eq!(h.store.current().get("broken"), LogicalTime::ZERO);
    }

    #[tokio::test]
    async fn test_same_timestamp_split_across_batches_is_not_skipped() {
        let fs = fs_with(&["20150309220000"]);
        fs.add_file("/data/raw2/20150309220000.rgb", "pixels");
        let mut g = group(1);
        g.tasks.push(task("/data/raw2", "/data/img2"));

        let clock = Arc::new(ManualTimeProvider::new(0));
        let ticking = clock.clone();
        let executor = MockCommandExecutor::new_success().with_hook(move |_| ticking.advance(1_000));
        let h = harness(
            fs,
            executor,
            InMemoryWatermarkStore::new(),
            RunnerSettings::default(),
        );

        // Run stops after the first of the two equal-time jobs
        let ctx = RunContext::new(Some(500), clock);
        let report = h.runner.run(std::slice::from_ref(&g), &ctx).await.unwrap();
        assert!(report.deadline_hit);
        assert_eq!(h.executor.call_count(), 1);
        assert_eq!(
            h.store.current().get("stills"),
            t("20150309220000").offset(-0.1)
        );

        // Watermark sits just before the shared time, so both are found again
        let report = h.runner.run(std::slice::from_ref(&g), &unbounded()).await.unwrap();
        assert_eq!(report.group("stills").unwrap().discovered, 2);
        let calls = h.executor.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1..]
            .iter()
            .any(|c| c.args[0].contains("/data/raw2/20150309220000.rgb")));
        assert_eq!(
            h.store.current().get("stills"),
            t("20150309220000").offset(0.1)
        );
    }
}
