// Export Dispatcher - delivery loop over pending tracking rows

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::backoff::{BackoffPolicy, RetryDecision};
use crate::application::deadline::RunContext;
use crate::domain::{DeliveryOutcome, ExportTask};
use crate::error::Result;
use crate::port::{ExportStore, ExportTransport, TimeProvider};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// What happened to one claimed row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// Transient failure; row stays pending until `next_attempt_at_ms`
    Deferred { next_attempt_at_ms: i64 },
    /// Permanent rejection or attempt budget exhausted
    Failed,
    /// Row vanished (entity or configuration deleted) while in flight
    Discarded,
}

/// Tally of a `run_until_idle` pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: u64,
    pub deferred: u64,
    pub failed: u64,
    pub discarded: u64,
    pub deadline_hit: bool,
}

impl DispatchReport {
    fn record(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Delivered => self.delivered += 1,
            DispatchOutcome::Deferred { .. } => self.deferred += 1,
            DispatchOutcome::Failed => self.failed += 1,
            DispatchOutcome::Discarded => self.discarded += 1,
        }
    }

    pub fn attempted(&self) -> u64 {
        self.delivered + self.deferred + self.failed + self.discarded
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub claim_lease_ms: i64,
    pub backoff: BackoffPolicy,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            claim_lease_ms: DEFAULT_CLAIM_LEASE_MS,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Claims pending rows one at a time and pushes them to their targets
///
/// Several dispatchers may share one store; the store's claim keeps them from
/// delivering the same row concurrently.
pub struct ExportDispatcher {
    store: Arc<dyn ExportStore>,
    transport: Arc<dyn ExportTransport>,
    time_provider: Arc<dyn TimeProvider>,
    settings: DispatcherSettings,
}

impl ExportDispatcher {
    pub fn new(
        store: Arc<dyn ExportStore>,
        transport: Arc<dyn ExportTransport>,
        time_provider: Arc<dyn TimeProvider>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            store,
            transport,
            time_provider,
            settings,
        }
    }

    /// Claim the oldest eligible pending row, if any
    pub async fn next_task(&self) -> Result<Option<ExportTask>> {
        let now = self.time_provider.now_millis();
        self.store.claim_next(now, self.settings.claim_lease_ms).await
    }

    /// Push one claimed row and record the outcome
    pub async fn perform(&self, task: &ExportTask) -> Result<DispatchOutcome> {
        let outcome = self.push_guarded(task).await;
        let attempts = task.attempts + 1;

        let dispatched = match outcome {
            DeliveryOutcome::Delivered => {
                if self.store.record_delivered(task.tracking_id).await? {
                    info!(
                        tracking_id = task.tracking_id,
                        kind = %task.kind,
                        entity_id = %task.entity_id,
                        config_id = %task.config_id,
                        "Entity delivered"
                    );
                    DispatchOutcome::Delivered
                } else {
                    DispatchOutcome::Discarded
                }
            }
            DeliveryOutcome::Permanent(reason) => {
                warn!(
                    tracking_id = task.tracking_id,
                    entity_id = %task.entity_id,
                    reason = %reason,
                    "Delivery rejected permanently"
                );
                if self
                    .store
                    .record_failed(task.tracking_id, attempts, &reason)
                    .await?
                {
                    DispatchOutcome::Failed
                } else {
                    DispatchOutcome::Discarded
                }
            }
            DeliveryOutcome::Transient(reason) => {
                debug!(tracking_id = task.tracking_id, reason = %reason, "Transient delivery failure");
                match self.settings.backoff.on_transient_failure(task, attempts) {
                    RetryDecision::Retry(delay_ms) => {
                        let next_attempt_at_ms = self.time_provider.now_millis() + delay_ms;
                        if self
                            .store
                            .record_retry(task.tracking_id, attempts, next_attempt_at_ms, &reason)
                            .await?
                        {
                            DispatchOutcome::Deferred { next_attempt_at_ms }
                        } else {
                            DispatchOutcome::Discarded
                        }
                    }
                    RetryDecision::GiveUp => {
                        error!(
                            tracking_id = task.tracking_id,
                            entity_id = %task.entity_id,
                            attempts,
                            reason = %reason,
                            "Delivery failed after max attempts"
                        );
                        if self
                            .store
                            .record_failed(task.tracking_id, attempts, &reason)
                            .await?
                        {
                            DispatchOutcome::Failed
                        } else {
                            DispatchOutcome::Discarded
                        }
                    }
                }
            }
        };

        if dispatched == DispatchOutcome::Discarded {
            debug!(tracking_id = task.tracking_id, "Row gone before outcome was recorded");
        }
        Ok(dispatched)
    }

    /// A panicking transport counts as a transient failure
    async fn push_guarded(&self, task: &ExportTask) -> DeliveryOutcome {
        let transport = Arc::clone(&self.transport);
        let target = task.target.clone();
        let payload = task.payload();

        let handle = tokio::task::spawn(async move { transport.push(&target, &payload).await });
        match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                error!(tracking_id = task.tracking_id, "Transport panicked: {:?}", join_err);
                DeliveryOutcome::Transient(format!("transport panicked: {}", join_err))
            }
        }
    }

    /// Deliver until nothing is eligible or the deadline passes
    pub async fn run_until_idle(&self, ctx: &RunContext) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();

        loop {
            if ctx.is_expired() {
                info!(attempted = report.attempted(), "Deadline reached, stopping dispatch");
                report.deadline_hit = true;
                break;
            }
            let Some(task) = self.next_task().await? else {
                break;
            };
            let outcome = self.perform(&task).await?;
            report.record(&outcome);
        }

        info!(
            delivered = report.delivered,
            deferred = report.deferred,
            failed = report.failed,
            discarded = report.discarded,
            "Dispatch pass finished"
        );
        Ok(report)
    }

    /// Long-running loop: dispatch, then poll again after an idle pause
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!("Export dispatcher started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }

            let pause = match self.next_task().await {
                Ok(Some(task)) => match self.perform(&task).await {
                    Ok(_) => None,
                    Err(e) => {
                        error!("Dispatcher error: {}", e);
                        Some(ERROR_RECOVERY_SLEEP_DURATION)
                    }
                },
                Ok(None) => Some(IDLE_SLEEP_DURATION),
                Err(e) => {
                    error!("Dispatcher error: {}", e);
                    Some(ERROR_RECOVERY_SLEEP_DURATION)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = sleep(pause) => {},
                    _ = shutdown.wait() => {
                        info!("Dispatcher interrupted while idle");
                        break;
                    }
                }
            }
        }
        info!("Export dispatcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::marker::ExportMarker;
    use crate::domain::{
        EntityFilter, EntityKind, ExportConfiguration, ExportState, ExportTarget, Observation,
        ObservationFilter,
    };
    use crate::port::export_store::mocks::InMemoryExportStore;
    use crate::port::export_transport::mocks::ScriptedTransport;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::EntityRepository;
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryExportStore>,
        transport: Arc<ScriptedTransport>,
        clock: Arc<ManualTimeProvider>,
        dispatcher: ExportDispatcher,
    }

    async fn harness(transport: ScriptedTransport, observations: &[(&str, i64)]) -> Harness {
        let store = Arc::new(InMemoryExportStore::new());
        let transport = Arc::new(transport);
        let clock = Arc::new(ManualTimeProvider::new(1_000_000));

        store
            .upsert_configuration(&ExportConfiguration {
                config_id: "archive".to_string(),
                name: "Archive".to_string(),
                description: String::new(),
                filter: EntityFilter::Observations(ObservationFilter::default()),
                target: ExportTarget {
                    url: "http://archive.example".to_string(),
                    user: "station".to_string(),
                    password: "secret".to_string(),
                },
                enabled: true,
            })
            .await
            .unwrap();
        for (id, created_at_ms) in observations {
            store
                .insert_observation(&Observation {
                    id: id.to_string(),
                    camera_id: "cam1".to_string(),
                    obs_time_ms: *created_at_ms,
                    semantic_type: "meteor".to_string(),
                    payload: serde_json::json!({"peak_mag": -1.0}),
                    local: true,
                    created_at_ms: *created_at_ms,
                })
                .await
                .unwrap();
        }
        ExportMarker::new(store.clone(), clock.clone())
            .mark("archive")
            .await
            .unwrap();

        let dispatcher = ExportDispatcher::new(
            store.clone(),
            transport.clone(),
            clock.clone(),
            DispatcherSettings::default(),
        );
        Harness {
            store,
            transport,
            clock,
            dispatcher,
        }
    }

    fn unbounded(h: &Harness) -> RunContext {
        RunContext::unbounded(h.clock.clone())
    }

    async fn row(h: &Harness, id: &str) -> crate::domain::TrackingRow {
        h.store
            .find_tracking(EntityKind::Observation, id, "archive")
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_delivers_oldest_first() {
        let h = harness(
            ScriptedTransport::always_delivers(),
            &[("late", 300), ("early", 100), ("middle", 200)],
        )
        .await;

        let report = h.dispatcher.run_until_idle(&unbounded(&h)).await.unwrap();
        assert_eq!(report.delivered, 3);

        let order: Vec<String> = h
            .transport
            .pushes()
            .into_iter()
            .map(|(_, p)| p.entity_id)
            .collect();
        assert_eq!(order, vec!["early", "middle", "late"]);
        assert_eq!(row(&h, "early").await.state, ExportState::Delivered);

        let (target, payload) = &h.transport.pushes()[0];
        assert_eq!(target.user, "station");
        assert_eq!(payload.kind, EntityKind::Observation);
        assert_eq!(payload.entity["payload"]["peak_mag"], -1.0);
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_budget() {
        let h = harness(
            ScriptedTransport::new(DeliveryOutcome::Transient("503".to_string())),
            &[("o1", 100)],
        )
        .await;

        for expected_attempts in 1..=2 {
            let report = h.dispatcher.run_until_idle(&unbounded(&h)).await.unwrap();
            assert_eq!(report.deferred, 1);
            let r = row(&h, "o1").await;
            assert_eq!(r.state, ExportState::Pending);
            assert_eq!(r.attempts, expected_attempts);
            assert!(r.next_attempt_at_ms > h.clock.now_millis());

            // not eligible before the backoff expires
            assert!(h.dispatcher.next_task().await.unwrap().is_none());
            h.clock.set(r.next_attempt_at_ms);
        }

        let report = h.dispatcher.run_until_idle(&unbounded(&h)).await.unwrap();
        assert_eq!(report.failed, 1);
        let r = row(&h, "o1").await;
        assert_eq!(r.state, ExportState::Failed);
        assert_eq!(r.attempts, 3);
        assert_eq!(r.last_error.as_deref(), Some("503"));

        // terminal rows are never picked again
        h.clock.advance(DEFAULT_CLAIM_LEASE_MS * 100);
        assert!(h.dispatcher.next_task().await.unwrap().is_none());
        assert_eq!(h.transport.pushes().len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_rejection_fails_immediately() {
        let h = harness(
            ScriptedTransport::new(DeliveryOutcome::Permanent("401".to_string())),
            &[("o1", 100)],
        )
        .await;

        let report = h.dispatcher.run_until_idle(&unbounded(&h)).await.unwrap();
        assert_eq!(report.failed, 1);
        let r = row(&h, "o1").await;
        assert_eq!(r.state, ExportState::Failed);
        assert_eq!(r.attempts, 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let h = harness(
            ScriptedTransport::always_delivers()
                .then(DeliveryOutcome::Transient("timeout".to_string())),
            &[("o1", 100)],
        )
        .await;

        h.dispatcher.run_until_idle(&unbounded(&h)).await.unwrap();
        let r = row(&h, "o1").await;
        h.clock.set(r.next_attempt_at_ms);

        let report = h.dispatcher.run_until_idle(&unbounded(&h)).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(row(&h, "o1").await.state, ExportState::Delivered);
    }

    #[tokio::test]
    async fn test_retry_times_grow_across_transient_failures() {
        let h = harness(
            ScriptedTransport::new(DeliveryOutcome::Transient("503".to_string())),
            &[("o1", 100)],
        )
        .await;
        let dispatcher = ExportDispatcher::new(
            h.store.clone(),
            h.transport.clone(),
            h.clock.clone(),
            DispatcherSettings {
                backoff: BackoffPolicy {
                    max_attempts: 5,
                    ..BackoffPolicy::default()
                },
                ..DispatcherSettings::default()
            },
        );

        let mut delays = Vec::new();
        for _ in 0..4 {
            let task = dispatcher.next_task().await.unwrap().unwrap();
            let DispatchOutcome::Deferred { next_attempt_at_ms } =
                dispatcher.perform(&task).await.unwrap()
            else {
                panic!("expected a deferred outcome");
            };
            assert_eq!(row(&h, "o1").await.next_attempt_at_ms, next_attempt_at_ms);
            delays.push(next_attempt_at_ms - h.clock.now_millis());
            h.clock.set(next_attempt_at_ms);
        }

        assert!(delays[0] > 0);
        assert!(delays.windows(2).all(|w| w[1] > w[0]), "{:?}", delays);
    }

    struct PanickingTransport;

    #[async_trait::async_trait]
    impl ExportTransport for PanickingTransport {
        async fn push(
            &self,
            _target: &ExportTarget,
            _payload: &crate::domain::ExportPayload,
        ) -> DeliveryOutcome {
            panic!("serializer bug")
        }
    }

    #[tokio::test]
    async fn test_panicking_transport_defers_row() {
        let h = harness(ScriptedTransport::always_delivers(), &[("o1", 100)]).await;
        let dispatcher = ExportDispatcher::new(
            h.store.clone(),
            Arc::new(PanickingTransport),
            h.clock.clone(),
            DispatcherSettings::default(),
        );

        let report = dispatcher.run_until_idle(&unbounded(&h)).await.unwrap();
        assert_eq!(report.deferred, 1);
        let r = row(&h, "o1").await;
        assert_eq!(r.state, ExportState::Pending);
        assert_eq!(r.attempts, 1);
        assert!(r.last_error.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn test_claim_hides_row_until_lease_expires() {
        let h = harness(ScriptedTransport::always_delivers(), &[("o1", 100)]).await;

        let claimed = h.dispatcher.next_task().await.unwrap();
        assert!(claimed.is_some());
        assert!(h.dispatcher.next_task().await.unwrap().is_none());

        h.clock.advance(DEFAULT_CLAIM_LEASE_MS);
        assert!(h.dispatcher.next_task().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_deleted_entity_is_discarded() {
        let h = harness(ScriptedTransport::always_delivers(), &[("o1", 100)]).await;

        let task = h.dispatcher.next_task().await.unwrap().unwrap();
        h.store
            .delete_entity(EntityKind::Observation, "o1")
            .await
            .unwrap();

        let outcome = h.dispatcher.perform(&task).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Discarded);
        assert!(h.store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_configuration_is_skipped() {
        let h = harness(ScriptedTransport::always_delivers(), &[("o1", 100)]).await;
        let mut config = h
            .store
            .get_configuration("archive")
            .await
            .unwrap()
            .unwrap();
        config.enabled = false;
        h.store.upsert_configuration(&config).await.unwrap();

        let report = h.dispatcher.run_until_idle(&unbounded(&h)).await.unwrap();
        assert_eq!(report.attempted(), 0);
        assert_eq!(row(&h, "o1").await.state, ExportState::Pending);
    }

    #[tokio::test]
    async fn test_expired_deadline_dispatches_nothing() {
        let h = harness(ScriptedTransport::always_delivers(), &[("o1", 100)]).await;
        let ctx = RunContext::new(Some(h.clock.now_millis() - 1), h.clock.clone());

        let report = h.dispatcher.run_until_idle(&ctx).await.unwrap();
        assert!(report.deadline_hit);
        assert!(h.transport.pushes().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness(ScriptedTransport::always_delivers(), &[("o1", 100)]).await;
        let (tx, token) = shutdown_channel();
        let dispatcher = Arc::new(h.dispatcher);

        let running = Arc::clone(&dispatcher);
        let handle = tokio::spawn(async move { running.run(token).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("dispatcher did not stop")
            .unwrap()
            .unwrap();

        assert_eq!(h.transport.pushes().len(), 1);
        let r = h
            .store
            .find_tracking(EntityKind::Observation, "o1", "archive")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(r.state, ExportState::Delivered);
    }
}
