//! The monitor: registry, checks, sweeps and the sweep timer.

use artguard_core::{
    AlertEvent, Artifact, ArtifactId, ArtifactSettingsUpdate, ArtifactStatus, Clock,
    DetectionReport, EventKind, Finding, Metadata, MonitorEvent, RepairResult, SeverityCounts,
    MetricToken, Time, ValidationReport,
};
use artguard_detect::Detector;
use artguard_metrics::{MetricOutcome, MetricRequest, MetricsAggregator};
use artguard_quality::Validator;
use artguard_repair::RepairEngine;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::alert::AlertSink;
use crate::builder::MonitorBuilder;
use crate::bus::{EventBus, Subscription};
use crate::check::{CheckOutcome, CheckReport, SweepSummary};
use crate::config::{AlertThresholds, MonitorConfig, ThresholdsUpdate};
use crate::error::{MonitorError, Result};

/// One registered artifact and its busy flag.
struct ArtifactSlot {
    artifact: RwLock<Artifact>,
    busy: AtomicBool,
}

impl ArtifactSlot {
    fn read(&self) -> RwLockReadGuard<'_, Artifact> {
        self.artifact.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Artifact> {
        self.artifact.write().unwrap_or_else(|e| e.into_inner())
    }

    fn status(&self) -> ArtifactStatus {
        self.read().status(self.busy.load(Ordering::Acquire))
    }
}

/// Holds an artifact's busy flag for the duration of a check.
struct BusyGuard(Arc<ArtifactSlot>);

impl BusyGuard {
    fn acquire(slot: Arc<ArtifactSlot>) -> Option<Self> {
        slot.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(slot))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::Release);
    }
}

/// A started metric run; discarded if the check never completes it.
struct PendingMetric {
    metrics: Arc<MetricsAggregator>,
    token: Option<MetricToken>,
}

impl PendingMetric {
    fn start(metrics: &Arc<MetricsAggregator>, request: MetricRequest) -> Self {
        Self {
            token: Some(metrics.record_start(request)),
            metrics: Arc::clone(metrics),
        }
    }

    fn complete(mut self, outcome: MetricOutcome) -> artguard_metrics::Result<()> {
        match self.token.take() {
            Some(token) => self.metrics.record_complete(token, outcome).map(|_| ()),
            None => Ok(()),
        }
    }
}

impl Drop for PendingMetric {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.metrics.discard(token);
        }
    }
}

struct SweepTimer {
    shutdown: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

struct MonitorInner {
    config: MonitorConfig,
    thresholds: RwLock<AlertThresholds>,
    detector: Detector,
    validator: Validator,
    repair: RepairEngine,
    artifacts: DashMap<ArtifactId, Arc<ArtifactSlot>>,
    bus: EventBus,
    sinks: Vec<Arc<dyn AlertSink>>,
    metrics: Option<Arc<MetricsAggregator>>,
    clock: Arc<dyn Clock>,
    limiter: Arc<Semaphore>,
    timer: Mutex<Option<SweepTimer>>,
}

/// Watches registered artifacts and checks them on a timer.
///
/// Cloning is cheap; clones share the same state. Checks of different
/// artifacts run in parallel, checks of one artifact never overlap: a check
/// that finds the artifact busy is skipped.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("artifacts", &self.inner.artifacts.len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Monitor {
    pub(crate) fn from_parts(
        config: MonitorConfig,
        detector: Detector,
        validator: Validator,
        repair: RepairEngine,
        sinks: Vec<Arc<dyn AlertSink>>,
        metrics: Option<Arc<MetricsAggregator>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let permits = match config.max_concurrent_checks {
            0 => Semaphore::MAX_PERMITS,
            n => n,
        };
        Self {
            inner: Arc::new(MonitorInner {
                thresholds: RwLock::new(config.thresholds),
                bus: EventBus::new(config.event_capacity),
                limiter: Arc::new(Semaphore::new(permits)),
                config,
                detector,
                validator,
                repair,
                artifacts: DashMap::new(),
                sinks,
                metrics,
                clock,
                timer: Mutex::new(None),
            }),
        }
    }

    /// Start building a monitor.
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::new()
    }

    /// The settings the monitor was built with.
    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// The attached metrics aggregator.
    pub fn metrics(&self) -> Option<&Arc<MetricsAggregator>> {
        self.inner.metrics.as_ref()
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> Subscription {
        self.inner.bus.subscribe()
    }

    /// Subscribe to some event kinds.
    pub fn subscribe_to(&self, kinds: impl IntoIterator<Item = EventKind>) -> Subscription {
        self.inner.bus.subscribe_to(kinds)
    }

    fn publish(&self, event: MonitorEvent) {
        self.inner.bus.publish(event);
    }

    // ============================================================
    // Lifecycle
    // ============================================================

    /// Whether the sweep timer is running.
    pub fn is_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Start the sweep timer. Returns `false` if it was already running.
    ///
    /// Must be called inside a Tokio runtime. The first sweep happens one
    /// interval after the start.
    pub fn start(&self) -> bool {
        let mut timer = self.inner.timer.lock().unwrap_or_else(|e| e.into_inner());
        if timer.is_some() {
            debug!("monitor already running");
            return false;
        }

        let (shutdown, mut stopped) = watch::channel(false);
        let period = Duration::from_millis(self.inner.config.sweep_interval_ms.max(1));
        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        let monitor = Monitor { inner };
                        // sweeps run on their own so stop() never cuts a check short
                        tokio::spawn(async move {
                            monitor.sweep().await;
                        });
                    }
                    _ = stopped.changed() => break,
                }
            }
        });

        *timer = Some(SweepTimer {
            shutdown,
            _task: task,
        });
        drop(timer);

        info!(interval_ms = self.inner.config.sweep_interval_ms, "monitoring started");
        self.publish(MonitorEvent::MonitoringStarted {
            at: self.inner.clock.now(),
        });
        true
    }

    /// Stop the sweep timer. Returns `false` if it was not running.
    ///
    /// Checks already in flight finish normally.
    pub fn stop(&self) -> bool {
        let Some(timer) = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        else {
            debug!("monitor not running");
            return false;
        };
        let _ = timer.shutdown.send(true);

        info!("monitoring stopped");
        self.publish(MonitorEvent::MonitoringStopped {
            at: self.inner.clock.now(),
        });
        true
    }

    // ============================================================
    // Registry
    // ============================================================

    /// Put an artifact under watch. Returns `false` if the id is taken.
    #[instrument(skip_all, fields(artifact_id = %id))]
    pub fn register(
        &self,
        id: ArtifactId,
        text: impl Into<String>,
        type_tag: impl Into<String>,
        metadata: Metadata,
    ) -> bool {
        match self.inner.artifacts.entry(id.clone()) {
            Entry::Occupied(_) => {
                warn!("artifact already registered");
                false
            }
            Entry::Vacant(slot) => {
                let artifact = Artifact::new(id.clone(), text, type_tag, metadata, self.inner.clock.now())
                    .with_settings(
                        self.inner.config.auto_fix_by_default,
                        self.inner.config.alerts_by_default,
                    );
                slot.insert(Arc::new(ArtifactSlot {
                    artifact: RwLock::new(artifact),
                    busy: AtomicBool::new(false),
                }));
                info!("artifact registered");
                self.publish(MonitorEvent::ArtifactRegistered { id });
                true
            }
        }
    }

    /// Remove an artifact. Returns `false` if it was not registered.
    ///
    /// A check already running for it completes but its results are dropped.
    pub fn unregister(&self, id: &ArtifactId) -> bool {
        if self.inner.artifacts.remove(id).is_none() {
            return false;
        }
        info!(artifact_id = %id, "artifact unregistered");
        self.publish(MonitorEvent::ArtifactUnregistered { id: id.clone() });
        true
    }

    /// Status of one artifact.
    pub fn get_status(&self, id: &ArtifactId) -> Option<ArtifactStatus> {
        self.slot(id).map(|slot| slot.status())
    }

    /// Status of every artifact, ordered by id.
    pub fn list_all(&self) -> Vec<ArtifactStatus> {
        let mut all: Vec<ArtifactStatus> = self
            .inner
            .artifacts
            .iter()
            .map(|entry| entry.value().status())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Number of registered artifacts.
    pub fn len(&self) -> usize {
        self.inner.artifacts.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.artifacts.is_empty()
    }

    /// Change an artifact's auto-fix and alert switches.
    pub fn update_artifact_settings(&self, id: &ArtifactId, update: &ArtifactSettingsUpdate) -> Result<()> {
        let slot = self
            .slot(id)
            .ok_or_else(|| MonitorError::UnknownArtifact(id.clone()))?;
        slot.write().apply_settings(update);
        debug!(artifact_id = %id, ?update, "artifact settings updated");
        Ok(())
    }

    /// Change some alert thresholds.
    pub fn update_thresholds(&self, update: &ThresholdsUpdate) {
        let mut thresholds = self.inner.thresholds.write().unwrap_or_else(|e| e.into_inner());
        thresholds.apply(update);
        debug!(thresholds = ?*thresholds, "alert thresholds updated");
    }

    /// Current alert thresholds.
    pub fn thresholds(&self) -> AlertThresholds {
        *self.inner.thresholds.read().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, id: &ArtifactId) -> Option<Arc<ArtifactSlot>> {
        self.inner.artifacts.get(id).map(|entry| Arc::clone(entry.value()))
    }

    // ============================================================
    // Stateless operations
    // ============================================================

    /// Detect findings in a text without registering it.
    pub async fn run_detection(&self, text: &str, type_tag: &str) -> DetectionReport {
        self.inner.detector.detect(text, type_tag).await
    }

    /// Validate a text without registering it.
    pub fn run_validation(&self, text: &str, type_tag: &str) -> ValidationReport {
        self.inner.validator.validate(text, type_tag)
    }

    /// Repair a text without registering it.
    pub async fn repair(&self, text: &str, type_tag: &str, findings: &[Finding]) -> RepairResult {
        self.inner.repair.repair(text, type_tag, findings).await
    }

    // ============================================================
    // Checks
    // ============================================================

    /// Check one artifact now. `None` if it is not registered.
    #[instrument(skip_all, fields(artifact_id = %id))]
    pub async fn check_one(&self, id: &ArtifactId) -> Option<CheckOutcome> {
        let slot = self.slot(id)?;
        Some(self.check_slot(id.clone(), slot).await)
    }

    /// Check every registered artifact.
    ///
    /// A check that panics is counted as failed and leaves its artifact as it
    /// was; the other checks are not affected.
    pub async fn sweep(&self) -> SweepSummary {
        let slots: Vec<(ArtifactId, Arc<ArtifactSlot>)> = self
            .inner
            .artifacts
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut tasks = JoinSet::new();
        for (id, slot) in slots {
            let monitor = self.clone();
            let limiter = Arc::clone(&self.inner.limiter);
            tasks.spawn(async move {
                let _permit = limiter.acquire_owned().await.ok();
                let check = tokio::spawn({
                    let id = id.clone();
                    async move { monitor.check_slot(id, slot).await }
                });
                check.await.map_err(|e| (id, e))
            });
        }

        let mut summary = SweepSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(CheckOutcome::Completed(_))) => summary.checked += 1,
                Ok(Ok(CheckOutcome::Skipped)) => summary.skipped += 1,
                Ok(Err((id, e))) => {
                    summary.failed += 1;
                    error!(artifact_id = %id, error = %e, "artifact check failed");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(error = %e, "sweep task failed");
                }
            }
        }

        debug!(
            checked = summary.checked,
            skipped = summary.skipped,
            failed = summary.failed,
            "sweep finished"
        );
        summary
    }

    async fn check_slot(&self, id: ArtifactId, slot: Arc<ArtifactSlot>) -> CheckOutcome {
        let Some(_busy) = BusyGuard::acquire(Arc::clone(&slot)) else {
            debug!(artifact_id = %id, "artifact busy; check skipped");
            return CheckOutcome::Skipped;
        };

        let (text, type_tag, auto_fix, alerts) = {
            let artifact = slot.read();
            (
                artifact.text.clone(),
                artifact.type_tag.clone(),
                artifact.auto_fix_enabled,
                artifact.alerts_enabled,
            )
        };
        let pending = self.inner.metrics.as_ref().map(|m| {
            PendingMetric::start(m, MetricRequest::new(type_tag.clone()).with_label(id.as_str()))
        });

        let detection = self.inner.detector.detect(&text, &type_tag).await;
        let validation = self.inner.validator.validate(&text, &type_tag);
        let checked_at = self.inner.clock.now();

        let diff = {
            let mut artifact = slot.write();
            let diff = artifact.record_check(detection.findings.clone(), checked_at);
            artifact.last_validation = Some((&validation).into());
            diff
        };
        debug!(
            artifact_id = %id,
            findings = detection.findings.len(),
            new = diff.new_findings.len(),
            resolved = diff.resolved_findings.len(),
            "artifact checked"
        );

        if !diff.new_findings.is_empty() {
            self.publish(MonitorEvent::NewErrorsDetected {
                id: id.clone(),
                new_findings: diff.new_findings.clone(),
            });
        }
        let new_critical: Vec<Finding> = diff
            .new_findings
            .iter()
            .filter(|f| f.is_critical())
            .cloned()
            .collect();
        if !new_critical.is_empty() {
            self.publish(MonitorEvent::CriticalErrorsDetected {
                id: id.clone(),
                findings: new_critical,
            });
        }

        let alert = if alerts {
            self.raise_alert(&id, &diff.new_findings, checked_at)
        } else {
            None
        };

        let mut repair = None;
        let mut recheck_scheduled = false;
        if auto_fix && !detection.findings.is_empty() {
            let result = self.inner.repair.repair(&text, &type_tag, &detection.findings).await;
            if result.changed() {
                slot.write().text = result.fixed_text.clone();
                info!(
                    artifact_id = %id,
                    applied = result.applied_fixes.len(),
                    improvement_rate = result.improvement_rate,
                    "auto-fix applied"
                );
                self.publish(MonitorEvent::AutoFixCompleted {
                    id: id.clone(),
                    result: Box::new(result.clone()),
                });
                self.schedule_recheck(id.clone());
                recheck_scheduled = true;
            } else {
                let reason = auto_fix_failure_reason(&result);
                warn!(artifact_id = %id, %reason, "auto-fix applied nothing");
                self.publish(MonitorEvent::AutoFixFailed {
                    id: id.clone(),
                    reason,
                });
            }
            if let Some(metrics) = &self.inner.metrics {
                metrics.record_repair(&result);
            }
            repair = Some(result);
        }

        if let Some(pending) = pending {
            let outcome = MetricOutcome::from_check(&text, &detection, Some(&validation), repair.as_ref());
            if let Err(e) = pending.complete(outcome) {
                warn!(artifact_id = %id, error = %e, "metric sample dropped");
            }
        }

        CheckOutcome::Completed(Box::new(CheckReport {
            id,
            checked_at,
            diff,
            detection,
            validation,
            repair,
            alert,
            recheck_scheduled,
        }))
    }

    fn raise_alert(
        &self,
        id: &ArtifactId,
        new_findings: &[Finding],
        at: Time,
    ) -> Option<AlertEvent> {
        let counts = SeverityCounts::from_findings(new_findings);
        let reasons = self.thresholds().evaluate(&counts);
        if reasons.is_empty() {
            return None;
        }

        let alert = AlertEvent::new(id.clone(), counts, reasons, at);
        self.publish(MonitorEvent::AlertTriggered(alert.clone()));
        for sink in &self.inner.sinks {
            let sink = Arc::clone(sink);
            let alert = alert.clone();
            tokio::spawn(async move {
                if let Err(e) = sink.deliver(&alert).await {
                    warn!(sink = sink.name(), alert_id = %alert.id, error = %e, "alert delivery failed");
                }
            });
        }
        Some(alert)
    }

    /// Check the artifact again after the configured delay.
    fn schedule_recheck(&self, id: ArtifactId) {
        let weak = Arc::downgrade(&self.inner);
        let delay = Duration::from_millis(self.inner.config.recheck_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else { return };
            let monitor = Monitor { inner };
            match monitor.check_one(&id).await {
                Some(CheckOutcome::Skipped) => debug!(artifact_id = %id, "re-check skipped; artifact busy"),
                None => debug!(artifact_id = %id, "re-check dropped; artifact gone"),
                Some(CheckOutcome::Completed(_)) => {}
            }
        });
    }
}

fn auto_fix_failure_reason(result: &RepairResult) -> String {
    let mut reasons: Vec<String> = result
        .failed_fixes
        .iter()
        .filter_map(|attempt| attempt.reason.as_ref().map(|r| format!("{}: {}", attempt.finding.kind, r)))
        .collect();
    reasons.dedup();
    if reasons.is_empty() {
        "no fix applied".to_string()
    } else {
        reasons.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artguard_core::{Category, Severity};
    use artguard_core::CompiledContract;
    use artguard_detect::{DetectorConfig, NoopSandbox, PatternLibrary, Sandbox, SandboxOutcome};
    use artguard_repair::Transformation;
    use artguard_metrics::MetricsConfig;
    use async_trait::async_trait;

    const CLEAN_SHELL: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Tilt maze</title>
</head>
<body>
<canvas id="board"></canvas>
<script>
INIT
InputBridge.on('tilt', (data) => {
  move(data?.orientation?.beta ?? 0);
});
function move(dy) {
  ball.y += dy;
}
</script>
</body>
</html>
"#;

    fn without_init() -> String {
        CLEAN_SHELL.replace("INIT\n", "")
    }

    fn with_init() -> String {
        CLEAN_SHELL.replace("INIT", "InputBridge.init();")
    }

    fn builder() -> MonitorBuilder {
        MonitorBuilder::new()
            .sandbox(Arc::new(NoopSandbox))
            .detector_config(DetectorConfig::default().with_sandbox_enabled(false))
            .alert_sinks(vec![])
    }

    fn monitor() -> Monitor {
        builder().build().unwrap()
    }

    fn id(s: &str) -> ArtifactId {
        ArtifactId::new(s)
    }

    fn kinds(events: &[MonitorEvent]) -> Vec<EventKind> {
        events.iter().map(MonitorEvent::kind).collect()
    }

    #[tokio::test]
    async fn test_missing_init_is_one_critical_contract_finding() {
        let monitor = monitor();
        let text = without_init();
        assert!(monitor.register(id("maze"), text.clone(), "game", Metadata::new()));

        let report = monitor.run_detection(&text, "game").await;
        assert_eq!(report.findings.len(), 1, "{:?}", report.findings);
        assert_eq!(report.findings[0].category, Category::FrameworkContract);
        assert_eq!(report.findings[0].severity, Severity::Critical);
        assert!(!monitor.run_validation(&text, "game").is_valid);

        let clean = monitor.run_detection(&with_init(), "game").await;
        assert!(clean.is_clean(), "{:?}", clean.findings);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_fix_then_deferred_recheck() {
        let monitor = monitor();
        let maze = id("maze");
        monitor.register(maze.clone(), without_init(), "game", Metadata::new());
        monitor
            .update_artifact_settings(
                &maze,
                &ArtifactSettingsUpdate {
                    auto_fix_enabled: Some(true),
                    alerts_enabled: None,
                },
            )
            .unwrap();
        let mut events = monitor.subscribe();

        let summary = monitor.sweep().await;
        assert_eq!(summary.checked, 1);
        let emitted = events.drain();
        assert_eq!(
            kinds(&emitted),
            vec![
                EventKind::NewErrorsDetected,
                EventKind::CriticalErrorsDetected,
                EventKind::AlertTriggered,
                EventKind::AutoFixCompleted,
            ]
        );

        let status = monitor.get_status(&maze).unwrap();
        assert!(status.text.contains("<script>\nInputBridge.init();"));
        assert_eq!(status.current_findings.len(), 1);
        assert_eq!(status.history.len(), 1);

        tokio::time::sleep(Duration::from_millis(monitor.config().recheck_delay_ms + 10)).await;
        for _ in 0..100 {
            if monitor.get_status(&maze).unwrap().history.len() > 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let status = monitor.get_status(&maze).unwrap();
        assert!(status
            .current_findings
            .iter()
            .all(|f| f.kind != "missing-sdk-init"));
        assert_eq!(status.history.len(), 2);
        assert!(!status.busy);
    }

    #[tokio::test]
    async fn test_alert_reasons_follow_thresholds() {
        let monitor = monitor();
        monitor.update_thresholds(&ThresholdsUpdate {
            critical: Some(1),
            low: Some(10),
            ..Default::default()
        });
        let text = "<html><head><title>x</title></head><body><script>InputBridge.on('tap', f);</script></body></html>";
        monitor.register(id("bare"), text, "game", Metadata::new());
        let mut alerts = monitor.subscribe_to([EventKind::AlertTriggered]);

        monitor.sweep().await;

        let Some(MonitorEvent::AlertTriggered(alert)) = alerts.try_recv() else {
            panic!("expected an alert");
        };
        assert_eq!(alert.severity_counts.critical, 1);
        assert_eq!(alert.severity_counts.low, 3);
        assert_eq!(alert.triggering_reasons, vec!["critical: 1".to_string()]);
    }

    #[tokio::test]
    async fn test_unregistered_artifact_check_is_none() {
        let monitor = monitor();
        let gone = id("gone");
        monitor.register(gone.clone(), with_init(), "game", Metadata::new());
        assert!(monitor.unregister(&gone));
        let mut events = monitor.subscribe();

        assert!(monitor.check_one(&gone).await.is_none());
        assert!(monitor.get_status(&gone).is_none());
        assert!(!monitor.unregister(&gone));
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_register_is_rejected() {
        let monitor = monitor();
        assert!(monitor.register(id("a"), "one", "game", Metadata::new()));
        assert!(!monitor.register(id("a"), "two", "game", Metadata::new()));
        assert_eq!(monitor.get_status(&id("a")).unwrap().text, "one");
        assert_eq!(monitor.len(), 1);
    }

    #[tokio::test]
    async fn test_alerts_disabled_still_reports_criticals() {
        let monitor = builder()
            .config(MonitorConfig::default().with_alerts_by_default(false))
            .build()
            .unwrap();
        monitor.register(id("maze"), without_init(), "game", Metadata::new());
        let mut events = monitor.subscribe();

        let outcome = monitor.check_one(&id("maze")).await.unwrap();
        assert!(outcome.report().unwrap().alert.is_none());
        assert_eq!(
            kinds(&events.drain()),
            vec![EventKind::NewErrorsDetected, EventKind::CriticalErrorsDetected]
        );
    }

    #[tokio::test]
    async fn test_unchanged_findings_raise_nothing_new() {
        let monitor = monitor();
        monitor.register(id("maze"), without_init(), "game", Metadata::new());
        monitor.check_one(&id("maze")).await;
        let mut events = monitor.subscribe();

        let outcome = monitor.check_one(&id("maze")).await.unwrap();
        let report = outcome.report().unwrap();
        assert!(report.diff.new_findings.is_empty());
        assert_eq!(report.diff.unchanged_findings.len(), 1);
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_auto_fix_without_transformation_fails() {
        let monitor = monitor();
        let text = with_init().replace("ball.y += dy;", "eval('ball.y += ' + dy);");
        monitor.register(id("evil"), text.clone(), "game", Metadata::new());
        monitor
            .update_artifact_settings(
                &id("evil"),
                &ArtifactSettingsUpdate {
                    auto_fix_enabled: Some(true),
                    alerts_enabled: Some(false),
                },
            )
            .unwrap();
        let mut failures = monitor.subscribe_to([EventKind::AutoFixFailed]);

        let outcome = monitor.check_one(&id("evil")).await.unwrap();
        let report = outcome.report().unwrap();
        assert!(!report.recheck_scheduled);
        assert_eq!(monitor.get_status(&id("evil")).unwrap().text, text);
        match failures.try_recv() {
            Some(MonitorEvent::AutoFixFailed { reason, .. }) => assert!(reason.contains("eval-usage")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_artifact_settings() {
        let monitor = monitor();
        let err = monitor
            .update_artifact_settings(&id("nope"), &ArtifactSettingsUpdate::default())
            .unwrap_err();
        assert!(matches!(err, MonitorError::UnknownArtifact(_)));
    }

    #[tokio::test]
    async fn test_list_all_sorted() {
        let monitor = monitor();
        for name in ["c", "a", "b"] {
            monitor.register(id(name), with_init(), "game", Metadata::new());
        }
        let ids: Vec<String> = monitor.list_all().into_iter().map(|s| s.id.to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_checks_record_metrics() {
        let metrics = Arc::new(MetricsAggregator::new(MetricsConfig::default()));
        let monitor = builder().metrics(Arc::clone(&metrics)).build().unwrap();
        monitor.register(id("a"), with_init(), "game", Metadata::new());
        monitor.register(id("b"), without_init(), "game", Metadata::new());

        monitor.sweep().await;

        let samples = metrics.samples();
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.success));
        assert_eq!(metrics.get_current_status().in_flight, 0);
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let monitor = monitor();
        let mut events = monitor.subscribe();
        assert!(monitor.start());
        assert!(!monitor.start());
        assert!(monitor.is_running());
        assert!(monitor.stop());
        assert!(!monitor.stop());
        assert!(!monitor.is_running());
        assert_eq!(
            kinds(&events.drain()),
            vec![EventKind::MonitoringStarted, EventKind::MonitoringStopped]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_drives_sweeps() {
        let monitor = builder()
            .config(MonitorConfig::default().with_sweep_interval_ms(1_000))
            .build()
            .unwrap();
        monitor.register(id("a"), with_init(), "game", Metadata::new());
        monitor.start();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(monitor.get_status(&id("a")).unwrap().last_checked_at.is_none());

        tokio::time::sleep(Duration::from_millis(510)).await;
        for _ in 0..50 {
            if monitor.get_status(&id("a")).unwrap().last_checked_at.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(monitor.get_status(&id("a")).unwrap().last_checked_at.is_some());

        monitor.stop();
        let checked = monitor.get_status(&id("a")).unwrap().history.len();
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(monitor.get_status(&id("a")).unwrap().history.len(), checked);
    }

    /// Sandbox that takes its time.
    struct TestSandbox {
        delay: Duration,
    }

    #[async_trait]
    impl Sandbox for TestSandbox {
        fn name(&self) -> &str {
            "test"
        }

        async fn trial_run(&self, _scripts: &[String]) -> SandboxOutcome {
            tokio::time::sleep(self.delay).await;
            SandboxOutcome::Completed(vec![])
        }
    }

    fn sandboxed(delay: Duration) -> Monitor {
        MonitorBuilder::new()
            .sandbox(Arc::new(TestSandbox { delay }))
            .detector_config(DetectorConfig::default().with_sandbox_timeout_ms(10_000))
            .alert_sinks(vec![])
            .build()
            .unwrap()
    }

    struct Crashing;

    impl Transformation for Crashing {
        fn id(&self) -> &str {
            "crashing"
        }

        fn needs_fix(&self, _text: &str) -> bool {
            true
        }

        fn apply(&self, _text: &str) -> String {
            panic!("transformation crashed")
        }
    }

    #[tokio::test]
    async fn test_sweep_isolates_failing_check() {
        let contract = CompiledContract::default_contract().unwrap();
        let detector = Detector::new(
            PatternLibrary::with_defaults(&contract).unwrap(),
            Arc::new(NoopSandbox),
            DetectorConfig::default().with_sandbox_enabled(false),
        );
        let mut engine = RepairEngine::new(detector);
        engine.register("eval-usage", Arc::new(Crashing));
        let metrics = Arc::new(MetricsAggregator::new(MetricsConfig::default()));
        let monitor = builder()
            .repair_engine(engine)
            .metrics(Arc::clone(&metrics))
            .build()
            .unwrap();

        let bad_text = with_init().replace("ball.y += dy;", "eval('ball.y += ' + dy);");
        monitor.register(id("bad"), bad_text.clone(), "game", Metadata::new());
        monitor.register(id("good"), with_init(), "game", Metadata::new());
        monitor
            .update_artifact_settings(
                &id("bad"),
                &ArtifactSettingsUpdate {
                    auto_fix_enabled: Some(true),
                    alerts_enabled: None,
                },
            )
            .unwrap();

        let summary = monitor.sweep().await;
        assert_eq!(summary, SweepSummary { checked: 1, skipped: 0, failed: 1 });

        let bad = monitor.get_status(&id("bad")).unwrap();
        assert!(!bad.busy);
        assert_eq!(bad.text, bad_text);
        assert!(monitor.get_status(&id("good")).unwrap().last_checked_at.is_some());

        // the aborted check leaves no run behind
        assert_eq!(metrics.get_current_status().in_flight, 0);
        assert_eq!(metrics.samples().len(), 1);

        // the artifact stays checkable once the fault is gone
        monitor
            .update_artifact_settings(
                &id("bad"),
                &ArtifactSettingsUpdate {
                    auto_fix_enabled: Some(false),
                    alerts_enabled: None,
                },
            )
            .unwrap();
        assert!(matches!(
            monitor.check_one(&id("bad")).await,
            Some(CheckOutcome::Completed(_))
        ));
        assert_eq!(metrics.get_current_status().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_artifact_is_skipped() {
        let monitor = sandboxed(Duration::from_millis(200));
        let a = id("a");
        monitor.register(a.clone(), with_init(), "game", Metadata::new());

        let (first, second) = tokio::join!(monitor.check_one(&a), monitor.check_one(&a));
        assert!(matches!(first, Some(CheckOutcome::Completed(_))));
        assert!(matches!(second, Some(CheckOutcome::Skipped)));

        let summary = monitor.sweep().await;
        assert_eq!(summary.checked, 1);
    }
}
