//! Dive monitor: the ingestion entry point for depth telemetry.
//!
//! One evaluation unit per dive at a time: append the sample, evaluate the
//! rules against the snapshot the append returned, deduplicate and store the
//! alerts. Different dives run in parallel. Rule configuration is read
//! through a short-lived cache outside the per-dive lock.

use std::{
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use jiff::{Timestamp, tz::TimeZone};
use uuid::Uuid;

use crate::{
    keyed::KeyedLocks,
    model::{DepthSample, DiveState, SafetyAlert, SafetyAlertRule},
    safety::{RuleEngine, Snapshot},
    sink::AlertSink,
    storage::{Storage, StorageError},
};

/// Errors surfaced to whoever delivered a sample or asked for a check.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("dive {dive_id} is {state}, cannot {action}")]
    InvalidStateTransition {
        dive_id: Uuid,
        state: DiveState,
        action: &'static str,
    },

    #[error("dive not found: {0}")]
    DiveNotFound(Uuid),

    #[error("invalid depth {0}: expected a finite, non-negative number of metres")]
    InvalidDepth(f64),

    #[error("sample at {got} is older than the last sample at {last}")]
    OutOfOrderSample { last: Timestamp, got: Timestamp },

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for MonitorError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidStateTransition {
                dive_id,
                state,
                action,
            } => Self::InvalidStateTransition {
                dive_id,
                state,
                action,
            },
            StorageError::DiveNotFound(id) => Self::DiveNotFound(id),
            StorageError::OutOfOrderSample { last, got, .. } => {
                Self::OutOfOrderSample { last, got }
            }
            other => Self::Storage(other),
        }
    }
}

pub type Result<T> = core::result::Result<T, MonitorError>;

/// What one evaluation pass produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Alerts stored by this pass.
    pub alerts: Vec<SafetyAlert>,

    /// Set when alerting failed after the sample was committed.
    pub warning: Option<String>,
}

/// What a sweep over all active dives produced.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub checked: usize,
    pub alerts: Vec<SafetyAlert>,
    pub warnings: Vec<String>,
}

/// Enabled rules, refreshed from storage once they are older than the TTL.
#[derive(Debug)]
struct RuleCache {
    ttl: Duration,
    cached: Mutex<Option<(Instant, Vec<SafetyAlertRule>)>>,
}

impl RuleCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// The enabled rules, or `None` when they could not be read.
    fn get(&self, storage: &Storage) -> Option<Vec<SafetyAlertRule>> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((fetched, rules)) = cached.as_ref()
            && fetched.elapsed() < self.ttl
        {
            return Some(rules.clone());
        }

        match storage.list_enabled_rules(None) {
            Ok(rules) => {
                tracing::debug!(count = rules.len(), "rule cache refreshed");
                *cached = Some((Instant::now(), rules.clone()));
                Some(rules)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not load safety rules, checks skipped");
                None
            }
        }
    }
}

#[derive(Debug)]
pub struct DiveMonitor {
    storage: Storage,
    engine: RuleEngine,
    rules: RuleCache,
    locks: KeyedLocks<Uuid>,
    sink: AlertSink,
}

impl DiveMonitor {
    pub fn new(storage: Storage, tz: TimeZone, rule_ttl: Duration, sink: AlertSink) -> Self {
        Self {
            storage,
            engine: RuleEngine::new(tz),
            rules: RuleCache::new(rule_ttl),
            locks: KeyedLocks::new(),
            sink,
        }
    }

    /// Records a depth reading and runs every safety check it can trigger.
    ///
    /// Errors mean the sample was not stored. Once the sample is stored the
    /// call succeeds; an alerting failure after that point comes back as
    /// [`IngestReport::warning`].
    pub fn append_depth_sample(
        &self,
        dive_id: Uuid,
        depth_m: f64,
        recorded_at: Timestamp,
    ) -> Result<IngestReport> {
        if !depth_m.is_finite() || depth_m < 0.0 {
            return Err(MonitorError::InvalidDepth(depth_m));
        }
        let sample = DepthSample {
            depth_m,
            recorded_at,
        };

        self.locks.with_lock(&dive_id, || {
            let appended = self.storage.append_sample(dive_id, sample)?;
            tracing::debug!(%dive_id, depth_m, %recorded_at, "depth sample recorded");
            Ok(self.evaluate(&Snapshot {
                dive: &appended.dive,
                previous: appended.previous,
                sample: Some(appended.sample),
                now: recorded_at,
            }))
        })
    }

    /// Runs the time-based checks for one dive at `now`.
    ///
    /// A dive that is not in the water has nothing to check.
    pub fn tick(&self, dive_id: Uuid, now: Timestamp) -> Result<IngestReport> {
        self.locks.with_lock(&dive_id, || {
            let dive = self.storage.load_dive(dive_id)?;
            if dive.state != DiveState::InProgress {
                return Ok(IngestReport::default());
            }
            Ok(self.evaluate(&Snapshot {
                dive: &dive,
                previous: None,
                sample: None,
                now,
            }))
        })
    }

    /// Ticks every dive currently in progress.
    ///
    /// A dive that fails its tick is logged and reported as a warning; the
    /// sweep carries on with the rest.
    pub fn sweep(&self, now: Timestamp) -> Result<SweepReport> {
        let dives = self.storage.list_active_dives()?;
        let mut report = SweepReport::default();
        for dive in dives {
            report.checked += 1;
            match self.tick(dive.id, now) {
                Ok(tick) => {
                    report.alerts.extend(tick.alerts);
                    report.warnings.extend(tick.warning);
                }
                Err(e) => {
                    tracing::warn!(dive_id = %dive.id, error = %e, "tick failed");
                    report.warnings.push(format!("dive {}: {e}", dive.code));
                }
            }
        }
        tracing::debug!(checked = report.checked, raised = report.alerts.len(), "sweep finished");
        Ok(report)
    }

    fn evaluate(&self, snapshot: &Snapshot<'_>) -> IngestReport {
        let Some(rules) = self.rules.get(&self.storage) else {
            return IngestReport::default();
        };

        let candidates = self.engine.evaluate(&rules, snapshot);
        match self.sink.deliver(&self.storage, snapshot.dive, candidates) {
            Ok(alerts) => IngestReport {
                alerts,
                warning: None,
            },
            Err(e) => {
                tracing::warn!(dive_id = %snapshot.dive.id, error = %e, "alerts not stored");
                IngestReport {
                    alerts: Vec::new(),
                    warning: Some(format!("alerts not stored: {e}")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        sync::{Barrier, mpsc},
        thread,
    };

    use jiff::{SignedDuration, ToSpan, civil::date};
    use serde_json::json;
    use tempfile::TempDir;

    use crate::{
        model::{AlertDetails, Dive, Priority, RuleKind},
        sink::ChannelSubscriber,
        storage::{
            dive::tests::sample_dive, rule::tests::sample_rule, test_support::test_storage,
        },
    };

    fn t0() -> Timestamp {
        Timestamp::from_second(1_717_232_400).unwrap() // 2024-06-01T09:00:00Z
    }

    fn setup(kinds: &[RuleKind]) -> (TempDir, Storage, DiveMonitor, Dive) {
        let (dir, storage) = test_storage();
        for &kind in kinds {
            storage.create_rule(&sample_rule(kind, json!({}))).unwrap();
        }
        let dive = Dive {
            id: Uuid::new_v4(),
            operation_id: None,
            code: "IND-042".into(),
            site: "Harbour wall".into(),
            planned_max_depth_m: 30.0,
            planned_bottom_time_min: Some(20),
            state: DiveState::InProgress,
            date: date(2024, 6, 1),
            start_time: Some(jiff::civil::time(9, 0, 0, 0)),
            supervisor: Some("sup-anna".into()),
            created_at: t0(),
        };
        storage.create_dive(&dive).unwrap();
        let monitor = DiveMonitor::new(
            storage.clone(),
            TimeZone::UTC,
            Duration::from_secs(30),
            AlertSink::new(),
        );
        (dir, storage, monitor, dive)
    }

    fn at(secs: i64) -> Timestamp {
        t0() + SignedDuration::from_secs(secs)
    }

    /// Breaks the schema underneath a running monitor.
    fn drop_table(dir: &TempDir, table: &str) {
        let conn = rusqlite::Connection::open(dir.path().join("db").join("diveops.sqlite")).unwrap();
        conn.execute_batch(&format!("DROP TABLE {table}")).unwrap();
    }

    #[test]
    fn depth_limit_fires_once_until_acknowledged() {
        let (_dir, storage, monitor, dive) = setup(&[RuleKind::DepthLimit]);

        let report = monitor.append_depth_sample(dive.id, 31.0, at(10)).unwrap();
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].kind, RuleKind::DepthLimit);

        let report = monitor.append_depth_sample(dive.id, 32.0, at(20)).unwrap();
        assert!(report.alerts.is_empty());

        storage
            .acknowledge_alert(
                storage.list_alerts(Some(dive.id), true).unwrap()[0].id,
                "sup-anna",
                at(25),
            )
            .unwrap();

        let report = monitor.append_depth_sample(dive.id, 33.0, at(30)).unwrap();
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(storage.list_alerts(Some(dive.id), false).unwrap().len(), 2);
    }

    #[test]
    fn within_limits_raises_nothing() {
        let (_dir, _storage, monitor, dive) =
            setup(&[RuleKind::DepthLimit, RuleKind::AscentRate, RuleKind::BottomTime]);
        for (depth, secs) in [(5.0, 0), (15.0, 60), (30.0, 120), (25.0, 180)] {
            let report = monitor.append_depth_sample(dive.id, depth, at(secs)).unwrap();
            assert!(report.alerts.is_empty(), "{depth} m at {secs} s");
        }
    }

    #[test]
    fn every_fast_ascent_raises_its_own_alert() {
        let (_dir, _storage, monitor, dive) = setup(&[RuleKind::AscentRate]);

        monitor.append_depth_sample(dive.id, 20.0, at(0)).unwrap();
        let first = monitor.append_depth_sample(dive.id, 5.0, at(30)).unwrap();
        assert_eq!(first.alerts.len(), 1);
        let AlertDetails::AscentRate { rate_m_per_min, .. } = &first.alerts[0].details else {
            panic!("expected an ascent rate alert");
        };
        assert!((rate_m_per_min - 30.0).abs() < 1e-9);

        monitor.append_depth_sample(dive.id, 20.0, at(60)).unwrap();
        let second = monitor.append_depth_sample(dive.id, 5.0, at(90)).unwrap();
        assert_eq!(second.alerts.len(), 1);
    }

    #[test]
    fn bottom_time_uses_sample_timestamp_on_append() {
        let (_dir, _storage, monitor, dive) = setup(&[RuleKind::BottomTime]);

        let early = monitor.append_depth_sample(dive.id, 10.0, at(19 * 60)).unwrap();
        assert!(early.alerts.is_empty());

        let late = monitor.append_depth_sample(dive.id, 10.0, at(25 * 60)).unwrap();
        assert_eq!(late.alerts.len(), 1);
        assert_eq!(late.alerts[0].kind, RuleKind::BottomTime);
    }

    #[test]
    fn tick_and_sweep_check_bottom_time() {
        let (_dir, storage, monitor, dive) = setup(&[RuleKind::BottomTime]);

        assert!(monitor.tick(dive.id, t0() + 10.minutes()).unwrap().alerts.is_empty());
        assert_eq!(monitor.tick(dive.id, t0() + 25.minutes()).unwrap().alerts.len(), 1);

        // Still open, so the sweep adds nothing.
        let report = monitor.sweep(t0() + 30.minutes()).unwrap();
        assert_eq!(report.checked, 1);
        assert!(report.alerts.is_empty());

        storage
            .transition_dive(dive.id, DiveState::Completed, None)
            .unwrap();
        assert_eq!(monitor.sweep(t0() + 40.minutes()).unwrap().checked, 0);
        assert!(monitor.tick(dive.id, t0() + 40.minutes()).unwrap().alerts.is_empty());
    }

    #[test]
    fn append_to_finished_dive_is_rejected() {
        let (_dir, storage, monitor, dive) = setup(&[RuleKind::DepthLimit]);
        monitor.append_depth_sample(dive.id, 10.0, at(0)).unwrap();
        storage
            .transition_dive(dive.id, DiveState::Completed, None)
            .unwrap();

        let err = monitor.append_depth_sample(dive.id, 40.0, at(60)).unwrap_err();
        assert!(matches!(
            err,
            MonitorError::InvalidStateTransition {
                state: DiveState::Completed,
                ..
            }
        ));
        assert_eq!(storage.load_samples(dive.id).unwrap().len(), 1);
        assert!(storage.list_alerts(Some(dive.id), false).unwrap().is_empty());
    }

    #[test]
    fn bad_input_is_rejected_before_storage() {
        let (_dir, storage, monitor, dive) = setup(&[]);
        for depth in [-1.0, f64::NAN, f64::INFINITY] {
            let err = monitor.append_depth_sample(dive.id, depth, at(0)).unwrap_err();
            assert!(matches!(err, MonitorError::InvalidDepth(_)));
        }
        assert!(storage.load_samples(dive.id).unwrap().is_empty());

        let err = monitor
            .append_depth_sample(Uuid::new_v4(), 5.0, at(0))
            .unwrap_err();
        assert!(matches!(err, MonitorError::DiveNotFound(_)));

        monitor.append_depth_sample(dive.id, 5.0, at(10)).unwrap();
        let err = monitor.append_depth_sample(dive.id, 5.0, at(5)).unwrap_err();
        assert!(matches!(err, MonitorError::OutOfOrderSample { .. }));
    }

    #[test]
    fn concurrent_appends_raise_one_depth_alert() {
        let (_dir, storage, monitor, dive) = setup(&[RuleKind::DepthLimit]);

        thread::scope(|s| {
            for i in 0..8 {
                let monitor = &monitor;
                s.spawn(move || {
                    monitor
                        .append_depth_sample(dive.id, 35.0 + f64::from(i), at(60))
                        .unwrap();
                });
            }
        });

        let alerts = storage.list_alerts(Some(dive.id), false).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(storage.load_samples(dive.id).unwrap().len(), 8);
    }

    #[test]
    fn separate_monitors_raise_one_depth_alert() {
        let (_dir, storage, _monitor, dive) = setup(&[RuleKind::DepthLimit]);
        // One monitor per process: nothing shared but the database.
        let monitors: Vec<_> = (0..6)
            .map(|_| {
                DiveMonitor::new(
                    storage.clone(),
                    TimeZone::UTC,
                    Duration::from_secs(30),
                    AlertSink::new(),
                )
            })
            .collect();
        let barrier = Barrier::new(monitors.len());

        thread::scope(|s| {
            for monitor in &monitors {
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    monitor.append_depth_sample(dive.id, 40.0, at(60)).unwrap();
                });
            }
        });

        let open = storage.list_alerts(Some(dive.id), true).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(storage.load_samples(dive.id).unwrap().len(), 6);
    }

    #[test]
    fn failed_alert_insert_keeps_sample_and_warns() {
        let (dir, storage, monitor, dive) = setup(&[RuleKind::DepthLimit]);
        drop_table(&dir, "safety_alerts");

        let report = monitor.append_depth_sample(dive.id, 40.0, at(10)).unwrap();

        assert!(report.alerts.is_empty());
        assert!(report.warning.is_some());
        let samples = storage.load_samples(dive.id).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].recorded_at, at(10));
    }

    #[test]
    fn unreadable_rules_skip_checks() {
        let (dir, storage, monitor, dive) = setup(&[RuleKind::DepthLimit]);
        drop_table(&dir, "safety_rules");

        let report = monitor.append_depth_sample(dive.id, 40.0, at(10)).unwrap();

        assert_eq!(report, IngestReport::default());
        assert_eq!(storage.load_samples(dive.id).unwrap().len(), 1);
        assert!(storage.list_alerts(Some(dive.id), false).unwrap().is_empty());
    }

    #[test]
    fn cached_rules_serve_until_ttl() {
        let (_dir, storage, monitor, dive) = setup(&[]);

        // Rules are read on first use and cached for 30 s.
        monitor.append_depth_sample(dive.id, 40.0, at(0)).unwrap();
        storage
            .create_rule(&sample_rule(RuleKind::DepthLimit, json!({})))
            .unwrap();
        let report = monitor.append_depth_sample(dive.id, 40.0, at(10)).unwrap();
        assert!(report.alerts.is_empty());

        let fresh = DiveMonitor::new(storage, TimeZone::UTC, Duration::ZERO, AlertSink::new());
        let report = fresh.append_depth_sample(dive.id, 40.0, at(20)).unwrap();
        assert_eq!(report.alerts.len(), 1);
    }

    #[test]
    fn subscribers_hear_raised_alerts() {
        let (_dir, storage) = test_storage();
        storage
            .create_rule(&sample_rule(RuleKind::DepthLimit, json!({})))
            .unwrap();
        let dive = sample_dive(DiveState::InProgress);
        storage.create_dive(&dive).unwrap();

        let (tx, rx) = mpsc::channel();
        let monitor = DiveMonitor::new(
            storage,
            TimeZone::UTC,
            Duration::from_secs(30),
            AlertSink::new().with_subscriber(ChannelSubscriber::new(tx)),
        );
        let report = monitor.append_depth_sample(dive.id, 45.0, at(0)).unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.alert, report.alerts[0]);
        assert_eq!(event.supervisor.as_deref(), Some("sup-anna"));
        assert_eq!(event.alert.priority, Priority::High);
    }
}
