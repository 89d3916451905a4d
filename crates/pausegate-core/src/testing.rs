//! Recording fakes shared by the unit tests.

use anyhow::{bail, Result};
use pausegate_storage::{Database, MonitoredPackage, PackageTiming, PendingPause};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::clock::ManualClock;
use crate::config::EngineConfig;
use crate::collaborators::{
    AppLauncher, Collaborators, PauseSurface, StateStore, UsageStatsSource,
};
use crate::scheduler::{TimerDriver, TimerKey};
use crate::session::{PauseRequest, UsageSnapshot};

#[derive(Default)]
pub struct RecordingTimers {
    running: Mutex<Vec<(TimerKey, Duration)>>,
}

impl RecordingTimers {
    pub fn running(&self) -> Vec<(TimerKey, Duration)> {
        self.running.lock().unwrap().clone()
    }

    pub fn key_for(&self, package: &str) -> Option<TimerKey> {
        self.running()
            .into_iter()
            .map(|(key, _)| key)
            .find(|key| key.package == package)
    }
}

impl TimerDriver for RecordingTimers {
    fn start(&self, key: TimerKey, period: Duration) {
        self.running.lock().unwrap().push((key, period));
    }

    fn stop(&self, key: &TimerKey) {
        self.running.lock().unwrap().retain(|(k, _)| k != key);
    }
}

#[derive(Default)]
pub struct RecordingSurface {
    shown: Mutex<Vec<PauseRequest>>,
    dismissed: Mutex<Vec<Uuid>>,
}

impl RecordingSurface {
    pub fn shown(&self) -> Vec<PauseRequest> {
        self.shown.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<PauseRequest> {
        self.shown().last().cloned()
    }

    pub fn dismissed(&self) -> Vec<Uuid> {
        self.dismissed.lock().unwrap().clone()
    }
}

impl PauseSurface for RecordingSurface {
    fn show(&self, request: &PauseRequest) {
        self.shown.lock().unwrap().push(request.clone());
    }

    fn dismiss(&self, session_id: Uuid) {
        self.dismissed.lock().unwrap().push(session_id);
    }
}

pub struct RecordingLauncher {
    launched: Mutex<Vec<String>>,
    succeed: AtomicBool,
}

impl Default for RecordingLauncher {
    fn default() -> Self {
        Self {
            launched: Mutex::new(Vec::new()),
            succeed: AtomicBool::new(true),
        }
    }
}

impl RecordingLauncher {
    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }

    pub fn fail_launches(&self) {
        self.succeed.store(false, Ordering::SeqCst);
    }
}

impl AppLauncher for RecordingLauncher {
    fn launch(&self, package: &str) -> bool {
        self.launched.lock().unwrap().push(package.to_string());
        self.succeed.load(Ordering::SeqCst)
    }
}

pub struct FixedUsage {
    pub permitted: bool,
    pub snapshots: HashMap<String, UsageSnapshot>,
}

impl UsageStatsSource for FixedUsage {
    fn has_permission(&self) -> bool {
        self.permitted
    }

    fn usage_today(&self, package: &str) -> Result<Option<UsageSnapshot>> {
        if !self.permitted {
            bail!("usage access not granted");
        }
        Ok(self.snapshots.get(package).copied())
    }
}

/// Store wrapper whose writes can be made to fail, all at once or by
/// operation name (the `StateStore` method name, or `clear_pending_pause`)
pub struct FlakyStore {
    inner: Arc<Database>,
    failing_writes: AtomicBool,
    failing_ops: Mutex<HashSet<&'static str>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<Database>) -> Self {
        Self {
            inner,
            failing_writes: AtomicBool::new(false),
            failing_ops: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.failing_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_op(&self, op: &'static str, fail: bool) {
        let mut ops = self.failing_ops.lock().unwrap();
        if fail {
            ops.insert(op);
        } else {
            ops.remove(op);
        }
    }

    fn check(&self, op: &str) -> Result<()> {
        let failing = self.failing_writes.load(Ordering::SeqCst)
            || self.failing_ops.lock().unwrap().contains(op);
        if failing {
            bail!("disk full");
        }
        Ok(())
    }
}

impl StateStore for FlakyStore {
    fn timing(&self, package: &str) -> Result<PackageTiming> {
        self.inner.get_timing(package)
    }

    fn set_enter_time(&self, package: &str, timestamp_ms: i64) -> Result<()> {
        self.check("set_enter_time")?;
        self.inner.set_enter_time(package, timestamp_ms)
    }

    fn set_exit_time(&self, package: &str, timestamp_ms: i64) -> Result<()> {
        self.check("set_exit_time")?;
        self.inner.set_exit_time(package, timestamp_ms)
    }

    fn set_force_flag(&self, package: &str, value: bool) -> Result<()> {
        self.check("set_force_flag")?;
        self.inner.set_force_pause(package, value)
    }

    fn take_force_flag(&self, package: &str) -> Result<bool> {
        self.check("take_force_flag")?;
        self.inner.take_force_pause(package)
    }

    fn active_timer_package(&self) -> Result<Option<String>> {
        self.inner.get_active_timer_package()
    }

    fn set_active_timer_package(&self, package: Option<&str>) -> Result<()> {
        self.check("set_active_timer_package")?;
        self.inner.set_active_timer_package(package)
    }

    fn pending_pause(&self) -> Result<Option<PendingPause>> {
        self.inner.get_pending_pause()
    }

    fn set_pending_pause(&self, pending: Option<&PendingPause>) -> Result<()> {
        self.check(if pending.is_some() {
            "set_pending_pause"
        } else {
            "clear_pending_pause"
        })?;
        self.inner.set_pending_pause(pending)
    }
}

/// Scenario t=0, far from the epoch so that 0 keeps meaning "never"
pub const SCENARIO_START_MS: i64 = 1_700_000_000_000;

/// Defaults with a zero-length countdown, so Continue is accepted at once
pub fn no_countdown_config() -> EngineConfig {
    EngineConfig {
        pause_duration_secs: 0,
        ..EngineConfig::default()
    }
}

/// A wired set of fakes around one database
pub struct Harness {
    pub db: Arc<Database>,
    pub clock: ManualClock,
    pub timers: Arc<RecordingTimers>,
    pub surface: Arc<RecordingSurface>,
    pub launcher: Arc<RecordingLauncher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_database(Arc::new(Database::open_in_memory().unwrap()))
    }

    pub fn with_database(db: Arc<Database>) -> Self {
        Self {
            db,
            clock: ManualClock::new(SCENARIO_START_MS),
            timers: Arc::new(RecordingTimers::default()),
            surface: Arc::new(RecordingSurface::default()),
            launcher: Arc::new(RecordingLauncher::default()),
        }
    }

    pub fn monitor(&self, package: &str, interval_seconds: u32) {
        self.db
            .upsert_monitored_package(
                &MonitoredPackage::new(package.to_string()).with_interval(interval_seconds),
            )
            .unwrap();
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::with_database(
            self.db.clone(),
            self.launcher.clone(),
            self.surface.clone(),
            Arc::new(self.clock.clone()),
        )
    }

    /// Move the clock to `ms` milliseconds after the scenario start
    pub fn at_ms(&self, ms: i64) {
        self.clock.set(SCENARIO_START_MS + ms);
    }

    pub fn at(&self, seconds: i64) {
        self.at_ms(seconds * 1_000);
    }
}
