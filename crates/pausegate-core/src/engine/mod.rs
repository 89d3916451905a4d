//! The intervention engine: turns foreground changes, pause outcomes and
//! timer firings into pause decisions.
//!
//! The engine is synchronous and owns all mutable per-package state. Callers
//! must serialise access to it; [`crate::runtime`] does so with a single
//! task.

use pausegate_storage::PendingPause;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::classifier::{Transition, TransitionClassifier};
use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::exemption::{ExemptionKind, ExemptionPolicy};
use crate::scheduler::{ArmedTimer, PeriodicScheduler, TimerDriver, TimerKey};
use crate::session::{PauseOutcome, PauseRequest, PauseSession, UsageSnapshot};
use crate::signal::ForegroundSignal;


/// A durable write is tried this many times before the operation fails
pub const WRITE_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackagePhase {
    #[default]
    Idle,
    InitialPauseShown,
    PeriodicPauseShown,
    Resumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    TransientOverlay,
    SamePackage,
    StaleTimer,
}

/// Result of handling a foreground change or timer firing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Ignored(IgnoreReason),
    /// Entry absorbed by an exemption window
    Suppressed { package: String, by: ExemptionKind },
    /// Switched into a package nobody asked us to watch
    Unmonitored { package: String },
    /// Went to the launcher; `left` is the package that lost the foreground
    Home { left: Option<String> },
    InitialPause {
        package: String,
        session_id: Uuid,
        forced: bool,
    },
    /// Re-entered within tolerance; no pause
    Resume { package: String, periodic_armed: bool },
    PeriodicPause { package: String, session_id: Uuid },
    /// Timer fired while the package was not foreground or a pause was up
    PeriodicSkipped { package: String },
}

/// Result of applying a pause outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeEffect {
    Cancelled,
    Continued { launched: bool, periodic_armed: bool },
    Abandoned,
    /// No pause was showing for that package
    Stale,
}

/// The pause currently on screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShowingPause {
    pub session_id: Uuid,
    pub package: String,
    pub periodic: bool,
    pub shown_at_ms: i64,
}

impl From<&PauseSession> for ShowingPause {
    fn from(session: &PauseSession) -> Self {
        let request = session.request();
        Self {
            session_id: request.session_id,
            package: request.package.clone(),
            periodic: request.periodic,
            shown_at_ms: request.requested_at_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub foreground: Option<String>,
    pub showing: Option<ShowingPause>,
    pub armed_timers: Vec<ArmedTimer>,
    pub phases: BTreeMap<String, PackagePhase>,
    pub held_exemptions: usize,
}

/// What startup recovery did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Package whose unresolved pause was converted to an abandon
    pub abandoned: Option<String>,
    /// Package whose periodic timer was re-armed
    pub restored_timer: Option<String>,
    /// Package whose stale active-timer marker was dropped
    pub cleared_timer: Option<String>,
}

/// Run a store operation, retrying once before surfacing the failure
fn persist<T>(
    operation: &'static str,
    mut write: impl FnMut() -> anyhow::Result<T>,
) -> Result<T, EngineError> {
    let mut attempt = 1;
    loop {
        match write() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < WRITE_ATTEMPTS => {
                log::warn!("Failed to {operation} (attempt {attempt}): {e}");
                attempt += 1;
            }
            Err(e) => {
                log::error!("Failed to {operation} after {attempt} attempts: {e}");
                return Err(EngineError::persistence(operation, e));
            }
        }
    }
}

pub struct InterventionEngine {
    config: EngineConfig,
    classifier: TransitionClassifier,
    exemptions: ExemptionPolicy,
    scheduler: PeriodicScheduler,
    deps: Collaborators,
    foreground: Option<String>,
    showing: Option<PauseSession>,
    phases: HashMap<String, PackagePhase>,
}

impl InterventionEngine {
    /// # Errors
    ///
    /// Returns an error if the classifier tables cannot be built from `config`
    pub fn new(
        config: EngineConfig,
        deps: Collaborators,
        timers: Arc<dyn TimerDriver>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            classifier: TransitionClassifier::new(&config)?,
            exemptions: ExemptionPolicy::new(&config),
            scheduler: PeriodicScheduler::new(timers),
            config,
            deps,
            foreground: None,
            showing: None,
            phases: HashMap::new(),
        })
    }

    /// Handle one foreground-change signal from the host.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if state could not be read or
    /// written; the signal's remaining effects are not applied
    pub fn on_foreground_change(
        &mut self,
        signal: &ForegroundSignal,
    ) -> Result<Decision, EngineError> {
        let now = self.deps.clock.now_ms();
        let transition = self.classifier.classify(signal, self.foreground.as_deref());
        self.detect_abandonment(&transition, now)?;

        match transition {
            Transition::TransientOverlay => Ok(Decision::Ignored(IgnoreReason::TransientOverlay)),
            Transition::SamePackage(package) => self.on_same_package(&package, now),
            Transition::HomeOrSystem(launcher) => {
                log::debug!("Launcher {launcher} in front, leaving {:?}", self.foreground);
                if let Some(previous) = self.foreground.clone() {
                    self.handle_exit(&previous, now)?;
                }
                Ok(Decision::Home {
                    left: self.foreground.take(),
                })
            }
            Transition::RealSwitch(package) => {
                // Foreground moves only once each step is stored, so a retried
                // signal is still seen as a switch
                if let Some(previous) = self.foreground.clone() {
                    self.handle_exit(&previous, now)?;
                    self.foreground = None;
                }
                let decision = self.on_enter(package.clone(), now)?;
                self.foreground = Some(package);
                Ok(decision)
            }
        }
    }

    /// Apply the terminal outcome the pause surface reported for `package`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CountdownRunning`] for a Continue before the
    /// countdown ends, [`EngineError::SessionAlreadyResolved`] if a different
    /// outcome was already recorded, and [`EngineError::Persistence`] if the
    /// outcome could not be stored. After a persistence failure the pause
    /// stays registered so the same outcome can be re-sent.
    pub fn on_pause_outcome(
        &mut self,
        package: &str,
        periodic: bool,
        outcome: PauseOutcome,
    ) -> Result<OutcomeEffect, EngineError> {
        let now = self.deps.clock.now_ms();
        let Some(session) = self
            .showing
            .as_mut()
            .filter(|s| s.request().package == package)
        else {
            log::warn!("Ignoring {outcome} for {package}: no pause showing for it");
            return Ok(OutcomeEffect::Stale);
        };
        let request = session.request();
        if request.periodic != periodic {
            log::warn!(
                "Outcome for {package} says periodic={periodic}, session {} says {}",
                request.session_id,
                request.periodic
            );
        }
        let periodic = request.periodic;

        // The reward goes with the first recording of Cancel, so a re-sent
        // Cancel after a later failure does not count twice
        let first = session.outcome().is_none();
        session.check(outcome, now)?;
        if first && outcome == PauseOutcome::Cancel {
            let day = self.deps.clock.today();
            persist("record reward", || self.deps.ledger.increment(package, day))?;
        }
        session.choose(outcome, now)?;
        log::info!("Pause for {package} resolved: {outcome}");

        match outcome {
            PauseOutcome::Cancel => {
                persist("set force flag", || self.deps.store.set_force_flag(package, true))?;
                self.close_pause()?;
                self.cancel_periodic(package)?;
                self.phases.insert(package.to_string(), PackagePhase::Idle);
                Ok(OutcomeEffect::Cancelled)
            }
            PauseOutcome::Abandon => {
                self.abandon(package)?;
                Ok(OutcomeEffect::Abandoned)
            }
            PauseOutcome::Continue => {
                self.exemptions.arm(ExemptionKind::Continue, package, now);
                persist("set exit time", || self.deps.store.set_exit_time(package, now))?;
                self.close_pause()?;
                self.foreground = Some(package.to_string());
                self.phases.insert(package.to_string(), PackagePhase::Resumed);

                // A fresh session restarts the interval; a periodic one keeps its cadence
                if !periodic {
                    self.cancel_periodic(package)?;
                }
                let periodic_armed = self.ensure_periodic(package, now)?;

                let launched = self.deps.launcher.launch(package);
                if !launched {
                    log::warn!("Could not launch {package} after continue");
                }
                Ok(OutcomeEffect::Continued {
                    launched,
                    periodic_armed,
                })
            }
        }
    }

    /// Handle a periodic timer firing. Stale keys are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the pause could not be recorded
    pub fn on_timer_fired(&mut self, key: &TimerKey) -> Result<Decision, EngineError> {
        if !self.scheduler.is_current(key) {
            log::warn!(
                "Dropping stale timer firing for {} (generation {})",
                key.package,
                key.generation
            );
            return Ok(Decision::Ignored(IgnoreReason::StaleTimer));
        }

        let package = key.package.clone();
        if self.foreground.as_deref() != Some(package.as_str()) {
            log::debug!("Periodic timer for {package} skipped: not in foreground");
            return Ok(Decision::PeriodicSkipped { package });
        }
        if self.showing.is_some() {
            log::debug!("Periodic timer for {package} skipped: pause already showing");
            return Ok(Decision::PeriodicSkipped { package });
        }

        let now = self.deps.clock.now_ms();
        self.request_pause(&package, true, false, now)
    }

    /// Reconcile persisted markers after a process start. Safe to run twice.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the markers could not be read
    /// or cleared
    pub fn recover(&mut self) -> Result<RecoveryReport, EngineError> {
        let now = self.deps.clock.now_ms();
        let mut report = RecoveryReport::default();

        if let Some(pending) = persist("read pending pause", || self.deps.store.pending_pause())? {
            let live = self
                .showing
                .as_ref()
                .is_some_and(|s| s.request().session_id == pending.session_id);
            if !live {
                log::warn!(
                    "Pause {} for {} was never resolved, treating it as abandoned",
                    pending.session_id,
                    pending.package
                );
                persist("set force flag", || {
                    self.deps.store.set_force_flag(&pending.package, true)
                })?;
                persist("clear pending pause", || self.deps.store.set_pending_pause(None))?;
                report.abandoned = Some(pending.package);
            }
        }

        let Some(package) = persist("read active timer", || self.deps.store.active_timer_package())?
        else {
            return Ok(report);
        };

        let interval = self.deps.catalog.interval_secs(&package);
        let timing = persist("read timing", || self.deps.store.timing(&package))?;
        let within_tolerance = timing.last_exit_ms > 0
            && now - timing.last_exit_ms <= self.config.tolerance_ms_i64();

        if interval > 0 && within_tolerance && report.abandoned.as_deref() != Some(package.as_str()) {
            if !self.scheduler.is_armed(&package) {
                self.scheduler.arm(&package, interval, now);
            }
            if self.foreground.is_none() {
                self.foreground = Some(package.clone());
            }
            self.phases.insert(package.clone(), PackagePhase::Resumed);
            log::info!("Restored periodic timer for {package}");
            report.restored_timer = Some(package);
        } else {
            self.scheduler.cancel(&package);
            persist("clear active timer", || {
                self.deps.store.set_active_timer_package(None)
            })?;
            log::info!("Dropped stale periodic timer marker for {package}");
            report.cleared_timer = Some(package);
        }
        Ok(report)
    }

    /// Stop every timer. Persisted markers stay so the next start can recover.
    pub fn shutdown(&mut self) {
        self.scheduler.cancel_all();
        log::info!("Engine stopped");
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            foreground: self.foreground.clone(),
            showing: self.showing.as_ref().map(ShowingPause::from),
            armed_timers: self.scheduler.armed_timers(),
            phases: self
                .phases
                .iter()
                .map(|(package, phase)| (package.clone(), *phase))
                .collect(),
            held_exemptions: self.exemptions.len(),
        }
    }

    #[must_use]
    pub fn phase(&self, package: &str) -> PackagePhase {
        self.phases.get(package).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn is_pause_showing(&self) -> bool {
        self.showing.is_some()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn on_same_package(&mut self, package: &str, now: i64) -> Result<Decision, EngineError> {
        let showing_for_it = self
            .showing
            .as_ref()
            .is_some_and(|s| s.request().package == package);
        if !showing_for_it && self.deps.catalog.is_monitored(package) {
            let forced = persist("take force flag", || self.deps.store.take_force_flag(package))?;
            if forced {
                log::info!("{package} still in front with a pending force flag");
                return self.forced_pause(package, now);
            }
        }
        Ok(Decision::Ignored(IgnoreReason::SamePackage))
    }

    fn on_enter(&mut self, package: String, now: i64) -> Result<Decision, EngineError> {
        if !self.deps.catalog.is_monitored(&package) {
            log::debug!("Entered unmonitored {package}");
            return Ok(Decision::Unmonitored { package });
        }

        if persist("take force flag", || self.deps.store.take_force_flag(&package))? {
            log::info!("Force flag consumed for {package}");
            return self.forced_pause(&package, now);
        }

        for kind in [ExemptionKind::Continue, ExemptionKind::Debounce] {
            if self.exemptions.is_suppressed(kind, &package, now) {
                log::debug!("Entry into {package} suppressed by {kind:?} window");
                persist("set enter time", || self.deps.store.set_enter_time(&package, now))?;
                return Ok(Decision::Suppressed { package, by: kind });
            }
        }

        let timing = persist("read timing", || self.deps.store.timing(&package))?;
        let elapsed = now - timing.last_exit_ms;
        let initial = timing.never_entered() || elapsed > self.config.tolerance_ms_i64();
        persist("set enter time", || self.deps.store.set_enter_time(&package, now))?;

        if initial {
            log::info!("Entered {package}, pausing (away {elapsed}ms)");
            return self.request_pause(&package, false, false, now);
        }

        log::info!("Resumed {package} after {elapsed}ms");
        self.phases.insert(package.clone(), PackagePhase::Resumed);
        let periodic_armed = self.ensure_periodic(&package, now)?;
        Ok(Decision::Resume {
            package,
            periodic_armed,
        })
    }

    /// Pause for a consumed force flag. The flag is put back if the pause
    /// could not be recorded.
    fn forced_pause(&mut self, package: &str, now: i64) -> Result<Decision, EngineError> {
        let result = persist("set enter time", || self.deps.store.set_enter_time(package, now))
            .and_then(|()| self.request_pause(package, false, true, now));
        if result.is_err()
            && persist("restore force flag", || {
                self.deps.store.set_force_flag(package, true)
            })
            .is_err()
        {
            log::error!("Force flag for {package} lost");
        }
        result
    }

    fn handle_exit(&mut self, package: &str, now: i64) -> Result<(), EngineError> {
        if !self.deps.catalog.is_monitored(package) {
            return Ok(());
        }
        self.exemptions.arm(ExemptionKind::Debounce, package, now);
        persist("set exit time", || self.deps.store.set_exit_time(package, now))?;
        self.cancel_periodic(package)?;
        self.phases.insert(package.to_string(), PackagePhase::Idle);
        log::info!("Left {package}");
        Ok(())
    }

    /// Leaving for a real app or the launcher while a pause is up abandons it
    fn detect_abandonment(&mut self, transition: &Transition, now: i64) -> Result<(), EngineError> {
        let Some(session) = self.showing.as_mut() else {
            return Ok(());
        };
        let walked_away = match transition {
            Transition::HomeOrSystem(_) => true,
            Transition::RealSwitch(package) => *package != session.request().package,
            Transition::TransientOverlay | Transition::SamePackage(_) => false,
        };
        if !walked_away {
            return Ok(());
        }

        let request = session.request().clone();
        if session.tear_down().is_none() {
            log::debug!("Pause {} already had an outcome", request.session_id);
        }
        log::info!(
            "User left the pause for {} after {}ms, abandoning it",
            request.package,
            now - request.requested_at_ms
        );
        self.deps.surface.dismiss(request.session_id);
        self.abandon(&request.package)
    }

    fn abandon(&mut self, package: &str) -> Result<(), EngineError> {
        persist("set force flag", || self.deps.store.set_force_flag(package, true))?;
        self.close_pause()?;
        self.cancel_periodic(package)?;
        self.phases.insert(package.to_string(), PackagePhase::Idle);
        Ok(())
    }

    fn close_pause(&mut self) -> Result<(), EngineError> {
        persist("clear pending pause", || self.deps.store.set_pending_pause(None))?;
        self.showing = None;
        Ok(())
    }

    fn request_pause(
        &mut self,
        package: &str,
        periodic: bool,
        forced: bool,
        now: i64,
    ) -> Result<Decision, EngineError> {
        if let Some(previous) = self.showing.take() {
            let previous = previous.request();
            log::info!(
                "Pause {} for {} superseded",
                previous.session_id,
                previous.package
            );
            self.deps.surface.dismiss(previous.session_id);
        }

        let session_id = Uuid::new_v4();
        let pending = PendingPause {
            session_id,
            package: package.to_string(),
            periodic,
        };
        persist("record pending pause", || {
            self.deps.store.set_pending_pause(Some(&pending))
        })?;

        let request = PauseRequest {
            session_id,
            package: package.to_string(),
            periodic,
            duration_secs: self.config.pause_duration_secs,
            requested_at_ms: now,
            usage: self.usage_for(package),
        };
        self.deps.surface.show(&request);
        self.showing = Some(PauseSession::new(request));
        let phase = if periodic {
            PackagePhase::PeriodicPauseShown
        } else {
            PackagePhase::InitialPauseShown
        };
        self.phases.insert(package.to_string(), phase);

        log::info!("Showing pause {session_id} for {package} (periodic: {periodic})");
        Ok(if periodic {
            Decision::PeriodicPause {
                package: package.to_string(),
                session_id,
            }
        } else {
            Decision::InitialPause {
                package: package.to_string(),
                session_id,
                forced,
            }
        })
    }

    /// Today's usage, minus launches the user already cancelled. Never fails.
    fn usage_for(&self, package: &str) -> Option<UsageSnapshot> {
        let source = self.deps.usage.as_ref()?;
        if !source.has_permission() {
            log::debug!("No usage access, pausing {package} without stats");
            return None;
        }
        let raw = match source.usage_today(package) {
            Ok(snapshot) => snapshot?,
            Err(e) => {
                log::warn!("Usage stats for {package} unavailable: {e}");
                return None;
            }
        };
        let blocked = self
            .deps
            .ledger
            .count_for(package, self.deps.clock.today())
            .unwrap_or_else(|e| {
                log::warn!("Reward count for {package} unavailable: {e}");
                0
            });
        Some(raw.adjusted_for_blocked(blocked))
    }

    /// Arm the periodic timer for `package` unless it already runs.
    /// Any other package's timer is stopped first.
    fn ensure_periodic(&mut self, package: &str, now: i64) -> Result<bool, EngineError> {
        if self.scheduler.is_armed(package) {
            return Ok(true);
        }
        for other in self.scheduler.armed_timers() {
            self.cancel_periodic(&other.package)?;
        }

        let interval = self.deps.catalog.interval_secs(package);
        if self.scheduler.arm(package, interval, now).is_none() {
            return Ok(false);
        }
        persist("set active timer", || {
            self.deps.store.set_active_timer_package(Some(package))
        })?;
        Ok(true)
    }

    fn cancel_periodic(&mut self, package: &str) -> Result<bool, EngineError> {
        let was_armed = self.scheduler.cancel(package);
        let marker = persist("read active timer", || self.deps.store.active_timer_package())?;
        if marker.as_deref() == Some(package) {
            persist("clear active timer", || {
                self.deps.store.set_active_timer_package(None)
            })?;
        }
        Ok(was_armed)
    }
}
