//! Async runtime for the engine.
//!
//! One tokio task owns the [`InterventionEngine`] and drains a command
//! channel, so host signals, pause outcomes and timer firings never race.
//! Timers are tokio tasks that post back into the same channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::engine::{Decision, EngineStatus, InterventionEngine, OutcomeEffect, RecoveryReport};
use crate::error::EngineError;
use crate::scheduler::{TimerDriver, TimerKey};
use crate::session::PauseOutcome;
use crate::signal::ForegroundSignal;

pub enum EngineCommand {
    Foreground {
        signal: ForegroundSignal,
        reply: oneshot::Sender<Result<Decision, EngineError>>,
    },
    Outcome {
        package: String,
        periodic: bool,
        outcome: PauseOutcome,
        reply: oneshot::Sender<Result<OutcomeEffect, EngineError>>,
    },
    TimerFired(TimerKey),
    Status(oneshot::Sender<EngineStatus>),
    Shutdown,
}

/// Runs each periodic timer as a tokio task posting into the engine channel.
///
/// Holds only a weak sender, so armed timers never keep the engine alive.
pub struct TokioTimerDriver {
    commands: mpsc::WeakUnboundedSender<EngineCommand>,
    tasks: Mutex<HashMap<TimerKey, JoinHandle<()>>>,
}

impl TokioTimerDriver {
    #[must_use]
    pub fn new(commands: mpsc::WeakUnboundedSender<EngineCommand>) -> Self {
        Self {
            commands,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<TimerKey, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimerDriver for TokioTimerDriver {
    fn start(&self, key: TimerKey, period: Duration) {
        let commands = self.commands.clone();
        let fired = key.clone();
        let task = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let Some(sender) = commands.upgrade() else {
                    break;
                };
                if sender.send(EngineCommand::TimerFired(fired.clone())).is_err() {
                    break;
                }
            }
        });
        let mut tasks = self.tasks();
        // Tasks end on their own once the engine is gone
        tasks.retain(|_, running| !running.is_finished());
        if let Some(previous) = tasks.insert(key, task) {
            previous.abort();
        }
    }

    fn stop(&self, key: &TimerKey) {
        if let Some(task) = self.tasks().remove(key) {
            task.abort();
        }
    }
}

impl Drop for TokioTimerDriver {
    fn drop(&mut self) {
        for (_, task) in self.tasks().drain() {
            task.abort();
        }
    }
}

/// Cloneable sender side of a running engine
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    /// # Errors
    ///
    /// Returns the engine's error for this signal, or
    /// [`EngineError::RuntimeStopped`] if the engine task is gone
    pub async fn foreground_changed(
        &self,
        signal: ForegroundSignal,
    ) -> Result<Decision, EngineError> {
        self.request(|reply| EngineCommand::Foreground { signal, reply })
            .await?
    }

    /// # Errors
    ///
    /// Returns the engine's error for this outcome, or
    /// [`EngineError::RuntimeStopped`] if the engine task is gone
    pub async fn pause_outcome(
        &self,
        package: &str,
        periodic: bool,
        outcome: PauseOutcome,
    ) -> Result<OutcomeEffect, EngineError> {
        let package = package.to_string();
        self.request(|reply| EngineCommand::Outcome {
            package,
            periodic,
            outcome,
            reply,
        })
        .await?
    }

    /// # Errors
    ///
    /// Returns [`EngineError::RuntimeStopped`] if the engine task is gone
    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(EngineCommand::Status).await
    }

    /// Ask the engine task to stop its timers and exit
    pub fn shutdown(&self) {
        if self.commands.send(EngineCommand::Shutdown).is_err() {
            log::debug!("Engine already stopped");
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| EngineError::RuntimeStopped)?;
        response.await.map_err(|_| EngineError::RuntimeStopped)
    }
}

pub struct SpawnedEngine {
    pub handle: EngineHandle,
    pub recovery: RecoveryReport,
    pub task: JoinHandle<()>,
}

/// Build the engine, run startup recovery and spawn its task.
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns an error if the engine cannot be built or recovery fails
pub fn spawn_engine(config: EngineConfig, deps: Collaborators) -> Result<SpawnedEngine, EngineError> {
    let (commands, receiver) = mpsc::unbounded_channel();
    let timers = Arc::new(TokioTimerDriver::new(commands.downgrade()));
    let mut engine = InterventionEngine::new(config, deps, timers)?;

    let recovery = engine.recover()?;
    log::info!("Recovery finished: {recovery:?}");

    let task = tokio::spawn(run(engine, receiver));
    Ok(SpawnedEngine {
        handle: EngineHandle { commands },
        recovery,
        task,
    })
}

async fn run(mut engine: InterventionEngine, mut commands: mpsc::UnboundedReceiver<EngineCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            EngineCommand::Foreground { signal, reply } => {
                let result = engine.on_foreground_change(&signal);
                if let Err(e) = &result {
                    log::error!("Foreground change {:?} failed: {e}", signal.package);
                }
                // The caller may have stopped waiting
                let _ = reply.send(result);
            }
            EngineCommand::Outcome {
                package,
                periodic,
                outcome,
                reply,
            } => {
                let result = engine.on_pause_outcome(&package, periodic, outcome);
                if let Err(e) = &result {
                    log::error!("Recording {outcome} for {package} failed: {e}");
                }
                let _ = reply.send(result);
            }
            EngineCommand::TimerFired(key) => match engine.on_timer_fired(&key) {
                Ok(decision) => log::debug!("Timer for {} handled: {decision:?}", key.package),
                Err(e) => log::error!("Periodic pause for {} failed: {e}", key.package),
            },
            EngineCommand::Status(reply) => {
                let _ = reply.send(engine.status());
            }
            EngineCommand::Shutdown => break,
        }
    }
    engine.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{no_countdown_config, Harness};

    const FEED: &str = "com.example.feed";

    fn spawn(h: &Harness) -> SpawnedEngine {
        spawn_engine(no_countdown_config(), h.collaborators()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_pause_fires_on_interval() {
        let h = Harness::new();
        h.monitor(FEED, 300);
        let engine = spawn(&h);
        let handle = engine.handle.clone();

        handle
            .foreground_changed(ForegroundSignal::new(FEED))
            .await
            .unwrap();
        let effect = handle
            .pause_outcome(FEED, false, PauseOutcome::Continue)
            .await
            .unwrap();
        assert_eq!(
            effect,
            OutcomeEffect::Continued {
                launched: true,
                periodic_armed: true
            }
        );

        tokio::time::sleep(Duration::from_secs(299)).await;
        handle.status().await.unwrap();
        assert_eq!(h.surface.shown().len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let status = handle.status().await.unwrap();
        assert_eq!(h.surface.shown().len(), 2);
        assert!(h.surface.last().unwrap().periodic);
        assert!(status.showing.is_some_and(|s| s.periodic));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_stops_periodic_firings() {
        let h = Harness::new();
        h.monitor(FEED, 60);
        let engine = spawn(&h);
        let handle = engine.handle.clone();

        handle
            .foreground_changed(ForegroundSignal::new(FEED))
            .await
            .unwrap();
        handle
            .pause_outcome(FEED, false, PauseOutcome::Continue)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle
            .foreground_changed(ForegroundSignal::new("com.android.launcher3"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(600)).await;
        let status = handle.status().await.unwrap();
        assert!(status.armed_timers.is_empty());
        assert_eq!(h.surface.shown().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_timer_tasks_are_pruned() {
        let (sender, _receiver) = mpsc::unbounded_channel();
        let driver = TokioTimerDriver::new(sender.downgrade());
        drop(sender);

        driver.start(
            TimerKey {
                package: FEED.to_string(),
                generation: 1,
            },
            Duration::from_secs(5),
        );
        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        let next = TimerKey {
            package: FEED.to_string(),
            generation: 2,
        };
        driver.start(next.clone(), Duration::from_secs(5));
        assert_eq!(driver.tasks().keys().collect::<Vec<_>>(), vec![&next]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_after_shutdown_fail() {
        let h = Harness::new();
        let engine = spawn(&h);
        let handle = engine.handle.clone();

        handle.shutdown();
        engine.task.await.unwrap();

        let err = handle
            .foreground_changed(ForegroundSignal::new(FEED))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RuntimeStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_timer_does_not_keep_engine_alive() {
        let h = Harness::new();
        h.monitor(FEED, 30);
        let SpawnedEngine { handle, task, .. } = spawn(&h);

        handle
            .foreground_changed(ForegroundSignal::new(FEED))
            .await
            .unwrap();
        handle
            .pause_outcome(FEED, false, PauseOutcome::Continue)
            .await
            .unwrap();
        drop(handle);

        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_recovers_unresolved_pause() {
        let h = Harness::new();
        h.monitor(FEED, 0);
        h.db
            .set_pending_pause(Some(&pausegate_storage::PendingPause {
                session_id: uuid::Uuid::new_v4(),
                package: FEED.to_string(),
                periodic: false,
            }))
            .unwrap();

        let engine = spawn(&h);
        assert_eq!(engine.recovery.abandoned.as_deref(), Some(FEED));
        assert!(h.db.is_force_pause(FEED).unwrap());
    }
}
