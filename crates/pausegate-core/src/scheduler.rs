//! Periodic re-intervention timers.
//!
//! Each arm hands out a fresh generation. Firings carry the generation they
//! were armed with, so anything delivered after a cancel or re-arm is
//! recognised as stale and dropped.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Identity of one armed timer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TimerKey {
    pub package: String,
    pub generation: u64,
}

/// Delivers recurring firings for a key until stopped
pub trait TimerDriver: Send + Sync {
    fn start(&self, key: TimerKey, period: Duration);
    fn stop(&self, key: &TimerKey);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArmedTimer {
    pub package: String,
    pub generation: u64,
    pub interval_secs: u32,
    pub armed_at_ms: i64,
}

pub struct PeriodicScheduler {
    driver: Arc<dyn TimerDriver>,
    armed: HashMap<String, ArmedTimer>,
    next_generation: u64,
}

impl PeriodicScheduler {
    #[must_use]
    pub fn new(driver: Arc<dyn TimerDriver>) -> Self {
        Self {
            driver,
            armed: HashMap::new(),
            next_generation: 1,
        }
    }

    /// Arm (or re-arm) the recurring timer for `package`.
    /// An interval of 0 disarms instead and returns `None`.
    pub fn arm(&mut self, package: &str, interval_secs: u32, now_ms: i64) -> Option<TimerKey> {
        self.cancel(package);
        if interval_secs == 0 {
            return None;
        }

        let key = TimerKey {
            package: package.to_string(),
            generation: self.next_generation,
        };
        self.next_generation += 1;

        self.armed.insert(
            package.to_string(),
            ArmedTimer {
                package: package.to_string(),
                generation: key.generation,
                interval_secs,
                armed_at_ms: now_ms,
            },
        );
        self.driver
            .start(key.clone(), Duration::from_secs(u64::from(interval_secs)));
        log::info!("Armed periodic timer for {package} every {interval_secs}s");
        Some(key)
    }

    /// Stop the timer for `package`. Returns whether one was armed.
    pub fn cancel(&mut self, package: &str) -> bool {
        let Some(timer) = self.armed.remove(package) else {
            return false;
        };
        self.driver.stop(&TimerKey {
            package: timer.package,
            generation: timer.generation,
        });
        log::debug!("Cancelled periodic timer for {package}");
        true
    }

    pub fn cancel_all(&mut self) {
        let packages: Vec<String> = self.armed.keys().cloned().collect();
        for package in packages {
            self.cancel(&package);
        }
    }

    #[must_use]
    pub fn is_armed(&self, package: &str) -> bool {
        self.armed.contains_key(package)
    }

    /// True only for the generation currently armed for the key's package
    #[must_use]
    pub fn is_current(&self, key: &TimerKey) -> bool {
        self.armed
            .get(&key.package)
            .is_some_and(|t| t.generation == key.generation)
    }

    #[must_use]
    pub fn armed_timers(&self) -> Vec<ArmedTimer> {
        let mut timers: Vec<ArmedTimer> = self.armed.values().cloned().collect();
        timers.sort_by(|a, b| a.package.cmp(&b.package));
        timers
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
