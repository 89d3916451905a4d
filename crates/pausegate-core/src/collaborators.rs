//! Seams between the engine and the host: persistence, configuration
//! lookups, the reward counter, app launching, usage stats and the pause
//! surface. `pausegate_storage::Database` implements the durable ones.

use anyhow::Result;
use chrono::NaiveDate;
use pausegate_storage::{Database, PackageTiming, PendingPause};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::session::{PauseRequest, UsageSnapshot};

/// Durable engine state. Every write must be durable before it returns.
pub trait StateStore: Send + Sync {
    fn timing(&self, package: &str) -> Result<PackageTiming>;
    fn set_enter_time(&self, package: &str, timestamp_ms: i64) -> Result<()>;
    fn set_exit_time(&self, package: &str, timestamp_ms: i64) -> Result<()>;
    fn set_force_flag(&self, package: &str, value: bool) -> Result<()>;
    /// Read-then-clear; true if the flag was set
    fn take_force_flag(&self, package: &str) -> Result<bool>;
    fn active_timer_package(&self) -> Result<Option<String>>;
    fn set_active_timer_package(&self, package: Option<&str>) -> Result<()>;
    fn pending_pause(&self) -> Result<Option<PendingPause>>;
    fn set_pending_pause(&self, pending: Option<&PendingPause>) -> Result<()>;
}

/// Read-only view of the user's monitored-package configuration
pub trait PackageCatalog: Send + Sync {
    fn is_monitored(&self, package: &str) -> bool;
    /// Periodic interval in seconds, 0 when disabled or unknown
    fn interval_secs(&self, package: &str) -> u32;
}

/// Counter of pauses the user accepted by cancelling
pub trait RewardLedger: Send + Sync {
    fn increment(&self, package: &str, day: NaiveDate) -> Result<()>;
    fn count_for(&self, package: &str, day: NaiveDate) -> Result<u32>;
}

pub trait AppLauncher: Send + Sync {
    /// Bring `package` to the foreground; false if it could not be launched
    fn launch(&self, package: &str) -> bool;
}

/// Optional, permission-gated usage statistics
pub trait UsageStatsSource: Send + Sync {
    fn has_permission(&self) -> bool;
    fn usage_today(&self, package: &str) -> Result<Option<UsageSnapshot>>;
}

/// Where pause sessions are displayed
pub trait PauseSurface: Send + Sync {
    fn show(&self, request: &PauseRequest);
    /// Withdraw a session superseded by a newer request
    fn dismiss(&self, session_id: Uuid);
}

/// Everything the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn StateStore>,
    pub catalog: Arc<dyn PackageCatalog>,
    pub ledger: Arc<dyn RewardLedger>,
    pub launcher: Arc<dyn AppLauncher>,
    pub surface: Arc<dyn PauseSurface>,
    pub usage: Option<Arc<dyn UsageStatsSource>>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Wire a database as store, catalog and ledger
    #[must_use]
    pub fn with_database(
        database: Arc<Database>,
        launcher: Arc<dyn AppLauncher>,
        surface: Arc<dyn PauseSurface>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store: database.clone(),
            catalog: database.clone(),
            ledger: database,
            launcher,
            surface,
            usage: None,
            clock,
        }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: Arc<dyn UsageStatsSource>) -> Self {
        self.usage = Some(usage);
        self
    }
}

impl StateStore for Database {
    fn timing(&self, package: &str) -> Result<PackageTiming> {
        self.get_timing(package)
    }

    fn set_enter_time(&self, package: &str, timestamp_ms: i64) -> Result<()> {
        Database::set_enter_time(self, package, timestamp_ms)
    }

    fn set_exit_time(&self, package: &str, timestamp_ms: i64) -> Result<()> {
        Database::set_exit_time(self, package, timestamp_ms)
    }

    fn set_force_flag(&self, package: &str, value: bool) -> Result<()> {
        self.set_force_pause(package, value)
    }

    fn take_force_flag(&self, package: &str) -> Result<bool> {
        self.take_force_pause(package)
    }

    fn active_timer_package(&self) -> Result<Option<String>> {
        self.get_active_timer_package()
    }

    fn set_active_timer_package(&self, package: Option<&str>) -> Result<()> {
        Database::set_active_timer_package(self, package)
    }

    fn pending_pause(&self) -> Result<Option<PendingPause>> {
        self.get_pending_pause()
    }

    fn set_pending_pause(&self, pending: Option<&PendingPause>) -> Result<()> {
        Database::set_pending_pause(self, pending)
    }
}

impl PackageCatalog for Database {
    fn is_monitored(&self, package: &str) -> bool {
        match self.get_monitored_package(package) {
            Ok(found) => found.is_some_and(|p| p.enabled),
            Err(e) => {
                log::error!("Catalog lookup for {package} failed: {e}");
                false
            }
        }
    }

    fn interval_secs(&self, package: &str) -> u32 {
        match self.get_monitored_package(package) {
            Ok(Some(p)) if p.enabled => p.interval_seconds,
            Ok(_) => 0,
            Err(e) => {
                log::error!("Interval lookup for {package} failed: {e}");
                0
            }
        }
    }
}

impl RewardLedger for Database {
    fn increment(&self, package: &str, day: NaiveDate) -> Result<()> {
        self.record_reward(package, day)
    }

    fn count_for(&self, package: &str, day: NaiveDate) -> Result<u32> {
        self.rewards_for_package_on(package, day)
    }
}
