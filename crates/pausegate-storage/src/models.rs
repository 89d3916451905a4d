use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Application the user opted into interventions for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredPackage {
    pub package: String,
    pub display_name: Option<String>,
    pub enabled: bool,
    /// Periodic re-intervention cadence; 0 disables periodic pauses
    pub interval_seconds: u32,
    pub added_at: DateTime<Utc>,
}

impl MonitoredPackage {
    #[must_use]
    pub fn new(package: String) -> Self {
        Self {
            package,
            display_name: None,
            enabled: true,
            interval_seconds: 0,
            added_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval_seconds: u32) -> Self {
        self.interval_seconds = interval_seconds;
        self
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Last enter/exit timestamps (epoch milliseconds, 0 = never)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageTiming {
    pub last_enter_ms: i64,
    pub last_exit_ms: i64,
}

impl PackageTiming {
    #[must_use]
    pub const fn never_entered(&self) -> bool {
        self.last_enter_ms == 0
    }
}

/// A pause session that was requested but has not reported an outcome yet.
/// Left behind when the process dies while the pause screen is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPause {
    pub session_id: Uuid,
    pub package: String,
    pub periodic: bool,
}

/// Cancelled launches for one package on one UTC day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDay {
    pub day: NaiveDate,
    pub package: String,
    pub count: u32,
}
