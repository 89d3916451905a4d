//! One intervention: countdown, usage display, and the single terminal
//! choice reported back for it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseOutcome {
    /// User gave up on the app; counts as a reward
    Cancel,
    /// User chose to go on into the app
    Continue,
    /// Surface torn down without an explicit choice
    Abandon,
}

impl std::fmt::Display for PauseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancel => write!(f, "cancel"),
            Self::Continue => write!(f, "continue"),
            Self::Abandon => write!(f, "abandon"),
        }
    }
}

/// Today's usage of a package, for display on the pause screen only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub launches_today: u32,
    pub total_time_today_ms: u64,
    pub average_session_ms: u64,
}

impl UsageSnapshot {
    /// Remove launches that were cancelled at the pause screen, since the
    /// platform counts those as launches too.
    #[must_use]
    pub fn adjusted_for_blocked(self, blocked_today: u32) -> Self {
        let launches = self.launches_today.saturating_sub(blocked_today);
        let average = if launches > 0 {
            self.total_time_today_ms / u64::from(launches)
        } else {
            0
        };
        Self {
            launches_today: launches,
            total_time_today_ms: self.total_time_today_ms,
            average_session_ms: average,
        }
    }
}

/// What the engine asks the pause surface to show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseRequest {
    pub session_id: Uuid,
    pub package: String,
    pub periodic: bool,
    pub duration_secs: u32,
    pub requested_at_ms: i64,
    pub usage: Option<UsageSnapshot>,
}

/// State of a single pause while it is on screen
#[derive(Debug, Clone)]
pub struct PauseSession {
    request: PauseRequest,
    outcome: Option<PauseOutcome>,
}

impl PauseSession {
    #[must_use]
    pub fn new(request: PauseRequest) -> Self {
        Self {
            request,
            outcome: None,
        }
    }

    #[must_use]
    pub fn request(&self) -> &PauseRequest {
        &self.request
    }

    #[must_use]
    pub fn outcome(&self) -> Option<PauseOutcome> {
        self.outcome
    }

    /// Whole seconds left on the countdown, rounded up
    #[must_use]
    pub fn remaining_secs(&self, now_ms: i64) -> u32 {
        let total_ms = i64::from(self.request.duration_secs) * 1_000;
        let elapsed = (now_ms - self.request.requested_at_ms).max(0);
        let left_ms = (total_ms - elapsed).max(0);
        u32::try_from((left_ms + 999) / 1_000).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn is_countdown_finished(&self, now_ms: i64) -> bool {
        self.remaining_secs(now_ms) == 0
    }

    /// Whether `outcome` may be recorded at `now_ms`. Repeating the recorded
    /// outcome is allowed so a partly applied choice can be re-delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if a different outcome was already recorded, or if
    /// Continue is chosen while the countdown is still running
    pub fn check(&self, outcome: PauseOutcome, now_ms: i64) -> Result<(), EngineError> {
        match self.outcome {
            Some(recorded) if recorded == outcome => Ok(()),
            Some(_) => Err(EngineError::SessionAlreadyResolved {
                session_id: self.request.session_id,
            }),
            None if outcome == PauseOutcome::Continue => match self.remaining_secs(now_ms) {
                0 => Ok(()),
                remaining_secs => Err(EngineError::CountdownRunning { remaining_secs }),
            },
            None => Ok(()),
        }
    }

    /// Record the user's choice. Continue is only accepted once the countdown ran out.
    ///
    /// # Errors
    ///
    /// See [`PauseSession::check`]
    pub fn choose(&mut self, outcome: PauseOutcome, now_ms: i64) -> Result<PauseOutcome, EngineError> {
        self.check(outcome, now_ms)?;
        self.outcome = Some(outcome);
        Ok(outcome)
    }

    /// Teardown without a choice. Yields `Abandon` only if nothing was recorded yet.
    pub fn tear_down(&mut self) -> Option<PauseOutcome> {
        if self.outcome.is_some() {
            return None;
        }
        self.outcome = Some(PauseOutcome::Abandon);
        self.outcome
    }
}
