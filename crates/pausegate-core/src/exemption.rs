//! Short-lived, in-memory suppression windows keyed by package.
//!
//! Losing these on process death is fine: they only bridge sub-second
//! signal noise around launches and exits.

use serde::Serialize;
use std::collections::HashMap;

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExemptionKind {
    /// Armed when the user picks Continue; absorbs the launch re-entry
    Continue,
    /// Armed on every recorded exit; absorbs rapid internal re-entries
    Debounce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExemptionEntry {
    pub timestamp_ms: i64,
    pub duration_ms: u64,
}

impl ExemptionEntry {
    #[must_use]
    pub fn is_active(&self, now_ms: i64) -> bool {
        let elapsed = now_ms - self.timestamp_ms;
        elapsed >= 0 && u64::try_from(elapsed).is_ok_and(|e| e < self.duration_ms)
    }
}

#[derive(Debug)]
pub struct ExemptionPolicy {
    continue_window_ms: u64,
    debounce_window_ms: u64,
    continue_entries: HashMap<String, ExemptionEntry>,
    debounce_entries: HashMap<String, ExemptionEntry>,
}

impl ExemptionPolicy {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            continue_window_ms: config.continue_exemption_ms,
            debounce_window_ms: config.debounce_ms,
            continue_entries: HashMap::new(),
            debounce_entries: HashMap::new(),
        }
    }

    pub fn arm(&mut self, kind: ExemptionKind, package: &str, now_ms: i64) {
        let duration_ms = match kind {
            ExemptionKind::Continue => self.continue_window_ms,
            ExemptionKind::Debounce => self.debounce_window_ms,
        };
        self.entries_mut(kind).insert(
            package.to_string(),
            ExemptionEntry {
                timestamp_ms: now_ms,
                duration_ms,
            },
        );
    }

    /// Whether `package` is currently suppressed. Expired entries are evicted here.
    pub fn is_suppressed(&mut self, kind: ExemptionKind, package: &str, now_ms: i64) -> bool {
        let entries = self.entries_mut(kind);
        match entries.get(package).map(|entry| entry.is_active(now_ms)) {
            Some(true) => true,
            Some(false) => {
                entries.remove(package);
                false
            }
            None => false,
        }
    }

    /// Number of entries still held (expired ones included until looked up)
    #[must_use]
    pub fn len(&self) -> usize {
        self.continue_entries.len() + self.debounce_entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.continue_entries.clear();
        self.debounce_entries.clear();
    }

    fn entries_mut(&mut self, kind: ExemptionKind) -> &mut HashMap<String, ExemptionEntry> {
        match kind {
            ExemptionKind::Continue => &mut self.continue_entries,
            ExemptionKind::Debounce => &mut self.debounce_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ExemptionPolicy {
        ExemptionPolicy::new(&EngineConfig::default())
    }

    #[test]
    fn test_debounce_window_is_half_open() {
        let mut p = policy();
        p.arm(ExemptionKind::Debounce, "a.b", 1_000);
        assert!(p.is_suppressed(ExemptionKind::Debounce, "a.b", 1_000));
        assert!(p.is_suppressed(ExemptionKind::Debounce, "a.b", 1_499));
        assert!(!p.is_suppressed(ExemptionKind::Debounce, "a.b", 1_500));
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut p = policy();
        p.arm(ExemptionKind::Continue, "a.b", 0);
        assert!(p.is_suppressed(ExemptionKind::Continue, "a.b", 900));
        assert!(!p.is_suppressed(ExemptionKind::Debounce, "a.b", 900));
        assert!(!p.is_suppressed(ExemptionKind::Continue, "c.d", 900));
    }

    #[test]
    fn test_expired_entries_are_evicted_on_lookup() {
        let mut p = policy();
        p.arm(ExemptionKind::Continue, "a.b", 0);
        p.arm(ExemptionKind::Debounce, "a.b", 0);
        assert_eq!(p.len(), 2);

        assert!(!p.is_suppressed(ExemptionKind::Continue, "a.b", 5_000));
        assert_eq!(p.len(), 1);
        assert!(!p.is_suppressed(ExemptionKind::Debounce, "a.b", 5_000));
        assert!(p.is_empty());
    }

    #[test]
    fn test_rearming_refreshes_window() {
        let mut p = policy();
        p.arm(ExemptionKind::Debounce, "a.b", 0);
        p.arm(ExemptionKind::Debounce, "a.b", 400);
        assert!(p.is_suppressed(ExemptionKind::Debounce, "a.b", 800));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn test_clock_going_backwards_is_not_suppressed() {
        let mut p = policy();
        p.arm(ExemptionKind::Debounce, "a.b", 10_000);
        assert!(!p.is_suppressed(ExemptionKind::Debounce, "a.b", 9_000));
    }
}
