use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::models::{PackageTiming, PendingPause};

use super::Database;

const ACTIVE_TIMER_KEY: &str = "active_timer_package";
const PENDING_PAUSE_KEY: &str = "pending_pause";

impl Database {
    // ==================== Enter / Exit Times ====================

    /// Get the recorded timestamps for a package (zeros if never seen)
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_timing(&self, package: &str) -> Result<PackageTiming> {
        let conn = self.conn()?;
        let timing = conn
            .query_row(
                "SELECT last_enter_ms, last_exit_ms FROM package_timing WHERE package = ?1",
                params![package],
                |row| {
                    Ok(PackageTiming {
                        last_enter_ms: row.get(0)?,
                        last_exit_ms: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(timing.unwrap_or_default())
    }

    /// Record the time a package was last entered
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn set_enter_time(&self, package: &str, timestamp_ms: i64) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO package_timing (package, last_enter_ms) VALUES (?1, ?2)
                 ON CONFLICT(package) DO UPDATE SET last_enter_ms = excluded.last_enter_ms",
                params![package, timestamp_ms],
            )
            .with_context(|| format!("Failed to write enter time for {package}"))?;
        Ok(())
    }

    /// Record the time a package was last left
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn set_exit_time(&self, package: &str, timestamp_ms: i64) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO package_timing (package, last_exit_ms) VALUES (?1, ?2)
                 ON CONFLICT(package) DO UPDATE SET last_exit_ms = excluded.last_exit_ms",
                params![package, timestamp_ms],
            )
            .with_context(|| format!("Failed to write exit time for {package}"))?;
        Ok(())
    }

    /// All packages with recorded timestamps, ordered by name
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn list_timings(&self) -> Result<Vec<(String, PackageTiming)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT package, last_enter_ms, last_exit_ms FROM package_timing ORDER BY package",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    PackageTiming {
                        last_enter_ms: row.get(1)?,
                        last_exit_ms: row.get(2)?,
                    },
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ==================== Force-Pause Flags ====================

    /// Set or clear the one-shot force-pause flag
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn set_force_pause(&self, package: &str, value: bool) -> Result<()> {
        let conn = self.conn()?;
        let written = if value {
            conn.execute(
                "INSERT OR REPLACE INTO force_pause (package, set_at) VALUES (?1, ?2)",
                params![package, Utc::now().to_rfc3339()],
            )
        } else {
            conn.execute("DELETE FROM force_pause WHERE package = ?1", params![package])
        };
        written.with_context(|| format!("Failed to write force-pause flag for {package}"))?;
        Ok(())
    }

    /// Check the flag without consuming it
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn is_force_pause(&self, package: &str) -> Result<bool> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM force_pause WHERE package = ?1",
            params![package],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Read-then-clear the flag in one statement. Returns whether it was set.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn take_force_pause(&self, package: &str) -> Result<bool> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM force_pause WHERE package = ?1", params![package])
            .with_context(|| format!("Failed to consume force-pause flag for {package}"))?;
        Ok(deleted > 0)
    }

    /// Packages with an unconsumed force-pause flag
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn list_force_pauses(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT package FROM force_pause ORDER BY package")?;
        let packages = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(packages)
    }

    // ==================== Engine Markers ====================

    /// Package whose periodic timer was armed when the process last ran
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_active_timer_package(&self) -> Result<Option<String>> {
        self.get_marker(ACTIVE_TIMER_KEY)
    }

    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn set_active_timer_package(&self, package: Option<&str>) -> Result<()> {
        self.set_marker(ACTIVE_TIMER_KEY, package)
    }

    /// Pause session that was showing without a reported outcome
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the stored value is corrupt
    pub fn get_pending_pause(&self) -> Result<Option<PendingPause>> {
        self.get_marker(PENDING_PAUSE_KEY)?
            .map(|raw| {
                serde_json::from_str(&raw).context("Corrupt pending pause marker in engine_state")
            })
            .transpose()
    }

    /// # Errors
    ///
    /// Returns an error if serialization or the database write fails
    pub fn set_pending_pause(&self, pending: Option<&PendingPause>) -> Result<()> {
        let raw = pending.map(serde_json::to_string).transpose()?;
        self.set_marker(PENDING_PAUSE_KEY, raw.as_deref())
    }

    fn get_marker(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()?
            .query_row(
                "SELECT value FROM engine_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_marker(&self, key: &str, value: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        let written = match value {
            Some(v) => conn.execute(
                "INSERT OR REPLACE INTO engine_state (key, value) VALUES (?1, ?2)",
                params![key, v],
            ),
            None => conn.execute("DELETE FROM engine_state WHERE key = ?1", params![key]),
        };
        written.with_context(|| format!("Failed to write engine marker {key}"))?;
        Ok(())
    }

    /// Forget timestamps and any pending force-pause for a package
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn reset_package_state(&self, package: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM package_timing WHERE package = ?1",
            params![package],
        )?;
        conn.execute("DELETE FROM force_pause WHERE package = ?1", params![package])?;
        log::info!("Reset persisted state for {package}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_unknown_package_has_zero_timing() {
        let db = Database::open_in_memory().unwrap();
        let timing = db.get_timing("com.example.video").unwrap();
        assert!(timing.never_entered());
        assert_eq!(timing.last_exit_ms, 0);
    }

    #[test]
    fn test_enter_and_exit_are_independent_columns() {
        let db = Database::open_in_memory().unwrap();
        db.set_exit_time("com.example.video", 3_000).unwrap();
        db.set_enter_time("com.example.video", 5_000).unwrap();

        let timing = db.get_timing("com.example.video").unwrap();
        assert_eq!(timing.last_enter_ms, 5_000);
        assert_eq!(timing.last_exit_ms, 3_000);
    }

    #[test]
    fn test_take_force_pause_consumes_once() {
        let db = Database::open_in_memory().unwrap();
        db.set_force_pause("com.example.video", true).unwrap();
        // Setting twice still leaves a single flag
        db.set_force_pause("com.example.video", true).unwrap();

        assert!(db.is_force_pause("com.example.video").unwrap());
        assert!(db.take_force_pause("com.example.video").unwrap());
        assert!(!db.take_force_pause("com.example.video").unwrap());
        assert!(db.list_force_pauses().unwrap().is_empty());
    }

    #[test]
    fn test_markers_round_trip_and_clear() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_active_timer_package().unwrap(), None);

        db.set_active_timer_package(Some("com.example.feed")).unwrap();
        assert_eq!(
            db.get_active_timer_package().unwrap().as_deref(),
            Some("com.example.feed")
        );
        db.set_active_timer_package(None).unwrap();
        assert_eq!(db.get_active_timer_package().unwrap(), None);

        let pending = PendingPause {
            session_id: Uuid::new_v4(),
            package: String::from("com.example.feed"),
            periodic: true,
        };
        db.set_pending_pause(Some(&pending)).unwrap();
        assert_eq!(db.get_pending_pause().unwrap(), Some(pending));
        db.set_pending_pause(None).unwrap();
        assert_eq!(db.get_pending_pause().unwrap(), None);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let db = Database::new(Some(path.clone())).unwrap();
            db.set_exit_time("com.example.video", 42).unwrap();
            db.set_force_pause("com.example.video", true).unwrap();
            db.set_active_timer_package(Some("com.example.video")).unwrap();
        }

        let db = Database::new(Some(path)).unwrap();
        assert_eq!(db.get_timing("com.example.video").unwrap().last_exit_ms, 42);
        assert!(db.is_force_pause("com.example.video").unwrap());
        assert_eq!(
            db.get_active_timer_package().unwrap().as_deref(),
            Some("com.example.video")
        );
    }

    #[test]
    fn test_reset_package_state() {
        let db = Database::open_in_memory().unwrap();
        db.set_enter_time("com.example.video", 10).unwrap();
        db.set_force_pause("com.example.video", true).unwrap();

        db.reset_package_state("com.example.video").unwrap();

        assert!(db.get_timing("com.example.video").unwrap().never_entered());
        assert!(!db.is_force_pause("com.example.video").unwrap());
    }
}
