use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use crate::models::MonitoredPackage;

use super::helpers::{parse_datetime, to_u32};
use super::Database;

impl Database {
    /// Insert or replace a monitored package
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn upsert_monitored_package(&self, package: &MonitoredPackage) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO monitored_packages (package, display_name, enabled, interval_seconds, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(package) DO UPDATE SET
                display_name = excluded.display_name,
                enabled = excluded.enabled,
                interval_seconds = excluded.interval_seconds",
            params![
                package.package,
                package.display_name,
                i32::from(package.enabled),
                package.interval_seconds,
                package.added_at.to_rfc3339(),
            ],
        )?;
        log::debug!(
            "Saved monitored package {} (enabled: {}, interval: {}s)",
            package.package,
            package.enabled,
            package.interval_seconds
        );
        Ok(())
    }

    /// Remove a package from monitoring. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn remove_monitored_package(&self, package: &str) -> Result<bool> {
        let deleted = self.conn()?.execute(
            "DELETE FROM monitored_packages WHERE package = ?1",
            params![package],
        )?;
        Ok(deleted > 0)
    }

    /// Toggle monitoring without forgetting the package. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn set_package_enabled(&self, package: &str, enabled: bool) -> Result<bool> {
        let updated = self.conn()?.execute(
            "UPDATE monitored_packages SET enabled = ?2 WHERE package = ?1",
            params![package, i32::from(enabled)],
        )?;
        Ok(updated > 0)
    }

    /// Change the periodic interval. Returns whether the package existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn set_package_interval(&self, package: &str, interval_seconds: u32) -> Result<bool> {
        let updated = self.conn()?.execute(
            "UPDATE monitored_packages SET interval_seconds = ?2 WHERE package = ?1",
            params![package, interval_seconds],
        )?;
        Ok(updated > 0)
    }

    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_monitored_package(&self, package: &str) -> Result<Option<MonitoredPackage>> {
        let found = self
            .conn()?
            .query_row(
                "SELECT package, display_name, enabled, interval_seconds, added_at
                 FROM monitored_packages WHERE package = ?1",
                params![package],
                Self::row_to_monitored_package,
            )
            .optional()?;
        Ok(found)
    }

    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn list_monitored_packages(&self) -> Result<Vec<MonitoredPackage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT package, display_name, enabled, interval_seconds, added_at
             FROM monitored_packages ORDER BY package",
        )?;
        let packages = stmt
            .query_map([], Self::row_to_monitored_package)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(packages)
    }

    fn row_to_monitored_package(row: &rusqlite::Row) -> rusqlite::Result<MonitoredPackage> {
        Ok(MonitoredPackage {
            package: row.get(0)?,
            display_name: row.get(1)?,
            enabled: row.get::<_, i32>(2)? != 0,
            interval_seconds: to_u32(row.get(3)?),
            added_at: parse_datetime(&row.get::<_, String>(4)?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_keeps_original_added_at() {
        let db = Database::open_in_memory().unwrap();
        let first = MonitoredPackage::new(String::from("com.example.feed"));
        db.upsert_monitored_package(&first).unwrap();

        let mut updated = MonitoredPackage::new(String::from("com.example.feed")).with_interval(300);
        updated.added_at = first.added_at + chrono::Duration::days(1);
        db.upsert_monitored_package(&updated).unwrap();

        let stored = db.get_monitored_package("com.example.feed").unwrap().unwrap();
        assert_eq!(stored.interval_seconds, 300);
        assert_eq!(stored.added_at.timestamp(), first.added_at.timestamp());
    }

    #[test]
    fn test_enable_and_interval_updates() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_monitored_package(
            &MonitoredPackage::new(String::from("com.example.feed")).with_display_name("Feed"),
        )
        .unwrap();

        assert!(db.set_package_enabled("com.example.feed", false).unwrap());
        assert!(db.set_package_interval("com.example.feed", 60).unwrap());
        assert!(!db.set_package_interval("com.example.missing", 60).unwrap());

        let stored = db.get_monitored_package("com.example.feed").unwrap().unwrap();
        assert!(!stored.enabled);
        assert_eq!(stored.interval_seconds, 60);
        assert_eq!(stored.display_name.as_deref(), Some("Feed"));
    }

    #[test]
    fn test_remove_monitored_package() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_monitored_package(&MonitoredPackage::new(String::from("a.b")))
            .unwrap();
        db.upsert_monitored_package(&MonitoredPackage::new(String::from("c.d")))
            .unwrap();

        assert!(db.remove_monitored_package("a.b").unwrap());
        assert!(!db.remove_monitored_package("a.b").unwrap());

        let remaining: Vec<String> = db
            .list_monitored_packages()
            .unwrap()
            .into_iter()
            .map(|p| p.package)
            .collect();
        assert_eq!(remaining, vec![String::from("c.d")]);
    }
}
