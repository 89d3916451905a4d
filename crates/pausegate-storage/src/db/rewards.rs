use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::params;

use crate::models::RewardDay;

use super::helpers::{format_day, parse_day, to_u32};
use super::Database;

impl Database {
    /// Count one cancelled launch of `package` on `day`
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn record_reward(&self, package: &str, day: NaiveDate) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO reward_days (day, package, count) VALUES (?1, ?2, 1)
             ON CONFLICT(day, package) DO UPDATE SET count = count + 1",
            params![format_day(day), package],
        )?;
        log::debug!("Recorded reward for {package} on {day}");
        Ok(())
    }

    /// Total cancelled launches across all packages and days
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn total_rewards(&self) -> Result<u32> {
        let total: i64 = self.conn()?.query_row(
            "SELECT COALESCE(SUM(count), 0) FROM reward_days",
            [],
            |row| row.get(0),
        )?;
        Ok(to_u32(total))
    }

    /// Cancelled launches of one package on one day
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn rewards_for_package_on(&self, package: &str, day: NaiveDate) -> Result<u32> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COALESCE(SUM(count), 0) FROM reward_days WHERE package = ?1 AND day = ?2",
            params![package, format_day(day)],
            |row| row.get(0),
        )?;
        Ok(to_u32(count))
    }

    /// Per-day, per-package counts from `since` onwards, newest day first
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn reward_history(&self, since: NaiveDate) -> Result<Vec<RewardDay>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT day, package, count FROM reward_days
             WHERE day >= ?1
             ORDER BY day DESC, package ASC",
        )?;
        let days = stmt
            .query_map(params![format_day(since)], |row| {
                Ok(RewardDay {
                    day: parse_day(&row.get::<_, String>(0)?)?,
                    package: row.get(1)?,
                    count: to_u32(row.get(2)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(days)
    }
}
