use anyhow::Result;
use rusqlite::Connection;

/// Connection pragmas. Every write must be on disk when `execute` returns,
/// since the host process can be killed without warning.
///
/// # Errors
///
/// Returns an error if a pragma cannot be applied
pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    // In-memory databases report "memory" here, which is fine
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    log::debug!("journal_mode = {mode}");
    conn.pragma_update(None, "synchronous", "FULL")?;
    Ok(())
}

/// Initialize database schema
///
/// # Errors
///
/// Returns an error if database table creation or index creation fails
pub fn init_schema(conn: &Connection) -> Result<()> {
    // Monitored packages - owned by the configuration surface, read by the engine
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitored_packages (
            package TEXT PRIMARY KEY,
            display_name TEXT,
            enabled INTEGER NOT NULL DEFAULT 1,
            interval_seconds INTEGER NOT NULL DEFAULT 0,
            added_at TEXT NOT NULL
        )",
        [],
    )?;

    // Per-package enter/exit timestamps (epoch ms)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS package_timing (
            package TEXT PRIMARY KEY,
            last_enter_ms INTEGER NOT NULL DEFAULT 0,
            last_exit_ms INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // One-shot force-pause flags; a row exists only while the flag is set
    conn.execute(
        "CREATE TABLE IF NOT EXISTS force_pause (
            package TEXT PRIMARY KEY,
            set_at TEXT NOT NULL
        )",
        [],
    )?;

    // Singleton engine markers (active timer package, pending pause)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS engine_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // Cancelled launches per package per day
    conn.execute(
        "CREATE TABLE IF NOT EXISTS reward_days (
            day TEXT NOT NULL,
            package TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (day, package)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reward_days_package ON reward_days(package)",
        [],
    )?;

    Ok(())
}
