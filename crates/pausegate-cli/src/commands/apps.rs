/// Monitored app management command handlers
use anyhow::{bail, Result};
use pausegate_storage::{Database, MonitoredPackage};
use std::path::PathBuf;
use tabled::{Table, Tabled};

use super::helpers::{format_interval, truncate_str};

#[derive(Tabled)]
struct AppRow {
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Periodic")]
    interval: String,
    #[tabled(rename = "Added")]
    added: String,
}

impl From<MonitoredPackage> for AppRow {
    fn from(app: MonitoredPackage) -> Self {
        Self {
            name: app
                .display_name
                .as_deref()
                .map_or_else(|| String::from("-"), |n| truncate_str(n, 24)),
            enabled: if app.enabled { "yes" } else { "no" }.to_string(),
            interval: format_interval(app.interval_seconds),
            added: app.added_at.format("%Y-%m-%d").to_string(),
            package: app.package,
        }
    }
}

pub fn handle_apps_list(db_path: Option<PathBuf>) -> Result<()> {
    let db = Database::new(db_path)?;
    let apps = db.list_monitored_packages()?;

    if apps.is_empty() {
        println!("No monitored apps. Add one with: pausegate apps add <package>");
        return Ok(());
    }

    let rows: Vec<AppRow> = apps.into_iter().map(AppRow::from).collect();
    println!("{}", Table::new(rows));
    Ok(())
}

pub fn handle_apps_add(
    db_path: Option<PathBuf>,
    package: &str,
    name: Option<String>,
    interval: u32,
) -> Result<()> {
    let package = package.trim();
    if package.is_empty() {
        bail!("Package identifier must not be empty");
    }

    let db = Database::new(db_path)?;
    let mut app = MonitoredPackage::new(package.to_string()).with_interval(interval);
    if let Some(name) = name {
        app = app.with_display_name(name);
    }
    db.upsert_monitored_package(&app)?;

    println!(
        "Monitoring {package} (periodic pause: {})",
        format_interval(interval)
    );
    Ok(())
}

pub fn handle_apps_remove(db_path: Option<PathBuf>, package: &str) -> Result<()> {
    let db = Database::new(db_path)?;
    if db.remove_monitored_package(package)? {
        println!("Stopped monitoring {package}");
    } else {
        println!("{package} is not monitored");
    }
    Ok(())
}

pub fn handle_apps_enable(db_path: Option<PathBuf>, package: &str, enabled: bool) -> Result<()> {
    let db = Database::new(db_path)?;
    if !db.set_package_enabled(package, enabled)? {
        bail!("{package} is not monitored; add it first");
    }
    let state = if enabled { "enabled" } else { "disabled" };
    println!("Pauses {state} for {package}");
    Ok(())
}

pub fn handle_apps_interval(db_path: Option<PathBuf>, package: &str, seconds: u32) -> Result<()> {
    let db = Database::new(db_path)?;
    if !db.set_package_interval(package, seconds)? {
        bail!("{package} is not monitored; add it first");
    }
    println!(
        "Periodic pause for {package}: {}",
        format_interval(seconds)
    );
    Ok(())
}
