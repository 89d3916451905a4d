/// Persisted state inspection and reset
use anyhow::Result;
use pausegate_storage::Database;
use std::path::PathBuf;
use tabled::{Table, Tabled};

use super::helpers::{format_interval, format_timestamp_ms};

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Monitored")]
    monitored: String,
    #[tabled(rename = "Periodic")]
    interval: String,
    #[tabled(rename = "Last enter")]
    last_enter: String,
    #[tabled(rename = "Last exit")]
    last_exit: String,
    #[tabled(rename = "Force pause")]
    force_pause: String,
}

pub fn handle_status(db_path: Option<PathBuf>) -> Result<()> {
    let db = Database::new(db_path)?;
    let apps = db.list_monitored_packages()?;
    let timings = db.list_timings()?;
    let forced = db.list_force_pauses()?;

    let mut packages: Vec<String> = apps.iter().map(|a| a.package.clone()).collect();
    for (package, _) in &timings {
        if !packages.contains(package) {
            packages.push(package.clone());
        }
    }
    packages.sort();

    println!("Pausegate Status");
    println!("================");

    match db.get_active_timer_package()? {
        Some(package) => println!("Periodic timer: {package}"),
        None => println!("Periodic timer: none"),
    }
    match db.get_pending_pause()? {
        Some(pending) => println!(
            "Unresolved pause: {} for {}{}",
            pending.session_id,
            pending.package,
            if pending.periodic { " (periodic)" } else { "" }
        ),
        None => println!("Unresolved pause: none"),
    }

    if packages.is_empty() {
        println!("\nNo apps monitored or seen yet.");
        return Ok(());
    }

    let rows: Vec<StateRow> = packages
        .into_iter()
        .map(|package| {
            let app = apps.iter().find(|a| a.package == package);
            let timing = timings
                .iter()
                .find(|(p, _)| *p == package)
                .map(|(_, t)| *t)
                .unwrap_or_default();
            StateRow {
                monitored: match app {
                    Some(a) if a.enabled => "yes",
                    Some(_) => "disabled",
                    None => "no",
                }
                .to_string(),
                interval: format_interval(app.map_or(0, |a| a.interval_seconds)),
                last_enter: format_timestamp_ms(timing.last_enter_ms),
                last_exit: format_timestamp_ms(timing.last_exit_ms),
                force_pause: if forced.contains(&package) { "pending" } else { "-" }.to_string(),
                package,
            }
        })
        .collect();

    println!("\n{}", Table::new(rows));
    Ok(())
}

pub fn handle_reset(db_path: Option<PathBuf>, package: &str) -> Result<()> {
    let db = Database::new(db_path)?;
    db.reset_package_state(package)?;
    println!("Cleared timing and force-pause state for {package}");
    Ok(())
}
