/// Reward history command handler
use anyhow::Result;
use chrono::{Days, Utc};
use pausegate_storage::Database;
use std::path::PathBuf;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct RewardRow {
    #[tabled(rename = "Day")]
    day: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Pauses accepted")]
    count: u32,
}

pub fn handle_rewards(db_path: Option<PathBuf>, days: u32) -> Result<()> {
    let db = Database::new(db_path)?;
    let today = Utc::now().date_naive();
    let since = today
        .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
        .unwrap_or(today);

    let history = db.reward_history(since)?;
    println!("Total pauses accepted: {}", db.total_rewards()?);

    if history.is_empty() {
        println!("None in the last {days} day(s).");
        return Ok(());
    }

    let rows: Vec<RewardRow> = history
        .into_iter()
        .map(|r| RewardRow {
            day: r.day.format("%Y-%m-%d").to_string(),
            package: r.package,
            count: r.count,
        })
        .collect();
    println!("\n{}", Table::new(rows));
    Ok(())
}
