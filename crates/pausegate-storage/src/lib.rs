pub mod db;
pub mod migrations;
pub mod models;

pub use db::Database;
pub use models::{MonitoredPackage, PackageTiming, PendingPause, RewardDay};
