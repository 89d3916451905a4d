pub mod apps;
pub mod bridge;
pub mod config;
pub mod helpers;
pub mod rewards;
pub mod status;
