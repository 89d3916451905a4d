//! Helper utility functions for CLI commands

use chrono::{DateTime, Local, Utc};

/// Safely truncate a string to a maximum number of characters (not bytes).
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

/// Local time for an epoch-millisecond timestamp, `-` for never
pub fn format_timestamp_ms(timestamp_ms: i64) -> String {
    if timestamp_ms <= 0 {
        return String::from("-");
    }
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map_or_else(
        || String::from("?"),
        |t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

pub fn format_interval(seconds: u32) -> String {
    match seconds {
        0 => String::from("off"),
        s if s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}
