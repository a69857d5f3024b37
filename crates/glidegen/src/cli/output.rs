//! Output formatting utilities for CLI commands

use chrono::{DateTime, Local, Utc};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};

/// Format a timestamp as a relative time for recent entries
///
/// Examples:
/// - "2 seconds ago"
/// - "3 hours ago"
/// - "2024-12-15 14:30" (if older than a week)
pub fn format_time(at: DateTime<Utc>) -> String {
    format_time_since(at, Utc::now())
}

fn format_time_since(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds();
    if secs < 0 {
        return "just now".to_string();
    }

    if secs < 60 {
        format!("{} second{} ago", secs, if secs == 1 { "" } else { "s" })
    } else if secs < 3600 {
        let mins = secs / 60;
        format!("{} minute{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if secs < 86400 {
        let hours = secs / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if secs < 604800 {
        let days = secs / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
    }
}

/// Placeholder for absent values in tables
pub fn or_dash(value: Option<&str>) -> String {
    match value {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => "-".to_string(),
    }
}

/// Print a table with headers and rows
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }

    println!("{}", table);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_time_recent() {
        let now = Utc::now();
        assert_eq!(format_time_since(now - Duration::seconds(1), now), "1 second ago");
        assert_eq!(format_time_since(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(format_time_since(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(format_time_since(now + Duration::seconds(5), now), "just now");
    }

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash(Some("Task")), "Task");
        assert_eq!(or_dash(Some("  ")), "-");
        assert_eq!(or_dash(None), "-");
    }
}
