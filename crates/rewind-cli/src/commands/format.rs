//! Formatting utilities for table output and age display

use chrono::{DateTime, Utc};

use rewind_common::time::format_timestamp;

/// Format a timestamp as a human-readable age (e.g., "2d", "5h", "30m", "15s")
pub fn format_age(timestamp: &DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(*timestamp);

    let total_secs = duration.num_seconds();
    if total_secs < 0 {
        return "0s".to_string();
    }

    let days = duration.num_days();
    if days > 0 {
        return format!("{}d", days);
    }

    let hours = duration.num_hours();
    if hours > 0 {
        return format!("{}h", hours);
    }

    let minutes = duration.num_minutes();
    if minutes > 0 {
        return format!("{}m", minutes);
    }

    format!("{}s", total_secs)
}

/// Timestamp cell, `-` when absent
pub fn timestamp_cell(ts: Option<&DateTime<Utc>>) -> String {
    ts.map(format_timestamp).unwrap_or_else(|| "-".to_string())
}

/// Render rows as column-aligned lines, headers first
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut lines = vec![render_row(headers, &widths)];
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        lines.push(render_row(&cells, &widths));
    }
    lines
}

fn render_row(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let w = widths.get(i).copied().unwrap_or(0);
            format!("{:<width$}", cell, width = w)
        })
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// Print rows as a column-aligned table with headers
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    for line in render_table(headers, rows) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(&(Utc::now() - Duration::seconds(45))), "45s");
        assert_eq!(format_age(&(Utc::now() - Duration::minutes(12))), "12m");
        assert_eq!(format_age(&(Utc::now() - Duration::hours(3))), "3h");
        assert_eq!(format_age(&(Utc::now() - Duration::days(7))), "7d");
    }

    #[test]
    fn test_format_age_future_timestamp() {
        let ts = Utc::now() + Duration::hours(1);
        assert_eq!(format_age(&ts), "0s");
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let lines = render_table(
            &["NAME", "STATE"],
            &[
                vec!["b1".to_string(), "Succeeded".to_string()],
                vec!["backup-long".to_string(), "-".to_string()],
            ],
        );
        assert_eq!(lines[0], "NAME         STATE");
        assert_eq!(lines[1], "b1           Succeeded");
        assert_eq!(lines[2], "backup-long  -");
    }

    #[test]
    fn test_timestamp_cell() {
        assert_eq!(timestamp_cell(None), "-");
    }
}
