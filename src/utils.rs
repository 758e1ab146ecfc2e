//! # Utility Functions and Helper Module
//!
//! Small helpers shared by the driver and the console report.
//!
//! ## Key Functionality Categories
//!
//! - **Formatting**: Human-readable display of durations, latencies, rates and memory
//! - **Display Helpers**: Fixed-width table rows and progress indicators
//!
//! ## Usage Examples
//!
//! ```rust
//! use http_server_bench::utils::*;
//! use std::time::Duration;
//!
//! assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
//! assert_eq!(format_latency_ms(0.25), "250.00μs");
//! assert_eq!(format_request_rate(12500.0), "12.50K req/s");
//! ```

use std::time::Duration;

/// Format a duration in a human-readable way
///
/// Selects the most appropriate unit based on magnitude:
///
/// - **Nanoseconds**: < 1,000 ns (e.g., "500ns")
/// - **Microseconds**: < 1,000,000 ns (e.g., "1.50μs")
/// - **Milliseconds**: < 1,000,000,000 ns (e.g., "25.75ms")
/// - **Seconds**: < 60 seconds (e.g., "5.25s")
/// - **Minutes and Hours**: For longer durations (e.g., "5m 30s", "2h 15m 30s")
///
/// ## Examples
///
/// ```rust
/// # use http_server_bench::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_nanos(750)), "750ns");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

/// Format a latency given in (fractional) milliseconds.
///
/// Negative and non-finite inputs render as `"0ns"`.
pub fn format_latency_ms(ms: f64) -> String {
    if !ms.is_finite() || ms <= 0.0 {
        return format_duration(Duration::ZERO);
    }
    format_duration(Duration::from_secs_f64(ms / 1000.0))
}

/// Format a request rate with K/M suffixes.
pub fn format_request_rate(rps: f64) -> String {
    if rps >= 1_000_000.0 {
        format!("{:.2}M req/s", rps / 1_000_000.0)
    } else if rps >= 1_000.0 {
        format!("{:.2}K req/s", rps / 1_000.0)
    } else {
        format!("{:.2} req/s", rps)
    }
}

/// Format a memory amount in megabytes, switching to GB above 1024 MB.
pub fn format_memory_mb(mb: f64) -> String {
    if mb >= 1024.0 {
        format!("{:.2} GB", mb / 1024.0)
    } else {
        format!("{:.1} MB", mb)
    }
}

/// Format one table row
///
/// Each column is padded to its width; missing widths default to 10.
///
/// ```rust
/// # use http_server_bench::utils::{format_table_row, format_table_separator};
/// let widths = [6, 4];
/// assert_eq!(format_table_separator(&widths), "+--------+------+");
/// assert_eq!(format_table_row(&["node", "12"], &widths), "| node   | 12   |");
/// ```
pub fn format_table_row(columns: &[&str], widths: &[usize]) -> String {
    let mut row = String::from("|");
    for (i, column) in columns.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(10);
        row.push_str(&format!(" {:width$} |", column, width = width));
    }
    row
}

/// Horizontal separator matching a set of column widths
pub fn format_table_separator(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for &width in widths {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }
    line
}

/// Create a progress bar-like indicator
///
/// - `█` (U+2588) for completed progress
/// - `░` (U+2591) for remaining progress
///
/// A zero total renders as complete; progress is capped at 100%.
///
/// ```rust
/// # use http_server_bench::utils::create_progress_indicator;
/// assert_eq!(create_progress_indicator(0, 100, 10), "░░░░░░░░░░");
/// assert_eq!(create_progress_indicator(50, 100, 10), "█████░░░░░");
/// assert_eq!(create_progress_indicator(100, 100, 10), "██████████");
/// ```
pub fn create_progress_indicator(current: usize, total: usize, width: usize) -> String {
    if total == 0 {
        return "█".repeat(width);
    }

    let progress = (current as f64 / total as f64).min(1.0);
    let filled = ((progress * width as f64) as usize).min(width);
    let empty = width - filled;

    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}
