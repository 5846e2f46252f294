//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a day count for display
pub fn format_days(days: f64) -> String {
    format!("{:.0} days", days)
}

/// Color a longevity category based on its band
pub fn color_category(category: &str) -> String {
    match category {
        "Excellent" | "Good" => category.green().to_string(),
        "Average" => category.yellow().to_string(),
        "Below Average" | "Poor" => category.red().to_string(),
        _ => category.to_string(),
    }
}

/// Color a success probability label
pub fn color_probability(probability: &str) -> String {
    match probability {
        "Very High" | "High" => probability.green().to_string(),
        "Medium" => probability.yellow().to_string(),
        "Low" | "Very Low" => probability.red().to_string(),
        _ => probability.to_string(),
    }
}

/// Format timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    // Try to parse and format nicely, otherwise return as-is
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M").to_string()
    } else {
        ts.to_string()
    }
}
