// src/utils/console.rs

//! Console output helpers for run summaries.
//!
//! Diagnostics go through the `log` facade; these helpers print the
//! operator-facing report to stdout regardless of the log filter.

/// Width of header rules.
const RULE_WIDTH: usize = 60;

/// Print a header block.
pub fn header(title: &str) {
    let border = "═".repeat(RULE_WIDTH);
    println!("{border}");
    println!("  {title}");
    println!("{border}");
}

/// Print a separator line.
pub fn separator() {
    println!("{}", "─".repeat(RULE_WIDTH));
}

/// Print an indented line.
pub fn sub_item(message: &str) {
    println!("    {message}");
}

/// Print a key/value summary section.
pub fn summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("[SUMMARY] {title}");
    for line in format_items(items) {
        println!("{line}");
    }
}

fn format_items(items: &[(&str, String)]) -> Vec<String> {
    let width = items.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    items
        .iter()
        .map(|(key, value)| format!("    {key:<width$} : {value}"))
        .collect()
}
