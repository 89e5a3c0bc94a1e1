use colored::*;
use datavet_core::{Issue, Report};

/// Prints the human-readable report summary.
pub fn print_report(report: &Report) {
    println!("\n{}", "═".repeat(60));
    println!("{}", "  VALIDATION REPORT".bold());
    println!("{}", "═".repeat(60));

    if report.ok {
        println!("\n{} {}", "✓".green().bold(), "Validation PASSED".green().bold());
    } else {
        println!("\n{} {}", "✗".red().bold(), "Validation FAILED".red().bold());
    }

    println!(
        "\n  template: {} v{}",
        report.template.template_id, report.template.version
    );
    println!("  input:    {}", report.input.path);
    if let Some(format) = &report.input.format {
        match &report.input.layer {
            Some(layer) => println!("  format:   {format} (layer {layer})"),
            None => println!("  format:   {format}"),
        }
    }
    if let Some(rows) = report.row_count {
        println!("  rows:     {rows}");
    }

    if !report.errors.is_empty() {
        println!("\n{}", "Errors:".red().bold());
        for (i, issue) in report.errors.iter().enumerate() {
            println!("  {}. {}", i + 1, format_issue(issue).red());
        }
    }
    if !report.warnings.is_empty() {
        println!("\n{}", "Warnings:".yellow().bold());
        for (i, issue) in report.warnings.iter().enumerate() {
            println!("  {}. {}", i + 1, format_issue(issue).yellow());
        }
    }

    println!("\n{}", "Summary:".bold());
    println!("  Total errors:   {}", report.errors.len());
    println!("  Total warnings: {}", report.warnings.len());
    println!("  Duration:       {:.3}s", report.duration_sec);
    println!("{}", "═".repeat(60));
}

/// One-line rendering of an issue for the text report.
fn format_issue(issue: &Issue) -> String {
    let mut parts = vec![issue.code.to_string()];
    if let Some(column) = &issue.column {
        parts.push(format!("column={column}"));
    }
    if let Some(columns) = &issue.columns {
        parts.push(format!("columns=[{}]", columns.join(", ")));
    }
    if let Some(keys) = &issue.keys {
        parts.push(format!("keys=[{}]", keys.join(", ")));
    }
    if let Some(rows) = issue.invalid_rows {
        parts.push(format!("invalid_rows={rows}"));
    }
    if let Some(examples) = &issue.examples {
        parts.push(format!("duplicate_groups={}", examples.len()));
    }
    if let Some(details) = &issue.details {
        for detail in details {
            parts.push(format!(
                "{}: expected {} ({} bad rows)",
                detail.column, detail.expected, detail.invalid_rows
            ));
        }
    }
    if let Some(detail) = &issue.detail {
        parts.push(detail.clone());
    }
    parts.join("  ")
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}
