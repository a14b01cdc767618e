//! Output formatters for previews and removal reports

use anyhow::Result;
use colored::*;
use sheetcols::{ColumnSet, Preview, RemovalReport};
use std::path::Path;

/// Print the column list of the first worksheet
pub fn print_preview(preview: &Preview) {
    println!("{}", format!("Columns of: {}", preview.filename).bold());
    println!();

    for column in &preview.columns {
        println!(
            "  {:>3}  {}",
            column.index.to_string().yellow(),
            column.name.cyan().bold()
        );
        if !column.sample_data.is_empty() {
            println!("       {}", column.sample_data.join(", ").bright_black());
        }
    }
}

pub fn print_json(preview: &Preview) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(preview)?);
    Ok(())
}

pub fn print_dry_run(file: &Path, columns: &ColumnSet, output: &Path) {
    println!("[DRY RUN] Operations on '{}':", file.display());
    println!("  Removing columns (right to left):");
    for column in columns.iter() {
        println!("    - {}", column);
    }
    println!("\nOutput would be: {}", output.display());
}

/// Print what happened to each sheet
pub fn print_report(report: &RemovalReport, output: &Path) {
    for sheet in &report.sheets {
        print!("{} {}", "Sheet:".bold(), sheet.name.cyan().bold());
        if sheet.skipped_empty {
            println!("  {}", "empty, skipped".bright_black());
            continue;
        }
        println!();

        if sheet.removed.is_empty() {
            println!("  {}", "no columns removed".bright_black());
        } else {
            let removed: Vec<String> = sheet.removed.iter().map(u32::to_string).collect();
            println!("  {} {}", "Removed:".green(), removed.join(", "));
        }
        if !sheet.dropped.is_empty() {
            let dropped: Vec<String> = sheet.dropped.iter().map(u32::to_string).collect();
            println!(
                "  {} {}",
                "Not present:".yellow(),
                dropped.join(", ")
            );
        }
    }

    println!();
    println!(
        "{}",
        format!("✓ Removed {} column(s)", report.total_removed())
            .green()
            .bold()
    );
    println!("Output: {}", output.display());
}
