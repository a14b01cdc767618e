//! Column removal on decoded worksheets
//!
//! Each worksheet is processed on its own. Columns are taken from right to
//! left, and every deletion runs in two tiers: the layout pass (merged regions,
//! column formats and hyperlinks) is best effort, while the cell shift that follows must
//! succeed for the request to succeed.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;

use crate::columns::ColumnSet;
use crate::reader::workbook::{ColumnRange, Hyperlink, MergedRegion, Sheet, Workbook};

/// Outcome of a removal request, one entry per worksheet in workbook order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub sheets: Vec<SheetReport>,
}

impl RemovalReport {
    /// Columns removed across all sheets
    pub fn total_removed(&self) -> usize {
        self.sheets.iter().map(|s| s.removed.len()).sum()
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetReport> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SheetReport {
    pub name: String,
    /// Removed indices, in removal order (descending)
    pub removed: Vec<u32>,
    /// Requested indices past the sheet's last column
    pub dropped: Vec<u32>,
    /// The sheet had a 1x1 bounding box and was left alone
    pub skipped_empty: bool,
}

/// Remove the requested columns from every worksheet of the workbook
pub fn remove_columns(workbook: &mut Workbook, columns: &ColumnSet) -> Result<RemovalReport> {
    let mut report = RemovalReport::default();
    for sheet in &mut workbook.sheets {
        let sheet_report = remove_columns_from_sheet(sheet, columns)
            .with_context(|| format!("Failed to remove columns from sheet '{}'", sheet.name))?;
        report.sheets.push(sheet_report);
    }
    Ok(report)
}

/// Remove the requested columns that exist in this sheet.
///
/// Indices beyond the sheet's last column are dropped for this sheet only. A
/// sheet whose bounding box is 1x1 counts as empty and is skipped, even when
/// A1 holds a value.
pub fn remove_columns_from_sheet(sheet: &mut Sheet, columns: &ColumnSet) -> Result<SheetReport> {
    let mut report = SheetReport {
        name: sheet.name.clone(),
        ..Default::default()
    };

    if sheet.is_structurally_empty() {
        info!("Sheet '{}' is empty, skipping", sheet.name);
        report.skipped_empty = true;
        return Ok(report);
    }

    let max_column = sheet.max_column();
    let (valid, dropped): (Vec<u32>, Vec<u32>) = columns.iter().partition(|&c| c <= max_column);
    if !dropped.is_empty() {
        warn!(
            "Sheet '{}' has {} column(s), ignoring out of range indices {:?}",
            sheet.name, max_column, dropped
        );
    }
    report.dropped = dropped;

    for col in valid {
        reconcile_merges(sheet, col);
        adjust_column_formats(sheet, col);
        adjust_hyperlinks(sheet, col);
        sheet.delete_column(col)?;
        debug!("Deleted column {} from sheet '{}'", col, sheet.name);
        report.removed.push(col);
    }

    if !report.removed.is_empty() {
        info!(
            "Removed {} column(s) from sheet '{}'",
            report.removed.len(),
            sheet.name
        );
    }
    Ok(report)
}

/// Bring merged regions in line with the deletion of column `col`.
///
/// Runs before the cells shift. Regions right of `col` move left, regions
/// that span it lose one column, and a region made only of `col` disappears.
/// When `col` is the left edge of a wider region, the anchor cell is first
/// moved one column right so the merged cell keeps its value and style.
/// Malformed regions are reported and left as they are.
pub fn reconcile_merges(sheet: &mut Sheet, col: u32) {
    let mut regions = Vec::with_capacity(sheet.merged_cells().len());
    let mut changed = false;

    for &region in sheet.merged_cells() {
        if let Err(e) = region.validate() {
            warn!("Sheet '{}': leaving merged region untouched: {}", sheet.name, e);
            regions.push(region);
            continue;
        }

        let updated = shrink_span(region.min_col, region.max_col, col).map(|(min_col, max_col)| {
            MergedRegion::new(region.min_row, min_col, region.max_row, max_col)
        });
        if updated != Some(region) {
            changed = true;
        }
        regions.extend(updated);
    }

    let anchors: Vec<u32> = sheet
        .merged_cells()
        .iter()
        .filter(|r| r.validate().is_ok() && r.min_col == col && r.max_col > col)
        .map(|r| r.min_row)
        .collect();
    for row in anchors {
        if let Some(anchor) = sheet.remove_cell(row, col) {
            debug!(
                "Sheet '{}': moving merged anchor of row {} off column {}",
                sheet.name, row, col
            );
            sheet.set_cell(row, col + 1, anchor);
        }
    }

    if changed {
        sheet.set_merged_cells(regions);
    }
}

/// Apply the same shift and shrink rules to the `<cols>` format ranges
fn adjust_column_formats(sheet: &mut Sheet, col: u32) {
    if sheet.columns().iter().all(|range| range.max < col) {
        return;
    }

    let columns: Vec<ColumnRange> = sheet
        .columns()
        .iter()
        .filter_map(|range| {
            shrink_span(range.min, range.max, col).map(|(min, max)| ColumnRange {
                min,
                max,
                attrs: range.attrs.clone(),
            })
        })
        .collect();
    sheet.set_columns(columns);
}

/// Hyperlinks move with their cells; a link anchored only on `col` goes away
fn adjust_hyperlinks(sheet: &mut Sheet, col: u32) {
    if sheet.hyperlinks().iter().all(|link| link.max_col < col) {
        return;
    }

    let mut hyperlinks = Vec::with_capacity(sheet.hyperlinks().len());
    for link in sheet.hyperlinks() {
        match shrink_span(link.min_col, link.max_col, col) {
            Some((min_col, max_col)) => hyperlinks.push(Hyperlink {
                min_col,
                max_col,
                ..link.clone()
            }),
            None => debug!(
                "Sheet '{}': dropping hyperlink on {} with its column",
                sheet.name,
                link.reference()
            ),
        }
    }
    sheet.set_hyperlinks(hyperlinks);
}

/// New bounds of the inclusive span `min..=max` once column `col` is gone
fn shrink_span(min: u32, max: u32, col: u32) -> Option<(u32, u32)> {
    if max < col {
        Some((min, max))
    } else if min > col {
        Some((min - 1, max - 1))
    } else if min == max {
        None
    } else {
        // min <= col <= max with min < max: whatever was right of col slides into it
        Some((min, max - 1))
    }
}
