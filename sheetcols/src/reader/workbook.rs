//! Workbook data structures

use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::fmt;

use super::parser_utils::{format_cell_ref, format_cell_range};
use super::xlsx_parser::ParsedSheet;

/// A file inside the XLSX zip container, kept as read
#[derive(Debug, Clone)]
pub struct PackagePart {
    pub name: String,
    pub data: Vec<u8>,
}

/// Represents a complete workbook
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
    /// Every part of the source package in archive order
    pub(crate) parts: Vec<PackagePart>,
}

impl Workbook {
    /// Get a sheet by name
    pub fn get_sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn get_sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    /// Get all sheet names
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Whether any sheet changed since it was decoded
    pub fn is_modified(&self) -> bool {
        self.sheets.iter().any(|s| s.modified)
    }

    pub(crate) fn part(&self, name: &str) -> Option<&PackagePart> {
        self.parts.iter().find(|p| p.name == name)
    }
}

/// Rectangle of merged cells, 1-based and inclusive on both axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MergedRegion {
    pub min_row: u32,
    pub min_col: u32,
    pub max_row: u32,
    pub max_col: u32,
}

impl MergedRegion {
    pub fn new(min_row: u32, min_col: u32, max_row: u32, max_col: u32) -> Self {
        Self {
            min_row,
            min_col,
            max_row,
            max_col,
        }
    }

    /// Check the rectangle is well formed
    pub fn validate(&self) -> Result<()> {
        if self.min_row == 0 || self.min_col == 0 {
            bail!("merged region {:?} has a zero coordinate", self);
        }
        if self.min_row > self.max_row || self.min_col > self.max_col {
            bail!("merged region {:?} has inverted bounds", self);
        }
        Ok(())
    }

    pub fn is_single_cell(&self) -> bool {
        self.min_row == self.max_row && self.min_col == self.max_col
    }
}

impl fmt::Display for MergedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_cell_range(
            self.min_row,
            self.min_col,
            self.max_row,
            self.max_col,
        ))
    }
}

/// A `<col>` entry: formatting shared by a contiguous range of columns
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRange {
    pub min: u32,
    pub max: u32,
    /// Remaining attributes (`width`, `style`, `hidden`, ...), unescaped
    pub attrs: Vec<(String, String)>,
}

impl ColumnRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self {
            min,
            max,
            attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A `<hyperlink>` entry. The target (`r:id`, `location`) and display
/// attributes are kept as read; only the anchor range moves.
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperlink {
    pub min_row: u32,
    pub min_col: u32,
    pub max_row: u32,
    pub max_col: u32,
    /// Attributes other than `ref`, with their qualified names (`r:id`)
    pub attrs: Vec<(String, String)>,
}

impl Hyperlink {
    pub fn new(min_row: u32, min_col: u32, max_row: u32, max_col: u32) -> Self {
        Self {
            min_row,
            min_col,
            max_row,
            max_col,
            attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The `ref` value: `C1` for one cell, `C1:D2` otherwise
    pub fn reference(&self) -> String {
        if self.min_row == self.max_row && self.min_col == self.max_col {
            format_cell_ref(self.min_row, self.min_col)
        } else {
            format_cell_range(self.min_row, self.min_col, self.max_row, self.max_col)
        }
    }
}

/// Row-level formatting from a `<row>` element (height, style, hidden, ...)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFormat {
    pub attrs: Vec<(String, String)>,
}

/// Represents a worksheet
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    /// Path of the worksheet part inside the package
    pub(crate) part_name: Option<String>,
    /// Namespace prefix of the worksheet elements, if any
    pub(crate) prefix: Option<String>,
    cells: BTreeMap<(u32, u32), Cell>,
    rows: BTreeMap<u32, RowFormat>,
    merged_cells: Vec<MergedRegion>,
    columns: Vec<ColumnRange>,
    hyperlinks: Vec<Hyperlink>,
    modified: bool,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Get a cell at the given 1-based position
    pub fn get_cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Value at a position, `Empty` when the cell is absent
    pub fn value(&self, row: u32, col: u32) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells.get(&(row, col)).map_or(&EMPTY, |c| &c.value)
    }

    pub fn set_cell(&mut self, row: u32, col: u32, cell: Cell) {
        self.cells.insert((row, col), cell);
        self.modified = true;
    }

    pub fn remove_cell(&mut self, row: u32, col: u32) -> Option<Cell> {
        let removed = self.cells.remove(&(row, col));
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    /// All cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = ((u32, u32), &Cell)> {
        self.cells.iter().map(|(pos, cell)| (*pos, cell))
    }

    /// Get cells in a specific row
    pub fn cells_in_row(&self, row: u32) -> impl Iterator<Item = (u32, &Cell)> {
        self.cells
            .range((row, 0)..=(row, u32::MAX))
            .map(|((_, col), cell)| (*col, cell))
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Last row of the bounding box; 1 for a sheet without cells
    pub fn max_row(&self) -> u32 {
        self.cells.keys().map(|(row, _)| *row).max().unwrap_or(1)
    }

    /// Last column of the bounding box; 1 for a sheet without cells
    pub fn max_column(&self) -> u32 {
        self.cells.keys().map(|(_, col)| *col).max().unwrap_or(1)
    }

    /// A 1x1 bounding box counts as "no data", even when A1 holds a value
    pub fn is_structurally_empty(&self) -> bool {
        self.max_row() == 1 && self.max_column() == 1
    }

    pub fn merged_cells(&self) -> &[MergedRegion] {
        &self.merged_cells
    }

    pub fn add_merged_region(&mut self, region: MergedRegion) {
        self.merged_cells.push(region);
        self.modified = true;
    }

    pub fn set_merged_cells(&mut self, regions: Vec<MergedRegion>) {
        self.merged_cells = regions;
        self.modified = true;
    }

    pub fn columns(&self) -> &[ColumnRange] {
        &self.columns
    }

    pub fn set_columns(&mut self, columns: Vec<ColumnRange>) {
        self.columns = columns;
        self.modified = true;
    }

    pub fn hyperlinks(&self) -> &[Hyperlink] {
        &self.hyperlinks
    }

    pub fn set_hyperlinks(&mut self, hyperlinks: Vec<Hyperlink>) {
        self.hyperlinks = hyperlinks;
        self.modified = true;
    }

    pub fn row_format(&self, row: u32) -> Option<&RowFormat> {
        self.rows.get(&row)
    }

    pub(crate) fn row_formats(&self) -> &BTreeMap<u32, RowFormat> {
        &self.rows
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Remove column `col`, moving every cell to its right one column left.
    ///
    /// Cells keep their value and style as they move. Fails without touching
    /// the grid when `col` is 0 or when a moved cell would land on an
    /// existing one.
    pub fn delete_column(&mut self, col: u32) -> Result<()> {
        if col == 0 {
            bail!("column index 0 is not a valid column in sheet '{}'", self.name);
        }

        let mut shifted = BTreeMap::new();
        for (&(row, c), cell) in &self.cells {
            if c < col {
                shifted.insert((row, c), cell.clone());
            }
        }
        for (&(row, c), cell) in &self.cells {
            if c > col && shifted.insert((row, c - 1), cell.clone()).is_some() {
                bail!(
                    "cell {} collides with an existing cell while deleting column {} in sheet '{}'",
                    format_cell_ref(row, c - 1),
                    col,
                    self.name
                );
            }
        }

        self.cells = shifted;
        self.modified = true;
        Ok(())
    }

    /// Decoder entry point, does not mark the sheet as modified
    pub(crate) fn load(&mut self, parsed: ParsedSheet) {
        self.prefix = parsed.prefix;
        self.cells = parsed.cells;
        self.rows = parsed.rows;
        self.merged_cells = parsed.merged_cells;
        self.columns = parsed.columns;
        self.hyperlinks = parsed.hyperlinks;
        self.modified = false;
    }
}

/// Represents a single cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    value: CellValue,
    style: Option<u32>,
    /// Markup copied from the source document, re-emitted as is
    pub(crate) markup: Option<CellMarkup>,
}

/// Source markup of a decoded cell
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CellMarkup {
    /// `<c>` attributes other than `r` and `s`, unescaped
    pub attrs: Vec<(String, String)>,
    /// Serialized children (`<f>`, `<v>`, `<is>`)
    pub inner: String,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            style: None,
            markup: None,
        }
    }

    /// A cell that only carries formatting
    pub fn styled(style: u32) -> Self {
        Self::new(CellValue::Empty).with_style(style)
    }

    pub fn with_style(mut self, style: u32) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(&self) -> &CellValue {
        &self.value
    }

    /// Index into the workbook's cell formats (`cellXfs`)
    pub fn style(&self) -> Option<u32> {
        self.style
    }

    /// Replace the value; the source markup no longer applies
    pub fn set_value(&mut self, value: CellValue) {
        self.value = value;
        self.markup = None;
    }

    pub fn set_style(&mut self, style: Option<u32>) {
        self.style = style;
    }

    pub(crate) fn decoded(value: CellValue, style: Option<u32>, markup: CellMarkup) -> Self {
        Self {
            value,
            style,
            markup: Some(markup),
        }
    }
}

/// Cell value types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(String),
    Formula {
        formula: String,
        cached: Option<String>,
    },
}

impl CellValue {
    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Get the formula if this is a formula cell
    pub fn as_formula(&self) -> Option<&str> {
        match self {
            CellValue::Formula { formula, .. } => Some(formula),
            _ => None,
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    /// Create a formula cell without cached result
    pub fn formula(f: impl Into<String>) -> Self {
        CellValue::Formula {
            formula: f.into(),
            cached: None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Boolean(true) => f.write_str("TRUE"),
            CellValue::Boolean(false) => f.write_str("FALSE"),
            CellValue::Error(e) => f.write_str(e),
            CellValue::Formula { formula, .. } => write!(f, "={}", formula),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_sheet(values: &[&str]) -> Sheet {
        let mut sheet = Sheet::new("Sheet1");
        for (i, v) in values.iter().enumerate() {
            sheet.set_cell(1, i as u32 + 1, Cell::new(CellValue::text(*v)));
        }
        sheet
    }

    #[test]
    fn test_bounding_box() {
        let mut sheet = Sheet::new("Sheet1");
        assert_eq!((sheet.max_row(), sheet.max_column()), (1, 1));
        assert!(sheet.is_structurally_empty());

        sheet.set_cell(1, 1, Cell::new(CellValue::Number(1.0)));
        assert!(sheet.is_structurally_empty());

        sheet.set_cell(4, 3, Cell::styled(2));
        assert_eq!((sheet.max_row(), sheet.max_column()), (4, 3));
        assert!(!sheet.is_structurally_empty());
    }

    #[test]
    fn test_delete_column_shifts_cells_left() {
        let mut sheet = row_sheet(&["A", "B", "C"]);
        sheet.delete_column(2).unwrap();

        assert_eq!(sheet.max_column(), 2);
        assert_eq!(sheet.value(1, 1), &CellValue::text("A"));
        assert_eq!(sheet.value(1, 2), &CellValue::text("C"));
        assert!(sheet.get_cell(1, 3).is_none());
    }

    #[test]
    fn test_delete_column_moves_style_with_value() {
        let mut sheet = row_sheet(&["A", "B"]);
        sheet.set_cell(2, 3, Cell::styled(7));
        sheet.delete_column(1).unwrap();

        assert_eq!(sheet.value(1, 1), &CellValue::text("B"));
        assert_eq!(sheet.get_cell(2, 2).and_then(Cell::style), Some(7));
    }

    #[test]
    fn test_delete_column_zero_fails() {
        let mut sheet = row_sheet(&["A"]);
        assert!(sheet.delete_column(0).is_err());
        assert_eq!(sheet.value(1, 1), &CellValue::text("A"));
    }

    #[test]
    fn test_set_value_drops_markup() {
        let mut cell = Cell::decoded(
            CellValue::text("x"),
            Some(1),
            CellMarkup {
                attrs: vec![("t".into(), "s".into())],
                inner: "<v>0</v>".into(),
            },
        );
        cell.set_value(CellValue::Number(2.0));
        assert!(cell.markup.is_none());
        assert_eq!(cell.style(), Some(1));
    }

    #[test]
    fn test_merged_region_display_and_validate() {
        let region = MergedRegion::new(1, 2, 3, 4);
        assert_eq!(region.to_string(), "B1:D3");
        assert!(region.validate().is_ok());
        assert!(MergedRegion::new(1, 4, 1, 2).validate().is_err());
        assert!(MergedRegion::new(0, 1, 1, 1).validate().is_err());
    }

    #[test]
    fn test_hyperlink_reference() {
        let link = Hyperlink::new(1, 3, 1, 3).with_attr("r:id", "rId1");
        assert_eq!(link.reference(), "C1");
        assert_eq!(link.attr("r:id"), Some("rId1"));
        assert_eq!(Hyperlink::new(2, 1, 4, 2).reference(), "A2:B4");

        let mut sheet = Sheet::new("Sheet1");
        sheet.set_hyperlinks(vec![link]);
        assert!(sheet.is_modified());
        assert_eq!(sheet.hyperlinks().len(), 1);
    }
}
