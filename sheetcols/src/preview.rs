//! Column preview of the first worksheet

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Range, Reader, open_workbook_auto_from_rs};
use serde::Serialize;
use std::io::Cursor;

use crate::config::PreviewConfig;

/// One column of the first worksheet as shown to the user before removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// 1-based column number, as the caller will send it back
    pub index: u32,
    pub name: String,
    pub sample_data: Vec<String>,
}

/// Describe every column of the first worksheet.
///
/// The header comes from row 1, samples from rows 2 through
/// `last_sample_row` (capped at the sheet's last row), skipping empty cells.
pub fn preview_columns(data: &[u8], config: &PreviewConfig) -> Result<Vec<ColumnInfo>> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(data)).context("Failed to open workbook")?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("Workbook has no worksheets"))?
        .context("Failed to read the first worksheet")?;

    Ok(describe_columns(&range, config))
}

fn describe_columns(range: &Range<Data>, config: &PreviewConfig) -> Vec<ColumnInfo> {
    // 1-based bounding box; a sheet without values counts as 1x1
    let (max_row, max_column) = range.end().map_or((1, 1), |(r, c)| (r + 1, c + 1));
    let last_sample_row = config.last_sample_row.min(max_row);

    let value = |row: u32, col: u32| range.get_value((row - 1, col - 1)).and_then(display_value);

    (1..=max_column)
        .map(|col| {
            let name = value(1, col).unwrap_or_else(|| format!("Column {}", col));
            let sample_data = (2..=last_sample_row)
                .filter_map(|row| value(row, col))
                .take(config.max_samples)
                .collect();
            ColumnInfo {
                index: col,
                name,
                sample_data,
            }
        })
        .collect()
}

/// Text shown for a cell, `None` for blanks
fn display_value(data: &Data) -> Option<String> {
    match data {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::Bool(true) => Some("TRUE".to_string()),
        Data::Bool(false) => Some("FALSE".to_string()),
        // Date-formatted cells read as `2024-01-15 00:00:00`, durations keep their serial
        Data::DateTime(dt) if !dt.is_duration() => Some(
            dt.as_datetime()
                .map_or_else(|| dt.to_string(), |datetime| datetime.to_string()),
        ),
        Data::DateTimeIso(s) => Some(s.replace('T', " ")),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};

    fn range(cells: &[((u32, u32), Data)]) -> Range<Data> {
        let end = cells
            .iter()
            .fold((0, 0), |(r, c), ((row, col), _)| (r.max(*row), c.max(*col)));
        let mut range = Range::new((0, 0), end);
        for (pos, value) in cells {
            range.set_value(*pos, value.clone());
        }
        range
    }

    #[test]
    fn test_headers_and_samples() {
        let range = range(&[
            ((0, 0), Data::String("Name".into())),
            ((0, 1), Data::String("Age".into())),
            ((1, 0), Data::String("Ann".into())),
            ((1, 1), Data::Float(31.0)),
            ((2, 0), Data::String("Bob".into())),
            ((3, 1), Data::Float(45.5)),
        ]);
        let columns = describe_columns(&range, &PreviewConfig::default());

        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "Name");
        assert_eq!(columns[0].sample_data, vec!["Ann", "Bob"]);
        assert_eq!(columns[1].index, 2);
        assert_eq!(columns[1].sample_data, vec!["31", "45.5"]);
    }

    #[test]
    fn test_missing_header_gets_placeholder() {
        let range = range(&[
            ((0, 0), Data::String("Id".into())),
            ((1, 1), Data::Bool(true)),
            ((0, 2), Data::String(String::new())),
        ]);
        let columns = describe_columns(&range, &PreviewConfig::default());

        assert_eq!(columns[1].name, "Column 2");
        assert_eq!(columns[1].sample_data, vec!["TRUE"]);
        assert_eq!(columns[2].name, "Column 3");
    }

    #[test]
    fn test_dates_are_formatted() {
        let date = ExcelDateTime::new(45306.0, ExcelDateTimeType::DateTime, false);
        let duration = ExcelDateTime::new(1.5, ExcelDateTimeType::TimeDelta, false);
        let range = range(&[
            ((0, 0), Data::String("Due".into())),
            ((1, 0), Data::DateTime(date)),
            ((2, 0), Data::DateTimeIso("2024-02-01T08:30:00".into())),
            ((3, 0), Data::DateTime(duration)),
        ]);
        let columns = describe_columns(&range, &PreviewConfig::default());

        assert_eq!(
            columns[0].sample_data,
            vec!["2024-01-15 00:00:00", "2024-02-01 08:30:00", "1.5"]
        );
    }

    #[test]
    fn test_samples_are_capped() {
        let cells: Vec<_> = (0..10)
            .map(|r| ((r, 0), Data::Int(r as i64)))
            .collect();
        let columns = describe_columns(&range(&cells), &PreviewConfig::default());

        // Rows 2..=6 are scanned, only the first three values are kept
        assert_eq!(columns[0].name, "0");
        assert_eq!(columns[0].sample_data, vec!["1", "2", "3"]);

        let wide = PreviewConfig {
            max_samples: 10,
            last_sample_row: 6,
        };
        let columns = describe_columns(&range(&cells), &wide);
        assert_eq!(columns[0].sample_data, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_empty_sheet_has_one_column() {
        let columns = describe_columns(&Range::empty(), &PreviewConfig::default());
        assert_eq!(
            columns,
            vec![ColumnInfo {
                index: 1,
                name: "Column 1".to_string(),
                sample_data: Vec::new(),
            }]
        );
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(preview_columns(b"not a workbook", &PreviewConfig::default()).is_err());
    }
}
