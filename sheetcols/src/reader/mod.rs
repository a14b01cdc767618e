//! XLSX package reader using a custom XML parser

use anyhow::{Context, Result};
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use zip::ZipArchive;

pub mod parser_utils;
pub mod workbook;
pub mod xlsx_parser;

use self::xlsx_parser::XlsxReader;
pub use workbook::{
    Cell, CellValue, ColumnRange, Hyperlink, MergedRegion, PackagePart, RowFormat, Sheet,
    Workbook,
};

/// Upper bound on the buffer reserved up front for one package part.
/// The size declared in the archive is only a hint.
const MAX_PART_PREALLOC: u64 = 1024 * 1024;

/// Read a workbook from a file path
pub fn read_workbook<P: AsRef<Path>>(path: P) -> Result<Workbook> {
    let path = path.as_ref();
    let data =
        std::fs::read(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    read_workbook_from_bytes(&data)
}

/// Decode an XLSX document held in memory
pub fn read_workbook_from_bytes(data: &[u8]) -> Result<Workbook> {
    let mut archive = ZipArchive::new(Cursor::new(data)).context("Failed to open zip archive")?;
    let parts = read_parts(&mut archive)?;

    let sheets = XlsxReader::new(&parts)?.read_sheets()?;
    Ok(Workbook { sheets, parts })
}

/// Load every file of the archive, in archive order
fn read_parts<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<PackagePart>> {
    let mut parts = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut data = Vec::with_capacity(initial_capacity(file.size()));
        file.read_to_end(&mut data)
            .with_context(|| format!("Failed to read package part {}", name))?;
        parts.push(PackagePart { name, data });
    }
    Ok(parts)
}

fn initial_capacity(declared_size: u64) -> usize {
    usize::try_from(declared_size.min(MAX_PART_PREALLOC)).unwrap_or(0)
}
