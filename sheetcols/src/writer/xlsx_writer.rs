//! XLSX writer: re-encodes a decoded workbook after column removal

use anyhow::{Context, Result, anyhow};
use log::debug;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::reader::parser_utils::{format_cell_range, format_cell_ref};
use crate::reader::workbook::{Cell, CellValue, Hyperlink, MergedRegion, Sheet, Workbook};
use crate::reader::xlsx_parser::{WORKBOOK_RELS_PART, write_text_element};

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

/// Write a workbook to a file path
pub fn write_workbook<P: AsRef<Path>>(path: P, workbook: &Workbook) -> Result<()> {
    let path = path.as_ref();
    let bytes = write_workbook_to_bytes(workbook)?;
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(&bytes)?;
    Ok(())
}

/// Encode a workbook back into an XLSX package.
///
/// Parts are written in their original order. Worksheets that were not
/// modified are copied byte for byte; modified ones are re-serialized from
/// their original XML with a fresh grid, column formats, dimension, merges
/// and hyperlink anchors.
/// Once anything changed, the calculation chain is dropped because its cell
/// positions no longer hold.
pub fn write_workbook_to_bytes(workbook: &Workbook) -> Result<Vec<u8>> {
    let sheets_without_part: Vec<&str> = workbook
        .sheets
        .iter()
        .filter(|s| s.is_modified() && s.part_name.is_none())
        .map(|s| s.name.as_str())
        .collect();
    if !sheets_without_part.is_empty() {
        return Err(anyhow!(
            "Sheets {:?} were not decoded from a package and cannot be written",
            sheets_without_part
        ));
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip_writer = ZipWriter::new(Cursor::new(Vec::new()));
    let drop_calc_chain = workbook.is_modified() && workbook.part(CALC_CHAIN_PART).is_some();

    for part in &workbook.parts {
        let name = part.name.as_str();

        if drop_calc_chain && name == CALC_CHAIN_PART {
            debug!("Dropping {} after column removal", CALC_CHAIN_PART);
            continue;
        }

        let modified_sheet = workbook
            .sheets
            .iter()
            .find(|s| s.is_modified() && s.part_name.as_deref() == Some(name));

        zip_writer.start_file(name, options)?;
        if let Some(sheet) = modified_sheet {
            let xml = rewrite_sheet_xml(&part.data, sheet)
                .with_context(|| format!("Failed to write sheet '{}'", sheet.name))?;
            zip_writer.write_all(&xml)?;
        } else if drop_calc_chain && name == CONTENT_TYPES_PART {
            zip_writer.write_all(&remove_calc_chain_content_type(&part.data)?)?;
        } else if drop_calc_chain && name == WORKBOOK_RELS_PART {
            zip_writer.write_all(&remove_calc_chain_relationship(&part.data)?)?;
        } else {
            zip_writer.write_all(&part.data)?;
        }
    }

    Ok(zip_writer.finish()?.into_inner())
}

/// Elements that come after `<mergeCells>` in the worksheet schema
fn insert_before_tag(name: &[u8]) -> bool {
    matches!(
        name,
        b"phoneticPr"
            | b"conditionalFormatting"
            | b"dataValidations"
            | b"hyperlinks"
            | b"printOptions"
            | b"pageMargins"
            | b"pageSetup"
            | b"headerFooter"
            | b"rowBreaks"
            | b"colBreaks"
            | b"customProperties"
            | b"cellWatches"
            | b"ignoredErrors"
            | b"smartTags"
            | b"drawing"
            | b"legacyDrawing"
            | b"legacyDrawingHF"
            | b"drawingHF"
            | b"picture"
            | b"oleObjects"
            | b"controls"
            | b"webPublishItems"
            | b"tableParts"
            | b"extLst"
    )
}

fn tag(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{}:{}", p, local),
        None => local.to_string(),
    }
}

/// Stream the original worksheet XML, swapping in the sheet's current state
pub fn rewrite_sheet_xml(original: &[u8], sheet: &Sheet) -> Result<Vec<u8>> {
    let prefix = sheet.prefix.as_deref();
    let merges: Vec<MergedRegion> = sheet
        .merged_cells()
        .iter()
        .filter(|r| !r.is_single_cell())
        .copied()
        .collect();

    let mut reader = Reader::from_reader(original);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::new());

    let mut buf = Vec::new();
    let mut skip_depth = 0usize;
    let mut cols_written = false;
    let mut merges_written = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        let is_start = matches!(event, Event::Start(_));
        match event {
            Event::Eof => break,
            _ if skip_depth > 0 => match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                _ => {}
            },
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"dimension" => {
                    write_dimension(&mut writer, prefix, sheet)?;
                    skip_depth = usize::from(is_start);
                }
                b"cols" => {
                    write_cols(&mut writer, prefix, sheet)?;
                    cols_written = true;
                    skip_depth = usize::from(is_start);
                }
                b"sheetData" => {
                    if !cols_written {
                        write_cols(&mut writer, prefix, sheet)?;
                        cols_written = true;
                    }
                    write_sheet_data(&mut writer, prefix, sheet)?;
                    skip_depth = usize::from(is_start);
                }
                b"mergeCells" => {
                    write_merge_cells(&mut writer, prefix, &merges)?;
                    merges_written = true;
                    skip_depth = usize::from(is_start);
                }
                b"hyperlinks" => {
                    if !merges_written {
                        write_merge_cells(&mut writer, prefix, &merges)?;
                        merges_written = true;
                    }
                    write_hyperlinks(&mut writer, prefix, sheet.hyperlinks())?;
                    skip_depth = usize::from(is_start);
                }
                name if !merges_written && insert_before_tag(name) => {
                    write_merge_cells(&mut writer, prefix, &merges)?;
                    merges_written = true;
                    writer.write_event(event.borrow())?;
                }
                _ => writer.write_event(event.borrow())?,
            },
            Event::End(ref e) if e.local_name().as_ref() == b"worksheet" => {
                if !merges_written {
                    write_merge_cells(&mut writer, prefix, &merges)?;
                    merges_written = true;
                }
                writer.write_event(event.borrow())?;
            }
            _ => writer.write_event(event.borrow())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn write_dimension<W: Write>(writer: &mut Writer<W>, prefix: Option<&str>, sheet: &Sheet) -> Result<()> {
    let reference = if sheet.cell_count() == 0 {
        "A1".to_string()
    } else {
        let min_row = sheet.cells().map(|((r, _), _)| r).min().unwrap_or(1);
        let min_col = sheet.cells().map(|((_, c), _)| c).min().unwrap_or(1);
        let (max_row, max_col) = (sheet.max_row(), sheet.max_column());
        if (min_row, min_col) == (max_row, max_col) {
            format_cell_ref(min_row, min_col)
        } else {
            format_cell_range(min_row, min_col, max_row, max_col)
        }
    };

    let mut elem = BytesStart::new(tag(prefix, "dimension"));
    elem.push_attribute(("ref", reference.as_str()));
    writer.write_event(Event::Empty(elem))?;
    Ok(())
}

fn write_cols<W: Write>(writer: &mut Writer<W>, prefix: Option<&str>, sheet: &Sheet) -> Result<()> {
    if sheet.columns().is_empty() {
        return Ok(());
    }

    let cols_tag = tag(prefix, "cols");
    let col_tag = tag(prefix, "col");
    writer.write_event(Event::Start(BytesStart::new(cols_tag.as_str())))?;
    for range in sheet.columns() {
        let mut elem = BytesStart::new(col_tag.as_str());
        elem.push_attribute(("min", range.min.to_string().as_str()));
        elem.push_attribute(("max", range.max.to_string().as_str()));
        for (key, value) in &range.attrs {
            elem.push_attribute((key.as_str(), value.as_str()));
        }
        writer.write_event(Event::Empty(elem))?;
    }
    writer.write_event(Event::End(BytesEnd::new(cols_tag.as_str())))?;
    Ok(())
}

fn write_sheet_data<W: Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    sheet: &Sheet,
) -> Result<()> {
    let sheet_data_tag = tag(prefix, "sheetData");
    let row_tag = tag(prefix, "row");

    let rows: BTreeSet<u32> = sheet
        .row_formats()
        .keys()
        .copied()
        .chain(sheet.cells().map(|((row, _), _)| row))
        .collect();

    if rows.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new(sheet_data_tag.as_str())))?;
        return Ok(());
    }

    writer.write_event(Event::Start(BytesStart::new(sheet_data_tag.as_str())))?;
    for row in rows {
        let mut elem = BytesStart::new(row_tag.as_str());
        elem.push_attribute(("r", row.to_string().as_str()));
        if let Some(format) = sheet.row_format(row) {
            for (key, value) in &format.attrs {
                elem.push_attribute((key.as_str(), value.as_str()));
            }
        }

        let mut cells = sheet.cells_in_row(row).peekable();
        if cells.peek().is_none() {
            writer.write_event(Event::Empty(elem))?;
            continue;
        }

        writer.write_event(Event::Start(elem))?;
        for (col, cell) in cells {
            write_cell(writer, prefix, row, col, cell)?;
        }
        writer.write_event(Event::End(BytesEnd::new(row_tag.as_str())))?;
    }
    writer.write_event(Event::End(BytesEnd::new(sheet_data_tag.as_str())))?;
    Ok(())
}

fn write_cell<W: Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    row: u32,
    col: u32,
    cell: &Cell,
) -> Result<()> {
    let cell_tag = tag(prefix, "c");
    let mut elem = BytesStart::new(cell_tag.as_str());
    elem.push_attribute(("r", format_cell_ref(row, col).as_str()));
    if let Some(style) = cell.style() {
        elem.push_attribute(("s", style.to_string().as_str()));
    }

    if let Some(markup) = &cell.markup {
        for (key, value) in &markup.attrs {
            elem.push_attribute((key.as_str(), value.as_str()));
        }
        if markup.inner.is_empty() {
            writer.write_event(Event::Empty(elem))?;
        } else {
            writer.write_event(Event::Start(elem))?;
            writer.get_mut().write_all(markup.inner.as_bytes())?;
            writer.write_event(Event::End(BytesEnd::new(cell_tag.as_str())))?;
        }
        return Ok(());
    }

    let v_tag = tag(prefix, "v");
    match cell.value() {
        CellValue::Empty => {
            writer.write_event(Event::Empty(elem))?;
            return Ok(());
        }
        CellValue::Number(n) => {
            writer.write_event(Event::Start(elem))?;
            write_text_element(writer, BytesStart::new(v_tag.as_str()), &n.to_string())?;
        }
        CellValue::Text(text) => {
            elem.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(elem))?;
            let is_tag = tag(prefix, "is");
            writer.write_event(Event::Start(BytesStart::new(is_tag.as_str())))?;
            let mut t = BytesStart::new(tag(prefix, "t"));
            if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
                t.push_attribute(("xml:space", "preserve"));
            }
            write_text_element(writer, t, text)?;
            writer.write_event(Event::End(BytesEnd::new(is_tag.as_str())))?;
        }
        CellValue::Boolean(b) => {
            elem.push_attribute(("t", "b"));
            writer.write_event(Event::Start(elem))?;
            let raw = if *b { "1" } else { "0" };
            write_text_element(writer, BytesStart::new(v_tag.as_str()), raw)?;
        }
        CellValue::Error(e) => {
            elem.push_attribute(("t", "e"));
            writer.write_event(Event::Start(elem))?;
            write_text_element(writer, BytesStart::new(v_tag.as_str()), e)?;
        }
        CellValue::Formula { formula, cached } => {
            let numeric = cached.as_deref().is_some_and(|c| c.parse::<f64>().is_ok());
            if cached.is_some() && !numeric {
                elem.push_attribute(("t", "str"));
            }
            writer.write_event(Event::Start(elem))?;
            write_text_element(writer, BytesStart::new(tag(prefix, "f")), formula)?;
            if let Some(cached) = cached {
                write_text_element(writer, BytesStart::new(v_tag.as_str()), cached)?;
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(cell_tag.as_str())))?;
    Ok(())
}

fn write_merge_cells<W: Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    merges: &[MergedRegion],
) -> Result<()> {
    if merges.is_empty() {
        return Ok(());
    }

    let merge_cells_tag = tag(prefix, "mergeCells");
    let merge_cell_tag = tag(prefix, "mergeCell");
    let mut start = BytesStart::new(merge_cells_tag.as_str());
    start.push_attribute(("count", merges.len().to_string().as_str()));
    writer.write_event(Event::Start(start))?;

    for merge in merges {
        let mut elem = BytesStart::new(merge_cell_tag.as_str());
        elem.push_attribute(("ref", merge.to_string().as_str()));
        writer.write_event(Event::Empty(elem))?;
    }

    writer.write_event(Event::End(BytesEnd::new(merge_cells_tag.as_str())))?;
    Ok(())
}

fn write_hyperlinks<W: Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    hyperlinks: &[Hyperlink],
) -> Result<()> {
    if hyperlinks.is_empty() {
        return Ok(());
    }

    let hyperlinks_tag = tag(prefix, "hyperlinks");
    let hyperlink_tag = tag(prefix, "hyperlink");
    writer.write_event(Event::Start(BytesStart::new(hyperlinks_tag.as_str())))?;
    for link in hyperlinks {
        let mut elem = BytesStart::new(hyperlink_tag.as_str());
        elem.push_attribute(("ref", link.reference().as_str()));
        for (key, value) in &link.attrs {
            elem.push_attribute((key.as_str(), value.as_str()));
        }
        writer.write_event(Event::Empty(elem))?;
    }
    writer.write_event(Event::End(BytesEnd::new(hyperlinks_tag.as_str())))?;
    Ok(())
}

fn remove_calc_chain_content_type(xml: &[u8]) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"Override" => {
                let mut part_name = String::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"PartName" {
                        part_name = attr.unescape_value()?.into_owned();
                        break;
                    }
                }

                if part_name != format!("/{}", CALC_CHAIN_PART) {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(e) => writer.write_event(e)?,
            Err(e) => return Err(anyhow!("Error parsing XML: {}", e)),
        }
        buf.clear();
    }

    Ok(writer.into_inner().into_inner())
}

fn remove_calc_chain_relationship(xml: &[u8]) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"Relationship" => {
                let mut rel_type = String::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"Type" {
                        rel_type = attr.unescape_value()?.into_owned();
                        break;
                    }
                }

                if !rel_type.ends_with("/calcChain") {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(e) => writer.write_event(e)?,
            Err(e) => return Err(anyhow!("Error parsing XML: {}", e)),
        }
        buf.clear();
    }

    Ok(writer.into_inner().into_inner())
}
