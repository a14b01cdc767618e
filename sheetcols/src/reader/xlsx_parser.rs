//! SpreadsheetML parsing for the XLSX package

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, warn};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashMap};

use super::parser_utils::{
    format_cell_ref, parse_cell_range, parse_cell_ref, read_text_node, translate_shared_formula,
};
use super::workbook::{
    Cell, CellMarkup, CellValue, ColumnRange, Hyperlink, MergedRegion, PackagePart, RowFormat,
    Sheet,
};

pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Everything read from one worksheet part
#[derive(Debug, Default)]
pub struct ParsedSheet {
    pub prefix: Option<String>,
    pub cells: BTreeMap<(u32, u32), Cell>,
    pub rows: BTreeMap<u32, RowFormat>,
    pub merged_cells: Vec<MergedRegion>,
    pub columns: Vec<ColumnRange>,
    pub hyperlinks: Vec<Hyperlink>,
}

/// Master cell of a shared formula group
struct SharedFormula {
    formula: String,
    row: u32,
    col: u32,
}

pub struct XlsxReader<'a> {
    parts: &'a [PackagePart],
    shared_strings: Vec<String>,
}

impl<'a> XlsxReader<'a> {
    pub fn new(parts: &'a [PackagePart]) -> Result<Self> {
        let shared_strings = match find_part(parts, SHARED_STRINGS_PART) {
            Some(part) => extract_shared_strings(&part.data)
                .context("Failed to read shared strings")?,
            None => Vec::new(),
        };
        Ok(Self {
            parts,
            shared_strings,
        })
    }

    pub fn read_sheets(&self) -> Result<Vec<Sheet>> {
        let workbook_xml = find_part(self.parts, WORKBOOK_PART)
            .ok_or_else(|| anyhow!("Failed to find {}", WORKBOOK_PART))?;
        let entries = parse_sheet_entries(&workbook_xml.data)?;

        let rels = match find_part(self.parts, WORKBOOK_RELS_PART) {
            Some(part) => parse_relationships(&part.data)?,
            None => HashMap::new(),
        };

        let mut sheets = Vec::with_capacity(entries.len());
        for (name, rid) in entries {
            let target = rels.get(&rid).ok_or_else(|| {
                anyhow!("Relationship '{}' not found for sheet '{}'", rid, name)
            })?;
            let path = resolve_target("xl", target);
            let part = find_part(self.parts, &path)
                .ok_or_else(|| anyhow!("Worksheet part '{}' for sheet '{}' is missing", path, name))?;

            let parsed = parse_sheet_xml(&part.data, &self.shared_strings)
                .with_context(|| format!("Failed to parse sheet '{}'", name))?;

            let mut sheet = Sheet::new(name);
            sheet.part_name = Some(path);
            sheet.load(parsed);
            sheets.push(sheet);
        }

        Ok(sheets)
    }
}

pub fn find_part<'p>(parts: &'p [PackagePart], name: &str) -> Option<&'p PackagePart> {
    parts.iter().find(|p| p.name == name)
}

/// Resolve a relationship target against the directory of its source part
pub fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Sheet (name, relationship id) pairs in workbook order
fn parse_sheet_entries(xml: &[u8]) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut entries = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = String::new();
                let mut rid = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"name" => name = attr.unescape_value()?.to_string(),
                        _ if attr.key.local_name().as_ref() == b"id" => {
                            rid = attr.unescape_value()?.to_string()
                        }
                        _ => {}
                    }
                }
                entries.push((name, rid));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(entries)
}

/// Map relationship ids to their targets
fn parse_relationships(xml: &[u8]) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut rels = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = String::new();
                let mut target = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = attr.unescape_value()?.to_string(),
                        b"Target" => target = attr.unescape_value()?.to_string(),
                        _ => {}
                    }
                }
                rels.insert(id, target);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

pub fn extract_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" if !in_phonetic => current.push_str(&read_text_node(&mut reader)?),
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Parse the grid, row formats, column formats, merges and hyperlinks of a worksheet
pub fn parse_sheet_xml(xml: &[u8], shared_strings: &[String]) -> Result<ParsedSheet> {
    let mut parsed = ParsedSheet::default();
    let mut shared_formulas: HashMap<u32, SharedFormula> = HashMap::new();

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut current_row = 0u32;
    let mut current_col = 0u32;

    loop {
        buf.clear();
        let (e, has_body) = match reader.read_event_into(&mut buf)? {
            Event::Start(e) => (e.into_owned(), true),
            Event::Empty(e) => (e.into_owned(), false),
            Event::Eof => break,
            _ => continue,
        };

        match e.local_name().as_ref() {
            b"worksheet" => {
                parsed.prefix = e
                    .name()
                    .prefix()
                    .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
            }
            b"col" => {
                if let Some(range) = parse_column_range(&e)? {
                    parsed.columns.push(range);
                }
            }
            b"row" => {
                let mut attrs = Vec::new();
                let mut row = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"r" => row = attr.unescape_value()?.parse::<u32>().ok(),
                        b"spans" => {}
                        key => attrs.push((
                            String::from_utf8_lossy(key).into_owned(),
                            attr.unescape_value()?.into_owned(),
                        )),
                    }
                }
                current_row = row.unwrap_or(current_row + 1);
                current_col = 0;
                if !attrs.is_empty() {
                    parsed.rows.insert(current_row, RowFormat { attrs });
                }
            }
            b"c" => {
                let mut position = None;
                let mut style = None;
                let mut cell_type = String::new();
                let mut attrs = Vec::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"r" => position = parse_cell_ref(&attr.unescape_value()?),
                        b"s" => style = attr.unescape_value()?.parse::<u32>().ok(),
                        key => {
                            let value = attr.unescape_value()?.into_owned();
                            if key == b"t" {
                                cell_type = value.clone();
                            }
                            attrs.push((String::from_utf8_lossy(key).into_owned(), value));
                        }
                    }
                }

                let (row, col) = position.unwrap_or((current_row.max(1), current_col + 1));
                current_row = row;
                current_col = col;

                let (value, inner) = if has_body {
                    read_cell_contents(
                        &mut reader,
                        &cell_type,
                        (row, col),
                        shared_strings,
                        &mut shared_formulas,
                    )?
                } else {
                    (CellValue::Empty, String::new())
                };

                parsed.cells.insert(
                    (row, col),
                    Cell::decoded(value, style, CellMarkup { attrs, inner }),
                );
            }
            b"mergeCell" => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"ref" {
                        let reference = attr.unescape_value()?;
                        match parse_cell_range(&reference) {
                            Some((min_row, min_col, max_row, max_col)) => parsed
                                .merged_cells
                                .push(MergedRegion::new(min_row, min_col, max_row, max_col)),
                            None => warn!("Ignoring unreadable merged range '{}'", reference),
                        }
                    }
                }
            }
            b"hyperlink" => {
                if let Some(link) = parse_hyperlink(&e)? {
                    parsed.hyperlinks.push(link);
                }
            }
            _ => {}
        }
    }

    Ok(parsed)
}

fn parse_hyperlink(e: &BytesStart) -> Result<Option<Hyperlink>> {
    let mut range = None;
    let mut reference = String::new();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"ref" => {
                reference = attr.unescape_value()?.into_owned();
                range = parse_cell_range(&reference);
            }
            key => attrs.push((
                String::from_utf8_lossy(key).into_owned(),
                attr.unescape_value()?.into_owned(),
            )),
        }
    }

    match range {
        Some((min_row, min_col, max_row, max_col)) => Ok(Some(Hyperlink {
            min_row,
            min_col,
            max_row,
            max_col,
            attrs,
        })),
        None => {
            warn!("Ignoring hyperlink with unreadable range '{}'", reference);
            Ok(None)
        }
    }
}

fn parse_column_range(e: &BytesStart) -> Result<Option<ColumnRange>> {
    let mut min = None;
    let mut max = None;
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"min" => min = attr.unescape_value()?.parse::<u32>().ok(),
            b"max" => max = attr.unescape_value()?.parse::<u32>().ok(),
            key => attrs.push((
                String::from_utf8_lossy(key).into_owned(),
                attr.unescape_value()?.into_owned(),
            )),
        }
    }

    match (min, max) {
        (Some(min), Some(max)) if min >= 1 && min <= max => Ok(Some(ColumnRange { min, max, attrs })),
        _ => {
            warn!("Ignoring column format without a valid min/max range");
            Ok(None)
        }
    }
}

/// Read the children of a `<c>` element up to its end tag.
///
/// Returns the decoded value and the children serialized back to XML. Shared
/// formulas are written out as standalone formulas so the cell no longer
/// depends on its group's master cell.
fn read_cell_contents<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    cell_type: &str,
    (row, col): (u32, u32),
    shared_strings: &[String],
    shared_formulas: &mut HashMap<u32, SharedFormula>,
) -> Result<(CellValue, String)> {
    let mut inner = Writer::new(Vec::new());
    let mut buf = Vec::new();
    let mut raw_value: Option<String> = None;
    let mut formula: Option<String> = None;
    let mut inline_text: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"v" => {
                let text = read_text_node(reader)?;
                write_text_element(&mut inner, e.into_owned(), &text)?;
                raw_value = Some(text);
            }
            Event::Start(e) if e.local_name().as_ref() == b"f" => {
                let e = e.into_owned();
                let text = read_text_node(reader)?;
                formula = Some(write_formula(
                    &mut inner,
                    e,
                    text,
                    (row, col),
                    shared_formulas,
                )?);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"f" => {
                formula = Some(write_formula(
                    &mut inner,
                    e.into_owned(),
                    String::new(),
                    (row, col),
                    shared_formulas,
                )?);
            }
            Event::Start(e) if e.local_name().as_ref() == b"is" => {
                inner.write_event(Event::Start(e.into_owned()))?;
                inline_text = Some(copy_inline_string(reader, &mut inner)?);
            }
            Event::End(e) if e.local_name().as_ref() == b"c" => break,
            Event::Eof => bail!(
                "Unexpected end of worksheet inside cell {}",
                format_cell_ref(row, col)
            ),
            other => inner.write_event(other)?,
        }
        buf.clear();
    }

    let value = match cell_type {
        "s" => match raw_value.as_deref().map(str::trim).map(str::parse::<usize>) {
            Some(Ok(idx)) => CellValue::Text(shared_strings.get(idx).cloned().ok_or_else(|| {
                anyhow!(
                    "Cell {} refers to missing shared string {}",
                    format_cell_ref(row, col),
                    idx
                )
            })?),
            _ => CellValue::Empty,
        },
        "inlineStr" => inline_text.map(CellValue::Text).unwrap_or_default(),
        "b" => CellValue::Boolean(raw_value.as_deref() == Some("1")),
        "e" => raw_value.map(CellValue::Error).unwrap_or_default(),
        "str" => raw_value.map(CellValue::Text).unwrap_or_default(),
        _ => match raw_value {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Text(raw),
            },
            None => CellValue::Empty,
        },
    };

    let value = match formula.filter(|f| !f.is_empty()) {
        Some(formula) => CellValue::Formula {
            formula,
            cached: (!value.is_empty()).then(|| value.to_string()),
        },
        None => value,
    };

    Ok((value, String::from_utf8(inner.into_inner())?))
}

/// Write an `<f>` element and return the formula text it carries
fn write_formula<W: std::io::Write>(
    writer: &mut Writer<W>,
    element: BytesStart<'static>,
    text: String,
    (row, col): (u32, u32),
    shared_formulas: &mut HashMap<u32, SharedFormula>,
) -> Result<String> {
    let mut is_shared = false;
    let mut shared_index = None;
    for attr in element.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"t" => is_shared = attr.value.as_ref() == b"shared",
            b"si" => shared_index = attr.unescape_value()?.parse::<u32>().ok(),
            _ => {}
        }
    }

    let Some(si) = shared_index.filter(|_| is_shared) else {
        if text.is_empty() {
            writer.write_event(Event::Empty(element))?;
        } else {
            write_text_element(writer, element, &text)?;
        }
        return Ok(text);
    };

    let resolved = if !text.is_empty() {
        shared_formulas.insert(
            si,
            SharedFormula {
                formula: text.clone(),
                row,
                col,
            },
        );
        text
    } else if let Some(master) = shared_formulas.get(&si) {
        translate_shared_formula(
            &master.formula,
            row as i64 - master.row as i64,
            col as i64 - master.col as i64,
        )
    } else {
        debug!(
            "Shared formula {} used at {} before its master cell, keeping it as is",
            si,
            format_cell_ref(row, col)
        );
        writer.write_event(Event::Empty(element))?;
        return Ok(String::new());
    };

    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    write_text_element(writer, BytesStart::new(name), &resolved)?;
    Ok(resolved)
}

/// Copy the rest of an `<is>` element, returning its visible text
fn copy_inline_string<R: std::io::BufRead, W: std::io::Write>(
    reader: &mut Reader<R>,
    writer: &mut Writer<W>,
) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 0usize;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        let mut finished = false;
        match &event {
            Event::Start(e) => {
                depth += 1;
                match e.local_name().as_ref() {
                    b"t" => in_text = true,
                    b"rPh" => in_phonetic = true,
                    _ => {}
                }
            }
            Event::End(_) if depth == 0 => finished = true,
            Event::End(e) => {
                depth -= 1;
                match e.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"rPh" => in_phonetic = false,
                    _ => {}
                }
            }
            Event::Text(t) if in_text && !in_phonetic => text.push_str(&t.unescape()?),
            Event::Eof => bail!("Unexpected end of worksheet inside inline string"),
            _ => {}
        }
        writer.write_event(event)?;
        if finished {
            break;
        }
        buf.clear();
    }

    Ok(text)
}

/// Write `<name attrs>text</name>`
pub(crate) fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    start: BytesStart<'_>,
    text: &str,
) -> Result<()> {
    let end = start.to_end().into_owned();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(end))?;
    Ok(())
}
