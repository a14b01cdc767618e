//! Common parsing utilities for cell references and XML text nodes

use anyhow::Result;
use quick_xml::Reader;
use quick_xml::events::Event;

/// Parse a column name like "AB" into its 1-based number
pub fn column_number(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut col = 0u32;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col
            .checked_mul(26)?
            .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    Some(col)
}

/// Convert a 1-based column number to its letters (1 -> A, 27 -> AA)
pub fn column_letters(mut col: u32) -> String {
    let mut letters = String::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.insert(0, (b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    letters
}

/// Parse a cell reference like "A1" (or "$A$1") into 1-based (row, col)
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let cell_ref = cell_ref.replace('$', "");
    let split = cell_ref.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell_ref.split_at(split);

    let col = column_number(letters)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let row = digits.parse::<u32>().ok()?;
    if row == 0 {
        return None;
    }
    Some((row, col))
}

/// Parse a cell range like "A1:B2" into 1-based (min_row, min_col, max_row, max_col).
///
/// A single reference is read as a one-cell range.
pub fn parse_cell_range(range: &str) -> Option<(u32, u32, u32, u32)> {
    match range.split_once(':') {
        Some((start, end)) => {
            let (start_row, start_col) = parse_cell_ref(start)?;
            let (end_row, end_col) = parse_cell_ref(end)?;
            Some((start_row, start_col, end_row, end_col))
        }
        None => {
            let (row, col) = parse_cell_ref(range)?;
            Some((row, col, row, col))
        }
    }
}

pub fn format_cell_ref(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), row)
}

pub fn format_cell_range(min_row: u32, min_col: u32, max_row: u32, max_col: u32) -> String {
    format!(
        "{}:{}",
        format_cell_ref(min_row, min_col),
        format_cell_ref(max_row, max_col)
    )
}

/// Read text content up to the end of the current element
pub fn read_text_node<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(e.unescape()?.as_ref()),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::End(_) => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

/// Last column of a worksheet (XFD)
pub const MAX_COLUMNS: u32 = 16_384;
/// Last row of a worksheet
pub const MAX_ROWS: u32 = 1_048_576;

/// Move the relative references of a shared formula by the given offsets.
///
/// Absolute parts (`$A`, `$1`) stay put and text inside string literals is
/// left alone. A reference (or range) that would leave the grid becomes
/// `#REF!`.
pub fn translate_shared_formula(formula: &str, row_shift: i64, col_shift: i64) -> String {
    let mut translated = String::with_capacity(formula.len());
    let mut rest = formula;
    while let Some(quote) = rest.find('"') {
        translated.push_str(&shift_references(&rest[..quote], row_shift, col_shift));
        let literal = string_literal_len(&rest[quote..]);
        translated.push_str(&rest[quote..quote + literal]);
        rest = &rest[quote + literal..];
    }
    translated.push_str(&shift_references(rest, row_shift, col_shift));
    translated
}

/// Byte length of the string literal opening `text`, both quotes included.
/// `""` inside the literal is an escaped quote.
fn string_literal_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            if bytes.get(i + 1) == Some(&b'"') {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    // Unterminated: the rest of the formula is literal text
    bytes.len()
}

fn shift_references(text: &str, row_shift: i64, col_shift: i64) -> String {
    thread_local! {
        static RE: regex::Regex = regex::Regex::new(
            r"(?P<sheet>(?:'[^']+'|[A-Za-z0-9_\.\-]+)!)?(?P<start>\$?[A-Z]{1,3}\$?[0-9]+)(?::(?P<end>\$?[A-Z]{1,3}\$?[0-9]+))?\b"
        ).expect("shared formula pattern is valid");
    }
    RE.with(|re| {
        re.replace_all(text, |caps: &regex::Captures| {
            let whole = &caps[0];
            let span = caps.get(0).map_or(0..0, |m| m.range());

            // Tails of identifiers and function names such as LOG10( are not references
            let before = text[..span.start].chars().next_back();
            let after = text[span.end..].chars().next();
            if before.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
                || after == Some('(')
            {
                return whole.to_string();
            }

            let start = CellReference::parse(&caps["start"]);
            let end = caps.name("end").map(|m| CellReference::parse(m.as_str()));
            let (Some(start), Some(end)) = (start, end.unwrap_or(start)) else {
                return whole.to_string();
            };

            let sheet = caps.name("sheet").map_or("", |m| m.as_str());
            let shifted_start = start.shift(row_shift, col_shift);
            let shifted_end = match caps.name("end") {
                Some(_) => end.shift(row_shift, col_shift).map(Some),
                None => Some(None),
            };
            match (shifted_start, shifted_end) {
                (Some(first), Some(Some(last))) => format!("{sheet}{first}:{last}"),
                (Some(first), Some(None)) => format!("{sheet}{first}"),
                _ => format!("{sheet}#REF!"),
            }
        })
        .into_owned()
    })
}

/// One end of an A1 reference inside a formula
#[derive(Debug, Clone, Copy)]
struct CellReference {
    col: i64,
    col_abs: bool,
    row: i64,
    row_abs: bool,
}

impl CellReference {
    /// `None` when the text is not a reference on the grid (a name like `ZZZ1`)
    fn parse(text: &str) -> Option<Self> {
        let (col_abs, rest) = match text.strip_prefix('$') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let split = rest.find(|c: char| !c.is_ascii_alphabetic())?;
        let (letters, rest) = rest.split_at(split);
        let (row_abs, digits) = match rest.strip_prefix('$') {
            Some(digits) => (true, digits),
            None => (false, rest),
        };
        let col = column_number(letters).filter(|col| *col <= MAX_COLUMNS)?;
        let row = digits
            .parse::<u32>()
            .ok()
            .filter(|row| (1..=MAX_ROWS).contains(row))?;
        Some(Self {
            col: i64::from(col),
            col_abs,
            row: i64::from(row),
            row_abs,
        })
    }

    /// Render the moved reference, `None` once it falls off the grid
    fn shift(self, row_shift: i64, col_shift: i64) -> Option<String> {
        let col = if self.col_abs { self.col } else { self.col + col_shift };
        let row = if self.row_abs { self.row } else { self.row + row_shift };
        if !(1..=i64::from(MAX_COLUMNS)).contains(&col) || !(1..=i64::from(MAX_ROWS)).contains(&row)
        {
            return None;
        }

        let mut rendered = String::new();
        if self.col_abs {
            rendered.push('$');
        }
        rendered.push_str(&column_letters(col as u32));
        if self.row_abs {
            rendered.push('$');
        }
        rendered.push_str(&row.to_string());
        Some(rendered)
    }
}
