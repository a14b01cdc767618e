#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

pub const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

const WORKSHEET_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";

/// A worksheet for the mock package: its name and the children of `<worksheet>`
pub struct MockSheet {
    pub name: String,
    pub body: String,
}

impl MockSheet {
    pub fn new(name: &str, body: &str) -> Self {
        Self {
            name: name.to_string(),
            body: body.to_string(),
        }
    }

    /// A sheet with one row of inline strings starting at A1
    pub fn with_header(name: &str, headers: &[&str]) -> Self {
        Self::new(name, &format!("<sheetData>{}</sheetData>", inline_row(1, headers)))
    }
}

/// `<row>` of inline string cells starting in column A
pub fn inline_row(row: u32, values: &[&str]) -> String {
    let cells: String = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            format!(
                r#"<c r="{}{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                column_letter(i as u32 + 1),
                row,
                v
            )
        })
        .collect();
    format!(r#"<row r="{}">{}</row>"#, row, cells)
}

fn column_letter(col: u32) -> char {
    (b'A' + (col - 1) as u8) as char
}

/// Options for the parts that surround the worksheets
#[derive(Default)]
pub struct MockOptions<'a> {
    pub shared_strings: &'a [&'a str],
    pub calc_chain: bool,
}

/// Build a minimal but complete XLSX package in memory
pub fn create_mock_xlsx(sheets: &[MockSheet], options: &MockOptions) -> anyhow::Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let file_options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    // 1. [Content_Types].xml
    zip.start_file("[Content_Types].xml", file_options)?;
    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    );
    for i in 0..sheets.len() {
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="{}"/>"#,
            i + 1,
            WORKSHEET_CONTENT_TYPE
        ));
    }
    if !options.shared_strings.is_empty() {
        content_types.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#);
    }
    if options.calc_chain {
        content_types.push_str(r#"<Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/>"#);
    }
    content_types.push_str("</Types>");
    zip.write_all(content_types.as_bytes())?;

    // 2. _rels/.rels
    zip.start_file("_rels/.rels", file_options)?;
    zip.write_all(br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#)?;

    // 3. xl/workbook.xml
    zip.start_file("xl/workbook.xml", file_options)?;
    let mut workbook_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    for (i, sheet) in sheets.iter().enumerate() {
        workbook_xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            sheet.name,
            i + 1,
            i + 1
        ));
    }
    workbook_xml.push_str("</sheets></workbook>");
    zip.write_all(workbook_xml.as_bytes())?;

    // 4. xl/_rels/workbook.xml.rels
    zip.start_file("xl/_rels/workbook.xml.rels", file_options)?;
    let mut rels_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for i in 0..sheets.len() {
        rels_xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i + 1,
            i + 1
        ));
    }
    let next_id = sheets.len() + 1;
    rels_xml.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
        next_id
    ));
    if !options.shared_strings.is_empty() {
        rels_xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#,
            next_id + 1
        ));
    }
    if options.calc_chain {
        rels_xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/>"#,
            next_id + 2
        ));
    }
    rels_xml.push_str("</Relationships>");
    zip.write_all(rels_xml.as_bytes())?;

    // 5. xl/styles.xml with a bold font at style index 1 and a date format at 2
    zip.start_file("xl/styles.xml", file_options)?;
    zip.write_all(br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="1"><border/></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/><xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs></styleSheet>"#)?;

    // 6. xl/sharedStrings.xml
    if !options.shared_strings.is_empty() {
        zip.start_file("xl/sharedStrings.xml", file_options)?;
        let mut sst = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#,
            options.shared_strings.len()
        );
        for s in options.shared_strings {
            sst.push_str(&format!("<si><t>{}</t></si>", s));
        }
        sst.push_str("</sst>");
        zip.write_all(sst.as_bytes())?;
    }

    // 7. xl/calcChain.xml
    if options.calc_chain {
        zip.start_file(CALC_CHAIN_PART, file_options)?;
        zip.write_all(br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="D2" i="1"/></calcChain>"#)?;
    }

    // 8. sheets
    for (i, sheet) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), file_options)?;
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">{}</worksheet>"#,
            sheet.body
        );
        zip.write_all(xml.as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Names of all files in a package, in archive order
pub fn part_names(data: &[u8]) -> anyhow::Result<Vec<String>> {
    let archive = ZipArchive::new(Cursor::new(data))?;
    Ok(archive.file_names().map(str::to_string).collect::<Vec<_>>())
}

/// Raw bytes of one part, `None` when the package lacks it
pub fn read_part(data: &[u8], name: &str) -> anyhow::Result<Option<Vec<u8>>> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(Some(content))
}

pub fn read_part_string(data: &[u8], name: &str) -> anyhow::Result<String> {
    let bytes = read_part(data, name)?
        .ok_or_else(|| anyhow::anyhow!("part {} is missing", name))?;
    Ok(String::from_utf8(bytes)?)
}
