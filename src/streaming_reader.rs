//! Streaming reader for XLSX files
//!
//! The shared strings table and the sheet list are loaded up front; worksheet XML
//! is then pulled from the archive in fixed-size chunks and cut into `<row>`
//! elements as they become complete, so memory stays proportional to the
//! longest row rather than the sheet.
//!
//! Only what a data import needs is decoded: shared strings (plain and rich
//! text), inline strings, and raw cell values. Styles, formulas and number
//! formats are ignored; a formula cell yields its cached value.

use crate::error::{ImportError, Result};
use crate::types::{CellValue, Row};
use std::borrow::Cow;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

const CHUNK_SIZE: usize = 64 * 1024;

/// Columns in a worksheet (A..=XFD)
const MAX_COLUMNS: usize = 16_384;

/// Streaming reader for XLSX files
///
/// # Example
///
/// ```no_run
/// use poi_import::streaming_reader::StreamingReader;
///
/// let mut reader = StreamingReader::open("kV_list.xlsx")?;
/// for row in reader.rows_by_index(0)? {
///     let row = row?;
///     println!("Row {}: {:?}", row.number(), row.cells);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct StreamingReader {
    archive: ZipArchive<File>,
    sst: Vec<String>,
    sheet_names: Vec<String>,
    sheet_paths: Vec<String>,
}

impl StreamingReader {
    /// Open an XLSX file, loading its shared strings and sheet list
    ///
    /// A missing file is reported as [`ImportError::InputNotFound`]; anything
    /// that is not a readable workbook is a [`ImportError::ReadError`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ImportError::InputNotFound(path.to_path_buf()),
            _ => ImportError::ReadError(format!("Failed to open {}: {}", path.display(), e)),
        })?;

        let mut archive = ZipArchive::new(file)
            .map_err(|e| ImportError::ReadError(format!("Failed to read ZIP: {}", e)))?;

        let sst = Self::load_shared_strings(&mut archive)?;
        debug!(count = sst.len(), "loaded shared strings");

        let (sheet_names, sheet_paths) = Self::load_sheet_info(&mut archive)?;
        debug!(sheets = ?sheet_names, "loaded workbook sheet list");

        Ok(StreamingReader {
            archive,
            sst,
            sheet_names,
            sheet_paths,
        })
    }

    /// Names of all worksheets, in workbook order
    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    /// Stream rows of the sheet at `sheet_index` (0 = first sheet)
    pub fn rows_by_index(&mut self, sheet_index: usize) -> Result<RowIterator<'_>> {
        let path = self.sheet_paths.get(sheet_index).cloned().ok_or_else(|| {
            ImportError::ReadError(format!(
                "Sheet index {} out of bounds. Available: {} sheets",
                sheet_index,
                self.sheet_names.len()
            ))
        })?;

        self.open_sheet(&path)
    }

    /// Stream rows of the sheet called `sheet_name`
    pub fn rows(&mut self, sheet_name: &str) -> Result<RowIterator<'_>> {
        let path = self
            .sheet_names
            .iter()
            .position(|name| name == sheet_name)
            .and_then(|idx| self.sheet_paths.get(idx))
            .cloned()
            .ok_or_else(|| {
                ImportError::ReadError(format!(
                    "Sheet '{}' not found. Available sheets: {:?}",
                    sheet_name, self.sheet_names
                ))
            })?;

        self.open_sheet(&path)
    }

    fn open_sheet(&mut self, path: &str) -> Result<RowIterator<'_>> {
        let sheet_file = self
            .archive
            .by_name(path)
            .map_err(|e| ImportError::ReadError(format!("Failed to open {}: {}", path, e)))?;

        Ok(RowIterator::new(Box::new(sheet_file), &self.sst, CHUNK_SIZE))
    }

    /// Load the shared strings table; a workbook without one uses inline strings only
    fn load_shared_strings(archive: &mut ZipArchive<File>) -> Result<Vec<String>> {
        let xml = match read_entry(archive, "xl/sharedStrings.xml")? {
            Some(xml) => xml,
            None => return Ok(Vec::new()),
        };

        let mut sst = Vec::new();
        let mut pos = 0;
        while let Some((si, end)) = next_element(&xml, "si", pos) {
            sst.push(collect_text(si.body));
            pos = end;
        }

        Ok(sst)
    }

    /// Resolve sheet names to worksheet paths via workbook.xml and its relationships
    fn load_sheet_info(archive: &mut ZipArchive<File>) -> Result<(Vec<String>, Vec<String>)> {
        let workbook = read_entry(archive, "xl/workbook.xml")?
            .ok_or_else(|| ImportError::ReadError("Missing xl/workbook.xml".to_string()))?;
        let rels = read_entry(archive, "xl/_rels/workbook.xml.rels")?.ok_or_else(|| {
            ImportError::ReadError("Missing xl/_rels/workbook.xml.rels".to_string())
        })?;

        // <Relationship Id="rId1" Type="..." Target="worksheets/sheet1.xml"/>
        let mut targets = Vec::new();
        let mut pos = 0;
        while let Some((rel, end)) = next_element(&rels, "Relationship", pos) {
            if let (Some(id), Some(target)) = (attr(rel.open, "Id"), attr(rel.open, "Target")) {
                targets.push((id, target));
            }
            pos = end;
        }

        // <sheet name="Sheet1" sheetId="1" r:id="rId1"/>
        let mut sheet_names = Vec::new();
        let mut sheet_paths = Vec::new();
        let mut pos = 0;
        while let Some((sheet, end)) = next_element(&workbook, "sheet", pos) {
            pos = end;
            let (Some(name), Some(rid)) = (attr(sheet.open, "name"), attr(sheet.open, "r:id"))
            else {
                continue;
            };
            let target = targets
                .iter()
                .find(|(id, _)| *id == rid)
                .map(|(_, target)| *target)
                .ok_or_else(|| {
                    ImportError::ReadError(format!("No relationship {} for sheet '{}'", rid, name))
                })?;

            sheet_names.push(decode_xml_entities(name).into_owned());
            sheet_paths.push(resolve_target(target));
        }

        Ok((sheet_names, sheet_paths))
    }
}

/// Read a whole archive entry as UTF-8; `None` when the entry does not exist
fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Option<String>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ImportError::ReadError(format!("Failed to read {}: {}", name, e)))?;
    Ok(Some(xml))
}

// Relationship targets are relative to xl/ unless absolute within the package
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

/// Iterator over the rows of one worksheet
pub struct RowIterator<'a> {
    source: Box<dyn Read + 'a>,
    sst: &'a [String],
    chunk_size: usize,
    buffer: String,
    // Incomplete UTF-8 sequence left at the end of the last chunk
    carry: Vec<u8>,
    next_index: u32,
    eof: bool,
}

impl<'a> RowIterator<'a> {
    pub(crate) fn new(source: Box<dyn Read + 'a>, sst: &'a [String], chunk_size: usize) -> Self {
        RowIterator {
            source,
            sst,
            chunk_size,
            buffer: String::new(),
            carry: Vec::new(),
            next_index: 0,
            eof: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = vec![0u8; self.chunk_size];
        let n = self.source.read(&mut chunk)?;
        if n == 0 {
            self.eof = true;
            if !self.carry.is_empty() {
                return Err(ImportError::ReadError(
                    "Worksheet ends inside a UTF-8 sequence".to_string(),
                ));
            }
            return Ok(());
        }

        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(&chunk[..n]);

        match std::str::from_utf8(&bytes) {
            Ok(text) => self.buffer.push_str(text),
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                // valid_up_to marks a char boundary, so this cannot fail
                self.buffer
                    .push_str(std::str::from_utf8(&bytes[..valid]).unwrap_or_default());
                self.carry = bytes[valid..].to_vec();
            }
            Err(e) => {
                return Err(ImportError::ReadError(format!(
                    "Worksheet is not valid UTF-8: {}",
                    e
                )))
            }
        }

        Ok(())
    }
}

impl<'a> Iterator for RowIterator<'a> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.buffer.find("<row") {
                Some(start) => {
                    if let Some((row, end)) = next_element(&self.buffer, "row", start) {
                        let row = parse_row(&row, self.sst, &mut self.next_index);
                        self.buffer.drain(..end);
                        if row.is_err() {
                            self.eof = true;
                        }
                        return Some(row);
                    }
                    // Row not complete yet, drop everything before it
                    self.buffer.drain(..start);
                }
                None => {
                    // Keep a short tail in case "<row" straddles the chunk boundary
                    let mut cut = self.buffer.len().saturating_sub(4);
                    while !self.buffer.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    self.buffer.drain(..cut);
                }
            }

            if self.eof {
                return None;
            }
            if let Err(e) = self.fill() {
                self.eof = true;
                return Some(Err(e));
            }
        }
    }
}

/// One XML element: its start tag and the text between start and end tags
struct Element<'x> {
    open: &'x str,
    body: &'x str,
}

/// Find the next `<tag ...>...</tag>` (or self-closing `<tag .../>`) at or after `from`
///
/// Returns the element and the byte offset just past it, or `None` if no
/// complete element is present.
fn next_element<'x>(xml: &'x str, tag: &str, from: usize) -> Option<(Element<'x>, usize)> {
    let pattern = format!("<{}", tag);
    let mut pos = from;

    loop {
        let start = pos + xml.get(pos..)?.find(&pattern)?;
        let after = start + pattern.len();

        // Reject longer names sharing the prefix, e.g. <rowBreaks> for <row>
        match xml[after..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_ascii_whitespace() => {}
            Some(_) => {
                pos = after;
                continue;
            }
            None => return None,
        }

        let open_end = after + xml[after..].find('>')? + 1;
        let open = &xml[start..open_end];
        if open.ends_with("/>") {
            return Some((Element { open, body: "" }, open_end));
        }

        let close = format!("</{}>", tag);
        let body_end = open_end + xml[open_end..].find(&close)?;
        return Some((
            Element {
                open,
                body: &xml[open_end..body_end],
            },
            body_end + close.len(),
        ));
    }
}

/// Value of attribute `name` in a start tag
fn attr<'x>(open: &'x str, name: &str) -> Option<&'x str> {
    let pattern = format!("{}=\"", name);
    let mut from = 0;

    while let Some(found) = open[from..].find(&pattern) {
        let at = from + found;
        let value_start = at + pattern.len();
        let standalone = open[..at]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_whitespace());
        if standalone {
            let len = open[value_start..].find('"')?;
            return Some(&open[value_start..value_start + len]);
        }
        from = value_start;
    }

    None
}

/// Concatenate the text of every `<t>` run inside an `<si>` or `<is>` body
fn collect_text(body: &str) -> String {
    let mut text = String::new();
    let mut pos = 0;
    while let Some((t, end)) = next_element(body, "t", pos) {
        text.push_str(&decode_xml_entities(t.body));
        pos = end;
    }
    text
}

fn parse_row(row: &Element<'_>, sst: &[String], next_index: &mut u32) -> Result<Row> {
    let index = attr(row.open, "r")
        .and_then(|r| r.parse::<u32>().ok())
        .and_then(|r| r.checked_sub(1))
        .unwrap_or(*next_index);
    *next_index = index.saturating_add(1);

    let mut cells: Vec<CellValue> = Vec::new();
    let mut pos = 0;
    while let Some((cell, end)) = next_element(row.body, "c", pos) {
        pos = end;
        let col = match attr(cell.open, "r") {
            Some(reference) => parse_column_index(reference).ok_or_else(|| {
                ImportError::ReadError(format!(
                    "Invalid cell reference '{}' in row {}",
                    reference,
                    index.saturating_add(1)
                ))
            })?,
            None => cells.len(),
        };

        if cells.len() <= col {
            cells.resize(col + 1, CellValue::Empty);
        }
        cells[col] = cell_value(&cell, sst);
    }

    Ok(Row::new(index, cells))
}

fn cell_value(cell: &Element<'_>, sst: &[String]) -> CellValue {
    let raw = || {
        next_element(cell.body, "v", 0)
            .map(|(v, _)| decode_xml_entities(v.body).into_owned())
            .unwrap_or_default()
    };

    match attr(cell.open, "t") {
        Some("s") => raw()
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|idx| sst.get(idx))
            .map(|s| CellValue::from_raw(s.clone()))
            .unwrap_or(CellValue::Empty),
        Some("inlineStr") => next_element(cell.body, "is", 0)
            .map(|(is, _)| CellValue::from_raw(collect_text(is.body)))
            .unwrap_or(CellValue::Empty),
        None | Some("n") => {
            let raw = raw();
            match raw.trim().parse::<f64>() {
                Ok(number) => CellValue::Float(number),
                Err(_) => CellValue::from_raw(raw),
            }
        }
        // str (formula text), b (boolean), e (error such as #N/A)
        Some(_) => CellValue::from_raw(raw()),
    }
}

// Decode XML entities: the five predefined ones plus numeric character references
fn decode_xml_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

// Parse column index from cell reference (e.g., "A1" -> 0, "B1" -> 1, "AA1" -> 26)
// None when the reference has no column letters or lies past XFD
fn parse_column_index(cell_ref: &str) -> Option<usize> {
    let mut col_idx = 0usize;
    for ch in cell_ref.chars().take_while(|ch| ch.is_ascii_alphabetic()) {
        let digit = ch.to_ascii_uppercase() as usize - 'A' as usize + 1;
        col_idx = col_idx.checked_mul(26)?.checked_add(digit)?;
        if col_idx > MAX_COLUMNS {
            return None;
        }
    }
    col_idx.checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn rows_of(xml: &str, sst: &[String], chunk_size: usize) -> Vec<Row> {
        let source = Box::new(Cursor::new(xml.as_bytes().to_vec()));
        RowIterator::new(source, sst, chunk_size)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_parse_column_index() {
        assert_eq!(parse_column_index("A1"), Some(0));
        assert_eq!(parse_column_index("b7"), Some(1));
        assert_eq!(parse_column_index("AA10"), Some(26));
        assert_eq!(parse_column_index("XFD1048576"), Some(16_383));
        assert_eq!(parse_column_index("XFE1"), None);
        assert_eq!(parse_column_index("ZZZZZZZZZZZZZZZ1"), None);
        assert_eq!(parse_column_index("17"), None);
    }

    #[test]
    fn test_cell_reference_past_last_column_is_read_error() {
        let xml = concat!(
            r#"<sheetData><row r="1"><c r="A1"><v>1</v></c></row>"#,
            r#"<row r="2"><c r="ZZZZZZ2"><v>1</v></c></row>"#,
            r#"<row r="3"><c r="A3"><v>3</v></c></row></sheetData>"#
        );
        let source = Box::new(Cursor::new(xml.as_bytes().to_vec()));
        let mut rows = RowIterator::new(source, &[], CHUNK_SIZE);

        assert_eq!(rows.next().unwrap().unwrap().cells, vec![CellValue::Float(1.0)]);
        match rows.next() {
            Some(Err(ImportError::ReadError(msg))) => {
                assert!(msg.contains("ZZZZZZ2"), "{}", msg);
                assert!(msg.contains("row 2"), "{}", msg);
            }
            other => panic!("expected a read error, got {:?}", other),
        }
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_decode_xml_entities() {
        assert_eq!(decode_xml_entities("Plain"), "Plain");
        assert_eq!(decode_xml_entities("A &amp; B &lt;C&gt;"), "A & B <C>");
        assert_eq!(decode_xml_entities("&#233;t&#xE9;"), "été");
        assert_eq!(decode_xml_entities("R&D; 5 & 6"), "R&D; 5 & 6");
    }

    #[test]
    fn test_attr_requires_whole_name() {
        let open = r#"<sheet name="Projects" sheetId="1" r:id="rId3"/>"#;
        assert_eq!(attr(open, "name"), Some("Projects"));
        assert_eq!(attr(open, "r:id"), Some("rId3"));
        assert_eq!(attr(open, "id"), None);
    }

    #[test]
    fn test_rich_text_shared_string() {
        let body = r#"<r><rPr><b/></rPr><t>Alpha</t></r><r><t xml:space="preserve"> Solar</t></r>"#;
        assert_eq!(collect_text(body), "Alpha Solar");
    }

    #[test]
    fn test_rows_with_mixed_cell_kinds() {
        let sst = vec!["Project Name".to_string(), "Beta Wind".to_string()];
        let xml = concat!(
            r#"<worksheet><sheetData>"#,
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>POI Voltage (KV)</t></is></c></row>"#,
            r#"<row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2"><v>115</v></c></row>"#,
            r#"<row r="3" spans="1:3"><c r="A3" s="2"/><c r="C3" t="str"><f>A1</f><v>n/a</v></c></row>"#,
            r#"<row r="5"/>"#,
            r#"</sheetData><rowBreaks count="0"/></worksheet>"#
        );

        let rows = rows_of(xml, &sst, CHUNK_SIZE);
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0].cells,
            vec![CellValue::from("Project Name"), CellValue::from("POI Voltage (KV)")]
        );
        assert_eq!(rows[1].get(0), Some(&CellValue::from("Beta Wind")));
        assert_eq!(rows[1].get(1), Some(&CellValue::Float(115.0)));
        assert_eq!(
            rows[2].cells,
            vec![CellValue::Empty, CellValue::Empty, CellValue::from("n/a")]
        );
        assert_eq!(rows[3].number(), 5);
        assert!(rows[3].is_empty());
    }

    #[test]
    fn test_small_chunks_split_tags_and_utf8() {
        let xml = concat!(
            r#"<sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>Ñandú Énergie</t></is></c>"#,
            r#"<c r="B1"><v>69</v></c></row><row r="2"><c r="A2" t="inlineStr"><is><t>Øst</t></is></c></row></sheetData>"#
        );

        for chunk_size in [1, 3, 7, 16] {
            let rows = rows_of(xml, &[], chunk_size);
            assert_eq!(rows.len(), 2, "chunk size {}", chunk_size);
            assert_eq!(
                rows[0].cells,
                vec![CellValue::from("Ñandú Énergie"), CellValue::Float(69.0)]
            );
            assert_eq!(rows[1].cells, vec![CellValue::from("Øst")]);
        }
    }

    #[test]
    fn test_rows_without_reference_are_numbered_sequentially() {
        let xml = r#"<sheetData><row><c><v>1</v></c></row><row><c><v>2</v></c></row></sheetData>"#;
        let rows = rows_of(xml, &[], CHUNK_SIZE);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[1].index, 1);
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_target("/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
    }
}
