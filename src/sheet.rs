//! Spreadsheet files: `.xlsx` (one sheet, written with inline strings) and
//! `.csv`. Reading `.xlsx` handles shared and inline strings, which covers
//! workbooks saved by the common office suites.

use anyhow::{anyhow, Context};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Xlsx,
    Csv,
    /// Legacy binary workbook; recognised so it can be refused clearly.
    Xls,
}

impl SheetFormat {
    pub fn from_path(path: &Path) -> Option<SheetFormat> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" => Some(SheetFormat::Xlsx),
            "csv" => Some(SheetFormat::Csv),
            "xls" => Some(SheetFormat::Xls),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Cell {
        Cell::Text(s.into())
    }

    fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
        }
    }
}

pub fn write_table(path: &Path, sheet_name: &str, rows: &[Vec<Cell>]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    match SheetFormat::from_path(path) {
        Some(SheetFormat::Xlsx) => write_xlsx(path, sheet_name, rows),
        Some(SheetFormat::Csv) => {
            std::fs::write(path, to_csv(rows))
                .with_context(|| format!("failed to write {}", path.to_string_lossy()))
        }
        _ => Err(anyhow!(
            "cannot write {}: use .xlsx or .csv",
            path.to_string_lossy()
        )),
    }
}

/// First worksheet as rows of strings; ragged rows are padded to the widest.
pub fn read_table(path: &Path) -> anyhow::Result<Vec<Vec<String>>> {
    let mut rows = match SheetFormat::from_path(path) {
        Some(SheetFormat::Xlsx) => read_xlsx(path)?,
        Some(SheetFormat::Csv) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
            parse_csv(text.trim_start_matches('\u{feff}'))
        }
        _ => {
            return Err(anyhow!(
                "cannot read {}: use .xlsx or .csv",
                path.to_string_lossy()
            ))
        }
    };
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for r in &mut rows {
        r.resize(width, String::new());
    }
    Ok(rows)
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn to_csv(rows: &[Vec<Cell>]) -> String {
    let mut out = String::new();
    for row in rows {
        let line = row
            .iter()
            .map(|c| csv_quote(&c.display()))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// RFC 4180-style parsing; quoted fields may span lines.
fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    buf.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                buf.push(ch);
            }
            continue;
        }
        match ch {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut buf)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut buf));
                rows.push(std::mem::take(&mut row));
            }
            _ => buf.push(ch),
        }
    }
    if !buf.is_empty() || !row.is_empty() {
        row.push(buf);
        rows.push(row);
    }
    rows.retain(|r| r.iter().any(|f| !f.trim().is_empty()));
    rows
}

fn column_letters(mut idx: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push((b'A' + (idx % 26) as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    out.iter().rev().collect()
}

/// Last column (`XFD`) and row an xlsx sheet can hold.
const MAX_COLUMN: usize = 16_383;
const MAX_ROW: usize = 1_048_576;

/// Zero-based column index of a cell reference such as `AB12`.
fn column_index(cell_ref: &str) -> anyhow::Result<Option<usize>> {
    let letters: Vec<u8> = cell_ref
        .bytes()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return Ok(None);
    }
    let mut n = 0usize;
    for c in letters {
        n = n
            .checked_mul(26)
            .and_then(|n| n.checked_add((c.to_ascii_uppercase() - b'A' + 1) as usize))
            .filter(|n| *n <= MAX_COLUMN + 1)
            .ok_or_else(|| anyhow!("cell reference {cell_ref} is past column XFD"))?;
    }
    Ok(Some(n - 1))
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r' => {}
            c => out.push(c),
        }
    }
    out
}

fn xml_unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|h| u32::from_str_radix(h, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=semi]),
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

fn workbook_xml(sheet_name: &str) -> String {
    // Excel caps sheet names at 31 characters.
    let name: String = sheet_name
        .chars()
        .filter(|c| !"[]:*?/\\".contains(*c))
        .take(31)
        .collect();
    let name = if name.trim().is_empty() { "Sheet1".to_string() } else { name };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        xml_escape(&name)
    )
}

fn sheet_xml(rows: &[Vec<Cell>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r_i, row) in rows.iter().enumerate() {
        let row_no = r_i + 1;
        xml.push_str(&format!(r#"<row r="{row_no}">"#));
        for (c_i, cell) in row.iter().enumerate() {
            let cell_ref = format!("{}{}", column_letters(c_i), row_no);
            match cell {
                Cell::Empty => {}
                Cell::Number(n) if n.is_finite() => {
                    xml.push_str(&format!(r#"<c r="{cell_ref}"><v>{n}</v></c>"#));
                }
                Cell::Number(n) => {
                    xml.push_str(&format!(
                        r#"<c r="{cell_ref}" t="inlineStr"><is><t>{n}</t></is></c>"#
                    ));
                }
                Cell::Text(s) => {
                    xml.push_str(&format!(
                        r#"<c r="{cell_ref}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                        xml_escape(s)
                    ));
                }
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn write_xlsx(path: &Path, sheet_name: &str, rows: &[Vec<Cell>]) -> anyhow::Result<()> {
    let out_file = File::create(path)
        .with_context(|| format!("failed to create output file {}", path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, String); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("xl/workbook.xml", workbook_xml(sheet_name)),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
        ("xl/worksheets/sheet1.xml", sheet_xml(rows)),
    ];
    for (name, body) in parts {
        zip.start_file(name, opts)
            .with_context(|| format!("failed to start entry {name}"))?;
        zip.write_all(body.as_bytes())
            .with_context(|| format!("failed to write entry {name}"))?;
    }
    zip.finish().context("failed to finalize workbook")?;
    Ok(())
}

struct Element<'a> {
    attrs: &'a str,
    inner: Option<&'a str>,
}

/// Non-nested elements named `name` in document order.
fn elements<'a>(xml: &'a str, name: &str) -> Vec<Element<'a>> {
    let open = format!("<{name}");
    let close = format!("</{name}>");
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(pos) = rest.find(&open) {
        let after = &rest[pos + open.len()..];
        match after.chars().next() {
            Some(c) if c.is_whitespace() || c == '>' || c == '/' => {}
            Some(_) => {
                rest = after;
                continue;
            }
            None => break,
        }
        let Some(gt) = after.find('>') else {
            break;
        };
        let head = &after[..gt];
        if let Some(attrs) = head.strip_suffix('/') {
            out.push(Element { attrs, inner: None });
            rest = &after[gt + 1..];
            continue;
        }
        let body = &after[gt + 1..];
        let Some(end) = body.find(&close) else {
            break;
        };
        out.push(Element {
            attrs: head,
            inner: Some(&body[..end]),
        });
        rest = &body[end + close.len()..];
    }
    out
}

fn attr<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=\"");
    let mut rest = attrs;
    while let Some(pos) = rest.find(&needle) {
        let preceded_ok = rest[..pos]
            .chars()
            .last()
            .map(char::is_whitespace)
            .unwrap_or(true);
        let value_start = &rest[pos + needle.len()..];
        if preceded_ok {
            let end = value_start.find('"')?;
            return Some(&value_start[..end]);
        }
        rest = value_start;
    }
    None
}

/// Concatenated `<t>` runs, which covers rich-text shared strings.
fn text_runs(xml: &str) -> String {
    elements(xml, "t")
        .iter()
        .filter_map(|e| e.inner)
        .map(xml_unescape)
        .collect()
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> anyhow::Result<Option<String>> {
    let mut entry = match archive.by_name(name) {
        Ok(e) => e,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to open entry {name}")),
    };
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .with_context(|| format!("failed to read entry {name}"))?;
    Ok(Some(text))
}

fn read_xlsx(path: &Path) -> anyhow::Result<Vec<Vec<String>>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open workbook {}", path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(file).context("not a valid xlsx (zip) file")?;

    let shared: Vec<String> = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => elements(&xml, "si")
            .iter()
            .map(|si| si.inner.map(text_runs).unwrap_or_default())
            .collect(),
        None => Vec::new(),
    };

    let sheet_name = {
        let mut names: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("xl/worksheets/") && n.ends_with(".xml"))
            .map(String::from)
            .collect();
        names.sort_by_key(|n| (n != "xl/worksheets/sheet1.xml", n.len(), n.clone()));
        names
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("workbook has no worksheets"))?
    };
    let sheet = read_entry(&mut archive, &sheet_name)?
        .ok_or_else(|| anyhow!("missing worksheet {sheet_name}"))?;

    let mut rows: Vec<Vec<String>> = Vec::new();
    for row in elements(&sheet, "row") {
        let row_no = attr(row.attrs, "r")
            .and_then(|r| r.parse::<usize>().ok())
            .unwrap_or(rows.len() + 1);
        if row_no > MAX_ROW {
            return Err(anyhow!("row {row_no} is past the last worksheet row"));
        }
        while rows.len() + 1 < row_no {
            rows.push(Vec::new());
        }
        let mut values: Vec<String> = Vec::new();
        for cell in elements(row.inner.unwrap_or(""), "c") {
            let col = match attr(cell.attrs, "r") {
                Some(r) => column_index(r)?.unwrap_or(values.len()),
                None => values.len(),
            };
            if col > MAX_COLUMN {
                return Err(anyhow!("row {row_no} has more than {} cells", MAX_COLUMN + 1));
            }
            let inner = cell.inner.unwrap_or("");
            let raw_v = elements(inner, "v")
                .first()
                .and_then(|v| v.inner)
                .map(xml_unescape)
                .unwrap_or_default();
            let value = match attr(cell.attrs, "t") {
                Some("s") => raw_v
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| shared.get(i).cloned())
                    .unwrap_or_default(),
                Some("inlineStr") => elements(inner, "is")
                    .first()
                    .and_then(|is| is.inner)
                    .map(text_runs)
                    .unwrap_or_default(),
                Some("b") => match raw_v.trim() {
                    "1" => "TRUE".to_string(),
                    _ => "FALSE".to_string(),
                },
                _ => raw_v,
            };
            if values.len() <= col {
                values.resize(col + 1, String::new());
            }
            values[col] = value;
        }
        rows.push(values);
    }
    rows.retain(|r| r.iter().any(|f| !f.trim().is_empty()));
    Ok(rows)
}
