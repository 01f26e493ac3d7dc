//! Minimal reader for Office Open XML workbooks (`.xlsx`).
//!
//! Only the first worksheet is read, and only cell values are kept: styles,
//! formulas and number formats are ignored. Shared strings, inline strings and
//! cached formula results are resolved to text.

use std::io::{Cursor, Read, Seek};

use serde::Deserialize;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::data::{format_number, RawCell};
use crate::error::{ParseError, Result};

const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const SHEET_PREFIX: &str = "xl/worksheets/sheet";

/// Widest sheet Excel can produce (column `XFD`).
const MAX_COLUMNS: usize = 16_384;
/// Upper bound on any decompressed XML part.
const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

pub type SheetRows = Vec<Vec<Option<RawCell>>>;

#[derive(Deserialize)]
struct Workbook {
    #[serde(default)]
    sheets: Sheets,
}

#[derive(Deserialize, Default)]
struct Sheets {
    #[serde(rename = "sheet", default)]
    entries: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    // `r:id`; attribute prefixes are dropped when deserializing
    #[serde(rename = "@id", alias = "@r:id", default)]
    rel_id: Option<String>,
}

#[derive(Deserialize)]
struct Relationships {
    #[serde(rename = "Relationship", default)]
    entries: Vec<Relationship>,
}

#[derive(Deserialize)]
struct Relationship {
    #[serde(rename = "@Id")]
    id: String,
    #[serde(rename = "@Target")]
    target: String,
}

#[derive(Deserialize)]
struct SharedStrings {
    #[serde(rename = "si", default)]
    items: Vec<RichText>,
}

#[derive(Deserialize, Default)]
struct RichText {
    #[serde(default)]
    t: Option<Text>,
    #[serde(rename = "r", default)]
    runs: Vec<Run>,
}

#[derive(Deserialize)]
struct Run {
    #[serde(default)]
    t: Option<Text>,
}

#[derive(Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Deserialize)]
struct Worksheet {
    #[serde(rename = "sheetData", default)]
    sheet_data: SheetData,
}

#[derive(Deserialize, Default)]
struct SheetData {
    #[serde(rename = "row", default)]
    rows: Vec<Row>,
}

#[derive(Deserialize)]
struct Row {
    #[serde(rename = "c", default)]
    cells: Vec<Cell>,
}

#[derive(Deserialize)]
struct Cell {
    #[serde(rename = "@r", default)]
    reference: Option<String>,
    #[serde(rename = "@t", default)]
    kind: Option<String>,
    #[serde(default)]
    v: Option<String>,
    #[serde(default)]
    is: Option<RichText>,
}

/// Reads the first worksheet and splits it into a header row and data rows.
///
/// Leading blank rows are skipped and the first non-blank row is the header.
/// Blank data rows are dropped.
pub fn read_first_sheet(bytes: &[u8]) -> Result<(Vec<String>, SheetRows)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let shared = match read_entry(&mut archive, SHARED_STRINGS)? {
        Some(xml) => {
            let sst: SharedStrings = quick_xml::de::from_str(&xml)?;
            sst.items.iter().map(rich_text).collect()
        }
        None => Vec::new(),
    };

    let sheet_path = first_sheet_path(&mut archive)?
        .ok_or_else(|| ParseError::unreadable("workbook contains no worksheets"))?;
    let xml = read_entry(&mut archive, &sheet_path)?
        .ok_or_else(|| ParseError::unreadable(format!("worksheet {} is missing", sheet_path)))?;
    let sheet: Worksheet = quick_xml::de::from_str(&xml)?;

    let mut rows = Vec::with_capacity(sheet.sheet_data.rows.len());
    for row in &sheet.sheet_data.rows {
        let values = row_values(row, &shared)?;
        if values.iter().any(Option::is_some) {
            rows.push(values);
        }
    }

    let mut rows = rows.into_iter();
    let headers = match rows.next() {
        Some(header) => header.iter().map(header_text).collect(),
        None => Vec::new(),
    };

    Ok((headers, rows.collect()))
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    read_entry_limited(archive, name, MAX_ENTRY_BYTES)
}

fn read_entry_limited<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<Option<String>> {
    let file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let too_large = || {
        ParseError::unreadable(format!("{} exceeds {} bytes when decompressed", name, limit))
    };
    if file.size() > limit {
        return Err(too_large());
    }

    // the declared size can lie, so the read itself is bounded too
    let mut xml = String::new();
    file.take(limit + 1).read_to_string(&mut xml)?;
    if xml.len() as u64 > limit {
        return Err(too_large());
    }
    Ok(Some(xml))
}

/// Resolves the first sheet in workbook order, falling back to the
/// lowest-numbered `sheetN.xml` when the workbook metadata is unusable.
fn first_sheet_path<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Option<String>> {
    let workbook = read_entry(archive, WORKBOOK)?
        .and_then(|xml| quick_xml::de::from_str::<Workbook>(&xml).ok());
    let rels = read_entry(archive, WORKBOOK_RELS)?
        .and_then(|xml| quick_xml::de::from_str::<Relationships>(&xml).ok());

    if let (Some(workbook), Some(rels)) = (workbook, rels) {
        let target = workbook
            .sheets
            .entries
            .first()
            .and_then(|sheet| sheet.rel_id.as_deref())
            .and_then(|id| rels.entries.iter().find(|rel| rel.id == id))
            .map(|rel| resolve_target(&rel.target));

        if let Some(path) = target {
            if archive.file_names().any(|name| name == path) {
                return Ok(Some(path));
            }
        }
    }

    Ok(archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix(SHEET_PREFIX)?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .min()
        .map(|(_, name)| name))
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn row_values(row: &Row, shared: &[String]) -> Result<Vec<Option<RawCell>>> {
    let mut values: Vec<Option<RawCell>> = Vec::new();
    let mut next = 0;

    for cell in &row.cells {
        let col = match cell.reference.as_deref() {
            Some(reference) => column_index(reference)?.unwrap_or(next),
            None => next,
        };
        if col >= MAX_COLUMNS {
            return Err(ParseError::unreadable(format!(
                "cell beyond column limit of {}",
                MAX_COLUMNS
            )));
        }
        if values.len() <= col {
            values.resize(col + 1, None);
        }
        values[col] = cell_value(cell, shared)?;
        next = col + 1;
    }

    Ok(values)
}

fn cell_value(cell: &Cell, shared: &[String]) -> Result<Option<RawCell>> {
    let raw = cell.v.as_deref();

    let value = match cell.kind.as_deref() {
        Some("s") => match raw {
            Some(index) => {
                let text = index
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| shared.get(i))
                    .ok_or_else(|| {
                        ParseError::unreadable(format!("bad shared string index '{}'", index))
                    })?;
                Some(RawCell::Text(text.clone()))
            }
            None => None,
        },
        Some("inlineStr") => cell
            .is
            .as_ref()
            .map(|rich| RawCell::Text(rich_text(rich))),
        Some("str") | Some("d") => raw.map(|v| RawCell::Text(v.to_string())),
        Some("b") => raw.map(|v| RawCell::Bool(v.trim() == "1")),
        Some("e") => None,
        _ => match raw {
            Some(v) => Some(RawCell::Number(v.trim().parse::<f64>().map_err(|_| {
                ParseError::unreadable(format!("bad numeric cell '{}'", v))
            })?)),
            None => None,
        },
    };

    Ok(value)
}

fn rich_text(rich: &RichText) -> String {
    match &rich.t {
        Some(text) => text.value.clone(),
        None => rich
            .runs
            .iter()
            .filter_map(|run| run.t.as_ref())
            .map(|text| text.value.as_str())
            .collect(),
    }
}

/// Zero-based column index of an `A1`-style reference, `None` when the
/// reference has no column letters. Columns past `XFD` are rejected.
fn column_index(reference: &str) -> Result<Option<usize>> {
    let mut number = 0usize;
    let mut letters = 0;

    for c in reference.chars().take_while(|c| c.is_ascii_alphabetic()) {
        letters += 1;
        number = number * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
        if letters > 3 || number > MAX_COLUMNS {
            return Err(ParseError::unreadable(format!(
                "cell reference '{}' is beyond column XFD",
                reference
            )));
        }
    }

    Ok(if letters == 0 { None } else { Some(number - 1) })
}

fn header_text(cell: &Option<RawCell>) -> String {
    match cell {
        Some(RawCell::Text(s)) => s.clone(),
        Some(RawCell::Number(n)) => format_number(*n),
        Some(RawCell::Bool(b)) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        None => String::new(),
    }
}
