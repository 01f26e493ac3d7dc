use std::collections::BTreeMap;

use csv::ReaderBuilder;
use serde::Serialize;

use crate::error::{ParseError, Result};
use crate::xlsx;

pub const NAME: &str = "Name";
pub const CLASS: &str = "Class";
pub const TOTAL_FEES: &str = "Total Fees";
pub const FEES_PAID: &str = "Fees Paid";
pub const ATTENDANCE: &str = "Attendance (%)";

/// Header order used for lookup, error reporting and table display.
pub const REQUIRED_COLUMNS: [&str; 5] = [NAME, CLASS, TOTAL_FEES, FEES_PAID, ATTENDANCE];

/// Cell contents that read as "no value", following the usual dataframe NA markers.
const NA_TOKENS: &[&str] = &[
    "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A", "#NA",
    "<NA>", "-1.#IND",
];

/// One uploaded row. Any cell may be absent; aggregates skip absent values.
/// Serializes under the upload's own column headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRecord {
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Class")]
    pub class: Option<String>,
    #[serde(rename = "Total Fees")]
    pub total_fees: Option<f64>,
    #[serde(rename = "Fees Paid")]
    pub fees_paid: Option<f64>,
    #[serde(rename = "Attendance (%)")]
    pub attendance: Option<f64>,
    /// Columns outside the schema, kept as text for display only.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Option<String>>,
}

/// The parsed upload. Built once and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentTable {
    records: Vec<StudentRecord>,
    extra_columns: Vec<String>,
}

impl StudentTable {
    pub fn new(records: Vec<StudentRecord>) -> Self {
        StudentTable {
            records,
            extra_columns: Vec::new(),
        }
    }

    pub fn with_extra_columns(records: Vec<StudentRecord>, extra_columns: Vec<String>) -> Self {
        StudentTable {
            records,
            extra_columns,
        }
    }

    pub fn records(&self) -> &[StudentRecord] {
        &self.records
    }

    /// Display order: the required columns, then the rest in upload order.
    pub fn columns(&self) -> Vec<String> {
        REQUIRED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.extra_columns.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Spreadsheet,
}

impl FileFormat {
    /// `.csv` uploads are read as CSV; anything else is presumed to be a workbook.
    pub fn from_filename(filename: &str) -> Self {
        let is_csv = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv {
            FileFormat::Csv
        } else {
            FileFormat::Spreadsheet
        }
    }
}

/// A cell as it comes out of either serialization, before schema conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Text(String),
    Number(f64),
    Bool(bool),
}

pub fn load_table(bytes: &[u8], format: FileFormat) -> Result<StudentTable> {
    match format {
        FileFormat::Csv => load_csv(bytes),
        FileFormat::Spreadsheet => {
            let (headers, rows) = xlsx::read_first_sheet(bytes)?;
            build_table(&headers, rows)
        }
    }
}

pub fn load_csv(bytes: &[u8]) -> Result<StudentTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();

    for result in rdr.records() {
        let record = result?;
        rows.push(
            record
                .iter()
                .map(|field| Some(RawCell::Text(field.to_string())))
                .collect::<Vec<_>>(),
        );
    }

    build_table(&headers, rows)
}

struct ColumnIndex {
    name: usize,
    class: usize,
    total_fees: usize,
    fees_paid: usize,
    attendance: usize,
}

impl ColumnIndex {
    fn locate(headers: &[String]) -> Result<Self> {
        let find = |column: &'static str| {
            headers
                .iter()
                .position(|h| h == column)
                .ok_or(ParseError::MissingColumn { column })
        };

        Ok(ColumnIndex {
            name: find(NAME)?,
            class: find(CLASS)?,
            total_fees: find(TOTAL_FEES)?,
            fees_paid: find(FEES_PAID)?,
            attendance: find(ATTENDANCE)?,
        })
    }

    fn is_required(&self, pos: usize) -> bool {
        [
            self.name,
            self.class,
            self.total_fees,
            self.fees_paid,
            self.attendance,
        ]
        .contains(&pos)
    }

    /// Positions and display names of every other column. Blank headers become
    /// `Unnamed: N` and repeated names get a `.1`, `.2` suffix.
    fn extra_columns(&self, headers: &[String]) -> Vec<(usize, String)> {
        let mut taken: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
        let mut extra = Vec::new();

        for (pos, header) in headers.iter().enumerate() {
            if self.is_required(pos) {
                continue;
            }
            let base = if header.trim().is_empty() {
                format!("Unnamed: {}", pos)
            } else {
                header.clone()
            };
            let mut name = base.clone();
            let mut suffix = 1;
            while taken.contains(&name) {
                name = format!("{}.{}", base, suffix);
                suffix += 1;
            }
            taken.push(name.clone());
            extra.push((pos, name));
        }

        extra
    }
}

/// Validates the header row and converts every data row to a `StudentRecord`.
pub fn build_table<I>(headers: &[String], rows: I) -> Result<StudentTable>
where
    I: IntoIterator<Item = Vec<Option<RawCell>>>,
{
    let index = ColumnIndex::locate(headers)?;
    let extra_columns = index.extra_columns(headers);
    let mut records = Vec::new();

    for (i, row) in rows.into_iter().enumerate() {
        let row_number = i + 1;
        let cell = |pos: usize| row.get(pos).and_then(Option::as_ref);

        records.push(StudentRecord {
            name: text_value(cell(index.name)),
            class: text_value(cell(index.class)),
            total_fees: numeric_value(cell(index.total_fees), TOTAL_FEES, row_number)?,
            fees_paid: numeric_value(cell(index.fees_paid), FEES_PAID, row_number)?,
            attendance: numeric_value(cell(index.attendance), ATTENDANCE, row_number)?,
            extra: extra_columns
                .iter()
                .map(|(pos, name)| (name.clone(), text_value(cell(*pos))))
                .collect(),
        });
    }

    let names = extra_columns.into_iter().map(|(_, name)| name).collect();
    Ok(StudentTable::with_extra_columns(records, names))
}

fn is_missing(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || NA_TOKENS.contains(&trimmed)
}

fn text_value(cell: Option<&RawCell>) -> Option<String> {
    match cell? {
        RawCell::Text(s) if is_missing(s) => None,
        RawCell::Text(s) => Some(s.clone()),
        RawCell::Number(n) => Some(format_number(*n)),
        RawCell::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
    }
}

fn numeric_value(
    cell: Option<&RawCell>,
    column: &'static str,
    row: usize,
) -> Result<Option<f64>> {
    match cell {
        None => Ok(None),
        Some(RawCell::Number(n)) if n.is_nan() => Ok(None),
        Some(RawCell::Number(n)) if n.is_finite() => Ok(Some(*n)),
        Some(RawCell::Number(n)) => Err(ParseError::MalformedValue {
            column,
            row,
            value: n.to_string(),
        }),
        Some(RawCell::Text(s)) if is_missing(s) => Ok(None),
        // "inf" and "infinity" parse as f64 but are not amounts or percentages
        Some(RawCell::Text(s)) => match s.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(value)),
            _ => Err(ParseError::MalformedValue {
                column,
                row,
                value: s.clone(),
            }),
        },
        Some(RawCell::Bool(b)) => Err(ParseError::MalformedValue {
            column,
            row,
            value: if *b { "TRUE" } else { "FALSE" }.to_string(),
        }),
    }
}

/// Integral values print without a fraction so a class stored as `5` stays "5".
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
