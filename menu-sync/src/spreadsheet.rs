//! Spreadsheet import and template export.
//!
//! Import reads the first worksheet of an `.xlsx` workbook with calamine,
//! treating the first row as headers. Export writes a one-sheet template with
//! rust_xlsxwriter.

use std::collections::BTreeMap;
use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx, XlsxError};
use rust_xlsxwriter::Workbook;

/// Columns of the import template, in order.
pub const TEMPLATE_HEADERS: [&str; 7] = [
    "name",
    "category",
    "price",
    "available",
    "description",
    "prepTimeMin",
    "tags",
];

/// One spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Cell content as text; `None` for empty cells.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(s) if s.trim().is_empty() => None,
            Self::Text(s) => Some(s.trim().to_string()),
            Self::Number(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
        }
    }

    /// Numeric content; `None` when the cell is empty or not a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Self::Empty,
            Data::String(s) if s.trim().is_empty() => Self::Empty,
            Data::String(s) => Self::Text(s.clone()),
            Data::Float(f) => Self::Number(*f),
            Data::Int(i) => Self::Number(*i as f64),
            Data::Bool(b) => Self::Bool(*b),
            other => Self::Text(other.to_string()),
        }
    }
}

/// A data row keyed by header name.
pub type Row = BTreeMap<String, CellValue>;

/// Spreadsheet errors.
#[derive(Debug, thiserror::Error)]
pub enum SpreadsheetError {
    #[error("Could not open workbook: {0}")]
    Open(String),
    #[error("Workbook has no worksheets")]
    NoSheet,
    #[error("Could not read worksheet: {0}")]
    Read(String),
    #[error("Could not write workbook: {0}")]
    Write(String),
}

/// Rows of the first worksheet. Wholly blank rows are skipped; cells under
/// a blank header are ignored.
pub fn read_first_sheet(bytes: &[u8]) -> Result<Vec<Row>, SpreadsheetError> {
    let mut workbook: Xlsx<Cursor<&[u8]>> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e: XlsxError| SpreadsheetError::Open(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SpreadsheetError::NoSheet)?
        .map_err(|e: XlsxError| SpreadsheetError::Read(e.to_string()))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_row.iter().map(|c| c.to_string().trim().to_string()).collect();

    let parsed = rows
        .map(|cells| {
            headers
                .iter()
                .zip(cells.iter())
                .filter(|(header, _)| !header.is_empty())
                .map(|(header, cell)| (header.clone(), CellValue::from(cell)))
                .collect::<Row>()
        })
        .filter(|row| row.values().any(|v| !v.is_empty()))
        .collect();
    Ok(parsed)
}

/// The template's single sample row.
pub fn template_rows() -> Vec<Row> {
    let values = [
        CellValue::text("Idli"),
        CellValue::text("Breakfast"),
        CellValue::Number(30.0),
        CellValue::Bool(true),
        CellValue::text("Steamed rice cakes"),
        CellValue::Number(5.0),
        CellValue::text("veg"),
    ];
    vec![TEMPLATE_HEADERS
        .iter()
        .map(|h| h.to_string())
        .zip(values)
        .collect()]
}

/// Write the import template as `.xlsx` bytes.
pub fn write_template() -> Result<Vec<u8>, SpreadsheetError> {
    write_rows(&TEMPLATE_HEADERS, &template_rows())
}

fn write_rows(headers: &[&str], rows: &[Row]) -> Result<Vec<u8>, SpreadsheetError> {
    let write_err = |e: rust_xlsxwriter::XlsxError| SpreadsheetError::Write(e.to_string());

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Menu").map_err(write_err)?;

        for (col, header) in headers.iter().enumerate() {
            sheet.write_string(0, col as u16, *header).map_err(write_err)?;
        }

        for (r, row) in rows.iter().enumerate() {
            let r = r as u32 + 1;
            for (col, header) in headers.iter().enumerate() {
                let col = col as u16;
                match row.get(*header) {
                    Some(CellValue::Text(s)) => {
                        sheet.write_string(r, col, s.as_str()).map_err(write_err)?;
                    }
                    Some(CellValue::Number(n)) => {
                        sheet.write_number(r, col, *n).map_err(write_err)?;
                    }
                    Some(CellValue::Bool(b)) => {
                        sheet.write_boolean(r, col, *b).map_err(write_err)?;
                    }
                    Some(CellValue::Empty) | None => {}
                }
            }
        }
    }

    workbook.save_to_buffer().map_err(write_err)
}
