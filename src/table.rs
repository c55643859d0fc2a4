// 📋 Table - in-memory tabular data shared by the Loader and the Joiner
//
// Cells are kept as trimmed strings; numeric interpretation happens only
// where a stage needs a number, so extra columns pass through untouched.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{PipelineError, Result};
use crate::loader::YEAR;

/// Tokens treated as a missing value rather than a parse failure
const MISSING_TOKENS: &[&str] = &[
    "", "nan", "na", "n/a", "null", "none", "inf", "-inf", "+inf", "infinity", "-infinity",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Human-readable source name used in error messages
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(name: &str, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Table {
            name: name.to_string(),
            headers,
            rows,
        }
    }

    /// Convenience constructor used by tests and in-memory callers
    pub fn from_str_rows(name: &str, headers: &[&str], rows: &[&[&str]]) -> Self {
        Table::new(
            name,
            headers.iter().map(|h| h.trim().to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|c| c.trim().to_string()).collect())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// Resolve every column or fail with the first one absent
    pub fn require_columns(&self, columns: &[&str]) -> Result<Vec<usize>> {
        columns
            .iter()
            .map(|column| {
                self.column_index(column).ok_or_else(|| PipelineError::Schema {
                    source_name: self.name.clone(),
                    column: column.to_string(),
                })
            })
            .collect()
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows[row].get(column).map(String::as_str).unwrap_or("")
    }

    /// Numeric view of a cell: `None` when missing, error when not a number
    pub fn number(&self, row: usize, column: usize) -> Result<Option<f64>> {
        parse_number(self.cell(row, column), &self.headers[column], row + 1)
    }
}

pub fn is_missing(cell: &str) -> bool {
    let lowered = cell.trim().to_ascii_lowercase();
    MISSING_TOKENS.contains(&lowered.as_str())
}

lazy_static! {
    // `1,250` or `-1,000,000.5`; a comma anywhere else is not a separator
    static ref THOUSANDS_GROUPED: Regex =
        Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d*)?$").expect("valid thousands pattern");
}

/// Parse a numeric cell. Well-formed thousands separators are tolerated;
/// any other comma (`1,5`, `12,34`) is a computation error.
pub fn parse_number(cell: &str, column: &str, row: usize) -> Result<Option<f64>> {
    if is_missing(cell) {
        return Ok(None);
    }
    let error = || PipelineError::Computation {
        column: column.to_string(),
        row,
        value: cell.to_string(),
    };

    let trimmed = cell.trim();
    let cleaned = if trimmed.contains(',') {
        if !THOUSANDS_GROUPED.is_match(trimmed) {
            return Err(error());
        }
        trimmed.replace(',', "")
    } else {
        trimmed.to_string()
    };

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        Ok(_) => Ok(None),
        Err(_) => Err(error()),
    }
}

/// Parse a `Year` cell: `2020` or an integral float such as `2020.0`
pub fn parse_year(cell: &str, row: usize) -> Result<i64> {
    let error = || PipelineError::Computation {
        column: YEAR.to_string(),
        row,
        value: cell.to_string(),
    };
    if let Ok(year) = cell.trim().parse::<i64>() {
        return Ok(year);
    }
    match parse_number(cell, YEAR, row)? {
        Some(value) if value.fract() == 0.0 => Ok(value as i64),
        _ => Err(error()),
    }
}
