// 📂 Loader - reads the balance sheet and income statement into tables
//
// Sources are CSV or spreadsheet workbooks (first sheet), picked by file
// extension. Headers and cells are trimmed of surrounding whitespace. The
// only side effect is reading the two files.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::table::Table;
use calamine::{open_workbook_auto, Data, Range, Reader};
use csv::ReaderBuilder;
use std::io::Read;
use std::path::Path;
use tracing::info;

// ============================================================================
// COLUMN CONTRACT
// ============================================================================

pub const COMPANY: &str = "company";
pub const COMPANY_TYPE: &str = "comp_type";
pub const YEAR: &str = "Year";

/// Composite join key, in order
pub const KEY_COLUMNS: [&str; 3] = [COMPANY, COMPANY_TYPE, YEAR];

pub const TOTAL_ASSETS: &str = "Total Assets";
pub const TOTAL_LIABILITIES: &str = "Total Liab";
pub const TOTAL_EQUITY: &str = "Total Stockholder Equity";
pub const TOTAL_CURRENT_ASSETS: &str = "Total Current Assets";
pub const TOTAL_CURRENT_LIABILITIES: &str = "Total Current Liabilities";

pub const TOTAL_REVENUE: &str = "Total Revenue";
pub const GROSS_PROFIT: &str = "Gross Profit";
pub const OPERATING_INCOME: &str = "Operating Income";

pub const BALANCE_SHEET_ITEMS: [&str; 5] = [
    TOTAL_ASSETS,
    TOTAL_LIABILITIES,
    TOTAL_EQUITY,
    TOTAL_CURRENT_ASSETS,
    TOTAL_CURRENT_LIABILITIES,
];

pub const INCOME_STATEMENT_ITEMS: [&str; 3] = [TOTAL_REVENUE, GROSS_PROFIT, OPERATING_INCOME];

/// Extensions decoded as spreadsheet workbooks; anything else is read as CSV
pub const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

pub const BALANCE_SHEET_NAME: &str = "balance sheet";
pub const INCOME_STATEMENT_NAME: &str = "income statement";

// ============================================================================
// LOADING
// ============================================================================

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            WORKBOOK_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Load a CSV file or the first sheet of a workbook into a table with
/// trimmed headers and cells
pub fn load_table(path: &Path, name: &str) -> Result<Table> {
    if !path.is_file() {
        return Err(PipelineError::MissingSource {
            path: path.to_path_buf(),
            reason: "file does not exist".to_string(),
        });
    }

    let loaded = if is_workbook(path) {
        read_workbook(path, name)
    } else {
        std::fs::File::open(path)
            .map_err(|e| e.to_string())
            .and_then(|file| read_table(file, name))
    };

    loaded.map_err(|reason| PipelineError::MissingSource {
        path: path.to_path_buf(),
        reason,
    })
}

/// Decode the first worksheet of a workbook
pub fn read_workbook(path: &Path, name: &str) -> std::result::Result<Table, String> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| format!("not a readable workbook: {}", e))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "not tabular: workbook has no sheets".to_string())?
        .map_err(|e| format!("not tabular: {}", e))?;

    range_to_table(&range, name)
}

/// First row of the range is the header; fully blank rows are skipped
pub fn range_to_table(range: &Range<Data>, name: &str) -> std::result::Result<Table, String> {
    let mut rows = range.rows();

    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| "not tabular: no header row".to_string())?
        .iter()
        .map(cell_text)
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err("not tabular: no header row".to_string());
    }

    let rows: Vec<Vec<String>> = rows
        .map(|row| row.iter().map(cell_text).collect::<Vec<String>>())
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .collect();

    Ok(Table::new(name, headers, rows))
}

/// Spreadsheet cell as the text a CSV export would carry.
/// Integral floats print without a fraction (`2020.0` -> `2020`).
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

/// Parse tabular CSV from any reader; the error is a plain reason string
pub fn read_table<R: Read>(reader: R, name: &str) -> std::result::Result<Table, String> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| format!("not tabular: {}", e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err("not tabular: no header row".to_string());
    }

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| format!("not tabular: {}", e))?;
        rows.push(record.iter().map(|c| c.trim().to_string()).collect());
    }

    Ok(Table::new(name, headers, rows))
}

/// Check the key and line-item columns a source must carry
pub fn validate_balance_sheet(table: &Table) -> Result<()> {
    table.require_columns(&KEY_COLUMNS)?;
    table.require_columns(&BALANCE_SHEET_ITEMS)?;
    Ok(())
}

pub fn validate_income_statement(table: &Table) -> Result<()> {
    table.require_columns(&KEY_COLUMNS)?;
    table.require_columns(&INCOME_STATEMENT_ITEMS)?;
    Ok(())
}

/// Load and validate both sources named in the configuration
pub fn load_sources(config: &PipelineConfig) -> Result<(Table, Table)> {
    let balance = load_table(&config.balance_sheet, BALANCE_SHEET_NAME)?;
    validate_balance_sheet(&balance)?;

    let income = load_table(&config.income_statement, INCOME_STATEMENT_NAME)?;
    validate_income_statement(&income)?;

    info!(
        balance_rows = balance.len(),
        income_rows = income.len(),
        "loaded sources"
    );

    Ok((balance, income))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BALANCE_CSV: &str = "company , comp_type,Year,Total Assets,Total Liab,Total Stockholder Equity,Total Current Assets,Total Current Liabilities\n\
                               A ,tech,2020,100,40,60,50,20\n";

    #[test]
    fn test_read_table_trims_headers_and_cells() {
        let table = read_table(BALANCE_CSV.as_bytes(), BALANCE_SHEET_NAME).unwrap();
        assert_eq!(table.headers[0], "company");
        assert_eq!(table.headers[1], "comp_type");
        assert_eq!(table.rows[0][0], "A");
        assert!(validate_balance_sheet(&table).is_ok());
    }

    #[test]
    fn test_ragged_rows_are_not_tabular() {
        let data = "company,comp_type,Year\nA,tech\n";
        let err = read_table(data.as_bytes(), "x").unwrap_err();
        assert!(err.starts_with("not tabular"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_table(Path::new("does/not/exist.csv"), BALANCE_SHEET_NAME).unwrap_err();
        assert_eq!(err.kind(), "MissingSourceError");
    }

    fn workbook_range(cells: &[&[Data]]) -> Range<Data> {
        let height = cells.len() as u32;
        let width = cells[0].len() as u32;
        let mut range = Range::new((0, 0), (height - 1, width - 1));
        for (r, row) in cells.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                range.set_value((r as u32, c as u32), cell.clone());
            }
        }
        range
    }

    #[test]
    fn test_workbook_range_becomes_table() {
        let s = |v: &str| Data::String(v.to_string());
        let range = workbook_range(&[
            &[s(" company "), s("comp_type"), s("Year"), s("Total Revenue")],
            &[s("A "), s("tech"), Data::Float(2020.0), Data::Float(1250.5)],
            &[Data::Empty, Data::Empty, Data::Empty, Data::Empty],
            &[s("B"), s("fmcg"), Data::Int(2021), Data::Empty],
        ]);

        let table = range_to_table(&range, INCOME_STATEMENT_NAME).unwrap();
        assert_eq!(table.headers, vec!["company", "comp_type", "Year", "Total Revenue"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0], vec!["A", "tech", "2020", "1250.5"]);
        assert_eq!(table.rows[1], vec!["B", "fmcg", "2021", ""]);
        assert_eq!(table.number(1, 3).unwrap(), None);
    }

    #[test]
    fn test_blank_workbook_header_is_not_tabular() {
        let range = workbook_range(&[&[Data::Empty, Data::Empty], &[Data::Int(1), Data::Int(2)]]);
        let err = range_to_table(&range, "x").unwrap_err();
        assert!(err.starts_with("not tabular"));
    }

    #[test]
    fn test_workbook_extension_dispatch() {
        assert!(is_workbook(Path::new("data/Balance_Sheet.xlsx")));
        assert!(is_workbook(Path::new("data/Balance_Sheet.XLSX")));
        assert!(is_workbook(Path::new("legacy.xls")));
        assert!(!is_workbook(Path::new("data/Balance_Sheet.csv")));
        assert!(!is_workbook(Path::new("data/no_extension")));
    }

    #[test]
    fn test_corrupt_workbook_is_missing_source() {
        let mut file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        write!(file, "company,comp_type,Year\nA,tech,2020\n").unwrap();

        let err = load_table(file.path(), BALANCE_SHEET_NAME).unwrap_err();
        assert_eq!(err.kind(), "MissingSourceError");
        assert!(err.to_string().contains("workbook"));
    }

    #[test]
    fn test_income_statement_schema_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "company,comp_type,Year,Total Revenue,Gross Profit\nA,tech,2020,1,1\n").unwrap();

        let table = load_table(file.path(), INCOME_STATEMENT_NAME).unwrap();
        let err = validate_income_statement(&table).unwrap_err();
        assert_eq!(err.kind(), "SchemaError");
        assert!(err.to_string().contains("Operating Income"));
    }
}
