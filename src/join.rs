// 🔗 Joiner - inner join of balance sheet and income statement
//
// Policies:
//   * Only keys present on both sides survive. Unmatched rows are dropped
//     and counted in the JoinReport.
//   * A key repeated within one input is a JoinIntegrity error; rows are
//     never multiplied.
//   * Non-key columns present on both sides are renamed `<name>_x`
//     (balance sheet) and `<name>_y` (income statement).
//   * Output follows balance-sheet source order.
//   * Years compare numerically, so `2020` and `2020.0` are the same key.

use crate::error::{PipelineError, Result};
use crate::loader::KEY_COLUMNS;
use crate::table::{parse_year, Table};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{info, warn};

pub const LEFT_SUFFIX: &str = "_x";
pub const RIGHT_SUFFIX: &str = "_y";

/// Which input a column came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn suffix(&self) -> &'static str {
        match self {
            Side::Left => LEFT_SUFFIX,
            Side::Right => RIGHT_SUFFIX,
        }
    }
}

/// Composite key (company, company-type, year)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinKey {
    pub company: String,
    pub company_type: String,
    pub year: i64,
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "company={}, comp_type={}, Year={}",
            self.company, self.company_type, self.year
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JoinReport {
    pub left_rows: usize,
    pub right_rows: usize,
    pub matched: usize,
    pub left_unmatched: usize,
    pub right_unmatched: usize,
}

impl JoinReport {
    pub fn dropped(&self) -> usize {
        self.left_unmatched + self.right_unmatched
    }
}

#[derive(Debug, Clone)]
pub struct JoinedTable {
    pub table: Table,
    pub report: JoinReport,
}

impl JoinedTable {
    /// Column of a line item after collision renaming
    pub fn line_item_column(&self, item: &str, side: Side) -> Option<usize> {
        self.table
            .column_index(item)
            .or_else(|| self.table.column_index(&format!("{}{}", item, side.suffix())))
    }
}

fn key_indices(table: &Table) -> Result<[usize; 3]> {
    let indices = table.require_columns(&KEY_COLUMNS)?;
    Ok([indices[0], indices[1], indices[2]])
}

fn row_key(table: &Table, row: usize, idx: &[usize; 3]) -> Result<JoinKey> {
    Ok(JoinKey {
        company: table.cell(row, idx[0]).to_string(),
        company_type: table.cell(row, idx[1]).to_string(),
        year: parse_year(table.cell(row, idx[2]), row + 1)?,
    })
}

/// Index rows by key, rejecting any repeated key
fn index_unique(table: &Table, idx: &[usize; 3]) -> Result<HashMap<JoinKey, usize>> {
    let mut index = HashMap::with_capacity(table.len());
    for row in 0..table.len() {
        let key = row_key(table, row, idx)?;
        if let Some(first) = index.get(&key) {
            return Err(PipelineError::JoinIntegrity {
                source_name: table.name.clone(),
                key: key.to_string(),
                first_row: first + 1,
                second_row: row + 1,
            });
        }
        index.insert(key, row);
    }
    Ok(index)
}

/// Inner join on (company, comp_type, Year)
pub fn inner_join(left: &Table, right: &Table) -> Result<JoinedTable> {
    let left_idx = key_indices(left)?;
    let right_idx = key_indices(right)?;

    let left_index = index_unique(left, &left_idx)?;
    let right_index = index_unique(right, &right_idx)?;

    let left_keys: HashSet<usize> = left_idx.iter().copied().collect();
    let right_keys: HashSet<usize> = right_idx.iter().copied().collect();

    let left_names: HashSet<&str> = left
        .headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !left_keys.contains(i))
        .map(|(_, h)| h.as_str())
        .collect();
    let right_names: HashSet<&str> = right
        .headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !right_keys.contains(i))
        .map(|(_, h)| h.as_str())
        .collect();

    // Left columns keep their positions (keys included), then right non-keys
    let mut headers = Vec::with_capacity(left.headers.len() + right.headers.len());
    for (i, h) in left.headers.iter().enumerate() {
        if !left_keys.contains(&i) && right_names.contains(h.as_str()) {
            headers.push(format!("{}{}", h, LEFT_SUFFIX));
        } else {
            headers.push(h.clone());
        }
    }
    let right_columns: Vec<usize> = (0..right.headers.len())
        .filter(|i| !right_keys.contains(i))
        .collect();
    for &i in &right_columns {
        let h = &right.headers[i];
        if left_names.contains(h.as_str()) {
            headers.push(format!("{}{}", h, RIGHT_SUFFIX));
        } else {
            headers.push(h.clone());
        }
    }

    let mut rows = Vec::new();
    for row in 0..left.len() {
        let key = row_key(left, row, &left_idx)?;
        let Some(&other) = right_index.get(&key) else {
            continue;
        };

        let mut joined: Vec<String> = (0..left.headers.len())
            .map(|c| left.cell(row, c).to_string())
            .collect();
        joined.extend(right_columns.iter().map(|&c| right.cell(other, c).to_string()));
        rows.push(joined);
    }

    let matched = rows.len();
    let report = JoinReport {
        left_rows: left.len(),
        right_rows: right.len(),
        matched,
        left_unmatched: left_index.len() - matched,
        right_unmatched: right_index.len() - matched,
    };

    if report.dropped() > 0 {
        warn!(
            left_unmatched = report.left_unmatched,
            right_unmatched = report.right_unmatched,
            "inner join dropped rows without a counterpart"
        );
    }
    info!(matched, "joined sources");

    Ok(JoinedTable {
        table: Table::new("joined", headers, rows),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance() -> Table {
        Table::from_str_rows(
            "balance sheet",
            &["company", "comp_type", "Year", "Total Assets", "Notes"],
            &[
                &["A", "tech", "2020", "100", "bs-a"],
                &["B", "fmcg", "2020", "200", "bs-b"],
                &["C", "real_est", "2021", "300", "bs-c"],
            ],
        )
    }

    fn income() -> Table {
        Table::from_str_rows(
            "income statement",
            &["Year", "company", "comp_type", "Total Revenue", "Notes"],
            &[
                &["2021", "C", "real_est", "30", "is-c"],
                &["2020", "A", "tech", "10", "is-a"],
                &["2019", "A", "tech", "5", "is-a-old"],
            ],
        )
    }

    #[test]
    fn test_inner_join_keeps_matches_in_left_order() {
        let joined = inner_join(&balance(), &income()).unwrap();

        assert_eq!(joined.table.len(), 2);
        assert_eq!(joined.table.rows[0][0], "A");
        assert_eq!(joined.table.rows[1][0], "C");
        assert_eq!(
            joined.report,
            JoinReport {
                left_rows: 3,
                right_rows: 3,
                matched: 2,
                left_unmatched: 1,
                right_unmatched: 1,
            }
        );
        assert!(joined.table.len() <= balance().len().min(income().len()));
    }

    #[test]
    fn test_collisions_are_suffixed() {
        let joined = inner_join(&balance(), &income()).unwrap();
        assert_eq!(
            joined.table.headers,
            vec![
                "company",
                "comp_type",
                "Year",
                "Total Assets",
                "Notes_x",
                "Total Revenue",
                "Notes_y"
            ]
        );
        assert_eq!(joined.table.rows[0][4], "bs-a");
        assert_eq!(joined.table.rows[0][6], "is-a");
        assert_eq!(joined.line_item_column("Notes", Side::Right), Some(6));
        assert_eq!(joined.line_item_column("Total Assets", Side::Left), Some(3));
    }

    #[test]
    fn test_duplicate_key_is_integrity_error() {
        let dup = Table::from_str_rows(
            "income statement",
            &["company", "comp_type", "Year", "Total Revenue"],
            &[&["A", "tech", "2020", "1"], &["A", "tech", "2020", "2"]],
        );
        let err = inner_join(&balance(), &dup).unwrap_err();
        assert_eq!(err.kind(), "JoinIntegrityError");
        assert!(err.to_string().contains("rows 1 and 2"));
    }

    #[test]
    fn test_keys_unique_and_present_in_both() {
        let left = balance();
        let right = income();
        let joined = inner_join(&left, &right).unwrap();
        let idx = key_indices(&joined.table).unwrap();

        let mut seen = HashSet::new();
        for row in 0..joined.table.len() {
            let key = row_key(&joined.table, row, &idx).unwrap();
            assert!(seen.insert(key.clone()));
            let in_left = (0..left.len())
                .any(|r| row_key(&left, r, &key_indices(&left).unwrap()).unwrap() == key);
            let in_right = (0..right.len())
                .any(|r| row_key(&right, r, &key_indices(&right).unwrap()).unwrap() == key);
            assert!(in_left && in_right);
        }
    }

    #[test]
    fn test_integral_float_year_matches_integer_year() {
        let left = Table::from_str_rows(
            "balance sheet",
            &["company", "comp_type", "Year", "Total Assets"],
            &[&["A", "tech", "2020.0", "100"], &["B", "fmcg", "2021", "200"]],
        );
        let right = Table::from_str_rows(
            "income statement",
            &["company", "comp_type", "Year", "Total Revenue"],
            &[&["A", "tech", "2020", "10"], &["B", "fmcg", "2021.0", "20"]],
        );

        let joined = inner_join(&left, &right).unwrap();
        assert_eq!(joined.report.matched, 2);
        assert_eq!(joined.report.dropped(), 0);
        assert_eq!(joined.table.rows[0][4], "10");
        assert_eq!(joined.table.rows[1][4], "20");
    }

    #[test]
    fn test_equal_years_in_different_spellings_are_duplicates() {
        let dup = Table::from_str_rows(
            "income statement",
            &["company", "comp_type", "Year", "Total Revenue"],
            &[&["A", "tech", "2020", "1"], &["A", "tech", "2020.0", "2"]],
        );
        let err = inner_join(&balance(), &dup).unwrap_err();
        assert_eq!(err.kind(), "JoinIntegrityError");
        assert!(err.to_string().contains("Year=2020"));
    }

    #[test]
    fn test_fractional_year_fails_the_join() {
        let bad = Table::from_str_rows(
            "income statement",
            &["company", "comp_type", "Year", "Total Revenue"],
            &[&["A", "tech", "2020", "1"], &["C", "real_est", "2020.5", "2"]],
        );
        let err = inner_join(&balance(), &bad).unwrap_err();
        assert_eq!(err.kind(), "ComputationError");
        assert!(err.to_string().contains("row 2"));
    }
}
