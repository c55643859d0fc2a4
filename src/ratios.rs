// 🧮 Ratio Engine - derives financial ratios from joined rows
//
// Unknown values are `None`. A ratio is unknown when either input is
// missing, the denominator is zero, or the quotient is not finite, so no
// infinity or NaN ever reaches aggregation or export.

use crate::error::{PipelineError, Result};
use crate::join::{JoinedTable, Side};
use crate::loader::{
    COMPANY, COMPANY_TYPE, GROSS_PROFIT, OPERATING_INCOME, TOTAL_ASSETS,
    TOTAL_CURRENT_ASSETS, TOTAL_CURRENT_LIABILITIES, TOTAL_EQUITY, TOTAL_LIABILITIES,
    TOTAL_REVENUE, YEAR,
};
use crate::table::{parse_year, Table};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

// ============================================================================
// INDUSTRY
// ============================================================================

/// Industry derived from company type through a closed mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Industry {
    Technology,
    FastMovingConsumerGoods,
    RealEstate,
    /// Company type outside the known mapping
    Unmapped,
}

impl Industry {
    /// The mapped industries, in declaration order
    pub const MAPPED: [Industry; 3] = [
        Industry::Technology,
        Industry::FastMovingConsumerGoods,
        Industry::RealEstate,
    ];

    pub fn from_company_type(company_type: &str) -> Industry {
        match company_type {
            "tech" => Industry::Technology,
            "fmcg" => Industry::FastMovingConsumerGoods,
            "real_est" => Industry::RealEstate,
            _ => Industry::Unmapped,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Industry::Technology => "Technology",
            Industry::FastMovingConsumerGoods => "Fast-Moving Consumer Goods",
            Industry::RealEstate => "Real Estate",
            Industry::Unmapped => "Unmapped",
        }
    }

    pub fn is_mapped(&self) -> bool {
        *self != Industry::Unmapped
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub const REAL_ESTATE_TYPE: &str = "real_est";

// ============================================================================
// LINE ITEMS & RATIOS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineItems {
    pub total_revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub operating_income: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub total_equity: Option<f64>,
    pub total_current_assets: Option<f64>,
    pub total_current_liabilities: Option<f64>,
}

pub const GROSS_MARGIN: &str = "Gross_Margin";
pub const OPERATING_MARGIN: &str = "Operating_Margin";
pub const ROE_OPERATING: &str = "ROE_Operating";
pub const DEBT_TO_EQUITY: &str = "Debt_to_Equity";
pub const DEBT_TO_ASSETS: &str = "Debt_to_Assets";
pub const FINANCIAL_LEVERAGE: &str = "Financial_Leverage";
pub const EQUITY_MULTIPLIER: &str = "Equity_Multiplier";
pub const CURRENT_RATIO: &str = "Current_Ratio";
pub const INDUSTRY: &str = "Industry";

/// Derived columns appended to every joined row, in export order
pub const DERIVED_COLUMNS: [&str; 9] = [
    GROSS_MARGIN,
    OPERATING_MARGIN,
    ROE_OPERATING,
    DEBT_TO_EQUITY,
    DEBT_TO_ASSETS,
    FINANCIAL_LEVERAGE,
    EQUITY_MULTIPLIER,
    CURRENT_RATIO,
    INDUSTRY,
];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ratios {
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    /// Operating income over equity. A proxy: true ROE uses net income,
    /// which the income statement here does not carry.
    pub roe_operating: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub debt_to_assets: Option<f64>,
    pub financial_leverage: Option<f64>,
    /// Same formula as `financial_leverage`, kept under both names
    pub equity_multiplier: Option<f64>,
    pub current_ratio: Option<f64>,
}

/// Division that yields unknown instead of infinity or NaN
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (n, d) = (numerator?, denominator?);
    if d == 0.0 {
        return None;
    }
    let value = n / d;
    value.is_finite().then_some(value)
}

fn percent(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    ratio(numerator, denominator).map(|v| v * 100.0)
}

impl Ratios {
    pub fn compute(items: &LineItems) -> Ratios {
        let leverage = ratio(items.total_assets, items.total_equity);
        Ratios {
            gross_margin: percent(items.gross_profit, items.total_revenue),
            operating_margin: percent(items.operating_income, items.total_revenue),
            roe_operating: percent(items.operating_income, items.total_equity),
            debt_to_equity: ratio(items.total_liabilities, items.total_equity),
            debt_to_assets: ratio(items.total_liabilities, items.total_assets),
            financial_leverage: leverage,
            equity_multiplier: leverage,
            current_ratio: ratio(items.total_current_assets, items.total_current_liabilities),
        }
    }

    /// Ratio values in `DERIVED_COLUMNS` order (Industry excluded)
    pub fn values(&self) -> [Option<f64>; 8] {
        [
            self.gross_margin,
            self.operating_margin,
            self.roe_operating,
            self.debt_to_equity,
            self.debt_to_assets,
            self.financial_leverage,
            self.equity_multiplier,
            self.current_ratio,
        ]
    }
}

// ============================================================================
// ENRICHED TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub company: String,
    pub company_type: String,
    pub year: i64,
    pub industry: Industry,
    pub items: LineItems,
    pub ratios: Ratios,
    /// Joined cells, aligned with `EnrichedTable::source_headers`
    pub cells: Vec<String>,
}

impl EnrichedRecord {
    pub fn is_real_estate(&self) -> bool {
        self.company_type == REAL_ESTATE_TYPE
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedTable {
    pub source_headers: Vec<String>,
    pub records: Vec<EnrichedRecord>,
}

impl EnrichedTable {
    /// Joined headers followed by the derived columns
    pub fn headers(&self) -> Vec<String> {
        self.source_headers
            .iter()
            .cloned()
            .chain(DERIVED_COLUMNS.iter().map(|c| c.to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn real_estate(&self) -> impl Iterator<Item = &EnrichedRecord> {
        self.records.iter().filter(|r| r.is_real_estate())
    }
}

fn required_column(joined: &JoinedTable, item: &str, side: Side) -> Result<usize> {
    joined
        .line_item_column(item, side)
        .ok_or_else(|| PipelineError::Schema {
            source_name: joined.table.name.clone(),
            column: item.to_string(),
        })
}

struct ItemColumns {
    total_revenue: usize,
    gross_profit: usize,
    operating_income: usize,
    total_assets: usize,
    total_liabilities: usize,
    total_equity: usize,
    total_current_assets: usize,
    total_current_liabilities: usize,
}

impl ItemColumns {
    fn resolve(joined: &JoinedTable) -> Result<Self> {
        Ok(ItemColumns {
            total_revenue: required_column(joined, TOTAL_REVENUE, Side::Right)?,
            gross_profit: required_column(joined, GROSS_PROFIT, Side::Right)?,
            operating_income: required_column(joined, OPERATING_INCOME, Side::Right)?,
            total_assets: required_column(joined, TOTAL_ASSETS, Side::Left)?,
            total_liabilities: required_column(joined, TOTAL_LIABILITIES, Side::Left)?,
            total_equity: required_column(joined, TOTAL_EQUITY, Side::Left)?,
            total_current_assets: required_column(joined, TOTAL_CURRENT_ASSETS, Side::Left)?,
            total_current_liabilities: required_column(
                joined,
                TOTAL_CURRENT_LIABILITIES,
                Side::Left,
            )?,
        })
    }

    fn read(&self, table: &Table, row: usize) -> Result<LineItems> {
        Ok(LineItems {
            total_revenue: table.number(row, self.total_revenue)?,
            gross_profit: table.number(row, self.gross_profit)?,
            operating_income: table.number(row, self.operating_income)?,
            total_assets: table.number(row, self.total_assets)?,
            total_liabilities: table.number(row, self.total_liabilities)?,
            total_equity: table.number(row, self.total_equity)?,
            total_current_assets: table.number(row, self.total_current_assets)?,
            total_current_liabilities: table.number(row, self.total_current_liabilities)?,
        })
    }
}

/// Append the derived ratios and industry to every joined row
pub fn enrich(joined: &JoinedTable) -> Result<EnrichedTable> {
    let table = &joined.table;
    let keys = table.require_columns(&[COMPANY, COMPANY_TYPE, YEAR])?;
    let columns = ItemColumns::resolve(joined)?;

    let mut records = Vec::with_capacity(table.len());
    let mut unmapped = 0usize;

    for row in 0..table.len() {
        let items = columns.read(table, row)?;
        let company_type = table.cell(row, keys[1]).to_string();
        let industry = Industry::from_company_type(&company_type);
        if !industry.is_mapped() {
            unmapped += 1;
        }

        records.push(EnrichedRecord {
            company: table.cell(row, keys[0]).to_string(),
            year: parse_year(table.cell(row, keys[2]), row + 1)?,
            company_type,
            industry,
            ratios: Ratios::compute(&items),
            items,
            cells: table.rows[row].clone(),
        });
    }

    if unmapped > 0 {
        warn!(rows = unmapped, "company types outside the industry mapping");
    }
    info!(rows = records.len(), "computed ratios");

    Ok(EnrichedTable {
        source_headers: table.headers.clone(),
        records,
    })
}
