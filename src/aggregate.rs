// 📊 Aggregator - grouped summaries and the leverage/profitability correlation
//
// Exclude-on-null: an unknown value is left out of its field's mean or sum,
// never counted as zero. A reduction over no known values is unknown.
// Groups are emitted in sorted key order; values are rounded to 2 decimals.

use crate::loader::{COMPANY, TOTAL_ASSETS, TOTAL_EQUITY, TOTAL_LIABILITIES, TOTAL_REVENUE, YEAR};
use crate::ratios::{
    EnrichedRecord, EnrichedTable, DEBT_TO_ASSETS, DEBT_TO_EQUITY, FINANCIAL_LEVERAGE,
    GROSS_MARGIN, INDUSTRY, OPERATING_MARGIN, ROE_OPERATING,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

pub const INDUSTRY_SUMMARY: &str = "industry_summary.csv";
pub const REAL_EST_COMPANY_SUMMARY: &str = "real_est_company_summary.csv";
pub const REAL_EST_TREND: &str = "real_est_trend.csv";
pub const INDUSTRY_TREND: &str = "industry_trend.csv";

/// Minimum complete observations for a correlation to be reported
pub const MIN_CORRELATION_OBSERVATIONS: usize = 3;

// ============================================================================
// FIELDS & REDUCERS
// ============================================================================

/// Numeric field of an enriched record that can be aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    GrossMargin,
    OperatingMargin,
    RoeOperating,
    DebtToEquity,
    DebtToAssets,
    FinancialLeverage,
    TotalRevenue,
    TotalAssets,
    TotalLiabilities,
    TotalEquity,
}

impl Field {
    pub fn column(&self) -> &'static str {
        match self {
            Field::GrossMargin => GROSS_MARGIN,
            Field::OperatingMargin => OPERATING_MARGIN,
            Field::RoeOperating => ROE_OPERATING,
            Field::DebtToEquity => DEBT_TO_EQUITY,
            Field::DebtToAssets => DEBT_TO_ASSETS,
            Field::FinancialLeverage => FINANCIAL_LEVERAGE,
            Field::TotalRevenue => TOTAL_REVENUE,
            Field::TotalAssets => TOTAL_ASSETS,
            Field::TotalLiabilities => TOTAL_LIABILITIES,
            Field::TotalEquity => TOTAL_EQUITY,
        }
    }

    pub fn value(&self, record: &EnrichedRecord) -> Option<f64> {
        match self {
            Field::GrossMargin => record.ratios.gross_margin,
            Field::OperatingMargin => record.ratios.operating_margin,
            Field::RoeOperating => record.ratios.roe_operating,
            Field::DebtToEquity => record.ratios.debt_to_equity,
            Field::DebtToAssets => record.ratios.debt_to_assets,
            Field::FinancialLeverage => record.ratios.financial_leverage,
            Field::TotalRevenue => record.items.total_revenue,
            Field::TotalAssets => record.items.total_assets,
            Field::TotalLiabilities => record.items.total_liabilities,
            Field::TotalEquity => record.items.total_equity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Mean,
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measure {
    pub field: Field,
    pub reducer: Reducer,
}

const fn mean(field: Field) -> Measure {
    Measure {
        field,
        reducer: Reducer::Mean,
    }
}

const fn sum(field: Field) -> Measure {
    Measure {
        field,
        reducer: Reducer::Sum,
    }
}

const RATIO_MEANS: [Measure; 6] = [
    mean(Field::GrossMargin),
    mean(Field::OperatingMargin),
    mean(Field::RoeOperating),
    mean(Field::DebtToEquity),
    mean(Field::DebtToAssets),
    mean(Field::FinancialLeverage),
];

const TREND_MEANS: [Measure; 3] = [
    mean(Field::OperatingMargin),
    mean(Field::DebtToEquity),
    mean(Field::RoeOperating),
];

/// Reduce the known values, skipping unknowns
pub fn reduce(values: impl IntoIterator<Item = Option<f64>>, reducer: Reducer) -> Option<f64> {
    let (total, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(total, count), v| (total + v, count + 1));
    if count == 0 {
        return None;
    }
    match reducer {
        Reducer::Sum => Some(total),
        Reducer::Mean => Some(total / count as f64),
    }
}

/// Round to 2 decimals, ties to even on the scaled value (`0.125` -> `0.12`)
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

// ============================================================================
// AGGREGATE VIEWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub keys: Vec<String>,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateView {
    /// Artifact name the view is exported under
    pub name: &'static str,
    pub key_columns: Vec<&'static str>,
    pub measures: Vec<Measure>,
    pub rows: Vec<AggregateRow>,
}

impl AggregateView {
    pub fn headers(&self) -> Vec<&'static str> {
        self.key_columns
            .iter()
            .copied()
            .chain(self.measures.iter().map(|m| m.field.column()))
            .collect()
    }

    /// Row whose keys match, in key-column order
    pub fn row(&self, keys: &[&str]) -> Option<&AggregateRow> {
        self.rows.iter().find(|r| {
            r.keys.len() == keys.len() && r.keys.iter().zip(keys).all(|(a, b)| a.as_str() == *b)
        })
    }

    /// Value of one measure column in a row
    pub fn value(&self, keys: &[&str], column: &str) -> Option<f64> {
        let position = self.measures.iter().position(|m| m.field.column() == column)?;
        self.row(keys)?.values[position]
    }
}

fn group_view<'a, K, I, F, C>(
    name: &'static str,
    key_columns: Vec<&'static str>,
    measures: &[Measure],
    records: I,
    key_of: F,
    key_cells: C,
) -> AggregateView
where
    K: Ord,
    I: Iterator<Item = &'a EnrichedRecord>,
    F: Fn(&EnrichedRecord) -> K,
    C: Fn(&K) -> Vec<String>,
{
    let mut groups: BTreeMap<K, Vec<&EnrichedRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(key_of(record)).or_default().push(record);
    }

    let rows = groups
        .iter()
        .map(|(key, members)| AggregateRow {
            keys: key_cells(key),
            values: measures
                .iter()
                .map(|m| {
                    reduce(members.iter().map(|r| m.field.value(r)), m.reducer).map(round2)
                })
                .collect(),
        })
        .collect();

    AggregateView {
        name,
        key_columns,
        measures: measures.to_vec(),
        rows,
    }
}

/// One row per industry: ratio means and line-item sums
pub fn industry_summary(table: &EnrichedTable) -> AggregateView {
    let measures: Vec<Measure> = RATIO_MEANS
        .iter()
        .copied()
        .chain([
            sum(Field::TotalRevenue),
            sum(Field::TotalAssets),
            sum(Field::TotalLiabilities),
            sum(Field::TotalEquity),
        ])
        .collect();

    group_view(
        INDUSTRY_SUMMARY,
        vec![INDUSTRY],
        &measures,
        table.records.iter(),
        |r| r.industry.label(),
        |k| vec![k.to_string()],
    )
}

/// One row per real-estate company: means of ratios and line items
pub fn real_estate_company_summary(table: &EnrichedTable) -> AggregateView {
    let measures: Vec<Measure> = RATIO_MEANS
        .iter()
        .copied()
        .chain([
            mean(Field::TotalRevenue),
            mean(Field::TotalAssets),
            mean(Field::TotalLiabilities),
            mean(Field::TotalEquity),
        ])
        .collect();

    group_view(
        REAL_EST_COMPANY_SUMMARY,
        vec![COMPANY],
        &measures,
        table.real_estate(),
        |r| r.company.clone(),
        |k| vec![k.clone()],
    )
}

/// Real-estate year-over-year trend
pub fn real_estate_trend(table: &EnrichedTable) -> AggregateView {
    group_view(
        REAL_EST_TREND,
        vec![YEAR],
        &TREND_MEANS,
        table.real_estate(),
        |r| r.year,
        |k| vec![k.to_string()],
    )
}

/// Year-over-year trend for every (year, industry) pair
pub fn industry_trend(table: &EnrichedTable) -> AggregateView {
    group_view(
        INDUSTRY_TREND,
        vec![YEAR, INDUSTRY],
        &TREND_MEANS,
        table.records.iter(),
        |r| (r.year, r.industry.label()),
        |(year, industry)| vec![year.to_string(), industry.to_string()],
    )
}

// ============================================================================
// CORRELATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Correlation {
    /// Complete (Debt_to_Equity, Operating_Margin) pairs
    pub observations: usize,
    /// `None` when undefined
    pub coefficient: Option<f64>,
}

impl Correlation {
    pub fn describe(&self) -> String {
        match self.coefficient {
            Some(r) => format!("{:.4}", r),
            None => "undefined".to_string(),
        }
    }
}

/// Pearson r; undefined for mismatched lengths, fewer than 3 points, or a
/// series with zero variance
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < MIN_CORRELATION_OBSERVATIONS {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mean_x, y - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then_some(r.clamp(-1.0, 1.0))
}

/// Debt-to-equity vs operating margin over complete real-estate rows
pub fn leverage_profitability_correlation(table: &EnrichedTable) -> Correlation {
    let (xs, ys): (Vec<f64>, Vec<f64>) = table
        .real_estate()
        .filter_map(|r| Some((r.ratios.debt_to_equity?, r.ratios.operating_margin?)))
        .unzip();

    Correlation {
        observations: xs.len(),
        coefficient: pearson(&xs, &ys),
    }
}

// ============================================================================
// ALL VIEWS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregates {
    pub industry_summary: AggregateView,
    pub real_est_company_summary: AggregateView,
    pub real_est_trend: AggregateView,
    pub industry_trend: AggregateView,
    pub correlation: Correlation,
}

impl Aggregates {
    /// Views in export order
    pub fn views(&self) -> [&AggregateView; 4] {
        [
            &self.industry_summary,
            &self.real_est_company_summary,
            &self.real_est_trend,
            &self.industry_trend,
        ]
    }
}

pub fn aggregate(table: &EnrichedTable) -> Aggregates {
    let aggregates = Aggregates {
        industry_summary: industry_summary(table),
        real_est_company_summary: real_estate_company_summary(table),
        real_est_trend: real_estate_trend(table),
        industry_trend: industry_trend(table),
        correlation: leverage_profitability_correlation(table),
    };

    info!(
        industries = aggregates.industry_summary.rows.len(),
        real_estate_companies = aggregates.real_est_company_summary.rows.len(),
        correlation = %aggregates.correlation.describe(),
        "aggregated views"
    );

    aggregates
}
