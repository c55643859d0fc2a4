// 💾 Exporter - writes the enriched dataset, the four views, chart data and
// the summary document
//
// Artifacts are rendered in memory, written into a staging directory inside
// the output directory, then renamed into place. The run manifest is
// published last and removed before publishing starts, so a run without a
// manifest is incomplete.

use crate::aggregate::{AggregateView, Aggregates, Correlation};
use crate::error::{PipelineError, Result};
use crate::join::JoinReport;
use crate::loader::YEAR;
use crate::ratios::{EnrichedTable, Industry};
use crate::table::{is_missing, parse_number};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const ENRICHED_DATASET: &str = "processed_financial_data.csv";
pub const CHART_DATA: &str = "chart_data.json";
pub const SUMMARY_STATS: &str = "summary_stats.json";
pub const RUN_MANIFEST: &str = "run_manifest.json";

/// Artifacts the calling layer checks for after every run
pub const DECLARED_ARTIFACTS: [&str; 7] = [
    ENRICHED_DATASET,
    crate::aggregate::INDUSTRY_SUMMARY,
    crate::aggregate::REAL_EST_COMPANY_SUMMARY,
    crate::aggregate::REAL_EST_TREND,
    crate::aggregate::INDUSTRY_TREND,
    CHART_DATA,
    SUMMARY_STATS,
];

const STAGING_PREFIX: &str = ".ratio-staging-";

// ============================================================================
// ARTIFACT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    fn new(name: &str, bytes: Vec<u8>) -> Self {
        Artifact {
            name: name.to_string(),
            bytes,
        }
    }

    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }

    pub fn entry(&self) -> ManifestEntry {
        ManifestEntry {
            name: self.name.clone(),
            bytes: self.bytes.len() as u64,
            sha256: self.sha256(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_companies: usize,
    pub total_observations: usize,
    pub industries: Vec<&'static str>,
    /// `"min-max"`, null when no rows survived the join
    pub year_range: Option<String>,
    pub real_est_companies: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunManifest {
    pub artifacts: Vec<ManifestEntry>,
    pub join: JoinReport,
    pub correlation: Correlation,
}

// ============================================================================
// RENDERING
// ============================================================================

/// Numbers are written in their shortest round-trip form; integral values
/// keep one decimal so float columns stay recognizable
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_default()
}

fn csv_bytes(name: &str, headers: &[String], rows: Vec<Vec<String>>) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(headers)
        .map_err(|e| PipelineError::export(name, e))?;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|e| PipelineError::export(name, e))?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::export(name, e.error()))
}

pub fn render_enriched_csv(table: &EnrichedTable) -> Result<Vec<u8>> {
    let rows = table
        .records
        .iter()
        .map(|record| {
            let mut row = record.cells.clone();
            row.extend(record.ratios.values().iter().map(|v| format_optional(*v)));
            row.push(record.industry.label().to_string());
            row
        })
        .collect();
    csv_bytes(ENRICHED_DATASET, &table.headers(), rows)
}

pub fn render_view_csv(view: &AggregateView) -> Result<Vec<u8>> {
    let headers: Vec<String> = view.headers().iter().map(|h| h.to_string()).collect();
    let rows = view
        .rows
        .iter()
        .map(|row| {
            row.keys
                .iter()
                .cloned()
                .chain(row.values.iter().map(|v| format_optional(*v)))
                .collect()
        })
        .collect();
    csv_bytes(view.name, &headers, rows)
}

/// A source column is numeric when every non-missing cell parses as a number
fn numeric_columns(table: &EnrichedTable) -> Vec<bool> {
    (0..table.source_headers.len())
        .map(|column| {
            table.records.iter().all(|r| {
                let cell = r.cells.get(column).map(String::as_str).unwrap_or("");
                is_missing(cell) || parse_number(cell, "", 0).is_ok()
            })
        })
        .collect()
}

fn number_value(value: Option<f64>) -> Value {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => Value::from(v as i64),
        Some(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        None => Value::Null,
    }
}

/// Record-oriented document: one object per enriched row
pub fn render_chart_data(table: &EnrichedTable) -> Result<Vec<u8>> {
    let numeric = numeric_columns(table);
    let derived = crate::ratios::DERIVED_COLUMNS;

    let records: Vec<Map<String, Value>> = table
        .records
        .iter()
        .map(|record| {
            let mut object = Map::new();
            for (i, header) in table.source_headers.iter().enumerate() {
                let cell = record.cells.get(i).map(String::as_str).unwrap_or("");
                let value = if header == YEAR {
                    Value::from(record.year)
                } else if is_missing(cell) {
                    Value::Null
                } else if numeric[i] {
                    number_value(parse_number(cell, header, 0).ok().flatten())
                } else {
                    Value::from(cell)
                };
                object.insert(header.clone(), value);
            }
            for (name, value) in derived.iter().zip(record.ratios.values()) {
                let value = value
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
                object.insert(name.to_string(), value);
            }
            object.insert(
                crate::ratios::INDUSTRY.to_string(),
                Value::from(record.industry.label()),
            );
            object
        })
        .collect();

    serde_json::to_vec(&records).map_err(|e| PipelineError::export(CHART_DATA, e))
}

pub fn summary_stats(table: &EnrichedTable) -> SummaryStats {
    let companies: BTreeSet<&str> = table.records.iter().map(|r| r.company.as_str()).collect();
    let real_estate: BTreeSet<&str> = table.real_estate().map(|r| r.company.as_str()).collect();

    let min = table.records.iter().map(|r| r.year).min();
    let max = table.records.iter().map(|r| r.year).max();
    let year_range = min.zip(max).map(|(lo, hi)| format!("{}-{}", lo, hi));

    SummaryStats {
        total_companies: companies.len(),
        total_observations: table.len(),
        industries: Industry::MAPPED.iter().map(|i| i.label()).collect(),
        year_range,
        real_est_companies: real_estate.len(),
    }
}

/// Render every declared artifact, in declaration order
pub fn render_artifacts(table: &EnrichedTable, aggregates: &Aggregates) -> Result<Vec<Artifact>> {
    let mut artifacts = vec![Artifact::new(ENRICHED_DATASET, render_enriched_csv(table)?)];
    for view in aggregates.views() {
        artifacts.push(Artifact::new(view.name, render_view_csv(view)?));
    }
    artifacts.push(Artifact::new(CHART_DATA, render_chart_data(table)?));

    let stats = serde_json::to_vec_pretty(&summary_stats(table))
        .map_err(|e| PipelineError::export(SUMMARY_STATS, e))?;
    artifacts.push(Artifact::new(SUMMARY_STATS, stats));

    Ok(artifacts)
}

pub fn render_manifest(
    artifacts: &[Artifact],
    join: &JoinReport,
    correlation: &Correlation,
) -> Result<Artifact> {
    let manifest = RunManifest {
        artifacts: artifacts.iter().map(Artifact::entry).collect(),
        join: join.clone(),
        correlation: *correlation,
    };
    let bytes = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| PipelineError::export(RUN_MANIFEST, e))?;
    Ok(Artifact::new(RUN_MANIFEST, bytes))
}

// ============================================================================
// PUBLISHING
// ============================================================================

fn write_staged(dir: &Path, artifact: &Artifact) -> Result<PathBuf> {
    let path = dir.join(&artifact.name);
    let mut file = fs::File::create(&path).map_err(|e| PipelineError::export(&artifact.name, e))?;
    file.write_all(&artifact.bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| PipelineError::export(&artifact.name, e))?;
    debug!(artifact = %artifact.name, bytes = artifact.bytes.len(), "staged");
    Ok(path)
}

/// Stage every artifact, then move them into `output_dir` with the
/// manifest last.
///
/// A failure before the renames leaves `output_dir` as it was. The renames
/// themselves are per file: the previous manifest is removed before the
/// first one and the new manifest is moved in last, so a present manifest
/// means every listed artifact belongs to the same run. A failure partway
/// through leaves no manifest behind and `verify_artifacts` fails.
pub fn publish(output_dir: &Path, artifacts: &[Artifact], manifest: &Artifact) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .map_err(|e| PipelineError::export(&output_dir.display().to_string(), e))?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(output_dir)
        .map_err(|e| PipelineError::export("staging directory", e))?;

    let mut staged = Vec::with_capacity(artifacts.len() + 1);
    for artifact in artifacts.iter().chain(std::iter::once(manifest)) {
        staged.push((write_staged(staging.path(), artifact)?, &artifact.name));
    }

    let stale_manifest = output_dir.join(RUN_MANIFEST);
    match fs::remove_file(&stale_manifest) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(PipelineError::export(RUN_MANIFEST, e)),
    }

    let mut published = Vec::with_capacity(staged.len());
    for (from, name) in staged {
        let to = output_dir.join(name);
        fs::rename(&from, &to).map_err(|e| PipelineError::export(name, e))?;
        published.push(to);
    }

    info!(artifacts = published.len(), dir = %output_dir.display(), "published artifacts");
    Ok(published)
}

/// Presence and non-zero size of every declared artifact plus the manifest
pub fn verify_artifacts(output_dir: &Path) -> Result<Vec<(String, u64)>> {
    DECLARED_ARTIFACTS
        .iter()
        .chain(std::iter::once(&RUN_MANIFEST))
        .map(|name| {
            let size = fs::metadata(output_dir.join(name))
                .map_err(|e| PipelineError::export(name, e))?
                .len();
            if size == 0 {
                return Err(PipelineError::export(name, "artifact is empty"));
            }
            Ok((name.to_string(), size))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::join::inner_join;
    use crate::ratios::enrich;
    use crate::table::Table;

    fn enriched() -> EnrichedTable {
        let balance = Table::from_str_rows(
            "balance sheet",
            &[
                "company",
                "comp_type",
                "Year",
                "Total Assets",
                "Total Liab",
                "Total Stockholder Equity",
                "Total Current Assets",
                "Total Current Liabilities",
            ],
            &[
                &["A", "tech", "2020", "100", "40", "60", "50", "20"],
                &["R", "real_est", "2019", "500", "300", "0", "50", "25"],
                &["R", "real_est", "2021", "500", "300", "200", "50", "25"],
            ],
        );
        let income = Table::from_str_rows(
            "income statement",
            &["company", "comp_type", "Year", "Total Revenue", "Gross Profit", "Operating Income"],
            &[
                &["A", "tech", "2020", "200", "80", "30"],
                &["R", "real_est", "2019", "100", "40", "10"],
                &["R", "real_est", "2021", "100", "40", "20"],
            ],
        );
        enrich(&inner_join(&balance, &income).unwrap()).unwrap()
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(40.0), "40.0");
        assert_eq!(format_number(0.4), "0.4");
        assert_eq!(format_number(-2.5), "-2.5");
    }

    #[test]
    fn test_enriched_csv_marks_unknown_as_empty() {
        let text = String::from_utf8(render_enriched_csv(&enriched()).unwrap()).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("company,comp_type,Year,Total Assets"));
        assert!(header.ends_with("Equity_Multiplier,Current_Ratio,Industry"));

        let zero_equity = lines.nth(1).unwrap();
        assert!(zero_equity.contains(",,"));
        assert!(zero_equity.ends_with(",Real Estate"));
        assert!(!text.contains("inf") && !text.contains("NaN"));
    }

    #[test]
    fn test_chart_data_records() {
        let bytes = render_chart_data(&enriched()).unwrap();
        let records: Vec<Value> = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["company"], "A");
        assert_eq!(records[0]["Year"], 2020);
        assert_eq!(records[0]["Total Assets"], 100);
        assert_eq!(records[0]["Current_Ratio"], 2.5);
        assert_eq!(records[0]["Industry"], "Technology");
        assert!(records[1]["Debt_to_Equity"].is_null());
    }

    #[test]
    fn test_summary_stats() {
        let stats = summary_stats(&enriched());
        assert_eq!(stats.total_companies, 2);
        assert_eq!(stats.total_observations, 3);
        assert_eq!(
            stats.industries,
            vec!["Technology", "Fast-Moving Consumer Goods", "Real Estate"]
        );
        assert_eq!(stats.year_range.as_deref(), Some("2019-2021"));
        assert_eq!(stats.real_est_companies, 1);
    }

    #[test]
    fn test_summary_stats_empty_table() {
        let empty = EnrichedTable {
            source_headers: Vec::new(),
            records: Vec::new(),
        };
        let stats = summary_stats(&empty);
        assert_eq!(stats.total_observations, 0);
        assert_eq!(stats.year_range, None);
    }

    #[test]
    fn test_publish_and_verify() {
        let table = enriched();
        let aggregates = aggregate(&table);
        let artifacts = render_artifacts(&table, &aggregates).unwrap();
        let manifest =
            render_manifest(&artifacts, &JoinReport::default(), &aggregates.correlation).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let published = publish(dir.path(), &artifacts, &manifest).unwrap();
        assert_eq!(published.len(), 8);

        let sizes = verify_artifacts(dir.path()).unwrap();
        assert_eq!(sizes.len(), 8);
        assert!(sizes.iter().all(|(_, size)| *size > 0));

        // Staging directory is gone
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_verify_reports_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = verify_artifacts(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "ExportError");
        assert!(err.to_string().contains(ENRICHED_DATASET));
    }
}
