// 🚀 Pipeline - Loader → Joiner → Ratio Engine → Aggregator → Exporter
//
// File I/O happens only in `load_sources` and `publish`; everything in
// between is a pure function of the two tables.

use crate::aggregate::{aggregate, Aggregates, Correlation};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::export::{self, Artifact, ManifestEntry};
use crate::join::{inner_join, JoinReport};
use crate::loader::load_sources;
use crate::ratios::{enrich, EnrichedTable};
use crate::table::Table;
use std::path::PathBuf;
use tracing::info;

/// Everything computed from one pair of tables
#[derive(Debug, Clone)]
pub struct Analysis {
    pub join: JoinReport,
    pub enriched: EnrichedTable,
    pub aggregates: Aggregates,
}

impl Analysis {
    pub fn artifacts(&self) -> Result<(Vec<Artifact>, Artifact)> {
        let artifacts = export::render_artifacts(&self.enriched, &self.aggregates)?;
        let manifest =
            export::render_manifest(&artifacts, &self.join, &self.aggregates.correlation)?;
        Ok((artifacts, manifest))
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub total_companies: usize,
    pub total_observations: usize,
    pub correlation: Correlation,
    pub join: JoinReport,
    pub artifacts: Vec<ManifestEntry>,
    pub published: Vec<PathBuf>,
}

impl RunReport {
    /// Human-readable completion summary
    pub fn summary(&self) -> String {
        format!(
            "Analysis complete!\n\
             Total companies: {}\n\
             Total observations: {}\n\
             Real Estate correlation (Debt-to-Equity vs Operating Margin): {}",
            self.total_companies,
            self.total_observations,
            self.correlation.describe()
        )
    }
}

/// Join, enrich and aggregate two in-memory tables
pub fn run_in_memory(balance_sheet: &Table, income_statement: &Table) -> Result<Analysis> {
    let joined = inner_join(balance_sheet, income_statement)?;
    let enriched = enrich(&joined)?;
    let aggregates = aggregate(&enriched);

    Ok(Analysis {
        join: joined.report,
        enriched,
        aggregates,
    })
}

/// Full run: load, analyze, publish every artifact
pub fn run(config: &PipelineConfig) -> Result<RunReport> {
    info!(
        balance_sheet = %config.balance_sheet.display(),
        income_statement = %config.income_statement.display(),
        "starting run"
    );

    let (balance, income) = load_sources(config)?;
    let analysis = run_in_memory(&balance, &income)?;
    let (artifacts, manifest) = analysis.artifacts()?;
    let published = export::publish(config.output_dir(), &artifacts, &manifest)?;

    let stats = export::summary_stats(&analysis.enriched);
    Ok(RunReport {
        total_companies: stats.total_companies,
        total_observations: stats.total_observations,
        correlation: analysis.aggregates.correlation,
        join: analysis.join,
        artifacts: artifacts.iter().map(Artifact::entry).collect(),
        published,
    })
}
