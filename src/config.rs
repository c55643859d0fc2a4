// ⚙️ Run configuration - where the two sources live and where artifacts go

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BALANCE_SHEET: &str = "data/Balance_Sheet.xlsx";
pub const DEFAULT_INCOME_STATEMENT: &str = "data/Income_Statement.xlsx";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub balance_sheet: PathBuf,
    pub income_statement: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            balance_sheet: PathBuf::from(DEFAULT_BALANCE_SHEET),
            income_statement: PathBuf::from(DEFAULT_INCOME_STATEMENT),
            output_dir: PathBuf::from("."),
        }
    }
}

impl PipelineConfig {
    pub fn new(
        balance_sheet: impl Into<PathBuf>,
        income_statement: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        PipelineConfig {
            balance_sheet: balance_sheet.into(),
            income_statement: income_statement.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Builder pattern: redirect artifacts
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Final location of a named artifact
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
