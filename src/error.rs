// ❗ Error kinds - every fatal condition the pipeline can surface
//
// Recoverable conditions (zero denominators, too few observations for a
// correlation) never reach this type: they become unknown markers.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input file absent, unreadable, or not tabular
    #[error("source {path} could not be loaded: {reason}")]
    MissingSource { path: PathBuf, reason: String },

    /// Required column absent in a source
    #[error("{source_name} is missing required column '{column}'")]
    Schema { source_name: String, column: String },

    /// Duplicate join keys would change row-count semantics
    #[error("duplicate key ({key}) in {source_name}: rows {first_row} and {second_row}")]
    JoinIntegrity {
        source_name: String,
        key: String,
        first_row: usize,
        second_row: usize,
    },

    /// Non-numeric input where a number is required
    #[error("non-numeric value '{value}' in column '{column}' (row {row})")]
    Computation {
        column: String,
        row: usize,
        value: String,
    },

    /// Artifact could not be fully written or published
    #[error("could not write artifact {artifact}: {reason}")]
    Export { artifact: String, reason: String },
}

impl PipelineError {
    /// Stable kind name shown to the calling layer
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MissingSource { .. } => "MissingSourceError",
            PipelineError::Schema { .. } => "SchemaError",
            PipelineError::JoinIntegrity { .. } => "JoinIntegrityError",
            PipelineError::Computation { .. } => "ComputationError",
            PipelineError::Export { .. } => "ExportError",
        }
    }

    pub(crate) fn export(artifact: &str, reason: impl ToString) -> Self {
        PipelineError::Export {
            artifact: artifact.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let err = PipelineError::Schema {
            source_name: "balance sheet".to_string(),
            column: "Total Assets".to_string(),
        };
        assert_eq!(err.kind(), "SchemaError");
        assert_eq!(
            err.to_string(),
            "balance sheet is missing required column 'Total Assets'"
        );

        let err = PipelineError::export("industry_summary.csv", "disk full");
        assert_eq!(err.kind(), "ExportError");
        assert!(err.to_string().contains("industry_summary.csv"));
    }
}
