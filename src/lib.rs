// Ratio Pipeline - Core Library
// Balance sheet + income statement → ratios → summaries → chart-ready exports

pub mod error;
pub mod config;
pub mod table;
pub mod loader;     // Stage 1: read and trim the two sources
pub mod join;       // Stage 2: inner join on (company, comp_type, Year)
pub mod ratios;     // Stage 3: derived ratios + industry mapping
pub mod aggregate;  // Stage 4: grouped views + correlation
pub mod export;     // Stage 5: atomic publish of every artifact
pub mod pipeline;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use config::PipelineConfig;
pub use table::Table;
pub use loader::{load_sources, load_table};
pub use join::{inner_join, JoinReport, JoinedTable};
pub use ratios::{enrich, EnrichedRecord, EnrichedTable, Industry, LineItems, Ratios};
pub use aggregate::{aggregate, AggregateView, Aggregates, Correlation};
pub use export::{verify_artifacts, SummaryStats, DECLARED_ARTIFACTS};
pub use pipeline::{run, run_in_memory, Analysis, RunReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
