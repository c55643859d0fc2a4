use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

use ratio_pipeline::config::{DEFAULT_BALANCE_SHEET, DEFAULT_INCOME_STATEMENT};
use ratio_pipeline::{run, PipelineConfig, PipelineError};

/// Compute financial ratios and summaries from a balance sheet and an
/// income statement
#[derive(Debug, Parser)]
#[command(name = "ratio-pipeline", version)]
struct Cli {
    /// Balance sheet (CSV or .xlsx/.xls/.ods workbook)
    #[arg(long, env = "RATIO_BALANCE_SHEET", default_value = DEFAULT_BALANCE_SHEET)]
    balance_sheet: PathBuf,

    /// Income statement (CSV or workbook)
    #[arg(long, env = "RATIO_INCOME_STATEMENT", default_value = DEFAULT_INCOME_STATEMENT)]
    income_statement: PathBuf,

    /// Directory receiving every artifact
    #[arg(long, env = "RATIO_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Skip the completion summary on stdout
    #[arg(long)]
    quiet: bool,
}

impl From<&Cli> for PipelineConfig {
    fn from(cli: &Cli) -> Self {
        PipelineConfig::new(&cli.balance_sheet, &cli.income_statement, &cli.output_dir)
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("ratio_pipeline=info"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging() {
        eprintln!("❌ Logging setup failed: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&PipelineConfig::from(&cli)) {
        Ok(report) => {
            if !cli.quiet {
                println!("{}", report.summary());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure(&e);
            ExitCode::FAILURE
        }
    }
}

fn report_failure(e: &PipelineError) {
    error!(kind = e.kind(), "{}", e);
    eprintln!("❌ error[{}]: {}", e.kind(), e);
}
