//! Command-line shell for the callmetrics pipeline
//!
//! Loads a sales data file, drives the batch analysis with a progress bar,
//! and writes the three-sheet report. Per-product fit warnings stream to
//! the log as they arrive; fatal errors abort before a report is produced.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use callmetrics_core::engine::{analyze, AnalysisObserver, AnalysisStage};
use callmetrics_core::report::{assemble, REPORT_FILE_NAME};
use callmetrics_core::table::load_table;
use callmetrics_core::{AnalysisConfig, LmmOptions, StatsError};

#[derive(Parser, Debug)]
#[command(
    name = "callmetrics",
    version,
    about = "Batch correlation / ICC / LMM analysis of store-level sales-call metrics"
)]
struct Cli {
    /// Input data file (.csv, .xlsx, .xls, .ods)
    input: PathBuf,

    /// Store identifier column (grouping variable)
    #[arg(long)]
    group: Option<String>,

    /// Behavioral metric columns, comma separated (nominally six)
    #[arg(long, value_delimiter = ',')]
    metrics: Vec<String>,

    /// Product performance columns to analyze, comma separated
    #[arg(long, value_delimiter = ',')]
    products: Vec<String>,

    /// Worksheet name for spreadsheet inputs (defaults to the first sheet)
    #[arg(long)]
    sheet: Option<String>,

    /// Output report path
    #[arg(long, default_value = REPORT_FILE_NAME)]
    output: PathBuf,

    /// Confidence level for fixed-effect intervals
    #[arg(long, default_value_t = 0.95)]
    confidence_level: f64,

    /// List column names and exit
    #[arg(long)]
    list_columns: bool,

    /// Verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

struct ShellObserver {
    bar: ProgressBar,
}

impl AnalysisObserver for ShellObserver {
    fn on_progress(&mut self, completed: usize, _total: usize) {
        self.bar.set_position(completed as u64);
    }

    fn on_product_issue(&mut self, product: &str, stage: AnalysisStage, err: &StatsError) {
        self.bar.suspend(|| match stage {
            AnalysisStage::Icc => warn!("ICC estimation failed for {product}: {err}"),
            AnalysisStage::Lmm => error!("LMM fit failed for {product}: {err}"),
        });
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let table = load_table(&cli.input, cli.sheet.as_deref())
        .with_context(|| format!("failed to load {}", cli.input.display()))?;
    info!(
        "loaded {} rows x {} columns from {}",
        table.n_rows(),
        table.n_columns(),
        cli.input.display()
    );

    if cli.list_columns {
        for name in table.headers() {
            println!("{name}");
        }
        return Ok(());
    }

    let Some(group) = cli.group else {
        bail!("--group is required (use --list-columns to inspect the table)");
    };
    if cli.metrics.is_empty() {
        bail!("--metrics is required (use --list-columns to inspect the table)");
    }
    if cli.products.is_empty() {
        bail!("--products is required (use --list-columns to inspect the table)");
    }

    let config = AnalysisConfig {
        group_column: group,
        metric_columns: cli.metrics,
        product_columns: cli.products,
    };
    let options = LmmOptions {
        confidence_level: cli.confidence_level,
        ..Default::default()
    };

    let bar = ProgressBar::new(config.product_columns.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} products")
            .context("invalid progress template")?,
    );
    let mut observer = ShellObserver { bar };

    let batch = analyze(&table, &config, &options, &mut observer).context("analysis aborted")?;
    observer.bar.finish_and_clear();

    let report = assemble(&batch, &config);
    let bytes = report.to_xlsx_bytes().context("failed to serialize report")?;
    std::fs::write(&cli.output, &bytes)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    let complete = batch.n_complete();
    let total = batch.n_products();
    if complete == total {
        info!("analysis complete: all {total} products fitted");
    } else {
        warn!("partial success: {complete}/{total} products fully fitted (see warnings above)");
    }
    info!("report written to {}", cli.output.display());

    Ok(())
}
