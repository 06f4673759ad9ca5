//! # sheetkit-split
//!
//! Split one large `.xlsx` workbook into smaller part files, each bounded by
//! a sheet count per file and a data-row count per sheet.
//!
//! ## Usage
//!
//! ```bash
//! # 3 sheets x 40 000 rows per part, parts written to ./parts
//! sheetkit-split big.xlsx parts
//!
//! # smaller parts on 4 workers, settings from a config file
//! sheetkit-split big.xlsx parts --rows 10000 --workers 4 --config sheetkit.toml
//! ```
//!
//! Exit code is 0 when every part was written, 1 otherwise.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;

use sheetkit_io_split::{
    LogObserver, SpecSplitTarget, XlsxSheetSource, XlsxWorkbookWriter, split_workbook,
};

use crate::config::{Config, SplitSettings};

/// sheetkit-split - chunked XLSX splitter
#[derive(Parser, Debug)]
#[command(name = "sheetkit-split")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input workbook path
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Directory receiving the part files (created when missing)
    #[arg(value_name = "OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Output sheets per part file [default: 3]
    #[arg(short = 's', long = "sheets")]
    sheets_per_file: Option<usize>,

    /// Data rows per output sheet, header excluded [default: 40000]
    #[arg(short = 'r', long = "rows")]
    rows_per_sheet: Option<usize>,

    /// Rows read from the input per call [default: 10000]
    #[arg(short = 'c', long)]
    chunk_size: Option<usize>,

    /// Parallel workers [default: CPU count - 1]
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Part file prefix [default: input file stem]
    #[arg(long)]
    name_base: Option<String>,

    /// Fail instead of replacing existing part files
    #[arg(long)]
    no_overwrite: bool,

    /// TOML config file with a [split] table
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn to_settings(&self) -> SplitSettings {
        SplitSettings {
            sheets_per_file: self.sheets_per_file,
            rows_per_sheet: self.rows_per_sheet,
            chunk_size: self.chunk_size,
            workers: self.workers,
            name_base: self.name_base.clone(),
            overwrite: self.no_overwrite.then_some(false),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    run_split(&cli)
}

fn run_split(cli: &Cli) -> Result<()> {
    let settings_file = match &cli.config {
        Some(path_config) => Config::from_file(path_config)?.split,
        None => SplitSettings::default(),
    };
    let settings = settings_file.merge(cli.to_settings());
    let cfg_split = settings.to_split_config();

    let mut target = SpecSplitTarget::from_input_path(&cli.input, &cli.output_dir);
    if let Some(name_base) = &settings.name_base {
        target.name_base = name_base.clone();
    }
    target.rule_conflict = settings.conflict_strategy();

    info!("Input:  {}", cli.input.display());
    info!("Output: {}", cli.output_dir.display());
    info!(
        "Sheets per file: {}, rows per sheet: {}, chunk size: {}, workers: {}",
        cfg_split.sheets_per_file,
        cfg_split.rows_per_sheet,
        cfg_split.chunk_size,
        cfg_split.num_workers
    );

    let report = split_workbook(
        &XlsxSheetSource::new(&cli.input),
        &XlsxWorkbookWriter::new(),
        &target,
        cfg_split,
        &LogObserver,
    )
    .with_context(|| format!("Failed to split {}", cli.input.display()))?;

    for warning in &report.warnings {
        warn!("{warning}");
    }
    for failure in &report.errors {
        error!("worker {}: {}", failure.worker_idx, failure.exception);
    }
    println!("{report}");

    if !report.is_success() {
        anyhow::bail!(
            "Split incomplete: {} of {} worker(s) failed, {} cancelled",
            report.error_count(),
            report.cnt_workers,
            report.cnt_workers_cancelled
        );
    }
    Ok(())
}
