//! TOML configuration file support.
//!
//! Split settings can live in a config file instead of flags:
//!
//! ```toml
//! # sheetkit.toml
//! [split]
//! sheets_per_file = 3
//! rows_per_sheet = 40000
//! chunk_size = 10000
//! workers = 4
//! name_base = "sales"
//! overwrite = false
//! ```
//!
//! Command-line flags take precedence over the file; missing values fall
//! back to the built-in defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use sheetkit_io_split::{
    EnumOutputConflictStrategy, SpecSplitConfig, calculate_worker_limit,
};

/// Root configuration structure for sheetkit.toml files.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Split settings.
    #[serde(default)]
    pub split: SplitSettings,
}

/// Optional split settings; every field may also come from the command line.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitSettings {
    /// Output sheets per part file.
    pub sheets_per_file: Option<usize>,

    /// Data rows per output sheet (header excluded).
    pub rows_per_sheet: Option<usize>,

    /// Rows read per source call.
    pub chunk_size: Option<usize>,

    /// Worker count; host CPUs minus one when unset.
    pub workers: Option<usize>,

    /// Part name prefix; input file stem when unset.
    pub name_base: Option<String>,

    /// Replace existing part files (default `true`).
    pub overwrite: Option<bool>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }
}

impl SplitSettings {
    /// Layer `overrides` on top of `self`: set fields of `overrides` win.
    pub fn merge(self, overrides: SplitSettings) -> SplitSettings {
        SplitSettings {
            sheets_per_file: overrides.sheets_per_file.or(self.sheets_per_file),
            rows_per_sheet: overrides.rows_per_sheet.or(self.rows_per_sheet),
            chunk_size: overrides.chunk_size.or(self.chunk_size),
            workers: overrides.workers.or(self.workers),
            name_base: overrides.name_base.or(self.name_base),
            overwrite: overrides.overwrite.or(self.overwrite),
        }
    }

    /// Resolve to a kernel config, filling gaps with defaults. Values are validated by the kernel.
    pub fn to_split_config(&self) -> SpecSplitConfig {
        let cfg_default = SpecSplitConfig::default();
        SpecSplitConfig {
            sheets_per_file: self.sheets_per_file.unwrap_or(cfg_default.sheets_per_file),
            rows_per_sheet: self.rows_per_sheet.unwrap_or(cfg_default.rows_per_sheet),
            chunk_size: self.chunk_size.unwrap_or(cfg_default.chunk_size),
            num_workers: self
                .workers
                .unwrap_or_else(|| calculate_worker_limit(None)),
        }
    }

    /// Conflict rule for existing part files.
    pub fn conflict_strategy(&self) -> EnumOutputConflictStrategy {
        match self.overwrite {
            Some(false) => EnumOutputConflictStrategy::Error,
            _ => EnumOutputConflictStrategy::Overwrite,
        }
    }
}
