//! Split config/plan/report models and top-level error types.

use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::conf::{
    C_NAME_BASE_FALLBACK, N_NROWS_EXCEL_MAX, derive_default_conflict_strategy,
    derive_default_split_config,
};

////////////////////////////////////////////////////////////////////////////////
// #region CellValues

/// Normalized cell value flowing from reader to writer.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Bool(bool),
    /// Excel date/time serial (days since 1899-12-30); durations are flagged.
    DateTime { serial: f64, is_duration: bool },
}

/// One row: ordered cell values, column 0 first.
pub type TypeRow = Vec<EnumCellValue>;

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ConfigAndTarget

/// Capacity and scheduling parameters of one split run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecSplitConfig {
    /// Output sheets per part file.
    pub sheets_per_file: usize,
    /// Data rows per output sheet, header excluded.
    pub rows_per_sheet: usize,
    /// Rows pulled from the source per read call.
    pub chunk_size: usize,
    /// Worker count; `1` runs on the calling thread.
    pub num_workers: usize,
}

impl Default for SpecSplitConfig {
    fn default() -> Self {
        derive_default_split_config()
    }
}

impl SpecSplitConfig {
    /// Reject non-positive values and sheets that cannot hold header + data.
    pub fn validate(&self) -> Result<(), SplitError> {
        let l_args = [
            ("sheets_per_file", self.sheets_per_file),
            ("rows_per_sheet", self.rows_per_sheet),
            ("chunk_size", self.chunk_size),
            ("num_workers", self.num_workers),
        ];
        for (c_arg, n_value) in l_args {
            if n_value == 0 {
                return Err(SplitError::Config(format!("Arg `{c_arg}` must be >= 1.")));
            }
        }

        let n_rows_data_max = N_NROWS_EXCEL_MAX - 1;
        if self.rows_per_sheet > n_rows_data_max {
            return Err(SplitError::Config(format!(
                "Arg `rows_per_sheet` must be <= {n_rows_data_max} (one row is reserved for the header)."
            )));
        }
        Ok(())
    }
}

/// Existing part file policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumOutputConflictStrategy {
    /// Replace an existing part file.
    Overwrite,
    /// Reject the run before any worker starts.
    Error,
}

/// Where and under which name the parts are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSplitTarget {
    /// Output directory, created when missing.
    pub dir_output: PathBuf,
    /// Part name prefix: `<name_base>_part<N>.xlsx`.
    pub name_base: String,
    /// Behavior for part paths that already exist.
    pub rule_conflict: EnumOutputConflictStrategy,
}

impl SpecSplitTarget {
    /// Derive target from the input path stem.
    pub fn from_input_path(path_input: &Path, dir_output: &Path) -> Self {
        let name_base = path_input
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .filter(|stem| !stem.trim().is_empty())
            .unwrap_or_else(|| C_NAME_BASE_FALLBACK.to_string());

        Self {
            dir_output: dir_output.to_path_buf(),
            name_base,
            rule_conflict: derive_default_conflict_strategy(),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SourceAndSlots

/// One source sheet discovered at start; immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSourceSheet {
    /// Position in the input workbook.
    pub ordinal: usize,
    /// Sheet name, unique within the input.
    pub name: String,
    /// Data rows, header excluded.
    pub n_rows: usize,
    /// First row of the sheet, repeated on every output sheet cut from it.
    pub header: TypeRow,
}

/// Output location of one data row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecSlotAddress {
    /// Zero-based part file index.
    pub n_file_idx: usize,
    /// Zero-based sheet index within the part file.
    pub n_sheet_idx: usize,
    /// Zero-based data-row offset within the output sheet.
    pub n_row_offset: usize,
    /// Zero-based output sheet index within the source sheet.
    pub n_part_idx: usize,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PlanModels

/// Static work assignment of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecWorkerShard {
    /// Zero-based worker index.
    pub worker_idx: usize,
    /// Source sheet ordinals, in input order.
    pub sheet_ordinals: Vec<usize>,
    /// Sum of data rows over the assigned sheets.
    pub n_rows_total: usize,
    /// Part file indices owned exclusively by this worker.
    pub file_idx_range: Range<usize>,
}

/// One planned output sheet inside a part file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetSlotPlan {
    /// Zero-based sheet index within the part file.
    pub n_sheet_idx: usize,
    /// Ordinal of the source sheet feeding this slot.
    pub sheet_ordinal: usize,
    /// Zero-based output sheet index within the source sheet.
    pub n_part_idx: usize,
    /// Planned sheet name (before per-file uniqueness is applied).
    pub sheet_name: String,
    /// Data rows this slot receives.
    pub n_rows: usize,
}

/// One planned part file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecOutputFilePlan {
    /// Zero-based part file index.
    pub n_file_idx: usize,
    /// Destination path.
    pub path: PathBuf,
    /// Worker owning this file.
    pub worker_idx: usize,
    /// Sheet slots, by increasing `n_sheet_idx`.
    pub slots: Vec<SpecSheetSlotPlan>,
}

/// Complete up-front layout of a split run.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSplitPlan {
    /// Config the plan was computed for.
    pub config: SpecSplitConfig,
    /// Source sheets by ordinal.
    pub sheets: Vec<SpecSourceSheet>,
    /// First global sheet slot of each source sheet, by ordinal.
    pub n_slot_base_by_sheet: Vec<usize>,
    /// Worker shards, by worker index.
    pub shards: Vec<SpecWorkerShard>,
    /// Part files, by file index.
    pub files: Vec<SpecOutputFilePlan>,
}

impl SpecSplitPlan {
    /// Total number of output sheets over all part files.
    pub fn sheet_slot_count(&self) -> usize {
        self.files.iter().map(|file_plan| file_plan.slots.len()).sum()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportItems

/// One sheet persisted inside a part file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecOutputSheet {
    /// Sheet name as written.
    pub sheet_name: String,
    /// Name of the source sheet it was cut from.
    pub source_sheet: String,
    /// Data rows written, header excluded.
    pub n_rows: usize,
}

/// One persisted part file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecOutputFile {
    /// Zero-based part file index.
    pub n_file_idx: usize,
    /// Persisted path.
    pub path: PathBuf,
    /// Worker that produced the file.
    pub worker_idx: usize,
    /// Sheets in workbook order.
    pub sheets: Vec<SpecOutputSheet>,
}

/// One worker failure with user-facing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSplitFailure {
    /// Failed worker.
    pub worker_idx: usize,
    /// User-facing error text.
    pub exception: String,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Split failures.
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    /// Invalid parameter, rejected before any I/O.
    #[error("Invalid config: {0}")]
    Config(String),

    /// Input workbook cannot be opened.
    #[error("Failed to open source {}: {message}", path.display())]
    SourceOpen {
        /// Input path.
        path: PathBuf,
        /// Underlying error text.
        message: String,
    },

    /// Source sheet cannot be read or changed while being read.
    #[error("Failed to read sheet {sheet:?}: {message}")]
    SourceRead {
        /// Source sheet name.
        sheet: String,
        /// Underlying error text.
        message: String,
    },

    /// Destination cannot be written.
    #[error("Failed to write {}: {message}", path.display())]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying error text.
        message: String,
    },

    /// Sheet buffer received more rows than its capacity (internal defect).
    #[error("Sheet buffer {sheet_name:?} is full (capacity={n_capacity})")]
    CapacityExceeded {
        /// Planned output sheet name.
        sheet_name: String,
        /// Buffer capacity.
        n_capacity: usize,
    },

    /// Run stopped at a chunk boundary on request.
    #[error("Split cancelled")]
    Cancelled,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_config_rejects_zero_values() {
        let cfg_split = SpecSplitConfig {
            chunk_size: 0,
            ..SpecSplitConfig::default()
        };
        let err = cfg_split.validate().expect_err("zero chunk size must fail");
        assert!(matches!(err, SplitError::Config(ref msg) if msg.contains("chunk_size")));

        let cfg_split = SpecSplitConfig {
            num_workers: 0,
            ..SpecSplitConfig::default()
        };
        assert!(matches!(cfg_split.validate(), Err(SplitError::Config(_))));
    }

    #[test]
    fn split_config_reserves_header_row() {
        let cfg_split = SpecSplitConfig {
            rows_per_sheet: N_NROWS_EXCEL_MAX,
            ..SpecSplitConfig::default()
        };
        assert!(matches!(cfg_split.validate(), Err(SplitError::Config(_))));

        let cfg_split = SpecSplitConfig {
            rows_per_sheet: N_NROWS_EXCEL_MAX - 1,
            ..SpecSplitConfig::default()
        };
        assert!(cfg_split.validate().is_ok());
    }

    #[test]
    fn split_target_uses_input_stem() {
        let target =
            SpecSplitTarget::from_input_path(Path::new("/data/sales_2024.xlsx"), Path::new("out"));
        assert_eq!(target.name_base, "sales_2024");
        assert_eq!(target.dir_output, PathBuf::from("out"));
        assert_eq!(target.rule_conflict, EnumOutputConflictStrategy::Overwrite);

        let target = SpecSplitTarget::from_input_path(Path::new("/"), Path::new("out"));
        assert_eq!(target.name_base, "output");
    }
}
