//! Split constants and default preset factories.

use crate::spec::{EnumOutputConflictStrategy, SpecSplitConfig};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Default number of output sheets per part file.
pub const N_SHEETS_PER_FILE_DEFAULT: usize = 3;
/// Default number of data rows per output sheet (header excluded).
pub const N_ROWS_PER_SHEET_DEFAULT: usize = 40_000;
/// Default number of rows pulled from the source per read call.
pub const N_ROWS_CHUNK_DEFAULT: usize = 10_000;
/// Upper bound used when the worker count is derived from the host.
pub const N_WORKERS_AUTO_MAX: usize = 8;

/// Infix between the input base name and the 1-based part number.
pub const C_PART_INFIX: &str = "_part";
/// Extension of every produced part file.
pub const C_PART_EXTENSION: &str = "xlsx";
/// Base name used when the input path has no usable file stem.
pub const C_NAME_BASE_FALLBACK: &str = "output";
/// Suffix of a part file while it is being saved.
pub const C_PART_TEMP_SUFFIX: &str = ".tmp";

/// Number formats for date/time cells (calamine does not keep the source format).
pub const C_NUM_FORMAT_DATE: &str = "yyyy-mm-dd";
pub const C_NUM_FORMAT_DATETIME: &str = "yyyy-mm-dd hh:mm:ss";
pub const C_NUM_FORMAT_TIME: &str = "hh:mm:ss";
pub const C_NUM_FORMAT_DURATION: &str = "[h]:mm:ss";

/// Build default split config (sequential).
pub fn derive_default_split_config() -> SpecSplitConfig {
    SpecSplitConfig {
        sheets_per_file: N_SHEETS_PER_FILE_DEFAULT,
        rows_per_sheet: N_ROWS_PER_SHEET_DEFAULT,
        chunk_size: N_ROWS_CHUNK_DEFAULT,
        num_workers: 1,
    }
}

/// Default conflict rule for already existing part files.
pub fn derive_default_conflict_strategy() -> EnumOutputConflictStrategy {
    EnumOutputConflictStrategy::Overwrite
}
