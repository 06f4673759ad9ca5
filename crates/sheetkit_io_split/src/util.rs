//! Stateless helper utilities used by the split kernel.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::conf::{
    C_NUM_FORMAT_DATE, C_NUM_FORMAT_DATETIME, C_NUM_FORMAT_DURATION, C_NUM_FORMAT_TIME,
    C_PART_EXTENSION, C_PART_INFIX, C_PART_TEMP_SUFFIX, N_LEN_EXCEL_SHEET_NAME_MAX,
    N_WORKERS_AUTO_MAX, TUP_EXCEL_ILLEGAL,
};

////////////////////////////////////////////////////////////////////////////////
// #region CapacityMath

/// Number of output sheets needed for `n_rows` data rows (`ceil`, no trailing empty sheet).
pub fn calculate_sheet_slot_count(n_rows: usize, rows_per_sheet: usize) -> usize {
    n_rows.div_ceil(rows_per_sheet)
}

/// Rows landing in output sheet `n_part_idx` of a source sheet with `n_rows` rows.
pub fn calculate_part_row_count(n_rows: usize, rows_per_sheet: usize, n_part_idx: usize) -> usize {
    let n_row_start = n_part_idx * rows_per_sheet;
    usize::min(rows_per_sheet, n_rows.saturating_sub(n_row_start))
}

/// Resolve the worker count: explicit values are kept, `None` uses host CPUs minus one.
pub fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.max(1),
        None => n_cpu.saturating_sub(1).clamp(1, N_WORKERS_AUTO_MAX),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Naming

/// Part file name for zero-based `n_file_idx`: `<base>_part<N>.xlsx` with 1-based `N`.
pub fn derive_part_file_name(name_base: &str, n_file_idx: usize) -> String {
    format!(
        "{name_base}{C_PART_INFIX}{}.{C_PART_EXTENSION}",
        n_file_idx + 1
    )
}

/// Sibling path a part file is saved to before being renamed into place.
pub fn derive_temp_part_path(path_file_out: &Path) -> PathBuf {
    let mut c_file_name = path_file_out
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from(C_PART_EXTENSION));
    c_file_name.push(C_PART_TEMP_SUFFIX);
    path_file_out.with_file_name(c_file_name)
}

/// Output sheet name: bare source name for a single part, `<name>_<k>` otherwise.
pub fn derive_output_sheet_name(source_name: &str, n_part_idx: usize, n_parts: usize) -> String {
    let c_name = sanitize_sheet_name(source_name, "_");
    if n_parts <= 1 {
        return c_name;
    }
    create_sheet_identifier(&c_name, n_part_idx + 1)
}

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    // Excel refuses names that start or end with an apostrophe.
    c_name = c_name.trim().trim_matches('\'').trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Create suffixed sheet name (`base_1`, `base_2`, ...), respecting length cap.
pub fn create_sheet_identifier(base_name: &str, part_idx_1based: usize) -> String {
    let c_sheet_name_suffix = format!("_{part_idx_1based}");
    let n_len_base_name_max = N_LEN_EXCEL_SHEET_NAME_MAX.saturating_sub(c_sheet_name_suffix.len());

    let c_sheet_name_base: String = base_name
        .chars()
        .take(usize::max(1, n_len_base_name_max))
        .collect();

    format!("{c_sheet_name_base}{c_sheet_name_suffix}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DateTimeFormats

/// Pick a display format for an Excel serial: whole days are dates, a pure
/// fraction is a time of day, anything else a full timestamp.
pub fn derive_datetime_num_format(serial: f64, is_duration: bool) -> &'static str {
    if is_duration {
        return C_NUM_FORMAT_DURATION;
    }
    let frac = serial.abs().fract();
    if serial.abs() < 1.0 && frac != 0.0 {
        return C_NUM_FORMAT_TIME;
    }
    if frac == 0.0 {
        return C_NUM_FORMAT_DATE;
    }
    C_NUM_FORMAT_DATETIME
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_slot_count_has_no_trailing_empty_sheet() {
        assert_eq!(calculate_sheet_slot_count(0, 40), 0);
        assert_eq!(calculate_sheet_slot_count(1, 40), 1);
        assert_eq!(calculate_sheet_slot_count(40, 40), 1);
        assert_eq!(calculate_sheet_slot_count(41, 40), 2);
        assert_eq!(calculate_sheet_slot_count(80, 40), 2);
    }

    #[test]
    fn test_part_row_count_covers_last_partial_sheet() {
        assert_eq!(calculate_part_row_count(100, 40, 0), 40);
        assert_eq!(calculate_part_row_count(100, 40, 1), 40);
        assert_eq!(calculate_part_row_count(100, 40, 2), 20);
        assert_eq!(calculate_part_row_count(100, 40, 3), 0);
    }

    #[test]
    fn test_part_file_name_is_one_based() {
        assert_eq!(derive_part_file_name("big", 0), "big_part1.xlsx");
        assert_eq!(derive_part_file_name("big", 11), "big_part12.xlsx");
    }

    #[test]
    fn test_output_sheet_name_suffix_only_when_split() {
        assert_eq!(derive_output_sheet_name("Orders", 0, 1), "Orders");
        assert_eq!(derive_output_sheet_name("Orders", 0, 3), "Orders_1");
        assert_eq!(derive_output_sheet_name("Orders", 2, 3), "Orders_3");
        assert_eq!(derive_output_sheet_name("a/b", 1, 2), "a_b_2");
    }

    #[test]
    fn test_sheet_identifier_keeps_suffix_within_limit() {
        let c_long = "x".repeat(40);
        let c_name = create_sheet_identifier(&c_long, 12);
        assert_eq!(c_name.chars().count(), N_LEN_EXCEL_SHEET_NAME_MAX);
        assert!(c_name.ends_with("_12"));
    }

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("Q1:Q2 [draft]", "_"), "Q1_Q2 _draft_");
        assert_eq!(sanitize_sheet_name("'quoted'", "_"), "quoted");
        assert_eq!(sanitize_sheet_name("  ", "_"), "Sheet");
        assert_eq!(sanitize_sheet_name(&"y".repeat(50), "_").len(), 31);
    }

    #[test]
    fn test_worker_limit_keeps_explicit_value() {
        assert_eq!(calculate_worker_limit(Some(3)), 3);
        assert_eq!(calculate_worker_limit(Some(0)), 1);
        let n_auto = calculate_worker_limit(None);
        assert!((1..=N_WORKERS_AUTO_MAX).contains(&n_auto));
    }

    #[test]
    fn test_temp_part_path_stays_in_output_dir() {
        let path_file_out = Path::new("out").join("sales_part1.xlsx");
        assert_eq!(
            derive_temp_part_path(&path_file_out),
            Path::new("out").join("sales_part1.xlsx.tmp")
        );
    }

    #[test]
    fn test_datetime_num_format_by_serial_kind() {
        assert_eq!(derive_datetime_num_format(45306.0, false), "yyyy-mm-dd");
        assert_eq!(derive_datetime_num_format(45306.25, false), "yyyy-mm-dd hh:mm:ss");
        assert_eq!(derive_datetime_num_format(0.5, false), "hh:mm:ss");
        assert_eq!(derive_datetime_num_format(1.5, true), "[h]:mm:ss");
    }
}
