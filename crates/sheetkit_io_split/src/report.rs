//! Split report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;

use crate::spec::{SpecOutputFile, SpecSplitFailure};

/// Aggregate counters and diagnostics for one split run.
#[derive(Debug, Default, Clone)]
pub struct ReportSplit {
    /// Source sheets discovered in the input.
    pub cnt_sheets_source: u64,
    /// Data rows pulled from the source.
    pub cnt_rows_read: u64,
    /// Output sheets persisted.
    pub cnt_sheets_written: u64,
    /// Part files persisted.
    pub cnt_files_written: u64,
    /// Workers the run was partitioned into.
    pub cnt_workers: u64,
    /// Workers stopped before finishing their shard.
    pub cnt_workers_cancelled: u64,
    /// Persisted part files, by file index.
    pub files: Vec<SpecOutputFile>,
    /// Non-fatal notes (cancelled workers, pool fallback).
    pub warnings: Vec<String>,
    /// Per-worker failures.
    pub errors: Vec<SpecSplitFailure>,
}

impl ReportSplit {
    /// Number of collected hard errors.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Every worker finished and every planned file was persisted.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.cnt_workers_cancelled == 0
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_sheets_source".to_string(), self.cnt_sheets_source);
        dict_counts.insert("cnt_rows_read".to_string(), self.cnt_rows_read);
        dict_counts.insert("cnt_sheets_written".to_string(), self.cnt_sheets_written);
        dict_counts.insert("cnt_files_written".to_string(), self.cnt_files_written);
        dict_counts.insert("cnt_workers".to_string(), self.cnt_workers);
        dict_counts.insert(
            "cnt_workers_cancelled".to_string(),
            self.cnt_workers_cancelled,
        );
        dict_counts.insert("cnt_errors".to_string(), self.error_count() as u64);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} sheets={} rows={} sheets_written={} files={} workers={} cancelled={} errors={} warnings={}",
            dict_counts["cnt_sheets_source"],
            dict_counts["cnt_rows_read"],
            dict_counts["cnt_sheets_written"],
            dict_counts["cnt_files_written"],
            dict_counts["cnt_workers"],
            dict_counts["cnt_workers_cancelled"],
            dict_counts["cnt_errors"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[SPLIT]"))
    }
}

/// Mutable accumulator for split statistics; one per worker, merged at the end.
#[derive(Debug, Default, Clone)]
pub struct ReportSplitBuilder {
    /// See [`ReportSplit::cnt_sheets_source`].
    pub cnt_sheets_source: u64,
    /// See [`ReportSplit::cnt_rows_read`].
    pub cnt_rows_read: u64,
    /// See [`ReportSplit::cnt_workers`].
    pub cnt_workers: u64,
    /// See [`ReportSplit::cnt_workers_cancelled`].
    pub cnt_workers_cancelled: u64,
    /// See [`ReportSplit::files`].
    pub files: Vec<SpecOutputFile>,
    /// See [`ReportSplit::warnings`].
    pub warnings: Vec<String>,
    /// See [`ReportSplit::errors`].
    pub errors: Vec<SpecSplitFailure>,
}

impl ReportSplitBuilder {
    /// Increment read-row count by `value`.
    pub fn add_rows_read(&mut self, value: u64) {
        self.cnt_rows_read += value;
    }

    /// Record one persisted part file.
    pub fn add_file(&mut self, file: SpecOutputFile) {
        self.files.push(file);
    }

    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Add one worker-scoped error.
    pub fn add_error(&mut self, worker_idx: usize, exception: String) {
        self.errors.push(SpecSplitFailure {
            worker_idx,
            exception,
        });
    }

    /// Record a worker stopped at a chunk boundary.
    pub fn add_cancelled(&mut self, warning: String) {
        self.cnt_workers_cancelled += 1;
        self.warnings.push(warning);
    }

    /// Fold a worker-local builder into this one.
    pub fn merge(&mut self, other: ReportSplitBuilder) {
        self.cnt_rows_read += other.cnt_rows_read;
        self.cnt_workers_cancelled += other.cnt_workers_cancelled;
        self.files.extend(other.files);
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }

    /// Finalize builder into immutable report.
    pub fn build(mut self) -> ReportSplit {
        self.files.sort_by_key(|file| file.n_file_idx);
        self.errors.sort_by_key(|failure| failure.worker_idx);

        ReportSplit {
            cnt_sheets_source: self.cnt_sheets_source,
            cnt_rows_read: self.cnt_rows_read,
            cnt_sheets_written: self.files.iter().map(|file| file.sheets.len() as u64).sum(),
            cnt_files_written: self.files.len() as u64,
            cnt_workers: self.cnt_workers,
            cnt_workers_cancelled: self.cnt_workers_cancelled,
            files: self.files,
            warnings: self.warnings,
            errors: self.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::spec::SpecOutputSheet;

    fn make_file(n_file_idx: usize, n_sheets: usize) -> SpecOutputFile {
        SpecOutputFile {
            n_file_idx,
            path: PathBuf::from(format!("out/x_part{}.xlsx", n_file_idx + 1)),
            worker_idx: 0,
            sheets: (0..n_sheets)
                .map(|idx| SpecOutputSheet {
                    sheet_name: format!("S_{}", idx + 1),
                    source_sheet: "S".to_string(),
                    n_rows: 10,
                })
                .collect(),
        }
    }

    #[test]
    fn report_split_to_dict_and_format() {
        let report = ReportSplit {
            cnt_sheets_source: 2,
            cnt_rows_read: 120,
            cnt_sheets_written: 4,
            cnt_files_written: 2,
            cnt_workers: 1,
            cnt_workers_cancelled: 0,
            files: vec![],
            warnings: vec!["w".to_string()],
            errors: vec![],
        };

        let dict_counts = report.to_dict();
        assert_eq!(dict_counts["cnt_rows_read"], 120);
        assert_eq!(dict_counts["cnt_errors"], 0);
        assert_eq!(dict_counts["cnt_warnings"], 1);

        let txt = report.format("[SPLIT]");
        assert_eq!(
            txt,
            "[SPLIT] sheets=2 rows=120 sheets_written=4 files=2 workers=1 cancelled=0 errors=0 warnings=1"
        );
        assert_eq!(report.to_string(), txt);
        assert!(report.is_success());
    }

    #[test]
    fn builder_merges_workers_and_sorts_files() {
        let mut builder = ReportSplitBuilder {
            cnt_sheets_source: 3,
            cnt_workers: 2,
            ..ReportSplitBuilder::default()
        };

        let mut builder_w1 = ReportSplitBuilder::default();
        builder_w1.add_rows_read(30);
        builder_w1.add_file(make_file(2, 1));
        builder_w1.add_error(1, "disk full".to_string());

        let mut builder_w0 = ReportSplitBuilder::default();
        builder_w0.add_rows_read(50);
        builder_w0.add_file(make_file(0, 2));
        builder_w0.add_file(make_file(1, 1));

        builder.merge(builder_w1);
        builder.merge(builder_w0);
        let report = builder.build();

        assert_eq!(report.cnt_rows_read, 80);
        assert_eq!(report.cnt_files_written, 3);
        assert_eq!(report.cnt_sheets_written, 4);
        let l_idx: Vec<usize> = report.files.iter().map(|f| f.n_file_idx).collect();
        assert_eq!(l_idx, vec![0, 1, 2]);
        assert_eq!(report.error_count(), 1);
        assert!(!report.is_success());
    }

    #[test]
    fn cancelled_worker_is_not_success() {
        let mut builder = ReportSplitBuilder::default();
        builder.add_warning("pool fallback".to_string());
        assert!(builder.clone().build().is_success());

        builder.add_cancelled("worker 1 cancelled after 2 files".to_string());
        let report = builder.build();
        assert_eq!(report.error_count(), 0);
        assert_eq!(report.to_dict()["cnt_workers_cancelled"], 1);
        assert!(!report.is_success());
    }
}
