//! Output-side workbook writers.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use crate::conf::{N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX};
use crate::spec::{EnumCellValue, SplitError, TypeRow};
use crate::util::{derive_datetime_num_format, derive_temp_part_path, sanitize_sheet_name};

/// Persists part files. Shared by all workers; one handle per open file.
pub trait WorkbookWriter: Sync {
    /// In-progress part file.
    type Handle;

    /// Start a new part file destined for `path`. Nothing is persisted yet.
    fn create_file(&self, path: &Path) -> Result<Self::Handle, SplitError>;

    /// Add one sheet (header row first, then data rows) and return the applied sheet name.
    fn write_sheet(
        &self,
        file: &mut Self::Handle,
        sheet_name: &str,
        header: &[EnumCellValue],
        rows: &[TypeRow],
    ) -> Result<String, SplitError>;

    /// Persist the part file.
    fn close_file(&self, file: Self::Handle) -> Result<(), SplitError>;
}

////////////////////////////////////////////////////////////////////////////////
// #region SheetNames

/// Tracks names used inside one workbook (Excel compares them case-insensitively).
#[derive(Debug, Default, Clone)]
pub struct SheetNameRegistry {
    set_sheet_names_existing: BTreeSet<String>,
}

impl SheetNameRegistry {
    /// Sanitize `name` and make it unique: `name`, `name__2`, `name__3`, ...
    pub fn derive_unique_sheet_name(&mut self, name: &str) -> String {
        let c_name = sanitize_sheet_name(name, "_");
        if self.set_sheet_names_existing.insert(c_name.to_lowercase()) {
            return c_name;
        }

        let base_name: String = c_name
            .chars()
            .take(usize::max(1, N_LEN_EXCEL_SHEET_NAME_MAX - 3))
            .collect();

        let mut n_idx = 2usize;
        loop {
            let candidate: String = format!("{base_name}__{n_idx}")
                .chars()
                .take(N_LEN_EXCEL_SHEET_NAME_MAX)
                .collect();
            if self.set_sheet_names_existing.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n_idx += 1;
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region XlsxWriter

/// `.xlsx` writer backed by `rust_xlsxwriter`; values only, except number
/// formats on date/time cells.
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxWorkbookWriter;

/// Workbook buffered in memory until [`WorkbookWriter::close_file`].
pub struct XlsxPartFile {
    path_file_out: PathBuf,
    workbook: Workbook,
    registry: SheetNameRegistry,
    dict_formats_datetime: BTreeMap<&'static str, Format>,
}

impl XlsxWorkbookWriter {
    pub fn new() -> Self {
        Self
    }
}

impl WorkbookWriter for XlsxWorkbookWriter {
    type Handle = XlsxPartFile;

    fn create_file(&self, path: &Path) -> Result<Self::Handle, SplitError> {
        Ok(XlsxPartFile {
            path_file_out: path.to_path_buf(),
            workbook: Workbook::new(),
            registry: SheetNameRegistry::default(),
            dict_formats_datetime: BTreeMap::new(),
        })
    }

    fn write_sheet(
        &self,
        file: &mut Self::Handle,
        sheet_name: &str,
        header: &[EnumCellValue],
        rows: &[TypeRow],
    ) -> Result<String, SplitError> {
        let path_file_out = file.path_file_out.clone();
        let map_err = |message: String| SplitError::Write {
            path: path_file_out.clone(),
            message,
        };

        let sheet_name_unique = file.registry.derive_unique_sheet_name(sheet_name);
        let worksheet = file.workbook.add_worksheet();
        worksheet
            .set_name(&sheet_name_unique)
            .map_err(|err| map_err(derive_xlsx_error_text(err)))?;

        let dict_formats = &mut file.dict_formats_datetime;
        write_row(worksheet, dict_formats, 0, header).map_err(map_err)?;
        for (n_row_idx, row) in rows.iter().enumerate() {
            write_row(worksheet, dict_formats, n_row_idx + 1, row).map_err(map_err)?;
        }
        Ok(sheet_name_unique)
    }

    /// Saves next to the target and renames into place, so the part path never
    /// holds a half-written workbook.
    fn close_file(&self, mut file: Self::Handle) -> Result<(), SplitError> {
        let path_file_tmp = derive_temp_part_path(&file.path_file_out);
        let map_err = |message: String| SplitError::Write {
            path: file.path_file_out.clone(),
            message,
        };

        if let Err(err) = file.workbook.save(&path_file_tmp) {
            let _ = fs::remove_file(&path_file_tmp);
            return Err(map_err(derive_xlsx_error_text(err)));
        }
        if let Err(err) = fs::rename(&path_file_tmp, &file.path_file_out) {
            let _ = fs::remove_file(&path_file_tmp);
            return Err(map_err(format!("failed to move part file into place: {err}")));
        }
        Ok(())
    }
}

fn write_row(
    worksheet: &mut Worksheet,
    dict_formats_datetime: &mut BTreeMap<&'static str, Format>,
    row_idx: usize,
    row: &[EnumCellValue],
) -> Result<(), String> {
    if row.len() > N_NCOLS_EXCEL_MAX {
        return Err(format!(
            "row {row_idx} has {} columns, Excel limit is {N_NCOLS_EXCEL_MAX}",
            row.len()
        ));
    }
    let n_row = cast_row_num(row_idx)?;
    for (col_idx, value) in row.iter().enumerate() {
        let n_col = cast_col_num(col_idx)?;
        let result_write = match value {
            EnumCellValue::None => continue,
            EnumCellValue::String(val) => worksheet.write_string(n_row, n_col, val),
            EnumCellValue::Number(val) => worksheet.write_number(n_row, n_col, *val),
            EnumCellValue::Bool(val) => worksheet.write_boolean(n_row, n_col, *val),
            EnumCellValue::DateTime {
                serial,
                is_duration,
            } => {
                let c_num_format = derive_datetime_num_format(*serial, *is_duration);
                let format = dict_formats_datetime
                    .entry(c_num_format)
                    .or_insert_with(|| Format::new().set_num_format(c_num_format));
                worksheet.write_number_with_format(n_row, n_col, *serial, format)
            }
        };
        result_write.map_err(derive_xlsx_error_text)?;
    }
    Ok(())
}

fn cast_row_num(value: usize) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("row index overflow: {value}"))
}

fn cast_col_num(value: usize) -> Result<u16, String> {
    u16::try_from(value).map_err(|_| format!("column index overflow: {value}"))
}

fn derive_xlsx_error_text(err: XlsxError) -> String {
    format!("xlsx write error: {err}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region MemoryWriter

/// One sheet captured by [`MemoryWorkbookWriter`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpecMemorySheet {
    pub sheet_name: String,
    pub header: TypeRow,
    pub rows: Vec<TypeRow>,
}

/// One workbook captured by [`MemoryWorkbookWriter`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpecMemoryWorkbook {
    pub path: PathBuf,
    pub sheets: Vec<SpecMemorySheet>,
}

/// Writer that keeps closed workbooks in memory, in close order.
#[derive(Debug, Default)]
pub struct MemoryWorkbookWriter {
    l_closed: Mutex<Vec<SpecMemoryWorkbook>>,
}

impl MemoryWorkbookWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of closed workbooks, sorted by path.
    pub fn workbooks(&self) -> Vec<SpecMemoryWorkbook> {
        let mut l_workbooks = self.l_closed.lock().clone();
        l_workbooks.sort_by(|a, b| a.path.cmp(&b.path));
        l_workbooks
    }
}

impl WorkbookWriter for MemoryWorkbookWriter {
    type Handle = (SpecMemoryWorkbook, SheetNameRegistry);

    fn create_file(&self, path: &Path) -> Result<Self::Handle, SplitError> {
        Ok((
            SpecMemoryWorkbook {
                path: path.to_path_buf(),
                sheets: Vec::new(),
            },
            SheetNameRegistry::default(),
        ))
    }

    fn write_sheet(
        &self,
        file: &mut Self::Handle,
        sheet_name: &str,
        header: &[EnumCellValue],
        rows: &[TypeRow],
    ) -> Result<String, SplitError> {
        let (workbook, registry) = file;
        let sheet_name_unique = registry.derive_unique_sheet_name(sheet_name);
        workbook.sheets.push(SpecMemorySheet {
            sheet_name: sheet_name_unique.clone(),
            header: header.to_vec(),
            rows: rows.to_vec(),
        });
        Ok(sheet_name_unique)
    }

    fn close_file(&self, file: Self::Handle) -> Result<(), SplitError> {
        self.l_closed.lock().push(file.0);
        Ok(())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use calamine::{Data, Reader, Xlsx, open_workbook};

    use super::*;

    #[test]
    fn unique_sheet_names_are_case_insensitive() {
        let mut registry = SheetNameRegistry::default();
        assert_eq!(registry.derive_unique_sheet_name("Data"), "Data");
        assert_eq!(registry.derive_unique_sheet_name("data"), "data__2");
        assert_eq!(registry.derive_unique_sheet_name("DATA"), "DATA__3");
        assert_eq!(registry.derive_unique_sheet_name("a:b"), "a_b");
    }

    #[test]
    fn unique_sheet_names_keep_length_limit() {
        let mut registry = SheetNameRegistry::default();
        let c_long = "z".repeat(40);
        let c_first = registry.derive_unique_sheet_name(&c_long);
        let c_second = registry.derive_unique_sheet_name(&c_long);
        assert_eq!(c_first.chars().count(), N_LEN_EXCEL_SHEET_NAME_MAX);
        assert!(c_second.ends_with("__2"));
        assert!(c_second.chars().count() <= N_LEN_EXCEL_SHEET_NAME_MAX);
    }

    #[test]
    fn memory_writer_records_closed_workbooks() {
        let writer = MemoryWorkbookWriter::new();
        let mut file = writer.create_file(Path::new("out/p_part1.xlsx")).expect("create");
        let c_name = writer
            .write_sheet(
                &mut file,
                "S",
                &[EnumCellValue::String("h".to_string())],
                &[vec![EnumCellValue::Number(1.0)]],
            )
            .expect("write");
        assert_eq!(c_name, "S");
        assert!(writer.workbooks().is_empty());

        writer.close_file(file).expect("close");
        let l_workbooks = writer.workbooks();
        assert_eq!(l_workbooks.len(), 1);
        assert_eq!(l_workbooks[0].sheets[0].rows, vec![vec![EnumCellValue::Number(1.0)]]);
    }

    #[test]
    fn xlsx_writer_persists_header_and_rows() {
        let dir_tmp = tempfile::tempdir().expect("tempdir");
        let path_out = dir_tmp.path().join("part.xlsx");
        let writer = XlsxWorkbookWriter::new();

        let mut file = writer.create_file(&path_out).expect("create");
        let header = vec![
            EnumCellValue::String("id".to_string()),
            EnumCellValue::String("ok".to_string()),
        ];
        let rows = vec![
            vec![EnumCellValue::Number(1.0), EnumCellValue::Bool(true)],
            vec![EnumCellValue::None, EnumCellValue::Bool(false)],
        ];
        writer.write_sheet(&mut file, "Data", &header, &rows).expect("write");
        assert!(!path_out.exists());
        writer.close_file(file).expect("close");

        let mut workbook: Xlsx<_> = open_workbook(&path_out).expect("open written");
        assert_eq!(workbook.sheet_names(), vec!["Data".to_string()]);
        let range = workbook.worksheet_range("Data").expect("range");
        assert_eq!(range.get_value((0, 0)), Some(&Data::String("id".to_string())));
        assert_eq!(range.get_value((1, 0)), Some(&Data::Float(1.0)));
        assert_eq!(range.get_value((1, 1)), Some(&Data::Bool(true)));
        assert_eq!(range.get_value((2, 1)), Some(&Data::Bool(false)));
    }

    #[test]
    fn xlsx_writer_reports_unwritable_path() {
        let writer = XlsxWorkbookWriter::new();
        let mut file = writer
            .create_file(Path::new("/nonexistent/dir/part.xlsx"))
            .expect("create");
        writer
            .write_sheet(&mut file, "S", &[], &[vec![EnumCellValue::Number(1.0)]])
            .expect("write");
        let err = writer.close_file(file).expect_err("save must fail");
        assert!(matches!(err, SplitError::Write { .. }));
    }

    #[test]
    fn xlsx_writer_keeps_datetime_cells() {
        let dir_tmp = tempfile::tempdir().expect("tempdir");
        let path_out = dir_tmp.path().join("part.xlsx");
        let writer = XlsxWorkbookWriter::new();

        let mut file = writer.create_file(&path_out).expect("create");
        let rows = vec![vec![
            EnumCellValue::DateTime {
                serial: 45306.0,
                is_duration: false,
            },
            EnumCellValue::DateTime {
                serial: 45306.5,
                is_duration: false,
            },
            EnumCellValue::DateTime {
                serial: 1.25,
                is_duration: true,
            },
        ]];
        writer.write_sheet(&mut file, "Dates", &[], &rows).expect("write");
        writer.close_file(file).expect("close");

        let mut workbook: Xlsx<_> = open_workbook(&path_out).expect("open written");
        let range = workbook.worksheet_range("Dates").expect("range");
        let l_cells: Vec<(f64, bool)> = (0..3)
            .map(|n_col| match range.get_value((1, n_col)) {
                Some(Data::DateTime(dt)) => (dt.as_f64(), dt.is_duration()),
                other => panic!("expected datetime cell, got {other:?}"),
            })
            .collect();
        assert_eq!(l_cells, vec![(45306.0, false), (45306.5, false), (1.25, true)]);
    }

    #[test]
    fn xlsx_writer_leaves_no_temp_file() {
        let dir_tmp = tempfile::tempdir().expect("tempdir");
        let path_out = dir_tmp.path().join("part.xlsx");
        let writer = XlsxWorkbookWriter::new();

        let mut file = writer.create_file(&path_out).expect("create");
        writer
            .write_sheet(&mut file, "S", &[], &[vec![EnumCellValue::Number(1.0)]])
            .expect("write");
        writer.close_file(file).expect("close");

        let l_names: Vec<String> = fs::read_dir(dir_tmp.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(l_names, vec!["part.xlsx".to_string()]);
    }

    #[test]
    fn xlsx_writer_failed_move_cleans_up_temp_file() {
        let dir_tmp = tempfile::tempdir().expect("tempdir");
        // A directory squatting on the part path makes the final rename fail.
        let path_out = dir_tmp.path().join("part.xlsx");
        fs::create_dir(&path_out).expect("mkdir");
        fs::write(path_out.join("keep.txt"), "x").expect("write marker");
        let writer = XlsxWorkbookWriter::new();

        let mut file = writer.create_file(&path_out).expect("create");
        writer
            .write_sheet(&mut file, "S", &[], &[vec![EnumCellValue::Number(1.0)]])
            .expect("write");
        let err = writer.close_file(file).expect_err("rename must fail");

        assert!(matches!(err, SplitError::Write { ref path, .. } if path == &path_out));
        assert!(!derive_temp_part_path(&path_out).exists());
        assert!(path_out.join("keep.txt").exists());
    }
}
