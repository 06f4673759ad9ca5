//! Source-side streaming: sheet discovery and chunked row reading.
//!
//! A [`SheetSource`] is shared read-only by every worker and opens one
//! independent [`SheetReader`] per worker. Readers hand out a [`RowStream`]
//! per source sheet which pulls rows through a [`RowCursor`] one chunk per
//! call, so at most `chunk_size` rows of a sheet are resident at once.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use calamine::{DataRef, Reader, Xlsx, open_workbook};

use crate::spec::{EnumCellValue, SpecSourceSheet, SplitError, TypeRow};

////////////////////////////////////////////////////////////////////////////////
// #region Contracts

/// Pull-side row source for one sheet.
pub trait RowCursor {
    /// Append up to `n_rows_max` rows to `l_rows` with one underlying read.
    ///
    /// Returns the number of appended rows; `0` means the sheet is exhausted.
    fn read_chunk(
        &mut self,
        n_rows_max: usize,
        l_rows: &mut Vec<TypeRow>,
    ) -> Result<usize, SplitError>;
}

/// Per-worker reader of one input workbook.
pub trait SheetReader {
    /// Discover the source sheets in input order, header row and row count included.
    fn list_sheets(&mut self) -> Result<Vec<SpecSourceSheet>, SplitError>;

    /// Open a chunked data-row stream for `sheet` (header row excluded).
    fn open_chunks(
        &mut self,
        sheet: &SpecSourceSheet,
        chunk_size: usize,
    ) -> Result<RowStream<'_>, SplitError>;
}

/// Shareable factory for per-worker readers.
pub trait SheetSource: Sync {
    type Reader: SheetReader;

    /// Open an independent reader over the same input.
    fn open(&self) -> Result<Self::Reader, SplitError>;
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RowStream

/// Lazy, finite, non-restartable sequence of row chunks of one source sheet.
///
/// Each chunk holds at most `chunk_size` rows in source order. The stream
/// fails with [`SplitError::SourceRead`] when the sheet yields more or fewer
/// rows than discovered, and yields nothing after the first error.
pub struct RowStream<'a> {
    sheet_name: String,
    cursor: Box<dyn RowCursor + 'a>,
    chunk_size: usize,
    n_rows_expected: usize,
    n_rows_read: usize,
    if_done: bool,
}

impl<'a> RowStream<'a> {
    pub fn new(
        sheet_name: impl Into<String>,
        cursor: Box<dyn RowCursor + 'a>,
        chunk_size: usize,
        n_rows_expected: usize,
    ) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            cursor,
            chunk_size: chunk_size.max(1),
            n_rows_expected,
            n_rows_read: 0,
            if_done: false,
        }
    }

    /// Rows yielded so far.
    pub fn rows_read(&self) -> usize {
        self.n_rows_read
    }

    fn fail(&mut self, message: String) -> SplitError {
        self.if_done = true;
        SplitError::SourceRead {
            sheet: self.sheet_name.clone(),
            message,
        }
    }

    fn read_next_chunk(&mut self) -> Result<Option<Vec<TypeRow>>, SplitError> {
        let n_rows_left = self.n_rows_expected - self.n_rows_read;

        if n_rows_left == 0 {
            // Read one extra row so a sheet that grew after discovery is detected.
            let mut l_rows_extra = Vec::with_capacity(1);
            if self.cursor.read_chunk(1, &mut l_rows_extra)? > 0 {
                return Err(self.fail(format!(
                    "sheet has more than the {} discovered data rows",
                    self.n_rows_expected
                )));
            }
            self.if_done = true;
            return Ok(None);
        }

        let n_rows_want = usize::min(self.chunk_size, n_rows_left);
        let mut l_rows = Vec::with_capacity(n_rows_want);
        let n_rows_got = self.cursor.read_chunk(n_rows_want, &mut l_rows)?;
        if n_rows_got == 0 {
            return Err(self.fail(format!(
                "sheet ended after {} of {} discovered data rows",
                self.n_rows_read, self.n_rows_expected
            )));
        }
        self.n_rows_read += n_rows_got;
        Ok(Some(l_rows))
    }
}

impl Iterator for RowStream<'_> {
    type Item = Result<Vec<TypeRow>, SplitError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.if_done {
            return None;
        }
        match self.read_next_chunk() {
            Ok(Some(l_rows)) => Some(Ok(l_rows)),
            Ok(None) => None,
            Err(err) => {
                self.if_done = true;
                Some(Err(err))
            }
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellAssembly

type TypeCell = (u32, u32, EnumCellValue);
type TypeCellPull<'a> = Box<dyn FnMut() -> Result<Option<TypeCell>, SplitError> + 'a>;

/// Put `value` at column `n_col_idx`, padding skipped columns with blanks.
fn place_cell(row: &mut TypeRow, n_col_idx: u32, value: EnumCellValue) {
    let n_col_idx = n_col_idx as usize;
    if n_col_idx < row.len() {
        row[n_col_idx] = value;
        return;
    }
    row.resize(n_col_idx, EnumCellValue::None);
    row.push(value);
}

/// Assembles row-major cells into dense rows; gaps become empty rows.
struct CellRowCursor<'a> {
    pull_cell: TypeCellPull<'a>,
    cell_pending: Option<TypeCell>,
    n_row_next: u32,
    if_exhausted: bool,
}

impl<'a> CellRowCursor<'a> {
    /// Cursor emitting rows from absolute row index `n_row_start` on.
    fn new(pull_cell: TypeCellPull<'a>, n_row_start: u32) -> Self {
        Self {
            pull_cell,
            cell_pending: None,
            n_row_next: n_row_start,
            if_exhausted: false,
        }
    }

    fn next_row(&mut self) -> Result<Option<TypeRow>, SplitError> {
        let mut row = TypeRow::new();
        let mut if_row_touched = false;

        loop {
            if self.cell_pending.is_none() && !self.if_exhausted {
                self.cell_pending = (self.pull_cell)()?;
                self.if_exhausted = self.cell_pending.is_none();
            }

            let Some((n_row_idx, _, _)) = self.cell_pending.as_ref() else {
                if !if_row_touched {
                    return Ok(None);
                }
                self.n_row_next += 1;
                return Ok(Some(row));
            };

            if *n_row_idx > self.n_row_next {
                self.n_row_next += 1;
                return Ok(Some(row));
            }

            if let Some((n_row_idx, n_col_idx, value)) = self.cell_pending.take() {
                if n_row_idx == self.n_row_next {
                    place_cell(&mut row, n_col_idx, value);
                    if_row_touched = true;
                }
            }
        }
    }
}

impl RowCursor for CellRowCursor<'_> {
    fn read_chunk(
        &mut self,
        n_rows_max: usize,
        l_rows: &mut Vec<TypeRow>,
    ) -> Result<usize, SplitError> {
        let mut n_rows_got = 0usize;
        while n_rows_got < n_rows_max {
            match self.next_row()? {
                Some(row) => {
                    l_rows.push(row);
                    n_rows_got += 1;
                }
                None => break,
            }
        }
        Ok(n_rows_got)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region XlsxSource

/// `.xlsx` input read through calamine's streaming cell reader.
#[derive(Debug, Clone)]
pub struct XlsxSheetSource {
    path_input: PathBuf,
}

impl XlsxSheetSource {
    pub fn new(path_input: impl Into<PathBuf>) -> Self {
        Self {
            path_input: path_input.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path_input
    }
}

impl SheetSource for XlsxSheetSource {
    type Reader = XlsxSheetReader;

    fn open(&self) -> Result<Self::Reader, SplitError> {
        XlsxSheetReader::open(&self.path_input)
    }
}

/// One open `.xlsx` workbook.
pub struct XlsxSheetReader {
    workbook: Xlsx<BufReader<File>>,
}

impl XlsxSheetReader {
    pub fn open(path_input: &Path) -> Result<Self, SplitError> {
        let workbook = open_workbook::<Xlsx<BufReader<File>>, _>(path_input).map_err(|err| {
            SplitError::SourceOpen {
                path: path_input.to_path_buf(),
                message: err.to_string(),
            }
        })?;
        Ok(Self { workbook })
    }

    fn open_cell_pull<'a>(&'a mut self, sheet_name: &str) -> Result<TypeCellPull<'a>, SplitError> {
        let c_sheet_name = sheet_name.to_string();
        let mut cells = self
            .workbook
            .worksheet_cells_reader(sheet_name)
            .map_err(|err| SplitError::SourceRead {
                sheet: c_sheet_name.clone(),
                message: err.to_string(),
            })?;

        Ok(Box::new(move || {
            let cell = cells.next_cell().map_err(|err| SplitError::SourceRead {
                sheet: c_sheet_name.clone(),
                message: err.to_string(),
            })?;
            Ok(cell.map(|cell| {
                let (n_row_idx, n_col_idx) = cell.get_position();
                (n_row_idx, n_col_idx, convert_cell_value(cell.get_value()))
            }))
        }))
    }

    /// Streaming count pass: header = row 0, data rows = index of last populated row.
    fn describe_sheet(
        &mut self,
        ordinal: usize,
        sheet_name: &str,
    ) -> Result<SpecSourceSheet, SplitError> {
        let mut pull_cell = self.open_cell_pull(sheet_name)?;
        let mut header = TypeRow::new();
        let mut n_row_last: Option<u32> = None;

        while let Some((n_row_idx, n_col_idx, value)) = pull_cell()? {
            if n_row_idx == 0 {
                place_cell(&mut header, n_col_idx, value);
            }
            n_row_last = Some(n_row_last.map_or(n_row_idx, |n| n.max(n_row_idx)));
        }

        Ok(SpecSourceSheet {
            ordinal,
            name: sheet_name.to_string(),
            n_rows: n_row_last.map_or(0, |n| n as usize),
            header,
        })
    }
}

impl SheetReader for XlsxSheetReader {
    fn list_sheets(&mut self) -> Result<Vec<SpecSourceSheet>, SplitError> {
        let l_sheet_names = self.workbook.sheet_names();
        let mut l_sheets = Vec::with_capacity(l_sheet_names.len());
        for (ordinal, sheet_name) in l_sheet_names.iter().enumerate() {
            l_sheets.push(self.describe_sheet(ordinal, sheet_name)?);
        }
        Ok(l_sheets)
    }

    fn open_chunks(
        &mut self,
        sheet: &SpecSourceSheet,
        chunk_size: usize,
    ) -> Result<RowStream<'_>, SplitError> {
        let pull_cell = self.open_cell_pull(&sheet.name)?;
        Ok(RowStream::new(
            sheet.name.clone(),
            Box::new(CellRowCursor::new(pull_cell, 1)),
            chunk_size,
            sheet.n_rows,
        ))
    }
}

fn convert_cell_value(value: &DataRef<'_>) -> EnumCellValue {
    match value {
        DataRef::Int(v) => EnumCellValue::Number(*v as f64),
        DataRef::Float(v) => EnumCellValue::Number(*v),
        DataRef::String(v) => EnumCellValue::String(v.clone()),
        DataRef::SharedString(v) => EnumCellValue::String((*v).to_string()),
        DataRef::Bool(v) => EnumCellValue::Bool(*v),
        DataRef::DateTime(v) => EnumCellValue::DateTime {
            serial: v.as_f64(),
            is_duration: v.is_duration(),
        },
        DataRef::DateTimeIso(v) | DataRef::DurationIso(v) => EnumCellValue::String(v.clone()),
        DataRef::Error(v) => EnumCellValue::String(v.to_string()),
        _ => EnumCellValue::None,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region MemorySource

/// In-memory input: named sheets whose first row is the header.
#[derive(Debug, Clone, Default)]
pub struct MemorySheetSource {
    l_sheets: Arc<Vec<(String, Vec<TypeRow>)>>,
}

impl MemorySheetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sheet; `header` becomes row 0, `rows` the data rows.
    pub fn with_sheet(mut self, name: impl Into<String>, header: TypeRow, rows: Vec<TypeRow>) -> Self {
        let mut l_rows = Vec::with_capacity(rows.len() + 1);
        l_rows.push(header);
        l_rows.extend(rows);
        Arc::make_mut(&mut self.l_sheets).push((name.into(), l_rows));
        self
    }
}

impl SheetSource for MemorySheetSource {
    type Reader = MemorySheetReader;

    fn open(&self) -> Result<Self::Reader, SplitError> {
        Ok(MemorySheetReader {
            l_sheets: Arc::clone(&self.l_sheets),
        })
    }
}

/// Reader over a [`MemorySheetSource`].
#[derive(Debug, Clone)]
pub struct MemorySheetReader {
    l_sheets: Arc<Vec<(String, Vec<TypeRow>)>>,
}

impl SheetReader for MemorySheetReader {
    fn list_sheets(&mut self) -> Result<Vec<SpecSourceSheet>, SplitError> {
        Ok(self
            .l_sheets
            .iter()
            .enumerate()
            .map(|(ordinal, (name, l_rows))| SpecSourceSheet {
                ordinal,
                name: name.clone(),
                n_rows: l_rows.len().saturating_sub(1),
                header: l_rows.first().cloned().unwrap_or_default(),
            })
            .collect())
    }

    fn open_chunks(
        &mut self,
        sheet: &SpecSourceSheet,
        chunk_size: usize,
    ) -> Result<RowStream<'_>, SplitError> {
        let l_rows = self
            .l_sheets
            .iter()
            .find(|(name, _)| *name == sheet.name)
            .map(|(_, l_rows)| l_rows.get(1..).unwrap_or_default())
            .ok_or_else(|| SplitError::SourceRead {
                sheet: sheet.name.clone(),
                message: "sheet not found".to_string(),
            })?;

        Ok(RowStream::new(
            sheet.name.clone(),
            Box::new(SliceRowCursor { l_rows, n_pos: 0 }),
            chunk_size,
            sheet.n_rows,
        ))
    }
}

/// Cursor over borrowed rows.
pub struct SliceRowCursor<'a> {
    l_rows: &'a [TypeRow],
    n_pos: usize,
}

impl<'a> SliceRowCursor<'a> {
    pub fn new(l_rows: &'a [TypeRow]) -> Self {
        Self { l_rows, n_pos: 0 }
    }
}

impl RowCursor for SliceRowCursor<'_> {
    fn read_chunk(
        &mut self,
        n_rows_max: usize,
        l_rows: &mut Vec<TypeRow>,
    ) -> Result<usize, SplitError> {
        let n_end = usize::min(self.l_rows.len(), self.n_pos + n_rows_max);
        let l_chunk = &self.l_rows[self.n_pos..n_end];
        l_rows.extend_from_slice(l_chunk);
        self.n_pos = n_end;
        Ok(l_chunk.len())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
