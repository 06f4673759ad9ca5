//! In-memory staging of output sheets and part files.

use std::collections::BTreeMap;

use crate::spec::{
    SpecOutputFile, SpecOutputFilePlan, SpecOutputSheet, SpecSheetSlotPlan, SpecSlotAddress,
    SpecSourceSheet, SplitError, TypeRow,
};
use crate::writer::WorkbookWriter;

////////////////////////////////////////////////////////////////////////////////
// #region SheetBuffer

/// Rows of one output sheet, in source order, bounded by a fixed capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetBuffer {
    sheet_name: String,
    n_capacity: usize,
    l_rows: Vec<TypeRow>,
}

impl SheetBuffer {
    pub fn new(sheet_name: impl Into<String>, n_capacity: usize) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            n_capacity,
            l_rows: Vec::new(),
        }
    }

    /// Append one row.
    ///
    /// # Errors
    /// [`SplitError::CapacityExceeded`] once `n_capacity` rows are held.
    pub fn append(&mut self, row: TypeRow) -> Result<(), SplitError> {
        if self.is_full() {
            return Err(SplitError::CapacityExceeded {
                sheet_name: self.sheet_name.clone(),
                n_capacity: self.n_capacity,
            });
        }
        self.l_rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.l_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.l_rows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.l_rows.len() >= self.n_capacity
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn rows(&self) -> &[TypeRow] {
        &self.l_rows
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region OutputFileManager

/// Owns the sheet buffers of one planned part file.
///
/// Buffers are created lazily on first routed row and sized to the planned
/// row count of their slot, so a buffer seals exactly when its slot has
/// received all planned rows. The file is complete once every planned slot
/// is sealed.
#[derive(Debug)]
pub struct OutputFileManager<'p> {
    file_plan: &'p SpecOutputFilePlan,
    dict_buffers: BTreeMap<usize, SheetBuffer>,
}

impl<'p> OutputFileManager<'p> {
    pub fn new(file_plan: &'p SpecOutputFilePlan) -> Self {
        Self {
            file_plan,
            dict_buffers: BTreeMap::new(),
        }
    }

    pub fn file_idx(&self) -> usize {
        self.file_plan.n_file_idx
    }

    fn find_slot(&self, n_sheet_idx: usize) -> Option<&'p SpecSheetSlotPlan> {
        self.file_plan
            .slots
            .iter()
            .find(|slot| slot.n_sheet_idx == n_sheet_idx)
    }

    /// Route one row to its sheet buffer. Returns `true` when this row sealed the sheet.
    ///
    /// # Errors
    /// [`SplitError::CapacityExceeded`] when the address is outside this file,
    /// names an unplanned sheet, or the sheet is already sealed.
    pub fn route(&mut self, row: TypeRow, addr: &SpecSlotAddress) -> Result<bool, SplitError> {
        let slot = match self.find_slot(addr.n_sheet_idx) {
            Some(slot) if addr.n_file_idx == self.file_plan.n_file_idx => slot,
            _ => {
                return Err(SplitError::CapacityExceeded {
                    sheet_name: format!(
                        "part {} sheet {}",
                        addr.n_file_idx + 1,
                        addr.n_sheet_idx + 1
                    ),
                    n_capacity: 0,
                });
            }
        };

        let buffer = self
            .dict_buffers
            .entry(addr.n_sheet_idx)
            .or_insert_with(|| SheetBuffer::new(slot.sheet_name.clone(), slot.n_rows));
        buffer.append(row)?;
        Ok(buffer.is_full())
    }

    /// All planned sheets have received their rows.
    pub fn is_complete(&self) -> bool {
        self.file_plan.slots.iter().all(|slot| {
            self.dict_buffers
                .get(&slot.n_sheet_idx)
                .is_some_and(SheetBuffer::is_full)
        })
    }

    /// Rows currently held across all buffers.
    pub fn rows_buffered(&self) -> usize {
        self.dict_buffers.values().map(SheetBuffer::len).sum()
    }

    /// Persist held buffers as one workbook, in increasing sheet index order.
    ///
    /// Partially filled sheets are written as they are. `sheets` supplies
    /// the header and source name of every slot, indexed by ordinal.
    pub fn finalize<W: WorkbookWriter>(
        self,
        writer: &W,
        sheets: &[SpecSourceSheet],
    ) -> Result<SpecOutputFile, SplitError> {
        let mut file = writer.create_file(&self.file_plan.path)?;
        let mut l_sheets_out = Vec::with_capacity(self.dict_buffers.len());

        for (n_sheet_idx, buffer) in self.dict_buffers {
            let Some(slot) = self.file_plan.slots.iter().find(|s| s.n_sheet_idx == n_sheet_idx)
            else {
                continue;
            };
            let source = &sheets[slot.sheet_ordinal];
            let sheet_name = writer.write_sheet(
                &mut file,
                buffer.sheet_name(),
                &source.header,
                buffer.rows(),
            )?;
            l_sheets_out.push(SpecOutputSheet {
                sheet_name,
                source_sheet: source.name.clone(),
                n_rows: buffer.len(),
            });
        }

        writer.close_file(file)?;
        Ok(SpecOutputFile {
            n_file_idx: self.file_plan.n_file_idx,
            path: self.file_plan.path.clone(),
            worker_idx: self.file_plan.worker_idx,
            sheets: l_sheets_out,
        })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::spec::EnumCellValue;
    use crate::writer::MemoryWorkbookWriter;

    fn make_row(n: usize) -> TypeRow {
        vec![EnumCellValue::Number(n as f64)]
    }

    fn make_addr(n_file_idx: usize, n_sheet_idx: usize, n_row_offset: usize) -> SpecSlotAddress {
        SpecSlotAddress {
            n_file_idx,
            n_sheet_idx,
            n_row_offset,
            n_part_idx: n_sheet_idx,
        }
    }

    fn make_file_plan() -> SpecOutputFilePlan {
        SpecOutputFilePlan {
            n_file_idx: 0,
            path: PathBuf::from("out/src_part1.xlsx"),
            worker_idx: 0,
            slots: vec![
                SpecSheetSlotPlan {
                    n_sheet_idx: 0,
                    sheet_ordinal: 0,
                    n_part_idx: 0,
                    sheet_name: "A_1".to_string(),
                    n_rows: 2,
                },
                SpecSheetSlotPlan {
                    n_sheet_idx: 1,
                    sheet_ordinal: 0,
                    n_part_idx: 1,
                    sheet_name: "A_2".to_string(),
                    n_rows: 1,
                },
            ],
        }
    }

    fn make_sheets() -> Vec<SpecSourceSheet> {
        vec![SpecSourceSheet {
            ordinal: 0,
            name: "A".to_string(),
            n_rows: 3,
            header: vec![EnumCellValue::String("h".to_string())],
        }]
    }

    #[test]
    fn sheet_buffer_rejects_rows_past_capacity() {
        let mut buffer = SheetBuffer::new("S", 2);
        buffer.append(make_row(0)).expect("first");
        assert!(!buffer.is_full());
        buffer.append(make_row(1)).expect("second");
        assert!(buffer.is_full());

        let err = buffer.append(make_row(2)).expect_err("third must fail");
        assert!(matches!(
            err,
            SplitError::CapacityExceeded { ref sheet_name, n_capacity: 2 } if sheet_name == "S"
        ));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn manager_seals_sheets_and_completes_file() {
        let file_plan = make_file_plan();
        let mut manager = OutputFileManager::new(&file_plan);

        assert!(!manager.route(make_row(0), &make_addr(0, 0, 0)).expect("route"));
        assert!(manager.route(make_row(1), &make_addr(0, 0, 1)).expect("route"));
        assert!(!manager.is_complete());
        assert!(manager.route(make_row(2), &make_addr(0, 1, 0)).expect("route"));
        assert!(manager.is_complete());
        assert_eq!(manager.rows_buffered(), 3);

        let err = manager
            .route(make_row(3), &make_addr(0, 1, 1))
            .expect_err("sealed sheet");
        assert!(matches!(err, SplitError::CapacityExceeded { .. }));
    }

    #[test]
    fn manager_rejects_foreign_address() {
        let file_plan = make_file_plan();
        let mut manager = OutputFileManager::new(&file_plan);
        assert!(manager.route(make_row(0), &make_addr(1, 0, 0)).is_err());
        assert!(manager.route(make_row(0), &make_addr(0, 2, 0)).is_err());
    }

    #[test]
    fn manager_finalizes_in_sheet_order_with_headers() {
        let file_plan = make_file_plan();
        let sheets = make_sheets();
        let writer = MemoryWorkbookWriter::new();
        let mut manager = OutputFileManager::new(&file_plan);

        manager.route(make_row(2), &make_addr(0, 1, 0)).expect("route");
        manager.route(make_row(0), &make_addr(0, 0, 0)).expect("route");
        manager.route(make_row(1), &make_addr(0, 0, 1)).expect("route");

        let output = manager.finalize(&writer, &sheets).expect("finalize");
        assert_eq!(output.path, PathBuf::from("out/src_part1.xlsx"));
        let l_names: Vec<&str> = output.sheets.iter().map(|s| s.sheet_name.as_str()).collect();
        assert_eq!(l_names, vec!["A_1", "A_2"]);
        assert_eq!(output.sheets[0].n_rows, 2);
        assert_eq!(output.sheets[1].source_sheet, "A");

        let l_workbooks = writer.workbooks();
        assert_eq!(l_workbooks.len(), 1);
        assert_eq!(l_workbooks[0].sheets[0].header, sheets[0].header);
        assert_eq!(l_workbooks[0].sheets[0].rows, vec![make_row(0), make_row(1)]);
        assert_eq!(l_workbooks[0].sheets[1].rows, vec![make_row(2)]);
    }

    #[test]
    fn manager_writes_partial_sheet_as_is() {
        let file_plan = make_file_plan();
        let writer = MemoryWorkbookWriter::new();
        let mut manager = OutputFileManager::new(&file_plan);
        manager.route(make_row(0), &make_addr(0, 0, 0)).expect("route");

        let output = manager.finalize(&writer, &make_sheets()).expect("finalize");
        assert_eq!(output.sheets.len(), 1);
        assert_eq!(output.sheets[0].n_rows, 1);
    }
}
