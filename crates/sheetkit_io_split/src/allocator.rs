//! Row -> (part file, sheet) slot allocation.
//!
//! Every source sheet restarts its own zero-based row counter and begins at a
//! fresh output sheet slot, so one output sheet only ever holds rows of one
//! source sheet. The mapping is pure arithmetic over the row index and the
//! per-sheet base slot fixed by the plan.

use crate::spec::{SpecSlotAddress, SpecSplitConfig, SpecSplitPlan};

/// Pure slot allocator for one split plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAllocator {
    rows_per_sheet: usize,
    sheets_per_file: usize,
    n_slot_base_by_sheet: Vec<usize>,
}

impl SlotAllocator {
    /// Create allocator from capacities and the first global slot of each source sheet.
    pub fn new(config: &SpecSplitConfig, n_slot_base_by_sheet: Vec<usize>) -> Self {
        Self {
            rows_per_sheet: config.rows_per_sheet,
            sheets_per_file: config.sheets_per_file,
            n_slot_base_by_sheet,
        }
    }

    /// Create allocator matching a precomputed plan.
    pub fn from_plan(plan: &SpecSplitPlan) -> Self {
        Self::new(&plan.config, plan.n_slot_base_by_sheet.clone())
    }

    /// Map row `n_row_idx` (zero-based, within its source sheet) of sheet `sheet_ordinal`.
    ///
    /// # Panics
    /// Panics when `sheet_ordinal` is not part of the plan.
    pub fn allocate(&self, sheet_ordinal: usize, n_row_idx: usize) -> SpecSlotAddress {
        let n_part_idx = n_row_idx / self.rows_per_sheet;
        let n_slot_global = self.n_slot_base_by_sheet[sheet_ordinal] + n_part_idx;

        SpecSlotAddress {
            n_file_idx: n_slot_global / self.sheets_per_file,
            n_sheet_idx: n_slot_global % self.sheets_per_file,
            n_row_offset: n_row_idx % self.rows_per_sheet,
            n_part_idx,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn make_config(sheets_per_file: usize, rows_per_sheet: usize) -> SpecSplitConfig {
        SpecSplitConfig {
            sheets_per_file,
            rows_per_sheet,
            ..SpecSplitConfig::default()
        }
    }

    #[test]
    fn allocate_single_sheet_hundred_rows() {
        let allocator = SlotAllocator::new(&make_config(2, 40), vec![0]);

        let addr = allocator.allocate(0, 0);
        assert_eq!((addr.n_file_idx, addr.n_sheet_idx, addr.n_row_offset), (0, 0, 0));
        let addr = allocator.allocate(0, 39);
        assert_eq!((addr.n_file_idx, addr.n_sheet_idx, addr.n_row_offset), (0, 0, 39));
        let addr = allocator.allocate(0, 40);
        assert_eq!((addr.n_file_idx, addr.n_sheet_idx, addr.n_row_offset), (0, 1, 0));
        let addr = allocator.allocate(0, 80);
        assert_eq!((addr.n_file_idx, addr.n_sheet_idx, addr.n_row_offset), (1, 0, 0));
        let addr = allocator.allocate(0, 99);
        assert_eq!((addr.n_file_idx, addr.n_sheet_idx, addr.n_row_offset), (1, 0, 19));
        assert_eq!(addr.n_part_idx, 2);
    }

    #[test]
    fn allocate_second_sheet_starts_on_fresh_slot() {
        // Sheet A (50 rows) takes slots 0..2; sheet B starts at slot 2.
        let allocator = SlotAllocator::new(&make_config(3, 40), vec![0, 2]);

        let addr_a_tail = allocator.allocate(0, 49);
        assert_eq!((addr_a_tail.n_sheet_idx, addr_a_tail.n_row_offset), (1, 9));

        let addr_b_head = allocator.allocate(1, 0);
        assert_eq!(addr_b_head.n_file_idx, 0);
        assert_eq!(addr_b_head.n_sheet_idx, 2);
        assert_eq!(addr_b_head.n_row_offset, 0);
        assert_eq!(addr_b_head.n_part_idx, 0);
    }

    proptest! {
        #[test]
        fn allocate_matches_closed_form(
            sheets_per_file in 1usize..6,
            rows_per_sheet in 1usize..50,
            n_slot_base in 0usize..20,
            n_row_idx in 0usize..5_000,
        ) {
            let allocator =
                SlotAllocator::new(&make_config(sheets_per_file, rows_per_sheet), vec![n_slot_base]);
            let addr = allocator.allocate(0, n_row_idx);

            let n_slot_global = n_slot_base + n_row_idx / rows_per_sheet;
            prop_assert_eq!(addr.n_row_offset, n_row_idx % rows_per_sheet);
            prop_assert_eq!(addr.n_file_idx, n_slot_global / sheets_per_file);
            prop_assert_eq!(addr.n_sheet_idx, n_slot_global % sheets_per_file);
            prop_assert!(addr.n_sheet_idx < sheets_per_file);
        }

        #[test]
        fn allocate_is_monotonic_within_sheet(
            sheets_per_file in 1usize..6,
            rows_per_sheet in 1usize..50,
            n_row_idx in 0usize..5_000,
        ) {
            let allocator =
                SlotAllocator::new(&make_config(sheets_per_file, rows_per_sheet), vec![0]);
            let addr_prev = allocator.allocate(0, n_row_idx);
            let addr_next = allocator.allocate(0, n_row_idx + 1);

            let key_prev = (addr_prev.n_file_idx, addr_prev.n_sheet_idx, addr_prev.n_row_offset);
            let key_next = (addr_next.n_file_idx, addr_next.n_sheet_idx, addr_next.n_row_offset);
            prop_assert!(key_prev < key_next);
        }
    }
}
