//! `sheetkit_io_split` v1:
//! Chunked XLSX split engine.
//!
//! Rows stream forward through
//! `reader -> allocator -> buffer -> writer`; nothing reads back from a
//! later stage.
//! - `conf`      : Excel limits and default presets
//! - `spec`      : configs/plans/models and errors
//! - `util`      : pure helper functions
//! - `reader`    : sheet discovery and chunked row streams
//! - `allocator` : row -> (part file, sheet) mapping
//! - `plan`      : up-front worker partition and part file layout
//! - `buffer`    : sheet buffers and per-file staging
//! - `writer`    : workbook writers
//! - `observer`  : progress events and sinks
//! - `report`    : run-time report model
//! - `split`     : sequential/parallel orchestration
pub mod allocator;
pub mod buffer;
pub mod conf;
pub mod observer;
pub mod plan;
pub mod reader;
pub mod report;
pub mod spec;
pub mod split;
pub mod util;
pub mod writer;

pub use allocator::SlotAllocator;
pub use buffer::{OutputFileManager, SheetBuffer};
pub use conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, N_ROWS_CHUNK_DEFAULT,
    N_ROWS_PER_SHEET_DEFAULT, N_SHEETS_PER_FILE_DEFAULT,
};
pub use observer::{CaptureObserver, EnumSplitEvent, LogObserver, NullObserver, SplitObserver};
pub use plan::{plan_split, plan_worker_shards};
pub use reader::{
    MemorySheetReader, MemorySheetSource, RowCursor, RowStream, SheetReader, SheetSource,
    XlsxSheetReader, XlsxSheetSource,
};
pub use report::{ReportSplit, ReportSplitBuilder};
pub use spec::{
    EnumCellValue, EnumOutputConflictStrategy, SpecOutputFile, SpecOutputSheet,
    SpecSourceSheet, SpecSplitConfig, SpecSplitFailure, SpecSplitPlan, SpecSplitTarget,
    SplitError, TypeRow,
};
pub use split::{split_workbook, split_workbook_cancellable, split_xlsx_file};
pub use util::calculate_worker_limit;
pub use writer::{MemoryWorkbookWriter, WorkbookWriter, XlsxWorkbookWriter};
