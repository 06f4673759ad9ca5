//! Progress events and their sinks.
//!
//! The split kernel never logs on its own; it hands every event to the
//! observer passed in by the caller.

use std::path::PathBuf;

use parking_lot::Mutex;

/// Progress event emitted during one split run.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumSplitEvent {
    /// Source sheets discovered by the count pass.
    SheetsDiscovered { n_sheets: usize, n_rows_total: usize },
    /// Layout computed; no output written yet.
    PlanReady {
        n_files: usize,
        n_sheet_slots: usize,
        n_workers: usize,
    },
    /// A worker began streaming a source sheet.
    SheetStarted {
        worker_idx: usize,
        sheet_name: String,
        n_rows: usize,
    },
    /// One chunk routed into sheet buffers.
    ChunkRead {
        worker_idx: usize,
        sheet_name: String,
        n_rows_chunk: usize,
        n_rows_done: usize,
    },
    /// A source sheet without data rows produced no output.
    SheetSkipped { worker_idx: usize, sheet_name: String },
    /// A part file was persisted.
    FilePersisted {
        worker_idx: usize,
        n_file_idx: usize,
        path: PathBuf,
        n_sheets: usize,
    },
    WorkerFinished { worker_idx: usize, n_files: usize },
    WorkerFailed { worker_idx: usize, message: String },
    /// A worker stopped at a chunk boundary after a cancellation request.
    WorkerCancelled { worker_idx: usize },
    Finished { n_files: usize, n_errors: usize },
}

/// Event sink shared by all workers.
pub trait SplitObserver: Sync {
    fn on_event(&self, event: &EnumSplitEvent);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl SplitObserver for LogObserver {
    fn on_event(&self, event: &EnumSplitEvent) {
        match event {
            EnumSplitEvent::SheetsDiscovered {
                n_sheets,
                n_rows_total,
            } => log::info!("Discovered {n_sheets} sheet(s) with {n_rows_total} data row(s)"),
            EnumSplitEvent::PlanReady {
                n_files,
                n_sheet_slots,
                n_workers,
            } => log::info!(
                "Planned {n_files} part file(s) holding {n_sheet_slots} sheet(s) across {n_workers} worker(s)"
            ),
            EnumSplitEvent::SheetStarted {
                worker_idx,
                sheet_name,
                n_rows,
            } => log::info!("[worker {worker_idx}] Splitting sheet {sheet_name:?} ({n_rows} rows)"),
            EnumSplitEvent::ChunkRead {
                worker_idx,
                sheet_name,
                n_rows_chunk,
                n_rows_done,
            } => log::debug!(
                "[worker {worker_idx}] {sheet_name:?}: +{n_rows_chunk} rows ({n_rows_done} done)"
            ),
            EnumSplitEvent::SheetSkipped {
                worker_idx,
                sheet_name,
            } => log::info!("[worker {worker_idx}] Skipping empty sheet {sheet_name:?}"),
            EnumSplitEvent::FilePersisted {
                worker_idx,
                n_file_idx,
                path,
                n_sheets,
            } => log::info!(
                "[worker {worker_idx}] Saved part {} to {} ({n_sheets} sheet(s))",
                n_file_idx + 1,
                path.display()
            ),
            EnumSplitEvent::WorkerFinished {
                worker_idx,
                n_files,
            } => log::debug!("[worker {worker_idx}] Finished, {n_files} file(s) written"),
            EnumSplitEvent::WorkerFailed {
                worker_idx,
                message,
            } => log::error!("[worker {worker_idx}] Failed: {message}"),
            EnumSplitEvent::WorkerCancelled { worker_idx } => {
                log::warn!("[worker {worker_idx}] Cancelled")
            }
            EnumSplitEvent::Finished { n_files, n_errors } => {
                log::info!("Split finished: {n_files} file(s), {n_errors} error(s)")
            }
        }
    }
}

/// Records events for later inspection.
#[derive(Debug, Default)]
pub struct CaptureObserver {
    l_events: Mutex<Vec<EnumSplitEvent>>,
}

impl CaptureObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events in arrival order.
    pub fn events(&self) -> Vec<EnumSplitEvent> {
        self.l_events.lock().clone()
    }
}

impl SplitObserver for CaptureObserver {
    fn on_event(&self, event: &EnumSplitEvent) {
        self.l_events.lock().push(event.clone());
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SplitObserver for NullObserver {
    fn on_event(&self, _event: &EnumSplitEvent) {}
}
