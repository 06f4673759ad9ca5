//! Split coordinator: discovery, planning and shard execution.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::allocator::SlotAllocator;
use crate::buffer::OutputFileManager;
use crate::observer::{EnumSplitEvent, SplitObserver};
use crate::plan::plan_split;
use crate::reader::{SheetReader, SheetSource, XlsxSheetSource};
use crate::report::{ReportSplit, ReportSplitBuilder};
use crate::spec::{SpecSplitConfig, SpecSplitPlan, SpecSplitTarget, SpecWorkerShard, SplitError};
use crate::writer::{WorkbookWriter, XlsxWorkbookWriter};

/// Read-only state shared by every worker of one run.
struct SpecSplitContext<'a, W> {
    plan: &'a SpecSplitPlan,
    allocator: SlotAllocator,
    writer: &'a W,
    observer: &'a dyn SplitObserver,
    if_cancel: &'a AtomicBool,
}

/// Split the `.xlsx` file at `path_input` into parts under `dir_output`.
///
/// Parts are named after the input file stem and overwrite existing files.
pub fn split_xlsx_file<P, Q>(
    path_input: P,
    dir_output: Q,
    config: SpecSplitConfig,
    observer: &dyn SplitObserver,
) -> Result<ReportSplit, SplitError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let path_input = path_input.as_ref();
    let target = SpecSplitTarget::from_input_path(path_input, dir_output.as_ref());
    split_workbook(
        &XlsxSheetSource::new(path_input),
        &XlsxWorkbookWriter::new(),
        &target,
        config,
        observer,
    )
}

/// Split `source` into part files persisted through `writer`.
///
/// See [`split_workbook_cancellable`].
pub fn split_workbook<S, W>(
    source: &S,
    writer: &W,
    target: &SpecSplitTarget,
    config: SpecSplitConfig,
    observer: &dyn SplitObserver,
) -> Result<ReportSplit, SplitError>
where
    S: SheetSource,
    W: WorkbookWriter,
{
    let if_cancel = AtomicBool::new(false);
    split_workbook_cancellable(source, writer, target, config, observer, &if_cancel)
}

/// Split `source` into part files, stopping at the next chunk boundary once `if_cancel` is set.
///
/// This function performs:
/// 1. Config validation (before any I/O).
/// 2. Sheet discovery with a streaming count pass.
/// 3. Up-front planning of worker shards and part files.
/// 4. Shard execution, on the calling thread for one shard or on a rayon
///    pool with one thread per shard otherwise.
/// 5. Report aggregation.
///
/// A failing worker raises `if_cancel` so the remaining workers stop early.
///
/// Returns [`ReportSplit`] when the run completes (with possible per-worker
/// errors stored in the report). Returns [`SplitError`] only for setup
/// failures: invalid config, unreadable input during discovery, an output
/// directory that cannot be created or a forbidden overwrite.
pub fn split_workbook_cancellable<S, W>(
    source: &S,
    writer: &W,
    target: &SpecSplitTarget,
    config: SpecSplitConfig,
    observer: &dyn SplitObserver,
    if_cancel: &AtomicBool,
) -> Result<ReportSplit, SplitError>
where
    S: SheetSource,
    W: WorkbookWriter,
{
    config.validate()?;

    let mut reader = source.open()?;
    let sheets = reader.list_sheets()?;
    observer.on_event(&EnumSplitEvent::SheetsDiscovered {
        n_sheets: sheets.len(),
        n_rows_total: sheets.iter().map(|sheet| sheet.n_rows).sum(),
    });

    let plan = plan_split(sheets, &config, target)?;
    fs::create_dir_all(&target.dir_output).map_err(|e| SplitError::Write {
        path: target.dir_output.clone(),
        message: e.to_string(),
    })?;
    observer.on_event(&EnumSplitEvent::PlanReady {
        n_files: plan.files.len(),
        n_sheet_slots: plan.sheet_slot_count(),
        n_workers: plan.shards.len(),
    });

    let mut builder_report = ReportSplitBuilder {
        cnt_sheets_source: plan.sheets.len() as u64,
        cnt_workers: plan.shards.len() as u64,
        ..ReportSplitBuilder::default()
    };
    let ctx = SpecSplitContext {
        plan: &plan,
        allocator: SlotAllocator::from_plan(&plan),
        writer,
        observer,
        if_cancel,
    };

    if plan.shards.len() <= 1 {
        for shard in &plan.shards {
            builder_report.merge(run_shard(&ctx, shard, &mut reader));
        }
    } else {
        drop(reader);
        for builder_shard in run_shards_parallel(&ctx, source, &mut builder_report) {
            builder_report.merge(builder_shard);
        }
    }

    let report = builder_report.build();
    observer.on_event(&EnumSplitEvent::Finished {
        n_files: report.files.len(),
        n_errors: report.error_count(),
    });
    Ok(report)
}

fn run_shards_parallel<S, W>(
    ctx: &SpecSplitContext<'_, W>,
    source: &S,
    builder_report: &mut ReportSplitBuilder,
) -> Vec<ReportSplitBuilder>
where
    S: SheetSource,
    W: WorkbookWriter,
{
    let n_workers = ctx.plan.shards.len();
    let thread_pool = ThreadPoolBuilder::new().num_threads(n_workers).build();
    let Ok(thread_pool) = thread_pool else {
        builder_report.add_warning(format!(
            "Failed to initialize thread pool (workers={n_workers}); fallback to serial split."
        ));
        return ctx
            .plan
            .shards
            .iter()
            .map(|shard| run_shard_from_source(ctx, shard, source))
            .collect();
    };

    thread_pool.install(|| {
        ctx.plan
            .shards
            .par_iter()
            .map(|shard| run_shard_from_source(ctx, shard, source))
            .collect::<Vec<_>>()
    })
}

fn run_shard_from_source<S, W>(
    ctx: &SpecSplitContext<'_, W>,
    shard: &SpecWorkerShard,
    source: &S,
) -> ReportSplitBuilder
where
    S: SheetSource,
    W: WorkbookWriter,
{
    match source.open() {
        Ok(mut reader) => run_shard(ctx, shard, &mut reader),
        Err(err) => {
            let mut builder_shard = ReportSplitBuilder::default();
            record_worker_error(ctx, shard.worker_idx, err, &mut builder_shard);
            builder_shard
        }
    }
}

/// Run one shard and fold its outcome into a worker-local report.
fn run_shard<R, W>(
    ctx: &SpecSplitContext<'_, W>,
    shard: &SpecWorkerShard,
    reader: &mut R,
) -> ReportSplitBuilder
where
    R: SheetReader,
    W: WorkbookWriter,
{
    let mut builder_shard = ReportSplitBuilder::default();
    match stream_shard(ctx, shard, reader, &mut builder_shard) {
        Ok(()) => ctx.observer.on_event(&EnumSplitEvent::WorkerFinished {
            worker_idx: shard.worker_idx,
            n_files: builder_shard.files.len(),
        }),
        Err(SplitError::Cancelled) => {
            builder_shard.add_cancelled(format!(
                "Worker {} cancelled after {} of {} part file(s).",
                shard.worker_idx,
                builder_shard.files.len(),
                shard.file_idx_range.len()
            ));
            ctx.observer.on_event(&EnumSplitEvent::WorkerCancelled {
                worker_idx: shard.worker_idx,
            });
        }
        Err(err) => record_worker_error(ctx, shard.worker_idx, err, &mut builder_shard),
    }
    builder_shard
}

fn record_worker_error<W>(
    ctx: &SpecSplitContext<'_, W>,
    worker_idx: usize,
    err: SplitError,
    builder_shard: &mut ReportSplitBuilder,
) {
    ctx.if_cancel.store(true, Ordering::SeqCst);
    let message = err.to_string();
    ctx.observer.on_event(&EnumSplitEvent::WorkerFailed {
        worker_idx,
        message: message.clone(),
    });
    builder_shard.add_error(worker_idx, message);
}

fn check_cancel<W>(ctx: &SpecSplitContext<'_, W>) -> Result<(), SplitError> {
    if ctx.if_cancel.load(Ordering::SeqCst) {
        return Err(SplitError::Cancelled);
    }
    Ok(())
}

/// Stream every sheet of `shard` through allocator, buffers and writer.
///
/// At most one part file is staged at a time: a file is flushed as soon as
/// all of its planned sheets are sealed. On error the staged buffers are
/// dropped without being persisted.
fn stream_shard<'p, R, W>(
    ctx: &SpecSplitContext<'p, W>,
    shard: &SpecWorkerShard,
    reader: &mut R,
    builder_shard: &mut ReportSplitBuilder,
) -> Result<(), SplitError>
where
    R: SheetReader,
    W: WorkbookWriter,
{
    let n_chunk_size = ctx.plan.config.chunk_size;
    let mut manager: Option<OutputFileManager<'p>> = None;

    for &ordinal in &shard.sheet_ordinals {
        check_cancel(ctx)?;
        let sheet = &ctx.plan.sheets[ordinal];
        if sheet.n_rows == 0 {
            ctx.observer.on_event(&EnumSplitEvent::SheetSkipped {
                worker_idx: shard.worker_idx,
                sheet_name: sheet.name.clone(),
            });
            continue;
        }
        ctx.observer.on_event(&EnumSplitEvent::SheetStarted {
            worker_idx: shard.worker_idx,
            sheet_name: sheet.name.clone(),
            n_rows: sheet.n_rows,
        });

        let mut stream = reader.open_chunks(sheet, n_chunk_size)?;
        let mut n_row_idx = 0usize;
        loop {
            check_cancel(ctx)?;
            let Some(res_chunk) = stream.next() else {
                break;
            };
            let l_rows = res_chunk?;
            let n_rows_chunk = l_rows.len();

            for row in l_rows {
                let addr = ctx.allocator.allocate(ordinal, n_row_idx);
                n_row_idx += 1;

                if manager
                    .as_ref()
                    .is_some_and(|manager_cur| manager_cur.file_idx() != addr.n_file_idx)
                {
                    if let Some(manager_done) = manager.take() {
                        flush_file(ctx, shard, manager_done, builder_shard)?;
                    }
                }
                let manager_cur = manager.get_or_insert_with(|| {
                    OutputFileManager::new(&ctx.plan.files[addr.n_file_idx])
                });

                if manager_cur.route(row, &addr)? && manager_cur.is_complete() {
                    if let Some(manager_done) = manager.take() {
                        flush_file(ctx, shard, manager_done, builder_shard)?;
                    }
                }
            }

            builder_shard.add_rows_read(n_rows_chunk as u64);
            ctx.observer.on_event(&EnumSplitEvent::ChunkRead {
                worker_idx: shard.worker_idx,
                sheet_name: sheet.name.clone(),
                n_rows_chunk,
                n_rows_done: n_row_idx,
            });
        }
    }

    if let Some(manager_done) = manager.take() {
        flush_file(ctx, shard, manager_done, builder_shard)?;
    }
    Ok(())
}

fn flush_file<W: WorkbookWriter>(
    ctx: &SpecSplitContext<'_, W>,
    shard: &SpecWorkerShard,
    manager: OutputFileManager<'_>,
    builder_shard: &mut ReportSplitBuilder,
) -> Result<(), SplitError> {
    let output = manager.finalize(ctx.writer, &ctx.plan.sheets)?;
    ctx.observer.on_event(&EnumSplitEvent::FilePersisted {
        worker_idx: shard.worker_idx,
        n_file_idx: output.n_file_idx,
        path: output.path.clone(),
        n_sheets: output.sheets.len(),
    });
    builder_shard.add_file(output);
    Ok(())
}
