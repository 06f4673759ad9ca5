//! Up-front split layout: worker partition, slot bases and part files.
//!
//! Everything a worker needs to place its rows is computed here from the
//! discovered row counts, before any worker starts. Each worker owns a
//! contiguous, disjoint range of part file indices, so no two workers ever
//! target the same path and no runtime coordination is needed.

use std::cmp::Reverse;

use crate::spec::{
    EnumOutputConflictStrategy, SpecOutputFilePlan, SpecSheetSlotPlan, SpecSourceSheet,
    SpecSplitConfig, SpecSplitPlan, SpecSplitTarget, SpecWorkerShard, SplitError,
};
use crate::util::{
    calculate_part_row_count, calculate_sheet_slot_count, derive_output_sheet_name,
    derive_part_file_name,
};

/// Partition source sheets across at most `num_workers` workers.
///
/// Greedy longest-processing-time: sheets sorted by descending row count
/// (ties by ordinal) go to the currently least-loaded worker (ties to the
/// lowest worker index). Only non-empty sheets open a worker, so the result
/// never holds more shards than non-empty sheets (and at least one shard).
/// Ordinals inside each shard are returned in input order.
pub fn plan_worker_shards(sheets: &[SpecSourceSheet], num_workers: usize) -> Vec<Vec<usize>> {
    let n_sheets_nonempty = sheets.iter().filter(|sheet| sheet.n_rows > 0).count();
    let n_workers = usize::min(num_workers, n_sheets_nonempty).max(1);

    let mut l_order: Vec<&SpecSourceSheet> = sheets.iter().collect();
    l_order.sort_by_key(|sheet| (Reverse(sheet.n_rows), sheet.ordinal));

    let mut l_loads = vec![0usize; n_workers];
    let mut l_shards: Vec<Vec<usize>> = vec![Vec::new(); n_workers];
    for sheet in l_order {
        let mut n_worker_idx = 0usize;
        for (idx, n_load) in l_loads.iter().enumerate() {
            if *n_load < l_loads[n_worker_idx] {
                n_worker_idx = idx;
            }
        }
        l_loads[n_worker_idx] += sheet.n_rows;
        l_shards[n_worker_idx].push(sheet.ordinal);
    }

    for l_ordinals in &mut l_shards {
        l_ordinals.sort_unstable();
    }
    l_shards
}

/// Compute the full split layout for discovered `sheets`.
///
/// # Errors
/// - [`SplitError::Config`] when `config` is invalid or sheet ordinals are
///   not `0..sheets.len()` in order.
/// - [`SplitError::Write`] when `target` forbids overwriting and a planned
///   part path already exists.
pub fn plan_split(
    sheets: Vec<SpecSourceSheet>,
    config: &SpecSplitConfig,
    target: &SpecSplitTarget,
) -> Result<SpecSplitPlan, SplitError> {
    config.validate()?;
    validate_sheet_ordinals(&sheets)?;

    let n_spf = config.sheets_per_file;
    let n_rps = config.rows_per_sheet;
    let l_shard_ordinals = plan_worker_shards(&sheets, config.num_workers);

    // Each shard starts on a fresh part file.
    let mut n_slot_base_by_sheet = vec![0usize; sheets.len()];
    let mut l_shards = Vec::with_capacity(l_shard_ordinals.len());
    let mut n_file_cursor = 0usize;
    for (worker_idx, sheet_ordinals) in l_shard_ordinals.into_iter().enumerate() {
        let n_slot_start = n_file_cursor * n_spf;
        let mut n_slot_cursor = n_slot_start;
        let mut n_rows_total = 0usize;
        for &ordinal in &sheet_ordinals {
            n_slot_base_by_sheet[ordinal] = n_slot_cursor;
            n_slot_cursor += calculate_sheet_slot_count(sheets[ordinal].n_rows, n_rps);
            n_rows_total += sheets[ordinal].n_rows;
        }

        let n_files = (n_slot_cursor - n_slot_start).div_ceil(n_spf);
        l_shards.push(SpecWorkerShard {
            worker_idx,
            sheet_ordinals,
            n_rows_total,
            file_idx_range: n_file_cursor..n_file_cursor + n_files,
        });
        n_file_cursor += n_files;
    }

    let mut l_files: Vec<SpecOutputFilePlan> = Vec::with_capacity(n_file_cursor);
    for shard in &l_shards {
        for n_file_idx in shard.file_idx_range.clone() {
            l_files.push(SpecOutputFilePlan {
                n_file_idx,
                path: target
                    .dir_output
                    .join(derive_part_file_name(&target.name_base, n_file_idx)),
                worker_idx: shard.worker_idx,
                slots: Vec::new(),
            });
        }

        for &ordinal in &shard.sheet_ordinals {
            let sheet = &sheets[ordinal];
            let n_parts = calculate_sheet_slot_count(sheet.n_rows, n_rps);
            for n_part_idx in 0..n_parts {
                let n_slot_global = n_slot_base_by_sheet[ordinal] + n_part_idx;
                l_files[n_slot_global / n_spf].slots.push(SpecSheetSlotPlan {
                    n_sheet_idx: n_slot_global % n_spf,
                    sheet_ordinal: ordinal,
                    n_part_idx,
                    sheet_name: derive_output_sheet_name(&sheet.name, n_part_idx, n_parts),
                    n_rows: calculate_part_row_count(sheet.n_rows, n_rps, n_part_idx),
                });
            }
        }
    }

    let plan = SpecSplitPlan {
        config: *config,
        sheets,
        n_slot_base_by_sheet,
        shards: l_shards,
        files: l_files,
    };
    validate_plan_targets(&plan, target)?;
    Ok(plan)
}

fn validate_sheet_ordinals(sheets: &[SpecSourceSheet]) -> Result<(), SplitError> {
    for (idx, sheet) in sheets.iter().enumerate() {
        if sheet.ordinal != idx {
            return Err(SplitError::Config(format!(
                "Sheet {:?} has ordinal {} at position {idx}.",
                sheet.name, sheet.ordinal
            )));
        }
    }
    Ok(())
}

fn validate_plan_targets(plan: &SpecSplitPlan, target: &SpecSplitTarget) -> Result<(), SplitError> {
    if target.rule_conflict != EnumOutputConflictStrategy::Error {
        return Ok(());
    }
    match plan.files.iter().find(|file_plan| file_plan.path.exists()) {
        Some(file_plan) => Err(SplitError::Write {
            path: file_plan.path.clone(),
            message: "output file already exists".to_string(),
        }),
        None => Ok(()),
    }
}
