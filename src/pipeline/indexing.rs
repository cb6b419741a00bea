//! Batch planning and batch-local to global index mapping.
//!
//! Batched stages number items from 0 inside each prompt. Every output index
//! is mapped back with [`global_index`] right after its batch completes, so
//! `hook_index`/`script_index` stay unique across the whole run.

use std::ops::Range;

/// Split `total` items into consecutive ranges of at most `batch_size`.
pub fn plan_batches(total: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..total)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(total))
        .collect()
}

/// Map a batch-local index to its global position.
///
/// Returns `None` when the local index falls outside the batch.
pub fn global_index(batch: &Range<usize>, local: usize) -> Option<usize> {
    let global = batch.start.checked_add(local)?;
    batch.contains(&global).then_some(global)
}
