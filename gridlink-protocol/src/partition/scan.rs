//! Batch-streaming partition scans with adaptive batch sizing.
//!
//! A scan visits every partition of the store exactly once across a series
//! of client round trips. The first call probes a single randomly chosen
//! partition, measures the result, and extrapolates how many partitions fit
//! in the response byte budget; subsequent calls reuse that batch size. The
//! state between calls travels in an opaque [`ScanCursor`] the client hands
//! back unmodified.

use std::sync::Arc;

use gridlink_core::{protocol, GridError, Result};
use tracing::debug;

use crate::store::{Entry, FilterSpec, PartitionedStore, ProcessorSpec};

use super::cursor::ScanCursor;
use super::set::PartitionSet;

/// Tuning knobs of the scan engine.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Soft byte budget one batch of results should stay under.
    pub byte_budget: usize,
    /// Optional hard ceiling on partitions per batch, regardless of how
    /// small the probe results were.
    pub hard_batch_limit: Option<i32>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            byte_budget: protocol::DEFAULT_RESPONSE_BYTE_BUDGET,
            hard_batch_limit: None,
        }
    }
}

/// What a scan produces per partition.
#[derive(Debug, Clone, Copy)]
pub enum ScanMode<'a> {
    /// Collect the keys matching a filter.
    Keys {
        /// The filter to evaluate.
        filter: &'a FilterSpec,
    },
    /// Collect the entries matching a filter.
    Entries {
        /// The filter to evaluate.
        filter: &'a FilterSpec,
    },
    /// Run an entry processor against every entry matching a filter and
    /// collect the per-key results.
    InvokeAll {
        /// The filter selecting the entries to process.
        filter: &'a FilterSpec,
        /// The processor to run.
        processor: &'a ProcessorSpec,
    },
}

impl ScanMode<'_> {
    fn filter(&self) -> &FilterSpec {
        match self {
            ScanMode::Keys { filter }
            | ScanMode::Entries { filter }
            | ScanMode::InvokeAll { filter, .. } => filter,
        }
    }
}

/// The accumulated results of one scan batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPayload {
    /// Keys, for [`ScanMode::Keys`].
    Keys(Vec<Vec<u8>>),
    /// Entries, for [`ScanMode::Entries`] and [`ScanMode::InvokeAll`].
    Entries(Vec<Entry>),
}

impl ScanPayload {
    fn empty_for(mode: &ScanMode<'_>) -> Self {
        match mode {
            ScanMode::Keys { .. } => ScanPayload::Keys(Vec::new()),
            _ => ScanPayload::Entries(Vec::new()),
        }
    }

    fn extend(&mut self, other: ScanPayload) {
        match (self, other) {
            (ScanPayload::Keys(dst), ScanPayload::Keys(src)) => dst.extend(src),
            (ScanPayload::Entries(dst), ScanPayload::Entries(src)) => dst.extend(src),
            // Modes never change mid-scan.
            _ => unreachable!("scan payload kind changed mid-scan"),
        }
    }

    /// Approximate encoded size of this payload, used for batch sizing.
    pub fn estimated_wire_size(&self) -> usize {
        match self {
            ScanPayload::Keys(keys) => keys.iter().map(|k| 4 + k.len()).sum(),
            ScanPayload::Entries(entries) => {
                entries.iter().map(Entry::estimated_wire_size).sum()
            }
        }
    }

    /// Returns true if the payload holds no results.
    pub fn is_empty(&self) -> bool {
        match self {
            ScanPayload::Keys(keys) => keys.is_empty(),
            ScanPayload::Entries(entries) => entries.is_empty(),
        }
    }
}

/// One completed scan batch: the results plus the cursor resuming the scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// The batch results.
    pub payload: ScanPayload,
    /// The cursor to hand back on the next call. Exhausted when its
    /// remaining set is empty.
    pub cursor: ScanCursor,
}

/// Extrapolates the partitions-per-batch from one observed partition.
///
/// At least one partition always fits, however large the probe was; the
/// result never exceeds `remaining` or the optional hard cap.
pub fn compute_batch_size(
    byte_budget: usize,
    observed_bytes: usize,
    remaining: u32,
    hard_cap: Option<i32>,
) -> i32 {
    let per_partition = observed_bytes.max(1);
    let mut batch = (byte_budget / per_partition).max(1) as i64;
    batch = batch.min(remaining as i64);
    if let Some(cap) = hard_cap {
        batch = batch.min(cap.max(1) as i64);
    }
    batch.max(1) as i32
}

/// Runs one batch of a partition scan, resuming from `cursor_bytes`.
///
/// An empty or absent cursor starts a fresh scan. Filters that manage their
/// own pagination (paging state, key association, explicit partitions) are
/// rejected; callers route those directly to the store instead. There are no
/// retries: a failure in any partition aborts the whole batch and the error
/// propagates to the caller unchanged.
pub async fn run_scan(
    store: &Arc<dyn PartitionedStore>,
    name: &str,
    mode: ScanMode<'_>,
    cursor_bytes: Option<&[u8]>,
    config: &ScanConfig,
) -> Result<ScanOutcome> {
    if mode.filter().manages_own_batching() {
        return Err(GridError::Protocol(
            "filter manages its own batching and cannot be scanned".to_string(),
        ));
    }

    let partition_count = store.partition_count();
    let cursor = ScanCursor::decode(cursor_bytes.unwrap_or(&[]), partition_count)?;

    if cursor.is_exhausted() {
        return Ok(ScanOutcome {
            payload: ScanPayload::empty_for(&mode),
            cursor,
        });
    }

    let batch_size = cursor.batch_size();
    let mut remaining = cursor.into_remaining();

    if batch_size == 0 {
        // Fresh scan: probe one partition to size the rest.
        let mut probe_set = PartitionSet::empty(partition_count);
        if let Some(p) = remaining.pop_random() {
            probe_set.insert(p);
        }
        let mut payload = execute_partitions(store, name, &mode, probe_set).await?;

        let observed = payload.estimated_wire_size();
        let batch = compute_batch_size(
            config.byte_budget,
            observed,
            remaining.cardinality() + 1,
            config.hard_batch_limit,
        );
        debug!(
            name,
            observed_bytes = observed,
            batch_size = batch,
            remaining = remaining.cardinality(),
            "sized scan batch from probe"
        );

        // The probe counts against the first batch.
        if batch > 1 && !remaining.is_empty() {
            let extra = remaining.take(batch as u32 - 1);
            payload.extend(execute_partitions(store, name, &mode, extra).await?);
        }

        return Ok(ScanOutcome {
            payload,
            cursor: ScanCursor::new(remaining, batch),
        });
    }

    let batch = remaining.take(batch_size as u32);
    debug!(
        name,
        batch_size,
        executing = batch.cardinality(),
        remaining = remaining.cardinality(),
        "resuming scan"
    );
    let payload = execute_partitions(store, name, &mode, batch).await?;

    Ok(ScanOutcome {
        payload,
        cursor: ScanCursor::new(remaining, batch_size),
    })
}

async fn execute_partitions(
    store: &Arc<dyn PartitionedStore>,
    name: &str,
    mode: &ScanMode<'_>,
    partitions: PartitionSet,
) -> Result<ScanPayload> {
    match mode {
        ScanMode::Keys { filter } => {
            let keys = store.key_set(name, &filter.restricted_to(partitions)).await?;
            Ok(ScanPayload::Keys(keys))
        }
        ScanMode::Entries { filter } => {
            let entries = store
                .entry_set(name, &filter.restricted_to(partitions))
                .await?;
            Ok(ScanPayload::Entries(entries))
        }
        ScanMode::InvokeAll { filter, processor } => {
            let entries = store
                .invoke_filter(name, &filter.restricted_to(partitions), processor)
                .await?;
            Ok(ScanPayload::Entries(entries))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size_at_least_one() {
        assert_eq!(compute_batch_size(100, 10_000, 50, None), 1);
        assert_eq!(compute_batch_size(0, 0, 50, None), 1);
    }

    #[test]
    fn test_batch_size_extrapolates() {
        // 1 MiB budget, 4 KiB per partition -> 256 partitions.
        assert_eq!(compute_batch_size(1 << 20, 4 << 10, 1000, None), 256);
    }

    #[test]
    fn test_batch_size_clamped_to_remaining() {
        assert_eq!(compute_batch_size(1 << 20, 1, 17, None), 17);
    }

    #[test]
    fn test_batch_size_hard_cap() {
        assert_eq!(compute_batch_size(1 << 20, 1, 1000, Some(64)), 64);
        // A nonsensical cap still yields at least one partition.
        assert_eq!(compute_batch_size(1 << 20, 1, 1000, Some(0)), 1);
    }

    #[test]
    fn test_batch_size_empty_probe() {
        // An empty probe result is treated as one byte per partition.
        assert_eq!(compute_batch_size(1 << 20, 0, 4, None), 4);
    }
}
