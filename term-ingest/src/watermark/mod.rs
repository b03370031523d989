//! Durable tracking of processed partitions.
//!
//! The watermark is an append-only list of [`WatermarkRecord`]s, one per
//! processed partition, persisted as a single CSV artifact. It is handled as
//! an explicit value: [`WatermarkStore::load`] returns a [`Watermark`], the
//! caller computes the pending set from it, and [`WatermarkStore::commit`]
//! returns the next version. Nothing about it is global.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::partition::PartitionId;

mod artifact;
mod store;

pub use store::{WatermarkStore, DEFAULT_WATERMARK_KEY};

/// One processed partition and the time its processing was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkRecord {
    pub partition_id: PartitionId,
    pub processed_at: DateTime<Utc>,
}

impl WatermarkRecord {
    pub fn new(partition_id: PartitionId, processed_at: DateTime<Utc>) -> Self {
        Self {
            partition_id,
            processed_at,
        }
    }
}

/// A loaded watermark: the ordered records plus a version counter.
///
/// Invariant: no partition id appears in more than one record.
#[derive(Debug, Clone, Default)]
pub struct Watermark {
    records: Vec<WatermarkRecord>,
    index: BTreeSet<PartitionId>,
    generation: u64,
}

impl Watermark {
    /// A watermark with no records, as seen on the first run.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a watermark from records, returning the first duplicated id on
    /// failure.
    pub(crate) fn from_records(
        records: Vec<WatermarkRecord>,
    ) -> std::result::Result<Self, PartitionId> {
        let mut index = BTreeSet::new();
        for record in &records {
            if !index.insert(record.partition_id.clone()) {
                return Err(record.partition_id.clone());
            }
        }
        Ok(Self {
            records,
            index,
            generation: 0,
        })
    }

    /// Records in commit order.
    pub fn records(&self) -> &[WatermarkRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True if the partition has already been processed.
    pub fn contains(&self, id: &PartitionId) -> bool {
        self.index.contains(id)
    }

    /// Every processed partition id.
    pub fn processed_ids(&self) -> &BTreeSet<PartitionId> {
        &self.index
    }

    /// Number of commits persisted since this watermark was loaded.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Computes the partitions still to process.
    ///
    /// Returns `catalog` minus the recorded partitions, restricted to ids at
    /// or before `cutoff` when one is given, in ascending order. The order
    /// matters: after an interrupted run the pending set is exactly the
    /// unprocessed tail.
    pub fn pending(
        &self,
        catalog: &BTreeSet<PartitionId>,
        cutoff: Option<&PartitionId>,
    ) -> Vec<PartitionId> {
        catalog
            .iter()
            .filter(|id| !self.index.contains(*id))
            .filter(|id| cutoff.is_none_or(|cutoff| *id <= cutoff))
            .cloned()
            .collect()
    }

    /// Returns the watermark with `newly_processed` appended, skipping ids
    /// already present, together with the ids actually added.
    pub(crate) fn appended(
        &self,
        newly_processed: &[PartitionId],
        at: DateTime<Utc>,
    ) -> (Self, Vec<PartitionId>) {
        let mut next = self.clone();
        let mut added = Vec::new();
        for id in newly_processed {
            if next.index.insert(id.clone()) {
                next.records.push(WatermarkRecord::new(id.clone(), at));
                added.push(id.clone());
            }
        }
        (next, added)
    }
}
