//! Hash-partitioned record tables backing the nested-loop optional join.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::streams::Mapping;

/// A tuple plus bookkeeping: `ats` is its insertion order relative to
/// every other record ever inserted into either side of the same
/// `NestedLoopOptional`; `dts` is reserved for a deletion-timestamp
/// feature this crate does not implement, and is always `0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub tuple: Mapping,
    pub ats: u64,
    pub dts: u64,
}

impl Record {
    pub fn new(tuple: Mapping, ats: u64) -> Self {
        Record { tuple, ats, dts: 0 }
    }

    /// True when `self` must not be matched against `other` because
    /// `other` was inserted after `self` — `other`'s own insertion probe
    /// already produced this pair.
    pub fn is_duplicated(&self, other: &Record) -> bool {
        self.ats < other.ats
    }
}

/// A monotonically increasing arrival-timestamp source, shared between
/// the two `PartitionedTable`s of one `NestedLoopOptional` instance.
/// Never wall-clock time — ties would silently break duplicate
/// suppression.
#[derive(Debug, Clone, Default)]
pub struct ArrivalClock(Arc<AtomicU64>);

impl ArrivalClock {
    pub fn new() -> Self {
        ArrivalClock(Arc::new(AtomicU64::new(0)))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Build the partition key: the concatenation of `t[v]` for `v` in
/// `join_vars`, in the caller's fixed iteration order. Missing bindings
/// contribute nothing (matching the tuple-access semantics used
/// elsewhere: absent keys are treated as unbound, not as an error).
pub fn partition_key(tuple: &Mapping, join_vars: &[String]) -> String {
    let mut key = String::new();
    for v in join_vars {
        if let Some(value) = tuple.get(v) {
            key.push_str(value);
        }
        key.push('\u{1}');
    }
    key
}

fn hash_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// A fixed number of append-only partitions of [`Record`]. The partition
/// count should be a power of two (the default configuration uses 128)
/// though this is not enforced — any positive count works, it only
/// changes the quality of the `%` distribution.
#[derive(Debug, Clone)]
pub struct PartitionedTable {
    partitions: Vec<Vec<Record>>,
}

impl PartitionedTable {
    pub fn new(partition_count: usize) -> Self {
        let partition_count = partition_count.max(1);
        PartitionedTable {
            partitions: vec![Vec::new(); partition_count],
        }
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn index_for(&self, key: &str) -> usize {
        (hash_key(key) as usize) % self.partitions.len()
    }

    pub fn insert(&mut self, index: usize, record: Record) {
        self.partitions[index].push(record);
    }

    pub fn partition(&self, index: usize) -> &[Record] {
        &self.partitions[index]
    }
}
