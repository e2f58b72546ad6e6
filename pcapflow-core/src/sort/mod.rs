//! In-place sorting of packet record files.
//!
//! A packet file is mapped read-write and sorted directly through the
//! mapping with [`smoothsort`], so the page cache absorbs the I/O and no
//! copy of the file is ever made. The order is a lexicographic chain over
//! `flow`, `time` and `size` in any permutation, closed by a byte-wise
//! comparison of the whole record so that every pair of records compares
//! totally and the result is deterministic.

mod parallel;
mod smoothsort;

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;
use crate::io::RecordMapMut;
use crate::record::{PacketRecord, WirePacketRecord};

pub use parallel::run_per_file;
pub use smoothsort::smoothsort;

/// A packet record field usable as a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    Flow,
    Time,
    Size,
}

impl SortKey {
    pub const ALL: [SortKey; 3] = [SortKey::Flow, SortKey::Time, SortKey::Size];

    #[inline]
    fn compare(self, a: &WirePacketRecord, b: &WirePacketRecord) -> Ordering {
        match self {
            SortKey::Flow => a.flow().cmp(&b.flow()),
            SortKey::Time => a.time().cmp(&b.time()),
            SortKey::Size => a.size().cmp(&b.size()),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Flow => write!(f, "flow"),
            SortKey::Time => write!(f, "time"),
            SortKey::Size => write!(f, "size"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// A total order over packet records.
///
/// Built once from the requested keys; any key not named is appended in
/// `flow`, `time`, `size` order, and the full record bytes break what ties
/// remain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    keys: Vec<(SortKey, SortDirection)>,
}

impl SortOrder {
    /// Ascending order by `primary`, then `secondary`, then the third key.
    pub fn new(primary: SortKey, secondary: SortKey) -> Self {
        Self::from_keys(&[
            (primary, SortDirection::Ascending),
            (secondary, SortDirection::Ascending),
        ])
    }

    /// Order by the given keys, each in its own direction. A key named more
    /// than once keeps its first position.
    pub fn from_keys(keys: &[(SortKey, SortDirection)]) -> Self {
        let mut chain: Vec<(SortKey, SortDirection)> = Vec::with_capacity(SortKey::ALL.len());
        let defaults = SortKey::ALL.iter().map(|&k| (k, SortDirection::Ascending));
        for (key, direction) in keys.iter().copied().chain(defaults) {
            if !chain.iter().any(|(k, _)| *k == key) {
                chain.push((key, direction));
            }
        }
        SortOrder { keys: chain }
    }

    /// The key chain, always naming each field exactly once.
    pub fn keys(&self) -> &[(SortKey, SortDirection)] {
        &self.keys
    }

    pub fn compare(&self, a: &WirePacketRecord, b: &WirePacketRecord) -> Ordering {
        for &(key, direction) in &self.keys {
            let ord = key.compare(a, b);
            if ord != Ordering::Equal {
                return match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                };
            }
        }
        a.cmp_bytes(b)
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::new(SortKey::Flow, SortKey::Time)
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, direction)) in self.keys.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{key}")?;
            if *direction == SortDirection::Descending {
                write!(f, " desc")?;
            }
        }
        Ok(())
    }
}

/// Sort records in place.
pub fn sort_records(records: &mut [WirePacketRecord], order: &SortOrder) {
    smoothsort(records, |a, b| order.compare(a, b) == Ordering::Less);
}

/// Whether every adjacent pair is in order.
pub fn is_sorted(records: &[WirePacketRecord], order: &SortOrder) -> bool {
    records
        .windows(2)
        .all(|pair| order.compare(&pair[0], &pair[1]) != Ordering::Greater)
}

/// Sort one packet file in place and return its record count.
pub fn sort_file(path: &Path, order: &SortOrder) -> Result<u64> {
    let mut map = RecordMapMut::<PacketRecord>::open(path)?;
    let records = map.records_mut()?;
    let count = records.len() as u64;
    debug!(path = %path.display(), records = count, order = %order, "sorting");

    sort_records(records, order);
    map.flush()?;

    info!(path = %path.display(), records = count, "sorted");
    Ok(count)
}

/// Sort several packet files, optionally one thread per file.
pub fn sort_files(paths: &[PathBuf], order: &SortOrder, parallel: bool) -> Result<Vec<(PathBuf, u64)>> {
    run_per_file(paths, parallel, |path| sort_file(path, order))
}
