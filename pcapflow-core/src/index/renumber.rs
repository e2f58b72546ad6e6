//! Dense in-place renumbering of flow ids.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::io::RecordMapMut;
use crate::record::{PacketRecord, WirePacketRecord};
use crate::sort::run_per_file;

/// Give each run of equal flow ids the next id from 0.
///
/// Runs are contiguous stretches, so in a file that is not flow-sorted a
/// flow that appears twice gets two ids. Returns the number of ids used.
pub fn renumber_records(records: &mut [WirePacketRecord]) -> u32 {
    let Some(first) = records.first() else {
        return 0;
    };

    let mut last = first.flow();
    let mut next = 0u32;
    for record in records.iter_mut() {
        if record.flow() != last {
            last = record.flow();
            next = next.wrapping_add(1);
        }
        record.set_flow(next);
    }
    next.wrapping_add(1)
}

/// Renumber one packet file in place and return its record count.
pub fn renumber_file(path: &Path) -> Result<u64> {
    let mut map = RecordMapMut::<PacketRecord>::open(path)?;
    let records = map.records_mut()?;
    let count = records.len() as u64;
    let flows = renumber_records(records);
    map.flush()?;

    info!(path = %path.display(), records = count, flows, "reindexed");
    Ok(count)
}

/// Renumber several packet files, optionally one thread per file.
pub fn renumber_files(paths: &[PathBuf], parallel: bool) -> Result<Vec<(PathBuf, u64)>> {
    run_per_file(paths, parallel, renumber_file)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;
    use zerocopy::IntoBytes;

    use super::*;
    use crate::io::RecordMap;
    use crate::record::{Record, Timestamp};

    fn packets(flows: &[u32]) -> Vec<WirePacketRecord> {
        flows
            .iter()
            .enumerate()
            .map(|(i, &f)| PacketRecord::new(f, Timestamp { sec: i as u32, usec: 0 }, 64).to_wire())
            .collect()
    }

    fn flows_of(records: &[WirePacketRecord]) -> Vec<u32> {
        records.iter().map(WirePacketRecord::flow).collect()
    }

    #[test]
    fn test_runs_become_dense() {
        let mut records = packets(&[7, 7, 3, 3, 3, 9]);
        assert_eq!(renumber_records(&mut records), 3);
        assert_eq!(flows_of(&records), vec![0, 0, 1, 1, 1, 2]);
    }

    #[test]
    fn test_empty() {
        assert_eq!(renumber_records(&mut []), 0);
    }

    #[test]
    fn test_renumber_file_keeps_other_fields() {
        let original = packets(&[40, 40, 12, 99, 99]);
        let mut file = NamedTempFile::new().unwrap();
        for r in &original {
            file.write_all(r.as_bytes()).unwrap();
        }
        file.flush().unwrap();

        assert_eq!(renumber_file(file.path()).unwrap(), 5);

        let map = RecordMap::<PacketRecord>::open(file.path()).unwrap();
        let records = map.records().unwrap();
        assert_eq!(flows_of(records), vec![0, 0, 1, 2, 2]);
        for (after, before) in records.iter().zip(&original) {
            assert_eq!(after.time(), before.time());
            assert_eq!(after.size(), before.size());
        }
    }

    #[test]
    fn test_renumber_files_parallel() {
        let files: Vec<NamedTempFile> = (0..3)
            .map(|i| {
                let mut file = NamedTempFile::new().unwrap();
                for r in packets(&[5 + i, 5 + i, 9, 9, 9]) {
                    file.write_all(r.as_bytes()).unwrap();
                }
                file.flush().unwrap();
                file
            })
            .collect();
        let paths: Vec<PathBuf> = files.iter().map(|f| f.path().to_path_buf()).collect();

        let done = renumber_files(&paths, true).unwrap();
        assert_eq!(done.len(), 3);
        for path in &paths {
            let map = RecordMap::<PacketRecord>::open(path).unwrap();
            assert_eq!(flows_of(map.records().unwrap()), vec![0, 0, 1, 1, 1]);
        }
    }
}
