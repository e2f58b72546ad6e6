//! Random access into record files.
//!
//! [`PacketIndex`] answers per-flow queries against a packet file that is
//! sorted with flow as the primary key: a binary search finds the first
//! record of a flow and the run of equal flow ids that follows is the
//! answer. [`FlowIndex`] reads flow files, whose records carry strictly
//! increasing ids (the extraction base plus the ordinal), so a flow id is
//! found by position or by a search on the stored id.
//!
//! Both are read-only views over a memory mapping.

pub mod renumber;

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::io::RecordMap;
use crate::record::{FlowRecord, PacketRecord, Record, WireFlowRecord, WirePacketRecord};

pub use renumber::{renumber_file, renumber_files, renumber_records};

/// Number of leading adjacent pairs checked for flow order on open.
pub const SORT_CHECK_PAIRS: usize = 1000;

/// Flow-sorted packet file opened for queries.
pub struct PacketIndex {
    map: RecordMap<PacketRecord>,
    max_flow: Option<u32>,
}

impl PacketIndex {
    /// Map `path` and spot-check that it is sorted by flow.
    ///
    /// Only the first [`SORT_CHECK_PAIRS`] adjacent pairs are examined, so a
    /// file that goes out of order further in is not detected here.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let map = RecordMap::<PacketRecord>::open(path)?;
        let records = map.records()?;

        if let Some(position) = first_unsorted(records, SORT_CHECK_PAIRS) {
            return Err(Error::Unsorted { position });
        }

        let max_flow = records.last().map(WirePacketRecord::flow);
        debug!(path = %map.path().display(), records = records.len(), ?max_flow, "opened packet index");
        Ok(PacketIndex { map, max_flow })
    }

    pub fn path(&self) -> &Path {
        self.map.path()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Largest flow id in the file, taken from the last record.
    pub fn max_flow(&self) -> Option<u32> {
        self.max_flow
    }

    pub fn records(&self) -> Result<&[WirePacketRecord]> {
        self.map.records()
    }

    /// The first `n` records, or all of them if there are fewer.
    pub fn head(&self, n: usize) -> Result<&[WirePacketRecord]> {
        let records = self.records()?;
        Ok(&records[..n.min(records.len())])
    }

    /// The last `n` records, or all of them if there are fewer.
    pub fn tail(&self, n: usize) -> Result<&[WirePacketRecord]> {
        let records = self.records()?;
        Ok(&records[records.len().saturating_sub(n)..])
    }

    /// Every record of `flow`, in file order.
    ///
    /// A flow id no larger than the largest one in the file that has no
    /// records gives an empty run. A larger id is [`Error::FlowOutOfRange`].
    pub fn lookup(&self, flow: u32) -> Result<&[WirePacketRecord]> {
        match self.max_flow {
            Some(max) if flow > max => return Err(Error::FlowOutOfRange { flow, max }),
            None => return Ok(&[]),
            Some(_) => {}
        }

        let records = self.records()?;
        let start = records.partition_point(|r| r.flow() < flow);
        let len = records[start..].partition_point(|r| r.flow() == flow);
        Ok(&records[start..start + len])
    }

    /// Resolve each flow id of `flows` in turn.
    ///
    /// With `reindex`, the emitted records carry new flow ids `0, 1, 2, ...`
    /// assigned to the queries that matched at least one record, in query
    /// order. The iterator stops being useful after the first error.
    pub fn lookup_many<'a, I>(&'a self, flows: I, reindex: bool) -> impl Iterator<Item = Result<PacketRecord>> + 'a
    where
        I: IntoIterator<Item = u32>,
        I::IntoIter: 'a,
    {
        let mut next_id = 0u32;
        flows.into_iter().flat_map(move |flow| {
            let (run, error) = match self.lookup(flow) {
                Ok(run) => (run, None),
                Err(e) => (&[][..], Some(e)),
            };
            let new_id = next_id;
            if !run.is_empty() {
                next_id = next_id.wrapping_add(1);
            }
            error.map(Err).into_iter().chain(run.iter().map(move |wire| {
                let mut record = PacketRecord::from_wire(wire);
                if reindex {
                    record.flow = new_id;
                }
                Ok(record)
            }))
        })
    }
}

/// Position of the first record (within the first `pairs` adjacent pairs)
/// whose flow id exceeds its successor's.
fn first_unsorted(records: &[WirePacketRecord], pairs: usize) -> Option<usize> {
    records
        .windows(2)
        .take(pairs)
        .position(|pair| pair[0].flow() > pair[1].flow())
}

/// Flow file opened for ordinal access.
pub struct FlowIndex {
    map: RecordMap<FlowRecord>,
}

impl FlowIndex {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(FlowIndex {
            map: RecordMap::open(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.map.path()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn records(&self) -> Result<&[WireFlowRecord]> {
        self.map.records()
    }

    /// The record at position `index`, byte offset `index * 17`.
    pub fn get(&self, index: usize) -> Result<Option<FlowRecord>> {
        Ok(self.records()?.get(index).map(FlowRecord::from_wire))
    }

    /// The record whose stored id is `id`.
    ///
    /// Ids start at the extraction base, so with a non-zero base they differ
    /// from positions.
    pub fn lookup(&self, id: u32) -> Result<Option<FlowRecord>> {
        let records = self.records()?;
        let at = records.partition_point(|r| r.id() < id);
        Ok(records
            .get(at)
            .filter(|r| r.id() == id)
            .map(FlowRecord::from_wire))
    }

    /// Id of the first record, the base the file was extracted with.
    pub fn first_id(&self) -> Result<Option<u32>> {
        Ok(self.records()?.first().map(|r| r.id()))
    }

    pub fn head(&self, n: usize) -> Result<&[WireFlowRecord]> {
        let records = self.records()?;
        Ok(&records[..n.min(records.len())])
    }

    pub fn tail(&self, n: usize) -> Result<&[WireFlowRecord]> {
        let records = self.records()?;
        Ok(&records[records.len().saturating_sub(n)..])
    }
}

/// Parse whitespace-separated flow ids.
pub fn read_index_list<R: Read>(mut reader: R) -> Result<Vec<u32>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<u32>()
                .map_err(|e| Error::Usage(format!("invalid flow id {token:?} in index list: {e}")))
        })
        .collect()
}

/// Read a flow id list from `path`; `-` reads stdin and compressed files
/// are decompressed by suffix.
pub fn read_index_list_file(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    read_index_list(crate::io::open_input(path.as_ref())?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;
    use zerocopy::IntoBytes;

    use super::*;
    use crate::record::Timestamp;

    fn packet(flow: u32, sec: u32) -> PacketRecord {
        PacketRecord::new(flow, Timestamp { sec, usec: 0 }, 100)
    }

    fn packet_file(records: &[PacketRecord]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for r in records {
            file.write_all(r.to_wire().as_bytes()).unwrap();
        }
        file.flush().unwrap();
        file
    }

    /// Flows 0..10 with `flow % 3 + 1` packets each, flow 4 missing.
    fn sample() -> Vec<PacketRecord> {
        (0..10u32)
            .filter(|&f| f != 4)
            .flat_map(|f| (0..f % 3 + 1).map(move |i| packet(f, 1000 + i)))
            .collect()
    }

    #[test]
    fn test_head_tail_1001_records() {
        let records: Vec<PacketRecord> = (0..1001).map(|i| packet(i, i)).collect();
        let file = packet_file(&records);
        let index = PacketIndex::open(file.path()).unwrap();

        let head = index.head(1000).unwrap();
        assert_eq!(head.len(), 1000);
        for (i, r) in head.iter().enumerate() {
            assert_eq!(PacketRecord::from_wire(r), records[i]);
        }
        let tail = index.tail(1).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(PacketRecord::from_wire(&tail[0]), records[1000]);

        assert_eq!(index.head(5000).unwrap().len(), 1001);
        assert_eq!(index.tail(5000).unwrap().len(), 1001);
    }

    #[test]
    fn test_lookup_matches_linear_scan() {
        let records = sample();
        let file = packet_file(&records);
        let index = PacketIndex::open(file.path()).unwrap();
        assert_eq!(index.max_flow(), Some(9));

        for flow in 0..=9 {
            let expected: Vec<PacketRecord> = records.iter().copied().filter(|r| r.flow == flow).collect();
            let found: Vec<PacketRecord> = index
                .lookup(flow)
                .unwrap()
                .iter()
                .map(PacketRecord::from_wire)
                .collect();
            assert_eq!(found, expected, "flow {flow}");
        }
        assert!(index.lookup(4).unwrap().is_empty());
    }

    #[test]
    fn test_lookup_out_of_range() {
        let file = packet_file(&sample());
        let index = PacketIndex::open(file.path()).unwrap();
        match index.lookup(10) {
            Err(Error::FlowOutOfRange { flow: 10, max: 9 }) => {}
            other => panic!("expected FlowOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_lookup_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let index = PacketIndex::open(file.path()).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.max_flow(), None);
        assert!(index.lookup(0).unwrap().is_empty());
    }

    #[test]
    fn test_unsorted_detected() {
        let mut records = sample();
        records.swap(1, 5);
        let file = packet_file(&records);
        match PacketIndex::open(file.path()) {
            Err(Error::Unsorted { position }) => assert!(position <= 5),
            other => panic!("expected Unsorted, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unsorted_beyond_checked_prefix_is_accepted() {
        let mut records: Vec<PacketRecord> = (0..1100).map(|i| packet(i, 0)).collect();
        records[1050].flow = 0;
        let file = packet_file(&records);
        assert!(PacketIndex::open(file.path()).is_ok());
    }

    #[test]
    fn test_lookup_many_reindex() {
        let file = packet_file(&sample());
        let index = PacketIndex::open(file.path()).unwrap();

        let plain: Vec<PacketRecord> = index
            .lookup_many([5, 4, 2], false)
            .collect::<Result<_>>()
            .unwrap();
        let flows: Vec<u32> = plain.iter().map(|r| r.flow).collect();
        assert_eq!(flows, vec![5, 5, 5, 2, 2, 2]);

        let reindexed: Vec<PacketRecord> = index
            .lookup_many([5, 4, 2, 5], true)
            .collect::<Result<_>>()
            .unwrap();
        let flows: Vec<u32> = reindexed.iter().map(|r| r.flow).collect();
        assert_eq!(flows, vec![0, 0, 0, 1, 1, 1, 2, 2, 2]);
        assert_eq!(reindexed[3].time, plain[3].time);
    }

    #[test]
    fn test_lookup_many_reports_out_of_range() {
        let file = packet_file(&sample());
        let index = PacketIndex::open(file.path()).unwrap();
        let results: Vec<Result<PacketRecord>> = index.lookup_many([0, 42], false).collect();
        assert!(results[0].is_ok());
        assert!(matches!(results.last(), Some(Err(Error::FlowOutOfRange { flow: 42, .. }))));
    }

    #[test]
    fn test_read_index_list() {
        let ids = read_index_list("3 1\n\t4  1\n5\n".as_bytes()).unwrap();
        assert_eq!(ids, vec![3, 1, 4, 1, 5]);
        assert!(matches!(read_index_list("3 x".as_bytes()), Err(Error::Usage(_))));
        assert!(read_index_list("".as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_flow_index_offsets() {
        use std::net::Ipv4Addr;

        let flows: Vec<FlowRecord> = (0..4u8)
            .map(|i| FlowRecord {
                protocol: 6,
                src: Ipv4Addr::new(10, 0, 0, i),
                dst: Ipv4Addr::new(10, 0, 1, i),
                src_port: 1000 + i as u16,
                dst_port: 80,
                id: i as u32,
            })
            .collect();
        let mut file = NamedTempFile::new().unwrap();
        for f in &flows {
            file.write_all(&f.encode()).unwrap();
        }
        file.flush().unwrap();

        let index = FlowIndex::open(file.path()).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.get(2).unwrap(), Some(flows[2]));
        assert_eq!(index.get(4).unwrap(), None);
        assert_eq!(index.tail(1).unwrap()[0].src(), Ipv4Addr::new(10, 0, 0, 3));
        assert_eq!(index.head(2).unwrap().len(), 2);
    }

    #[test]
    fn test_flow_lookup_uses_stored_ids() {
        use std::net::Ipv4Addr;

        let mut file = NamedTempFile::new().unwrap();
        for i in 0..3u8 {
            let flow = FlowRecord {
                protocol: 17,
                src: Ipv4Addr::new(10, 0, 0, i),
                dst: Ipv4Addr::new(10, 0, 1, 1),
                src_port: 5000 + i as u16,
                dst_port: 53,
                id: 7 + i as u32,
            };
            file.write_all(&flow.encode()).unwrap();
        }
        file.flush().unwrap();

        let index = FlowIndex::open(file.path()).unwrap();
        assert_eq!(index.first_id().unwrap(), Some(7));
        assert_eq!(index.lookup(8).unwrap().map(|f| f.src_port), Some(5001));
        assert_eq!(index.lookup(9).unwrap().map(|f| f.id), Some(9));
        assert_eq!(index.lookup(2).unwrap(), None);
        assert_eq!(index.lookup(10).unwrap(), None);
    }
}
