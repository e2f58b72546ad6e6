//! Overwrite packet sizes or inter-packet intervals in a packet file.
//!
//! Values replace fields in record order through a writable mapping. With
//! sizes every record takes one value. With intervals the first record of
//! each flow run keeps its timestamp and every later record of the run is
//! re-timed to the previous spliced time plus its value.
//!
//! The value count must match exactly; nothing is written otherwise.

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::io::{open_input, RecordMapMut};
use crate::record::{PacketRecord, Timestamp, WirePacketRecord};

/// Which field a splice replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceField {
    Size,
    Interval,
}

/// Parsed splice values.
#[derive(Debug, Clone, PartialEq)]
pub enum SpliceValues {
    Sizes(Vec<u16>),
    Intervals(Vec<f64>),
}

impl SpliceValues {
    pub fn len(&self) -> usize {
        match self {
            SpliceValues::Sizes(values) => values.len(),
            SpliceValues::Intervals(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse whitespace-separated packet sizes. Each must be in `1..=65535`.
pub fn read_size_values<R: Read>(mut reader: R) -> Result<Vec<u16>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    text.split_whitespace()
        .map(|token| match token.parse::<i64>() {
            Ok(size) if (1..=i64::from(u16::MAX)).contains(&size) => Ok(size as u16),
            _ => Err(Error::Usage(format!("invalid packet size {token:?}"))),
        })
        .collect()
}

/// Parse whitespace-separated intervals in seconds. Each must be finite.
pub fn read_interval_values<R: Read>(mut reader: R) -> Result<Vec<f64>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    text.split_whitespace()
        .map(|token| match token.parse::<f64>() {
            Ok(interval) if interval.is_finite() => Ok(interval),
            _ => Err(Error::Usage(format!("invalid interval {token:?}"))),
        })
        .collect()
}

/// Read values for `field` from each path in turn (`-` is stdin).
pub fn read_splice_values(field: SpliceField, paths: &[PathBuf]) -> Result<SpliceValues> {
    match field {
        SpliceField::Size => {
            let mut values = Vec::new();
            for path in paths {
                values.extend(read_size_values(open_input(path)?)?);
            }
            Ok(SpliceValues::Sizes(values))
        }
        SpliceField::Interval => {
            let mut values = Vec::new();
            for path in paths {
                values.extend(read_interval_values(open_input(path)?)?);
            }
            Ok(SpliceValues::Intervals(values))
        }
    }
}

/// Replace the size of every record, in order.
pub fn splice_sizes(records: &mut [WirePacketRecord], sizes: &[u16]) -> Result<()> {
    if sizes.len() != records.len() {
        return Err(Error::SpliceCount {
            needed: records.len(),
            given: sizes.len(),
        });
    }
    for (record, &size) in records.iter_mut().zip(sizes) {
        record.set_size(size);
    }
    Ok(())
}

/// Number of records an interval splice re-times: all but each run head.
pub fn interval_slots(records: &[WirePacketRecord]) -> usize {
    records
        .iter()
        .enumerate()
        .filter(|(i, r)| *i > 0 && records[i - 1].flow() == r.flow())
        .count()
}

/// Re-time every non-head record from the running time of its flow run.
///
/// The interval field of a re-timed record is set to its value, so the
/// record stays consistent with its new timestamp.
pub fn splice_intervals(records: &mut [WirePacketRecord], intervals: &[f64]) -> Result<()> {
    let needed = interval_slots(records);
    if intervals.len() != needed {
        return Err(Error::SpliceCount {
            needed,
            given: intervals.len(),
        });
    }

    // All times are computed before any record changes.
    let mut times = Vec::with_capacity(needed);
    let mut values = intervals.iter();
    let mut time = 0.0;
    let mut flow = None;
    for (position, record) in records.iter().enumerate() {
        if flow != Some(record.flow()) {
            flow = Some(record.flow());
            time = record.time().as_secs_f64();
            continue;
        }
        let Some(&interval) = values.next() else {
            break;
        };
        time += interval;
        times.push((position, spliced_timestamp(time, position)?, interval));
    }

    for (position, timestamp, interval) in times {
        let record = &mut records[position];
        record.set_time(timestamp);
        record.set_interval(interval);
    }
    Ok(())
}

fn spliced_timestamp(time: f64, position: usize) -> Result<Timestamp> {
    let sec = time.floor();
    if !(0.0..=f64::from(u32::MAX)).contains(&sec) {
        return Err(Error::Usage(format!(
            "spliced time {time} for record {position} is outside the timestamp range"
        )));
    }
    let usec = ((time - sec) * 1e6).round();
    Ok(Timestamp::normalized(sec as u32, usec as u32))
}

/// Splice `values` into the packet file at `path` in place and return the
/// number of records changed.
pub fn splice_file(path: &Path, values: &SpliceValues) -> Result<u64> {
    let mut map = RecordMapMut::<PacketRecord>::open(path)?;
    let records = map.records_mut()?;
    match values {
        SpliceValues::Sizes(sizes) => splice_sizes(records, sizes)?,
        SpliceValues::Intervals(intervals) => splice_intervals(records, intervals)?,
    }
    map.flush()?;

    let changed = values.len() as u64;
    info!(path = %path.display(), records = changed, "spliced");
    Ok(changed)
}
