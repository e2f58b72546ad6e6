//! Demultiplex captures into one pcap file per flow.
//!
//! Every flow key gets its own legacy pcap file under the output directory:
//!
//! ```text
//! <dir>/<src>/<dst>/<proto>_<sport>_<dport>
//! ```
//!
//! Protocols without ports use `0` for both. Open files are tracked in a
//! [`BoundedFlowTable`]; when it is full a random subset of files is closed.
//! A flow whose file was closed reopens it in append mode, so eviction
//! fragments handles but never the files themselves.

use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::filter::CaptureFilter;
use crate::flow::{BoundedFlowTable, FlowKey};
use crate::io::PacketRef;
use crate::pcap::{CaptureReader, PcapWriter};
use crate::protocol::decode_packet;

/// Snap length written into the header of every per-flow file.
pub const SPLIT_SNAPLEN: u32 = 65535;

/// Splitter settings.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Root of the output tree
    pub dir: PathBuf,
    /// Most per-flow files held open at once
    pub max_open: usize,
    /// Chance that each open file is closed when the limit is reached
    pub cleanup_factor: f64,
    /// Turn the dotted address octets into directory levels too
    pub split_ips: bool,
    pub filter: Option<CaptureFilter>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        SplitConfig {
            dir: PathBuf::from("flows"),
            max_open: 1000,
            cleanup_factor: 1.0,
            split_ips: false,
            filter: None,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_open == 0 {
            return Err(Error::Usage("maximum open files must be at least 1".into()));
        }
        if self.cleanup_factor.is_nan() || self.cleanup_factor <= 0.0 {
            return Err(Error::Usage(format!(
                "cleanup factor must be positive, got {}",
                self.cleanup_factor
            )));
        }
        Ok(())
    }

    /// Output file of `key` under `dir`.
    pub fn flow_path(&self, key: &FlowKey) -> PathBuf {
        let relative = format!(
            "{}/{}/{}_{}_{}",
            key.src, key.dst, key.protocol, key.src_sel, key.dst_sel
        );
        if self.split_ips {
            self.dir.join(relative.replace('.', "/"))
        } else {
            self.dir.join(relative)
        }
    }
}

/// Counters reported by a split run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitStats {
    pub packets_seen: u64,
    pub packets_written: u64,
    pub flows: u64,
    /// Times a file was opened, including reopens after eviction
    pub files_opened: u64,
    pub files_closed: u64,
    pub evictions: u64,
    pub skipped_non_ip: u64,
    pub malformed: u64,
    pub filtered: u64,
}

impl fmt::Display for SplitStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "packets seen:     {}", self.packets_seen)?;
        writeln!(f, "packets written:  {}", self.packets_written)?;
        writeln!(f, "flows:            {}", self.flows)?;
        writeln!(f, "files opened:     {}", self.files_opened)?;
        writeln!(f, "eviction rounds:  {}", self.evictions)?;
        writeln!(f, "non-IP skipped:   {}", self.skipped_non_ip)?;
        writeln!(f, "malformed:        {}", self.malformed)?;
        write!(f, "filtered:         {}", self.filtered)
    }
}

struct FlowFile {
    path: PathBuf,
    writer: PcapWriter<BufWriter<File>>,
}

impl FlowFile {
    fn open(path: PathBuf, link_type: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::file(parent, e))?;
        }
        let writer = PcapWriter::append(&path, link_type, SPLIT_SNAPLEN)?;
        Ok(FlowFile { path, writer })
    }

    fn close(self) -> Result<()> {
        self.writer
            .into_inner()
            .map(drop)
            .map_err(|e| match e {
                Error::Io(source) => Error::file(&self.path, source),
                other => other,
            })
    }
}

/// Streams packets into per-flow files.
pub struct Splitter<'c> {
    config: &'c SplitConfig,
    table: BoundedFlowTable<FlowFile>,
    rng: StdRng,
    stats: SplitStats,
}

impl<'c> Splitter<'c> {
    pub fn new(config: &'c SplitConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Use a fixed random source for eviction.
    pub fn with_rng(config: &'c SplitConfig, rng: StdRng) -> Self {
        Splitter {
            config,
            table: BoundedFlowTable::new(0, config.max_open),
            rng,
            stats: SplitStats::default(),
        }
    }

    pub fn stats(&self) -> &SplitStats {
        &self.stats
    }

    /// Number of per-flow files currently open.
    pub fn open_files(&self) -> usize {
        self.table.len()
    }

    pub fn process_source(&mut self, reader: &mut CaptureReader) -> Result<u64> {
        let mut count = 0u64;
        reader.for_each_packet(|packet| {
            count += 1;
            self.process_packet(&packet)
        })?;
        Ok(count)
    }

    pub fn process_packet(&mut self, packet: &PacketRef<'_>) -> Result<()> {
        self.stats.packets_seen += 1;

        let decoded = match decode_packet(packet) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => {
                self.stats.skipped_non_ip += 1;
                return Ok(());
            }
            Err(Error::Protocol(e)) => {
                trace!(frame = packet.frame_number, error = %e, "skipping undecodable packet");
                self.stats.malformed += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if let Some(filter) = &self.config.filter {
            if !filter.matches(&decoded) {
                self.stats.filtered += 1;
                return Ok(());
            }
        }

        let (src_sel, dst_sel) = decoded.transport.ports().unwrap_or((0, 0));
        let key = FlowKey {
            protocol: decoded.protocol(),
            src: decoded.ip.src,
            dst: decoded.ip.dst,
            src_sel,
            dst_sel,
        };

        if let Some(entry) = self.table.get_mut(&key) {
            entry.state.last_time = Some(packet.timestamp);
            entry
                .resource
                .writer
                .write_packet(packet.timestamp, packet.data, packet.original_len)?;
            self.stats.packets_written += 1;
            return Ok(());
        }

        while self.table.is_full() {
            self.evict()?;
        }

        let path = self.config.flow_path(&key);
        let fresh = !path.exists();
        let file = FlowFile::open(path, packet.link_type)?;
        self.stats.files_opened += 1;
        if fresh {
            self.stats.flows += 1;
            debug!(%key, path = %file.path.display(), "new flow file");
        }

        let entry = self.table.insert(key, packet.timestamp, file);
        entry
            .resource
            .writer
            .write_packet(packet.timestamp, packet.data, packet.original_len)?;
        self.stats.packets_written += 1;
        Ok(())
    }

    fn evict(&mut self) -> Result<()> {
        let closed = self
            .table
            .evict_some(self.config.cleanup_factor, &mut self.rng);
        self.stats.evictions += 1;
        debug!(closed = closed.len(), open = self.table.len(), "evicting flow files");
        for (_, file) in closed {
            file.close()?;
            self.stats.files_closed += 1;
        }
        Ok(())
    }

    /// Close every open file and return the final counters.
    pub fn finish(mut self) -> Result<SplitStats> {
        for (_, file) in self.table.drain() {
            file.close()?;
            self.stats.files_closed += 1;
        }
        Ok(self.stats)
    }
}

/// Split every input capture into per-flow files under `config.dir`.
pub fn run_split(config: &SplitConfig, inputs: &[PathBuf]) -> Result<SplitStats> {
    config.validate()?;
    fs::create_dir_all(&config.dir).map_err(|e| Error::file(&config.dir, e))?;

    let mut splitter = Splitter::new(config);
    for input in inputs {
        let mut reader = CaptureReader::open(input)?;
        let count = splitter.process_source(&mut reader)?;
        info!(path = %input.display(), packets = count, open = splitter.open_files(), "split capture");
    }

    let stats = splitter.finish()?;
    info!(
        packets = stats.packets_written,
        flows = stats.flows,
        reopened = stats.files_opened - stats.flows,
        "split finished"
    );
    Ok(stats)
}
