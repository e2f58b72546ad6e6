//! Single-pass flow extraction.
//!
//! Packets are consumed in capture order. Each one is decoded, filtered,
//! assigned to a flow through the [`FlowTable`], sized according to the
//! configured [`SizeMode`], and written as a [`PacketRecord`]. A
//! [`FlowRecord`] is written exactly once per flow, when the flow is first
//! seen, so flow records appear in index order.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::filter::CaptureFilter;
use crate::flow::{FlowKey, FlowTable};
use crate::io::PacketRef;
use crate::pcap::CaptureReader;
use crate::protocol::{decode_packet, DecodedPacket, Transport};
use crate::record::{FlowRecord, PacketRecord, RecordWriter};
use crate::stream::{TcpSegment, TcpSequencer, DEFAULT_MAX_SKIP};

const ICMP_HEADER_LEN: u16 = 8;

/// Which byte count a packet record carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SizeMode {
    /// IP total length
    #[default]
    Packet,
    /// IP total length minus the IP header
    IpPayload,
    /// Transport payload (TCP, UDP, ICMP only)
    Transport,
    /// New application bytes: transport payload, with TCP counted through the sequencer
    Application,
}

/// What to do with a packet that arrives earlier than the previous packet of its flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NegativeInterval {
    /// Drop the packet without touching flow state
    Discard,
    /// Record the negative interval as is
    #[default]
    Keep,
    /// Record its absolute value
    Absolute,
    /// Record zero
    Zero,
}

/// Extraction settings, built once and shared by reference.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub size_mode: SizeMode,
    /// Packets whose size is below this are not written (flow state still advances)
    pub min_size: u16,
    /// Inter-arrival gap, in seconds, after which a key starts a new flow
    pub max_interval: Option<f64>,
    pub first_flow_id: u32,
    pub negative_interval: NegativeInterval,
    /// TCP sequencer horizon
    pub max_skip: u32,
    pub filter: Option<CaptureFilter>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            size_mode: SizeMode::default(),
            min_size: 0,
            max_interval: None,
            first_flow_id: 0,
            negative_interval: NegativeInterval::default(),
            max_skip: DEFAULT_MAX_SKIP,
            filter: None,
        }
    }
}

impl ExtractConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(gap) = self.max_interval {
            if gap.is_nan() || gap <= 0.0 {
                return Err(Error::Usage(format!(
                    "maximum inter-arrival time must be positive, got {gap}"
                )));
            }
        }
        Ok(())
    }
}

/// Counters for one extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub packets_seen: u64,
    pub packets_written: u64,
    pub flows: u64,
    /// Frames that were not IPv4
    pub skipped_non_ip: u64,
    /// IPv4 packets whose headers could not be decoded
    pub malformed: u64,
    pub filtered: u64,
    /// Packets without a size in the selected mode (non TCP/UDP/ICMP)
    pub skipped_protocol: u64,
    pub below_min_size: u64,
    pub negative_discarded: u64,
    /// Negative intervals kept, flipped or clamped
    pub negative_adjusted: u64,
}

impl fmt::Display for ExtractStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} packets read, {} written, {} flows ({} non-IP, {} malformed, {} filtered, \
             {} without size, {} below minimum, {} out of order dropped)",
            self.packets_seen,
            self.packets_written,
            self.flows,
            self.skipped_non_ip,
            self.malformed,
            self.filtered,
            self.skipped_protocol,
            self.below_min_size,
            self.negative_discarded
        )
    }
}

/// How a packet's recorded size will be obtained.
enum SizeSource {
    Fixed(u16),
    Tcp(TcpSegment),
}

/// Streams packets into a flow file and a packet file.
pub struct Extractor<'c, F: Write, P: Write> {
    config: &'c ExtractConfig,
    table: FlowTable,
    sequencer: TcpSequencer,
    flows: RecordWriter<F, FlowRecord>,
    packets: RecordWriter<P, PacketRecord>,
    stats: ExtractStats,
}

impl<'c, F: Write, P: Write> Extractor<'c, F, P> {
    pub fn new(config: &'c ExtractConfig, flow_sink: F, packet_sink: P) -> Self {
        Extractor {
            config,
            table: FlowTable::with_max_interval(config.first_flow_id, config.max_interval),
            sequencer: TcpSequencer::new(config.max_skip),
            flows: RecordWriter::new(flow_sink),
            packets: RecordWriter::new(packet_sink),
            stats: ExtractStats::default(),
        }
    }

    pub fn stats(&self) -> &ExtractStats {
        &self.stats
    }

    /// Feed every packet of one capture.
    pub fn process_source(&mut self, reader: &mut CaptureReader) -> Result<u64> {
        let before = self.stats.packets_seen;
        reader.for_each_packet(|packet| self.process_packet(&packet))?;
        Ok(self.stats.packets_seen - before)
    }

    /// Feed one captured frame.
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

        let Some(source) = size_source(self.config.size_mode, &decoded) else {
            self.stats.skipped_protocol += 1;
            return Ok(());
        };

        self.account(decoded.flow_key(), packet, source)
    }

    fn account(&mut self, key: FlowKey, packet: &PacketRef<'_>, source: SizeSource) -> Result<()> {
        let now = packet.timestamp;
        let entry = self.table.lookup_or_create(key, now);
        if entry.is_new {
            self.flows.write(&FlowRecord::new(entry.index, &key))?;
            self.stats.flows += 1;
            debug!(flow = entry.index, %key, "new flow");
        }

        let mut interval = match entry.state.last_time {
            Some(last) => now.seconds_since(last),
            None => f64::INFINITY,
        };
        if interval < 0.0 {
            match self.config.negative_interval {
                NegativeInterval::Discard => {
                    trace!(frame = packet.frame_number, interval, "dropping out-of-order packet");
                    self.stats.negative_discarded += 1;
                    return Ok(());
                }
                NegativeInterval::Keep => {}
                NegativeInterval::Absolute => interval = -interval,
                NegativeInterval::Zero => interval = 0.0,
            }
            self.stats.negative_adjusted += 1;
        }

        let size = match source {
            SizeSource::Fixed(size) => size,
            SizeSource::Tcp(segment) => {
                let new_bytes = self.sequencer.new_data(entry.state, &segment);
                // saturate rather than wrap: a gap wider than 64 KiB is still large
                new_bytes.min(u16::MAX as u32) as u16
            }
        };
        entry.state.last_time = Some(now);

        if size < self.config.min_size {
            self.stats.below_min_size += 1;
            return Ok(());
        }

        self.packets
            .write(&PacketRecord::new(entry.index, now, size).with_interval(interval))?;
        self.stats.packets_written += 1;
        Ok(())
    }

    /// Flush both outputs and return the counters.
    pub fn finish(mut self) -> Result<ExtractStats> {
        self.flows.flush()?;
        self.packets.flush()?;
        Ok(self.stats)
    }
}

fn size_source(mode: SizeMode, packet: &DecodedPacket<'_>) -> Option<SizeSource> {
    let ip_payload = packet.ip.payload_len();
    let transport = || match packet.transport {
        Transport::Tcp(tcp) => Some(ip_payload.saturating_sub(tcp.header_len)),
        Transport::Udp(udp) => Some(udp.payload_len()),
        Transport::Icmp(_) => Some(ip_payload.saturating_sub(ICMP_HEADER_LEN)),
        Transport::Other => None,
    };

    match mode {
        SizeMode::Packet => Some(SizeSource::Fixed(packet.ip.total_len)),
        SizeMode::IpPayload => Some(SizeSource::Fixed(ip_payload)),
        SizeMode::Transport => transport().map(SizeSource::Fixed),
        SizeMode::Application => match packet.transport {
            Transport::Tcp(tcp) => Some(SizeSource::Tcp(TcpSegment {
                seq: tcp.seq,
                payload_len: ip_payload.saturating_sub(tcp.header_len) as u32,
                flags: tcp.flags,
            })),
            _ => transport().map(SizeSource::Fixed),
        },
    }
}

/// Extract every input into one flow file and one packet file.
///
/// Inputs are processed in order against a single flow table, so a flow
/// that spans several capture files keeps one index.
pub fn run_extract(
    config: &ExtractConfig,
    inputs: &[PathBuf],
    flows_path: &Path,
    packets_path: &Path,
) -> Result<ExtractStats> {
    config.validate()?;

    let flow_file = File::create(flows_path).map_err(|e| Error::file(flows_path, e))?;
    let packet_file = File::create(packets_path).map_err(|e| Error::file(packets_path, e))?;
    let mut extractor = Extractor::new(
        config,
        BufWriter::new(flow_file),
        BufWriter::new(packet_file),
    );

    for input in inputs {
        let mut reader = CaptureReader::open(input)?;
        let count = extractor.process_source(&mut reader)?;
        info!(path = %input.display(), packets = count, "processed capture");
    }

    let stats = extractor.finish()?;
    info!(
        packets = stats.packets_seen,
        written = stats.packets_written,
        flows = stats.flows,
        non_ip = stats.skipped_non_ip,
        malformed = stats.malformed,
        filtered = stats.filtered,
        below_min_size = stats.below_min_size,
        negative_discarded = stats.negative_discarded,
        "extraction finished"
    );
    Ok(stats)
}
