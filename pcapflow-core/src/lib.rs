//! # pcapflow-core
//!
//! Flow-indexed binary records from packet captures.
//!
//! Captures (pcap or pcapng, optionally gzip/bzip2 compressed) are scanned
//! once in arrival order. Every IPv4 packet is assigned to a flow, sized,
//! and written as a fixed 22-byte packet record; every flow is written once
//! as a 17-byte flow record. The packet file can then be sorted in place
//! through a memory mapping and queried by flow id with a binary search.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::{Path, PathBuf};
//!
//! use pcapflow_core::prelude::*;
//!
//! let config = ExtractConfig {
//!     size_mode: SizeMode::Application,
//!     ..ExtractConfig::default()
//! };
//! let inputs = [PathBuf::from("capture.pcap.gz")];
//! run_extract(&config, &inputs, Path::new("flows.bin"), Path::new("packets.bin"))?;
//!
//! sort_file(Path::new("packets.bin"), &SortOrder::default())?;
//!
//! let index = PacketIndex::open("packets.bin")?;
//! for record in index.lookup(0)? {
//!     println!("{} {}", record.time(), record.size());
//! }
//! # Ok::<(), pcapflow_core::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        pcapflow-core                                |
//! +---------------------------------------------------------------------+
//! |  record/   - FlowRecord, PacketRecord, on-disk layouts, streams     |
//! |  flow/     - FlowTable, BoundedFlowTable                            |
//! |  stream/   - TCP sequencer (new application bytes per segment)      |
//! |  io/       - input opening, decompression, pcap streaming, mmap     |
//! |  pcap/     - CaptureReader, PcapWriter                              |
//! |  protocol/ - link, IPv4 and transport header decoding               |
//! |  filter/   - tcpdump-style capture filters                          |
//! |  extract/  - the single-pass extraction pipeline                    |
//! |  sort/     - in-place smoothsort over mapped packet files           |
//! |  index/    - flow lookups, head/tail, renumbering                   |
//! |  splice/   - overwrite packet sizes or intervals in place           |
//! |  split/    - one pcap file per flow                                 |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Crate Features
//!
//! - `default` - Gzip and Bzip2 decompression enabled
//! - `compress-gzip` - Gzip decompression support
//! - `compress-bzip2` - Bzip2 decompression support

pub mod error;
pub mod extract;
pub mod filter;
pub mod flow;
pub mod index;
pub mod io;
pub mod pcap;
pub mod prelude;
pub mod protocol;
pub mod record;
pub mod sort;
pub mod splice;
pub mod split;
pub mod stream;

// Re-export commonly used types at crate root for convenience
pub use error::{Error, PcapError, ProtocolError, Result};
pub use extract::{run_extract, ExtractConfig, ExtractStats, Extractor, NegativeInterval, SizeMode};
pub use filter::{CaptureFilter, FilterError};
pub use flow::{BoundedFlowTable, FlowEntry, FlowKey, FlowState, FlowTable};
pub use index::{read_index_list, renumber_file, renumber_files, FlowIndex, PacketIndex};
pub use io::{open_input, Compression, PacketRef, RecordMap, RecordMapMut};
pub use pcap::{CaptureReader, PcapWriter};
pub use record::{
    FlowRecord, PacketRecord, Record, RecordKind, RecordReader, RecordWriter, Timestamp,
    WireFlowRecord, WirePacketRecord, FLOW_RECORD_SIZE, PACKET_RECORD_SIZE,
};
pub use sort::{is_sorted, smoothsort, sort_file, sort_files, SortDirection, SortKey, SortOrder};
pub use splice::{read_splice_values, splice_file, SpliceField, SpliceValues};
pub use split::{run_split, SplitConfig, SplitStats, Splitter};
pub use stream::{TcpFlags, TcpSegment, TcpSequencer};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
