//! Capture file reading and writing.
//!
//! - [`CaptureReader`] - path-based reader with decompression and format detection
//! - [`PcapWriter`] - classic pcap writer used by the flow splitter

mod reader;
mod writer;

pub use reader::CaptureReader;
pub use writer::PcapWriter;
