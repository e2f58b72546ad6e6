//! Error types for pcapflow-core.
//!
//! - [`enum@Error`] - Main error enum returned by every fallible operation
//! - [`PcapError`] - Errors from capture file reading
//! - [`ProtocolError`] - Errors from header decoding
//!
//! Tolerated data anomalies (negative intervals, stale TCP segments, packets
//! below the size threshold) are never reported through these types.

use std::path::PathBuf;

use thiserror::Error;

use crate::filter::FilterError;
use crate::record::RecordKind;

/// Main error type for pcapflow-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading or parsing a capture file
    #[error("PCAP error: {0}")]
    Pcap(#[from] PcapError),

    /// Error decoding a packet header
    #[error("Protocol parse error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid capture filter expression
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// A record stream ended in the middle of a record.
    #[error("Truncated {kind} record: expected {expected} bytes, got {actual}")]
    TruncatedRecord {
        kind: RecordKind,
        expected: usize,
        actual: usize,
    },

    /// A record file is not a whole number of records, or is otherwise damaged.
    #[error("Corrupt record file {}: {reason}", .path.display())]
    Corruption { path: PathBuf, reason: String },

    /// A packet file expected to be flow-sorted is not.
    #[error("Packet file is not sorted by flow (record {position} precedes a smaller flow id)")]
    Unsorted { position: usize },

    /// A flow lookup beyond the largest flow present in the file.
    #[error("Flow {flow} is out of range (largest flow in file is {max})")]
    FlowOutOfRange { flow: u32, max: u32 },

    /// The number of splice values does not match the records they replace.
    #[error(
        "Too {} splice values: {needed} needed, {given} given",
        if .given > .needed { "many" } else { "few" }
    )]
    SpliceCount { needed: usize, given: usize },

    /// Conflicting or invalid options detected below the argument parser.
    #[error("Usage error: {0}")]
    Usage(String),

    /// I/O error on a named file
    #[error("{}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Attach a path to an I/O error.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::File {
            path: path.into(),
            source,
        }
    }

    /// Build a corruption error for `path`.
    pub fn corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Corruption {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors related to capture file reading.
#[derive(Error, Debug)]
pub enum PcapError {
    /// Invalid PCAP format
    #[error("Invalid PCAP format: {reason}")]
    InvalidFormat { reason: String },

    /// Unsupported link type
    #[error("Unsupported link type: {link_type}")]
    UnsupportedLinkType { link_type: u32 },
}

/// Errors related to header decoding.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Packet too short for protocol header
    #[error("{protocol}: packet too short (need {needed} bytes, have {have})")]
    PacketTooShort {
        protocol: &'static str,
        needed: usize,
        have: usize,
    },

    /// Header rejected by the decoder
    #[error("{protocol}: {reason}")]
    Malformed {
        protocol: &'static str,
        reason: String,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
