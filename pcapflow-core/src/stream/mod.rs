//! TCP stream accounting.
//!
//! Payload bytes are never reassembled. The only per-stream question answered
//! here is how many genuinely new application bytes each segment carries, so
//! retransmissions and reordered segments are not counted twice.

mod sequencer;

pub use sequencer::{wraparound_heuristic, TcpSegment, TcpSequencer, DEFAULT_MAX_SKIP};

/// TCP control flags relevant to sequence accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

impl TcpFlags {
    /// SYN, FIN and RST segments count their last byte at `seq + len`
    /// instead of `seq + len - 1`.
    pub fn consumes_sequence(&self) -> bool {
        self.syn || self.fin || self.rst
    }
}
