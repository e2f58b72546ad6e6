//! New-data accounting for TCP segments.

use super::TcpFlags;
use crate::flow::FlowState;

/// Largest forward sequence gap (beyond the segment's own length) treated as
/// ordinary loss or reordering.
pub const DEFAULT_MAX_SKIP: u32 = (1 << 16) - 1;

/// The parts of a TCP segment the sequencer looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegment {
    pub seq: u32,
    pub payload_len: u32,
    pub flags: TcpFlags,
}

impl TcpSegment {
    /// Sequence number of the segment's last byte.
    pub fn last_byte(&self) -> u32 {
        let end = self.seq.wrapping_add(self.payload_len);
        if self.flags.consumes_sequence() {
            end
        } else {
            end.wrapping_sub(1)
        }
    }
}

/// Converts raw sequence numbers into counts of new application bytes.
///
/// All arithmetic is modulo 2^32. The sequencer reads and advances
/// `FlowState::last_seqno` and only reads `last_time` (to recognise a flow's
/// first segment); the caller stamps `last_time` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSequencer {
    max_skip: u32,
}

impl Default for TcpSequencer {
    fn default() -> Self {
        TcpSequencer::new(DEFAULT_MAX_SKIP)
    }
}

impl TcpSequencer {
    pub fn new(max_skip: u32) -> Self {
        TcpSequencer { max_skip }
    }

    pub fn max_skip(&self) -> u32 {
        self.max_skip
    }

    /// Number of bytes in `segment` not already accounted for on this flow.
    pub fn new_data(&self, state: &mut FlowState, segment: &TcpSegment) -> u32 {
        let last_byte = segment.last_byte();
        let horizon = segment.payload_len.saturating_add(self.max_skip);

        if state.last_time.is_none() {
            state.last_seqno = last_byte;
            return segment.payload_len;
        }

        let forward = last_byte.wrapping_sub(state.last_seqno);
        if forward <= horizon {
            state.last_seqno = last_byte;
            return forward;
        }

        // Ends at or before data already counted: a retransmission.
        let behind = state.last_seqno.wrapping_sub(last_byte);
        if behind <= self.max_skip {
            return 0;
        }

        let wrapped = wraparound_heuristic(last_byte, state.last_seqno);
        if wrapped <= horizon {
            state.last_seqno = last_byte;
            return wrapped;
        }

        0
    }
}

/// `last_byte + |last_seqno|`, reading `last_seqno` as a signed 32-bit value.
///
/// This is the historical wraparound test, kept bit-for-bit. It only decides
/// segments that are neither a plausible forward step nor a recent
/// retransmission, and its answer there is questionable: see the tests.
pub fn wraparound_heuristic(last_byte: u32, last_seqno: u32) -> u32 {
    last_byte.wrapping_add((last_seqno as i32).unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Timestamp;

    fn data(seq: u32, len: u32) -> TcpSegment {
        TcpSegment {
            seq,
            payload_len: len,
            flags: TcpFlags {
                ack: true,
                ..TcpFlags::default()
            },
        }
    }

    /// Run segments through one flow, stamping `last_time` like the pipeline does.
    fn run(segments: &[TcpSegment]) -> Vec<u32> {
        let sequencer = TcpSequencer::default();
        let mut state = FlowState::new(0);
        segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                let size = sequencer.new_data(&mut state, segment);
                state.last_time = Some(Timestamp { sec: i as u32, usec: 0 });
                size
            })
            .collect()
    }

    #[test]
    fn test_retransmission_counts_zero() {
        assert_eq!(run(&[data(100, 50), data(150, 50), data(100, 50)]), vec![50, 50, 0]);
    }

    #[test]
    fn test_in_order_segments_sum_to_payload() {
        let mut segments = Vec::new();
        let mut seq = 7_000;
        let mut total = 0;
        for len in [1460, 1460, 512, 0, 1, 1460, 88] {
            segments.push(data(seq, len));
            seq += len;
            total += len;
        }
        assert_eq!(run(&segments).iter().sum::<u32>(), total);
    }

    #[test]
    fn test_sequence_wrap_is_forward() {
        let start = u32::MAX - 99;
        let sizes = run(&[data(start, 100), data(start.wrapping_add(100), 100)]);
        assert_eq!(sizes, vec![100, 100]);
    }

    #[test]
    fn test_syn_consumes_one_sequence_number() {
        let syn = TcpSegment {
            seq: 999,
            payload_len: 0,
            flags: TcpFlags {
                syn: true,
                ..TcpFlags::default()
            },
        };
        assert_eq!(syn.last_byte(), 999);
        assert_eq!(run(&[syn, data(1000, 100), data(1100, 20)]), vec![0, 100, 20]);
    }

    #[test]
    fn test_pure_ack_carries_no_data() {
        assert_eq!(run(&[data(500, 100), data(600, 0)]), vec![100, 0]);
    }

    #[test]
    fn test_gap_within_horizon_counts_skipped_bytes() {
        // 1000 bytes were lost; the next segment reports them as well.
        assert_eq!(run(&[data(0, 100), data(1100, 100)]), vec![100, 1100]);
    }

    #[test]
    fn test_far_out_of_order_counts_zero() {
        let sizes = run(&[data(1_000_000, 100), data(5_000_000, 100)]);
        assert_eq!(sizes, vec![100, 0]);
    }

    #[test]
    fn test_stale_segment_leaves_state() {
        let sequencer = TcpSequencer::default();
        let mut state = FlowState::new(0);
        sequencer.new_data(&mut state, &data(100, 50));
        state.last_time = Some(Timestamp::default());
        sequencer.new_data(&mut state, &data(150, 50));
        assert_eq!(state.last_seqno, 199);
        assert_eq!(sequencer.new_data(&mut state, &data(100, 50)), 0);
        assert_eq!(state.last_seqno, 199);
    }

    // The wraparound branch is kept exactly as it has always behaved. These
    // tests pin that behavior down; they do not claim it is right.

    #[test]
    fn test_wraparound_heuristic_formula() {
        assert_eq!(wraparound_heuristic(149, 199), 348);
        assert_eq!(wraparound_heuristic(10, u32::MAX), 11);
        assert_eq!(wraparound_heuristic(10, 0x8000_0000), 10u32.wrapping_add(0x8000_0000));
    }

    #[test]
    fn test_wraparound_heuristic_branch_fires() {
        let sequencer = TcpSequencer::default();
        let mut state = FlowState::new(0);
        state.last_time = Some(Timestamp::default());
        state.last_seqno = 65_700;

        // Last byte lands on 100: neither forward nor a recent retransmission.
        let segment = data(100u32.wrapping_sub(999), 1000);
        assert_eq!(segment.last_byte(), 100);
        assert_eq!(sequencer.new_data(&mut state, &segment), 65_800);
        assert_eq!(state.last_seqno, 100);
    }
}
