//! Fixed-layout binary records.
//!
//! Two record kinds are persisted, both as flat, headerless arrays with every
//! multi-byte field in network byte order:
//!
//! ```text
//! flow record (17 bytes)
//! +-------+---------+---------+----------+----------+---------+
//! | proto | src ip  | dst ip  | src port | dst port | flow id |
//! |  u8   | 4 bytes | 4 bytes |   u16    |   u16    |   u32   |
//! +-------+---------+---------+----------+----------+---------+
//!
//! packet record (22 bytes)
//! +------+-----+------+------+----------+
//! | flow | sec | usec | size | interval |
//! | u32  | u32 | u32  | u16  |   f64    |
//! +------+-----+------+------+----------+
//! ```
//!
//! A flow's identity is its ordinal position in the flow file. The trailing
//! `flow id` repeats it (offset by the extraction base). The packet
//! `interval` is the gap since the previous packet of the same flow, in
//! seconds, and is `+inf` for a flow's first packet.
//!
//! The `Wire*` structs are the on-disk layout itself and are used directly
//! as typed views over memory-mapped files. Accessors convert to host order.

mod stream;

use std::cmp::Ordering;
use std::fmt;
use std::net::Ipv4Addr;

use zerocopy::byteorder::big_endian::{F64, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Error, Result};
use crate::flow::FlowKey;

pub use stream::{RecordReader, RecordWriter};

/// Size of an encoded flow record.
pub const FLOW_RECORD_SIZE: usize = 17;

/// Size of an encoded packet record.
pub const PACKET_RECORD_SIZE: usize = 22;

const _: () = assert!(std::mem::size_of::<WireFlowRecord>() == FLOW_RECORD_SIZE);
const _: () = assert!(std::mem::size_of::<WirePacketRecord>() == PACKET_RECORD_SIZE);

const MICROS_PER_SEC: u64 = 1_000_000;

/// Which of the two record files a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Flow,
    Packet,
}

impl RecordKind {
    /// Encoded size of one record of this kind.
    pub fn size(self) -> usize {
        match self {
            RecordKind::Flow => FLOW_RECORD_SIZE,
            RecordKind::Packet => PACKET_RECORD_SIZE,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Flow => write!(f, "flow"),
            RecordKind::Packet => write!(f, "packet"),
        }
    }
}

/// Capture timestamp with the microsecond part always below one second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub sec: u32,
    pub usec: u32,
}

impl Timestamp {
    /// Build a timestamp, carrying whole seconds out of `usec`.
    pub fn normalized(sec: u32, usec: u32) -> Self {
        let carry = usec / MICROS_PER_SEC as u32;
        Timestamp {
            sec: sec.wrapping_add(carry),
            usec: usec % MICROS_PER_SEC as u32,
        }
    }

    /// Build a timestamp from microseconds since the epoch.
    pub fn from_micros(micros: u64) -> Self {
        Timestamp {
            sec: (micros / MICROS_PER_SEC) as u32,
            usec: (micros % MICROS_PER_SEC) as u32,
        }
    }

    /// Build a timestamp from a seconds/nanoseconds pair, truncating to microseconds.
    pub fn from_nanos(sec: u32, nsec: u32) -> Self {
        Timestamp::normalized(sec, nsec / 1_000)
    }

    /// Seconds since the epoch as a float.
    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.usec as f64 * 1e-6
    }

    /// Signed gap from `earlier` to `self`, in seconds.
    pub fn seconds_since(&self, earlier: Timestamp) -> f64 {
        let secs = self.sec as f64 - earlier.sec as f64;
        let usecs = self.usec as f64 - earlier.usec as f64;
        secs + usecs * 1e-6
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.sec, self.usec)
    }
}

/// A type with a fixed on-disk layout.
pub trait Record: Sized {
    /// Exact byte layout of the record.
    type Wire: FromBytes + IntoBytes + KnownLayout + Immutable + Unaligned + Copy;

    const KIND: RecordKind;
    const SIZE: usize = std::mem::size_of::<Self::Wire>();

    fn to_wire(&self) -> Self::Wire;
    fn from_wire(wire: &Self::Wire) -> Self;
}

/// Decode one record from the front of `bytes`.
///
/// Fewer than `T::SIZE` bytes is a [`Error::TruncatedRecord`].
pub fn decode_record<T: Record>(bytes: &[u8]) -> Result<T> {
    let truncated = || Error::TruncatedRecord {
        kind: T::KIND,
        expected: T::SIZE,
        actual: bytes.len(),
    };
    let head = bytes.get(..T::SIZE).ok_or_else(truncated)?;
    let wire = T::Wire::read_from_bytes(head).map_err(|_| truncated())?;
    Ok(T::from_wire(&wire))
}

/// One flow identity as persisted in the flow file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowRecord {
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub id: u32,
}

impl FlowRecord {
    pub fn new(id: u32, key: &FlowKey) -> Self {
        FlowRecord {
            protocol: key.protocol,
            src: key.src,
            dst: key.dst,
            src_port: key.src_sel,
            dst_port: key.dst_sel,
            id,
        }
    }

    /// The flow key this record was written for.
    pub fn key(&self) -> FlowKey {
        FlowKey {
            protocol: self.protocol,
            src: self.src,
            dst: self.dst,
            src_sel: self.src_port,
            dst_sel: self.dst_port,
        }
    }

    pub fn encode(&self) -> [u8; FLOW_RECORD_SIZE] {
        let mut out = [0u8; FLOW_RECORD_SIZE];
        out.copy_from_slice(self.to_wire().as_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_record(bytes)
    }
}

/// One accepted packet as persisted in the packet file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketRecord {
    pub flow: u32,
    pub time: Timestamp,
    pub size: u16,
    /// Seconds since the previous packet of the same flow.
    pub interval: f64,
}

impl PacketRecord {
    pub fn new(flow: u32, time: Timestamp, size: u16) -> Self {
        PacketRecord {
            flow,
            time,
            size,
            interval: f64::INFINITY,
        }
    }

    pub fn with_interval(mut self, interval: f64) -> Self {
        self.interval = interval;
        self
    }

    pub fn encode(&self) -> [u8; PACKET_RECORD_SIZE] {
        let mut out = [0u8; PACKET_RECORD_SIZE];
        out.copy_from_slice(self.to_wire().as_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_record(bytes)
    }
}

pub fn encode_flow(record: &FlowRecord) -> [u8; FLOW_RECORD_SIZE] {
    record.encode()
}

pub fn decode_flow(bytes: &[u8]) -> Result<FlowRecord> {
    FlowRecord::decode(bytes)
}

pub fn encode_packet(record: &PacketRecord) -> [u8; PACKET_RECORD_SIZE] {
    record.encode()
}

pub fn decode_packet(bytes: &[u8]) -> Result<PacketRecord> {
    PacketRecord::decode(bytes)
}

/// On-disk flow record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct WireFlowRecord {
    protocol: u8,
    src: [u8; 4],
    dst: [u8; 4],
    src_port: U16,
    dst_port: U16,
    id: U32,
}

impl WireFlowRecord {
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src)
    }

    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst)
    }

    pub fn src_port(&self) -> u16 {
        self.src_port.get()
    }

    pub fn dst_port(&self) -> u16 {
        self.dst_port.get()
    }

    pub fn id(&self) -> u32 {
        self.id.get()
    }
}

impl Record for FlowRecord {
    type Wire = WireFlowRecord;
    const KIND: RecordKind = RecordKind::Flow;

    fn to_wire(&self) -> WireFlowRecord {
        WireFlowRecord {
            protocol: self.protocol,
            src: self.src.octets(),
            dst: self.dst.octets(),
            src_port: U16::new(self.src_port),
            dst_port: U16::new(self.dst_port),
            id: U32::new(self.id),
        }
    }

    fn from_wire(wire: &WireFlowRecord) -> Self {
        FlowRecord {
            protocol: wire.protocol(),
            src: wire.src(),
            dst: wire.dst(),
            src_port: wire.src_port(),
            dst_port: wire.dst_port(),
            id: wire.id(),
        }
    }
}

/// On-disk packet record.
///
/// This is the element type of the sorter's and indexer's mapped views, so
/// the accessors are on the hot path of every comparison.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct WirePacketRecord {
    flow: U32,
    sec: U32,
    usec: U32,
    size: U16,
    interval: F64,
}

impl WirePacketRecord {
    #[inline]
    pub fn flow(&self) -> u32 {
        self.flow.get()
    }

    #[inline]
    pub fn set_flow(&mut self, flow: u32) {
        self.flow.set(flow);
    }

    #[inline]
    pub fn time(&self) -> Timestamp {
        Timestamp {
            sec: self.sec.get(),
            usec: self.usec.get(),
        }
    }

    pub fn set_time(&mut self, time: Timestamp) {
        self.sec.set(time.sec);
        self.usec.set(time.usec);
    }

    #[inline]
    pub fn size(&self) -> u16 {
        self.size.get()
    }

    pub fn set_size(&mut self, size: u16) {
        self.size.set(size);
    }

    pub fn interval(&self) -> f64 {
        self.interval.get()
    }

    pub fn set_interval(&mut self, interval: f64) {
        self.interval.set(interval);
    }

    /// Byte-wise comparison of the whole record.
    ///
    /// Total over all 22 bytes, so it serves as the last tie-breaker of every
    /// sort order. For the integer fields it agrees with numeric order.
    #[inline]
    pub fn cmp_bytes(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Record for PacketRecord {
    type Wire = WirePacketRecord;
    const KIND: RecordKind = RecordKind::Packet;

    fn to_wire(&self) -> WirePacketRecord {
        WirePacketRecord {
            flow: U32::new(self.flow),
            sec: U32::new(self.time.sec),
            usec: U32::new(self.time.usec),
            size: U16::new(self.size),
            interval: F64::new(self.interval),
        }
    }

    fn from_wire(wire: &WirePacketRecord) -> Self {
        PacketRecord {
            flow: wire.flow(),
            time: wire.time(),
            size: wire.size(),
            interval: wire.interval(),
        }
    }
}

impl From<&WirePacketRecord> for PacketRecord {
    fn from(wire: &WirePacketRecord) -> Self {
        PacketRecord::from_wire(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_flow() -> FlowRecord {
        FlowRecord {
            protocol: 6,
            src: Ipv4Addr::new(10, 0, 0, 1),
            dst: Ipv4Addr::new(192, 168, 1, 20),
            src_port: 54321,
            dst_port: 443,
            id: 7,
        }
    }

    #[test]
    fn test_flow_record_layout() {
        let bytes = sample_flow().encode();
        assert_eq!(bytes[0], 6);
        assert_eq!(&bytes[1..5], &[10, 0, 0, 1]);
        assert_eq!(&bytes[5..9], &[192, 168, 1, 20]);
        assert_eq!(&bytes[9..11], &54321u16.to_be_bytes());
        assert_eq!(&bytes[11..13], &443u16.to_be_bytes());
        assert_eq!(&bytes[13..17], &7u32.to_be_bytes());
    }

    #[test]
    fn test_packet_record_layout() {
        let record = PacketRecord::new(0x01020304, Timestamp::normalized(1_000_000_000, 250_000), 1500)
            .with_interval(0.5);
        let bytes = record.encode();
        assert_eq!(&bytes[0..4], &[1, 2, 3, 4]);
        assert_eq!(&bytes[4..8], &1_000_000_000u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &250_000u32.to_be_bytes());
        assert_eq!(&bytes[12..14], &1500u16.to_be_bytes());
        assert_eq!(&bytes[14..22], &0.5f64.to_be_bytes());
    }

    #[test]
    fn test_round_trip() {
        let flow = sample_flow();
        assert_eq!(decode_flow(&encode_flow(&flow)).unwrap(), flow);

        let packet = PacketRecord::new(3, Timestamp { sec: 12, usec: 999_999 }, 40);
        let decoded = decode_packet(&encode_packet(&packet)).unwrap();
        assert_eq!(decoded, packet);
        assert!(decoded.interval.is_infinite());
    }

    #[test]
    fn test_decode_short_input() {
        let bytes = sample_flow().encode();
        match decode_flow(&bytes[..10]) {
            Err(Error::TruncatedRecord {
                kind,
                expected,
                actual,
            }) => {
                assert_eq!(kind, RecordKind::Flow);
                assert_eq!(expected, FLOW_RECORD_SIZE);
                assert_eq!(actual, 10);
            }
            other => panic!("expected TruncatedRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = PacketRecord::new(1, Timestamp::default(), 2).encode().to_vec();
        bytes.extend_from_slice(&[0xff; 5]);
        assert_eq!(decode_packet(&bytes).unwrap().size, 2);
    }

    #[test]
    fn test_timestamp_normalization() {
        assert_eq!(
            Timestamp::normalized(10, 2_500_000),
            Timestamp { sec: 12, usec: 500_000 }
        );
        assert_eq!(
            Timestamp::from_micros(1_500_000),
            Timestamp { sec: 1, usec: 500_000 }
        );
        assert_eq!(
            Timestamp::from_nanos(5, 123_456_789),
            Timestamp { sec: 5, usec: 123_456 }
        );
    }

    #[test]
    fn test_timestamp_seconds_since() {
        let a = Timestamp { sec: 10, usec: 900_000 };
        let b = Timestamp { sec: 11, usec: 100_000 };
        assert!((b.seconds_since(a) - 0.2).abs() < 1e-9);
        assert!((a.seconds_since(b) + 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_wire_byte_order_matches_numeric_order() {
        let low = PacketRecord::new(1, Timestamp { sec: 0x0100, usec: 0 }, 0).to_wire();
        let high = PacketRecord::new(1, Timestamp { sec: 0x0001_0000, usec: 0 }, 0).to_wire();
        assert_eq!(low.cmp_bytes(&high), Ordering::Less);
    }
}
