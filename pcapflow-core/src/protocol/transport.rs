//! Transport header decoding (TCP, UDP, ICMP).

use etherparse::{TcpHeaderSlice, UdpHeaderSlice};

use crate::error::ProtocolError;
use crate::stream::TcpFlags;

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;

const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: u16 = 8;
const ICMP_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    /// Header length in bytes (data offset * 4)
    pub header_len: u16,
    pub flags: TcpFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// Length field: header plus payload
    pub length: u16,
}

impl UdpHeader {
    pub fn payload_len(&self) -> u16 {
        self.length.saturating_sub(UDP_HEADER_LEN)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
    /// Bytes 4..6 of the header (the echo identifier for echo messages)
    pub identifier: u16,
}

impl IcmpHeader {
    /// `type << 8 | code`, used in place of a destination port.
    pub fn type_code(&self) -> u16 {
        ((self.icmp_type as u16) << 8) | self.code as u16
    }
}

/// Decoded transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp(TcpHeader),
    Udp(UdpHeader),
    Icmp(IcmpHeader),
    /// Any other protocol, and every non-first fragment.
    Other,
}

impl Transport {
    /// Source and destination selectors for the flow key.
    pub fn selectors(&self) -> (u16, u16) {
        match self {
            Transport::Tcp(tcp) => (tcp.src_port, tcp.dst_port),
            Transport::Udp(udp) => (udp.src_port, udp.dst_port),
            Transport::Icmp(icmp) => (icmp.identifier, icmp.type_code()),
            Transport::Other => (0, 0),
        }
    }

    pub fn ports(&self) -> Option<(u16, u16)> {
        match self {
            Transport::Tcp(tcp) => Some((tcp.src_port, tcp.dst_port)),
            Transport::Udp(udp) => Some((udp.src_port, udp.dst_port)),
            Transport::Icmp(_) | Transport::Other => None,
        }
    }
}

/// Decode the transport header of a first (or only) fragment.
pub fn parse(protocol: u8, data: &[u8]) -> Result<Transport, ProtocolError> {
    match protocol {
        IP_PROTO_TCP => parse_tcp(data).map(Transport::Tcp),
        IP_PROTO_UDP => parse_udp(data).map(Transport::Udp),
        IP_PROTO_ICMP => parse_icmp(data).map(Transport::Icmp),
        _ => Ok(Transport::Other),
    }
}

fn parse_tcp(data: &[u8]) -> Result<TcpHeader, ProtocolError> {
    match TcpHeaderSlice::from_slice(data) {
        Ok(tcp) => Ok(TcpHeader {
            src_port: tcp.source_port(),
            dst_port: tcp.destination_port(),
            seq: tcp.sequence_number(),
            header_len: tcp.data_offset() as u16 * 4,
            flags: TcpFlags {
                syn: tcp.syn(),
                ack: tcp.ack(),
                fin: tcp.fin(),
                rst: tcp.rst(),
            },
        }),
        // A short snap length can cut the options off; the fixed part is enough.
        Err(_) if data.len() >= TCP_MIN_HEADER_LEN && data[12] >> 4 >= 5 => {
            let flags = data[13];
            Ok(TcpHeader {
                src_port: u16::from_be_bytes([data[0], data[1]]),
                dst_port: u16::from_be_bytes([data[2], data[3]]),
                seq: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
                header_len: (data[12] >> 4) as u16 * 4,
                flags: TcpFlags {
                    fin: flags & 0x01 != 0,
                    syn: flags & 0x02 != 0,
                    rst: flags & 0x04 != 0,
                    ack: flags & 0x10 != 0,
                },
            })
        }
        Err(e) => Err(ProtocolError::Malformed {
            protocol: "tcp",
            reason: e.to_string(),
        }),
    }
}

fn parse_udp(data: &[u8]) -> Result<UdpHeader, ProtocolError> {
    let udp = UdpHeaderSlice::from_slice(data).map_err(|e| ProtocolError::Malformed {
        protocol: "udp",
        reason: e.to_string(),
    })?;
    Ok(UdpHeader {
        src_port: udp.source_port(),
        dst_port: udp.destination_port(),
        length: udp.length(),
    })
}

fn parse_icmp(data: &[u8]) -> Result<IcmpHeader, ProtocolError> {
    if data.len() < ICMP_HEADER_LEN {
        return Err(ProtocolError::PacketTooShort {
            protocol: "icmp",
            needed: ICMP_HEADER_LEN,
            have: data.len(),
        });
    }
    Ok(IcmpHeader {
        icmp_type: data[0],
        code: data[1],
        identifier: u16::from_be_bytes([data[4], data[5]]),
    })
}
