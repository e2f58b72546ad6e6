//! Header decoding for flow extraction.
//!
//! Only the fields that flow keys, size accounting and the capture filter
//! need are decoded: link framing, the IPv4 header, and the fixed part of
//! TCP, UDP and ICMP headers. Anything that is not IPv4 decodes to `None`.

mod ipv4;
pub mod link;
mod transport;

use crate::error::Result;
use crate::flow::FlowKey;
use crate::io::PacketRef;

pub use ipv4::Ipv4Header;
pub use link::{network_payload, NetworkPayload};
pub use transport::{
    IcmpHeader, TcpHeader, Transport, UdpHeader, IP_PROTO_ICMP, IP_PROTO_TCP, IP_PROTO_UDP,
};

/// The decoded view of one IPv4 packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPacket<'a> {
    /// Length of the frame on the wire
    pub frame_len: u32,
    pub ip: Ipv4Header,
    pub transport: Transport,
    /// Captured bytes following the IP header
    pub ip_payload: &'a [u8],
}

impl DecodedPacket<'_> {
    pub fn protocol(&self) -> u8 {
        self.ip.protocol
    }

    /// Flow key with ICMP identifiers in place of ports.
    pub fn flow_key(&self) -> FlowKey {
        let (src_sel, dst_sel) = self.transport.selectors();
        FlowKey {
            protocol: self.ip.protocol,
            src: self.ip.src,
            dst: self.ip.dst,
            src_sel,
            dst_sel,
        }
    }
}

/// Decode a captured frame. Non-IPv4 frames yield `Ok(None)`.
pub fn decode(link_type: u32, data: &[u8]) -> Result<Option<DecodedPacket<'_>>> {
    let ip_data = match network_payload(link_type, data)? {
        NetworkPayload::Ipv4(ip_data) => ip_data,
        NetworkPayload::Other(_) => return Ok(None),
    };

    let (ip, ip_payload) = ipv4::parse(ip_data)?;
    let transport = if ip.is_later_fragment() {
        Transport::Other
    } else {
        transport::parse(ip.protocol, ip_payload)?
    };

    Ok(Some(DecodedPacket {
        frame_len: data.len() as u32,
        ip,
        transport,
        ip_payload,
    }))
}

/// Decode a packet handed out by a capture reader.
pub fn decode_packet<'a>(packet: &PacketRef<'a>) -> Result<Option<DecodedPacket<'a>>> {
    Ok(decode(packet.link_type, packet.data)?.map(|decoded| DecodedPacket {
        frame_len: packet.original_len,
        ..decoded
    }))
}

#[cfg(test)]
pub(crate) mod test_utils {
    //! Frame builders shared by unit tests.

    use std::net::Ipv4Addr;

    use super::link::ethertype;

    /// Wrap an IP packet in an Ethernet II header.
    pub fn ethernet(ip_packet: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        frame.extend_from_slice(&[0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);
        frame.extend_from_slice(&ethertype::IPV4.to_be_bytes());
        frame.extend_from_slice(ip_packet);
        frame
    }

    /// IPv4 packet with the given transport header and `payload_len` zero bytes.
    pub fn ipv4(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, l4: &[u8], payload_len: usize) -> Vec<u8> {
        let total_len = (20 + l4.len() + payload_len) as u16;
        let mut p = vec![0x45, 0];
        p.extend_from_slice(&total_len.to_be_bytes());
        p.extend_from_slice(&[0, 0, 0, 0, 64, protocol, 0, 0]);
        p.extend_from_slice(&src.octets());
        p.extend_from_slice(&dst.octets());
        p.extend_from_slice(l4);
        p.resize(total_len as usize, 0);
        p
    }

    /// 20-byte TCP header. `flags` uses the wire bit layout (FIN = 0x01, SYN = 0x02, ...).
    pub fn tcp(sport: u16, dport: u16, seq: u32, flags: u8) -> Vec<u8> {
        let mut h = Vec::with_capacity(20);
        h.extend_from_slice(&sport.to_be_bytes());
        h.extend_from_slice(&dport.to_be_bytes());
        h.extend_from_slice(&seq.to_be_bytes());
        h.extend_from_slice(&0u32.to_be_bytes());
        h.push(5 << 4);
        h.push(flags);
        h.extend_from_slice(&[0xff, 0xff, 0, 0, 0, 0]);
        h
    }

    pub fn udp(sport: u16, dport: u16, payload_len: usize) -> Vec<u8> {
        let mut h = Vec::with_capacity(8);
        h.extend_from_slice(&sport.to_be_bytes());
        h.extend_from_slice(&dport.to_be_bytes());
        h.extend_from_slice(&((8 + payload_len) as u16).to_be_bytes());
        h.extend_from_slice(&[0, 0]);
        h
    }

    pub fn icmp_echo(identifier: u16, seq: u16) -> Vec<u8> {
        let mut h = vec![8, 0, 0, 0];
        h.extend_from_slice(&identifier.to_be_bytes());
        h.extend_from_slice(&seq.to_be_bytes());
        h
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::test_utils::*;
    use super::*;
    use crate::protocol::link::LINKTYPE_ETHERNET;

    const A: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 1);
    const B: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 2);

    #[test]
    fn test_decode_tcp_frame() {
        let frame = ethernet(&ipv4(A, B, IP_PROTO_TCP, &tcp(40000, 443, 7, 0x18), 100));
        let decoded = decode(LINKTYPE_ETHERNET, &frame).unwrap().unwrap();
        assert_eq!(decoded.frame_len, frame.len() as u32);
        assert_eq!(decoded.ip.total_len, 140);
        assert_eq!(decoded.ip_payload.len(), 120);
        assert_eq!(
            decoded.flow_key(),
            FlowKey {
                protocol: 6,
                src: A,
                dst: B,
                src_sel: 40000,
                dst_sel: 443,
            }
        );
    }

    #[test]
    fn test_decode_icmp_key() {
        let frame = ethernet(&ipv4(A, B, IP_PROTO_ICMP, &icmp_echo(0xbeef, 1), 56));
        let key = decode(LINKTYPE_ETHERNET, &frame).unwrap().unwrap().flow_key();
        assert_eq!((key.src_sel, key.dst_sel), (0xbeef, 0x0800));
    }

    #[test]
    fn test_non_ip_is_none() {
        let mut frame = ethernet(&[]);
        frame[12..14].copy_from_slice(&0x0806u16.to_be_bytes());
        frame.extend_from_slice(&[0u8; 28]);
        assert!(decode(LINKTYPE_ETHERNET, &frame).unwrap().is_none());
    }

    #[test]
    fn test_later_fragment_has_no_ports() {
        let mut packet = ipv4(A, B, IP_PROTO_UDP, &udp(1, 2, 30), 30);
        packet[7] = 0x10;
        let frame = ethernet(&packet);
        let decoded = decode(LINKTYPE_ETHERNET, &frame).unwrap().unwrap();
        assert_eq!(decoded.transport, Transport::Other);
        assert_eq!(decoded.flow_key().src_sel, 0);
        assert_eq!(decoded.protocol(), IP_PROTO_UDP);
    }

    #[test]
    fn test_decode_packet_uses_wire_length() {
        let frame = ethernet(&ipv4(A, B, IP_PROTO_UDP, &udp(1, 2, 0), 0));
        let packet = PacketRef {
            frame_number: 1,
            timestamp: Default::default(),
            captured_len: frame.len() as u32,
            original_len: 1514,
            link_type: LINKTYPE_ETHERNET,
            data: &frame,
        };
        assert_eq!(decode_packet(&packet).unwrap().unwrap().frame_len, 1514);
    }
}
