//! IPv4 header decoding.

use std::net::Ipv4Addr;

use etherparse::Ipv4HeaderSlice;

use crate::error::ProtocolError;

/// The IPv4 header fields flow extraction uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    /// Header length in bytes (IHL * 4)
    pub header_len: u16,
    pub total_len: u16,
    /// Fragment offset in 8-byte units
    pub fragment_offset: u16,
    pub more_fragments: bool,
}

impl Ipv4Header {
    /// Bytes carried after the IP header, according to the header.
    pub fn payload_len(&self) -> u16 {
        self.total_len.saturating_sub(self.header_len)
    }

    /// True for every fragment but the first, which carry no transport header.
    pub fn is_later_fragment(&self) -> bool {
        self.fragment_offset != 0
    }
}

/// Decode an IPv4 header and return it with the bytes that follow it.
///
/// The returned payload is the captured remainder of the packet. It may be
/// shorter than [`Ipv4Header::payload_len`] when the capture was truncated by
/// the snap length, and is cut at `total_len` when the frame carries padding.
pub fn parse(data: &[u8]) -> Result<(Ipv4Header, &[u8]), ProtocolError> {
    let ipv4 = Ipv4HeaderSlice::from_slice(data).map_err(|e| ProtocolError::Malformed {
        protocol: "ipv4",
        reason: e.to_string(),
    })?;

    let header = Ipv4Header {
        src: ipv4.source_addr(),
        dst: ipv4.destination_addr(),
        protocol: ipv4.protocol().0,
        header_len: ipv4.ihl() as u16 * 4,
        total_len: ipv4.total_len(),
        fragment_offset: ipv4.fragments_offset().value(),
        more_fragments: ipv4.more_fragments(),
    };

    let header_len = ipv4.slice().len();
    let end = (header.total_len as usize).clamp(header_len, data.len());
    Ok((header, &data[header_len..end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(protocol: u8, total_len: u16, options: usize) -> Vec<u8> {
        let ihl = 5 + options / 4;
        let mut h = vec![0x40 | ihl as u8, 0];
        h.extend_from_slice(&total_len.to_be_bytes());
        h.extend_from_slice(&[0, 0, 0, 0, 64, protocol, 0, 0]);
        h.extend_from_slice(&[10, 0, 0, 1]);
        h.extend_from_slice(&[10, 0, 0, 2]);
        h.extend(std::iter::repeat(1u8).take(options));
        h
    }

    #[test]
    fn test_parse_basic_header() {
        let mut data = header(6, 60, 0);
        data.extend_from_slice(&[0u8; 40]);
        let (ip, payload) = parse(&data).unwrap();
        assert_eq!(ip.src, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(ip.dst, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(ip.protocol, 6);
        assert_eq!(ip.header_len, 20);
        assert_eq!(ip.total_len, 60);
        assert_eq!(ip.payload_len(), 40);
        assert_eq!(payload.len(), 40);
        assert!(!ip.is_later_fragment());
    }

    #[test]
    fn test_options_and_padding() {
        let mut data = header(17, 32, 4);
        data.extend_from_slice(&[0u8; 8]);
        // Ethernet minimum-frame padding
        data.extend_from_slice(&[0u8; 6]);
        let (ip, payload) = parse(&data).unwrap();
        assert_eq!(ip.header_len, 24);
        assert_eq!(ip.payload_len(), 8);
        assert_eq!(payload.len(), 8);
    }

    #[test]
    fn test_snap_truncated_payload() {
        let mut data = header(6, 1500, 0);
        data.extend_from_slice(&[0u8; 20]);
        let (ip, payload) = parse(&data).unwrap();
        assert_eq!(ip.payload_len(), 1480);
        assert_eq!(payload.len(), 20);
    }

    #[test]
    fn test_later_fragment() {
        let mut data = header(6, 40, 0);
        data[6] = 0x00;
        data[7] = 0xb9;
        data.extend_from_slice(&[0u8; 20]);
        let (ip, _) = parse(&data).unwrap();
        assert_eq!(ip.fragment_offset, 185);
        assert!(ip.is_later_fragment());
    }

    #[test]
    fn test_short_header_is_rejected() {
        let data = header(6, 40, 0);
        assert!(parse(&data[..12]).is_err());
    }
}
