//! Link-layer framing: locate the network-layer payload of a frame.

use etherparse::Ethernet2HeaderSlice;

use crate::error::{Error, PcapError, ProtocolError};

pub const LINKTYPE_ETHERNET: u32 = 1;
pub const LINKTYPE_RAW: u32 = 101;
pub const LINKTYPE_LINUX_SLL: u32 = 113;
pub const LINKTYPE_RAW_IPV4: u32 = 228;

/// Linux SLL header length in bytes.
pub const LINUX_SLL_HEADER_LEN: usize = 16;

/// Well-known EtherType values.
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const VLAN: u16 = 0x8100;
    pub const IPV6: u16 = 0x86DD;
    pub const QINQ: u16 = 0x88A8;
}

/// Nested VLAN tags beyond this depth are treated as non-IP.
const MAX_VLAN_DEPTH: usize = 4;

/// Network-layer payload of a frame, as far as flow extraction cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkPayload<'a> {
    Ipv4(&'a [u8]),
    /// Anything that is not IPv4 (ARP, IPv6, ...), by EtherType.
    Other(u16),
}

/// Strip the link-layer header of a frame.
pub fn network_payload(link_type: u32, data: &[u8]) -> Result<NetworkPayload<'_>, Error> {
    match link_type {
        LINKTYPE_ETHERNET => ethernet_payload(data),
        LINKTYPE_RAW => Ok(match data.first().map(|b| b >> 4) {
            Some(4) => NetworkPayload::Ipv4(data),
            Some(6) => NetworkPayload::Other(ethertype::IPV6),
            _ => NetworkPayload::Other(0),
        }),
        LINKTYPE_RAW_IPV4 => Ok(NetworkPayload::Ipv4(data)),
        LINKTYPE_LINUX_SLL => {
            if data.len() < LINUX_SLL_HEADER_LEN {
                return Err(ProtocolError::PacketTooShort {
                    protocol: "linux_sll",
                    needed: LINUX_SLL_HEADER_LEN,
                    have: data.len(),
                }
                .into());
            }
            let protocol = u16::from_be_bytes([data[14], data[15]]);
            with_vlans(protocol, &data[LINUX_SLL_HEADER_LEN..])
        }
        other => Err(PcapError::UnsupportedLinkType { link_type: other }.into()),
    }
}

fn ethernet_payload(data: &[u8]) -> Result<NetworkPayload<'_>, Error> {
    let eth = Ethernet2HeaderSlice::from_slice(data).map_err(|e| ProtocolError::Malformed {
        protocol: "ethernet",
        reason: e.to_string(),
    })?;
    let header_len = eth.slice().len();
    with_vlans(eth.ether_type().0, &data[header_len..])
}

/// Skip 802.1Q / 802.1ad tags until a non-VLAN EtherType is reached.
fn with_vlans(mut ether_type: u16, mut data: &[u8]) -> Result<NetworkPayload<'_>, Error> {
    let mut depth = 0;
    while matches!(ether_type, ethertype::VLAN | ethertype::QINQ) {
        // TCI (2 bytes) then the inner EtherType (2 bytes)
        if data.len() < 4 {
            return Err(ProtocolError::PacketTooShort {
                protocol: "vlan",
                needed: 4,
                have: data.len(),
            }
            .into());
        }
        depth += 1;
        if depth > MAX_VLAN_DEPTH {
            return Ok(NetworkPayload::Other(ether_type));
        }
        ether_type = u16::from_be_bytes([data[2], data[3]]);
        data = &data[4..];
    }

    Ok(match ether_type {
        ethertype::IPV4 => NetworkPayload::Ipv4(data),
        other => NetworkPayload::Other(other),
    })
}
