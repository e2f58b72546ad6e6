//! Direct evaluation of filter expressions against decoded packets.

use super::ast::{Direction, FilterExpr, Primitive, Protocol};
use crate::protocol::{DecodedPacket, Transport};

impl FilterExpr {
    /// Evaluate the expression against one packet.
    pub fn matches(&self, packet: &DecodedPacket<'_>) -> bool {
        match self {
            FilterExpr::Primitive(p) => p.matches(packet),
            FilterExpr::Not(inner) => !inner.matches(packet),
            FilterExpr::And(l, r) => l.matches(packet) && r.matches(packet),
            FilterExpr::Or(l, r) => l.matches(packet) || r.matches(packet),
        }
    }
}

impl Primitive {
    pub fn matches(&self, packet: &DecodedPacket<'_>) -> bool {
        let ip = &packet.ip;
        match *self {
            Primitive::Protocol(proto) => match proto.number() {
                Some(n) => ip.protocol == n,
                None => true,
            },
            Primitive::Host { direction, address } => {
                either(direction, ip.src, ip.dst, |a| a == address)
            }
            Primitive::Net { direction, cidr } => {
                either(direction, ip.src, ip.dst, |a| cidr.contains(a))
            }
            Primitive::Port {
                direction,
                protocol,
                port,
            } => match ports(&packet.transport, protocol) {
                Some((src, dst)) => either(direction, src, dst, |p| p == port),
                None => false,
            },
            Primitive::PortRange {
                direction,
                protocol,
                start,
                end,
            } => match ports(&packet.transport, protocol) {
                Some((src, dst)) => either(direction, src, dst, |p| (start..=end).contains(&p)),
                None => false,
            },
            Primitive::Proto(n) => ip.protocol == n,
            Primitive::Less(n) => packet.frame_len <= n,
            Primitive::Greater(n) => packet.frame_len >= n,
        }
    }
}

/// Ports of the packet, if it has a transport header of the requested kind.
fn ports(transport: &Transport, protocol: Option<Protocol>) -> Option<(u16, u16)> {
    match (transport, protocol) {
        (Transport::Tcp(_), None | Some(Protocol::Tcp)) => transport.ports(),
        (Transport::Udp(_), None | Some(Protocol::Udp)) => transport.ports(),
        _ => None,
    }
}

fn either<T: Copy>(direction: Direction, src: T, dst: T, pred: impl Fn(T) -> bool) -> bool {
    match direction {
        Direction::Src => pred(src),
        Direction::Dst => pred(dst),
        Direction::SrcOrDst => pred(src) || pred(dst),
    }
}
