//! AST types for capture filter expressions.

use std::fmt;
use std::net::Ipv4Addr;

/// Direction qualifier for host/net/port filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// Match source only
    Src,
    /// Match destination only
    Dst,
    /// Match either source or destination (default)
    #[default]
    SrcOrDst,
}

/// Protocol keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Any IPv4 packet
    Ip,
}

impl Protocol {
    /// IP protocol number, or `None` for `ip` itself.
    pub fn number(&self) -> Option<u8> {
        match self {
            Protocol::Tcp => Some(6),
            Protocol::Udp => Some(17),
            Protocol::Icmp => Some(1),
            Protocol::Ip => None,
        }
    }

    /// Returns true if this is a transport protocol (has ports).
    pub fn has_ports(&self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

/// IPv4 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl Cidr {
    pub fn mask(&self) -> u32 {
        match self.prefix_len {
            0 => 0,
            n => u32::MAX << (32 - n.min(32) as u32),
        }
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = self.mask();
        u32::from(addr) & mask == u32::from(self.address) & mask
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

/// Primitive filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Protocol filter: tcp, udp, icmp, ip
    Protocol(Protocol),

    /// Host filter: host 1.2.3.4, src host 10.0.0.1
    Host {
        direction: Direction,
        address: Ipv4Addr,
    },

    /// Network filter: net 10.0.0.0/8
    Net { direction: Direction, cidr: Cidr },

    /// Port filter: port 80, dst tcp port 443
    Port {
        direction: Direction,
        /// Optional protocol qualifier (tcp or udp)
        protocol: Option<Protocol>,
        port: u16,
    },

    /// Port range filter, inclusive: portrange 80-90
    PortRange {
        direction: Direction,
        protocol: Option<Protocol>,
        start: u16,
        end: u16,
    },

    /// IP protocol number: proto 6 (TCP), proto 17 (UDP)
    Proto(u8),

    /// Frame length at most N bytes: less N
    Less(u32),

    /// Frame length at least N bytes: greater N
    Greater(u32),
}

/// Boolean expression combining primitives.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Primitive(Primitive),
    Not(Box<FilterExpr>),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

impl FilterExpr {
    pub fn negate(expr: FilterExpr) -> Self {
        FilterExpr::Not(Box::new(expr))
    }

    pub fn and(left: FilterExpr, right: FilterExpr) -> Self {
        FilterExpr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: FilterExpr, right: FilterExpr) -> Self {
        FilterExpr::Or(Box::new(left), Box::new(right))
    }
}
