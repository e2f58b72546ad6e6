//! tcpdump-style capture filters.
//!
//! Expressions are parsed with `nom` into a small AST and evaluated directly
//! against [`DecodedPacket`]s; nothing is compiled to BPF bytecode.
//!
//! # Supported Syntax
//!
//! - Protocols: `tcp`, `udp`, `icmp`, `ip`
//! - Hosts: `host 192.168.1.1`, `src host 10.0.0.1`, `dst host 10.0.0.2`
//! - Networks: `net 10.0.0.0/8`, `src net 192.168.0.0/16`
//! - Ports: `port 80`, `tcp port 443`, `dst udp port 53`
//! - Port ranges: `portrange 1024-65535`
//! - Protocol number: `proto 47`
//! - Frame length: `less 128`, `greater 1000`
//! - Boolean operators: `and`/`&&`, `or`/`||`, `not`/`!`, parentheses
//!
//! ```rust
//! use pcapflow_core::filter::CaptureFilter;
//!
//! let filter: CaptureFilter = "tcp port 80 and not host 10.0.0.1".parse()?;
//! assert_eq!(filter.source(), "tcp port 80 and not host 10.0.0.1");
//! # Ok::<(), pcapflow_core::filter::FilterError>(())
//! ```

mod ast;
mod error;
mod eval;
mod parser;

use std::fmt;
use std::str::FromStr;

use crate::protocol::DecodedPacket;

pub use ast::{Cidr, Direction, FilterExpr, Primitive, Protocol};
pub use error::FilterError;
pub use parser::parse_filter;

/// A parsed filter together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureFilter {
    source: String,
    expr: FilterExpr,
}

impl CaptureFilter {
    pub fn parse(source: &str) -> Result<Self, FilterError> {
        Ok(CaptureFilter {
            source: source.trim().to_string(),
            expr: parse_filter(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &FilterExpr {
        &self.expr
    }

    #[inline]
    pub fn matches(&self, packet: &DecodedPacket<'_>) -> bool {
        self.expr.matches(packet)
    }
}

impl FromStr for CaptureFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CaptureFilter::parse(s)
    }
}

impl fmt::Display for CaptureFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_filter_keeps_source() {
        let filter = CaptureFilter::parse("  udp and port 53 ").unwrap();
        assert_eq!(filter.source(), "udp and port 53");
        assert_eq!(filter.to_string(), "udp and port 53");
        assert!(matches!(filter.expr(), FilterExpr::And(_, _)));
    }

    #[test]
    fn test_capture_filter_error() {
        assert!("invalid @#$ filter".parse::<CaptureFilter>().is_err());
        assert!(matches!(
            "".parse::<CaptureFilter>(),
            Err(FilterError::EmptyFilter)
        ));
    }
}
