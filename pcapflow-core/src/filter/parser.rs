//! Filter parser using nom.
//!
//! Grammar (operator precedence: NOT > AND > OR):
//! ```text
//! filter     = expr
//! expr       = term (("or" | "||") term)*
//! term       = factor (("and" | "&&") factor)*
//! factor     = ("not" | "!") factor | "(" expr ")" | primitive
//! primitive  = proto | net | portrange | port | host | less | greater | protocol
//! ```

use std::net::Ipv4Addr;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};

use super::ast::{Cidr, Direction, FilterExpr, Primitive, Protocol};
use super::error::FilterError;

/// Parse a complete filter expression.
pub fn parse_filter(input: &str) -> Result<FilterExpr, FilterError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(FilterError::EmptyFilter);
    }

    match all_consuming(delimited(multispace0, expr, multispace0))(input) {
        Ok((_, expr)) => Ok(expr),
        Err(e) => Err(FilterError::parse_error(format!("{e}"))),
    }
}

// =============================================================================
// Expression Parsers (handle operator precedence)
// =============================================================================

fn or_operator(input: &str) -> IResult<&str, &str> {
    delimited(
        multispace0,
        alt((terminated(tag_no_case("or"), multispace1), tag("||"))),
        multispace0,
    )(input)
}

fn and_operator(input: &str) -> IResult<&str, &str> {
    delimited(
        multispace0,
        alt((terminated(tag_no_case("and"), multispace1), tag("&&"))),
        multispace0,
    )(input)
}

/// Parse an expression (OR level - lowest precedence).
fn expr(input: &str) -> IResult<&str, FilterExpr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(preceded(or_operator, term))(input)?;

    let result = rest.into_iter().fold(first, FilterExpr::or);
    Ok((input, result))
}

/// Parse a term (AND level).
fn term(input: &str) -> IResult<&str, FilterExpr> {
    let (input, first) = factor(input)?;
    let (input, rest) = many0(preceded(and_operator, factor))(input)?;

    let result = rest.into_iter().fold(first, FilterExpr::and);
    Ok((input, result))
}

/// Parse a factor (NOT and parentheses).
fn factor(input: &str) -> IResult<&str, FilterExpr> {
    alt((not_expr, paren_expr, primitive_expr))(input)
}

fn not_expr(input: &str) -> IResult<&str, FilterExpr> {
    let (input, _) = alt((
        terminated(tag_no_case("not"), multispace1),
        terminated(tag("!"), multispace0),
    ))(input)?;
    let (input, expr) = factor(input)?;
    Ok((input, FilterExpr::negate(expr)))
}

fn paren_expr(input: &str) -> IResult<&str, FilterExpr> {
    delimited(
        pair(char('('), multispace0),
        expr,
        pair(multispace0, char(')')),
    )(input)
}

fn primitive_expr(input: &str) -> IResult<&str, FilterExpr> {
    map(primitive, FilterExpr::Primitive)(input)
}

// =============================================================================
// Primitive Parsers
// =============================================================================

fn primitive(input: &str) -> IResult<&str, Primitive> {
    alt((
        proto_filter,
        net_filter,
        portrange_filter,
        port_filter,
        host_filter,
        length_filter,
        protocol_filter,
    ))(input)
}

/// Parse protocol filter: tcp, udp, icmp, ip
fn protocol_filter(input: &str) -> IResult<&str, Primitive> {
    map(protocol, Primitive::Protocol)(input)
}

fn protocol(input: &str) -> IResult<&str, Protocol> {
    alt((
        value(Protocol::Tcp, tag_no_case("tcp")),
        value(Protocol::Udp, tag_no_case("udp")),
        value(Protocol::Icmp, tag_no_case("icmp")),
        value(Protocol::Ip, tag_no_case("ip")),
    ))(input)
}

/// Parse host filter: [src|dst] host <address>
fn host_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, dir) = opt(terminated(direction, multispace1))(input)?;
    let (input, _) = tag_no_case("host")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, address) = ipv4_addr(input)?;

    Ok((
        input,
        Primitive::Host {
            direction: dir.unwrap_or_default(),
            address,
        },
    ))
}

/// Parse port filter: [src|dst] [tcp|udp] port <number>
fn port_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, dir) = opt(terminated(direction, multispace1))(input)?;
    let (input, proto) = opt(terminated(transport_protocol, multispace1))(input)?;
    let (input, _) = tag_no_case("port")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, port) = port_number(input)?;

    Ok((
        input,
        Primitive::Port {
            direction: dir.unwrap_or_default(),
            protocol: proto,
            port,
        },
    ))
}

/// Parse port range filter: [src|dst] [tcp|udp] portrange <start>-<end>
fn portrange_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, dir) = opt(terminated(direction, multispace1))(input)?;
    let (input, proto) = opt(terminated(transport_protocol, multispace1))(input)?;
    let (input, _) = tag_no_case("portrange")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, (a, b)) = separated_pair(port_number, char('-'), port_number)(input)?;

    Ok((
        input,
        Primitive::PortRange {
            direction: dir.unwrap_or_default(),
            protocol: proto,
            start: a.min(b),
            end: a.max(b),
        },
    ))
}

/// Parse net filter: [src|dst] net <cidr>
fn net_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, dir) = opt(terminated(direction, multispace1))(input)?;
    let (input, _) = tag_no_case("net")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, cidr) = cidr(input)?;

    Ok((
        input,
        Primitive::Net {
            direction: dir.unwrap_or_default(),
            cidr,
        },
    ))
}

/// Parse proto filter: proto <number>
fn proto_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, _) = tag_no_case("proto")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, num) = map_res(digit1, |s: &str| s.parse::<u8>())(input)?;

    Ok((input, Primitive::Proto(num)))
}

/// Parse length filters: less <n>, greater <n>
fn length_filter(input: &str) -> IResult<&str, Primitive> {
    alt((
        map(
            preceded(pair(tag_no_case("less"), multispace1), frame_length),
            Primitive::Less,
        ),
        map(
            preceded(pair(tag_no_case("greater"), multispace1), frame_length),
            Primitive::Greater,
        ),
    ))(input)
}

// =============================================================================
// Helper Parsers
// =============================================================================

fn direction(input: &str) -> IResult<&str, Direction> {
    alt((
        value(Direction::Src, tag_no_case("src")),
        value(Direction::Dst, tag_no_case("dst")),
    ))(input)
}

fn transport_protocol(input: &str) -> IResult<&str, Protocol> {
    alt((
        value(Protocol::Tcp, tag_no_case("tcp")),
        value(Protocol::Udp, tag_no_case("udp")),
    ))(input)
}

fn ipv4_addr(input: &str) -> IResult<&str, Ipv4Addr> {
    map_res(
        recognize(tuple((
            digit1,
            char('.'),
            digit1,
            char('.'),
            digit1,
            char('.'),
            digit1,
        ))),
        |s: &str| s.parse::<Ipv4Addr>(),
    )(input)
}

/// Parse a CIDR notation: address/prefix
fn cidr(input: &str) -> IResult<&str, Cidr> {
    let (input, address) = ipv4_addr(input)?;
    let (input, _) = char('/')(input)?;
    let (rest, prefix_len) = map_res(digit1, |s: &str| s.parse::<u8>())(input)?;

    if prefix_len > 32 {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }

    Ok((
        rest,
        Cidr {
            address,
            prefix_len,
        },
    ))
}

fn frame_length(input: &str) -> IResult<&str, u32> {
    map_res(digit1, |s: &str| s.parse::<u32>())(input)
}

fn port_number(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |s: &str| s.parse::<u16>())(input)
}
