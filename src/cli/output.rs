//! Text rendering of flow and packet records.
//!
//! Three styles are supported: tab-separated (the default), CSV, and a
//! custom template. Templates name fields in braces and may use C escapes:
//!
//! - packets: `{flow} {time} {sec} {usec} {size} {interval}`
//! - flows: `{index} {proto} {src} {dst} {sport} {dport}`
//!
//! ```text
//! pcapflow index -p -F '{flow},{size}\n' packets.bin
//! ```

use std::io::Write;

use anyhow::{bail, Result};

use pcapflow_core::{FlowRecord, PacketRecord, RecordKind};

/// Output style selected on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputStyle {
    Tab,
    Csv,
    Custom(String),
}

/// A placeholder that can appear in a template.
trait TemplateField: Copy + Sized {
    const KIND: RecordKind;

    fn parse(name: &str) -> Option<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PacketField {
    Flow,
    Time,
    PaddedTime,
    Sec,
    Usec,
    Size,
    Interval,
}

impl TemplateField for PacketField {
    const KIND: RecordKind = RecordKind::Packet;

    fn parse(name: &str) -> Option<Self> {
        let field = match name {
            "flow" => PacketField::Flow,
            "time" => PacketField::Time,
            "sec" => PacketField::Sec,
            "usec" => PacketField::Usec,
            "size" => PacketField::Size,
            "interval" => PacketField::Interval,
            _ => return None,
        };
        Some(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowField {
    Index,
    Proto,
    Src,
    Dst,
    Sport,
    Dport,
}

impl TemplateField for FlowField {
    const KIND: RecordKind = RecordKind::Flow;

    fn parse(name: &str) -> Option<Self> {
        let field = match name {
            "index" => FlowField::Index,
            "proto" => FlowField::Proto,
            "src" => FlowField::Src,
            "dst" => FlowField::Dst,
            "sport" => FlowField::Sport,
            "dport" => FlowField::Dport,
            _ => return None,
        };
        Some(field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<F> {
    Literal(String),
    Field(F),
}

/// Compiled output format for packet records.
#[derive(Debug, Clone)]
pub struct PacketFormat {
    segments: Vec<Segment<PacketField>>,
    offset: u32,
}

impl PacketFormat {
    /// Compile `style`; `offset` is added to every printed flow id.
    pub fn new(style: &OutputStyle, offset: u32) -> Result<Self> {
        let segments = match style {
            // fixed-width time column
            OutputStyle::Tab => vec![
                Segment::Field(PacketField::Flow),
                Segment::Literal("\t".into()),
                Segment::Field(PacketField::PaddedTime),
                Segment::Literal("\t".into()),
                Segment::Field(PacketField::Size),
                Segment::Literal("\n".into()),
            ],
            OutputStyle::Csv => compile("{flow},{time},{size}\n")?,
            OutputStyle::Custom(format) => compile(&unescape(format))?,
        };
        Ok(PacketFormat { segments, offset })
    }

    pub fn write<W: Write>(&self, out: &mut W, record: &PacketRecord) -> std::io::Result<()> {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.write_all(text.as_bytes())?,
                Segment::Field(field) => match field {
                    PacketField::Flow => write!(out, "{}", record.flow.wrapping_add(self.offset))?,
                    PacketField::Time => write!(out, "{}", record.time)?,
                    PacketField::PaddedTime => write!(out, "{:>18}", record.time.to_string())?,
                    PacketField::Sec => write!(out, "{}", record.time.sec)?,
                    PacketField::Usec => write!(out, "{}", record.time.usec)?,
                    PacketField::Size => write!(out, "{}", record.size)?,
                    PacketField::Interval => write!(out, "{:.6}", record.interval)?,
                },
            }
        }
        Ok(())
    }
}

/// Compiled output format for flow records.
#[derive(Debug, Clone)]
pub struct FlowFormat {
    segments: Vec<Segment<FlowField>>,
    offset: u32,
}

impl FlowFormat {
    /// Compile `style`; `offset` is added to every printed flow id.
    pub fn new(style: &OutputStyle, offset: u32) -> Result<Self> {
        let template = match style {
            OutputStyle::Tab => "{index}\t{proto}\t{src}\t{dst}\t{sport}\t{dport}\n".to_string(),
            OutputStyle::Csv => "{index},{proto},{src},{dst},{sport},{dport}\n".to_string(),
            OutputStyle::Custom(format) => unescape(format),
        };
        Ok(FlowFormat {
            segments: compile(&template)?,
            offset,
        })
    }

    /// Write `record` labelled with flow id `id` (before the offset is applied).
    pub fn write<W: Write>(&self, out: &mut W, id: u32, record: &FlowRecord) -> std::io::Result<()> {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.write_all(text.as_bytes())?,
                Segment::Field(field) => match field {
                    FlowField::Index => write!(out, "{}", id.wrapping_add(self.offset))?,
                    FlowField::Proto => write!(out, "{}", record.protocol)?,
                    FlowField::Src => write!(out, "{}", record.src)?,
                    FlowField::Dst => write!(out, "{}", record.dst)?,
                    FlowField::Sport => write!(out, "{}", record.src_port)?,
                    FlowField::Dport => write!(out, "{}", record.dst_port)?,
                },
            }
        }
        Ok(())
    }
}

/// Split a template into literals and placeholders of one record kind.
///
/// Placeholders that do not name a field of that kind are rejected here,
/// so rendering never meets an unknown field.
fn compile<F: TemplateField>(template: &str) -> Result<Vec<Segment<F>>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        literal.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            bail!("unterminated placeholder in format {template:?}");
        };
        let name = &after[..close];
        let Some(field) = F::parse(name) else {
            bail!("unknown {} field {{{name}}} in format {template:?}", F::KIND);
        };
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Field(field));
        rest = &after[close + 1..];
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Expand C escapes: `\n \t \r \v \a \b \f \\` and `\NNN` octal.
///
/// Unknown escapes are kept as written.
pub fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('v') => out.push('\x0b'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('\\') => out.push('\\'),
            Some(d) if d.is_digit(8) => {
                let mut value = 0u32;
                for _ in 0..3 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).unwrap_or('\u{fffd}'));
                continue;
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => {
                out.push('\\');
                continue;
            }
        }
        chars.next();
    }
    out
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use pcapflow_core::Timestamp;

    use super::*;

    fn packet() -> PacketRecord {
        PacketRecord::new(3, Timestamp { sec: 1_200_000_000, usec: 42 }, 1500).with_interval(0.25)
    }

    fn flow() -> FlowRecord {
        FlowRecord {
            protocol: 17,
            src: Ipv4Addr::new(10, 0, 0, 1),
            dst: Ipv4Addr::new(8, 8, 8, 8),
            src_port: 5353,
            dst_port: 53,
            id: 0,
        }
    }

    fn render_packet(style: OutputStyle, offset: u32) -> String {
        let format = PacketFormat::new(&style, offset).unwrap();
        let mut out = Vec::new();
        format.write(&mut out, &packet()).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_packet_styles() {
        assert_eq!(render_packet(OutputStyle::Csv, 0), "3,1200000000.000042,1500\n");
        assert_eq!(render_packet(OutputStyle::Tab, 10), "13\t 1200000000.000042\t1500\n");
        assert_eq!(
            render_packet(OutputStyle::Custom("{sec}|{usec}|{interval}\\n".into()), 0),
            "1200000000|42|0.250000\n"
        );
    }

    #[test]
    fn test_flow_styles() {
        let format = FlowFormat::new(&OutputStyle::Tab, 1).unwrap();
        let mut out = Vec::new();
        format.write(&mut out, 4, &flow()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "5\t17\t10.0.0.1\t8.8.8.8\t5353\t53\n");
    }

    #[test]
    fn test_unknown_placeholder() {
        let custom = |format: &str| OutputStyle::Custom(format.into());
        assert!(FlowFormat::new(&custom("{size}"), 0).is_err());
        assert!(PacketFormat::new(&custom("{index}"), 0).is_err());
        assert!(PacketFormat::new(&custom("{size"), 0).is_err());
        assert!(PacketFormat::new(&custom("{bogus}\\n"), 0).is_err());

        let err = FlowFormat::new(&custom("{src} {port}"), 0).unwrap_err();
        assert!(err.to_string().contains("unknown flow field {port}"), "{err}");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\tb\n"), "a\tb\n");
        assert_eq!(unescape(r"\101\60x"), "A0x");
        assert_eq!(unescape(r"\\n"), "\\n");
        assert_eq!(unescape(r"\q"), "\\q");
        assert_eq!(unescape("tail\\"), "tail\\");
        assert_eq!(unescape(r"\v"), "\x0b");
    }
}
