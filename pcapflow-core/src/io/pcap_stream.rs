//! Generic PCAP/PCAPNG reader over any Read source.
//!
//! Built on `pcap_parser`'s streaming readers. Packets are handed to a
//! callback as borrowed [`PacketRef`]s that live only as long as the parser
//! buffer, so nothing is copied on the hot path.

use std::io::{self, Read};

use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapNGReader};

use crate::error::{Error, PcapError};
use crate::io::PacketRef;
use crate::record::Timestamp;

/// Buffer size for pcap_parser readers (256KB).
const BUFFER_SIZE: usize = 262144;

/// Link type assumed until a header says otherwise.
const DEFAULT_LINK_TYPE: u32 = 1;

/// Format of the capture stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PcapFormat {
    /// Classic PCAP (little-endian, microseconds)
    LegacyLeMicro,
    /// Classic PCAP (big-endian, microseconds)
    LegacyBeMicro,
    /// Classic PCAP (little-endian, nanoseconds)
    LegacyLeNano,
    /// Classic PCAP (big-endian, nanoseconds)
    LegacyBeNano,
    /// PCAPNG format
    PcapNg,
}

impl PcapFormat {
    /// Detect the format from the first four bytes of the stream.
    pub fn detect(data: &[u8]) -> Result<Self, Error> {
        let magic: [u8; 4] = data
            .get(..4)
            .and_then(|head| head.try_into().ok())
            .ok_or_else(|| {
                Error::Pcap(PcapError::InvalidFormat {
                    reason: "Data too small for PCAP magic".into(),
                })
            })?;

        match magic {
            [0xd4, 0xc3, 0xb2, 0xa1] => Ok(PcapFormat::LegacyLeMicro),
            [0xa1, 0xb2, 0xc3, 0xd4] => Ok(PcapFormat::LegacyBeMicro),
            [0x4d, 0x3c, 0xb2, 0xa1] => Ok(PcapFormat::LegacyLeNano),
            [0xa1, 0xb2, 0x3c, 0x4d] => Ok(PcapFormat::LegacyBeNano),
            [0x0a, 0x0d, 0x0d, 0x0a] => Ok(PcapFormat::PcapNg),
            _ => Err(Error::Pcap(PcapError::InvalidFormat {
                reason: format!("Unknown PCAP magic: 0x{:08x}", u32::from_be_bytes(magic)),
            })),
        }
    }

    /// Whether this is a PCAPNG format.
    pub fn is_pcapng(&self) -> bool {
        matches!(self, PcapFormat::PcapNg)
    }

    /// Whether this is a legacy PCAP format.
    pub fn is_legacy(&self) -> bool {
        !self.is_pcapng()
    }

    /// Whether record timestamps carry nanoseconds instead of microseconds.
    pub fn is_nanosecond(&self) -> bool {
        matches!(self, PcapFormat::LegacyLeNano | PcapFormat::LegacyBeNano)
    }
}

/// Generic PCAP/PCAPNG reader over any Read source.
pub struct GenericPcapReader<R: Read> {
    inner: ReaderInner<R>,
    format: PcapFormat,
    frame_number: u64,
    link_type: u32,
}

/// Inner reader using enum dispatch for format-specific handling.
enum ReaderInner<R: Read> {
    Legacy(LegacyPcapReader<FillReader<R>>),
    Ng(PcapNGReader<FillReader<R>>),
}

/// Read adapter that fills the whole destination unless the source ends.
///
/// `pcap_parser` issues a single `read` when it is constructed and expects
/// the complete file header in it. Decoders and chained sources return
/// short reads, so every read here loops until the buffer is full or the
/// source is exhausted.
struct FillReader<R> {
    inner: R,
}

impl<R: Read> Read for FillReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> GenericPcapReader<R> {
    /// Create a reader with known format.
    ///
    /// Use [`PcapFormat::detect`] on the first bytes of the stream to find
    /// the format; `source` must still start at the magic number.
    pub fn with_format(source: R, format: PcapFormat) -> Result<Self, Error> {
        let source = FillReader { inner: source };

        let inner = if format.is_pcapng() {
            let reader = PcapNGReader::new(BUFFER_SIZE, source).map_err(|e| {
                Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("Failed to parse PCAPNG: {}", e),
                })
            })?;
            ReaderInner::Ng(reader)
        } else {
            let reader = LegacyPcapReader::new(BUFFER_SIZE, source).map_err(|e| {
                Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("Failed to parse legacy PCAP: {}", e),
                })
            })?;
            ReaderInner::Legacy(reader)
        };

        Ok(GenericPcapReader {
            inner,
            format,
            frame_number: 0,
            link_type: DEFAULT_LINK_TYPE,
        })
    }

    pub fn format(&self) -> PcapFormat {
        self.format
    }

    /// Get the link type (e.g., 1 = Ethernet).
    ///
    /// Valid once the first packet has been delivered.
    pub fn link_type(&self) -> u32 {
        self.link_type
    }

    /// Get the current frame count.
    pub fn frame_count(&self) -> u64 {
        self.frame_number
    }

    /// Process up to `max` packets with zero-copy borrowed data.
    ///
    /// The borrow handed to `f` is valid only during the callback. Returns the
    /// number of packets processed; fewer than `max` means end of input.
    #[inline]
    pub fn process_packets<F>(&mut self, max: usize, f: F) -> Result<usize, Error>
    where
        F: FnMut(PacketRef<'_>) -> Result<(), Error>,
    {
        let nanos = self.format.is_nanosecond();
        match &mut self.inner {
            ReaderInner::Legacy(reader) => process_legacy_packets(
                reader,
                max,
                nanos,
                &mut self.frame_number,
                &mut self.link_type,
                f,
            ),
            ReaderInner::Ng(reader) => {
                process_pcapng_packets(reader, max, &mut self.frame_number, &mut self.link_type, f)
            }
        }
    }

    /// Process every remaining packet.
    pub fn for_each_packet<F>(&mut self, f: F) -> Result<usize, Error>
    where
        F: FnMut(PacketRef<'_>) -> Result<(), Error>,
    {
        self.process_packets(usize::MAX, f)
    }
}

fn process_legacy_packets<S: Read, F>(
    reader: &mut LegacyPcapReader<S>,
    max: usize,
    nanos: bool,
    frame_number: &mut u64,
    link_type: &mut u32,
    mut f: F,
) -> Result<usize, Error>
where
    F: FnMut(PacketRef<'_>) -> Result<(), Error>,
{
    use pcap_parser::PcapError as PcapParserError;

    let mut count = 0;
    while count < max {
        match reader.next() {
            Ok((offset, block)) => match block {
                PcapBlockOwned::Legacy(packet) => {
                    *frame_number += 1;

                    let timestamp = if nanos {
                        Timestamp::from_nanos(packet.ts_sec, packet.ts_usec)
                    } else {
                        Timestamp::normalized(packet.ts_sec, packet.ts_usec)
                    };

                    f(PacketRef {
                        frame_number: *frame_number,
                        timestamp,
                        captured_len: packet.caplen,
                        original_len: packet.origlen,
                        link_type: *link_type,
                        data: packet.data,
                    })?;

                    // Only consume after callback completes
                    reader.consume(offset);
                    count += 1;
                }
                PcapBlockOwned::LegacyHeader(header) => {
                    *link_type = header.network.0 as u32;
                    reader.consume(offset);
                }
                _ => reader.consume(offset),
            },
            Err(PcapParserError::Eof) => break,
            Err(PcapParserError::UnexpectedEof) => {
                tracing::warn!(frames = *frame_number, "capture ends inside a packet, ignoring the tail");
                break;
            }
            Err(PcapParserError::Incomplete(_)) => {
                reader.refill().map_err(|e| {
                    Error::Pcap(PcapError::InvalidFormat {
                        reason: format!("Legacy PCAP refill error: {}", e),
                    })
                })?;
            }
            Err(e) => {
                return Err(Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("Legacy PCAP parse error: {}", e),
                }));
            }
        }
    }
    Ok(count)
}

fn process_pcapng_packets<S: Read, F>(
    reader: &mut PcapNGReader<S>,
    max: usize,
    frame_number: &mut u64,
    link_type: &mut u32,
    mut f: F,
) -> Result<usize, Error>
where
    F: FnMut(PacketRef<'_>) -> Result<(), Error>,
{
    use pcap_parser::pcapng::Block;
    use pcap_parser::PcapError as PcapParserError;

    let mut count = 0;
    while count < max {
        match reader.next() {
            Ok((offset, block)) => {
                let packet = match block {
                    PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                        *link_type = idb.linktype.0 as u32;
                        None
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                        // Default interface resolution: microseconds
                        let micros = ((epb.ts_high as u64) << 32) | (epb.ts_low as u64);
                        Some((Timestamp::from_micros(micros), epb.caplen, epb.origlen, epb.data))
                    }
                    PcapBlockOwned::NG(Block::SimplePacket(spb)) => Some((
                        Timestamp::default(),
                        spb.data.len() as u32,
                        spb.origlen,
                        spb.data,
                    )),
                    _ => None,
                };

                if let Some((timestamp, captured_len, original_len, data)) = packet {
                    *frame_number += 1;
                    f(PacketRef {
                        frame_number: *frame_number,
                        timestamp,
                        captured_len,
                        original_len,
                        link_type: *link_type,
                        data,
                    })?;
                    count += 1;
                }
                reader.consume(offset);
            }
            Err(PcapParserError::Eof) => break,
            Err(PcapParserError::UnexpectedEof) => {
                tracing::warn!(frames = *frame_number, "capture ends inside a packet, ignoring the tail");
                break;
            }
            Err(PcapParserError::Incomplete(_)) => {
                reader.refill().map_err(|e| {
                    Error::Pcap(PcapError::InvalidFormat {
                        reason: format!("PCAPNG refill error: {}", e),
                    })
                })?;
            }
            Err(e) => {
                return Err(Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("PCAPNG parse error: {}", e),
                }));
            }
        }
    }
    Ok(count)
}
