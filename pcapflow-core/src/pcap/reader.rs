//! Capture file reader with automatic decompression.

use std::io::{Chain, Cursor, Read};
use std::path::Path;

use crate::error::{Error, PcapError};
use crate::io::{open_input, GenericPcapReader, InputReader, PacketRef, PcapFormat};

type CaptureStream = Chain<Cursor<[u8; 4]>, InputReader>;

/// Reader for PCAP and PCAPNG files, with optional decompression.
///
/// Compression is chosen by file suffix (`.gz`, `.bz2`) and the capture
/// format by the magic number of the decompressed stream. The magic is read
/// once and chained back in front of the stream, so standard input (`-`)
/// works the same as a file.
///
/// # Example
///
/// ```ignore
/// use pcapflow_core::pcap::CaptureReader;
///
/// let mut reader = CaptureReader::open("capture.pcap.gz")?;
/// reader.for_each_packet(|packet| {
///     println!("Frame {}: {} bytes", packet.frame_number, packet.data.len());
///     Ok(())
/// })?;
/// ```
pub struct CaptureReader {
    inner: GenericPcapReader<CaptureStream>,
}

impl CaptureReader {
    /// Open a capture file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let mut input = open_input(path)?;

        let mut magic = [0u8; 4];
        input.read_exact(&mut magic).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::Pcap(PcapError::InvalidFormat {
                reason: format!("{}: file too short to read magic number", path.display()),
            }),
            _ => Error::file(path, e),
        })?;

        let format = PcapFormat::detect(&magic)?;
        tracing::debug!(path = %path.display(), ?format, "detected capture format");

        let inner = GenericPcapReader::with_format(Cursor::new(magic).chain(input), format)?;
        Ok(CaptureReader { inner })
    }

    pub fn format(&self) -> PcapFormat {
        self.inner.format()
    }

    /// Get the link type of the capture (e.g., 1 = Ethernet).
    #[inline]
    pub fn link_type(&self) -> u32 {
        self.inner.link_type()
    }

    /// Get the current frame count.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.inner.frame_count()
    }

    /// Process up to `max` packets with zero-copy borrowed data.
    #[inline]
    pub fn process_packets<F>(&mut self, max: usize, f: F) -> Result<usize, Error>
    where
        F: FnMut(PacketRef<'_>) -> Result<(), Error>,
    {
        self.inner.process_packets(max, f)
    }

    /// Process every remaining packet.
    pub fn for_each_packet<F>(&mut self, f: F) -> Result<usize, Error>
    where
        F: FnMut(PacketRef<'_>) -> Result<(), Error>,
    {
        self.inner.for_each_packet(f)
    }
}
