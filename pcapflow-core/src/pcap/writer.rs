//! Classic (libpcap) capture file writer.
//!
//! Files are written little-endian with microsecond timestamps. Opening an
//! existing file in append mode adds packet records after the existing ones
//! without writing a second global header.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::record::Timestamp;

const MAGIC_MICROS: u32 = 0xa1b2c3d4;
const VERSION_MAJOR: u16 = 2;
const VERSION_MINOR: u16 = 4;

/// Writes packets to a classic pcap file.
pub struct PcapWriter<W: Write> {
    out: W,
    snaplen: u32,
    packets: u64,
}

impl PcapWriter<BufWriter<File>> {
    /// Create (or truncate) `path` and write the global header.
    pub fn create(path: &Path, link_type: u32, snaplen: u32) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::file(path, e))?;
        let mut writer = PcapWriter::new(BufWriter::new(file), snaplen);
        writer
            .write_header(link_type)
            .map_err(|e| Error::file(path, e))?;
        Ok(writer)
    }

    /// Open `path` for appending; a missing or empty file gets a fresh header.
    pub fn append(path: &Path, link_type: u32, snaplen: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::file(path, e))?;
        let existing = file.metadata().map_err(|e| Error::file(path, e))?.len();

        let mut writer = PcapWriter::new(BufWriter::new(file), snaplen);
        if existing == 0 {
            writer
                .write_header(link_type)
                .map_err(|e| Error::file(path, e))?;
        }
        Ok(writer)
    }
}

impl<W: Write> PcapWriter<W> {
    /// Wrap a writer without emitting a header.
    pub fn new(out: W, snaplen: u32) -> Self {
        PcapWriter {
            out,
            snaplen: snaplen.max(1),
            packets: 0,
        }
    }

    /// Emit the 24-byte global header.
    pub fn write_header(&mut self, link_type: u32) -> std::io::Result<()> {
        let mut header = [0u8; 24];
        header[0..4].copy_from_slice(&MAGIC_MICROS.to_le_bytes());
        header[4..6].copy_from_slice(&VERSION_MAJOR.to_le_bytes());
        header[6..8].copy_from_slice(&VERSION_MINOR.to_le_bytes());
        // thiszone and sigfigs stay zero
        header[16..20].copy_from_slice(&self.snaplen.to_le_bytes());
        header[20..24].copy_from_slice(&link_type.to_le_bytes());
        self.out.write_all(&header)
    }

    /// Append one packet. Data beyond the snap length is cut.
    pub fn write_packet(&mut self, time: Timestamp, data: &[u8], original_len: u32) -> Result<()> {
        let caplen = data.len().min(self.snaplen as usize);
        let mut header = [0u8; 16];
        header[0..4].copy_from_slice(&time.sec.to_le_bytes());
        header[4..8].copy_from_slice(&time.usec.to_le_bytes());
        header[8..12].copy_from_slice(&(caplen as u32).to_le_bytes());
        header[12..16].copy_from_slice(&original_len.max(caplen as u32).to_le_bytes());
        self.out.write_all(&header)?;
        self.out.write_all(&data[..caplen])?;
        self.packets += 1;
        Ok(())
    }

    pub fn packets_written(&self) -> u64 {
        self.packets
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}
