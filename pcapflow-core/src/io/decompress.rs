//! Transparent decompression of input files.
//!
//! The format is chosen from the file name suffix (`.gz`, `.bz2`), the same
//! way the inputs are named on disk. [`DecompressReader`] wraps the selected
//! decoder and implements `Read`, using enum dispatch instead of a boxed
//! trait object.

use std::io::{self, Read};
use std::path::Path;

#[cfg(feature = "compress-bzip2")]
use bzip2::read::BzDecoder;
#[cfg(feature = "compress-gzip")]
use flate2::read::MultiGzDecoder;

/// Compression format of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No compression
    None,
    /// Gzip (.gz)
    #[cfg(feature = "compress-gzip")]
    Gzip,
    /// Bzip2 (.bz2)
    #[cfg(feature = "compress-bzip2")]
    Bzip2,
}

impl Compression {
    /// Select the format from a file name suffix.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            #[cfg(feature = "compress-gzip")]
            Some("gz") => Compression::Gzip,
            #[cfg(feature = "compress-bzip2")]
            Some("bz2") => Compression::Bzip2,
            _ => Compression::None,
        }
    }

    /// Recognise a compressed stream from its first bytes.
    pub fn detect(data: &[u8]) -> Self {
        match data {
            // Gzip: 1f 8b
            #[cfg(feature = "compress-gzip")]
            [0x1f, 0x8b, ..] => Compression::Gzip,

            // Bzip2: "BZh"
            #[cfg(feature = "compress-bzip2")]
            [0x42, 0x5a, 0x68, ..] => Compression::Bzip2,

            _ => Compression::None,
        }
    }

    /// Check if this represents compressed data.
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Compression::None)
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            #[cfg(feature = "compress-gzip")]
            Compression::Gzip => write!(f, "gzip"),
            #[cfg(feature = "compress-bzip2")]
            Compression::Bzip2 => write!(f, "bzip2"),
        }
    }
}

/// Unified decompression reader.
pub enum DecompressReader<R: Read> {
    /// No compression - pass-through
    None(R),

    /// Gzip decompression (concatenated members are read in sequence)
    #[cfg(feature = "compress-gzip")]
    Gzip(MultiGzDecoder<R>),

    /// Bzip2 decompression
    #[cfg(feature = "compress-bzip2")]
    Bzip2(BzDecoder<R>),
}

impl<R: Read> DecompressReader<R> {
    pub fn new(source: R, compression: Compression) -> Self {
        match compression {
            Compression::None => DecompressReader::None(source),
            #[cfg(feature = "compress-gzip")]
            Compression::Gzip => DecompressReader::Gzip(MultiGzDecoder::new(source)),
            #[cfg(feature = "compress-bzip2")]
            Compression::Bzip2 => DecompressReader::Bzip2(BzDecoder::new(source)),
        }
    }

    /// Get the compression format this reader handles.
    pub fn compression(&self) -> Compression {
        match self {
            DecompressReader::None(_) => Compression::None,
            #[cfg(feature = "compress-gzip")]
            DecompressReader::Gzip(_) => Compression::Gzip,
            #[cfg(feature = "compress-bzip2")]
            DecompressReader::Bzip2(_) => Compression::Bzip2,
        }
    }
}

impl<R: Read> Read for DecompressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DecompressReader::None(r) => r.read(buf),
            #[cfg(feature = "compress-gzip")]
            DecompressReader::Gzip(r) => r.read(buf),
            #[cfg(feature = "compress-bzip2")]
            DecompressReader::Bzip2(r) => r.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use super::*;

    #[test]
    fn test_from_path() {
        assert_eq!(Compression::from_path(Path::new("trace.pcap")), Compression::None);
        assert_eq!(Compression::from_path(Path::new("trace.pcap.gz")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("trace.pcap.bz2")), Compression::Bzip2);
        assert_eq!(Compression::from_path(Path::new("-")), Compression::None);
        assert_eq!(Compression::from_path(Path::new("gz")), Compression::None);
    }

    #[test]
    fn test_detect() {
        assert_eq!(Compression::detect(&[0x1f, 0x8b, 0x08]), Compression::Gzip);
        assert_eq!(Compression::detect(&[0x42, 0x5a, 0x68, 0x39]), Compression::Bzip2);
        assert_eq!(Compression::detect(&[0xd4, 0xc3, 0xb2, 0xa1]), Compression::None);
        assert_eq!(Compression::detect(&[]), Compression::None);
    }

    #[test]
    fn test_compression_display() {
        assert_eq!(format!("{}", Compression::None), "none");
        assert_eq!(format!("{}", Compression::Gzip), "gzip");
        assert!(!Compression::None.is_compressed());
        assert!(Compression::Bzip2.is_compressed());
    }

    #[test]
    fn test_gzip_round_trip() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"flow records").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut reader = DecompressReader::new(Cursor::new(compressed), Compression::Gzip);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "flow records");
        assert_eq!(reader.compression(), Compression::Gzip);
    }

    #[test]
    fn test_gzip_concatenated_members() {
        let mut data = Vec::new();
        for part in [b"abc".as_slice(), b"def".as_slice()] {
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
            encoder.write_all(part).unwrap();
            data.extend(encoder.finish().unwrap());
        }

        let mut reader = DecompressReader::new(Cursor::new(data), Compression::Gzip);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abcdef");
    }

    #[test]
    fn test_passthrough() {
        let mut reader = DecompressReader::new(Cursor::new(b"raw".to_vec()), Compression::None);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"raw");
    }
}
