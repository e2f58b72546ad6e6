//! Input plumbing: opening (possibly compressed) files, streaming capture
//! packets, and memory-mapped record files.
//!
//! ## Layer stack
//!
//! ```text
//! GenericPcapReader / RecordReader
//!     └── DecompressReader   (gzip / bzip2 by file suffix)
//!             └── InputSource (file or stdin)
//! ```

mod decompress;
mod mmap;
mod pcap_stream;

use std::fs::File;
use std::io::{self, Read, Stdin};
use std::path::Path;

use crate::error::{Error, Result};
use crate::record::Timestamp;

pub use decompress::{Compression, DecompressReader};
pub use mmap::{RecordMap, RecordMapMut};
pub use pcap_stream::{GenericPcapReader, PcapFormat};

/// The path that names standard input.
pub const STDIN_PATH: &str = "-";

/// Borrowed view of one captured frame.
///
/// `data` points into the parser's buffer and is only valid for the
/// duration of the callback it is passed to.
#[derive(Debug, Clone, Copy)]
pub struct PacketRef<'a> {
    /// 1-based position in the capture
    pub frame_number: u64,
    pub timestamp: Timestamp,
    pub captured_len: u32,
    /// Length on the wire, before any snap-length truncation
    pub original_len: u32,
    /// Link-layer header type of the interface
    pub link_type: u32,
    pub data: &'a [u8],
}

/// Raw byte source behind an [`InputReader`].
pub enum InputSource {
    Stdin(Stdin),
    File(File),
}

impl Read for InputSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            InputSource::Stdin(s) => s.read(buf),
            InputSource::File(f) => f.read(buf),
        }
    }
}

/// A decompressed input stream.
pub type InputReader = DecompressReader<InputSource>;

/// Open `path` for reading, decompressing according to its suffix.
///
/// `-` reads standard input uncompressed.
pub fn open_input(path: &Path) -> Result<InputReader> {
    if path.as_os_str() == STDIN_PATH {
        return Ok(DecompressReader::new(
            InputSource::Stdin(io::stdin()),
            Compression::None,
        ));
    }

    let file = File::open(path).map_err(|e| Error::file(path, e))?;
    let compression = Compression::from_path(path);
    tracing::debug!(path = %path.display(), %compression, "opened input");
    Ok(DecompressReader::new(InputSource::File(file), compression))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_open_input_plain_and_gzip() {
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("data.bin");
        std::fs::write(&plain, b"hello").unwrap();
        let mut out = Vec::new();
        open_input(&plain).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");

        let gz = dir.path().join("data.bin.gz");
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"hello").unwrap();
        std::fs::write(&gz, encoder.finish().unwrap()).unwrap();
        let mut out = Vec::new();
        let mut reader = open_input(&gz).unwrap();
        assert_eq!(reader.compression(), Compression::Gzip);
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_open_input_missing() {
        match open_input(Path::new("/no/such/input.pcap")) {
            Err(Error::File { path, .. }) => assert_eq!(path, Path::new("/no/such/input.pcap")),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected failure"),
        }
    }
}
