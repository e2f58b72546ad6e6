//! Sequential record readers and writers.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;

use zerocopy::IntoBytes;

use super::{decode_record, Record};
use crate::error::{Error, Result};
use crate::io::{open_input, InputReader};

/// Streams fixed-size records out of any `Read`.
///
/// A clean end of input yields `Ok(None)`. Input that ends part-way through a
/// record is reported as [`Error::TruncatedRecord`] so that damaged files are
/// never silently shortened.
pub struct RecordReader<R, T> {
    inner: R,
    buf: Vec<u8>,
    records: u64,
    _record: PhantomData<T>,
}

impl<T: Record> RecordReader<InputReader, T> {
    /// Open a record file, decompressing by suffix; `-` reads stdin.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(open_input(path.as_ref())?))
    }
}

impl<R: Read, T: Record> RecordReader<R, T> {
    pub fn new(inner: R) -> Self {
        RecordReader {
            inner,
            buf: vec![0u8; T::SIZE],
            records: 0,
            _record: PhantomData,
        }
    }

    /// Number of whole records read so far.
    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// Read the next record.
    pub fn read_next(&mut self) -> Result<Option<T>> {
        let mut filled = 0;
        while filled < T::SIZE {
            match self.inner.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        match filled {
            0 => Ok(None),
            n if n < T::SIZE => Err(Error::TruncatedRecord {
                kind: T::KIND,
                expected: T::SIZE,
                actual: n,
            }),
            _ => {
                self.records += 1;
                decode_record(&self.buf).map(Some)
            }
        }
    }
}

impl<R: Read, T: Record> Iterator for RecordReader<R, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

/// Appends fixed-size records to any `Write`.
pub struct RecordWriter<W: Write, T> {
    inner: W,
    records: u64,
    _record: PhantomData<T>,
}

impl<T: Record> RecordWriter<BufWriter<File>, T> {
    /// Create (or truncate) a record file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::file(path, e))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write, T: Record> RecordWriter<W, T> {
    pub fn new(inner: W) -> Self {
        RecordWriter {
            inner,
            records: 0,
            _record: PhantomData,
        }
    }

    pub fn write(&mut self, record: &T) -> Result<()> {
        self.inner.write_all(record.to_wire().as_bytes())?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
