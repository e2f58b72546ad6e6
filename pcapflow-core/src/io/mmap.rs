//! Memory-mapped views over record files.
//!
//! Record files are flat arrays of fixed-size, alignment-free records, so a
//! mapping can be reinterpreted in place as `&[T::Wire]` (or `&mut` for the
//! in-place sorter and renumberer). The OS handles caching and paging; the
//! files are not read into memory up front.
//!
//! Empty files are accepted without mapping. A length that is not a whole
//! number of records is reported as [`Error::Corruption`].

use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};
use zerocopy::FromBytes;

use crate::error::{Error, Result};
use crate::record::Record;

fn check_length<T: Record>(path: &Path, len: u64) -> Result<()> {
    if len % T::SIZE as u64 != 0 {
        return Err(Error::corruption(
            path,
            format!(
                "length {} is not a multiple of the {}-byte {} record",
                len,
                T::SIZE,
                T::KIND
            ),
        ));
    }
    Ok(())
}

/// Read-only mapped record file.
pub struct RecordMap<T: Record> {
    path: PathBuf,
    mmap: Option<Mmap>,
    _record: PhantomData<T>,
}

impl<T: Record> RecordMap<T> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| Error::file(&path, e))?;
        let len = file.metadata().map_err(|e| Error::file(&path, e))?.len();
        check_length::<T>(&path, len)?;

        let mmap = if len == 0 {
            None
        } else {
            // Safety: the file is opened read-only and callers are expected not
            // to truncate it while the map is alive.
            Some(unsafe { Mmap::map(&file) }.map_err(|e| Error::file(&path, e))?)
        };

        Ok(RecordMap {
            path,
            mmap,
            _record: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The mapped records.
    pub fn records(&self) -> Result<&[T::Wire]> {
        let bytes: &[u8] = self.mmap.as_deref().unwrap_or(&[]);
        <[T::Wire]>::ref_from_bytes(bytes)
            .map_err(|_| Error::corruption(&self.path, "mapping is not a whole number of records"))
    }

    pub fn len(&self) -> usize {
        self.mmap.as_ref().map_or(0, |m| m.len() / T::SIZE)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-write mapped record file. Changes reach the file on [`flush`](Self::flush)
/// or when the map is dropped.
pub struct RecordMapMut<T: Record> {
    path: PathBuf,
    mmap: Option<MmapMut>,
    _record: PhantomData<T>,
}

impl<T: Record> RecordMapMut<T> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::file(&path, e))?;
        let len = file.metadata().map_err(|e| Error::file(&path, e))?.len();
        check_length::<T>(&path, len)?;

        let mmap = if len == 0 {
            None
        } else {
            // Safety: as for `RecordMap`; the map is the only writer.
            Some(unsafe { MmapMut::map_mut(&file) }.map_err(|e| Error::file(&path, e))?)
        };

        Ok(RecordMapMut {
            path,
            mmap,
            _record: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> Result<&[T::Wire]> {
        let bytes: &[u8] = self.mmap.as_deref().unwrap_or(&[]);
        <[T::Wire]>::ref_from_bytes(bytes)
            .map_err(|_| Error::corruption(&self.path, "mapping is not a whole number of records"))
    }

    /// The mapped records, writable in place.
    pub fn records_mut(&mut self) -> Result<&mut [T::Wire]> {
        let bytes: &mut [u8] = match self.mmap.as_deref_mut() {
            Some(bytes) => bytes,
            None => &mut [],
        };
        <[T::Wire]>::mut_from_bytes(bytes)
            .map_err(|_| Error::corruption(&self.path, "mapping is not a whole number of records"))
    }

    pub fn len(&self) -> usize {
        self.mmap.as_ref().map_or(0, |m| m.len() / T::SIZE)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write dirty pages back to the file.
    pub fn flush(&self) -> Result<()> {
        if let Some(mmap) = &self.mmap {
            mmap.flush().map_err(|e| Error::file(&self.path, e))?;
        }
        Ok(())
    }
}
