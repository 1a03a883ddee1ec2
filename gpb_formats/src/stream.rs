use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::{Mmap, MmapOptions};

use crate::error::{GpbError, Result};

/// Strings at or above this length are treated as corruption.
pub const MAX_STRING_LENGTH: u32 = 5000;

/// Seekable little-endian reader shared by every decoder in a load session.
///
/// All reads are exact: a short read is reported as [`GpbError::Truncated`]
/// and length-prefixed payloads are checked against the remaining bytes
/// before any buffer is allocated.
#[derive(Debug)]
pub struct BundleStream<R> {
    inner: R,
    len: u64,
}

impl BundleStream<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| GpbError::NotFound {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(BufReader::new(file))
    }
}

impl BundleStream<Cursor<Mmap>> {
    pub fn open_mapped<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| GpbError::NotFound {
            path: path.to_path_buf(),
            source,
        })?;
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|source| GpbError::Io {
            what: "memory-mapping bundle",
            source,
        })?;
        Self::new(Cursor::new(mmap))
    }
}

impl<R: Read + Seek> BundleStream<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner
            .seek(SeekFrom::End(0))
            .map_err(|source| GpbError::from_io(source, "measuring stream length", 0))?;
        inner
            .seek(SeekFrom::Start(0))
            .map_err(|source| GpbError::from_io(source, "rewinding stream", 0))?;
        Ok(Self { inner, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&mut self) -> Result<u64> {
        self.inner
            .stream_position()
            .map_err(|source| GpbError::Io {
                what: "querying stream position",
                source,
            })
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(offset))
            .map(|_| ())
            .map_err(|source| GpbError::from_io(source, "seeking", offset))
    }

    /// Advances the cursor by `count` bytes, failing if that passes the end.
    pub fn skip(&mut self, count: u64, what: &'static str) -> Result<()> {
        self.ensure_available(count, what)?;
        let delta = i64::try_from(count).map_err(|_| GpbError::Truncated {
            what,
            offset: self.len,
        })?;
        self.inner
            .seek(SeekFrom::Current(delta))
            .map(|_| ())
            .map_err(|source| self.io_error(source, what))
    }

    pub fn read_u8(&mut self, what: &'static str) -> Result<u8> {
        self.inner.read_u8().map_err(|source| self.io_error(source, what))
    }

    pub fn read_u32(&mut self, what: &'static str) -> Result<u32> {
        self.inner
            .read_u32::<LittleEndian>()
            .map_err(|source| self.io_error(source, what))
    }

    pub fn read_f32(&mut self, what: &'static str) -> Result<f32> {
        self.inner
            .read_f32::<LittleEndian>()
            .map_err(|source| self.io_error(source, what))
    }

    /// Reads a `u32`-as-bool flag (any non-zero value is true).
    pub fn read_bool32(&mut self, what: &'static str) -> Result<bool> {
        Ok(self.read_u32(what)? != 0)
    }

    pub fn read_vec3(&mut self, what: &'static str) -> Result<[f32; 3]> {
        Ok([
            self.read_f32(what)?,
            self.read_f32(what)?,
            self.read_f32(what)?,
        ])
    }

    /// Reads sixteen floats in file order (column-major, as authored).
    pub fn read_matrix(&mut self, what: &'static str) -> Result<[f32; 16]> {
        self.ensure_available(64, what)?;
        let mut matrix = [0.0f32; 16];
        self.inner
            .read_f32_into::<LittleEndian>(&mut matrix)
            .map_err(|source| self.io_error(source, what))?;
        Ok(matrix)
    }

    pub fn read_bytes(&mut self, count: usize, what: &'static str) -> Result<Vec<u8>> {
        self.ensure_available(count as u64, what)?;
        let mut buf = vec![0u8; count];
        self.inner
            .read_exact(&mut buf)
            .map_err(|source| self.io_error(source, what))?;
        Ok(buf)
    }

    pub fn read_u32_array(&mut self, count: u32, what: &'static str) -> Result<Vec<u32>> {
        self.ensure_available(u64::from(count) * 4, what)?;
        let mut values = vec![0u32; count as usize];
        self.inner
            .read_u32_into::<LittleEndian>(&mut values)
            .map_err(|source| self.io_error(source, what))?;
        Ok(values)
    }

    pub fn read_f32_array(&mut self, count: u64, what: &'static str) -> Result<Vec<f32>> {
        self.ensure_available(count.saturating_mul(4), what)?;
        let mut values = vec![0f32; count as usize];
        self.inner
            .read_f32_into::<LittleEndian>(&mut values)
            .map_err(|source| self.io_error(source, what))?;
        Ok(values)
    }

    /// Reads a `{length:u32, bytes}` string.
    pub fn read_string(&mut self, what: &'static str) -> Result<String> {
        let length = self.read_string_length(what)?;
        if length == 0 {
            return Ok(String::new());
        }
        let bytes = self.read_bytes(length as usize, what)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Consumes a `{length:u32, bytes}` string without materialising it.
    pub fn skip_string(&mut self, what: &'static str) -> Result<()> {
        let length = self.read_string_length(what)?;
        self.skip(u64::from(length), what)
    }

    /// Runs `f` and puts the cursor back where it was, on success and failure.
    ///
    /// If `f` fails its error is returned even when the restore also fails.
    pub fn with_restored_position<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let saved = self.position()?;
        let outcome = f(self);
        let restored = self.inner.seek(SeekFrom::Start(saved));
        match (outcome, restored) {
            (Err(err), _) => Err(err),
            (Ok(_), Err(source)) => Err(GpbError::SeekRestoreFailed {
                position: saved,
                source,
            }),
            (Ok(value), Ok(_)) => Ok(value),
        }
    }

    fn read_string_length(&mut self, what: &'static str) -> Result<u32> {
        let offset = self.position()?;
        let length = self.read_u32(what)?;
        if length >= MAX_STRING_LENGTH {
            return Err(GpbError::CorruptString {
                offset,
                length,
                max: MAX_STRING_LENGTH,
            });
        }
        Ok(length)
    }

    fn ensure_available(&mut self, count: u64, what: &'static str) -> Result<()> {
        let offset = self.position()?;
        match offset.checked_add(count) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(GpbError::Truncated { what, offset }),
        }
    }

    fn io_error(&mut self, source: io::Error, what: &'static str) -> GpbError {
        let offset = self.inner.stream_position().unwrap_or(self.len);
        GpbError::from_io(source, what, offset)
    }
}
