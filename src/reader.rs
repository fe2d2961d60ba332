use core::fmt;
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use derive_new::new;
use thiserror::Error;

use crate::error::FileRange;

/// Byte order committed to a [`Reader`] after the magic probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ReadErrorCode {
    #[error("unknown read failure")]
    Unknown,

    #[error("out of memory")]
    OutOfMemory,

    #[error("file not found")]
    FileNotFound,

    #[error("I/O failure")]
    Io,
}

/// Failure raised by the reader, carrying the `{offset, size}` of the
/// failing read when one was attempted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, new)]
pub struct ReadError {
    pub code: ReadErrorCode,
    pub range: Option<FileRange>,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.range {
            Some(range) => write!(f, "{} at {}", self.code, range),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for ReadError {}

/// Positioned reader over a BTF blob.
///
/// The cursor is an absolute byte offset; multi-byte reads honor the
/// endianness committed with [`Reader::set_endianness`]. Seeking never
/// fails, out-of-range positions surface on the next read.
#[derive(Debug)]
pub struct Reader<'d> {
    data: Cow<'d, [u8]>,
    pos: u64,
    endian: Endianness,
}

impl<'d> Reader<'d> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Reader<'static>, ReadError> {
        let data = fs::read(path).map_err(|err| {
            let code = match err.kind() {
                io::ErrorKind::NotFound => ReadErrorCode::FileNotFound,
                io::ErrorKind::OutOfMemory => ReadErrorCode::OutOfMemory,
                _ => ReadErrorCode::Io,
            };

            ReadError::new(code, None)
        })?;

        Ok(Reader {
            data: Cow::Owned(data),
            pos: 0,
            endian: Endianness::Little,
        })
    }

    pub fn from_bytes(data: &'d [u8]) -> Reader<'d> {
        Reader {
            data: Cow::Borrowed(data),
            pos: 0,
            endian: Endianness::Little,
        }
    }

    pub fn seek(&mut self, offset: u64) {
        self.pos = offset;
    }

    pub fn offset(&self) -> u64 {
        self.pos
    }

    pub fn set_endianness(&mut self, endian: Endianness) {
        self.endian = endian;
    }

    pub fn endianness(&self) -> Endianness {
        self.endian
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn take(&mut self, size: usize) -> Result<&[u8], ReadError> {
        let range = FileRange::new(self.pos, size as u64);
        let eof = ReadError::new(ReadErrorCode::Io, Some(range));

        let start = usize::try_from(self.pos).map_err(|_| eof)?;
        let end = start.checked_add(size).ok_or(eof)?;

        if end > self.data.len() {
            return Err(eof);
        }

        self.pos += size as u64;

        Ok(&self.data[start..end])
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        self.take(1).map(|bytes| bytes[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        let endian = self.endian;
        let bytes = self.take(2)?;

        Ok(match endian {
            Endianness::Little => LittleEndian::read_u16(bytes),
            Endianness::Big => BigEndian::read_u16(bytes),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        let endian = self.endian;
        let bytes = self.take(4)?;

        Ok(match endian {
            Endianness::Little => LittleEndian::read_u32(bytes),
            Endianness::Big => BigEndian::read_u32(bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_honor_endianness() {
        let mut r = Reader::from_bytes(&[0x9f, 0xeb, 0x01, 0x00, 0x00, 0x00]);

        assert_eq!(r.read_u16(), Ok(0xeb9f));

        r.seek(0);
        r.set_endianness(Endianness::Big);
        assert_eq!(r.read_u16(), Ok(0x9feb));

        r.seek(2);
        assert_eq!(r.read_u32(), Ok(0x0100_0000));

        r.seek(2);
        r.set_endianness(Endianness::Little);
        assert_eq!(r.read_u32(), Ok(1));
    }

    #[test]
    fn seek_and_offset_are_symmetric() {
        let mut r = Reader::from_bytes(&[1, 2, 3, 4]);

        assert_eq!(r.offset(), 0);
        r.seek(3);
        assert_eq!(r.offset(), 3);
        assert_eq!(r.read_u8(), Ok(4));
        assert_eq!(r.offset(), 4);
    }

    #[test]
    fn read_past_end_reports_failing_range() {
        let mut r = Reader::from_bytes(&[1, 2]);

        r.seek(1);
        let err = r.read_u32().unwrap_err();

        assert_eq!(err.code, ReadErrorCode::Io);
        assert_eq!(err.range, Some(FileRange::new(1, 4)));
        // the cursor stays put on failure
        assert_eq!(r.offset(), 1);
    }

    #[test]
    fn open_missing_file_maps_to_file_not_found() {
        let err = Reader::open("/nonexistent/btf.bin").unwrap_err();

        assert_eq!(err.code, ReadErrorCode::FileNotFound);
        assert_eq!(err.range, None);
    }
}
