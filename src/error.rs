use core::fmt;

use derive_new::new;
use thiserror::Error;

use crate::reader::{ReadError, ReadErrorCode};

/// Byte range of the input a diagnostic refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, new)]
pub struct FileRange {
    pub offset: u64,
    pub size: u64,
}

impl fmt::Display for FileRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{:#x}, +{})", self.offset, self.size)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("unknown error")]
    Unknown,

    #[error("memory allocation failure")]
    MemoryAllocationFailure,

    #[error("file not found")]
    FileNotFound,

    #[error("I/O error")]
    Io,

    #[error("invalid magic value")]
    InvalidMagicValue,

    #[error("invalid BTF kind")]
    InvalidBtfKind,

    #[error("invalid int type encoding")]
    InvalidIntEncoding,

    #[error("invalid ptr type encoding")]
    InvalidPtrEncoding,

    #[error("invalid array type encoding")]
    InvalidArrayEncoding,

    #[error("invalid typedef type encoding")]
    InvalidTypedefEncoding,

    #[error("invalid enum type encoding")]
    InvalidEnumEncoding,

    #[error("invalid func_proto type encoding")]
    InvalidFuncProtoEncoding,

    #[error("invalid volatile type encoding")]
    InvalidVolatileEncoding,

    #[error("invalid fwd type encoding")]
    InvalidFwdEncoding,

    #[error("invalid func type encoding")]
    InvalidFuncEncoding,
}

/// Decoding error: a code plus, when known, the byte range of the input
/// that triggered it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, new)]
pub struct Error {
    kind: ErrorKind,
    range: Option<FileRange>,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn file_range(&self) -> Option<FileRange> {
        self.range
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.range {
            Some(range) => write!(f, "{} at {}", self.kind, range),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {}

impl From<ReadError> for Error {
    fn from(err: ReadError) -> Self {
        let kind = match err.code {
            ReadErrorCode::Unknown => ErrorKind::Unknown,
            ReadErrorCode::OutOfMemory => ErrorKind::MemoryAllocationFailure,
            ReadErrorCode::FileNotFound => ErrorKind::FileNotFound,
            ReadErrorCode::Io => ErrorKind::Io,
        };

        Error::new(kind, err.range)
    }
}
