//! Decoder for the BPF Type Format (BTF), the compact debug-info
//! encoding eBPF tooling uses to relate numeric type ids to C-level
//! type descriptions.
//!
//! ```no_run
//! let btf = btfparse::parse_file("vmlinux.btf")?;
//!
//! for (idx, ty) in btf.iter().enumerate() {
//!     println!("[{}] {:?}", idx + 1, ty);
//! }
//! # Ok::<(), btfparse::Error>(())
//! ```

mod error;
pub mod file;
mod reader;
mod ty;

pub use self::error::{Error, ErrorKind, FileRange};
pub use self::reader::{Endianness, ReadError, ReadErrorCode, Reader};
pub use self::ty::{Btf, EnumValue, Member, Param, Type};

use std::path::Path;

/// Decodes a BTF blob held in memory.
pub fn parse(b: &[u8]) -> Result<Btf, Error> {
    Btf::parse(b)
}

/// Opens and decodes a BTF file.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Btf, Error> {
    Btf::parse_file(path)
}
