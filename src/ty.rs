use std::path::Path;
use std::slice;

use derive_more::IsVariant;
use log::{debug, trace};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::error::{Error, ErrorKind, FileRange};
use crate::file::{self, Kind, ReadExt};
use crate::reader::Reader;

/// A decoded type entry.
///
/// `Void` is never produced by the type-section decoder; it backs the
/// reserved type id 0 in [`Btf::type_by_id`].
#[derive(Debug, Clone, PartialEq, IsVariant)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")
)]
pub enum Type {
    Void,
    Int {
        name: String,
        size: usize,
        bits_offset: usize,
        nr_bits: usize,
        encoding: file::IntEncoding,
    },
    Ptr {
        type_id: u32,
    },
    Array {
        elem_type_id: u32,
        index_type_id: u32,
        nr_elems: u32,
    },
    Struct {
        name: Option<String>,
        size: usize,
        members: Vec<Member>,
    },
    Union {
        name: Option<String>,
        size: usize,
        members: Vec<Member>,
    },
    Enum {
        name: Option<String>,
        size: usize,
        values: Vec<EnumValue>,
    },
    Fwd {
        name: String,
        is_union: bool,
    },
    Typedef {
        name: String,
        type_id: u32,
    },
    Volatile {
        type_id: u32,
    },
    Const {
        type_id: u32,
    },
    Func {
        name: String,
        type_id: u32,
    },
    FuncProto {
        ret_type_id: u32,
        params: Vec<Param>,
        variadic: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Member {
    pub name: Option<String>,
    pub type_id: u32,
    pub bits_offset: u32,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "size_is_zero"))]
    pub bitfield_size: u32,
}

#[cfg(feature = "serde")]
fn size_is_zero(n: &u32) -> bool {
    *n == 0
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EnumValue {
    pub name: String,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Param {
    pub name: Option<String>,
    pub type_id: u32,
}

impl Param {
    /// The trailing synthetic parameter a compiler appends to mark a
    /// variadic prototype.
    pub fn is_variadic_marker(&self) -> bool {
        self.name.is_none() && self.type_id == 0
    }
}

static VOID: Type = Type::Void;

/// Catalog of decoded type entries, in type-section order.
///
/// Ids are 1-based: the entry decoded first has id 1. Id 0 is reserved
/// for `void`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Btf {
    types: Vec<Type>,
}

impl Btf {
    pub fn parse(bytes: &[u8]) -> Result<Btf, Error> {
        Self::from_reader(&mut Reader::from_bytes(bytes))
    }

    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Btf, Error> {
        Self::from_reader(&mut Reader::open(path)?)
    }

    pub fn from_reader(r: &mut Reader) -> Result<Btf, Error> {
        let endian = file::Header::detect_endianness(r)?;
        r.set_endianness(endian);

        let header = file::Header::read(r)?;
        debug!("decoding {:?} BTF, header {:?}", endian, header);

        let end = header.type_section_end();
        let strs = header.string_section_start();

        let mut types = Vec::new();

        r.seek(header.type_section_start());

        while r.offset() < end {
            let ty = read_type(r, strs)?;
            trace!("[{}] {:?}", types.len() + 1, ty);
            types.push(ty);
        }

        Ok(Btf { types })
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }

    /// Looks up an entry by its 1-based id; id 0 resolves to [`Type::Void`].
    pub fn type_by_id(&self, type_id: u32) -> Option<&Type> {
        if type_id == 0 {
            Some(&VOID)
        } else {
            self.types.get(type_id as usize - 1)
        }
    }

    pub fn iter(&self) -> slice::Iter<'_, Type> {
        self.types.iter()
    }
}

impl<'a> IntoIterator for &'a Btf {
    type Item = &'a Type;
    type IntoIter = slice::Iter<'a, Type>;

    fn into_iter(self) -> Self::IntoIter {
        self.types.iter()
    }
}

fn read_type(r: &mut Reader, strs: u64) -> Result<Type, Error> {
    let hdr = file::TypeHeader::read(r)?;
    let start = r.offset() - file::TypeHeader::SIZE;

    let kind = Kind::from_value(hdr.kind_value()).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidBtfKind,
            Some(FileRange::new(start, file::TypeHeader::SIZE)),
        )
    })?;

    // diagnostics for this entry span its header and trailer
    let range = FileRange::new(start, hdr.entry_size(kind));

    match kind {
        Kind::Int => read_int(r, strs, &hdr, range),
        Kind::Ptr => {
            read_ref(&hdr, range, ErrorKind::InvalidPtrEncoding).map(|type_id| Type::Ptr { type_id })
        }
        Kind::Array => read_array(r, &hdr, range),
        Kind::Struct => Ok(Type::Struct {
            name: file::read_str(r, strs, hdr.name_off)?,
            size: hdr.size(),
            members: read_members(r, strs, &hdr)?,
        }),
        Kind::Union => Ok(Type::Union {
            name: file::read_str(r, strs, hdr.name_off)?,
            size: hdr.size(),
            members: read_members(r, strs, &hdr)?,
        }),
        Kind::Enum => read_enum(r, strs, &hdr, range),
        Kind::Fwd => read_fwd(r, strs, &hdr, range),
        Kind::Typedef => read_typedef(r, strs, &hdr, range),
        Kind::Volatile => read_ref(&hdr, range, ErrorKind::InvalidVolatileEncoding)
            .map(|type_id| Type::Volatile { type_id }),
        Kind::Const => read_ref(&hdr, range, ErrorKind::InvalidVolatileEncoding)
            .map(|type_id| Type::Const { type_id }),
        Kind::Func => read_func(r, strs, &hdr, range),
        Kind::FuncProto => read_func_proto(r, strs, &hdr, range),
    }
}

/// Resolves a name field that the kind requires to be present and
/// non-empty.
fn required_name(
    r: &mut Reader,
    strs: u64,
    name_off: u32,
    invalid: Error,
) -> Result<String, Error> {
    match file::read_str(r, strs, name_off)? {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(invalid),
    }
}

fn read_int(
    r: &mut Reader,
    strs: u64,
    hdr: &file::TypeHeader,
    range: FileRange,
) -> Result<Type, Error> {
    let invalid = Error::new(ErrorKind::InvalidIntEncoding, Some(range));

    if hdr.kflag() || hdr.vlen() != 0 {
        return Err(invalid);
    }

    let size = hdr.size();

    if !matches!(size, 1 | 2 | 4 | 8 | 16) {
        return Err(invalid);
    }

    let name = required_name(r, strs, hdr.name_off, invalid)?;

    let int = file::Int::read(r)?;
    let encoding = int.encoding();

    // signed / char / bool are mutually exclusive
    if encoding.bits().count_ones() > 1 {
        return Err(invalid);
    }

    let nr_bits = int.bits();
    let bits_offset = int.offset();

    if nr_bits > 128 || nr_bits > size * 8 || bits_offset + nr_bits > size * 8 {
        return Err(invalid);
    }

    Ok(Type::Int {
        name,
        size,
        bits_offset,
        nr_bits,
        encoding,
    })
}

/// Shared decoder for the bare reference kinds (ptr and the const /
/// volatile qualifiers): no name, no flags, no trailer.
fn read_ref(hdr: &file::TypeHeader, range: FileRange, code: ErrorKind) -> Result<u32, Error> {
    if hdr.name_off != 0 || hdr.kflag() || hdr.vlen() != 0 {
        return Err(Error::new(code, Some(range)));
    }

    Ok(hdr.type_id())
}

fn read_array(r: &mut Reader, hdr: &file::TypeHeader, range: FileRange) -> Result<Type, Error> {
    let invalid = Error::new(ErrorKind::InvalidArrayEncoding, Some(range));

    if hdr.name_off != 0 || hdr.kflag() || hdr.vlen() != 0 || hdr.size_or_type != 0 {
        return Err(invalid);
    }

    let array = file::Array::read(r)?;

    Ok(Type::Array {
        elem_type_id: array.elem_ty,
        index_type_id: array.index_ty,
        nr_elems: array.nelems,
    })
}

fn read_members(
    r: &mut Reader,
    strs: u64,
    hdr: &file::TypeHeader,
) -> Result<Vec<Member>, Error> {
    (0..hdr.vlen())
        .map(|_| {
            file::Member::read(r).and_then(|m| {
                let name = file::read_str(r, strs, m.name_off)?;

                Ok(if hdr.kflag() {
                    Member {
                        name,
                        type_id: m.ty,
                        bits_offset: m.bit_offset(),
                        bitfield_size: m.bitfield_size(),
                    }
                } else {
                    Member {
                        name,
                        type_id: m.ty,
                        bits_offset: m.offset,
                        bitfield_size: 0,
                    }
                })
            })
        })
        .collect()
}

fn read_enum(
    r: &mut Reader,
    strs: u64,
    hdr: &file::TypeHeader,
    range: FileRange,
) -> Result<Type, Error> {
    let invalid = Error::new(ErrorKind::InvalidEnumEncoding, Some(range));

    if hdr.kflag() || hdr.vlen() == 0 {
        return Err(invalid);
    }

    if !matches!(hdr.size(), 1 | 2 | 4 | 8) {
        return Err(invalid);
    }

    let name = file::read_str(r, strs, hdr.name_off)?;

    let values = (0..hdr.vlen())
        .map(|_| {
            file::EnumValue::read(r).and_then(|v| {
                Ok(EnumValue {
                    name: required_name(r, strs, v.name_off, invalid)?,
                    value: v.val,
                })
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    Ok(Type::Enum {
        name,
        size: hdr.size(),
        values,
    })
}

fn read_fwd(
    r: &mut Reader,
    strs: u64,
    hdr: &file::TypeHeader,
    range: FileRange,
) -> Result<Type, Error> {
    let invalid = Error::new(ErrorKind::InvalidFwdEncoding, Some(range));

    if hdr.vlen() != 0 || hdr.size_or_type != 0 {
        return Err(invalid);
    }

    Ok(Type::Fwd {
        name: required_name(r, strs, hdr.name_off, invalid)?,
        is_union: hdr.kflag(),
    })
}

fn read_typedef(
    r: &mut Reader,
    strs: u64,
    hdr: &file::TypeHeader,
    range: FileRange,
) -> Result<Type, Error> {
    let invalid = Error::new(ErrorKind::InvalidTypedefEncoding, Some(range));

    if hdr.kflag() || hdr.vlen() != 0 {
        return Err(invalid);
    }

    Ok(Type::Typedef {
        name: required_name(r, strs, hdr.name_off, invalid)?,
        type_id: hdr.type_id(),
    })
}

fn read_func(
    r: &mut Reader,
    strs: u64,
    hdr: &file::TypeHeader,
    range: FileRange,
) -> Result<Type, Error> {
    let invalid = Error::new(ErrorKind::InvalidFuncEncoding, Some(range));

    if hdr.kflag() || hdr.vlen() != 0 {
        return Err(invalid);
    }

    Ok(Type::Func {
        name: required_name(r, strs, hdr.name_off, invalid)?,
        type_id: hdr.type_id(),
    })
}

fn read_func_proto(
    r: &mut Reader,
    strs: u64,
    hdr: &file::TypeHeader,
    range: FileRange,
) -> Result<Type, Error> {
    if hdr.name_off != 0 || hdr.kflag() {
        return Err(Error::new(ErrorKind::InvalidFuncProtoEncoding, Some(range)));
    }

    let mut params = (0..hdr.vlen())
        .map(|_| {
            file::Param::read(r).and_then(|p| {
                Ok(Param {
                    name: file::read_str(r, strs, p.name_off)?,
                    type_id: p.ty,
                })
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let variadic = params.last().map_or(false, Param::is_variadic_marker);

    if variadic {
        params.pop();
    }

    Ok(Type::FuncProto {
        ret_type_id: hdr.type_id(),
        params,
        variadic,
    })
}
