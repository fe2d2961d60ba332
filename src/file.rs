use core::mem;

use derive_more::{Deref, Display, From};

use crate::error::{Error, ErrorKind, FileRange};
use crate::reader::{Endianness, Reader};

pub trait ReadExt: Sized {
    fn read(r: &mut Reader<'_>) -> Result<Self, Error>;
}

#[repr(C)]
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub magic: u16,
    pub version: u8,
    pub flags: u8,
    pub len: u32,

    /* All offsets are in bytes relative to the end of this header */
    pub type_off: u32, // offset of type section
    pub type_len: u32, // length of type section
    pub str_off: u32,  // offset of string section
    pub str_len: u32,  // length of string section
}

impl Header {
    pub const MAGIC: u16 = 0xeb9f;
    pub const VERSION: u8 = 1;

    /// Probes the magic at offset 0 with a tentative little-endian read.
    /// The caller commits the returned endianness before reading anything
    /// else.
    pub fn detect_endianness(r: &mut Reader) -> Result<Endianness, Error> {
        r.seek(0);
        r.set_endianness(Endianness::Little);

        match r.read_u16()? {
            Self::MAGIC => Ok(Endianness::Little),
            magic if magic == Self::MAGIC.swap_bytes() => Ok(Endianness::Big),
            _ => Err(Error::new(
                ErrorKind::InvalidMagicValue,
                Some(FileRange::new(0, 2)),
            )),
        }
    }

    /// Reads the fixed header at offset 0. Section offsets are trusted
    /// here; the driver's termination check validates them implicitly.
    pub fn read(r: &mut Reader) -> Result<Self, Error> {
        r.seek(0);

        Ok(Header {
            magic: r.read_u16()?,
            version: r.read_u8()?,
            flags: r.read_u8()?,
            len: r.read_u32()?,
            type_off: r.read_u32()?,
            type_len: r.read_u32()?,
            str_off: r.read_u32()?,
            str_len: r.read_u32()?,
        })
    }

    pub fn type_section_start(&self) -> u64 {
        u64::from(self.len) + u64::from(self.type_off)
    }

    pub fn type_section_end(&self) -> u64 {
        self.type_section_start() + u64::from(self.type_len)
    }

    pub fn string_section_start(&self) -> u64 {
        u64::from(self.len) + u64::from(self.str_off)
    }
}

#[repr(C)]
#[derive(Debug, Clone, PartialEq, Deref)]
pub struct TypeHeader {
    pub name_off: u32,
    /* "info" bits arrangement
     * bits  0-15: vlen (e.g. # of struct's members)
     * bits 16-23: unused
     * bits 24-28: kind (e.g. int, ptr, array...etc)
     * bits 29-30: unused
     * bit     31: kind_flag, currently used by
     *             struct, union and fwd
     */
    #[deref]
    pub info: Info,
    /* "size" is used by INT, ENUM, STRUCT and UNION.
     * "size" tells the size of the type it is describing.
     *
     * "type" is used by PTR, TYPEDEF, VOLATILE, CONST,
     * FUNC and FUNC_PROTO.
     * "type" is a type_id referring to another type.
     */
    pub size_or_type: u32,
}

impl TypeHeader {
    pub const SIZE: u64 = mem::size_of::<TypeHeader>() as u64;

    pub fn size(&self) -> usize {
        self.size_or_type as usize
    }

    pub fn type_id(&self) -> u32 {
        self.size_or_type
    }
}

impl ReadExt for TypeHeader {
    fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(TypeHeader {
            name_off: r.read_u32()?,
            info: Info(r.read_u32()?),
            size_or_type: r.read_u32()?,
        })
    }
}

#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, From)]
pub struct Info(pub u32);

impl Info {
    const VLEN_MASK: u32 = 0x0000_ffff;
    const KIND_MASK: u32 = 0x1f00_0000;
    const KIND_FLAG: u32 = 0x8000_0000;
    const KIND_SHIFT: usize = 24;

    pub fn vlen(&self) -> usize {
        (self.0 & Self::VLEN_MASK) as usize
    }

    pub fn kind_value(&self) -> u8 {
        ((self.0 & Self::KIND_MASK) >> Self::KIND_SHIFT) as u8
    }

    pub fn kflag(&self) -> bool {
        (self.0 & Self::KIND_FLAG) != 0
    }

    /// Total encoded size of an entry with this info word: the common
    /// header plus the kind's trailer.
    pub fn entry_size(&self, kind: Kind) -> u64 {
        TypeHeader::SIZE
            + match kind {
                Kind::Int => mem::size_of::<u32>() as u64,
                Kind::Array => mem::size_of::<Array>() as u64,
                Kind::Enum => (mem::size_of::<EnumValue>() * self.vlen()) as u64,
                Kind::Struct | Kind::Union => (mem::size_of::<Member>() * self.vlen()) as u64,
                Kind::FuncProto => (mem::size_of::<Param>() * self.vlen()) as u64,
                Kind::Ptr
                | Kind::Fwd
                | Kind::Typedef
                | Kind::Volatile
                | Kind::Const
                | Kind::Func => 0,
            }
    }
}

/// Kinds this decoder accepts, with their kernel-assigned numbers.
/// `Restrict` (11) and the newer kinds (14 and up) are deliberately
/// absent: [`Kind::from_value`] fails for them and the driver reports
/// [`ErrorKind::InvalidBtfKind`].
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Kind {
    Int = 1,
    Ptr = 2,
    Array = 3,
    Struct = 4,
    Union = 5,
    Enum = 6,
    Fwd = 7,
    Typedef = 8,
    Volatile = 9,
    Const = 10,
    Func = 12,
    FuncProto = 13,
}

impl Kind {
    pub fn from_value(value: u8) -> Option<Kind> {
        Some(match value {
            1 => Kind::Int,
            2 => Kind::Ptr,
            3 => Kind::Array,
            4 => Kind::Struct,
            5 => Kind::Union,
            6 => Kind::Enum,
            7 => Kind::Fwd,
            8 => Kind::Typedef,
            9 => Kind::Volatile,
            10 => Kind::Const,
            12 => Kind::Func,
            13 => Kind::FuncProto,
            _ => return None,
        })
    }
}

/// BTF_KIND_INT is followed by a u32 and the following is the 32 bits arrangement:
///
/// ```text
/// bits  0-7:  nr_bits
/// bits 16-23: bits_offset
/// bits 24-27: encoding (signed / char / bool)
/// ```
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Int(pub u32);

impl Int {
    const ENCODING_MASK: u32 = 0x0f00_0000;
    const OFFSET_MASK: u32 = 0x00ff_0000;
    const BITS_MASK: u32 = 0x0000_00ff;

    const ENCODING_SHIFT: usize = 24;
    const OFFSET_SHIFT: usize = 16;

    pub fn offset(&self) -> usize {
        ((self.0 & Self::OFFSET_MASK) >> Self::OFFSET_SHIFT) as usize
    }

    pub fn bits(&self) -> usize {
        (self.0 & Self::BITS_MASK) as usize
    }

    pub fn encoding(&self) -> IntEncoding {
        IntEncoding::from_bits_truncate((self.0 & Self::ENCODING_MASK) >> Self::ENCODING_SHIFT)
    }
}

impl ReadExt for Int {
    fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Int(r.read_u32()?))
    }
}

bitflags::bitflags! {
    #[derive(Default)]
    pub struct IntEncoding: u32 {
        const SIGNED = 1 << 0;
        const CHAR = 1 << 1;
        const BOOL = 1 << 2;
    }
}

impl IntEncoding {
    pub fn is_signed(&self) -> bool {
        self.contains(IntEncoding::SIGNED)
    }

    pub fn is_char(&self) -> bool {
        self.contains(IntEncoding::CHAR)
    }

    pub fn is_bool(&self) -> bool {
        self.contains(IntEncoding::BOOL)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for IntEncoding {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.bits())
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Array {
    pub elem_ty: u32,
    pub index_ty: u32,
    pub nelems: u32,
}

impl ReadExt for Array {
    fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Array {
            elem_ty: r.read_u32()?,
            index_ty: r.read_u32()?,
            nelems: r.read_u32()?,
        })
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Member {
    pub name_off: u32,
    pub ty: u32,
    pub offset: u32,
}

impl Member {
    pub fn bitfield_size(&self) -> u32 {
        self.offset >> 24
    }

    pub fn bit_offset(&self) -> u32 {
        self.offset & 0x00ff_ffff
    }
}

impl ReadExt for Member {
    fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Member {
            name_off: r.read_u32()?,
            ty: r.read_u32()?,
            offset: r.read_u32()?,
        })
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnumValue {
    pub name_off: u32,
    pub val: i32,
}

impl ReadExt for EnumValue {
    fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(EnumValue {
            name_off: r.read_u32()?,
            val: r.read_u32()? as i32,
        })
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Param {
    pub name_off: u32,
    pub ty: u32,
}

impl ReadExt for Param {
    fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Param {
            name_off: r.read_u32()?,
            ty: r.read_u32()?,
        })
    }
}

/// Resolves `name_off` out of the string pool starting at `str_start`.
///
/// An offset of 0 means "no name". The resolution is a side excursion:
/// the cursor is restored to its prior position on every exit path, so
/// interleaved forward reads are unaffected.
pub fn read_str(r: &mut Reader, str_start: u64, name_off: u32) -> Result<Option<String>, Error> {
    if name_off == 0 {
        return Ok(None);
    }

    let saved = r.offset();
    let res = read_cstr(r, str_start + u64::from(name_off));
    r.seek(saved);

    res.map(Some)
}

fn read_cstr(r: &mut Reader, offset: u64) -> Result<String, Error> {
    r.seek(offset);

    let mut buf = Vec::new();

    loop {
        match r.read_u8()? {
            0 => break,
            b => buf.push(b),
        }
    }

    // the pool holds byte strings; identifiers are ASCII in practice
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
