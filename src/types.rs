//! The closed set of PLY scalar types.
//!
//! PLY knows exactly eight scalar types: three signed and three unsigned
//! integers and two floating point types. Each has a fixed byte stride and two
//! names: the canonical one (`int32`) and the legacy one (`int`) used by the
//! original PLY description and by most files in the wild. Both are accepted
//! when parsing, the legacy name is written.

use std::{
    fmt,
    io,
    str::FromStr,
};

use byteorder::{ByteOrder, NativeEndian};

use crate::parse;


// ===========================================================================
// ===== `ScalarType`
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl ScalarType {
    pub const ALL: [ScalarType; 8] = [
        ScalarType::Int8,
        ScalarType::Uint8,
        ScalarType::Int16,
        ScalarType::Uint16,
        ScalarType::Int32,
        ScalarType::Uint32,
        ScalarType::Float32,
        ScalarType::Float64,
    ];

    /// Returns the number of bytes one value of this type occupies.
    pub fn stride(self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::Uint8 => 1,
            ScalarType::Int16 | ScalarType::Uint16 => 2,
            ScalarType::Int32 | ScalarType::Uint32 | ScalarType::Float32 => 4,
            ScalarType::Float64 => 8,
        }
    }

    /// Returns the canonical type name, e.g. `uint8` or `float32`.
    pub fn canonical_name(self) -> &'static str {
        match self {
            ScalarType::Int8 => "int8",
            ScalarType::Uint8 => "uint8",
            ScalarType::Int16 => "int16",
            ScalarType::Uint16 => "uint16",
            ScalarType::Int32 => "int32",
            ScalarType::Uint32 => "uint32",
            ScalarType::Float32 => "float32",
            ScalarType::Float64 => "float64",
        }
    }

    /// Returns the legacy type name, e.g. `uchar` or `float`. This is the name
    /// used when writing headers.
    pub fn legacy_name(self) -> &'static str {
        match self {
            ScalarType::Int8 => "char",
            ScalarType::Uint8 => "uchar",
            ScalarType::Int16 => "short",
            ScalarType::Uint16 => "ushort",
            ScalarType::Int32 => "int",
            ScalarType::Uint32 => "uint",
            ScalarType::Float32 => "float",
            ScalarType::Float64 => "double",
        }
    }

    /// Looks up a type by its canonical or legacy name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter()
            .copied()
            .find(|ty| ty.canonical_name() == name || ty.legacy_name() == name)
    }

    /// Returns `true` if and only if the type is either `float32` or
    /// `float64`.
    pub fn is_floating_point(self) -> bool {
        self == ScalarType::Float32 || self == ScalarType::Float64
    }

    /// Returns `true` if and only if the type is one of the six integer types.
    pub fn is_integer(self) -> bool {
        !self.is_floating_point()
    }

    /// The largest list length that can be stored in a count field of this
    /// type. `None` for floating point types, which cannot store lengths.
    pub fn max_list_len(self) -> Option<u64> {
        match self {
            ScalarType::Int8 => Some(i8::max_value() as u64),
            ScalarType::Uint8 => Some(u8::max_value() as u64),
            ScalarType::Int16 => Some(i16::max_value() as u64),
            ScalarType::Uint16 => Some(u16::max_value() as u64),
            ScalarType::Int32 => Some(i32::max_value() as u64),
            ScalarType::Uint32 => Some(u32::max_value() as u64),
            ScalarType::Float32 | ScalarType::Float64 => None,
        }
    }

    /// Interprets `src` (exactly `self.stride()` bytes, byte order `B`) as a
    /// list length. Returns `None` for negative values and floating point
    /// types.
    pub(crate) fn decode_len<B: ByteOrder>(self, src: &[u8]) -> Option<u64> {
        let v = match self {
            ScalarType::Int8 => src[0] as i8 as i64,
            ScalarType::Uint8 => src[0] as i64,
            ScalarType::Int16 => B::read_i16(src) as i64,
            ScalarType::Uint16 => B::read_u16(src) as i64,
            ScalarType::Int32 => B::read_i32(src) as i64,
            ScalarType::Uint32 => B::read_u32(src) as i64,
            ScalarType::Float32 | ScalarType::Float64 => return None,
        };

        if v < 0 {
            None
        } else {
            Some(v as u64)
        }
    }

    /// Writes the list length `len` as native endian value of this type into
    /// `dst`. The caller has to make sure `len <= self.max_list_len()`.
    pub(crate) fn encode_len(self, len: usize, dst: &mut [u8]) {
        debug_assert!(self.max_list_len().map_or(false, |max| len as u64 <= max));

        match self {
            ScalarType::Int8 | ScalarType::Uint8 => dst[0] = len as u8,
            ScalarType::Int16 | ScalarType::Uint16 => NativeEndian::write_u16(dst, len as u16),
            ScalarType::Int32 | ScalarType::Uint32 => NativeEndian::write_u32(dst, len as u32),
            ScalarType::Float32 | ScalarType::Float64 => {}
        }
    }

    /// Parses the ASCII literal `token` as value of this type and stores it
    /// native endian in `dst` (exactly `self.stride()` bytes).
    pub(crate) fn read_ascii(
        self,
        token: &str,
        dst: &mut [u8],
        offset: u64,
    ) -> Result<(), parse::Error> {
        fn parse_into<T: PlyScalar + FromStr>(
            token: &str,
            dst: &mut [u8],
            offset: u64,
        ) -> Result<(), parse::Error> {
            let v = token.parse::<T>().map_err(|_| parse::Error::InvalidLiteral {
                ty: T::TY,
                literal: token.to_string(),
                offset,
            })?;
            v.write_ne(dst);
            Ok(())
        }

        match self {
            ScalarType::Int8 => parse_into::<i8>(token, dst, offset),
            ScalarType::Uint8 => parse_into::<u8>(token, dst, offset),
            ScalarType::Int16 => parse_into::<i16>(token, dst, offset),
            ScalarType::Uint16 => parse_into::<u16>(token, dst, offset),
            ScalarType::Int32 => parse_into::<i32>(token, dst, offset),
            ScalarType::Uint32 => parse_into::<u32>(token, dst, offset),
            ScalarType::Float32 => parse_into::<f32>(token, dst, offset),
            ScalarType::Float64 => parse_into::<f64>(token, dst, offset),
        }
    }

    /// Writes the native endian value in `src` (exactly `self.stride()` bytes)
    /// as ASCII literal. We simply use the `Display` impl of the Rust types.
    pub(crate) fn write_ascii(self, src: &[u8], w: &mut impl io::Write) -> io::Result<()> {
        match self {
            ScalarType::Int8 => write!(w, "{}", i8::read_ne(src)),
            ScalarType::Uint8 => write!(w, "{}", u8::read_ne(src)),
            ScalarType::Int16 => write!(w, "{}", i16::read_ne(src)),
            ScalarType::Uint16 => write!(w, "{}", u16::read_ne(src)),
            ScalarType::Int32 => write!(w, "{}", i32::read_ne(src)),
            ScalarType::Uint32 => write!(w, "{}", u32::read_ne(src)),
            ScalarType::Float32 => write!(w, "{}", f32::read_ne(src)),
            ScalarType::Float64 => write!(w, "{}", f64::read_ne(src)),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.legacy_name().fmt(f)
    }
}

impl fmt::Display for ScalarTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\" is not a valid PLY scalar type", self.0)
    }
}

impl fmt::Debug for ScalarTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The error emitted when the `FromStr` implementation for `ScalarType` cannot
/// parse the given string.
#[derive(Clone, PartialEq, Eq)]
pub struct ScalarTypeParseError(String);

impl FromStr for ScalarType {
    type Err = ScalarTypeParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ScalarTypeParseError(s.to_string()))
    }
}


// ===========================================================================
// ===== Endian utilities
// ===========================================================================

/// Reverses the byte order of every value in `bytes`, which is interpreted as
/// densely packed values of type `ty`. Single byte types are left untouched.
/// A trailing chunk shorter than the stride is ignored.
pub fn endian_reverse(ty: ScalarType, bytes: &mut [u8]) {
    let stride = ty.stride();
    if stride == 1 {
        return;
    }

    for value in bytes.chunks_exact_mut(stride) {
        value.reverse();
    }
}


// ===========================================================================
// ===== `PlyScalar`
// ===========================================================================

mod internal {
    pub trait DoNotImplement {}
}

/// Abstracts over the eight Rust types that correspond to a [`ScalarType`].
///
/// This is a closed set of types: the trait has a crate-private supertrait, so
/// you can't implement it for your own types.
pub trait PlyScalar: Copy + fmt::Debug + fmt::Display + internal::DoNotImplement {
    /// The PLY type represented by `Self`.
    const TY: ScalarType;

    /// Reads one native endian value from the start of `src`.
    fn read_ne(src: &[u8]) -> Self;

    /// Writes `self` native endian into the start of `dst`.
    fn write_ne(self, dst: &mut [u8]);
}

macro_rules! impl_ply_scalar {
    ($ty:ident, $variant:ident, $read:ident, $write:ident) => {
        impl internal::DoNotImplement for $ty {}
        impl PlyScalar for $ty {
            const TY: ScalarType = ScalarType::$variant;

            fn read_ne(src: &[u8]) -> Self {
                NativeEndian::$read(src)
            }
            fn write_ne(self, dst: &mut [u8]) {
                NativeEndian::$write(dst, self)
            }
        }
    };
}

impl internal::DoNotImplement for i8 {}
impl PlyScalar for i8 {
    const TY: ScalarType = ScalarType::Int8;

    fn read_ne(src: &[u8]) -> Self {
        src[0] as i8
    }
    fn write_ne(self, dst: &mut [u8]) {
        dst[0] = self as u8;
    }
}

impl internal::DoNotImplement for u8 {}
impl PlyScalar for u8 {
    const TY: ScalarType = ScalarType::Uint8;

    fn read_ne(src: &[u8]) -> Self {
        src[0]
    }
    fn write_ne(self, dst: &mut [u8]) {
        dst[0] = self;
    }
}

impl_ply_scalar!(i16, Int16, read_i16, write_i16);
impl_ply_scalar!(u16, Uint16, read_u16, write_u16);
impl_ply_scalar!(i32, Int32, read_i32, write_i32);
impl_ply_scalar!(u32, Uint32, read_u32, write_u32);
impl_ply_scalar!(f32, Float32, read_f32, write_f32);
impl_ply_scalar!(f64, Float64, read_f64, write_f64);

/// Reinterprets a slice of PLY scalars as its underlying bytes.
pub(crate) fn as_byte_slice<P: PlyScalar>(input: &[P]) -> &[u8] {
    // All types implementing `PlyScalar` are primitive numbers without padding
    // or invalid bit patterns, and `u8` has an alignment of 1.
    unsafe {
        let len = input.len() * std::mem::size_of::<P>();
        std::slice::from_raw_parts(input.as_ptr() as *const u8, len)
    }
}
