use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use asdf_error::{AsdfError, asdf_err};

use crate::PValue;

/// The element type of an [`NDArray`](crate::NDArray).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// A boolean stored as one byte.
    Bool8,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// IEEE 754 single precision.
    Float32,
    /// IEEE 754 double precision.
    Float64,
}

impl DataType {
    /// Width of one element in bytes.
    pub const fn byte_width(self) -> usize {
        match self {
            Self::Bool8 | Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// The name used for this type in the tree.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool8 => "bool8",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Whether this is a floating point type.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Whether this is a signed integer type.
    pub const fn is_signed_int(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// Whether this is an unsigned integer type.
    pub const fn is_unsigned_int(self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    /// Decode one element from exactly [`Self::byte_width`] bytes.
    pub fn decode(self, bytes: &[u8], order: ByteOrder) -> PValue {
        match self {
            Self::Bool8 => PValue::Bool(bytes[0] != 0),
            Self::Int8 => PValue::I64(i8::read(bytes, order).into()),
            Self::Int16 => PValue::I64(i16::read(bytes, order).into()),
            Self::Int32 => PValue::I64(i32::read(bytes, order).into()),
            Self::Int64 => PValue::I64(i64::read(bytes, order)),
            Self::UInt8 => PValue::U64(u8::read(bytes, order).into()),
            Self::UInt16 => PValue::U64(u16::read(bytes, order).into()),
            Self::UInt32 => PValue::U64(u32::read(bytes, order).into()),
            Self::UInt64 => PValue::U64(u64::read(bytes, order)),
            Self::Float32 => PValue::F64(f32::read(bytes, order).into()),
            Self::Float64 => PValue::F64(f64::read(bytes, order)),
        }
    }

    /// Encode one element into exactly [`Self::byte_width`] bytes, casting as required.
    pub fn encode(self, value: PValue, out: &mut [u8], order: ByteOrder) -> Result<(), AsdfError> {
        let cast_err = || asdf_err!(Conversion: "cannot store {} as {}", value, self);
        match self {
            Self::Bool8 => out[0] = u8::from(value.as_bool().ok_or_else(cast_err)?),
            Self::Int8 => value.cast::<i8>().ok_or_else(cast_err)?.write(out, order),
            Self::Int16 => value.cast::<i16>().ok_or_else(cast_err)?.write(out, order),
            Self::Int32 => value.cast::<i32>().ok_or_else(cast_err)?.write(out, order),
            Self::Int64 => value.cast::<i64>().ok_or_else(cast_err)?.write(out, order),
            Self::UInt8 => value.cast::<u8>().ok_or_else(cast_err)?.write(out, order),
            Self::UInt16 => value.cast::<u16>().ok_or_else(cast_err)?.write(out, order),
            Self::UInt32 => value.cast::<u32>().ok_or_else(cast_err)?.write(out, order),
            Self::UInt64 => value.cast::<u64>().ok_or_else(cast_err)?.write(out, order),
            Self::Float32 => value.cast::<f32>().ok_or_else(cast_err)?.write(out, order),
            Self::Float64 => value.cast::<f64>().ok_or_else(cast_err)?.write(out, order),
        }
        Ok(())
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = AsdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "bool8" => Self::Bool8,
            "int8" => Self::Int8,
            "int16" => Self::Int16,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint8" => Self::UInt8,
            "uint16" => Self::UInt16,
            "uint32" => Self::UInt32,
            "uint64" => Self::UInt64,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            _ => return Err(asdf_err!(Conversion: "unknown datatype '{}'", s)),
        })
    }
}

/// The byte order of array elements in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// Least significant byte first.
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

impl ByteOrder {
    /// The name used for this byte order in the tree.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Little => "little",
            Self::Big => "big",
        }
    }
}

impl Display for ByteOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ByteOrder {
    type Err = AsdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "little" => Ok(Self::Little),
            "big" => Ok(Self::Big),
            _ => Err(asdf_err!(Conversion: "unknown byteorder '{}'", s)),
        }
    }
}

/// A Rust type that can be stored as an array element.
pub trait NativeElement: Copy + Debug + PartialEq + Send + Sync + 'static {
    /// The [`DataType`] corresponding to this Rust type.
    const DTYPE: DataType;

    /// Read one element from the front of `bytes`.
    fn read(bytes: &[u8], order: ByteOrder) -> Self;

    /// Write one element to the front of `out`.
    fn write(self, out: &mut [u8], order: ByteOrder);

    /// Widen into a dynamically typed value.
    fn into_pvalue(self) -> PValue;
}

macro_rules! native_element {
    ($T:ty, $dtype:ident, $variant:ident, $wide:ty) => {
        impl NativeElement for $T {
            const DTYPE: DataType = DataType::$dtype;

            #[inline]
            fn read(bytes: &[u8], order: ByteOrder) -> Self {
                let mut raw = [0u8; size_of::<$T>()];
                raw.copy_from_slice(&bytes[..size_of::<$T>()]);
                match order {
                    ByteOrder::Little => <$T>::from_le_bytes(raw),
                    ByteOrder::Big => <$T>::from_be_bytes(raw),
                }
            }

            #[inline]
            fn write(self, out: &mut [u8], order: ByteOrder) {
                let raw = match order {
                    ByteOrder::Little => self.to_le_bytes(),
                    ByteOrder::Big => self.to_be_bytes(),
                };
                out[..size_of::<$T>()].copy_from_slice(&raw);
            }

            #[inline]
            fn into_pvalue(self) -> PValue {
                PValue::$variant(<$wide>::from(self))
            }
        }
    };
}

native_element!(i8, Int8, I64, i64);
native_element!(i16, Int16, I64, i64);
native_element!(i32, Int32, I64, i64);
native_element!(i64, Int64, I64, i64);
native_element!(u8, UInt8, U64, u64);
native_element!(u16, UInt16, U64, u64);
native_element!(u32, UInt32, U64, u64);
native_element!(u64, UInt64, U64, u64);
native_element!(f32, Float32, F64, f64);
native_element!(f64, Float64, F64, f64);

impl NativeElement for bool {
    const DTYPE: DataType = DataType::Bool8;

    fn read(bytes: &[u8], _order: ByteOrder) -> Self {
        bytes[0] != 0
    }

    fn write(self, out: &mut [u8], _order: ByteOrder) {
        out[0] = u8::from(self);
    }

    fn into_pvalue(self) -> PValue {
        PValue::Bool(self)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(DataType::Int8)]
    #[case(DataType::UInt16)]
    #[case(DataType::Float32)]
    #[case(DataType::Float64)]
    #[case(DataType::Bool8)]
    fn names_parse_back(#[case] dtype: DataType) {
        assert_eq!(dtype.name().parse::<DataType>().unwrap(), dtype);
    }

    #[test]
    fn byte_order_is_respected() {
        let mut out = [0u8; 4];
        DataType::Int32
            .encode(PValue::I64(1), &mut out, ByteOrder::Big)
            .unwrap();
        assert_eq!(out, [0, 0, 0, 1]);
        assert_eq!(
            DataType::Int32.decode(&out, ByteOrder::Big),
            PValue::I64(1)
        );
        assert_eq!(
            DataType::Int32.decode(&out, ByteOrder::Little),
            PValue::I64(1 << 24)
        );
    }

    #[test]
    fn encode_rejects_lossy_cast() {
        let mut out = [0u8; 1];
        assert!(
            DataType::UInt8
                .encode(PValue::I64(-1), &mut out, ByteOrder::Little)
                .is_err()
        );
    }
}
