//! Element encodings for host data written to and read from buffers.
//!
//! An [`ElementEncoding`] names the numeric layout of buffer contents. Host
//! data travels as [`TypedData`], which owns its elements and knows its
//! encoding. Converting between encodings is element-wise and numeric: a
//! `U32` value of `3` becomes the `F32` value `3.0`, not a reinterpretation
//! of its bit pattern. Integer targets truncate toward zero and wrap, and
//! NaN becomes zero.

use std::borrow::Cow;

use bytemuck::Pod;

use crate::error::{GpuError, GpuResult};

/// Numeric layout of buffer elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ElementEncoding {
    /// Raw bytes.
    #[default]
    U8,
    /// 32-bit unsigned integers.
    U32,
    /// 32-bit signed integers.
    I32,
    /// 32-bit floats.
    F32,
}

impl ElementEncoding {
    /// Size of one element in bytes.
    pub const fn element_size(self) -> u64 {
        match self {
            Self::U8 => 1,
            Self::U32 | Self::I32 | Self::F32 => 4,
        }
    }

    /// Short name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::F32 => "f32",
        }
    }

    /// Decode raw buffer bytes into typed elements.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::MisalignedData`] if `bytes` is not a whole number
    /// of elements.
    pub fn decode(self, bytes: &[u8]) -> GpuResult<TypedData> {
        self.check_byte_len(bytes.len() as u64)?;
        Ok(match self {
            Self::U8 => TypedData::U8(bytes.to_vec()),
            Self::U32 => TypedData::U32(read_elements(bytes)),
            Self::I32 => TypedData::I32(read_elements(bytes)),
            Self::F32 => TypedData::F32(read_elements(bytes)),
        })
    }

    /// Check that `len` bytes hold a whole number of elements.
    pub fn check_byte_len(self, len: u64) -> GpuResult<()> {
        let element_size = self.element_size();
        if len % element_size != 0 {
            return Err(GpuError::MisalignedData { len, element_size });
        }
        Ok(())
    }
}

impl std::fmt::Display for ElementEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Host data tagged with its element encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedData {
    U8(Vec<u8>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
}

impl TypedData {
    /// Encoding of the held elements.
    pub fn encoding(&self) -> ElementEncoding {
        match self {
            Self::U8(_) => ElementEncoding::U8,
            Self::U32(_) => ElementEncoding::U32,
            Self::I32(_) => ElementEncoding::I32,
            Self::F32(_) => ElementEncoding::F32,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the data in bytes.
    pub fn byte_len(&self) -> u64 {
        self.len() as u64 * self.encoding().element_size()
    }

    /// View the elements as bytes in native byte order.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U8(v) => v.as_slice(),
            Self::U32(v) => bytemuck::cast_slice(v),
            Self::I32(v) => bytemuck::cast_slice(v),
            Self::F32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Bytes of the element range `[offset, offset + size)`.
    ///
    /// `size` defaults to every element from `offset` to the end.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::DataRange`] if the range runs past the data.
    pub fn element_range_bytes(&self, offset: usize, size: Option<usize>) -> GpuResult<&[u8]> {
        let len = self.len();
        let size = size.unwrap_or_else(|| len.saturating_sub(offset));
        let end = offset
            .checked_add(size)
            .filter(|end| *end <= len)
            .ok_or(GpuError::DataRange { offset, size, len })?;

        let element_size = self.encoding().element_size() as usize;
        Ok(&self.as_bytes()[offset * element_size..end * element_size])
    }

    /// Convert the elements to another encoding.
    ///
    /// Borrows when the encoding already matches.
    pub fn encode(&self, encoding: ElementEncoding) -> Cow<'_, TypedData> {
        if self.encoding() == encoding {
            return Cow::Borrowed(self);
        }
        Cow::Owned(match self {
            Self::U8(v) => convert(v, encoding),
            Self::U32(v) => convert(v, encoding),
            Self::I32(v) => convert(v, encoding),
            Self::F32(v) => convert(v, encoding),
        })
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match self {
            Self::U8(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<&[u32]> {
        match self {
            Self::U32(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            Self::I32(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::F32(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

macro_rules! impl_from_elements {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for TypedData {
                fn from(values: Vec<$ty>) -> Self {
                    Self::$variant(values)
                }
            }

            impl From<&[$ty]> for TypedData {
                fn from(values: &[$ty]) -> Self {
                    Self::$variant(values.to_vec())
                }
            }
        )*
    };
}

impl_from_elements!(u8 => U8, u32 => U32, i32 => I32, f32 => F32);

/// Numeric element that can pass through an `f64` during conversion.
trait Element: Pod {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl Element for u8 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn from_f64(value: f64) -> Self {
        (value as i64) as u8
    }
}

impl Element for u32 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn from_f64(value: f64) -> Self {
        (value as i64) as u32
    }
}

impl Element for i32 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn from_f64(value: f64) -> Self {
        (value as i64) as i32
    }
}

impl Element for f32 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

fn convert<T: Element>(values: &[T], encoding: ElementEncoding) -> TypedData {
    fn map<T: Element, U: Element>(values: &[T]) -> Vec<U> {
        values.iter().map(|v| U::from_f64(v.to_f64())).collect()
    }

    match encoding {
        ElementEncoding::U8 => TypedData::U8(map(values)),
        ElementEncoding::U32 => TypedData::U32(map(values)),
        ElementEncoding::I32 => TypedData::I32(map(values)),
        ElementEncoding::F32 => TypedData::F32(map(values)),
    }
}

fn read_elements<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}
