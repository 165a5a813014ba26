//! Little-endian reading and writing of primitive values.
//!
//! Type libraries and PE images are both little-endian, so unlike a general purpose codec this
//! module only knows one byte order. Reads are bounds-checked against the source slice and
//! return [`crate::Error::OutOfBounds`] instead of panicking. Writes append to a growable buffer,
//! which is how every serializer in this crate produces its output; [`patch_le_at`] rewrites an
//! already emitted value once a forward reference is known.
//!
//! # Supported Types
//!
//! [`TlbIO`] is implemented for `u8`, `u16`, `u32`, `u64`, `i8`, `i16`, `i32`, `i64`, `f32` and `f64`.

use crate::Result;

/// Conversion between a primitive value and its little-endian byte representation.
pub trait TlbIO: Sized + Copy {
    /// The fixed size byte array backing this type.
    type Bytes: AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode a value from its little-endian bytes.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encode a value into its little-endian bytes.
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_tlb_io {
    ($($ty:ty),* $(,)?) => {
        $(
            impl TlbIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_tlb_io!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// Read a `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_le<T: TlbIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Read a `T` at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would pass the end of `data`.
pub fn read_le_at<T: TlbIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Read a 2 or 4 byte index, depending on `is_large`, widened to `u32`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would pass the end of `data`.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}

/// Append `value` to `buffer`.
pub fn write_le<T: TlbIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Append a 2 or 4 byte index, depending on `is_large`.
///
/// Small indices are truncated to 16 bits; callers size the column from the row counts so the
/// value always fits.
#[allow(clippy::cast_possible_truncation)]
pub fn write_le_dyn(buffer: &mut Vec<u8>, value: u32, is_large: bool) {
    if is_large {
        write_le(buffer, value);
    } else {
        write_le(buffer, value as u16);
    }
}

/// Overwrite the `T` stored at `offset` in an already written buffer.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit at `offset`.
pub fn patch_le_at<T: TlbIO>(data: &mut [u8], offset: usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    data[offset..end].copy_from_slice(bytes);
    Ok(())
}

/// Append an ECMA-335 II.23.2 compressed unsigned integer.
///
/// Values above `0x1FFF_FFFF` cannot be represented and are truncated to 29 bits.
#[allow(clippy::cast_possible_truncation)]
pub fn write_compressed_uint(value: u32, buffer: &mut Vec<u8>) {
    if value < 0x80 {
        buffer.push(value as u8);
    } else if value < 0x4000 {
        buffer.push(0x80 | (value >> 8) as u8);
        buffer.push(value as u8);
    } else {
        buffer.push(0xC0 | ((value >> 24) & 0x1F) as u8);
        buffer.push((value >> 16) as u8);
        buffer.push((value >> 8) as u8);
        buffer.push(value as u8);
    }
}

/// Append zero bytes until `buffer.len()` is a multiple of `alignment`.
pub fn pad_to(buffer: &mut Vec<u8>, alignment: usize) {
    let padding = (alignment - (buffer.len() % alignment)) % alignment;
    buffer.resize(buffer.len() + padding, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_le_primitives() {
        assert_eq!(read_le::<u8>(&TEST_BUFFER).unwrap(), 0x01);
        assert_eq!(read_le::<u16>(&TEST_BUFFER).unwrap(), 0x0201);
        assert_eq!(read_le::<u32>(&TEST_BUFFER).unwrap(), 0x0403_0201);
        assert_eq!(read_le::<u64>(&TEST_BUFFER).unwrap(), 0x0807_0605_0403_0201);
        assert_eq!(read_le::<i16>(&[0xFE, 0xFF]).unwrap(), -2);
    }

    #[test]
    fn read_le_at_advances() {
        let mut offset = 0;
        assert_eq!(read_le_at::<u16>(&TEST_BUFFER, &mut offset).unwrap(), 0x0201);
        assert_eq!(read_le_at::<u32>(&TEST_BUFFER, &mut offset).unwrap(), 0x0605_0403);
        assert_eq!(offset, 6);
        assert!(read_le_at::<u32>(&TEST_BUFFER, &mut offset).is_err());
        assert_eq!(offset, 6);
    }

    #[test]
    fn read_dyn() {
        let mut offset = 0;
        assert_eq!(read_le_at_dyn(&TEST_BUFFER, &mut offset, false).unwrap(), 0x0201);
        assert_eq!(read_le_at_dyn(&TEST_BUFFER, &mut offset, true).unwrap(), 0x0605_0403);
    }

    #[test]
    fn write_and_patch() {
        let mut buffer = Vec::new();
        write_le(&mut buffer, 0x0201_u16);
        write_le_dyn(&mut buffer, 0x0605_0403, true);
        write_le_dyn(&mut buffer, 0x0807, false);
        assert_eq!(buffer, TEST_BUFFER);

        patch_le_at(&mut buffer, 4, 0xAABB_u16).unwrap();
        assert_eq!(&buffer[4..6], &[0xBB, 0xAA]);
        assert!(patch_le_at(&mut buffer, 6, 0_u32).is_err());
    }

    #[test]
    fn padding() {
        let mut buffer = vec![1, 2, 3];
        pad_to(&mut buffer, 4);
        assert_eq!(buffer, [1, 2, 3, 0]);
        pad_to(&mut buffer, 4);
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn compressed_uint_widths() {
        let mut buffer = Vec::new();
        write_compressed_uint(0x03, &mut buffer);
        write_compressed_uint(0x80, &mut buffer);
        write_compressed_uint(0x4000, &mut buffer);
        assert_eq!(buffer, [0x03, 0x80, 0x80, 0xC0, 0x00, 0x40, 0x00]);
    }
}
