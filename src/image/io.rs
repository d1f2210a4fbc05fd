//! Little-endian scalar reads and writes over byte buffers.
//!
//! Every structure the bridge touches inside a module image (PE headers, thunk displacements,
//! pointer slots) and inside foreign objects (array lengths, string lengths, boxed payloads) is a
//! little-endian scalar at a fixed offset. This module provides bounds-checked helpers for those
//! accesses, built around the [`crate::image::io::LeScalar`] trait.
//!
//! # Key Components
//!
//! - [`crate::image::io::LeScalar`] - Fixed-width integer and float types readable from bytes
//! - [`crate::image::io::read_le`] - Read a value from the start of a buffer
//! - [`crate::image::io::read_le_at`] - Read at an offset and advance it
//! - [`crate::image::io::write_le_at`] - Write at an offset and advance it
//!
//! All functions return [`crate::Error::OutOfBounds`] instead of panicking on short buffers.

use crate::{Error::OutOfBounds, Result};

/// A fixed-width scalar with a little-endian byte representation.
pub trait LeScalar: Sized + Copy {
    /// Size of the encoded value in bytes
    const SIZE: usize;

    /// Decode from exactly [`LeScalar::SIZE`] bytes.
    fn from_le_slice(bytes: &[u8]) -> Option<Self>;

    /// Encode into exactly [`LeScalar::SIZE`] bytes.
    fn write_le_slice(self, out: &mut [u8]);
}

macro_rules! impl_le_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl LeScalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn from_le_slice(bytes: &[u8]) -> Option<Self> {
                    let raw: [u8; std::mem::size_of::<$ty>()] = bytes.try_into().ok()?;
                    Some(<$ty>::from_le_bytes(raw))
                }

                fn write_le_slice(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_le_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Reads a value of type `T` from the start of `data`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_le<T: LeScalar>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a value of type `T` at `offset` and advances the offset past it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the read would leave the buffer.
pub fn read_le_at<T: LeScalar>(data: &[u8], offset: &mut usize) -> Result<T> {
    let Some(end) = offset.checked_add(T::SIZE) else {
        return Err(OutOfBounds);
    };

    if end > data.len() {
        return Err(OutOfBounds);
    }

    let value = T::from_le_slice(&data[*offset..end]).ok_or(OutOfBounds)?;
    *offset = end;

    Ok(value)
}

/// Writes `value` at `offset` and advances the offset past it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the write would leave the buffer.
pub fn write_le_at<T: LeScalar>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let Some(end) = offset.checked_add(T::SIZE) else {
        return Err(OutOfBounds);
    };

    if end > data.len() {
        return Err(OutOfBounds);
    }

    value.write_le_slice(&mut data[*offset..end]);
    *offset = end;

    Ok(())
}
