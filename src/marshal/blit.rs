use std::{mem, slice};

/// A value whose in-memory representation can be copied to and from foreign memory as is.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` or primitive, contain no padding bytes, hold no
/// references, and accept every bit pattern as a valid value. The layout must match the
/// corresponding foreign value type field by field.
pub unsafe trait Blittable: Copy + Default + Send + Sync + 'static {}

macro_rules! blittable {
    ($($ty:ty),*) => {
        $( unsafe impl Blittable for $ty {} )*
    };
}

blittable!(u8, i8, u16, i16, u32, i32, u64, i64, usize, isize, f32, f64);

/// Views the bytes of a blittable value.
#[must_use]
pub fn bytes_of<T: Blittable>(value: &T) -> &[u8] {
    // No padding and no invalid bytes per the `Blittable` contract
    unsafe { slice::from_raw_parts((value as *const T).cast::<u8>(), mem::size_of::<T>()) }
}

/// Reads a blittable value from possibly unaligned memory.
///
/// # Safety
///
/// `ptr` must be valid for reads of `size_of::<T>()` bytes.
#[must_use]
pub unsafe fn read_unaligned<T: Blittable>(ptr: *const u8) -> T {
    ptr.cast::<T>().read_unaligned()
}

/// Reads a blittable value from the start of `bytes`, `None` if it is too short.
#[must_use]
pub fn from_bytes<T: Blittable>(bytes: &[u8]) -> Option<T> {
    if bytes.len() < mem::size_of::<T>() {
        return None;
    }
    Some(unsafe { read_unaligned(bytes.as_ptr()) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Vector3 {
        x: f32,
        y: f32,
        z: f32,
    }

    unsafe impl Blittable for Vector3 {}

    #[test]
    fn struct_bytes() {
        let value = Vector3 {
            x: 1.0,
            y: -2.5,
            z: 0.0,
        };
        let bytes = bytes_of(&value);

        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[0..4], &1.0_f32.to_le_bytes());
        assert_eq!(from_bytes::<Vector3>(bytes), Some(value));
        assert_eq!(from_bytes::<Vector3>(&bytes[..8]), None);
    }
}
