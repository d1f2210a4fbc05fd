use std::{ffi::c_void, mem};

use crate::{
    handles::{layout, ObjectHandle},
    marshal::blit::{read_unaligned, Blittable},
};

/// Conversion of an invoke return object into a host value.
pub trait FromReturn: Sized {
    /// Converts `value`; `None` yields the type's default.
    ///
    /// # Safety
    ///
    /// A non-null `value` must be a live object whose runtime type matches `Self`: a boxed value
    /// for blittable types and `bool`, a string for `String`, an array for `Vec`.
    unsafe fn from_return(value: Option<ObjectHandle>) -> Self;
}

impl<T: Blittable> FromReturn for T {
    unsafe fn from_return(value: Option<ObjectHandle>) -> Self {
        value.map_or_else(T::default, |object| object.unbox::<T>())
    }
}

impl FromReturn for bool {
    unsafe fn from_return(value: Option<ObjectHandle>) -> Self {
        value.is_some_and(|object| object.unbox::<u8>() != 0)
    }
}

impl FromReturn for () {
    unsafe fn from_return(_: Option<ObjectHandle>) -> Self {}
}

impl FromReturn for String {
    unsafe fn from_return(value: Option<ObjectHandle>) -> Self {
        value.map_or_else(String::new, |object| object.read_string())
    }
}

impl FromReturn for Option<ObjectHandle> {
    unsafe fn from_return(value: Option<ObjectHandle>) -> Self {
        value
    }
}

impl<T: ArrayElement> FromReturn for Vec<T> {
    unsafe fn from_return(value: Option<ObjectHandle>) -> Self {
        let Some(array) = value else {
            return Vec::new();
        };

        let length = array.array_length();
        if !(0..=layout::MAX_ARRAY_LENGTH).contains(&length) {
            log::debug!(
                "array {:?} reports implausible length {}, returning empty",
                array,
                length
            );
            return Vec::new();
        }

        let data = array.array_data();
        (0..length as usize)
            .map(|index| T::read_element(data.add(index * T::STRIDE)))
            .collect()
    }
}

/// A type that can be read out of a foreign array slot.
pub trait ArrayElement: Sized {
    /// Distance between consecutive elements in bytes.
    const STRIDE: usize;

    /// Reads one element.
    ///
    /// # Safety
    ///
    /// `slot` must point to `STRIDE` readable bytes holding an element of this type.
    unsafe fn read_element(slot: *const u8) -> Self;
}

impl<T: Blittable> ArrayElement for T {
    const STRIDE: usize = mem::size_of::<T>();

    unsafe fn read_element(slot: *const u8) -> Self {
        read_unaligned(slot)
    }
}

impl ArrayElement for bool {
    const STRIDE: usize = 1;

    unsafe fn read_element(slot: *const u8) -> Self {
        *slot != 0
    }
}

impl ArrayElement for Option<ObjectHandle> {
    const STRIDE: usize = layout::POINTER_SIZE;

    unsafe fn read_element(slot: *const u8) -> Self {
        ObjectHandle::from_raw(slot.cast::<*mut c_void>().read_unaligned())
    }
}

impl ArrayElement for String {
    const STRIDE: usize = layout::POINTER_SIZE;

    unsafe fn read_element(slot: *const u8) -> Self {
        <Option<ObjectHandle>>::read_element(slot)
            .map_or_else(String::new, |string| string.read_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::ForeignHeap;

    #[test]
    fn null_returns_default() {
        unsafe {
            assert_eq!(i32::from_return(None), 0);
            assert!(!bool::from_return(None));
            assert_eq!(String::from_return(None), "");
            assert!(<Vec<i32>>::from_return(None).is_empty());
            assert_eq!(<Option<ObjectHandle>>::from_return(None), None);
        }
    }

    #[test]
    fn boxed_values_skip_header() {
        let heap = ForeignHeap::new();
        unsafe {
            assert_eq!(i64::from_return(Some(heap.boxed(&-9_i64))), -9);
            assert_eq!(f64::from_return(Some(heap.boxed(&0.25_f64))), 0.25);
            assert!(bool::from_return(Some(heap.boxed(&1_u8))));
        }
    }

    #[test]
    fn value_arrays() {
        let heap = ForeignHeap::new();
        let array = heap.value_array(&[10_i32, 20, 30]);

        assert_eq!(unsafe { <Vec<i32>>::from_return(Some(array)) }, vec![10, 20, 30]);
    }

    #[test]
    fn reference_arrays() {
        let heap = ForeignHeap::new();
        let a = heap.string("a");
        let b = heap.string("bee");
        let array = heap.reference_array(&[Some(a), None, Some(b)]);

        let handles = unsafe { <Vec<Option<ObjectHandle>>>::from_return(Some(array)) };
        assert_eq!(handles, vec![Some(a), None, Some(b)]);

        let strings = unsafe { <Vec<String>>::from_return(Some(array)) };
        assert_eq!(strings, vec!["a", "", "bee"]);
    }

    #[test]
    fn implausible_lengths_are_empty() {
        let heap = ForeignHeap::new();

        let negative = heap.array_with_length(-1);
        let huge = heap.array_with_length(500_000);

        unsafe {
            assert!(<Vec<i32>>::from_return(Some(negative)).is_empty());
            assert!(<Vec<i32>>::from_return(Some(huge)).is_empty());
        }
    }
}
