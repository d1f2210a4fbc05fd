//! Conversion of host values to foreign call arguments and back.
//!
//! # Outbound
//!
//! Each [`Argument`] becomes exactly one native pointer in a [`MarshaledArgs`]:
//!
//! | Argument            | Pointer                                                   |
//! |---------------------|-----------------------------------------------------------|
//! | `Null`              | zero                                                      |
//! | `Object`            | the handle itself                                         |
//! | `Text`              | a runtime string created with `string_new`                |
//! | `Type`              | the `System.Type` object of the class, via the class cache |
//! | `Primitive`, `Enum` | an owned, 8-byte aligned buffer holding the raw bytes     |
//! | `Struct`            | an owned buffer with the blitted aggregate                |
//! | `Unsupported`       | zero, with a warning kept on the [`MarshaledArgs`]        |
//!
//! Buffers are owned by the [`MarshaledArgs`] and stay valid until it is dropped, which must not
//! happen before the call returns.
//!
//! # Inbound
//!
//! [`FromReturn`] converts the object returned by `runtime_invoke`. A null return becomes the
//! type's default. Primitives, enums and structs come back boxed, so their payload is read past
//! the two-pointer object header. Arrays with a negative or implausibly large length become an
//! empty `Vec`.
//!
//! # Wrappers
//!
//! [`WrapperRegistry`] maps a class identity to a constructor that wraps an object handle in a
//! host type, registered once at startup.

mod blit;
mod inbound;
mod outbound;
mod registry;

pub use blit::{bytes_of, from_bytes, Blittable};
pub use inbound::{ArrayElement, FromReturn};
pub use outbound::Marshaler;
pub use registry::{ForeignWrapper, WrapperRegistry};

use std::ffi::c_void;

use crate::{handles::ObjectHandle, Error};

/// A fixed-width scalar passed by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    /// One byte, 0 or 1
    Bool(bool),
    /// `sbyte`
    I8(i8),
    /// `byte`
    U8(u8),
    /// `short`
    I16(i16),
    /// `ushort`
    U16(u16),
    /// UTF-16 code unit
    Char(u16),
    /// `int`
    I32(i32),
    /// `uint`
    U32(u32),
    /// `long`
    I64(i64),
    /// `ulong`
    U64(u64),
    /// `float`
    F32(f32),
    /// `double`
    F64(f64),
}

impl Primitive {
    /// Raw little-endian bytes of the value, without widening.
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        match self {
            Primitive::Bool(value) => vec![u8::from(value)],
            Primitive::I8(value) => value.to_le_bytes().to_vec(),
            Primitive::U8(value) => vec![value],
            Primitive::I16(value) => value.to_le_bytes().to_vec(),
            Primitive::U16(value) | Primitive::Char(value) => value.to_le_bytes().to_vec(),
            Primitive::I32(value) => value.to_le_bytes().to_vec(),
            Primitive::U32(value) => value.to_le_bytes().to_vec(),
            Primitive::I64(value) => value.to_le_bytes().to_vec(),
            Primitive::U64(value) => value.to_le_bytes().to_vec(),
            Primitive::F32(value) => value.to_le_bytes().to_vec(),
            Primitive::F64(value) => value.to_le_bytes().to_vec(),
        }
    }

    /// Returns `true` for integer variants, the only valid enum representations.
    #[must_use]
    pub fn is_integer(self) -> bool {
        !matches!(
            self,
            Primitive::Bool(_) | Primitive::F32(_) | Primitive::F64(_)
        )
    }
}

macro_rules! primitive_from {
    ($($ty:ty => $variant:ident),*) => {
        $(
            impl From<$ty> for Primitive {
                fn from(value: $ty) -> Self {
                    Primitive::$variant(value)
                }
            }

            impl From<$ty> for Argument<'_> {
                fn from(value: $ty) -> Self {
                    Argument::Primitive(Primitive::$variant(value))
                }
            }
        )*
    };
}

primitive_from!(
    bool => Bool, i8 => I8, u8 => U8, i16 => I16, u16 => U16, i32 => I32, u32 => U32,
    i64 => I64, u64 => U64, f32 => F32, f64 => F64
);

/// A class named by assembly, namespace and name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRef<'a> {
    /// Declaring assembly, with or without `.dll`
    pub assembly: &'a str,
    /// Namespace, empty for the global namespace
    pub namespace: &'a str,
    /// Simple class name
    pub name: &'a str,
}

/// A host value to be passed to a foreign method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Argument<'a> {
    /// A null reference
    Null,
    /// An existing foreign object, passed through
    Object(ObjectHandle),
    /// Text, converted to a runtime string
    Text(&'a str),
    /// A type, passed as its `System.Type` object
    Type(TypeRef<'a>),
    /// A scalar value
    Primitive(Primitive),
    /// An enum, passed as its underlying integer
    Enum(Primitive),
    /// Raw bytes of a value type aggregate
    Struct(&'a [u8]),
    /// A value that cannot be represented; passed as null with a warning
    Unsupported(&'a str),
}

impl<'a> Argument<'a> {
    /// Passes a blittable value type by value.
    #[must_use]
    pub fn value<T: Blittable>(value: &'a T) -> Self {
        Argument::Struct(bytes_of(value))
    }

    /// Passes an enum through its underlying integer.
    #[must_use]
    pub fn enumeration(value: impl Into<Primitive>) -> Self {
        Argument::Enum(value.into())
    }

    /// Passes the `System.Type` of a class.
    #[must_use]
    pub fn type_of(assembly: &'a str, namespace: &'a str, name: &'a str) -> Self {
        Argument::Type(TypeRef {
            assembly,
            namespace,
            name,
        })
    }
}

impl From<ObjectHandle> for Argument<'_> {
    fn from(value: ObjectHandle) -> Self {
        Argument::Object(value)
    }
}

impl From<Option<ObjectHandle>> for Argument<'_> {
    fn from(value: Option<ObjectHandle>) -> Self {
        value.map_or(Argument::Null, Argument::Object)
    }
}

impl<'a> From<&'a str> for Argument<'a> {
    fn from(value: &'a str) -> Self {
        Argument::Text(value)
    }
}

/// Native argument pointers together with the buffers they point into.
#[derive(Debug, Default)]
pub struct MarshaledArgs {
    pointers: Vec<*mut c_void>,
    buffers: Vec<(usize, usize, Box<[u64]>)>,
    warnings: Vec<String>,
}

impl MarshaledArgs {
    /// Creates an empty argument list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The argument pointers, in order, as passed to `runtime_invoke`.
    #[must_use]
    pub fn pointers(&self) -> &[*mut c_void] {
        &self.pointers
    }

    /// Number of marshaled arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    /// Returns `true` if there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    /// Descriptions of arguments that were replaced by null.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Consumes the arguments, returning the warnings.
    #[must_use]
    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }

    /// The owned bytes behind argument `index`, if it is buffer-backed.
    #[must_use]
    pub fn buffer(&self, index: usize) -> Option<&[u8]> {
        self.buffers
            .iter()
            .find(|(argument, _, _)| *argument == index)
            .map(|(_, len, words)| {
                let bytes = unsafe {
                    std::slice::from_raw_parts(words.as_ptr().cast::<u8>(), words.len() * 8)
                };
                &bytes[..*len]
            })
    }

    pub(crate) fn push_pointer(&mut self, pointer: *mut c_void) {
        self.pointers.push(pointer);
    }

    pub(crate) fn push_buffer(&mut self, bytes: &[u8]) {
        let words = bytes.len().div_ceil(8).max(1);
        let mut buffer = vec![0_u64; words].into_boxed_slice();

        // The buffer holds at least `bytes.len()` bytes
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                buffer.as_mut_ptr().cast::<u8>(),
                bytes.len(),
            );
        }

        let pointer = buffer.as_mut_ptr().cast::<c_void>();
        self.buffers.push((self.pointers.len(), bytes.len(), buffer));
        self.pointers.push(pointer);
    }

    pub(crate) fn push_null_with_warning(&mut self, error: &Error) {
        log::warn!(
            "argument {} passed as null: {}",
            self.pointers.len(),
            error
        );
        self.warnings
            .push(format!("argument {}: {}", self.pointers.len(), error));
        self.pointers.push(std::ptr::null_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_bytes_are_not_widened() {
        assert_eq!(Primitive::Bool(true).to_bytes(), vec![1]);
        assert_eq!(Primitive::I16(-2).to_bytes(), vec![0xFE, 0xFF]);
        assert_eq!(Primitive::F32(1.5).to_bytes(), 1.5_f32.to_le_bytes().to_vec());
        assert_eq!(Primitive::U64(1).to_bytes().len(), 8);
    }

    #[test]
    fn buffers_are_aligned_and_owned() {
        let mut args = MarshaledArgs::new();
        args.push_pointer(std::ptr::null_mut());
        args.push_buffer(&[1, 2, 3]);
        args.push_buffer(&[0xAA; 12]);

        assert_eq!(args.len(), 3);
        assert_eq!(args.pointers()[1] as usize % 8, 0);
        assert_eq!(args.buffer(1), Some(&[1_u8, 2, 3][..]));
        assert_eq!(args.buffer(2).unwrap().len(), 12);
        assert_eq!(args.buffer(0), None);

        let first = unsafe { *args.pointers()[1].cast::<u8>() };
        assert_eq!(first, 1);
    }

    #[test]
    fn argument_conversions() {
        assert_eq!(Argument::from(5_i32), Argument::Primitive(Primitive::I32(5)));
        assert_eq!(Argument::from(None), Argument::Null);
        assert_eq!(Argument::from("hi"), Argument::Text("hi"));
        assert_eq!(
            Argument::enumeration(3_u8),
            Argument::Enum(Primitive::U8(3))
        );
        assert!(!Primitive::F64(0.0).is_integer());
    }
}
