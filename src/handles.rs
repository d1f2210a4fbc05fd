//! Typed handles to foreign runtime entities.
//!
//! Every pointer handed out by the foreign runtime is wrapped in a dedicated, non-null handle
//! type so that classes, methods, fields and objects cannot be confused with each other. A null
//! foreign pointer is modelled as `Option::None`.
//!
//! All direct reads of foreign object memory live on these handles. The offsets they use are
//! versioned ABI facts of the 64-bit runtime and are collected in [`layout`].
//!
//! # Safety
//!
//! Handles are created with `from_raw`, which is `unsafe`: the caller promises that the pointer
//! refers to a live foreign entity of the corresponding kind. Every accessor relies on that
//! promise. Handles are plain copies of the pointer and do not keep the entity alive.

use std::{ffi::c_void, fmt, ptr::NonNull};

use widestring::U16Str;

/// Object layout constants of the 64-bit runtime ABI.
pub mod layout {
    /// Size of the header preceding every boxed value (type descriptor + monitor)
    pub const OBJECT_HEADER_SIZE: usize = 0x10;
    /// Offset of the `i32` length in a string object
    pub const STRING_LENGTH_OFFSET: usize = 0x10;
    /// Offset of the first UTF-16 code unit in a string object
    pub const STRING_CHARS_OFFSET: usize = 0x14;
    /// Offset of the length in an array object
    pub const ARRAY_LENGTH_OFFSET: usize = 0x18;
    /// Offset of the first element in an array object
    pub const ARRAY_DATA_OFFSET: usize = 0x20;
    /// Arrays reporting more elements than this are treated as corrupt
    pub const MAX_ARRAY_LENGTH: i64 = 100_000;
    /// Offset of the native code pointer in a method descriptor
    pub const METHOD_POINTER_OFFSET: usize = 0x0;
    /// Offset of the `i32` instance offset in a field descriptor
    pub const FIELD_OFFSET_OFFSET: usize = 0x18;
    /// Offset of the `u32` instance size in a class descriptor
    pub const CLASS_INSTANCE_SIZE_OFFSET: usize = 0x100;
    /// Size of a reference in arrays and fields
    pub const POINTER_SIZE: usize = 0x8;
}

macro_rules! foreign_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(NonNull<c_void>);

        // Handles are opaque identities; the runtime synchronises access to the entities.
        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}

        impl $name {
            /// Wraps a foreign pointer, returning `None` for null.
            ///
            /// # Safety
            ///
            /// A non-null `ptr` must point to a live foreign entity of this kind.
            #[must_use]
            pub unsafe fn from_raw(ptr: *mut c_void) -> Option<Self> {
                NonNull::new(ptr).map($name)
            }

            /// Wraps a foreign address, returning `None` for zero.
            ///
            /// # Safety
            ///
            /// See [`Self::from_raw`].
            #[must_use]
            pub unsafe fn from_addr(address: u64) -> Option<Self> {
                Self::from_raw(address as usize as *mut c_void)
            }

            /// The raw foreign pointer.
            #[must_use]
            pub fn as_ptr(self) -> *mut c_void {
                self.0.as_ptr()
            }

            /// The foreign pointer as an address.
            #[must_use]
            pub fn addr(self) -> u64 {
                self.0.as_ptr() as usize as u64
            }

            /// Reads a `T` at `offset` bytes into the entity.
            ///
            /// # Safety
            ///
            /// `offset..offset + size_of::<T>()` must lie inside the entity and hold a valid `T`.
            pub(crate) unsafe fn read_at<T: Copy>(self, offset: usize) -> T {
                self.0
                    .as_ptr()
                    .cast::<u8>()
                    .add(offset)
                    .cast::<T>()
                    .read_unaligned()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{:x})", stringify!($name), self.addr())
            }
        }
    };
}

foreign_handle!(
    /// The runtime application domain.
    DomainHandle
);
foreign_handle!(
    /// Registration token of a thread attached to the runtime.
    ThreadHandle
);
foreign_handle!(
    /// A loaded assembly.
    AssemblyHandle
);
foreign_handle!(
    /// The metadata image of an assembly.
    ImageHandle
);
foreign_handle!(
    /// A class descriptor.
    ClassHandle
);
foreign_handle!(
    /// A type descriptor (`Il2CppType`), not the reflection object.
    TypeHandle
);
foreign_handle!(
    /// A method descriptor.
    MethodHandle
);
foreign_handle!(
    /// A field descriptor.
    FieldHandle
);
foreign_handle!(
    /// A property descriptor.
    PropertyHandle
);
foreign_handle!(
    /// Any managed object, including strings, arrays and boxed values.
    ObjectHandle
);

impl MethodHandle {
    /// Native code address of the compiled method body, `None` when the method has no body.
    #[must_use]
    pub fn pointer(self) -> Option<u64> {
        let address: u64 = unsafe { self.read_at(layout::METHOD_POINTER_OFFSET) };
        (address != 0).then_some(address)
    }
}

impl FieldHandle {
    /// Byte offset of the field inside an instance, header included.
    #[must_use]
    pub fn offset(self) -> i32 {
        unsafe { self.read_at(layout::FIELD_OFFSET_OFFSET) }
    }
}

impl ClassHandle {
    /// Size of an instance of the class in bytes, header included.
    #[must_use]
    pub fn instance_size(self) -> u32 {
        unsafe { self.read_at(layout::CLASS_INSTANCE_SIZE_OFFSET) }
    }
}

impl ObjectHandle {
    /// Pointer to the payload of a boxed value, just past the object header.
    #[must_use]
    pub fn payload(self) -> *mut u8 {
        unsafe { self.as_ptr().cast::<u8>().add(layout::OBJECT_HEADER_SIZE) }
    }

    /// Reads the payload of a boxed value as `T`.
    ///
    /// # Safety
    ///
    /// The object must be a boxed `T`.
    pub unsafe fn unbox<T: Copy>(self) -> T {
        self.read_at(layout::OBJECT_HEADER_SIZE)
    }

    /// Decodes a string object into host text.
    ///
    /// Negative lengths decode to an empty string; unpaired surrogates are replaced.
    ///
    /// # Safety
    ///
    /// The object must be a runtime string.
    pub unsafe fn read_string(self) -> String {
        let length: i32 = self.read_at(layout::STRING_LENGTH_OFFSET);
        if length <= 0 {
            return String::new();
        }

        let chars = self
            .as_ptr()
            .cast::<u8>()
            .add(layout::STRING_CHARS_OFFSET)
            .cast::<u16>();
        U16Str::from_ptr(chars, length as usize).to_string_lossy()
    }

    /// Raw length field of an array object.
    ///
    /// # Safety
    ///
    /// The object must be a runtime array.
    pub unsafe fn array_length(self) -> i64 {
        self.read_at(layout::ARRAY_LENGTH_OFFSET)
    }

    /// Pointer to the first element of an array object.
    #[must_use]
    pub fn array_data(self) -> *mut u8 {
        unsafe { self.as_ptr().cast::<u8>().add(layout::ARRAY_DATA_OFFSET) }
    }

    /// Stores a reference into slot `index` of a reference-typed array.
    ///
    /// # Safety
    ///
    /// The object must be a reference array with more than `index` elements.
    pub unsafe fn set_array_reference(self, index: usize, value: Option<ObjectHandle>) {
        let slot = self
            .array_data()
            .add(index * layout::POINTER_SIZE)
            .cast::<*mut c_void>();
        slot.write_unaligned(value.map_or(std::ptr::null_mut(), ObjectHandle::as_ptr));
    }
}
