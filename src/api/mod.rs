//! The runtime API surface.
//!
//! [`RuntimeApi`] is the seam between the bridge and the foreign runtime. [`ApiTable`] implements
//! it over function pointers bound from a [`crate::resolver::SymbolSource`]; tests implement it
//! with an in-memory double. Everything above this module talks to the runtime exclusively
//! through the trait and typed handles.
//!
//! # Key Components
//!
//! - [`RuntimeApi`] - Safe, typed view of the runtime's exported functions
//! - [`ApiTable`] - Bound function pointers, the only place raw signatures are declared
//! - [`RuntimeSymbol`] - The versioned symbol set, with required/optional classification
//! - [`InvocationResult`] - Return object and exception of a foreign call
//!
//! # Optional symbols
//!
//! Methods backed by optional symbols degrade gracefully when the symbol is not bound: lookups
//! return `None`, predicates return `false` and enumerations return nothing.

mod symbols;
mod table;

pub use symbols::RuntimeSymbol;
pub use table::ApiTable;

use std::ffi::c_void;

use crate::{
    handles::{
        AssemblyHandle, ClassHandle, DomainHandle, FieldHandle, ImageHandle, MethodHandle,
        ObjectHandle, PropertyHandle, ThreadHandle, TypeHandle,
    },
    marshal::FromReturn,
    Error::{ForeignException, LookupMiss},
    Result,
};

/// Image names of the core library, old and new runtime generations.
pub const CORLIB_NAMES: &[&str] = &["mscorlib", "System.Private.CoreLib"];

/// Outcome of a foreign method invocation.
///
/// When `exception` is set the call failed inside the runtime and `value` must not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationResult {
    /// Returned object; primitives and structs come back boxed
    pub value: Option<ObjectHandle>,
    /// Exception raised by the callee
    pub exception: Option<ObjectHandle>,
    /// Arguments that could not be marshaled and were passed as null
    pub warnings: Vec<String>,
}

impl InvocationResult {
    /// Creates a result from the raw invoke outcome.
    #[must_use]
    pub fn new(value: Option<ObjectHandle>, exception: Option<ObjectHandle>) -> Self {
        InvocationResult {
            value,
            exception,
            warnings: Vec::new(),
        }
    }

    /// Returns `true` if the callee raised an exception.
    #[must_use]
    pub fn is_exception(&self) -> bool {
        self.exception.is_some()
    }

    /// Converts the returned object into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ForeignException`] if the callee raised an exception; the return
    /// value is not touched in that case.
    pub fn value<T: FromReturn>(&self) -> Result<T> {
        if let Some(exception) = self.exception {
            return Err(ForeignException(exception));
        }

        // The runtime guarantees the returned object matches the method's return type
        Ok(unsafe { T::from_return(self.value) })
    }
}

/// Typed access to the foreign runtime.
///
/// Implementations must be callable from any thread that has been attached with
/// [`RuntimeApi::thread_attach`].
pub trait RuntimeApi: Send + Sync {
    /// The current application domain.
    fn domain(&self) -> Option<DomainHandle>;

    /// Registers the calling thread with `domain`.
    fn thread_attach(&self, domain: DomainHandle) -> Option<ThreadHandle>;

    /// Unregisters a thread; returns `false` if detaching is not supported.
    fn thread_detach(&self, thread: ThreadHandle) -> bool;

    /// All assemblies loaded into `domain`, in load order.
    fn assemblies(&self, domain: DomainHandle) -> Vec<AssemblyHandle>;

    /// The metadata image of `assembly`.
    fn assembly_image(&self, assembly: AssemblyHandle) -> Option<ImageHandle>;

    /// The file name of `image`, usually including `.dll`.
    fn image_name(&self, image: ImageHandle) -> Option<String>;

    /// Looks up a class by namespace and name inside one image.
    fn class_from_name(&self, image: ImageHandle, namespace: &str, name: &str)
        -> Option<ClassHandle>;

    /// Looks up a method by exact name and parameter count; `-1` lets the runtime pick any.
    fn method_from_name(&self, class: ClassHandle, name: &str, arity: i32)
        -> Option<MethodHandle>;

    /// Looks up a field by name.
    fn field_from_name(&self, class: ClassHandle, name: &str) -> Option<FieldHandle>;

    /// Looks up a property by name.
    fn property_from_name(&self, class: ClassHandle, name: &str) -> Option<PropertyHandle>;

    /// The getter of `property`.
    fn property_getter(&self, property: PropertyHandle) -> Option<MethodHandle>;

    /// The setter of `property`.
    fn property_setter(&self, property: PropertyHandle) -> Option<MethodHandle>;

    /// Copies the value of an instance field into `out`.
    ///
    /// `out` must be at least as large as the field.
    fn field_get_value(&self, object: ObjectHandle, field: FieldHandle, out: &mut [u8]);

    /// Overwrites an instance field with `value`.
    fn field_set_value(&self, object: ObjectHandle, field: FieldHandle, value: &[u8]);

    /// Copies the value of a static field into `out`.
    fn field_static_get_value(&self, field: FieldHandle, out: &mut [u8]);

    /// Overwrites a static field with `value`.
    fn field_static_set_value(&self, field: FieldHandle, value: &[u8]);

    /// Allocates an uninitialised instance of `class`.
    fn object_new(&self, class: ClassHandle) -> Option<ObjectHandle>;

    /// Creates a runtime string; `None` for text with interior NULs.
    fn string_new(&self, text: &str) -> Option<ObjectHandle>;

    /// Invokes `method` on `instance` (or statically) with pre-marshaled arguments.
    fn runtime_invoke(
        &self,
        method: MethodHandle,
        instance: Option<ObjectHandle>,
        args: &[*mut c_void],
    ) -> InvocationResult;

    /// Boxes the raw bytes of a value type.
    fn value_box(&self, class: ClassHandle, data: &[u8]) -> Option<ObjectHandle>;

    /// The type descriptor of `class`.
    fn class_type(&self, class: ClassHandle) -> Option<TypeHandle>;

    /// The `System.Type` object of a type descriptor.
    fn type_object(&self, ty: TypeHandle) -> Option<ObjectHandle>;

    /// The class of `object`.
    fn object_class(&self, object: ObjectHandle) -> Option<ClassHandle>;

    /// The simple name of `class`.
    fn class_name(&self, class: ClassHandle) -> Option<String>;

    /// The namespace of `class`; empty for the global namespace.
    fn class_namespace(&self, class: ClassHandle) -> Option<String>;

    /// Returns `true` if `class` is a value type.
    fn class_is_valuetype(&self, class: ClassHandle) -> bool;

    /// Returns `true` if `class` is an enum.
    fn class_is_enum(&self, class: ClassHandle) -> bool;

    /// Allocates a zeroed array of `length` elements of `element`.
    fn array_new(&self, element: ClassHandle, length: usize) -> Option<ObjectHandle>;

    /// The `MethodInfo` reflection object of `method`.
    fn method_object(&self, method: MethodHandle, class: Option<ClassHandle>)
        -> Option<ObjectHandle>;

    /// The method descriptor behind a `MethodInfo` reflection object.
    fn method_from_reflection(&self, object: ObjectHandle) -> Option<MethodHandle>;

    /// All classes defined in `image`.
    fn image_classes(&self, image: ImageHandle) -> Vec<ClassHandle>;

    /// All methods declared by `class`.
    fn class_methods(&self, class: ClassHandle) -> Vec<MethodHandle>;

    /// The name of `method`.
    fn method_name(&self, method: MethodHandle) -> Option<String>;

    /// The number of parameters of `method`.
    fn method_param_count(&self, method: MethodHandle) -> u32;

    /// The `MethodAttributes` flags of `method`.
    fn method_flags(&self, method: MethodHandle) -> u32;

    /// Finds the image of a loaded assembly by name, with or without the `.dll` extension.
    fn image_named(&self, name: &str) -> Option<ImageHandle> {
        let domain = self.domain()?;
        self.assemblies(domain)
            .into_iter()
            .filter_map(|assembly| self.assembly_image(assembly))
            .find(|image| {
                self.image_name(*image)
                    .is_some_and(|image_name| assembly_name_matches(&image_name, name))
            })
    }

    /// Instantiates a generic method over concrete type arguments.
    ///
    /// Goes through reflection: the method's `MethodInfo` is asked to `MakeGenericMethod` with a
    /// `Type[]` built from `type_args`, and the resulting `MethodInfo` is mapped back to a method
    /// descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LookupMiss`] if a reflection building block is unavailable, and
    /// [`crate::Error::ForeignException`] if the instantiation throws (for example because a
    /// constraint is violated).
    fn inflate_generic(
        &self,
        method: MethodHandle,
        type_args: &[ClassHandle],
    ) -> Result<Option<MethodHandle>> {
        let corlib = CORLIB_NAMES
            .iter()
            .find_map(|name| self.image_named(name))
            .ok_or_else(|| LookupMiss("core library image".to_string()))?;
        let type_class = self
            .class_from_name(corlib, "System", "Type")
            .ok_or_else(|| LookupMiss("System.Type".to_string()))?;
        let method_info = self
            .class_from_name(corlib, "System.Reflection", "MethodInfo")
            .ok_or_else(|| LookupMiss("System.Reflection.MethodInfo".to_string()))?;
        let make_generic = self
            .method_from_name(method_info, "MakeGenericMethod", 1)
            .ok_or_else(|| LookupMiss("MethodInfo.MakeGenericMethod".to_string()))?;

        let reflected = self
            .method_object(method, None)
            .ok_or_else(|| LookupMiss(format!("reflection object of {:?}", method)))?;
        let types = self
            .array_new(type_class, type_args.len())
            .ok_or_else(|| LookupMiss("System.Type[] allocation".to_string()))?;

        for (index, class) in type_args.iter().enumerate() {
            let type_object = self
                .class_type(*class)
                .and_then(|ty| self.type_object(ty))
                .ok_or_else(|| LookupMiss(format!("type object of {:?}", class)))?;

            // `types` was allocated with `type_args.len()` reference slots
            unsafe { types.set_array_reference(index, Some(type_object)) };
        }

        let result = self.runtime_invoke(make_generic, Some(reflected), &[types.as_ptr()]);
        if let Some(exception) = result.exception {
            return Err(ForeignException(exception));
        }

        Ok(result
            .value
            .and_then(|inflated| self.method_from_reflection(inflated)))
    }
}

/// Compares an image name against an assembly name, ignoring a `.dll` extension on either.
#[must_use]
pub fn assembly_name_matches(image_name: &str, assembly: &str) -> bool {
    let image_name = image_name.strip_suffix(".dll").unwrap_or(image_name);
    let assembly = assembly.strip_suffix(".dll").unwrap_or(assembly);
    image_name == assembly
}
