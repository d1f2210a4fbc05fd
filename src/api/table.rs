//! Bound runtime function pointers.
//!
//! This is the only place where the raw C signatures of the runtime are spelled out. Every
//! pointer is optional; [`ApiTable::is_valid`] tells whether all required ones are present.

use std::{
    collections::HashMap,
    ffi::{c_char, c_void, CStr, CString},
    fmt,
    ptr,
};

use rayon::prelude::*;
use strum::IntoEnumIterator;

use crate::{
    api::{InvocationResult, RuntimeApi, RuntimeSymbol},
    handles::{
        AssemblyHandle, ClassHandle, DomainHandle, FieldHandle, ImageHandle, MethodHandle,
        ObjectHandle, PropertyHandle, ThreadHandle, TypeHandle,
    },
    resolver::SymbolSource,
};

type Ptr = *mut c_void;
type Text = *const c_char;

macro_rules! api_table {
    ($( $field:ident : $symbol:ident = fn($($arg:ty),*) $(-> $ret:ty)?; )*) => {
        /// Function pointers of the runtime, bound once at bring-up.
        ///
        /// The table is immutable after [`ApiTable::bind`] and can be shared freely between
        /// threads.
        #[derive(Default)]
        pub struct ApiTable {
            $( $field: Option<unsafe extern "C" fn($($arg),*) $(-> $ret)?>, )*
        }

        impl ApiTable {
            unsafe fn from_addresses(addresses: &HashMap<RuntimeSymbol, u64>) -> ApiTable {
                ApiTable {
                    $(
                        $field: addresses.get(&RuntimeSymbol::$symbol).map(|address| unsafe {
                            std::mem::transmute::<usize, unsafe extern "C" fn($($arg),*) $(-> $ret)?>(
                                *address as usize,
                            )
                        }),
                    )*
                }
            }

            /// Returns `true` if `symbol` has a bound function pointer.
            #[must_use]
            pub fn bound(&self, symbol: RuntimeSymbol) -> bool {
                match symbol {
                    $( RuntimeSymbol::$symbol => self.$field.is_some(), )*
                }
            }
        }
    };
}

api_table! {
    domain_get: DomainGet = fn() -> Ptr;
    thread_attach: ThreadAttach = fn(Ptr) -> Ptr;
    thread_detach: ThreadDetach = fn(Ptr);
    domain_get_assemblies: DomainGetAssemblies = fn(Ptr, *mut usize) -> *mut Ptr;
    assembly_get_image: AssemblyGetImage = fn(Ptr) -> Ptr;
    image_get_name: ImageGetName = fn(Ptr) -> Text;
    class_from_name: ClassFromName = fn(Ptr, Text, Text) -> Ptr;
    class_get_method_from_name: ClassGetMethodFromName = fn(Ptr, Text, i32) -> Ptr;
    class_get_field_from_name: ClassGetFieldFromName = fn(Ptr, Text) -> Ptr;
    class_get_property_from_name: ClassGetPropertyFromName = fn(Ptr, Text) -> Ptr;
    property_get_get_method: PropertyGetGetMethod = fn(Ptr) -> Ptr;
    property_get_set_method: PropertyGetSetMethod = fn(Ptr) -> Ptr;
    field_get_value: FieldGetValue = fn(Ptr, Ptr, Ptr);
    field_set_value: FieldSetValue = fn(Ptr, Ptr, Ptr);
    field_static_get_value: FieldStaticGetValue = fn(Ptr, Ptr);
    field_static_set_value: FieldStaticSetValue = fn(Ptr, Ptr);
    object_new: ObjectNew = fn(Ptr) -> Ptr;
    string_new: StringNew = fn(Text) -> Ptr;
    runtime_invoke: RuntimeInvoke = fn(Ptr, Ptr, *mut Ptr, *mut Ptr) -> Ptr;
    value_box: ValueBox = fn(Ptr, Ptr) -> Ptr;
    class_get_type: ClassGetType = fn(Ptr) -> Ptr;
    type_get_object: TypeGetObject = fn(Ptr) -> Ptr;
    object_get_class: ObjectGetClass = fn(Ptr) -> Ptr;
    class_get_name: ClassGetName = fn(Ptr) -> Text;
    class_get_namespace: ClassGetNamespace = fn(Ptr) -> Text;
    class_is_valuetype: ClassIsValuetype = fn(Ptr) -> bool;
    class_is_enum: ClassIsEnum = fn(Ptr) -> bool;
    array_new: ArrayNew = fn(Ptr, usize) -> Ptr;
    method_get_object: MethodGetObject = fn(Ptr, Ptr) -> Ptr;
    method_get_from_reflection: MethodGetFromReflection = fn(Ptr) -> Ptr;
    image_get_class_count: ImageGetClassCount = fn(Ptr) -> usize;
    image_get_class: ImageGetClass = fn(Ptr, usize) -> Ptr;
    class_get_methods: ClassGetMethods = fn(Ptr, *mut Ptr) -> Ptr;
    method_get_name: MethodGetName = fn(Ptr) -> Text;
    method_get_param_count: MethodGetParamCount = fn(Ptr) -> u32;
    method_get_flags: MethodGetFlags = fn(Ptr, *mut u32) -> u32;
}

impl ApiTable {
    /// Resolves every runtime symbol through `source` and binds the results.
    ///
    /// Symbols are resolved in parallel. Missing required symbols are logged; check
    /// [`ApiTable::is_valid`] before using the table.
    ///
    /// # Safety
    ///
    /// Every address produced by `source` must be the entry point of the corresponding runtime
    /// function in a module that stays loaded while the table is in use.
    pub unsafe fn bind(source: &dyn SymbolSource) -> ApiTable {
        let symbols: Vec<RuntimeSymbol> = RuntimeSymbol::iter().collect();
        let addresses: HashMap<RuntimeSymbol, u64> = symbols
            .par_iter()
            .filter_map(|symbol| {
                source
                    .resolve_symbol(symbol.name())
                    .filter(|address| *address != 0)
                    .map(|address| (*symbol, address))
            })
            .collect();

        for symbol in &symbols {
            if addresses.contains_key(symbol) {
                continue;
            }
            if symbol.is_required() {
                log::warn!("required runtime symbol {} is unresolved", symbol);
            } else {
                log::debug!("optional runtime symbol {} is unresolved", symbol);
            }
        }

        log::info!(
            "bound {} of {} runtime symbols",
            addresses.len(),
            symbols.len()
        );
        Self::from_addresses(&addresses)
    }

    /// Returns `true` if every required symbol is bound.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        RuntimeSymbol::iter().all(|symbol| !symbol.is_required() || self.bound(symbol))
    }

    /// Required symbols without a bound function pointer.
    #[must_use]
    pub fn missing(&self) -> Vec<RuntimeSymbol> {
        RuntimeSymbol::iter()
            .filter(|symbol| symbol.is_required() && !self.bound(*symbol))
            .collect()
    }

    /// Number of bound symbols, required and optional.
    #[must_use]
    pub fn bound_count(&self) -> usize {
        RuntimeSymbol::iter()
            .filter(|symbol| self.bound(*symbol))
            .count()
    }
}

impl fmt::Debug for ApiTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiTable")
            .field("bound", &self.bound_count())
            .field("missing", &self.missing())
            .finish()
    }
}

unsafe fn owned_text(text: Text) -> Option<String> {
    if text.is_null() {
        return None;
    }
    Some(CStr::from_ptr(text).to_string_lossy().into_owned())
}

fn instance_ptr(instance: Option<ObjectHandle>) -> Ptr {
    instance.map_or(ptr::null_mut(), ObjectHandle::as_ptr)
}

// All calls go through pointers bound under the contract of `ApiTable::bind`, with handles that
// were produced by the same runtime.
impl RuntimeApi for ApiTable {
    fn domain(&self) -> Option<DomainHandle> {
        let f = self.domain_get?;
        unsafe { DomainHandle::from_raw(f()) }
    }

    fn thread_attach(&self, domain: DomainHandle) -> Option<ThreadHandle> {
        let f = self.thread_attach?;
        unsafe { ThreadHandle::from_raw(f(domain.as_ptr())) }
    }

    fn thread_detach(&self, thread: ThreadHandle) -> bool {
        let Some(f) = self.thread_detach else {
            return false;
        };
        unsafe { f(thread.as_ptr()) };
        true
    }

    fn assemblies(&self, domain: DomainHandle) -> Vec<AssemblyHandle> {
        let Some(f) = self.domain_get_assemblies else {
            return Vec::new();
        };

        let mut count = 0_usize;
        let list = unsafe { f(domain.as_ptr(), &mut count) };
        if list.is_null() || count == 0 {
            return Vec::new();
        }

        unsafe { std::slice::from_raw_parts(list, count) }
            .iter()
            .filter_map(|assembly| unsafe { AssemblyHandle::from_raw(*assembly) })
            .collect()
    }

    fn assembly_image(&self, assembly: AssemblyHandle) -> Option<ImageHandle> {
        let f = self.assembly_get_image?;
        unsafe { ImageHandle::from_raw(f(assembly.as_ptr())) }
    }

    fn image_name(&self, image: ImageHandle) -> Option<String> {
        let f = self.image_get_name?;
        unsafe { owned_text(f(image.as_ptr())) }
    }

    fn class_from_name(
        &self,
        image: ImageHandle,
        namespace: &str,
        name: &str,
    ) -> Option<ClassHandle> {
        let f = self.class_from_name?;
        let namespace = CString::new(namespace).ok()?;
        let name = CString::new(name).ok()?;
        unsafe { ClassHandle::from_raw(f(image.as_ptr(), namespace.as_ptr(), name.as_ptr())) }
    }

    fn method_from_name(
        &self,
        class: ClassHandle,
        name: &str,
        arity: i32,
    ) -> Option<MethodHandle> {
        let f = self.class_get_method_from_name?;
        let name = CString::new(name).ok()?;
        unsafe { MethodHandle::from_raw(f(class.as_ptr(), name.as_ptr(), arity)) }
    }

    fn field_from_name(&self, class: ClassHandle, name: &str) -> Option<FieldHandle> {
        let f = self.class_get_field_from_name?;
        let name = CString::new(name).ok()?;
        unsafe { FieldHandle::from_raw(f(class.as_ptr(), name.as_ptr())) }
    }

    fn property_from_name(&self, class: ClassHandle, name: &str) -> Option<PropertyHandle> {
        let f = self.class_get_property_from_name?;
        let name = CString::new(name).ok()?;
        unsafe { PropertyHandle::from_raw(f(class.as_ptr(), name.as_ptr())) }
    }

    fn property_getter(&self, property: PropertyHandle) -> Option<MethodHandle> {
        let f = self.property_get_get_method?;
        unsafe { MethodHandle::from_raw(f(property.as_ptr())) }
    }

    fn property_setter(&self, property: PropertyHandle) -> Option<MethodHandle> {
        let f = self.property_get_set_method?;
        unsafe { MethodHandle::from_raw(f(property.as_ptr())) }
    }

    fn field_get_value(&self, object: ObjectHandle, field: FieldHandle, out: &mut [u8]) {
        if let Some(f) = self.field_get_value {
            unsafe { f(object.as_ptr(), field.as_ptr(), out.as_mut_ptr().cast()) };
        }
    }

    fn field_set_value(&self, object: ObjectHandle, field: FieldHandle, value: &[u8]) {
        if let Some(f) = self.field_set_value {
            unsafe { f(object.as_ptr(), field.as_ptr(), value.as_ptr().cast_mut().cast()) };
        }
    }

    fn field_static_get_value(&self, field: FieldHandle, out: &mut [u8]) {
        if let Some(f) = self.field_static_get_value {
            unsafe { f(field.as_ptr(), out.as_mut_ptr().cast()) };
        }
    }

    fn field_static_set_value(&self, field: FieldHandle, value: &[u8]) {
        if let Some(f) = self.field_static_set_value {
            unsafe { f(field.as_ptr(), value.as_ptr().cast_mut().cast()) };
        }
    }

    fn object_new(&self, class: ClassHandle) -> Option<ObjectHandle> {
        let f = self.object_new?;
        unsafe { ObjectHandle::from_raw(f(class.as_ptr())) }
    }

    fn string_new(&self, text: &str) -> Option<ObjectHandle> {
        let f = self.string_new?;
        let text = CString::new(text).ok()?;
        unsafe { ObjectHandle::from_raw(f(text.as_ptr())) }
    }

    fn runtime_invoke(
        &self,
        method: MethodHandle,
        instance: Option<ObjectHandle>,
        args: &[*mut c_void],
    ) -> InvocationResult {
        let Some(f) = self.runtime_invoke else {
            return InvocationResult::default();
        };

        let mut exception: Ptr = ptr::null_mut();
        let value = unsafe {
            f(
                method.as_ptr(),
                instance_ptr(instance),
                args.as_ptr().cast_mut(),
                &mut exception,
            )
        };

        unsafe {
            InvocationResult::new(
                ObjectHandle::from_raw(value),
                ObjectHandle::from_raw(exception),
            )
        }
    }

    fn value_box(&self, class: ClassHandle, data: &[u8]) -> Option<ObjectHandle> {
        let f = self.value_box?;
        unsafe { ObjectHandle::from_raw(f(class.as_ptr(), data.as_ptr().cast_mut().cast())) }
    }

    fn class_type(&self, class: ClassHandle) -> Option<TypeHandle> {
        let f = self.class_get_type?;
        unsafe { TypeHandle::from_raw(f(class.as_ptr())) }
    }

    fn type_object(&self, ty: TypeHandle) -> Option<ObjectHandle> {
        let f = self.type_get_object?;
        unsafe { ObjectHandle::from_raw(f(ty.as_ptr())) }
    }

    fn object_class(&self, object: ObjectHandle) -> Option<ClassHandle> {
        let f = self.object_get_class?;
        unsafe { ClassHandle::from_raw(f(object.as_ptr())) }
    }

    fn class_name(&self, class: ClassHandle) -> Option<String> {
        let f = self.class_get_name?;
        unsafe { owned_text(f(class.as_ptr())) }
    }

    fn class_namespace(&self, class: ClassHandle) -> Option<String> {
        let f = self.class_get_namespace?;
        unsafe { owned_text(f(class.as_ptr())) }
    }

    fn class_is_valuetype(&self, class: ClassHandle) -> bool {
        self.class_is_valuetype
            .is_some_and(|f| unsafe { f(class.as_ptr()) })
    }

    fn class_is_enum(&self, class: ClassHandle) -> bool {
        self.class_is_enum
            .is_some_and(|f| unsafe { f(class.as_ptr()) })
    }

    fn array_new(&self, element: ClassHandle, length: usize) -> Option<ObjectHandle> {
        let f = self.array_new?;
        unsafe { ObjectHandle::from_raw(f(element.as_ptr(), length)) }
    }

    fn method_object(
        &self,
        method: MethodHandle,
        class: Option<ClassHandle>,
    ) -> Option<ObjectHandle> {
        let f = self.method_get_object?;
        let class = class.map_or(ptr::null_mut(), ClassHandle::as_ptr);
        unsafe { ObjectHandle::from_raw(f(method.as_ptr(), class)) }
    }

    fn method_from_reflection(&self, object: ObjectHandle) -> Option<MethodHandle> {
        let f = self.method_get_from_reflection?;
        unsafe { MethodHandle::from_raw(f(object.as_ptr())) }
    }

    fn image_classes(&self, image: ImageHandle) -> Vec<ClassHandle> {
        let (Some(count), Some(get)) = (self.image_get_class_count, self.image_get_class) else {
            return Vec::new();
        };

        let count = unsafe { count(image.as_ptr()) };
        (0..count)
            .filter_map(|index| unsafe { ClassHandle::from_raw(get(image.as_ptr(), index)) })
            .collect()
    }

    fn class_methods(&self, class: ClassHandle) -> Vec<MethodHandle> {
        let Some(f) = self.class_get_methods else {
            return Vec::new();
        };

        let mut methods = Vec::new();
        let mut iter: Ptr = ptr::null_mut();
        while let Some(method) = unsafe { MethodHandle::from_raw(f(class.as_ptr(), &mut iter)) } {
            methods.push(method);
        }
        methods
    }

    fn method_name(&self, method: MethodHandle) -> Option<String> {
        let f = self.method_get_name?;
        unsafe { owned_text(f(method.as_ptr())) }
    }

    fn method_param_count(&self, method: MethodHandle) -> u32 {
        self.method_get_param_count
            .map_or(0, |f| unsafe { f(method.as_ptr()) })
    }

    fn method_flags(&self, method: MethodHandle) -> u32 {
        let Some(f) = self.method_get_flags else {
            return 0;
        };
        let mut implementation_flags = 0_u32;
        unsafe { f(method.as_ptr(), &mut implementation_flags) }
    }
}
