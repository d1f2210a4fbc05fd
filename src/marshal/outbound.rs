use crate::{
    api::RuntimeApi,
    cache::ClassCache,
    marshal::{Argument, MarshaledArgs, TypeRef},
    Error::Marshal,
};

/// Converts host arguments into native argument pointers.
pub struct Marshaler<'a, R: RuntimeApi + ?Sized> {
    runtime: &'a R,
    classes: &'a ClassCache,
}

impl<'a, R: RuntimeApi + ?Sized> Marshaler<'a, R> {
    /// Creates a marshaler resolving type arguments through `classes`.
    pub fn new(runtime: &'a R, classes: &'a ClassCache) -> Self {
        Marshaler { runtime, classes }
    }

    /// Marshals all `args` in order.
    ///
    /// Never fails: arguments that cannot be represented are passed as null and recorded as
    /// warnings on the result.
    #[must_use]
    pub fn marshal(&self, args: &[Argument<'_>]) -> MarshaledArgs {
        let mut out = MarshaledArgs::new();
        for arg in args {
            self.marshal_argument(arg, &mut out);
        }
        out
    }

    /// Appends the native form of `arg` to `out`.
    pub fn marshal_argument(&self, arg: &Argument<'_>, out: &mut MarshaledArgs) {
        match arg {
            Argument::Null => out.push_pointer(std::ptr::null_mut()),
            Argument::Object(handle) => out.push_pointer(handle.as_ptr()),
            Argument::Text(text) => match self.runtime.string_new(text) {
                Some(string) => out.push_pointer(string.as_ptr()),
                None => out.push_null_with_warning(&Marshal(format!(
                    "could not create a runtime string from {:?}",
                    text
                ))),
            },
            Argument::Type(type_ref) => match self.type_object(type_ref) {
                Some(pointer) => out.push_pointer(pointer),
                None => out.push_null_with_warning(&Marshal(format!(
                    "type {}.{} could not be resolved",
                    type_ref.namespace, type_ref.name
                ))),
            },
            Argument::Primitive(primitive) => out.push_buffer(&primitive.to_bytes()),
            Argument::Enum(primitive) => {
                if primitive.is_integer() {
                    out.push_buffer(&primitive.to_bytes());
                } else {
                    out.push_null_with_warning(&Marshal(format!(
                        "enum with non-integer representation {:?}",
                        primitive
                    )));
                }
            }
            Argument::Struct(bytes) => out.push_buffer(bytes),
            Argument::Unsupported(description) => out.push_null_with_warning(&Marshal(format!(
                "unsupported argument type {}",
                description
            ))),
        }
    }

    fn type_object(&self, type_ref: &TypeRef<'_>) -> Option<*mut std::ffi::c_void> {
        let class = self.classes.find(
            self.runtime,
            type_ref.assembly,
            type_ref.namespace,
            type_ref.name,
        )?;
        let ty = self.runtime.class_type(class)?;
        self.runtime.type_object(ty).map(|object| object.as_ptr())
    }
}
