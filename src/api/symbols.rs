//! The versioned set of runtime symbols the bridge binds.

use strum::{EnumCount, EnumIter};

macro_rules! runtime_symbols {
    ($( $(#[$meta:meta])* $variant:ident => $name:literal, $required:literal; )*) => {
        /// A runtime entry point known to the bridge.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
        pub enum RuntimeSymbol {
            $(
                #[doc = concat!("`", $name, "`")]
                $(#[$meta])*
                $variant,
            )*
        }

        impl RuntimeSymbol {
            /// Canonical export name.
            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    $( RuntimeSymbol::$variant => $name, )*
                }
            }

            /// Returns `true` if bring-up fails without this symbol.
            #[must_use]
            pub fn is_required(self) -> bool {
                match self {
                    $( RuntimeSymbol::$variant => $required, )*
                }
            }

            /// Looks a symbol up by its canonical export name.
            #[must_use]
            pub fn from_name(name: &str) -> Option<RuntimeSymbol> {
                match name {
                    $( $name => Some(RuntimeSymbol::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

runtime_symbols! {
    /// Current application domain
    DomainGet => "il2cpp_domain_get", true;
    ThreadAttach => "il2cpp_thread_attach", true;
    ThreadDetach => "il2cpp_thread_detach", false;
    DomainGetAssemblies => "il2cpp_domain_get_assemblies", true;
    AssemblyGetImage => "il2cpp_assembly_get_image", true;
    ImageGetName => "il2cpp_image_get_name", true;
    ClassFromName => "il2cpp_class_from_name", true;
    ClassGetMethodFromName => "il2cpp_class_get_method_from_name", true;
    ClassGetFieldFromName => "il2cpp_class_get_field_from_name", true;
    ClassGetPropertyFromName => "il2cpp_class_get_property_from_name", true;
    PropertyGetGetMethod => "il2cpp_property_get_get_method", true;
    PropertyGetSetMethod => "il2cpp_property_get_set_method", true;
    FieldGetValue => "il2cpp_field_get_value", true;
    FieldSetValue => "il2cpp_field_set_value", true;
    FieldStaticGetValue => "il2cpp_field_static_get_value", true;
    FieldStaticSetValue => "il2cpp_field_static_set_value", true;
    ObjectNew => "il2cpp_object_new", true;
    StringNew => "il2cpp_string_new", true;
    /// Method invocation, reports exceptions through an out parameter
    RuntimeInvoke => "il2cpp_runtime_invoke", true;
    ValueBox => "il2cpp_value_box", true;
    ClassGetType => "il2cpp_class_get_type", false;
    TypeGetObject => "il2cpp_type_get_object", false;
    ObjectGetClass => "il2cpp_object_get_class", false;
    ClassGetName => "il2cpp_class_get_name", false;
    ClassGetNamespace => "il2cpp_class_get_namespace", false;
    ClassIsValuetype => "il2cpp_class_is_valuetype", false;
    ClassIsEnum => "il2cpp_class_is_enum", false;
    ArrayNew => "il2cpp_array_new", false;
    /// Reflection object of a method, used for generic instantiation
    MethodGetObject => "il2cpp_method_get_object", false;
    MethodGetFromReflection => "il2cpp_method_get_from_reflection", false;
    ImageGetClassCount => "il2cpp_image_get_class_count", false;
    ImageGetClass => "il2cpp_image_get_class", false;
    ClassGetMethods => "il2cpp_class_get_methods", false;
    MethodGetName => "il2cpp_method_get_name", false;
    MethodGetParamCount => "il2cpp_method_get_param_count", false;
    MethodGetFlags => "il2cpp_method_get_flags", false;
}

impl std::fmt::Display for RuntimeSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
