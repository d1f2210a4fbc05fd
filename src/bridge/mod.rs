//! The bridge context.
//!
//! A [`Bridge`] owns everything needed to talk to one runtime instance: the bound
//! [`RuntimeApi`], the resolution caches, the wrapper registry and the per-thread registration
//! state. There is no global state; hosts that want a process-wide bridge keep one in a
//! [`BridgeCell`].
//!
//! # Architecture
//!
//! Bring-up runs once: [`Bridge::attach`] parses nothing itself but takes an already introspected
//! [`ModuleImage`], resolves every runtime symbol through a [`SymbolResolver`] and refuses to
//! produce a bridge if a required symbol is missing. Steady-state calls go through the caches and
//! the [`Marshaler`]; every call that may enter the runtime first makes sure the calling thread is
//! registered.
//!
//! # Error reporting
//!
//! Lookups return `Option` and fallible operations return [`crate::Result`]. In both cases the
//! outcome is also recorded as the calling thread's [`LastError`], which hosts crossing an FFI
//! boundary can query through [`last_error`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use il2scope::{bridge::Bridge, config::BridgeConfig, image::{LoadedModule, ModuleImage}};
//!
//! # fn run(base: usize, size: usize) -> il2scope::Result<()> {
//! let module = unsafe { LoadedModule::new(base as *const u8, size) };
//! let image = Arc::new(ModuleImage::from_loaded(module)?);
//! let bridge = unsafe { Bridge::attach(image, BridgeConfig::default())? };
//!
//! let player = bridge.find_class("Assembly-CSharp", "Game", "Player").unwrap();
//! let heal = bridge.find_method(player, "Heal", 1).unwrap();
//! bridge.call::<()>(heal, None, &[25_i32.into()])?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! [`Bridge`] is `Send + Sync`. Caches use sharded locks that are never held across a call into
//! the runtime, so methods invoked from inside a foreign call can re-enter the bridge.

mod lasterror;
mod thread;

pub use lasterror::{clear_last_error, last_error, ErrorCode, LastError};
pub use thread::ThreadRegistry;

use std::{any::Any, mem, sync::Arc, sync::OnceLock};

use crate::{
    api::{ApiTable, InvocationResult, RuntimeApi},
    cache::{ResolutionCaches, RvaCache},
    config::BridgeConfig,
    detect::{DetectionReport, ObfuscationDetector},
    handles::{ClassHandle, FieldHandle, MethodHandle, ObjectHandle, PropertyHandle, ThreadHandle},
    image::ModuleImage,
    marshal::{bytes_of, from_bytes, Argument, Blittable, FromReturn, Marshaler, WrapperRegistry},
    resolver::{ResolutionReport, SignatureCatalog, SymbolResolver},
    Error::{self, ApiTableIncomplete, BufferTooSmall, LookupMiss, NotInitialized},
    Result,
};

use lasterror::{record, set_last_error};

/// One attached runtime instance and its caches.
pub struct Bridge<R: RuntimeApi = ApiTable> {
    runtime: R,
    config: BridgeConfig,
    image: Option<Arc<ModuleImage>>,
    report: Option<ResolutionReport>,
    caches: ResolutionCaches,
    wrappers: WrapperRegistry,
    threads: ThreadRegistry,
}

impl Bridge<ApiTable> {
    /// Brings up a bridge over the runtime exported by `image`.
    ///
    /// Resolves the full runtime symbol set with the built-in signature catalog and binds the
    /// API table. The resolution report is kept on the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ApiTableIncomplete`] naming every required symbol that could not
    /// be resolved.
    ///
    /// # Safety
    ///
    /// `image` must describe a module that is loaded in this process at `image.base()` and stays
    /// loaded for the lifetime of the bridge; resolved addresses are called as functions.
    pub unsafe fn attach(image: Arc<ModuleImage>, config: BridgeConfig) -> Result<Self> {
        let resolver = SymbolResolver::new(
            image.clone(),
            SignatureCatalog::builtin()?,
            config.resolver.clone(),
        );
        let table = ApiTable::bind(&resolver);
        if !table.is_valid() {
            let missing = table
                .missing()
                .iter()
                .map(|symbol| symbol.name().to_string())
                .collect();
            let error = ApiTableIncomplete { missing };
            log::error!("{}", error);
            record(&error);
            return Err(error);
        }

        log::info!(
            "bridge attached to module at 0x{:x} ({} symbols bound)",
            image.base(),
            table.bound_count()
        );
        let mut bridge = Bridge::new(table, config).with_image(image);
        bridge.report = Some(resolver.into_report());
        Ok(bridge)
    }
}

impl<R: RuntimeApi> Bridge<R> {
    /// Creates a bridge over an already bound runtime.
    #[must_use]
    pub fn new(runtime: R, config: BridgeConfig) -> Self {
        let caches = ResolutionCaches::new(&config.cache, None);
        Bridge {
            runtime,
            config,
            image: None,
            report: None,
            caches,
            wrappers: WrapperRegistry::new(),
            threads: ThreadRegistry::new(),
        }
    }

    /// Associates the runtime module, enabling RVA based helpers.
    #[must_use]
    pub fn with_image(mut self, image: Arc<ModuleImage>) -> Self {
        self.caches.rvas = RvaCache::new(Some((image.base(), image.size())));
        self.image = Some(image);
        self
    }

    /// The runtime API.
    #[must_use]
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// The configuration the bridge was created with.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The runtime module, if known.
    #[must_use]
    pub fn image(&self) -> Option<&Arc<ModuleImage>> {
        self.image.as_ref()
    }

    /// How each runtime symbol was resolved, for bridges created by [`Bridge::attach`].
    #[must_use]
    pub fn report(&self) -> Option<&ResolutionReport> {
        self.report.as_ref()
    }

    /// The resolution caches.
    #[must_use]
    pub fn caches(&self) -> &ResolutionCaches {
        &self.caches
    }

    /// The wrapper registry used by [`Bridge::wrap_object`].
    #[must_use]
    pub fn wrappers(&self) -> &WrapperRegistry {
        &self.wrappers
    }

    /// Registers the calling thread with the runtime domain if it is not yet.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ThreadNotRegistered`] if there is no domain or the runtime refuses
    /// the registration.
    pub fn ensure_thread_attached(&self) -> Result<ThreadHandle> {
        let attached = self
            .runtime
            .domain()
            .ok_or(Error::ThreadNotRegistered)
            .and_then(|domain| self.threads.ensure_attached(&self.runtime, domain));
        attached.inspect_err(record)
    }

    /// Unregisters the calling thread; returns `false` if it was not registered.
    pub fn detach_thread(&self) -> bool {
        self.runtime
            .domain()
            .is_some_and(|domain| self.threads.detach(&self.runtime, domain))
    }

    /// Finds a class declared in `assembly`, falling back to related and then all assemblies.
    #[must_use]
    pub fn find_class(&self, assembly: &str, namespace: &str, name: &str) -> Option<ClassHandle> {
        clear_last_error();
        let class = self
            .caches
            .classes
            .find(&self.runtime, assembly, namespace, name);
        if class.is_none() {
            set_last_error(
                ErrorCode::ClassNotFound,
                format!("class {}.{} not found ({})", namespace, name, assembly),
            );
        }
        class
    }

    /// Finds a method by name and parameter count; `-1` returns the overload with the fewest
    /// parameters.
    #[must_use]
    pub fn find_method(&self, class: ClassHandle, name: &str, arity: i32) -> Option<MethodHandle> {
        clear_last_error();
        let method = self
            .caches
            .methods
            .find(&self.runtime, class, name, arity);
        if method.is_none() {
            set_last_error(
                ErrorCode::MethodNotFound,
                format!("method {}/{} not found on {:?}", name, arity, class),
            );
        }
        method
    }

    /// Finds a field by name.
    #[must_use]
    pub fn find_field(&self, class: ClassHandle, name: &str) -> Option<FieldHandle> {
        clear_last_error();
        let field = self.caches.fields.find(&self.runtime, class, name);
        if field.is_none() {
            set_last_error(
                ErrorCode::FieldNotFound,
                format!("field {} not found on {:?}", name, class),
            );
        }
        field
    }

    /// Finds a property by name.
    #[must_use]
    pub fn find_property(&self, class: ClassHandle, name: &str) -> Option<PropertyHandle> {
        clear_last_error();
        let property = self.caches.properties.find(&self.runtime, class, name);
        if property.is_none() {
            set_last_error(
                ErrorCode::MethodNotFound,
                format!("property {} not found on {:?}", name, class),
            );
        }
        property
    }

    /// Marshals `args` and invokes `method` on `instance`, or statically for `None`.
    ///
    /// Arguments that cannot be marshaled are passed as null; their warnings are attached to the
    /// result. A foreign exception is not an error here; it is carried in the result.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ThreadNotRegistered`] if the calling thread cannot be registered.
    pub fn invoke(
        &self,
        method: MethodHandle,
        instance: Option<ObjectHandle>,
        args: &[Argument<'_>],
    ) -> Result<InvocationResult> {
        clear_last_error();
        self.ensure_thread_attached()?;

        let marshaled = Marshaler::new(&self.runtime, &self.caches.classes).marshal(args);
        let mut result = self
            .runtime
            .runtime_invoke(method, instance, marshaled.pointers());
        result.warnings = marshaled.into_warnings();

        if let Some(exception) = result.exception {
            log::debug!("{:?} threw {:?}", method, exception);
            set_last_error(
                ErrorCode::ExceptionThrown,
                format!("{:?} threw {:?}", method, exception),
            );
        }
        Ok(result)
    }

    /// Invokes `method` and converts its return value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ForeignException`] if the callee threw, and the errors of
    /// [`Bridge::invoke`].
    pub fn call<T: FromReturn>(
        &self,
        method: MethodHandle,
        instance: Option<ObjectHandle>,
        args: &[Argument<'_>],
    ) -> Result<T> {
        self.invoke(method, instance, args)?
            .value::<T>()
            .inspect_err(record)
    }

    /// Reads an instance field.
    #[must_use]
    pub fn get_field<T: Blittable>(&self, object: ObjectHandle, field: FieldHandle) -> T {
        let mut buffer = vec![0_u8; mem::size_of::<T>()];
        self.runtime.field_get_value(object, field, &mut buffer);
        from_bytes::<T>(&buffer).unwrap_or_default()
    }

    /// Copies the raw bytes of an instance field into `out`.
    pub fn get_field_raw(&self, object: ObjectHandle, field: FieldHandle, out: &mut [u8]) {
        self.runtime.field_get_value(object, field, out);
    }

    /// Writes an instance field.
    pub fn set_field<T: Blittable>(&self, object: ObjectHandle, field: FieldHandle, value: &T) {
        self.runtime.field_set_value(object, field, bytes_of(value));
    }

    /// Reads a reference-typed instance field.
    #[must_use]
    pub fn get_field_object(&self, object: ObjectHandle, field: FieldHandle) -> Option<ObjectHandle> {
        let address = self.get_field::<u64>(object, field);
        // The runtime only stores object references in reference-typed fields
        unsafe { ObjectHandle::from_addr(address) }
    }

    /// Reads a static field.
    #[must_use]
    pub fn get_static_field<T: Blittable>(&self, field: FieldHandle) -> T {
        let mut buffer = vec![0_u8; mem::size_of::<T>()];
        self.runtime.field_static_get_value(field, &mut buffer);
        from_bytes::<T>(&buffer).unwrap_or_default()
    }

    /// Writes a static field.
    pub fn set_static_field<T: Blittable>(&self, field: FieldHandle, value: &T) {
        self.runtime.field_static_set_value(field, bytes_of(value));
    }

    /// Byte offset of an instance field from the start of its object.
    #[must_use]
    pub fn field_offset(&self, field: FieldHandle) -> i32 {
        field.offset()
    }

    /// Calls the getter of `property`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LookupMiss`] if the property has no getter, and the errors of
    /// [`Bridge::call`].
    pub fn get_property<T: FromReturn>(
        &self,
        object: Option<ObjectHandle>,
        property: PropertyHandle,
    ) -> Result<T> {
        let getter = self
            .runtime
            .property_getter(property)
            .ok_or_else(|| LookupMiss(format!("getter of {:?}", property)));
        let getter = getter.inspect_err(|_| {
            set_last_error(ErrorCode::MethodNotFound, "property has no getter")
        })?;
        self.call::<T>(getter, object, &[])
    }

    /// Calls the setter of `property` with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LookupMiss`] if the property has no setter, and the errors of
    /// [`Bridge::call`].
    pub fn set_property(
        &self,
        object: Option<ObjectHandle>,
        property: PropertyHandle,
        value: Argument<'_>,
    ) -> Result<()> {
        let setter = self
            .runtime
            .property_setter(property)
            .ok_or_else(|| LookupMiss(format!("setter of {:?}", property)));
        let setter = setter.inspect_err(|_| {
            set_last_error(ErrorCode::MethodNotFound, "property has no setter")
        })?;
        self.call::<()>(setter, object, &[value])
    }

    /// Allocates an instance of `class` without running a constructor.
    #[must_use]
    pub fn new_object(&self, class: ClassHandle) -> Option<ObjectHandle> {
        clear_last_error();
        if self.ensure_thread_attached().is_err() {
            return None;
        }

        let object = self.runtime.object_new(class);
        if object.is_none() {
            set_last_error(
                ErrorCode::AllocationFailed,
                format!("allocation of {:?} failed", class),
            );
        }
        object
    }

    /// Creates a runtime string.
    #[must_use]
    pub fn new_string(&self, text: &str) -> Option<ObjectHandle> {
        clear_last_error();
        if self.ensure_thread_attached().is_err() {
            return None;
        }

        let string = self.runtime.string_new(text);
        if string.is_none() {
            set_last_error(ErrorCode::AllocationFailed, "string allocation failed");
        }
        string
    }

    /// Decodes a runtime string; `None` yields an empty string.
    ///
    /// # Safety
    ///
    /// A non-null `string` must be a live string object.
    #[must_use]
    pub unsafe fn string_to_text(&self, string: Option<ObjectHandle>) -> String {
        String::from_return(string)
    }

    /// Writes a runtime string as NUL-terminated UTF-8 into `buffer` and returns the number of
    /// text bytes written.
    ///
    /// Text that does not fit is cut at a character boundary.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] for an empty buffer and
    /// [`crate::Error::BufferTooSmall`] if the text was truncated; the buffer holds the truncated
    /// text in that case.
    ///
    /// # Safety
    ///
    /// A non-null `string` must be a live string object.
    pub unsafe fn string_to_buffer(
        &self,
        string: Option<ObjectHandle>,
        buffer: &mut [u8],
    ) -> Result<usize> {
        clear_last_error();
        if buffer.is_empty() {
            let error = Error::InvalidArgument("empty string buffer".to_string());
            record(&error);
            return Err(error);
        }

        let text = self.string_to_text(string);
        let mut length = text.len().min(buffer.len() - 1);
        while !text.is_char_boundary(length) {
            length -= 1;
        }

        buffer[..length].copy_from_slice(&text.as_bytes()[..length]);
        buffer[length] = 0;

        if length < text.len() {
            let error = BufferTooSmall {
                required: text.len() + 1,
            };
            record(&error);
            return Err(error);
        }
        Ok(length)
    }

    /// Instantiates a generic method over type arguments given as `Namespace.Name`.
    ///
    /// Type arguments resolve through the class cache with the configured fallback assembly.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LookupMiss`] naming the first unresolved type argument, and
    /// [`crate::Error::ForeignException`] if the runtime rejects the instantiation.
    pub fn inflate_generic(
        &self,
        method: MethodHandle,
        type_args: &[&str],
    ) -> Result<Option<MethodHandle>> {
        clear_last_error();
        self.ensure_thread_attached()?;
        self.caches
            .generics
            .instantiate(
                &self.runtime,
                &self.caches.classes,
                &self.config.cache.fallback_assembly,
                method,
                type_args,
            )
            .inspect_err(record)
    }

    /// The native entry point of `method`.
    #[must_use]
    pub fn method_pointer(&self, method: MethodHandle) -> Option<u64> {
        method.pointer()
    }

    /// The absolute address of a module-relative offset in the runtime module.
    #[must_use]
    pub fn method_pointer_from_rva(&self, rva: u64) -> Option<u64> {
        clear_last_error();
        let address = self.caches.rvas.resolve(rva);
        if address.is_none() {
            set_last_error(
                ErrorCode::InvalidArgument,
                format!("rva 0x{:x} is outside of the runtime module", rva),
            );
        }
        address
    }

    /// Size in bytes of an instance of `class`, header included.
    #[must_use]
    pub fn class_instance_size(&self, class: ClassHandle) -> u32 {
        class.instance_size()
    }

    /// Wraps `object` with the host type registered for its class.
    #[must_use]
    pub fn wrap_object(&self, object: ObjectHandle) -> Option<Box<dyn Any + Send + Sync>> {
        let class = self.runtime.object_class(object)?;
        let namespace = self.runtime.class_namespace(class)?;
        let name = self.runtime.class_name(class)?;
        self.wrappers.wrap(&namespace, &name, object)
    }

    /// Runs the fake-method detector over every loaded assembly.
    #[must_use]
    pub fn detect_fake_methods(&self) -> DetectionReport {
        ObfuscationDetector::new(self.config.detector.clone())
            .analyze(&self.runtime, self.image.as_deref())
    }
}

/// Process-wide, once-only bring-up of a [`Bridge`].
///
/// The first call to [`BridgeCell::initialize`] runs bring-up. Later calls return the same bridge,
/// or [`crate::Error::NotInitialized`] forever if bring-up failed.
pub struct BridgeCell<R: RuntimeApi = ApiTable> {
    bridge: OnceLock<Option<Bridge<R>>>,
}

impl<R: RuntimeApi> Default for BridgeCell<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RuntimeApi> BridgeCell<R> {
    /// Creates an empty cell.
    #[must_use]
    pub const fn new() -> Self {
        BridgeCell {
            bridge: OnceLock::new(),
        }
    }

    /// Runs `bring_up` unless bring-up already happened.
    ///
    /// # Errors
    ///
    /// Returns the bring-up error on the call that ran it, and
    /// [`crate::Error::NotInitialized`] on every call after a failed bring-up.
    pub fn initialize(&self, bring_up: impl FnOnce() -> Result<Bridge<R>>) -> Result<&Bridge<R>> {
        let mut failure = None;
        let bridge = self.bridge.get_or_init(|| match bring_up() {
            Ok(bridge) => Some(bridge),
            Err(error) => {
                failure = Some(error);
                None
            }
        });

        match (bridge, failure) {
            (Some(bridge), _) => Ok(bridge),
            (None, Some(error)) => Err(error),
            (None, None) => Err(NotInitialized),
        }
    }

    /// The bridge, if bring-up succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotInitialized`] before bring-up and after a failed one.
    pub fn get(&self) -> Result<&Bridge<R>> {
        match self.bridge.get() {
            Some(Some(bridge)) => Ok(bridge),
            _ => {
                record(&NotInitialized);
                Err(NotInitialized)
            }
        }
    }

    /// Returns `true` once bring-up has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(self.bridge.get(), Some(Some(_)))
    }
}
