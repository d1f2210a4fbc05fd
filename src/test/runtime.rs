use std::{
    collections::HashMap,
    ffi::c_void,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use crate::{
    api::{InvocationResult, RuntimeApi},
    handles::{
        layout, AssemblyHandle, ClassHandle, DomainHandle, FieldHandle, ImageHandle, MethodHandle,
        ObjectHandle, PropertyHandle, ThreadHandle, TypeHandle,
    },
    test::ForeignHeap,
};

/// Behaviour of an invoked method: receives the heap, the instance and the raw argument array.
pub type Handler = Arc<
    dyn Fn(&ForeignHeap, Option<ObjectHandle>, &[*mut c_void]) -> InvocationResult + Send + Sync,
>;

struct ClassRecord {
    namespace: String,
    name: String,
    ty: TypeHandle,
    type_object: ObjectHandle,
    valuetype: bool,
    enumeration: bool,
    methods: Vec<MethodHandle>,
    fields: Vec<(String, FieldHandle)>,
    properties: Vec<(String, PropertyHandle)>,
}

struct MethodRecord {
    name: String,
    arity: i32,
    flags: u32,
}

struct Images {
    domain: DomainHandle,
    domain_available: bool,
    attach_fails: bool,
    assemblies: Vec<(AssemblyHandle, ImageHandle, String)>,
    image_classes: HashMap<ImageHandle, Vec<ClassHandle>>,
    classes: HashMap<ClassHandle, ClassRecord>,
    types: HashMap<TypeHandle, ClassHandle>,
    methods: HashMap<MethodHandle, MethodRecord>,
    objects: HashMap<ObjectHandle, ClassHandle>,
    reflected: HashMap<ObjectHandle, MethodHandle>,
    reflection_objects: HashMap<MethodHandle, ObjectHandle>,
    accessors: HashMap<PropertyHandle, (Option<MethodHandle>, Option<MethodHandle>)>,
    handlers: HashMap<MethodHandle, Handler>,
    statics: HashMap<FieldHandle, Vec<u8>>,
    inflations: HashMap<MethodHandle, MethodHandle>,
    make_generic: Option<MethodHandle>,
    last_inflation_arity: Option<usize>,
}

/// In-memory runtime double.
///
/// Entities are allocated on a [`ForeignHeap`] with the real object layout, so handle accessors
/// and inbound marshaling work on them unchanged. Lookups and invocations are counted.
pub struct FakeRuntime {
    heap: ForeignHeap,
    state: Mutex<Images>,
    class_lookups: AtomicUsize,
    method_lookups: AtomicUsize,
    invocations: AtomicUsize,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        let heap = ForeignHeap::new();
        let domain = unsafe { DomainHandle::from_raw(heap.token()) }.unwrap();
        FakeRuntime {
            heap,
            state: Mutex::new(Images {
                domain,
                domain_available: true,
                attach_fails: false,
                assemblies: Vec::new(),
                image_classes: HashMap::new(),
                classes: HashMap::new(),
                types: HashMap::new(),
                methods: HashMap::new(),
                objects: HashMap::new(),
                reflected: HashMap::new(),
                reflection_objects: HashMap::new(),
                accessors: HashMap::new(),
                handlers: HashMap::new(),
                statics: HashMap::new(),
                inflations: HashMap::new(),
                make_generic: None,
                last_inflation_arity: None,
            }),
            class_lookups: AtomicUsize::new(0),
            method_lookups: AtomicUsize::new(0),
            invocations: AtomicUsize::new(0),
            attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, Images> {
        self.state.lock().unwrap()
    }

    pub fn heap(&self) -> &ForeignHeap {
        &self.heap
    }

    pub fn add_assembly(&self, name: &str) -> ImageHandle {
        let assembly = unsafe { AssemblyHandle::from_raw(self.heap.token()) }.unwrap();
        let image = unsafe { ImageHandle::from_raw(self.heap.token()) }.unwrap();
        let mut state = self.state();
        state.assemblies.push((assembly, image, name.to_string()));
        state.image_classes.insert(image, Vec::new());
        image
    }

    pub fn add_class(&self, image: ImageHandle, namespace: &str, name: &str) -> ClassHandle {
        self.add_class_with(image, namespace, name, 0x20, false)
    }

    pub fn add_value_type(&self, image: ImageHandle, namespace: &str, name: &str) -> ClassHandle {
        self.add_class_with(image, namespace, name, 0x20, true)
    }

    pub fn add_class_with(
        &self,
        image: ImageHandle,
        namespace: &str,
        name: &str,
        instance_size: u32,
        valuetype: bool,
    ) -> ClassHandle {
        let class = self.heap.class_with_size(instance_size);
        let ty = unsafe { TypeHandle::from_raw(self.heap.token()) }.unwrap();
        let type_object = self.heap.object(0x20);

        let mut state = self.state();
        state.image_classes.entry(image).or_default().push(class);
        state.types.insert(ty, class);
        state.classes.insert(
            class,
            ClassRecord {
                namespace: namespace.to_string(),
                name: name.to_string(),
                ty,
                type_object,
                valuetype,
                enumeration: false,
                methods: Vec::new(),
                fields: Vec::new(),
                properties: Vec::new(),
            },
        );
        class
    }

    pub fn set_enum(&self, class: ClassHandle) {
        if let Some(record) = self.state().classes.get_mut(&class) {
            record.valuetype = true;
            record.enumeration = true;
        }
    }

    pub fn add_method(
        &self,
        class: ClassHandle,
        name: &str,
        arity: i32,
        pointer: u64,
    ) -> MethodHandle {
        let method = self.heap.method_with_pointer(pointer);
        let mut state = self.state();
        state.methods.insert(
            method,
            MethodRecord {
                name: name.to_string(),
                arity,
                flags: 0,
            },
        );
        if let Some(record) = state.classes.get_mut(&class) {
            record.methods.push(method);
        }
        method
    }

    pub fn set_method_flags(&self, method: MethodHandle, flags: u32) {
        if let Some(record) = self.state().methods.get_mut(&method) {
            record.flags = flags;
        }
    }

    pub fn add_field(&self, class: ClassHandle, name: &str, offset: i32) -> FieldHandle {
        let field = self.heap.field_at_offset(offset);
        if let Some(record) = self.state().classes.get_mut(&class) {
            record.fields.push((name.to_string(), field));
        }
        field
    }

    pub fn add_property(
        &self,
        class: ClassHandle,
        name: &str,
        getter: Option<MethodHandle>,
        setter: Option<MethodHandle>,
    ) -> PropertyHandle {
        let property = unsafe { PropertyHandle::from_raw(self.heap.token()) }.unwrap();
        let mut state = self.state();
        state.accessors.insert(property, (getter, setter));
        if let Some(record) = state.classes.get_mut(&class) {
            record.properties.push((name.to_string(), property));
        }
        property
    }

    /// Installs the behaviour of `method` for [`RuntimeApi::runtime_invoke`].
    pub fn set_handler(
        &self,
        method: MethodHandle,
        handler: impl Fn(&ForeignHeap, Option<ObjectHandle>, &[*mut c_void]) -> InvocationResult
            + Send
            + Sync
            + 'static,
    ) {
        self.state().handlers.insert(method, Arc::new(handler));
    }

    /// Creates an instance of `class` whose fields can be read and written.
    pub fn instance(&self, class: ClassHandle) -> ObjectHandle {
        self.object_new(class).unwrap()
    }

    pub fn set_domain_available(&self, available: bool) {
        self.state().domain_available = available;
    }

    pub fn set_attach_fails(&self, fails: bool) {
        self.state().attach_fails = fails;
    }

    /// Adds the core library with the reflection types generic instantiation needs.
    pub fn install_reflection(&self) {
        let corlib = {
            let state = self.state();
            state
                .assemblies
                .iter()
                .find(|(_, _, name)| name == "mscorlib.dll")
                .map(|(_, image, _)| *image)
        };
        let corlib = corlib.unwrap_or_else(|| self.add_assembly("mscorlib.dll"));

        self.add_class(corlib, "System", "Type");
        let method_info = self.add_class(corlib, "System.Reflection", "MethodInfo");
        let make_generic = self.add_method(method_info, "MakeGenericMethod", 1, 0);
        self.state().make_generic = Some(make_generic);
    }

    /// Makes `MakeGenericMethod` on `generic` yield `inflated`.
    pub fn set_inflation(&self, generic: MethodHandle, inflated: MethodHandle) {
        self.state().inflations.insert(generic, inflated);
    }

    pub fn last_inflation_arity(&self) -> Option<usize> {
        self.state().last_inflation_arity
    }

    pub fn type_object_of(&self, class: ClassHandle) -> Option<ObjectHandle> {
        self.state()
            .classes
            .get(&class)
            .map(|record| record.type_object)
    }

    pub fn static_value(&self, field: FieldHandle) -> Option<Vec<u8>> {
        self.state().statics.get(&field).cloned()
    }

    pub fn class_lookups(&self) -> usize {
        self.class_lookups.load(Ordering::SeqCst)
    }

    pub fn method_lookups(&self) -> usize {
        self.method_lookups.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detaches(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    fn make_generic_method(
        &self,
        instance: Option<ObjectHandle>,
        args: &[*mut c_void],
    ) -> InvocationResult {
        let types = args
            .first()
            .and_then(|pointer| unsafe { ObjectHandle::from_raw(*pointer) });
        let arity = types.map(|types| unsafe { types.array_length() } as usize);

        let inflated = {
            let mut state = self.state();
            state.last_inflation_arity = arity;
            instance
                .and_then(|object| state.reflected.get(&object).copied())
                .and_then(|generic| state.inflations.get(&generic).copied())
        };

        let value = inflated.and_then(|method| self.method_object(method, None));
        InvocationResult::new(value, None)
    }
}

impl RuntimeApi for FakeRuntime {
    fn domain(&self) -> Option<DomainHandle> {
        let state = self.state();
        state.domain_available.then_some(state.domain)
    }

    fn thread_attach(&self, _domain: DomainHandle) -> Option<ThreadHandle> {
        if self.state().attach_fails {
            return None;
        }
        self.attaches.fetch_add(1, Ordering::SeqCst);
        unsafe { ThreadHandle::from_raw(self.heap.token()) }
    }

    fn thread_detach(&self, _thread: ThreadHandle) -> bool {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn assemblies(&self, _domain: DomainHandle) -> Vec<AssemblyHandle> {
        self.state()
            .assemblies
            .iter()
            .map(|(assembly, _, _)| *assembly)
            .collect()
    }

    fn assembly_image(&self, assembly: AssemblyHandle) -> Option<ImageHandle> {
        self.state()
            .assemblies
            .iter()
            .find(|(candidate, _, _)| *candidate == assembly)
            .map(|(_, image, _)| *image)
    }

    fn image_name(&self, image: ImageHandle) -> Option<String> {
        self.state()
            .assemblies
            .iter()
            .find(|(_, candidate, _)| *candidate == image)
            .map(|(_, _, name)| name.clone())
    }

    fn class_from_name(
        &self,
        image: ImageHandle,
        namespace: &str,
        name: &str,
    ) -> Option<ClassHandle> {
        self.class_lookups.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        state.image_classes.get(&image)?.iter().copied().find(|class| {
            state
                .classes
                .get(class)
                .is_some_and(|record| record.namespace == namespace && record.name == name)
        })
    }

    fn method_from_name(
        &self,
        class: ClassHandle,
        name: &str,
        arity: i32,
    ) -> Option<MethodHandle> {
        self.method_lookups.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        state.classes.get(&class)?.methods.iter().copied().find(|method| {
            state.methods.get(method).is_some_and(|record| {
                record.name == name && (arity < 0 || record.arity == arity)
            })
        })
    }

    fn field_from_name(&self, class: ClassHandle, name: &str) -> Option<FieldHandle> {
        self.state()
            .classes
            .get(&class)?
            .fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, field)| *field)
    }

    fn property_from_name(&self, class: ClassHandle, name: &str) -> Option<PropertyHandle> {
        self.state()
            .classes
            .get(&class)?
            .properties
            .iter()
            .find(|(property_name, _)| property_name == name)
            .map(|(_, property)| *property)
    }

    fn property_getter(&self, property: PropertyHandle) -> Option<MethodHandle> {
        self.state().accessors.get(&property)?.0
    }

    fn property_setter(&self, property: PropertyHandle) -> Option<MethodHandle> {
        self.state().accessors.get(&property)?.1
    }

    fn field_get_value(&self, object: ObjectHandle, field: FieldHandle, out: &mut [u8]) {
        let offset = field.offset() as usize;
        unsafe {
            std::ptr::copy_nonoverlapping(
                object.as_ptr().cast::<u8>().add(offset),
                out.as_mut_ptr(),
                out.len(),
            );
        }
    }

    fn field_set_value(&self, object: ObjectHandle, field: FieldHandle, value: &[u8]) {
        self.heap
            .write(object.as_ptr(), field.offset() as usize, value);
    }

    fn field_static_get_value(&self, field: FieldHandle, out: &mut [u8]) {
        let state = self.state();
        let stored = state.statics.get(&field).map_or(&[][..], Vec::as_slice);
        for (index, byte) in out.iter_mut().enumerate() {
            *byte = stored.get(index).copied().unwrap_or(0);
        }
    }

    fn field_static_set_value(&self, field: FieldHandle, value: &[u8]) {
        self.state().statics.insert(field, value.to_vec());
    }

    fn object_new(&self, class: ClassHandle) -> Option<ObjectHandle> {
        let object = self.heap.object(class.instance_size() as usize);
        self.state().objects.insert(object, class);
        Some(object)
    }

    fn string_new(&self, text: &str) -> Option<ObjectHandle> {
        if text.contains('\0') {
            return None;
        }
        Some(self.heap.string(text))
    }

    fn runtime_invoke(
        &self,
        method: MethodHandle,
        instance: Option<ObjectHandle>,
        args: &[*mut c_void],
    ) -> InvocationResult {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let (is_make_generic, handler) = {
            let state = self.state();
            (
                state.make_generic == Some(method),
                state.handlers.get(&method).cloned(),
            )
        };

        if is_make_generic {
            return self.make_generic_method(instance, args);
        }
        match handler {
            Some(handler) => handler(&self.heap, instance, args),
            None => InvocationResult::new(None, None),
        }
    }

    fn value_box(&self, class: ClassHandle, data: &[u8]) -> Option<ObjectHandle> {
        let object = self.heap.boxed_bytes(data);
        self.state().objects.insert(object, class);
        Some(object)
    }

    fn class_type(&self, class: ClassHandle) -> Option<TypeHandle> {
        self.state().classes.get(&class).map(|record| record.ty)
    }

    fn type_object(&self, ty: TypeHandle) -> Option<ObjectHandle> {
        let state = self.state();
        let class = state.types.get(&ty)?;
        state.classes.get(class).map(|record| record.type_object)
    }

    fn object_class(&self, object: ObjectHandle) -> Option<ClassHandle> {
        self.state().objects.get(&object).copied()
    }

    fn class_name(&self, class: ClassHandle) -> Option<String> {
        self.state()
            .classes
            .get(&class)
            .map(|record| record.name.clone())
    }

    fn class_namespace(&self, class: ClassHandle) -> Option<String> {
        self.state()
            .classes
            .get(&class)
            .map(|record| record.namespace.clone())
    }

    fn class_is_valuetype(&self, class: ClassHandle) -> bool {
        self.state()
            .classes
            .get(&class)
            .is_some_and(|record| record.valuetype)
    }

    fn class_is_enum(&self, class: ClassHandle) -> bool {
        self.state()
            .classes
            .get(&class)
            .is_some_and(|record| record.enumeration)
    }

    fn array_new(&self, element: ClassHandle, length: usize) -> Option<ObjectHandle> {
        let array = self.heap.reference_array(&vec![None; length]);
        self.state().objects.insert(array, element);
        Some(array)
    }

    fn method_object(
        &self,
        method: MethodHandle,
        _class: Option<ClassHandle>,
    ) -> Option<ObjectHandle> {
        let mut state = self.state();
        if !state.methods.contains_key(&method) {
            return None;
        }
        if let Some(object) = state.reflection_objects.get(&method) {
            return Some(*object);
        }

        let object = self.heap.object(layout::OBJECT_HEADER_SIZE + 0x10);
        state.reflection_objects.insert(method, object);
        state.reflected.insert(object, method);
        Some(object)
    }

    fn method_from_reflection(&self, object: ObjectHandle) -> Option<MethodHandle> {
        self.state().reflected.get(&object).copied()
    }

    fn image_classes(&self, image: ImageHandle) -> Vec<ClassHandle> {
        self.state()
            .image_classes
            .get(&image)
            .cloned()
            .unwrap_or_default()
    }

    fn class_methods(&self, class: ClassHandle) -> Vec<MethodHandle> {
        self.state()
            .classes
            .get(&class)
            .map(|record| record.methods.clone())
            .unwrap_or_default()
    }

    fn method_name(&self, method: MethodHandle) -> Option<String> {
        self.state()
            .methods
            .get(&method)
            .map(|record| record.name.clone())
    }

    fn method_param_count(&self, method: MethodHandle) -> u32 {
        self.state()
            .methods
            .get(&method)
            .map_or(0, |record| record.arity.max(0) as u32)
    }

    fn method_flags(&self, method: MethodHandle) -> u32 {
        self.state()
            .methods
            .get(&method)
            .map_or(0, |record| record.flags)
    }
}
