use std::any::Any;

use dashmap::DashMap;

use crate::handles::ObjectHandle;

/// Constructor stored in the registry.
pub type WrapperFactory = fn(ObjectHandle) -> Box<dyn Any + Send + Sync>;

/// A host type wrapping instances of one foreign class.
pub trait ForeignWrapper: Any + Send + Sync + Sized {
    /// Namespace of the wrapped class.
    const NAMESPACE: &'static str;

    /// Simple name of the wrapped class.
    const NAME: &'static str;

    /// Wraps an instance of the class.
    fn from_handle(handle: ObjectHandle) -> Self;
}

fn construct<W: ForeignWrapper>(handle: ObjectHandle) -> Box<dyn Any + Send + Sync> {
    Box::new(W::from_handle(handle))
}

/// Class identity to wrapper constructor.
///
/// Populated at startup; lookups never inspect types at call time.
#[derive(Debug, Default)]
pub struct WrapperRegistry {
    factories: DashMap<(String, String), WrapperFactory>,
}

impl WrapperRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `W` for its class, replacing any earlier registration.
    pub fn register<W: ForeignWrapper>(&self) {
        self.factories.insert(
            (W::NAMESPACE.to_string(), W::NAME.to_string()),
            construct::<W>,
        );
    }

    /// Registers a constructor for an arbitrary class identity.
    pub fn register_factory(&self, namespace: &str, name: &str, factory: WrapperFactory) {
        self.factories
            .insert((namespace.to_string(), name.to_string()), factory);
    }

    /// Returns `true` if a wrapper is registered for the class.
    #[must_use]
    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.factories
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    /// Wraps `handle` with the constructor registered for the class.
    #[must_use]
    pub fn wrap(
        &self,
        namespace: &str,
        name: &str,
        handle: ObjectHandle,
    ) -> Option<Box<dyn Any + Send + Sync>> {
        let factory = *self
            .factories
            .get(&(namespace.to_string(), name.to_string()))?;
        Some(factory(handle))
    }

    /// Wraps `handle` as `W` if `W` is what is registered for its class.
    #[must_use]
    pub fn wrap_as<W: ForeignWrapper>(&self, handle: ObjectHandle) -> Option<W> {
        self.wrap(W::NAMESPACE, W::NAME, handle)?
            .downcast::<W>()
            .ok()
            .map(|wrapper| *wrapper)
    }

    /// Number of registered classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
