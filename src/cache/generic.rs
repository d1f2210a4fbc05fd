use dashmap::DashMap;

use crate::{
    api::RuntimeApi,
    cache::ClassCache,
    handles::{ClassHandle, MethodHandle},
    Error::LookupMiss,
    Result,
};

/// Instantiated generic methods by `(method, type argument full names)`.
///
/// Only successful instantiations are memoized.
#[derive(Debug, Default)]
pub struct GenericCache {
    entries: DashMap<(MethodHandle, Vec<String>), MethodHandle>,
}

impl GenericCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A memoized instantiation, if any.
    #[must_use]
    pub fn get(&self, method: MethodHandle, type_args: &[&str]) -> Option<MethodHandle> {
        let key = (method, type_args.iter().map(|a| (*a).to_string()).collect());
        self.entries.get(&key).map(|entry| *entry)
    }

    /// Instantiates `method` over `type_args`, given as `Namespace.Name` full names.
    ///
    /// Each argument is resolved through `classes`, declared in `assembly`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LookupMiss`] naming the first type argument that does not resolve,
    /// and propagates failures of [`RuntimeApi::inflate_generic`].
    pub fn instantiate<R: RuntimeApi + ?Sized>(
        &self,
        runtime: &R,
        classes: &ClassCache,
        assembly: &str,
        method: MethodHandle,
        type_args: &[&str],
    ) -> Result<Option<MethodHandle>> {
        let key: (MethodHandle, Vec<String>) =
            (method, type_args.iter().map(|a| (*a).to_string()).collect());
        if let Some(inflated) = self.entries.get(&key).map(|entry| *entry) {
            return Ok(Some(inflated));
        }

        let mut classes_of_args: Vec<ClassHandle> = Vec::with_capacity(type_args.len());
        for full_name in type_args {
            let (namespace, name) = split_full_name(full_name);
            let class = classes
                .find(runtime, assembly, namespace, name)
                .ok_or_else(|| LookupMiss(format!("generic type argument '{}'", full_name)))?;
            classes_of_args.push(class);
        }

        let inflated = runtime.inflate_generic(method, &classes_of_args)?;
        if let Some(inflated) = inflated {
            log::debug!("inflated {:?}<{}> -> {:?}", method, type_args.join(", "), inflated);
            self.entries.insert(key, inflated);
        }
        Ok(inflated)
    }

    /// Number of memoized instantiations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been instantiated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Splits `Namespace.Name` at the last dot; names without a dot are in the global namespace.
fn split_full_name(full_name: &str) -> (&str, &str) {
    full_name.rsplit_once('.').unwrap_or(("", full_name))
}
