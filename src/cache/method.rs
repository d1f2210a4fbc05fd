use dashmap::DashMap;

use crate::{
    api::RuntimeApi,
    cache::Lookup,
    handles::{ClassHandle, MethodHandle},
};

/// Methods by `(class, name, arity)`.
///
/// Arity `-1` means "any": arities `0..=max_arity` are tried in ascending order and the first
/// that resolves wins, so the overload with the fewest parameters is returned.
#[derive(Debug)]
pub struct MethodCache {
    entries: DashMap<(ClassHandle, String, i32), Lookup<MethodHandle>>,
    max_arity: i32,
}

impl MethodCache {
    /// Creates an empty cache trying arities up to `max_arity` for `-1` lookups.
    #[must_use]
    pub fn new(max_arity: i32) -> Self {
        MethodCache {
            entries: DashMap::new(),
            max_arity,
        }
    }

    /// Looks up a method by name and parameter count.
    pub fn find<R: RuntimeApi + ?Sized>(
        &self,
        runtime: &R,
        class: ClassHandle,
        name: &str,
        arity: i32,
    ) -> Option<MethodHandle> {
        let key = (class, name.to_string(), arity);
        if let Some(cached) = self.entries.get(&key).map(|entry| *entry) {
            return cached.into_option();
        }

        let method = if arity < 0 {
            (0..=self.max_arity).find_map(|candidate| {
                let method = runtime.method_from_name(class, name, candidate)?;
                self.entries.insert(
                    (class, name.to_string(), candidate),
                    Lookup::Resolved(method),
                );
                Some(method)
            })
        } else {
            runtime.method_from_name(class, name, arity)
        };

        if method.is_none() {
            log::debug!("method {:?}::{}/{} not found", class, name, arity);
        }
        self.entries.insert(key, Lookup::from(method));
        method
    }

    /// Number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been looked up yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
