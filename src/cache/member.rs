use std::fmt;

use dashmap::DashMap;

use crate::{
    api::RuntimeApi,
    cache::Lookup,
    handles::{ClassHandle, FieldHandle, PropertyHandle},
};

/// Fields or properties by `(class, name)`.
#[derive(Debug)]
pub struct MemberCache<H> {
    entries: DashMap<(ClassHandle, String), Lookup<H>>,
}

impl<H> Default for MemberCache<H> {
    fn default() -> Self {
        MemberCache {
            entries: DashMap::new(),
        }
    }
}

impl<H: Copy + fmt::Debug> MemberCache<H> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `name` on `class`, calling `resolve` only on the first request for the key.
    pub fn find_with(
        &self,
        class: ClassHandle,
        name: &str,
        resolve: impl FnOnce(ClassHandle, &str) -> Option<H>,
    ) -> Option<H> {
        let key = (class, name.to_string());
        if let Some(cached) = self.entries.get(&key).map(|entry| *entry) {
            return cached.into_option();
        }

        let member = resolve(class, name);
        if member.is_none() {
            log::debug!("member {:?}::{} not found", class, name);
        }
        self.entries.insert(key, Lookup::from(member));
        member
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

impl MemberCache<FieldHandle> {
    /// Looks up a field.
    pub fn find<R: RuntimeApi + ?Sized>(
        &self,
        runtime: &R,
        class: ClassHandle,
        name: &str,
    ) -> Option<FieldHandle> {
        self.find_with(class, name, |class, name| {
            runtime.field_from_name(class, name)
        })
    }
}

impl MemberCache<PropertyHandle> {
    /// Looks up a property.
    pub fn find<R: RuntimeApi + ?Sized>(
        &self,
        runtime: &R,
        class: ClassHandle,
        name: &str,
    ) -> Option<PropertyHandle> {
        self.find_with(class, name, |class, name| {
            runtime.property_from_name(class, name)
        })
    }
}
