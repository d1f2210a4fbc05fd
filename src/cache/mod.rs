//! Lazily populated resolution caches.
//!
//! Every name-based lookup into the runtime goes through one of these caches. Each cache is its
//! own [`dashmap::DashMap`], so a lookup that re-enters the bridge from inside a foreign call never
//! waits on a lock held by the outer call.
//!
//! # Semantics
//!
//! - A key is either absent (not attempted), [`Lookup::Resolved`] or [`Lookup::Unresolved`].
//! - `Unresolved` is terminal: the runtime is never asked about that key again.
//! - Concurrent resolution of the same key may run twice; the last write wins.
//! - Caches only grow.
//!
//! # Key Components
//!
//! - [`ClassCache`] - `(namespace, name)` with assembly fallback through module groups
//! - [`MethodCache`] - `(class, name, arity)` with arity brute-forcing for `-1`
//! - [`MemberCache`] - fields and properties by `(class, name)`
//! - [`GenericCache`] - instantiated generic methods
//! - [`RvaCache`] - module-relative offsets to absolute addresses

mod class;
mod generic;
mod member;
mod method;
mod rva;

pub use class::ClassCache;
pub use generic::GenericCache;
pub use member::MemberCache;
pub use method::MethodCache;
pub use rva::RvaCache;

use crate::{
    config::CacheConfig,
    handles::{FieldHandle, PropertyHandle},
};

/// Cached outcome of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<T> {
    /// The lookup succeeded.
    Resolved(T),
    /// The lookup failed and will not be retried.
    Unresolved,
}

impl<T> Lookup<T> {
    /// Converts into an `Option`, `None` for unresolved entries.
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Resolved(value) => Some(value),
            Lookup::Unresolved => None,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Lookup::Unresolved, Lookup::Resolved)
    }
}

/// All caches of one bridge context.
#[derive(Debug)]
pub struct ResolutionCaches {
    /// Classes
    pub classes: ClassCache,
    /// Methods
    pub methods: MethodCache,
    /// Fields
    pub fields: MemberCache<FieldHandle>,
    /// Properties
    pub properties: MemberCache<PropertyHandle>,
    /// Generic instantiations
    pub generics: GenericCache,
    /// Offsets within the runtime module
    pub rvas: RvaCache,
}

impl ResolutionCaches {
    /// Creates empty caches; `module` is `(base, size)` of the runtime module, if known.
    #[must_use]
    pub fn new(config: &CacheConfig, module: Option<(u64, u64)>) -> Self {
        ResolutionCaches {
            classes: ClassCache::new(config),
            methods: MethodCache::new(config.max_arity),
            fields: MemberCache::new(),
            properties: MemberCache::new(),
            generics: GenericCache::new(),
            rvas: RvaCache::new(module),
        }
    }
}
