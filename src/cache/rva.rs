use dashmap::DashMap;

/// Module-relative offsets to absolute addresses in the runtime module.
///
/// For callers that already know where a function lives and bypass name resolution.
#[derive(Debug)]
pub struct RvaCache {
    entries: DashMap<u64, u64>,
    module: Option<(u64, u64)>,
}

impl RvaCache {
    /// Creates a cache for the module `(base, size)`; without a module every lookup misses.
    #[must_use]
    pub fn new(module: Option<(u64, u64)>) -> Self {
        RvaCache {
            entries: DashMap::new(),
            module,
        }
    }

    /// Absolute address of `rva`, `None` if it lies outside the module.
    #[must_use]
    pub fn resolve(&self, rva: u64) -> Option<u64> {
        if let Some(address) = self.entries.get(&rva).map(|entry| *entry) {
            return Some(address);
        }

        let (base, size) = self.module?;
        if rva >= size {
            log::debug!("rva 0x{:x} is outside of the module (size 0x{:x})", rva, size);
            return None;
        }

        let address = base + rva;
        self.entries.insert(rva, address);
        Some(address)
    }

    /// Number of cached offsets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
