use std::{
    cell::RefCell,
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use crate::{
    api::RuntimeApi,
    handles::{DomainHandle, ThreadHandle},
    Error::ThreadNotRegistered,
    Result,
};

static NEXT_REGISTRY: AtomicU64 = AtomicU64::new(1);

/// Registration token of this thread, tied to the lifetime of its registry.
struct Registration {
    owner: Weak<()>,
    thread: ThreadHandle,
}

thread_local! {
    // (registry, domain address) -> registration of this thread
    static ATTACHED: RefCell<HashMap<(u64, u64), Registration>> = RefCell::new(HashMap::new());
}

/// Tracks which threads are registered with a runtime domain.
///
/// Registration state is thread local, so the fast path takes no lock. Each registry has its own
/// identity; two bridges never share registrations.
///
/// Dropping a registry removes its entries on the dropping thread at once. Other threads drop
/// them the next time they register with any registry.
#[derive(Debug)]
pub struct ThreadRegistry {
    id: u64,
    alive: Arc<()>,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadRegistry {
    /// Creates a registry with no attached threads.
    #[must_use]
    pub fn new() -> Self {
        ThreadRegistry {
            id: NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed),
            alive: Arc::new(()),
        }
    }

    /// Returns `true` if the calling thread is registered with `domain`.
    #[must_use]
    pub fn is_attached(&self, domain: DomainHandle) -> bool {
        ATTACHED.with(|attached| attached.borrow().contains_key(&(self.id, domain.addr())))
    }

    /// Registers the calling thread with `domain` unless it already is.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ThreadNotRegistered`] if the runtime refuses the registration.
    pub fn ensure_attached<R: RuntimeApi + ?Sized>(
        &self,
        runtime: &R,
        domain: DomainHandle,
    ) -> Result<ThreadHandle> {
        let key = (self.id, domain.addr());
        let known = ATTACHED.with(|attached| {
            attached
                .borrow()
                .get(&key)
                .map(|registration| registration.thread)
        });
        if let Some(thread) = known {
            return Ok(thread);
        }

        let thread = runtime.thread_attach(domain).ok_or(ThreadNotRegistered)?;
        log::debug!(
            "attached thread {:?} to {:?} as {:?}",
            std::thread::current().id(),
            domain,
            thread
        );
        let registration = Registration {
            owner: Arc::downgrade(&self.alive),
            thread,
        };
        ATTACHED.with(|attached| {
            let mut attached = attached.borrow_mut();
            attached.retain(|_, registration| registration.owner.strong_count() > 0);
            attached.insert(key, registration);
        });
        Ok(thread)
    }

    /// Unregisters the calling thread from `domain`; returns `false` if it was not registered.
    pub fn detach<R: RuntimeApi + ?Sized>(&self, runtime: &R, domain: DomainHandle) -> bool {
        let key = (self.id, domain.addr());
        let Some(registration) = ATTACHED.with(|attached| attached.borrow_mut().remove(&key))
        else {
            return false;
        };

        runtime.thread_detach(registration.thread)
    }
}

impl Drop for ThreadRegistry {
    fn drop(&mut self) {
        // The thread local is gone if this runs during thread teardown
        let _ = ATTACHED.try_with(|attached| {
            if let Ok(mut attached) = attached.try_borrow_mut() {
                attached.retain(|(registry, _), _| *registry != self.id);
            }
        });
    }
}

/// Number of registrations held by the calling thread, across all registries.
#[cfg(test)]
fn registrations_here() -> usize {
    ATTACHED.with(|attached| attached.borrow().len())
}
