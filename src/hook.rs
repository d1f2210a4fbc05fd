//! Hook bookkeeping.
//!
//! The crate decides *where* to hook (a method's native entry point, a module-relative offset or
//! a raw address) and tracks what is installed. Writing the jump itself is the job of a
//! [`HookInstaller`] supplied by the host.
//!
//! # Examples
//!
//! ```rust
//! use il2scope::{hook::{HookInstaller, HookRegistry}, Result};
//!
//! struct Recorder;
//!
//! impl HookInstaller for Recorder {
//!     fn install(&self, target: u64, _detour: u64) -> Result<u64> {
//!         Ok(target + 0x10)
//!     }
//!     fn remove(&self, _target: u64) -> Result<()> {
//!         Ok(())
//!     }
//!     fn set_enabled(&self, _target: u64, _enabled: bool) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let hooks = HookRegistry::new(Recorder);
//! let id = hooks.hook_address(0x1_8000_1000, 0x7FF0_0000)?;
//! assert_eq!(hooks.get(id).unwrap().trampoline, 0x1_8000_1010);
//! hooks.remove(id)?;
//! # Ok::<(), il2scope::Error>(())
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::{
    cache::RvaCache,
    handles::MethodHandle,
    Error::{InvalidArgument, LookupMiss},
    Result,
};

/// Writes and removes jumps in foreign code.
pub trait HookInstaller: Send + Sync {
    /// Redirects `target` to `detour` and returns the address of a trampoline that runs the
    /// original code.
    ///
    /// # Errors
    ///
    /// Implementations fail if the target cannot be patched.
    fn install(&self, target: u64, detour: u64) -> Result<u64>;

    /// Restores the original code at `target`.
    ///
    /// # Errors
    ///
    /// Implementations fail if `target` is not hooked or cannot be restored.
    fn remove(&self, target: u64) -> Result<()>;

    /// Activates or deactivates an installed hook without removing it.
    ///
    /// # Errors
    ///
    /// Implementations fail if `target` is not hooked.
    fn set_enabled(&self, target: u64, enabled: bool) -> Result<()>;
}

/// Identifier of an installed hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

impl HookId {
    /// The numeric value of the id.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// An installed hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookRecord {
    /// Hooked address
    pub target: u64,
    /// Replacement code
    pub detour: u64,
    /// Entry to the original code
    pub trampoline: u64,
    /// Whether the hook is currently active
    pub enabled: bool,
}

/// Installed hooks by id.
pub struct HookRegistry<I: HookInstaller> {
    installer: I,
    hooks: DashMap<HookId, HookRecord>,
    next_id: AtomicU64,
}

impl<I: HookInstaller> HookRegistry<I> {
    /// Creates an empty registry installing through `installer`.
    pub fn new(installer: I) -> Self {
        HookRegistry {
            installer,
            hooks: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// The installer.
    pub fn installer(&self) -> &I {
        &self.installer
    }

    /// Hooks a raw address.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] for a zero target or detour, or if the target is
    /// already hooked, and propagates installer failures.
    pub fn hook_address(&self, target: u64, detour: u64) -> Result<HookId> {
        if target == 0 || detour == 0 {
            return Err(InvalidArgument("hook target and detour must be non-null".to_string()));
        }
        if self.hooks.iter().any(|hook| hook.target == target) {
            return Err(InvalidArgument(format!("0x{:x} is already hooked", target)));
        }

        let trampoline = self.installer.install(target, detour)?;
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks.insert(
            id,
            HookRecord {
                target,
                detour,
                trampoline,
                enabled: true,
            },
        );
        log::debug!(
            "hook {} installed at 0x{:x} -> 0x{:x}",
            id.value(),
            target,
            detour
        );
        Ok(id)
    }

    /// Hooks the native entry point of `method`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LookupMiss`] if the method has no native code, and the errors of
    /// [`HookRegistry::hook_address`].
    pub fn hook_method(&self, method: MethodHandle, detour: u64) -> Result<HookId> {
        let target = method
            .pointer()
            .ok_or_else(|| LookupMiss(format!("native code of {:?}", method)))?;
        self.hook_address(target, detour)
    }

    /// Hooks a module-relative offset.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if `rva` lies outside of the module, and the
    /// errors of [`HookRegistry::hook_address`].
    pub fn hook_rva(&self, rvas: &RvaCache, rva: u64, detour: u64) -> Result<HookId> {
        let target = rvas
            .resolve(rva)
            .ok_or_else(|| InvalidArgument(format!("rva 0x{:x} is outside of the module", rva)))?;
        self.hook_address(target, detour)
    }

    /// Removes a hook.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] for an unknown id and propagates installer
    /// failures; the hook stays registered if the installer fails.
    pub fn remove(&self, id: HookId) -> Result<()> {
        let target = self.record(id)?.target;
        self.installer.remove(target)?;
        self.hooks.remove(&id);
        Ok(())
    }

    /// Activates a hook.
    ///
    /// # Errors
    ///
    /// See [`HookRegistry::set_enabled`].
    pub fn enable(&self, id: HookId) -> Result<()> {
        self.set_enabled(id, true)
    }

    /// Deactivates a hook without removing it.
    ///
    /// # Errors
    ///
    /// See [`HookRegistry::set_enabled`].
    pub fn disable(&self, id: HookId) -> Result<()> {
        self.set_enabled(id, false)
    }

    /// Activates or deactivates a hook.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] for an unknown id and propagates installer
    /// failures.
    pub fn set_enabled(&self, id: HookId, enabled: bool) -> Result<()> {
        let target = self.record(id)?.target;
        self.installer.set_enabled(target, enabled)?;
        if let Some(mut hook) = self.hooks.get_mut(&id) {
            hook.enabled = enabled;
        }
        Ok(())
    }

    /// The record of a hook.
    #[must_use]
    pub fn get(&self, id: HookId) -> Option<HookRecord> {
        self.hooks.get(&id).map(|hook| *hook)
    }

    /// Number of installed hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if nothing is hooked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    fn record(&self, id: HookId) -> Result<HookRecord> {
        self.get(id)
            .ok_or_else(|| InvalidArgument(format!("unknown hook {}", id.value())))
    }
}
