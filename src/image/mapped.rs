//! Live modules already loaded into the current process.
//!
//! The module loader collaborator hands over a base address and an image size; [`LoadedModule`]
//! exposes that range as a [`Backend`] without copying so the introspector and the pattern
//! scanner read the module exactly as the loader mapped it.

use std::slice;

use super::Backend;
use crate::{Error::OutOfBounds, Result};

/// A module mapped into the current address space.
#[derive(Debug)]
pub struct LoadedModule {
    base: *const u8,
    size: usize,
}

// The range is only ever read, and the loader keeps it mapped while the module is attached.
unsafe impl Send for LoadedModule {}
unsafe impl Sync for LoadedModule {}

impl LoadedModule {
    /// Wraps the range `[base, base + size)` of a loaded module.
    ///
    /// # Safety
    ///
    /// The whole range must be mapped and readable, and must stay mapped for as long as the
    /// returned value (or any [`crate::image::ModuleImage`] built from it) is alive.
    pub unsafe fn new(base: *const u8, size: usize) -> LoadedModule {
        LoadedModule { base, size }
    }

    /// Load address of the module.
    #[must_use]
    pub fn base(&self) -> u64 {
        self.base as u64
    }

    fn bytes(&self) -> &[u8] {
        if self.base.is_null() || self.size == 0 {
            return &[];
        }

        // Guaranteed readable by the contract of `LoadedModule::new`
        unsafe { slice::from_raw_parts(self.base, self.size) }
    }
}

impl Backend for LoadedModule {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(OutOfBounds);
        };

        self.bytes().get(offset..offset_end).ok_or(OutOfBounds)
    }

    fn data(&self) -> &[u8] {
        self.bytes()
    }

    fn len(&self) -> usize {
        self.size
    }
}
