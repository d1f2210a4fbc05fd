//! # il2scope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the il2scope library. Import this module to get quick access to the essential
//! types for bridging into the managed runtime.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all il2scope operations
pub use crate::Error;

/// The result type used throughout il2scope
pub use crate::Result;

/// Numeric diagnostic codes and the per-thread last error
pub use crate::bridge::{clear_last_error, last_error, ErrorCode, LastError};

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The bridge context and its process-wide cell
pub use crate::bridge::{Bridge, BridgeCell};

/// Configuration of the bridge and its components
pub use crate::config::{BridgeConfig, CacheConfig, DetectorConfig, ModuleGroup, ResolverConfig};

// ================================================================================================
// Module Introspection
// ================================================================================================

/// The runtime module and its parts
pub use crate::image::{Export, ImageLayout, LoadedModule, ModuleImage, Section};

// ================================================================================================
// Symbol Resolution
// ================================================================================================

/// The fallback chain and its inputs
pub use crate::resolver::{
    BytePattern, ResolvedSymbol, SignatureCatalog, Strategies, Strategy, SymbolResolver,
    SymbolSignature,
};

/// Diagnostics of a resolution run
pub use crate::resolver::{Attempt, Outcome, ResolutionReport};

// ================================================================================================
// Runtime API
// ================================================================================================

/// The bound entry points and the interface the bridge calls through
pub use crate::api::{ApiTable, InvocationResult, RuntimeApi, RuntimeSymbol};

/// Iteration over [`RuntimeSymbol`] variants
pub use strum::IntoEnumIterator;

// ================================================================================================
// Handles
// ================================================================================================

/// Typed references to foreign runtime entities
pub use crate::handles::{
    AssemblyHandle, ClassHandle, DomainHandle, FieldHandle, ImageHandle, MethodHandle,
    ObjectHandle, PropertyHandle, ThreadHandle, TypeHandle,
};

// ================================================================================================
// Marshaling
// ================================================================================================

/// Outbound arguments
pub use crate::marshal::{Argument, Primitive, TypeRef};

/// Inbound conversion
pub use crate::marshal::{ArrayElement, Blittable, FromReturn};

/// Typed wrappers over foreign objects
pub use crate::marshal::{ForeignWrapper, WrapperRegistry};

// ================================================================================================
// Hooks and Detection
// ================================================================================================

/// Hook bookkeeping
pub use crate::hook::{HookId, HookInstaller, HookRecord, HookRegistry};

/// Fake-method detection
pub use crate::detect::{DetectionReport, FakeReason, ObfuscationDetector};
