// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'image/physical.rs' uses mmap to map a dump into memory
// - 'image/mapped.rs' reads live process memory
// - 'handles.rs' and 'marshal' read and write foreign objects
// - 'api/table.rs' transmutes resolved addresses into function pointers

//! # il2scope
//!
//! [![Crates.io](https://img.shields.io/crates/v/il2scope.svg)](https://crates.io/crates/il2scope)
//! [![Documentation](https://docs.rs/il2scope/badge.svg)](https://docs.rs/il2scope)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/il2scope/blob/main/LICENSE-APACHE)
//!
//! A bridge from Rust host code into a natively compiled managed runtime (IL2CPP style) whose
//! exported entry points may be renamed, redirected through thunks or stripped between builds.
//!
//! ## Features
//!
//! - **🔍 Obfuscation-resilient resolution** - Direct exports, thunk following, suffix matching
//!   and byte-pattern scanning, with a per-symbol report of what worked
//! - **📦 Module introspection** - PE sections and exports of live modules, dumps and files
//! - **⚡ Lazy caches** - Classes, methods, fields, generic instantiations and offsets are looked
//!   up once
//! - **🔧 Typed marshaling** - Host values in, boxed values, strings and arrays out
//! - **🛡️ Explicit failures** - Misses are `Option`, failures are [`Error`], exceptions are data
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use il2scope::prelude::*;
//!
//! # fn run(base: usize, size: usize) -> il2scope::Result<()> {
//! let image = Arc::new(ModuleImage::from_loaded(unsafe { LoadedModule::new(base as *const u8, size) })?);
//! let bridge = unsafe { Bridge::attach(image, BridgeConfig::default())? };
//!
//! let time = bridge.find_class("UnityEngine.CoreModule", "UnityEngine", "Time").unwrap();
//! let get_time = bridge.find_method(time, "get_time", 0).unwrap();
//! let seconds: f32 = bridge.call(get_time, None, &[])?;
//! println!("{} seconds since startup", seconds);
//! # Ok(())
//! # }
//! ```
//!
//! ## Offline Analysis
//!
//! Resolution works on any image, including a module file on disk:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use il2scope::prelude::*;
//!
//! let image = Arc::new(ModuleImage::from_file("GameAssembly.dll".as_ref())?);
//! let resolver = SymbolResolver::new(image, SignatureCatalog::builtin()?, ResolverConfig::default());
//!
//! for symbol in RuntimeSymbol::iter() {
//!     match resolver.resolve_name(symbol.name()) {
//!         Ok(found) => println!("{} -> 0x{:x} [{}]", symbol, found.address, found.strategy),
//!         Err(e) => println!("{}: {}", symbol, e),
//!     }
//! }
//! # Ok::<(), il2scope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - [`image`] - PE introspection of the runtime module
//! - [`resolver`] - The symbol fallback chain and its report
//! - [`api`] - The bound runtime API behind the [`api::RuntimeApi`] trait
//! - [`cache`] - Lazily populated lookup caches
//! - [`marshal`] - Argument marshaling and return value conversion
//! - [`bridge`] - The context object tying it together, plus diagnostics
//! - [`hook`] and [`detect`] - Hook bookkeeping and fake-method detection
//! - [`prelude`] - Commonly used types
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, Error>`](Result):
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use il2scope::{bridge::Bridge, config::BridgeConfig, image::ModuleImage, Error};
//!
//! # fn run(image: Arc<ModuleImage>) {
//! match unsafe { Bridge::attach(image, BridgeConfig::default()) } {
//!     Ok(_) => println!("attached"),
//!     Err(Error::ApiTableIncomplete { missing }) => println!("missing: {:?}", missing),
//!     Err(e) => println!("bring-up failed: {}", e),
//! }
//! # }
//! ```

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// ```rust
/// use il2scope::prelude::*;
///
/// let config = BridgeConfig::default();
/// assert_eq!(config.resolver.max_thunk_depth, 10);
/// ```
pub mod prelude;

/// The runtime API: bound function pointers and the [`api::RuntimeApi`] trait.
pub mod api;

/// The bridge context, thread registration and last-error diagnostics.
pub mod bridge;

/// Lazily populated resolution caches.
pub mod cache;

/// Bridge, resolver, cache and detector configuration.
pub mod config;

/// Detection of obfuscator-injected fake methods.
pub mod detect;

/// Typed handles to foreign runtime entities and the object layout they read.
pub mod handles;

/// Hook bookkeeping on top of a host-provided installer.
pub mod hook;

/// Introspection of the runtime module: sections, exports and bounded reads.
///
/// # Example
///
/// ```rust,no_run
/// use il2scope::image::ModuleImage;
///
/// let image = ModuleImage::from_file("GameAssembly.dll".as_ref())?;
/// println!(".text at 0x{:x}, {} exports", image.text().start, image.exports().len());
/// # Ok::<(), il2scope::Error>(())
/// ```
pub mod image;

/// Argument marshaling and return value conversion.
pub mod marshal;

/// Obfuscation-resilient symbol resolution.
pub mod resolver;

/// `il2scope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust,no_run
/// use il2scope::{image::ModuleImage, Result};
///
/// fn load(path: &str) -> Result<ModuleImage> {
///     ModuleImage::from_file(std::path::Path::new(path))
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `il2scope` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust,no_run
/// use il2scope::{image::ModuleImage, Error};
///
/// match ModuleImage::from_file(std::path::Path::new("GameAssembly.dll")) {
///     Ok(_) => println!("Loaded successfully"),
///     Err(Error::ModuleParse { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// The bridge context and its process-wide cell.
pub use bridge::{Bridge, BridgeCell};
