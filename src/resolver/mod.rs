//! Obfuscation-resilient symbol resolution.
//!
//! The [`SymbolResolver`] locates runtime entry points in a [`ModuleImage`] whose exports may be
//! renamed, redirected through jump stubs or stripped altogether. Each symbol goes through a
//! fallback chain; the first strategy that produces an address wins and every attempt is recorded
//! in the [`ResolutionReport`].
//!
//! # Strategy chain
//!
//! 1. **Direct** - exact export name match
//! 2. **Thunk following** - applied to addresses from strategies 1 and 3, see [`thunk`]
//! 3. **Suffix match** - an export ending in one of the symbol's obfuscation suffixes, such as
//!    `il2cpp_wasting_your_life` for `il2cpp_domain_get_assemblies`
//! 4. **Pattern scan** - the symbol's byte patterns over the executable section
//!
//! A direct hit that needed at least one thunk hop is reported as [`Strategy::ThunkFollowed`].
//! Suffix and pattern matches accept the first candidate in enumeration order. Every resolved
//! address, before and after thunk following, lies inside the module.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use il2scope::{
//!     config::ResolverConfig,
//!     image::ModuleImageBuilder,
//!     resolver::{SignatureCatalog, Strategy, SymbolResolver},
//! };
//!
//! let image = ModuleImageBuilder::new()
//!     .text(vec![0xC3; 16])
//!     .export("il2cpp_stop_reversing", ".text", 0)
//!     .load()?;
//!
//! let resolver = SymbolResolver::new(
//!     Arc::new(image),
//!     SignatureCatalog::builtin()?,
//!     ResolverConfig::default(),
//! );
//! let symbol = resolver.resolve_name("il2cpp_domain_get_assemblies")?;
//! assert_eq!(symbol.strategy, Strategy::SuffixMatch);
//! # Ok::<(), il2scope::Error>(())
//! ```

mod catalog;
mod report;
mod signature;

pub mod scan;
pub mod thunk;

pub use catalog::SignatureCatalog;
pub use report::{Attempt, Outcome, ResolutionReport};
pub use signature::{BytePattern, SymbolSignature};

use std::sync::Arc;

use bitflags::bitflags;
use strum::{Display, EnumIter, IntoStaticStr};

use crate::{config::ResolverConfig, image::ModuleImage, Error, Result};

/// How a symbol was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum Strategy {
    /// Exact export name
    Direct,
    /// Exact export name, redirected through one or more thunks
    ThunkFollowed,
    /// Export name with a known obfuscation suffix
    SuffixMatch,
    /// Byte pattern in the executable section
    PatternScan,
}

bitflags! {
    /// Set of enabled resolution strategies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Strategies: u8 {
        /// Exact export name lookup
        const DIRECT = 0x01;
        /// Follow jump thunks after name-based hits
        const THUNKS = 0x02;
        /// Suffix matching over export names
        const SUFFIX = 0x04;
        /// Pattern scanning over the executable section
        const PATTERN = 0x08;
    }
}

/// A successfully resolved symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol {
    /// Canonical symbol name
    pub name: String,
    /// Name of the export that matched, or the canonical name for pattern hits
    pub matched: String,
    /// Absolute address inside the module
    pub address: u64,
    /// Strategy that produced the address
    pub strategy: Strategy,
    /// Thunk hops consumed
    pub depth: u32,
}

/// Anything that can turn a canonical symbol name into an address.
///
/// Implemented by [`SymbolResolver`]; tests provide doubles with forced failures.
pub trait SymbolSource: Sync {
    /// Resolves `name`, returning `None` if it cannot be located.
    fn resolve_symbol(&self, name: &str) -> Option<u64>;
}

/// Resolves runtime symbols inside one module.
pub struct SymbolResolver {
    image: Arc<ModuleImage>,
    catalog: SignatureCatalog,
    config: ResolverConfig,
    report: ResolutionReport,
}

impl SymbolResolver {
    /// Creates a resolver over `image`.
    #[must_use]
    pub fn new(image: Arc<ModuleImage>, catalog: SignatureCatalog, config: ResolverConfig) -> Self {
        SymbolResolver {
            image,
            catalog,
            config,
            report: ResolutionReport::new(),
        }
    }

    /// The module being resolved against.
    #[must_use]
    pub fn image(&self) -> &Arc<ModuleImage> {
        &self.image
    }

    /// The signature catalog.
    #[must_use]
    pub fn catalog(&self) -> &SignatureCatalog {
        &self.catalog
    }

    /// All attempts made so far.
    #[must_use]
    pub fn report(&self) -> &ResolutionReport {
        &self.report
    }

    /// Consumes the resolver and returns its report.
    #[must_use]
    pub fn into_report(self) -> ResolutionReport {
        self.report
    }

    /// Resolves `name` using its catalog signature, or by name alone if it has none.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Resolution`] if no strategy locates the symbol.
    pub fn resolve_name(&self, name: &str) -> Result<ResolvedSymbol> {
        match self.catalog.get(name) {
            Some(signature) => self.resolve(signature),
            None => self.resolve(&SymbolSignature::new(name)),
        }
    }

    /// Runs the strategy chain for `signature`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Resolution`] if no strategy locates the symbol. If a name-based
    /// hit failed during thunk following, that failure is returned.
    pub fn resolve(&self, signature: &SymbolSignature) -> Result<ResolvedSymbol> {
        let strategies = self.config.strategies;
        let mut failure: Option<Error> = None;

        if strategies.contains(Strategies::DIRECT) {
            match self.image.export(&signature.name) {
                Some(export) => {
                    match self.finish(signature, &export.name, export.address, Strategy::Direct) {
                        Ok(symbol) => return Ok(symbol),
                        Err(error) => failure = Some(error),
                    }
                }
                None => self.fail(&signature.name, Strategy::Direct, "no export with this name"),
            }
        }

        if strategies.contains(Strategies::SUFFIX) {
            match self.find_by_suffix(signature) {
                Some((export_name, address)) => {
                    match self.finish(signature, &export_name, address, Strategy::SuffixMatch) {
                        Ok(symbol) => return Ok(symbol),
                        Err(error) => failure = Some(error),
                    }
                }
                None => self.fail(
                    &signature.name,
                    Strategy::SuffixMatch,
                    "no export with a known suffix",
                ),
            }
        }

        if strategies.contains(Strategies::PATTERN) && !signature.patterns.is_empty() {
            for pattern in &signature.patterns {
                if let Some(address) = scan::scan_text(&self.image, pattern) {
                    let symbol = ResolvedSymbol {
                        name: signature.name.clone(),
                        matched: signature.name.clone(),
                        address,
                        strategy: Strategy::PatternScan,
                        depth: 0,
                    };
                    self.succeed(&symbol);
                    return Ok(symbol);
                }
            }
            self.fail(
                &signature.name,
                Strategy::PatternScan,
                "no pattern matched in the executable section",
            );
        }

        let error = failure.unwrap_or_else(|| {
            resolution_error!(signature.name, "no strategy located the symbol")
        });
        log::debug!("{}", error);
        Err(error)
    }

    /// Finds the first export, in enumeration order, whose name ends in one of the signature's
    /// suffixes or the configured global suffixes and is longer than that suffix.
    #[must_use]
    pub fn find_by_suffix(&self, signature: &SymbolSignature) -> Option<(String, u64)> {
        let suffixes: Vec<&str> = signature
            .suffixes
            .iter()
            .chain(&self.config.global_suffixes)
            .map(String::as_str)
            .collect();
        if suffixes.is_empty() {
            return None;
        }

        self.image
            .exports()
            .iter()
            .find(|export| {
                suffixes.iter().any(|suffix| {
                    export.name.len() > suffix.len() && export.name.ends_with(suffix)
                })
            })
            .map(|export| (export.name.clone(), export.address))
    }

    /// Follows thunks from `address` with the configured bound.
    ///
    /// # Errors
    ///
    /// See [`thunk::follow`].
    pub fn follow_thunks(&self, address: u64, symbol: &str) -> Result<(u64, u32)> {
        thunk::follow(&self.image, address, self.config.max_thunk_depth, symbol)
    }

    fn finish(
        &self,
        signature: &SymbolSignature,
        matched: &str,
        address: u64,
        strategy: Strategy,
    ) -> Result<ResolvedSymbol> {
        if !self.image.contains(address) {
            let error = resolution_error!(
                signature.name,
                "{} points at 0x{:x} outside of the module",
                matched,
                address
            );
            self.fail(&signature.name, strategy, &error.to_string());
            return Err(error);
        }

        let (address, depth) = if self.config.strategies.contains(Strategies::THUNKS) {
            match self.follow_thunks(address, &signature.name) {
                Ok(resolved) => resolved,
                Err(error) => {
                    self.fail(&signature.name, strategy, &error.to_string());
                    return Err(error);
                }
            }
        } else {
            (address, 0)
        };

        if !self.image.contains(address) {
            let error = resolution_error!(
                signature.name,
                "{} resolves to 0x{:x} outside of the module",
                matched,
                address
            );
            self.fail(&signature.name, strategy, &error.to_string());
            return Err(error);
        }

        let strategy = if strategy == Strategy::Direct && depth > 0 {
            Strategy::ThunkFollowed
        } else {
            strategy
        };

        let symbol = ResolvedSymbol {
            name: signature.name.clone(),
            matched: matched.to_string(),
            address,
            strategy,
            depth,
        };
        self.succeed(&symbol);
        Ok(symbol)
    }

    fn succeed(&self, symbol: &ResolvedSymbol) {
        log::debug!(
            "{} -> {} @ 0x{:x} [{}]",
            symbol.name,
            symbol.matched,
            symbol.address,
            symbol.strategy
        );
        self.report.record(
            &symbol.name,
            symbol.strategy,
            Outcome::Resolved {
                name: symbol.matched.clone(),
                address: symbol.address,
                depth: symbol.depth,
            },
        );
    }

    fn fail(&self, symbol: &str, strategy: Strategy, reason: &str) {
        self.report
            .record(symbol, strategy, Outcome::Failed(reason.to_string()));
    }
}

impl SymbolSource for SymbolResolver {
    fn resolve_symbol(&self, name: &str) -> Option<u64> {
        self.resolve_name(name).ok().map(|symbol| symbol.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ModuleImageBuilder;

    fn resolver(image: ModuleImageBuilder, config: ResolverConfig) -> SymbolResolver {
        SymbolResolver::new(
            Arc::new(image.load().unwrap()),
            SignatureCatalog::builtin().unwrap(),
            config,
        )
    }

    #[test]
    fn direct_export() {
        let resolver = resolver(
            ModuleImageBuilder::new()
                .text(vec![0xC3; 0x10])
                .export("il2cpp_string_new", ".text", 4),
            ResolverConfig::default(),
        );

        let symbol = resolver.resolve_name("il2cpp_string_new").unwrap();
        assert_eq!(symbol.strategy, Strategy::Direct);
        assert_eq!(symbol.address, 0x1_8000_1004);
        assert_eq!(symbol.depth, 0);
    }

    #[test]
    fn direct_export_through_thunk() {
        let mut code = vec![0xC3; 0x20];
        code[0..5].copy_from_slice(&[0xE9, 0x0B, 0x00, 0x00, 0x00]);

        let resolver = resolver(
            ModuleImageBuilder::new()
                .text(code)
                .export("il2cpp_object_new", ".text", 0),
            ResolverConfig::default(),
        );

        let symbol = resolver.resolve_name("il2cpp_object_new").unwrap();
        assert_eq!(symbol.strategy, Strategy::ThunkFollowed);
        assert_eq!(symbol.address, 0x1_8000_1010);
        assert_eq!(symbol.depth, 1);
        assert_eq!(
            resolver.report().strategy_for("il2cpp_object_new"),
            Some(Strategy::ThunkFollowed)
        );
    }

    #[test]
    fn suffix_requires_longer_name() {
        let resolver = resolver(
            ModuleImageBuilder::new()
                .text(vec![0xC3; 0x10])
                .export("_go_outside", ".text", 0)
                .export("il2cpp_domain_get_assemblies_go_outside", ".text", 8),
            ResolverConfig::default(),
        );

        let symbol = resolver.resolve_name("il2cpp_domain_get_assemblies").unwrap();
        assert_eq!(symbol.strategy, Strategy::SuffixMatch);
        assert_eq!(symbol.matched, "il2cpp_domain_get_assemblies_go_outside");
        assert_eq!(symbol.address, 0x1_8000_1008);
    }

    #[test]
    fn suffix_replaces_name_tail() {
        let resolver = resolver(
            ModuleImageBuilder::new()
                .text(vec![0xC3; 0x10])
                .export("il2cpp_wasting_your_life", ".text", 4),
            ResolverConfig::default(),
        );

        let symbol = resolver.resolve_name("il2cpp_domain_get_assemblies").unwrap();
        assert_eq!(symbol.strategy, Strategy::SuffixMatch);
        assert_eq!(symbol.matched, "il2cpp_wasting_your_life");
        assert_eq!(symbol.address, 0x1_8000_1004);
    }

    #[test]
    fn export_outside_module_fails() {
        let resolver = resolver(
            ModuleImageBuilder::new()
                .text(vec![0xC3; 0x10])
                .export("il2cpp_string_new", ".text", 0x40_0000),
            ResolverConfig::default(),
        );
        assert!(!resolver.image().contains(0x1_8040_1000));

        match resolver.resolve_name("il2cpp_string_new") {
            Err(Error::Resolution { symbol, reason }) => {
                assert_eq!(symbol, "il2cpp_string_new");
                assert!(reason.contains("outside of the module"), "{}", reason);
            }
            other => panic!("expected resolution error, got {:?}", other),
        }
        assert!(resolver.resolve_symbol("il2cpp_string_new").is_none());
        assert!(matches!(
            resolver.report().attempts().next().map(|attempt| &attempt.outcome),
            Some(Outcome::Failed(_))
        ));
    }

    #[test]
    fn global_suffixes() {
        let config = ResolverConfig {
            global_suffixes: vec!["_x".to_string()],
            ..ResolverConfig::default()
        };
        let resolver = resolver(
            ModuleImageBuilder::new()
                .text(vec![0xC3; 0x10])
                .export("il2cpp_string_new_x", ".text", 0),
            config,
        );

        assert_eq!(
            resolver.resolve_name("il2cpp_string_new").unwrap().strategy,
            Strategy::SuffixMatch
        );
    }

    #[test]
    fn pattern_fallback() {
        let mut code = vec![0xCC; 0x40];
        code[0x20..0x28].copy_from_slice(&[0x48, 0x8B, 0x05, 0x11, 0x22, 0x33, 0x44, 0xC3]);

        let resolver = resolver(
            ModuleImageBuilder::new().text(code),
            ResolverConfig::default(),
        );

        let symbol = resolver.resolve_name("il2cpp_domain_get").unwrap();
        assert_eq!(symbol.strategy, Strategy::PatternScan);
        assert_eq!(symbol.address, 0x1_8000_1020);

        let text = resolver.image().text();
        assert!(text.contains(symbol.address));
    }

    #[test]
    fn disabled_strategies_are_skipped() {
        let config = ResolverConfig {
            strategies: Strategies::DIRECT,
            ..ResolverConfig::default()
        };
        let resolver = resolver(
            ModuleImageBuilder::new()
                .text(vec![0xC3; 0x10])
                .export("il2cpp_domain_get_assemblies_go_outside", ".text", 0),
            config,
        );

        assert!(matches!(
            resolver.resolve_name("il2cpp_domain_get_assemblies"),
            Err(Error::Resolution { .. })
        ));
    }

    #[test]
    fn unresolvable_symbol() {
        let resolver = resolver(
            ModuleImageBuilder::new().text(vec![0x90; 0x10]),
            ResolverConfig::default(),
        );

        match resolver.resolve_name("il2cpp_runtime_invoke") {
            Err(Error::Resolution { symbol, .. }) => assert_eq!(symbol, "il2cpp_runtime_invoke"),
            other => panic!("expected resolution error, got {:?}", other),
        }
        assert!(resolver.resolve_symbol("il2cpp_runtime_invoke").is_none());
        assert!(resolver
            .report()
            .attempts()
            .all(|attempt| matches!(attempt.outcome, Outcome::Failed(_))));
    }
}
