//! Versioned signature data for runtime symbols.
//!
//! The catalog maps canonical symbol names to their [`SymbolSignature`]. The defaults cover the
//! symbols that known protectors rename or strip; everything else resolves by name only. Callers
//! targeting a different runtime build replace or extend the catalog instead of touching the
//! resolver.

use std::collections::HashMap;

use crate::{
    resolver::signature::{BytePattern, SymbolSignature},
    Result,
};

/// Suffixes appended to `il2cpp_domain_get_assemblies` by a known protector.
const DOMAIN_GET_ASSEMBLIES_SUFFIXES: &[&str] = &[
    "_wasting_your_time",
    "_wasting_your_life",
    "_stop_reversing",
    "_go_outside",
];

const DOMAIN_GET: &[&str] = &["48 8B 05 ?? ?? ?? ?? C3", "48 8B 05 ?? ?? ?? ?? 48 85 C0"];
const DOMAIN_GET_ASSEMBLIES: &[&str] = &[
    "48 89 5C 24 ? 48 89 74 24 ? 57 48 83 EC",
    "40 53 48 83 EC ? 48 8B DA",
];
const ASSEMBLY_GET_IMAGE: &[&str] = &["48 8B 41 ? C3", "48 8B 81 ? ? ? ? C3"];
const IMAGE_GET_CLASS_COUNT: &[&str] = &["8B 41 ? C3", "48 8B 41 ? C3", "8B 81 ? ? ? ? C3"];
const CLASS_GET_NAME: &[&str] = &["48 8B 41 ? C3", "48 8B 81 ? ? ? ? C3"];

/// Signatures keyed by canonical symbol name.
#[derive(Debug, Clone, Default)]
pub struct SignatureCatalog {
    signatures: HashMap<String, SymbolSignature>,
}

impl SignatureCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the catalog of known runtime signatures.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the built-in patterns fails to parse.
    pub fn builtin() -> Result<Self> {
        let mut catalog = Self::new();

        catalog.insert(with_patterns(
            SymbolSignature::new("il2cpp_domain_get"),
            DOMAIN_GET,
        )?);
        catalog.insert(with_patterns(
            SymbolSignature::new("il2cpp_domain_get_assemblies")
                .with_suffixes(DOMAIN_GET_ASSEMBLIES_SUFFIXES),
            DOMAIN_GET_ASSEMBLIES,
        )?);
        catalog.insert(with_patterns(
            SymbolSignature::new("il2cpp_assembly_get_image"),
            ASSEMBLY_GET_IMAGE,
        )?);
        catalog.insert(with_patterns(
            SymbolSignature::new("il2cpp_image_get_class_count"),
            IMAGE_GET_CLASS_COUNT,
        )?);
        catalog.insert(with_patterns(
            SymbolSignature::new("il2cpp_class_get_name"),
            CLASS_GET_NAME,
        )?);

        Ok(catalog)
    }

    /// Adds or replaces a signature.
    pub fn insert(&mut self, signature: SymbolSignature) {
        self.signatures.insert(signature.name.clone(), signature);
    }

    /// Looks up the signature of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SymbolSignature> {
        self.signatures.get(name)
    }

    /// Returns the signature of `name`, or a name-only signature if none is known.
    #[must_use]
    pub fn signature_for(&self, name: &str) -> SymbolSignature {
        self.get(name)
            .cloned()
            .unwrap_or_else(|| SymbolSignature::new(name))
    }

    /// Number of signatures in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Returns `true` if the catalog holds no signatures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

fn with_patterns(mut signature: SymbolSignature, patterns: &[&str]) -> Result<SymbolSignature> {
    for pattern in patterns {
        signature = signature.with_pattern(BytePattern::parse_ida(pattern)?);
    }
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog() {
        let catalog = SignatureCatalog::builtin().unwrap();
        assert_eq!(catalog.len(), 5);

        let assemblies = catalog.get("il2cpp_domain_get_assemblies").unwrap();
        assert_eq!(assemblies.suffixes.len(), 4);
        assert_eq!(assemblies.patterns.len(), 2);

        let count = catalog.get("il2cpp_image_get_class_count").unwrap();
        assert_eq!(count.patterns.len(), 3);
    }

    #[test]
    fn unknown_symbols_resolve_by_name() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let signature = catalog.signature_for("il2cpp_string_new");

        assert_eq!(signature.name, "il2cpp_string_new");
        assert!(signature.suffixes.is_empty());
        assert!(signature.patterns.is_empty());
    }
}
