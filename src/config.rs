//! Configuration for the bridge.
//!
//! All knobs are plain structs with public fields and `Default` impls. A [`BridgeConfig`] is
//! handed to [`crate::bridge::Bridge`] at construction and never changes afterwards.

use crate::resolver::Strategies;

/// Top-level configuration of a bridge context.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// Symbol resolution settings.
    pub resolver: ResolverConfig,

    /// Class, method and generic cache settings.
    pub cache: CacheConfig,

    /// Fake-method detection settings.
    pub detector: DetectorConfig,
}

impl BridgeConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the resolver settings.
    #[must_use]
    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replaces the cache settings.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the detector settings.
    #[must_use]
    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }
}

/// Configuration of the symbol resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Maximum number of thunks followed from one address (default: 10).
    pub max_thunk_depth: u32,

    /// Enabled strategies of the fallback chain (default: all).
    pub strategies: Strategies,

    /// Suffixes tried for every symbol in addition to the per-symbol ones.
    pub global_suffixes: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_thunk_depth: 10,
            strategies: Strategies::all(),
            global_suffixes: Vec::new(),
        }
    }
}

/// An ordered list of assemblies searched for classes under a namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleGroup {
    /// Namespace prefix; matches the namespace itself and anything nested below it.
    pub prefix: String,

    /// Assembly names searched in order.
    pub assemblies: Vec<String>,
}

impl ModuleGroup {
    /// Creates a group for `prefix` searching `assemblies` in order.
    #[must_use]
    pub fn new(prefix: &str, assemblies: &[&str]) -> Self {
        Self {
            prefix: prefix.to_string(),
            assemblies: assemblies.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    /// Returns `true` if `namespace` is the prefix or nested below it.
    #[must_use]
    pub fn matches(&self, namespace: &str) -> bool {
        namespace == self.prefix
            || namespace
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

/// Configuration of the resolution caches.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Highest arity tried when a method is looked up with arity `-1` (default: 16).
    pub max_arity: i32,

    /// Namespace groups consulted after the declared assembly.
    pub module_groups: Vec<ModuleGroup>,

    /// Assembly declared for generic type arguments given by full name only.
    pub fallback_assembly: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_arity: 16,
            module_groups: vec![
                ModuleGroup::new(
                    "UnityEngine",
                    &[
                        "UnityEngine.CoreModule",
                        "UnityEngine.IMGUIModule",
                        "UnityEngine.PhysicsModule",
                        "UnityEngine.UIModule",
                        "UnityEngine",
                    ],
                ),
                ModuleGroup::new(
                    "System",
                    &["mscorlib", "System.Private.CoreLib", "System", "System.Core"],
                ),
                ModuleGroup::new("TMPro", &["Unity.TextMeshPro"]),
            ],
            fallback_assembly: "Assembly-CSharp".to_string(),
        }
    }
}

/// Configuration of the fake-method detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// A method pointer shared by at least this many methods is a stub (default: 10).
    pub pointer_sharing_threshold: usize,

    /// Assemblies starting with one of these prefixes are never analysed.
    pub whitelist_prefixes: Vec<String>,

    /// Skip classes whose name contains a backtick (default: true).
    pub skip_generic_classes: bool,

    /// Fake count from which the ratio rule may mark a whole class fake (default: 5).
    pub min_fake_methods: usize,

    /// Share of fake methods from which a class is fake (default: 0.9).
    pub fake_class_ratio: f64,

    /// Number of method body bytes compared against stub patterns (default: 16).
    pub max_stub_size: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            pointer_sharing_threshold: 10,
            whitelist_prefixes: [
                "UnityEngine",
                "Unity.",
                "System",
                "mscorlib",
                "Mono.",
                "netstandard",
                "Newtonsoft",
            ]
            .iter()
            .map(|p| (*p).to_string())
            .collect(),
            skip_generic_classes: true,
            min_fake_methods: 5,
            fake_class_ratio: 0.9,
            max_stub_size: 16,
        }
    }
}
