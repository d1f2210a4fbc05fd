//! Detection of obfuscator-injected fake methods.
//!
//! Some obfuscators pad classes with methods that never run: they carry generated names and
//! share one stub body, or have no body at all. The [`ObfuscationDetector`] looks at every method
//! the runtime knows and separates real methods from such padding, so that tooling can hide them.
//!
//! # Architecture
//!
//! Analysis runs in two passes over a [`Census`] of all loaded classes and methods:
//!
//! 1. **Pointer sharing** - count how many methods share each native entry point. Pointers
//!    shared by at least [`DetectorConfig::pointer_sharing_threshold`] methods are stubs.
//!    Whitelisted assemblies and generic classes do not count, as they legitimately fold code.
//! 2. **Classification** - per method, in order: virtual or abstract methods, constructors and
//!    finalizers, and methods of generic classes are real. A method with an obfuscated name is
//!    fake if it has no body, if its pointer is a stub, or if its body is one of the known empty
//!    x86-64 stubs. Everything else is real.
//!
//! A class is entirely fake when it has methods but none of them is real, or when enough of
//! them are fake ([`DetectorConfig::min_fake_methods`] and [`DetectorConfig::fake_class_ratio`]).
//!
//! An obfuscated name is exactly eleven ASCII uppercase letters.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt, fs,
    io::{self, Write},
    path::Path,
};

use bitflags::bitflags;

use crate::{
    api::RuntimeApi,
    config::DetectorConfig,
    handles::{ClassHandle, MethodHandle},
    image::ModuleImage,
    Result,
};

bitflags! {
    /// `MethodAttributes` bits relevant to classification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodAttributes: u32 {
        /// Method is static
        const STATIC = 0x0010;
        /// Method is final
        const FINAL = 0x0020;
        /// Method occupies a vtable slot
        const VIRTUAL = 0x0040;
        /// Method has no implementation
        const ABSTRACT = 0x0400;
    }
}

/// Empty bodies that return immediately, optionally with a constant.
const STUB_BODIES: &[&[u8]] = &[
    &[0xC3],
    &[0xCC, 0xC3],
    &[0x33, 0xC0, 0xC3],
    &[0x90, 0x33, 0xC0, 0xC3],
    &[0xB8, 0x00, 0x00, 0x00, 0x00, 0xC3],
    &[0xB8, 0x01, 0x00, 0x00, 0x00, 0xC3],
    &[0x55, 0x48, 0x89, 0xE5, 0x5D, 0xC3],
];

/// Returns `true` if `name` looks generated: exactly eleven ASCII uppercase letters.
#[must_use]
pub fn is_obfuscated_name(name: &str) -> bool {
    name.len() == 11 && name.bytes().all(|b| b.is_ascii_uppercase())
}

/// Returns `true` if `body` starts with a known empty x86-64 function body.
#[must_use]
pub fn is_stub_body(body: &[u8]) -> bool {
    if STUB_BODIES.iter().any(|stub| body.starts_with(stub)) {
        return true;
    }

    // sub rsp, N; add rsp, N; ret
    body.len() >= 9
        && body[0..3] == [0x48, 0x83, 0xEC]
        && body[4..7] == [0x48, 0x83, 0xC4]
        && body[3] == body[7]
        && body[8] == 0xC3
}

/// Returns `true` for class names with generic arity, such as ``List`1``.
fn is_generic_class(name: &str) -> bool {
    name.contains('`')
}

/// One method as seen by the detector.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    /// The method
    pub method: MethodHandle,
    /// Method name
    pub name: String,
    /// Native entry point, `0` if there is none
    pub pointer: u64,
    /// Number of parameters
    pub params: u32,
    /// Method attributes
    pub flags: MethodAttributes,
}

/// One class as seen by the detector.
#[derive(Debug, Clone)]
pub struct ClassEntry {
    /// The class
    pub class: ClassHandle,
    /// `Namespace.Name`, or just the name in the global namespace
    pub full_name: String,
    /// Declared methods
    pub methods: Vec<MethodEntry>,
}

impl ClassEntry {
    fn is_generic(&self) -> bool {
        is_generic_class(self.full_name.rsplit('.').next().unwrap_or(&self.full_name))
    }
}

/// One assembly as seen by the detector.
#[derive(Debug, Clone)]
pub struct AssemblyEntry {
    /// Image name
    pub name: String,
    /// Defined classes
    pub classes: Vec<ClassEntry>,
}

/// Snapshot of all loaded classes and methods.
#[derive(Debug, Clone, Default)]
pub struct Census {
    /// Loaded assemblies in load order
    pub assemblies: Vec<AssemblyEntry>,
}

impl Census {
    /// Walks every loaded assembly through the runtime's enumeration API.
    ///
    /// Returns an empty census if the runtime has no domain or does not support enumeration.
    pub fn collect<R: RuntimeApi + ?Sized>(runtime: &R) -> Self {
        let Some(domain) = runtime.domain() else {
            return Census::default();
        };

        let assemblies = runtime
            .assemblies(domain)
            .into_iter()
            .filter_map(|assembly| runtime.assembly_image(assembly))
            .map(|image| AssemblyEntry {
                name: runtime.image_name(image).unwrap_or_default(),
                classes: runtime
                    .image_classes(image)
                    .into_iter()
                    .filter_map(|class| collect_class(runtime, class))
                    .collect(),
            })
            .collect();
        Census { assemblies }
    }

    /// Total number of methods.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.assemblies
            .iter()
            .flat_map(|assembly| &assembly.classes)
            .map(|class| class.methods.len())
            .sum()
    }
}

fn collect_class<R: RuntimeApi + ?Sized>(runtime: &R, class: ClassHandle) -> Option<ClassEntry> {
    let name = runtime.class_name(class)?;
    let namespace = runtime.class_namespace(class).unwrap_or_default();
    let full_name = if namespace.is_empty() {
        name
    } else {
        format!("{}.{}", namespace, name)
    };

    let methods = runtime
        .class_methods(class)
        .into_iter()
        .map(|method| MethodEntry {
            method,
            name: runtime.method_name(method).unwrap_or_default(),
            pointer: method.pointer().unwrap_or(0),
            params: runtime.method_param_count(method),
            flags: MethodAttributes::from_bits_truncate(runtime.method_flags(method)),
        })
        .collect();

    Some(ClassEntry {
        class,
        full_name,
        methods,
    })
}

/// Why a method was classified as fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeReason {
    /// The entry point is shared by this many methods
    SharedPointer(usize),
    /// The method has no native body
    NullPointer,
    /// The native body is an empty stub
    StubBody,
}

impl fmt::Display for FakeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FakeReason::SharedPointer(count) => write!(f, "[SHARED x{}]", count),
            FakeReason::NullPointer => f.write_str("[NULL PTR]"),
            FakeReason::StubBody => f.write_str("[STUB]"),
        }
    }
}

/// A method classified as fake.
#[derive(Debug, Clone)]
pub struct FakeMethod {
    /// The method
    pub method: MethodHandle,
    /// Full name of the declaring class
    pub class_name: String,
    /// Method name
    pub method_name: String,
    /// Number of parameters
    pub params: u32,
    /// Native entry point, `0` if there is none
    pub pointer: u64,
    /// Classification reason
    pub reason: FakeReason,
}

/// Per-class outcome, kept for classes with at least one fake method.
#[derive(Debug, Clone)]
pub struct ClassVerdict {
    /// The class
    pub class: ClassHandle,
    /// `Namespace.Name`
    pub full_name: String,
    /// Number of declared methods
    pub total: usize,
    /// Number of fake methods
    pub fake: usize,
    /// Number of real methods
    pub real: usize,
    /// Whether the class as a whole is padding
    pub entirely_fake: bool,
}

/// Outcome of an analysis.
#[derive(Debug, Clone, Default)]
pub struct DetectionReport {
    /// Fake methods in discovery order
    pub fake_methods: Vec<FakeMethod>,
    /// Classes with at least one fake method
    pub classes: Vec<ClassVerdict>,
    /// Stub pointers and how many methods share them, most shared first
    pub stub_pointers: Vec<(u64, usize)>,
    /// Methods seen
    pub total_methods: usize,
    /// Methods in whitelisted assemblies
    pub whitelisted_methods: usize,
    /// Methods of generic classes excluded from pointer sharing
    pub generic_skipped: usize,
    /// Base of the runtime module, for RVAs in the written report
    pub module_base: Option<u64>,
    fake_method_set: HashSet<MethodHandle>,
    fake_class_set: HashSet<ClassHandle>,
}

impl DetectionReport {
    /// Returns `true` if `method` was classified as fake.
    #[must_use]
    pub fn is_fake_method(&self, method: MethodHandle) -> bool {
        self.fake_method_set.contains(&method)
    }

    /// Returns `true` if `class` is entirely fake.
    #[must_use]
    pub fn is_fake_class(&self, class: ClassHandle) -> bool {
        self.fake_class_set.contains(&class)
    }

    /// Number of entirely fake classes.
    #[must_use]
    pub fn fake_class_count(&self) -> usize {
        self.fake_class_set.len()
    }

    /// Writes a human readable report.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn write_to<W: Write>(&self, out: &mut W, config: &DetectorConfig) -> io::Result<()> {
        writeln!(out, "Fake method detection report")?;
        writeln!(out)?;
        writeln!(
            out,
            "pointer sharing threshold: {}",
            config.pointer_sharing_threshold
        )?;
        writeln!(out, "whitelisted assemblies:    {}*", config.whitelist_prefixes.join("*, "))?;
        writeln!(out, "methods analysed:          {}", self.total_methods)?;
        writeln!(out, "whitelisted methods:       {}", self.whitelisted_methods)?;
        writeln!(out, "generic methods skipped:   {}", self.generic_skipped)?;
        writeln!(out, "fake methods:              {}", self.fake_methods.len())?;
        writeln!(out, "fake classes:              {}", self.fake_class_count())?;
        writeln!(out, "stub pointers:             {}", self.stub_pointers.len())?;

        writeln!(out)?;
        writeln!(out, "== Stub pointers ==")?;
        for (pointer, count) in &self.stub_pointers {
            writeln!(
                out,
                "0x{:x} (rva 0x{:x}) shared by {} methods",
                pointer,
                self.rva(*pointer),
                count
            )?;
        }

        writeln!(out)?;
        writeln!(out, "== Entirely fake classes ==")?;
        for class in self.classes.iter().filter(|class| class.entirely_fake) {
            writeln!(
                out,
                "{} ({}/{} methods fake)",
                class.full_name, class.fake, class.total
            )?;
        }

        writeln!(out)?;
        writeln!(out, "== Fake methods ==")?;
        let mut by_class: BTreeMap<&str, Vec<&FakeMethod>> = BTreeMap::new();
        for fake in &self.fake_methods {
            by_class.entry(fake.class_name.as_str()).or_default().push(fake);
        }
        for (class_name, fakes) in by_class {
            let entirely_fake = self
                .classes
                .iter()
                .any(|class| class.full_name == class_name && class.entirely_fake);
            if entirely_fake {
                writeln!(out, "{} [entire class]", class_name)?;
            } else {
                writeln!(out, "{}", class_name)?;
            }

            for fake in fakes {
                write!(
                    out,
                    "  {} {}::{}/{}",
                    fake.reason, class_name, fake.method_name, fake.params
                )?;
                if fake.pointer != 0 {
                    write!(out, " rva 0x{:x}", self.rva(fake.pointer))?;
                }
                writeln!(out)?;
            }
        }

        writeln!(out)?;
        writeln!(out, "== Partially affected classes ==")?;
        for class in self.classes.iter().filter(|class| !class.entirely_fake) {
            writeln!(
                out,
                "{} ({} fake, {} real, {} total)",
                class.full_name, class.fake, class.real, class.total
            )?;
        }
        Ok(())
    }

    /// Writes the report to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be written.
    pub fn write_report(&self, path: &Path, config: &DetectorConfig) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = io::BufWriter::new(fs::File::create(path)?);
        self.write_to(&mut file, config)?;
        file.flush()?;
        Ok(())
    }

    fn rva(&self, pointer: u64) -> u64 {
        match self.module_base {
            Some(base) if pointer >= base => pointer - base,
            _ => pointer,
        }
    }
}

/// Classifies methods of loaded assemblies as real or fake.
#[derive(Debug, Clone, Default)]
pub struct ObfuscationDetector {
    config: DetectorConfig,
}

impl ObfuscationDetector {
    /// Creates a detector.
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        ObfuscationDetector { config }
    }

    /// The detector configuration.
    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Collects a census from `runtime` and classifies it.
    ///
    /// `image` is the runtime module; without it, stub bodies are not inspected.
    #[must_use]
    pub fn analyze<R: RuntimeApi + ?Sized>(
        &self,
        runtime: &R,
        image: Option<&ModuleImage>,
    ) -> DetectionReport {
        let census = Census::collect(runtime);
        self.classify(&census, image)
    }

    /// Classifies an existing census.
    #[must_use]
    pub fn classify(&self, census: &Census, image: Option<&ModuleImage>) -> DetectionReport {
        let mut report = DetectionReport {
            total_methods: census.method_count(),
            module_base: image.map(ModuleImage::base),
            ..DetectionReport::default()
        };

        let shared = self.count_pointers(census, &mut report);
        let mut stubs: Vec<(u64, usize)> = shared
            .iter()
            .filter(|(_, count)| **count >= self.config.pointer_sharing_threshold)
            .map(|(pointer, count)| (*pointer, *count))
            .collect();
        stubs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let stub_set: HashMap<u64, usize> = stubs.iter().copied().collect();
        report.stub_pointers = stubs;

        for assembly in census
            .assemblies
            .iter()
            .filter(|assembly| !self.is_whitelisted(&assembly.name))
        {
            for class in &assembly.classes {
                self.classify_class(class, &stub_set, image, &mut report);
            }
        }

        log::info!(
            "detector: {} of {} methods fake, {} fake classes, {} stub pointers",
            report.fake_methods.len(),
            report.total_methods,
            report.fake_class_count(),
            report.stub_pointers.len()
        );
        report
    }

    fn is_whitelisted(&self, assembly: &str) -> bool {
        self.config
            .whitelist_prefixes
            .iter()
            .any(|prefix| assembly.starts_with(prefix.as_str()))
    }

    fn count_pointers(&self, census: &Census, report: &mut DetectionReport) -> HashMap<u64, usize> {
        let mut shared: HashMap<u64, usize> = HashMap::new();
        for assembly in &census.assemblies {
            let whitelisted = self.is_whitelisted(&assembly.name);
            for class in &assembly.classes {
                let generic = self.config.skip_generic_classes && class.is_generic();
                for method in &class.methods {
                    if whitelisted {
                        report.whitelisted_methods += 1;
                    } else if generic {
                        report.generic_skipped += 1;
                    } else {
                        *shared.entry(method.pointer).or_default() += 1;
                    }
                }
            }
        }
        shared
    }

    fn classify_class(
        &self,
        class: &ClassEntry,
        stubs: &HashMap<u64, usize>,
        image: Option<&ModuleImage>,
        report: &mut DetectionReport,
    ) {
        let generic = self.config.skip_generic_classes && class.is_generic();
        let mut fake = 0_usize;

        for method in &class.methods {
            let reason = if generic {
                None
            } else {
                self.classify_method(method, stubs, image)
            };

            if let Some(reason) = reason {
                fake += 1;
                report.fake_method_set.insert(method.method);
                report.fake_methods.push(FakeMethod {
                    method: method.method,
                    class_name: class.full_name.clone(),
                    method_name: method.name.clone(),
                    params: method.params,
                    pointer: method.pointer,
                    reason,
                });
            }
        }

        let total = class.methods.len();
        let real = total - fake;
        let entirely_fake = (total > 0 && real == 0)
            || (fake >= self.config.min_fake_methods
                && fake as f64 >= self.config.fake_class_ratio * total as f64);

        if entirely_fake {
            report.fake_class_set.insert(class.class);
        }
        if fake > 0 {
            report.classes.push(ClassVerdict {
                class: class.class,
                full_name: class.full_name.clone(),
                total,
                fake,
                real,
                entirely_fake,
            });
        }
    }

    fn classify_method(
        &self,
        method: &MethodEntry,
        stubs: &HashMap<u64, usize>,
        image: Option<&ModuleImage>,
    ) -> Option<FakeReason> {
        if method
            .flags
            .intersects(MethodAttributes::VIRTUAL | MethodAttributes::ABSTRACT)
        {
            return None;
        }
        if matches!(method.name.as_str(), ".ctor" | ".cctor" | "Finalize") {
            return None;
        }
        if !is_obfuscated_name(&method.name) {
            return None;
        }

        if method.pointer == 0 {
            return Some(FakeReason::NullPointer);
        }
        if let Some(count) = stubs.get(&method.pointer) {
            return Some(FakeReason::SharedPointer(*count));
        }

        let image = image?;
        let available = (image.base() + image.size()).saturating_sub(method.pointer);
        let length = self.config.max_stub_size.min(available as usize);
        let body = image.read(method.pointer, length).ok()?;
        is_stub_body(body).then_some(FakeReason::StubBody)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{image::ModuleImageBuilder, test::FakeRuntime};

    #[test]
    fn obfuscated_names() {
        assert!(is_obfuscated_name("AJLPLCGICMF"));
        assert!(!is_obfuscated_name("AJLPLCGICM"));
        assert!(!is_obfuscated_name("AJLPLCGICMFX"));
        assert!(!is_obfuscated_name("AJLPLCGiCMF"));
        assert!(!is_obfuscated_name("get_Position"));
    }

    #[test]
    fn stub_bodies() {
        assert!(is_stub_body(&[0xC3, 0x90]));
        assert!(is_stub_body(&[0x33, 0xC0, 0xC3]));
        assert!(is_stub_body(&[0xB8, 0x01, 0x00, 0x00, 0x00, 0xC3]));
        assert!(is_stub_body(&[
            0x48, 0x83, 0xEC, 0x28, 0x48, 0x83, 0xC4, 0x28, 0xC3
        ]));
        assert!(!is_stub_body(&[
            0x48, 0x83, 0xEC, 0x28, 0x48, 0x83, 0xC4, 0x20, 0xC3
        ]));
        assert!(!is_stub_body(&[0x48, 0x8B, 0x05, 0x00]));
        assert!(!is_stub_body(&[]));
    }

    fn padded_runtime() -> (FakeRuntime, ClassHandle, ClassHandle) {
        let runtime = FakeRuntime::new();
        let game = runtime.add_assembly("Assembly-CSharp.dll");

        // Ten obfuscated methods sharing one stub make the pointer a stub
        let padding = runtime.add_class(game, "", "PLMKNHGOJCA");
        for index in 0..10 {
            let name = format!("ABCDEFGHIJ{}", (b'A' + index) as char);
            runtime.add_method(padding, &name, 0, 0x7000);
        }

        let player = runtime.add_class(game, "Game", "Player");
        runtime.add_method(player, ".ctor", 0, 0x1000);
        runtime.add_method(player, "Update", 0, 0x1010);
        runtime.add_method(player, "KLFGNILMCJN", 0, 0x7000);
        runtime.add_method(player, "FPGHODFCFKC", 1, 0);
        runtime.add_method(player, "get_Position", 0, 0x7000);
        let virtual_stub = runtime.add_method(player, "QWERTYUIOPA", 0, 0x7000);
        runtime.set_method_flags(virtual_stub, MethodAttributes::VIRTUAL.bits());

        // Framework code folding many methods together is not a signal
        let engine = runtime.add_assembly("UnityEngine.CoreModule.dll");
        let vector = runtime.add_class(engine, "UnityEngine", "Vector3");
        for index in 0..12 {
            let name = format!("ZZZZZZZZZZ{}", (b'A' + index) as char);
            runtime.add_method(vector, &name, 0, 0x8000);
        }

        (runtime, padding, player)
    }

    #[test]
    fn classification() {
        let (runtime, padding, player) = padded_runtime();
        let report = ObfuscationDetector::default().analyze(&runtime, None);

        assert_eq!(report.total_methods, 28);
        assert_eq!(report.whitelisted_methods, 12);
        assert_eq!(report.stub_pointers, vec![(0x7000, 13)]);

        assert!(report.is_fake_class(padding));
        assert!(!report.is_fake_class(player));
        assert_eq!(report.fake_class_count(), 1);

        let player_fakes: Vec<(&str, FakeReason)> = report
            .fake_methods
            .iter()
            .filter(|fake| fake.class_name == "Game.Player")
            .map(|fake| (fake.method_name.as_str(), fake.reason))
            .collect();
        assert_eq!(
            player_fakes,
            vec![
                ("KLFGNILMCJN", FakeReason::SharedPointer(13)),
                ("FPGHODFCFKC", FakeReason::NullPointer),
            ]
        );

        let verdict = report
            .classes
            .iter()
            .find(|class| class.class == player)
            .unwrap();
        assert_eq!((verdict.total, verdict.fake, verdict.real), (6, 2, 4));
    }

    #[test]
    fn generic_classes_are_skipped() {
        let runtime = FakeRuntime::new();
        let game = runtime.add_assembly("Assembly-CSharp.dll");
        let list = runtime.add_class(game, "Game", "Pool`1");
        for index in 0..10 {
            let name = format!("ABCDEFGHIJ{}", (b'A' + index) as char);
            runtime.add_method(list, &name, 0, 0);
        }

        let report = ObfuscationDetector::default().analyze(&runtime, None);
        assert_eq!(report.generic_skipped, 10);
        assert!(report.fake_methods.is_empty());
        assert!(report.stub_pointers.is_empty());
    }

    #[test]
    fn stub_bodies_confirm_unique_pointers() {
        let mut text = vec![0x90_u8; 0x40];
        text[0x10] = 0xC3;
        text[0x20..0x23].copy_from_slice(&[0x48, 0x8B, 0xC1]);
        let image = ModuleImageBuilder::new()
            .image_base(0x1_8000_0000)
            .text(text)
            .load()
            .unwrap();
        let text_start = image.text().start;

        let runtime = FakeRuntime::new();
        let game = runtime.add_assembly("Assembly-CSharp.dll");
        let class = runtime.add_class(game, "Game", "Enemy");
        let stub = runtime.add_method(class, "HGFEDCBAKJI", 0, text_start + 0x10);
        let body = runtime.add_method(class, "IJKLMNOPQRS", 0, text_start + 0x20);

        let detector = ObfuscationDetector::default();
        let with_image = detector.analyze(&runtime, Some(&image));
        assert!(with_image.is_fake_method(stub));
        assert!(!with_image.is_fake_method(body));
        assert_eq!(with_image.fake_methods[0].reason, FakeReason::StubBody);

        let without_image = detector.analyze(&runtime, None);
        assert!(without_image.fake_methods.is_empty());
    }

    #[test]
    fn report_text() {
        let (runtime, _, _) = padded_runtime();
        let config = DetectorConfig::default();
        let report = ObfuscationDetector::new(config.clone()).analyze(&runtime, None);

        let mut out = Vec::new();
        report.write_to(&mut out, &config).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("0x7000 (rva 0x7000) shared by 13 methods"));
        assert!(text.contains("PLMKNHGOJCA (10/10 methods fake)"));
        assert!(text.contains("  [NULL PTR] Game.Player::FPGHODFCFKC/1"));
        assert!(text.contains("Game.Player (2 fake, 4 real, 6 total)"));
    }

    #[test]
    fn report_file() {
        let (runtime, _, _) = padded_runtime();
        let config = DetectorConfig::default();
        let report = ObfuscationDetector::new(config.clone()).analyze(&runtime, None);

        let dir = std::env::temp_dir().join(format!("il2scope-detect-{}", std::process::id()));
        let path = dir.join("reports").join("fakes.txt");
        report.write_report(&path, &config).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("== Fake methods =="));
        fs::remove_dir_all(&dir).unwrap();
    }
}
