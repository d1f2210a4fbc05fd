//! Symbol resolution and bring-up against synthetic modules shaped like protected builds.

use std::sync::Arc;

use il2scope::{image::ModuleImageBuilder, prelude::*};

/// Spacing between function bodies in the synthetic `.text`
const SLOT: usize = 0x10;

/// Every runtime symbol exported, with two protector tricks applied:
///
/// - `il2cpp_domain_get` points at an `E9` thunk in front of its body
/// - `il2cpp_domain_get_assemblies` is renamed to `il2cpp_wasting_your_life`
fn protected_builder(skip: Option<RuntimeSymbol>) -> ModuleImageBuilder {
    let symbols: Vec<RuntimeSymbol> = RuntimeSymbol::iter().collect();
    let thunk = symbols.len() * SLOT;
    let mut code = vec![0xCC; thunk + SLOT];

    let mut builder = ModuleImageBuilder::new();
    for (index, symbol) in symbols.iter().enumerate() {
        let body = index * SLOT;
        code[body] = 0xC3;

        if Some(*symbol) == skip {
            continue;
        }

        builder = match symbol {
            RuntimeSymbol::DomainGet => {
                let rel = body as i64 - (thunk as i64 + 5);
                code[thunk] = 0xE9;
                code[thunk + 1..thunk + 5].copy_from_slice(&(rel as i32).to_le_bytes());
                builder.export(symbol.name(), ".text", thunk as u32)
            }
            RuntimeSymbol::DomainGetAssemblies => {
                builder.export("il2cpp_wasting_your_life", ".text", body as u32)
            }
            _ => builder.export(symbol.name(), ".text", body as u32),
        };
    }

    builder.text(code).rdata(b"mscorlib\0".to_vec())
}

/// Routes resolver logging to the test output; `RUST_LOG=il2scope=debug` shows every attempt.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn resolver_for(image: Arc<ModuleImage>) -> SymbolResolver {
    init_logging();
    SymbolResolver::new(
        image,
        SignatureCatalog::builtin().unwrap(),
        ResolverConfig::default(),
    )
}

#[test]
fn protected_module_binds_completely() {
    let image = Arc::new(protected_builder(None).load().unwrap());
    let resolver = resolver_for(image.clone());

    let table = unsafe { ApiTable::bind(&resolver) };
    assert!(table.is_valid());
    assert!(table.missing().is_empty());
    assert_eq!(table.bound_count(), RuntimeSymbol::iter().count());

    let report = resolver.report();
    assert_eq!(
        report.strategy_for("il2cpp_domain_get_assemblies"),
        Some(Strategy::SuffixMatch)
    );
    assert_eq!(
        report.strategy_for("il2cpp_domain_get"),
        Some(Strategy::ThunkFollowed)
    );
    assert_eq!(
        report.strategy_for("il2cpp_class_from_name"),
        Some(Strategy::Direct)
    );

    let log = report.export_log();
    assert!(log.starts_with("// Export Resolution Log\n"));
    assert!(log.contains(
        "il2cpp_domain_get_assemblies -> il2cpp_wasting_your_life @ 0x"
    ));
}

#[test]
fn renamed_export_found_by_suffix_alone() {
    let image = Arc::new(
        ModuleImageBuilder::new()
            .text(vec![0xC3; 0x20])
            .export("il2cpp_wasting_your_life", ".text", 0x10)
            .load()
            .unwrap(),
    );
    let resolver = resolver_for(image.clone());

    let found = resolver.resolve_name("il2cpp_domain_get_assemblies").unwrap();
    assert_eq!(found.strategy, Strategy::SuffixMatch);
    assert_eq!(found.matched, "il2cpp_wasting_your_life");
    assert_eq!(found.address, image.text().start + 0x10);
    assert!(image.contains(found.address));
}

#[test]
fn exports_outside_the_module_never_resolve() {
    let image = Arc::new(
        ModuleImageBuilder::new()
            .text(vec![0xC3; 0x20])
            .export("il2cpp_domain_get", ".text", 0x40_0000)
            .load()
            .unwrap(),
    );
    let resolver = resolver_for(image.clone());

    // The pattern fallback finds nothing in a .text of bare returns
    match resolver.resolve_name("il2cpp_domain_get") {
        Err(Error::Resolution { reason, .. }) => {
            assert!(reason.contains("outside of the module"), "{}", reason);
        }
        other => panic!("expected a resolution error, got {:?}", other),
    }
}

#[test]
fn thunk_target_is_the_body() {
    let image = Arc::new(protected_builder(None).load().unwrap());
    let resolver = resolver_for(image.clone());

    let found = resolver.resolve_name("il2cpp_domain_get").unwrap();
    assert_eq!(found.strategy, Strategy::ThunkFollowed);
    assert_eq!(found.depth, 1);
    assert_eq!(found.matched, "il2cpp_domain_get");
    assert_eq!(found.address, image.text().start);
}

#[test]
fn attach_keeps_report_and_module() {
    init_logging();
    let image = Arc::new(protected_builder(None).load().unwrap());

    let bridge = unsafe { Bridge::attach(image.clone(), BridgeConfig::default()) }.unwrap();

    let report = bridge.report().unwrap();
    assert_eq!(
        report.strategy_for("il2cpp_domain_get_assemblies"),
        Some(Strategy::SuffixMatch)
    );
    assert_eq!(
        bridge.method_pointer_from_rva(0x1000),
        Some(image.base() + 0x1000)
    );
    assert_eq!(bridge.method_pointer_from_rva(image.size()), None);
    assert_eq!(last_error().code, ErrorCode::InvalidArgument);
}

#[test]
fn attach_names_missing_required_symbols() {
    init_logging();
    let image = Arc::new(
        protected_builder(Some(RuntimeSymbol::ClassFromName))
            .load()
            .unwrap(),
    );

    match unsafe { Bridge::attach(image, BridgeConfig::default()) } {
        Err(Error::ApiTableIncomplete { missing }) => {
            assert_eq!(missing, vec!["il2cpp_class_from_name".to_string()]);
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("attach succeeded without il2cpp_class_from_name"),
    }
    assert_eq!(last_error().code, ErrorCode::InitFailed);
}

#[test]
fn optional_symbols_may_be_missing() {
    let image = Arc::new(
        protected_builder(Some(RuntimeSymbol::ThreadDetach))
            .load()
            .unwrap(),
    );
    let resolver = resolver_for(image);

    let table = unsafe { ApiTable::bind(&resolver) };
    assert!(table.is_valid());
    assert_eq!(table.bound_count(), RuntimeSymbol::iter().count() - 1);
}

#[test]
fn stripped_export_found_by_pattern() {
    let mut code = vec![0xCC; 0x40];
    code[0x20..0x28].copy_from_slice(&[0x48, 0x8B, 0x05, 0x11, 0x22, 0x33, 0x44, 0xC3]);
    let image = Arc::new(ModuleImageBuilder::new().text(code).load().unwrap());
    let resolver = resolver_for(image.clone());

    let found = resolver.resolve_name("il2cpp_domain_get").unwrap();
    assert_eq!(found.strategy, Strategy::PatternScan);
    assert_eq!(found.address, image.text().start + 0x20);

    let attempts: Vec<Strategy> = resolver
        .report()
        .attempts()
        .map(|attempt| attempt.strategy)
        .collect();
    assert_eq!(
        attempts,
        vec![
            Strategy::Direct,
            Strategy::SuffixMatch,
            Strategy::PatternScan
        ]
    );
}

#[test]
fn cyclic_thunk_is_a_resolution_error() {
    // jmp $
    let mut code = vec![0xCC; 0x20];
    code[..5].copy_from_slice(&[0xE9, 0xFB, 0xFF, 0xFF, 0xFF]);
    let image = Arc::new(
        ModuleImageBuilder::new()
            .text(code)
            .export("il2cpp_domain_get", ".text", 0)
            .load()
            .unwrap(),
    );
    let resolver = resolver_for(image);

    match resolver.resolve_name("il2cpp_domain_get") {
        Err(Error::Resolution { symbol, reason }) => {
            assert_eq!(symbol, "il2cpp_domain_get");
            assert!(reason.contains("exceeds 10 hops"), "{}", reason);
        }
        other => panic!("expected a resolution error, got {:?}", other),
    }
}

#[test]
fn file_layout_matches_mapped_layout() {
    let bytes = protected_builder(None).build().unwrap();
    let path = std::env::temp_dir().join(format!("il2scope-{}.dll", std::process::id()));
    std::fs::write(&path, &bytes).unwrap();

    let from_file = ModuleImage::from_file(&path).unwrap();
    let mapped = protected_builder(None).load().unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(from_file.layout(), ImageLayout::File);
    assert_eq!(from_file.exports(), mapped.exports());
    assert_eq!(
        from_file.read(from_file.text().start, 0x20).unwrap(),
        mapped.read(mapped.text().start, 0x20).unwrap()
    );
}
