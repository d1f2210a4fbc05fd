use std::path::Path;

use anyhow::{bail, Context};
use il2scope::{
    api::RuntimeSymbol,
    config::ResolverConfig,
    prelude::IntoEnumIterator,
    resolver::{Outcome, SignatureCatalog, SymbolResolver},
};
use serde::Serialize;

use crate::{
    app::{GlobalOptions, ModuleArgs},
    commands::common::load_module,
    output::{address, emit, Column, Listing},
};

pub struct ResolveOptions<'a> {
    pub symbol: Option<&'a str>,
    pub max_depth: u32,
    pub attempts: bool,
    pub log: Option<&'a Path>,
}

#[derive(Debug, Serialize)]
struct SymbolEntry {
    symbol: String,
    required: bool,
    address: Option<String>,
    rva: Option<String>,
    strategy: Option<String>,
    matched: Option<String>,
    depth: u32,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct AttemptEntry {
    symbol: String,
    strategy: String,
    result: String,
}

#[derive(Debug, Serialize)]
struct ResolveOutput {
    resolved: usize,
    missing_required: Vec<String>,
    symbols: Vec<SymbolEntry>,
    attempts: Vec<AttemptEntry>,
}

pub fn run(
    module: &ModuleArgs,
    options: &ResolveOptions<'_>,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let image = load_module(module)?;
    let catalog = SignatureCatalog::builtin().context("failed to build signature catalog")?;
    let config = ResolverConfig {
        max_thunk_depth: options.max_depth,
        ..ResolverConfig::default()
    };
    let resolver = SymbolResolver::new(image.clone(), catalog, config);

    let symbols: Vec<(String, bool)> = match options.symbol {
        Some(name) => match RuntimeSymbol::from_name(name) {
            Some(symbol) => vec![(symbol.name().to_string(), symbol.is_required())],
            None if name.is_empty() => bail!("empty symbol name"),
            None => vec![(name.to_string(), false)],
        },
        None => RuntimeSymbol::iter()
            .map(|symbol| (symbol.name().to_string(), symbol.is_required()))
            .collect(),
    };

    let entries: Vec<SymbolEntry> = symbols
        .into_iter()
        .map(|(name, required)| match resolver.resolve_name(&name) {
            Ok(found) => SymbolEntry {
                symbol: name,
                required,
                address: Some(address(found.address)),
                rva: image.rva_of(found.address).ok().map(address),
                strategy: Some(found.strategy.to_string()),
                matched: Some(found.matched),
                depth: found.depth,
                error: None,
            },
            Err(error) => SymbolEntry {
                symbol: name,
                required,
                address: None,
                rva: None,
                strategy: None,
                matched: None,
                depth: 0,
                error: Some(error.to_string()),
            },
        })
        .collect();

    let report = resolver.into_report();
    if let Some(path) = options.log {
        report
            .write_log(path)
            .with_context(|| format!("failed to write log: {}", path.display()))?;
        log::info!("resolution log written to {}", path.display());
    }

    let attempts = if options.attempts {
        report
            .attempts()
            .map(|attempt| AttemptEntry {
                symbol: attempt.symbol.clone(),
                strategy: attempt.strategy.to_string(),
                result: match &attempt.outcome {
                    Outcome::Resolved {
                        name,
                        address: target,
                        depth,
                    } => format!("{name} @ {} ({depth} hops)", address(*target)),
                    Outcome::Failed(reason) => format!("failed: {reason}"),
                },
            })
            .collect()
    } else {
        Vec::new()
    };

    let output = ResolveOutput {
        resolved: entries.iter().filter(|entry| entry.address.is_some()).count(),
        missing_required: entries
            .iter()
            .filter(|entry| entry.required && entry.address.is_none())
            .map(|entry| entry.symbol.clone())
            .collect(),
        symbols: entries,
        attempts,
    };

    emit(&output, opts, |out| {
        let mut symbols = Listing::new(
            "Symbols",
            &[
                Column::Name("Symbol"),
                Column::Address("Address"),
                Column::Address("RVA"),
                Column::Note("Strategy"),
                Column::Note("Matched"),
            ],
        );
        for entry in &out.symbols {
            match &entry.error {
                None => symbols.row([
                    entry.symbol.clone(),
                    entry.address.clone().unwrap_or_default(),
                    entry.rva.clone().unwrap_or_default(),
                    entry.strategy.clone().unwrap_or_default(),
                    entry.matched.clone().unwrap_or_default(),
                ]),
                Some(error) => symbols.row([
                    entry.symbol.clone(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    error.clone(),
                ]),
            }
        }
        symbols.print_or("No symbols requested.");

        if !out.attempts.is_empty() {
            println!();
            let mut attempts = Listing::new(
                "Attempts",
                &[
                    Column::Name("Symbol"),
                    Column::Note("Strategy"),
                    Column::Note("Result"),
                ],
            );
            for attempt in &out.attempts {
                attempts.row(
                    [&attempt.symbol, &attempt.strategy, &attempt.result].map(String::clone),
                );
            }
            attempts.print_or("");
        }

        println!("\n{} of {} symbols resolved", out.resolved, out.symbols.len());
        if !out.missing_required.is_empty() {
            println!(
                "Missing required symbols, bring-up would fail: {}",
                out.missing_required.join(", ")
            );
        }
    })
}
