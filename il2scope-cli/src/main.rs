mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // Show il2scope info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("il2scope", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Info { module } => commands::info::run(module, &cli.global),
        Command::Exports { module, filter } => {
            commands::exports::run(module, filter.as_deref(), &cli.global)
        }
        Command::Resolve {
            module,
            symbol,
            max_depth,
            attempts,
            log,
        } => commands::resolve::run(
            module,
            &commands::resolve::ResolveOptions {
                symbol: symbol.as_deref(),
                max_depth: *max_depth,
                attempts: *attempts,
                log: log.as_deref(),
            },
            &cli.global,
        ),
        Command::Scan {
            module,
            pattern,
            all_sections,
        } => commands::scan::run(module, pattern, *all_sections, &cli.global),
    }
}
