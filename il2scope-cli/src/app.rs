use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// il2scope - inspection and symbol resolution for IL2CPP-style runtime modules
#[derive(Debug, Parser)]
#[command(name = "il2scope", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// How to read the module.
#[derive(Debug, Args)]
pub struct ModuleArgs {
    /// Path to the module file, or to a memory dump with --dump-base.
    #[arg(value_name = "FILE")]
    pub path: PathBuf,

    /// Treat FILE as a memory dump loaded at this base address (hex like 0x180000000).
    #[arg(long, value_name = "ADDRESS")]
    pub dump_base: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Display module overview: base, size, layout, sections.
    Info {
        #[command(flatten)]
        module: ModuleArgs,
    },

    /// List named exports.
    Exports {
        #[command(flatten)]
        module: ModuleArgs,

        /// Show only exports whose name contains this text.
        #[arg(long)]
        filter: Option<String>,
    },

    /// Resolve runtime symbols through the fallback chain.
    Resolve {
        #[command(flatten)]
        module: ModuleArgs,

        /// Resolve only this symbol (canonical name like il2cpp_domain_get).
        #[arg(long, value_name = "NAME")]
        symbol: Option<String>,

        /// Maximum number of thunks followed from one address.
        #[arg(long, default_value_t = 10)]
        max_depth: u32,

        /// Show every strategy attempt, not just the outcome.
        #[arg(long)]
        attempts: bool,

        /// Write the resolved-export log to this file.
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,
    },

    /// Search for a byte pattern (IDA style, e.g. "48 8B 05 ?? ?? ?? ?? C3").
    Scan {
        #[command(flatten)]
        module: ModuleArgs,

        /// The pattern to search for.
        #[arg(value_name = "PATTERN")]
        pattern: String,

        /// Search all sections instead of only the executable one.
        #[arg(long)]
        all_sections: bool,
    },
}
