//! Per-symbol resolution diagnostics.
//!
//! Every strategy attempt made by the resolver is appended to a [`ResolutionReport`]. The report
//! is append-only and safe to write from the parallel API table bring-up. Successful entries can
//! be rendered as the resolved-export log:
//!
//! ```text
//! // Export Resolution Log
//! // Format: original_name -> resolved_name @ address [resolution_method]
//! il2cpp_domain_get_assemblies -> il2cpp_wasting_your_life @ 0x180001000 [SuffixMatch]
//! ```

use std::{fmt::Write as _, fs, path::Path};

use crate::{resolver::Strategy, Result};

/// Result of one strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The strategy produced an address.
    Resolved {
        /// Name of the export (or pattern) that matched
        name: String,
        /// Final absolute address
        address: u64,
        /// Thunk hops consumed
        depth: u32,
    },
    /// The strategy did not produce an address.
    Failed(String),
}

/// One recorded strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Canonical symbol name
    pub symbol: String,
    /// Strategy that was tried
    pub strategy: Strategy,
    /// What happened
    pub outcome: Outcome,
}

/// Append-only log of resolution attempts.
#[derive(Debug, Default)]
pub struct ResolutionReport {
    attempts: boxcar::Vec<Attempt>,
}

impl ResolutionReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attempt.
    pub fn record(&self, symbol: &str, strategy: Strategy, outcome: Outcome) {
        self.attempts.push(Attempt {
            symbol: symbol.to_string(),
            strategy,
            outcome,
        });
    }

    /// All attempts in recording order.
    pub fn attempts(&self) -> impl Iterator<Item = &Attempt> {
        self.attempts.iter().map(|(_, attempt)| attempt)
    }

    /// Number of recorded attempts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attempts.count()
    }

    /// Returns `true` if nothing was recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successful attempts in recording order.
    pub fn resolved(&self) -> impl Iterator<Item = &Attempt> {
        self.attempts()
            .filter(|attempt| matches!(attempt.outcome, Outcome::Resolved { .. }))
    }

    /// Strategy that last resolved `symbol`.
    #[must_use]
    pub fn strategy_for(&self, symbol: &str) -> Option<Strategy> {
        self.resolved()
            .filter(|attempt| attempt.symbol == symbol)
            .last()
            .map(|attempt| attempt.strategy)
    }

    /// Renders the resolved-export log.
    #[must_use]
    pub fn export_log(&self) -> String {
        let mut log = String::from(
            "// Export Resolution Log\n// Format: original_name -> resolved_name @ address [resolution_method]\n",
        );

        for attempt in self.resolved() {
            if let Outcome::Resolved { name, address, .. } = &attempt.outcome {
                let _ = writeln!(
                    log,
                    "{} -> {} @ 0x{:X} [{}]",
                    attempt.symbol, name, address, attempt.strategy
                );
            }
        }

        log
    }

    /// Writes the resolved-export log to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be written.
    pub fn write_log(&self, path: &Path) -> Result<()> {
        fs::write(path, self.export_log())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_renders() {
        let report = ResolutionReport::new();
        report.record(
            "il2cpp_domain_get_assemblies",
            Strategy::Direct,
            Outcome::Failed("no export".to_string()),
        );
        report.record(
            "il2cpp_domain_get_assemblies",
            Strategy::SuffixMatch,
            Outcome::Resolved {
                name: "il2cpp_domain_get_assemblies_go_outside".to_string(),
                address: 0x1_8000_1000,
                depth: 0,
            },
        );

        assert_eq!(report.len(), 2);
        assert_eq!(
            report.strategy_for("il2cpp_domain_get_assemblies"),
            Some(Strategy::SuffixMatch)
        );
        assert_eq!(report.strategy_for("il2cpp_domain_get"), None);

        let log = report.export_log();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines[0], "// Export Resolution Log");
        assert_eq!(
            lines[2],
            "il2cpp_domain_get_assemblies -> il2cpp_domain_get_assemblies_go_outside @ 0x180001000 [SuffixMatch]"
        );
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn writes_log_file() {
        let report = ResolutionReport::new();
        report.record(
            "il2cpp_domain_get",
            Strategy::Direct,
            Outcome::Resolved {
                name: "il2cpp_domain_get".to_string(),
                address: 0x10,
                depth: 0,
            },
        );

        let path = std::env::temp_dir().join("il2scope_export_log.txt");
        report.write_log(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.ends_with("il2cpp_domain_get -> il2cpp_domain_get @ 0x10 [Direct]\n"));
        let _ = std::fs::remove_file(&path);
    }
}
