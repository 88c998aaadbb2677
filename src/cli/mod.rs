//! # CLI Module
//!
//! @title Command Line Interface
//! @author Ramprasad
//!
//! This module defines the command-line interface for Solidity-Sentinel using
//! the `clap` derive macros for declarative argument parsing.
//!
//! ## Commands
//!
//! - `analyze` - Analyze front-end contract documents for vulnerabilities
//! - `baseline` - Record the fingerprints of current findings
//! - `list` - Display available rules
//! - `version` - Show version information

use crate::report::{OutputFormat, Severity};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Solidity-Sentinel command-line interface.
///
/// A rule-based static analyzer for smart contracts. Reads the JSON syntax
/// trees emitted by a front-end and reports checklist violations.
#[derive(Parser, Debug)]
#[command(name = "solidity-sentinel")]
#[command(author = "Ramprasad")]
#[command(version)]
#[command(about = "Rule-based static analysis for Solidity and Vyper smart contracts")]
#[command(long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the Solidity-Sentinel CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze contracts for security vulnerabilities.
    ///
    /// Exits with 0 when no reported finding reaches the severity floor,
    /// 1 when one does, and 2 on configuration errors.
    Analyze(AnalyzeArgs),

    /// Write the fingerprints of all current findings to a baseline file.
    ///
    /// Findings recorded in a baseline are suppressed by
    /// `analyze --baseline <file>`.
    Baseline {
        /// Front-end JSON documents or directories containing them.
        #[arg(value_name = "PATHS", required = true)]
        paths: Vec<PathBuf>,

        /// Baseline file to write.
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        selection: RuleSelection,
    },

    /// List all available rules.
    ///
    /// Displays the ID, title, severity and scope of each built-in and
    /// catalog rule.
    List {
        /// Additional rule catalog to include.
        #[arg(long, value_name = "FILE")]
        rules: Option<PathBuf>,
    },

    /// Print version information.
    Version,
}

/// Options of the `analyze` command.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Front-end JSON documents or directories containing them.
    ///
    /// Directories are searched recursively for `.json` files.
    #[arg(value_name = "PATHS", required = true)]
    pub paths: Vec<PathBuf>,

    /// Output format for the security report.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Minimum severity level to report and to fail on.
    ///
    /// Valid values: critical, high, medium, low, info
    #[arg(short, long, default_value = "low")]
    pub severity: Severity,

    #[command(flatten)]
    pub selection: RuleSelection,

    /// Suppression file (JSON).
    #[arg(long, value_name = "FILE")]
    pub suppressions: Option<PathBuf>,

    /// Baseline file whose findings are suppressed.
    #[arg(long, value_name = "FILE")]
    pub baseline: Option<PathBuf>,

    /// Write the report to a file instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Time budget per contract, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Worker threads (0 = one per core).
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Include suppressed findings in the report.
    #[arg(short, long)]
    pub verbose: bool,

    /// Date used to decide whether suppressions have expired (YYYY-MM-DD).
    ///
    /// Defaults to today.
    #[arg(long, value_name = "DATE")]
    pub as_of: Option<NaiveDate>,

    /// Do not show progress bars.
    #[arg(long)]
    pub no_progress: bool,
}

/// Rule selection shared by commands that run the analysis.
#[derive(Args, Debug, Default)]
pub struct RuleSelection {
    /// Additional rule catalog (JSON) appended to the built-in rules.
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Exclude specific rules from the run.
    ///
    /// Comma-separated list of rule IDs to skip.
    /// Example: --exclude unbounded-loop,tx-origin-use
    #[arg(short = 'x', long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Run only specific rules.
    ///
    /// Comma-separated list of rule IDs to run.
    /// Example: --only reentrancy-external-call
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Verify that the CLI definition is valid.
    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_defaults() {
        let cli = Cli::parse_from(["solidity-sentinel", "analyze", "contracts"]);
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };

        assert_eq!(args.format, OutputFormat::Text);
        assert_eq!(args.severity, Severity::Low);
        assert_eq!(args.threads, 0);
        assert!(args.as_of.is_none());
    }

    #[test]
    fn test_analyze_flags() {
        let cli = Cli::parse_from([
            "solidity-sentinel",
            "analyze",
            "a.json",
            "--format",
            "github",
            "--severity",
            "high",
            "--only",
            "tx-origin-auth,unbounded-loop",
            "--as-of",
            "2024-05-01",
        ]);
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };

        assert_eq!(args.format, OutputFormat::Github);
        assert_eq!(args.severity, Severity::High);
        assert_eq!(args.selection.only.len(), 2);
        assert_eq!(args.as_of, NaiveDate::from_ymd_opt(2024, 5, 1));
    }
}
