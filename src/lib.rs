//! # Solidity-Sentinel Library
//!
//! @title Solidity-Sentinel - Rule-Based Smart Contract Analyzer
//! @author Ramprasad
//!
//! A static analysis library that mechanizes the manual checks of a smart
//! contract audit checklist. It consumes the syntax trees produced by an
//! external front-end, extracts typed facts, evaluates rules against them
//! and reports deduplicated, suppressible findings.
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions and argument parsing
//! - [`parser`] - Front-end document loading and lowering
//! - [`analysis`] - Contract model, control flow and fact extraction
//! - [`detectors`] - Rule registry, built-in detectors and rule catalogs
//! - [`engine`] - Rule scheduling, budgets and deduplication
//! - [`suppression`] - Inline annotations, suppression files and baselines
//! - [`report`] - Report generation in multiple formats
//!
//! ## Example
//!
//! ```rust,ignore
//! use solidity_sentinel::{AnalysisEngine, CancellationToken, EngineConfig, RuleRegistry};
//! use solidity_sentinel::parser::parse_contract_file;
//!
//! let files = vec![parse_contract_file(Path::new("Vault.json"))?];
//! let engine = AnalysisEngine::new(RuleRegistry::standard()?, EngineConfig::default());
//! let outcome = engine.analyze(&files, &CancellationToken::new(), |_| {});
//! ```

pub mod analysis;
pub mod cli;
pub mod detectors;
pub mod engine;
pub mod parser;
pub mod report;
pub mod suppression;

pub use cli::Cli;
pub use detectors::RuleRegistry;
pub use engine::{AnalysisEngine, AnalysisOutcome, CancellationToken, EngineConfig};
pub use report::{Finding, Report, Severity};
pub use suppression::SuppressionSet;
