//! # Report Generation Module
//!
//! @title Security Report Generator
//! @author Ramprasad
//!
//! Builds the final report from engine findings and renders it as plain
//! text, JSON, Markdown or GitHub Actions annotations.
//!
//! Rendered output is byte-stable for identical input: it carries no
//! timestamps and findings are always sorted the same way. Colors are only
//! used for the terminal summary, never inside a rendered report.
//!
//! ## Key Types
//!
//! - [`Report`] - Filtered, sorted findings plus run metadata
//! - [`Finding`] - One rule match or analyzer diagnostic
//! - [`Severity`] - Ordered impact classification

mod finding;
mod formatter;

pub use finding::{
    diagnostics, fingerprint, occurrence_fingerprint, Confidence, Finding, Severity,
};
pub use formatter::{render, OutputFormat};

use crate::suppression::SuppressedFinding;
use colored::*;
use serde::Serialize;

/// Complete security analysis report.
///
/// Contains metadata about the run, the reported findings, and summary statistics.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Metadata about the scan operation.
    pub metadata: ReportMetadata,

    /// Summary statistics by severity.
    pub summary: ReportSummary,

    /// Reported findings, sorted by severity then position.
    pub findings: Vec<Finding>,

    /// Findings hidden by suppressions; only filled in verbose mode.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suppressed: Vec<SuppressedFinding>,
}

/// Metadata about the scan operation.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub tool: String,

    /// Tool version used for the scan.
    pub version: String,

    /// Input documents, as given on the command line or found in directories.
    pub inputs: Vec<String>,

    /// Number of contracts analyzed.
    pub contracts: usize,

    /// Lowest severity included in the report.
    pub min_severity: Severity,
}

/// Reported findings counted per severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
    pub total: usize,

    /// Findings hidden by suppressions, whether or not they are listed.
    pub suppressed: usize,
}

impl Report {
    /// Creates a report from post-suppression findings.
    ///
    /// Findings below `min_severity` are dropped, except analyzer diagnostics
    /// which are always kept. Suppressed findings are listed only when
    /// `verbose` is set.
    pub fn new(
        findings: Vec<Finding>,
        suppressed: Vec<SuppressedFinding>,
        inputs: Vec<String>,
        contracts: usize,
        min_severity: Severity,
        verbose: bool,
    ) -> Self {
        let mut findings: Vec<Finding> = findings
            .into_iter()
            .filter(|f| f.severity >= min_severity || f.is_diagnostic())
            .collect();
        findings.sort_by(Finding::report_order);

        let mut summary = ReportSummary::from_findings(&findings);
        summary.suppressed = suppressed.len();

        let mut suppressed = if verbose { suppressed } else { Vec::new() };
        suppressed.sort_by(|a, b| a.finding.report_order(&b.finding));

        let metadata = ReportMetadata {
            tool: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            inputs,
            contracts,
            min_severity,
        };

        Self {
            metadata,
            summary,
            findings,
            suppressed,
        }
    }

    /// Returns true when a reported rule finding is at or above `floor`.
    /// Analyzer diagnostics never count.
    pub fn has_findings_at_or_above(&self, floor: Severity) -> bool {
        self.findings
            .iter()
            .any(|f| !f.is_diagnostic() && f.severity >= floor)
    }

    /// Prints summary statistics to the terminal.
    pub fn print_summary(&self) {
        eprintln!(
            "{}",
            format!(
                "[*] Summary: {} Critical | {} High | {} Medium | {} Low | {} Info",
                self.summary.critical,
                self.summary.high,
                self.summary.medium,
                self.summary.low,
                self.summary.info
            )
            .bold()
        );

        if self.summary.suppressed > 0 {
            eprintln!(
                "{}",
                format!("[-] {} finding(s) suppressed", self.summary.suppressed).dimmed()
            );
        }

        if self.summary.total == 0 {
            eprintln!("{}", "[+] No issues found.".green().bold());
        } else {
            let message = format!("[!] Total: {} issue(s) found", self.summary.total);
            if self.summary.critical > 0 {
                eprintln!("{}", message.red().bold());
            } else if self.summary.high > 0 {
                eprintln!("{}", message.yellow().bold());
            } else {
                eprintln!("{}", message.blue().bold());
            }
        }
    }
}

impl ReportSummary {
    /// Creates a summary from a collection of findings.
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = ReportSummary {
            total: findings.len(),
            ..ReportSummary::default()
        };

        for finding in findings {
            match finding.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Info => summary.info += 1,
            }
        }

        summary
    }
}
