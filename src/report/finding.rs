//! # Finding and Severity Definitions
//!
//! @title Security Finding Data Structures
//! @author Ramprasad
//!
//! Defines the core data structures for representing security findings,
//! their severity and confidence classification, and the stable
//! fingerprint used by baselines.

use crate::analysis::{Fact, SourceLocation};
use colored::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// Severity level classification for security findings.
///
/// Ordered from lowest to highest severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational finding, no direct security impact.
    Info = 0,

    /// Low severity, minimal security impact.
    Low = 1,

    /// Medium severity, moderate security impact.
    Medium = 2,

    /// High severity, significant security impact.
    High = 3,

    /// Critical severity, severe security impact.
    Critical = 4,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Returns a colored label for terminal output.
    pub fn colored_label(&self) -> ColoredString {
        match self {
            Severity::Critical => "CRITICAL".white().on_red().bold(),
            Severity::High => "HIGH".black().on_yellow().bold(),
            Severity::Medium => "MEDIUM".white().on_bright_blue().bold(),
            Severity::Low => "LOW".black().on_white().bold(),
            Severity::Info => "INFO".black().on_bright_white(),
        }
    }

    /// Returns a text indicator for the severity.
    pub fn indicator(&self) -> &'static str {
        match self {
            Severity::Critical => "[!!]",
            Severity::High => "[!]",
            Severity::Medium => "[~]",
            Severity::Low => "[-]",
            Severity::Info => "[i]",
        }
    }

    /// Returns a Markdown badge for the severity.
    pub fn markdown_badge(&self) -> &'static str {
        match self {
            Severity::Critical => {
                "![Critical](https://img.shields.io/badge/severity-CRITICAL-red)"
            }
            Severity::High => "![High](https://img.shields.io/badge/severity-HIGH-orange)",
            Severity::Medium => "![Medium](https://img.shields.io/badge/severity-MEDIUM-yellow)",
            Severity::Low => "![Low](https://img.shields.io/badge/severity-LOW-blue)",
            Severity::Info => "![Info](https://img.shields.io/badge/severity-INFO-lightgrey)",
        }
    }

    /// GitHub Actions annotation level.
    pub fn annotation_level(&self) -> &'static str {
        match self {
            Severity::Critical | Severity::High => "error",
            Severity::Medium => "warning",
            Severity::Low | Severity::Info => "notice",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            other => Err(format!(
                "unknown severity `{}` (expected info, low, medium, high or critical)",
                other
            )),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "Critical"),
            Severity::High => write!(f, "High"),
            Severity::Medium => write!(f, "Medium"),
            Severity::Low => write!(f, "Low"),
            Severity::Info => write!(f, "Info"),
        }
    }
}

/// How certain a rule is about a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Heuristic match that needs manual review.
    Suspected,
    /// The pattern is certainly present.
    #[default]
    Proven,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Proven => "proven",
            Confidence::Suspected => "suspected",
        }
    }
}

/// Rule ids of the findings the analyzer reports about itself.
pub mod diagnostics {
    pub const MALFORMED_INPUT: &str = "malformed-input";
    pub const RULE_EXECUTION_ERROR: &str = "rule-execution-error";
    pub const ANALYSIS_TIMEOUT: &str = "analysis-timeout";
    pub const ANALYSIS_CANCELLED: &str = "analysis-cancelled";
    pub const STALE_SUPPRESSION: &str = "stale-suppression";

    pub const ALL: [&str; 5] = [
        MALFORMED_INPUT,
        RULE_EXECUTION_ERROR,
        ANALYSIS_TIMEOUT,
        ANALYSIS_CANCELLED,
        STALE_SUPPRESSION,
    ];
}

/// Represents a security finding from static analysis.
///
/// Contains all information needed to understand, locate, and remediate
/// a detected vulnerability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// ID of the rule that produced this finding (e.g., "reentrancy-external-call").
    pub rule_id: String,

    /// Short, descriptive title of the finding.
    pub title: String,

    pub contract: String,

    /// Function or modifier the finding is scoped to.
    pub function: Option<String>,

    pub location: SourceLocation,

    /// Severity classification.
    pub severity: Severity,

    pub confidence: Confidence,

    pub message: String,

    /// Remediation guidance for fixing the vulnerability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,

    /// Facts that triggered the finding.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Fact>,

    /// Line-independent identity used by baselines.
    pub fingerprint: String,

    /// Deduplication group; defaults to the rule id.
    #[serde(skip)]
    pub group: String,
}

impl Finding {
    /// Builds an informational finding about the analysis itself.
    ///
    /// `subject` distinguishes diagnostics sharing a contract and location,
    /// e.g. the failing rule's id.
    pub fn diagnostic(
        rule_id: &str,
        contract: &str,
        location: SourceLocation,
        subject: &str,
        message: impl Into<String>,
    ) -> Self {
        let title = match rule_id {
            diagnostics::MALFORMED_INPUT => "Malformed input",
            diagnostics::RULE_EXECUTION_ERROR => "Rule execution error",
            diagnostics::ANALYSIS_TIMEOUT => "Analysis timeout",
            diagnostics::ANALYSIS_CANCELLED => "Analysis cancelled",
            diagnostics::STALE_SUPPRESSION => "Stale suppression",
            _ => "Analyzer diagnostic",
        };

        Self {
            rule_id: rule_id.to_string(),
            title: title.to_string(),
            contract: contract.to_string(),
            function: None,
            location,
            severity: Severity::Info,
            confidence: Confidence::Proven,
            message: message.into(),
            remediation: None,
            evidence: Vec::new(),
            fingerprint: fingerprint(rule_id, contract, None, subject),
            group: format!("{}:{}", rule_id, subject),
        }
    }

    /// Returns true for findings about the analysis rather than the contract.
    pub fn is_diagnostic(&self) -> bool {
        diagnostics::ALL.contains(&self.rule_id.as_str())
    }

    /// Key under which findings collapse during deduplication.
    pub fn dedup_key(&self) -> (String, String, Option<String>, SourceLocation) {
        (
            self.group.clone(),
            self.contract.clone(),
            self.function.clone(),
            self.location.clone(),
        )
    }

    /// Ordering used by every report: severity descending, then position.
    pub fn report_order(&self, other: &Self) -> std::cmp::Ordering {
        other
            .severity
            .cmp(&self.severity)
            .then_with(|| self.contract.cmp(&other.contract))
            .then_with(|| self.function.cmp(&other.function))
            .then_with(|| self.location.cmp(&other.location))
            .then_with(|| self.rule_id.cmp(&other.rule_id))
            .then_with(|| self.message.cmp(&other.message))
    }
}

/// Computes the stable fingerprint of a finding.
///
/// The first 16 hex characters of SHA-256 over `rule|contract|function|subject`.
/// Line numbers are not part of it.
pub fn fingerprint(rule_id: &str, contract: &str, function: Option<&str>, subject: &str) -> String {
    digest(&[rule_id, contract, function.unwrap_or(""), subject])
}

/// Fingerprint of the `occurrence`th finding sharing `base`, counted in
/// source order. Occurrence 0 keeps `base` unchanged.
pub fn occurrence_fingerprint(base: &str, occurrence: usize) -> String {
    if occurrence == 0 {
        return base.to_string();
    }
    digest(&[base, &occurrence.to_string()])
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }

    hasher
        .finalize()
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("critical".parse::<Severity>(), Ok(Severity::Critical));
        assert_eq!("HIGH".parse::<Severity>(), Ok(Severity::High));
        assert!("unknown".parse::<Severity>().is_err());
    }

    #[test]
    fn test_diagnostics_do_not_share_groups() {
        let loc = SourceLocation::new("A.sol", 1, 0);
        let a = Finding::diagnostic(diagnostics::RULE_EXECUTION_ERROR, "A", loc.clone(), "r1", "x");
        let b = Finding::diagnostic(diagnostics::RULE_EXECUTION_ERROR, "A", loc, "r2", "y");

        assert!(a.is_diagnostic());
        assert_eq!(a.severity, Severity::Info);
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_fingerprint_identity() {
        let a = fingerprint("tx-origin-auth", "Wallet", Some("pay"), "tx.origin");
        let c = fingerprint("tx-origin-auth", "Wallet", Some("refund"), "tx.origin");

        assert_eq!(a.len(), 16);
        assert_ne!(a, c);
    }

    #[test]
    fn test_occurrence_fingerprint() {
        let base = fingerprint("unbounded-loop", "Airdrop", Some("credit"), "users");

        assert_eq!(occurrence_fingerprint(&base, 0), base);
        assert_ne!(occurrence_fingerprint(&base, 1), base);
        assert_ne!(occurrence_fingerprint(&base, 1), occurrence_fingerprint(&base, 2));
        assert_eq!(occurrence_fingerprint(&base, 1).len(), 16);
    }
}
