//! # Suppression Module
//!
//! @title Suppressions and Baselines
//! @author Ramprasad
//!
//! Decides which findings are hidden from the report. Suppressions come
//! from three places:
//!
//! - **Inline annotations** in contract source
//!   (`// sentinel-disable-next-line <rule> [until YYYY-MM-DD] [: reason]`)
//! - **Suppression files** listing rule and scope pairs
//! - **Baselines** recording the fingerprints of accepted findings
//!
//! Matching is a pure function of the finding and the [`SuppressionSet`].
//! Expiry never changes whether a finding is suppressed; an expired entry
//! is reported once as a `stale-suppression` finding instead.

pub mod baseline;
mod inline;

pub use baseline::{Baseline, BaselineEntry, BASELINE_VERSION};
pub use inline::parse_inline;

use crate::analysis::SourceLocation;
use crate::report::{diagnostics, Finding};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Rule id matching every rule.
pub const ANY_RULE: &str = "*";

/// Errors raised while loading suppression or baseline files.
#[derive(Debug, Error)]
pub enum SuppressionError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid suppression data in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("suppression {index} in {path}: {message}")]
    InvalidEntry {
        path: String,
        index: usize,
        message: String,
    },

    #[error("unsupported baseline version {found} (expected {expected})")]
    UnsupportedBaselineVersion { found: u32, expected: u32 },
}

/// What part of the code a suppression covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SuppressionScope {
    /// A source file, optionally limited to an inclusive line range.
    File {
        file: String,
        #[serde(default)]
        lines: Option<(usize, usize)>,
    },
    /// A contract, optionally limited to one function.
    Function {
        contract: String,
        #[serde(default)]
        function: Option<String>,
    },
    /// A single finding identity, as recorded in baselines.
    Fingerprint { fingerprint: String },
}

impl SuppressionScope {
    fn matches(&self, finding: &Finding) -> bool {
        match self {
            SuppressionScope::File { file, lines } => {
                same_file(file, &finding.location.file)
                    && lines.map_or(true, |(start, end)| {
                        (start..=end).contains(&finding.location.line)
                    })
            }
            SuppressionScope::Function { contract, function } => {
                *contract == finding.contract
                    && function
                        .as_ref()
                        .map_or(true, |f| finding.function.as_ref() == Some(f))
            }
            SuppressionScope::Fingerprint { fingerprint } => *fingerprint == finding.fingerprint,
        }
    }
}

fn same_file(a: &str, b: &str) -> bool {
    a.trim_start_matches("./") == b.trim_start_matches("./")
}

/// Where a suppression was declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum SuppressionOrigin {
    /// Annotation comment in a source file.
    Inline(SourceLocation),
    /// Entry of a suppression file.
    File(String),
    Baseline,
}

impl SuppressionOrigin {
    fn location(&self) -> SourceLocation {
        match self {
            SuppressionOrigin::Inline(location) => location.clone(),
            SuppressionOrigin::File(path) => SourceLocation::new(path.clone(), 0, 0),
            SuppressionOrigin::Baseline => SourceLocation::new("baseline", 0, 0),
        }
    }
}

/// One suppression entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suppression {
    /// Rule id, or [`ANY_RULE`].
    pub rule: String,
    pub scope: SuppressionScope,
    pub reason: Option<String>,

    /// Last day the suppression is considered current.
    pub expires: Option<NaiveDate>,

    pub origin: SuppressionOrigin,
}

impl Suppression {
    pub fn matches(&self, finding: &Finding) -> bool {
        (self.rule == ANY_RULE || self.rule.eq_ignore_ascii_case(&finding.rule_id))
            && self.scope.matches(finding)
    }

    /// Returns true once `as_of` is past the expiry date.
    pub fn is_expired(&self, as_of: NaiveDate) -> bool {
        self.expires.map_or(false, |d| as_of > d)
    }

    fn stale_finding(&self, index: usize) -> Finding {
        let contract = match &self.scope {
            SuppressionScope::Function { contract, .. } => contract.as_str(),
            _ => "",
        };
        let expires = self
            .expires
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        Finding::diagnostic(
            diagnostics::STALE_SUPPRESSION,
            contract,
            self.origin.location(),
            &format!("{}#{}", self.rule, index),
            format!(
                "suppression of `{}` expired on {}{}",
                self.rule,
                expires,
                self.reason
                    .as_ref()
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default()
            ),
        )
    }
}

/// A finding hidden by a suppression, kept for verbose reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuppressedFinding {
    pub finding: Finding,
    pub rule: String,
    pub reason: Option<String>,
    pub origin: SuppressionOrigin,
}

/// Result of applying a [`SuppressionSet`] to a batch of findings.
#[derive(Debug, Clone, Default)]
pub struct SuppressionOutcome {
    pub kept: Vec<Finding>,
    pub suppressed: Vec<SuppressedFinding>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuppressionFile {
    #[serde(default)]
    suppressions: Vec<SuppressionFileEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuppressionFileEntry {
    rule: String,
    scope: SuppressionScope,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    expires: Option<NaiveDate>,
}

/// Ordered collection of suppressions; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct SuppressionSet {
    entries: Vec<Suppression>,
}

impl SuppressionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, suppression: Suppression) {
        self.entries.push(suppression);
    }

    pub fn entries(&self) -> &[Suppression] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a suppression file document, keeping entry order.
    pub fn extend_from_str(&mut self, text: &str, origin: &str) -> Result<(), SuppressionError> {
        let file: SuppressionFile =
            serde_json::from_str(text).map_err(|source| SuppressionError::Parse {
                path: origin.to_string(),
                source,
            })?;

        for (index, entry) in file.suppressions.into_iter().enumerate() {
            if entry.rule.trim().is_empty() {
                return Err(SuppressionError::InvalidEntry {
                    path: origin.to_string(),
                    index,
                    message: "rule must not be empty".to_string(),
                });
            }
            if let SuppressionScope::File {
                lines: Some((start, end)),
                ..
            } = entry.scope
            {
                if start > end {
                    return Err(SuppressionError::InvalidEntry {
                        path: origin.to_string(),
                        index,
                        message: format!("line range {}..{} is reversed", start, end),
                    });
                }
            }

            self.entries.push(Suppression {
                rule: entry.rule,
                scope: entry.scope,
                reason: entry.reason,
                expires: entry.expires,
                origin: SuppressionOrigin::File(origin.to_string()),
            });
        }
        Ok(())
    }

    /// Reads a suppression file from disk.
    pub fn extend_from_file(&mut self, path: &Path) -> Result<(), SuppressionError> {
        let text = std::fs::read_to_string(path).map_err(|source| SuppressionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.extend_from_str(&text, &path.display().to_string())
    }

    /// Adds the annotations found in a contract source text.
    pub fn extend_inline(&mut self, file: &str, source: &str) {
        self.entries.extend(parse_inline(file, source));
    }

    /// Suppresses every finding recorded in a baseline.
    pub fn extend_baseline(&mut self, baseline: &Baseline) {
        self.entries
            .extend(baseline.fingerprints.iter().map(|entry| Suppression {
                rule: entry.rule.clone(),
                scope: SuppressionScope::Fingerprint {
                    fingerprint: entry.fingerprint.clone(),
                },
                reason: Some("accepted in baseline".to_string()),
                expires: None,
                origin: SuppressionOrigin::Baseline,
            }));
    }

    /// First suppression matching `finding`. Analyzer diagnostics never match.
    pub fn matching(&self, finding: &Finding) -> Option<&Suppression> {
        if finding.is_diagnostic() {
            return None;
        }
        self.entries.iter().find(|s| s.matches(finding))
    }

    pub fn is_suppressed(&self, finding: &Finding) -> bool {
        self.matching(finding).is_some()
    }

    /// One `stale-suppression` finding per suppression expired at `as_of`.
    pub fn stale_findings(&self, as_of: NaiveDate) -> Vec<Finding> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_expired(as_of))
            .map(|(i, s)| s.stale_finding(i))
            .collect()
    }

    /// Splits findings into kept and suppressed, then appends stale-suppression findings.
    pub fn apply(&self, findings: Vec<Finding>, as_of: NaiveDate) -> SuppressionOutcome {
        let mut outcome = SuppressionOutcome::default();

        for finding in findings {
            match self.matching(&finding) {
                Some(s) => outcome.suppressed.push(SuppressedFinding {
                    rule: s.rule.clone(),
                    reason: s.reason.clone(),
                    origin: s.origin.clone(),
                    finding,
                }),
                None => outcome.kept.push(finding),
            }
        }
        outcome.kept.extend(self.stale_findings(as_of));

        if !outcome.suppressed.is_empty() {
            log::info!("{} finding(s) suppressed", outcome.suppressed.len());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{fingerprint, Confidence, Severity};

    fn finding(rule: &str, function: &str, line: usize) -> Finding {
        Finding {
            rule_id: rule.to_string(),
            title: rule.to_string(),
            contract: "Bank".to_string(),
            function: Some(function.to_string()),
            location: SourceLocation::new("contracts/Bank.sol", line, 9),
            severity: Severity::High,
            confidence: Confidence::Proven,
            message: String::new(),
            remediation: None,
            evidence: Vec::new(),
            fingerprint: fingerprint(rule, "Bank", Some(function), "balances"),
            group: rule.to_string(),
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_file_scope_with_line_range() {
        let mut set = SuppressionSet::new();
        set.extend_from_str(
            r#"{ "suppressions": [ { "rule": "reentrancy-external-call",
                 "scope": { "file": "contracts/Bank.sol", "lines": [5, 7] },
                 "reason": "audited" } ] }"#,
            "suppressions.json",
        )
        .unwrap();

        assert!(set.is_suppressed(&finding("reentrancy-external-call", "withdraw", 6)));
        assert!(!set.is_suppressed(&finding("reentrancy-external-call", "withdraw", 8)));
        assert!(!set.is_suppressed(&finding("tx-origin-auth", "withdraw", 6)));
    }

    #[test]
    fn test_function_scope_and_wildcard() {
        let mut set = SuppressionSet::new();
        set.extend_from_str(
            r#"{ "suppressions": [ { "rule": "*", "scope": { "contract": "Bank", "function": "withdraw" } } ] }"#,
            "s.json",
        )
        .unwrap();

        assert!(set.is_suppressed(&finding("unbounded-loop", "withdraw", 1)));
        assert!(!set.is_suppressed(&finding("unbounded-loop", "deposit", 1)));
    }

    #[test]
    fn test_expired_suppression_still_suppresses() {
        let mut set = SuppressionSet::new();
        set.extend_from_str(
            r#"{ "suppressions": [ { "rule": "tx-origin-auth", "scope": { "contract": "Bank" },
                 "expires": "2024-01-31" } ] }"#,
            "s.json",
        )
        .unwrap();

        let findings = vec![finding("tx-origin-auth", "pay", 3)];
        let current = set.apply(findings.clone(), date("2024-01-31"));
        assert!(current.kept.is_empty());
        assert_eq!(current.suppressed.len(), 1);

        let late = set.apply(findings, date("2024-02-01"));
        assert_eq!(late.suppressed.len(), 1);
        assert_eq!(late.kept.len(), 1);
        assert_eq!(late.kept[0].rule_id, diagnostics::STALE_SUPPRESSION);
    }

    #[test]
    fn test_diagnostics_are_never_suppressed() {
        let mut set = SuppressionSet::new();
        set.extend_from_str(
            r#"{ "suppressions": [ { "rule": "*", "scope": { "contract": "Bank" } } ] }"#,
            "s.json",
        )
        .unwrap();

        let diag = Finding::diagnostic(
            diagnostics::ANALYSIS_TIMEOUT,
            "Bank",
            SourceLocation::new("contracts/Bank.sol", 1, 0),
            "Bank",
            "timed out",
        );
        assert!(!set.is_suppressed(&diag));
    }

    #[test]
    fn test_reversed_line_range_is_rejected() {
        let err = SuppressionSet::new()
            .extend_from_str(
                r#"{ "suppressions": [ { "rule": "x", "scope": { "file": "a", "lines": [9, 2] } } ] }"#,
                "s.json",
            )
            .unwrap_err();
        assert!(matches!(err, SuppressionError::InvalidEntry { index: 0, .. }));
    }
}
