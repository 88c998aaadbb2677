//! Baseline files: fingerprints of findings accepted at some point in time.

use super::SuppressionError;
use crate::report::Finding;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const BASELINE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub fingerprint: String,
    pub rule: String,
    pub contract: String,
    #[serde(default)]
    pub function: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub version: u32,
    pub fingerprints: Vec<BaselineEntry>,
}

impl Baseline {
    /// Records every non-diagnostic finding, sorted by fingerprint.
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let mut fingerprints: Vec<BaselineEntry> = findings
            .into_iter()
            .filter(|f| !f.is_diagnostic())
            .map(|f| BaselineEntry {
                fingerprint: f.fingerprint.clone(),
                rule: f.rule_id.clone(),
                contract: f.contract.clone(),
                function: f.function.clone(),
            })
            .collect();
        fingerprints.sort();
        fingerprints.dedup();

        Self {
            version: BASELINE_VERSION,
            fingerprints,
        }
    }

    pub fn parse(text: &str, origin: &str) -> Result<Self, SuppressionError> {
        let baseline: Baseline =
            serde_json::from_str(text).map_err(|source| SuppressionError::Parse {
                path: origin.to_string(),
                source,
            })?;
        if baseline.version != BASELINE_VERSION {
            return Err(SuppressionError::UnsupportedBaselineVersion {
                found: baseline.version,
                expected: BASELINE_VERSION,
            });
        }
        Ok(baseline)
    }

    pub fn load(path: &Path) -> Result<Self, SuppressionError> {
        let text = std::fs::read_to_string(path).map_err(|source| SuppressionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    pub fn to_json(&self) -> Result<String, SuppressionError> {
        serde_json::to_string_pretty(self).map_err(|source| SuppressionError::Parse {
            path: "baseline".to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SuppressionError> {
        let mut json = self.to_json()?;
        json.push('\n');
        std::fs::write(path, json).map_err(|source| SuppressionError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SourceLocation;
    use crate::report::diagnostics;

    #[test]
    fn test_baseline_skips_diagnostics_and_checks_version() {
        let diag = Finding::diagnostic(
            diagnostics::MALFORMED_INPUT,
            "Bad",
            SourceLocation::new("Bad.sol", 0, 0),
            "contracts[0]",
            "broken",
        );
        let baseline = Baseline::from_findings([&diag]);
        assert!(baseline.is_empty());

        let err = Baseline::parse(r#"{ "version": 7, "fingerprints": [] }"#, "b.json").unwrap_err();
        assert!(matches!(
            err,
            SuppressionError::UnsupportedBaselineVersion { found: 7, .. }
        ));
    }
}
