//! # Unprotected Privileged Write Detector
//!
//! @title Ownership Takeover
//! @author Ramprasad
//!
//! Detects public functions that assign a privileged role variable
//! (`owner`, `admin`, ...) without restricting the caller.
//!
//! ## Vulnerability Pattern
//!
//! ```solidity
//! function setOwner(address newOwner) public {
//!     owner = newOwner;
//! }
//! ```
//!
//! ## CWE Reference
//!
//! - CWE-284: Improper Access Control

use super::access::{has_access_control, is_privileged_variable};
use super::{Detection, RuleError, RuleInput, RuleScope, VulnerabilityDetector};
use crate::analysis::{Fact, FactKind, FunctionKind};
use crate::report::Severity;
use std::collections::BTreeSet;

/// Detector for unguarded writes to role variables.
pub struct PrivilegedWriteDetector;

impl VulnerabilityDetector for PrivilegedWriteDetector {
    fn id(&self) -> &'static str {
        "unprotected-privileged-write"
    }

    fn name(&self) -> &'static str {
        "Unprotected privileged state write"
    }

    fn description(&self) -> &'static str {
        "Detects public functions that change owner/admin-like state without access control."
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn scope(&self) -> RuleScope {
        RuleScope::CrossFunction
    }

    fn required_facts(&self) -> &'static [FactKind] {
        &[FactKind::StateWrite]
    }

    fn cwe(&self) -> Option<&'static str> {
        Some("CWE-284")
    }

    fn remediation(&self) -> &'static str {
        "Guard the function with a modifier that checks msg.sender against the stored owner."
    }

    fn detect(&self, input: &RuleInput<'_>) -> Result<Vec<Detection>, RuleError> {
        let mut seen = BTreeSet::new();
        let mut detections = Vec::new();

        for fact in input.facts.of_kind(FactKind::StateWrite) {
            let Fact::StateWrite {
                function,
                variable,
                location,
            } = fact
            else {
                continue;
            };
            if !is_privileged_variable(variable) {
                continue;
            }
            let exposed = matches!(
                input.facts.declaration(function),
                Some(Fact::FunctionDeclared { visibility, kind, .. })
                    if visibility.is_entry_point() && *kind != FunctionKind::Constructor
            );
            if !exposed
                || has_access_control(&input.facts, function)
                || !seen.insert((function.as_str(), variable.as_str()))
            {
                continue;
            }

            detections.push(
                Detection::new(
                    location.clone(),
                    format!(
                        "`{}` writes privileged variable `{}` without access control",
                        function, variable
                    ),
                )
                .in_function(function)
                .subject(variable)
                .evidence(fact),
            );
        }

        Ok(detections)
    }
}
