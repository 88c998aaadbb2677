//! # Modifier Checks Parameter Detector
//!
//! @title Access Modifier Trusting Its Argument
//! @author Ramprasad
//!
//! Detects access-control modifiers that compare `msg.sender` with one of
//! their own parameters instead of a stored role. Whoever calls a function
//! using the modifier also controls the value it is compared against.
//!
//! ## Vulnerability Pattern
//!
//! ```solidity
//! modifier onlyBy(address account) {
//!     require(msg.sender == account);
//!     _;
//! }
//!
//! function changeOwner(address newOwner) public onlyBy(newOwner) {
//!     owner = newOwner;
//! }
//! ```
//!
//! ## CWE Reference
//!
//! - CWE-863: Incorrect Authorization

use super::access::modifiers_of;
use super::{Detection, RuleError, RuleInput, RuleScope, VulnerabilityDetector};
use crate::analysis::{Fact, FactKind};
use crate::report::Severity;

/// Detector for modifiers that authorize against a parameter.
pub struct ModifierChecksParameterDetector;

impl VulnerabilityDetector for ModifierChecksParameterDetector {
    fn id(&self) -> &'static str {
        "modifier-checks-parameter"
    }

    fn name(&self) -> &'static str {
        "Access modifier checks a parameter instead of state"
    }

    fn description(&self) -> &'static str {
        "Detects modifiers comparing msg.sender against a modifier parameter rather than \
         a state variable."
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn scope(&self) -> RuleScope {
        RuleScope::CrossFunction
    }

    fn required_facts(&self) -> &'static [FactKind] {
        &[FactKind::ModifierGuard]
    }

    fn cwe(&self) -> Option<&'static str> {
        Some("CWE-863")
    }

    fn remediation(&self) -> &'static str {
        "Compare msg.sender against the stored owner or role, not a caller-supplied value."
    }

    fn detect(&self, input: &RuleInput<'_>) -> Result<Vec<Detection>, RuleError> {
        let mut detections = Vec::new();

        for fact in input.facts.of_kind(FactKind::ModifierGuard) {
            let Fact::ModifierGuard {
                modifier,
                sender_compared_to_parameter: true,
                location,
                ..
            } = fact
            else {
                continue;
            };

            let users: Vec<&str> = input
                .facts
                .of_kind(FactKind::FunctionDeclared)
                .filter_map(|f| f.function())
                .filter(|f| modifiers_of(&input.facts, f).contains(&modifier.as_str()))
                .collect();
            let message = if users.is_empty() {
                format!(
                    "modifier `{}` compares msg.sender against its own parameter",
                    modifier
                )
            } else {
                format!(
                    "modifier `{}` compares msg.sender against its own parameter; used by {}",
                    modifier,
                    users
                        .iter()
                        .map(|u| format!("`{}`", u))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            };

            detections.push(
                Detection::new(location.clone(), message)
                    .in_function(modifier)
                    .subject(modifier)
                    .evidence(fact),
            );
        }

        Ok(detections)
    }
}
