//! # Unprotected Selfdestruct Detector
//!
//! @title Anyone Can Destroy the Contract
//! @author Ramprasad
//!
//! Detects `selfdestruct` reachable from a public function that has no
//! access-control modifier and no `msg.sender` check against storage.
//!
//! ## CWE Reference
//!
//! - CWE-284: Improper Access Control

use super::access::has_access_control;
use super::{Detection, RuleError, RuleInput, RuleScope, VulnerabilityDetector};
use crate::analysis::{CallKind, Fact, FactKind, FunctionKind};
use crate::report::Severity;

/// Detector for selfdestruct without access control.
pub struct UnprotectedSelfdestructDetector;

impl VulnerabilityDetector for UnprotectedSelfdestructDetector {
    fn id(&self) -> &'static str {
        "unprotected-selfdestruct"
    }

    fn name(&self) -> &'static str {
        "Unprotected selfdestruct"
    }

    fn description(&self) -> &'static str {
        "Detects selfdestruct in public functions without access control."
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn scope(&self) -> RuleScope {
        RuleScope::CrossFunction
    }

    fn required_facts(&self) -> &'static [FactKind] {
        &[FactKind::ExternalCall]
    }

    fn cwe(&self) -> Option<&'static str> {
        Some("CWE-284")
    }

    fn remediation(&self) -> &'static str {
        "Restrict the function to the owner (e.g. `onlyOwner`) or remove selfdestruct."
    }

    fn detect(&self, input: &RuleInput<'_>) -> Result<Vec<Detection>, RuleError> {
        let mut detections = Vec::new();

        for fact in input.facts.of_kind(FactKind::ExternalCall) {
            let Fact::ExternalCall { function, call, .. } = fact else {
                continue;
            };
            if call.kind != CallKind::Selfdestruct {
                continue;
            }
            let exposed = matches!(
                input.facts.declaration(function),
                Some(Fact::FunctionDeclared { visibility, kind, .. })
                    if visibility.is_entry_point() && *kind != FunctionKind::Constructor
            );
            if !exposed || has_access_control(&input.facts, function) {
                continue;
            }

            detections.push(
                Detection::new(
                    call.location.clone(),
                    format!("anyone can call `{}` and destroy the contract", function),
                )
                .in_function(function)
                .subject("selfdestruct")
                .evidence(fact),
            );
        }

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        CallSite, CallTarget, ContractFacts, Mutability, SourceLocation, Visibility,
    };
    use crate::detectors::with_input;

    fn kill_facts(modifiers: &[&str]) -> ContractFacts {
        let mut facts = ContractFacts::new("Killable");
        facts.push(Fact::FunctionDeclared {
            function: "kill".to_string(),
            kind: FunctionKind::Function,
            visibility: Visibility::Public,
            mutability: Mutability::Nonpayable,
            modifiers: modifiers.iter().map(|m| m.to_string()).collect(),
            location: SourceLocation::new("Killable.sol", 4, 4),
        });
        for modifier in modifiers {
            facts.push(Fact::ModifierApplied {
                function: "kill".to_string(),
                modifier: modifier.to_string(),
                location: SourceLocation::new("Killable.sol", 4, 4),
            });
        }
        facts.push(Fact::ExternalCall {
            function: "kill".to_string(),
            index: 0,
            call: CallSite {
                kind: CallKind::Selfdestruct,
                target: CallTarget::Sender,
                value_transfer: true,
                return_checked: false,
                in_loop: false,
                node: 1,
                location: SourceLocation::new("Killable.sol", 5, 8),
            },
        });
        facts
    }

    #[test]
    fn test_public_selfdestruct_without_guard() {
        let facts = kill_facts(&[]);
        let detections =
            with_input(&facts, |input| UnprotectedSelfdestructDetector.detect(input)).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].location.line, 5);
    }

    #[test]
    fn test_owner_modifier_protects_selfdestruct() {
        let facts = kill_facts(&["onlyOwner"]);
        let detections =
            with_input(&facts, |input| UnprotectedSelfdestructDetector.detect(input)).unwrap();
        assert!(detections.is_empty());
    }
}
