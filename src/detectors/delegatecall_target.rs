//! # Delegatecall to User-Supplied Target Detector
//!
//! @title Controlled Delegatecall
//! @author Ramprasad
//!
//! Detects `delegatecall` in a public function whose target comes straight
//! from a parameter. The callee runs with this contract's storage, so the
//! caller can overwrite any slot, owner included.
//!
//! ## CWE Reference
//!
//! - CWE-829: Inclusion of Functionality from Untrusted Control Sphere

use super::{Detection, RuleError, RuleInput, VulnerabilityDetector};
use crate::analysis::{CallKind, CallTarget, Fact, FactKind};
use crate::report::Severity;

/// Detector for delegatecalls whose target is a function parameter.
pub struct DelegatecallTargetDetector;

impl VulnerabilityDetector for DelegatecallTargetDetector {
    fn id(&self) -> &'static str {
        "delegatecall-user-target"
    }

    fn name(&self) -> &'static str {
        "Delegatecall to user-supplied address"
    }

    fn description(&self) -> &'static str {
        "Detects delegatecall whose target address is a parameter of a public function."
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn required_facts(&self) -> &'static [FactKind] {
        &[FactKind::ExternalCall]
    }

    fn cwe(&self) -> Option<&'static str> {
        Some("CWE-829")
    }

    fn remediation(&self) -> &'static str {
        "Only delegatecall into trusted, immutable or governance-controlled implementations."
    }

    fn detect(&self, input: &RuleInput<'_>) -> Result<Vec<Detection>, RuleError> {
        let mut detections = Vec::new();

        for fact in input.facts.of_kind(FactKind::ExternalCall) {
            let Fact::ExternalCall { function, call, .. } = fact else {
                continue;
            };
            let CallTarget::Parameter(parameter) = &call.target else {
                continue;
            };
            if call.kind != CallKind::DelegateCall {
                continue;
            }
            let public = matches!(
                input.facts.declaration(function),
                Some(Fact::FunctionDeclared { visibility, .. }) if visibility.is_entry_point()
            );
            if !public {
                continue;
            }

            detections.push(
                Detection::new(
                    call.location.clone(),
                    format!(
                        "`{}` delegatecalls into caller-controlled parameter `{}`",
                        function, parameter
                    ),
                )
                .in_function(function)
                .subject(parameter)
                .evidence(fact),
            );
        }

        Ok(detections)
    }
}
