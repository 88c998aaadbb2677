//! # Unchecked Low-Level Call Detector
//!
//! @title Ignored Call Return Value
//! @author Ramprasad
//!
//! Detects `call`, `delegatecall`, `staticcall` and `send` whose success
//! flag is discarded. These calls do not revert on failure, so execution
//! continues as if the call had succeeded.
//!
//! ## CWE Reference
//!
//! - CWE-252: Unchecked Return Value

use super::{Detection, RuleError, RuleInput, VulnerabilityDetector};
use crate::analysis::{Fact, FactKind};
use crate::report::Severity;

/// Detector for low-level calls whose status is never checked.
pub struct UncheckedCallDetector;

impl VulnerabilityDetector for UncheckedCallDetector {
    fn id(&self) -> &'static str {
        "unchecked-low-level-call"
    }

    fn name(&self) -> &'static str {
        "Unchecked low-level call"
    }

    fn description(&self) -> &'static str {
        "Detects call/delegatecall/staticcall/send whose return value is ignored."
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn required_facts(&self) -> &'static [FactKind] {
        &[FactKind::ExternalCall]
    }

    fn cwe(&self) -> Option<&'static str> {
        Some("CWE-252")
    }

    fn remediation(&self) -> &'static str {
        "Check the returned success flag, e.g. `(bool ok, ) = to.call{value: v}(\"\"); require(ok);`."
    }

    fn detect(&self, input: &RuleInput<'_>) -> Result<Vec<Detection>, RuleError> {
        Ok(input
            .facts
            .of_kind(FactKind::ExternalCall)
            .filter_map(|fact| match fact {
                Fact::ExternalCall { function, call, .. }
                    if call.kind.returns_status() && !call.return_checked =>
                {
                    Some(
                        Detection::new(
                            call.location.clone(),
                            format!(
                                "return value of `{}` to {} in `{}` is not checked",
                                call.kind.as_str(),
                                call.target.describe(),
                                function
                            ),
                        )
                        .in_function(function)
                        .subject(fact.subject())
                        .evidence(fact),
                    )
                }
                _ => None,
            })
            .collect())
    }
}
