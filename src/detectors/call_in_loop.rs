//! # External Call in Loop Detector
//!
//! @title Denial of Service Through Looped Calls
//! @author Ramprasad
//!
//! Detects external calls made inside a loop body. A single failing or
//! gas-hungry recipient blocks every other iteration.
//!
//! ## CWE Reference
//!
//! - CWE-703: Improper Check or Handling of Exceptional Conditions

use super::{Detection, RuleError, RuleInput, VulnerabilityDetector};
use crate::analysis::{Fact, FactKind};
use crate::report::{Confidence, Severity};

/// Detector for external calls performed inside loops.
pub struct ExternalCallInLoopDetector;

impl VulnerabilityDetector for ExternalCallInLoopDetector {
    fn id(&self) -> &'static str {
        "external-call-in-loop"
    }

    fn name(&self) -> &'static str {
        "External call inside loop"
    }

    fn description(&self) -> &'static str {
        "Detects external calls inside loops, where one failing callee blocks the whole batch."
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn confidence(&self) -> Confidence {
        Confidence::Suspected
    }

    fn required_facts(&self) -> &'static [FactKind] {
        &[FactKind::ExternalCall]
    }

    fn cwe(&self) -> Option<&'static str> {
        Some("CWE-703")
    }

    fn remediation(&self) -> &'static str {
        "Favor pull over push payments: record amounts owed and let recipients withdraw."
    }

    fn detect(&self, input: &RuleInput<'_>) -> Result<Vec<Detection>, RuleError> {
        Ok(input
            .facts
            .of_kind(FactKind::ExternalCall)
            .filter_map(|fact| match fact {
                Fact::ExternalCall { function, call, .. }
                    if call.in_loop && call.target.is_external() =>
                {
                    Some(
                        Detection::new(
                            call.location.clone(),
                            format!(
                                "`{}` performs a {} to {} inside a loop",
                                function,
                                call.kind.as_str(),
                                call.target.describe()
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
