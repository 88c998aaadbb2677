//! # Unbounded Loop Detector
//!
//! @title Loop Over Growing Storage Array
//! @author Ramprasad
//!
//! Detects loops whose termination depends on the length of a storage
//! dynamic array. Anyone able to grow the array can push the loop past the
//! block gas limit. Loops also bounded by a literal or constant, or exited
//! by a `break` guarded by one, are not reported.
//!
//! The bound cannot be proven statically, so findings are `suspected`.
//!
//! ## CWE Reference
//!
//! - CWE-400: Uncontrolled Resource Consumption

use super::{Detection, RuleError, RuleInput, VulnerabilityDetector};
use crate::analysis::{Fact, FactKind, LoopBound};
use crate::report::{Confidence, Severity};

/// Detector for loops bounded only by a storage array length.
pub struct UnboundedLoopDetector;

impl VulnerabilityDetector for UnboundedLoopDetector {
    fn id(&self) -> &'static str {
        "unbounded-loop"
    }

    fn name(&self) -> &'static str {
        "Unbounded loop over storage array"
    }

    fn description(&self) -> &'static str {
        "Detects loops bounded by the length of a storage dynamic array without a fixed cap."
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn confidence(&self) -> Confidence {
        Confidence::Suspected
    }

    fn required_facts(&self) -> &'static [FactKind] {
        &[FactKind::Loop]
    }

    fn cwe(&self) -> Option<&'static str> {
        Some("CWE-400")
    }

    fn remediation(&self) -> &'static str {
        "Process the array in bounded batches or cap the iteration count with a constant."
    }

    fn detect(&self, input: &RuleInput<'_>) -> Result<Vec<Detection>, RuleError> {
        Ok(input
            .facts
            .of_kind(FactKind::Loop)
            .filter_map(|fact| match fact {
                Fact::Loop {
                    function,
                    bound: LoopBound::StateArrayLength(array),
                    bounded_break: false,
                    location,
                } => Some(
                    Detection::new(
                        location.clone(),
                        format!(
                            "loop in `{}` iterates over `{}.length` without a fixed bound",
                            function, array
                        ),
                    )
                    .in_function(function)
                    .subject(array)
                    .evidence(fact),
                ),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ContractFacts, SourceLocation};
    use crate::detectors::with_input;

    fn looped(bound: LoopBound, bounded_break: bool) -> Fact {
        Fact::Loop {
            function: "payout".to_string(),
            bound,
            bounded_break,
            location: SourceLocation::new("Payroll.sol", 10, 8),
        }
    }

    #[test]
    fn test_only_array_length_bound_is_reported() {
        let mut facts = ContractFacts::new("Payroll");
        facts.push(looped(LoopBound::Literal("10".to_string()), false));
        facts.push(looped(LoopBound::StateArrayLength("users".to_string()), true));

        let detections = with_input(&facts, |input| UnboundedLoopDetector.detect(input)).unwrap();
        assert!(detections.is_empty());

        facts.push(looped(LoopBound::StateArrayLength("users".to_string()), false));
        let detections = with_input(&facts, |input| UnboundedLoopDetector.detect(input)).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].subject, "users");
    }
}
