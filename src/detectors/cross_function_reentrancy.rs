//! # Cross-Function Reentrancy Detector
//!
//! @title Stale State Observed by Another Function
//! @author Ramprasad
//!
//! Detects a storage variable written after an external call when another
//! public function relies on that variable in a guard. A reentrant call
//! into the other function sees the stale value even though the calling
//! function never checked it.
//!
//! ## CWE Reference
//!
//! - CWE-841: Improper Enforcement of Behavioral Workflow

use super::access::has_reentrancy_guard;
use super::{Detection, RuleError, RuleInput, RuleScope, VulnerabilityDetector};
use crate::analysis::{Fact, FactKind};
use crate::report::{Confidence, Severity};
use std::collections::{BTreeMap, BTreeSet};

/// Detector for state shared between a calling function and a guarded entry point.
pub struct CrossFunctionReentrancyDetector;

impl CrossFunctionReentrancyDetector {
    /// Entry points, by name, that read each variable inside a guard.
    fn guarded_readers<'a>(input: &RuleInput<'a>) -> BTreeMap<&'a str, BTreeSet<&'a str>> {
        let entry_points: BTreeSet<&str> = input
            .facts
            .iter()
            .filter_map(|f| match f {
                Fact::FunctionDeclared {
                    function,
                    visibility,
                    ..
                } if visibility.is_entry_point() => Some(function.as_str()),
                _ => None,
            })
            .collect();

        let mut readers: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for fact in input.facts.of_kind(FactKind::StateRead) {
            if let Fact::StateRead {
                function,
                variable,
                in_guard: true,
                ..
            } = fact
            {
                if entry_points.contains(function.as_str()) {
                    readers
                        .entry(variable.as_str())
                        .or_default()
                        .insert(function.as_str());
                }
            }
        }
        readers
    }
}

impl VulnerabilityDetector for CrossFunctionReentrancyDetector {
    fn id(&self) -> &'static str {
        "cross-function-reentrancy"
    }

    fn name(&self) -> &'static str {
        "Cross-function reentrancy"
    }

    fn description(&self) -> &'static str {
        "Detects state written after an external call that another public function reads \
         in a guard, without a reentrancy guard on the calling function."
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn confidence(&self) -> Confidence {
        Confidence::Suspected
    }

    fn scope(&self) -> RuleScope {
        RuleScope::CrossFunction
    }

    fn required_facts(&self) -> &'static [FactKind] {
        &[FactKind::WritesAfterExternalCall]
    }

    fn cwe(&self) -> Option<&'static str> {
        Some("CWE-841")
    }

    fn remediation(&self) -> &'static str {
        "Update shared state before making external calls, or protect every function \
         touching that state with the same nonReentrant guard."
    }

    fn detect(&self, input: &RuleInput<'_>) -> Result<Vec<Detection>, RuleError> {
        let readers = Self::guarded_readers(input);
        let mut seen = BTreeSet::new();
        let mut detections = Vec::new();

        for fact in input.facts.of_kind(FactKind::WritesAfterExternalCall) {
            let Fact::WritesAfterExternalCall {
                function,
                variable,
                call_index,
                call_location,
                eligibility_read: false,
                target,
                ..
            } = fact
            else {
                continue;
            };
            if !target.is_external() || has_reentrancy_guard(&input.facts, function) {
                continue;
            }
            let Some(other) = readers
                .get(variable.as_str())
                .and_then(|fs| fs.iter().find(|f| **f != function.as_str()))
            else {
                continue;
            };
            if !seen.insert((function.as_str(), *call_index, variable.as_str())) {
                continue;
            }

            detections.push(
                Detection::new(
                    call_location.clone(),
                    format!(
                        "`{}` calls {} before writing `{}`, which `{}` checks in a guard",
                        function,
                        target.describe(),
                        variable,
                        other
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
