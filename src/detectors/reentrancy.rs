//! # Reentrancy via External Call Detector
//!
//! @title State Change After Value Transfer
//! @author Ramprasad
//!
//! Detects functions that send ether to another account and afterwards
//! update a storage variable that was checked before the call. The check
//! is path-sensitive: the write only counts when it is reachable from the
//! call on some CFG path, so Checks-Effects-Interactions code that writes
//! unrelated state after the call is not reported.
//!
//! ## Vulnerability Pattern
//!
//! ```solidity
//! function withdraw(uint256 amount) external {
//!     require(balances[msg.sender] >= amount);
//!     (bool ok, ) = msg.sender.call{value: amount}("");
//!     require(ok);
//!     balances[msg.sender] -= amount; // written after the call
//! }
//! ```
//!
//! ## Secure Pattern
//!
//! ```solidity
//! function withdraw(uint256 amount) external nonReentrant {
//!     require(balances[msg.sender] >= amount);
//!     balances[msg.sender] -= amount;
//!     (bool ok, ) = msg.sender.call{value: amount}("");
//!     require(ok);
//! }
//! ```
//!
//! ## CWE Reference
//!
//! - CWE-841: Improper Enforcement of Behavioral Workflow

use super::access::has_reentrancy_guard;
use super::{Detection, RuleError, RuleInput, RuleScope, VulnerabilityDetector};
use crate::analysis::{Fact, FactKind};
use crate::report::{Confidence, Severity};
use std::collections::BTreeMap;

/// Detector for state writes that follow an ether-transferring call.
pub struct ReentrancyDetector;

impl VulnerabilityDetector for ReentrancyDetector {
    fn id(&self) -> &'static str {
        "reentrancy-external-call"
    }

    fn name(&self) -> &'static str {
        "Reentrancy: state change after external call"
    }

    fn description(&self) -> &'static str {
        "Detects ether transfers to external accounts that are followed, on some execution \
         path, by a write to state checked before the call."
    }

    fn severity(&self) -> Severity {
        Severity::High
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
        "Follow Checks-Effects-Interactions:\n\
         1. Validate inputs and balances\n\
         2. Update state before the external call\n\
         3. Make the external call last, or add a nonReentrant guard"
    }

    fn detect(&self, input: &RuleInput<'_>) -> Result<Vec<Detection>, RuleError> {
        // (function, call index) -> (call fact, variables written after it)
        let mut calls: BTreeMap<(&str, usize), (&Fact, Vec<&str>)> = BTreeMap::new();
        let mut partial = false;

        for fact in input.facts.of_kind(FactKind::WritesAfterExternalCall) {
            if input.deadline_passed() {
                partial = true;
                break;
            }
            let Fact::WritesAfterExternalCall {
                function,
                variable,
                call_index,
                eligibility_read: true,
                value_transfer: true,
                target,
                ..
            } = fact
            else {
                continue;
            };
            if !target.is_external() || has_reentrancy_guard(&input.facts, function) {
                continue;
            }

            calls
                .entry((function.as_str(), *call_index))
                .or_insert_with(|| (fact, Vec::new()))
                .1
                .push(variable);
        }

        let detections = calls
            .into_iter()
            .filter_map(|((function, _), (fact, variables))| {
                let Fact::WritesAfterExternalCall {
                    call_location,
                    target,
                    ..
                } = fact
                else {
                    return None;
                };
                let names = variables
                    .iter()
                    .map(|v| format!("`{}`", v))
                    .collect::<Vec<_>>()
                    .join(", ");

                let mut detection = Detection::new(
                    call_location.clone(),
                    format!(
                        "`{}` transfers ether to {} and writes {} afterwards; a reentrant call \
                         observes the stale value",
                        function,
                        target.describe(),
                        names
                    ),
                )
                .in_function(function)
                .subject(variables.join(","))
                .evidence(fact);

                if partial {
                    detection = detection.confidence(Confidence::Suspected);
                }
                Some(detection)
            })
            .collect();

        if partial {
            log::warn!(
                "Reentrancy search in {} stopped at the analysis deadline",
                input.unit.name
            );
        }
        Ok(detections)
    }
}
