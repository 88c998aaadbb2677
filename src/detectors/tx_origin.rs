//! # tx.origin Authorization Detector
//!
//! @title Authorization Through tx.origin
//! @author Ramprasad
//!
//! Detects guards that authorize the transaction originator instead of the
//! immediate caller. A malicious contract called by the owner passes such a
//! check.
//!
//! ## Vulnerability Pattern
//!
//! ```solidity
//! function transferTo(address to, uint256 amount) external {
//!     require(tx.origin == owner);
//!     payable(to).transfer(amount);
//! }
//! ```
//!
//! ## CWE Reference
//!
//! - CWE-477: Use of Obsolete Function

use super::{Detection, RuleError, RuleInput, VulnerabilityDetector};
use crate::analysis::{Fact, FactKind};
use crate::report::Severity;

/// Detector for `tx.origin` used in an authorization guard.
pub struct TxOriginAuthDetector;

impl VulnerabilityDetector for TxOriginAuthDetector {
    fn id(&self) -> &'static str {
        "tx-origin-auth"
    }

    fn name(&self) -> &'static str {
        "Authorization through tx.origin"
    }

    fn description(&self) -> &'static str {
        "Detects require/if guards that compare tx.origin instead of msg.sender."
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn required_facts(&self) -> &'static [FactKind] {
        &[FactKind::UsesTxOrigin]
    }

    fn cwe(&self) -> Option<&'static str> {
        Some("CWE-477")
    }

    fn remediation(&self) -> &'static str {
        "Authorize msg.sender instead of tx.origin."
    }

    fn detect(&self, input: &RuleInput<'_>) -> Result<Vec<Detection>, RuleError> {
        Ok(input
            .facts
            .of_kind(FactKind::UsesTxOrigin)
            .filter_map(|fact| match fact {
                Fact::UsesTxOrigin {
                    function,
                    in_guard: true,
                    compared_to_sender: false,
                    location,
                } => Some(
                    Detection::new(
                        location.clone(),
                        format!("`{}` authorizes the caller with tx.origin", function),
                    )
                    .in_function(function)
                    .subject("tx.origin")
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

    fn origin(in_guard: bool, compared_to_sender: bool, line: usize) -> Fact {
        Fact::UsesTxOrigin {
            function: "transferTo".to_string(),
            in_guard,
            compared_to_sender,
            location: SourceLocation::new("Wallet.sol", line, 8),
        }
    }

    #[test]
    fn test_origin_guard_is_reported() {
        let mut facts = ContractFacts::new("Wallet");
        facts.push(origin(true, false, 5));
        facts.push(origin(false, false, 9));
        facts.push(origin(true, true, 12));

        let detections = with_input(&facts, |input| TxOriginAuthDetector.detect(input)).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].location.line, 5);
    }
}
