//! Access-control and reentrancy-guard helpers shared by detectors.

use crate::analysis::{Fact, FactView};

/// Name fragments of modifiers that conventionally restrict the caller.
const ACCESS_MODIFIER_HINTS: [&str; 7] = [
    "only",
    "auth",
    "admin",
    "owner",
    "role",
    "governance",
    "governor",
];

/// Name fragments of reentrancy guards.
const REENTRANCY_GUARD_HINTS: [&str; 4] = ["nonreentrant", "reentrancy", "lock", "mutex"];

/// State variable names that hold privileged roles.
const PRIVILEGED_VARIABLE_HINTS: [&str; 7] = [
    "owner",
    "admin",
    "governance",
    "governor",
    "operator",
    "guardian",
    "implementation",
];

fn contains_any(name: &str, hints: &[&str]) -> bool {
    let lower = name.to_lowercase();
    hints.iter().any(|h| lower.contains(h))
}

pub fn is_access_modifier_name(name: &str) -> bool {
    contains_any(name, &ACCESS_MODIFIER_HINTS)
}

pub fn is_reentrancy_guard_name(name: &str) -> bool {
    contains_any(name, &REENTRANCY_GUARD_HINTS)
}

pub fn is_privileged_variable(name: &str) -> bool {
    contains_any(name, &PRIVILEGED_VARIABLE_HINTS)
}

/// Modifiers applied to `function`.
pub fn modifiers_of<'a>(facts: &FactView<'a>, function: &str) -> Vec<&'a str> {
    facts
        .iter()
        .filter_map(|f| match f {
            Fact::ModifierApplied {
                function: name,
                modifier,
                ..
            } if name == function => Some(modifier.as_str()),
            _ => None,
        })
        .collect()
}

/// Guard summary of a modifier defined in this contract.
fn modifier_guard<'a>(facts: &FactView<'a>, modifier: &str) -> Option<&'a Fact> {
    facts.iter().find(
        |f| matches!(f, Fact::ModifierGuard { modifier: name, .. } if name == modifier),
    )
}

/// Returns true when applying `modifier` restricts the caller against storage.
///
/// Modifiers defined in the contract are judged by their body; inherited
/// ones (no definition available) by their name.
pub fn modifier_grants_access(facts: &FactView<'_>, modifier: &str) -> bool {
    match modifier_guard(facts, modifier) {
        Some(Fact::ModifierGuard {
            reads_state,
            checks_sender,
            sender_compared_to_parameter,
            ..
        }) => {
            (*checks_sender && *reads_state)
                || (is_access_modifier_name(modifier) && !*sender_compared_to_parameter)
        }
        _ => is_access_modifier_name(modifier),
    }
}

/// Returns true when `function` restricts its caller through a modifier or
/// an inline `msg.sender` check against storage.
pub fn has_access_control(facts: &FactView<'_>, function: &str) -> bool {
    let via_modifier = modifiers_of(facts, function)
        .into_iter()
        .any(|m| modifier_grants_access(facts, m));

    via_modifier
        || facts.iter().any(|f| {
            matches!(
                f,
                Fact::SenderGuard { function: name, against_state: true, .. } if name == function
            )
        })
}

/// Returns true when `function` carries a reentrancy guard modifier.
pub fn has_reentrancy_guard(facts: &FactView<'_>, function: &str) -> bool {
    modifiers_of(facts, function)
        .into_iter()
        .any(is_reentrancy_guard_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ContractFacts, SourceLocation};

    fn loc() -> SourceLocation {
        SourceLocation::new("A.sol", 1, 0)
    }

    fn applied(function: &str, modifier: &str) -> Fact {
        Fact::ModifierApplied {
            function: function.to_string(),
            modifier: modifier.to_string(),
            location: loc(),
        }
    }

    #[test]
    fn test_inherited_modifier_judged_by_name() {
        let mut facts = ContractFacts::new("A");
        facts.push(applied("withdraw", "onlyOwner"));
        facts.push(applied("deposit", "whenNotPaused"));

        let view = facts.view();
        assert!(has_access_control(&view, "withdraw"));
        assert!(!has_access_control(&view, "deposit"));
    }

    #[test]
    fn test_parameter_modifier_grants_nothing() {
        let mut facts = ContractFacts::new("A");
        facts.push(applied("setOwner", "onlyBy"));
        facts.push(Fact::ModifierGuard {
            modifier: "onlyBy".to_string(),
            reads_state: false,
            checks_sender: true,
            sender_compared_to_parameter: true,
            location: loc(),
        });

        assert!(!has_access_control(&facts.view(), "setOwner"));
    }

    #[test]
    fn test_reentrancy_guard_names() {
        assert!(is_reentrancy_guard_name("nonReentrant"));
        assert!(is_reentrancy_guard_name("withLock"));
        assert!(!is_reentrancy_guard_name("onlyOwner"));
        assert!(is_privileged_variable("pendingOwner"));
    }
}
