//! # Source Dialects
//!
//! @title Dialect-Specific Builtin Recognition
//! @author Ramprasad
//!
//! Each supported front-end dialect maps its builtins (low-level calls,
//! transaction globals, guard statements, storage access) onto the
//! normalized vocabulary used by the fact extractor. Adding a dialect means
//! adding a variant here; the engine and the rules do not change.
//!
//! | Concept | Solidity | Vyper |
//! |---------|----------|-------|
//! | storage access | `balances[x]` | `self.balances[x]` |
//! | low-level call | `to.call{value: v}(d)` | `raw_call(to, d, value=v)` |
//! | delegatecall | `impl.delegatecall(d)` | `raw_call(impl, d, is_delegate_call=True)` |
//! | ether send | `to.transfer(v)` / `to.send(v)` | `send(to, v)` |
//! | guard | `require(c)` / `assert(c)` | `assert c` |

use super::ast::{Expr, LiteralKind};
use crate::analysis::scope::{Binding, Scope};
use crate::analysis::CallKind;
use serde::{Deserialize, Serialize};

/// Source language of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Solidity,
    Vyper,
}

/// What a dialect front-end is able to provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub traverses_functions: bool,
    pub resolves_calls: bool,
    pub resolves_state_vars: bool,
}

/// Shape of a recognized call: its kind, target expression and forwarded value.
#[derive(Debug, Clone, Copy)]
pub struct CallShape<'e> {
    pub kind: CallKind,
    pub target: &'e Expr,
    pub value: Option<&'e Expr>,
}

impl CallShape<'_> {
    /// Returns true when the call forwards ether.
    pub fn transfers_value(&self) -> bool {
        match self.kind {
            CallKind::Selfdestruct | CallKind::Transfer | CallKind::Send => true,
            _ => self.value.map(|v| !v.is_zero_literal()).unwrap_or(false),
        }
    }
}

const ENTROPY_MEMBERS: [&str; 5] = ["timestamp", "difficulty", "prevrandao", "number", "coinbase"];

impl Dialect {
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Dialect::Solidity | Dialect::Vyper => Capabilities {
                traverses_functions: true,
                resolves_calls: true,
                resolves_state_vars: true,
            },
        }
    }

    /// Returns the storage variable named by `expr`, if it is a direct storage reference.
    pub fn state_reference<'e>(&self, expr: &'e Expr, scope: &Scope) -> Option<&'e str> {
        match (self, expr) {
            (Dialect::Solidity, Expr::Identifier { name, .. }) if scope.is_state(name) => {
                Some(name)
            }
            (Dialect::Vyper, Expr::Member { base, member, .. })
                if base.as_identifier() == Some("self") && scope.has_state(member) =>
            {
                Some(member)
            }
            _ => None,
        }
    }

    /// Storage variable at the root of an access path (`balances` in `balances[a].b`).
    pub fn state_root<'e>(&self, expr: &'e Expr, scope: &Scope) -> Option<&'e str> {
        if let Some(name) = self.state_reference(expr, scope) {
            return Some(name);
        }
        match expr {
            Expr::Index { base, .. } | Expr::Member { base, .. } => self.state_root(base, scope),
            _ => None,
        }
    }

    /// Returns true when the callee is an assertion whose failure reverts.
    pub fn is_guard_call(&self, callee: &Expr) -> bool {
        match (self, callee.as_identifier()) {
            (Dialect::Solidity, Some(name)) => name == "require" || name == "assert",
            (Dialect::Vyper, Some(name)) => name == "assert",
            _ => false,
        }
    }

    pub fn is_tx_origin(&self, expr: &Expr) -> bool {
        expr.is_member_of("tx", "origin")
    }

    /// Returns true for the immediate caller (`msg.sender`, `_msgSender()`).
    pub fn is_sender(&self, expr: &Expr) -> bool {
        if expr.is_member_of("msg", "sender") {
            return true;
        }
        match (self, expr) {
            (Dialect::Solidity, Expr::Call { callee, args, .. }) => {
                args.is_empty() && callee.as_identifier() == Some("_msgSender")
            }
            _ => false,
        }
    }

    pub fn is_self_reference(&self, expr: &Expr) -> bool {
        match self {
            Dialect::Solidity => expr.as_identifier() == Some("this"),
            Dialect::Vyper => expr.as_identifier() == Some("self"),
        }
    }

    /// Returns true for the block timestamp (`block.timestamp`, legacy `now`).
    pub fn is_timestamp(&self, expr: &Expr, scope: &Scope) -> bool {
        if expr.is_member_of("block", "timestamp") {
            return true;
        }
        match (self, expr.as_identifier()) {
            (Dialect::Solidity, Some("now")) => scope.bind("now") == Binding::Unknown,
            _ => false,
        }
    }

    /// Names the block-derived entropy source used by `expr`, if any.
    pub fn entropy_source(&self, expr: &Expr, scope: &Scope) -> Option<&'static str> {
        if let Expr::Member { base, member, .. } = expr {
            if base.as_identifier() == Some("block") {
                return ENTROPY_MEMBERS
                    .iter()
                    .find(|m| **m == member.as_str())
                    .map(|m| match *m {
                        "timestamp" => "block.timestamp",
                        "difficulty" => "block.difficulty",
                        "prevrandao" => "block.prevrandao",
                        "number" => "block.number",
                        _ => "block.coinbase",
                    });
            }
        }
        if let Expr::Call { callee, .. } = expr {
            if callee.as_identifier() == Some("blockhash")
                || callee.is_member_of("block", "blockhash")
            {
                return Some("blockhash");
            }
        }
        if self.is_timestamp(expr, scope) {
            return Some("block.timestamp");
        }
        None
    }

    /// Returns true for hashing builtins used to derive pseudo-random values.
    pub fn is_hash_call(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Call { callee, .. } => matches!(
                callee.as_identifier(),
                Some("keccak256") | Some("sha256") | Some("sha3")
            ),
            _ => false,
        }
    }

    /// Recognizes a call that transfers control out of the contract.
    pub fn classify_call<'e>(&self, expr: &'e Expr, scope: &Scope) -> Option<CallShape<'e>> {
        let Expr::Call { callee, args, .. } = expr else {
            return None;
        };

        match self {
            Dialect::Solidity => self.classify_solidity(expr, callee, args, scope),
            Dialect::Vyper => self.classify_vyper(expr, callee, args, scope),
        }
    }

    fn classify_solidity<'e>(
        &self,
        call: &'e Expr,
        callee: &'e Expr,
        args: &'e [Expr],
        scope: &Scope,
    ) -> Option<CallShape<'e>> {
        match callee {
            Expr::Identifier { name, .. } if name == "selfdestruct" || name == "suicide" => {
                args.first().map(|target| CallShape {
                    kind: CallKind::Selfdestruct,
                    target,
                    value: None,
                })
            }
            Expr::Member { base, member, .. } => {
                let kind = match member.as_str() {
                    "call" => Some(CallKind::Call),
                    "delegatecall" => Some(CallKind::DelegateCall),
                    "staticcall" => Some(CallKind::StaticCall),
                    _ => None,
                };
                if let Some(kind) = kind {
                    return Some(CallShape {
                        kind,
                        target: base,
                        value: call.named_arg("value"),
                    });
                }

                if (member == "transfer" || member == "send") && args.len() == 1 {
                    return Some(CallShape {
                        kind: if member == "transfer" {
                            CallKind::Transfer
                        } else {
                            CallKind::Send
                        },
                        target: base,
                        value: args.first(),
                    });
                }

                if self.is_contract_reference(base, scope) {
                    return Some(CallShape {
                        kind: CallKind::HighLevel,
                        target: base,
                        value: call.named_arg("value"),
                    });
                }
                None
            }
            // Legacy `to.call.value(v)(data)`
            Expr::Call {
                callee: inner,
                args: value_args,
                ..
            } => match inner.as_ref() {
                Expr::Member { base, member, .. } if member == "value" || member == "gas" => {
                    match base.as_ref() {
                        Expr::Member {
                            base: target,
                            member: kind,
                            ..
                        } if kind == "call" => Some(CallShape {
                            kind: CallKind::Call,
                            target,
                            value: if member == "value" {
                                value_args.first()
                            } else {
                                None
                            },
                        }),
                        _ => None,
                    }
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn classify_vyper<'e>(
        &self,
        call: &'e Expr,
        callee: &'e Expr,
        args: &'e [Expr],
        scope: &Scope,
    ) -> Option<CallShape<'e>> {
        match callee.as_identifier() {
            Some("raw_call") => {
                let target = args.first()?;
                let kind = if is_true_literal(call.named_arg("is_delegate_call")) {
                    CallKind::DelegateCall
                } else if is_true_literal(call.named_arg("is_static_call")) {
                    CallKind::StaticCall
                } else {
                    CallKind::Call
                };
                Some(CallShape {
                    kind,
                    target,
                    value: call.named_arg("value"),
                })
            }
            Some("send") if args.len() == 2 => Some(CallShape {
                kind: CallKind::Send,
                target: &args[0],
                value: args.get(1),
            }),
            Some("selfdestruct") => args.first().map(|target| CallShape {
                kind: CallKind::Selfdestruct,
                target,
                value: None,
            }),
            _ => match callee {
                Expr::Member { base, .. } if self.is_contract_reference(base, scope) => {
                    Some(CallShape {
                        kind: CallKind::HighLevel,
                        target: base,
                        value: call.named_arg("value"),
                    })
                }
                _ => None,
            },
        }
    }

    /// Returns true when a low-level call reverts by itself on failure.
    pub fn reverts_on_failure(&self, call: &Expr) -> bool {
        match self {
            Dialect::Solidity => false,
            Dialect::Vyper => !is_false_literal(call.named_arg("revert_on_failure")),
        }
    }

    /// Returns true when `expr` denotes another contract (`IERC20(token)`, `token` of type `IERC20`).
    fn is_contract_reference(&self, expr: &Expr, scope: &Scope) -> bool {
        match expr {
            Expr::Call { callee, args, .. } if args.len() == 1 => callee
                .as_identifier()
                .map(is_type_name)
                .unwrap_or(false),
            Expr::Identifier { name, .. } => {
                scope.type_of(name).map(is_type_name).unwrap_or(false)
            }
            Expr::Member { .. } => match self.state_reference(expr, scope) {
                Some(name) => scope.type_of_state(name).map(is_type_name).unwrap_or(false),
                None => false,
            },
            _ => false,
        }
    }
}

/// Contract and interface names start with an uppercase letter.
fn is_type_name(name: &str) -> bool {
    name.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false)
        && !matches!(name, "DynArray" | "HashMap" | "String" | "Bytes")
}

fn is_true_literal(expr: Option<&Expr>) -> bool {
    matches!(expr, Some(Expr::Literal { kind: LiteralKind::Bool, value, .. }) if value.eq_ignore_ascii_case("true"))
}

fn is_false_literal(expr: Option<&Expr>) -> bool {
    matches!(expr, Some(Expr::Literal { kind: LiteralKind::Bool, value, .. }) if value.eq_ignore_ascii_case("false"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(json: &str) -> Expr {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_solidity_value_call() {
        let scope = Scope::default();
        let call = expr(
            r#"{ "node": "call",
                 "callee": { "node": "member", "member": "call",
                             "base": { "node": "member", "member": "sender",
                                       "base": { "node": "identifier", "name": "msg" } } },
                 "named_args": [ { "name": "value", "value": { "node": "identifier", "name": "amount" } } ] }"#,
        );

        let shape = Dialect::Solidity.classify_call(&call, &scope).unwrap();
        assert_eq!(shape.kind, CallKind::Call);
        assert!(shape.transfers_value());
        assert!(Dialect::Solidity.is_sender(shape.target));
    }

    #[test]
    fn test_token_transfer_is_not_ether_transfer() {
        let mut scope = Scope::default();
        scope.add_parameter("token", "IERC20");
        let call = expr(
            r#"{ "node": "call",
                 "callee": { "node": "member", "member": "transfer",
                             "base": { "node": "identifier", "name": "token" } },
                 "args": [ { "node": "identifier", "name": "to" },
                           { "node": "identifier", "name": "amount" } ] }"#,
        );

        let shape = Dialect::Solidity.classify_call(&call, &scope).unwrap();
        assert_eq!(shape.kind, CallKind::HighLevel);
        assert!(!shape.transfers_value());
    }

    #[test]
    fn test_vyper_raw_call_delegate() {
        let scope = Scope::default();
        let call = expr(
            r#"{ "node": "call",
                 "callee": { "node": "identifier", "name": "raw_call" },
                 "args": [ { "node": "identifier", "name": "target" },
                           { "node": "identifier", "name": "data" } ],
                 "named_args": [ { "name": "is_delegate_call",
                                   "value": { "node": "literal", "kind": "bool", "value": "True" } } ] }"#,
        );

        let shape = Dialect::Vyper.classify_call(&call, &scope).unwrap();
        assert_eq!(shape.kind, CallKind::DelegateCall);
        assert!(Dialect::Vyper.reverts_on_failure(&call));
    }

    #[test]
    fn test_vyper_storage_reference() {
        let scope = Scope::for_state([("owner", "address", false)]);
        let access = expr(
            r#"{ "node": "member", "member": "owner", "base": { "node": "identifier", "name": "self" } }"#,
        );
        assert_eq!(Dialect::Vyper.state_reference(&access, &scope), Some("owner"));
        assert_eq!(Dialect::Solidity.state_reference(&access, &scope), None);
    }
}
