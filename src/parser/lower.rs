//! # Contract Lowering
//!
//! @title Front-End Validation and Lowering
//! @author Ramprasad
//!
//! Validates a front-end contract node and lowers it into an immutable
//! [`ContractUnit`]: builds each body's CFG, resolves storage layout and
//! collects call sites. Malformed nodes are rejected with the JSON path of
//! the offending node so the front-end bug can be located.

use super::ast::{ContractNode, Expr, FunctionNode, Src, Stmt};
use super::Dialect;
use crate::analysis::cfg::{Cfg, NodeKind};
use crate::analysis::scope::{root_identifier, Binding, Scope};
use crate::analysis::{
    CallSite, CallTarget, ContractUnit, FunctionKind, FunctionUnit, ModifierInvocation,
    Parameter, SourceLocation, SourceRange, StateVariable, Visibility,
};
use std::collections::HashSet;
use thiserror::Error;

/// A contract whose front-end representation cannot be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed input in {file} at {path}: {message}")]
pub struct MalformedInputError {
    /// Source file the contract came from.
    pub file: String,

    /// Contract name when it could be read.
    pub contract: Option<String>,

    /// JSON path of the offending node (e.g. `contracts[0].functions[2].body[1]`).
    pub path: String,

    pub message: String,
}

/// Lowers the `index`-th contract of a source file.
///
/// # Arguments
///
/// * `file` - Source path reported by the front-end
/// * `dialect` - Dialect of the source file
/// * `index` - Position of the contract in the file's `contracts` array
/// * `value` - Raw JSON node of the contract
///
/// # Errors
///
/// Returns [`MalformedInputError`] when the node does not describe a valid contract.
pub fn lower_contract(
    file: &str,
    dialect: Dialect,
    index: usize,
    value: &serde_json::Value,
) -> Result<ContractUnit, MalformedInputError> {
    let base = format!("contracts[{}]", index);
    let contract_name = value
        .get("name")
        .and_then(|n| n.as_str())
        .map(str::to_string);

    let node: ContractNode =
        serde_json::from_value(value.clone()).map_err(|e| MalformedInputError {
            file: file.to_string(),
            contract: contract_name.clone(),
            path: base.clone(),
            message: e.to_string(),
        })?;

    Validator {
        file,
        contract: &node.name,
    }
    .contract(&node, &base)?;

    Ok(Lowering::new(file, dialect, &node).finish())
}

struct Validator<'a> {
    file: &'a str,
    contract: &'a str,
}

impl Validator<'_> {
    fn error(&self, path: &str, message: impl Into<String>) -> MalformedInputError {
        MalformedInputError {
            file: self.file.to_string(),
            contract: if self.contract.is_empty() {
                None
            } else {
                Some(self.contract.to_string())
            },
            path: path.to_string(),
            message: message.into(),
        }
    }

    fn contract(&self, node: &ContractNode, path: &str) -> Result<(), MalformedInputError> {
        if node.name.trim().is_empty() {
            return Err(self.error(&format!("{}.name", path), "contract name is empty"));
        }

        let mut seen = HashSet::new();
        for (i, var) in node.state_variables.iter().enumerate() {
            let var_path = format!("{}.state_variables[{}]", path, i);
            if var.name.trim().is_empty() {
                return Err(self.error(&var_path, "state variable name is empty"));
            }
            if !seen.insert(var.name.as_str()) {
                return Err(self.error(
                    &var_path,
                    format!("duplicate state variable `{}`", var.name),
                ));
            }
            if let Some(value) = &var.value {
                self.expr(value, &format!("{}.value", var_path))?;
            }
        }

        for (i, function) in node.functions.iter().enumerate() {
            self.function(function, &format!("{}.functions[{}]", path, i), false)?;
        }
        for (i, modifier) in node.modifiers.iter().enumerate() {
            self.function(modifier, &format!("{}.modifiers[{}]", path, i), true)?;
        }
        Ok(())
    }

    fn function(
        &self,
        node: &FunctionNode,
        path: &str,
        is_modifier: bool,
    ) -> Result<(), MalformedInputError> {
        let needs_name = is_modifier || node.kind == FunctionKind::Function;
        if needs_name && node.name.trim().is_empty() {
            return Err(self.error(&format!("{}.name", path), "function name is empty"));
        }
        if !is_modifier && node.kind == FunctionKind::Modifier {
            return Err(self.error(
                &format!("{}.kind", path),
                "modifier listed among functions",
            ));
        }
        for (i, modifier) in node.modifiers.iter().enumerate() {
            let mod_path = format!("{}.modifiers[{}]", path, i);
            if modifier.name.trim().is_empty() {
                return Err(self.error(&mod_path, "modifier invocation without a name"));
            }
            for (j, arg) in modifier.args.iter().enumerate() {
                self.expr(arg, &format!("{}.args[{}]", mod_path, j))?;
            }
        }
        if let Some(body) = &node.body {
            let ctx = StmtContext {
                loop_depth: 0,
                in_modifier: is_modifier,
            };
            self.block(body, &format!("{}.body", path), ctx)?;
        }
        Ok(())
    }

    fn block(
        &self,
        stmts: &[Stmt],
        path: &str,
        ctx: StmtContext,
    ) -> Result<(), MalformedInputError> {
        for (i, stmt) in stmts.iter().enumerate() {
            self.stmt(stmt, &format!("{}[{}]", path, i), ctx)?;
        }
        Ok(())
    }

    fn stmt(&self, stmt: &Stmt, path: &str, ctx: StmtContext) -> Result<(), MalformedInputError> {
        let in_loop = StmtContext {
            loop_depth: ctx.loop_depth + 1,
            ..ctx
        };
        match stmt {
            Stmt::Expression { expr, .. } => self.expr(expr, &format!("{}.expr", path)),
            Stmt::Emit { event, .. } => self.expr(event, &format!("{}.event", path)),
            Stmt::VarDecl { names, value, .. } => {
                if names.is_empty() {
                    return Err(self.error(path, "declaration without names"));
                }
                match value {
                    Some(value) => self.expr(value, &format!("{}.value", path)),
                    None => Ok(()),
                }
            }
            Stmt::If {
                condition,
                then,
                otherwise,
                ..
            } => {
                self.expr(condition, &format!("{}.condition", path))?;
                self.block(then, &format!("{}.then", path), ctx)?;
                match otherwise {
                    Some(stmts) => self.block(stmts, &format!("{}.else", path), ctx),
                    None => Ok(()),
                }
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
                ..
            } => {
                if let Some(init) = init {
                    self.stmt(init, &format!("{}.init", path), ctx)?;
                }
                if let Some(condition) = condition {
                    self.expr(condition, &format!("{}.condition", path))?;
                }
                if let Some(update) = update {
                    self.expr(update, &format!("{}.update", path))?;
                }
                self.block(body, &format!("{}.body", path), in_loop)
            }
            Stmt::While {
                condition, body, ..
            }
            | Stmt::DoWhile {
                condition, body, ..
            } => {
                self.expr(condition, &format!("{}.condition", path))?;
                self.block(body, &format!("{}.body", path), in_loop)
            }
            Stmt::Block { stmts, .. } | Stmt::Unchecked { stmts, .. } => {
                self.block(stmts, &format!("{}.stmts", path), ctx)
            }
            Stmt::Return { value, .. } => match value {
                Some(value) => self.expr(value, &format!("{}.value", path)),
                None => Ok(()),
            },
            Stmt::Revert { error, .. } => match error {
                Some(error) => self.expr(error, &format!("{}.error", path)),
                None => Ok(()),
            },
            Stmt::Break { .. } | Stmt::Continue { .. } if ctx.loop_depth == 0 => {
                Err(self.error(path, "break/continue outside of a loop"))
            }
            Stmt::Break { .. } | Stmt::Continue { .. } => Ok(()),
            Stmt::Placeholder { .. } if !ctx.in_modifier => {
                Err(self.error(path, "placeholder `_` outside of a modifier"))
            }
            Stmt::Placeholder { .. } => Ok(()),
        }
    }

    fn expr(&self, expr: &Expr, path: &str) -> Result<(), MalformedInputError> {
        match expr {
            Expr::Identifier { name, .. } if name.trim().is_empty() => {
                Err(self.error(path, "identifier with empty name"))
            }
            Expr::Member { base, member, .. } => {
                if member.trim().is_empty() {
                    return Err(self.error(&format!("{}.member", path), "member access without a name"));
                }
                self.expr(base, &format!("{}.base", path))
            }
            Expr::Index { base, index, .. } => {
                self.expr(base, &format!("{}.base", path))?;
                match index {
                    Some(index) => self.expr(index, &format!("{}.index", path)),
                    None => Ok(()),
                }
            }
            Expr::Call {
                callee,
                args,
                named_args,
                ..
            } => {
                self.expr(callee, &format!("{}.callee", path))?;
                for (i, arg) in args.iter().enumerate() {
                    self.expr(arg, &format!("{}.args[{}]", path, i))?;
                }
                for (i, arg) in named_args.iter().enumerate() {
                    self.expr(&arg.value, &format!("{}.named_args[{}].value", path, i))?;
                }
                Ok(())
            }
            Expr::Binary { left, right, .. } => {
                self.expr(left, &format!("{}.left", path))?;
                self.expr(right, &format!("{}.right", path))
            }
            Expr::Unary { operand, .. } => self.expr(operand, &format!("{}.operand", path)),
            Expr::Assign { target, value, .. } => {
                self.expr(target, &format!("{}.target", path))?;
                self.expr(value, &format!("{}.value", path))
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
                ..
            } => {
                self.expr(condition, &format!("{}.condition", path))?;
                self.expr(then, &format!("{}.then", path))?;
                self.expr(otherwise, &format!("{}.else", path))
            }
            Expr::Tuple { elements, .. } => {
                for (i, element) in elements.iter().enumerate() {
                    if let Some(element) = element {
                        self.expr(element, &format!("{}.elements[{}]", path, i))?;
                    }
                }
                Ok(())
            }
            Expr::Identifier { .. } | Expr::Literal { .. } => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StmtContext {
    loop_depth: usize,
    in_modifier: bool,
}

/// Builds the [`ContractUnit`] for an already validated node.
struct Lowering<'a> {
    file: &'a str,
    dialect: Dialect,
    node: &'a ContractNode,
    contract_line: usize,
}

impl<'a> Lowering<'a> {
    fn new(file: &'a str, dialect: Dialect, node: &'a ContractNode) -> Self {
        Self {
            file,
            dialect,
            node,
            contract_line: node.src.map(|s| s.line).unwrap_or(0),
        }
    }

    fn location(&self, src: Option<Src>, fallback_line: usize) -> SourceLocation {
        match src {
            Some(src) => SourceLocation::new(self.file, src.line, src.column),
            None => SourceLocation::new(self.file, fallback_line, 0),
        }
    }

    fn finish(self) -> ContractUnit {
        let state_variables = self.state_variables();
        let base_scope = Scope::for_state(
            state_variables
                .iter()
                .map(|v| (v.name.as_str(), v.type_name.as_str(), v.constant)),
        );

        let functions = self
            .node
            .functions
            .iter()
            .map(|f| self.function(f, &base_scope))
            .collect();
        let modifiers = self
            .node
            .modifiers
            .iter()
            .map(|m| {
                let mut unit = self.function(m, &base_scope);
                unit.kind = FunctionKind::Modifier;
                unit
            })
            .collect();

        let range = SourceRange {
            start_line: self.contract_line,
            end_line: self
                .node
                .src
                .and_then(|s| s.end_line)
                .unwrap_or(self.contract_line),
        };

        ContractUnit {
            name: self.node.name.clone(),
            file: self.file.to_string(),
            dialect: self.dialect,
            range,
            inherits: self.node.inherits.clone(),
            state_variables,
            functions,
            modifiers,
        }
    }

    fn state_variables(&self) -> Vec<StateVariable> {
        let mut next_slot = 0u64;
        self.node
            .state_variables
            .iter()
            .map(|var| {
                let stored = !var.constant && !var.immutable;
                let slot = if stored {
                    next_slot += 1;
                    Some(next_slot - 1)
                } else {
                    None
                };
                StateVariable {
                    name: var.name.clone(),
                    visibility: var.visibility.unwrap_or(Visibility::Internal),
                    explicit_visibility: var.visibility.is_some(),
                    type_name: var.type_name.clone(),
                    slot,
                    has_initializer: var.value.is_some(),
                    constant: var.constant || var.immutable,
                    location: self.location(var.src, self.contract_line),
                }
            })
            .collect()
    }

    fn function(&self, node: &FunctionNode, base_scope: &Scope) -> FunctionUnit {
        let location = self.location(node.src, self.contract_line);
        let body = node.body.as_deref().unwrap_or(&[]);
        let cfg = Cfg::build(body);

        let mut scope = base_scope.clone();
        for param in &node.parameters {
            scope.add_parameter(&param.name, &param.type_name);
        }
        scope.add_locals_from(body);

        let call_sites = self.call_sites(&cfg, &scope, location.line);

        let default_visibility = match (self.dialect, node.kind) {
            (_, FunctionKind::Modifier) => Visibility::Internal,
            (_, FunctionKind::Fallback | FunctionKind::Receive) => Visibility::External,
            (Dialect::Vyper, _) => Visibility::Internal,
            (Dialect::Solidity, _) => Visibility::Public,
        };

        FunctionUnit {
            name: if node.name.is_empty() {
                format!("{:?}", node.kind).to_lowercase()
            } else {
                node.name.clone()
            },
            kind: node.kind,
            visibility: node.visibility.unwrap_or(default_visibility),
            mutability: node.mutability,
            modifiers: node
                .modifiers
                .iter()
                .map(|m| ModifierInvocation {
                    name: m.name.clone(),
                    argument_roots: m
                        .args
                        .iter()
                        .map(|a| root_identifier(a).map(str::to_string))
                        .collect(),
                    location: self.location(m.src, location.line),
                })
                .collect(),
            parameters: node
                .parameters
                .iter()
                .map(|p| Parameter {
                    name: p.name.clone(),
                    type_name: p.type_name.clone(),
                })
                .collect(),
            cfg,
            call_sites,
            location,
        }
    }

    fn call_sites(&self, cfg: &Cfg, scope: &Scope, fallback_line: usize) -> Vec<CallSite> {
        let mut sites = Vec::new();

        for node in cfg.nodes() {
            let node_line = node.src.map(|s| s.line).unwrap_or(fallback_line);
            for expr in &node.exprs {
                expr.walk(&mut |e| {
                    let Some(shape) = self.dialect.classify_call(e, scope) else {
                        return;
                    };

                    let top_level = std::ptr::eq(e, expr);
                    let return_checked = if !shape.kind.returns_status()
                        || self.dialect.reverts_on_failure(e)
                    {
                        true
                    } else if top_level && node.discards_value {
                        false
                    } else if top_level && !node.declared.is_empty() {
                        status_consumed(cfg, node.id, node.declared.first().map(String::as_str))
                    } else {
                        match assigned_status_flag(e, expr) {
                            Some(flag) => status_consumed(cfg, node.id, Some(flag)),
                            None => true,
                        }
                    };

                    let fallback = SourceLocation::new(self.file, node_line, 0);
                    let location = e
                        .src()
                        .map(|s| SourceLocation::new(self.file, s.line, s.column))
                        .unwrap_or(fallback);

                    sites.push(CallSite {
                        kind: shape.kind,
                        target: self.classify_target(shape.target, scope),
                        value_transfer: shape.transfers_value(),
                        return_checked,
                        in_loop: node.loop_depth > 0,
                        node: node.id,
                        location,
                    });
                });
            }
        }

        sites
    }

    /// Attributes a call target to a named source without guessing addresses.
    fn classify_target(&self, expr: &Expr, scope: &Scope) -> CallTarget {
        if self.dialect.is_sender(expr) {
            return CallTarget::Sender;
        }
        if self.dialect.is_self_reference(expr) {
            return CallTarget::This;
        }
        if let Some(name) = self.dialect.state_reference(expr, scope) {
            return CallTarget::StateVariable(name.to_string());
        }

        match expr {
            // Address casts: payable(x), address(x), IVault(x)
            Expr::Call { callee, args, .. } if args.len() == 1 && callee.as_identifier().is_some() => {
                self.classify_target(&args[0], scope)
            }
            Expr::Identifier { name, .. } => match scope.bind(name) {
                Binding::Parameter => CallTarget::Parameter(name.clone()),
                Binding::Local => CallTarget::Local(name.clone()),
                _ => CallTarget::Unresolved,
            },
            Expr::Literal { value, .. } => CallTarget::Literal(value.clone()),
            Expr::Index { .. } | Expr::Member { .. } => {
                match self.dialect.state_root(expr, scope) {
                    Some(name) => CallTarget::StateVariable(name.to_string()),
                    None => CallTarget::Unresolved,
                }
            }
            _ => CallTarget::Unresolved,
        }
    }
}

/// Name of the local receiving the status flag in `(ok, ) = target.call(...)`.
fn assigned_status_flag<'e>(call: &Expr, root: &'e Expr) -> Option<&'e str> {
    match root {
        Expr::Assign { target, value, .. } if value.as_ref() == call => match target.as_ref() {
            Expr::Identifier { name, .. } => Some(name),
            Expr::Tuple { elements, .. } => elements
                .first()
                .and_then(|e| e.as_ref())
                .and_then(|e| e.as_identifier()),
            _ => None,
        },
        _ => None,
    }
}

/// Returns true when the status flag is read by some other node of the body.
fn status_consumed(cfg: &Cfg, defining: usize, flag: Option<&str>) -> bool {
    let Some(flag) = flag.filter(|f| !f.is_empty()) else {
        return false;
    };
    cfg.nodes()
        .iter()
        .filter(|n| n.id != defining && n.kind != NodeKind::Entry)
        .any(|n| {
            n.exprs
                .iter()
                .any(|e| e.any(&|x| x.as_identifier() == Some(flag)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::CallKind;
    use serde_json::json;

    fn withdraw_contract() -> serde_json::Value {
        json!({
            "name": "Bank",
            "src": { "line": 1, "end_line": 20 },
            "state_variables": [
                { "name": "balances", "type_name": "mapping(address => uint256)", "visibility": "public" },
                { "name": "FEE", "type_name": "uint256", "constant": true }
            ],
            "functions": [{
                "name": "withdraw",
                "visibility": "external",
                "src": { "line": 4 },
                "body": [
                    { "node": "var_decl", "names": ["ok", ""],
                      "value": { "node": "call",
                                 "callee": { "node": "member", "member": "call",
                                             "base": { "node": "member", "member": "sender",
                                                       "base": { "node": "identifier", "name": "msg" } } },
                                 "named_args": [ { "name": "value",
                                                   "value": { "node": "literal", "kind": "number", "value": "1" } } ],
                                 "src": { "line": 5, "column": 9 } },
                      "src": { "line": 5 } },
                    { "node": "expression",
                      "expr": { "node": "call", "callee": { "node": "identifier", "name": "require" },
                                "args": [ { "node": "identifier", "name": "ok" } ] },
                      "src": { "line": 6 } }
                ]
            }]
        })
    }

    #[test]
    fn test_lower_assigns_slots_and_visibility() {
        let unit = lower_contract("Bank.sol", Dialect::Solidity, 0, &withdraw_contract()).unwrap();

        assert_eq!(unit.name, "Bank");
        assert_eq!(unit.range.end_line, 20);
        assert_eq!(unit.state_variables[0].slot, Some(0));
        assert_eq!(unit.state_variables[1].slot, None);
        assert!(!unit.state_variables[1].explicit_visibility);
        assert_eq!(unit.functions[0].visibility, Visibility::External);
    }

    #[test]
    fn test_lower_collects_checked_value_call() {
        let unit = lower_contract("Bank.sol", Dialect::Solidity, 0, &withdraw_contract()).unwrap();
        let sites = &unit.functions[0].call_sites;

        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].kind, CallKind::Call);
        assert_eq!(sites[0].target, CallTarget::Sender);
        assert!(sites[0].value_transfer);
        assert!(sites[0].return_checked);
        assert_eq!(sites[0].location.line, 5);
        assert_eq!(sites[0].location.column, 9);
    }

    #[test]
    fn test_discarded_send_is_unchecked() {
        let value = json!({
            "name": "Payout",
            "functions": [{
                "name": "pay",
                "parameters": [ { "name": "to", "type_name": "address" } ],
                "body": [{
                    "node": "expression",
                    "expr": { "node": "call",
                              "callee": { "node": "member", "member": "send",
                                          "base": { "node": "identifier", "name": "to" } },
                              "args": [ { "node": "literal", "kind": "number", "value": "100" } ] }
                }]
            }]
        });
        let unit = lower_contract("Payout.sol", Dialect::Solidity, 0, &value).unwrap();
        let site = &unit.functions[0].call_sites[0];

        assert_eq!(site.kind, CallKind::Send);
        assert_eq!(site.target, CallTarget::Parameter("to".to_string()));
        assert!(!site.return_checked);
    }

    #[test]
    fn test_break_outside_loop_reports_node_path() {
        let value = json!({
            "name": "Broken",
            "functions": [{ "name": "f", "body": [
                { "node": "expression", "expr": { "node": "identifier", "name": "x" } },
                { "node": "break" }
            ]}]
        });
        let err = lower_contract("Broken.sol", Dialect::Solidity, 3, &value).unwrap_err();

        assert_eq!(err.path, "contracts[3].functions[0].body[1]");
        assert_eq!(err.contract.as_deref(), Some("Broken"));
    }

    #[test]
    fn test_undeserializable_contract_is_malformed() {
        let value = json!({ "name": "NoTypes", "state_variables": [ { "name": "x" } ] });
        let err = lower_contract("x.sol", Dialect::Solidity, 0, &value).unwrap_err();

        assert_eq!(err.path, "contracts[0]");
        assert!(err.message.contains("type_name"));
    }

    #[test]
    fn test_empty_member_name_is_malformed() {
        let value = json!({
            "name": "C",
            "functions": [{ "name": "f", "body": [
                { "node": "expression",
                  "expr": { "node": "member", "member": "", "base": { "node": "identifier", "name": "a" } } }
            ]}]
        });
        let err = lower_contract("c.sol", Dialect::Solidity, 0, &value).unwrap_err();
        assert_eq!(err.path, "contracts[0].functions[0].body[0].expr.member");
    }
}
