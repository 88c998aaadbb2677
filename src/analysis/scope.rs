//! Name resolution inside a single function body.

use super::model::{ContractUnit, FunctionUnit};
use crate::parser::ast::{Expr, Stmt};
use std::collections::{HashMap, HashSet};

/// What a name refers to at a given point of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    State,
    Parameter,
    Local,
    Unknown,
}

/// Names visible inside one function: storage, parameters and locals.
///
/// Resolution is flow-insensitive: a local declared anywhere in the body
/// shadows a state variable of the same name everywhere in that body.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    state: HashMap<String, StateEntry>,
    params: HashMap<String, String>,
    locals: HashSet<String>,
}

#[derive(Debug, Clone)]
struct StateEntry {
    type_name: String,
    constant: bool,
}

impl Scope {
    /// Starts a scope containing only the contract's storage.
    pub fn for_state<'a, I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, bool)>,
    {
        let state = vars
            .into_iter()
            .map(|(name, ty, constant)| {
                (
                    name.to_string(),
                    StateEntry {
                        type_name: ty.to_string(),
                        constant,
                    },
                )
            })
            .collect();
        Self {
            state,
            ..Self::default()
        }
    }

    /// Builds the scope of a lowered function.
    pub fn of_function(contract: &ContractUnit, function: &FunctionUnit) -> Self {
        let mut scope = Self::for_state(
            contract
                .state_variables
                .iter()
                .map(|v| (v.name.as_str(), v.type_name.as_str(), v.constant)),
        );
        for param in &function.parameters {
            scope.add_parameter(&param.name, &param.type_name);
        }
        for node in function.cfg.nodes() {
            for name in &node.declared {
                scope.add_local(name);
            }
        }
        scope
    }

    pub fn add_parameter(&mut self, name: &str, type_name: &str) {
        if !name.is_empty() {
            self.params.insert(name.to_string(), type_name.to_string());
        }
    }

    pub fn add_local(&mut self, name: &str) {
        if !name.is_empty() {
            self.locals.insert(name.to_string());
        }
    }

    /// Collects every local declared in a statement list, including nested blocks.
    pub fn add_locals_from(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            match stmt {
                Stmt::VarDecl { names, .. } => {
                    for name in names {
                        self.add_local(name);
                    }
                }
                Stmt::If {
                    then, otherwise, ..
                } => {
                    self.add_locals_from(then);
                    if let Some(otherwise) = otherwise {
                        self.add_locals_from(otherwise);
                    }
                }
                Stmt::For { init, body, .. } => {
                    if let Some(init) = init {
                        self.add_locals_from(std::slice::from_ref(init.as_ref()));
                    }
                    self.add_locals_from(body);
                }
                Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => {
                    self.add_locals_from(body)
                }
                Stmt::Block { stmts, .. } | Stmt::Unchecked { stmts, .. } => {
                    self.add_locals_from(stmts)
                }
                _ => {}
            }
        }
    }

    pub fn bind(&self, name: &str) -> Binding {
        if self.locals.contains(name) {
            Binding::Local
        } else if self.params.contains_key(name) {
            Binding::Parameter
        } else if self.state.contains_key(name) {
            Binding::State
        } else {
            Binding::Unknown
        }
    }

    /// Returns true if `name` is a storage variable at this point.
    pub fn is_state(&self, name: &str) -> bool {
        self.bind(name) == Binding::State
    }

    /// Returns true if `name` is a declared storage variable, ignoring shadowing.
    pub fn has_state(&self, name: &str) -> bool {
        self.state.contains_key(name)
    }

    pub fn is_constant(&self, name: &str) -> bool {
        self.state.get(name).map(|e| e.constant).unwrap_or(false)
    }

    /// Declared type of a visible name.
    pub fn type_of(&self, name: &str) -> Option<&str> {
        match self.bind(name) {
            Binding::Parameter => self.params.get(name).map(String::as_str),
            Binding::State => self.state.get(name).map(|e| e.type_name.as_str()),
            _ => None,
        }
    }

    /// Declared type of a storage variable, ignoring shadowing.
    pub fn type_of_state(&self, name: &str) -> Option<&str> {
        self.state.get(name).map(|e| e.type_name.as_str())
    }

    /// Returns true when the named storage variable is a dynamic array.
    pub fn is_dynamic_array(&self, name: &str) -> bool {
        self.state
            .get(name)
            .map(|e| {
                let ty = e.type_name.replace(' ', "");
                ty.ends_with("[]") || ty.starts_with("DynArray[")
            })
            .unwrap_or(false)
    }
}

/// Root identifier of an lvalue or access path (`balances` for `balances[a].x`).
pub fn root_identifier(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Identifier { name, .. } => Some(name),
        Expr::Index { base, .. } | Expr::Member { base, .. } => root_identifier(base),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_shadows_state() {
        let mut scope = Scope::for_state([("owner", "address", false), ("MAX", "uint256", true)]);
        scope.add_parameter("amount", "uint256");

        assert_eq!(scope.bind("owner"), Binding::State);
        assert_eq!(scope.bind("amount"), Binding::Parameter);
        assert!(scope.is_constant("MAX"));

        scope.add_local("owner");
        assert_eq!(scope.bind("owner"), Binding::Local);
        assert!(scope.has_state("owner"));
    }

    #[test]
    fn test_root_identifier_of_nested_access() {
        let expr: Expr = serde_json::from_str(
            r#"{ "node": "member", "member": "amount",
                 "base": { "node": "index",
                           "base": { "node": "identifier", "name": "deposits" },
                           "index": { "node": "identifier", "name": "user" } } }"#,
        )
        .unwrap();
        assert_eq!(root_identifier(&expr), Some("deposits"));
    }
}
