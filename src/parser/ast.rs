//! # Front-End Syntax Tree
//!
//! @title Contract AST Nodes
//! @author Ramprasad
//!
//! Serde model of the syntax tree emitted by the external front-end
//! (a compiler AST export or an independent parser). Every node is tagged
//! with a `node` field and may carry a `src` position pointing back into
//! the original contract source.
//!
//! ## Example
//!
//! ```json
//! { "node": "call",
//!   "callee": { "node": "member", "base": { "node": "identifier", "name": "to" }, "member": "call" },
//!   "named_args": [ { "name": "value", "value": { "node": "identifier", "name": "amount" } } ],
//!   "src": { "line": 12 } }
//! ```

use crate::analysis::{FunctionKind, Mutability, Visibility};
use serde::{Deserialize, Serialize};

/// Position of a node in the original source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Src {
    /// 1-indexed line.
    pub line: usize,

    /// 1-indexed column, 0 when unknown.
    #[serde(default)]
    pub column: usize,

    /// Last line spanned by the node.
    #[serde(default)]
    pub end_line: Option<usize>,
}

/// Kind of a literal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralKind {
    Number,
    Bool,
    String,
    Address,
    Hex,
}

/// Named argument of a call: Solidity call options (`{value: x}`) or
/// Vyper keyword arguments (`value=x`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedArg {
    pub name: String,
    pub value: Expr,
}

/// Expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Expr {
    Identifier {
        name: String,
        #[serde(default)]
        src: Option<Src>,
    },
    Literal {
        kind: LiteralKind,
        value: String,
        #[serde(default)]
        src: Option<Src>,
    },
    Member {
        base: Box<Expr>,
        member: String,
        #[serde(default)]
        src: Option<Src>,
    },
    Index {
        base: Box<Expr>,
        #[serde(default)]
        index: Option<Box<Expr>>,
        #[serde(default)]
        src: Option<Src>,
    },
    Call {
        callee: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        named_args: Vec<NamedArg>,
        #[serde(default)]
        src: Option<Src>,
    },
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default)]
        src: Option<Src>,
    },
    Unary {
        op: String,
        operand: Box<Expr>,
        #[serde(default)]
        src: Option<Src>,
    },
    Assign {
        #[serde(default = "default_assign_op")]
        op: String,
        target: Box<Expr>,
        value: Box<Expr>,
        #[serde(default)]
        src: Option<Src>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        #[serde(rename = "else")]
        otherwise: Box<Expr>,
        #[serde(default)]
        src: Option<Src>,
    },
    Tuple {
        #[serde(default)]
        elements: Vec<Option<Expr>>,
        #[serde(default)]
        src: Option<Src>,
    },
}

fn default_assign_op() -> String {
    "=".to_string()
}

impl Expr {
    /// Returns the source position attached to this node, if any.
    pub fn src(&self) -> Option<Src> {
        match self {
            Expr::Identifier { src, .. }
            | Expr::Literal { src, .. }
            | Expr::Member { src, .. }
            | Expr::Index { src, .. }
            | Expr::Call { src, .. }
            | Expr::Binary { src, .. }
            | Expr::Unary { src, .. }
            | Expr::Assign { src, .. }
            | Expr::Conditional { src, .. }
            | Expr::Tuple { src, .. } => *src,
        }
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Identifier { .. } | Expr::Literal { .. } => Vec::new(),
            Expr::Member { base, .. } => vec![base.as_ref()],
            Expr::Index { base, index, .. } => {
                let mut out = vec![base.as_ref()];
                if let Some(index) = index {
                    out.push(index.as_ref());
                }
                out
            }
            Expr::Call {
                callee,
                args,
                named_args,
                ..
            } => {
                let mut out = vec![callee.as_ref()];
                out.extend(named_args.iter().map(|a| &a.value));
                out.extend(args.iter());
                out
            }
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Unary { operand, .. } => vec![operand.as_ref()],
            Expr::Assign { target, value, .. } => vec![value.as_ref(), target.as_ref()],
            Expr::Conditional {
                condition,
                then,
                otherwise,
                ..
            } => vec![condition.as_ref(), then.as_ref(), otherwise.as_ref()],
            Expr::Tuple { elements, .. } => elements.iter().flatten().collect(),
        }
    }

    /// Visits this expression and all descendants in pre-order.
    pub fn walk<'a, F: FnMut(&'a Expr)>(&'a self, f: &mut F) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Returns true if any node in the subtree satisfies `pred`.
    pub fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|c| c.any(pred))
    }

    /// Identifier name when this node is a bare identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Expr::Identifier { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns true for `base.member` where `base` is the identifier `object`.
    pub fn is_member_of(&self, object: &str, field: &str) -> bool {
        match self {
            Expr::Member { base, member, .. } => {
                member == field && base.as_identifier() == Some(object)
            }
            _ => false,
        }
    }

    /// Returns the named argument `name` of a call node.
    pub fn named_arg(&self, name: &str) -> Option<&Expr> {
        match self {
            Expr::Call { named_args, .. } => {
                named_args.iter().find(|a| a.name == name).map(|a| &a.value)
            }
            _ => None,
        }
    }

    /// Returns true for numeric literals equal to zero.
    pub fn is_zero_literal(&self) -> bool {
        matches!(
            self,
            Expr::Literal { kind: LiteralKind::Number, value, .. }
                if value.trim_start_matches("0x").chars().all(|c| c == '0' || c == '_')
        )
    }
}

/// Statement node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Stmt {
    Expression {
        expr: Expr,
        #[serde(default)]
        src: Option<Src>,
    },
    VarDecl {
        names: Vec<String>,
        #[serde(default)]
        type_name: Option<String>,
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        src: Option<Src>,
    },
    If {
        condition: Expr,
        #[serde(default)]
        then: Vec<Stmt>,
        #[serde(default, rename = "else")]
        otherwise: Option<Vec<Stmt>>,
        #[serde(default)]
        src: Option<Src>,
    },
    For {
        #[serde(default)]
        init: Option<Box<Stmt>>,
        #[serde(default)]
        condition: Option<Expr>,
        #[serde(default)]
        update: Option<Expr>,
        #[serde(default)]
        body: Vec<Stmt>,
        #[serde(default)]
        src: Option<Src>,
    },
    While {
        condition: Expr,
        #[serde(default)]
        body: Vec<Stmt>,
        #[serde(default)]
        src: Option<Src>,
    },
    DoWhile {
        condition: Expr,
        #[serde(default)]
        body: Vec<Stmt>,
        #[serde(default)]
        src: Option<Src>,
    },
    Block {
        #[serde(default)]
        stmts: Vec<Stmt>,
        #[serde(default)]
        src: Option<Src>,
    },
    Unchecked {
        #[serde(default)]
        stmts: Vec<Stmt>,
        #[serde(default)]
        src: Option<Src>,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        src: Option<Src>,
    },
    Break {
        #[serde(default)]
        src: Option<Src>,
    },
    Continue {
        #[serde(default)]
        src: Option<Src>,
    },
    Emit {
        event: Expr,
        #[serde(default)]
        src: Option<Src>,
    },
    Revert {
        #[serde(default)]
        error: Option<Expr>,
        #[serde(default)]
        src: Option<Src>,
    },
    Placeholder {
        #[serde(default)]
        src: Option<Src>,
    },
}

impl Stmt {
    /// Returns the source position attached to this statement, if any.
    pub fn src(&self) -> Option<Src> {
        match self {
            Stmt::Expression { src, .. }
            | Stmt::VarDecl { src, .. }
            | Stmt::If { src, .. }
            | Stmt::For { src, .. }
            | Stmt::While { src, .. }
            | Stmt::DoWhile { src, .. }
            | Stmt::Block { src, .. }
            | Stmt::Unchecked { src, .. }
            | Stmt::Return { src, .. }
            | Stmt::Break { src }
            | Stmt::Continue { src }
            | Stmt::Emit { src, .. }
            | Stmt::Revert { src, .. }
            | Stmt::Placeholder { src } => *src,
        }
    }
}

/// State variable declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateVariableNode {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub constant: bool,
    #[serde(default)]
    pub immutable: bool,
    #[serde(default)]
    pub value: Option<Expr>,
    #[serde(default)]
    pub src: Option<Src>,
}

/// Function parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterNode {
    #[serde(default)]
    pub name: String,
    pub type_name: String,
}

/// Modifier invocation on a function header (`onlyOwner`, `auth(msg.sender)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifierInvocationNode {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Expr>,
    #[serde(default)]
    pub src: Option<Src>,
}

/// Function or modifier definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionNode {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: FunctionKind,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub mutability: Mutability,
    #[serde(default)]
    pub modifiers: Vec<ModifierInvocationNode>,
    #[serde(default)]
    pub parameters: Vec<ParameterNode>,
    /// `None` for declarations without a body (interfaces, abstract functions).
    #[serde(default)]
    pub body: Option<Vec<Stmt>>,
    #[serde(default)]
    pub src: Option<Src>,
}

/// Contract, library or interface definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractNode {
    pub name: String,
    #[serde(default)]
    pub inherits: Vec<String>,
    #[serde(default)]
    pub state_variables: Vec<StateVariableNode>,
    #[serde(default)]
    pub functions: Vec<FunctionNode>,
    #[serde(default)]
    pub modifiers: Vec<FunctionNode>,
    #[serde(default)]
    pub src: Option<Src>,
}
