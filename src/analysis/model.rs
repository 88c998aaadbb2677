//! # Contract Units
//!
//! @title Lowered Contract Model
//! @author Ramprasad
//!
//! The immutable representation of one analyzed contract. A [`ContractUnit`]
//! is created once by the front-end lowering step and is never mutated
//! afterwards; the fact extractor and every rule only read from it.

use super::cfg::{Cfg, NodeId};
use crate::parser::Dialect;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A position inside an analyzed source file.
///
/// Ordered by file, line and column so findings sort deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Source file path as reported by the front-end.
    pub file: String,

    /// 1-indexed line number (0 when unknown).
    pub line: usize,

    /// 1-indexed column number (0 when unknown).
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.column > 0 {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}

/// Line span of a contract in its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceRange {
    pub start_line: usize,
    pub end_line: usize,
}

/// Function and state variable visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    External,
    Public,
    Internal,
    Private,
}

impl Visibility {
    /// Returns true when the function can be called by other accounts.
    pub fn is_entry_point(&self) -> bool {
        matches!(self, Visibility::External | Visibility::Public)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::External => "external",
            Visibility::Public => "public",
            Visibility::Internal => "internal",
            Visibility::Private => "private",
        }
    }
}

/// Function state mutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutability {
    Pure,
    View,
    Payable,
    #[default]
    Nonpayable,
}

/// Kind of callable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    #[default]
    Function,
    Constructor,
    Fallback,
    Receive,
    Modifier,
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub type_name: String,
}

/// A modifier applied in a function header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierInvocation {
    pub name: String,

    /// Root identifiers of each argument expression (`owner` for `onlyBy(owner)`).
    pub argument_roots: Vec<Option<String>>,

    pub location: SourceLocation,
}

/// Kind of control transfer out of the current contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Call,
    DelegateCall,
    StaticCall,
    Selfdestruct,
    Transfer,
    Send,
    /// Typed call on a contract reference (`token.transferFrom(...)`).
    HighLevel,
}

impl CallKind {
    /// Low-level calls report failure through a return value instead of reverting.
    pub fn returns_status(&self) -> bool {
        matches!(
            self,
            CallKind::Call | CallKind::DelegateCall | CallKind::StaticCall | CallKind::Send
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Call => "call",
            CallKind::DelegateCall => "delegatecall",
            CallKind::StaticCall => "staticcall",
            CallKind::Selfdestruct => "selfdestruct",
            CallKind::Transfer => "transfer",
            CallKind::Send => "send",
            CallKind::HighLevel => "high-level call",
        }
    }
}

/// Symbolic target of a call site.
///
/// The extractor never guesses addresses: anything it cannot attribute to a
/// named source stays [`CallTarget::Unresolved`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum CallTarget {
    Parameter(String),
    StateVariable(String),
    Local(String),
    Sender,
    This,
    Literal(String),
    Unresolved,
}

impl CallTarget {
    /// Returns true when the call leaves the current contract.
    pub fn is_external(&self) -> bool {
        !matches!(self, CallTarget::This)
    }

    pub fn describe(&self) -> String {
        match self {
            CallTarget::Parameter(name) => format!("parameter `{}`", name),
            CallTarget::StateVariable(name) => format!("state variable `{}`", name),
            CallTarget::Local(name) => format!("local `{}`", name),
            CallTarget::Sender => "msg.sender".to_string(),
            CallTarget::This => "this".to_string(),
            CallTarget::Literal(value) => value.clone(),
            CallTarget::Unresolved => "an unresolved address".to_string(),
        }
    }
}

/// An instruction that transfers control to another account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSite {
    pub kind: CallKind,
    pub target: CallTarget,

    /// Whether the call forwards ether.
    pub value_transfer: bool,

    /// Whether the success flag of a status-returning call is consumed.
    pub return_checked: bool,

    /// Whether the call sits inside a loop body.
    pub in_loop: bool,

    /// CFG node that performs the call.
    pub node: NodeId,

    pub location: SourceLocation,
}

/// A contract storage variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVariable {
    pub name: String,
    pub visibility: Visibility,

    /// False when the declaration relied on the default visibility.
    pub explicit_visibility: bool,

    pub type_name: String,

    /// Storage slot in declaration order; `None` for constants and immutables.
    pub slot: Option<u64>,

    pub has_initializer: bool,
    pub constant: bool,
    pub location: SourceLocation,
}

impl StateVariable {
    /// Returns true for dynamically sized arrays (`address[]`, `DynArray[...]`).
    pub fn is_dynamic_array(&self) -> bool {
        let ty = self.type_name.replace(' ', "");
        ty.ends_with("[]") || ty.starts_with("DynArray[")
    }
}

/// A function, constructor, fallback, receive or modifier body.
#[derive(Debug, Clone)]
pub struct FunctionUnit {
    pub name: String,
    pub kind: FunctionKind,
    pub visibility: Visibility,
    pub mutability: Mutability,
    pub modifiers: Vec<ModifierInvocation>,
    pub parameters: Vec<Parameter>,
    pub cfg: Cfg,
    pub call_sites: Vec<CallSite>,
    pub location: SourceLocation,
}

/// One analyzed contract.
#[derive(Debug, Clone)]
pub struct ContractUnit {
    pub name: String,
    pub file: String,
    pub dialect: Dialect,
    pub range: SourceRange,

    /// Base contracts by name, resolved by the front-end.
    pub inherits: Vec<String>,

    pub state_variables: Vec<StateVariable>,
    pub functions: Vec<FunctionUnit>,
    pub modifiers: Vec<FunctionUnit>,
}

impl ContractUnit {
    /// Location of the contract header.
    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(self.file.clone(), self.range.start_line, 0)
    }

    /// Functions followed by modifiers, in declaration order.
    pub fn callables(&self) -> impl Iterator<Item = &FunctionUnit> {
        self.functions.iter().chain(self.modifiers.iter())
    }
}
