//! Typed observations about one contract.
//!
//! Facts are the only thing rules read. They are produced once per contract
//! by [`extract`](super::extract::extract) and shared read-only between every
//! rule evaluation of that contract.

use super::model::{CallSite, CallTarget, FunctionKind, Mutability, SourceLocation, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How a loop's termination condition is bounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum LoopBound {
    /// Compared against a numeric literal (`i < 10`).
    Literal(String),
    /// Compared against a constant state variable (`i < MAX_BATCH`).
    Constant(String),
    /// Compared against the length of a storage dynamic array (`i < users.length`).
    StateArrayLength(String),
    /// Compared against a caller-supplied parameter.
    Parameter(String),
    Unknown,
}

impl LoopBound {
    /// Returns true when the bound is fixed at compile time.
    pub fn is_static(&self) -> bool {
        matches!(self, LoopBound::Literal(_) | LoopBound::Constant(_))
    }
}

/// A normalized observation derived from a contract's structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fact")]
pub enum Fact {
    FunctionDeclared {
        function: String,
        kind: FunctionKind,
        visibility: Visibility,
        mutability: Mutability,
        modifiers: Vec<String>,
        location: SourceLocation,
    },
    StateVariableDeclared {
        variable: String,
        type_name: String,
        visibility: Visibility,
        explicit_visibility: bool,
        dynamic_array: bool,
        has_initializer: bool,
        constant: bool,
        slot: Option<u64>,
        location: SourceLocation,
    },
    ExternalCall {
        function: String,
        /// Position of the call site in its function.
        index: usize,
        call: CallSite,
    },
    StateRead {
        function: String,
        variable: String,
        /// Read inside a `require`/`assert` argument or a branch/loop condition.
        in_guard: bool,
        /// Read flows into the value of an ether-transferring call.
        feeds_value: bool,
        /// Local through which the read happened, if indirect.
        via: Option<String>,
        location: SourceLocation,
    },
    StateWrite {
        function: String,
        variable: String,
        location: SourceLocation,
    },
    WritesAfterExternalCall {
        function: String,
        variable: String,
        call_index: usize,
        call_location: SourceLocation,
        write_location: SourceLocation,
        /// The variable was checked in a guard before the call or fed its value.
        eligibility_read: bool,
        value_transfer: bool,
        target: CallTarget,
    },
    UsesTxOrigin {
        function: String,
        in_guard: bool,
        compared_to_sender: bool,
        location: SourceLocation,
    },
    UsesBlockTimestamp {
        function: String,
        in_guard: bool,
        location: SourceLocation,
    },
    WeakRandomness {
        function: String,
        source: String,
        location: SourceLocation,
    },
    Loop {
        function: String,
        bound: LoopBound,
        /// A `break` is guarded by a comparison against a fixed value.
        bounded_break: bool,
        location: SourceLocation,
    },
    ModifierApplied {
        function: String,
        modifier: String,
        location: SourceLocation,
    },
    ModifierGuard {
        modifier: String,
        /// A guard of the modifier reads contract storage.
        reads_state: bool,
        /// A guard of the modifier involves the immediate caller.
        checks_sender: bool,
        /// The caller is compared against a modifier parameter and never against storage.
        sender_compared_to_parameter: bool,
        location: SourceLocation,
    },
    SenderGuard {
        function: String,
        /// The caller is checked against storage rather than a parameter.
        against_state: bool,
        location: SourceLocation,
    },
}

/// Discriminant of [`Fact`], used for rule requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FactKind {
    FunctionDeclared,
    StateVariableDeclared,
    ExternalCall,
    StateRead,
    StateWrite,
    WritesAfterExternalCall,
    UsesTxOrigin,
    UsesBlockTimestamp,
    WeakRandomness,
    Loop,
    ModifierApplied,
    ModifierGuard,
    SenderGuard,
}

impl FactKind {
    pub const ALL: [FactKind; 13] = [
        FactKind::FunctionDeclared,
        FactKind::StateVariableDeclared,
        FactKind::ExternalCall,
        FactKind::StateRead,
        FactKind::StateWrite,
        FactKind::WritesAfterExternalCall,
        FactKind::UsesTxOrigin,
        FactKind::UsesBlockTimestamp,
        FactKind::WeakRandomness,
        FactKind::Loop,
        FactKind::ModifierApplied,
        FactKind::ModifierGuard,
        FactKind::SenderGuard,
    ];

    /// Parses the identifier used in rule catalogs.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.to_string() == name)
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Fact {
    pub fn kind(&self) -> FactKind {
        match self {
            Fact::FunctionDeclared { .. } => FactKind::FunctionDeclared,
            Fact::StateVariableDeclared { .. } => FactKind::StateVariableDeclared,
            Fact::ExternalCall { .. } => FactKind::ExternalCall,
            Fact::StateRead { .. } => FactKind::StateRead,
            Fact::StateWrite { .. } => FactKind::StateWrite,
            Fact::WritesAfterExternalCall { .. } => FactKind::WritesAfterExternalCall,
            Fact::UsesTxOrigin { .. } => FactKind::UsesTxOrigin,
            Fact::UsesBlockTimestamp { .. } => FactKind::UsesBlockTimestamp,
            Fact::WeakRandomness { .. } => FactKind::WeakRandomness,
            Fact::Loop { .. } => FactKind::Loop,
            Fact::ModifierApplied { .. } => FactKind::ModifierApplied,
            Fact::ModifierGuard { .. } => FactKind::ModifierGuard,
            Fact::SenderGuard { .. } => FactKind::SenderGuard,
        }
    }

    /// Function (or modifier) the fact belongs to; `None` for contract-level facts.
    pub fn function(&self) -> Option<&str> {
        match self {
            Fact::StateVariableDeclared { .. } => None,
            Fact::ModifierGuard { modifier, .. } => Some(modifier),
            Fact::FunctionDeclared { function, .. }
            | Fact::ExternalCall { function, .. }
            | Fact::StateRead { function, .. }
            | Fact::StateWrite { function, .. }
            | Fact::WritesAfterExternalCall { function, .. }
            | Fact::UsesTxOrigin { function, .. }
            | Fact::UsesBlockTimestamp { function, .. }
            | Fact::WeakRandomness { function, .. }
            | Fact::Loop { function, .. }
            | Fact::ModifierApplied { function, .. }
            | Fact::SenderGuard { function, .. } => Some(function),
        }
    }

    pub fn location(&self) -> &SourceLocation {
        match self {
            Fact::ExternalCall { call, .. } => &call.location,
            Fact::WritesAfterExternalCall { call_location, .. } => call_location,
            Fact::FunctionDeclared { location, .. }
            | Fact::StateVariableDeclared { location, .. }
            | Fact::StateRead { location, .. }
            | Fact::StateWrite { location, .. }
            | Fact::UsesTxOrigin { location, .. }
            | Fact::UsesBlockTimestamp { location, .. }
            | Fact::WeakRandomness { location, .. }
            | Fact::Loop { location, .. }
            | Fact::ModifierApplied { location, .. }
            | Fact::ModifierGuard { location, .. }
            | Fact::SenderGuard { location, .. } => location,
        }
    }

    /// Line-independent description of what the fact is about.
    pub fn subject(&self) -> String {
        match self {
            Fact::FunctionDeclared { function, .. } => function.clone(),
            Fact::StateVariableDeclared { variable, .. }
            | Fact::StateRead { variable, .. }
            | Fact::StateWrite { variable, .. }
            | Fact::WritesAfterExternalCall { variable, .. } => variable.clone(),
            Fact::ExternalCall { call, .. } => {
                format!("{}:{}", call.kind.as_str(), call.target.describe())
            }
            Fact::UsesTxOrigin { .. } => "tx.origin".to_string(),
            Fact::UsesBlockTimestamp { .. } => "block.timestamp".to_string(),
            Fact::WeakRandomness { source, .. } => source.clone(),
            Fact::Loop { bound, .. } => format!("loop:{:?}", bound),
            Fact::ModifierApplied { modifier, .. } | Fact::ModifierGuard { modifier, .. } => {
                modifier.clone()
            }
            Fact::SenderGuard { .. } => "msg.sender".to_string(),
        }
    }
}

/// Every fact extracted from one contract.
#[derive(Debug, Clone, Default)]
pub struct ContractFacts {
    pub contract: String,
    facts: Vec<Fact>,
    kinds: BTreeSet<FactKind>,
}

impl ContractFacts {
    pub fn new(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            ..Self::default()
        }
    }

    /// Adds a fact unless an identical one is already present.
    pub fn push(&mut self, fact: Fact) {
        if !self.facts.contains(&fact) {
            self.kinds.insert(fact.kind());
            self.facts.push(fact);
        }
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn kinds(&self) -> &BTreeSet<FactKind> {
        &self.kinds
    }

    pub fn has_kind(&self, kind: FactKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// All facts of the contract.
    pub fn view(&self) -> FactView<'_> {
        FactView {
            function: None,
            facts: self.facts.iter().collect(),
        }
    }

    /// Facts scoped to one function plus the contract-level facts.
    pub fn function_view<'a>(&'a self, function: &'a str) -> FactView<'a> {
        FactView {
            function: Some(function),
            facts: self
                .facts
                .iter()
                .filter(|f| f.function().map_or(true, |name| name == function))
                .collect(),
        }
    }
}

/// Read-only slice of a contract's facts handed to a rule.
#[derive(Debug, Clone)]
pub struct FactView<'a> {
    function: Option<&'a str>,
    facts: Vec<&'a Fact>,
}

impl<'a> FactView<'a> {
    /// Function this view is scoped to, `None` for the whole contract.
    pub fn function(&self) -> Option<&'a str> {
        self.function
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Fact> + '_ {
        self.facts.iter().copied()
    }

    pub fn of_kind(&self, kind: FactKind) -> impl Iterator<Item = &'a Fact> + '_ {
        self.iter().filter(move |f| f.kind() == kind)
    }

    pub fn has_kind(&self, kind: FactKind) -> bool {
        self.facts.iter().any(|f| f.kind() == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Declaration fact of a function, when present in this view.
    pub fn declaration(&self, function: &str) -> Option<&'a Fact> {
        self.iter().find(|f| {
            matches!(f, Fact::FunctionDeclared { function: name, .. } if name == function)
        })
    }
}
