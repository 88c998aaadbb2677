//! # Analysis Module
//!
//! @title Contract Model and Fact Extraction
//! @author Ramprasad
//!
//! This module holds the lowered contract model and turns it into the typed
//! facts consumed by rules.
//!
//! ## Components
//!
//! - **Model**: Immutable contract, function and call-site units
//! - **Control Flow**: Statement-level CFG per function body
//! - **Scope**: Name resolution for storage, parameters and locals
//! - **Facts**: Normalized observations and the extractor producing them

pub mod cfg;
pub mod extract;
pub mod facts;
pub mod model;
pub mod scope;

pub use cfg::{Cfg, CfgNode, NodeId, NodeKind};
pub use extract::extract;
pub use facts::{ContractFacts, Fact, FactKind, FactView, LoopBound};
pub use model::{
    CallKind, CallSite, CallTarget, ContractUnit, FunctionKind, FunctionUnit, ModifierInvocation,
    Mutability, Parameter, SourceLocation, SourceRange, StateVariable, Visibility,
};
