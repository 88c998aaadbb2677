//! # Vulnerability Detector Module
//!
//! @title Rule Registry and Built-in Detectors
//! @author Ramprasad
//!
//! This module provides the rule framework and the built-in detectors. A
//! [`Rule`] is a record of metadata plus a pure evaluation closure; rules
//! live in a flat [`RuleRegistry`] keyed by id. Native detectors implement
//! [`VulnerabilityDetector`] and are wrapped into rules, while data-driven
//! rules come from a JSON [`catalog`].
//!
//! ## Built-in Detectors
//!
//! | ID | Scope | Severity |
//! |----|-------|----------|
//! | reentrancy-external-call | cross-function | High |
//! | cross-function-reentrancy | cross-function | Medium |
//! | tx-origin-auth | local | High |
//! | unbounded-loop | local | Medium |
//! | unchecked-low-level-call | local | Medium |
//! | external-call-in-loop | local | Medium |
//! | delegatecall-user-target | local | High |
//! | unprotected-selfdestruct | cross-function | Critical |
//! | unprotected-privileged-write | cross-function | High |
//! | modifier-checks-parameter | cross-function | High |

pub mod access;
pub mod catalog;

mod call_in_loop;
mod cross_function_reentrancy;
mod delegatecall_target;
mod modifier_parameter;
mod privileged_write;
mod reentrancy;
mod selfdestruct;
mod tx_origin;
mod unbounded_loop;
mod unchecked_call;

pub use call_in_loop::ExternalCallInLoopDetector;
pub use cross_function_reentrancy::CrossFunctionReentrancyDetector;
pub use delegatecall_target::DelegatecallTargetDetector;
pub use modifier_parameter::ModifierChecksParameterDetector;
pub use privileged_write::PrivilegedWriteDetector;
pub use reentrancy::ReentrancyDetector;
pub use selfdestruct::UnprotectedSelfdestructDetector;
pub use tx_origin::TxOriginAuthDetector;
pub use unbounded_loop::UnboundedLoopDetector;
pub use unchecked_call::UncheckedCallDetector;

use crate::analysis::{ContractUnit, Fact, FactKind, FactView, SourceLocation};
use crate::report::{Confidence, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Whether a rule looks at one function or at the whole contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleScope {
    /// Evaluated once per function against that function's facts.
    #[default]
    Local,
    /// Evaluated once per contract after every local rule finished.
    CrossFunction,
}

impl RuleScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleScope::Local => "local",
            RuleScope::CrossFunction => "cross-function",
        }
    }
}

/// Static description of a rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleMeta {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub confidence: Confidence,
    pub scope: RuleScope,
    pub required_facts: BTreeSet<FactKind>,

    /// Rules sharing a group deduplicate against each other.
    pub group: Option<String>,

    pub remediation: Option<String>,
    pub cwe: Option<String>,
}

impl RuleMeta {
    /// Deduplication group, the rule id when none is set.
    pub fn dedup_group(&self) -> &str {
        self.group.as_deref().unwrap_or(&self.id)
    }
}

/// Everything a rule may look at while evaluating one contract or function.
#[derive(Debug, Clone)]
pub struct RuleInput<'a> {
    pub unit: &'a ContractUnit,

    /// Function-scoped view for local rules, whole-contract view otherwise.
    pub facts: FactView<'a>,

    /// Contract analysis deadline; heuristic rules stop early when it passes.
    pub deadline: Option<Instant>,
}

impl RuleInput<'_> {
    pub fn deadline_passed(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

/// A rule match before it becomes a [`Finding`](crate::report::Finding).
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub function: Option<String>,
    pub location: SourceLocation,
    pub message: String,

    /// Line-independent subject fed into the fingerprint.
    pub subject: String,

    pub evidence: Vec<Fact>,

    /// Overrides the rule's default confidence.
    pub confidence: Option<Confidence>,
}

impl Detection {
    pub fn new(location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            function: None,
            location,
            message: message.into(),
            subject: String::new(),
            evidence: Vec::new(),
            confidence: None,
        }
    }

    pub fn in_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn evidence(mut self, fact: &Fact) -> Self {
        self.evidence.push(fact.clone());
        self
    }

    pub fn confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Failure of a single rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("rule failed: {0}")]
    Failed(String),

    #[error("rule panicked: {0}")]
    Panicked(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

/// Configuration error raised while building the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate rule id `{0}`")]
    DuplicateRuleId(String),
}

/// Pure evaluation closure of a rule.
pub type RuleEvaluator =
    Arc<dyn Fn(&RuleInput<'_>) -> Result<Vec<Detection>, RuleError> + Send + Sync>;

/// Trait for implementing native vulnerability detectors.
///
/// Detectors are converted into [`Rule`]s with [`Rule::from_detector`].
///
/// # Example Implementation
///
/// ```rust,ignore
/// pub struct MyDetector;
///
/// impl VulnerabilityDetector for MyDetector {
///     fn id(&self) -> &'static str { "my-rule" }
///     fn name(&self) -> &'static str { "My Vulnerability" }
///     fn description(&self) -> &'static str { "Detects my vulnerability" }
///     fn severity(&self) -> Severity { Severity::High }
///     fn required_facts(&self) -> &'static [FactKind] { &[FactKind::ExternalCall] }
///     fn remediation(&self) -> &'static str { "Fix the issue" }
///
///     fn detect(&self, input: &RuleInput) -> Result<Vec<Detection>, RuleError> {
///         Ok(Vec::new())
///     }
/// }
/// ```
pub trait VulnerabilityDetector: Send + Sync {
    /// Returns the unique identifier for this detector.
    fn id(&self) -> &'static str;

    /// Returns the human-readable name of the vulnerability.
    fn name(&self) -> &'static str;

    /// Returns a detailed description of what this detector looks for.
    fn description(&self) -> &'static str;

    /// Returns the default severity level for findings from this detector.
    fn severity(&self) -> Severity;

    /// Returns the default confidence of findings from this detector.
    fn confidence(&self) -> Confidence {
        Confidence::Proven
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Local
    }

    /// Fact kinds the detector needs; it is skipped when none are present.
    fn required_facts(&self) -> &'static [FactKind];

    /// Runs the detector against one contract or function.
    ///
    /// Must tolerate an empty fact view by returning no detections.
    fn detect(&self, input: &RuleInput<'_>) -> Result<Vec<Detection>, RuleError>;

    /// Returns the CWE (Common Weakness Enumeration) ID if applicable.
    fn cwe(&self) -> Option<&'static str> {
        None
    }

    /// Returns remediation advice for addressing this vulnerability.
    fn remediation(&self) -> &'static str;
}

/// A registered rule: metadata plus its evaluator.
#[derive(Clone)]
pub struct Rule {
    meta: RuleMeta,
    evaluator: RuleEvaluator,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("meta", &self.meta).finish()
    }
}

impl Rule {
    pub fn new<F>(meta: RuleMeta, evaluator: F) -> Self
    where
        F: Fn(&RuleInput<'_>) -> Result<Vec<Detection>, RuleError> + Send + Sync + 'static,
    {
        Self {
            meta,
            evaluator: Arc::new(evaluator),
        }
    }

    /// Wraps a native detector.
    pub fn from_detector<D: VulnerabilityDetector + 'static>(detector: D) -> Self {
        let meta = RuleMeta {
            id: detector.id().to_string(),
            title: detector.name().to_string(),
            description: detector.description().to_string(),
            severity: detector.severity(),
            confidence: detector.confidence(),
            scope: detector.scope(),
            required_facts: detector.required_facts().iter().copied().collect(),
            group: None,
            remediation: Some(detector.remediation().to_string()),
            cwe: detector.cwe().map(str::to_string),
        };
        Self::new(meta, move |input| detector.detect(input))
    }

    pub fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn evaluate(&self, input: &RuleInput<'_>) -> Result<Vec<Detection>, RuleError> {
        (self.evaluator)(input)
    }

    /// Returns true when the rule should run given the fact kinds present.
    pub fn applies_to(&self, present: &BTreeSet<FactKind>) -> bool {
        self.meta.required_facts.is_empty()
            || self.meta.required_facts.iter().any(|k| present.contains(k))
    }
}

/// Registry containing every rule, in registration order.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = RuleRegistry::with_builtin_rules()?;
/// registry.register(my_rule)?;
/// for rule in registry.rules_requiring(FactKind::Loop) {
///     println!("{}", rule.id());
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in detector.
    pub fn with_builtin_rules() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        let rules = [
            Rule::from_detector(ReentrancyDetector),
            Rule::from_detector(CrossFunctionReentrancyDetector),
            Rule::from_detector(TxOriginAuthDetector),
            Rule::from_detector(UnboundedLoopDetector),
            Rule::from_detector(UncheckedCallDetector),
            Rule::from_detector(ExternalCallInLoopDetector),
            Rule::from_detector(DelegatecallTargetDetector),
            Rule::from_detector(UnprotectedSelfdestructDetector),
            Rule::from_detector(PrivilegedWriteDetector),
            Rule::from_detector(ModifierChecksParameterDetector),
        ];
        for rule in rules {
            registry.register(rule)?;
        }
        Ok(registry)
    }

    /// Built-in detectors followed by the embedded default catalog.
    pub fn standard() -> Result<Self, catalog::CatalogError> {
        let mut registry = Self::with_builtin_rules()?;
        catalog::load_catalog_str(&mut registry, catalog::DEFAULT_CATALOG, "built-in catalog")?;
        Ok(registry)
    }

    /// Adds a rule.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateRuleId`] if the id is already registered.
    pub fn register(&mut self, rule: Rule) -> Result<(), RegistryError> {
        if self.get(rule.id()).is_some() {
            return Err(RegistryError::DuplicateRuleId(rule.id().to_string()));
        }
        log::debug!("Registered rule {}", rule.id());
        self.rules.push(rule);
        Ok(())
    }

    /// Returns all registered rules in registration order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Retrieves a rule by its ID.
    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id() == id)
    }

    /// Registration position of a rule, used as the deduplication tie-break.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.id() == id)
    }

    /// Rules whose required facts include `kind`, in registration order.
    pub fn rules_requiring(&self, kind: FactKind) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.meta.required_facts.contains(&kind))
            .collect()
    }

    /// Rules worth evaluating given the fact kinds present.
    pub fn rules_requiring_any(&self, present: &BTreeSet<FactKind>) -> Vec<&Rule> {
        self.rules.iter().filter(|r| r.applies_to(present)).collect()
    }

    /// Keeps only the selected rules; `only` wins over `exclude` when both name a rule.
    pub fn retain_selected(&mut self, only: &[String], exclude: &[String]) {
        let matches = |list: &[String], id: &str| list.iter().any(|s| s.eq_ignore_ascii_case(id));
        self.rules.retain(|r| {
            if !only.is_empty() {
                return matches(only, r.id());
            }
            !matches(exclude, r.id())
        });
    }
}

/// Builds a rule input over a bare contract for detector tests.
#[cfg(test)]
pub(crate) fn with_input<R>(
    facts: &crate::analysis::ContractFacts,
    run: impl FnOnce(&RuleInput<'_>) -> R,
) -> R {
    let unit = crate::parser::lower_contract(
        "A.sol",
        crate::parser::Dialect::Solidity,
        0,
        &serde_json::json!({ "name": facts.contract }),
    )
    .unwrap();
    let input = RuleInput {
        unit: &unit,
        facts: facts.view(),
        deadline: None,
    };
    run(&input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(id: &str, required: &[FactKind]) -> Rule {
        let meta = RuleMeta {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            severity: Severity::Low,
            confidence: Confidence::Proven,
            scope: RuleScope::Local,
            required_facts: required.iter().copied().collect(),
            group: None,
            remediation: None,
            cwe: None,
        };
        Rule::new(meta, |_| Ok(Vec::new()))
    }

    #[test]
    fn test_registry_creation() {
        let registry = RuleRegistry::with_builtin_rules().unwrap();
        assert_eq!(registry.len(), 10);
    }

    #[test]
    fn test_duplicate_rule_id_is_rejected() {
        let mut registry = RuleRegistry::new();
        registry.register(stub("a", &[])).unwrap();
        assert_eq!(
            registry.register(stub("a", &[])),
            Err(RegistryError::DuplicateRuleId("a".to_string()))
        );
    }

    #[test]
    fn test_rules_requiring_keeps_registration_order() {
        let mut registry = RuleRegistry::new();
        registry.register(stub("b", &[FactKind::Loop])).unwrap();
        registry.register(stub("a", &[FactKind::StateRead])).unwrap();
        registry
            .register(stub("c", &[FactKind::Loop, FactKind::StateRead]))
            .unwrap();

        let ids: Vec<_> = registry
            .rules_requiring(FactKind::Loop)
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_standard_registry_includes_catalog() {
        let registry = RuleRegistry::standard().unwrap();
        assert!(registry.get("weak-randomness").is_some());
        assert!(registry.get("reentrancy-external-call").is_some());
    }

    #[test]
    fn test_retain_selected() {
        let mut registry = RuleRegistry::with_builtin_rules().unwrap();
        registry.retain_selected(&[], &["tx-origin-auth".to_string()]);
        assert!(registry.get("tx-origin-auth").is_none());

        registry.retain_selected(&["unbounded-loop".to_string()], &[]);
        assert_eq!(registry.len(), 1);
    }
}
