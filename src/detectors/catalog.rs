//! Data-driven rules loaded from JSON.
//!
//! A catalog is an array of rule entries. Each entry names the facts it
//! needs and a declarative pattern: a fact kind, field values the fact must
//! carry and a message template. Matching facts become detections, so new
//! rules ship without recompiling the analyzer.
//!
//! ```json
//! [{
//!   "id": "weak-randomness",
//!   "title": "Randomness derived from block data",
//!   "severity": "medium",
//!   "required_facts": ["WeakRandomness"],
//!   "pattern": { "fact": "WeakRandomness", "message": "`{function}` hashes {source}" }
//! }]
//! ```

use super::{
    Detection, RegistryError, Rule, RuleError, RuleInput, RuleMeta, RuleRegistry, RuleScope,
};
use crate::analysis::{Fact, FactKind, Visibility};
use crate::report::{Confidence, Severity};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

/// Catalog embedded in the binary and loaded by [`RuleRegistry::standard`].
pub const DEFAULT_CATALOG: &str = include_str!("../../rules/catalog.json");

/// Errors raised while loading a rule catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read rule catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid rule catalog {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rule `{rule}` references unknown fact kind `{kind}`")]
    UnknownFactKind { rule: String, kind: String },

    #[error("rule `{rule}` has an invalid pattern: {message}")]
    InvalidPattern { rule: String, message: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogEntry {
    id: String,
    title: String,
    severity: Severity,
    #[serde(default)]
    required_facts: Vec<String>,
    #[serde(default)]
    confidence: Confidence,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    scope: RuleScope,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    remediation: Option<String>,
    #[serde(default)]
    cwe: Option<String>,
    pattern: PatternSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatternSpec {
    fact: String,
    #[serde(default)]
    in_guard: Option<bool>,
    #[serde(default, rename = "where")]
    fields: Map<String, Value>,
    #[serde(default)]
    visibilities: Vec<Visibility>,
    message: String,
}

/// Compiled form of a [`PatternSpec`].
#[derive(Debug, Clone)]
struct FactPattern {
    kind: FactKind,
    fields: Map<String, Value>,
    visibilities: Vec<Visibility>,
    message: String,
}

impl FactPattern {
    fn compile(rule: &str, spec: PatternSpec) -> Result<Self, CatalogError> {
        let kind = FactKind::from_name(&spec.fact).ok_or_else(|| CatalogError::UnknownFactKind {
            rule: rule.to_string(),
            kind: spec.fact.clone(),
        })?;
        if spec.message.trim().is_empty() {
            return Err(CatalogError::InvalidPattern {
                rule: rule.to_string(),
                message: "message must not be empty".to_string(),
            });
        }

        let mut fields = spec.fields;
        if let Some(in_guard) = spec.in_guard {
            fields.insert("in_guard".to_string(), Value::Bool(in_guard));
        }
        if fields.contains_key("fact") {
            return Err(CatalogError::InvalidPattern {
                rule: rule.to_string(),
                message: "`where` cannot constrain `fact`; use `pattern.fact`".to_string(),
            });
        }

        Ok(Self {
            kind,
            fields,
            visibilities: spec.visibilities,
            message: spec.message,
        })
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> Result<Vec<Detection>, RuleError> {
        let mut detections = Vec::new();

        for fact in input.facts.of_kind(self.kind) {
            let value = serde_json::to_value(fact)
                .map_err(|e| RuleError::InvalidPattern(e.to_string()))?;
            let Value::Object(object) = value else {
                return Err(RuleError::InvalidPattern(format!(
                    "{} does not serialize to an object",
                    self.kind
                )));
            };

            if !self
                .fields
                .iter()
                .all(|(k, v)| object.get(k).map_or(false, |actual| is_subset(v, actual)))
            {
                continue;
            }
            if !self.visibilities.is_empty() && !self.visibility_matches(input, fact) {
                continue;
            }

            let mut detection =
                Detection::new(fact.location().clone(), self.render(input, fact, &object))
                    .subject(fact.subject())
                    .evidence(fact);
            if let Some(function) = fact.function() {
                detection = detection.in_function(function);
            }
            detections.push(detection);
        }

        Ok(detections)
    }

    fn visibility_matches(&self, input: &RuleInput<'_>, fact: &Fact) -> bool {
        let visibility = match fact {
            Fact::StateVariableDeclared { visibility, .. }
            | Fact::FunctionDeclared { visibility, .. } => Some(*visibility),
            _ => fact.function().and_then(|f| match input.facts.declaration(f) {
                Some(Fact::FunctionDeclared { visibility, .. }) => Some(*visibility),
                _ => None,
            }),
        };
        visibility.map_or(false, |v| self.visibilities.contains(&v))
    }

    /// Replaces `{field}` placeholders with fact fields; `{contract}` is the unit name.
    fn render(&self, input: &RuleInput<'_>, fact: &Fact, object: &Map<String, Value>) -> String {
        let mut out = String::with_capacity(self.message.len());
        let mut rest = self.message.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                rest = "";
                break;
            };
            let key = &after[..close];
            match key {
                "contract" => out.push_str(&input.unit.name),
                "subject" => out.push_str(&fact.subject()),
                _ => match object.get(key) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(&other.to_string()),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                },
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        out
    }
}

/// Returns true when every field of `expected` is present with the same value in `actual`.
fn is_subset(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => e
            .iter()
            .all(|(k, v)| a.get(k).map_or(false, |av| is_subset(v, av))),
        _ => expected == actual,
    }
}

impl CatalogEntry {
    fn into_rule(self) -> Result<Rule, CatalogError> {
        if self.id.trim().is_empty() {
            return Err(CatalogError::InvalidPattern {
                rule: self.title,
                message: "rule id must not be empty".to_string(),
            });
        }

        let pattern = FactPattern::compile(&self.id, self.pattern)?;
        let mut required_facts = self
            .required_facts
            .iter()
            .map(|name| {
                FactKind::from_name(name).ok_or_else(|| CatalogError::UnknownFactKind {
                    rule: self.id.clone(),
                    kind: name.clone(),
                })
            })
            .collect::<Result<std::collections::BTreeSet<_>, _>>()?;
        required_facts.insert(pattern.kind);

        let meta = RuleMeta {
            description: self.description.unwrap_or_else(|| self.title.clone()),
            id: self.id,
            title: self.title,
            severity: self.severity,
            confidence: self.confidence,
            scope: self.scope,
            required_facts,
            group: self.group,
            remediation: self.remediation,
            cwe: self.cwe,
        };

        Ok(Rule::new(meta, move |input| pattern.evaluate(input)))
    }
}

/// Parses a catalog and registers its rules in file order.
///
/// `origin` names the catalog in error messages.
pub fn load_catalog_str(
    registry: &mut RuleRegistry,
    text: &str,
    origin: &str,
) -> Result<(), CatalogError> {
    let entries: Vec<CatalogEntry> =
        serde_json::from_str(text).map_err(|source| CatalogError::Parse {
            origin: origin.to_string(),
            source,
        })?;

    let count = entries.len();
    for entry in entries {
        registry.register(entry.into_rule()?)?;
    }
    log::debug!("Loaded {} rules from {}", count, origin);
    Ok(())
}

/// Reads a catalog file and registers its rules.
pub fn load_catalog_file(registry: &mut RuleRegistry, path: &Path) -> Result<(), CatalogError> {
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_catalog_str(registry, &text, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ContractFacts, SourceLocation};
    use crate::detectors::with_input;

    #[test]
    fn test_default_catalog_loads() {
        let mut registry = RuleRegistry::new();
        load_catalog_str(&mut registry, DEFAULT_CATALOG, "default").unwrap();

        assert_eq!(registry.len(), 4);
        let tx = registry.get("tx-origin-use").unwrap();
        assert_eq!(tx.meta().dedup_group(), "tx-origin-auth");
        let vis = registry.get("state-visibility-default").unwrap();
        assert_eq!(vis.meta().scope, RuleScope::CrossFunction);
    }

    #[test]
    fn test_unknown_fact_kind_is_rejected() {
        let text = r#"[{ "id": "x", "title": "X", "severity": "low",
            "pattern": { "fact": "Telepathy", "message": "m" } }]"#;
        let err = load_catalog_str(&mut RuleRegistry::new(), text, "test").unwrap_err();
        assert!(matches!(err, CatalogError::UnknownFactKind { .. }));
    }

    #[test]
    fn test_duplicate_catalog_id_is_rejected() {
        let mut registry = RuleRegistry::new();
        load_catalog_str(&mut registry, DEFAULT_CATALOG, "first").unwrap();
        let err = load_catalog_str(&mut registry, DEFAULT_CATALOG, "second").unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Registry(RegistryError::DuplicateRuleId(_))
        ));
    }

    #[test]
    fn test_pattern_filters_and_renders() {
        let text = r#"[{ "id": "guarded-time", "title": "T", "severity": "low",
            "pattern": { "fact": "UsesBlockTimestamp", "in_guard": true,
                         "message": "{contract}.{function} at guard ({missing})" } }]"#;
        let mut registry = RuleRegistry::new();
        load_catalog_str(&mut registry, text, "test").unwrap();

        let mut facts = ContractFacts::new("Auction");
        for (line, in_guard) in [(4, true), (9, false)] {
            facts.push(Fact::UsesBlockTimestamp {
                function: "bid".to_string(),
                in_guard,
                location: SourceLocation::new("Auction.sol", line, 8),
            });
        }

        let rule = registry.get("guarded-time").unwrap();
        let detections = with_input(&facts, |input| rule.evaluate(input)).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].message, "Auction.bid at guard ({missing})");
        assert_eq!(detections[0].location.line, 4);
    }
}
