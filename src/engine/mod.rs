//! # Analysis Engine
//!
//! @title Rule Scheduling and Finding Aggregation
//! @author Ramprasad
//!
//! Runs every registered rule against every contract and turns the
//! resulting detections into deduplicated [`Finding`]s.
//!
//! ## Pipeline per Contract
//!
//! 1. Extract the contract's facts once
//! 2. Run local rules per function, in parallel, against function-scoped views
//! 3. Wait for all local rules of the contract to finish
//! 4. Run cross-function rules against the whole-contract view
//! 5. Deduplicate by (group, contract, function, location)
//!
//! A rule that fails or panics becomes a `rule-execution-error` finding and
//! never stops the other rules. Each contract gets an optional time budget
//! checked between rule evaluations, and a [`CancellationToken`] is checked
//! before each contract starts.

use crate::analysis::{extract, ContractUnit, FactKind, SourceLocation};
use crate::detectors::{Detection, Rule, RuleError, RuleInput, RuleRegistry, RuleScope};
use crate::parser::{LoadedFile, MalformedInputError};
use crate::report::{
    diagnostics, fingerprint, occurrence_fingerprint, Finding, Report, Severity,
};
use crate::suppression::SuppressionOutcome;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Engine settings, usually built from command-line flags.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Evaluate contracts and functions on the rayon pool.
    pub parallel: bool,

    /// Worker threads; 0 uses rayon's global pool.
    pub threads: usize,

    /// Wall-clock budget per contract.
    pub contract_budget: Option<Duration>,

    /// Findings below this severity are left out of reports.
    pub min_severity: Severity,

    /// When non-empty, only these rule ids run.
    pub only: Vec<String>,

    pub exclude: Vec<String>,

    /// Keep suppressed findings in the report.
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            threads: 0,
            contract_budget: None,
            min_severity: Severity::Low,
            only: Vec::new(),
            exclude: Vec::new(),
            verbose: false,
        }
    }
}

/// Cooperative cancellation flag shared between the caller and the engine.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Findings of one engine run, before suppression.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    pub findings: Vec<Finding>,

    /// Contracts lowered successfully and analyzed to completion or timeout.
    pub contracts_analyzed: usize,

    pub contracts_skipped: usize,
}

enum ContractInput<'a> {
    Unit(&'a ContractUnit),
    Malformed(&'a MalformedInputError),
}

/// Evaluates a [`RuleRegistry`] over lowered contracts.
///
/// # Example
///
/// ```rust,ignore
/// let engine = AnalysisEngine::new(RuleRegistry::standard()?, EngineConfig::default());
/// let outcome = engine.analyze(&files, &CancellationToken::new(), |_| {});
/// ```
#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    registry: RuleRegistry,
    config: EngineConfig,
}

impl AnalysisEngine {
    /// Creates an engine, applying the config's rule selection to `registry`.
    pub fn new(mut registry: RuleRegistry, config: EngineConfig) -> Self {
        registry.retain_selected(&config.only, &config.exclude);
        log::debug!("Engine configured with {} rules", registry.len());
        Self { registry, config }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Analyzes every contract of every file.
    ///
    /// `on_contract` is called with the contract name after each contract
    /// finishes; it may be called from several threads.
    pub fn analyze<F>(
        &self,
        files: &[LoadedFile],
        cancel: &CancellationToken,
        on_contract: F,
    ) -> AnalysisOutcome
    where
        F: Fn(&str) + Sync,
    {
        let inputs: Vec<ContractInput<'_>> = files
            .iter()
            .flat_map(|file| file.units.iter())
            .map(|unit| match unit {
                Ok(unit) => ContractInput::Unit(unit),
                Err(err) => ContractInput::Malformed(err),
            })
            .collect();

        let run = || -> Vec<(Vec<Finding>, bool)> {
            let analyze_one = |input: &ContractInput<'_>| {
                let result = self.analyze_input(input, cancel);
                on_contract(match input {
                    ContractInput::Unit(unit) => unit.name.as_str(),
                    ContractInput::Malformed(err) => err.contract.as_deref().unwrap_or(&err.path),
                });
                result
            };
            if self.config.parallel {
                inputs.par_iter().map(analyze_one).collect()
            } else {
                inputs.iter().map(analyze_one).collect()
            }
        };

        let results = if self.config.parallel && self.config.threads > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.threads)
                .build()
            {
                Ok(pool) => pool.install(run),
                Err(e) => {
                    log::warn!("Cannot build a {}-thread pool: {}", self.config.threads, e);
                    run()
                }
            }
        } else {
            run()
        };

        let mut outcome = AnalysisOutcome::default();
        for (findings, analyzed) in results {
            if analyzed {
                outcome.contracts_analyzed += 1;
            } else {
                outcome.contracts_skipped += 1;
            }
            outcome.findings.extend(findings);
        }

        log::info!(
            "Analyzed {} contract(s), {} skipped, {} finding(s)",
            outcome.contracts_analyzed,
            outcome.contracts_skipped,
            outcome.findings.len()
        );
        outcome
    }

    fn analyze_input(
        &self,
        input: &ContractInput<'_>,
        cancel: &CancellationToken,
    ) -> (Vec<Finding>, bool) {
        match input {
            ContractInput::Malformed(err) => {
                log::warn!("{}", err);
                (vec![malformed_finding(err)], false)
            }
            ContractInput::Unit(unit) if cancel.is_cancelled() => {
                log::debug!("Skipping {} after cancellation", unit.name);
                let finding = Finding::diagnostic(
                    diagnostics::ANALYSIS_CANCELLED,
                    &unit.name,
                    unit.location(),
                    &unit.name,
                    format!("analysis of `{}` was cancelled before it started", unit.name),
                );
                (vec![finding], false)
            }
            ContractInput::Unit(unit) => (self.analyze_contract(unit), true),
        }
    }

    /// Runs every applicable rule against one contract and deduplicates the result.
    pub fn analyze_contract(&self, unit: &ContractUnit) -> Vec<Finding> {
        let started = Instant::now();
        let deadline = self.config.contract_budget.map(|budget| started + budget);
        let timed_out = AtomicBool::new(false);

        let facts = extract(unit);
        log::debug!("{}: {} facts", unit.name, facts.len());

        let (local, cross): (Vec<&Rule>, Vec<&Rule>) = self
            .registry
            .rules_requiring_any(facts.kinds())
            .into_iter()
            .partition(|r| r.meta().scope == RuleScope::Local);

        let run_function = |name: &str| -> Vec<Finding> {
            let view = facts.function_view(name);
            let present: BTreeSet<FactKind> = view.iter().map(|f| f.kind()).collect();
            let mut findings = Vec::new();

            for rule in local.iter().filter(|r| r.applies_to(&present)) {
                if over_budget(deadline, &timed_out) {
                    break;
                }
                let input = RuleInput {
                    unit,
                    facts: view.clone(),
                    deadline,
                };
                findings.extend(self.run_rule(rule, &input));
            }
            findings
        };

        let names: Vec<&str> = unit.callables().map(|f| f.name.as_str()).collect();
        let mut findings: Vec<Finding> = if self.config.parallel {
            names.par_iter().flat_map_iter(|name| run_function(name)).collect()
        } else {
            names.iter().flat_map(|name| run_function(name)).collect()
        };

        // Every local rule of this contract has finished here.
        for rule in &cross {
            if over_budget(deadline, &timed_out) {
                break;
            }
            let input = RuleInput {
                unit,
                facts: facts.view(),
                deadline,
            };
            findings.extend(self.run_rule(rule, &input));
        }

        if timed_out.load(Ordering::SeqCst) {
            log::warn!(
                "{}: analysis budget exhausted after {:?}",
                unit.name,
                started.elapsed()
            );
            findings.push(Finding::diagnostic(
                diagnostics::ANALYSIS_TIMEOUT,
                &unit.name,
                unit.location(),
                &unit.name,
                format!(
                    "analysis of `{}` exceeded its time budget; findings are partial",
                    unit.name
                ),
            ));
        }

        self.deduplicate(findings)
    }

    /// Evaluates one rule, converting errors and panics into a diagnostic finding.
    fn run_rule(&self, rule: &Rule, input: &RuleInput<'_>) -> Vec<Finding> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| rule.evaluate(input)))
            .unwrap_or_else(|payload| Err(RuleError::Panicked(panic_message(payload.as_ref()))));

        match result {
            Ok(detections) => detections
                .into_iter()
                .map(|d| to_finding(rule, input.unit, d))
                .collect(),
            Err(err) => {
                log::warn!("Rule {} failed on {}: {}", rule.id(), input.unit.name, err);
                vec![Finding::diagnostic(
                    diagnostics::RULE_EXECUTION_ERROR,
                    &input.unit.name,
                    input.unit.location(),
                    rule.id(),
                    format!("rule `{}` could not be evaluated: {}", rule.id(), err),
                )]
            }
        }
    }

    /// Builds the report for suppressed results, applying the configured
    /// severity floor and verbosity.
    pub fn report(&self, applied: SuppressionOutcome, inputs: Vec<String>, contracts: usize) -> Report {
        Report::new(
            applied.kept,
            applied.suppressed,
            inputs,
            contracts,
            self.config.min_severity,
            self.config.verbose,
        )
    }

    /// Collapses findings sharing a dedup key.
    ///
    /// The highest severity wins; on a tie the finding of the rule registered
    /// first is kept. The result is independent of evaluation order. Findings
    /// left with equal fingerprints get an occurrence number mixed in.
    pub fn deduplicate(&self, mut findings: Vec<Finding>) -> Vec<Finding> {
        let position = |f: &Finding| self.registry.position(&f.rule_id).unwrap_or(usize::MAX);
        findings.sort_by(|a, b| {
            position(a)
                .cmp(&position(b))
                .then_with(|| a.function.cmp(&b.function))
                .then_with(|| a.location.cmp(&b.location))
                .then_with(|| a.message.cmp(&b.message))
        });

        let mut kept: Vec<Finding> = Vec::with_capacity(findings.len());
        let mut index: HashMap<_, usize> = HashMap::new();

        for finding in findings {
            match index.get(&finding.dedup_key()) {
                Some(&at) => {
                    if finding.severity > kept[at].severity {
                        kept[at] = finding;
                    }
                }
                None => {
                    index.insert(finding.dedup_key(), kept.len());
                    kept.push(finding);
                }
            }
        }

        kept.sort_by(Finding::report_order);

        // Repeats of one identity in a function are numbered in source order.
        let mut occurrences: HashMap<String, usize> = HashMap::new();
        for finding in &mut kept {
            let seen = occurrences.entry(finding.fingerprint.clone()).or_insert(0);
            finding.fingerprint = occurrence_fingerprint(&finding.fingerprint, *seen);
            *seen += 1;
        }
        kept
    }
}

/// Marks the contract as timed out once the deadline has passed.
fn over_budget(deadline: Option<Instant>, timed_out: &AtomicBool) -> bool {
    if timed_out.load(Ordering::SeqCst) {
        return true;
    }
    if deadline.map_or(false, |d| Instant::now() >= d) {
        timed_out.store(true, Ordering::SeqCst);
        return true;
    }
    false
}

fn to_finding(rule: &Rule, unit: &ContractUnit, detection: Detection) -> Finding {
    let meta = rule.meta();
    let subject = if detection.subject.is_empty() {
        detection.message.as_str()
    } else {
        detection.subject.as_str()
    };

    Finding {
        fingerprint: fingerprint(&meta.id, &unit.name, detection.function.as_deref(), subject),
        rule_id: meta.id.clone(),
        title: meta.title.clone(),
        contract: unit.name.clone(),
        function: detection.function,
        location: detection.location,
        severity: meta.severity,
        confidence: detection.confidence.unwrap_or(meta.confidence),
        message: detection.message,
        remediation: meta.remediation.clone(),
        evidence: detection.evidence,
        group: meta.dedup_group().to_string(),
    }
}

fn malformed_finding(err: &MalformedInputError) -> Finding {
    let contract = err.contract.as_deref().unwrap_or("");
    Finding::diagnostic(
        diagnostics::MALFORMED_INPUT,
        contract,
        SourceLocation::new(err.file.clone(), 0, 0),
        &err.path,
        format!("{}: {}", err.path, err.message),
    )
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::RuleMeta;
    use crate::report::Confidence;
    use serde_json::json;

    fn unit() -> ContractUnit {
        let value = json!({
            "name": "Vault",
            "src": { "line": 2 },
            "state_variables": [ { "name": "owner", "type_name": "address" } ],
            "functions": [
                { "name": "a", "visibility": "public", "body": [] },
                { "name": "b", "visibility": "public", "body": [] }
            ]
        });
        crate::parser::lower_contract("Vault.sol", crate::parser::Dialect::Solidity, 0, &value)
            .unwrap()
    }

    fn meta(id: &str, severity: Severity, scope: RuleScope, group: Option<&str>) -> RuleMeta {
        RuleMeta {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            severity,
            confidence: Confidence::Proven,
            scope,
            required_facts: [FactKind::FunctionDeclared].into_iter().collect(),
            group: group.map(str::to_string),
            remediation: None,
            cwe: None,
        }
    }

    fn at_line(line: usize) -> Detection {
        Detection::new(SourceLocation::new("Vault.sol", line, 1), "hit")
            .in_function("a")
            .subject("x")
    }

    fn engine(rules: Vec<Rule>) -> AnalysisEngine {
        let mut registry = RuleRegistry::new();
        for rule in rules {
            registry.register(rule).unwrap();
        }
        AnalysisEngine::new(registry, EngineConfig::default())
    }

    #[test]
    fn test_throwing_rule_is_isolated() {
        let engine = engine(vec![
            Rule::new(meta("boom", Severity::High, RuleScope::Local, None), |_| {
                panic!("evaluator bug")
            }),
            Rule::new(meta("fails", Severity::High, RuleScope::Local, None), |_| {
                Err(RuleError::Failed("no".to_string()))
            }),
            Rule::new(
                meta("ok", Severity::Low, RuleScope::CrossFunction, None),
                |_| Ok(vec![at_line(7)]),
            ),
        ]);

        let findings = engine.analyze_contract(&unit());
        let errors: Vec<_> = findings
            .iter()
            .filter(|f| f.rule_id == diagnostics::RULE_EXECUTION_ERROR)
            .collect();

        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|f| f.message.contains("evaluator bug")));
        assert!(findings.iter().any(|f| f.rule_id == "ok"));
    }

    #[test]
    fn test_fingerprint_ignores_line_moves() {
        let rule = Rule::new(meta("moved", Severity::Low, RuleScope::Local, None), |_| {
            Ok(Vec::new())
        });
        let before = to_finding(&rule, &unit(), at_line(4));
        let after = to_finding(&rule, &unit(), at_line(19));

        assert_ne!(before.location, after.location);
        assert_eq!(before.fingerprint, after.fingerprint);
    }

    #[test]
    fn test_repeated_subject_gets_distinct_fingerprints() {
        let engine = engine(vec![Rule::new(
            meta("twice", Severity::Medium, RuleScope::CrossFunction, None),
            |_| Ok(vec![at_line(9), at_line(4)]),
        )]);

        let findings = engine.analyze_contract(&unit());
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].location.line, 4);
        assert_ne!(findings[0].fingerprint, findings[1].fingerprint);

        // The first occurrence keeps the plain identity.
        let plain = fingerprint("twice", "Vault", Some("a"), "x");
        assert_eq!(findings[0].fingerprint, plain);
    }

    #[test]
    fn test_same_rule_same_location_is_reported_once() {
        // Local rule evaluated for both functions, reporting the same spot.
        let engine = engine(vec![Rule::new(
            meta("dup", Severity::Medium, RuleScope::Local, None),
            |_| Ok(vec![at_line(4)]),
        )]);

        let findings = engine.analyze_contract(&unit());
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_group_tie_break_prefers_earlier_rule() {
        let engine = engine(vec![
            Rule::new(
                meta("first", Severity::Medium, RuleScope::Local, Some("g")),
                |_| Ok(vec![at_line(4)]),
            ),
            Rule::new(
                meta("second", Severity::Medium, RuleScope::CrossFunction, Some("g")),
                |_| Ok(vec![at_line(4)]),
            ),
            Rule::new(
                meta("third", Severity::High, RuleScope::Local, Some("h")),
                |_| Ok(vec![at_line(4)]),
            ),
            Rule::new(
                meta("fourth", Severity::Critical, RuleScope::CrossFunction, Some("h")),
                |_| Ok(vec![at_line(4)]),
            ),
        ]);

        let ids: Vec<_> = engine
            .analyze_contract(&unit())
            .into_iter()
            .map(|f| f.rule_id)
            .collect();
        assert_eq!(ids, vec!["fourth", "first"]);
    }

    #[test]
    fn test_exhausted_budget_yields_timeout() {
        let mut registry = RuleRegistry::new();
        registry
            .register(Rule::new(
                meta("slow", Severity::Low, RuleScope::CrossFunction, None),
                |_| Ok(vec![at_line(3)]),
            ))
            .unwrap();
        let config = EngineConfig {
            contract_budget: Some(Duration::ZERO),
            ..EngineConfig::default()
        };

        let findings = AnalysisEngine::new(registry, config).analyze_contract(&unit());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, diagnostics::ANALYSIS_TIMEOUT);
    }

    #[test]
    fn test_cancelled_run_marks_contracts() {
        let file = LoadedFile::from_json(
            "Vault.json",
            r#"{ "contracts": [ { "name": "A" }, { "name": "B" } ] }"#,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = engine(Vec::new()).analyze(&[file], &cancel, |_| {});
        assert_eq!(outcome.contracts_skipped, 2);
        assert!(outcome
            .findings
            .iter()
            .all(|f| f.rule_id == diagnostics::ANALYSIS_CANCELLED));
    }

    #[test]
    fn test_malformed_contract_does_not_stop_batch() {
        let file = LoadedFile::from_json(
            "Mixed.json",
            r#"{ "contracts": [ { "name": "" }, { "name": "Fine" } ] }"#,
        );
        let outcome = engine(Vec::new()).analyze(&[file], &CancellationToken::new(), |_| {});

        assert_eq!(outcome.contracts_analyzed, 1);
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].rule_id, diagnostics::MALFORMED_INPUT);
    }
}
