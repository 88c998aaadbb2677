//! # Fact Extractor
//!
//! @title Contract Fact Extraction
//! @author Ramprasad
//!
//! Walks every function and modifier of a [`ContractUnit`] and records the
//! facts rules need: storage reads and writes with their guard context,
//! external calls, writes that follow a call on some CFG path, transaction
//! globals, loop bounds and access-control guards.
//!
//! Extraction is total over lowered units and never infers anything that
//! needs knowledge outside the contract: unknown call targets stay
//! unresolved and unknown names are ignored.
//!
//! ## Local Derivation
//!
//! Locals are tracked flow-insensitively: `uint256 bal = balances[msg.sender];`
//! makes every later read of `bal` count as a read of `balances`.

use super::cfg::{Cfg, CfgNode, NodeId};
use super::facts::{ContractFacts, Fact, LoopBound};
use super::model::{ContractUnit, FunctionKind, FunctionUnit, SourceLocation};
use super::scope::{root_identifier, Binding, Scope};
use crate::parser::ast::{Expr, LiteralKind, Src};
use crate::parser::{Capabilities, Dialect};
use std::collections::{BTreeMap, BTreeSet};

/// Extracts every fact of one contract.
///
/// # Example
///
/// ```rust,ignore
/// let facts = extract(&unit);
/// for fact in facts.facts() {
///     println!("{:?}", fact.kind());
/// }
/// ```
pub fn extract(unit: &ContractUnit) -> ContractFacts {
    let mut facts = ContractFacts::new(&unit.name);
    let capabilities = unit.dialect.capabilities();

    for var in unit
        .state_variables
        .iter()
        .filter(|_| capabilities.resolves_state_vars)
    {
        facts.push(Fact::StateVariableDeclared {
            variable: var.name.clone(),
            type_name: var.type_name.clone(),
            visibility: var.visibility,
            explicit_visibility: var.explicit_visibility,
            dynamic_array: var.is_dynamic_array(),
            has_initializer: var.has_initializer,
            constant: var.constant,
            slot: var.slot,
            location: var.location.clone(),
        });
    }

    if capabilities.traverses_functions {
        for function in unit.callables() {
            FunctionExtractor::new(unit, function).run(&mut facts);
        }
    }

    log::debug!(
        "Extracted {} facts from contract {}",
        facts.len(),
        unit.name
    );
    facts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessKind {
    Read,
    Write,
}

/// One storage access found in an expression.
#[derive(Debug, Clone)]
struct Access {
    kind: AccessKind,
    variable: String,
    via: Option<String>,
    in_guard: bool,
    feeds_value: bool,
    src: Option<Src>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Ctx {
    in_guard: bool,
    feeds_value: bool,
    write: bool,
}

impl Ctx {
    fn read(self) -> Self {
        Self {
            write: false,
            ..self
        }
    }

    fn write(self) -> Self {
        Self {
            write: true,
            ..self
        }
    }

    fn guard(self) -> Self {
        Self {
            in_guard: true,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GlobalCtx {
    in_guard: bool,
    compared_to_sender: bool,
    /// Inside an expression already reported as weak randomness.
    in_random: bool,
}

struct FunctionExtractor<'a> {
    unit: &'a ContractUnit,
    function: &'a FunctionUnit,
    dialect: Dialect,
    capabilities: Capabilities,
    scope: Scope,

    /// Local name to the storage variables it was derived from.
    derived: BTreeMap<String, BTreeSet<String>>,

    /// Local name to the storage array whose length it holds.
    length_locals: BTreeMap<String, String>,
}

impl<'a> FunctionExtractor<'a> {
    fn new(unit: &'a ContractUnit, function: &'a FunctionUnit) -> Self {
        let scope = Scope::of_function(unit, function);
        let mut extractor = Self {
            unit,
            function,
            dialect: unit.dialect,
            capabilities: unit.dialect.capabilities(),
            scope,
            derived: BTreeMap::new(),
            length_locals: BTreeMap::new(),
        };
        extractor.derive_locals();
        extractor
    }

    fn cfg(&self) -> &'a Cfg {
        &self.function.cfg
    }

    fn name(&self) -> String {
        self.function.name.clone()
    }

    fn location(&self, src: Option<Src>, node: &CfgNode) -> SourceLocation {
        match src.or(node.src) {
            Some(src) => SourceLocation::new(&self.unit.file, src.line, src.column),
            None => self.function.location.clone(),
        }
    }

    fn run(&self, facts: &mut ContractFacts) {
        let function = self.name();

        if self.function.kind != FunctionKind::Modifier {
            facts.push(Fact::FunctionDeclared {
                function: function.clone(),
                kind: self.function.kind,
                visibility: self.function.visibility,
                mutability: self.function.mutability,
                modifiers: self.function.modifiers.iter().map(|m| m.name.clone()).collect(),
                location: self.function.location.clone(),
            });
            for modifier in &self.function.modifiers {
                facts.push(Fact::ModifierApplied {
                    function: function.clone(),
                    modifier: modifier.name.clone(),
                    location: modifier.location.clone(),
                });
            }
        }

        let accesses: Vec<Vec<Access>> = self
            .cfg()
            .nodes()
            .iter()
            .map(|node| self.node_accesses(node))
            .collect();

        for (node, node_accesses) in self.cfg().nodes().iter().zip(&accesses) {
            for access in node_accesses
                .iter()
                .filter(|_| self.capabilities.resolves_state_vars)
            {
                let location = self.location(access.src, node);
                facts.push(match access.kind {
                    AccessKind::Read => Fact::StateRead {
                        function: function.clone(),
                        variable: access.variable.clone(),
                        in_guard: access.in_guard,
                        feeds_value: access.feeds_value,
                        via: access.via.clone(),
                        location,
                    },
                    AccessKind::Write => Fact::StateWrite {
                        function: function.clone(),
                        variable: access.variable.clone(),
                        location,
                    },
                });
            }
            for expr in &node.exprs {
                let ctx = GlobalCtx {
                    in_guard: node.is_condition(),
                    ..GlobalCtx::default()
                };
                self.globals(expr, node, ctx, facts);
            }
        }

        if self.capabilities.resolves_calls {
            for (index, call) in self.function.call_sites.iter().enumerate() {
                facts.push(Fact::ExternalCall {
                    function: function.clone(),
                    index,
                    call: call.clone(),
                });
            }
            self.writes_after_calls(&accesses, facts);
        }
        self.loops(facts);
        self.guards(facts);
    }

    /// Storage accesses of one node, in evaluation order.
    fn node_accesses(&self, node: &CfgNode) -> Vec<Access> {
        let ctx = Ctx {
            in_guard: node.is_condition(),
            ..Ctx::default()
        };
        let mut out = Vec::new();
        for expr in &node.exprs {
            self.visit(expr, ctx, &mut out);
        }
        out
    }

    fn record(&self, kind: AccessKind, variable: &str, via: Option<&str>, ctx: Ctx, expr: &Expr, out: &mut Vec<Access>) {
        out.push(Access {
            kind,
            variable: variable.to_string(),
            via: via.map(str::to_string),
            in_guard: ctx.in_guard,
            feeds_value: ctx.feeds_value,
            src: expr.src(),
        });
    }

    fn visit(&self, expr: &Expr, ctx: Ctx, out: &mut Vec<Access>) {
        if let Some(name) = self.dialect.state_reference(expr, &self.scope) {
            let kind = if ctx.write {
                AccessKind::Write
            } else {
                AccessKind::Read
            };
            self.record(kind, name, None, ctx, expr, out);
            return;
        }

        match expr {
            Expr::Identifier { name, .. } => {
                if ctx.write || self.scope.bind(name) != Binding::Local {
                    return;
                }
                if let Some(sources) = self.derived.get(name) {
                    for var in sources {
                        self.record(AccessKind::Read, var, Some(name), ctx, expr, out);
                    }
                }
            }
            Expr::Literal { .. } => {}
            Expr::Member { base, .. } => self.visit(base, ctx, out),
            Expr::Index { base, index, .. } => {
                self.visit(base, ctx, out);
                if let Some(index) = index {
                    self.visit(index, ctx.read(), out);
                }
            }
            Expr::Assign {
                op, target, value, ..
            } => {
                self.visit(value, ctx.read(), out);
                if op != "=" {
                    self.visit(target, ctx.read(), out);
                }
                self.visit(target, ctx.write(), out);
            }
            Expr::Unary { op, operand, .. } => match op.as_str() {
                "++" | "--" => {
                    self.visit(operand, ctx.read(), out);
                    self.visit(operand, ctx.write(), out);
                }
                "delete" => self.visit(operand, ctx.write(), out),
                _ => self.visit(operand, ctx, out),
            },
            Expr::Call {
                callee,
                args,
                named_args,
                ..
            } => {
                let ctx = ctx.read();
                let arg_ctx = if self.dialect.is_guard_call(callee) {
                    ctx.guard()
                } else {
                    ctx
                };
                let value = self
                    .dialect
                    .classify_call(expr, &self.scope)
                    .filter(|shape| shape.transfers_value())
                    .and_then(|shape| shape.value);

                // Array mutation: `users.push(x)`, `users.pop()`
                if let Expr::Member { base, member, .. } = callee.as_ref() {
                    if member == "push" || member == "pop" {
                        if let Some(var) = self.dialect.state_root(base, &self.scope) {
                            self.record(AccessKind::Write, var, None, ctx, expr, out);
                        }
                    }
                }

                self.visit(callee, ctx, out);
                for arg in named_args.iter().map(|a| &a.value).chain(args.iter()) {
                    let feeds = value.map_or(false, |v| std::ptr::eq(v, arg));
                    let arg_ctx = Ctx {
                        feeds_value: arg_ctx.feeds_value || feeds,
                        ..arg_ctx
                    };
                    self.visit(arg, arg_ctx, out);
                }
            }
            Expr::Binary { left, right, .. } => {
                self.visit(left, ctx.read(), out);
                self.visit(right, ctx.read(), out);
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
                ..
            } => {
                self.visit(condition, ctx.read().guard(), out);
                self.visit(then, ctx, out);
                self.visit(otherwise, ctx, out);
            }
            Expr::Tuple { elements, .. } => {
                for element in elements.iter().flatten() {
                    self.visit(element, ctx, out);
                }
            }
        }
    }

    /// Storage variables read directly by `expr` or through derived locals.
    fn sources_of(&self, expr: &Expr) -> BTreeSet<String> {
        let mut sources = BTreeSet::new();
        expr.walk(&mut |e| {
            if let Some(name) = self.dialect.state_reference(e, &self.scope) {
                sources.insert(name.to_string());
            } else if let Some(name) = e.as_identifier() {
                if let Some(derived) = self.derived.get(name) {
                    sources.extend(derived.iter().cloned());
                }
            }
        });
        sources
    }

    /// Assignments to locals: (local, assigned value).
    fn local_assignments(&self) -> Vec<(String, &'a Expr)> {
        let mut assignments = Vec::new();
        for node in self.cfg().nodes() {
            if !node.declared.is_empty() {
                if let Some(value) = node.exprs.first() {
                    for name in node.declared.iter().filter(|n| !n.is_empty()) {
                        assignments.push((name.clone(), value));
                    }
                }
            }
            for expr in &node.exprs {
                expr.walk(&mut |e| {
                    if let Expr::Assign { target, value, .. } = e {
                        let targets: Vec<&Expr> = match target.as_ref() {
                            Expr::Tuple { elements, .. } => elements.iter().flatten().collect(),
                            other => vec![other],
                        };
                        for t in targets {
                            if let Some(name) = t.as_identifier() {
                                if self.scope.bind(name) == Binding::Local {
                                    assignments.push((name.to_string(), value.as_ref()));
                                }
                            }
                        }
                    }
                });
            }
        }
        assignments
    }

    /// Computes local derivation to a fixpoint.
    fn derive_locals(&mut self) {
        let assignments = self.local_assignments();

        for (local, value) in &assignments {
            if let Some(var) = self.length_of(value) {
                self.length_locals.insert(local.clone(), var);
            }
        }

        loop {
            let mut changed = false;
            for (local, value) in &assignments {
                let sources = self.sources_of(value);
                let entry = self.derived.entry(local.clone()).or_default();
                for source in sources {
                    changed |= entry.insert(source);
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Storage dynamic array whose length `expr` denotes.
    fn length_of(&self, expr: &Expr) -> Option<String> {
        match expr {
            Expr::Member { base, member, .. } if member == "length" => self
                .dialect
                .state_root(base, &self.scope)
                .filter(|var| self.scope.is_dynamic_array(var))
                .map(str::to_string),
            Expr::Call { callee, args, .. }
                if callee.as_identifier() == Some("len") && args.len() == 1 =>
            {
                self.dialect
                    .state_root(&args[0], &self.scope)
                    .filter(|var| self.scope.is_dynamic_array(var))
                    .map(str::to_string)
            }
            Expr::Identifier { name, .. } => self.length_locals.get(name).cloned(),
            _ => None,
        }
    }

    /// Records transaction-global uses: `tx.origin`, timestamps and weak randomness.
    fn globals(&self, expr: &Expr, node: &CfgNode, ctx: GlobalCtx, facts: &mut ContractFacts) {
        if self.dialect.is_tx_origin(expr) {
            facts.push(Fact::UsesTxOrigin {
                function: self.name(),
                in_guard: ctx.in_guard,
                compared_to_sender: ctx.compared_to_sender,
                location: self.location(expr.src(), node),
            });
            return;
        }

        if self.dialect.is_timestamp(expr, &self.scope) {
            facts.push(Fact::UsesBlockTimestamp {
                function: self.name(),
                in_guard: ctx.in_guard,
                location: self.location(expr.src(), node),
            });
            return;
        }

        let mut ctx = GlobalCtx {
            compared_to_sender: false,
            ..ctx
        };

        let is_modulo = matches!(expr, Expr::Binary { op, .. } if op == "%");
        if !ctx.in_random && (self.dialect.is_hash_call(expr) || is_modulo) {
            let mut sources = BTreeSet::new();
            expr.walk(&mut |e| {
                if let Some(source) = self.dialect.entropy_source(e, &self.scope) {
                    sources.insert(source);
                }
            });
            for source in &sources {
                facts.push(Fact::WeakRandomness {
                    function: self.name(),
                    source: source.to_string(),
                    location: self.location(expr.src(), node),
                });
            }
            ctx.in_random = !sources.is_empty();
        }

        match expr {
            Expr::Call { callee, .. } if self.dialect.is_guard_call(callee) => {
                let guarded = GlobalCtx {
                    in_guard: true,
                    ..ctx
                };
                for child in expr.children() {
                    self.globals(child, node, guarded, facts);
                }
            }
            Expr::Binary {
                op, left, right, ..
            } if op == "==" || op == "!=" => {
                let left_ctx = GlobalCtx {
                    compared_to_sender: self.dialect.is_sender(right),
                    ..ctx
                };
                let right_ctx = GlobalCtx {
                    compared_to_sender: self.dialect.is_sender(left),
                    ..ctx
                };
                self.globals(left, node, left_ctx, facts);
                self.globals(right, node, right_ctx, facts);
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
                ..
            } => {
                let guarded = GlobalCtx {
                    in_guard: true,
                    ..ctx
                };
                self.globals(condition, node, guarded, facts);
                self.globals(then, node, ctx, facts);
                self.globals(otherwise, node, ctx, facts);
            }
            _ => {
                for child in expr.children() {
                    self.globals(child, node, ctx, facts);
                }
            }
        }
    }

    /// Emits a fact for every storage write reachable after a call site.
    fn writes_after_calls(&self, accesses: &[Vec<Access>], facts: &mut ContractFacts) {
        let cfg = self.cfg();

        for (index, call) in self.function.call_sites.iter().enumerate() {
            let after = cfg.reachable_from(call.node);
            let before = reaching(cfg, call.node);

            let mut eligible = BTreeSet::new();
            for node in cfg.nodes() {
                let precedes = node.id == call.node || before[node.id];
                for access in &accesses[node.id] {
                    if access.kind != AccessKind::Read {
                        continue;
                    }
                    let guard_before = precedes && access.in_guard;
                    let feeds_call = node.id == call.node && access.feeds_value;
                    if guard_before || feeds_call {
                        eligible.insert(access.variable.as_str());
                    }
                }
            }

            let mut seen = BTreeSet::new();
            for node in cfg.nodes().iter().filter(|n| after[n.id]) {
                for access in &accesses[node.id] {
                    if access.kind != AccessKind::Write || !seen.insert(access.variable.as_str()) {
                        continue;
                    }
                    facts.push(Fact::WritesAfterExternalCall {
                        function: self.name(),
                        variable: access.variable.clone(),
                        call_index: index,
                        call_location: call.location.clone(),
                        write_location: self.location(access.src, node),
                        eligibility_read: eligible.contains(access.variable.as_str()),
                        value_transfer: call.value_transfer,
                        target: call.target.clone(),
                    });
                }
            }
        }
    }

    fn loops(&self, facts: &mut ContractFacts) {
        for info in self.cfg().loops() {
            let bound = match &info.condition {
                Some(condition) => self.classify_bound(condition),
                None => LoopBound::Unknown,
            };
            let bounded_break = info
                .break_guards
                .iter()
                .flatten()
                .any(|guard| self.compares_to_fixed(guard));

            let location = match info.src {
                Some(src) => SourceLocation::new(&self.unit.file, src.line, src.column),
                None => self.function.location.clone(),
            };
            facts.push(Fact::Loop {
                function: self.name(),
                bound,
                bounded_break,
                location,
            });
        }
    }

    /// Classifies a loop condition; a static conjunct bounds the whole loop.
    fn classify_bound(&self, condition: &Expr) -> LoopBound {
        let mut conjuncts = Vec::new();
        split_conjuncts(condition, &mut conjuncts);

        let candidates: Vec<LoopBound> = conjuncts
            .iter()
            .flat_map(|c| self.bound_candidates(c))
            .collect();

        let rank = |b: &LoopBound| match b {
            LoopBound::Literal(_) | LoopBound::Constant(_) => 0,
            LoopBound::StateArrayLength(_) => 1,
            LoopBound::Parameter(_) => 2,
            LoopBound::Unknown => 3,
        };
        candidates
            .into_iter()
            .min_by_key(rank)
            .unwrap_or(LoopBound::Unknown)
    }

    /// Bound operands of one comparison (`b` in `i < b`, `a` in `a > i`).
    fn bound_candidates(&self, expr: &Expr) -> Vec<LoopBound> {
        let Expr::Binary {
            op, left, right, ..
        } = expr
        else {
            return Vec::new();
        };
        let operands: Vec<&Expr> = match op.as_str() {
            "<" | "<=" => vec![right],
            ">" | ">=" => vec![left],
            "!=" => vec![left, right],
            _ => Vec::new(),
        };
        operands
            .into_iter()
            .map(|e| self.classify_operand(e))
            .filter(|b| *b != LoopBound::Unknown)
            .collect()
    }

    fn classify_operand(&self, expr: &Expr) -> LoopBound {
        if let Expr::Literal {
            kind: LiteralKind::Number,
            value,
            ..
        } = expr
        {
            return LoopBound::Literal(value.clone());
        }
        if let Some(var) = self.length_of(expr) {
            return LoopBound::StateArrayLength(var);
        }
        // `users.length - 1`, `n * 2`: the bound is the non-fixed side.
        if let Expr::Binary {
            op, left, right, ..
        } = expr
        {
            if matches!(op.as_str(), "+" | "-" | "*" | "/") {
                let (lhs, rhs) = (self.classify_operand(left), self.classify_operand(right));
                return match (lhs.is_static(), rhs.is_static()) {
                    (true, true) => lhs,
                    (true, false) => rhs,
                    (false, true) => lhs,
                    (false, false) => LoopBound::Unknown,
                };
            }
        }
        if let Some(name) = self.dialect.state_reference(expr, &self.scope) {
            if self.scope.is_constant(name) {
                return LoopBound::Constant(name.to_string());
            }
        }
        match root_identifier(expr) {
            Some(name) if self.scope.bind(name) == Binding::Parameter => {
                LoopBound::Parameter(name.to_string())
            }
            _ => LoopBound::Unknown,
        }
    }

    /// Returns true when `guard` compares something against a literal or constant.
    fn compares_to_fixed(&self, guard: &Expr) -> bool {
        guard.any(&|e| match e {
            Expr::Binary {
                op, left, right, ..
            } if matches!(op.as_str(), "<" | "<=" | ">" | ">=" | "==" | "!=") => {
                [left.as_ref(), right.as_ref()]
                    .iter()
                    .any(|side| self.classify_operand(side).is_static())
            }
            _ => false,
        })
    }

    /// Records how the caller is checked in guard positions.
    fn guards(&self, facts: &mut ContractFacts) {
        let mut reads_state = false;
        let mut checks_sender = false;
        let mut against_state = false;
        let mut against_parameter = false;

        for node in self.cfg().nodes() {
            let mut guard_exprs = Vec::new();
            for expr in &node.exprs {
                if node.is_condition() {
                    guard_exprs.push(expr);
                } else {
                    self.collect_guard_args(expr, &mut guard_exprs);
                }
            }

            for guard in guard_exprs {
                let mut accesses = Vec::new();
                self.visit(guard, Ctx::default().guard(), &mut accesses);
                let guard_reads_state = accesses.iter().any(|a| a.kind == AccessKind::Read);
                reads_state |= guard_reads_state;

                if !guard.any(&|e| self.dialect.is_sender(e)) {
                    continue;
                }
                checks_sender = true;

                let (state, parameter) = self.sender_comparisons(guard);
                // `require(admins[msg.sender])` checks the caller against storage too
                let keyed_by_sender = guard_reads_state && !parameter;
                let is_state = state || keyed_by_sender;
                against_state |= is_state;
                against_parameter |= parameter;

                if self.function.kind != FunctionKind::Modifier && (is_state || parameter) {
                    facts.push(Fact::SenderGuard {
                        function: self.name(),
                        against_state: is_state,
                        location: self.location(guard.src(), node),
                    });
                }
            }
        }

        if self.function.kind == FunctionKind::Modifier {
            facts.push(Fact::ModifierGuard {
                modifier: self.name(),
                reads_state,
                checks_sender,
                sender_compared_to_parameter: against_parameter && !against_state,
                location: self.function.location.clone(),
            });
        }
    }

    /// Arguments of `require`/`assert` calls inside `expr`.
    fn collect_guard_args<'e>(&self, expr: &'e Expr, out: &mut Vec<&'e Expr>) {
        expr.walk(&mut |e| {
            if let Expr::Call { callee, args, .. } = e {
                if self.dialect.is_guard_call(callee) {
                    if let Some(condition) = args.first() {
                        out.push(condition);
                    }
                }
            }
        });
    }

    /// For `sender == x` comparisons in `guard`: (x is storage, x is a parameter).
    fn sender_comparisons(&self, guard: &Expr) -> (bool, bool) {
        let mut against_state = false;
        let mut against_parameter = false;

        guard.walk(&mut |e| {
            let Expr::Binary {
                op, left, right, ..
            } = e
            else {
                return;
            };
            if op != "==" && op != "!=" {
                return;
            }
            let other = if self.dialect.is_sender(left) {
                right
            } else if self.dialect.is_sender(right) {
                left
            } else {
                return;
            };
            if self.dialect.state_root(other, &self.scope).is_some()
                || self.derived_from_state(other)
            {
                against_state = true;
            } else if root_identifier(other)
                .map(|n| self.scope.bind(n) == Binding::Parameter)
                .unwrap_or(false)
            {
                against_parameter = true;
            }
        });

        (against_state, against_parameter)
    }

    fn derived_from_state(&self, expr: &Expr) -> bool {
        root_identifier(expr)
            .and_then(|name| self.derived.get(name))
            .map(|sources| !sources.is_empty())
            .unwrap_or(false)
    }
}

/// Flattens `a && b && c` into its conjuncts.
fn split_conjuncts<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Binary {
            op, left, right, ..
        } if op == "&&" => {
            split_conjuncts(left, out);
            split_conjuncts(right, out);
        }
        other => out.push(other),
    }
}

/// Marks every node from which `to` is reachable.
fn reaching(cfg: &Cfg, to: NodeId) -> Vec<bool> {
    let mut predecessors: Vec<Vec<NodeId>> = vec![Vec::new(); cfg.len()];
    for node in cfg.nodes() {
        for &succ in &node.successors {
            predecessors[succ].push(node.id);
        }
    }

    let mut seen = vec![false; cfg.len()];
    let mut stack = predecessors[to].clone();
    while let Some(id) = stack.pop() {
        if seen[id] {
            continue;
        }
        seen[id] = true;
        stack.extend(predecessors[id].iter().copied());
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::facts::FactKind;
    use crate::parser::{lower_contract, Dialect};
    use serde_json::json;

    fn member(base: serde_json::Value, name: &str) -> serde_json::Value {
        json!({ "node": "member", "base": base, "member": name })
    }

    fn ident(name: &str) -> serde_json::Value {
        json!({ "node": "identifier", "name": name })
    }

    fn sender() -> serde_json::Value {
        member(ident("msg"), "sender")
    }

    fn balance_of_sender() -> serde_json::Value {
        json!({ "node": "index", "base": ident("balances"), "index": sender() })
    }

    fn bank(write_before_call: bool) -> ContractUnit {
        let check = json!({ "node": "expression", "src": { "line": 5 },
            "expr": { "node": "call", "callee": ident("require"), "args": [
                { "node": "binary", "op": ">=", "left": balance_of_sender(), "right": ident("amount") } ] } });
        let call = json!({ "node": "var_decl", "names": ["ok"], "src": { "line": 6 },
            "value": { "node": "call", "callee": member(sender(), "call"),
                       "named_args": [ { "name": "value", "value": ident("amount") } ],
                       "src": { "line": 6, "column": 9 } } });
        let require_ok = json!({ "node": "expression", "src": { "line": 7 },
            "expr": { "node": "call", "callee": ident("require"), "args": [ ident("ok") ] } });
        let zero = json!({ "node": "expression", "src": { "line": 8 },
            "expr": { "node": "assign", "op": "-=", "target": balance_of_sender(), "value": ident("amount") } });

        let body = if write_before_call {
            json!([check, zero, call, require_ok])
        } else {
            json!([check, call, require_ok, zero])
        };

        let value = json!({
            "name": "Bank",
            "state_variables": [ { "name": "balances", "type_name": "mapping(address => uint256)" },
                                 { "name": "lastWithdraw", "type_name": "uint256" } ],
            "functions": [ { "name": "withdraw", "visibility": "external",
                             "parameters": [ { "name": "amount", "type_name": "uint256" } ],
                             "body": body } ]
        });
        lower_contract("Bank.sol", Dialect::Solidity, 0, &value).unwrap()
    }

    #[test]
    fn test_write_after_value_call_is_eligible() {
        let facts = extract(&bank(false));
        let writes: Vec<_> = facts
            .facts()
            .iter()
            .filter(|f| f.kind() == FactKind::WritesAfterExternalCall)
            .collect();

        assert_eq!(writes.len(), 1);
        match writes[0] {
            Fact::WritesAfterExternalCall {
                variable,
                eligibility_read,
                value_transfer,
                write_location,
                ..
            } => {
                assert_eq!(variable, "balances");
                assert!(*eligibility_read);
                assert!(*value_transfer);
                assert_eq!(write_location.line, 8);
            }
            other => panic!("unexpected fact {:?}", other),
        }
    }

    #[test]
    fn test_checks_effects_interactions_has_no_write_after_call() {
        let facts = extract(&bank(true));
        assert!(!facts.has_kind(FactKind::WritesAfterExternalCall));
        assert!(facts.has_kind(FactKind::ExternalCall));
    }

    #[test]
    fn test_guard_read_is_marked() {
        let facts = extract(&bank(false));
        assert!(facts.facts().iter().any(|f| matches!(
            f,
            Fact::StateRead { variable, in_guard: true, .. } if variable == "balances"
        )));
    }

    fn loop_contract(condition: serde_json::Value, body: serde_json::Value) -> ContractUnit {
        let value = json!({
            "name": "Airdrop",
            "state_variables": [ { "name": "users", "type_name": "address[]" },
                                 { "name": "MAX", "type_name": "uint256", "constant": true } ],
            "functions": [ { "name": "distribute", "body": [
                { "node": "for",
                  "init": { "node": "var_decl", "names": ["i"],
                            "value": { "node": "literal", "kind": "number", "value": "0" } },
                  "condition": condition,
                  "update": { "node": "unary", "op": "++", "operand": ident("i") },
                  "body": body,
                  "src": { "line": 10 } }
            ] } ]
        });
        lower_contract("Airdrop.sol", Dialect::Solidity, 0, &value).unwrap()
    }

    fn loop_fact(unit: &ContractUnit) -> (LoopBound, bool) {
        extract(unit)
            .facts()
            .iter()
            .find_map(|f| match f {
                Fact::Loop {
                    bound,
                    bounded_break,
                    ..
                } => Some((bound.clone(), *bounded_break)),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_loop_over_state_array_length() {
        let cond = json!({ "node": "binary", "op": "<", "left": ident("i"),
                           "right": member(ident("users"), "length") });
        let (bound, bounded_break) = loop_fact(&loop_contract(cond, json!([])));
        assert_eq!(bound, LoopBound::StateArrayLength("users".to_string()));
        assert!(!bounded_break);
    }

    #[test]
    fn test_offset_state_array_length_is_unbounded() {
        let cond = json!({ "node": "binary", "op": "<=", "left": ident("i"),
            "right": { "node": "binary", "op": "-", "left": member(ident("users"), "length"),
                       "right": { "node": "literal", "kind": "number", "value": "1" } } });
        let (bound, _) = loop_fact(&loop_contract(cond, json!([])));
        assert_eq!(bound, LoopBound::StateArrayLength("users".to_string()));
    }

    #[test]
    fn test_literal_conjunct_bounds_loop() {
        let cond = json!({ "node": "binary", "op": "&&",
            "left": { "node": "binary", "op": "<", "left": ident("i"),
                      "right": member(ident("users"), "length") },
            "right": { "node": "binary", "op": "<", "left": ident("i"),
                       "right": { "node": "literal", "kind": "number", "value": "10" } } });
        let (bound, _) = loop_fact(&loop_contract(cond, json!([])));
        assert_eq!(bound, LoopBound::Literal("10".to_string()));
    }

    #[test]
    fn test_break_on_constant_counter() {
        let cond = json!({ "node": "binary", "op": "<", "left": ident("i"),
                           "right": member(ident("users"), "length") });
        let body = json!([ { "node": "if",
            "condition": { "node": "binary", "op": ">=", "left": ident("i"), "right": ident("MAX") },
            "then": [ { "node": "break" } ] } ]);
        let (bound, bounded_break) = loop_fact(&loop_contract(cond, body));
        assert_eq!(bound, LoopBound::StateArrayLength("users".to_string()));
        assert!(bounded_break);
    }

    #[test]
    fn test_modifier_comparing_sender_to_parameter() {
        let value = json!({
            "name": "Owned",
            "state_variables": [ { "name": "owner", "type_name": "address" } ],
            "modifiers": [
                { "name": "onlyBy", "parameters": [ { "name": "account", "type_name": "address" } ],
                  "body": [ { "node": "expression", "expr": { "node": "call", "callee": ident("require"),
                      "args": [ { "node": "binary", "op": "==", "left": sender(), "right": ident("account") } ] } },
                    { "node": "placeholder" } ] },
                { "name": "onlyOwner",
                  "body": [ { "node": "expression", "expr": { "node": "call", "callee": ident("require"),
                      "args": [ { "node": "binary", "op": "==", "left": sender(), "right": ident("owner") } ] } },
                    { "node": "placeholder" } ] }
            ]
        });
        let unit = lower_contract("Owned.sol", Dialect::Solidity, 0, &value).unwrap();
        let facts = extract(&unit);

        let guard = |name: &str| {
            facts
                .facts()
                .iter()
                .find_map(|f| match f {
                    Fact::ModifierGuard {
                        modifier,
                        reads_state,
                        checks_sender,
                        sender_compared_to_parameter,
                        ..
                    } if modifier == name => {
                        Some((*reads_state, *checks_sender, *sender_compared_to_parameter))
                    }
                    _ => None,
                })
                .unwrap()
        };

        assert_eq!(guard("onlyBy"), (false, true, true));
        assert_eq!(guard("onlyOwner"), (true, true, false));
    }

    #[test]
    fn test_tx_origin_guard() {
        let value = json!({
            "name": "Wallet",
            "state_variables": [ { "name": "owner", "type_name": "address" } ],
            "functions": [ { "name": "pay", "body": [
                { "node": "expression", "expr": { "node": "call", "callee": ident("require"),
                    "args": [ { "node": "binary", "op": "==",
                                "left": member(ident("tx"), "origin"), "right": ident("owner") } ] } }
            ] } ]
        });
        let unit = lower_contract("Wallet.sol", Dialect::Solidity, 0, &value).unwrap();
        let facts = extract(&unit);

        assert!(facts.facts().iter().any(|f| matches!(
            f,
            Fact::UsesTxOrigin { in_guard: true, compared_to_sender: false, .. }
        )));
    }

    #[test]
    fn test_weak_randomness_from_hashed_timestamp() {
        let value = json!({
            "name": "Lottery",
            "functions": [ { "name": "draw", "body": [
                { "node": "return", "value": { "node": "binary", "op": "%",
                    "left": { "node": "call", "callee": ident("keccak256"),
                              "args": [ member(ident("block"), "timestamp") ] },
                    "right": { "node": "literal", "kind": "number", "value": "100" } } }
            ] } ]
        });
        let unit = lower_contract("Lottery.sol", Dialect::Solidity, 0, &value).unwrap();
        let facts = extract(&unit);

        let sources: Vec<_> = facts
            .facts()
            .iter()
            .filter_map(|f| match f {
                Fact::WeakRandomness { source, .. } => Some(source.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(sources, vec!["block.timestamp"]);
        assert!(facts.has_kind(FactKind::UsesBlockTimestamp));
    }
}
