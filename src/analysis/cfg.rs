//! # Control Flow Graph
//!
//! @title Statement-Level CFG
//! @author Ramprasad
//!
//! Builds a control-flow graph from a function body. Each node carries the
//! expressions evaluated at that point, so the fact extractor can walk
//! nodes in any order and still answer path questions such as
//! "is this storage write reachable after that external call?".
//!
//! ## Layout
//!
//! - Node `0` is the entry, node `1` is the exit.
//! - `if` produces a [`NodeKind::Branch`] node with edges into both arms.
//! - Loops produce a condition (or head) node with a back edge from the
//!   end of the body; `break` and `continue` are wired to the loop exit
//!   and continue target.
//! - `return` and `revert` jump to the exit node.

use crate::parser::ast::{Expr, Src, Stmt};

/// Index of a node inside its [`Cfg`].
pub type NodeId = usize;

/// Role of a CFG node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Entry,
    Exit,
    Statement,
    /// Condition of an `if`.
    Branch,
    /// Condition evaluated on every loop iteration.
    LoopCondition,
    /// Join point of a loop without a leading condition.
    LoopHead,
    Break,
    Continue,
    Return,
    Revert,
    /// `_;` inside a modifier.
    Placeholder,
}

/// A single CFG node.
#[derive(Debug, Clone)]
pub struct CfgNode {
    pub id: NodeId,
    pub kind: NodeKind,

    /// Expressions evaluated by this node, in order.
    pub exprs: Vec<Expr>,

    /// Local names introduced by a declaration statement.
    pub declared: Vec<String>,

    /// True when the node is a bare expression statement whose value is discarded.
    pub discards_value: bool,

    /// Number of enclosing loops.
    pub loop_depth: usize,

    pub src: Option<Src>,
    pub successors: Vec<NodeId>,
}

impl CfgNode {
    /// Returns true when the node's expressions are evaluated as a condition.
    pub fn is_condition(&self) -> bool {
        matches!(self.kind, NodeKind::Branch | NodeKind::LoopCondition)
    }
}

/// Loop kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    For,
    While,
    DoWhile,
}

/// Structural information about one loop.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    pub kind: LoopKind,

    /// Node evaluated at the top of every iteration.
    pub header: NodeId,

    /// Termination condition; `None` for `for (;;)`.
    pub condition: Option<Expr>,

    /// For each `break`, the innermost `if` condition guarding it inside the loop.
    pub break_guards: Vec<Option<Expr>>,

    pub src: Option<Src>,
}

/// Control-flow graph of one function or modifier body.
#[derive(Debug, Clone)]
pub struct Cfg {
    nodes: Vec<CfgNode>,
    loops: Vec<LoopInfo>,
}

impl Cfg {
    pub const ENTRY: NodeId = 0;
    pub const EXIT: NodeId = 1;

    /// Builds the graph for a function body.
    pub fn build(body: &[Stmt]) -> Self {
        let mut builder = CfgBuilder::default();
        let entry = builder.add(NodeKind::Entry, Vec::new(), None);
        let exit = builder.add(NodeKind::Exit, Vec::new(), None);
        debug_assert_eq!((entry, exit), (Self::ENTRY, Self::EXIT));

        let dangling = builder.lower_block(body, vec![entry]);
        for node in dangling {
            builder.connect(node, exit);
        }

        Self {
            nodes: builder.nodes,
            loops: builder.loops,
        }
    }

    pub fn nodes(&self) -> &[CfgNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &CfgNode {
        &self.nodes[id]
    }

    pub fn loops(&self) -> &[LoopInfo] {
        &self.loops
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 2
    }

    /// Marks every node reachable from `from` through at least one edge.
    ///
    /// `from` itself is only marked when it lies on a cycle.
    pub fn reachable_from(&self, from: NodeId) -> Vec<bool> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = self.nodes[from].successors.clone();

        while let Some(id) = stack.pop() {
            if seen[id] {
                continue;
            }
            seen[id] = true;
            stack.extend(self.nodes[id].successors.iter().copied());
        }

        seen
    }

    /// Returns true if some path leads from `from` to `to`.
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        self.reachable_from(from)[to]
    }
}

#[derive(Debug)]
struct LoopFrame {
    loop_index: usize,
    continue_target: NodeId,
    breaks: Vec<NodeId>,
    guard_base: usize,
}

#[derive(Debug, Default)]
struct CfgBuilder {
    nodes: Vec<CfgNode>,
    loops: Vec<LoopInfo>,
    frames: Vec<LoopFrame>,
    guards: Vec<Expr>,
    loop_depth: usize,
}

impl CfgBuilder {
    fn add(&mut self, kind: NodeKind, exprs: Vec<Expr>, src: Option<Src>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(CfgNode {
            id,
            kind,
            exprs,
            declared: Vec::new(),
            discards_value: false,
            loop_depth: self.loop_depth,
            src,
            successors: Vec::new(),
        });
        id
    }

    fn connect(&mut self, from: NodeId, to: NodeId) {
        let successors = &mut self.nodes[from].successors;
        if !successors.contains(&to) {
            successors.push(to);
        }
    }

    /// Adds a node and wires every predecessor into it.
    fn append(
        &mut self,
        kind: NodeKind,
        exprs: Vec<Expr>,
        src: Option<Src>,
        preds: &[NodeId],
    ) -> NodeId {
        let id = self.add(kind, exprs, src);
        for &pred in preds {
            self.connect(pred, id);
        }
        id
    }

    fn lower_block(&mut self, stmts: &[Stmt], mut preds: Vec<NodeId>) -> Vec<NodeId> {
        for stmt in stmts {
            preds = self.lower_stmt(stmt, preds);
        }
        preds
    }

    fn open_loop(&mut self, kind: LoopKind, condition: Option<Expr>, src: Option<Src>) -> usize {
        self.loops.push(LoopInfo {
            kind,
            header: Cfg::EXIT,
            condition,
            break_guards: Vec::new(),
            src,
        });
        self.loop_depth += 1;
        self.loops.len() - 1
    }

    fn close_loop(&mut self) -> Vec<NodeId> {
        self.loop_depth -= 1;
        self.frames.pop().map(|f| f.breaks).unwrap_or_default()
    }

    fn push_frame(&mut self, loop_index: usize, continue_target: NodeId) {
        self.frames.push(LoopFrame {
            loop_index,
            continue_target,
            breaks: Vec::new(),
            guard_base: self.guards.len(),
        });
    }

    fn lower_stmt(&mut self, stmt: &Stmt, preds: Vec<NodeId>) -> Vec<NodeId> {
        match stmt {
            Stmt::Expression { expr, src } => {
                let id = self.append(NodeKind::Statement, vec![expr.clone()], *src, &preds);
                self.nodes[id].discards_value = true;
                vec![id]
            }
            Stmt::VarDecl {
                names, value, src, ..
            } => {
                let id = self.append(
                    NodeKind::Statement,
                    value.iter().cloned().collect(),
                    *src,
                    &preds,
                );
                self.nodes[id].declared = names.clone();
                vec![id]
            }
            Stmt::Emit { event, src } => {
                vec![self.append(NodeKind::Statement, vec![event.clone()], *src, &preds)]
            }
            Stmt::Placeholder { src } => {
                vec![self.append(NodeKind::Placeholder, Vec::new(), *src, &preds)]
            }
            Stmt::Block { stmts, .. } | Stmt::Unchecked { stmts, .. } => {
                self.lower_block(stmts, preds)
            }
            Stmt::If {
                condition,
                then,
                otherwise,
                src,
            } => {
                let branch = self.append(NodeKind::Branch, vec![condition.clone()], *src, &preds);

                self.guards.push(condition.clone());
                let mut exits = self.lower_block(then, vec![branch]);
                match otherwise {
                    Some(stmts) => exits.extend(self.lower_block(stmts, vec![branch])),
                    None => exits.push(branch),
                }
                self.guards.pop();

                exits
            }
            Stmt::While {
                condition,
                body,
                src,
            } => {
                let index = self.open_loop(LoopKind::While, Some(condition.clone()), *src);
                let head = self.append(
                    NodeKind::LoopCondition,
                    vec![condition.clone()],
                    *src,
                    &preds,
                );
                self.loops[index].header = head;
                self.push_frame(index, head);

                let body_exits = self.lower_block(body, vec![head]);
                for node in body_exits {
                    self.connect(node, head);
                }

                let mut exits = vec![head];
                exits.extend(self.close_loop());
                exits
            }
            Stmt::DoWhile {
                condition,
                body,
                src,
            } => {
                let index = self.open_loop(LoopKind::DoWhile, Some(condition.clone()), *src);
                let head = self.append(NodeKind::LoopHead, Vec::new(), *src, &preds);
                let cond = self.add(NodeKind::LoopCondition, vec![condition.clone()], *src);
                self.loops[index].header = cond;
                self.push_frame(index, cond);

                let body_exits = self.lower_block(body, vec![head]);
                for node in body_exits {
                    self.connect(node, cond);
                }
                self.connect(cond, head);

                let mut exits = vec![cond];
                exits.extend(self.close_loop());
                exits
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
                src,
            } => {
                let preds = match init {
                    Some(init) => self.lower_stmt(init, preds),
                    None => preds,
                };

                let index = self.open_loop(LoopKind::For, condition.clone(), *src);
                let head = match condition {
                    Some(cond) => {
                        self.append(NodeKind::LoopCondition, vec![cond.clone()], *src, &preds)
                    }
                    None => self.append(NodeKind::LoopHead, Vec::new(), *src, &preds),
                };
                self.loops[index].header = head;

                let step = self.add(
                    NodeKind::Statement,
                    update.iter().cloned().collect(),
                    update.as_ref().and_then(|u| u.src()).or(*src),
                );
                self.push_frame(index, step);

                let body_exits = self.lower_block(body, vec![head]);
                for node in body_exits {
                    self.connect(node, step);
                }
                self.connect(step, head);

                let breaks = self.close_loop();
                let mut exits = Vec::new();
                if condition.is_some() {
                    exits.push(head);
                }
                exits.extend(breaks);
                exits
            }
            Stmt::Return { value, src } => {
                let id = self.append(NodeKind::Return, value.iter().cloned().collect(), *src, &preds);
                self.connect(id, Cfg::EXIT);
                Vec::new()
            }
            Stmt::Revert { error, src } => {
                let id = self.append(NodeKind::Revert, error.iter().cloned().collect(), *src, &preds);
                self.connect(id, Cfg::EXIT);
                Vec::new()
            }
            Stmt::Break { src } => {
                let id = self.append(NodeKind::Break, Vec::new(), *src, &preds);
                match self.frames.last_mut() {
                    Some(frame) => {
                        frame.breaks.push(id);
                        let guard = self.guards[frame.guard_base..].last().cloned();
                        let loop_index = frame.loop_index;
                        self.loops[loop_index].break_guards.push(guard);
                    }
                    None => self.connect(id, Cfg::EXIT),
                }
                Vec::new()
            }
            Stmt::Continue { src } => {
                let id = self.append(NodeKind::Continue, Vec::new(), *src, &preds);
                let target = self
                    .frames
                    .last()
                    .map(|f| f.continue_target)
                    .unwrap_or(Cfg::EXIT);
                self.connect(id, target);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_body(json: &str) -> Vec<Stmt> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_linear_body_reaches_exit() {
        let body = parse_body(
            r#"[
                { "node": "expression", "expr": { "node": "identifier", "name": "a" } },
                { "node": "expression", "expr": { "node": "identifier", "name": "b" } }
            ]"#,
        );
        let cfg = Cfg::build(&body);

        assert_eq!(cfg.len(), 4);
        assert!(cfg.reaches(2, 3));
        assert!(!cfg.reaches(3, 2));
        assert!(cfg.reaches(Cfg::ENTRY, Cfg::EXIT));
    }

    #[test]
    fn test_if_without_else_falls_through() {
        let body = parse_body(
            r#"[
                { "node": "if", "condition": { "node": "identifier", "name": "c" },
                  "then": [ { "node": "return" } ] },
                { "node": "expression", "expr": { "node": "identifier", "name": "after" } }
            ]"#,
        );
        let cfg = Cfg::build(&body);

        let branch = 2;
        let after = cfg
            .nodes()
            .iter()
            .position(|n| n.exprs.first().and_then(|e| e.as_identifier()) == Some("after"))
            .unwrap();
        assert_eq!(cfg.node(branch).kind, NodeKind::Branch);
        assert!(cfg.reaches(branch, after));
    }

    #[test]
    fn test_loop_back_edge_makes_body_reachable_from_itself() {
        let body = parse_body(
            r#"[
                { "node": "while", "condition": { "node": "identifier", "name": "c" },
                  "body": [
                    { "node": "expression", "expr": { "node": "identifier", "name": "x" } },
                    { "node": "if", "condition": { "node": "identifier", "name": "stop" },
                      "then": [ { "node": "break" } ] }
                  ] }
            ]"#,
        );
        let cfg = Cfg::build(&body);

        let x = 3;
        assert_eq!(cfg.node(x).loop_depth, 1);
        assert!(cfg.reaches(x, x));
        assert_eq!(cfg.loops().len(), 1);
        assert_eq!(cfg.loops()[0].break_guards.len(), 1);
        assert_eq!(
            cfg.loops()[0].break_guards[0]
                .as_ref()
                .and_then(|g| g.as_identifier()),
            Some("stop")
        );
    }

    #[test]
    fn test_infinite_for_exits_only_through_break() {
        let body = parse_body(
            r#"[
                { "node": "for", "body": [ { "node": "break" } ] },
                { "node": "expression", "expr": { "node": "identifier", "name": "after" } }
            ]"#,
        );
        let cfg = Cfg::build(&body);
        let head = cfg.loops()[0].header;
        let after = cfg.len() - 1;

        assert_eq!(cfg.node(head).kind, NodeKind::LoopHead);
        assert!(cfg.reaches(head, after));
        assert!(!cfg.node(head).successors.contains(&after));
    }
}
