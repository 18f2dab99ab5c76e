//! C6: per-function control-flow graph construction (spec §3.6, §4.5).
//! Grounded on `original_source/CFGBuilderPass.h`: one builder walks a
//! function body producing basic blocks, wiring break/loop/endcase target
//! stacks, resolving gotos once every label is known, and weaving a
//! scope-cleanup chain (plus reverse-ordered deferred statements) into
//! every exit path. ASTAnalyzer-era cleanup is deliberately not re-done
//! here; this builder is the sole authority for it (spec §4.5 preamble).

use std::collections::BTreeMap;

use crate::ast::{Expression, Statement};
use crate::error::CoreError;
use crate::reducer::{create_reducer, Reducer};
use crate::symbol::SymbolTable;
use crate::types::VarType;

pub type BlockId = u32;

/// How a block transfers control to a successor (spec §3.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    FallThrough,
    ConditionalTrue,
    ConditionalFalse,
    LoopBack,
    Cleanup,
}

/// A basic block: a stable id and an ordered sequence of AST statement
/// fragments (spec §3.6) — not instructions; the (out-of-scope) code
/// emitter lowers these later.
#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    pub id: BlockId,
    pub statements: Vec<Statement>,
    pub successors: Vec<(BlockId, EdgeKind)>,
}

impl BasicBlock {
    pub fn label(&self) -> String {
        format!("BB_{}", self.id)
    }
}

/// A function's CFG: entry block, exit block, and the id -> block map
/// (spec §3.6). Single-entry, multi-exit only at the language level — every
/// exit path is woven through a cleanup chain before it reaches `exit`.
#[derive(Debug)]
pub struct ControlFlowGraph {
    pub function_name: String,
    pub entry: BlockId,
    pub exit: BlockId,
    pub blocks: BTreeMap<BlockId, BasicBlock>,
}

impl ControlFlowGraph {
    /// Spec §8 "CFG invariants": every block reachable from entry, every
    /// non-return block has a successor, every predecessor/successor
    /// relation is symmetric. Returns human-readable diagnostics rather
    /// than a `CoreError` — these are test-harness-level invariants, not
    /// part of the closed runtime error taxonomy (spec §6.5).
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let mut reachable = std::collections::BTreeSet::new();
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(block) = self.blocks.get(&id) {
                for (succ, _) in &block.successors {
                    stack.push(*succ);
                }
            }
        }
        for id in self.blocks.keys() {
            if !reachable.contains(id) {
                problems.push(format!("block BB_{id} is unreachable from entry"));
            }
        }

        for (id, block) in &self.blocks {
            if *id != self.exit && block.successors.is_empty() {
                problems.push(format!("non-exit block BB_{id} has no successors"));
            }
        }

        let mut predecessors: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
        for (id, block) in &self.blocks {
            for (succ, _) in &block.successors {
                predecessors.entry(*succ).or_default().push(*id);
            }
        }
        for (id, preds) in &predecessors {
            for pred in preds {
                let pred_block = match self.blocks.get(pred) {
                    Some(b) => b,
                    None => {
                        problems.push(format!("BB_{id} lists predecessor BB_{pred} which does not exist"));
                        continue;
                    }
                };
                if !pred_block.successors.iter().any(|(s, _)| s == id) {
                    problems.push(format!("predecessor/successor relation asymmetric between BB_{pred} and BB_{id}"));
                }
            }
        }

        problems
    }
}

/// Builds the CFG for one function body (spec §4.5).
pub struct CfgBuilder<'a> {
    function_name: String,
    symbol_table: &'a SymbolTable,
    blocks: BTreeMap<BlockId, BasicBlock>,
    next_id: BlockId,
    current: BlockId,
    entry: BlockId,
    exit: BlockId,
    break_targets: Vec<BlockId>,
    loop_targets: Vec<BlockId>,
    endcase_targets: Vec<BlockId>,
    deferred_statements: Vec<Statement>,
    unresolved_gotos: Vec<(String, BlockId)>,
    label_targets: BTreeMap<String, BlockId>,
    /// Scope depth mirroring `SymbolTable::enter_scope`/`exit_scope`
    /// nesting, so cleanup chains can ask `symbol_table.symbols_in_scope`
    /// for exactly the names declared in the block that is ending.
    scope_depth: i32,
}

impl<'a> CfgBuilder<'a> {
    pub fn new(function_name: impl Into<String>, symbol_table: &'a SymbolTable) -> Self {
        let mut blocks = BTreeMap::new();
        blocks.insert(0, BasicBlock { id: 0, ..Default::default() });
        CfgBuilder {
            function_name: function_name.into(),
            symbol_table,
            blocks,
            next_id: 1,
            current: 0,
            entry: 0,
            exit: 0, // patched once the exit block is allocated in `build`
            break_targets: Vec::new(),
            loop_targets: Vec::new(),
            endcase_targets: Vec::new(),
            deferred_statements: Vec::new(),
            unresolved_gotos: Vec::new(),
            label_targets: BTreeMap::new(),
            scope_depth: 0,
        }
    }

    fn new_block(&mut self) -> BlockId {
        let id = self.next_id;
        self.next_id += 1;
        self.blocks.insert(id, BasicBlock { id, ..Default::default() });
        id
    }

    fn push_stmt(&mut self, stmt: Statement) {
        self.blocks.get_mut(&self.current).unwrap().statements.push(stmt);
    }

    fn is_terminated(&self, id: BlockId) -> bool {
        !self.blocks[&id].successors.is_empty()
    }

    /// True once nothing more should ever be appended to `id`: either it
    /// already has a successor, or its last statement is an exit tail
    /// (`Return`/`Resultis`/`Finish`) woven by [`Self::weave_exit_path`],
    /// which deliberately leaves the block unlinked until `exit` exists.
    fn is_closed(&self, id: BlockId) -> bool {
        self.is_terminated(id)
            || matches!(
                self.blocks[&id].statements.last(),
                Some(Statement::Return(_) | Statement::Resultis(_) | Statement::Finish)
            )
    }

    fn link(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        self.blocks.get_mut(&from).unwrap().successors.push((to, kind));
    }

    /// Builds the CFG for `body` declared at global scope level `base_scope`
    /// (the level `symbol_table` recorded for this function's top-level
    /// locals and parameters — callers pass whatever the analyzer used when
    /// walking this same body).
    pub fn build(mut self, body: &[Statement], base_scope: i32) -> Result<ControlFlowGraph, CoreError> {
        self.scope_depth = base_scope;
        self.visit_statements(body);
        if !self.is_closed(self.current) {
            self.weave_exit_path(Statement::Return(None));
        }

        let exit = self.new_block();
        self.exit = exit;
        // Every synthesized exit path links through a Cleanup block that
        // currently dangles (its terminal successor was never set, since
        // `exit` did not exist yet at weave time); patch them all now.
        let dangling: Vec<BlockId> = self
            .blocks
            .iter()
            .filter(|(id, b)| **id != exit && b.successors.is_empty() && b.statements.iter().any(|s| matches!(s, Statement::Return(_) | Statement::Resultis(_) | Statement::Finish)))
            .map(|(id, _)| *id)
            .collect();
        for id in dangling {
            self.link(id, exit, EdgeKind::FallThrough);
        }

        for (label, source) in self.unresolved_gotos.clone() {
            match self.label_targets.get(&label) {
                Some(&target) => self.link(source, target, EdgeKind::FallThrough),
                None => return Err(CoreError::UnresolvedLabel(label)),
            }
        }

        Ok(ControlFlowGraph {
            function_name: self.function_name,
            entry: self.entry,
            exit: self.exit,
            blocks: self.blocks,
        })
    }

    fn visit_statements(&mut self, stmts: &[Statement]) {
        for stmt in stmts {
            if self.is_closed(self.current) {
                // Unreachable code after a terminator (goto/return/break/...);
                // open a fresh block so later statements still have
                // somewhere to live, matching the parser's right to emit
                // trailing dead statements.
                self.current = self.new_block();
            }
            self.visit_statement(stmt);
        }
    }

    fn visit_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Assignment { .. } | Statement::ExpressionStatement(_) => {
                self.push_stmt(stmt.clone());
            }
            Statement::If { condition, then_body, else_body } => {
                self.push_stmt(Statement::ExpressionStatement(condition.clone()));
                let then_id = self.new_block();
                let else_id = self.new_block();
                let join_id = self.new_block();
                self.link(self.current, then_id, EdgeKind::ConditionalTrue);
                self.link(self.current, else_id, EdgeKind::ConditionalFalse);

                self.current = then_id;
                self.enter_nested_scope(then_body, join_id);

                self.current = else_id;
                self.enter_nested_scope(else_body, join_id);

                self.current = join_id;
            }
            Statement::For { var, constant_extent, body } => {
                self.visit_loop(
                    Statement::For { var: var.clone(), constant_extent: *constant_extent, body: Vec::new() },
                    body,
                );
            }
            Statement::ForEach { var, collection, destructuring_vars, body } => {
                self.visit_loop(
                    Statement::ForEach {
                        var: var.clone(),
                        collection: collection.clone(),
                        destructuring_vars: destructuring_vars.clone(),
                        body: Vec::new(),
                    },
                    body,
                );
            }
            Statement::Reduction { result_var, operation_name, collection } => {
                self.visit_reduction(result_var, operation_name, collection);
            }
            Statement::Goto(label) => {
                self.push_stmt(stmt.clone());
                self.unresolved_gotos.push((label.clone(), self.current));
            }
            Statement::Label(name) => {
                if !self.blocks[&self.current].statements.is_empty() || self.is_closed(self.current) {
                    let next = self.new_block();
                    if !self.is_closed(self.current) {
                        self.link(self.current, next, EdgeKind::FallThrough);
                    }
                    self.current = next;
                }
                self.label_targets.insert(name.clone(), self.current);
                self.push_stmt(stmt.clone());
            }
            Statement::Break => {
                if let Some(&target) = self.break_targets.last() {
                    self.link(self.current, target, EdgeKind::FallThrough);
                }
            }
            Statement::Loop => {
                if let Some(&target) = self.loop_targets.last() {
                    self.link(self.current, target, EdgeKind::LoopBack);
                }
            }
            Statement::EndCase => {
                if let Some(&target) = self.endcase_targets.last() {
                    self.link(self.current, target, EdgeKind::FallThrough);
                }
            }
            Statement::Return(_) | Statement::Resultis(_) | Statement::Finish => {
                self.weave_exit_path(stmt.clone());
            }
            Statement::Block(inner) => {
                let after = self.new_block();
                self.enter_nested_scope(inner, after);
                self.current = after;
            }
            Statement::ReleaseHeap(_) | Statement::ReductionDirect { .. } => {
                self.push_stmt(stmt.clone());
            }
        }
    }

    /// Visits `body` as a nested scope, emitting that scope's cleanup chain
    /// on normal fall-off-the-end (not via an explicit terminator), then
    /// linking into `join` (spec §4.5 "When a block ends, generate a
    /// scope-cleanup chain").
    fn enter_nested_scope(&mut self, body: &[Statement], join: BlockId) {
        self.scope_depth += 1;
        self.visit_statements(body);
        if !self.is_closed(self.current) {
            self.emit_scope_cleanup(self.scope_depth);
            self.link(self.current, join, EdgeKind::Cleanup);
        }
        self.scope_depth -= 1;
    }

    fn visit_loop(&mut self, header_marker: Statement, body: &[Statement]) {
        let header_id = self.new_block();
        let body_id = self.new_block();
        let after_id = self.new_block();
        if !self.is_closed(self.current) {
            self.link(self.current, header_id, EdgeKind::FallThrough);
        }
        self.current = header_id;
        self.push_stmt(header_marker);
        self.link(header_id, body_id, EdgeKind::ConditionalTrue);
        self.link(header_id, after_id, EdgeKind::ConditionalFalse);

        self.current = body_id;
        self.loop_targets.push(header_id);
        self.break_targets.push(after_id);
        self.scope_depth += 1;
        self.visit_statements(body);
        if !self.is_closed(self.current) {
            self.emit_scope_cleanup(self.scope_depth);
            self.link(self.current, header_id, EdgeKind::LoopBack);
        }
        self.scope_depth -= 1;
        self.loop_targets.pop();
        self.break_targets.pop();

        self.current = after_id;
    }

    /// Spec §4.5 "For reduction statements": direct-NEON lowering for
    /// PAIR/FPAIR/QUAD-shaped collections, else a synthesized counted loop
    /// using the reducer's scalar operator and initial value.
    fn visit_reduction(&mut self, result_var: &str, operation_name: &str, collection: &Expression) {
        let Some(reducer) = create_reducer(&operation_name.to_ascii_uppercase()) else {
            // Unknown reducer: recorded by the caller via `CoreError::UnknownReducer`
            // at a higher level (the analyzer pass); the CFG builder degrades
            // to leaving the statement untouched so later passes still see it.
            self.push_stmt(Statement::Reduction {
                result_var: result_var.to_string(),
                operation_name: operation_name.to_string(),
                collection: collection.clone(),
            });
            return;
        };

        if self.is_packed_collection(collection) {
            self.push_stmt(Statement::ReductionDirect {
                result_var: result_var.to_string(),
                reducer_name: reducer.name().to_string(),
                collection: collection.clone(),
            });
            return;
        }

        if let Some(init) = reducer.initial_value() {
            self.push_stmt(Statement::Assignment {
                lhs: vec![Expression::VariableAccess(result_var.to_string())],
                rhs: vec![init],
            });
        }
        let body = vec![Statement::Assignment {
            lhs: vec![Expression::VariableAccess(result_var.to_string())],
            rhs: vec![Expression::BinaryOp {
                op: reducer.scalar_operator(),
                lhs: Box::new(Expression::VariableAccess(result_var.to_string())),
                rhs: Box::new(Expression::VariableAccess("_reduce_elem".to_string())),
            }],
        }];
        self.visit_loop(
            Statement::ForEach {
                var: "_reduce_elem".to_string(),
                collection: collection.clone(),
                destructuring_vars: Vec::new(),
                body: Vec::new(),
            },
            &body,
        );
    }

    fn is_packed_collection(&self, collection: &Expression) -> bool {
        let Expression::VariableAccess(name) = collection else {
            return false;
        };
        self.symbol_table
            .lookup(name, &self.function_name)
            .map(|s| s.ty.is_pair_like() || s.ty.is_quad_like())
            .unwrap_or(false)
    }

    /// Weaves cleanup for every active scope level plus reverse-ordered
    /// deferred statements into the current block before `tail_stmt`, then
    /// leaves the block unterminated (the final link to `exit` is patched
    /// once `exit` is allocated at the end of `build`) — spec §4.5 "every
    /// exit path passes through scope cleanup before leaving the function".
    fn weave_exit_path(&mut self, tail_stmt: Statement) {
        let cleanup_id = self.new_block();
        self.link(self.current, cleanup_id, EdgeKind::Cleanup);
        self.current = cleanup_id;
        for level in (1..=self.scope_depth).rev() {
            self.emit_scope_cleanup(level);
        }
        for stmt in self.deferred_statements.clone().into_iter().rev() {
            self.push_stmt(stmt);
        }
        self.push_stmt(tail_stmt);
    }

    /// Registers a statement to run (in reverse declaration order, relative
    /// to other deferred statements) on every function-exit path (spec §4.5
    /// "deferred_statements vector").
    pub fn push_deferred(&mut self, stmt: Statement) {
        self.deferred_statements.push(stmt);
    }

    fn emit_scope_cleanup(&mut self, scope_level: i32) {
        let owning_names: Vec<String> = self
            .symbol_table
            .symbols_in_scope(scope_level)
            .into_iter()
            .filter(|s| s.function_name == self.function_name && s.owns_heap_memory)
            .map(|s| s.name.clone())
            .collect();
        for name in owning_names.into_iter().rev() {
            self.push_stmt(Statement::ReleaseHeap(name));
        }
    }
}

/// Whether `ty` denotes a collection the reduction lowering should treat as
/// NEON-direct (spec §4.9 table; restated here since `CfgBuilder` only has
/// a `SymbolTable`, not the analyzer's full type-inference surface).
pub fn is_neon_direct_reducer(reducer: &Reducer, ty: VarType) -> bool {
    reducer.is_pairwise() || ty.is_pair_like() || ty.is_quad_like()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOperator;
    use crate::symbol::{Symbol, SymbolKind};

    fn build_cfg(body: &[Statement]) -> ControlFlowGraph {
        let table = SymbolTable::new();
        CfgBuilder::new("F", &table).build(body, 1).unwrap()
    }

    #[test]
    fn straight_line_body_links_entry_to_exit() {
        let body = vec![Statement::Assignment {
            lhs: vec![Expression::VariableAccess("x".into())],
            rhs: vec![Expression::IntegerLiteral(1)],
        }];
        let cfg = build_cfg(&body);
        assert!(cfg.validate().is_empty(), "{:?}", cfg.validate());
        assert_ne!(cfg.entry, cfg.exit);
    }

    #[test]
    fn if_statement_produces_then_else_join_blocks() {
        let body = vec![Statement::If {
            condition: Expression::IntegerLiteral(1),
            then_body: vec![Statement::Assignment {
                lhs: vec![Expression::VariableAccess("x".into())],
                rhs: vec![Expression::IntegerLiteral(1)],
            }],
            else_body: vec![Statement::Assignment {
                lhs: vec![Expression::VariableAccess("x".into())],
                rhs: vec![Expression::IntegerLiteral(2)],
            }],
        }];
        let cfg = build_cfg(&body);
        assert!(cfg.validate().is_empty(), "{:?}", cfg.validate());
        // entry, then, else, join, exit-cleanup, exit = at least 5 blocks.
        assert!(cfg.blocks.len() >= 5);
    }

    #[test]
    fn goto_to_unknown_label_is_fatal() {
        let table = SymbolTable::new();
        let body = vec![Statement::Goto("nowhere".to_string())];
        let err = CfgBuilder::new("F", &table).build(&body, 1).unwrap_err();
        assert_eq!(err, CoreError::UnresolvedLabel("nowhere".to_string()));
    }

    #[test]
    fn goto_to_known_label_resolves() {
        let table = SymbolTable::new();
        let body = vec![
            Statement::Goto("here".to_string()),
            Statement::Label("here".to_string()),
            Statement::Assignment {
                lhs: vec![Expression::VariableAccess("x".into())],
                rhs: vec![Expression::IntegerLiteral(1)],
            },
        ];
        let cfg = CfgBuilder::new("F", &table).build(&body, 1).unwrap();
        assert!(cfg.validate().is_empty(), "{:?}", cfg.validate());
    }

    #[test]
    fn break_targets_the_innermost_loop() {
        let body = vec![Statement::For {
            var: "i".to_string(),
            constant_extent: Some(4),
            body: vec![Statement::If {
                condition: Expression::IntegerLiteral(1),
                then_body: vec![Statement::Break],
                else_body: vec![],
            }],
        }];
        let cfg = build_cfg(&body);
        assert!(cfg.validate().is_empty(), "{:?}", cfg.validate());
    }

    #[test]
    fn loop_jumps_back_to_the_innermost_header() {
        let body = vec![Statement::For {
            var: "i".to_string(),
            constant_extent: Some(4),
            body: vec![Statement::If {
                condition: Expression::IntegerLiteral(1),
                then_body: vec![Statement::Loop],
                else_body: vec![],
            }],
        }];
        let cfg = build_cfg(&body);
        assert!(cfg.validate().is_empty(), "{:?}", cfg.validate());
    }

    #[test]
    fn scope_exit_releases_owned_symbols_in_reverse_order() {
        let mut table = SymbolTable::new();
        let mut a = Symbol::new("a", SymbolKind::LocalVar, VarType::POINTER_TO | VarType::OBJECT, 1);
        a.function_name = "F".to_string();
        a.owns_heap_memory = true;
        let mut b = Symbol::new("b", SymbolKind::LocalVar, VarType::POINTER_TO | VarType::OBJECT, 1);
        b.function_name = "F".to_string();
        b.owns_heap_memory = true;
        table.add_symbol(a);
        table.add_symbol(b);

        let body = vec![Statement::Assignment {
            lhs: vec![Expression::VariableAccess("x".into())],
            rhs: vec![Expression::IntegerLiteral(1)],
        }];
        let cfg = CfgBuilder::new("F", &table).build(&body, 1).unwrap();
        let releases: Vec<&str> = cfg
            .blocks
            .values()
            .flat_map(|b| &b.statements)
            .filter_map(|s| match s {
                Statement::ReleaseHeap(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(releases, vec!["b", "a"]);
    }

    #[test]
    fn deferred_statements_run_in_reverse_order_before_return() {
        let table = SymbolTable::new();
        let mut builder = CfgBuilder::new("F", &table);
        builder.push_deferred(Statement::ExpressionStatement(Expression::FunctionCall {
            name: "first".to_string(),
            args: vec![],
            is_runtime: false,
        }));
        builder.push_deferred(Statement::ExpressionStatement(Expression::FunctionCall {
            name: "second".to_string(),
            args: vec![],
            is_runtime: false,
        }));
        let body = vec![Statement::Return(None)];
        let cfg = builder.build(&body, 1).unwrap();
        let calls: Vec<&str> = cfg
            .blocks
            .values()
            .flat_map(|b| &b.statements)
            .filter_map(|s| match s {
                Statement::ExpressionStatement(Expression::FunctionCall { name, .. }) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec!["second", "first"]);
    }

    #[test]
    fn reduction_on_packed_type_lowers_to_direct_neon_marker() {
        let mut table = SymbolTable::new();
        let mut p = Symbol::new("pr", SymbolKind::LocalVar, VarType::PAIR, 1);
        p.function_name = "F".to_string();
        table.add_symbol(p);
        let body = vec![Statement::Reduction {
            result_var: "r".to_string(),
            operation_name: "sum".to_string(),
            collection: Expression::VariableAccess("pr".to_string()),
        }];
        let cfg = CfgBuilder::new("F", &table).build(&body, 1).unwrap();
        let has_direct = cfg.blocks.values().flat_map(|b| &b.statements).any(|s| matches!(s, Statement::ReductionDirect { .. }));
        assert!(has_direct);
    }

    #[test]
    fn reduction_on_plain_vector_synthesizes_counted_loop() {
        let table = SymbolTable::new();
        let body = vec![Statement::Reduction {
            result_var: "r".to_string(),
            operation_name: "sum".to_string(),
            collection: Expression::VariableAccess("vec".to_string()),
        }];
        let cfg = CfgBuilder::new("F", &table).build(&body, 1).unwrap();
        let has_foreach = cfg.blocks.values().flat_map(|b| &b.statements).any(|s| matches!(s, Statement::ForEach { .. }));
        assert!(has_foreach);
        let has_init = cfg.blocks.values().flat_map(|b| &b.statements).any(|s| matches!(s, Statement::Assignment { rhs, .. } if matches!(rhs.as_slice(), [Expression::IntegerLiteral(0)])));
        assert!(has_init);
        let _ = BinaryOperator::Add;
    }
}
