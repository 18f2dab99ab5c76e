//! Global common-subexpression elimination (spec §4.4.1). Grounded on
//! `CommonSubexpressionEliminationPass.cpp`: a whole-function counting
//! sweep followed by a transformation sweep that hoists every
//! more-than-once-seen `BinaryOp` to a single assignment at the top of the
//! function body.

use crate::analyzer::Analyzer;
use crate::ast::{Expression, Statement};
use crate::optimizer::{canonical_key, is_cse_candidate};
use std::collections::HashMap;

/// Runs global CSE over one function's body in place. `function_name` must
/// already have a `FunctionMetrics` entry in `analyzer` (spec §4.3 requires
/// the analyzer pass to have run first).
pub fn run(body: &mut Vec<Statement>, function_name: &str, analyzer: &mut Analyzer) {
    let mut counts = HashMap::new();
    for stmt in body.iter() {
        count_subexpressions(stmt, &mut counts);
    }

    let mut available = HashMap::new();
    let mut hoisted = Vec::new();
    for stmt in body.iter_mut() {
        transform_statement(stmt, function_name, analyzer, &counts, &mut available, &mut hoisted);
    }

    for stmt in hoisted.into_iter().rev() {
        body.insert(0, stmt);
    }
}

fn count_subexpressions(stmt: &Statement, counts: &mut HashMap<String, u32>) {
    match stmt {
        Statement::Assignment { rhs, .. } => {
            for e in rhs {
                count_expr(e, counts);
            }
        }
        Statement::ExpressionStatement(e) => count_expr(e, counts),
        Statement::If { condition, then_body, else_body } => {
            count_expr(condition, counts);
            for s in then_body.iter().chain(else_body.iter()) {
                count_subexpressions(s, counts);
            }
        }
        Statement::For { body, .. } | Statement::ForEach { body, .. } => {
            for s in body {
                count_subexpressions(s, counts);
            }
        }
        Statement::Reduction { collection, .. } => count_expr(collection, counts),
        Statement::Block(stmts) => {
            for s in stmts {
                count_subexpressions(s, counts);
            }
        }
        Statement::Return(Some(e)) | Statement::Resultis(e) => count_expr(e, counts),
        Statement::Return(None)
        | Statement::Goto(_)
        | Statement::Label(_)
        | Statement::Break
        | Statement::Loop
        | Statement::EndCase
        | Statement::Finish
        | Statement::ReleaseHeap(_) => {}
        Statement::ReductionDirect { collection, .. } => count_expr(collection, counts),
    }
}

fn count_expr(expr: &Expression, counts: &mut HashMap<String, u32>) {
    if is_cse_candidate(expr) {
        *counts.entry(canonical_key(expr)).or_insert(0) += 1;
    }
    match expr {
        Expression::BinaryOp { lhs, rhs, .. } => {
            count_expr(lhs, counts);
            count_expr(rhs, counts);
        }
        Expression::VectorAccess { vector, index } => {
            count_expr(vector, counts);
            count_expr(index, counts);
        }
        Expression::PackedAccess { value, .. } => count_expr(value, counts),
        Expression::FunctionCall { args, .. } => {
            for a in args {
                count_expr(a, counts);
            }
        }
        Expression::IntegerLiteral(_)
        | Expression::FloatLiteral(_)
        | Expression::StringLiteral(_)
        | Expression::VariableAccess(_)
        | Expression::Allocation { .. } => {}
    }
}

fn transform_statement(
    stmt: &mut Statement,
    function_name: &str,
    analyzer: &mut Analyzer,
    counts: &HashMap<String, u32>,
    available: &mut HashMap<String, String>,
    hoisted: &mut Vec<Statement>,
) {
    match stmt {
        Statement::Assignment { rhs, .. } => {
            for e in rhs {
                transform_expr(e, function_name, analyzer, counts, available, hoisted);
            }
        }
        Statement::ExpressionStatement(e) => transform_expr(e, function_name, analyzer, counts, available, hoisted),
        Statement::If { condition, then_body, else_body } => {
            transform_expr(condition, function_name, analyzer, counts, available, hoisted);
            for s in then_body.iter_mut().chain(else_body.iter_mut()) {
                transform_statement(s, function_name, analyzer, counts, available, hoisted);
            }
        }
        Statement::For { body, .. } | Statement::ForEach { body, .. } => {
            for s in body {
                transform_statement(s, function_name, analyzer, counts, available, hoisted);
            }
        }
        Statement::Reduction { collection, .. } => {
            transform_expr(collection, function_name, analyzer, counts, available, hoisted)
        }
        Statement::Block(stmts) => {
            for s in stmts {
                transform_statement(s, function_name, analyzer, counts, available, hoisted);
            }
        }
        Statement::Return(Some(e)) | Statement::Resultis(e) => {
            transform_expr(e, function_name, analyzer, counts, available, hoisted)
        }
        Statement::Return(None)
        | Statement::Goto(_)
        | Statement::Label(_)
        | Statement::Break
        | Statement::Loop
        | Statement::EndCase
        | Statement::Finish
        | Statement::ReleaseHeap(_) => {}
        Statement::ReductionDirect { collection, .. } => {
            transform_expr(collection, function_name, analyzer, counts, available, hoisted)
        }
    }
}

fn transform_expr(
    expr: &mut Expression,
    function_name: &str,
    analyzer: &mut Analyzer,
    counts: &HashMap<String, u32>,
    available: &mut HashMap<String, String>,
    hoisted: &mut Vec<Statement>,
) {
    if let Expression::BinaryOp { lhs, rhs, .. } = expr {
        transform_expr(lhs, function_name, analyzer, counts, available, hoisted);
        transform_expr(rhs, function_name, analyzer, counts, available, hoisted);
    }

    if !is_cse_candidate(expr) {
        return;
    }
    let key = canonical_key(expr);
    if counts.get(&key).copied().unwrap_or(0) <= 1 {
        return;
    }

    if let Some(temp_name) = available.get(&key) {
        *expr = Expression::VariableAccess(temp_name.clone());
        return;
    }

    let ty = analyzer.infer_expression_type(expr);
    let temp_name = analyzer.create_temporary(function_name, ty);
    available.insert(key, temp_name.clone());

    let hoisted_expr = std::mem::replace(expr, Expression::VariableAccess(temp_name.clone()));
    hoisted.push(Statement::Assignment {
        lhs: vec![Expression::VariableAccess(temp_name)],
        rhs: vec![hoisted_expr],
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOperator;
    use crate::symbol::FunctionMetrics;

    fn bin(op: BinaryOperator, l: &str, r: &str) -> Expression {
        Expression::BinaryOp {
            op,
            lhs: Box::new(Expression::VariableAccess(l.to_string())),
            rhs: Box::new(Expression::VariableAccess(r.to_string())),
        }
    }

    #[test]
    fn repeated_subexpression_is_hoisted_once() {
        let mut analyzer = Analyzer::new();
        analyzer.function_metrics.insert("F".to_string(), FunctionMetrics::new());
        let mut body = vec![
            Statement::Assignment {
                lhs: vec![Expression::VariableAccess("p".into())],
                rhs: vec![bin(BinaryOperator::Add, "a", "b")],
            },
            Statement::Assignment {
                lhs: vec![Expression::VariableAccess("q".into())],
                rhs: vec![bin(BinaryOperator::Add, "a", "b")],
            },
        ];
        run(&mut body, "F", &mut analyzer);

        // One hoisted temp assignment prepended, plus the original two statements.
        assert_eq!(body.len(), 3);
        let Statement::Assignment { rhs, .. } = &body[1] else { panic!() };
        let Expression::VariableAccess(temp1) = &rhs[0] else { panic!("expected hoisted var") };
        let Statement::Assignment { rhs, .. } = &body[2] else { panic!() };
        let Expression::VariableAccess(temp2) = &rhs[0] else { panic!("expected hoisted var") };
        assert_eq!(temp1, temp2);
    }

    #[test]
    fn single_occurrence_is_left_untouched() {
        let mut analyzer = Analyzer::new();
        analyzer.function_metrics.insert("F".to_string(), FunctionMetrics::new());
        let mut body = vec![Statement::Assignment {
            lhs: vec![Expression::VariableAccess("p".into())],
            rhs: vec![bin(BinaryOperator::Add, "a", "b")],
        }];
        run(&mut body, "F", &mut analyzer);
        assert_eq!(body.len(), 1);
        let Statement::Assignment { rhs, .. } = &body[0] else { panic!() };
        assert!(matches!(rhs[0], Expression::BinaryOp { .. }));
    }
}
