//! Local (statement-by-statement) common-subexpression elimination (spec
//! §4.4.2). Grounded on `LocalOptimizationPass.cpp`: counts subexpressions
//! across the whole statement list first, then walks it again inserting
//! each hoisted temp immediately before the statement that needs it, and
//! invalidates cached expressions that mention a variable once it is
//! reassigned.

use crate::analyzer::Analyzer;
use crate::ast::{Expression, Statement};
use crate::optimizer::{canonical_key, is_cse_candidate, key_mentions_variable};
use std::collections::HashMap;

/// Runs local CSE over one statement list in place (a function body, or any
/// nested block the CFG builder treats as its own basic block).
pub fn run(statements: &mut Vec<Statement>, function_name: &str, analyzer: &mut Analyzer) {
    let mut counts = HashMap::new();
    for stmt in statements.iter() {
        count_expr_in_statement(stmt, &mut counts);
    }

    let mut available: HashMap<String, String> = HashMap::new();
    let mut i = 0;
    while i < statements.len() {
        let assigned_vars = assigned_variable_names(&statements[i]);

        let mut to_insert = Vec::new();
        match &mut statements[i] {
            Statement::Assignment { rhs, .. } => {
                for e in rhs {
                    optimize_expr(e, function_name, analyzer, &counts, &mut available, &mut to_insert);
                }
            }
            Statement::ExpressionStatement(Expression::FunctionCall { args, .. }) => {
                for e in args {
                    optimize_expr(e, function_name, analyzer, &counts, &mut available, &mut to_insert);
                }
            }
            _ => {}
        }

        let inserted = to_insert.len();
        for (offset, stmt) in to_insert.into_iter().enumerate() {
            statements.insert(i + offset, stmt);
        }
        i += inserted + 1;

        for var in assigned_vars {
            available.retain(|key, _| !key_mentions_variable(key, &var));
        }
    }
}

/// Variables this statement's LHS assigns to — anything naming them in a
/// cached canonical key is no longer a valid "available expression".
fn assigned_variable_names(stmt: &Statement) -> Vec<String> {
    match stmt {
        Statement::Assignment { lhs, .. } => lhs
            .iter()
            .filter_map(|e| match e {
                Expression::VariableAccess(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn count_expr_in_statement(stmt: &Statement, counts: &mut HashMap<String, u32>) {
    match stmt {
        Statement::Assignment { rhs, .. } => {
            for e in rhs {
                count_expr(e, counts);
            }
        }
        Statement::ExpressionStatement(Expression::FunctionCall { args, .. }) => {
            for e in args {
                count_expr(e, counts);
            }
        }
        _ => {}
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
        Expression::FunctionCall { args, .. } => {
            for a in args {
                count_expr(a, counts);
            }
        }
        _ => {}
    }
}

fn optimize_expr(
    expr: &mut Expression,
    function_name: &str,
    analyzer: &mut Analyzer,
    counts: &HashMap<String, u32>,
    available: &mut HashMap<String, String>,
    to_insert: &mut Vec<Statement>,
) {
    if let Expression::BinaryOp { lhs, rhs, .. } = expr {
        optimize_expr(lhs, function_name, analyzer, counts, available, to_insert);
        optimize_expr(rhs, function_name, analyzer, counts, available, to_insert);
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

    let original = std::mem::replace(expr, Expression::VariableAccess(temp_name.clone()));
    to_insert.push(Statement::Assignment {
        lhs: vec![Expression::VariableAccess(temp_name)],
        rhs: vec![original],
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOperator;
    use crate::symbol::FunctionMetrics;

    fn bin(l: &str, r: &str) -> Expression {
        Expression::BinaryOp {
            op: BinaryOperator::Add,
            lhs: Box::new(Expression::VariableAccess(l.to_string())),
            rhs: Box::new(Expression::VariableAccess(r.to_string())),
        }
    }

    #[test]
    fn hoists_immediately_before_using_statement() {
        let mut analyzer = Analyzer::new();
        analyzer.function_metrics.insert("F".to_string(), FunctionMetrics::new());
        let mut stmts = vec![
            Statement::Assignment { lhs: vec![Expression::VariableAccess("p".into())], rhs: vec![bin("a", "b")] },
            Statement::Assignment { lhs: vec![Expression::VariableAccess("q".into())], rhs: vec![bin("a", "b")] },
        ];
        run(&mut stmts, "F", &mut analyzer);
        // Hoisted right before the first use (already a repeated expression
        // at that point); the second use then just reads the cached temp.
        assert_eq!(stmts.len(), 3);
        let Statement::Assignment { lhs, rhs, .. } = &stmts[0] else { panic!() };
        let Expression::VariableAccess(temp) = &lhs[0] else { panic!("expected hoisted temp") };
        assert!(matches!(rhs[0], Expression::BinaryOp { .. }));

        let Statement::Assignment { rhs, .. } = &stmts[1] else { panic!() };
        assert_eq!(rhs[0], Expression::VariableAccess(temp.clone()));
        let Statement::Assignment { rhs, .. } = &stmts[2] else { panic!() };
        assert_eq!(rhs[0], Expression::VariableAccess(temp.clone()));
    }

    #[test]
    fn reassigning_operand_forces_recomputation_under_a_fresh_temp() {
        let mut analyzer = Analyzer::new();
        analyzer.function_metrics.insert("F".to_string(), FunctionMetrics::new());
        let mut stmts = vec![
            Statement::Assignment { lhs: vec![Expression::VariableAccess("p".into())], rhs: vec![bin("a", "b")] },
            Statement::Assignment { lhs: vec![Expression::VariableAccess("a".into())], rhs: vec![Expression::IntegerLiteral(9)] },
            Statement::Assignment { lhs: vec![Expression::VariableAccess("q".into())], rhs: vec![bin("a", "b")] },
        ];
        run(&mut stmts, "F", &mut analyzer);

        // Layout after both occurrences hoist: [temp0:=a+b, p:=temp0, a:=9, temp1:=a+b, q:=temp1]
        assert_eq!(stmts.len(), 5);
        let Statement::Assignment { lhs, .. } = &stmts[0] else { panic!() };
        let Expression::VariableAccess(first_temp) = &lhs[0] else { panic!("expected hoisted var") };

        let Statement::Assignment { lhs, .. } = &stmts[3] else { panic!() };
        let Expression::VariableAccess(second_temp) = &lhs[0] else { panic!("expected hoisted var") };

        // Invalidated by the reassignment of "a" -> recomputed under a distinct temporary.
        assert_ne!(first_temp, second_temp);
    }
}
