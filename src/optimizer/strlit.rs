//! String-literal lifting (spec §4.4.4). Grounded on
//! `StringLiteralLiftingPass.cpp`: every `StringLiteral` expression is
//! replaced by a `VariableAccess` to a small temporary holding the address
//! of a deduplicated global label, with the `temp := label` assignment
//! inserted immediately before the statement that used the literal.
//!
//! The original pass models the injected assignment as `temp := @label`
//! (an explicit address-of a data-segment symbol); this AST has no
//! standalone address-of node, so a global string label is instead treated
//! as already address-valued when read through `VariableAccess` — the
//! linker resolves it to the label's data-segment address the same way it
//! resolves any other global reference (spec §4.7.1).

use crate::analyzer::Analyzer;
use crate::ast::{Expression, Statement};
use crate::symbol::{Symbol, SymbolKind};
use crate::types::VarType;
use std::collections::HashMap;

/// Tracks deduplicated string literals across the whole program, assigning
/// each distinct value a single global label (spec §4.4.4: literals are
/// deduplicated per function via `string_to_temp`, but labels themselves
/// are a program-wide resource shared with the assembly writer).
#[derive(Default)]
pub struct StringTable {
    labels: HashMap<String, String>,
    counter: u32,
}

impl StringTable {
    pub fn new() -> Self {
        StringTable::default()
    }

    /// Returns the existing label for `value`, or mints `L_strN`.
    pub fn get_or_create_label(&mut self, value: &str) -> String {
        if let Some(label) = self.labels.get(value) {
            return label.clone();
        }
        let label = format!("L_str{}", self.counter);
        self.counter += 1;
        self.labels.insert(value.to_string(), label.clone());
        label
    }

    /// All labels in creation order, for the assembly writer's data segment.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<_> = self.labels.iter().map(|(v, l)| (l.as_str(), v.as_str())).collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
    }
}

/// Lifts every string literal in one function body in place.
pub fn lift_function(
    body: &mut Vec<Statement>,
    function_name: &str,
    analyzer: &mut Analyzer,
    string_table: &mut StringTable,
    temp_counter: &mut u32,
) {
    let mut string_to_temp = HashMap::new();
    let mut i = 0;
    while i < body.len() {
        let mut to_insert = Vec::new();
        match &mut body[i] {
            Statement::Assignment { rhs, .. } => {
                for e in rhs {
                    process_expression(e, function_name, analyzer, string_table, temp_counter, &mut string_to_temp, &mut to_insert);
                }
            }
            Statement::ExpressionStatement(Expression::FunctionCall { args, .. }) => {
                for e in args {
                    process_expression(e, function_name, analyzer, string_table, temp_counter, &mut string_to_temp, &mut to_insert);
                }
            }
            _ => {}
        }

        let inserted = to_insert.len();
        for (offset, stmt) in to_insert.into_iter().enumerate() {
            body.insert(i + offset, stmt);
        }
        i += inserted + 1;
    }
}

fn process_expression(
    expr: &mut Expression,
    function_name: &str,
    analyzer: &mut Analyzer,
    string_table: &mut StringTable,
    temp_counter: &mut u32,
    string_to_temp: &mut HashMap<String, String>,
    to_insert: &mut Vec<Statement>,
) {
    match expr {
        Expression::StringLiteral(value) => {
            if let Some(temp_name) = string_to_temp.get(value) {
                *expr = Expression::VariableAccess(temp_name.clone());
                return;
            }

            let label = string_table.get_or_create_label(value);
            let temp_name = format!("_strlift_temp_{}", temp_counter);
            *temp_counter += 1;
            string_to_temp.insert(value.clone(), temp_name.clone());

            let ty = VarType::POINTER_TO | VarType::STRING;
            let mut symbol = Symbol::new(temp_name.clone(), SymbolKind::LocalVar, ty, analyzer.symbol_table.current_scope_level());
            symbol.function_name = function_name.to_string();
            analyzer.symbol_table.add_symbol(symbol);
            if let Some(metrics) = analyzer.function_metrics.get_mut(function_name) {
                metrics.num_variables_incr(ty);
                metrics.record_variable_type(&temp_name, ty);
            }

            to_insert.push(Statement::Assignment {
                lhs: vec![Expression::VariableAccess(temp_name.clone())],
                rhs: vec![Expression::VariableAccess(label)],
            });

            *expr = Expression::VariableAccess(temp_name);
        }
        Expression::BinaryOp { lhs, rhs, .. } => {
            process_expression(lhs, function_name, analyzer, string_table, temp_counter, string_to_temp, to_insert);
            process_expression(rhs, function_name, analyzer, string_table, temp_counter, string_to_temp, to_insert);
        }
        Expression::FunctionCall { args, .. } => {
            for a in args {
                process_expression(a, function_name, analyzer, string_table, temp_counter, string_to_temp, to_insert);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOperator;
    use crate::symbol::FunctionMetrics;

    #[test]
    fn lifts_single_literal_into_preceding_assignment() {
        let mut analyzer = Analyzer::new();
        analyzer.function_metrics.insert("F".to_string(), FunctionMetrics::new());
        let mut string_table = StringTable::new();
        let mut counter = 0;
        let mut body = vec![Statement::Assignment {
            lhs: vec![Expression::VariableAccess("p".into())],
            rhs: vec![Expression::StringLiteral("hello".into())],
        }];
        lift_function(&mut body, "F", &mut analyzer, &mut string_table, &mut counter);

        assert_eq!(body.len(), 2);
        let Statement::Assignment { rhs, .. } = &body[1] else { panic!() };
        assert!(matches!(rhs[0], Expression::VariableAccess(_)));
    }

    #[test]
    fn duplicate_literals_within_a_function_share_one_temp() {
        let mut analyzer = Analyzer::new();
        analyzer.function_metrics.insert("F".to_string(), FunctionMetrics::new());
        let mut string_table = StringTable::new();
        let mut counter = 0;
        let mut body = vec![
            Statement::Assignment { lhs: vec![Expression::VariableAccess("p".into())], rhs: vec![Expression::StringLiteral("hi".into())] },
            Statement::Assignment { lhs: vec![Expression::VariableAccess("q".into())], rhs: vec![Expression::StringLiteral("hi".into())] },
        ];
        lift_function(&mut body, "F", &mut analyzer, &mut string_table, &mut counter);

        // One label minted, but the second occurrence reuses the cached temp
        // without inserting another assignment.
        assert_eq!(string_table.entries().len(), 1);
        assert_eq!(body.len(), 3);
        let Statement::Assignment { rhs, .. } = &body[1] else { panic!() };
        let Expression::VariableAccess(first) = &rhs[0] else { panic!() };
        let Statement::Assignment { rhs, .. } = &body[2] else { panic!() };
        let Expression::VariableAccess(second) = &rhs[0] else { panic!() };
        assert_eq!(first, second);
    }

    #[test]
    fn literals_across_functions_share_the_same_label_table() {
        let mut analyzer = Analyzer::new();
        analyzer.function_metrics.insert("F".to_string(), FunctionMetrics::new());
        analyzer.function_metrics.insert("G".to_string(), FunctionMetrics::new());
        let mut string_table = StringTable::new();
        let mut counter = 0;
        let mut f_body = vec![Statement::Assignment {
            lhs: vec![Expression::VariableAccess("p".into())],
            rhs: vec![Expression::StringLiteral("shared".into())],
        }];
        let mut g_body = vec![Statement::Assignment {
            lhs: vec![Expression::VariableAccess("q".into())],
            rhs: vec![Expression::StringLiteral("shared".into())],
        }];
        lift_function(&mut f_body, "F", &mut analyzer, &mut string_table, &mut counter);
        lift_function(&mut g_body, "G", &mut analyzer, &mut string_table, &mut counter);
        assert_eq!(string_table.entries().len(), 1);
    }

    #[test]
    fn literal_nested_in_binary_op_is_lifted() {
        let mut analyzer = Analyzer::new();
        analyzer.function_metrics.insert("F".to_string(), FunctionMetrics::new());
        let mut string_table = StringTable::new();
        let mut counter = 0;
        let mut body = vec![Statement::Assignment {
            lhs: vec![Expression::VariableAccess("p".into())],
            rhs: vec![Expression::BinaryOp {
                op: BinaryOperator::Add,
                lhs: Box::new(Expression::StringLiteral("x".into())),
                rhs: Box::new(Expression::IntegerLiteral(1)),
            }],
        }];
        lift_function(&mut body, "F", &mut analyzer, &mut string_table, &mut counter);
        assert_eq!(body.len(), 2);
        let Statement::Assignment { rhs, .. } = &body[1] else { panic!() };
        let Expression::BinaryOp { lhs, .. } = &rhs[0] else { panic!() };
        assert!(matches!(**lhs, Expression::VariableAccess(_)));
    }
}
