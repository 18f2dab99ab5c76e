//! Compile-time bounds checking (spec §4.4.3). Grounded on
//! `BoundsCheckingPass.cpp`: walks the AST checking every `VectorAccess`
//! with a literal index against the accessed symbol's known size, and
//! updates that size whenever an allocation with a statically-known extent
//! is assigned to it.

use crate::analyzer::Analyzer;
use crate::ast::{AllocationKind, Expression, Statement};
use crate::types::VarType;

/// One compile-time bounds violation (spec §4.4.3: "Record an error per
/// violation; do not rewrite the AST").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundsError {
    pub function: String,
    pub vector_name: String,
    pub index: i64,
    pub size: Option<i64>,
}

impl std::fmt::Display for BoundsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.size {
            Some(size) if self.index >= 0 => write!(
                f,
                "in function '{}': vector '{}' index {} is out of bounds (size: {}, valid indices: 0-{})",
                self.function, self.vector_name, self.index, size, size - 1
            ),
            _ => write!(
                f,
                "in function '{}': vector '{}' accessed with invalid negative index {} (only -1, the length, is allowed)",
                self.function, self.vector_name, self.index
            ),
        }
    }
}

/// Checks a whole function body, updating known vector/string sizes in
/// `analyzer`'s symbol table as constant-extent allocations are discovered,
/// and returning every bounds violation found.
pub fn check_function(body: &[Statement], function_name: &str, analyzer: &mut Analyzer) -> Vec<BoundsError> {
    let mut errors = Vec::new();
    for stmt in body {
        check_statement(stmt, function_name, analyzer, &mut errors);
    }
    errors
}

fn check_statement(stmt: &Statement, function_name: &str, analyzer: &mut Analyzer, errors: &mut Vec<BoundsError>) {
    match stmt {
        Statement::Assignment { lhs, rhs } => {
            for e in rhs {
                check_expression(e, function_name, analyzer, errors);
            }
            if lhs.len() == 1 && rhs.len() == 1 {
                if let Expression::VariableAccess(name) = &lhs[0] {
                    record_known_size(name, &rhs[0], function_name, analyzer);
                }
            }
            for e in lhs {
                check_expression(e, function_name, analyzer, errors);
            }
        }
        Statement::ExpressionStatement(e) => check_expression(e, function_name, analyzer, errors),
        Statement::If { condition, then_body, else_body } => {
            check_expression(condition, function_name, analyzer, errors);
            for s in then_body.iter().chain(else_body.iter()) {
                check_statement(s, function_name, analyzer, errors);
            }
        }
        Statement::For { body, .. } | Statement::ForEach { body, .. } => {
            for s in body {
                check_statement(s, function_name, analyzer, errors);
            }
        }
        Statement::Reduction { collection, .. } => check_expression(collection, function_name, analyzer, errors),
        Statement::Block(stmts) => {
            for s in stmts {
                check_statement(s, function_name, analyzer, errors);
            }
        }
        Statement::Return(Some(e)) | Statement::Resultis(e) => check_expression(e, function_name, analyzer, errors),
        Statement::Return(None)
        | Statement::Goto(_)
        | Statement::Label(_)
        | Statement::Break
        | Statement::Loop
        | Statement::EndCase
        | Statement::Finish
        | Statement::ReleaseHeap(_) => {}
        // Synthetic, only produced by the CFG builder after this pass runs.
        Statement::ReductionDirect { .. } => {}
    }
}

fn check_expression(expr: &Expression, function_name: &str, analyzer: &mut Analyzer, errors: &mut Vec<BoundsError>) {
    match expr {
        Expression::VectorAccess { vector, index } => {
            check_expression(vector, function_name, analyzer, errors);
            if let (Expression::VariableAccess(name), Some(i)) = (vector.as_ref(), literal_index(index)) {
                check_constant_access(name, i, function_name, analyzer, errors);
            }
        }
        Expression::BinaryOp { lhs, rhs, .. } => {
            check_expression(lhs, function_name, analyzer, errors);
            check_expression(rhs, function_name, analyzer, errors);
        }
        Expression::PackedAccess { value, .. } => check_expression(value, function_name, analyzer, errors),
        Expression::FunctionCall { args, .. } => {
            for a in args {
                check_expression(a, function_name, analyzer, errors);
            }
        }
        Expression::IntegerLiteral(_)
        | Expression::FloatLiteral(_)
        | Expression::StringLiteral(_)
        | Expression::VariableAccess(_)
        | Expression::Allocation { .. } => {}
    }
}

/// A literal index, or the negation of one (`-N`), as the spec's constant
/// folder would fold it (spec §4.4.3: "`idx` is a literal (or `-idx_literal`)").
fn literal_index(expr: &Expression) -> Option<i64> {
    Analyzer::constant_value(expr)
}

fn check_constant_access(vector_name: &str, index: i64, function_name: &str, analyzer: &mut Analyzer, errors: &mut Vec<BoundsError>) {
    let Some(symbol) = analyzer.symbol_table.lookup(vector_name, function_name) else {
        return;
    };
    let is_sized_container = symbol.ty.contains(VarType::POINTER_TO)
        && (symbol.ty.contains(VarType::VEC) || symbol.ty.contains(VarType::STRING));
    let Some(size) = symbol.size.filter(|_| is_sized_container) else {
        return;
    };

    if index == -1 {
        return; // -1 legitimately reads the length.
    }
    if index < -1 {
        errors.push(BoundsError { function: function_name.to_string(), vector_name: vector_name.to_string(), index, size: None });
        return;
    }
    if index >= size {
        errors.push(BoundsError { function: function_name.to_string(), vector_name: vector_name.to_string(), index, size: Some(size) });
    }
}

/// Spec §4.4.3: "updates `symbol.size`/`symbol.has_size` whenever it sees a
/// `VEC N` allocation with a literal `N`, an `FVEC N` allocation, or a
/// `VEC [e1, …, ek]` initializer (size `= k`)".
fn record_known_size(var_name: &str, rhs: &Expression, function_name: &str, analyzer: &mut Analyzer) {
    let Expression::Allocation { kind, literal_size, initializer_len } = rhs else {
        return;
    };
    if !matches!(kind, AllocationKind::VectorAllocation) {
        return;
    }
    let size = literal_size.or_else(|| initializer_len.map(|n| n as i64));
    let Some(size) = size else {
        return;
    };
    if let Some(mut symbol) = analyzer.symbol_table.lookup(var_name, function_name).cloned() {
        symbol.size = Some(size);
        analyzer.symbol_table.update_symbol(var_name, symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{Symbol, SymbolKind};

    fn sized_vec_symbol(name: &str, function: &str, size: i64) -> Symbol {
        let mut s = Symbol::new(name, SymbolKind::LocalVar, VarType::POINTER_TO | VarType::VEC | VarType::INTEGER, 0);
        s.function_name = function.to_string();
        s.size = Some(size);
        s
    }

    #[test]
    fn in_range_constant_index_produces_no_error() {
        let mut analyzer = Analyzer::new();
        analyzer.symbol_table.add_symbol(sized_vec_symbol("v", "F", 4));
        let body = vec![Statement::ExpressionStatement(Expression::VectorAccess {
            vector: Box::new(Expression::VariableAccess("v".into())),
            index: Box::new(Expression::IntegerLiteral(3)),
        })];
        assert!(check_function(&body, "F", &mut analyzer).is_empty());
    }

    #[test]
    fn out_of_range_constant_index_is_reported() {
        let mut analyzer = Analyzer::new();
        analyzer.symbol_table.add_symbol(sized_vec_symbol("v", "F", 4));
        let body = vec![Statement::ExpressionStatement(Expression::VectorAccess {
            vector: Box::new(Expression::VariableAccess("v".into())),
            index: Box::new(Expression::IntegerLiteral(4)),
        })];
        let errors = check_function(&body, "F", &mut analyzer);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].index, 4);
    }

    #[test]
    fn negative_one_reads_length_without_error() {
        let mut analyzer = Analyzer::new();
        analyzer.symbol_table.add_symbol(sized_vec_symbol("v", "F", 4));
        let body = vec![Statement::ExpressionStatement(Expression::VectorAccess {
            vector: Box::new(Expression::VariableAccess("v".into())),
            index: Box::new(Expression::IntegerLiteral(-1)),
        })];
        assert!(check_function(&body, "F", &mut analyzer).is_empty());
    }

    #[test]
    fn other_negative_indices_are_invalid() {
        let mut analyzer = Analyzer::new();
        analyzer.symbol_table.add_symbol(sized_vec_symbol("v", "F", 4));
        let body = vec![Statement::ExpressionStatement(Expression::VectorAccess {
            vector: Box::new(Expression::VariableAccess("v".into())),
            index: Box::new(Expression::IntegerLiteral(-2)),
        })];
        let errors = check_function(&body, "F", &mut analyzer);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].size.is_none());
    }

    #[test]
    fn vec_allocation_with_literal_size_is_recorded_then_checked() {
        let mut analyzer = Analyzer::new();
        let mut sym = Symbol::new("v", SymbolKind::LocalVar, VarType::POINTER_TO | VarType::VEC | VarType::INTEGER, 0);
        sym.function_name = "F".to_string();
        analyzer.symbol_table.add_symbol(sym);
        let body = vec![
            Statement::Assignment {
                lhs: vec![Expression::VariableAccess("v".into())],
                rhs: vec![Expression::Allocation { kind: AllocationKind::VectorAllocation, literal_size: Some(4), initializer_len: None }],
            },
            Statement::ExpressionStatement(Expression::VectorAccess {
                vector: Box::new(Expression::VariableAccess("v".into())),
                index: Box::new(Expression::IntegerLiteral(10)),
            }),
        ];
        let errors = check_function(&body, "F", &mut analyzer);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].size, Some(4));
    }

    #[test]
    fn unsized_symbol_is_skipped() {
        let mut analyzer = Analyzer::new();
        let mut sym = Symbol::new("v", SymbolKind::LocalVar, VarType::POINTER_TO | VarType::VEC | VarType::INTEGER, 0);
        sym.function_name = "F".to_string();
        analyzer.symbol_table.add_symbol(sym);
        let body = vec![Statement::ExpressionStatement(Expression::VectorAccess {
            vector: Box::new(Expression::VariableAccess("v".into())),
            index: Box::new(Expression::IntegerLiteral(100)),
        })];
        assert!(check_function(&body, "F", &mut analyzer).is_empty());
    }
}
