//! C5: the three two-pass optimizer passes that run on the AST between
//! analysis and CFG construction (spec §4.4). Each submodule is grounded on
//! its matching `original_source` pass of the same name; all three reuse
//! the canonical-expression-string keying scheme below, ported from
//! `CommonSubexpressionEliminationPass::expression_to_string_recursive` /
//! `LocalOptimizationPass::expression_to_string_recursive`.

pub mod bounds;
pub mod cse_global;
pub mod cse_local;
pub mod strlit;

use crate::ast::Expression;

/// A string key that identifies an expression up to commutative-operand
/// reordering, so `a+b` and `b+a` hash identically (spec §4.4.1).
pub fn canonical_key(expr: &Expression) -> String {
    match expr {
        Expression::IntegerLiteral(v) => format!("(INT {v})"),
        Expression::FloatLiteral(v) => format!("(FLOAT {v})"),
        Expression::StringLiteral(s) => format!("(STR {s})"),
        Expression::VariableAccess(name) => format!("(VAR {name})"),
        Expression::BinaryOp { op, lhs, rhs } => {
            let mut left = canonical_key(lhs);
            let mut right = canonical_key(rhs);
            if op.is_commutative() && left > right {
                std::mem::swap(&mut left, &mut right);
            }
            format!("(BIN_OP {} {} {})", op.mnemonic(), left, right)
        }
        Expression::VectorAccess { vector, index } => {
            format!("(VEC_ACCESS {} {})", canonical_key(vector), canonical_key(index))
        }
        Expression::PackedAccess { value, component } => {
            format!("(PACKED_ACCESS {:?} {})", component, canonical_key(value))
        }
        // Allocations have side effects (a fresh heap object per evaluation)
        // and must never compare equal to another textually identical
        // allocation, so the key is keyed on node identity rather than shape.
        Expression::Allocation { .. } => format!("(ALLOC {:p})", expr as *const Expression),
        Expression::FunctionCall { name, args, .. } => {
            let arg_str = args.iter().map(canonical_key).collect::<Vec<_>>().join(" ");
            format!("(CALL {name} {arg_str})")
        }
    }
}

/// Whether CSE may hoist this expression kind at all (spec §4.4.1: "For
/// each `BinaryOp` subexpression" — only binary ops are counted/hoisted;
/// allocations and calls have side effects and must not be deduplicated).
pub fn is_cse_candidate(expr: &Expression) -> bool {
    matches!(expr, Expression::BinaryOp { .. })
}

/// Collects the name a `(VAR name)` canonical key references, for
/// invalidation on assignment (spec §4.4.2: "invalidates all entries whose
/// canonical string names a variable").
pub fn key_mentions_variable(key: &str, var_name: &str) -> bool {
    key.contains(&format!("(VAR {var_name})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOperator;
    use crate::ast::Expression::*;

    #[test]
    fn commutative_operands_canonicalize_identically() {
        let a_plus_b = BinaryOp {
            op: BinaryOperator::Add,
            lhs: Box::new(VariableAccess("a".into())),
            rhs: Box::new(VariableAccess("b".into())),
        };
        let b_plus_a = BinaryOp {
            op: BinaryOperator::Add,
            lhs: Box::new(VariableAccess("b".into())),
            rhs: Box::new(VariableAccess("a".into())),
        };
        assert_eq!(canonical_key(&a_plus_b), canonical_key(&b_plus_a));
    }

    #[test]
    fn non_commutative_operands_stay_ordered() {
        let a_minus_b = BinaryOp {
            op: BinaryOperator::Sub,
            lhs: Box::new(VariableAccess("a".into())),
            rhs: Box::new(VariableAccess("b".into())),
        };
        let b_minus_a = BinaryOp {
            op: BinaryOperator::Sub,
            lhs: Box::new(VariableAccess("b".into())),
            rhs: Box::new(VariableAccess("a".into())),
        };
        assert_ne!(canonical_key(&a_minus_b), canonical_key(&b_minus_a));
    }

    #[test]
    fn key_mentions_variable_matches_substring() {
        let key = canonical_key(&BinaryOp {
            op: BinaryOperator::Add,
            lhs: Box::new(VariableAccess("x".into())),
            rhs: Box::new(IntegerLiteral(1)),
        });
        assert!(key_mentions_variable(&key, "x"));
        assert!(!key_mentions_variable(&key, "y"));
    }
}
