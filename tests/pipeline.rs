//! Black-box scenario tests exercising the public API end to end, in the
//! teacher's style of separating unit tests (in-crate) from integration
//! tests that drive several modules together (spec §13).

use bcplc_aarch64_core::analyzer::Analyzer;
use bcplc_aarch64_core::ast::{AllocationKind, BinaryOperator, Expression, FunctionDecl, Statement};
use bcplc_aarch64_core::cfg::CfgBuilder;
use bcplc_aarch64_core::isa::aarch64::emit::create_branch_with_link;
use bcplc_aarch64_core::linker;
use bcplc_aarch64_core::optimizer::{bounds, cse_global};

fn func(name: &str, body: Vec<Statement>) -> FunctionDecl {
    FunctionDecl {
        name: name.to_string(),
        class_name: None,
        parameters: Vec::new(),
        body,
        returns_float: false,
    }
}

#[test]
fn global_cse_hoists_a_repeated_binary_expression_across_two_statements() {
    let mut analyzer = Analyzer::new();
    let repeated = Expression::BinaryOp {
        op: BinaryOperator::Add,
        lhs: Box::new(Expression::VariableAccess("A".to_string())),
        rhs: Box::new(Expression::VariableAccess("B".to_string())),
    };
    let decl = func(
        "Sum",
        vec![
            Statement::Assignment {
                lhs: vec![Expression::VariableAccess("X".to_string())],
                rhs: vec![repeated.clone()],
            },
            Statement::Assignment {
                lhs: vec![Expression::VariableAccess("Y".to_string())],
                rhs: vec![repeated],
            },
        ],
    );
    analyzer.analyze_function(&decl);

    let mut body = decl.body.clone();
    cse_global::run(&mut body, "Sum", &mut analyzer);

    // A hoisted temporary assignment should now precede both original uses.
    assert!(body.len() > decl.body.len());
    let hoisted_count = body
        .iter()
        .filter(|s| matches!(s, Statement::Assignment { rhs, .. } if rhs.len() == 1 && matches!(&rhs[0], Expression::BinaryOp { .. })))
        .count();
    assert_eq!(hoisted_count, 1, "exactly one hoisted temp assignment, the rest reference it");
}

#[test]
fn bounds_checker_flags_out_of_range_literal_index_after_constant_sized_allocation() {
    let mut analyzer = Analyzer::new();
    let decl = func(
        "Overrun",
        vec![
            Statement::Assignment {
                lhs: vec![Expression::VariableAccess("V".to_string())],
                rhs: vec![Expression::Allocation {
                    kind: AllocationKind::VectorAllocation,
                    literal_size: Some(4),
                    initializer_len: None,
                }],
            },
            Statement::ExpressionStatement(Expression::VectorAccess {
                vector: Box::new(Expression::VariableAccess("V".to_string())),
                index: Box::new(Expression::IntegerLiteral(10)),
            }),
        ],
    );
    analyzer.analyze_function(&decl);

    let errors = bounds::check_function(&decl.body, "Overrun", &mut analyzer);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].vector_name, "V");
    assert_eq!(errors[0].index, 10);
    assert_eq!(errors[0].size, Some(4));
}

#[test]
fn cfg_validate_reports_no_diagnostics_for_a_simple_if_else_function() {
    let mut analyzer = Analyzer::new();
    let decl = func(
        "Choose",
        vec![
            Statement::If {
                condition: Expression::VariableAccess("Flag".to_string()),
                then_body: vec![Statement::Assignment {
                    lhs: vec![Expression::VariableAccess("Result".to_string())],
                    rhs: vec![Expression::IntegerLiteral(1)],
                }],
                else_body: vec![Statement::Assignment {
                    lhs: vec![Expression::VariableAccess("Result".to_string())],
                    rhs: vec![Expression::IntegerLiteral(0)],
                }],
            },
            Statement::Return(Some(Expression::VariableAccess("Result".to_string()))),
        ],
    );
    analyzer.analyze_function(&decl);

    let builder = CfgBuilder::new("Choose", &analyzer.symbol_table);
    let cfg = builder.build(&decl.body, 1).unwrap();
    assert!(cfg.validate().is_empty(), "{:?}", cfg.validate());
}

#[test]
fn linking_a_call_into_a_label_defined_later_in_the_stream_resolves_cleanly() {
    let mut stream = vec![create_branch_with_link("Callee").unwrap(), bcplc_aarch64_core::isa::aarch64::inst::Instruction::as_label(
        "Callee",
        bcplc_aarch64_core::isa::aarch64::inst::Segment::Code,
    )];
    let labels = linker::link(&mut stream, 0x4000).unwrap();
    assert_eq!(labels.resolve("Callee"), Some(0x4004));
    assert_ne!(stream[0].encoding, 0x9400_0000); // the base BL opcode, unpatched, would still be 0 in the offset field
}
