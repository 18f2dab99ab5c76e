//! The AST node shapes consumed by the analyzer, optimizer, and CFG builder
//! (spec §1: lexer/parser are out of scope, but the node kinds those passes
//! walk must exist as an external contract). Mirrors the shape of nodes
//! referenced throughout `original_source/analysis/az_impl/*.cpp` and
//! `CFGBuilderPass.h`, trimmed to the fields those passes actually read.

use crate::types::VarType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Eq,
    NotEq,
}

impl BinaryOperator {
    /// Operators for which operand order does not affect the result — the
    /// global CSE pass canonicalizes these by sorting operands (spec §4.4.1).
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Mul
                | BinaryOperator::BitwiseAnd
                | BinaryOperator::BitwiseOr
                | BinaryOperator::BitwiseXor
                | BinaryOperator::Eq
                | BinaryOperator::NotEq
        )
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::BitwiseAnd => "&",
            BinaryOperator::BitwiseOr => "|",
            BinaryOperator::BitwiseXor => "^",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEq => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEq => ">=",
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "~=",
        }
    }
}

/// The allocation expression kinds the analyzer treats as heap-owning RHS
/// values (spec §4.3 "Ownership flagging").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationKind {
    New,
    ListLiteral,
    VectorAllocation,
    StringAllocation,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    IntegerLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    VariableAccess(String),
    BinaryOp {
        op: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    VectorAccess {
        vector: Box<Expression>,
        index: Box<Expression>,
    },
    /// `.first`/`.second`/`.third`/`.fourth` on a packed (PAIR/FPAIR/QUAD)
    /// value (spec §4.3 "Pair/quad access").
    PackedAccess {
        value: Box<Expression>,
        component: PackedComponent,
    },
    Allocation {
        kind: AllocationKind,
        /// `VEC N` / `FVEC N` with a compile-time-literal size, when known.
        literal_size: Option<i64>,
        /// `VEC [e1, ..., ek]` initializer element count.
        initializer_len: Option<usize>,
    },
    FunctionCall {
        name: String,
        args: Vec<Expression>,
        is_runtime: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackedComponent {
    First,
    Second,
    Third,
    Fourth,
}

impl PackedComponent {
    /// The type yielded by accessing this component of `packed_ty` (spec
    /// §4.3). `third`/`fourth` are only valid on `QUAD`; callers validate
    /// arity before calling this.
    pub fn component_type(self, packed_ty: VarType) -> VarType {
        if packed_ty.contains(VarType::FPAIR) {
            VarType::FLOAT
        } else {
            VarType::INTEGER
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Assignment {
        lhs: Vec<Expression>,
        rhs: Vec<Expression>,
    },
    ExpressionStatement(Expression),
    If {
        condition: Expression,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    For {
        var: String,
        /// Present when the loop ranges over a vector initializer of known
        /// constant size (spec §4.5 "For loops").
        constant_extent: Option<i64>,
        body: Vec<Statement>,
    },
    ForEach {
        var: String,
        collection: Expression,
        destructuring_vars: Vec<String>,
        body: Vec<Statement>,
    },
    Reduction {
        result_var: String,
        operation_name: String,
        collection: Expression,
    },
    Goto(String),
    Label(String),
    Break,
    Loop,
    EndCase,
    Return(Option<Expression>),
    Resultis(Expression),
    Finish,
    Block(Vec<Statement>),
    /// Synthetic: release the heap allocation owned by `variable`. Inserted
    /// by the CFG builder's scope-cleanup chain, never produced by the
    /// parser (spec §4.5 "scope-cleanup chain").
    ReleaseHeap(String),
    /// Synthetic: a reduction lowered directly to a NEON sequence rather
    /// than a counted loop, because `collection` is a PAIR/FPAIR/QUAD
    /// (spec §4.5 "if the collection is PAIRS/FPAIRS/QUAD, emit the NEON
    /// sequence directly"). The actual NEON emission is the (out-of-scope)
    /// code-emission walk's job; this node only records which reducer and
    /// operand the CFG resolved.
    ReductionDirect {
        result_var: String,
        reducer_name: String,
        collection: Expression,
    },
}

#[derive(Clone, Debug, Default)]
pub struct FunctionDecl {
    pub name: String,
    pub class_name: Option<String>,
    pub parameters: Vec<String>,
    pub body: Vec<Statement>,
    pub returns_float: bool,
}
