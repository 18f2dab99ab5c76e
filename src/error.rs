//! The closed error taxonomy surfaced by this crate (spec §6.5, §11).

use thiserror::Error;

/// Every error or warning this crate can produce, across encoders, the
/// linker, the analyzer, and the CFG builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid register operand '{0}'")]
    InvalidRegister(String),

    #[error("mismatched operand widths")]
    MismatchedOperandWidths,

    #[error("invalid immediate {value}: {reason}")]
    InvalidImmediate { value: i64, reason: String },

    #[error("invalid shift amount {amount}, allowed {allowed}")]
    InvalidShift { amount: i64, allowed: String },

    #[error("unresolved label '{0}'")]
    UnresolvedLabel(String),

    #[error("relocation {kind} out of range: value {value}, allowed range {range}")]
    RelocationOutOfRange {
        kind: String,
        value: i64,
        range: String,
    },

    #[error("bounds violation: {variable}[{index}] but size is {size} (at {location})")]
    BoundsViolation {
        variable: String,
        index: i64,
        size: i64,
        location: String,
    },

    #[error("potential memory leak: '{variable}' reassigned in function '{function}' while still owning heap memory")]
    PotentialMemoryLeak { variable: String, function: String },

    #[error("destructuring arity mismatch: expected {expected}, found {found}")]
    DestructuringArityMismatch { expected: usize, found: usize },

    #[error("unknown reducer '{0}'")]
    UnknownReducer(String),
}

impl CoreError {
    /// True for diagnostics that are collected but do not make a pass fail.
    ///
    /// Only `PotentialMemoryLeak` is a warning (spec §6.5); every other
    /// variant is fatal for the unit of work that produced it.
    pub fn is_warning(&self) -> bool {
        matches!(self, CoreError::PotentialMemoryLeak { .. })
    }
}

/// The result type threaded through encoders, the linker, and the passes.
pub type CoreResult<T> = Result<T, CoreError>;
