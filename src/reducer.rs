//! C9: the reduction-operation abstraction consumed by the CFG builder's
//! MIN/MAX/SUM/user-declared-reduction lowering (spec §4.9). Grounded on
//! `original_source/Reducer.h`/`Reducer.cpp`: one small struct per named
//! operation plus a name -> reducer factory, in place of the original's
//! virtual-dispatch class hierarchy (spec §9 "Dynamic dispatch over
//! encoders" applies equally here — a data table replaces inheritance).

use crate::ast::{BinaryOperator, Expression};
use crate::isa::aarch64::args::Arrangement;

/// One associative reduction operation with an optional identity element
/// (spec §4.9).
#[derive(Clone, Copy, Debug)]
pub struct Reducer {
    name: &'static str,
    scalar_operator: BinaryOperator,
    reduction_code: u32,
    initial_value: Option<ReducerInit>,
}

/// The handful of identity-element shapes a reducer needs; kept distinct
/// from a full `Expression` literal so `Reducer` stays `Copy`.
#[derive(Clone, Copy, Debug)]
enum ReducerInit {
    Integer(i64),
}

impl Reducer {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn scalar_operator(&self) -> BinaryOperator {
        self.scalar_operator
    }

    pub fn reduction_code(&self) -> u32 {
        self.reduction_code
    }

    /// The identity element, or `None` meaning "use the first element"
    /// (spec §4.9).
    pub fn initial_value(&self) -> Option<Expression> {
        self.initial_value.map(|v| match v {
            ReducerInit::Integer(i) => Expression::IntegerLiteral(i),
        })
    }

    pub fn requires_initialization(&self) -> bool {
        self.initial_value.is_some()
    }

    /// Whether this reducer is NEON-pairwise-only (codes 10-12, spec §4.9).
    pub fn is_pairwise(&self) -> bool {
        self.reduction_code >= 10
    }
}

const MIN: Reducer = Reducer {
    name: "MIN",
    scalar_operator: BinaryOperator::Less,
    reduction_code: 0,
    initial_value: None,
};

const MAX: Reducer = Reducer {
    name: "MAX",
    scalar_operator: BinaryOperator::Greater,
    reduction_code: 1,
    initial_value: None,
};

const SUM: Reducer = Reducer {
    name: "SUM",
    scalar_operator: BinaryOperator::Add,
    reduction_code: 2,
    initial_value: Some(ReducerInit::Integer(0)),
};

const PRODUCT: Reducer = Reducer {
    name: "PRODUCT",
    scalar_operator: BinaryOperator::Mul,
    reduction_code: 3,
    initial_value: Some(ReducerInit::Integer(1)),
};

const BITWISE_AND: Reducer = Reducer {
    name: "BITWISE_AND",
    scalar_operator: BinaryOperator::BitwiseAnd,
    reduction_code: 4,
    initial_value: Some(ReducerInit::Integer(-1)),
};

const BITWISE_OR: Reducer = Reducer {
    name: "BITWISE_OR",
    scalar_operator: BinaryOperator::BitwiseOr,
    reduction_code: 5,
    initial_value: Some(ReducerInit::Integer(0)),
};

const PAIRWISE_MIN: Reducer = Reducer {
    name: "PAIRWISE_MIN",
    scalar_operator: BinaryOperator::Less,
    reduction_code: 10,
    initial_value: None,
};

const PAIRWISE_MAX: Reducer = Reducer {
    name: "PAIRWISE_MAX",
    scalar_operator: BinaryOperator::Greater,
    reduction_code: 11,
    initial_value: None,
};

const PAIRWISE_ADD: Reducer = Reducer {
    name: "PAIRWISE_ADD",
    scalar_operator: BinaryOperator::Add,
    reduction_code: 12,
    initial_value: Some(ReducerInit::Integer(0)),
};

/// Name (uppercase) -> reducer. Unknown names yield `None` (spec §4.9).
pub fn create_reducer(operation_name: &str) -> Option<Reducer> {
    match operation_name {
        "MIN" => Some(MIN),
        "MAX" => Some(MAX),
        "SUM" => Some(SUM),
        "PRODUCT" => Some(PRODUCT),
        "BITWISE_AND" => Some(BITWISE_AND),
        "BITWISE_OR" => Some(BITWISE_OR),
        "PAIRWISE_MIN" => Some(PAIRWISE_MIN),
        "PAIRWISE_MAX" => Some(PAIRWISE_MAX),
        "PAIRWISE_ADD" => Some(PAIRWISE_ADD),
        _ => None,
    }
}

pub fn is_reduction_operation(operation_name: &str) -> bool {
    create_reducer(operation_name).is_some()
}

/// Source element type driving NEON arrangement selection (spec §4.9 table).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReducibleDataType {
    Pair,
    FPair,
    Quad,
    FQuad,
    Vec,
    FVec,
}

/// NEON instruction family used for this reducer over this data type
/// (the "MIN/MAX instr" / "SUM instr" columns of the spec §4.9 registry
/// table).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeonInstrFamily {
    IntegerMinMax,
    FloatMinMax,
    IntegerAdd,
    FloatAdd,
}

/// The registry table mapping (reducer, data type) to a NEON arrangement and
/// instruction family (spec §4.9). Dynamic-length `Vec`/`FVec` reduce in
/// `.4S` chunks with a scalar tail for `N mod 4` (caller-driven; this table
/// only fixes the chunk arrangement).
pub fn neon_arrangement_for(data_type: ReducibleDataType) -> Arrangement {
    match data_type {
        ReducibleDataType::Pair | ReducibleDataType::FPair => Arrangement::S2,
        ReducibleDataType::Quad => Arrangement::S4,
        ReducibleDataType::FQuad => Arrangement::H4,
        ReducibleDataType::Vec | ReducibleDataType::FVec => Arrangement::S4,
    }
}

pub fn neon_instr_family_for(reducer: &Reducer, data_type: ReducibleDataType) -> NeonInstrFamily {
    let is_float = matches!(
        data_type,
        ReducibleDataType::FPair | ReducibleDataType::FQuad | ReducibleDataType::FVec
    );
    match (reducer.reduction_code, is_float) {
        (0, false) | (1, false) | (10, false) | (11, false) => NeonInstrFamily::IntegerMinMax,
        (0, true) | (1, true) | (10, true) | (11, true) => NeonInstrFamily::FloatMinMax,
        (_, false) => NeonInstrFamily::IntegerAdd,
        (_, true) => NeonInstrFamily::FloatAdd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_maps_all_documented_names() {
        for name in [
            "MIN",
            "MAX",
            "SUM",
            "PRODUCT",
            "BITWISE_AND",
            "BITWISE_OR",
            "PAIRWISE_MIN",
            "PAIRWISE_MAX",
            "PAIRWISE_ADD",
        ] {
            assert!(create_reducer(name).is_some(), "{name} should be recognized");
        }
        assert!(create_reducer("BOGUS").is_none());
        assert!(!is_reduction_operation("BOGUS"));
    }

    #[test]
    fn sum_and_product_carry_documented_identities() {
        assert!(matches!(
            create_reducer("SUM").unwrap().initial_value(),
            Some(Expression::IntegerLiteral(0))
        ));
        assert!(matches!(
            create_reducer("PRODUCT").unwrap().initial_value(),
            Some(Expression::IntegerLiteral(1))
        ));
        assert!(matches!(
            create_reducer("BITWISE_AND").unwrap().initial_value(),
            Some(Expression::IntegerLiteral(-1))
        ));
    }

    #[test]
    fn min_max_use_first_element_as_identity() {
        assert!(create_reducer("MIN").unwrap().initial_value().is_none());
        assert!(!create_reducer("MIN").unwrap().requires_initialization());
    }

    #[test]
    fn pairwise_reducers_are_flagged_neon_only() {
        assert!(create_reducer("PAIRWISE_MIN").unwrap().is_pairwise());
        assert!(!create_reducer("MIN").unwrap().is_pairwise());
    }

    #[test]
    fn arrangement_table_matches_documented_lanes() {
        assert_eq!(neon_arrangement_for(ReducibleDataType::Pair), Arrangement::S2);
        assert_eq!(neon_arrangement_for(ReducibleDataType::Quad), Arrangement::S4);
        assert_eq!(neon_arrangement_for(ReducibleDataType::FQuad), Arrangement::H4);
    }

    #[test]
    fn instr_family_distinguishes_float_and_integer() {
        let min = create_reducer("MIN").unwrap();
        assert_eq!(
            neon_instr_family_for(&min, ReducibleDataType::Pair),
            NeonInstrFamily::IntegerMinMax
        );
        assert_eq!(
            neon_instr_family_for(&min, ReducibleDataType::FPair),
            NeonInstrFamily::FloatMinMax
        );
        let sum = create_reducer("SUM").unwrap();
        assert_eq!(
            neon_instr_family_for(&sum, ReducibleDataType::FVec),
            NeonInstrFamily::FloatAdd
        );
    }
}
