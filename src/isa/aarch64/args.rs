//! Shared operand sub-components: condition codes and NEON arrangements
//! (spec §4.2.2, §4.2). Grounded on the teacher's `isa/aarch64/inst/args.rs`
//! `Cond` enum and inversion table.

use crate::error::CoreError;

/// The 4-bit AArch64 condition code (spec §4.2.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Cond {
    Eq = 0,
    Ne = 1,
    Cs = 2,
    Cc = 3,
    Mi = 4,
    Pl = 5,
    Vs = 6,
    Vc = 7,
    Hi = 8,
    Ls = 9,
    Ge = 10,
    Lt = 11,
    Gt = 12,
    Le = 13,
    Al = 14,
    Nv = 15,
}

impl Cond {
    /// Case-insensitive string to condition, accepting both AArch64 mnemonic
    /// spellings for carry set/clear (`CS`/`HS`, `CC`/`LO`) per spec §4.2.2.
    pub fn parse(text: &str) -> Result<Cond, CoreError> {
        let cond = match text.to_ascii_uppercase().as_str() {
            "EQ" => Cond::Eq,
            "NE" => Cond::Ne,
            "CS" | "HS" => Cond::Cs,
            "CC" | "LO" => Cond::Cc,
            "MI" => Cond::Mi,
            "PL" => Cond::Pl,
            "VS" => Cond::Vs,
            "VC" => Cond::Vc,
            "HI" => Cond::Hi,
            "LS" => Cond::Ls,
            "GE" => Cond::Ge,
            "LT" => Cond::Lt,
            "GT" => Cond::Gt,
            "LE" => Cond::Le,
            "AL" => Cond::Al,
            "NV" => Cond::Nv,
            _ => {
                return Err(CoreError::InvalidImmediate {
                    value: 0,
                    reason: format!("unknown condition code '{text}'"),
                })
            }
        };
        Ok(cond)
    }

    /// The inverted condition, used to lower CSET/CSETM to CSINC/CSINV with
    /// an inverted test (spec §4.2).
    pub fn invert(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Cs => Cond::Cc,
            Cond::Cc => Cond::Cs,
            Cond::Mi => Cond::Pl,
            Cond::Pl => Cond::Mi,
            Cond::Vs => Cond::Vc,
            Cond::Vc => Cond::Vs,
            Cond::Hi => Cond::Ls,
            Cond::Ls => Cond::Hi,
            Cond::Ge => Cond::Lt,
            Cond::Lt => Cond::Ge,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
            Cond::Al => Cond::Nv,
            Cond::Nv => Cond::Al,
        }
    }

    pub fn bits(self) -> u32 {
        self as u32
    }
}

/// NEON arrangement suffix, e.g. the `.4S` in `add v0.4s, v1.4s, v2.4s`
/// (spec §4.2 item 2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arrangement {
    B8,
    B16,
    H4,
    H8,
    S2,
    S4,
    D2,
}

impl Arrangement {
    pub fn parse(text: &str) -> Result<Arrangement, CoreError> {
        let norm = text.trim_start_matches('.').to_ascii_uppercase();
        let arr = match norm.as_str() {
            "8B" => Arrangement::B8,
            "16B" => Arrangement::B16,
            "4H" => Arrangement::H4,
            "8H" => Arrangement::H8,
            "2S" => Arrangement::S2,
            "4S" => Arrangement::S4,
            "2D" => Arrangement::D2,
            _ => {
                return Err(CoreError::InvalidImmediate {
                    value: 0,
                    reason: format!("unsupported NEON arrangement '{text}'"),
                })
            }
        };
        Ok(arr)
    }

    /// The two-bit `size` field and one-bit `Q` field used by most
    /// three-register NEON data-processing encodings.
    pub fn size_q_bits(self) -> (u32, u32) {
        match self {
            Arrangement::B8 => (0b00, 0),
            Arrangement::B16 => (0b00, 1),
            Arrangement::H4 => (0b01, 0),
            Arrangement::H8 => (0b01, 1),
            Arrangement::S2 => (0b10, 0),
            Arrangement::S4 => (0b10, 1),
            Arrangement::D2 => (0b11, 1),
        }
    }

    pub fn lane_count(self) -> u32 {
        match self {
            Arrangement::B8 => 8,
            Arrangement::B16 => 16,
            Arrangement::H4 => 4,
            Arrangement::H8 => 8,
            Arrangement::S2 => 2,
            Arrangement::S4 => 4,
            Arrangement::D2 => 2,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Arrangement::B8 => "8B",
            Arrangement::B16 => "16B",
            Arrangement::H4 => "4H",
            Arrangement::H8 => "8H",
            Arrangement::S2 => "2S",
            Arrangement::S4 => "4S",
            Arrangement::D2 => "2D",
        }
    }
}

/// Shift applied to the second operand of a data-processing (register)
/// instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftOp {
    Lsl,
    Lsr,
    Asr,
}

impl ShiftOp {
    pub fn bits(self) -> u32 {
        match self {
            ShiftOp::Lsl => 0b00,
            ShiftOp::Lsr => 0b01,
            ShiftOp::Asr => 0b10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cond_parse_accepts_both_spellings() {
        assert_eq!(Cond::parse("cs").unwrap(), Cond::Cs);
        assert_eq!(Cond::parse("HS").unwrap(), Cond::Cs);
        assert_eq!(Cond::parse("lo").unwrap(), Cond::Cc);
    }

    #[test]
    fn cond_invert_is_involution() {
        for c in [
            Cond::Eq, Cond::Ne, Cond::Cs, Cond::Cc, Cond::Mi, Cond::Pl, Cond::Vs, Cond::Vc,
            Cond::Hi, Cond::Ls, Cond::Ge, Cond::Lt, Cond::Gt, Cond::Le, Cond::Al, Cond::Nv,
        ] {
            assert_eq!(c.invert().invert(), c);
        }
    }

    #[test]
    fn arrangement_roundtrips_through_suffix() {
        for a in [
            Arrangement::B8, Arrangement::B16, Arrangement::H4, Arrangement::H8,
            Arrangement::S2, Arrangement::S4, Arrangement::D2,
        ] {
            assert_eq!(Arrangement::parse(a.suffix()).unwrap(), a);
        }
    }
}
