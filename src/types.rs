//! C3: the type lattice — a 64-bit bitfield of base/container/modifier flags
//! (spec §3.1). Mirrors the original `VarType` enum bit-for-bit so literal
//! composite constants keep the same numeric ordering the priority-update
//! rule depends on.

use std::fmt;

/// A tiny hand-rolled bitflags so the crate does not pull in the `bitflags`
/// crate for one six-constant lattice; the macro keeps the declaration
/// readable while `VarType` itself stays a plain `Copy` newtype over `u64`,
/// matching how the original `VarType` was a plain `enum class : int64_t`.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name($repr);

        impl $name {
            $(#[allow(non_upper_case_globals)] pub const $flag: $name = $name($value);)*

            pub fn bits(self) -> $repr {
                self.0
            }

            pub fn from_bits_truncate(bits: $repr) -> Self {
                $name(bits)
            }

            pub fn contains(self, other: $name) -> bool {
                (self.0 & other.0) == other.0
            }

            pub fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = $name;
            fn bitand(self, rhs: $name) -> $name {
                $name(self.0 & rhs.0)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}(0x{:x})", stringify!($name), self.0)
            }
        }
    };
}

bitflags_like! {
    /// A BCPL value's type, represented as an OR of base/container/modifier
    /// flags. Numeric value order is significant: the priority-update rule
    /// (see [`VarType::should_update`]) treats a larger numeric value as
    /// "more specific", so new flags must only ever be added at higher bit
    /// positions than anything they should take priority over.
    pub struct VarType: u64 {
        const UNKNOWN = 0;

        // Base types: low bits, low priority.
        const INTEGER = 1 << 0;
        const FLOAT   = 1 << 1;
        const STRING  = 1 << 2;
        const ANY     = 1 << 3;
        const PAIR    = 1 << 4;
        const FPAIR   = 1 << 5;
        const QUAD    = 1 << 6;
        const FQUAD   = 1 << 7;

        // Container flags: higher bits.
        const VEC    = 1 << 10;
        const LIST   = 1 << 11;
        const TABLE  = 1 << 12;
        const OBJECT = 1 << 13;

        // Modifier flags: top bits.
        const POINTER_TO = 1 << 20;
        const CONST      = 1 << 21;
    }
}

impl VarType {
    /// Priority-update rule (spec §3.1): a proposed type replaces the
    /// current type only if its numeric value is `>=` the current one.
    pub fn should_update(current: VarType, proposed: VarType) -> bool {
        proposed.bits() >= current.bits()
    }

    /// A type is a constant list iff `POINTER_TO`, `LIST`, and `CONST` are
    /// all set (spec §3.1).
    pub fn is_const_list(self) -> bool {
        let required = VarType::POINTER_TO | VarType::LIST | VarType::CONST;
        self & required == required
    }

    pub fn is_pointer(self) -> bool {
        self.contains(VarType::POINTER_TO)
    }

    pub fn is_pair_like(self) -> bool {
        self.contains(VarType::PAIR) || self.contains(VarType::FPAIR)
    }

    pub fn is_quad_like(self) -> bool {
        self.contains(VarType::QUAD) || self.contains(VarType::FQUAD)
    }

    /// True for any packed (2- or 4-component) value type (spec §4.3
    /// "Destructuring validation").
    pub fn is_packed(self) -> bool {
        self.is_pair_like() || self.is_quad_like()
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bits() == 0 {
            return write!(f, "UNKNOWN");
        }
        let mut parts = Vec::new();
        let flags: &[(VarType, &str)] = &[
            (VarType::CONST, "CONST"),
            (VarType::POINTER_TO, "POINTER_TO"),
            (VarType::LIST, "LIST"),
            (VarType::VEC, "VEC"),
            (VarType::TABLE, "TABLE"),
            (VarType::OBJECT, "OBJECT"),
            (VarType::INTEGER, "INTEGER"),
            (VarType::FLOAT, "FLOAT"),
            (VarType::STRING, "STRING"),
            (VarType::ANY, "ANY"),
            (VarType::PAIR, "PAIR"),
            (VarType::FPAIR, "FPAIR"),
            (VarType::QUAD, "QUAD"),
            (VarType::FQUAD, "FQUAD"),
        ];
        for (flag, name) in flags {
            if self.contains(*flag) {
                parts.push(*name);
            }
        }
        write!(f, "{}", parts.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_update_is_monotonic_by_numeric_value() {
        assert!(VarType::should_update(VarType::UNKNOWN, VarType::INTEGER));
        assert!(VarType::should_update(VarType::INTEGER, VarType::INTEGER));
        assert!(!VarType::should_update(
            VarType::POINTER_TO | VarType::LIST | VarType::INTEGER,
            VarType::INTEGER
        ));
    }

    #[test]
    fn const_list_detection_requires_all_three_flags() {
        let t = VarType::POINTER_TO | VarType::LIST | VarType::CONST;
        assert!(t.is_const_list());
        assert!(!(VarType::POINTER_TO | VarType::LIST).is_const_list());
    }

    #[test]
    fn composite_types_are_bitwise_or() {
        let t = VarType::POINTER_TO | VarType::LIST | VarType::INTEGER;
        assert!(t.contains(VarType::POINTER_TO));
        assert!(t.contains(VarType::LIST));
        assert!(t.contains(VarType::INTEGER));
        assert!(!t.contains(VarType::FLOAT));
    }

    #[test]
    fn display_lists_set_flags() {
        let t = VarType::POINTER_TO | VarType::LIST | VarType::INTEGER;
        assert_eq!(format!("{}", t), "POINTER_TO|LIST|INTEGER");
        assert_eq!(format!("{}", VarType::UNKNOWN), "UNKNOWN");
    }
}
