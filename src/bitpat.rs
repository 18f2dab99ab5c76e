//! C1: bitfield insertion into a 32-bit instruction word (spec §4.1).
//!
//! Every AArch64 encoder threads its operands through disjoint bitfields of
//! a base opcode. Centralizing mask/clear/shift/OR into one checked
//! primitive — as the original `BitPatcher` class did with a hand-written
//! bit-twiddling sequence — gives each encoder a declarative
//! "base opcode plus patches" style instead of repeating the arithmetic.

use crate::error::CoreError;

/// Holds a 32-bit word under construction and exposes one checked operation:
/// patch a bitfield.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BitPatcher {
    data: u32,
}

impl BitPatcher {
    /// Start from an initial value, typically an instruction's base opcode.
    pub fn new(initial_value: u32) -> Self {
        BitPatcher { data: initial_value }
    }

    /// The word as built so far.
    pub fn value(&self) -> u32 {
        self.data
    }

    /// Overwrite the whole word.
    pub fn set_value(&mut self, new_value: u32) {
        self.data = new_value;
    }

    /// Overwrite `[start_bit, start_bit + num_bits)` with the low `num_bits`
    /// bits of `value`. Clears the field first so repeated patches to the
    /// same field are idempotent; patches to disjoint fields commute.
    pub fn patch(&mut self, value: u32, start_bit: u32, num_bits: u32) -> Result<(), CoreError> {
        if num_bits == 0 || num_bits > 32 {
            return Err(CoreError::InvalidShift {
                amount: num_bits as i64,
                allowed: "1..=32".to_string(),
            });
        }
        if start_bit > 31 {
            return Err(CoreError::InvalidShift {
                amount: start_bit as i64,
                allowed: "0..=31".to_string(),
            });
        }
        if start_bit + num_bits > 32 {
            return Err(CoreError::InvalidShift {
                amount: (start_bit + num_bits) as i64,
                allowed: "start_bit + num_bits <= 32".to_string(),
            });
        }

        let mask: u32 = if num_bits == 32 {
            u32::MAX
        } else {
            (1u32 << num_bits) - 1
        };
        let field_mask = mask << start_bit;

        log::trace!(
            "bitpatch: before=0x{:08x} value=0x{:x} start={} bits={}",
            self.data,
            value,
            start_bit,
            num_bits
        );

        self.data = (self.data & !field_mask) | ((value & mask) << start_bit);

        log::trace!("bitpatch: after=0x{:08x}", self.data);
        Ok(())
    }

    /// Convenience used by tests: read back a previously patched field.
    pub fn extract(&self, start_bit: u32, num_bits: u32) -> u32 {
        let mask: u32 = if num_bits == 32 {
            u32::MAX
        } else {
            (1u32 << num_bits) - 1
        };
        (self.data >> start_bit) & mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_then_extract_roundtrips() {
        let mut p = BitPatcher::new(0);
        p.patch(0b1011, 4, 4).unwrap();
        assert_eq!(p.extract(4, 4), 0b1011);
    }

    #[test]
    fn disjoint_patches_commute() {
        let mut a = BitPatcher::new(0);
        a.patch(0x1f, 0, 5).unwrap();
        a.patch(0x7, 16, 3).unwrap();

        let mut b = BitPatcher::new(0);
        b.patch(0x7, 16, 3).unwrap();
        b.patch(0x1f, 0, 5).unwrap();

        assert_eq!(a.value(), b.value());
    }

    #[test]
    fn rejects_out_of_range() {
        let mut p = BitPatcher::new(0);
        assert!(p.patch(1, 30, 5).is_err());
        assert!(p.patch(1, 32, 1).is_err());
        assert!(p.patch(1, 0, 33).is_err());
        assert!(p.patch(1, 0, 0).is_err());
    }

    #[test]
    fn masks_value_to_field_width() {
        let mut p = BitPatcher::new(0);
        p.patch(0xff, 0, 4).unwrap();
        assert_eq!(p.value(), 0xf);
    }

    #[test]
    fn full_word_patch() {
        let mut p = BitPatcher::new(0xffff_ffff);
        p.patch(0, 0, 32).unwrap();
        assert_eq!(p.value(), 0);
    }
}
