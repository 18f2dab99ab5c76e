//! C8: the linking pass (spec §4.7.1). Two sweeps over the instruction
//! stream — first binding every label to an address, then patching every
//! relocation against the now-complete label table — grounded on the
//! address-then-relocate shape common to the teacher's own `MachBuffer`
//! relocation model, generalized to this crate's closed `RelocationKind` set
//! (spec §6.3) since no original-source `Linker` file survived distillation.

use std::collections::BTreeMap;

use crate::bitpat::BitPatcher;
use crate::error::CoreError;
use crate::isa::aarch64::inst::{Instruction, RelocationKind};

/// One resolved (name -> address) binding (spec §4.7.1 "label table").
#[derive(Debug, Default)]
pub struct LabelTable {
    addresses: BTreeMap<String, u64>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable::default()
    }

    pub fn define(&mut self, name: impl Into<String>, address: u64) {
        self.addresses.insert(name.into(), address);
    }

    pub fn resolve(&self, name: &str) -> Option<u64> {
        self.addresses.get(name).copied()
    }

    /// Folds `other`'s bindings in, used when several segments are linked
    /// independently before their relocations are resolved against the
    /// combined set (spec §4.8 lays code/rodata/data at different bases).
    pub fn merge(&mut self, other: LabelTable) {
        self.addresses.extend(other.addresses);
    }
}

/// Byte footprint of one stream entry once laid out (spec §4.7.1 pass one).
/// Label definitions occupy no space; a `Label`-relocation data entry is a
/// 64-bit pointer (`.quad`); every other instruction is one 4-byte word.
fn instruction_size(instr: &Instruction) -> u64 {
    if instr.is_label_definition {
        0
    } else if instr.is_data_value && instr.relocation == RelocationKind::Label {
        8
    } else {
        4
    }
}

/// Total byte footprint of a segment once laid out, without mutating it —
/// used to compute the next segment's base address before linking it.
pub fn stream_size(instructions: &[Instruction]) -> u64 {
    instructions.iter().map(instruction_size).sum()
}

/// Assigns addresses to every instruction and binds every label definition,
/// starting at `base_address` (spec §4.7.1 "first pass").
pub fn assign_addresses(instructions: &mut [Instruction], base_address: u64) -> LabelTable {
    let mut labels = LabelTable::new();
    let mut address = base_address;
    for instr in instructions.iter_mut() {
        instr.address = address;
        if instr.is_label_definition {
            labels.define(instr.target_label.clone(), address);
        }
        address += instruction_size(instr);
    }
    labels
}

/// Patches every relocated instruction's encoding against `labels` (spec
/// §4.7.1 "second pass"). `UnresolvedLabel`/`RelocationOutOfRange` are fatal
/// and stop at the first offending instruction, matching spec §8's "report
/// as fatal" (the linker does not try to recover a partially-valid stream).
pub fn apply_relocations(instructions: &mut [Instruction], labels: &LabelTable) -> Result<(), CoreError> {
    for instr in instructions.iter_mut() {
        if instr.relocation.is_none() || matches!(instr.relocation, RelocationKind::Jump) {
            continue;
        }
        let target = labels
            .resolve(&instr.target_label)
            .ok_or_else(|| CoreError::UnresolvedLabel(instr.target_label.clone()))?;
        patch_relocation(instr, target)?;
    }
    Ok(())
}

/// Convenience combining both passes, the shape every caller actually wants
/// (spec §4.7.1 describes them as one linking pass with two sweeps).
pub fn link(instructions: &mut [Instruction], base_address: u64) -> Result<LabelTable, CoreError> {
    let labels = assign_addresses(instructions, base_address);
    apply_relocations(instructions, &labels)?;
    Ok(labels)
}

fn out_of_range(kind: RelocationKind, value: i64, range: &str) -> CoreError {
    CoreError::RelocationOutOfRange {
        kind: kind.name().to_string(),
        value,
        range: range.to_string(),
    }
}

fn patch_relocation(instr: &mut Instruction, target: u64) -> Result<(), CoreError> {
    match instr.relocation {
        RelocationKind::PcRelative26 => {
            let offset = target as i64 - instr.address as i64;
            if offset % 4 != 0 {
                return Err(out_of_range(instr.relocation, offset, "multiple of 4"));
            }
            let quotient = offset / 4;
            if !(-(1 << 25)..(1 << 25)).contains(&quotient) {
                return Err(out_of_range(instr.relocation, quotient, "-2^25..2^25-1"));
            }
            let mut p = BitPatcher::new(instr.encoding);
            p.patch((quotient as u32) & 0x03FF_FFFF, 0, 26)?;
            instr.encoding = p.value();
        }
        RelocationKind::PcRelative19 => {
            let offset = target as i64 - instr.address as i64;
            if offset % 4 != 0 {
                return Err(out_of_range(instr.relocation, offset, "multiple of 4"));
            }
            let quotient = offset / 4;
            if !(-(1 << 18)..(1 << 18)).contains(&quotient) {
                return Err(out_of_range(instr.relocation, quotient, "-2^18..2^18-1"));
            }
            let mut p = BitPatcher::new(instr.encoding);
            p.patch((quotient as u32) & 0x0007_FFFF, 5, 19)?;
            instr.encoding = p.value();
        }
        RelocationKind::AdrpPage21 => {
            let target_page = target & !0xFFF;
            let instr_page = instr.address & !0xFFF;
            let diff_pages = (target_page as i64 - instr_page as i64) / 4096;
            if !(-(1 << 20)..(1 << 20)).contains(&diff_pages) {
                return Err(out_of_range(instr.relocation, diff_pages, "-2^20..2^20-1"));
            }
            let bits = diff_pages as u32;
            let mut p = BitPatcher::new(instr.encoding);
            p.patch(bits & 0b11, 29, 2)?;
            p.patch((bits >> 2) & 0x0007_FFFF, 5, 19)?;
            instr.encoding = p.value();
        }
        RelocationKind::Add12Unsigned => {
            let low12 = target & 0xFFF;
            let mut p = BitPatcher::new(instr.encoding);
            p.patch(low12 as u32, 10, 12)?;
            instr.encoding = p.value();
        }
        RelocationKind::MovzMovk0 => patch_move_wide_chunk(instr, target, 0)?,
        RelocationKind::MovzMovk16 => patch_move_wide_chunk(instr, target, 16)?,
        RelocationKind::MovzMovk32 => patch_move_wide_chunk(instr, target, 32)?,
        RelocationKind::MovzMovk48 => patch_move_wide_chunk(instr, target, 48)?,
        RelocationKind::AbsoluteLo32 => {
            instr.encoding = (target & 0xFFFF_FFFF) as u32;
        }
        RelocationKind::AbsoluteHi32 => {
            instr.encoding = (target >> 32) as u32;
        }
        RelocationKind::Label => {
            // A `.quad` data entry: the full 64-bit address is the payload;
            // `encoding` only holds 32 bits, so the resolved pointer is kept
            // in `immediate` for the assembly/binary writers to consume.
            instr.immediate = target as i64;
        }
        RelocationKind::None | RelocationKind::Jump => unreachable!("filtered out above"),
    }
    Ok(())
}

fn patch_move_wide_chunk(instr: &mut Instruction, target: u64, shift: u32) -> Result<(), CoreError> {
    let chunk = ((target >> shift) & 0xFFFF) as u32;
    let mut p = BitPatcher::new(instr.encoding);
    p.patch(chunk, 5, 16)?;
    instr.encoding = p.value();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::emit::{create_adrp, create_branch_unconditional, create_move_immediate_jit};
    use crate::isa::aarch64::inst::Segment;

    #[test]
    fn label_definitions_bind_to_their_address() {
        let mut stream = vec![
            Instruction::new("NOP", 0xD503_201F, "NOP".to_string()),
            Instruction::as_label("L1", Segment::Code),
            Instruction::new("NOP", 0xD503_201F, "NOP".to_string()),
        ];
        let labels = assign_addresses(&mut stream, 0x1000);
        assert_eq!(labels.resolve("L1"), Some(0x1004));
        assert_eq!(stream[2].address, 0x1004);
    }

    #[test]
    fn unresolved_label_is_fatal() {
        let mut stream = vec![create_branch_unconditional("nowhere").unwrap()];
        let err = link(&mut stream, 0x1000).unwrap_err();
        assert_eq!(err, CoreError::UnresolvedLabel("nowhere".to_string()));
    }

    #[test]
    fn branch_to_forward_label_patches_pc_relative_26() {
        let mut stream = vec![
            create_branch_unconditional("target").unwrap(),
            Instruction::as_label("target", Segment::Code),
        ];
        link(&mut stream, 0x1000).unwrap();
        let mut p = BitPatcher::new(stream[0].encoding);
        // offset 4 bytes / 4 = 1.
        assert_eq!(p.extract(0, 26), 1);
        let _ = &mut p;
    }

    #[test]
    fn adrp_splits_page_offset_into_immlo_and_immhi() {
        let mut stream = vec![create_adrp("X0", "data_label").unwrap(), Instruction::as_label("data_label", Segment::Data)];
        link(&mut stream, 0x1000).unwrap();
        // Same page as the ADRP instruction -> zero page delta.
        assert_eq!(BitPatcher::new(stream[0].encoding).extract(29, 2), 0);
        assert_eq!(BitPatcher::new(stream[0].encoding).extract(5, 19), 0);
    }

    #[test]
    fn jit_movz_movk_sequence_resolves_to_absolute_address() {
        let mut stream: Vec<Instruction> = create_move_immediate_jit("X16", "fn_label").unwrap().into_iter().collect();
        stream.push(Instruction::as_label("fn_label", Segment::Code));
        link(&mut stream, 0x2000).unwrap();
        let chunk0 = BitPatcher::new(stream[0].encoding).extract(5, 16);
        // fn_label resolves to its own address (0x2000 + 4*4 = 0x2010); low chunk is 0x2010.
        assert_eq!(chunk0, 0x2010);
    }

    #[test]
    fn label_relocation_stores_resolved_address_in_immediate() {
        let mut stream = vec![
            Instruction::as_relocatable_data("target", Segment::Data),
            Instruction::as_label("target", Segment::Code),
        ];
        link(&mut stream, 0x4000).unwrap();
        // The data entry is 8 bytes wide, so "target" binds at base + 8.
        assert_eq!(stream[0].immediate, 0x4008);
    }

    #[test]
    fn out_of_range_branch_is_rejected() {
        let mut stream = [create_branch_unconditional("far").unwrap(), Instruction::as_label("far", Segment::Code)];
        // Push the label far out of PcRelative26 range by address arithmetic.
        let far_addr = 1u64 << 28;
        stream[0].address = 0;
        let mut labels = LabelTable::new();
        labels.define("far", far_addr);
        let err = apply_relocations(&mut stream[..1], &labels).unwrap_err();
        assert!(matches!(err, CoreError::RelocationOutOfRange { .. }));
    }
}
