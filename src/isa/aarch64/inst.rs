//! The `Instruction` record threaded between encoders (C2), the CFG/veneer
//! manager, and the linker (C8) — spec §3.5. Grounded in shape on the
//! teacher's `MachInst`/`Inst` pairing of a decoded form with encode-time
//! fields, but kept as one flat record since downstream consumers here
//! (linker, assembly writer) need random field access rather than a
//! `match`-dispatched encode method.

use crate::isa::aarch64::args::Cond;

/// Which output section an instruction or data record belongs to (spec §3.5,
/// §4.7.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    Code,
    Rodata,
    Data,
}

/// The relocation a linker must apply to an instruction's `encoding` once
/// addresses are known (spec §6.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelocationKind {
    None,
    PcRelative19,
    PcRelative26,
    AdrpPage21,
    Add12Unsigned,
    MovzMovk0,
    MovzMovk16,
    MovzMovk32,
    MovzMovk48,
    AbsoluteLo32,
    AbsoluteHi32,
    Jump,
    Label,
}

impl RelocationKind {
    pub fn is_none(self) -> bool {
        matches!(self, RelocationKind::None)
    }

    pub fn name(self) -> &'static str {
        match self {
            RelocationKind::None => "None",
            RelocationKind::PcRelative19 => "PcRelative19",
            RelocationKind::PcRelative26 => "PcRelative26",
            RelocationKind::AdrpPage21 => "AdrpPage21",
            RelocationKind::Add12Unsigned => "Add12Unsigned",
            RelocationKind::MovzMovk0 => "MovzMovk0",
            RelocationKind::MovzMovk16 => "MovzMovk16",
            RelocationKind::MovzMovk32 => "MovzMovk32",
            RelocationKind::MovzMovk48 => "MovzMovk48",
            RelocationKind::AbsoluteLo32 => "AbsoluteLo32",
            RelocationKind::AbsoluteHi32 => "AbsoluteHi32",
            RelocationKind::Jump => "Jump",
            RelocationKind::Label => "Label",
        }
    }
}

/// Lifecycle marker for JIT-only instruction sequences (spec §3.5, §4.6);
/// the assembly writer filters on this to elide veneers from static output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JitAttribute {
    None,
    JitAddress,
    JitCall,
    JitStore,
    JitRestore,
}

/// The unit passed between encoders and the linker (spec §3.5).
#[derive(Clone, Debug)]
pub struct Instruction {
    pub encoding: u32,
    pub assembly_text: String,
    pub address: u64,
    pub relocation: RelocationKind,
    pub target_label: String,
    pub is_data_value: bool,
    pub is_label_definition: bool,
    pub segment: Segment,
    pub opcode: String,
    pub dest_reg: Option<String>,
    pub src_reg1: Option<String>,
    pub src_reg2: Option<String>,
    pub base_reg: Option<String>,
    pub ra_reg: Option<String>,
    pub immediate: i64,
    pub uses_immediate: bool,
    pub is_mem_op: bool,
    pub cond: Option<Cond>,
    pub jit_attribute: JitAttribute,
    pub nopeep: bool,
}

impl Instruction {
    /// A bare instruction with encoding/text filled in and every other field
    /// at its default; encoders build on top of this via struct-update
    /// syntax so each only states the fields it actually uses.
    pub fn new(opcode: &str, encoding: u32, assembly_text: String) -> Instruction {
        Instruction {
            encoding,
            assembly_text,
            address: 0,
            relocation: RelocationKind::None,
            target_label: String::new(),
            is_data_value: false,
            is_label_definition: false,
            segment: Segment::Code,
            opcode: opcode.to_string(),
            dest_reg: None,
            src_reg1: None,
            src_reg2: None,
            base_reg: None,
            ra_reg: None,
            immediate: 0,
            uses_immediate: false,
            is_mem_op: false,
            cond: None,
            jit_attribute: JitAttribute::None,
            nopeep: false,
        }
    }

    /// A label-definition record with encoding zero (spec §3.5).
    pub fn as_label(name: &str, segment: Segment) -> Instruction {
        Instruction {
            encoding: 0,
            assembly_text: format!("{name}:"),
            address: 0,
            relocation: RelocationKind::None,
            target_label: name.to_string(),
            is_data_value: false,
            is_label_definition: true,
            segment,
            opcode: "LABEL".to_string(),
            dest_reg: None,
            src_reg1: None,
            src_reg2: None,
            base_reg: None,
            ra_reg: None,
            immediate: 0,
            uses_immediate: false,
            is_mem_op: false,
            cond: None,
            jit_attribute: JitAttribute::None,
            nopeep: false,
        }
    }

    /// A 64-bit pointer datum to be patched to `target`'s resolved address
    /// (spec §3.5, relocation kind `Label`).
    pub fn as_relocatable_data(target: &str, segment: Segment) -> Instruction {
        Instruction {
            encoding: 0,
            assembly_text: format!(".quad {target}"),
            address: 0,
            relocation: RelocationKind::Label,
            target_label: target.to_string(),
            is_data_value: true,
            is_label_definition: false,
            segment,
            opcode: "DATA".to_string(),
            dest_reg: None,
            src_reg1: None,
            src_reg2: None,
            base_reg: None,
            ra_reg: None,
            immediate: 0,
            uses_immediate: false,
            is_mem_op: false,
            cond: None,
            jit_attribute: JitAttribute::None,
            nopeep: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_factory_has_zero_encoding_and_marks_label() {
        let i = Instruction::as_label("BB_3", Segment::Code);
        assert_eq!(i.encoding, 0);
        assert!(i.is_label_definition);
        assert_eq!(i.target_label, "BB_3");
    }

    #[test]
    fn relocatable_data_factory_sets_label_relocation() {
        let i = Instruction::as_relocatable_data("L_str0", Segment::Data);
        assert!(i.is_data_value);
        assert_eq!(i.relocation, RelocationKind::Label);
        assert_eq!(i.target_label, "L_str0");
    }
}
