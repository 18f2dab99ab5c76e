//! Binary emission for the JIT path (spec §4.8). Lays the veneer, code,
//! rodata, and data segments out into one contiguous page, links them
//! against a shared label table, and serializes the result into raw bytes a
//! caller can copy into an executable mapping. This crate does not allocate
//! or protect memory itself — the original `VeneerManager`/`Linker` split
//! left page management to the embedder, and nothing in `original_source/`
//! owns an `mmap` call either.

use crate::error::CoreResult;
use crate::isa::aarch64::emit::{create_dsb_ish, create_isb};
use crate::isa::aarch64::inst::{Instruction, RelocationKind};
use crate::linker;

/// Byte offsets of each region within the page (spec §4.8 items 1-3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JitLayout {
    pub veneer_offset: u64,
    pub code_offset: u64,
    pub rodata_offset: u64,
    pub data_offset: u64,
    pub total_size: u64,
}

/// Links `veneer_and_code` (the veneer region followed immediately by the
/// main code region, per spec §4.8 item 2: "main code region beginning at
/// `base + total_veneer_size`"), `rodata`, and `data` against one shared
/// label table, and returns the resulting page layout.
pub fn link_segments(
    veneer_and_code: &mut [Instruction],
    rodata: &mut [Instruction],
    data: &mut [Instruction],
    total_veneer_size: u64,
) -> CoreResult<JitLayout> {
    let code_offset = total_veneer_size;
    let rodata_offset = linker::stream_size(veneer_and_code);
    let data_offset = rodata_offset + linker::stream_size(rodata);
    let total_size = data_offset + linker::stream_size(data);

    let mut labels = linker::assign_addresses(veneer_and_code, 0);
    labels.merge(linker::assign_addresses(rodata, rodata_offset));
    labels.merge(linker::assign_addresses(data, data_offset));

    linker::apply_relocations(veneer_and_code, &labels)?;
    linker::apply_relocations(rodata, &labels)?;
    linker::apply_relocations(data, &labels)?;

    Ok(JitLayout {
        veneer_offset: 0,
        code_offset,
        rodata_offset,
        data_offset,
        total_size,
    })
}

/// Copies every instruction's resolved encoding into a `layout.total_size`
/// byte buffer (spec §4.8 "copy each instruction's 32-bit encoding into an
/// executable page"). `Label`-relocation data entries are 64-bit pointers
/// and are written as 8 little-endian bytes instead.
pub fn serialize_page(layout: &JitLayout, segments: &[&[Instruction]]) -> Vec<u8> {
    let mut page = vec![0u8; layout.total_size as usize];
    for segment in segments {
        for instr in segment.iter() {
            if instr.is_label_definition {
                continue;
            }
            let addr = instr.address as usize;
            if instr.is_data_value && instr.relocation == RelocationKind::Label {
                page[addr..addr + 8].copy_from_slice(&(instr.immediate as u64).to_le_bytes());
            } else {
                page[addr..addr + 4].copy_from_slice(&instr.encoding.to_le_bytes());
            }
        }
    }
    page
}

/// The `DSB ISH` / `ISB` pair that must run after the page is copied and
/// before the first call into it (spec §4.8: "an ISB/DSB sequence must be
/// issued to synchronize instruction caches"). Returned as data rather than
/// executed here, since this crate never maps or jumps into memory itself.
pub fn cache_sync_sequence() -> [Instruction; 2] {
    [create_dsb_ish(), create_isb()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::emit::{create_add_literal_with_offset, create_adrp, create_branch_unconditional};
    use crate::isa::aarch64::inst::Segment;

    #[test]
    fn layout_places_code_after_veneers_and_data_after_rodata() {
        let mut veneer_and_code = vec![Instruction::new("NOP", 0xD503_201F, "NOP".to_string())];
        let mut rodata = vec![Instruction::new("ASCII", 0, "\"x\"".to_string())];
        let mut data: Vec<Instruction> = Vec::new();
        let layout = link_segments(&mut veneer_and_code, &mut rodata, &mut data, 20).unwrap();
        assert_eq!(layout.code_offset, 20);
        assert_eq!(layout.rodata_offset, 4);
        assert_eq!(layout.data_offset, 4 + 4);
        assert_eq!(layout.total_size, 8);
    }

    #[test]
    fn cross_segment_label_resolves_through_merged_table() {
        let mut veneer_and_code = vec![create_adrp("X0", "msg").unwrap(), create_add_literal_with_offset("X0", "X0", "msg").unwrap()];
        let mut rodata = vec![Instruction::as_label("msg", Segment::Rodata), Instruction::new("ASCII", 0, "\"hi\"".to_string())];
        let mut data: Vec<Instruction> = Vec::new();
        let layout = link_segments(&mut veneer_and_code, &mut rodata, &mut data, 0).unwrap();
        // "msg" binds right where the code region ends.
        let msg_addr = layout.rodata_offset;
        let add = &veneer_and_code[1];
        let low12 = crate::bitpat::BitPatcher::new(add.encoding).extract(10, 12);
        assert_eq!(low12 as u64, msg_addr & 0xFFF);
    }

    #[test]
    fn serialize_page_writes_encodings_at_their_resolved_addresses() {
        let mut code = vec![Instruction::new("NOP", 0xD503_201F, "NOP".to_string())];
        let mut rodata: Vec<Instruction> = Vec::new();
        let mut data: Vec<Instruction> = Vec::new();
        let layout = link_segments(&mut code, &mut rodata, &mut data, 0).unwrap();
        let page = serialize_page(&layout, &[&code, &rodata, &data]);
        assert_eq!(&page[0..4], &0xD503_201Fu32.to_le_bytes());
    }

    #[test]
    fn unresolved_cross_segment_label_is_fatal() {
        let mut code = vec![create_branch_unconditional("nowhere").unwrap()];
        let mut rodata: Vec<Instruction> = Vec::new();
        let mut data: Vec<Instruction> = Vec::new();
        assert!(link_segments(&mut code, &mut rodata, &mut data, 0).is_err());
    }

    #[test]
    fn cache_sync_sequence_is_dsb_then_isb() {
        let [dsb, isb] = cache_sync_sequence();
        assert_eq!(dsb.opcode, "DSB");
        assert_eq!(isb.opcode, "ISB");
    }
}
