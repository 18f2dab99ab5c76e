//! C8: the text assembly writer (spec §4.7.2). Renders a linked instruction
//! stream as Mach-O-flavored assembly, grounded on
//! `original_source/AssemblyWriter.cpp` — same segment-then-section split,
//! same `L_`-prefix renaming, same veneer-elision and `BL`-to-underscored-
//! symbol rewriting, reimplemented over this crate's `Instruction` model
//! instead of a `std::ofstream` walk.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use crate::isa::aarch64::inst::{Instruction, JitAttribute, RelocationKind, Segment};
use crate::runtime::RuntimeManager;

/// Label every instruction not already `L_`-prefixed or `_start` gets
/// written under (spec §4.7.2 "rename labels for toolchain compatibility").
fn rename_label(label: &str) -> String {
    let renamed = if let Some(rest) = label.strip_prefix(".L") {
        format!("L_{rest}")
    } else if label == "_start" || label.starts_with("L_") {
        label.to_string()
    } else {
        format!("L_{label}")
    };
    renamed.replace("::", "_")
}

/// Renders `instructions` as Mach-O assembly text (spec §4.7.2). Does not
/// touch the filesystem; [`write_to_file`] is the thin wrapper that does.
pub fn render_assembly(instructions: &[Instruction], veneer_labels: &BTreeMap<String, String>, runtime: &dyn RuntimeManager) -> String {
    let mut code = Vec::new();
    let mut rodata = Vec::new();
    let mut data = Vec::new();
    for instr in instructions {
        match instr.segment {
            Segment::Code => code.push(instr),
            Segment::Rodata => rodata.push(instr),
            Segment::Data => data.push(instr),
        }
    }

    let veneer_label_set: BTreeSet<&str> = veneer_labels.values().map(|s| s.as_str()).collect();
    let veneer_to_function: BTreeMap<&str, &str> = veneer_labels.iter().map(|(f, l)| (l.as_str(), f.as_str())).collect();

    let mut external_symbols = BTreeSet::new();
    for instr in &code {
        if instr.relocation == RelocationKind::PcRelative26 && !instr.target_label.is_empty() {
            if runtime.is_function_registered(&instr.target_label) {
                external_symbols.insert(format!("_{}", instr.target_label));
            }
            if let Some(function_name) = veneer_to_function.get(instr.target_label.as_str()) {
                external_symbols.insert(format!("_{function_name}"));
            }
        }
    }
    for (name, _) in runtime.registered_functions() {
        external_symbols.insert(format!("_{name}"));
    }

    let mut out = String::new();
    out.push_str(".section __TEXT,__text,regular,pure_instructions\n");
    out.push_str(".globl _start\n");
    out.push_str(".globl _START\n");
    for sym in &external_symbols {
        out.push_str(&format!(".globl {sym}\n"));
    }
    out.push_str(".p2align 2\n");
    out.push_str("_start:\n");
    out.push_str("_START:\n");
    out.push_str("    B L_START\n");

    let mut i = 0;
    while i < code.len() {
        let instr = code[i];

        if instr.jit_attribute == JitAttribute::JitAddress {
            // Whole MOVZ/MOVK*3/BR veneer trampoline: elided entirely in
            // static assembly (spec §4.7.2 "veneers are JIT-only").
            i += 1;
            continue;
        }

        if instr.is_label_definition {
            if !veneer_label_set.contains(instr.target_label.as_str()) {
                out.push_str(&format!("{}:\n", rename_label(&instr.target_label)));
            }
            i += 1;
            continue;
        }

        if instr.relocation == RelocationKind::PcRelative26 && !instr.target_label.is_empty() {
            if let Some(function_name) = veneer_to_function.get(instr.target_label.as_str()) {
                out.push_str(&format!("    BL _{function_name}\n"));
                i += 1;
                continue;
            }
            if runtime.is_function_registered(&instr.target_label) {
                out.push_str(&format!("    BL _{}\n", instr.target_label));
                i += 1;
                continue;
            }
        }

        // ADRP/ADD-literal pair -> clang-compatible @PAGE/@PAGEOFF form.
        if instr.opcode == "ADRP" && i + 1 < code.len() && code[i + 1].opcode == "ADD" && code[i + 1].relocation == RelocationKind::Add12Unsigned {
            let reg = instr.dest_reg.clone().unwrap_or_default();
            let label = rename_label(&instr.target_label);
            out.push_str(&format!("    ADRP {reg}, {label}@PAGE\n"));
            out.push_str(&format!("    ADD {reg}, {reg}, {label}@PAGEOFF\n"));
            i += 2;
            continue;
        }

        if !instr.assembly_text.is_empty() {
            out.push_str(&format!("    {}\n", instr.assembly_text));
        }
        i += 1;
    }

    if !rodata.is_empty() {
        out.push_str("\n.section __DATA,__const\n");
        out.push_str(".p2align 3\n");
        for instr in &rodata {
            if instr.relocation == RelocationKind::AbsoluteHi32 {
                continue;
            }
            if instr.is_label_definition && !instr.target_label.is_empty() {
                out.push_str(&format!("{}:\n", rename_label(&instr.target_label)));
                continue;
            }
            if instr.relocation == RelocationKind::Label || instr.relocation == RelocationKind::AbsoluteLo32 {
                out.push_str(&format!("    .quad {}\n", rename_label(&instr.target_label)));
            } else if !instr.assembly_text.is_empty() {
                out.push_str(&format!("    {}\n", instr.assembly_text));
            }
        }
    }

    if !data.is_empty() {
        out.push_str("\n.section __DATA,__data\n");
        out.push_str(".p2align 3\n");
        let mut skipping_runtime_table = false;
        for instr in &data {
            if instr.is_label_definition && !instr.target_label.is_empty() {
                if instr.target_label == "L__runtime_function_table" {
                    skipping_runtime_table = true;
                    continue;
                }
                skipping_runtime_table = false;
                out.push_str(&format!("{}:\n", rename_label(&instr.target_label)));
                continue;
            }
            if skipping_runtime_table {
                continue;
            }
            if instr.relocation == RelocationKind::AbsoluteHi32 {
                continue;
            }
            if instr.relocation == RelocationKind::Label || instr.relocation == RelocationKind::AbsoluteLo32 {
                out.push_str(&format!("    .quad {}\n", rename_label(&instr.target_label)));
            } else if !instr.assembly_text.is_empty() {
                out.push_str(&format!("    {}\n", instr.assembly_text));
            }
        }
    }

    out
}

/// Writes the rendered assembly to `path` (spec §6.4: "emits a single file
/// to a caller-provided path ... never reads files").
pub fn write_to_file(
    path: &Path,
    instructions: &[Instruction],
    veneer_labels: &BTreeMap<String, String>,
    runtime: &dyn RuntimeManager,
) -> io::Result<()> {
    let text = render_assembly(instructions, veneer_labels, runtime);
    fs::write(path, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::emit::{create_adrp, create_add_literal_with_offset, create_branch_with_link};
    use crate::runtime::{RuntimeCallableKind, RuntimeFunctionDescriptor, StaticRuntimeRegistry};

    fn registry_with(names: &[&str]) -> StaticRuntimeRegistry {
        let mut reg = StaticRuntimeRegistry::new();
        for name in names {
            reg.register(
                *name,
                RuntimeFunctionDescriptor {
                    address: 0x1000,
                    arity: 1,
                    returns_float: false,
                    kind: RuntimeCallableKind::RuntimeRoutine,
                },
            );
        }
        reg
    }

    #[test]
    fn labels_are_prefixed_except_start() {
        assert_eq!(rename_label("foo"), "L_foo");
        assert_eq!(rename_label(".Lfoo"), "L_foo");
        assert_eq!(rename_label("_start"), "_start");
        assert_eq!(rename_label("Class::method"), "L_Class_method");
    }

    #[test]
    fn direct_bl_to_registered_runtime_function_is_rewritten() {
        let runtime = registry_with(&["WRITEF"]);
        let instructions = vec![create_branch_with_link("WRITEF").unwrap()];
        let text = render_assembly(&instructions, &BTreeMap::new(), &runtime);
        assert!(text.contains("BL _WRITEF"));
        assert!(text.contains(".globl _WRITEF"));
    }

    #[test]
    fn bl_to_veneer_label_is_rewritten_to_the_underscored_function() {
        let runtime = StaticRuntimeRegistry::new();
        let instructions = vec![create_branch_with_link("WRITEF_veneer").unwrap()];
        let mut veneers = BTreeMap::new();
        veneers.insert("WRITEF".to_string(), "WRITEF_veneer".to_string());
        let text = render_assembly(&instructions, &veneers, &runtime);
        assert!(text.contains("BL _WRITEF"));
        assert!(!text.contains("WRITEF_veneer"));
    }

    #[test]
    fn adrp_add_pair_renders_clang_compatible_page_form() {
        let runtime = StaticRuntimeRegistry::new();
        let instructions = vec![create_adrp("X0", "msg").unwrap(), create_add_literal_with_offset("X0", "X0", "msg").unwrap()];
        let text = render_assembly(&instructions, &BTreeMap::new(), &runtime);
        assert!(text.contains("ADRP X0, L_msg@PAGE"));
        assert!(text.contains("ADD X0, X0, L_msg@PAGEOFF"));
    }

    #[test]
    fn jit_address_tagged_instructions_are_elided() {
        let runtime = StaticRuntimeRegistry::new();
        let mut instr = create_branch_with_link("anything").unwrap();
        instr.jit_attribute = JitAttribute::JitAddress;
        let text = render_assembly(&[instr], &BTreeMap::new(), &runtime);
        assert!(!text.contains("anything"));
    }

    #[test]
    fn runtime_function_table_entries_are_suppressed_in_data_section() {
        let runtime = StaticRuntimeRegistry::new();
        let mut table_label = Instruction::as_label("L__runtime_function_table", Segment::Data);
        table_label.is_label_definition = true;
        let mut entry = Instruction::as_relocatable_data("some_fn", Segment::Data);
        entry.relocation = RelocationKind::Label;
        let mut next_label = Instruction::as_label("after_table", Segment::Data);
        next_label.is_label_definition = true;
        let instructions = vec![table_label, entry, next_label];
        let text = render_assembly(&instructions, &BTreeMap::new(), &runtime);
        assert!(!text.contains("L__runtime_function_table"));
        assert!(!text.contains("some_fn"));
        assert!(text.contains("L_after_table"));
    }
}
