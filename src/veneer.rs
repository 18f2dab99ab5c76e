//! C7: veneer generation for calls into the runtime's registered functions
//! (spec §4.6). Grounded on `original_source/VeneerManager.h`/`.cpp`: one
//! veneer per expanded external function, each a MOVZ/MOVK×4 + BR X16
//! trampoline built with the same encoders the rest of the pipeline uses,
//! appended directly to the instruction stream with a predictable
//! `<name>_veneer` label the linker later resolves.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::config::CoreOptions;
use crate::error::CoreResult;
use crate::isa::aarch64::emit::{create_br_reg, create_move_immediate_jit};
use crate::isa::aarch64::inst::{Instruction, Segment};
use crate::runtime::RuntimeManager;

/// Four MOVZ/MOVK chunks loading the target address into X16, plus the
/// trailing `BR X16` (spec §4.6: "VENEER_SIZE = 20 bytes = 5 * 4").
pub const VENEER_SIZE_BYTES: u64 = 20;

/// One generated trampoline (spec §4.6 `VeneerEntry`). `veneer_address` is
/// left unset here — the linker is the sole authority on addresses (spec
/// §4.7.1) — and is filled in by the caller once the instruction stream has
/// been laid out and linked.
#[derive(Clone, Debug)]
pub struct VeneerEntry {
    pub function_name: String,
    pub label: String,
    pub instructions: Vec<Instruction>,
}

/// Builds veneers for a requested set of external functions, expanding
/// function families (spec §4.6 `expand_function_families`) against a
/// [`RuntimeManager`].
#[derive(Default)]
pub struct VeneerManager {
    veneer_labels: BTreeMap<String, String>,
    total_veneer_size: u64,
}

impl VeneerManager {
    pub fn new() -> Self {
        VeneerManager::default()
    }

    pub fn has_veneer(&self, function_name: &str) -> bool {
        self.veneer_labels.contains_key(function_name)
    }

    pub fn veneer_label(&self, function_name: &str) -> Option<&str> {
        self.veneer_labels.get(function_name).map(|s| s.as_str())
    }

    pub fn total_veneer_size(&self) -> u64 {
        self.total_veneer_size
    }

    /// Builds one veneer's trampoline: `MOVZ/MOVK <scratch>, #<addr chunks>`
    /// then `BR <scratch>`, every instruction tagged `JitAddress` (spec §4.6
    /// `create_veneer`).
    fn create_veneer(&self, function_name: &str, runtime: &dyn RuntimeManager, options: &CoreOptions) -> CoreResult<VeneerEntry> {
        let label = format!("{function_name}_veneer");
        let mut instructions: Vec<Instruction> = create_move_immediate_jit(options.scratch_reg, &label)?.into_iter().collect();
        instructions.push(create_br_reg(options.scratch_reg)?);
        for instr in &mut instructions {
            instr.jit_attribute = crate::isa::aarch64::inst::JitAttribute::JitAddress;
        }
        let _ = runtime; // target address is resolved later, by the linker, from `label`.
        Ok(VeneerEntry { function_name: function_name.to_string(), label, instructions })
    }

    /// Generates veneers for the expanded function set, appending a label
    /// definition plus the trampoline instructions for each to `stream`
    /// (spec §4.6 `generate_veneers`). Returns the generated entries in the
    /// order they were appended.
    pub fn generate_veneers(
        &mut self,
        external_functions: &BTreeSet<String>,
        runtime: &dyn RuntimeManager,
        options: &CoreOptions,
        stream: &mut Vec<Instruction>,
    ) -> CoreResult<Vec<VeneerEntry>> {
        let expanded = self.expand_function_families(external_functions, runtime);
        if expanded.is_empty() {
            log::trace!("veneer manager: no external functions after expansion, skipping");
            return Ok(Vec::new());
        }

        log::debug!("veneer manager: generating {} veneers", expanded.len());
        let mut entries = Vec::new();
        for function_name in &expanded {
            let veneer = self.create_veneer(function_name, runtime, options)?;
            stream.push(Instruction::as_label(&veneer.label, Segment::Code));
            for instr in &veneer.instructions {
                stream.push(instr.clone());
            }
            self.veneer_labels.insert(function_name.clone(), veneer.label.clone());
            entries.push(veneer);
        }
        self.total_veneer_size = entries.len() as u64 * VENEER_SIZE_BYTES;
        Ok(entries)
    }

    /// Spec §4.6 "Function-family expansion": always add
    /// `HeapManager_enter_scope`/`HeapManager_exit_scope` when the runtime
    /// has registered them, and expand a bare `WRITEF` request into
    /// whichever of `WRITEF1`..`WRITEF7` the runtime actually registered.
    fn expand_function_families(&self, base: &BTreeSet<String>, runtime: &dyn RuntimeManager) -> BTreeSet<String> {
        let mut expanded = base.clone();

        for essential in ["HeapManager_enter_scope", "HeapManager_exit_scope"] {
            if runtime.is_function_registered(essential) {
                expanded.insert(essential.to_string());
            } else {
                log::warn!("veneer manager: essential runtime function '{essential}' is not registered");
            }
        }

        if base.contains("WRITEF") {
            for i in 1..=7 {
                let variant = format!("WRITEF{i}");
                if runtime.is_function_registered(&variant) {
                    expanded.insert(variant);
                }
            }
        }

        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn heap_manager_functions_always_get_veneers() {
        let runtime = registry_with(&["HeapManager_enter_scope", "HeapManager_exit_scope"]);
        let mut mgr = VeneerManager::new();
        let mut stream = Vec::new();
        let entries = mgr.generate_veneers(&BTreeSet::new(), &runtime, &CoreOptions::default(), &mut stream).unwrap();
        let names: BTreeSet<_> = entries.iter().map(|e| e.function_name.clone()).collect();
        assert!(names.contains("HeapManager_enter_scope"));
        assert!(names.contains("HeapManager_exit_scope"));
    }

    #[test]
    fn writef_expands_to_registered_variants_only() {
        let runtime = registry_with(&["WRITEF", "WRITEF1", "WRITEF2", "HeapManager_enter_scope", "HeapManager_exit_scope"]);
        let mut mgr = VeneerManager::new();
        let mut stream = Vec::new();
        let requested: BTreeSet<String> = ["WRITEF".to_string()].into_iter().collect();
        let entries = mgr.generate_veneers(&requested, &runtime, &CoreOptions::default(), &mut stream).unwrap();
        let names: BTreeSet<_> = entries.iter().map(|e| e.function_name.clone()).collect();
        assert!(names.contains("WRITEF1"));
        assert!(names.contains("WRITEF2"));
        assert!(!names.contains("WRITEF3"));
    }

    #[test]
    fn veneer_label_follows_naming_convention() {
        let runtime = registry_with(&["FOO", "HeapManager_enter_scope", "HeapManager_exit_scope"]);
        let mut mgr = VeneerManager::new();
        let mut stream = Vec::new();
        let requested: BTreeSet<String> = ["FOO".to_string()].into_iter().collect();
        mgr.generate_veneers(&requested, &runtime, &CoreOptions::default(), &mut stream).unwrap();
        assert_eq!(mgr.veneer_label("FOO"), Some("FOO_veneer"));
        assert!(mgr.has_veneer("FOO"));
    }

    #[test]
    fn each_veneer_is_four_movz_movk_chunks_plus_br() {
        let runtime = registry_with(&["FOO", "HeapManager_enter_scope", "HeapManager_exit_scope"]);
        let mut mgr = VeneerManager::new();
        let mut stream = Vec::new();
        let requested: BTreeSet<String> = ["FOO".to_string()].into_iter().collect();
        let entries = mgr.generate_veneers(&requested, &runtime, &CoreOptions::default(), &mut stream).unwrap();
        let foo = entries.iter().find(|e| e.function_name == "FOO").unwrap();
        assert_eq!(foo.instructions.len(), 5);
        assert_eq!(foo.instructions[4].opcode, "BR");
        assert!(foo.instructions.iter().all(|i| matches!(i.jit_attribute, crate::isa::aarch64::inst::JitAttribute::JitAddress)));
        assert_eq!(mgr.total_veneer_size(), entries.len() as u64 * VENEER_SIZE_BYTES);
    }

    #[test]
    fn empty_request_with_no_runtime_functions_skips_generation() {
        let runtime = StaticRuntimeRegistry::new();
        let mut mgr = VeneerManager::new();
        let mut stream = Vec::new();
        let entries = mgr.generate_veneers(&BTreeSet::new(), &runtime, &CoreOptions::default(), &mut stream).unwrap();
        assert!(entries.is_empty());
        assert!(stream.is_empty());
    }
}
