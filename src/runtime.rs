//! C7/C8 external collaborator: the runtime function registry consumed by
//! the veneer manager and linker (spec §6.1). The host runtime
//! (`HeapManager`, `RuntimeManager`, I/O primitives) itself is out of scope
//! (spec §1); this module only describes the interface this core depends on
//! and a small in-memory implementation used by this crate's own tests,
//! grounded on `RuntimeManager::instance()` in `original_source/VeneerManager.cpp`.

use std::collections::BTreeMap;

/// The kind of callable a runtime symbol resolves to (spec §3.2's four
/// runtime-routine/function kinds, restated from the registry's point of
/// view rather than the symbol table's).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeCallableKind {
    RuntimeFunction,
    RuntimeFloatFunction,
    RuntimeRoutine,
    RuntimeFloatRoutine,
}

/// One registered runtime symbol (spec §6.1 `get_function`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeFunctionDescriptor {
    pub address: u64,
    pub arity: u32,
    pub returns_float: bool,
    pub kind: RuntimeCallableKind,
}

/// The registry interface the core depends on; the host runtime loads a
/// fixed set of names before the compiler starts and the compiler never
/// mutates this registry (spec §6.1).
pub trait RuntimeManager {
    fn is_function_registered(&self, name: &str) -> bool;
    fn get_function(&self, name: &str) -> Option<&RuntimeFunctionDescriptor>;
    fn registered_functions(&self) -> Vec<(&str, &RuntimeFunctionDescriptor)>;
    fn is_tracing_enabled(&self) -> bool;
}

/// A fixed-table runtime registry, the shape a host would build once at
/// startup and hand to the compiler (spec §6.1: "assumed to load a fixed
/// set of names before the compiler starts").
#[derive(Default)]
pub struct StaticRuntimeRegistry {
    functions: BTreeMap<String, RuntimeFunctionDescriptor>,
    tracing_enabled: bool,
}

impl StaticRuntimeRegistry {
    pub fn new() -> Self {
        StaticRuntimeRegistry::default()
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing_enabled = enabled;
        self
    }

    pub fn register(&mut self, name: impl Into<String>, descriptor: RuntimeFunctionDescriptor) {
        self.functions.insert(name.into(), descriptor);
    }
}

impl RuntimeManager for StaticRuntimeRegistry {
    fn is_function_registered(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    fn get_function(&self, name: &str) -> Option<&RuntimeFunctionDescriptor> {
        self.functions.get(name)
    }

    fn registered_functions(&self) -> Vec<(&str, &RuntimeFunctionDescriptor)> {
        self.functions.iter().map(|(k, v)| (k.as_str(), v)).collect()
    }

    fn is_tracing_enabled(&self) -> bool {
        self.tracing_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_reports_registered_and_unregistered_names() {
        let mut reg = StaticRuntimeRegistry::new();
        reg.register(
            "WRITEF",
            RuntimeFunctionDescriptor {
                address: 0x1000,
                arity: 2,
                returns_float: false,
                kind: RuntimeCallableKind::RuntimeRoutine,
            },
        );
        assert!(reg.is_function_registered("WRITEF"));
        assert!(!reg.is_function_registered("NOPE"));
        assert_eq!(reg.get_function("WRITEF").unwrap().address, 0x1000);
    }
}
