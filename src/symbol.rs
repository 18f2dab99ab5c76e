//! C3: symbol model, persistent symbol table, and per-function metrics
//! (spec §3.2-§3.4). Grounded on the original `Symbol`/`SymbolTable` classes:
//! a single append-only vector, `exitScope` as a decrement-only marker, and
//! a three-step `lookup` priority (requested context, then Global, then any
//! other local context with a warning).

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::types::VarType;

/// The kind of a declared name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    LocalVar,
    StaticVar,
    GlobalVar,
    MemberVar,
    Parameter,
    Function,
    FloatFunction,
    Routine,
    Label,
    ManifestConstant,
    RuntimeFunction,
    RuntimeFloatFunction,
    RuntimeRoutine,
    RuntimeFloatRoutine,
}

impl SymbolKind {
    /// Function-like symbols carry a parameter list (spec §3.2).
    pub fn is_function_like(self) -> bool {
        matches!(
            self,
            SymbolKind::Function
                | SymbolKind::FloatFunction
                | SymbolKind::Routine
                | SymbolKind::RuntimeFunction
                | SymbolKind::RuntimeFloatFunction
                | SymbolKind::RuntimeRoutine
                | SymbolKind::RuntimeFloatRoutine
        )
    }
}

/// Where a symbol lives at runtime. Replaces the spec's abstract "optional
/// location" with the four concrete kinds the original `SymbolTable`
/// actually sets (`setSymbolStackLocation`, `setSymbolDataLocation`,
/// `setSymbolAbsoluteValue`, plus a label for functions/routines).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SymbolLocation {
    /// Offset in bytes from the frame pointer.
    Stack(i32),
    /// Offset in bytes into the data segment.
    Data(u64),
    /// A compile-time-known absolute immediate.
    Absolute(i64),
    /// A named label (function/routine entry, static data).
    Label(String),
}

/// One formal parameter of a function-like symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: String,
    pub ty: VarType,
    /// e.g. a by-reference / variadic marker; kept as an opaque flag since
    /// the AST this crate consumes is supplied externally (spec §1).
    pub flag: Option<String>,
}

/// A single declared name (spec §3.2).
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: VarType,
    /// 0 = global.
    pub scope_level: i32,
    pub block_id: u32,
    /// `"Global"` for top-level declarations.
    pub function_name: String,
    /// Parsed from a qualified `Class::method` name, if any.
    pub class_name: Option<String>,
    pub location: Option<SymbolLocation>,
    pub parameters: Vec<ParamDescriptor>,
    /// This variable currently references a heap allocation it owns.
    pub owns_heap_memory: bool,
    /// For list values whose elements are all compile-time literals.
    pub contains_literals: bool,
    /// Known element count, if statically determined (bounds checking, §4.4.3).
    pub size: Option<i64>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, ty: VarType, scope_level: i32) -> Self {
        let name = name.into();
        let class_name = name.rsplit_once("::").map(|(class, _)| class.to_string());
        Symbol {
            name,
            kind,
            ty,
            scope_level,
            block_id: 0,
            function_name: "Global".to_string(),
            class_name,
            location: None,
            parameters: Vec::new(),
            owns_heap_memory: false,
            contains_literals: false,
            size: None,
        }
    }

    pub fn has_known_size(&self) -> bool {
        self.size.is_some()
    }
}

/// Per-function metrics gathered by the analyzer (spec §3.4), extended with
/// the callee-saved-register and trivial-accessor bookkeeping the original
/// `FunctionMetrics` struct carried (spec §14).
#[derive(Clone, Debug, Default)]
pub struct FunctionMetrics {
    pub num_parameters: usize,
    pub num_int_variables: usize,
    pub num_float_variables: usize,
    pub num_runtime_calls: usize,
    pub num_local_function_calls: usize,
    pub num_local_routine_calls: usize,
    pub performs_heap_allocation: bool,
    /// True until the first call site is seen.
    pub is_leaf: bool,
    pub is_trivial_accessor: bool,
    pub is_trivial_setter: bool,
    pub accessed_member_name: Option<String>,
    pub is_safe_to_inline: bool,
    pub peak_live_variables: usize,
    pub required_callee_saved_regs: BTreeSet<String>,
    pub has_call_preserving_expressions: bool,
    pub variable_types: BTreeMap<String, VarType>,
}

impl FunctionMetrics {
    pub fn new() -> Self {
        FunctionMetrics {
            is_leaf: true,
            ..Default::default()
        }
    }

    pub fn record_call(&mut self) {
        self.is_leaf = false;
    }

    /// Bumps the int/float variable counter matching `ty` (spec §4.3
    /// "Metrics update"; ported from `TemporaryVariableFactory::create`'s
    /// `num_float_variables`/`num_variables` split).
    pub fn num_variables_incr(&mut self, ty: VarType) {
        if ty.contains(VarType::FLOAT) {
            self.num_float_variables += 1;
        } else {
            self.num_int_variables += 1;
        }
    }

    pub fn record_variable_type(&mut self, name: &str, ty: VarType) {
        self.variable_types
            .entry(name.to_string())
            .and_modify(|existing| {
                if VarType::should_update(*existing, ty) {
                    *existing = ty;
                }
            })
            .or_insert(ty);
    }
}

/// A persistent, append-only symbol store (spec §3.3). `exit_scope` only
/// decrements the scope counter — symbols are never removed, matching the
/// original's "producers only push; scope exit is a marker, not a
/// destructive operation" design (spec §9).
#[derive(Default)]
pub struct SymbolTable {
    all_symbols: Vec<Symbol>,
    current_scope_level: i32,
    current_function_name: String,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            all_symbols: Vec::new(),
            current_scope_level: 0,
            current_function_name: "Global".to_string(),
        }
    }

    pub fn enter_scope(&mut self) {
        self.current_scope_level += 1;
    }

    pub fn exit_scope(&mut self) {
        if self.current_scope_level > 0 {
            self.current_scope_level -= 1;
        } else {
            log::warn!("attempted to exit global scope");
        }
    }

    pub fn current_scope_level(&self) -> i32 {
        self.current_scope_level
    }

    pub fn set_current_function(&mut self, function_name: impl Into<String>) {
        self.current_function_name = function_name.into();
    }

    pub fn current_function(&self) -> &str {
        &self.current_function_name
    }

    /// Appends `symbol` unless a symbol of the same name already exists in
    /// the same scope level and function. Returns `false` on redefinition.
    pub fn add_symbol(&mut self, symbol: Symbol) -> bool {
        let redefined = self.all_symbols.iter().rev().any(|s| {
            s.name == symbol.name
                && s.scope_level == symbol.scope_level
                && s.function_name == symbol.function_name
        });
        if redefined {
            return false;
        }
        log::trace!(
            "symbol table: add '{}' kind={:?} ty={} scope={} fn={}",
            symbol.name,
            symbol.kind,
            symbol.ty,
            symbol.scope_level,
            symbol.function_name
        );
        self.all_symbols.push(symbol);
        true
    }

    /// Unqualified lookup: innermost (most recently pushed) match by name
    /// only, irrespective of function context.
    pub fn lookup_any(&self, name: &str) -> Option<&Symbol> {
        let found = self.all_symbols.iter().rev().find(|s| s.name == name);
        if found.is_none() {
            log::trace!("symbol table: lookup failed for '{}'", name);
        }
        found
    }

    /// Three-step lookup (spec §3.3, invariant): requested function context,
    /// then `Global`, then any other local context (with a warning).
    pub fn lookup(&self, name: &str, function_context: &str) -> Option<&Symbol> {
        if let Some(s) = self
            .all_symbols
            .iter()
            .rev()
            .find(|s| s.name == name && s.function_name == function_context)
        {
            return Some(s);
        }
        if let Some(s) = self
            .all_symbols
            .iter()
            .rev()
            .find(|s| s.name == name && s.function_name == "Global")
        {
            return Some(s);
        }
        if let Some(s) = self.all_symbols.iter().rev().find(|s| {
            s.name == name && s.function_name != "Global" && s.function_name != function_context
        }) {
            log::warn!(
                "symbol table: found '{}' in unrelated context '{}' (requested '{}')",
                name,
                s.function_name,
                function_context
            );
            return Some(s);
        }
        log::trace!(
            "symbol table: lookup failed for '{}' in context '{}'",
            name,
            function_context
        );
        None
    }

    /// All symbols declared at exactly `scope_level`, in declaration order.
    /// Used by the CFG builder to find the owning symbols a block's cleanup
    /// chain must release (spec §4.5).
    pub fn symbols_in_scope(&self, scope_level: i32) -> Vec<&Symbol> {
        self.all_symbols
            .iter()
            .filter(|s| s.scope_level == scope_level)
            .collect()
    }

    /// Replace the most recent symbol named `name` with `new_symbol`,
    /// honoring the type priority-update rule (spec §3.1).
    pub fn update_symbol(&mut self, name: &str, new_symbol: Symbol) -> bool {
        if let Some(existing) = self.all_symbols.iter_mut().rev().find(|s| s.name == name) {
            if VarType::should_update(existing.ty, new_symbol.ty) {
                *existing = new_symbol;
                return true;
            }
        }
        false
    }

    pub fn update_symbol_type(&mut self, name: &str, ty: VarType) -> bool {
        if let Some(existing) = self.all_symbols.iter_mut().rev().find(|s| s.name == name) {
            if VarType::should_update(existing.ty, ty) {
                existing.ty = ty;
                return true;
            }
        }
        false
    }

    pub fn set_symbol_stack_location(&mut self, name: &str, offset: i32) {
        if let Some(existing) = self.all_symbols.iter_mut().rev().find(|s| s.name == name) {
            existing.location = Some(SymbolLocation::Stack(offset));
        }
    }

    pub fn set_symbol_data_location(&mut self, name: &str, offset: u64) {
        if let Some(existing) = self.all_symbols.iter_mut().rev().find(|s| s.name == name) {
            existing.location = Some(SymbolLocation::Data(offset));
        }
    }

    pub fn set_symbol_absolute_value(&mut self, name: &str, value: i64) {
        if let Some(existing) = self.all_symbols.iter_mut().rev().find(|s| s.name == name) {
            existing.location = Some(SymbolLocation::Absolute(value));
        }
    }

    pub fn all_symbols(&self) -> &[Symbol] {
        &self.all_symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str, scope: i32, func: &str) -> Symbol {
        let mut s = Symbol::new(name, SymbolKind::LocalVar, VarType::INTEGER, scope);
        s.function_name = func.to_string();
        s
    }

    #[test]
    fn lookup_priority_is_context_then_global_then_other() {
        let mut t = SymbolTable::new();
        t.add_symbol(sym("x", 0, "Global"));
        t.add_symbol(sym("x", 1, "OtherFn"));
        assert_eq!(t.lookup("x", "MyFn").unwrap().function_name, "Global");

        let mut t2 = SymbolTable::new();
        t2.add_symbol(sym("y", 1, "MyFn"));
        t2.add_symbol(sym("y", 0, "Global"));
        assert_eq!(t2.lookup("y", "MyFn").unwrap().function_name, "MyFn");

        let mut t3 = SymbolTable::new();
        t3.add_symbol(sym("z", 1, "OtherFn"));
        assert_eq!(t3.lookup("z", "MyFn").unwrap().function_name, "OtherFn");
    }

    #[test]
    fn scope_exit_never_removes_symbols() {
        let mut t = SymbolTable::new();
        t.enter_scope();
        t.add_symbol(sym("a", 1, "Global"));
        t.exit_scope();
        assert!(t.lookup_any("a").is_some());
        assert_eq!(t.current_scope_level(), 0);
    }

    #[test]
    fn redefinition_in_same_scope_and_function_is_rejected() {
        let mut t = SymbolTable::new();
        assert!(t.add_symbol(sym("a", 0, "Global")));
        assert!(!t.add_symbol(sym("a", 0, "Global")));
    }

    #[test]
    fn class_qualified_name_parses_class() {
        let s = Symbol::new("Point::length", SymbolKind::Function, VarType::INTEGER, 0);
        assert_eq!(s.class_name.as_deref(), Some("Point"));
    }
}
