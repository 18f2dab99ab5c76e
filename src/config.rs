//! In-process pass configuration (spec §12). Grounded on
//! `cranelift-codegen`'s settings/flags pattern: a plain struct of toggles
//! threaded explicitly through every entry point, never a global.

/// Options every top-level pass takes by reference. `Default` matches the
/// documented default pipeline: all optimizations on, X16 as the veneer
/// scratch register, Mach-O-flavored text output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoreOptions {
    pub enable_global_cse: bool,
    pub enable_local_cse: bool,
    pub enable_bounds_checking: bool,
    pub enable_string_lifting: bool,
    pub scratch_reg: &'static str,
    pub emit_clang_compatible_asm: bool,
}

impl Default for CoreOptions {
    fn default() -> Self {
        CoreOptions {
            enable_global_cse: true,
            enable_local_cse: true,
            enable_bounds_checking: true,
            enable_string_lifting: true,
            scratch_reg: "X16",
            emit_clang_compatible_asm: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_every_optimization_and_use_x16() {
        let opts = CoreOptions::default();
        assert!(opts.enable_global_cse);
        assert!(opts.enable_local_cse);
        assert!(opts.enable_bounds_checking);
        assert!(opts.enable_string_lifting);
        assert_eq!(opts.scratch_reg, "X16");
        assert!(opts.emit_clang_compatible_asm);
    }
}
