//! AST analysis, optimization, CFG construction, and AArch64 instruction
//! encoding/linking core for a BCPL-family compiler (see `SPEC_FULL.md`).

pub mod analyzer;
pub mod asmwriter;
pub mod ast;
pub mod bitpat;
pub mod cfg;
pub mod config;
pub mod error;
pub mod isa;
pub mod jit;
pub mod linker;
pub mod optimizer;
pub mod reducer;
pub mod runtime;
pub mod symbol;
pub mod types;
pub mod veneer;

pub use error::{CoreError, CoreResult};
