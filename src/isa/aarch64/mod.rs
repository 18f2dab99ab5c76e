//! AArch64 instruction set support: register/operand parsing, immediate
//! encoding, and the full encoder library (C1/C2, spec §4.1-4.2).

pub mod args;
pub mod emit;
pub mod imms;
pub mod inst;
pub mod regs;
