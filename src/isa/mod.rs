//! Target-specific instruction-set backends. AArch64 is the only target the
//! core currently emits for (spec §1).

pub mod aarch64;
