//! Target- and ABI-level data shared by every `tidec` codegen backend.
//!
//! This crate mirrors the role of `rustc_abi`/`rustc_target`: it has no
//! knowledge of any particular backend (LLVM, Cranelift, ...) and is consumed
//! by both `tidec_lir` (to compute layouts) and `tidec_codegen_ssa` (to
//! compute calling conventions).

pub mod calling_convention;
pub mod layout;
pub mod size_and_align;
pub mod target;
