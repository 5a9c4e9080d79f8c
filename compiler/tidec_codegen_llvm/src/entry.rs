use crate::{builder::CodegenBuilder, context::CodegenCtx};
use inkwell::context::Context;
use tidec_codegen_ssa::traits::CodegenMethods;
use tidec_lir::lir::{LirTyCtx, LirUnit};
use tracing::instrument;

#[instrument(level = "info", skip(lir_ty_ctx, lir_unit), fields(unit = %lir_unit.metadata.unit_name))]
/// Top-level driver: build a fresh LLVM context/module, run the two-phase
/// pre-define/define pipeline over every body, and emit the module's
/// textual IR (spec §4.E, §9).
pub fn llvm_codegen_lir_unit(lir_ty_ctx: LirTyCtx, lir_unit: LirUnit) -> String {
    let ll_context = Context::create();
    let ll_module = ll_context.create_module(&lir_unit.metadata.unit_name);
    let ctx = CodegenCtx::new(lir_ty_ctx, &ll_context, ll_module);

    tidec_codegen_ssa::entry::compile_lir_unit::<CodegenBuilder>(&ctx, lir_unit);

    ctx.ll_module.print_to_string().to_string()
}
