use crate::context::CodegenCtx;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum};
use tidec_lir::syntax::LirTy;

pub trait IntoBasicTypeMetadata<'ll> {
    fn into_basic_type_metadata(&self, ctx: &CodegenCtx<'ll>) -> BasicMetadataTypeEnum<'ll>;
}

pub trait IntoBasicType<'ll> {
    fn into_basic_type(&self, ctx: &CodegenCtx<'ll>) -> BasicTypeEnum<'ll>;
}

impl<'ll> IntoBasicTypeMetadata<'ll> for LirTy {
    fn into_basic_type_metadata(&self, ctx: &CodegenCtx<'ll>) -> BasicMetadataTypeEnum<'ll> {
        match self {
            LirTy::Metadata => BasicMetadataTypeEnum::MetadataType(ctx.ll_context.metadata_type()),
            other => self_to_basic(other, ctx).into(),
        }
    }
}

impl<'ll> IntoBasicType<'ll> for LirTy {
    fn into_basic_type(&self, ctx: &CodegenCtx<'ll>) -> BasicTypeEnum<'ll> {
        match self {
            LirTy::Metadata => panic!("metadata type has no basic-value representation"),
            LirTy::Void => panic!("void type has no basic-value representation"),
            other => self_to_basic(other, ctx),
        }
    }
}

/// The shared dispatch for every `LirTy` variant that does have a
/// `BasicTypeEnum` representation (spec §4.B Type Lowerer's backend half).
fn self_to_basic<'ll>(ty: &LirTy, ctx: &CodegenCtx<'ll>) -> BasicTypeEnum<'ll> {
    match ty {
        LirTy::I1 => BasicTypeEnum::IntType(ctx.ll_context.bool_type()),
        LirTy::I8 => BasicTypeEnum::IntType(ctx.ll_context.i8_type()),
        LirTy::I16 => BasicTypeEnum::IntType(ctx.ll_context.i16_type()),
        LirTy::I32 => BasicTypeEnum::IntType(ctx.ll_context.i32_type()),
        LirTy::I64 => BasicTypeEnum::IntType(ctx.ll_context.i64_type()),
        LirTy::I128 => BasicTypeEnum::IntType(ctx.ll_context.i128_type()),
        LirTy::F32 => BasicTypeEnum::FloatType(ctx.ll_context.f32_type()),
        LirTy::F64 => BasicTypeEnum::FloatType(ctx.ll_context.f64_type()),
        LirTy::Ptr(_) => BasicTypeEnum::PointerType(ctx.ll_context.ptr_type(Default::default())),
        LirTy::Array(len, elem) => {
            let elem_ty = self_to_basic(elem, ctx);
            BasicTypeEnum::ArrayType(elem_ty.array_type(*len as u32))
        }
        LirTy::Struct(fields) => {
            let field_tys: Vec<BasicTypeEnum<'ll>> =
                fields.iter().map(|f| self_to_basic(f, ctx)).collect();
            BasicTypeEnum::StructType(ctx.ll_context.struct_type(&field_tys, false))
        }
        LirTy::Function { .. } => {
            // A `Function` LIR type is only ever used behind a pointer (spec
            // §4.B doc comment); the pointer is what call/cast sites need.
            BasicTypeEnum::PointerType(ctx.ll_context.ptr_type(Default::default()))
        }
        LirTy::Named(_, underlying) => self_to_basic(underlying, ctx),
        LirTy::Void | LirTy::Metadata => {
            unreachable!("void/metadata are handled by the caller before reaching self_to_basic")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;
    use tidec_abi::target::BackendKind;
    use tidec_lir::lir::{EmitKind, LirTyCtx};

    fn test_ctx(ll_context: &Context) -> CodegenCtx<'_> {
        let lir_ty_ctx = LirTyCtx::new(BackendKind::Llvm, EmitKind::Object);
        let ll_module = ll_context.create_module("test");
        CodegenCtx::new(lir_ty_ctx, ll_context, ll_module)
    }

    #[test]
    fn scalar_types_map_to_matching_int_widths() {
        let ll_context = Context::create();
        let ctx = test_ctx(&ll_context);

        assert_eq!(LirTy::I1.into_basic_type(&ctx), ll_context.bool_type().into());
        assert_eq!(LirTy::I64.into_basic_type(&ctx), ll_context.i64_type().into());
        assert_eq!(LirTy::F64.into_basic_type(&ctx), ll_context.f64_type().into());
    }

    #[test]
    fn named_type_peels_to_its_underlying_representation() {
        let ll_context = Context::create();
        let ctx = test_ctx(&ll_context);

        let named = LirTy::Named("MyInt".to_string(), Box::new(LirTy::I32));
        assert_eq!(named.into_basic_type(&ctx), LirTy::I32.into_basic_type(&ctx));
    }

    #[test]
    fn struct_type_lowers_field_by_field() {
        let ll_context = Context::create();
        let ctx = test_ctx(&ll_context);

        let s = LirTy::Struct(vec![LirTy::I32, LirTy::I64]);
        let expected = ll_context.struct_type(
            &[ll_context.i32_type().into(), ll_context.i64_type().into()],
            false,
        );
        assert_eq!(s.into_basic_type(&ctx), expected.into());
    }

    #[test]
    #[should_panic]
    fn void_has_no_basic_value_representation() {
        let ll_context = Context::create();
        let ctx = test_ctx(&ll_context);
        LirTy::Void.into_basic_type(&ctx);
    }
}
