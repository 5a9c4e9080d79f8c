use crate::lir::LirTyCtx;
use crate::syntax::LirTy;
use tidec_abi::{
    layout::{BackendRepr, Layout, Primitive, TyAndLayout},
    size_and_align::{AbiAndPrefAlign, Size},
};

pub struct LayoutCtx<'a> {
    lir_ty_ctx: &'a LirTyCtx,
}

impl<'a> LayoutCtx<'a> {
    // It accepts the `LirTyCtx` because it contains the `TargetDataLayout`.
    pub fn new(lir_ty_ctx: &'a LirTyCtx) -> Self {
        LayoutCtx { lir_ty_ctx }
    }

    /// Computes the layout for a given type. We should cache the results
    /// to avoid recomputing the layout for the same type multiple times.
    pub fn compute_layout(&self, ty: LirTy) -> TyAndLayout<LirTy> {
        let data_layout = &self.lir_ty_ctx.target().data_layout;

        let (size, align, backend_repr) = match &ty {
            LirTy::I1 => (
                Size::from_bits(1),
                data_layout.i1_align,
                BackendRepr::Scalar(Primitive::I1),
            ),
            LirTy::I8 => (
                Size::from_bits(8),
                data_layout.i8_align,
                BackendRepr::Scalar(Primitive::I8),
            ),
            LirTy::I16 => (
                Size::from_bits(16),
                data_layout.i16_align,
                BackendRepr::Scalar(Primitive::I16),
            ),
            LirTy::I32 => (
                Size::from_bits(32),
                data_layout.i32_align,
                BackendRepr::Scalar(Primitive::I32),
            ),
            LirTy::I64 => (
                Size::from_bits(64),
                data_layout.i64_align,
                BackendRepr::Scalar(Primitive::I64),
            ),
            LirTy::I128 => (
                Size::from_bits(128),
                data_layout.i128_align,
                BackendRepr::Scalar(Primitive::I128),
            ),
            LirTy::F32 => (
                Size::from_bits(32),
                data_layout.f32_align,
                BackendRepr::Scalar(Primitive::F32),
            ),
            LirTy::F64 => (
                Size::from_bits(64),
                data_layout.f64_align,
                BackendRepr::Scalar(Primitive::F64),
            ),
            LirTy::Ptr(_) => (
                Size::from_bits(data_layout.pointer_size * 8),
                data_layout.pointer_align,
                BackendRepr::Scalar(Primitive::Pointer),
            ),
            LirTy::Array(len, elem) => {
                let elem_layout = self.compute_layout((**elem).clone());
                (
                    Size::from_bits(elem_layout.layout.size.bytes() * len * 8),
                    elem_layout.layout.align,
                    BackendRepr::Memory,
                )
            }
            LirTy::Struct(fields) => self.compute_struct_layout(fields),
            LirTy::Function { .. } => (
                Size::from_bits(data_layout.pointer_size * 8),
                data_layout.pointer_align,
                BackendRepr::Scalar(Primitive::Pointer),
            ),
            LirTy::Named(_, underlying) => {
                let underlying_layout = self.compute_layout((**underlying).clone());
                return TyAndLayout {
                    ty,
                    layout: underlying_layout.layout,
                };
            }
            LirTy::Void => (
                Size::from_bits(0),
                AbiAndPrefAlign::new(8, 8),
                BackendRepr::Memory,
            ),
            LirTy::Metadata => (
                Size::from_bits(0),
                AbiAndPrefAlign::new(1, 1),
                BackendRepr::Memory,
            ),
        };

        TyAndLayout {
            ty,
            layout: Layout {
                size,
                align,
                backend_repr,
            },
        }
    }

    /// The byte offset of `fields[field_idx]` in the same sequential,
    /// unpacked placement `compute_struct_layout` uses (spec §4.F
    /// `fieldaddr`): every field before it advances the running offset by
    /// its own size after rounding up to its own alignment, then the target
    /// field is rounded up to its alignment in turn.
    pub fn field_offset(&self, fields: &[LirTy], field_idx: usize) -> u64 {
        let mut offset = 0u64;
        for field in &fields[..field_idx] {
            let field_layout = self.compute_layout(field.clone());
            let field_align_bytes = field_layout.layout.align.abi.bytes().max(1);
            offset = offset.div_ceil(field_align_bytes) * field_align_bytes;
            offset += field_layout.layout.size.bytes();
        }
        let target_align_bytes = self
            .compute_layout(fields[field_idx].clone())
            .layout
            .align
            .abi
            .bytes()
            .max(1);
        offset.div_ceil(target_align_bytes) * target_align_bytes
    }

    /// Sequential, unpacked struct layout: each field placed at its natural
    /// alignment, overall size rounded up to the struct's own alignment.
    fn compute_struct_layout(&self, fields: &[LirTy]) -> (Size, AbiAndPrefAlign, BackendRepr) {
        let mut offset = 0u64;
        let mut max_align = AbiAndPrefAlign::new(8, 8);

        for field in fields {
            let field_layout = self.compute_layout(field.clone());
            let field_align_bytes = field_layout.layout.align.abi.bytes().max(1);
            offset = offset.div_ceil(field_align_bytes) * field_align_bytes;
            offset += field_layout.layout.size.bytes();
            if field_layout.layout.align.abi.bytes() > max_align.abi.bytes() {
                max_align = field_layout.layout.align;
            }
        }

        let align_bytes = max_align.abi.bytes().max(1);
        let size_bytes = offset.div_ceil(align_bytes) * align_bytes;

        let repr = match fields.len() {
            1 => {
                let only = self.compute_layout(fields[0].clone());
                match only.layout.backend_repr {
                    BackendRepr::Scalar(p) => BackendRepr::Scalar(p),
                    _ => BackendRepr::Memory,
                }
            }
            2 => {
                let a = self.compute_layout(fields[0].clone());
                let b = self.compute_layout(fields[1].clone());
                match (a.layout.backend_repr, b.layout.backend_repr) {
                    (BackendRepr::Scalar(pa), BackendRepr::Scalar(pb)) => {
                        BackendRepr::ScalarPair(pa, pb)
                    }
                    _ => BackendRepr::Memory,
                }
            }
            _ => BackendRepr::Memory,
        };

        (Size::from_bits(size_bytes * 8), max_align, repr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::{EmitKind, LirTyCtx};
    use tidec_abi::target::BackendKind;

    #[test]
    fn test_layout_ctx_new() {
        let lir_ctx = LirTyCtx::new(BackendKind::Llvm, EmitKind::Object);
        let layout_ctx = LayoutCtx::new(&lir_ctx);
        // Test that the context is stored correctly (by reference)
        assert!(std::ptr::eq(layout_ctx.lir_ty_ctx, &lir_ctx));
    }

    #[test]
    fn struct_layout_is_scalar_pair_for_two_fields() {
        let lir_ctx = LirTyCtx::new(BackendKind::Llvm, EmitKind::Object);
        let layout_ctx = LayoutCtx::new(&lir_ctx);
        let string_ty = LirTy::Struct(vec![LirTy::Ptr(Box::new(LirTy::I8)), LirTy::I64]);
        let layout = layout_ctx.compute_layout(string_ty);
        assert!(matches!(layout.layout.backend_repr, BackendRepr::ScalarPair(_, _)));
    }

    #[test]
    fn field_offset_accounts_for_padding() {
        let lir_ctx = LirTyCtx::new(BackendKind::Llvm, EmitKind::Object);
        let layout_ctx = LayoutCtx::new(&lir_ctx);
        // { i8, i64 }: field 1 starts at byte 8, not byte 1.
        let fields = vec![LirTy::I8, LirTy::I64];
        assert_eq!(layout_ctx.field_offset(&fields, 0), 0);
        assert_eq!(layout_ctx.field_offset(&fields, 1), 8);
    }

    #[test]
    fn named_type_inherits_underlying_layout() {
        let lir_ctx = LirTyCtx::new(BackendKind::Llvm, EmitKind::Object);
        let layout_ctx = LayoutCtx::new(&lir_ctx);
        let named = LirTy::Named("pkg/path.MyInt".to_string(), Box::new(LirTy::I64));
        let layout = layout_ctx.compute_layout(named);
        assert_eq!(layout.layout.size.bytes(), 8);
    }
}
