use std::ops::Deref;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::values::{AnyValue, AnyValueEnum, BasicValueEnum};
use inkwell::{FloatPredicate, IntPredicate};

use tidec_abi::layout::{BackendRepr, TyAndLayout};
use tidec_abi::size_and_align::{Align, Size};
use tidec_codegen_ssa::lir::{OperandRef, OperandVal, PlaceRef, PlaceVal};
use tidec_codegen_ssa::traits::{BuilderMethods, CodegenBackendTypes};
use tidec_lir::syntax::{BinOp, CastKind, CmpOp, ConstScalar, LirTy, UnOp};

use crate::context::CodegenCtx;
use crate::lir::types::{IntoBasicType, IntoBasicTypeMetadata};

pub struct CodegenBuilder<'a, 'll> {
    pub builder: Builder<'ll>,
    pub ctx: &'a CodegenCtx<'ll>,
}

impl<'ll> Deref for CodegenBuilder<'_, 'll> {
    type Target = CodegenCtx<'ll>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl<'a, 'll> CodegenBuilder<'a, 'll> {
    pub fn with_ctx(ctx: &'a CodegenCtx<'ll>) -> Self {
        let builder = ctx.ll_context.create_builder();
        CodegenBuilder { builder, ctx }
    }

    fn basic(value: AnyValueEnum<'ll>) -> BasicValueEnum<'ll> {
        BasicValueEnum::try_from(value)
            .unwrap_or_else(|_| panic!("{value:?} has no basic-value representation"))
    }
}

impl<'ll> CodegenBackendTypes for CodegenBuilder<'_, 'll> {
    type BasicBlock = BasicBlock<'ll>;
    type FunctionType = inkwell::types::FunctionType<'ll>;
    type Type = inkwell::types::BasicTypeEnum<'ll>;
    type Value = AnyValueEnum<'ll>;
    type MetadataType = inkwell::types::BasicMetadataTypeEnum<'ll>;
    type MetadataValue = inkwell::values::BasicMetadataValueEnum<'ll>;
}

impl<'a, 'll> BuilderMethods<'a, 'll> for CodegenBuilder<'a, 'll> {
    type CodegenCtx = CodegenCtx<'ll>;

    fn ctx(&self) -> &Self::CodegenCtx {
        self.ctx
    }

    fn alloca(&self, size: Size, align: Align) -> Self::Value {
        let byte_ty = self.ctx.ll_context.i8_type();
        let array_ty = byte_ty.array_type(size.bytes() as u32);
        let alloca = self
            .builder
            .build_alloca(array_ty, "")
            .expect("build_alloca failed");
        alloca
            .as_instruction_value()
            .expect("alloca is always an instruction")
            .set_alignment(align.bytes() as u32)
            .expect("valid alignment");
        AnyValueEnum::PointerValue(alloca)
    }

    /// Create a new CodeGenBuilder from a CodeGenCtx and a BasicBlock.
    /// The builder is positioned at the end of the BasicBlock.
    fn build(ctx: &'a Self::CodegenCtx, bb: BasicBlock<'ll>) -> Self {
        let builder = CodegenBuilder::with_ctx(ctx);
        builder.builder.position_at_end(bb);
        builder
    }

    /// Append a new basic block to the function.
    fn append_basic_block(
        ctx: &'a Self::CodegenCtx,
        fn_value: Self::Value,
        name: &str,
    ) -> BasicBlock<'ll> {
        ctx.ll_context
            .append_basic_block(fn_value.into_function_value(), name)
    }

    fn build_return(&mut self, return_value: Option<Self::Value>) {
        match return_value {
            Some(val) => {
                let bv = Self::basic(val);
                self.builder.build_return(Some(&bv)).expect("build_return failed");
            }
            None => {
                self.builder.build_return(None).expect("build_return failed");
            }
        }
    }

    fn load_operand(&mut self, place_ref: &PlaceRef<Self::Value>) -> OperandRef<Self::Value> {
        if place_ref.ty_layout.is_zst() {
            return OperandRef::new_zst(place_ref.ty_layout.clone());
        }

        match place_ref.ty_layout.layout.backend_repr {
            BackendRepr::Memory => OperandRef {
                operand_val: OperandVal::Ref(place_ref.place_val),
                ty_layout: place_ref.ty_layout.clone(),
            },
            BackendRepr::Scalar(_) => {
                let ty = self.backend_type(place_ref.ty_layout.ty.peel_name());
                let val = self.build_load(ty, place_ref.place_val.value, place_ref.place_val.align);
                OperandRef::new_immediate(val, place_ref.ty_layout.clone())
            }
            BackendRepr::ScalarPair(..) => {
                // A `string` (`{ptr, i64}`) is the only scalar pair this
                // backend's predeclared types produce (spec §4.A); field 0
                // is the data pointer at offset 0, field 1 the length
                // immediately after it (8-byte pointer, spec §4.A layout).
                let ptr_ty = self.ctx.ll_context.ptr_type(Default::default());
                let i64_ty = self.ctx.ll_context.i64_type();
                let zero = AnyValueEnum::IntValue(i64_ty.const_zero());
                let eight = AnyValueEnum::IntValue(i64_ty.const_int(8, false));
                let field0 = self.build_gep(place_ref.place_val.value, &[zero]);
                let data = self.builder.build_load(ptr_ty, field0.into_pointer_value(), "").unwrap();
                let field1 = self.build_gep(place_ref.place_val.value, &[eight]);
                let len = self
                    .builder
                    .build_load(i64_ty, field1.into_pointer_value(), "")
                    .unwrap();
                OperandRef {
                    operand_val: OperandVal::Pair(
                        AnyValueEnum::PointerValue(data.into_pointer_value()),
                        AnyValueEnum::IntValue(len.into_int_value()),
                    ),
                    ty_layout: place_ref.ty_layout.clone(),
                }
            }
        }
    }

    fn build_load(&mut self, ty: Self::Type, ptr: Self::Value, align: Align) -> Self::Value {
        let loaded = self
            .builder
            .build_load(ty, ptr.into_pointer_value(), "")
            .expect("build_load failed");
        loaded
            .as_instruction_value()
            .expect("load is always an instruction")
            .set_alignment(align.bytes() as u32)
            .expect("valid alignment");
        loaded.as_any_value_enum()
    }

    fn build_store(&mut self, value: Self::Value, ptr: Self::Value, align: Align) {
        let bv = Self::basic(value);
        let store = self
            .builder
            .build_store(ptr.into_pointer_value(), bv)
            .expect("build_store failed");
        store.set_alignment(align.bytes() as u32).expect("valid alignment");
    }

    fn const_scalar_to_backend_value(
        &mut self,
        scalar: ConstScalar,
        ty_layout: TyAndLayout<LirTy>,
    ) -> Self::Value {
        let ConstScalar::Value(raw) = scalar;
        match ty_layout.ty.peel_name() {
            LirTy::F32 => {
                let bits = raw.data as u32;
                AnyValueEnum::FloatValue(
                    self.ctx
                        .ll_context
                        .f32_type()
                        .const_float(f32::from_bits(bits) as f64),
                )
            }
            LirTy::F64 => {
                let bits = raw.data as u64;
                AnyValueEnum::FloatValue(self.ctx.ll_context.f64_type().const_float(f64::from_bits(bits)))
            }
            other => {
                let int_ty = self.backend_type(other).into_int_type();
                AnyValueEnum::IntValue(int_ty.const_int(raw.data as u64, false))
            }
        }
    }

    fn const_str(&mut self, value: &str) -> (Self::Value, Self::Value) {
        // Opaque pointers mean the global's address *is* the data pointer;
        // no indexing GEP is needed to reach byte 0 (cf. the sibling
        // `ori_llvm` backend's `compile_string`).
        let global = self.ctx.string_pool.intern(&self.ctx.ll_module, value);
        let data_ptr = global.as_pointer_value();
        let len = self.ctx.ll_context.i64_type().const_int(value.len() as u64, false);
        (AnyValueEnum::PointerValue(data_ptr), AnyValueEnum::IntValue(len))
    }

    fn build_binop(&mut self, op: BinOp, lhs: Self::Value, rhs: Self::Value) -> Self::Value {
        if let (AnyValueEnum::FloatValue(l), AnyValueEnum::FloatValue(r)) = (lhs, rhs) {
            let result = match op {
                BinOp::Add => self.builder.build_float_add(l, r, ""),
                BinOp::Sub => self.builder.build_float_sub(l, r, ""),
                BinOp::Mul => self.builder.build_float_mul(l, r, ""),
                BinOp::Div { .. } => self.builder.build_float_div(l, r, ""),
                BinOp::Rem { .. } => self.builder.build_float_rem(l, r, ""),
                other => panic!("{other:?} is not a valid floating-point binary op"),
            };
            return AnyValueEnum::FloatValue(result.expect("float binop failed"));
        }

        let l = lhs.into_int_value();
        let r = rhs.into_int_value();
        let result = match op {
            BinOp::Add => self.builder.build_int_add(l, r, ""),
            BinOp::Sub => self.builder.build_int_sub(l, r, ""),
            BinOp::Mul => self.builder.build_int_mul(l, r, ""),
            BinOp::Div { signed: true } => self.builder.build_int_signed_div(l, r, ""),
            BinOp::Div { signed: false } => self.builder.build_int_unsigned_div(l, r, ""),
            BinOp::Rem { signed: true } => self.builder.build_int_signed_rem(l, r, ""),
            BinOp::Rem { signed: false } => self.builder.build_int_unsigned_rem(l, r, ""),
            BinOp::And => self.builder.build_and(l, r, ""),
            BinOp::Or => self.builder.build_or(l, r, ""),
            BinOp::Xor => self.builder.build_xor(l, r, ""),
            BinOp::Shl => self.builder.build_left_shift(l, r, ""),
            BinOp::Shr { signed } => self.builder.build_right_shift(l, r, signed, ""),
            BinOp::AndNot => {
                let all_ones = r.get_type().const_all_ones();
                let complement = self.builder.build_xor(r, all_ones, "").expect("xor failed");
                self.builder.build_and(l, complement, "")
            }
        };
        AnyValueEnum::IntValue(result.expect("int binop failed"))
    }

    fn build_cmp(&mut self, op: CmpOp, lhs: Self::Value, rhs: Self::Value) -> Self::Value {
        if let (AnyValueEnum::FloatValue(l), AnyValueEnum::FloatValue(r)) = (lhs, rhs) {
            let pred = match op {
                CmpOp::FEq => FloatPredicate::OEQ,
                CmpOp::FNe => FloatPredicate::ONE,
                CmpOp::FLt => FloatPredicate::OLT,
                CmpOp::FLe => FloatPredicate::OLE,
                CmpOp::FGt => FloatPredicate::OGT,
                CmpOp::FGe => FloatPredicate::OGE,
                other => panic!("{other:?} is not a valid floating-point comparison"),
            };
            let result = self
                .builder
                .build_float_compare(pred, l, r, "")
                .expect("fcmp failed");
            return AnyValueEnum::IntValue(result);
        }

        let l = lhs.into_int_value();
        let r = rhs.into_int_value();
        let pred = match op {
            CmpOp::IEq => IntPredicate::EQ,
            CmpOp::INe => IntPredicate::NE,
            CmpOp::ILt { signed: true } => IntPredicate::SLT,
            CmpOp::ILt { signed: false } => IntPredicate::ULT,
            CmpOp::ILe { signed: true } => IntPredicate::SLE,
            CmpOp::ILe { signed: false } => IntPredicate::ULE,
            CmpOp::IGt { signed: true } => IntPredicate::SGT,
            CmpOp::IGt { signed: false } => IntPredicate::UGT,
            CmpOp::IGe { signed: true } => IntPredicate::SGE,
            CmpOp::IGe { signed: false } => IntPredicate::UGE,
            other => panic!("{other:?} is not a valid integer comparison"),
        };
        let result = self.builder.build_int_compare(pred, l, r, "").expect("icmp failed");
        AnyValueEnum::IntValue(result)
    }

    fn build_unop(&mut self, op: UnOp, val: Self::Value) -> Self::Value {
        match op {
            UnOp::Not | UnOp::Complement => {
                let v = val.into_int_value();
                AnyValueEnum::IntValue(self.builder.build_not(v, "").expect("not failed"))
            }
            UnOp::Neg => match val {
                AnyValueEnum::FloatValue(v) => {
                    AnyValueEnum::FloatValue(self.builder.build_float_neg(v, "").expect("fneg failed"))
                }
                AnyValueEnum::IntValue(v) => {
                    AnyValueEnum::IntValue(self.builder.build_int_neg(v, "").expect("neg failed"))
                }
                other => panic!("cannot negate {other:?}"),
            },
            UnOp::Deref => panic!("Deref is lowered via a place projection, not build_unop"),
        }
    }

    fn build_cast(&mut self, kind: CastKind, val: Self::Value, dest_ty: Self::Type) -> Self::Value {
        use inkwell::types::BasicTypeEnum;
        match (kind, val, dest_ty) {
            (CastKind::IntToInt { signed }, AnyValueEnum::IntValue(v), BasicTypeEnum::IntType(d)) => {
                let result = if signed {
                    self.builder.build_int_s_extend_or_bit_cast(v, d, "")
                } else {
                    self.builder.build_int_z_extend_or_bit_cast(v, d, "")
                };
                AnyValueEnum::IntValue(result.expect("int cast failed"))
            }
            (CastKind::IntToFloat { signed }, AnyValueEnum::IntValue(v), BasicTypeEnum::FloatType(d)) => {
                let result = if signed {
                    self.builder.build_signed_int_to_float(v, d, "")
                } else {
                    self.builder.build_unsigned_int_to_float(v, d, "")
                };
                AnyValueEnum::FloatValue(result.expect("int-to-float cast failed"))
            }
            (CastKind::FloatToInt { signed }, AnyValueEnum::FloatValue(v), BasicTypeEnum::IntType(d)) => {
                let result = if signed {
                    self.builder.build_float_to_signed_int(v, d, "")
                } else {
                    self.builder.build_float_to_unsigned_int(v, d, "")
                };
                AnyValueEnum::IntValue(result.expect("float-to-int cast failed"))
            }
            (CastKind::FloatToFloat, AnyValueEnum::FloatValue(v), BasicTypeEnum::FloatType(d)) => {
                AnyValueEnum::FloatValue(self.builder.build_float_cast(v, d, "").expect("fcast failed"))
            }
            (CastKind::Bitcast, AnyValueEnum::PointerValue(v), BasicTypeEnum::PointerType(_)) => {
                // Opaque pointers carry no type information to bitcast between.
                AnyValueEnum::PointerValue(v)
            }
            (CastKind::Bitcast, v, BasicTypeEnum::IntType(d)) => {
                let bv = Self::basic(v);
                AnyValueEnum::IntValue(
                    self.builder
                        .build_bit_cast(bv, d, "")
                        .expect("bitcast failed")
                        .into_int_value(),
                )
            }
            (kind, val, _) => panic!("unsupported cast {kind:?} of {val:?}"),
        }
    }

    fn build_gep(&mut self, ptr: Self::Value, indices: &[Self::Value]) -> Self::Value {
        let ptr_val = ptr.into_pointer_value();
        let byte_ty = self.ctx.ll_context.i8_type();
        if indices.is_empty() {
            return AnyValueEnum::PointerValue(ptr_val);
        }
        let idx_vals: Vec<_> = indices.iter().map(|v| v.into_int_value()).collect();
        let gep = unsafe {
            self.builder
                .build_gep(byte_ty, ptr_val, &idx_vals, "")
                .expect("build_gep failed")
        };
        AnyValueEnum::PointerValue(gep)
    }

    fn build_extract_value(&mut self, agg: Self::Value, idx: u32) -> Self::Value {
        let bv = Self::basic(agg);
        self.builder
            .build_extract_value(bv.into_struct_value(), idx, "")
            .expect("build_extract_value failed")
            .as_any_value_enum()
    }

    fn build_insert_value(&mut self, agg: Self::Value, elt: Self::Value, idx: u32) -> Self::Value {
        let agg_bv = Self::basic(agg).into_struct_value();
        let elt_bv = Self::basic(elt);
        self.builder
            .build_insert_value(agg_bv, elt_bv, idx, "")
            .expect("build_insert_value failed")
            .as_any_value_enum()
    }

    fn const_undef(&mut self, ty: Self::Type) -> Self::Value {
        use inkwell::types::BasicTypeEnum;
        match ty {
            BasicTypeEnum::StructType(t) => AnyValueEnum::StructValue(t.get_undef()),
            BasicTypeEnum::IntType(t) => AnyValueEnum::IntValue(t.get_undef()),
            BasicTypeEnum::FloatType(t) => AnyValueEnum::FloatValue(t.get_undef()),
            BasicTypeEnum::PointerType(t) => AnyValueEnum::PointerValue(t.get_undef()),
            BasicTypeEnum::ArrayType(t) => AnyValueEnum::ArrayValue(t.get_undef()),
            BasicTypeEnum::VectorType(t) => AnyValueEnum::VectorValue(t.get_undef()),
        }
    }

    fn get_param(&self, fn_value: Self::Value, idx: u32) -> Self::Value {
        fn_value
            .into_function_value()
            .get_nth_param(idx)
            .unwrap_or_else(|| panic!("function has no parameter {idx}"))
            .as_any_value_enum()
    }

    fn build_heap_alloc(&mut self, size: Self::Value) -> Self::Value {
        // Lowered as a call to the runtime allocator; declared lazily the
        // same way a built-in is (spec §4.F `alloc` with `AllocScope::Heap`).
        let ptr_ty = self.ctx.ll_context.ptr_type(Default::default());
        let i64_ty = self.ctx.ll_context.i64_type();
        let alloc_fn = self.ctx.ll_module.get_function("tidec.alloc").unwrap_or_else(|| {
            let fn_ty = ptr_ty.fn_type(&[i64_ty.into()], false);
            self.ctx
                .ll_module
                .add_function("tidec.alloc", fn_ty, Some(inkwell::module::Linkage::External))
        });
        let size_bv = Self::basic(size);
        let call = self
            .builder
            .build_call(alloc_fn, &[size_bv.into()], "")
            .expect("build_call failed");
        call.as_any_value_enum()
    }

    fn build_call(&mut self, callee: Self::Value, args: &[Self::Value]) -> Self::Value {
        let fn_val = callee.into_function_value();
        let arg_vals: Vec<_> = args
            .iter()
            .map(|a| inkwell::values::BasicMetadataValueEnum::from(Self::basic(*a)))
            .collect();
        let call = self.builder.build_call(fn_val, &arg_vals, "").expect("build_call failed");
        call.as_any_value_enum()
    }

    fn build_br(&mut self, dest: Self::BasicBlock) {
        self.builder.build_unconditional_branch(dest).expect("build_br failed");
    }

    fn build_cond_br(&mut self, cond: Self::Value, then_bb: Self::BasicBlock, else_bb: Self::BasicBlock) {
        self.builder
            .build_conditional_branch(cond.into_int_value(), then_bb, else_bb)
            .expect("build_cond_br failed");
    }

    fn build_phi(&mut self, ty: Self::Type, incoming: &[(Self::Value, Self::BasicBlock)]) -> Self::Value {
        let phi = self.builder.build_phi(ty, "").expect("build_phi failed");
        let bvs: Vec<BasicValueEnum<'ll>> = incoming.iter().map(|(v, _)| Self::basic(*v)).collect();
        let pairs: Vec<(&dyn inkwell::values::BasicValue<'ll>, BasicBlock<'ll>)> = bvs
            .iter()
            .zip(incoming.iter())
            .map(|(bv, (_, bb))| (bv as &dyn inkwell::values::BasicValue<'ll>, *bb))
            .collect();
        phi.add_incoming(&pairs);
        phi.as_any_value_enum()
    }

    fn const_int(&mut self, ty: Self::Type, value: u64) -> Self::Value {
        match ty {
            inkwell::types::BasicTypeEnum::IntType(int_ty) => {
                AnyValueEnum::IntValue(int_ty.const_int(value, false))
            }
            other => panic!("const_int on non-integer type {other:?}"),
        }
    }

    fn backend_type(&mut self, ty: &LirTy) -> Self::Type {
        ty.into_basic_type(self.ctx)
    }
}
