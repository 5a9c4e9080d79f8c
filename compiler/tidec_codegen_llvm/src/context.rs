use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Deref;

use inkwell::basic_block::BasicBlock;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::targets::{TargetData, TargetTriple};
use inkwell::types::{BasicMetadataTypeEnum, BasicTypeEnum, FunctionType};
use inkwell::values::{AnyValueEnum, BasicMetadataValueEnum};
use tidec_codegen_ssa::lir::OperandRef;
use tidec_utils::index_vec::IdxVec;
use tracing::{debug, instrument};

use crate::lir::lir_body_metadata::{
    CallConvUtils, LinkageUtils, UnnamedAddressUtils, VisibilityUtils,
};
use crate::lir::types::{IntoBasicType, IntoBasicTypeMetadata};
use crate::strings::StringPool;
use tidec_codegen_ssa::traits::{
    CodegenBackend, CodegenBackendTypes, CodegenMethods, DefineCodegenMethods, LayoutOf,
    PreDefineCodegenMethods,
};
use tidec_abi::layout::TyAndLayout;
use tidec_lir::lir::{DefId, LirBody, LirBodyMetadata, LirTyCtx};
use tidec_lir::syntax::{Local, LirTy, LocalData, RETURN_LOCAL};

// TODO: Add filelds from rustc/compiler/rustc_codegen_llvm/src/context.rs
pub struct CodegenCtx<'ll> {
    // FIXME: Make this private
    pub ll_context: &'ll Context,
    // FIXME: Make this private
    pub ll_module: Module<'ll>,

    /// The LIR type context.
    pub lir_ty_ctx: LirTyCtx,

    /// A map from DefId to the LLVM value (usually a function value).
    //
    // FIXME: Consider removing RefCell and using &mut
    //
    // TODO: Probably we could remove this and use only the module to find functions (more efficient?).
    // Something like: `self.ll_module.get_function(<name>)` (see `get_fn`).
    pub instances: RefCell<HashMap<DefId, AnyValueEnum<'ll>>>,

    /// The per-package string-literal pool (spec §4.C).
    pub string_pool: StringPool<'ll>,
}

impl<'ll> Deref for CodegenCtx<'ll> {
    type Target = Context;

    fn deref(&self) -> &Self::Target {
        self.ll_context
    }
}

impl<'ll> CodegenBackendTypes for CodegenCtx<'ll> {
    type BasicBlock = BasicBlock<'ll>;
    type FunctionType = FunctionType<'ll>;
    type Type = BasicTypeEnum<'ll>;
    type Value = AnyValueEnum<'ll>;
    type MetadataType = BasicMetadataTypeEnum<'ll>;
    type MetadataValue = BasicMetadataValueEnum<'ll>;
}

impl<'ll> CodegenBackend for CodegenCtx<'ll> {
    type Context = Context;
    type Module = Module<'ll>;
}

impl LayoutOf for CodegenCtx<'_> {
    fn layout_of(&self, ty: &tidec_lir::syntax::LirTy) -> TyAndLayout<tidec_lir::syntax::LirTy> {
        self.lir_ty_ctx.layout_of(ty)
    }
}

impl PreDefineCodegenMethods for CodegenCtx<'_> {
    fn predefine_body(
        &self,
        lir_body_metadata: &LirBodyMetadata,
        lir_body_ret_and_args: &IdxVec<Local, LocalData>,
    ) {
        let name = lir_body_metadata.name.as_str();

        let ret_ty = lir_body_ret_and_args[RETURN_LOCAL].ty.into_basic_type(self);
        // `ret_and_args[0]` is the return-value slot (`RETURN_LOCAL`); every
        // entry after it is a formal parameter (spec §4.E body layout).
        let formal_param_tys = lir_body_ret_and_args.as_slice()[1..]
            .iter()
            .map(|local_data| local_data.ty.into_basic_type_metadata(self))
            .collect::<Vec<_>>();
        let fn_ty = self.declare_fn(ret_ty, formal_param_tys.as_slice());
        let linkage = lir_body_metadata.linkage.into_linkage();
        let calling_convention = lir_body_metadata.call_conv.into_call_conv();
        let fn_val = self.ll_module.add_function(name, fn_ty, Some(linkage));
        fn_val.set_call_conventions(calling_convention);

        let fn_global_value = fn_val.as_global_value();
        let visibility = lir_body_metadata.visibility.into_visibility();
        fn_global_value.set_visibility(visibility);
        let unnamed_addr = lir_body_metadata.unnamed_address.into_unnamed_address();
        fn_global_value.set_unnamed_address(unnamed_addr);

        debug!(
            "get_or_declare_fn((name: {}, ret_ty: {:?}, param_tys: {:?}, linkage: {:?}, visibility: {:?}, calling_convention: {:?}, unnamed_addr: {:?})) delared",
            name, ret_ty, formal_param_tys, linkage, visibility, calling_convention, unnamed_addr
        );

        self.instances.borrow_mut().insert(
            lir_body_metadata.def_id,
            AnyValueEnum::FunctionValue(fn_val),
        );
    }
}

impl DefineCodegenMethods for CodegenCtx<'_> {
    /// For LLVM, we are able to reuse the generic implementation of
    /// `codegen_lir_body` provided by `tidec_codegen_ssa::entry`, as it is
    /// generic over the `BuilderMethods` trait.
    fn define_body(&self, lir_body: &LirBody) {
        tidec_codegen_ssa::entry::codegen_lir_body::<'_, '_, crate::builder::CodegenBuilder<'_, '_>>(
            self, lir_body,
        );
    }
}

impl<'ll> CodegenCtx<'ll> {
    fn declare_fn(
        &self,
        ret_ty: BasicTypeEnum<'ll>,
        param_tys: &[BasicMetadataTypeEnum<'ll>],
    ) -> FunctionType<'ll> {
        let fn_ty = match ret_ty {
            BasicTypeEnum::IntType(int_type) => int_type.fn_type(param_tys, false),
            BasicTypeEnum::ArrayType(array_type) => array_type.fn_type(param_tys, false),
            BasicTypeEnum::FloatType(float_type) => float_type.fn_type(param_tys, false),
            BasicTypeEnum::PointerType(pointer_type) => pointer_type.fn_type(param_tys, false),
            BasicTypeEnum::StructType(struct_type) => struct_type.fn_type(param_tys, false),
            BasicTypeEnum::VectorType(vector_type) => vector_type.fn_type(param_tys, false),
        };

        fn_ty
    }
}

impl<'ll> CodegenMethods<'ll> for CodegenCtx<'ll> {
    #[instrument(skip(lir_ty_ctx, ll_context, ll_module))]
    fn new(
        lir_ty_ctx: LirTyCtx,
        ll_context: &'ll Context,
        ll_module: Module<'ll>,
    ) -> CodegenCtx<'ll> {
        let target = lir_ty_ctx.target();
        let data_layout_string = target.data_layout_string();
        let target_triple_string = target.target_triple_string();

        ll_module.set_triple(&TargetTriple::create(&target_triple_string));
        // TODO: As TargetData contains methods to know the size, align, etc... for each LLVM type
        // we could consider to store it in a context
        ll_module.set_data_layout(&TargetData::create(&data_layout_string).get_data_layout());

        CodegenCtx {
            ll_context,
            ll_module,
            lir_ty_ctx,
            instances: RefCell::new(HashMap::new()),
            string_pool: StringPool::new(ll_context),
        }
    }

    fn lit_ty_ctx(&self) -> &LirTyCtx {
        &self.lir_ty_ctx
    }

    fn get_fn(&self, lir_body_metadata: &LirBodyMetadata) -> Option<AnyValueEnum<'ll>> {
        let name = lir_body_metadata.name.as_str();

        if let Some(instance) = self.instances.borrow().get(&lir_body_metadata.def_id) {
            debug!("get_fn(name: {}) found in instances", name);
            return Some(instance.clone());
        }

        if let Some(f) = self.ll_module.get_function(name) {
            debug!("get_fn(name: {}) found in module", name);
            return Some(AnyValueEnum::FunctionValue(f));
        }

        debug!("get_fn(name: {}) not found", name);
        None
    }

    /// TODO(bruzzone): We expect this function returns a function value.
    fn get_or_define_fn(
        &self,
        lir_body_metadata: &LirBodyMetadata,
        lir_body_ret_and_args: &IdxVec<Local, LocalData>,
    ) -> AnyValueEnum<'ll> {
        let name = lir_body_metadata.name.as_str();

        if let Some(fn_val) = self.get_fn(lir_body_metadata) {
            debug!("get_or_define_fn(name: {}) found", name);
            return fn_val;
        }

        // TODO: fallback by declaring the function
        self.predefine_body(lir_body_metadata, lir_body_ret_and_args);
        let fn_val = self
            .get_fn(lir_body_metadata)
            .expect("function should be defined after predefine_body");

        AnyValueEnum::FunctionValue(fn_val.into_function_value())
    }

    fn get_fn_by_name(&self, name: &str) -> Option<AnyValueEnum<'ll>> {
        self.ll_module.get_function(name).map(AnyValueEnum::FunctionValue)
    }

    /// Synthesizes (and caches, keyed by name and the lowered *type* of each
    /// argument -- not its count, so `len([]int)` and `len([]byte)` never
    /// collide) the built-in functions the instruction lowerer calls through
    /// `Callee::Builtin` -- `len`, `cap`, `new`, plus any other runtime
    /// builtin that stays a plain external declaration (e.g. `println`)
    /// (spec §4.F.Builtins). Grounded on `original_source/irgen/builtin.go`'s
    /// `synthLen`, which declares one `len(T) i64` function per distinct
    /// argument type `T` the first time it is needed, synthesizing its body
    /// on the spot, and reuses it afterwards.
    fn get_builtin(&self, name: &str, args: &[OperandRef<AnyValueEnum<'ll>>]) -> AnyValueEnum<'ll> {
        // `ssa:wrapnilchk` is declared once with a fixed signature --
        // `(ptr, recvTypeString, methodNameString) -> ptr` -- regardless of
        // the receiver's pointee type, since the wrapper itself only ever
        // sees `i8*` (spec §4.F.Builtins).
        if name == "ssa:wrapnilchk" {
            let mangled = "ssa.wrapnilchk";
            if let Some(f) = self.ll_module.get_function(mangled) {
                return AnyValueEnum::FunctionValue(f);
            }
            let ptr_ty = self.ll_context.ptr_type(Default::default());
            let fn_ty = ptr_ty.fn_type(&[ptr_ty.into(), ptr_ty.into(), ptr_ty.into()], false);
            let fn_val = self.ll_module.add_function(mangled, fn_ty, Some(Linkage::External));
            return AnyValueEnum::FunctionValue(fn_val);
        }

        let key = args
            .iter()
            .map(|a| builtin_arg_type_key(&a.ty_layout.ty))
            .collect::<Vec<_>>()
            .join("_");
        let mangled = if key.is_empty() {
            format!("tidec.builtin.{name}")
        } else {
            format!("tidec.builtin.{name}.{key}")
        };

        if let Some(f) = self.ll_module.get_function(&mangled) {
            debug!("get_builtin({}) found in module", mangled);
            return AnyValueEnum::FunctionValue(f);
        }

        let fn_val = match name {
            "len" | "cap" => {
                let arg_ty = args
                    .first()
                    .map(|a| a.ty_layout.ty.clone())
                    .expect("len/cap require an argument");
                let fields = struct_fields_of(arg_ty.peel_name());
                let ptr_ty = self.ll_context.ptr_type(Default::default());
                let fn_ty = self.ll_context.i64_type().fn_type(&[ptr_ty.into()], false);
                let fn_val = self.ll_module.add_function(&mangled, fn_ty, Some(Linkage::Internal));
                let field_idx = if name == "len" { 1 } else { 2 };
                self.build_len_like_body(fn_val, &fields, field_idx);
                fn_val
            }
            "new" => {
                let witness_ty = args
                    .first()
                    .map(|a| a.ty_layout.ty.clone())
                    .expect("new(T) requires a Ptr(T) type-witness argument");
                let target_ty = match witness_ty.peel_name() {
                    LirTy::Ptr(pointee) => (**pointee).clone(),
                    other => panic!("new(T) argument must be a Ptr(T) witness, found {other:?}"),
                };
                let ptr_ty = self.ll_context.ptr_type(Default::default());
                let fn_ty = ptr_ty.fn_type(&[], false);
                let fn_val = self.ll_module.add_function(&mangled, fn_ty, Some(Linkage::Internal));
                self.build_new_body(fn_val, &target_ty);
                fn_val
            }
            _ => {
                let ret_ty = args
                    .first()
                    .map(|a| a.ty_layout.ty.into_basic_type(self))
                    .unwrap_or(BasicTypeEnum::IntType(self.ll_context.i64_type()));
                let param_tys: Vec<BasicMetadataTypeEnum> = args
                    .iter()
                    .map(|a| a.ty_layout.ty.into_basic_type_metadata(self))
                    .collect();
                let fn_ty = self.declare_fn(ret_ty, &param_tys);
                self.ll_module.add_function(&mangled, fn_ty, Some(Linkage::External))
            }
        };

        debug!("get_builtin({}) synthesized", mangled);
        AnyValueEnum::FunctionValue(fn_val)
    }
}

/// The cache-key fragment for one builtin argument: its predeclared type
/// name when it has one (so `[]int` and `[]byte` stay distinct), else a
/// debug rendering of its shape (spec §4.F.Builtins, P4).
fn builtin_arg_type_key(ty: &LirTy) -> String {
    match ty.name() {
        Some(name) => name.to_string(),
        None => format!("{ty:?}"),
    }
}

fn struct_fields_of(ty: &LirTy) -> Vec<LirTy> {
    match ty {
        LirTy::Struct(fields) => fields.clone(),
        other => panic!("expected a struct-shaped type for len/cap, found {other:?}"),
    }
}

impl<'ll> CodegenCtx<'ll> {
    /// Synthesizes `len`/`cap`'s body: load and return the aggregate's
    /// length (field 1) or capacity (field 2) field through a pointer
    /// parameter (spec §4.F.Builtins; grounded on
    /// `original_source/irgen/builtin.go`'s `synthLen`).
    fn build_len_like_body(
        &self,
        fn_val: inkwell::values::FunctionValue<'ll>,
        fields: &[LirTy],
        field_idx: usize,
    ) {
        let entry = self.ll_context.append_basic_block(fn_val, "entry");
        let builder = self.ll_context.create_builder();
        builder.position_at_end(entry);

        let ptr_param = fn_val
            .get_nth_param(0)
            .expect("len/cap takes one pointer parameter")
            .into_pointer_value();
        let offset = self.lir_ty_ctx.field_offset(fields, field_idx);
        let i64_ty = self.ll_context.i64_type();
        let byte_ty = self.ll_context.i8_type();
        let field_ptr = unsafe {
            builder
                .build_gep(byte_ty, ptr_param, &[i64_ty.const_int(offset, false)], "")
                .expect("gep failed")
        };
        let len = builder.build_load(i64_ty, field_ptr, "").expect("load failed");
        builder.build_return(Some(&len)).expect("return failed");
    }

    /// Synthesizes `new(T)`'s body: `calloc(1, sizeof(T))`, trapping via
    /// `unreachable` on a null allocation result rather than propagating it
    /// (spec §4.F.Builtins).
    fn build_new_body(&self, fn_val: inkwell::values::FunctionValue<'ll>, target_ty: &LirTy) {
        let entry = self.ll_context.append_basic_block(fn_val, "entry");
        let check_bb = self.ll_context.append_basic_block(fn_val, "check");
        let trap_bb = self.ll_context.append_basic_block(fn_val, "trap");
        let ok_bb = self.ll_context.append_basic_block(fn_val, "ok");
        let builder = self.ll_context.create_builder();

        builder.position_at_end(entry);
        let size = self.lir_ty_ctx.layout_of(target_ty).layout.size.bytes();
        let i64_ty = self.ll_context.i64_type();
        let ptr_ty = self.ll_context.ptr_type(Default::default());
        let calloc_fn = self.ll_module.get_function("calloc").unwrap_or_else(|| {
            let fn_ty = ptr_ty.fn_type(&[i64_ty.into(), i64_ty.into()], false);
            self.ll_module.add_function("calloc", fn_ty, Some(Linkage::External))
        });
        let call = builder
            .build_call(
                calloc_fn,
                &[i64_ty.const_int(1, false).into(), i64_ty.const_int(size, false).into()],
                "",
            )
            .expect("calloc call failed");
        let raw_ptr = call
            .try_as_basic_value()
            .left()
            .expect("calloc returns a value")
            .into_pointer_value();
        builder.build_unconditional_branch(check_bb).expect("br failed");

        builder.position_at_end(check_bb);
        let is_null = builder.build_is_null(raw_ptr, "").expect("is_null failed");
        builder
            .build_conditional_branch(is_null, trap_bb, ok_bb)
            .expect("condbr failed");

        builder.position_at_end(trap_bb);
        builder.build_unreachable().expect("unreachable failed");

        builder.position_at_end(ok_bb);
        builder.build_return(Some(&raw_ptr)).expect("return failed");
    }
}
