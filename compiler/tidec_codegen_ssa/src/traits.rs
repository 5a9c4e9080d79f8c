use tidec_abi::{
    calling_convention::function::FnAbi,
    layout::TyAndLayout,
    size_and_align::{Align, Size},
};
use tidec_lir::{
    lir::{LirBody, LirBodyMetadata, LirTyCtx},
    syntax::{LirTy, Local, LocalData},
};
use tidec_utils::index_vec::IdxVec;

use crate::lir::{OperandRef, PlaceRef};

/// This trait is used to get the layout of a type.
/// It is used to get the layout of a type in the codegen backend.
pub trait LayoutOf {
    /// Returns the layout of the given type.
    fn layout_of(&self, ty: &LirTy) -> TyAndLayout<LirTy>;
}

pub trait FnAbiOf {
    /// Returns the function ABI for the given return type and argument types.
    fn fn_abi_of(
        &self,
        lit_ty_ctx: &LirTyCtx,
        ret_and_args: &IdxVec<Local, LocalData>,
    ) -> FnAbi<LirTy>;
}

/// Every backend gets the same ABI classification for free: it only depends
/// on a type's layout (spec §4.E "function ABI"), not on anything backend
/// specific, so there is nothing for an individual backend to override here.
impl<T: CodegenBackendTypes> FnAbiOf for T {
    fn fn_abi_of(
        &self,
        lir_ty_ctx: &LirTyCtx,
        ret_and_args: &IdxVec<Local, LocalData>,
    ) -> FnAbi<LirTy> {
        use tidec_abi::calling_convention::function::{ArgAbi, PassMode};
        use tidec_lir::syntax::RETURN_LOCAL;

        let classify = |layout: TyAndLayout<LirTy>| -> ArgAbi<LirTy> {
            let mode = if layout.is_zst() {
                PassMode::Ignore
            } else if layout.is_memory() {
                PassMode::Indirect
            } else {
                PassMode::Direct
            };
            ArgAbi::new(layout, mode)
        };

        let ret = classify(lir_ty_ctx.layout_of(&ret_and_args[RETURN_LOCAL].ty));
        let args: Box<[ArgAbi<LirTy>]> = ret_and_args
            .as_slice()
            .iter()
            .skip(1)
            .map(|local_data| classify(lir_ty_ctx.layout_of(&local_data.ty)))
            .collect();

        FnAbi { args, ret }
    }
}

/// This trait is used to define the types used in the codegen backend.
/// It is used to define the types used in the codegen backend.
// FIXME(bruzzone): when `trait alias` is stable, we can use it to alias the `CodegenObject` trait
// pub trait CodegenObject = Copy + PartialEq + std::fmt::Debug;
pub trait CodegenBackendTypes {
    /// A `BasicBlock` is a basic block in the codegen backend.
    type BasicBlock: Copy + PartialEq + std::fmt::Debug;
    /// A `Type` is a type in the codegen backend.
    type Type: Copy + PartialEq + std::fmt::Debug;
    /// A `Value` is an instance of a type in the codegen backend.
    /// Note that this should include `FunctionValue`.
    /// E.g., an instruction, constant, argument, or a function value.
    type Value: Copy + PartialEq + std::fmt::Debug;
    /// A `Function` is a function type in the codegen backend.
    type FunctionType: Copy + PartialEq + std::fmt::Debug;
    /// A `MetadataType` is a metadata type in the codegen backend.
    type MetadataType: Copy + PartialEq + std::fmt::Debug;
    /// A `MetadataValue` is a metadata value in the codegen backend.
    /// E.g., a debug info node or TBAA (Type-Based Alias Analysis) node.
    type MetadataValue: Copy + PartialEq + std::fmt::Debug;
}

/// The codegen backend trait.
/// It is used to define the methods used in the codegen backend.
/// The associated types are used to define the types used in the codegen backend.
pub trait CodegenBackend: Sized + CodegenBackendTypes {
    /// The associated codegen module type.
    // FIXME(bruzzone): add constraints to ensure that the module is compatible with the codegen backend.
    type Module;

    /// The associated codegen context type.
    // FIXME(bruzzone): add constraints to ensure that the context is compatible with the codegen backend.
    type Context;
}

/// The pre-definition methods for the codegen backend. It is used to pre-define functions.
/// After pre-defining all functions, the bodies should be defined (see `DefineCodegenMethods`).
pub trait PreDefineCodegenMethods: Sized + CodegenBackendTypes {
    fn predefine_body(
        &self,
        lir_body_metadata: &LirBodyMetadata,
        lir_body_ret_and_args: &IdxVec<Local, LocalData>,
    );
}

/// The definition methods for the codegen backend. It is used to define (compile) function bodies.
/// The definition should be done after pre-defining all functions (see `PreDefineCodegenMethods`).
pub trait DefineCodegenMethods: Sized + CodegenBackendTypes {
    fn define_body(&self, lir_body: &LirBody);
}

/// The codegen backend methods.
pub trait CodegenMethods<'be>:
    Sized
    + LayoutOf
    + FnAbiOf
    + CodegenBackendTypes
    + CodegenBackend
    + PreDefineCodegenMethods
    + DefineCodegenMethods
{
    /// Creates a new codegen context for the given LIR type context and module.
    fn new(lir_ty_ctx: LirTyCtx, context: &'be Self::Context, module: Self::Module) -> Self;

    /// Return the LIR type context associated with this codegen context.
    fn lit_ty_ctx(&self) -> &LirTyCtx;

    /// Returns the function value for the given LIR body if it exists.
    fn get_fn(&self, lir_body_metadata: &LirBodyMetadata) -> Option<Self::Value>;

    /// Returns the function value for the given LIR body or defines it if it does not exist.
    fn get_or_define_fn(
        &self,
        lir_fn_metadata: &LirBodyMetadata,
        lir_fn_ret_and_args: &IdxVec<Local, LocalData>,
    ) -> Self::Value;

    /// Looks up an already-predefined function purely by its linker-visible
    /// name, with no `LirBodyMetadata`/`DefId` at hand -- used by the
    /// Forward-Declaration Linker to resolve a `Forward` outcome, which only
    /// carries the target's name (spec §4.H).
    fn get_fn_by_name(&self, name: &str) -> Option<Self::Value>;

    /// Returns the (lazily synthesised, per-distinct-argument-type cached)
    /// built-in function value for `name` given its already-lowered
    /// arguments (spec §4.F.Builtins; grounded on
    /// `original_source/irgen/builtin.go`'s `synthLen`, which caches one
    /// `len(T)` per distinct `T`).
    fn get_builtin(
        &self,
        name: &str,
        args: &[crate::lir::OperandRef<Self::Value>],
    ) -> Self::Value;
}

/// The builder methods for the codegen backend.
/// This trait is used to define the methods used in the codegen backend.
pub trait BuilderMethods<'a, 'be>: Sized + CodegenBackendTypes {
    /// The associated codegen context type.
    /// This ensures that the codegen context is compatible with the codegen backend types.
    type CodegenCtx: CodegenMethods<
            'be,
            BasicBlock = Self::BasicBlock,
            Type = Self::Type,
            Value = Self::Value,
            FunctionType = Self::FunctionType,
            MetadataType = Self::MetadataType,
            MetadataValue = Self::MetadataValue,
        >;

    /// Returns a reference to the codegen context.
    fn ctx(&self) -> &Self::CodegenCtx;

    /// Allocate memory for a value of the given size and alignment.
    /// For instance, in LLVM this corresponds to the `alloca` instruction.
    fn alloca(&self, size: Size, align: Align) -> Self::Value;

    /// Create a new builder for the given codegen context and basic block.
    /// The builder is positioned at the end of the basic block.
    fn build(ctx: &'a Self::CodegenCtx, bb: Self::BasicBlock) -> Self;

    /// Append a new basic block to the given function value with the given name.
    /// The name can be empty, in which case a unique name will be generated.
    /// The function value is assumed to be valid and belong to the same context as the codegen context.
    fn append_basic_block(
        ctx: &'a Self::CodegenCtx,
        fn_value: Self::Value,
        name: &str,
    ) -> Self::BasicBlock;

    /// Build a return instruction for the given builder.
    /// If the return value is `None`, it means that the function returns `void`,
    /// the return value is ignored, or it is `Indirect` (see `PassMode` in `tidec_abi`).
    /// For instance, it could be `Indirect` if the return value is a large struct:
    /// ```rust
    /// struct LargeStruct { a: [u8; 1024] }
    /// fn foo() -> LargeStruct { ... }
    /// ```
    fn build_return(&mut self, return_value: Option<Self::Value>);

    /// Load an operand from the given place reference.
    /// This is used to load a value from memory.
    fn load_operand(&mut self, place_ref: &PlaceRef<Self::Value>) -> OperandRef<Self::Value>;

    /// Build a store instruction to store the given value to the given place reference.
    /// This is used to store a value to memory.
    /// The value is assumed to be of the same type as the place reference.
    /// The alignment is the alignment of the place reference.
    fn build_load(&mut self, ty: Self::Type, ptr: Self::Value, align: Align) -> Self::Value;

    /// Build a store instruction to the given place reference (spec §4.F `store`).
    fn build_store(&mut self, value: Self::Value, ptr: Self::Value, align: Align);

    /// Materialize a scalar constant as a backend value of the given layout
    /// (spec §4.G constant lowering dispatch).
    fn const_scalar_to_backend_value(
        &mut self,
        scalar: tidec_lir::syntax::ConstScalar,
        ty_layout: TyAndLayout<LirTy>,
    ) -> Self::Value;

    /// Look up (or lazily intern) the backend global backing a Go string
    /// literal, returning `(data ptr, length)` as two backend values
    /// (spec §4.C String-Literal Pool, §4.G).
    fn const_str(&mut self, value: &str) -> (Self::Value, Self::Value);

    /// Binary arithmetic/bitwise instruction (spec §4.F).
    fn build_binop(
        &mut self,
        op: tidec_lir::syntax::BinOp,
        lhs: Self::Value,
        rhs: Self::Value,
    ) -> Self::Value;

    /// Comparison instruction, producing an `i1` (spec §4.F).
    fn build_cmp(
        &mut self,
        op: tidec_lir::syntax::CmpOp,
        lhs: Self::Value,
        rhs: Self::Value,
    ) -> Self::Value;

    /// Unary instruction (spec §4.F).
    fn build_unop(&mut self, op: tidec_lir::syntax::UnOp, val: Self::Value) -> Self::Value;

    /// Numeric/pointer conversion (spec §4.F `convert`).
    fn build_cast(
        &mut self,
        kind: tidec_lir::syntax::CastKind,
        val: Self::Value,
        dest_ty: Self::Type,
    ) -> Self::Value;

    /// `getelementptr` addressing a struct field or array/slice element
    /// (spec §4.F `fieldaddr`/`indexaddr`).
    fn build_gep(&mut self, ptr: Self::Value, indices: &[Self::Value]) -> Self::Value;

    /// `extractvalue` at the given field index (spec §4.F `extract`).
    fn build_extract_value(&mut self, agg: Self::Value, idx: u32) -> Self::Value;

    /// `insertvalue` at the given field index, returning the updated
    /// aggregate (spec §4.F `slice`, §8 struct-packed multi-value return).
    fn build_insert_value(&mut self, agg: Self::Value, elt: Self::Value, idx: u32) -> Self::Value;

    /// An undef value of the given aggregate type, the starting point for
    /// building a value field-by-field via `build_insert_value`.
    fn const_undef(&mut self, ty: Self::Type) -> Self::Value;

    /// The `idx`-th formal parameter of a function value (spec §4.H
    /// forwarding shim: every parameter is forwarded unchanged to the
    /// linked target).
    fn get_param(&self, fn_value: Self::Value, idx: u32) -> Self::Value;

    /// Heap allocation, used to lower `alloc` with `AllocScope::Heap` and the
    /// `new(T)` builtin (spec §4.F `alloc`, §4.F.Builtins).
    fn build_heap_alloc(&mut self, size: Self::Value) -> Self::Value;

    /// A direct call to a backend function value.
    fn build_call(&mut self, callee: Self::Value, args: &[Self::Value]) -> Self::Value;

    /// An unconditional branch (spec §4.F `jump`).
    fn build_br(&mut self, dest: Self::BasicBlock);

    /// A conditional branch (spec §4.F `if`).
    fn build_cond_br(&mut self, cond: Self::Value, then_bb: Self::BasicBlock, else_bb: Self::BasicBlock);

    /// A `phi` node over `(value, predecessor)` pairs (spec §4.F `phi`).
    fn build_phi(&mut self, ty: Self::Type, incoming: &[(Self::Value, Self::BasicBlock)]) -> Self::Value;

    /// A constant integer/boolean value of the given backend type.
    fn const_int(&mut self, ty: Self::Type, value: u64) -> Self::Value;

    /// The backend type corresponding to a `LirTy` (spec §4.B, used at call/cast sites).
    fn backend_type(&mut self, ty: &LirTy) -> Self::Type;
}
