//! The value model shared by every backend: `PlaceRef`/`OperandRef` and the
//! `LocalRef` a function-local can be in while it is being lowered (spec §3
//! "Function lowering state"). The driver that actually walks a `LirBody`
//! using these types lives in [`crate::entry`].

use crate::traits::{BuilderMethods, LayoutOf};
use tidec_abi::layout::BackendRepr;
use tidec_abi::{
    layout::TyAndLayout,
    size_and_align::{Align, Size},
};
use tidec_lir::syntax::ConstValue;
use tidec_lir::syntax::LirTy;

#[derive(Debug, Clone)]
/// Represents a memory location or “place” during code generation.
///
/// `PlaceRef` encapsulates both the **backend-level representation** of a place
/// (how the value is passed, stored, or manipulated at the ABI/codegen level)
/// and its **type/layout information**, which is needed to generate correct
/// memory accesses, handle aggregates, and respect alignment and size requirements.
///
/// The type parameter `V` represents a backend-specific value, such as a machine
/// register, LLVM value, or other intermediate representation used by the backend.
pub struct PlaceRef<V: std::fmt::Debug> {
    /// The backend value of this place.
    ///
    /// This corresponds to the actual value used by the backend for code generation,
    /// e.g., a register, stack slot, or pointer. Its form is determined by the
    /// type’s `backend_repr` from the layout, which describes how the type is
    /// passed or stored (scalar, scalar pair, memory, etc.).
    pub place_val: PlaceVal<V>,
    /// The type and layout of this place.
    ///
    /// Provides size, alignment, and ABI information, which is essential for
    /// correct code generation, especially for aggregates, unsized types,
    /// or types with nontrivial ABI requirements.
    pub ty_layout: TyAndLayout<LirTy>,
}

#[derive(Debug, Clone)]
/// Represents a computed value or operand during code generation.
///
/// `OperandRef` holds a value that can be used directly in computations,
/// without necessarily having a memory location. This can include immediate
/// scalars, scalar pairs (e.g., fat pointers), or references to memory locations.
pub struct OperandRef<V: std::fmt::Debug> {
    /// The actual value of the operand in the backend.
    ///
    /// May be an immediate scalar, a pair of scalars, or a reference to a `PlaceVal`.
    pub operand_val: OperandVal<V>,
    /// The type and layout of the operand.
    ///
    /// Provides size, alignment, and ABI information needed for correct
    /// code generation and backend handling.
    pub ty_layout: TyAndLayout<LirTy>,
}

impl<V: std::fmt::Debug> OperandRef<V> {
    pub fn new_zst(ty_layout: TyAndLayout<LirTy>) -> Self {
        OperandRef {
            operand_val: OperandVal::Zst,
            ty_layout,
        }
    }

    pub fn new_immediate(value: V, ty_layout: TyAndLayout<LirTy>) -> Self {
        OperandRef {
            operand_val: OperandVal::Immediate(value),
            ty_layout,
        }
    }

    pub fn new_const<'a, 'be, B: BuilderMethods<'a, 'be, Value = V>>(
        builder: &mut B,
        const_val: ConstValue,
        lir_ty: LirTy,
    ) -> Self {
        let ty_layout = builder.ctx().layout_of(&lir_ty);
        let be_val = match const_val {
            ConstValue::Scalar(const_scalar) => {
                assert!(matches!(ty_layout.backend_repr, BackendRepr::Scalar(_)));
                let be_val =
                    builder.const_scalar_to_backend_value(const_scalar, ty_layout.clone());
                OperandVal::Immediate(be_val)
            }
            ConstValue::ZST => {
                assert!(ty_layout.is_zst());
                OperandVal::Zst
            }
            ConstValue::StringLit(s) => {
                // The interned `string` struct is a scalar pair: data pointer
                // and length (spec §4.C, §4.G).
                let (data, len) = builder.const_str(&s);
                OperandVal::Pair(data, len)
            }
        };
        OperandRef {
            operand_val: be_val,
            ty_layout,
        }
    }
}

#[derive(Debug, Clone)]
/// Backend representation of an operand value.
///
/// This enum captures the different forms a value may take at the backend:
/// - `Zst` — represents a zero-sized type (ZST) which has no data.
/// - `Immediate(V)` — a single scalar value (integer, float, pointer, etc.)
/// - `Pair(V, V)` — two scalars representing a compound value, such as a fat pointer (`&[T]` or `&str`)
/// - `Ref(PlaceVal<V>)` — a reference to a memory location, allowing indirect access
///   to the value.
pub enum OperandVal<V: std::fmt::Debug> {
    /// A zero-sized type (ZST) has no data and thus no value.
    Zst,
    /// A single immediate value.
    Immediate(V),
    /// Two values representing a compound operand.
    Pair(V, V),
    /// A reference to a place in memory.
    Ref(PlaceVal<V>),
}

impl<'a, 'be, V: Copy + PartialEq + std::fmt::Debug> PlaceRef<V> {
    pub fn alloca<B: BuilderMethods<'a, 'be, Value = V>>(
        builder: &mut B,
        ty_and_layout: TyAndLayout<LirTy>,
    ) -> Self {
        assert!(!ty_and_layout.is_zst());
        PlaceVal::alloca(
            builder,
            ty_and_layout.layout.size,
            ty_and_layout.layout.align.abi,
        )
        .with_layout(ty_and_layout)
    }
}

#[derive(Debug, Clone, Copy)]
/// A backend value paired with alignment information, representing the underlying storage
/// for a LIR place during codegen.
///
/// This struct abstracts over how a place is represented in the backend,
/// whether it be a memory address, an SSA value, or other representations.
///
/// This is tipically used in conjunction with [`PlaceRef`].
///
/// The type parameter `V` is the backend-specific representation of values.
pub struct PlaceVal<V: std::fmt::Debug> {
    /// The actual backend value for this place (e.g., pointer, immediate, etc.).
    pub value: V,
    /// Alignment of the value in memory.
    ///
    /// This is used to ensure proper access semantics and may affect how code is emitted,
    /// especially for aligned loads/stores and optimizations.
    pub align: Align,
}

impl<'a, 'be, V: Copy + PartialEq + std::fmt::Debug> PlaceVal<V> {
    pub fn alloca<B: BuilderMethods<'a, 'be, Value = V>>(
        builder: &mut B,
        size: Size,
        align: Align,
    ) -> Self {
        let value = builder.alloca(size, align);
        PlaceVal { value, align }
    }

    pub fn with_layout(self, layout: TyAndLayout<LirTy>) -> PlaceRef<V> {
        // TODO: Assert that the type is not unsized (through `TyAndLayout`).
        PlaceRef {
            place_val: self,
            ty_layout: layout,
        }
    }
}

#[derive(Debug)]
/// A local reference in the LIR, representing a local variable or temporary
/// during code generation.
///
/// This enum is used to represent different kinds of local references
/// that can be used in the backend code generation process.
///
/// From a source-level perspective, locals can be thought of as
/// variables declared within a function scope.
pub enum LocalRef<V: std::fmt::Debug> {
    /// A local backed by a memory location with associated layout and alignment metadata.
    ///
    /// From a source-level perspective, this corresponds to variables
    /// that have a defined memory location, such as stack-allocated variables.
    /// See [`tided_lir::syntax::Place`] for more details.
    PlaceRef(PlaceRef<V>),
    /// A local represented as an operand value, which can be used directly in computations.
    ///
    /// From a source-level perspective, this corresponds to temporary values
    /// that do not have a dedicated memory location, such as intermediate
    /// results in expressions.
    /// See [`tidec_lir::syntax::Operand`] for more details.
    OperandRef(OperandRef<V>),
    /// A local that is yet to be assigned a value.
    /// This is a placeholder for locals that will be initialized later.
    /// It is used to represent uninitialized locals during code generation.
    PendingOperandRef,
}

