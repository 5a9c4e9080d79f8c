//! The source-language type system consumed by the type lowerer (spec §4.A, §4.B).
//!
//! `SourceTy` models the type system of the SSA front-end this backend
//! accepts as input: a mainstream statically-typed imperative language with
//! package-qualified named types, methods, structs, slices, and pointers
//! (spec §1). It is deliberately *not* `LirTy` — lowering from one to the
//! other is exactly the job of `crate::types`.

use std::sync::Arc;

/// A fully qualified type name, e.g. `pkg/path.T` (spec §6).
pub type QualifiedName = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The predeclared basic types (spec §4.A). Signedness is tracked by name,
/// not by the IR representation, per spec §4.A ("the IR has no signed/
/// unsigned integer distinction").
pub enum BasicKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uint,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    UnsafePointer,
    Error,
}

impl BasicKind {
    /// Whether arithmetic on this type uses signed integer semantics.
    /// Meaningless (and unused) for non-integer kinds.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            BasicKind::Int8
                | BasicKind::Int16
                | BasicKind::Int32
                | BasicKind::Int64
                | BasicKind::Int
        )
    }

    pub fn canonical_name(self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Int => "int",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uint => "uint",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::Complex64 => "complex64",
            BasicKind::Complex128 => "complex128",
            BasicKind::String => "string",
            BasicKind::UnsafePointer => "unsafe.Pointer",
            BasicKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
/// A field of a struct or the result slot of a function signature.
pub struct FieldTy {
    pub name: String,
    pub ty: SourceTy,
}

#[derive(Debug, Clone)]
/// A function (or method) signature as seen by the type lowerer.
///
/// A method's receiver, if any, has already been flattened into `params[0]`
/// by the caller (spec §4.D phase 3; SPEC_FULL.md §B) — the signature lowerer
/// itself never sees a receiver, matching the original source's behavior.
pub struct SignatureTy {
    pub params: Vec<SourceTy>,
    pub results: Vec<SourceTy>,
    pub variadic: bool,
}

#[derive(Debug, Clone)]
/// The source-language type system (spec §4.B).
pub enum SourceTy {
    Basic(BasicKind),
    /// A pointer to another source type.
    Pointer(Box<SourceTy>),
    /// A user-defined named type, identified by its fully qualified name.
    /// The underlying structural type is recorded so the lowerer can define
    /// it the first time the name is encountered.
    Named {
        name: QualifiedName,
        underlying: Box<SourceTy>,
    },
    /// A slice of the given element type.
    Slice(Box<SourceTy>),
    /// An anonymous struct; field names are informational only (lost at the
    /// IR layer per spec §4.B).
    Struct(Vec<FieldTy>),
    /// A fixed-length array.
    Array { len: u64, elem: Box<SourceTy> },
    /// A function signature.
    Signature(Arc<SignatureTy>),
    /// An interface type. Unsupported: lowering fails (spec §4.B).
    Interface,
    /// A channel type. Unsupported.
    Chan(Box<SourceTy>),
    /// A map type. Unsupported.
    Map {
        key: Box<SourceTy>,
        value: Box<SourceTy>,
    },
    /// A tuple (multi-value) pseudo-type, used only for SSA instructions
    /// that yield more than one value at once. Unsupported as a first-class
    /// type (spec §4.B).
    Tuple(Vec<SourceTy>),
}

impl SourceTy {
    pub fn is_named(&self) -> bool {
        matches!(self, SourceTy::Named { .. })
    }
}
