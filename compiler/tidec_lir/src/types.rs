//! Predeclared-Type Registry (spec §4.A) and Type Lowerer (spec §4.B).
//!
//! Both live in one context because they share the same backing registry:
//! the predeclared types are simply the first entries interned into it, and
//! named-type definition (§4.B) looks other named types up through the same
//! map the predeclared types were registered in.

use std::collections::HashMap;

use crate::error::{IrgenError, IrgenResult};
use crate::source_ty::{BasicKind, FieldTy, SourceTy};
use crate::syntax::LirTy;
use tracing::{debug, instrument};

/// Owns the interned type registry and the module's type-definition list.
///
/// Mirrors the "Module state" field `{source type name -> IR type}` from
/// spec §3; `tidec_codegen_ssa`'s module index embeds one of these per
/// package being built.
pub struct TypeCtx {
    /// Source type name -> lowered IR type, by canonical/fully-qualified name.
    registry: HashMap<String, LirTy>,
    /// The module's type-definition list, in the order types were defined.
    /// Spec invariant: "predeclared IR types are injected ... exactly once".
    defs: Vec<LirTy>,
}

impl TypeCtx {
    #[instrument(skip_all)]
    pub fn new() -> Self {
        let mut ctx = TypeCtx {
            registry: HashMap::new(),
            defs: Vec::new(),
        };
        ctx.init_predeclared_types();
        debug!("predeclared types registered: {}", ctx.registry.len());
        ctx
    }

    /// Registry lookup by canonical or fully qualified name (spec §4.B
    /// "Named -> registry lookup by fully qualified name").
    pub fn lookup(&self, name: &str) -> Option<&LirTy> {
        self.registry.get(name)
    }

    /// The module's type-definition list, appended to in definition order.
    pub fn type_defs(&self) -> &[LirTy] {
        &self.defs
    }

    fn register(&mut self, name: impl Into<String>, ty: LirTy) -> LirTy {
        let name = name.into();
        self.registry.insert(name, ty.clone());
        self.defs.push(ty.clone());
        ty
    }

    // --- [ 4.A Predeclared-Type Registry ] ----------------------------------

    fn init_predeclared_types(&mut self) {
        self.register(BasicKind::Bool.canonical_name(), LirTy::I1);

        self.register(BasicKind::Int8.canonical_name(), LirTy::I8);
        self.register(BasicKind::Int16.canonical_name(), LirTy::I16);
        self.register(BasicKind::Int32.canonical_name(), LirTy::I32);
        self.register(BasicKind::Int64.canonical_name(), LirTy::I64);
        self.register(BasicKind::Int.canonical_name(), LirTy::I64);

        self.register(BasicKind::Uint8.canonical_name(), LirTy::I8);
        self.register(BasicKind::Uint16.canonical_name(), LirTy::I16);
        self.register(BasicKind::Uint32.canonical_name(), LirTy::I32);
        self.register(BasicKind::Uint64.canonical_name(), LirTy::I64);
        self.register(BasicKind::Uint.canonical_name(), LirTy::I64);
        self.register(BasicKind::Uintptr.canonical_name(), LirTy::I64);

        self.register(BasicKind::Float32.canonical_name(), LirTy::F32);
        self.register(BasicKind::Float64.canonical_name(), LirTy::F64);

        // complex64/128: structure of two floats (real, imag).
        let complex64 = LirTy::Named(
            BasicKind::Complex64.canonical_name().to_string(),
            Box::new(LirTy::Struct(vec![LirTy::F32, LirTy::F32])),
        );
        self.register(BasicKind::Complex64.canonical_name(), complex64);
        let complex128 = LirTy::Named(
            BasicKind::Complex128.canonical_name().to_string(),
            Box::new(LirTy::Struct(vec![LirTy::F64, LirTy::F64])),
        );
        self.register(BasicKind::Complex128.canonical_name(), complex128);

        // string: { pointer-to-byte data, int length }.
        let string_ty = LirTy::Named(
            BasicKind::String.canonical_name().to_string(),
            Box::new(LirTy::Struct(vec![LirTy::Ptr(Box::new(LirTy::I8)), LirTy::I64])),
        );
        self.register(BasicKind::String.canonical_name(), string_ty);

        // unsafe.Pointer: pointer to byte.
        let unsafe_pointer = LirTy::Ptr(Box::new(LirTy::I8));
        self.register(BasicKind::UnsafePointer.canonical_name(), unsafe_pointer);

        // error: { string type-name, pointer-to-byte value } -- placeholder
        // for a real interface representation (spec §4.A).
        let string_ref = self.registry[BasicKind::String.canonical_name()].clone();
        let error_ty = LirTy::Named(
            BasicKind::Error.canonical_name().to_string(),
            Box::new(LirTy::Struct(vec![string_ref, LirTy::Ptr(Box::new(LirTy::I8))])),
        );
        self.register(BasicKind::Error.canonical_name(), error_ty);
    }

    // --- [ 4.B Type Lowerer ] ------------------------------------------------

    /// `irType(sourceType) -> IRType` (spec §4.B).
    pub fn lower(&mut self, ty: &SourceTy) -> IrgenResult<LirTy> {
        match ty {
            SourceTy::Basic(kind) => self.lookup(kind.canonical_name()).cloned().ok_or_else(|| {
                IrgenError::internal(format!(
                    "predeclared type `{}` missing from registry",
                    kind.canonical_name()
                ))
            }),
            SourceTy::Pointer(elem) => {
                let elem_ty = self.lower(elem)?;
                Ok(LirTy::Ptr(Box::new(elem_ty)))
            }
            SourceTy::Named { name, underlying } => self.define_named(name, underlying),
            SourceTy::Slice(elem) => self.lower_slice(elem),
            SourceTy::Struct(fields) => self.lower_struct(fields),
            SourceTy::Array { len, elem } => {
                let elem_ty = self.lower(elem)?;
                Ok(LirTy::Array(*len, Box::new(elem_ty)))
            }
            SourceTy::Signature(sig) => self.lower_signature(sig),
            SourceTy::Interface => Err(IrgenError::unsupported("interface type", "type lowering")),
            SourceTy::Chan(_) => Err(IrgenError::unsupported("channel type", "type lowering")),
            SourceTy::Map { .. } => Err(IrgenError::unsupported("map type", "type lowering")),
            SourceTy::Tuple(_) => Err(IrgenError::unsupported(
                "tuple type outside multi-value lowering",
                "type lowering",
            )),
        }
    }

    /// Named-type definition (spec §4.B): (1) lower the underlying type,
    /// (2) shallow-copy the result, (3) set the copy's name, (4) register and
    /// append.
    ///
    /// Because `LirTy` is an immutable value type, "shallow copy" is realized
    /// by cloning the freshly lowered underlying type before wrapping it in
    /// `Named` -- the clone cannot alias (and therefore cannot retroactively
    /// rename) any previously registered type, satisfying the spec's
    /// invariant without needing a mutable donor object (spec §9
    /// "Copy-on-name for named types").
    fn define_named(&mut self, name: &str, underlying: &SourceTy) -> IrgenResult<LirTy> {
        // Redundant type-definition attempts for already-defined types are a
        // silent skip (spec §7 non-fatal conditions; P2).
        if let Some(existing) = self.lookup(name) {
            return Ok(existing.clone());
        }
        let underlying_ty = self.lower(underlying)?;
        let copy = underlying_ty.clone();
        let named = LirTy::Named(name.to_string(), Box::new(copy));
        Ok(self.register(name, named))
    }

    /// `[]ELEM`: interned structure `{ pointer-to-elem data, int length, int capacity }`.
    fn lower_slice(&mut self, elem: &SourceTy) -> IrgenResult<LirTy> {
        let elem_ty = self.lower(elem)?;
        let name = format!("[]{}", Self::display_ty(&elem_ty));
        if let Some(existing) = self.lookup(&name) {
            return Ok(existing.clone());
        }
        let slice_ty = LirTy::Named(
            name.clone(),
            Box::new(LirTy::Struct(vec![
                LirTy::Ptr(Box::new(elem_ty)),
                LirTy::I64,
                LirTy::I64,
            ])),
        );
        Ok(self.register(name, slice_ty))
    }

    /// Anonymous structure; field names are not retained at the IR layer
    /// (spec §4.B) -- callers that need them keep the `SourceTy::Struct`
    /// field list alongside the lowered type.
    fn lower_struct(&mut self, fields: &[FieldTy]) -> IrgenResult<LirTy> {
        let field_tys = fields
            .iter()
            .map(|f| self.lower(&f.ty))
            .collect::<IrgenResult<Vec<_>>>()?;
        Ok(LirTy::Struct(field_tys))
    }

    /// Function signature -> pointer to IR function type. A single result
    /// becomes the return type, multiple results become a structure return,
    /// zero results become void; variadic flag propagates (spec §4.B).
    ///
    /// The signature lowerer never sees a receiver: methods flatten their
    /// receiver into `params[0]` before reaching this function
    /// (SPEC_FULL.md §B, grounded on `original_source/irgen/type.go`'s
    /// `irTypeFromGoSignatureType`, which panics on `goType.Recv() != nil`).
    fn lower_signature(&mut self, sig: &crate::source_ty::SignatureTy) -> IrgenResult<LirTy> {
        let params = sig
            .params
            .iter()
            .map(|p| self.lower(p))
            .collect::<IrgenResult<Vec<_>>>()?;
        let results = sig
            .results
            .iter()
            .map(|r| self.lower(r))
            .collect::<IrgenResult<Vec<_>>>()?;
        let ret = match results.len() {
            0 => LirTy::Void,
            1 => results.into_iter().next().unwrap(),
            _ => LirTy::Struct(results),
        };
        Ok(LirTy::Function {
            params,
            ret: Box::new(ret),
            variadic: sig.variadic,
        })
    }

    /// A stable textual rendering of a lowered type, used only to mint
    /// slice-type names (`[]ELEM`); not meant to round-trip.
    fn display_ty(ty: &LirTy) -> String {
        match ty {
            LirTy::Named(name, _) => name.clone(),
            LirTy::I1 => "bool".to_string(),
            LirTy::I8 => "i8".to_string(),
            LirTy::I16 => "i16".to_string(),
            LirTy::I32 => "i32".to_string(),
            LirTy::I64 => "i64".to_string(),
            LirTy::I128 => "i128".to_string(),
            LirTy::F32 => "f32".to_string(),
            LirTy::F64 => "f64".to_string(),
            LirTy::Ptr(elem) => format!("*{}", Self::display_ty(elem)),
            LirTy::Array(len, elem) => format!("[{}]{}", len, Self::display_ty(elem)),
            LirTy::Struct(_) => "struct".to_string(),
            LirTy::Function { .. } => "func".to_string(),
            LirTy::Void => "void".to_string(),
            LirTy::Metadata => "metadata".to_string(),
        }
    }
}

impl Default for TypeCtx {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predeclared_types_are_registered_once() {
        let ctx = TypeCtx::new();
        assert!(matches!(ctx.lookup("bool"), Some(LirTy::I1)));
        assert!(matches!(ctx.lookup("int"), Some(LirTy::I64)));
        assert!(ctx.lookup("string").is_some());
        assert!(ctx.lookup("unsafe.Pointer").is_some());
        assert!(ctx.lookup("error").is_some());
    }

    #[test]
    fn named_type_definition_is_idempotent() {
        let mut ctx = TypeCtx::new();
        let underlying = SourceTy::Basic(BasicKind::Int64);
        let first = ctx.define_named("pkg/path.MyInt", &underlying).unwrap();
        let defs_after_first = ctx.type_defs().len();
        let second = ctx.define_named("pkg/path.MyInt", &underlying).unwrap();
        assert_eq!(ctx.type_defs().len(), defs_after_first);
        assert!(matches!(first, LirTy::Named(ref n, _) if n == "pkg/path.MyInt"));
        assert!(matches!(second, LirTy::Named(ref n, _) if n == "pkg/path.MyInt"));
    }

    #[test]
    fn slice_type_is_interned_by_name() {
        let mut ctx = TypeCtx::new();
        let elem = SourceTy::Basic(BasicKind::Int64);
        let a = ctx.lower(&SourceTy::Slice(Box::new(elem.clone()))).unwrap();
        let b = ctx.lower(&SourceTy::Slice(Box::new(elem))).unwrap();
        assert_eq!(a.name(), Some("[]i64"));
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn interface_is_unsupported() {
        let mut ctx = TypeCtx::new();
        assert!(matches!(
            ctx.lower(&SourceTy::Interface),
            Err(IrgenError::Unsupported { .. })
        ));
    }
}
