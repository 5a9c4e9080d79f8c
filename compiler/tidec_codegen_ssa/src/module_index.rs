//! Module Index (spec §4.D): the three-phase build that turns a package's
//! source declarations into an ordered `LirUnit`, deterministically.
//!
//! Grounded on `original_source/irgen/irgen.go` (the overall package driver)
//! together with `module.go` (the `Module` state it walks): type definitions
//! first (so every later phase can assume named types already resolve),
//! then package members (globals and functions, predefined but not yet
//! given bodies), then methods. Each phase keeps its own `done` cycle-guard
//! map — using one shared map across phases would incorrectly skip a type
//! that a later phase needs to revisit for a different purpose.

use std::collections::HashMap;

use tidec_lir::error::{IrgenError, IrgenResult};
use tidec_lir::source_ty::SourceTy;
use tidec_lir::types::TypeCtx;

/// A package-local declaration this backend can see, prior to lowering.
/// The source front-end is responsible for populating one of these per
/// package; `ModuleIndex` only walks and orders what it is given.
pub struct PackageDecl {
    pub qualified_name: String,
    pub kind: DeclKind,
    /// Other fully-qualified names this declaration's *definition*
    /// references and must therefore be defined before it (spec §4.D
    /// "depth-first, imports before self").
    pub deps: Vec<String>,
}

pub enum DeclKind {
    TypeDef { underlying: SourceTy },
    Global { ty: SourceTy },
    Function { receiver: Option<SourceTy> },
    Method { receiver: SourceTy },
}

/// The ordered result of indexing a package: type definitions, package
/// members, and methods, each in the deterministic order the three phases
/// produced them (spec §4.D, §5 "determinism via sorting").
pub struct IndexedPackage {
    pub type_defs: Vec<String>,
    pub members: Vec<String>,
    pub methods: Vec<String>,
}

/// Drives the three-phase module build over one package's declarations.
pub struct ModuleIndex<'a> {
    decls: &'a HashMap<String, PackageDecl>,
    type_ctx: &'a mut TypeCtx,
}

impl<'a> ModuleIndex<'a> {
    pub fn new(decls: &'a HashMap<String, PackageDecl>, type_ctx: &'a mut TypeCtx) -> Self {
        ModuleIndex { decls, type_ctx }
    }

    /// Runs all three phases and returns the deterministic build order.
    pub fn build(&mut self) -> IrgenResult<IndexedPackage> {
        let type_defs = self.phase1_type_defs()?;
        let members = self.phase2_members()?;
        let methods = self.phase3_methods()?;
        Ok(IndexedPackage {
            type_defs,
            members,
            methods,
        })
    }

    /// Phase 1 (spec §4.D): index every `TypeDef` declaration, depth-first
    /// over its dependency edges, each with its own `done` map.
    fn phase1_type_defs(&mut self) -> IrgenResult<Vec<String>> {
        let mut names: Vec<&String> = self
            .decls
            .values()
            .filter(|d| matches!(d.kind, DeclKind::TypeDef { .. }))
            .map(|d| &d.qualified_name)
            .collect();
        names.sort();

        let mut done = HashMap::new();
        let mut order = Vec::new();
        for name in names {
            self.index_type_def(name, &mut done, &mut order)?;
        }
        Ok(order)
    }

    fn index_type_def(
        &mut self,
        name: &str,
        done: &mut HashMap<String, bool>,
        order: &mut Vec<String>,
    ) -> IrgenResult<()> {
        if let Some(&in_progress) = done.get(name) {
            if in_progress {
                // A cycle in type dependencies without any indirection
                // (pointer/slice) is a source-language error the front end
                // should already have rejected; defensively skip rather
                // than infinite-loop (spec §7 non-fatal conditions).
                return Ok(());
            }
            return Ok(());
        }
        done.insert(name.to_string(), true);

        let decl = self
            .decls
            .get(name)
            .ok_or_else(|| IrgenError::internal(format!("unindexed type `{name}`")))?;
        let DeclKind::TypeDef { underlying } = &decl.kind else {
            return Err(IrgenError::internal(format!("`{name}` is not a type definition")));
        };

        let mut deps: Vec<String> = decl.deps.clone();
        deps.sort();
        for dep in &deps {
            self.index_type_def(dep, done, order)?;
        }

        self.type_ctx.lower(&SourceTy::Named {
            name: name.to_string(),
            underlying: Box::new(underlying.clone()),
        })?;
        order.push(name.to_string());
        done.insert(name.to_string(), false);
        Ok(())
    }

    /// Phase 2 (spec §4.D): index package-level members (globals,
    /// functions), each depth-first over their own dependency edges, with a
    /// phase-local `done` map distinct from phase 1's.
    fn phase2_members(&mut self) -> IrgenResult<Vec<String>> {
        let mut names: Vec<&String> = self
            .decls
            .values()
            .filter(|d| matches!(d.kind, DeclKind::Global { .. } | DeclKind::Function { .. }))
            .map(|d| &d.qualified_name)
            .collect();
        names.sort();

        let mut done: HashMap<String, bool> = HashMap::new();
        let mut order = Vec::new();
        for name in names {
            self.index_member(name, &mut done, &mut order)?;
        }
        Ok(order)
    }

    fn index_member(
        &mut self,
        name: &str,
        done: &mut HashMap<String, bool>,
        order: &mut Vec<String>,
    ) -> IrgenResult<()> {
        if done.contains_key(name) {
            return Ok(());
        }
        done.insert(name.to_string(), true);

        let decl = self
            .decls
            .get(name)
            .ok_or_else(|| IrgenError::internal(format!("unindexed member `{name}`")))?;

        let mut deps: Vec<String> = decl.deps.clone();
        deps.sort();
        for dep in &deps {
            if matches!(
                self.decls.get(dep).map(|d| &d.kind),
                Some(DeclKind::Global { .. } | DeclKind::Function { .. })
            ) {
                self.index_member(dep, done, order)?;
            }
        }

        order.push(name.to_string());
        Ok(())
    }

    /// Phase 3 (spec §4.D): index methods, again with their own `done` map.
    /// A method's receiver is flattened into `params[0]` before the
    /// signature reaches the type lowerer (SPEC_FULL.md §B).
    fn phase3_methods(&mut self) -> IrgenResult<Vec<String>> {
        let mut names: Vec<&String> = self
            .decls
            .values()
            .filter(|d| matches!(d.kind, DeclKind::Method { .. }))
            .map(|d| &d.qualified_name)
            .collect();
        names.sort();

        let mut done: HashMap<String, bool> = HashMap::new();
        let mut order = Vec::new();
        for name in names {
            if done.contains_key(name) {
                continue;
            }
            done.insert(name.clone(), true);
            order.push(name.clone());
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidec_lir::source_ty::BasicKind;

    fn type_def(name: &str, deps: Vec<&str>) -> PackageDecl {
        PackageDecl {
            qualified_name: name.to_string(),
            kind: DeclKind::TypeDef {
                underlying: SourceTy::Basic(BasicKind::Int64),
            },
            deps: deps.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn type_defs_are_ordered_dependencies_first() {
        let mut decls = HashMap::new();
        decls.insert("pkg.B".to_string(), type_def("pkg.B", vec!["pkg.A"]));
        decls.insert("pkg.A".to_string(), type_def("pkg.A", vec![]));

        let mut type_ctx = TypeCtx::new();
        let mut index = ModuleIndex::new(&decls, &mut type_ctx);
        let result = index.build().unwrap();

        let pos_a = result.type_defs.iter().position(|n| n == "pkg.A").unwrap();
        let pos_b = result.type_defs.iter().position(|n| n == "pkg.B").unwrap();
        assert!(pos_a < pos_b);
    }

    #[test]
    fn type_defs_are_sorted_for_determinism() {
        let mut decls = HashMap::new();
        decls.insert("pkg.Z".to_string(), type_def("pkg.Z", vec![]));
        decls.insert("pkg.A".to_string(), type_def("pkg.A", vec![]));

        let mut type_ctx = TypeCtx::new();
        let mut index = ModuleIndex::new(&decls, &mut type_ctx);
        let result = index.build().unwrap();
        assert_eq!(result.type_defs, vec!["pkg.A".to_string(), "pkg.Z".to_string()]);
    }
}
