//! Forward-Declaration Linker (spec §4.H): after every function body has
//! been emitted, functions that were only ever forward-declared (no body of
//! their own — extern-linkage shims generated from the front end's
//! incomplete symbol knowledge) are matched by name against a body-bearing
//! definition and given a one-block shim that forwards to it.
//!
//! Grounded on the tail of `original_source/irgen/irgen.go`: bodyless
//! functions are matched against bodies by lower-cased name; a signature
//! match gets a synthesized forwarding body, a mismatch is left as an
//! extern declaration with a warning (spec §7 non-fatal conditions).

use std::collections::HashMap;

use tidec_lir::syntax::LirTy;
use tracing::warn;

/// A function known to the linker: its lower-cased name for matching, its
/// signature, and whether it already has a body.
pub struct LinkCandidate {
    pub qualified_name: String,
    pub signature: LirTy,
    pub has_body: bool,
}

/// The outcome of matching one bodyless function against the candidates
/// that do have bodies.
pub enum LinkOutcome {
    /// An exact signature match was found; synthesize a one-block shim that
    /// forwards all parameters to `target` and returns its result.
    Forward { target: String },
    /// No exact match (by name, case-insensitively, or by signature); leave
    /// the function as an external declaration (spec §7: non-fatal).
    LeaveExtern,
}

/// Resolves every bodyless function in `candidates` to either a forwarding
/// shim or an extern declaration (spec §4.H).
pub fn resolve_forward_declarations(candidates: &[LinkCandidate]) -> HashMap<String, LinkOutcome> {
    let mut bodies_by_lower_name: HashMap<String, Vec<&LinkCandidate>> = HashMap::new();
    for c in candidates.iter().filter(|c| c.has_body) {
        bodies_by_lower_name
            .entry(c.qualified_name.to_lowercase())
            .or_default()
            .push(c);
    }

    let mut outcomes = HashMap::new();
    for decl in candidates.iter().filter(|c| !c.has_body) {
        let lower_name = decl.qualified_name.to_lowercase();
        let outcome = match bodies_by_lower_name.get(&lower_name) {
            Some(matches) => match matches.iter().find(|m| signatures_match(&decl.signature, &m.signature)) {
                Some(m) => LinkOutcome::Forward {
                    target: m.qualified_name.clone(),
                },
                None => {
                    warn!(
                        "forward declaration `{}` has a same-named candidate body with a mismatched signature; leaving as extern",
                        decl.qualified_name
                    );
                    LinkOutcome::LeaveExtern
                }
            },
            None => LinkOutcome::LeaveExtern,
        };
        outcomes.insert(decl.qualified_name.clone(), outcome);
    }
    outcomes
}

fn signatures_match(a: &LirTy, b: &LirTy) -> bool {
    match (a, b) {
        (
            LirTy::Function {
                params: pa,
                ret: ra,
                variadic: va,
            },
            LirTy::Function {
                params: pb,
                ret: rb,
                variadic: vb,
            },
        ) => {
            va == vb
                && pa.len() == pb.len()
                && pa.iter().zip(pb).all(|(x, y)| signatures_match(x, y))
                && signatures_match(ra, rb)
        }
        (LirTy::Ptr(x), LirTy::Ptr(y)) => signatures_match(x, y),
        (LirTy::Named(na, _), LirTy::Named(nb, _)) => na == nb,
        (LirTy::Array(la, ea), LirTy::Array(lb, eb)) => la == lb && signatures_match(ea, eb),
        (LirTy::Struct(fa), LirTy::Struct(fb)) => {
            fa.len() == fb.len() && fa.iter().zip(fb).all(|(x, y)| signatures_match(x, y))
        }
        _ => std::mem::discriminant(a) == std::mem::discriminant(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: Vec<LirTy>, ret: LirTy) -> LirTy {
        LirTy::Function {
            params,
            ret: Box::new(ret),
            variadic: false,
        }
    }

    #[test]
    fn matching_signature_forwards() {
        let candidates = vec![
            LinkCandidate {
                qualified_name: "pkg.Foo".to_string(),
                signature: sig(vec![LirTy::I64], LirTy::I64),
                has_body: false,
            },
            LinkCandidate {
                qualified_name: "pkg.foo".to_string(),
                signature: sig(vec![LirTy::I64], LirTy::I64),
                has_body: true,
            },
        ];
        let outcomes = resolve_forward_declarations(&candidates);
        assert!(matches!(
            outcomes.get("pkg.Foo"),
            Some(LinkOutcome::Forward { target }) if target == "pkg.foo"
        ));
    }

    #[test]
    fn mismatched_signature_leaves_extern() {
        let candidates = vec![
            LinkCandidate {
                qualified_name: "pkg.Foo".to_string(),
                signature: sig(vec![LirTy::I64], LirTy::I64),
                has_body: false,
            },
            LinkCandidate {
                qualified_name: "pkg.foo".to_string(),
                signature: sig(vec![LirTy::I32], LirTy::I64),
                has_body: true,
            },
        ];
        let outcomes = resolve_forward_declarations(&candidates);
        assert!(matches!(outcomes.get("pkg.Foo"), Some(LinkOutcome::LeaveExtern)));
    }

    #[test]
    fn no_candidate_leaves_extern() {
        let candidates = vec![LinkCandidate {
            qualified_name: "pkg.Bar".to_string(),
            signature: sig(vec![], LirTy::Void),
            has_body: false,
        }];
        let outcomes = resolve_forward_declarations(&candidates);
        assert!(matches!(outcomes.get("pkg.Bar"), Some(LinkOutcome::LeaveExtern)));
    }
}
