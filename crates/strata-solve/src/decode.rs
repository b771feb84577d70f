//! Decoding: from the solved graph back to client-facing types.
//!
//! Two decoding disciplines:
//!
//! - *Acyclic*: a memoized depth-first walk. Used for client results when
//!   recursive types are disabled; the occurs check has already ruled
//!   cycles out, so the walk terminates and shared subgraphs decode to
//!   equal types.
//! - *Cyclic*: no cross-call memo; a class revisited during its own
//!   decoding closes the cycle with a `mu` binder. Used for client
//!   results under rectypes, and unconditionally for error payloads
//!   (types at a failure site may be cyclic even in acyclic mode).
//!
//! Type-variable identities come from descriptor ids through
//! [`solver_tyvar`](crate::lang::Output::solver_tyvar), so one class
//! decodes to one variable everywhere it appears.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::constraint::Var;
use crate::generalize::RawScheme;
use crate::lang::Language;
use crate::solver::Solver;
use crate::unify::InferVar;

/// A decoded type scheme: the quantified variables and the body.
pub struct Scheme<L: Language> {
    /// The quantified (generic) type variables, in the order the solver
    /// generalized them -- the same order instantiation witnesses use.
    pub vars: Vec<L::TyVar>,
    /// The body; quantified variables may occur in it.
    pub ty: L::Ty,
}

impl<L: Language> Clone for Scheme<L> {
    fn clone(&self) -> Self {
        Scheme {
            vars: self.vars.clone(),
            ty: self.ty.clone(),
        }
    }
}

impl<L: Language> fmt::Debug for Scheme<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheme")
            .field("vars", &self.vars)
            .field("ty", &self.ty)
            .finish()
    }
}

/// Reads types out of a solved graph. Handed to the decoding
/// continuations after a successful solve.
pub(crate) struct Decoder<'s, L: Language> {
    solver: &'s mut Solver<L>,
    rectypes: bool,
    memo: FxHashMap<InferVar<L>, L::Ty>,
}

impl<'s, L: Language> Decoder<'s, L> {
    pub(crate) fn new(solver: &'s mut Solver<L>, rectypes: bool) -> Self {
        Decoder {
            solver,
            rectypes,
            memo: FxHashMap::default(),
        }
    }

    /// The decoded variable standing for `v`'s class.
    pub(crate) fn tyvar(&mut self, v: InferVar<L>) -> L::TyVar {
        let id = self.solver.ctx.descriptor(v).id;
        L::solver_tyvar(id)
    }

    /// Decode a constraint-time name.
    pub(crate) fn decode_name(&mut self, var: Var) -> L::Ty {
        let key = self.solver.key(var);
        self.decode(key)
    }

    /// Decode a class in the mode the solve ran under.
    pub(crate) fn decode(&mut self, v: InferVar<L>) -> L::Ty {
        if self.rectypes {
            self.decode_cyclic(v)
        } else {
            self.decode_acyclic(v)
        }
    }

    /// Decode a scheme: its quantifiers as variables, then its body.
    pub(crate) fn decode_scheme(&mut self, scheme: &RawScheme<L>) -> Scheme<L> {
        let vars = scheme
            .quantifiers
            .iter()
            .map(|&q| self.tyvar(q))
            .collect();
        let ty = self.decode(scheme.root);
        Scheme { vars, ty }
    }

    fn decode_acyclic(&mut self, v: InferVar<L>) -> L::Ty {
        let root = self.solver.ctx.root(v);
        if let Some(ty) = self.memo.get(&root) {
            return ty.clone();
        }
        let desc = self.solver.ctx.descriptor(root);
        let ty = match desc.shape {
            None => L::variable(L::solver_tyvar(desc.id)),
            Some(shape) => {
                let decoded = L::map(&shape, |child| self.decode_acyclic(*child));
                L::structure(decoded)
            }
        };
        self.memo.insert(root, ty.clone());
        ty
    }

    /// Decode a class that may sit on a cycle. Error payloads always go
    /// through here, whatever mode the solve ran under.
    pub(crate) fn decode_cyclic(&mut self, v: InferVar<L>) -> L::Ty {
        let mut active = FxHashSet::default();
        let mut looped = FxHashSet::default();
        self.cyclic_at(v, &mut active, &mut looped)
    }

    fn cyclic_at(
        &mut self,
        v: InferVar<L>,
        active: &mut FxHashSet<InferVar<L>>,
        looped: &mut FxHashSet<InferVar<L>>,
    ) -> L::Ty {
        let root = self.solver.ctx.root(v);
        if active.contains(&root) {
            // Back-edge: stand in with the variable; the frame that owns
            // `root` will wrap its body in the matching `mu`.
            looped.insert(root);
            let var = self.tyvar(root);
            return L::variable(var);
        }
        let desc = self.solver.ctx.descriptor(root);
        match desc.shape {
            None => L::variable(L::solver_tyvar(desc.id)),
            Some(shape) => {
                active.insert(root);
                let decoded = L::map(&shape, |child| self.cyclic_at(*child, active, looped));
                active.remove(&root);
                let body = L::structure(decoded);
                if looped.remove(&root) {
                    L::mu(L::solver_tyvar(desc.id), body)
                } else {
                    body
                }
            }
        }
    }
}
