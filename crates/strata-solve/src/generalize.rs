//! Level-driven let-generalization (Remy's algorithm).
//!
//! Each open `let` scope owns a pool of the variables introduced at its
//! level. Closing a scope runs the generalization pass:
//!
//! 1. *Adjust*: one memoized walk over the closing pool, in ascending
//!    level order. Levels propagate both ways -- downward, everything
//!    reachable from a class that escaped to an enclosing level is
//!    dragged along with it (it is visible outside the scope and must
//!    not be quantified); upward, a structured class sinks to the
//!    maximum of its children's levels, so skeletons whose leaves all
//!    escaped are shared rather than quantified.
//! 2. *Partition*: classes still at the closing level become generic;
//!    classes whose level dropped are re-registered in the pool they now
//!    belong to.
//! 3. *Schemes*: per root, the structureless generic classes reachable
//!    from it become the scheme's quantifiers. Instantiation later
//!    copies the generic region and shares the rest.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::lang::Language;
use crate::unify::{shape_children, InferCtx, InferVar, GENERIC, OUTERMOST};

/// A generalized type scheme, still in graph form.
pub(crate) struct RawScheme<L: Language> {
    /// The structureless generic classes reachable from the root, in
    /// traversal order. Instantiation substitutes a fresh variable for
    /// each; the substitutes are the instantiation witnesses.
    pub quantifiers: Vec<InferVar<L>>,
    /// The scheme's body.
    pub root: InferVar<L>,
}

impl<L: Language> RawScheme<L> {
    /// The trivial scheme with no quantifiers, used for `def` bindings.
    pub(crate) fn mono(root: InferVar<L>) -> Self {
        RawScheme {
            quantifiers: Vec::new(),
            root,
        }
    }
}

impl<L: Language> Clone for RawScheme<L> {
    fn clone(&self) -> Self {
        RawScheme {
            quantifiers: self.quantifiers.clone(),
            root: self.root,
        }
    }
}

impl<L: Language> InferCtx<L> {
    /// Open a new generalization scope.
    pub(crate) fn enter(&mut self) {
        self.pools.push(Vec::new());
    }

    /// Close the current scope, generalizing what stayed in it.
    ///
    /// Returns one scheme per root, plus the union of their quantifiers
    /// in first-appearance order (the scope's generalizable variables).
    pub(crate) fn exit(
        &mut self,
        roots: &[InferVar<L>],
    ) -> (Vec<RawScheme<L>>, Vec<InferVar<L>>) {
        let closing = self.current_level();
        let pool = self.pools.pop().expect("a scope is open");

        // Deduplicate the pool down to class representatives; unification
        // leaves multiple entries per class behind.
        let mut young = Vec::with_capacity(pool.len());
        let mut seen = FxHashSet::default();
        for v in pool {
            let root = self.root(v);
            if seen.insert(root) {
                young.push(root);
            }
        }

        // Ascending level order makes a single clamped pass sufficient:
        // once the sources at level r have been traversed, everything
        // reachable at or below r is final.
        young.sort_by_key(|&v| self.table.probe_value(v).level);

        let mut visited = FxHashSet::default();
        for &v in &young {
            let level = self.descriptor(v).level;
            self.adjust(v, level, &mut visited);
        }

        // Partition: still-at-level classes become generic; the rest
        // escaped and re-register where they now live.
        for &v in &young {
            let desc = self.descriptor(v);
            if desc.level < closing {
                self.pools[desc.level as usize].push(v);
            } else {
                debug_assert_eq!(desc.level, closing);
                self.set_level(v, GENERIC);
            }
        }

        let mut schemes = Vec::with_capacity(roots.len());
        let mut generalizable = Vec::new();
        let mut reported = FxHashSet::default();
        for &root in roots {
            let scheme = self.schemify(root);
            for &q in &scheme.quantifiers {
                if reported.insert(q) {
                    generalizable.push(q);
                }
            }
            schemes.push(scheme);
        }
        (schemes, generalizable)
    }

    /// Settle the level of `v`'s class and everything reachable from it.
    ///
    /// `clamp` is the lowest level seen on the path from the traversal
    /// source; reachability from a low class drags the whole region down
    /// to it. Structured classes additionally sink to the maximum of
    /// their children's settled levels. Returns the settled level.
    fn adjust(
        &mut self,
        v: InferVar<L>,
        clamp: u32,
        visited: &mut FxHashSet<InferVar<L>>,
    ) -> u32 {
        let root = self.root(v);
        let desc = self.descriptor(root);
        if visited.contains(&root) {
            // Already settled: ascending source order guarantees no later
            // traversal carries a clamp below a settled level.
            return desc.level;
        }
        visited.insert(root);
        let clamped = desc.level.min(clamp);
        match desc.shape {
            None => {
                if clamped < desc.level {
                    self.set_level(root, clamped);
                }
                clamped
            }
            Some(shape) => {
                let mut child_max = OUTERMOST;
                for child in shape_children::<L>(&shape) {
                    child_max = child_max.max(self.adjust(child, clamped, visited));
                }
                let settled = clamped.min(child_max);
                if settled < desc.level {
                    self.set_level(root, settled);
                }
                settled
            }
        }
    }

    fn schemify(&mut self, body: InferVar<L>) -> RawScheme<L> {
        let mut quantifiers = Vec::new();
        let mut visited = FxHashSet::default();
        self.collect_quantifiers(body, &mut visited, &mut quantifiers);
        RawScheme {
            quantifiers,
            root: body,
        }
    }

    /// Structureless generic classes reachable from `v`, in order.
    fn collect_quantifiers(
        &mut self,
        v: InferVar<L>,
        visited: &mut FxHashSet<InferVar<L>>,
        out: &mut Vec<InferVar<L>>,
    ) {
        let root = self.root(v);
        if !visited.insert(root) {
            return;
        }
        let desc = self.descriptor(root);
        if desc.level != GENERIC {
            // A shared, monomorphic region; nothing under it quantifies.
            return;
        }
        match desc.shape {
            None => out.push(root),
            Some(shape) => {
                for child in shape_children::<L>(&shape) {
                    self.collect_quantifiers(child, visited, out);
                }
            }
        }
    }

    // ── Instantiation ──────────────────────────────────────────────────

    /// Take a fresh instance of a scheme at the current level.
    ///
    /// Returns the instance's root together with the witnesses: the fresh
    /// substitutes for the quantifiers, in quantifier order.
    pub(crate) fn instantiate(
        &mut self,
        scheme: &RawScheme<L>,
    ) -> (InferVar<L>, Vec<InferVar<L>>) {
        let mut mapping = FxHashMap::default();
        let root = self.copy(scheme.root, &mut mapping);
        let witnesses = scheme
            .quantifiers
            .iter()
            .map(|&q| self.copy(q, &mut mapping))
            .collect();
        (root, witnesses)
    }

    /// Copy the generic region reachable from `v`, sharing everything
    /// that is not generic. Memoized per instantiation, so sharing --
    /// and, under rectypes, cycles -- inside the scheme are preserved.
    fn copy(
        &mut self,
        v: InferVar<L>,
        mapping: &mut FxHashMap<InferVar<L>, InferVar<L>>,
    ) -> InferVar<L> {
        let root = self.root(v);
        let desc = self.descriptor(root);
        if desc.level != GENERIC {
            return root;
        }
        if let Some(&copied) = mapping.get(&root) {
            return copied;
        }
        let fresh = self.fresh(None);
        mapping.insert(root, fresh);
        if let Some(shape) = desc.shape {
            let copied_shape = L::map(&shape, |child| self.copy(*child, mapping));
            self.set_shape(fresh, copied_shape);
        }
        fresh
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{Mini, MiniShape};

    /// A context with the toplevel scope already open.
    fn ctx() -> InferCtx<Mini> {
        let mut ctx = InferCtx::new(false);
        ctx.enter();
        ctx
    }

    #[test]
    fn generalize_and_instantiate() {
        let mut ctx = ctx();
        ctx.enter();
        let a = ctx.fresh(None);
        let identity = ctx.fresh(Some(MiniShape::Arrow(a, a)));

        let (schemes, generalizable) = ctx.exit(&[identity]);
        assert_eq!(schemes.len(), 1);
        assert_eq!(schemes[0].quantifiers.len(), 1, "one quantified var");
        assert_eq!(generalizable, schemes[0].quantifiers);

        // Two instances use pairwise fresh variables.
        let (root1, ws1) = ctx.instantiate(&schemes[0]);
        let (root2, ws2) = ctx.instantiate(&schemes[0]);
        assert_ne!(ctx.root(root1), ctx.root(root2));
        assert_eq!(ws1.len(), 1);
        assert_eq!(ws2.len(), 1);
        assert_ne!(ctx.root(ws1[0]), ctx.root(ws2[0]));

        // Unifying one instance with int -> int leaves the other alone.
        let int1 = ctx.fresh(Some(MiniShape::Int));
        assert!(ctx.unify(ws1[0], int1).is_ok());
        assert!(ctx.descriptor(ws2[0]).shape.is_none());
    }

    #[test]
    fn direct_escape_is_not_generalized() {
        let mut ctx = ctx();
        let outer = ctx.fresh(None);
        ctx.enter();
        let v = ctx.fresh(None);
        assert!(ctx.unify(v, outer).is_ok());

        let (schemes, generalizable) = ctx.exit(&[v]);
        assert!(schemes[0].quantifiers.is_empty(), "escaped var is mono");
        assert!(generalizable.is_empty());
        assert_eq!(ctx.descriptor(v).level, OUTERMOST);
    }

    #[test]
    fn reachability_from_an_outer_class_blocks_generalization() {
        let mut ctx = ctx();
        let outer = ctx.fresh(None);
        ctx.enter();
        let arg = ctx.fresh(None);
        let res = ctx.fresh(None);
        let arrow = ctx.fresh(Some(MiniShape::Arrow(arg, res)));
        // The outer variable acquires the arrow's structure, so both
        // children are visible outside the scope.
        assert!(ctx.unify(outer, arrow).is_ok());

        let (schemes, generalizable) = ctx.exit(&[res]);
        assert!(schemes[0].quantifiers.is_empty());
        assert!(generalizable.is_empty());
        assert_eq!(ctx.descriptor(arg).level, OUTERMOST);
        assert_eq!(ctx.descriptor(res).level, OUTERMOST);
    }

    #[test]
    fn constant_skeletons_sink_and_are_shared() {
        let mut ctx = ctx();
        ctx.enter();
        let a = ctx.fresh(None);
        let int = ctx.fresh(Some(MiniShape::Int));
        let arrow = ctx.fresh(Some(MiniShape::Arrow(a, int)));

        let (schemes, _) = ctx.exit(&[arrow]);
        assert_eq!(schemes[0].quantifiers.len(), 1);
        // The nullary int node sank to the outermost level; an instance
        // shares it instead of copying.
        assert_eq!(ctx.descriptor(int).level, OUTERMOST);
        let (root, _) = ctx.instantiate(&schemes[0]);
        match ctx.descriptor(root).shape {
            Some(MiniShape::Arrow(_, result)) => {
                assert_eq!(ctx.root(result), ctx.root(int));
            }
            other => panic!("expected an arrow instance, got {:?}", other),
        }
    }

    #[test]
    fn sibling_roots_report_shared_quantifiers_once() {
        let mut ctx = ctx();
        ctx.enter();
        let a = ctx.fresh(None);
        let f = ctx.fresh(Some(MiniShape::Arrow(a, a)));
        let g = ctx.fresh(Some(MiniShape::Arrow(a, a)));

        let (schemes, generalizable) = ctx.exit(&[f, g]);
        assert_eq!(schemes[0].quantifiers.len(), 1);
        assert_eq!(schemes[1].quantifiers.len(), 1);
        assert_eq!(generalizable.len(), 1, "the shared quantifier is reported once");
    }
}
