//! Destructive first-order unification over a union-find graph.
//!
//! Every inference variable is a key in an `ena` union-find table. The
//! class descriptor carries a stable identity (`id`), the generalization
//! level at which the class currently lives, and at most one layer of
//! structure whose children are other variables. Unifying two classes
//! links them, keeps the lower level (promoting the class toward the
//! enclosing scope), and merges their structure through the client's
//! [`conjunction`](crate::lang::Structure::conjunction).
//!
//! With recursive types disabled, every successful top-level unification
//! is followed by an occurs check: a tri-color depth-first walk that
//! rejects graphs in which a class is reachable from its own structure.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use ena::unify::{InPlaceUnificationTable, NoError, UnifyKey, UnifyValue};
use rustc_hash::FxHashMap;

use crate::lang::Language;

/// The level assigned to variables quantified by a scheme when their
/// scope is generalized. Generic classes are no longer in any pool; they
/// are copied, never unified.
pub(crate) const GENERIC: u32 = u32::MAX;

/// The level of the outermost scope, opened by the toplevel `let0`.
pub(crate) const OUTERMOST: u32 = 0;

// ── Keys and descriptors ───────────────────────────────────────────────

/// An inference variable: a key into the union-find table.
pub(crate) struct InferVar<L: Language> {
    index: u32,
    _lang: PhantomData<fn() -> L>,
}

impl<L: Language> InferVar<L> {
    fn new(index: u32) -> Self {
        InferVar {
            index,
            _lang: PhantomData,
        }
    }
}

// Manual impls: a derive would also bound `L`, which is only a marker.
impl<L: Language> Clone for InferVar<L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L: Language> Copy for InferVar<L> {}

impl<L: Language> PartialEq for InferVar<L> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<L: Language> Eq for InferVar<L> {}

impl<L: Language> Hash for InferVar<L> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<L: Language> fmt::Debug for InferVar<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}", self.index)
    }
}

impl<L: Language> UnifyKey for InferVar<L> {
    type Value = Descriptor<L>;

    fn index(&self) -> u32 {
        self.index
    }

    fn from_index(u: u32) -> Self {
        InferVar::new(u)
    }

    fn tag() -> &'static str {
        "InferVar"
    }
}

/// What the union-find table knows about one equivalence class.
pub(crate) struct Descriptor<L: Language> {
    /// Stable identity, assigned at allocation. Unification keeps the id
    /// of the surviving side, so the id is per class, not per key, and
    /// decoding the class always yields the same type variable.
    pub id: u32,
    /// Generalization level. Only ever lowered, until the class's scope
    /// is generalized and the level becomes [`GENERIC`].
    pub level: u32,
    /// At most one layer of structure; `None` is an unknown type.
    pub shape: Option<L::Shape<InferVar<L>>>,
}

impl<L: Language> Clone for Descriptor<L> {
    fn clone(&self) -> Self {
        Descriptor {
            id: self.id,
            level: self.level,
            shape: self.shape.clone(),
        }
    }
}

impl<L: Language> fmt::Debug for Descriptor<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.id)
            .field("level", &self.level)
            .field("shape", &self.shape)
            .finish()
    }
}

/// The table's own merge is last-write-wins: [`InferCtx::unify`] computes
/// every merged descriptor itself, so the level and structure rules live
/// in one place instead of being split between the solver and `ena`.
impl<L: Language> UnifyValue for Descriptor<L> {
    type Error = NoError;

    fn unify_values(_old: &Self, new: &Self) -> Result<Self, NoError> {
        Ok(new.clone())
    }
}

// ── Failures ───────────────────────────────────────────────────────────

/// A failed unification, carrying the variables involved. The solver
/// attaches the ambient source range and decodes the types for reporting.
pub(crate) enum UnifyError<L: Language> {
    /// The head constructors of the two classes disagree.
    Clash(InferVar<L>, InferVar<L>),
    /// The unification created a cycle while recursive types are disabled.
    Occurs(InferVar<L>),
}

// ── The inference context ──────────────────────────────────────────────

/// Owns the union-find table and the pool stack for one solver run.
pub(crate) struct InferCtx<L: Language> {
    pub(crate) table: InPlaceUnificationTable<InferVar<L>>,
    /// Pool `r` holds the live representatives introduced at (or lowered
    /// to) level `r`. The innermost open scope is the last pool.
    pub(crate) pools: Vec<Vec<InferVar<L>>>,
    /// Whether cyclic types are permitted.
    rectypes: bool,
}

impl<L: Language> InferCtx<L> {
    pub(crate) fn new(rectypes: bool) -> Self {
        InferCtx {
            table: InPlaceUnificationTable::new(),
            pools: Vec::new(),
            rectypes,
        }
    }

    /// The level of the innermost open scope.
    pub(crate) fn current_level(&self) -> u32 {
        assert!(
            !self.pools.is_empty(),
            "no generalization scope is open; constraints must start with let0"
        );
        (self.pools.len() - 1) as u32
    }

    /// Allocate a fresh variable at the current level and register it in
    /// the current pool.
    pub(crate) fn fresh(&mut self, shape: Option<L::Shape<InferVar<L>>>) -> InferVar<L> {
        let level = self.current_level();
        let id = self.table.len() as u32;
        let var = self.table.new_key(Descriptor { id, level, shape });
        self.pools.last_mut().expect("a scope is open").push(var);
        var
    }

    /// The representative of `v`'s class.
    pub(crate) fn root(&mut self, v: InferVar<L>) -> InferVar<L> {
        self.table.find(v)
    }

    /// A copy of the descriptor of `v`'s class.
    pub(crate) fn descriptor(&mut self, v: InferVar<L>) -> Descriptor<L> {
        self.table.probe_value(v)
    }

    pub(crate) fn set_level(&mut self, v: InferVar<L>, level: u32) {
        let root = self.table.find(v);
        let mut desc = self.table.probe_value(root);
        desc.level = level;
        self.table.union_value(root, desc);
    }

    pub(crate) fn set_shape(&mut self, v: InferVar<L>, shape: L::Shape<InferVar<L>>) {
        let root = self.table.find(v);
        let mut desc = self.table.probe_value(root);
        debug_assert!(desc.shape.is_none(), "shape assigned twice");
        desc.shape = Some(shape);
        self.table.union_value(root, desc);
    }

    // ── Unification ────────────────────────────────────────────────────

    /// Unify two variables. With recursive types disabled, a successful
    /// unification is followed by an occurs check from the merged class.
    pub(crate) fn unify(
        &mut self,
        left: InferVar<L>,
        right: InferVar<L>,
    ) -> Result<(), UnifyError<L>> {
        self.unify_classes(left, right)?;
        if !self.rectypes {
            self.occurs_check(left)?;
        }
        Ok(())
    }

    fn unify_classes(
        &mut self,
        left: InferVar<L>,
        right: InferVar<L>,
    ) -> Result<(), UnifyError<L>> {
        let left_root = self.table.find(left);
        let right_root = self.table.find(right);
        if left_root == right_root {
            return Ok(());
        }
        let left_desc = self.table.probe_value(left_root);
        let right_desc = self.table.probe_value(right_root);

        // The lower-level side survives: its id becomes the class identity
        // and its level keeps the class alive in the enclosing scope. Ties
        // keep the left.
        let (id, level) = if left_desc.level <= right_desc.level {
            (left_desc.id, left_desc.level)
        } else {
            (right_desc.id, right_desc.level)
        };

        let mut pending: Vec<(InferVar<L>, InferVar<L>)> = Vec::new();
        let shape = match (left_desc.shape, right_desc.shape) {
            (None, None) => None,
            (Some(shape), None) | (None, Some(shape)) => Some(shape),
            (Some(left_shape), Some(right_shape)) => Some(
                L::conjunction(&left_shape, &right_shape, |a, b| pending.push((a, b)))
                    .map_err(|_| UnifyError::Clash(left, right))?,
            ),
        };

        // Link before draining the queued child demands: a re-entrant
        // demand on an already-linked pair is then a no-op, which bounds
        // the recursion by the number of classes.
        self.table.union_value(left_root, Descriptor { id, level, shape });
        self.table.union(right_root, left_root);
        for (a, b) in pending {
            self.unify_classes(a, b)?;
        }
        Ok(())
    }

    // ── Occurs check ───────────────────────────────────────────────────

    /// Reject graphs in which a class is reachable from its own
    /// structure. Tri-color depth-first walk: re-encountering a grey
    /// class means the walk is inside a cycle through it.
    pub(crate) fn occurs_check(&mut self, start: InferVar<L>) -> Result<(), UnifyError<L>> {
        let mut colors = FxHashMap::default();
        self.occurs_visit(start, &mut colors)
    }

    fn occurs_visit(
        &mut self,
        v: InferVar<L>,
        colors: &mut FxHashMap<InferVar<L>, Color>,
    ) -> Result<(), UnifyError<L>> {
        let root = self.table.find(v);
        match colors.get(&root) {
            Some(Color::Black) => return Ok(()),
            Some(Color::Grey) => return Err(UnifyError::Occurs(root)),
            None => {}
        }
        match self.table.probe_value(root).shape {
            None => {
                colors.insert(root, Color::Black);
            }
            Some(shape) => {
                colors.insert(root, Color::Grey);
                for child in shape_children::<L>(&shape) {
                    self.occurs_visit(child, colors)?;
                }
                colors.insert(root, Color::Black);
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Color {
    Grey,
    Black,
}

/// Collect the children of a shape, in order.
pub(crate) fn shape_children<L: Language>(shape: &L::Shape<InferVar<L>>) -> Vec<InferVar<L>> {
    let mut children = Vec::new();
    L::iter(shape, |child| children.push(*child));
    children
}

// ── Tests ──────────────────────────────────────────────────────────────
