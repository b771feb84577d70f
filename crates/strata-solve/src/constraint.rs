//! The constraint tree and its supporting plumbing.
//!
//! Constraints are built up front by the combinators in [`crate::infer`]
//! and consumed exactly once by the solver. Three pieces of plumbing
//! connect the two phases:
//!
//! - [`Var`]: construction-time names for inference variables. Names are
//!   minted from a process-wide counter; the solver maps each name to a
//!   union-find key when its binder (`Exist` or `Let`) is reached.
//! - [`Slot`]: write-once cells through which the solver deposits results
//!   (schemes, generalizable variables, instantiation witnesses) for the
//!   decoding continuation to pick up after solving.
//! - [`DeepTy`]: finite shape trees, lowered to a chain of existentials.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::generalize::RawScheme;
use crate::lang::Language;
use crate::unify::InferVar;

// ── Variable names ─────────────────────────────────────────────────────

static NEXT_VAR: AtomicU64 = AtomicU64::new(0);

/// A named inference variable, as seen while a constraint is being built.
///
/// A `Var` is only a name: it carries no solver state. It becomes usable
/// once the constraint that binds it (an existential or a `let` binding)
/// is solved; using a name under a different `solve` call than the one
/// that binds it is a programmer error and panics.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(u64);

impl Var {
    /// Mint a fresh name. Names are unique for the lifetime of the
    /// process, so constraints built concurrently never collide.
    pub(crate) fn fresh() -> Var {
        Var(NEXT_VAR.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

// ── Write-once slots ───────────────────────────────────────────────────

enum SlotState<V> {
    Empty,
    Full(V),
    Consumed,
}

/// A write-once cell shared between a constraint node and the decoding
/// continuation that consumes its result.
///
/// The solver fills each slot exactly once while walking the constraint;
/// the continuation takes the value exactly once while decoding. Any
/// other access order is a bug in the solver protocol and panics.
pub(crate) struct Slot<V> {
    what: &'static str,
    cell: Rc<RefCell<SlotState<V>>>,
}

impl<V> Slot<V> {
    pub(crate) fn new(what: &'static str) -> Slot<V> {
        Slot {
            what,
            cell: Rc::new(RefCell::new(SlotState::Empty)),
        }
    }

    /// Deposit the solver's result. Panics if the slot was already written.
    pub(crate) fn fill(&self, value: V) {
        let mut state = self.cell.borrow_mut();
        match *state {
            SlotState::Empty => *state = SlotState::Full(value),
            _ => panic!("{} slot written twice", self.what),
        }
    }

    /// Consume the result. Panics if the solver never wrote the slot, or
    /// if it was already consumed.
    pub(crate) fn take(&self) -> V {
        let mut state = self.cell.borrow_mut();
        match std::mem::replace(&mut *state, SlotState::Consumed) {
            SlotState::Full(value) => value,
            SlotState::Empty => panic!("{} slot read before the solver filled it", self.what),
            SlotState::Consumed => panic!("{} slot read twice", self.what),
        }
    }
}

impl<V> Clone for Slot<V> {
    fn clone(&self) -> Self {
        Slot {
            what: self.what,
            cell: Rc::clone(&self.cell),
        }
    }
}

// ── The constraint tree ────────────────────────────────────────────────

/// One `let` binding: a term variable, the name of its body type, and the
/// slot that will receive its generalized scheme.
pub(crate) struct LetBinding<L: Language> {
    pub name: L::TeVar,
    pub var: Var,
    pub scheme: Slot<RawScheme<L>>,
}

/// The constraint tree consumed by the low-level solver.
pub(crate) enum RawCo<L: Language> {
    /// Trivially satisfied.
    True,
    /// Both must hold; solved strictly left to right.
    Conj(Box<RawCo<L>>, Box<RawCo<L>>),
    /// The two variables denote the same type.
    Eq(Var, Var),
    /// Bind `var` to a fresh inference variable, optionally carrying one
    /// layer of structure, then solve the body.
    Exist {
        var: Var,
        shape: Option<L::Shape<Var>>,
        body: Box<RawCo<L>>,
    },
    /// Instantiate the scheme bound to `name` and unify the instance with
    /// `var`; the fresh copies of the quantifiers land in `witnesses`.
    Instance {
        name: L::TeVar,
        var: Var,
        witnesses: Slot<Vec<InferVar<L>>>,
    },
    /// Bind `name` monomorphically to `var` while solving the body.
    Def {
        name: L::TeVar,
        var: Var,
        body: Box<RawCo<L>>,
    },
    /// Enter a generalization scope: solve `left` under the fresh binding
    /// variables, generalize, bind the schemes, then solve `right`.
    Let {
        bindings: Vec<LetBinding<L>>,
        left: Box<RawCo<L>>,
        right: Box<RawCo<L>>,
        generalizable: Slot<Vec<InferVar<L>>>,
    },
    /// Attach a source range to errors raised while solving the body.
    Range(L::Range, Box<RawCo<L>>),
}

// ── Deep types ─────────────────────────────────────────────────────────

/// A finite tree of shapes over existing variable names.
///
/// `build` lowers a deep type to a bundle of existentially bound shallow
/// variables chained by shape equalities, so clients can state a complex
/// type in one expression instead of nesting `construct` calls by hand.
pub enum DeepTy<L: Language> {
    /// A leaf referring to a variable already in scope.
    Var(Var),
    /// One layer of structure over deeper trees.
    Structure(L::Shape<Box<DeepTy<L>>>),
}

impl<L: Language> Clone for DeepTy<L> {
    fn clone(&self) -> Self {
        match self {
            DeepTy::Var(v) => DeepTy::Var(*v),
            DeepTy::Structure(s) => DeepTy::Structure(s.clone()),
        }
    }
}

// Manual impl; a derive would demand `L: Debug`.
impl<L: Language> fmt::Debug for DeepTy<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeepTy::Var(v) => write!(f, "{:?}", v),
            DeepTy::Structure(s) => write!(f, "{:?}", s),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let a = Var::fresh();
        let b = Var::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn slot_round_trip() {
        let slot: Slot<u32> = Slot::new("test");
        slot.fill(7);
        assert_eq!(slot.take(), 7);
    }

    #[test]
    fn slot_clones_share_the_cell() {
        let slot: Slot<&'static str> = Slot::new("test");
        let alias = slot.clone();
        slot.fill("shared");
        assert_eq!(alias.take(), "shared");
    }

    #[test]
    #[should_panic(expected = "written twice")]
    fn slot_rejects_a_second_write() {
        let slot: Slot<u32> = Slot::new("test");
        slot.fill(1);
        slot.fill(2);
    }

    #[test]
    #[should_panic(expected = "before the solver filled it")]
    fn slot_rejects_an_early_read() {
        let slot: Slot<u32> = Slot::new("test");
        slot.take();
    }

    #[test]
    #[should_panic(expected = "read twice")]
    fn slot_rejects_a_second_read() {
        let slot: Slot<u32> = Slot::new("test");
        slot.fill(1);
        slot.take();
        slot.take();
    }
}
