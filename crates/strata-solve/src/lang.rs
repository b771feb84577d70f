//! Capability traits supplied by the client language.
//!
//! The solver is generic over a single [`Language`] bound that bundles the
//! three things a front end must provide: the shallow shape of its type
//! constructors ([`Structure`]), the decoded type representation it wants
//! back ([`Output`]), and the identifiers it binds in the typing
//! environment. The solver never inspects any of these beyond the
//! operations declared here.

use std::fmt;
use std::hash::Hash;

/// Returned by [`Structure::conjunction`] when two shapes cannot be merged
/// because their head constructors or arities disagree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Incompatible;

/// The shallow shape of a type constructor.
///
/// `Shape<A>` describes one layer of a type whose children have type `A`:
/// for an ML-like language, something like `Arrow(A, A)` or `Pair(A, A)`.
/// The solver applies it at several child types -- inference variables
/// inside the graph, decoded types on the way out, deep trees during
/// constraint construction -- which is why it is a generic associated
/// type rather than a fixed container.
pub trait Structure: Sized + 'static {
    /// One layer of type structure with children of type `A`.
    type Shape<A: Clone + fmt::Debug + 'static>: Clone + fmt::Debug + 'static;

    /// Rebuild the same constructor, applying `f` to every child in order.
    fn map<A, B>(shape: &Self::Shape<A>, f: impl FnMut(&A) -> B) -> Self::Shape<B>
    where
        A: Clone + fmt::Debug + 'static,
        B: Clone + fmt::Debug + 'static;

    /// Visit every child in order.
    fn iter<A>(shape: &Self::Shape<A>, f: impl FnMut(&A))
    where
        A: Clone + fmt::Debug + 'static;

    /// Merge two shapes of the same constructor.
    ///
    /// When the heads agree, `merge` is invoked on each pair of
    /// corresponding children and the merged shape is returned. The
    /// callback only *records* the demand that the two children be equal;
    /// the unifier drains those demands afterwards, so implementations
    /// must not assume the children are already equal when they return.
    /// When the heads or arities disagree, the merge fails with
    /// [`Incompatible`].
    fn conjunction<A>(
        left: &Self::Shape<A>,
        right: &Self::Shape<A>,
        merge: impl FnMut(A, A),
    ) -> Result<Self::Shape<A>, Incompatible>
    where
        A: Copy + fmt::Debug + 'static;
}

/// The decoded, user-facing view of solved types.
///
/// The solver only ever *constructs* these values: a decoded variable via
/// [`variable`](Output::variable), one layer of structure via
/// [`structure`](Output::structure), and -- when recursive types are
/// enabled -- an equirecursive binder via [`mu`](Output::mu).
pub trait Output: Structure {
    /// A decoded type variable.
    type TyVar: Copy + Eq + Hash + fmt::Debug + 'static;

    /// A decoded type.
    type Ty: Clone + fmt::Debug + 'static;

    /// Inject a solver-chosen variable identity. Decoding the same
    /// unification variable always passes the same `id`, so clients get a
    /// stable correspondence between graph nodes and decoded variables.
    fn solver_tyvar(id: u32) -> Self::TyVar;

    /// The type consisting of a single variable.
    fn variable(v: Self::TyVar) -> Self::Ty;

    /// One layer of structure whose children are already decoded.
    fn structure(shape: Self::Shape<Self::Ty>) -> Self::Ty;

    /// The recursive type `mu v. body`, where `v` may occur in `body`.
    fn mu(v: Self::TyVar, body: Self::Ty) -> Self::Ty;
}

/// Everything the solver needs to know about the client language.
///
/// Implemented on a marker type; the solver threads the single bound
/// `L: Language` everywhere instead of three separate type parameters.
pub trait Language: Output {
    /// Term variables -- the keys of the typing environment.
    type TeVar: Clone + Eq + Hash + fmt::Debug + 'static;

    /// An opaque source range, threaded through to errors but never
    /// interpreted by the solver.
    type Range: Clone + fmt::Debug + 'static;
}
