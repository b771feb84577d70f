//! Constraint-based Hindley-Milner type inference with level-driven
//! let-generalization.
//!
//! A front end describes its typing problem as a constraint -- equations
//! between inference variables, existential bindings, instantiations of
//! bound schemes, and generalizing `let` scopes -- using the applicative
//! combinators ([`exist`], [`def`], [`let1`], ...). Solving runs
//! destructive unification over a
//! union-find graph (the `ena` table) whose classes carry generalization
//! levels in the style of Remy: leaving a `let` scope quantifies exactly
//! the variables that stayed at the scope's level. After a successful
//! solve, the continuation paired with the constraint decodes types,
//! schemes, and instantiation witnesses back into the client's own
//! representation.
//!
//! The client plugs in through the [`Language`] trait stack: its term
//! variables, the shallow [`Shape`](Structure::Shape) of its type
//! constructors, and the decoded types it wants back. Recursive types
//! are opt-in per solve: with `rectypes` disabled the occurs check
//! rejects cycles, with it enabled they decode as `mu` types. The
//! integration tests drive the whole pipeline from a small λ-calculus
//! front end.

mod constraint;
mod decode;
mod error;
mod generalize;
mod infer;
mod lang;
mod solver;
mod unify;

pub use constraint::{DeepTy, Var};
pub use decode::Scheme;
pub use error::TypeError;
pub use infer::{
    build, construct, def, eq, exist, exist_, has_shape, instance, instance_, let0, let1, letn,
    pure, solve, Infer,
};
pub use lang::{Incompatible, Language, Output, Structure};

// ── Test fixture ───────────────────────────────────────────────────────

/// A miniature client language (arrows and `int`) shared by the unit
/// tests. The integration tests carry their own, richer client.
#[cfg(test)]
pub(crate) mod fixture {
    use std::fmt;

    use crate::lang::{Incompatible, Language, Output, Structure};

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum MiniShape<A> {
        Arrow(A, A),
        Int,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum MiniTy {
        Var(u32),
        Arrow(Box<MiniTy>, Box<MiniTy>),
        Int,
        Mu(u32, Box<MiniTy>),
    }

    /// Marker type implementing the trait stack.
    pub struct Mini;

    impl Structure for Mini {
        type Shape<A: Clone + fmt::Debug + 'static> = MiniShape<A>;

        fn map<A, B>(shape: &MiniShape<A>, mut f: impl FnMut(&A) -> B) -> MiniShape<B>
        where
            A: Clone + fmt::Debug + 'static,
            B: Clone + fmt::Debug + 'static,
        {
            match shape {
                MiniShape::Arrow(domain, codomain) => MiniShape::Arrow(f(domain), f(codomain)),
                MiniShape::Int => MiniShape::Int,
            }
        }

        fn iter<A>(shape: &MiniShape<A>, mut f: impl FnMut(&A))
        where
            A: Clone + fmt::Debug + 'static,
        {
            match shape {
                MiniShape::Arrow(domain, codomain) => {
                    f(domain);
                    f(codomain);
                }
                MiniShape::Int => {}
            }
        }

        fn conjunction<A>(
            left: &MiniShape<A>,
            right: &MiniShape<A>,
            mut merge: impl FnMut(A, A),
        ) -> Result<MiniShape<A>, Incompatible>
        where
            A: Copy + fmt::Debug + 'static,
        {
            match (left, right) {
                (MiniShape::Arrow(d1, c1), MiniShape::Arrow(d2, c2)) => {
                    merge(*d1, *d2);
                    merge(*c1, *c2);
                    Ok(MiniShape::Arrow(*d1, *c1))
                }
                (MiniShape::Int, MiniShape::Int) => Ok(MiniShape::Int),
                _ => Err(Incompatible),
            }
        }
    }

    impl Output for Mini {
        type TyVar = u32;
        type Ty = MiniTy;

        fn solver_tyvar(id: u32) -> u32 {
            id
        }

        fn variable(v: u32) -> MiniTy {
            MiniTy::Var(v)
        }

        fn structure(shape: MiniShape<MiniTy>) -> MiniTy {
            match shape {
                MiniShape::Arrow(domain, codomain) => {
                    MiniTy::Arrow(Box::new(domain), Box::new(codomain))
                }
                MiniShape::Int => MiniTy::Int,
            }
        }

        fn mu(v: u32, body: MiniTy) -> MiniTy {
            MiniTy::Mu(v, Box::new(body))
        }
    }

    impl Language for Mini {
        type TeVar = &'static str;
        type Range = (u32, u32);
    }
}
