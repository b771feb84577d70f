//! Type errors reported by [`solve`](crate::solve).
//!
//! Every error carries the innermost source range attached with
//! [`Infer::at`](crate::Infer::at), when one encloses the failing
//! constraint. Type payloads are decoded with the cyclic decoder: at the
//! moment a solve fails the graph may contain cycles even when recursive
//! types are disabled, and the report must still be a finite term.

use std::fmt;

use crate::lang::Language;

/// A type error. The first conflict aborts the solve; the decoding
/// continuation never runs on failure.
pub enum TypeError<L: Language> {
    /// Two types that should be equal have incompatible head
    /// constructors.
    Mismatch {
        expected: L::Ty,
        found: L::Ty,
        range: Option<L::Range>,
    },
    /// A unification variable occurs in its own structure while
    /// recursive types are disabled.
    InfiniteType {
        ty: L::Ty,
        range: Option<L::Range>,
    },
    /// An instantiation referenced a term variable with no binding in
    /// scope.
    UnboundVariable {
        name: L::TeVar,
        range: Option<L::Range>,
    },
}

impl<L: Language> fmt::Debug for TypeError<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::Mismatch {
                expected,
                found,
                range,
            } => f
                .debug_struct("Mismatch")
                .field("expected", expected)
                .field("found", found)
                .field("range", range)
                .finish(),
            TypeError::InfiniteType { ty, range } => f
                .debug_struct("InfiniteType")
                .field("ty", ty)
                .field("range", range)
                .finish(),
            TypeError::UnboundVariable { name, range } => f
                .debug_struct("UnboundVariable")
                .field("name", name)
                .field("range", range)
                .finish(),
        }
    }
}

impl<L: Language> fmt::Display for TypeError<L>
where
    L::Ty: fmt::Display,
    L::TeVar: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::Mismatch {
                expected, found, ..
            } => {
                write!(
                    f,
                    "type mismatch: expected `{}`, found `{}`",
                    expected, found
                )
            }
            TypeError::InfiniteType { ty, .. } => {
                write!(f, "infinite type: `{}`", ty)
            }
            TypeError::UnboundVariable { name, .. } => {
                write!(f, "unbound variable `{}`", name)
            }
        }
    }
}
