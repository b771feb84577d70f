//! The applicative constraint-building API.
//!
//! An [`Infer<L, T>`] pairs a constraint with the continuation that reads
//! a `T` back out of the solved graph. The combinators below compose both
//! halves at once, so a front end writes inference in one pass and stays
//! oblivious to the two-phase evaluation underneath: constraints are
//! solved first, continuations run afterwards against the decoder.
//!
//! The interface is deliberately applicative, not monadic: there is no
//! `and_then`. The shape of the constraint must be known before solving
//! starts, so a continuation can never observe a solved type while the
//! constraint is still being built.

use crate::constraint::{DeepTy, LetBinding, RawCo, Slot, Var};
use crate::decode::{Decoder, Scheme};
use crate::error::TypeError;
use crate::lang::Language;
use crate::solver::{Fault, Solver};

pub(crate) type Cont<L, T> = Box<dyn for<'a> FnOnce(&mut Decoder<'a, L>) -> T>;

/// A constraint paired with the continuation that decodes its solution.
pub struct Infer<L: Language, T> {
    raw: RawCo<L>,
    cont: Cont<L, T>,
}

impl<L: Language, T: 'static> Infer<L, T> {
    /// Conjunction: both constraints must hold, solved left to right.
    pub fn and<U: 'static>(self, other: Infer<L, U>) -> Infer<L, (T, U)> {
        let Infer { raw: left_raw, cont: left } = self;
        let Infer { raw: right_raw, cont: right } = other;
        Infer {
            raw: RawCo::Conj(Box::new(left_raw), Box::new(right_raw)),
            cont: Box::new(move |decoder| {
                let a = left(decoder);
                let b = right(decoder);
                (a, b)
            }),
        }
    }

    /// Transform the decoded result; the constraint is unchanged.
    pub fn map<U: 'static>(self, f: impl FnOnce(T) -> U + 'static) -> Infer<L, U> {
        let Infer { raw, cont } = self;
        Infer {
            raw,
            cont: Box::new(move |decoder| f(cont(decoder))),
        }
    }

    /// Attach a source range to errors raised inside this constraint.
    pub fn at(self, range: L::Range) -> Infer<L, T> {
        let Infer { raw, cont } = self;
        Infer {
            raw: RawCo::Range(range, Box::new(raw)),
            cont,
        }
    }
}

/// The trivially satisfied constraint, decoding to `value`.
pub fn pure<L: Language, T: 'static>(value: T) -> Infer<L, T> {
    Infer {
        raw: RawCo::True,
        cont: Box::new(move |_| value),
    }
}

/// Demand that two variables denote the same type.
pub fn eq<L: Language>(left: Var, right: Var) -> Infer<L, ()> {
    Infer {
        raw: RawCo::Eq(left, right),
        cont: Box::new(|_| ()),
    }
}

/// Bind a fresh inference variable around `f`'s constraint; the result
/// pairs the variable's decoded type with `f`'s result.
pub fn exist<L: Language, T: 'static>(
    f: impl FnOnce(Var) -> Infer<L, T>,
) -> Infer<L, (L::Ty, T)> {
    let var = Var::fresh();
    let Infer { raw, cont } = f(var);
    Infer {
        raw: RawCo::Exist {
            var,
            shape: None,
            body: Box::new(raw),
        },
        cont: Box::new(move |decoder| {
            let ty = decoder.decode_name(var);
            let value = cont(decoder);
            (ty, value)
        }),
    }
}

/// Like [`exist`], but does not decode the variable. Use it when the
/// type is not needed; it skips the decoding work.
pub fn exist_<L: Language, T: 'static>(f: impl FnOnce(Var) -> Infer<L, T>) -> Infer<L, T> {
    let var = Var::fresh();
    let Infer { raw, cont } = f(var);
    Infer {
        raw: RawCo::Exist {
            var,
            shape: None,
            body: Box::new(raw),
        },
        cont,
    }
}

/// Bind a fresh variable already carrying one layer of structure.
pub fn construct<L: Language, T: 'static>(
    shape: L::Shape<Var>,
    f: impl FnOnce(Var) -> Infer<L, T>,
) -> Infer<L, (L::Ty, T)> {
    let var = Var::fresh();
    let Infer { raw, cont } = f(var);
    Infer {
        raw: RawCo::Exist {
            var,
            shape: Some(shape),
            body: Box::new(raw),
        },
        cont: Box::new(move |decoder| {
            let ty = decoder.decode_name(var);
            let value = cont(decoder);
            (ty, value)
        }),
    }
}

/// Demand that `var` have the given shape: a fresh structured variable
/// is bound and equated with it.
pub fn has_shape<L: Language>(var: Var, shape: L::Shape<Var>) -> Infer<L, ()> {
    let witness = Var::fresh();
    Infer {
        raw: RawCo::Exist {
            var: witness,
            shape: Some(shape),
            body: Box::new(RawCo::Eq(var, witness)),
        },
        cont: Box::new(|_| ()),
    }
}

/// Lower a deep shape tree to a chain of existentials and hand its root
/// to `f`. Children are bound outside their parents, so every shape
/// refers only to variables already in scope.
pub fn build<L: Language, T: 'static>(
    deep: DeepTy<L>,
    f: impl FnOnce(Var) -> Infer<L, T>,
) -> Infer<L, T> {
    let mut intros: Vec<(Var, L::Shape<Var>)> = Vec::new();
    let root = flatten::<L>(deep, &mut intros);
    let inner = f(root);
    let mut raw = inner.raw;
    for (var, shape) in intros.into_iter().rev() {
        raw = RawCo::Exist {
            var,
            shape: Some(shape),
            body: Box::new(raw),
        };
    }
    Infer {
        raw,
        cont: inner.cont,
    }
}

fn flatten<L: Language>(deep: DeepTy<L>, intros: &mut Vec<(Var, L::Shape<Var>)>) -> Var {
    match deep {
        DeepTy::Var(var) => var,
        DeepTy::Structure(shape) => {
            let shallow = L::map(&shape, |child| flatten::<L>((**child).clone(), intros));
            let var = Var::fresh();
            intros.push((var, shallow));
            var
        }
    }
}

/// Instantiate the scheme bound to `name` and unify the instance with
/// `var`. Decodes to the instantiation witnesses: the types substituted
/// for the scheme's quantifiers, in quantifier order.
pub fn instance<L: Language>(name: L::TeVar, var: Var) -> Infer<L, Vec<L::Ty>> {
    let witnesses = Slot::new("instantiation witness");
    let read = witnesses.clone();
    Infer {
        raw: RawCo::Instance {
            name,
            var,
            witnesses,
        },
        cont: Box::new(move |decoder| {
            read.take()
                .into_iter()
                .map(|witness| decoder.decode(witness))
                .collect()
        }),
    }
}

/// Like [`instance`], but does not decode the witnesses.
pub fn instance_<L: Language>(name: L::TeVar, var: Var) -> Infer<L, ()> {
    let witnesses = Slot::new("instantiation witness");
    Infer {
        raw: RawCo::Instance {
            name,
            var,
            witnesses,
        },
        cont: Box::new(|_| ()),
    }
}

/// Bind `name` monomorphically to `var` while solving `body`: a `let`
/// with no generalization.
pub fn def<L: Language, T: 'static>(
    name: L::TeVar,
    var: Var,
    body: Infer<L, T>,
) -> Infer<L, T> {
    Infer {
        raw: RawCo::Def {
            name,
            var,
            body: Box::new(body.raw),
        },
        cont: body.cont,
    }
}

/// Generalizing `let`: bind each name in `names` to a fresh variable,
/// solve `f`'s constraint under them, generalize at the scope boundary,
/// then solve `right` with the names bound to their schemes.
///
/// Decodes to the schemes (one per name), the scope's generalizable
/// variables, and the two sub-results.
pub fn letn<L: Language, T1: 'static, T2: 'static>(
    names: Vec<L::TeVar>,
    f: impl FnOnce(&[Var]) -> Infer<L, T1>,
    right: Infer<L, T2>,
) -> Infer<L, (Vec<Scheme<L>>, Vec<L::TyVar>, T1, T2)> {
    let vars: Vec<Var> = names.iter().map(|_| Var::fresh()).collect();
    let Infer { raw: left_raw, cont: left } = f(&vars);
    let Infer { raw: right_raw, cont: right } = right;

    let bindings: Vec<LetBinding<L>> = names
        .into_iter()
        .zip(&vars)
        .map(|(name, &var)| LetBinding {
            name,
            var,
            scheme: Slot::new("let scheme"),
        })
        .collect();
    let scheme_slots: Vec<Slot<_>> = bindings.iter().map(|b| b.scheme.clone()).collect();
    let generalizable = Slot::new("generalizable variables");
    let generalizable_read = generalizable.clone();

    Infer {
        raw: RawCo::Let {
            bindings,
            left: Box::new(left_raw),
            right: Box::new(right_raw),
            generalizable,
        },
        cont: Box::new(move |decoder| {
            let schemes = scheme_slots
                .iter()
                .map(|slot| {
                    let raw = slot.take();
                    decoder.decode_scheme(&raw)
                })
                .collect();
            let generics = generalizable_read
                .take()
                .into_iter()
                .map(|v| decoder.tyvar(v))
                .collect();
            let a1 = left(decoder);
            let a2 = right(decoder);
            (schemes, generics, a1, a2)
        }),
    }
}

/// [`letn`] specialized to a single binding.
pub fn let1<L: Language, T1: 'static, T2: 'static>(
    name: L::TeVar,
    f: impl FnOnce(Var) -> Infer<L, T1>,
    right: Infer<L, T2>,
) -> Infer<L, (Scheme<L>, Vec<L::TyVar>, T1, T2)> {
    letn(vec![name], |vars| f(vars[0]), right).map(|(mut schemes, generics, a1, a2)| {
        (schemes.remove(0), generics, a1, a2)
    })
}

/// The mandatory outermost scope. Every solvable constraint is wrapped
/// in `let0`, which opens the toplevel generalization scope before any
/// variable is allocated.
pub fn let0<L: Language, T: 'static>(body: Infer<L, T>) -> Infer<L, (Vec<L::TyVar>, T)> {
    letn(Vec::new(), move |_| body, pure(()))
        .map(|(_, generics, value, ())| (generics, value))
}

/// Solve a toplevel constraint and run its decoding continuation.
///
/// `rectypes` selects whether cyclic types are permitted: when `false`
/// the occurs check rejects them; when `true` they decode as `mu` types.
///
/// Panics if `co` is not the toplevel constraint produced by [`let0`].
pub fn solve<L: Language, T: 'static>(
    rectypes: bool,
    co: Infer<L, T>,
) -> Result<T, TypeError<L>> {
    let Infer { raw, cont } = co;
    match &raw {
        RawCo::Let {
            bindings, right, ..
        } if bindings.is_empty() && matches!(**right, RawCo::True) => {}
        _ => panic!("solve requires the toplevel constraint produced by let0"),
    }
    let mut solver = Solver::new(rectypes);
    if let Err(fault) = solver.solve(raw) {
        return Err(report(&mut solver, fault));
    }
    let mut decoder = Decoder::new(&mut solver, rectypes);
    Ok(cont(&mut decoder))
}

/// Decode a fault into the public error. Always cyclic: the graph at a
/// failure site may contain cycles even in acyclic mode.
fn report<L: Language>(solver: &mut Solver<L>, fault: Fault<L>) -> TypeError<L> {
    let mut decoder = Decoder::new(solver, true);
    match fault {
        Fault::Clash { left, right, range } => TypeError::Mismatch {
            expected: decoder.decode_cyclic(left),
            found: decoder.decode_cyclic(right),
            range,
        },
        Fault::Occurs { var, range } => TypeError::InfiniteType {
            ty: decoder.decode_cyclic(var),
            range,
        },
        Fault::Unbound { name, range } => TypeError::UnboundVariable { name, range },
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{Mini, MiniShape, MiniTy};

    /// Solve a constraint under the mandatory toplevel scope and drop
    /// the toplevel generalizable list.
    fn run<T: 'static>(co: Infer<Mini, T>) -> Result<T, TypeError<Mini>> {
        solve(false, let0(co)).map(|(_, value)| value)
    }

    #[test]
    fn pure_decodes_to_its_value() {
        assert_eq!(run(pure(42)).unwrap(), 42);
    }

    #[test]
    fn map_identity_preserves_the_result() {
        let direct = run(exist_(|v| has_shape::<Mini>(v, MiniShape::Int))).unwrap();
        let mapped = run(exist_(|v| has_shape::<Mini>(v, MiniShape::Int)).map(|x| x)).unwrap();
        assert_eq!(direct, mapped);
    }

    #[test]
    fn map_composes() {
        let f = |x: u32| x + 1;
        let g = |x: u32| x * 2;
        let composed = run(pure(10).map(move |x| f(g(x)))).unwrap();
        let chained = run(pure(10).map(g).map(f)).unwrap();
        assert_eq!(composed, chained);
    }

    #[test]
    fn pure_and_pairs_with_the_other_result() {
        let ((a, ()), (b, ())) = run(pure("left")
            .and(exist_(|v| has_shape::<Mini>(v, MiniShape::Int)))
            .and(pure("right").map(|x| (x, ()))))
        .unwrap();
        assert_eq!(a, "left");
        assert_eq!(b, "right");
    }

    #[test]
    fn exist_decodes_the_constrained_variable() {
        let (ty, ()) = run(exist(|v| has_shape::<Mini>(v, MiniShape::Int))).unwrap();
        assert_eq!(ty, MiniTy::Int);
    }

    #[test]
    fn construct_decodes_its_shape() {
        let (ty, ()) = run(exist_(|a| {
            has_shape::<Mini>(a, MiniShape::Int)
                .and(construct(MiniShape::Arrow(a, a), |_| pure(())))
                .map(|((), pair)| pair)
        }))
        .unwrap();
        assert_eq!(
            ty,
            MiniTy::Arrow(Box::new(MiniTy::Int), Box::new(MiniTy::Int))
        );
    }

    #[test]
    fn build_lowers_a_deep_tree() {
        // int -> (int -> int), stated in one expression.
        let deep: DeepTy<Mini> = DeepTy::Structure(MiniShape::Arrow(
            Box::new(DeepTy::Structure(MiniShape::Int)),
            Box::new(DeepTy::Structure(MiniShape::Arrow(
                Box::new(DeepTy::Structure(MiniShape::Int)),
                Box::new(DeepTy::Structure(MiniShape::Int)),
            ))),
        ));
        let (ty, ()) = run(exist(|v| build(deep, move |root| eq::<Mini>(v, root)))).unwrap();
        let int = || Box::new(MiniTy::Int);
        assert_eq!(
            ty,
            MiniTy::Arrow(int(), Box::new(MiniTy::Arrow(int(), int())))
        );
    }

    #[test]
    fn def_bindings_are_monomorphic() {
        // def x = v; x both at int and usable: the two instances share v.
        let (ty, ()) = run(exist(|v| {
            def::<Mini, _>(
                "x",
                v,
                exist_(|u| {
                    instance_::<Mini>("x", u).and(has_shape(u, MiniShape::Int)).map(|_| ())
                }),
            )
        }))
        .unwrap();
        assert_eq!(ty, MiniTy::Int, "the def-bound variable itself was unified");
    }

    #[test]
    fn unbound_variable_is_reported() {
        let outcome = run(exist_(|v| instance_::<Mini>("ghost", v)));
        match outcome {
            Err(TypeError::UnboundVariable { name, .. }) => assert_eq!(name, "ghost"),
            other => panic!("expected UnboundVariable, got {:?}", other),
        }
    }

    #[test]
    fn ranges_reach_the_error() {
        let outcome = run(exist_(|v| {
            has_shape::<Mini>(v, MiniShape::Int)
                .and(
                    exist_(|w| {
                        exist_(|a| has_shape::<Mini>(w, MiniShape::Arrow(a, a)))
                            .and(eq(v, w))
                            .map(|_| ())
                    })
                    .at((10, 14)),
                )
                .map(|_| ())
        }));
        match outcome {
            Err(TypeError::Mismatch { range, .. }) => assert_eq!(range, Some((10, 14))),
            other => panic!("expected Mismatch, got {:?}", other),
        }
    }

    #[test]
    #[should_panic(expected = "toplevel constraint produced by let0")]
    fn solve_rejects_a_bare_constraint() {
        let _ = solve(false, pure::<Mini, _>(0));
    }
}
