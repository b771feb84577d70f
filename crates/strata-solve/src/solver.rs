//! The low-level solver: a single strict walk over the constraint tree.
//!
//! The walk owns the inference context, the typing environment, the
//! mapping from construction-time names to union-find keys, and the
//! stack of ambient source ranges. Each constraint node either succeeds
//! silently or aborts the whole solve with a [`Fault`]; nothing is
//! retried, and the decoding continuation never runs after a fault.

use rustc_hash::FxHashMap;

use crate::constraint::{RawCo, Var};
use crate::generalize::RawScheme;
use crate::lang::Language;
use crate::unify::{InferCtx, InferVar, UnifyError};

/// A failed solve, still in graph form. The variables involved are
/// decoded (always cyclically) at the public boundary.
pub(crate) enum Fault<L: Language> {
    /// Two head constructors disagree.
    Clash {
        left: InferVar<L>,
        right: InferVar<L>,
        range: Option<L::Range>,
    },
    /// A unification created a cycle while recursive types are disabled.
    Occurs {
        var: InferVar<L>,
        range: Option<L::Range>,
    },
    /// An instantiation referenced an unbound term variable.
    Unbound {
        name: L::TeVar,
        range: Option<L::Range>,
    },
}

/// State for one solve: consumed by a single constraint tree.
pub(crate) struct Solver<L: Language> {
    pub(crate) ctx: InferCtx<L>,
    /// Construction-time names of the variables bound so far.
    names: FxHashMap<Var, InferVar<L>>,
    /// The typing environment.
    env: FxHashMap<L::TeVar, RawScheme<L>>,
    /// Innermost-last stack of ambient source ranges.
    ranges: Vec<L::Range>,
}

impl<L: Language> Solver<L> {
    pub(crate) fn new(rectypes: bool) -> Self {
        Solver {
            ctx: InferCtx::new(rectypes),
            names: FxHashMap::default(),
            env: FxHashMap::default(),
            ranges: Vec::new(),
        }
    }

    /// The union-find key behind a constraint-time name.
    ///
    /// Panics when the name's binder was never solved -- in practice,
    /// when a variable from one solve leaks into another.
    pub(crate) fn key(&self, var: Var) -> InferVar<L> {
        match self.names.get(&var) {
            Some(&key) => key,
            None => panic!(
                "type variable {:?} used outside the solve that binds it",
                var
            ),
        }
    }

    /// Allocate the variable behind a binder, translating the shape's
    /// children from names to keys.
    fn bind_var(&mut self, var: Var, shape: Option<L::Shape<Var>>) -> InferVar<L> {
        let shape = shape.map(|s| L::map(&s, |child| self.key(*child)));
        let key = self.ctx.fresh(shape);
        let previous = self.names.insert(var, key);
        debug_assert!(previous.is_none(), "variable {:?} bound twice", var);
        key
    }

    fn range(&self) -> Option<L::Range> {
        self.ranges.last().cloned()
    }

    fn unify_fault(&self, error: UnifyError<L>) -> Fault<L> {
        match error {
            UnifyError::Clash(left, right) => Fault::Clash {
                left,
                right,
                range: self.range(),
            },
            UnifyError::Occurs(var) => Fault::Occurs {
                var,
                range: self.range(),
            },
        }
    }

    /// Solve one constraint tree.
    pub(crate) fn solve(&mut self, co: RawCo<L>) -> Result<(), Fault<L>> {
        match co {
            RawCo::True => Ok(()),

            RawCo::Conj(left, right) => {
                self.solve(*left)?;
                self.solve(*right)
            }

            RawCo::Eq(left, right) => {
                let left = self.key(left);
                let right = self.key(right);
                self.ctx
                    .unify(left, right)
                    .map_err(|e| self.unify_fault(e))
            }

            RawCo::Exist { var, shape, body } => {
                self.bind_var(var, shape);
                self.solve(*body)
            }

            RawCo::Instance {
                name,
                var,
                witnesses,
            } => {
                let scheme = match self.env.get(&name) {
                    Some(scheme) => scheme.clone(),
                    None => {
                        return Err(Fault::Unbound {
                            name,
                            range: self.range(),
                        })
                    }
                };
                let (instance, fresh) = self.ctx.instantiate(&scheme);
                witnesses.fill(fresh);
                let target = self.key(var);
                self.ctx
                    .unify(instance, target)
                    .map_err(|e| self.unify_fault(e))
            }

            RawCo::Def { name, var, body } => {
                let key = self.key(var);
                let saved = self.env.insert(name.clone(), RawScheme::mono(key));
                let outcome = self.solve(*body);
                self.restore(name, saved);
                outcome
            }

            RawCo::Let {
                bindings,
                left,
                right,
                generalizable,
            } => {
                self.ctx.enter();
                let roots: Vec<InferVar<L>> = bindings
                    .iter()
                    .map(|binding| self.bind_var(binding.var, None))
                    .collect();
                self.solve(*left)?;

                let (schemes, generics) = self.ctx.exit(&roots);
                generalizable.fill(generics);

                let mut saved = Vec::with_capacity(bindings.len());
                for (binding, scheme) in bindings.into_iter().zip(schemes) {
                    binding.scheme.fill(scheme.clone());
                    saved.push((
                        binding.name.clone(),
                        self.env.insert(binding.name, scheme),
                    ));
                }
                let outcome = self.solve(*right);
                for (name, previous) in saved.into_iter().rev() {
                    self.restore(name, previous);
                }
                outcome
            }

            RawCo::Range(range, body) => {
                self.ranges.push(range);
                let outcome = self.solve(*body);
                self.ranges.pop();
                outcome
            }
        }
    }

    fn restore(&mut self, name: L::TeVar, saved: Option<RawScheme<L>>) {
        match saved {
            Some(scheme) => {
                self.env.insert(name, scheme);
            }
            None => {
                self.env.remove(&name);
            }
        }
    }
}
