//! Values threaded through recursive compilation.

use crate::query::ast::{Block, Clause, Var};
use crate::query::namer;
use crate::query::Params;

/// Pattern variables in scope at one nesting level.
///
/// Passed by reference and derived with [`QueryAstContext::nested`]; nothing
/// writes back into a parent context.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct QueryAstContext {
    /// Node the current level is compiled against.
    pub target: Var,
    /// Relationship that reached `target`, if any.
    pub relationship: Option<Var>,
    /// Node the relationship started from.
    pub source: Option<Var>,
    /// Dotted field path used to derive parameter names.
    pub path: String,
}

impl QueryAstContext {
    /// Top-level context for `target`.
    pub fn root(target: &Var) -> Self {
        Self {
            target: target.clone(),
            relationship: None,
            source: None,
            path: target.name().to_owned(),
        }
    }

    /// Context one relationship hop below `self`, keeping the path.
    pub fn nested(&self, target: &Var, relationship: Option<&Var>) -> Self {
        Self {
            target: target.clone(),
            relationship: relationship.cloned(),
            source: Some(self.target.clone()),
            path: self.path.clone(),
        }
    }

    /// Same variables, deeper parameter path.
    pub fn at(&self, segment: &str) -> Self {
        Self {
            path: namer::join(&self.path, segment),
            ..self.clone()
        }
    }

    /// Same variables, indexed parameter path.
    pub fn indexed(&self, idx: usize) -> Self {
        Self {
            path: namer::index(&self.path, idx),
            ..self.clone()
        }
    }

    /// Same path, different target.
    pub fn retarget(&self, target: &Var) -> Self {
        Self {
            target: target.clone(),
            ..self.clone()
        }
    }

    /// Parameter path for `segment` below the current path.
    pub fn param_path(&self, segment: &str) -> String {
        namer::join(&self.path, segment)
    }
}

/// Compilation output with its side products.
///
/// `subqueries` must run before `value` is evaluated; `params` are the
/// bindings `value` and `subqueries` reference. Callers merge both
/// explicitly through [`Fragment::absorb`].
#[derive(Debug, Default)]
pub(crate) struct Fragment<T> {
    pub value: T,
    pub subqueries: Vec<Clause>,
    pub params: Params,
}

impl<T> Fragment<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            subqueries: Vec::new(),
            params: Params::new(),
        }
    }

    /// Moves `other`'s subqueries and parameters into `self` and returns its
    /// value.
    pub fn absorb<U>(&mut self, other: Fragment<U>) -> U {
        self.subqueries.extend(other.subqueries);
        self.params.merge(other.params);
        other.value
    }

    /// Moves only the parameters of `other` into `self`, handing back its
    /// value and subqueries.
    pub fn absorb_params<U>(&mut self, other: Fragment<U>) -> (U, Vec<Clause>) {
        self.params.merge(other.params);
        (other.value, other.subqueries)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fragment<U> {
        Fragment {
            value: f(self.value),
            subqueries: self.subqueries,
            params: self.params,
        }
    }
}

impl Fragment<Block> {
    /// Pushes `other`'s subqueries onto the block, merges its parameters and
    /// returns its value.
    pub fn splice<U>(&mut self, other: Fragment<U>) -> U {
        self.params.merge(other.params);
        self.value.extend(other.subqueries);
        other.value
    }

    /// Pushes a clause onto the block.
    pub fn push(&mut self, clause: Clause) {
        self.value.push(clause);
    }

    /// Appends a nested block fragment.
    pub fn append(&mut self, other: Fragment<Block>) {
        let block = self.splice(other);
        self.value.append(block);
    }
}
