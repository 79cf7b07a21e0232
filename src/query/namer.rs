//! Per-request variable and parameter naming.

use std::collections::BTreeSet;

use super::ast::Var;

/// Name reserved for the root binding.
pub const ROOT: &str = "this";

/// Parameter holding the request's claims.
pub const JWT_PARAM: &str = "jwt";

/// Allocates variable and parameter names for one request.
///
/// Variables draw from a single counter, so compiling the same request twice
/// yields the same names. Parameters are derived from dotted field paths and
/// de-duplicated with a numeric suffix.
#[derive(Debug, Default)]
pub struct Namer {
    counter: usize,
    params: BTreeSet<String>,
}

impl Namer {
    /// Fresh namer with the claims parameter reserved.
    pub fn new() -> Self {
        let mut params = BTreeSet::new();
        params.insert(JWT_PARAM.to_owned());
        Self {
            counter: 0,
            params,
        }
    }

    /// The root variable.
    pub fn root(&self) -> Var {
        Var::new(ROOT)
    }

    /// Allocates `{base}{n}`.
    pub fn fresh(&mut self, base: &str) -> Var {
        let var = Var::new(format!("{base}{}", self.counter));
        self.counter += 1;
        var
    }

    /// Allocates a parameter name for a dotted field path.
    ///
    /// `this.posts[0].where.title` becomes `this_posts0_where_title`; a name
    /// that was already handed out gets a `_{k}` suffix.
    pub fn param(&mut self, path: &str) -> String {
        let base = sanitize(path);
        if self.params.insert(base.clone()) {
            return base;
        }
        let mut k = 1;
        loop {
            let candidate = format!("{base}_{k}");
            if self.params.insert(candidate.clone()) {
                return candidate;
            }
            k += 1;
        }
    }

    /// Number of variables allocated so far.
    pub fn allocated(&self) -> usize {
        self.counter
    }
}

/// Turns a dotted path into a parameter-safe identifier.
pub fn sanitize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        match ch {
            '[' | ']' => {}
            c if c.is_ascii_alphanumeric() || c == '_' => out.push(c),
            _ => out.push('_'),
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Joins a path segment onto a dotted path.
pub fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_owned()
    } else {
        format!("{path}.{segment}")
    }
}

/// Joins an array index onto a dotted path.
pub fn index(path: &str, idx: usize) -> String {
    format!("{path}[{idx}]")
}
