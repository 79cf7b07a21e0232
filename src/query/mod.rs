#![forbid(unsafe_code)]

//! Query representation produced by translation.
//!
//! This module holds the clause tree, its Cypher rendering, the typed
//! parameter values and the per-request naming of variables and parameters.

/// Clause tree: patterns, expressions and clauses.
///
/// Defines the composable structure a plan is built from.
pub mod ast;

/// Variable and parameter name allocation.
pub mod namer;

/// Flat parameter map.
pub mod params;

/// Executable plan bundling clauses and parameters.
pub mod plan;

/// Cypher text rendering.
///
/// Deterministic, indentation-aware serialization of the clause tree.
pub mod render;

/// Typed parameter values.
pub mod value;

pub use ast::{Block, Clause, Expr, Var};
pub use namer::Namer;
pub use params::Params;
pub use plan::QueryPlan;
pub use value::Value;
