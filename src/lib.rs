//! Translation of GraphQL-style requests into parameterized Cypher plans.
//!
//! A [`SchemaModel`] describes the graph; a [`Translator`] compiles each
//! [`Request`] against it into a [`QueryPlan`] whose clauses embed every
//! authorization and cardinality assertion. Translation is pure: nothing
//! here talks to a database.

#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod error;
pub mod query;
pub mod schema;
pub mod translate;

pub use auth::AuthContext;
pub use config::TranslatorOptions;
pub use error::{Result, TranslateError};
pub use query::{QueryPlan, Value};
pub use schema::{SchemaDefinition, SchemaModel};
pub use translate::{FieldSelection, Operation, Request, SelectionArgs, Translator};
