#![forbid(unsafe_code)]

//! Request to query-plan translation.
//!
//! [`Translator`] is the entry point: it owns nothing mutable and can be
//! shared across threads. Each call builds a private `Compiler` holding the
//! per-request [`Namer`]; the compiler's methods are spread over the
//! submodules below, one concern per file. Every method returns a
//! `Fragment` carrying the clauses or expression it built together with the
//! parameters it bound, and callers merge those explicitly.

/// Aggregation selections (`<rel>Aggregate { ... }`) and root aggregates.
pub(crate) mod aggregate;

/// Aggregate filters (`<rel>Aggregate` filter keys).
pub(crate) mod aggregate_filter;

/// Type-level and field-level authorization rules.
pub(crate) mod authorization;

/// Connection selections with cursors.
pub mod connection;

/// Compilation context and fragments.
pub(crate) mod context;

/// Create mutations, nested creates and connects.
pub(crate) mod create;

/// Delete mutations and delete cascades.
pub(crate) mod delete;

/// Filter trees.
pub(crate) mod filter;

/// Filter key parsing.
pub(crate) mod operators;

/// Field projections.
pub(crate) mod projection;

/// Read operations.
pub(crate) mod read;

/// Request types.
pub mod request;

/// Sorting and pagination.
pub(crate) mod sort;

/// Update mutations, nested updates and disconnects.
pub(crate) mod update;

/// Relationship cardinality assertions.
pub(crate) mod validation;

use tracing::debug;

use crate::auth::AuthContext;
use crate::config::TranslatorOptions;
use crate::error::{Result, TranslateError};
use crate::query::ast::{EdgeDirection, Expr, NodePattern, Pattern, RelPattern, Var};
use crate::query::namer::JWT_PARAM;
use crate::query::{Namer, Params, QueryPlan, Value};
use crate::schema::{
    Attribute, ConcreteEntity, Direction, Entity, Relationship, SchemaModel, TargetKind,
};

pub use connection::{decode_cursor, encode_cursor};
pub use request::{FieldSelection, JsonMap, Operation, Request, SelectionArgs};

/// Translates requests against a fixed schema model.
#[derive(Debug, Clone)]
pub struct Translator<'s> {
    schema: &'s SchemaModel,
    options: TranslatorOptions,
}

impl<'s> Translator<'s> {
    /// Creates a translator over `schema`.
    pub fn new(schema: &'s SchemaModel, options: TranslatorOptions) -> Self {
        Self { schema, options }
    }

    /// Options in effect.
    pub fn options(&self) -> &TranslatorOptions {
        &self.options
    }

    /// Compiles `request` into a single query plan.
    ///
    /// Structural problems (unknown fields, malformed filter keys, invalid
    /// values or pagination) abort the whole request. Authorization and
    /// cardinality assertions are embedded in the plan.
    pub fn translate(&self, request: &Request, auth: &AuthContext) -> Result<QueryPlan> {
        auth.require_authenticated(&self.options)?;
        debug!(
            entity = %request.entity,
            operation = ?request.operation,
            authenticated = auth.is_authenticated,
            "translate.start"
        );
        let mut compiler = Compiler::new(self.schema, auth, &self.options);
        let fragment = match request.operation {
            Operation::Read => compiler.read(request)?,
            Operation::Aggregate => compiler.aggregate_root(request)?,
            Operation::Create => compiler.create(request)?,
            Operation::Update => compiler.update(request)?,
            Operation::Delete => compiler.delete(request)?,
        };
        let plan = QueryPlan::new(fragment.value, fragment.params);
        debug!(
            entity = %request.entity,
            clauses = plan.clauses.len(),
            parameters = plan.parameters.len(),
            variables = compiler.namer.allocated(),
            "translate.done"
        );
        Ok(plan)
    }
}

/// Per-request compilation state.
pub(crate) struct Compiler<'a> {
    schema: &'a SchemaModel,
    auth: &'a AuthContext,
    options: &'a TranslatorOptions,
    namer: Namer,
}

impl<'a> Compiler<'a> {
    fn new(schema: &'a SchemaModel, auth: &'a AuthContext, options: &'a TranslatorOptions) -> Self {
        Self {
            schema,
            auth,
            options,
            namer: Namer::new(),
        }
    }

    fn entity(&self, name: &str) -> Result<&'a Entity> {
        self.schema
            .entity(name)
            .ok_or_else(|| TranslateError::unknown_entity(name))
    }

    fn concrete(&self, name: &str) -> Result<&'a ConcreteEntity> {
        self.schema
            .concrete_entity(name)
            .ok_or_else(|| TranslateError::unknown_entity(name))
    }

    /// Concrete entities behind a relationship target; never empty.
    fn targets(&self, rel: &Relationship) -> Result<Vec<&'a ConcreteEntity>> {
        let targets = self.schema.concrete_targets(rel);
        if targets.is_empty() {
            return Err(TranslateError::schema(format!(
                "relationship '{}' has no concrete targets",
                rel.name
            )));
        }
        Ok(targets)
    }

    /// Binds `value` under a name derived from `path`.
    fn bind(&mut self, params: &mut Params, path: &str, value: Value) -> Expr {
        let name = self.namer.param(path);
        params.insert(name.clone(), value);
        Expr::param(name)
    }

    /// `$jwt`, registering the claims parameter.
    fn jwt(&self, params: &mut Params) -> Expr {
        params.insert(JWT_PARAM, self.auth.jwt_value());
        Expr::param(JWT_PARAM)
    }

    /// Wraps a bound value so temporal and spatial parameters are compared
    /// as native values.
    fn typed_param(&mut self, attribute: &Attribute, param: Expr, list: bool) -> Expr {
        let function = if let Some(kind) = attribute.temporal_kind() {
            kind.cypher_function()
        } else if attribute.is_spatial() {
            "point"
        } else {
            return param;
        };
        if list {
            let var = self.namer.fresh("var");
            Expr::ListComprehension {
                map: Some(Box::new(Expr::call(function, vec![var.expr()]))),
                var,
                list: Box::new(param),
                filter: None,
            }
        } else {
            Expr::call(function, vec![param])
        }
    }
}

/// Pattern `(from)-[rel]->(to)` following the relationship's direction.
pub(crate) fn hop(from: &Var, rel: &Relationship, rel_var: Option<&Var>, to: NodePattern) -> Pattern {
    Pattern::node(NodePattern::bound(from)).hop(
        RelPattern {
            var: rel_var.cloned(),
            rel_type: rel.rel_type.clone(),
            direction: match rel.direction {
                Direction::Out => EdgeDirection::Out,
                Direction::In => EdgeDirection::In,
            },
        },
        to,
    )
}

/// Splits composite input keyed by member name, or hands the whole input to
/// every member.
pub(crate) fn member_inputs<'m, 'j>(
    rel: &Relationship,
    targets: &[&'m ConcreteEntity],
    input: &'j serde_json::Value,
) -> Result<Vec<(&'m ConcreteEntity, &'j serde_json::Value)>> {
    if rel.target_kind != TargetKind::Union {
        return Ok(targets.iter().map(|t| (*t, input)).collect());
    }
    let map = input.as_object().ok_or_else(|| {
        TranslateError::invalid_value(&rel.name, "union input must be keyed by member type")
    })?;
    let mut out = Vec::new();
    for (key, value) in map {
        let member = targets
            .iter()
            .find(|t| &t.name == key)
            .ok_or_else(|| TranslateError::unknown_field(&rel.target, key))?;
        out.push((*member, value));
    }
    Ok(out)
}

/// Interprets a JSON value as a list of objects; a single object is a list of
/// one.
pub(crate) fn object_list<'j>(field: &str, value: &'j serde_json::Value) -> Result<Vec<&'j JsonMap>> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_object()
                    .ok_or_else(|| TranslateError::invalid_value(field, "expected an object"))
            })
            .collect(),
        serde_json::Value::Object(map) => Ok(vec![map]),
        serde_json::Value::Null => Ok(Vec::new()),
        _ => Err(TranslateError::invalid_value(field, "expected an object or a list of objects")),
    }
}

/// `posts` -> `Posts`, for generated type names.
pub(crate) fn upper_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Interprets a JSON value as an object.
pub(crate) fn object<'j>(field: &str, value: &'j serde_json::Value) -> Result<&'j JsonMap> {
    value
        .as_object()
        .ok_or_else(|| TranslateError::invalid_value(field, "expected an object"))
}
