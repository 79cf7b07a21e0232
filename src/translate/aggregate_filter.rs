//! `<rel>Aggregate` filter keys.
//!
//! The whole aggregate filter compiles into one subquery that matches the
//! related nodes and returns a single boolean column; the parent predicate
//! checks that column.

use serde_json::Value as Json;

use super::context::{Fragment, QueryAstContext};
use super::operators::Scope;
use super::{hop, object, Compiler};
use crate::error::{Result, TranslateError};
use crate::query::ast::{BinaryOp, Block, Clause, Expr, NodePattern, Projection, Quantifier, Var};
use crate::query::Value;
use crate::schema::{Attribute, ConcreteEntity, Relationship};

/// Comparison suffixes, longest first.
const COMPARISONS: &[(&str, BinaryOp)] = &[
    ("_EQUAL", BinaryOp::Eq),
    ("_GTE", BinaryOp::Gte),
    ("_LTE", BinaryOp::Lte),
    ("_GT", BinaryOp::Gt),
    ("_LT", BinaryOp::Lt),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Aggregation {
    /// Any related value satisfies the comparison.
    Any,
    Min,
    Max,
    Sum,
    Average,
    ShortestLength,
    LongestLength,
    AverageLength,
}

const AGGREGATIONS: &[(&str, Aggregation)] = &[
    ("_SHORTEST_LENGTH", Aggregation::ShortestLength),
    ("_LONGEST_LENGTH", Aggregation::LongestLength),
    ("_AVERAGE_LENGTH", Aggregation::AverageLength),
    ("_AVERAGE", Aggregation::Average),
    ("_MIN", Aggregation::Min),
    ("_MAX", Aggregation::Max),
    ("_SUM", Aggregation::Sum),
];

impl Aggregation {
    fn supports(self, attribute: &Attribute) -> bool {
        match self {
            Aggregation::Any => true,
            Aggregation::Min | Aggregation::Max => {
                attribute.is_numerical_or_temporal() || attribute.is_textual()
            }
            Aggregation::Sum | Aggregation::Average => attribute.is_numeric(),
            Aggregation::ShortestLength | Aggregation::LongestLength | Aggregation::AverageLength => {
                attribute.is_textual()
            }
        }
    }

    fn function(self) -> Option<&'static str> {
        match self {
            Aggregation::Any => None,
            Aggregation::Min | Aggregation::ShortestLength => Some("min"),
            Aggregation::Max | Aggregation::LongestLength => Some("max"),
            Aggregation::Sum => Some("sum"),
            Aggregation::Average | Aggregation::AverageLength => Some("avg"),
        }
    }

    fn over_length(self) -> bool {
        matches!(
            self,
            Aggregation::ShortestLength | Aggregation::LongestLength | Aggregation::AverageLength
        )
    }
}

/// Splits `<field>[_<AGG>]_<OP>` against the attributes visible in `scope`.
fn parse_field_key<'s>(
    scope: Scope<'s>,
    key: &str,
) -> Option<(&'s Attribute, Aggregation, BinaryOp)> {
    let (head, op) = COMPARISONS
        .iter()
        .find_map(|(suffix, op)| key.strip_suffix(suffix).map(|head| (head, *op)))?;
    for (suffix, aggregation) in AGGREGATIONS {
        if let Some(field) = head.strip_suffix(suffix) {
            if let Some(attribute) = scope.attribute(field) {
                return Some((attribute, *aggregation, op));
            }
        }
    }
    scope
        .attribute(head)
        .map(|attribute| (attribute, Aggregation::Any, op))
}

impl<'a> Compiler<'a> {
    pub(crate) fn aggregate_filter(
        &mut self,
        entity: &'a ConcreteEntity,
        rel: &'a Relationship,
        value: &Json,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        if rel.is_composite_target() {
            return Err(TranslateError::schema(format!(
                "aggregate filter '{}Aggregate' on '{}' targets a composite type",
                rel.name, entity.name
            )));
        }
        let member = self.concrete(&rel.target)?;
        let filter = object(&rel.name, value)?;
        let node = self.namer.fresh("this");
        let edge = self.namer.fresh("this");
        let inner_ctx = ctx.nested(&node, Some(&edge));
        let mut out = Fragment::new(None);
        let predicate = self.aggregate_predicate(member, rel, filter, &inner_ctx)?;
        let Some(predicate) = out.absorb(predicate) else {
            return Ok(out);
        };

        let result = self.namer.fresh("var");
        let mut body = Block::new();
        body.push(Clause::with_vars([&ctx.target]));
        body.push(Clause::Match {
            optional: false,
            pattern: hop(
                &ctx.target,
                rel,
                Some(&edge),
                NodePattern::new(&node, &member.labels),
            ),
            where_: None,
        });
        body.push(Clause::Return(Projection::single(predicate, &result)));
        out.subqueries.push(Clause::call(body));
        out.value = Some(Expr::eq(result.expr(), Expr::lit(true)));
        Ok(out)
    }

    /// Top level of an aggregate filter: `count*`, `node`, `edge` and the
    /// logical keys. `ctx.target` is the related node and
    /// `ctx.relationship` the edge.
    fn aggregate_predicate(
        &mut self,
        member: &'a ConcreteEntity,
        rel: &'a Relationship,
        filter: &serde_json::Map<String, Json>,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        let mut out = Fragment::new(None);
        let mut predicates = Vec::new();
        for (key, value) in filter {
            let key_ctx = ctx.at(key);
            match key.as_str() {
                "AND" | "OR" | "NOT" => {
                    let parts = self.logical_parts(key, value, &key_ctx, |c, map, ctx| {
                        c.aggregate_predicate(member, rel, map, ctx)
                    })?;
                    predicates.extend(out.absorb(parts));
                }
                "node" => {
                    let part = self.aggregate_fields(Scope::Node(member), object(key, value)?, &ctx.target, &key_ctx)?;
                    predicates.extend(out.absorb(part));
                }
                "edge" => {
                    let props = rel.properties.as_ref().ok_or_else(|| {
                        TranslateError::schema(format!(
                            "relationship '{}' declares no edge properties",
                            rel.name
                        ))
                    })?;
                    let edge = ctx.relationship.clone().ok_or_else(|| {
                        TranslateError::schema(format!("edge filter on '{}' without an edge", rel.name))
                    })?;
                    let part = self.aggregate_fields(Scope::Edge(props), object(key, value)?, &edge, &key_ctx)?;
                    predicates.extend(out.absorb(part));
                }
                _ => {
                    let Some(op) = count_operator(key) else {
                        return Err(TranslateError::malformed_key(
                            &member.name,
                            key,
                            "aggregate filters accept count, node, edge, AND, OR and NOT",
                        ));
                    };
                    let count = value
                        .as_i64()
                        .ok_or_else(|| TranslateError::invalid_value(key, "expected an integer count"))?;
                    let param = self.bind(&mut out.params, &key_ctx.path, Value::Int(count));
                    predicates.push(Expr::binary(
                        op,
                        Expr::call("count", vec![ctx.target.expr()]),
                        param,
                    ));
                }
            }
        }
        out.value = Expr::all_of(predicates);
        Ok(out)
    }

    /// Field comparisons under `node` or `edge`, read from `var`.
    fn aggregate_fields(
        &mut self,
        scope: Scope<'a>,
        filter: &serde_json::Map<String, Json>,
        var: &Var,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        let mut out = Fragment::new(None);
        let mut predicates = Vec::new();
        for (key, value) in filter {
            let key_ctx = ctx.at(key);
            if matches!(key.as_str(), "AND" | "OR" | "NOT") {
                let parts = self.logical_parts(key, value, &key_ctx, |c, map, ctx| {
                    c.aggregate_fields(scope, map, var, ctx)
                })?;
                predicates.extend(out.absorb(parts));
                continue;
            }
            let (attribute, aggregation, op) = parse_field_key(scope, key).ok_or_else(|| {
                TranslateError::malformed_key(scope.name(), key, "no aggregation matches this key")
            })?;
            if !attribute.is_aggregation_where_field() || !aggregation.supports(attribute) {
                return Err(TranslateError::malformed_key(
                    scope.name(),
                    key,
                    format!("attribute '{}' does not support this aggregation", attribute.name),
                ));
            }
            let bound = match aggregation {
                Aggregation::Average | Aggregation::AverageLength => value
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| TranslateError::invalid_value(key, "expected a number"))?,
                Aggregation::ShortestLength | Aggregation::LongestLength => value
                    .as_i64()
                    .map(Value::Int)
                    .ok_or_else(|| TranslateError::invalid_value(key, "expected an integer"))?,
                _ => Value::coerce(value, &attribute.ty, &attribute.name)?,
            };
            let param = self.bind(&mut out.params, &key_ctx.path, bound);
            let param = if aggregation.over_length() || aggregation == Aggregation::Average {
                param
            } else {
                self.typed_param(attribute, param, false)
            };

            let property = var.prop(&attribute.database_name);
            let predicate = match aggregation.function() {
                None => {
                    let item = self.namer.fresh("var");
                    Expr::Quantified {
                        quantifier: Quantifier::Any,
                        list: Box::new(Expr::call("collect", vec![property])),
                        predicate: Box::new(Expr::binary(op, item.expr(), param)),
                        var: item,
                    }
                }
                Some(function) => {
                    let input = if aggregation.over_length() {
                        Expr::call("size", vec![property])
                    } else {
                        property
                    };
                    Expr::binary(op, Expr::call(function, vec![input]), param)
                }
            };
            predicates.push(predicate);
        }
        out.value = Expr::all_of(predicates);
        Ok(out)
    }

    /// Shared handling of `AND`/`OR` lists and `NOT` objects.
    fn logical_parts(
        &mut self,
        key: &str,
        value: &Json,
        ctx: &QueryAstContext,
        mut compile: impl FnMut(
            &mut Self,
            &serde_json::Map<String, Json>,
            &QueryAstContext,
        ) -> Result<Fragment<Option<Expr>>>,
    ) -> Result<Fragment<Option<Expr>>> {
        let mut out = Fragment::new(None);
        if key == "NOT" {
            let inner = compile(self, object(key, value)?, ctx)?;
            out.value = out.absorb(inner).map(Expr::negate);
            return Ok(out);
        }
        let items = value
            .as_array()
            .ok_or_else(|| TranslateError::invalid_value(key, "expected a list of filters"))?;
        let mut parts = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            let part = compile(self, object(key, item)?, &ctx.indexed(idx))?;
            parts.extend(out.absorb(part));
        }
        out.value = if key == "AND" {
            Expr::all_of(parts)
        } else {
            Expr::any_of(parts)
        };
        Ok(out)
    }
}

fn count_operator(key: &str) -> Option<BinaryOp> {
    if key == "count" {
        return Some(BinaryOp::Eq);
    }
    let suffix = key.strip_prefix("count")?;
    COMPARISONS
        .iter()
        .find(|(s, _)| *s == suffix)
        .map(|(_, op)| *op)
}
