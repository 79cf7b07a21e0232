//! Filter trees compiled into predicates.
//!
//! A filter compiles to an optional predicate plus the subqueries it relies
//! on. Relationship quantifiers count related nodes in a `CALL { }` placed
//! before the predicate; the predicate compares the returned count.

use std::collections::BTreeMap;

use serde_json::Value as Json;
use tracing::trace;

use super::context::{Fragment, QueryAstContext};
use super::operators::{parse_key, FilterKey, FilterOperator, RelationQuantifier, Scope};
use super::request::JsonMap;
use super::{hop, member_inputs, object, Compiler};
use crate::error::{Result, TranslateError};
use crate::query::ast::{
    BinaryOp, Block, Clause, Expr, NodePattern, Projection, Quantifier, Var,
};
use crate::query::Value;
use crate::schema::{Attribute, ConcreteEntity, Relationship, TargetKind};

/// Related-node predicate compiled for one concrete member.
pub(crate) struct MemberFilter<'a> {
    pub member: &'a ConcreteEntity,
    pub node: Var,
    pub edge: Option<Var>,
    pub predicate: Fragment<Option<Expr>>,
}

impl<'a> Compiler<'a> {
    /// Compiles `filter` against `ctx.target` (or the relationship variable
    /// for edge scopes, which callers pass as the target).
    pub(crate) fn compile_where(
        &mut self,
        scope: Scope<'a>,
        filter: &JsonMap,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        let mut out = Fragment::new(None);
        let mut predicates = Vec::new();
        for (key, value) in filter {
            let key_ctx = ctx.at(key);
            match key.as_str() {
                "AND" | "OR" => {
                    let items = value.as_array().ok_or_else(|| {
                        TranslateError::malformed_key(scope.name(), key, "expected a list of filters")
                    })?;
                    let mut parts = Vec::new();
                    for (idx, item) in items.iter().enumerate() {
                        let map = object(key, item)?;
                        let part = self.compile_where(scope, map, &key_ctx.indexed(idx))?;
                        parts.extend(out.absorb(part));
                    }
                    let joined = if key == "AND" {
                        Expr::all_of(parts)
                    } else {
                        Expr::any_of(parts)
                    };
                    predicates.extend(joined);
                }
                "NOT" => {
                    let map = object(key, value)?;
                    let inner = self.compile_where(scope, map, &key_ctx)?;
                    if let Some(predicate) = out.absorb(inner) {
                        predicates.push(predicate.negate());
                    }
                }
                _ => {
                    let part = self.compile_key(scope, key, value, &key_ctx)?;
                    predicates.extend(out.absorb(part));
                }
            }
        }
        out.value = Expr::all_of(predicates);
        Ok(out)
    }

    fn compile_key(
        &mut self,
        scope: Scope<'a>,
        key: &str,
        value: &Json,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        match parse_key(scope, key)? {
            FilterKey::Attribute {
                attribute,
                operator,
            } => self.attribute_predicate(attribute, operator, value, ctx),
            FilterKey::Typename => {
                let names = value.as_array().ok_or_else(|| {
                    TranslateError::invalid_value(key, "expected a list of type names")
                })?;
                let matches = names.iter().any(|n| n.as_str() == Some(scope.name()));
                Ok(Fragment::new(Some(Expr::lit(matches))))
            }
            FilterKey::Relationship {
                relationship,
                quantifier,
                bare,
            } => self.relationship_filter(relationship, quantifier, bare, value, ctx),
            FilterKey::Connection {
                relationship,
                quantifier,
            } => self.connection_filter(relationship, quantifier, value, ctx),
            FilterKey::Aggregate { relationship } => {
                let Scope::Node(entity) = scope else {
                    return Err(TranslateError::malformed_key(
                        scope.name(),
                        key,
                        "aggregate filters need a node scope",
                    ));
                };
                self.aggregate_filter(entity, relationship, value, ctx)
            }
        }
    }

    /// Predicate for a single `<field><suffix>` key.
    pub(crate) fn attribute_predicate(
        &mut self,
        attribute: &'a Attribute,
        operator: FilterOperator,
        value: &Json,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        let property = ctx.target.prop(&attribute.database_name);
        if value.is_null() {
            let predicate = match operator {
                FilterOperator::Eq => Expr::IsNull(Box::new(property)),
                FilterOperator::Not => Expr::IsNotNull(Box::new(property)),
                _ => {
                    return Err(TranslateError::invalid_value(
                        &attribute.name,
                        "null is only accepted by equality filters",
                    ))
                }
            };
            return Ok(Fragment::new(Some(predicate)));
        }

        let mut out = Fragment::new(None);
        let positive = operator.positive();

        if attribute.is_spatial() && (operator.is_ordering() || positive == FilterOperator::Distance) {
            let (point, distance) = distance_input(attribute, value)?;
            let mut record = BTreeMap::new();
            record.insert("point".to_owned(), point);
            record.insert("distance".to_owned(), Value::Float(distance));
            let param = self.bind(&mut out.params, &ctx.path, Value::Map(record));
            let lhs = Expr::call(
                "point.distance",
                vec![property, Expr::call("point", vec![param.clone().prop("point")])],
            );
            out.value = Some(operator.apply(lhs, param.prop("distance")));
            return Ok(out);
        }

        let (coerced, list) = match positive {
            FilterOperator::In => (
                Value::coerce_list(value, attribute.ty.element(), &attribute.name)?,
                true,
            ),
            FilterOperator::Includes => (
                Value::coerce(value, attribute.ty.element(), &attribute.name)?,
                false,
            ),
            _ => (
                Value::coerce(value, &attribute.ty, &attribute.name)?,
                attribute.is_list(),
            ),
        };
        let param = self.bind(&mut out.params, &ctx.path, coerced);
        let param = self.typed_param(attribute, param, list);

        let predicate = if attribute.is_duration() && operator.is_ordering() {
            let now = || Expr::call("datetime", Vec::new());
            operator.apply(
                Expr::binary(BinaryOp::Add, now(), property),
                Expr::binary(BinaryOp::Add, now(), param),
            )
        } else {
            operator.apply(property, param)
        };
        out.value = Some(predicate);
        Ok(out)
    }

    /// `<rel>`, `<rel>_NOT` and `<rel>_{SOME,NONE,ALL,SINGLE}`.
    fn relationship_filter(
        &mut self,
        rel: &'a Relationship,
        quantifier: RelationQuantifier,
        bare: bool,
        value: &Json,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        let targets = self.targets(rel)?;
        if value.is_null() {
            if !bare {
                return Err(TranslateError::invalid_value(
                    &rel.name,
                    "null is only accepted by the bare relationship filter",
                ));
            }
            let labels = if targets.len() == 1 && !rel.is_composite_target() {
                targets[0].labels.clone()
            } else {
                Vec::new()
            };
            let exists = Expr::Exists {
                pattern: hop(&ctx.target, rel, None, NodePattern::anonymous(&labels)),
                filter: None,
            };
            let predicate = if quantifier == RelationQuantifier::None {
                exists
            } else {
                exists.negate()
            };
            return Ok(Fragment::new(Some(predicate)));
        }

        let mut members = Vec::new();
        for (member, input) in member_inputs(rel, &targets, value)? {
            let filter = object(&rel.name, input)?;
            let node = self.namer.fresh("this");
            let member_ctx = if rel.target_kind == TargetKind::Union {
                ctx.at(&member.name).nested(&node, None)
            } else {
                ctx.nested(&node, None)
            };
            let predicate = self.compile_where(Scope::Node(member), filter, &member_ctx)?;
            members.push(MemberFilter {
                member,
                node,
                edge: None,
                predicate,
            });
        }
        trace!(relationship = %rel.name, members = members.len(), "filter.relationship");
        self.quantify(rel, quantifier, members, ctx)
    }

    /// `<rel>Connection[_QUANTIFIER]` with `node` and `edge` sub-filters.
    fn connection_filter(
        &mut self,
        rel: &'a Relationship,
        quantifier: RelationQuantifier,
        value: &Json,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        let targets = self.targets(rel)?;
        let mut members = Vec::new();
        for (member, input) in member_inputs(rel, &targets, value)? {
            let filter = object(&rel.name, input)?;
            if rel.target_kind == TargetKind::Interface && !on_selects(filter, &member.name) {
                continue;
            }
            let node = self.namer.fresh("this");
            let edge = self.namer.fresh("this");
            let member_ctx = if rel.target_kind == TargetKind::Union {
                ctx.at(&member.name).nested(&node, Some(&edge))
            } else {
                ctx.nested(&node, Some(&edge))
            };
            let predicate = self.connection_where(member, rel, filter, &member_ctx)?;
            members.push(MemberFilter {
                member,
                node,
                edge: Some(edge),
                predicate,
            });
        }
        if members.is_empty() {
            return Err(TranslateError::malformed_key(
                &rel.target,
                "_on",
                "_on is used as the only argument and node is not present within",
            ));
        }
        self.quantify(rel, quantifier, members, ctx)
    }

    /// Compiles a connection filter object (`node`, `edge`, `AND`, `OR`,
    /// `NOT`) for one member; `ctx.target` is the node and
    /// `ctx.relationship` the edge.
    pub(crate) fn connection_where(
        &mut self,
        member: &'a ConcreteEntity,
        rel: &'a Relationship,
        filter: &JsonMap,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        let mut out = Fragment::new(None);
        let mut predicates = Vec::new();
        for (key, value) in filter {
            let key_ctx = ctx.at(key);
            match key.as_str() {
                "AND" | "OR" => {
                    let items = value.as_array().ok_or_else(|| {
                        TranslateError::malformed_key(&member.name, key, "expected a list of filters")
                    })?;
                    let mut parts = Vec::new();
                    for (idx, item) in items.iter().enumerate() {
                        let map = object(key, item)?;
                        let part = self.connection_where(member, rel, map, &key_ctx.indexed(idx))?;
                        parts.extend(out.absorb(part));
                    }
                    predicates.extend(if key == "AND" {
                        Expr::all_of(parts)
                    } else {
                        Expr::any_of(parts)
                    });
                }
                "NOT" => {
                    let map = object(key, value)?;
                    let inner = self.connection_where(member, rel, map, &key_ctx)?;
                    if let Some(predicate) = out.absorb(inner) {
                        predicates.push(predicate.negate());
                    }
                }
                "node" => {
                    let node_filter = node_filter_for(object(key, value)?, &member.name)?;
                    let part = self.compile_where(Scope::Node(member), &node_filter, &key_ctx)?;
                    predicates.extend(out.absorb(part));
                }
                "edge" => {
                    let props = rel.properties.as_ref().ok_or_else(|| {
                        TranslateError::schema(format!(
                            "relationship '{}' declares no edge properties",
                            rel.name
                        ))
                    })?;
                    let edge = ctx.relationship.as_ref().ok_or_else(|| {
                        TranslateError::schema(format!(
                            "edge filter on '{}' without a relationship variable",
                            rel.name
                        ))
                    })?;
                    let part =
                        self.compile_where(Scope::Edge(props), object(key, value)?, &key_ctx.retarget(edge))?;
                    predicates.extend(out.absorb(part));
                }
                other => {
                    return Err(TranslateError::malformed_key(
                        &member.name,
                        other,
                        "connection filters accept node, edge, AND, OR and NOT",
                    ))
                }
            }
        }
        out.value = Expr::all_of(predicates);
        Ok(out)
    }

    /// Turns per-member predicates into the quantified parent predicate.
    pub(crate) fn quantify(
        &mut self,
        rel: &'a Relationship,
        quantifier: RelationQuantifier,
        members: Vec<MemberFilter<'a>>,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        let mut out = Fragment::new(None);

        // Only nullable to-one relationships take the direct `single()` form.
        if let [only] = members.as_slice() {
            let direct = rel.is_nullable_to_one()
                && !rel.is_composite_target()
                && quantifier == RelationQuantifier::Some
                && only.predicate.subqueries.is_empty();
            if direct {
                let member = members.into_iter().next().ok_or_else(|| {
                    TranslateError::schema(format!("relationship '{}' has no members", rel.name))
                })?;
                let (inner, _) = out.absorb_params(member.predicate);
                let pattern = hop(
                    &ctx.target,
                    rel,
                    member.edge.as_ref(),
                    NodePattern::new(&member.node, &member.member.labels),
                );
                let var = self.namer.fresh("var");
                out.value = Some(Expr::Quantified {
                    quantifier: Quantifier::Single,
                    var,
                    list: Box::new(Expr::PatternComprehension {
                        pattern,
                        filter: inner.map(Box::new),
                        map: Box::new(Expr::lit(1_i64)),
                    }),
                    predicate: Box::new(Expr::lit(true)),
                });
                return Ok(out);
            }
        }

        let union = rel.target_kind == TargetKind::Union;
        let mut counts = Vec::new();
        for member in members {
            let (inner, subqueries) = out.absorb_params(member.predicate);
            let inner = match quantifier {
                RelationQuantifier::All => match inner {
                    Some(predicate) => Some(predicate.negate()),
                    // Every related node passes an empty filter.
                    None => continue,
                },
                _ => inner,
            };
            let count = self.namer.fresh("var");
            let pattern = hop(
                &ctx.target,
                rel,
                member.edge.as_ref(),
                NodePattern::new(&member.node, &member.member.labels),
            );
            let mut body = Block::new();
            body.push(Clause::with_vars([&ctx.target]));
            if subqueries.is_empty() {
                body.push(Clause::Match {
                    optional: false,
                    pattern,
                    where_: inner,
                });
            } else {
                body.push(Clause::Match {
                    optional: false,
                    pattern,
                    where_: None,
                });
                body.extend(subqueries);
                if let Some(predicate) = inner {
                    body.push(Clause::filter(predicate));
                }
            }
            body.push(Clause::Return(Projection::single(
                Expr::call("count", vec![member.node.expr()]),
                &count,
            )));
            out.subqueries.push(Clause::call(body));
            counts.push(count.expr());
        }

        if counts.is_empty() {
            return Ok(out);
        }
        out.value = if union {
            Expr::all_of(counts.into_iter().map(|c| compare_count(quantifier, c)))
        } else {
            counts
                .into_iter()
                .reduce(|acc, c| Expr::binary(BinaryOp::Add, acc, c))
                .map(|sum| compare_count(quantifier, sum))
        };
        Ok(out)
    }
}

/// Compares a related-node count according to the quantifier.
pub(crate) fn compare_count(quantifier: RelationQuantifier, count: Expr) -> Expr {
    let (op, bound) = match quantifier {
        RelationQuantifier::Some => (BinaryOp::Gt, 0_i64),
        RelationQuantifier::None | RelationQuantifier::All => (BinaryOp::Eq, 0),
        RelationQuantifier::Single => (BinaryOp::Eq, 1),
    };
    Expr::binary(op, count, Expr::lit(bound))
}

/// Whether an interface connection filter applies to `member`: a `node`
/// filter made only of `_on` selects the members it names.
fn on_selects(filter: &JsonMap, member: &str) -> bool {
    match filter.get("node").and_then(Json::as_object) {
        Some(node) if node.len() == 1 => match node.get("_on").and_then(Json::as_object) {
            Some(on) => on.contains_key(member),
            None => true,
        },
        _ => true,
    }
}

/// Shared node filter merged with the member's `_on` entry.
fn node_filter_for(node: &JsonMap, member: &str) -> Result<JsonMap> {
    let mut merged = JsonMap::new();
    for (key, value) in node {
        if key != "_on" {
            merged.insert(key.clone(), value.clone());
        }
    }
    if let Some(on) = node.get("_on") {
        let on = on
            .as_object()
            .ok_or_else(|| TranslateError::invalid_value("_on", "expected an object"))?;
        if let Some(specific) = on.get(member) {
            for (key, value) in object("_on", specific)? {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(merged)
}

fn distance_input(attribute: &Attribute, value: &Json) -> Result<(Value, f64)> {
    let map = value.as_object().ok_or_else(|| {
        TranslateError::invalid_value(&attribute.name, "expected { point, distance }")
    })?;
    let point = map
        .get("point")
        .ok_or_else(|| TranslateError::invalid_value(&attribute.name, "missing 'point'"))?;
    let distance = map
        .get("distance")
        .and_then(Json::as_f64)
        .ok_or_else(|| TranslateError::invalid_value(&attribute.name, "missing numeric 'distance'"))?;
    let point = Value::coerce(point, attribute.ty.element(), &attribute.name)?;
    Ok((point, distance))
}
