//! Aggregation selections.
//!
//! `<rel>Aggregate { count node { f { .. } } edge { .. } }` compiles to one
//! subquery per field that matches the related nodes and returns a single
//! map. Root `AGGREGATE` requests build the same map over the root match.

use tracing::{debug, trace};

use super::authorization::guarded_fields;
use super::context::{Fragment, QueryAstContext};
use super::operators::Scope;
use super::read::MatchStep;
use super::request::{FieldSelection, Request};
use super::{hop, upper_first, Compiler};
use crate::error::{Result, TranslateError};
use crate::query::ast::{BinaryOp, Block, Clause, Expr, NodePattern, Pattern, Projection, Var};
use crate::query::Namer;
use crate::schema::{Attribute, AuthOperation, ConcreteEntity, Entity, Relationship};

const TEXTUAL: &[&str] = &["shortest", "longest"];
const NUMERIC: &[&str] = &["min", "max", "average", "sum"];
const TEMPORAL: &[&str] = &["min", "max"];

/// Aggregations offered for an attribute.
fn aggregations(attribute: &Attribute) -> &'static [&'static str] {
    if attribute.is_textual() {
        TEXTUAL
    } else if attribute.is_numeric() {
        NUMERIC
    } else {
        TEMPORAL
    }
}

/// Shortest or longest of the collected values.
fn length_extreme(namer: &mut Namer, property: Expr, shortest: bool) -> Expr {
    let acc = namer.fresh("var");
    let current = namer.fresh("var");
    let values = Expr::call("collect", vec![property]);
    let op = if shortest { BinaryOp::Lt } else { BinaryOp::Gt };
    Expr::Reduce {
        init: Box::new(Expr::call("head", vec![values.clone()])),
        list: Box::new(values),
        expr: Box::new(Expr::Case {
            branches: vec![(
                Expr::binary(
                    op,
                    Expr::call("size", vec![current.expr()]),
                    Expr::call("size", vec![acc.expr()]),
                ),
                current.expr(),
            )],
            otherwise: Some(Box::new(acc.expr())),
        }),
        acc,
        var: current,
    }
}

impl<'a> Compiler<'a> {
    /// Subquery computing a `<rel>Aggregate` selection below `parent`.
    pub(crate) fn aggregate_field(
        &mut self,
        owner: &'a ConcreteEntity,
        rel: &'a Relationship,
        field: &FieldSelection,
        parent: &Var,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Var>> {
        if rel.is_composite_target() {
            return Err(TranslateError::schema(format!(
                "aggregation '{}' on '{}' targets a composite type",
                field.name, owner.name
            )));
        }
        let target = self.concrete(&rel.target)?;
        trace!(relationship = %rel.name, "projection.aggregate");
        let node = self.namer.fresh("this");
        let edge = self.namer.fresh("this");
        let node_ctx = ctx.nested(&node, Some(&edge));
        let node_fields = field.child("node").map(|n| n.selection.as_slice()).unwrap_or_default();
        let fields = guarded_fields(target, node_fields.iter().map(|f| f.name.as_str()));

        let mut body = Fragment::new(Block::new());
        body.push(Clause::with_vars([parent]));
        let filter = self.node_filter(target, field.args.where_.as_ref(), &node_ctx)?;
        let step = MatchStep {
            pattern: hop(parent, rel, Some(&edge), NodePattern::new(&node, &target.labels)),
            optional: false,
            entity: target,
            operation: AuthOperation::Aggregate,
            fields: fields.clone(),
        };
        self.filtered_match(&mut body, step, filter, &node_ctx)?;
        self.validate_after(&mut body, target, AuthOperation::Aggregate, &fields, &node_ctx)?;

        let mut result = Vec::new();
        for child in &field.selection {
            let value = match child.name.as_str() {
                "count" => Expr::call("count", vec![node.expr()]),
                "node" => Expr::Map(self.aggregate_entries(Scope::Node(target), &child.selection, &node)?),
                "edge" => {
                    let props = rel.properties.as_ref().ok_or_else(|| {
                        TranslateError::schema(format!(
                            "relationship '{}' declares no edge properties",
                            rel.name
                        ))
                    })?;
                    Expr::Map(self.aggregate_entries(Scope::Edge(props), &child.selection, &edge)?)
                }
                "__typename" => Expr::lit(format!(
                    "{}{}{}AggregationSelection",
                    owner.name,
                    target.name,
                    upper_first(&rel.name)
                )),
                other => return Err(TranslateError::unknown_field(&field.name, other)),
            };
            result.push((child.response_key().to_owned(), value));
        }
        let column = self.namer.fresh("var");
        body.push(Clause::Return(Projection::single(Expr::Map(result), &column)));

        let mut side = Fragment::new(());
        side.params.merge(body.params);
        side.subqueries.push(Clause::call(body.value));
        Ok(side.map(|()| column))
    }

    /// Root `AGGREGATE`: the read match followed by a single aggregated row.
    pub(crate) fn aggregate_root(&mut self, request: &Request) -> Result<Fragment<Block>> {
        let entity = match self.entity(&request.entity)? {
            Entity::Concrete(entity) => entity,
            Entity::Composite(composite) => {
                return Err(TranslateError::schema(format!(
                    "'{}' is abstract and cannot be aggregated",
                    composite.name
                )))
            }
        };
        debug!(entity = %entity.name, fields = request.selection.len(), "translate.aggregate");
        let this = self.namer.root();
        let ctx = QueryAstContext::root(&this);
        let fields = guarded_fields(entity, request.selection.iter().map(|f| f.name.as_str()));
        let mut out = Fragment::new(Block::new());

        let filter = self.node_filter(entity, request.where_.as_ref(), &ctx)?;
        let step = MatchStep {
            pattern: Pattern::node(NodePattern::new(&this, &entity.labels)),
            optional: false,
            entity,
            operation: AuthOperation::Aggregate,
            fields: fields.clone(),
        };
        self.filtered_match(&mut out, step, filter, &ctx)?;
        self.validate_after(&mut out, entity, AuthOperation::Aggregate, &fields, &ctx)?;

        let mut result = Vec::new();
        for field in &request.selection {
            let value = match field.name.as_str() {
                "count" => Expr::call("count", vec![this.expr()]),
                "__typename" => Expr::lit(format!("{}AggregateSelection", entity.name)),
                _ => self.aggregate_entry(Scope::Node(entity), field, &this)?,
            };
            result.push((field.response_key().to_owned(), value));
        }
        out.push(Clause::Return(Projection::single(Expr::Map(result), &this)));
        Ok(out)
    }

    fn aggregate_entries(
        &mut self,
        scope: Scope<'a>,
        selection: &[FieldSelection],
        var: &Var,
    ) -> Result<Vec<(String, Expr)>> {
        let mut entries = Vec::new();
        for field in selection {
            let value = if field.name == "__typename" {
                Expr::lit(format!("{}AggregateSelection", scope.name()))
            } else {
                self.aggregate_entry(scope, field, var)?
            };
            entries.push((field.response_key().to_owned(), value));
        }
        Ok(entries)
    }

    /// `{ min: min(v.f), .. }` for one attribute; every aggregation the
    /// type offers when no sub-selection is given.
    fn aggregate_entry(&mut self, scope: Scope<'a>, field: &FieldSelection, var: &Var) -> Result<Expr> {
        let attribute = scope
            .attribute(&field.name)
            .ok_or_else(|| TranslateError::unknown_field(scope.name(), &field.name))?;
        if !attribute.is_aggregable_field() {
            return Err(TranslateError::schema(format!(
                "field '{}' of '{}' cannot be aggregated",
                field.name,
                scope.name()
            )));
        }
        let offered = aggregations(attribute);
        let requested: Vec<(&str, &str)> = if field.selection.is_empty() {
            offered.iter().map(|name| (*name, *name)).collect()
        } else {
            field
                .selection
                .iter()
                .map(|sub| (sub.response_key(), sub.name.as_str()))
                .collect()
        };

        let property = var.prop(&attribute.database_name);
        let mut entries = Vec::new();
        for (key, name) in requested {
            let value = match name {
                "__typename" => Expr::lit(format!("{}AggregateSelection", attribute.ty.kind().name())),
                "shortest" | "longest" if offered.contains(&name) => {
                    length_extreme(&mut self.namer, property.clone(), name == "shortest")
                }
                "min" | "max" | "sum" if offered.contains(&name) => Expr::call(name, vec![property.clone()]),
                "average" if offered.contains(&name) => Expr::call("avg", vec![property.clone()]),
                other => return Err(TranslateError::unknown_field(&field.name, other)),
            };
            entries.push((key.to_owned(), value));
        }
        Ok(Expr::Map(entries))
    }
}
