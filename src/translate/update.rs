//! Update mutations.
//!
//! The input is the node update object. Attribute keys take plain values or
//! an operator suffix; relationship keys take a list of operations:
//!
//! ```json
//! { "title": "Matrix", "views_INCREMENT": 1, "tags_PUSH": ["scifi"],
//!   "actors": [{ "where": { "node": { "name": "Keanu" } },
//!                "update": { "node": { "name": "K." }, "edge": { "role": "Neo" } },
//!                "connect": [..], "disconnect": [..], "create": [..], "delete": [..] }] }
//! ```

use serde_json::Value as Json;
use tracing::{debug, trace};

use super::authorization::guarded_fields;
use super::context::{Fragment, QueryAstContext};
use super::create::timestamp_function;
use super::operators::Scope;
use super::read::MatchStep;
use super::request::{JsonMap, Request};
use super::{hop, member_inputs, object, object_list, Compiler};
use crate::error::{Result, TranslateError};
use crate::query::ast::{
    BinaryOp, Block, Clause, Expr, NodePattern, Pattern, Projection, SetItem, Var,
};
use crate::query::{Params, Value};
use crate::schema::{
    Attribute, AttributeAnnotations, AuthOperation, ConcreteEntity, Entity, Relationship, ScalarKind,
    TargetKind, TypeKind,
};

const INT_MAX: i64 = 2_147_483_647;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MathOp {
    Increment,
    Decrement,
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathOp {
    fn binary(self) -> BinaryOp {
        match self {
            MathOp::Increment | MathOp::Add => BinaryOp::Add,
            MathOp::Decrement | MathOp::Subtract => BinaryOp::Sub,
            MathOp::Multiply => BinaryOp::Mul,
            MathOp::Divide => BinaryOp::Div,
        }
    }

    /// Integer operators apply to `Int` and `BigInt`, the others to `Float`.
    fn accepts(self, attribute: &Attribute) -> bool {
        match self {
            MathOp::Increment | MathOp::Decrement => attribute.is_int() || attribute.is_big_int(),
            _ => attribute.is_float(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UpdateOp {
    Set,
    Push,
    Pop,
    Math(MathOp),
}

const SUFFIXES: &[(&str, UpdateOp)] = &[
    ("_PUSH", UpdateOp::Push),
    ("_POP", UpdateOp::Pop),
    ("_INCREMENT", UpdateOp::Math(MathOp::Increment)),
    ("_DECREMENT", UpdateOp::Math(MathOp::Decrement)),
    ("_ADD", UpdateOp::Math(MathOp::Add)),
    ("_SUBTRACT", UpdateOp::Math(MathOp::Subtract)),
    ("_MULTIPLY", UpdateOp::Math(MathOp::Multiply)),
    ("_DIVIDE", UpdateOp::Math(MathOp::Divide)),
];

/// Resolves `<field>[_<OP>]`; an exact attribute name wins over a suffix.
fn parse_update_key<'s>(scope: Scope<'s>, key: &str) -> Option<(&'s Attribute, UpdateOp, &'static str)> {
    if let Some(attribute) = scope.attribute(key) {
        return Some((attribute, UpdateOp::Set, ""));
    }
    SUFFIXES.iter().find_map(|(suffix, op)| {
        key.strip_suffix(suffix)
            .and_then(|field| scope.attribute(field))
            .map(|attribute| (attribute, *op, *suffix))
    })
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Int(v) | Value::BigInt(v) => *v == 0,
        Value::Float(v) => *v == 0.0,
        _ => false,
    }
}

impl<'a> Compiler<'a> {
    pub(crate) fn update(&mut self, request: &Request) -> Result<Fragment<Block>> {
        let entity = match self.entity(&request.entity)? {
            Entity::Concrete(entity) => entity,
            Entity::Composite(composite) => {
                return Err(TranslateError::schema(format!(
                    "'{}' is abstract and cannot be updated",
                    composite.name
                )))
            }
        };
        let empty = JsonMap::new();
        let input = match &request.mutation_input {
            None | Some(Json::Null) => &empty,
            Some(value) => object("mutationInput", value)?,
        };
        debug!(entity = %entity.name, keys = input.len(), "translate.update");

        let this = self.namer.root();
        let ctx = QueryAstContext::root(&this);
        let written = written_fields(entity, input);
        let mut out = Fragment::new(Block::new());
        let filter = self.node_filter(entity, request.where_.as_ref(), &ctx)?;
        let step = MatchStep {
            pattern: Pattern::node(NodePattern::new(&this, &entity.labels)),
            optional: false,
            entity,
            operation: AuthOperation::Update,
            fields: written.clone(),
        };
        self.filtered_match(&mut out, step, filter, &ctx)?;

        let (writes, overwritten) = self.update_node(entity, &this, input, &ctx.at("update"))?;
        out.append(writes);
        for check in self.cardinality_checks(entity, &this, &overwritten)? {
            out.push(check);
        }
        self.validate_after(&mut out, entity, AuthOperation::Update, &written, &ctx)?;

        let fields = guarded_fields(entity, request.selection.iter().map(|f| f.name.as_str()));
        let items = self.project(entity, &request.selection, &[], &this, &ctx)?;
        let items = out.splice(items);
        self.validate_after(&mut out, entity, AuthOperation::Read, &fields, &ctx)?;
        out.push(Clause::Return(Projection::single(
            Expr::Function {
                name: "collect".to_owned(),
                distinct: true,
                args: vec![Expr::MapProjection { var: this, items }],
            },
            &Var::new("data"),
        )));
        Ok(out)
    }

    /// Attribute writes and nested relationship operations on `node`.
    ///
    /// Returns the clauses and the list relationships connected with
    /// overwrite; cardinality and `AFTER` checks are left to the caller.
    fn update_node(
        &mut self,
        entity: &'a ConcreteEntity,
        node: &Var,
        input: &JsonMap,
        ctx: &QueryAstContext,
    ) -> Result<(Fragment<Block>, Vec<&'a str>)> {
        let mut out = Fragment::new(Block::new());
        let (guards, assignments) = self.update_assignments(Scope::Node(entity), node, input, ctx, &mut out.params)?;
        for guard in guards {
            out.push(guard);
        }
        if !assignments.is_empty() {
            out.push(Clause::Set(assignments));
        }

        let mut overwritten = Vec::new();
        for (key, value) in input {
            let Some(rel) = entity.relationship(key) else {
                continue;
            };
            let targets = self.targets(rel)?;
            let rel_ctx = ctx.at(key);
            for (member, ops) in member_inputs(rel, &targets, value)? {
                let member_ctx = if rel.target_kind == TargetKind::Union {
                    rel_ctx.at(&member.name)
                } else {
                    rel_ctx.clone()
                };
                for (idx, op) in object_list(key, ops)?.into_iter().enumerate() {
                    let op_ctx = member_ctx.indexed(idx);
                    let where_ = op.get("where").map(|w| object("where", w)).transpose()?;
                    for (name, payload) in op {
                        let list_ctx = op_ctx.at(name);
                        match name.as_str() {
                            "where" => {}
                            "update" => {
                                let nested =
                                    self.nested_update(rel, member, node, where_, object(name, payload)?, &op_ctx)?;
                                out.append(nested);
                            }
                            "connect" => {
                                for (i, item) in object_list(name, payload)?.into_iter().enumerate() {
                                    let (connect, overwrite) =
                                        self.connect(entity, node, rel, member, item, ctx, &list_ctx.indexed(i))?;
                                    out.append(connect);
                                    if overwrite && rel.list && !overwritten.contains(&rel.name.as_str()) {
                                        overwritten.push(rel.name.as_str());
                                    }
                                }
                            }
                            "disconnect" => {
                                for (i, item) in object_list(name, payload)?.into_iter().enumerate() {
                                    let disconnect =
                                        self.disconnect(entity, node, rel, member, item, ctx, &list_ctx.indexed(i))?;
                                    out.append(disconnect);
                                }
                            }
                            "create" => {
                                for (i, item) in object_list(name, payload)?.into_iter().enumerate() {
                                    if let Some(nested) = self.nested_create(node, rel, member, item, &list_ctx.indexed(i))? {
                                        out.append(nested);
                                    }
                                }
                            }
                            "delete" => {
                                for (i, item) in object_list(name, payload)?.into_iter().enumerate() {
                                    let (delete, _) =
                                        self.delete_related(rel, member, node, item, &list_ctx.indexed(i), false)?;
                                    out.append(delete);
                                }
                            }
                            other => {
                                return Err(TranslateError::invalid_value(
                                    format!("{key}.{other}"),
                                    "relationship update input accepts where, update, connect, disconnect, create and delete",
                                ))
                            }
                        }
                    }
                }
            }
        }
        Ok((out, overwritten))
    }

    /// `{ update: { node, edge } }` applied to the related nodes matching
    /// `where_`.
    fn nested_update(
        &mut self,
        rel: &'a Relationship,
        member: &'a ConcreteEntity,
        parent: &Var,
        where_: Option<&JsonMap>,
        payload: &JsonMap,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Block>> {
        let child = self.namer.fresh("this");
        let edge = self.namer.fresh("this");
        let node_ctx = ctx.nested(&child, Some(&edge));
        let node_input = payload.get("node").map(|n| object("node", n)).transpose()?;
        let edge_input = payload.get("edge").map(|e| object("edge", e)).transpose()?;
        let written = node_input.map(|n| written_fields(member, n)).unwrap_or_default();
        trace!(relationship = %rel.name, member = %member.name, "update.nested");

        let filter = match where_ {
            Some(filter) => self.connection_where(member, rel, filter, &node_ctx.at("where"))?,
            None => Fragment::new(None),
        };
        let mut body = Fragment::new(Block::new());
        body.push(Clause::with_vars([parent]));
        let step = MatchStep {
            pattern: hop(parent, rel, Some(&edge), NodePattern::new(&child, &member.labels)),
            optional: false,
            entity: member,
            operation: AuthOperation::Update,
            fields: written.clone(),
        };
        self.filtered_match(&mut body, step, filter, &node_ctx)?;

        let mut overwritten = Vec::new();
        if let Some(node_input) = node_input {
            let (writes, connected) = self.update_node(member, &child, node_input, &node_ctx.at("update").at("node"))?;
            body.append(writes);
            overwritten = connected;
        }
        if let Some(edge_input) = edge_input {
            let props = rel.properties.as_ref().ok_or_else(|| {
                TranslateError::schema(format!("relationship '{}' declares no edge properties", rel.name))
            })?;
            let edge_ctx = ctx.at("update").at("edge");
            let (guards, assignments) =
                self.update_assignments(Scope::Edge(props), &edge, edge_input, &edge_ctx, &mut body.params)?;
            for guard in guards {
                body.push(guard);
            }
            if !assignments.is_empty() {
                body.push(Clause::Set(assignments));
            }
        }
        for check in self.cardinality_checks(member, &child, &overwritten)? {
            body.push(check);
        }
        self.validate_after(&mut body, member, AuthOperation::Update, &written, &node_ctx)?;
        let column = self.namer.fresh("var");
        body.push(Clause::Return(Projection::single(Expr::CountAll, &column)));

        let mut out = Fragment::new(Block::new());
        out.params.merge(body.params);
        out.push(Clause::call(body.value));
        Ok(out)
    }

    /// Removes the relationships to nodes matching a disconnect input.
    #[allow(clippy::too_many_arguments)]
    fn disconnect(
        &mut self,
        origin: &'a ConcreteEntity,
        parent: &Var,
        rel: &'a Relationship,
        member: &'a ConcreteEntity,
        item: &JsonMap,
        origin_ctx: &QueryAstContext,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Block>> {
        let target = self.namer.fresh("this");
        let edge = self.namer.fresh("this");
        let node_ctx = ctx.nested(&target, Some(&edge));
        let filter = match item.get("where") {
            Some(filter) => self.connection_where(member, rel, object("where", filter)?, &node_ctx.at("where"))?,
            None => Fragment::new(None),
        };

        let mut body = Fragment::new(Block::new());
        body.push(Clause::with_vars([parent]));
        let step = MatchStep {
            pattern: hop(parent, rel, Some(&edge), NodePattern::new(&target, &member.labels)),
            optional: true,
            entity: member,
            operation: AuthOperation::DeleteRelationship,
            fields: Vec::new(),
        };
        self.filtered_match(&mut body, step, filter, &node_ctx)?;

        let mut inner = Fragment::new(Block::new());
        inner.push(Clause::With {
            projection: Projection::vars([parent, &target, &edge]),
            where_: Some(Expr::IsNotNull(Box::new(edge.expr()))),
        });
        inner.push(Clause::Delete {
            detach: false,
            targets: vec![edge.expr()],
        });
        if let Some(check) = self.inverse_cardinality_check(origin, rel, member, &target)? {
            inner.push(check);
        }
        self.validate_after(&mut inner, origin, AuthOperation::DeleteRelationship, &[], origin_ctx)?;
        let ignored = self.namer.fresh("var");
        inner.push(Clause::Return(Projection::single(Expr::CountAll, &ignored)));
        body.params.merge(inner.params);
        body.push(Clause::call(inner.value));

        let column = self.namer.fresh("var");
        body.push(Clause::Return(Projection::single(Expr::CountAll, &column)));
        let mut out = Fragment::new(Block::new());
        out.params.merge(body.params);
        out.push(Clause::call(body.value));
        Ok(out)
    }

    /// Null guards and `SET` items for an update input.
    fn update_assignments(
        &mut self,
        scope: Scope<'a>,
        var: &Var,
        input: &JsonMap,
        ctx: &QueryAstContext,
        params: &mut Params,
    ) -> Result<(Vec<Clause>, Vec<SetItem>)> {
        let mut guards = Vec::new();
        let mut items = Vec::new();
        let mut seen: Vec<&str> = Vec::new();
        for (key, raw) in input {
            if scope.relationship(key).is_some() {
                continue;
            }
            let (attribute, op, suffix) =
                parse_update_key(scope, key).ok_or_else(|| TranslateError::unknown_field(scope.name(), key))?;
            if seen.contains(&attribute.name.as_str()) {
                return Err(TranslateError::invalid_value(
                    key,
                    "Cannot mutate the same field multiple times in one Mutation",
                ));
            }
            seen.push(&attribute.name);
            if !attribute.is_part_of_update_input() {
                return Err(TranslateError::invalid_value(key, "field cannot be set on update"));
            }
            let property = var.prop(&attribute.database_name);
            let value = match op {
                UpdateOp::Set => self.attribute_value(attribute, raw, ctx, params)?,
                UpdateOp::Push => {
                    if !attribute.is_array_method_field() {
                        return Err(TranslateError::invalid_value(key, "_PUSH requires a list field"));
                    }
                    let elements = match raw {
                        Json::Array(_) => Value::coerce_list(raw, attribute.ty.element(), key)?,
                        single => Value::List(vec![Value::coerce(single, attribute.ty.element(), key)?]),
                    };
                    let param = self.bind(params, &ctx.param_path(key), elements);
                    guards.push(not_null_guard(&property, &attribute.name));
                    Expr::binary(BinaryOp::Add, property.clone(), self.typed_param(attribute, param, true))
                }
                UpdateOp::Pop => {
                    if !attribute.is_array_method_field() {
                        return Err(TranslateError::invalid_value(key, "_POP requires a list field"));
                    }
                    let count = raw
                        .as_i64()
                        .filter(|n| *n >= 0)
                        .ok_or_else(|| TranslateError::invalid_value(key, "_POP expects a non-negative integer"))?;
                    let param = self.bind(params, &ctx.param_path(key), Value::Int(count));
                    guards.push(not_null_guard(&property, &attribute.name));
                    Expr::Slice {
                        list: Box::new(property.clone()),
                        from: Some(Box::new(Expr::lit(0_i64))),
                        to: Some(Box::new(Expr::binary(
                            BinaryOp::Sub,
                            Expr::call("size", vec![property.clone()]),
                            param,
                        ))),
                    }
                }
                UpdateOp::Math(math) => {
                    if !math.accepts(attribute) {
                        return Err(TranslateError::invalid_value(
                            key,
                            format!("{suffix} is not supported on {}", attribute.ty),
                        ));
                    }
                    let value = Value::coerce(raw, &attribute.ty, key)?;
                    if value.is_null() {
                        return Err(TranslateError::invalid_value(key, "operand cannot be null"));
                    }
                    if math == MathOp::Divide && is_zero(&value) {
                        return Err(TranslateError::invalid_value(key, "division by zero"));
                    }
                    let param = self.bind(params, &ctx.param_path(key), value);
                    guards.push(Clause::Validate {
                        condition: Expr::IsNull(Box::new(property.clone())),
                        message: "Cannot %s %s to Nan".to_owned(),
                        args: vec![Expr::lit(suffix), param.clone()],
                    });
                    let result = Expr::binary(math.binary(), property.clone(), param);
                    if matches!(attribute.ty.kind(), TypeKind::Scalar(ScalarKind::Int)) {
                        guards.push(Clause::Validate {
                            condition: Expr::And(vec![
                                Expr::IsNotNull(Box::new(property.clone())),
                                Expr::binary(BinaryOp::Gt, result.clone(), Expr::lit(INT_MAX)),
                            ]),
                            message: "Overflow: Value returned from operator %s is larger than %s bit".to_owned(),
                            args: vec![Expr::lit(suffix), Expr::lit("32")],
                        });
                    }
                    result
                }
            };
            items.push(SetItem {
                target: property,
                value,
            });
        }
        for attribute in scope.attributes() {
            let stamped = attribute.annotations.timestamp.as_ref().is_some_and(|t| t.on_update);
            if stamped && !seen.contains(&attribute.name.as_str()) {
                items.push(SetItem {
                    target: var.prop(&attribute.database_name),
                    value: Expr::call(timestamp_function(attribute), Vec::new()),
                });
            }
        }
        Ok((guards, items))
    }
}

fn not_null_guard(property: &Expr, field: &str) -> Clause {
    Clause::Validate {
        condition: Expr::IsNull(Box::new(property.clone())),
        message: "Property %s cannot be NULL".to_owned(),
        args: vec![Expr::lit(field)],
    }
}

/// Field annotations guarding the attributes an update input writes.
fn written_fields<'e>(entity: &'e ConcreteEntity, input: &JsonMap) -> Vec<&'e AttributeAnnotations> {
    let names: Vec<&str> = input
        .keys()
        .map(|key| {
            parse_update_key(Scope::Node(entity), key)
                .map_or(key.as_str(), |(attribute, _, _)| attribute.name.as_str())
        })
        .collect();
    guarded_fields(entity, names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeType;

    fn movie() -> ConcreteEntity {
        ConcreteEntity::new("Movie")
            .with_attribute(Attribute::new("views", AttributeType::named(TypeKind::Scalar(ScalarKind::Int))))
            .with_attribute(Attribute::new("views_PUSH", AttributeType::named(TypeKind::Scalar(ScalarKind::Int))))
            .with_attribute(Attribute::new("rating", AttributeType::named(TypeKind::Scalar(ScalarKind::Float))))
    }

    #[test]
    fn exact_names_win_over_suffixes() {
        let movie = movie();
        let scope = Scope::Node(&movie);
        let (attribute, op, _) = parse_update_key(scope, "views_PUSH").expect("exact");
        assert_eq!(attribute.name, "views_PUSH");
        assert_eq!(op, UpdateOp::Set);
        let (attribute, op, suffix) = parse_update_key(scope, "views_INCREMENT").expect("suffix");
        assert_eq!(attribute.name, "views");
        assert_eq!(op, UpdateOp::Math(MathOp::Increment));
        assert_eq!(suffix, "_INCREMENT");
        assert!(parse_update_key(scope, "likes_INCREMENT").is_none());
    }

    #[test]
    fn math_operators_check_types() {
        let movie = movie();
        let views = movie.attribute("views").expect("views");
        let rating = movie.attribute("rating").expect("rating");
        assert!(MathOp::Increment.accepts(views));
        assert!(!MathOp::Add.accepts(views));
        assert!(MathOp::Divide.accepts(rating));
        assert!(!MathOp::Decrement.accepts(rating));
        assert!(is_zero(&Value::Float(0.0)));
        assert!(!is_zero(&Value::Int(3)));
    }
}
