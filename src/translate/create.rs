//! Create mutations.
//!
//! Every input object becomes its own `CALL { CREATE .. RETURN thisN }` so
//! nested creates and connects stay scoped to the node they belong to. The
//! created nodes are then unwound into `this` and projected like a read.
//!
//! Relationship fields in a node input take `{ create, connect }`:
//!
//! ```json
//! { "title": "Matrix",
//!   "actors": { "create": [{ "node": { "name": "Keanu" }, "edge": { "role": "Neo" } }],
//!               "connect": [{ "where": { "node": { "name": "Carrie" } }, "overwrite": true }] } }
//! ```

use serde_json::Value as Json;
use tracing::{debug, trace};

use super::authorization::guarded_fields;
use super::context::{Fragment, QueryAstContext};
use super::operators::Scope;
use super::read::MatchStep;
use super::request::{JsonMap, Request};
use super::{hop, member_inputs, object, object_list, Compiler};
use crate::error::{Result, TranslateError};
use crate::query::ast::{Block, Clause, Expr, NodePattern, Pattern, Projection, SetItem, Var};
use crate::query::{Params, Value};
use crate::schema::{
    Attribute, AuthOperation, ConcreteEntity, Entity, Relationship, TargetKind, TemporalKind,
};

/// Function producing the current value of a `@timestamp` attribute.
pub(crate) fn timestamp_function(attribute: &Attribute) -> &'static str {
    attribute
        .temporal_kind()
        .map_or("datetime", TemporalKind::cypher_function)
}

/// Relationship that links a freshly created node to its parent.
pub(crate) struct Link<'r, 'a> {
    pub parent: &'r Var,
    pub rel: &'a Relationship,
    pub edge: Option<&'r JsonMap>,
    pub edge_ctx: QueryAstContext,
}

impl<'a> Compiler<'a> {
    pub(crate) fn create(&mut self, request: &Request) -> Result<Fragment<Block>> {
        let entity = match self.entity(&request.entity)? {
            Entity::Concrete(entity) => entity,
            Entity::Composite(composite) => {
                return Err(TranslateError::schema(format!(
                    "'{}' is abstract and cannot be created",
                    composite.name
                )))
            }
        };
        let input = request.mutation_input.as_ref().unwrap_or(&Json::Null);
        let inputs = object_list("mutationInput", input)?;
        if inputs.is_empty() {
            return Err(TranslateError::invalid_value(
                "mutationInput",
                "create requires at least one input object",
            ));
        }
        debug!(entity = %entity.name, inputs = inputs.len(), "translate.create");

        let mut out = Fragment::new(Block::new());
        let mut created = Vec::new();
        for input in inputs {
            let node = self.namer.fresh("this");
            let ctx = QueryAstContext::root(&node);
            let mut body = self.create_node(entity, input, &node, &ctx, None)?;
            body.push(Clause::Return(Projection::vars([&node])));
            out.params.merge(body.params);
            out.push(Clause::call(body.value));
            created.push(node);
        }

        let this = self.namer.root();
        let ctx = QueryAstContext::root(&this);
        out.push(Clause::Unwind {
            expr: Expr::List(created.iter().map(Var::expr).collect()),
            alias: this.clone(),
        });
        let fields = guarded_fields(entity, request.selection.iter().map(|f| f.name.as_str()));
        let items = self.project(entity, &request.selection, &[], &this, &ctx)?;
        let items = out.splice(items);
        self.validate_after(&mut out, entity, AuthOperation::Read, &fields, &ctx)?;
        out.push(Clause::Return(Projection::single(
            Expr::call(
                "collect",
                vec![Expr::MapProjection {
                    var: this,
                    items,
                }],
            ),
            &Var::new("data"),
        )));
        Ok(out)
    }

    /// `CREATE` of one node with its attributes, optional parent link,
    /// nested relationship inputs and post-write assertions.
    pub(crate) fn create_node(
        &mut self,
        entity: &'a ConcreteEntity,
        input: &JsonMap,
        node: &Var,
        ctx: &QueryAstContext,
        link: Option<Link<'_, 'a>>,
    ) -> Result<Fragment<Block>> {
        let fields = guarded_fields(entity, input.keys().map(String::as_str));
        let mut out = Fragment::new(Block::new());
        out.push(Clause::Create {
            pattern: Pattern::node(NodePattern::new(node, &entity.labels)),
        });
        let assignments = self.create_assignments(Scope::Node(entity), node, input, ctx, &mut out.params)?;
        if !assignments.is_empty() {
            out.push(Clause::Set(assignments));
        }

        if let Some(link) = link {
            let edge = self.namer.fresh("this");
            out.push(Clause::Merge {
                pattern: hop(link.parent, link.rel, Some(&edge), NodePattern::bound(node)),
            });
            let assignments = self.edge_assignments(link.rel, &edge, link.edge, &link.edge_ctx, &mut out.params)?;
            if !assignments.is_empty() {
                out.push(Clause::Set(assignments));
            }
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
                for (op, items) in object(key, ops)? {
                    match op.as_str() {
                        "create" => {
                            for (idx, item) in object_list(op, items)?.into_iter().enumerate() {
                                let item_ctx = member_ctx.at("create").indexed(idx);
                                if let Some(nested) = self.nested_create(node, rel, member, item, &item_ctx)? {
                                    out.append(nested);
                                }
                            }
                        }
                        "connect" => {
                            for (idx, item) in object_list(op, items)?.into_iter().enumerate() {
                                let item_ctx = member_ctx.at("connect").indexed(idx);
                                let (connect, overwrite) = self.connect(entity, node, rel, member, item, ctx, &item_ctx)?;
                                out.append(connect);
                                if overwrite && rel.list && !overwritten.contains(&rel.name.as_str()) {
                                    overwritten.push(rel.name.as_str());
                                }
                            }
                        }
                        other => {
                            return Err(TranslateError::invalid_value(
                                format!("{key}.{other}"),
                                "relationship create input accepts create and connect",
                            ))
                        }
                    }
                }
            }
        }

        for check in self.cardinality_checks(entity, node, &overwritten)? {
            out.push(check);
        }
        self.validate_after(&mut out, entity, AuthOperation::Create, &fields, ctx)?;
        Ok(out)
    }

    /// `{ node, edge }` create below `parent`. Interface targets key `node`
    /// by member name; `None` when this member is not named.
    pub(crate) fn nested_create(
        &mut self,
        parent: &Var,
        rel: &'a Relationship,
        member: &'a ConcreteEntity,
        item: &JsonMap,
        ctx: &QueryAstContext,
    ) -> Result<Option<Fragment<Block>>> {
        let node_input = item
            .get("node")
            .ok_or_else(|| TranslateError::invalid_value(&rel.name, "create input requires node"))?;
        let mut node_input = object("node", node_input)?;
        let mut node_ctx = ctx.at("node");
        if rel.target_kind == TargetKind::Interface {
            let Some(input) = node_input.get(&member.name) else {
                return Ok(None);
            };
            node_input = object(&member.name, input)?;
            node_ctx = node_ctx.at(&member.name);
        }
        let edge = item.get("edge").map(|e| object("edge", e)).transpose()?;
        trace!(relationship = %rel.name, member = %member.name, "create.nested");

        let child = self.namer.fresh("this");
        let link = Link {
            parent,
            rel,
            edge,
            edge_ctx: ctx.at("edge"),
        };
        self.create_node(member, node_input, &child, &node_ctx, Some(link))
            .map(Some)
    }

    /// Links `parent` to the nodes matched by a connect input.
    ///
    /// `overwrite` (default `true`) merges the relationship; `false` always
    /// creates a new one. Returns the subquery and whether it overwrote.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn connect(
        &mut self,
        origin: &'a ConcreteEntity,
        parent: &Var,
        rel: &'a Relationship,
        member: &'a ConcreteEntity,
        item: &JsonMap,
        origin_ctx: &QueryAstContext,
        ctx: &QueryAstContext,
    ) -> Result<(Fragment<Block>, bool)> {
        let overwrite = match item.get("overwrite") {
            None | Some(Json::Null) => true,
            Some(Json::Bool(flag)) => *flag,
            Some(_) => return Err(TranslateError::invalid_value("overwrite", "expected a boolean")),
        };
        let target = self.namer.fresh("this");
        let edge = self.namer.fresh("this");
        let node_ctx = ctx.nested(&target, None);
        let filter = match item.get("where") {
            Some(filter) => self.connection_where(member, rel, object("where", filter)?, &node_ctx.at("where"))?,
            None => Fragment::new(None),
        };

        let mut body = Fragment::new(Block::new());
        body.push(Clause::with_vars([parent]));
        let step = MatchStep {
            pattern: Pattern::node(NodePattern::new(&target, &member.labels)),
            optional: true,
            entity: member,
            operation: AuthOperation::CreateRelationship,
            fields: Vec::new(),
        };
        self.filtered_match(&mut body, step, filter, &node_ctx)?;

        let mut inner = Fragment::new(Block::new());
        inner.push(Clause::With {
            projection: Projection::vars([parent, &target]),
            where_: Some(Expr::IsNotNull(Box::new(target.expr()))),
        });
        let pattern = hop(parent, rel, Some(&edge), NodePattern::bound(&target));
        inner.push(if overwrite {
            Clause::Merge { pattern }
        } else {
            Clause::Create { pattern }
        });
        let edge_input = item.get("edge").map(|e| object("edge", e)).transpose()?;
        let assignments = self.edge_assignments(rel, &edge, edge_input, &ctx.at("edge"), &mut inner.params)?;
        if !assignments.is_empty() {
            inner.push(Clause::Set(assignments));
        }
        if let Some(check) = self.inverse_cardinality_check(origin, rel, member, &target)? {
            inner.push(check);
        }
        self.validate_after(&mut inner, origin, AuthOperation::CreateRelationship, &[], origin_ctx)?;
        let ignored = self.namer.fresh("var");
        inner.push(Clause::Return(Projection::single(Expr::CountAll, &ignored)));
        body.params.merge(inner.params);
        body.push(Clause::call(inner.value));

        let column = self.namer.fresh("var");
        body.push(Clause::Return(Projection::single(Expr::CountAll, &column)));
        let mut out = Fragment::new(Block::new());
        out.params.merge(body.params);
        out.push(Clause::call(body.value));
        Ok((out, overwrite))
    }

    /// `SET` items for a create input, including generated, timestamp and
    /// default values of attributes the input leaves out.
    pub(crate) fn create_assignments(
        &mut self,
        scope: Scope<'a>,
        var: &Var,
        input: &JsonMap,
        ctx: &QueryAstContext,
        params: &mut Params,
    ) -> Result<Vec<SetItem>> {
        if let Some(unknown) = input
            .keys()
            .find(|key| scope.attribute(key).is_none() && scope.relationship(key).is_none())
        {
            return Err(TranslateError::unknown_field(scope.name(), unknown));
        }
        let mut items = Vec::new();
        for attribute in scope.attributes() {
            let value = if let Some(raw) = input.get(&attribute.name) {
                if !attribute.is_part_of_create_input() {
                    return Err(TranslateError::invalid_value(
                        &attribute.name,
                        "field cannot be set on create",
                    ));
                }
                self.attribute_value(attribute, raw, ctx, params)?
            } else if attribute.annotations.id.as_ref().is_some_and(|id| id.autogenerate) {
                Expr::call("randomUUID", Vec::new())
            } else if attribute.annotations.timestamp.as_ref().is_some_and(|t| t.on_create) {
                Expr::call(timestamp_function(attribute), Vec::new())
            } else if let Some(default) = &attribute.annotations.default {
                self.attribute_value(attribute, default, ctx, params)?
            } else {
                continue;
            };
            items.push(SetItem {
                target: var.prop(&attribute.database_name),
                value,
            });
        }
        Ok(items)
    }

    /// Create-time `SET` items for edge properties of `rel`.
    fn edge_assignments(
        &mut self,
        rel: &'a Relationship,
        edge: &Var,
        input: Option<&JsonMap>,
        ctx: &QueryAstContext,
        params: &mut Params,
    ) -> Result<Vec<SetItem>> {
        match (&rel.properties, input) {
            (Some(props), input) => {
                let empty = JsonMap::new();
                self.create_assignments(Scope::Edge(props), edge, input.unwrap_or(&empty), ctx, params)
            }
            (None, Some(input)) if !input.is_empty() => Err(TranslateError::schema(format!(
                "relationship '{}' declares no edge properties",
                rel.name
            ))),
            (None, _) => Ok(Vec::new()),
        }
    }

    /// Binds `raw` coerced to the attribute's type.
    pub(crate) fn attribute_value(
        &mut self,
        attribute: &Attribute,
        raw: &Json,
        ctx: &QueryAstContext,
        params: &mut Params,
    ) -> Result<Expr> {
        let value = Value::coerce(raw, &attribute.ty, &attribute.name)?;
        let param = self.bind(params, &ctx.param_path(&attribute.name), value);
        Ok(self.typed_param(attribute, param, attribute.is_list()))
    }
}
