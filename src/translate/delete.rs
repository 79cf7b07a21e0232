//! Delete mutations.
//!
//! Nested deletes run depth first: every related node is matched, its own
//! cascade compiled, then collected and detached before the parent goes.
//! With change tracking enabled each subquery also returns the events of
//! the nodes it removed and the root folds them into `meta`.

use serde_json::Value as Json;
use tracing::{debug, trace};

use super::context::{Fragment, QueryAstContext};
use super::read::MatchStep;
use super::request::{JsonMap, Request};
use super::{hop, member_inputs, object, object_list, Compiler};
use crate::error::{Result, TranslateError};
use crate::query::ast::{
    BinaryOp, Block, Clause, Expr, MapItem, NodePattern, Pattern, Projection, ProjectionItem, Var,
};
use crate::query::Namer;
use crate::schema::{AuthOperation, ConcreteEntity, Entity, Relationship, TargetKind};

/// `{ event: "delete", id, properties: { old, new }, timestamp, typename }`.
fn delete_event(node: &Var, typename: &str) -> Expr {
    Expr::Map(vec![
        ("event".to_owned(), Expr::lit("delete")),
        ("id".to_owned(), Expr::call("id", vec![node.expr()])),
        (
            "properties".to_owned(),
            Expr::Map(vec![
                (
                    "old".to_owned(),
                    Expr::MapProjection {
                        var: node.clone(),
                        items: vec![MapItem::AllProperties],
                    },
                ),
                ("new".to_owned(), Expr::null()),
            ]),
        ),
        ("timestamp".to_owned(), Expr::call("timestamp", Vec::new())),
        ("typename".to_owned(), Expr::lit(typename)),
    ])
}

/// `a + b + ..`; the empty list when there is nothing to add.
fn concat(lists: impl IntoIterator<Item = Expr>) -> Expr {
    lists
        .into_iter()
        .reduce(|acc, next| Expr::binary(BinaryOp::Add, acc, next))
        .unwrap_or_else(|| Expr::List(Vec::new()))
}

/// `reduce(m = [], e IN list | m + e)`.
fn flatten(namer: &mut Namer, list: Expr) -> Expr {
    let acc = namer.fresh("var");
    let item = namer.fresh("var");
    Expr::Reduce {
        init: Box::new(Expr::List(Vec::new())),
        list: Box::new(list),
        expr: Box::new(Expr::binary(BinaryOp::Add, acc.expr(), item.expr())),
        acc,
        var: item,
    }
}

impl<'a> Compiler<'a> {
    pub(crate) fn delete(&mut self, request: &Request) -> Result<Fragment<Block>> {
        let entity = match self.entity(&request.entity)? {
            Entity::Concrete(entity) => entity,
            Entity::Composite(composite) => {
                return Err(TranslateError::schema(format!(
                    "'{}' is abstract and cannot be deleted",
                    composite.name
                )))
            }
        };
        let empty = JsonMap::new();
        let input = match &request.mutation_input {
            None | Some(Json::Null) => &empty,
            Some(value) => object("mutationInput", value)?,
        };
        let track = self.options.track_change_events;
        debug!(entity = %entity.name, nested = input.len(), track, "translate.delete");

        let this = self.namer.root();
        let ctx = QueryAstContext::root(&this);
        let mut out = Fragment::new(Block::new());
        let filter = self.node_filter(entity, request.where_.as_ref(), &ctx)?;
        let step = MatchStep {
            pattern: Pattern::node(NodePattern::new(&this, &entity.labels)),
            optional: false,
            entity,
            operation: AuthOperation::Delete,
            fields: Vec::new(),
        };
        self.guarded_match(&mut out, step, filter, &ctx)?;

        let (cascade, columns) = self.delete_cascade(entity, &this, input, &ctx.at("delete"), track)?;
        out.append(cascade);

        let meta = track.then(|| self.namer.fresh("meta"));
        if let Some(meta) = &meta {
            let events = concat(
                columns
                    .iter()
                    .map(Var::expr)
                    .chain([Expr::List(vec![delete_event(&this, &entity.name)])]),
            );
            let mut projection = Projection::star();
            projection.items.push(ProjectionItem::aliased(events, meta));
            out.push(Clause::With {
                projection,
                where_: None,
            });
        }
        self.validate_before(&mut out, entity, AuthOperation::Delete, &[], &ctx)?;
        out.push(Clause::Delete {
            detach: true,
            targets: vec![this.expr()],
        });
        if let Some(meta) = meta {
            let folded = flatten(&mut self.namer, Expr::call("collect", vec![meta.expr()]));
            out.push(Clause::Return(Projection::single(folded, &Var::new("meta"))));
        }
        Ok(out)
    }

    /// One subquery per nested delete input of `parent`, in input order.
    ///
    /// Returns the subqueries and the columns they expose; with tracking
    /// each column holds the list of delete events of the subquery.
    pub(crate) fn delete_cascade(
        &mut self,
        entity: &'a ConcreteEntity,
        parent: &Var,
        input: &JsonMap,
        ctx: &QueryAstContext,
        track: bool,
    ) -> Result<(Fragment<Block>, Vec<Var>)> {
        let mut out = Fragment::new(Block::new());
        let mut columns = Vec::new();
        for (key, value) in input {
            let rel = entity
                .relationship(key)
                .ok_or_else(|| TranslateError::unknown_field(&entity.name, key))?;
            let targets = self.targets(rel)?;
            let rel_ctx = ctx.at(key);
            for (member, items) in member_inputs(rel, &targets, value)? {
                let member_ctx = if rel.target_kind == TargetKind::Union {
                    rel_ctx.at(&member.name)
                } else {
                    rel_ctx.clone()
                };
                for (idx, item) in object_list(key, items)?.into_iter().enumerate() {
                    let (call, column) =
                        self.delete_related(rel, member, parent, item, &member_ctx.indexed(idx), track)?;
                    out.append(call);
                    columns.push(column);
                }
            }
        }
        Ok((out, columns))
    }

    /// `{ where, delete }` against the `member` nodes related to `parent`.
    pub(crate) fn delete_related(
        &mut self,
        rel: &'a Relationship,
        member: &'a ConcreteEntity,
        parent: &Var,
        item: &JsonMap,
        ctx: &QueryAstContext,
        track: bool,
    ) -> Result<(Fragment<Block>, Var)> {
        let child = self.namer.fresh("this");
        let edge = self.namer.fresh("this");
        let node_ctx = ctx.nested(&child, Some(&edge));
        trace!(relationship = %rel.name, member = %member.name, "delete.nested");
        let filter = match item.get("where") {
            Some(filter) => self.connection_where(member, rel, object("where", filter)?, &node_ctx.at("where"))?,
            None => Fragment::new(None),
        };

        let mut body = Fragment::new(Block::new());
        body.push(Clause::with_vars([parent]));
        let step = MatchStep {
            pattern: hop(parent, rel, Some(&edge), NodePattern::new(&child, &member.labels)),
            optional: true,
            entity: member,
            operation: AuthOperation::Delete,
            fields: Vec::new(),
        };
        self.filtered_match(&mut body, step, filter, &node_ctx)?;

        let nested_columns = match item.get("delete") {
            Some(nested) => {
                let (cascade, columns) =
                    self.delete_cascade(member, &child, object("delete", nested)?, &node_ctx.at("delete"), track)?;
                body.append(cascade);
                columns
            }
            None => Vec::new(),
        };

        let doomed = self.namer.fresh("var");
        let mut grouped = Projection::single(
            Expr::Function {
                name: "collect".to_owned(),
                distinct: true,
                args: vec![child.expr()],
            },
            &doomed,
        );
        let nested_events = (track && !nested_columns.is_empty()).then(|| self.namer.fresh("var"));
        if let Some(events) = &nested_events {
            let collected = Expr::call("collect", vec![concat(nested_columns.iter().map(Var::expr))]);
            grouped
                .items
                .push(ProjectionItem::aliased(flatten(&mut self.namer, collected), events));
        }
        body.push(Clause::With {
            projection: grouped,
            where_: None,
        });

        let column = self.namer.fresh("var");
        let events = if track {
            let own = self.namer.fresh("var");
            let event = Expr::ListComprehension {
                var: own.clone(),
                list: Box::new(doomed.expr()),
                filter: None,
                map: Some(Box::new(delete_event(&own, &member.name))),
            };
            let events = self.namer.fresh("var");
            let all = concat(nested_events.iter().map(Var::expr).chain([event]));
            let mut projection = Projection::star();
            projection.items.push(ProjectionItem::aliased(all, &events));
            body.push(Clause::With {
                projection,
                where_: None,
            });
            Some(events)
        } else {
            None
        };

        let unwound = self.namer.fresh("var");
        let ignored = self.namer.fresh("var");
        let mut inner = Block::new();
        inner.push(Clause::with_vars([&doomed]));
        inner.push(Clause::Unwind {
            expr: doomed.expr(),
            alias: unwound.clone(),
        });
        inner.push(Clause::Delete {
            detach: true,
            targets: vec![unwound.expr()],
        });
        inner.push(Clause::Return(Projection::single(Expr::CountAll, &ignored)));
        body.push(Clause::call(inner));

        let result = match events {
            Some(events) => events.expr(),
            None => Expr::CountAll,
        };
        body.push(Clause::Return(Projection::single(result, &column)));

        let mut out = Fragment::new(Block::new());
        out.params.merge(body.params);
        out.push(Clause::call(body.value));
        Ok((out, column))
    }
}
