//! Relay-style connection fields.
//!
//! Cursors are opaque to clients but are plain offsets underneath:
//! `base64("arrayconnection:" + offset)`. The same encoding is used inside
//! the generated query, so cursors produced by the database and by
//! [`encode_cursor`] are interchangeable.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::trace;

use super::authorization::guarded_fields;
use super::context::{Fragment, QueryAstContext};
use super::operators::Scope;
use super::projection::{sort_keys, RESOLVE_TYPE};
use super::read::{member_filters, MatchStep};
use super::request::{FieldSelection, JsonMap};
use super::sort::PageRequest;
use super::{hop, object, upper_first, Compiler};
use crate::error::{Result, TranslateError};
use crate::query::ast::{
    BinaryOp, Block, Clause, Expr, MapItem, NodePattern, Projection, ProjectionItem, Subquery,
    Var,
};
use crate::schema::{AuthOperation, ConcreteEntity, EdgeProperties, Relationship, TargetKind};

const CURSOR_PREFIX: &str = "arrayconnection:";

/// Encodes a zero-based offset as a connection cursor.
pub fn encode_cursor(offset: usize) -> String {
    STANDARD.encode(format!("{CURSOR_PREFIX}{offset}"))
}

/// Decodes a connection cursor back into its offset.
pub fn decode_cursor(cursor: &str) -> Result<usize> {
    let invalid = || TranslateError::pagination("after", format!("'{cursor}' is not a valid cursor"));
    let bytes = STANDARD.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    text.strip_prefix(CURSOR_PREFIX)
        .and_then(|offset| offset.parse().ok())
        .ok_or_else(invalid)
}

/// Rows to skip for `after` / `offset`, which must agree when both are given.
pub(crate) fn connection_skip(after: Option<&str>, offset: Option<i64>) -> Result<Option<i64>> {
    let from_cursor = match after {
        Some(cursor) => {
            let decoded = decode_cursor(cursor)?;
            let too_large = || TranslateError::pagination("after", "cursor offset is too large");
            let position = i64::try_from(decoded).map_err(|_| too_large())?;
            Some(position.checked_add(1).ok_or_else(too_large)?)
        }
        None => None,
    };
    match (from_cursor, offset) {
        (Some(a), Some(b)) if a != b => Err(TranslateError::pagination(
            "after",
            format!("cursor points to offset {a} but offset {b} was requested"),
        )),
        (a, b) => Ok(a.or(b)),
    }
}

fn cursor_at(offset: Expr) -> Expr {
    Expr::call(
        "apoc.text.base64Encode",
        vec![Expr::binary(
            BinaryOp::Add,
            Expr::lit(CURSOR_PREFIX),
            Expr::call("toString", vec![offset]),
        )],
    )
}

/// Response keys of the pieces of an edge selection.
#[derive(Default)]
struct EdgeShape<'s> {
    node: Option<&'s FieldSelection>,
    properties: Option<&'s FieldSelection>,
    cursors: Vec<&'s str>,
}

impl<'s> EdgeShape<'s> {
    fn of(edges: Option<&'s FieldSelection>) -> Result<Self> {
        let mut shape = EdgeShape::default();
        for field in edges.map(|e| e.selection.as_slice()).unwrap_or_default() {
            match field.name.as_str() {
                "node" => shape.node = Some(field),
                "properties" => shape.properties = Some(field),
                "cursor" => shape.cursors.push(field.response_key()),
                other => return Err(TranslateError::unknown_field("Edge", other)),
            }
        }
        Ok(shape)
    }

    fn node_key(&self) -> &'s str {
        self.node.map_or("node", |f| f.response_key())
    }

    fn properties_key(&self) -> &'s str {
        self.properties.map_or("properties", |f| f.response_key())
    }
}

impl<'a> Compiler<'a> {
    pub(crate) fn connection_field(
        &mut self,
        owner: &ConcreteEntity,
        rel: &'a Relationship,
        field: &FieldSelection,
        parent: &Var,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Var>> {
        let targets = self.targets(rel)?;
        let composite = rel.is_composite_target();
        let union = rel.target_kind == TargetKind::Union;
        let shape = EdgeShape::of(field.child("edges"))?;
        let (node_sort, edge_sort) = split_sort(&field.args.sort)?;
        let node_extra = sort_keys(&node_sort);
        let edge_extra = sort_keys(&edge_sort);
        trace!(relationship = %rel.name, "projection.connection");

        let edge_row = self.namer.fresh("edge");
        let mut side = Fragment::new(());
        let mut branches = Vec::new();
        for (member, filter) in member_filters(union, &targets, field.args.where_.as_ref())? {
            let node = self.namer.fresh("this");
            let edge = self.namer.fresh("this");
            let node_ctx = ctx.nested(&node, Some(&edge));
            let where_ctx = if union {
                node_ctx.at("where").at(&member.name)
            } else {
                node_ctx.at("where")
            };
            let selection = shape
                .node
                .map(|n| n.selection_for(&member.name))
                .unwrap_or_default();
            let read = selection.iter().map(|f| f.name.as_str()).chain(node_extra.iter().copied());
            let fields = guarded_fields(member, read);

            let mut branch = Fragment::new(Block::new());
            branch.push(Clause::with_vars([parent]));
            let filter = match filter {
                Some(filter) => self.connection_where(member, rel, filter, &where_ctx)?,
                None => Fragment::new(None),
            };
            let step = MatchStep {
                pattern: hop(parent, rel, Some(&edge), NodePattern::new(&node, &member.labels)),
                optional: false,
                entity: member,
                operation: AuthOperation::Read,
                fields: fields.clone(),
            };
            self.filtered_match(&mut branch, step, filter, &node_ctx)?;

            let mut record = Vec::new();
            if shape.node.is_some() || !node_extra.is_empty() {
                let node_field_ctx = node_ctx.at(shape.node_key());
                let items = self.project(member, &selection, &node_extra, &node, &node_field_ctx)?;
                let mut items = branch.splice(items);
                if composite {
                    items.insert(0, MapItem::Entry(RESOLVE_TYPE.to_owned(), Expr::lit(member.name.as_str())));
                }
                record.push((shape.node_key().to_owned(), Expr::MapProjection { var: node, items }));
            }
            if shape.properties.is_some() || !edge_extra.is_empty() {
                let props = edge_properties(rel)?;
                let selection = shape.properties.map(|p| p.selection.as_slice()).unwrap_or_default();
                let items = self.edge_items(props, selection, &edge_extra, &edge)?;
                record.push((
                    shape.properties_key().to_owned(),
                    Expr::MapProjection { var: edge, items },
                ));
            }
            self.validate_after(&mut branch, member, AuthOperation::Read, &fields, &node_ctx)?;
            branch.push(Clause::With {
                projection: Projection::single(Expr::Map(record), &edge_row),
                where_: None,
            });
            if composite {
                branch.push(Clause::Return(Projection::vars([&edge_row])));
            }
            side.params.merge(branch.params);
            branches.push(branch.value);
        }

        let mut body = Block::new();
        if composite {
            body.push(Clause::with_vars([parent]));
            body.push(Clause::Call(Subquery { branches }));
        } else {
            for branch in branches {
                body.append(branch);
            }
        }

        let edges = self.namer.fresh("edges");
        let total = self.namer.fresh("totalCount");
        body.push(Clause::With {
            projection: Projection::single(Expr::call("collect", vec![edge_row.expr()]), &edges),
            where_: None,
        });
        body.push(Clause::With {
            projection: Projection::items(vec![
                ProjectionItem::var(&edges),
                ProjectionItem::aliased(Expr::call("size", vec![edges.expr()]), &total),
            ]),
            where_: None,
        });

        let mut order_by = Vec::new();
        let sort_scope = Scope::Node(targets[0]);
        let node_key = shape.node_key();
        order_by.extend(self.sort_items(sort_scope, &node_sort, |a| {
            edge_row.expr().prop(node_key).prop(&a.name)
        })?);
        if !edge_sort.is_empty() {
            let props = edge_properties(rel)?;
            let properties_key = shape.properties_key();
            order_by.extend(self.sort_items(Scope::Edge(props), &edge_sort, |a| {
                edge_row.expr().prop(properties_key).prop(&a.name)
            })?);
        }
        let skip = connection_skip(field.args.after.as_deref(), field.args.offset)?;
        let page = self.page(
            &mut side.params,
            (!composite).then(|| targets[0]),
            PageRequest {
                limit: field.args.first.or(field.args.limit),
                offset: skip,
                root: false,
            },
            &ctx.path,
        )?;
        let offset = page.skip.clone().unwrap_or_else(|| Expr::lit(0_i64));

        let rows = if order_by.is_empty() && page.skip.is_none() && page.limit.is_none() {
            edges.clone()
        } else {
            let rows = self.namer.fresh("var");
            let mut inner = Block::new();
            inner.push(Clause::with_vars([&edges]));
            inner.push(Clause::Unwind {
                expr: edges.expr(),
                alias: edge_row.clone(),
            });
            inner.push(Clause::With {
                projection: Projection {
                    items: vec![ProjectionItem::var(&edge_row)],
                    order_by,
                    skip: page.skip,
                    limit: page.limit,
                    ..Projection::default()
                },
                where_: None,
            });
            inner.push(Clause::Return(Projection::single(
                Expr::call("collect", vec![edge_row.expr()]),
                &rows,
            )));
            body.push(Clause::call(inner));
            rows
        };

        let mut result = Vec::new();
        for child in &field.selection {
            let key = child.response_key().to_owned();
            let value = match child.name.as_str() {
                "totalCount" => total.expr(),
                "edges" => self.edges_list(&shape, &rows, offset.clone()),
                "pageInfo" => page_info(child, &rows, &total, &offset)?,
                "__typename" => Expr::lit(format!("{}{}Connection", owner.name, upper_first(&rel.name))),
                other => return Err(TranslateError::unknown_field("Connection", other)),
            };
            result.push((key, value));
        }
        let column = self.namer.fresh("var");
        body.push(Clause::Return(Projection::single(Expr::Map(result), &column)));
        side.subqueries.push(Clause::call(body));
        Ok(side.map(|()| column))
    }

    fn edges_list(&mut self, shape: &EdgeShape<'_>, rows: &Var, offset: Expr) -> Expr {
        if shape.cursors.is_empty() {
            return rows.expr();
        }
        let idx = self.namer.fresh("var");
        let row = || Expr::Index {
            list: Box::new(rows.expr()),
            index: Box::new(idx.expr()),
        };
        let mut entries = Vec::new();
        if shape.node.is_some() {
            entries.push((shape.node_key().to_owned(), row().prop(shape.node_key())));
        }
        if shape.properties.is_some() {
            entries.push((shape.properties_key().to_owned(), row().prop(shape.properties_key())));
        }
        for key in &shape.cursors {
            let position = Expr::binary(BinaryOp::Add, offset.clone(), idx.expr());
            entries.push(((*key).to_owned(), cursor_at(position)));
        }
        let last = Expr::binary(
            BinaryOp::Sub,
            Expr::call("size", vec![rows.expr()]),
            Expr::lit(1_i64),
        );
        Expr::ListComprehension {
            list: Box::new(Expr::call("range", vec![Expr::lit(0_i64), last])),
            filter: None,
            map: Some(Box::new(Expr::Map(entries))),
            var: idx,
        }
    }

    /// Edge property entries for `selection`, plus any `extra` sort keys.
    pub(crate) fn edge_items(
        &mut self,
        props: &'a EdgeProperties,
        selection: &[FieldSelection],
        extra: &[&str],
        edge: &Var,
    ) -> Result<Vec<MapItem>> {
        let mut items = Vec::new();
        for field in selection {
            if field.name == "__typename" {
                items.push(MapItem::Entry(
                    field.response_key().to_owned(),
                    Expr::lit(props.name.as_str()),
                ));
                continue;
            }
            let attribute = props
                .attribute(&field.name)
                .ok_or_else(|| TranslateError::unknown_field(&props.name, &field.name))?;
            items.push(self.attribute_item(attribute, field, edge)?);
        }
        for name in extra {
            let present = items.iter().any(|item| match item {
                MapItem::Property(key) | MapItem::Entry(key, _) => key == name,
                MapItem::AllProperties => false,
            });
            if !present {
                let attribute = props
                    .attribute(name)
                    .ok_or_else(|| TranslateError::unknown_field(&props.name, name))?;
                items.push(self.attribute_item(attribute, &FieldSelection::field(*name), edge)?);
            }
        }
        Ok(items)
    }
}

fn edge_properties(rel: &Relationship) -> Result<&EdgeProperties> {
    rel.properties.as_ref().ok_or_else(|| {
        TranslateError::schema(format!("relationship '{}' declares no edge properties", rel.name))
    })
}

/// Splits connection sort maps into `node` and `edge` parts.
fn split_sort(sort: &[JsonMap]) -> Result<(Vec<JsonMap>, Vec<JsonMap>)> {
    let mut node = Vec::new();
    let mut edge = Vec::new();
    for map in sort {
        for (key, value) in map {
            match key.as_str() {
                "node" => node.push(object(key, value)?.clone()),
                "edge" => edge.push(object(key, value)?.clone()),
                other => {
                    return Err(TranslateError::invalid_value(
                        other,
                        "connection sort keys are node and edge",
                    ))
                }
            }
        }
    }
    Ok((node, edge))
}

fn page_info(field: &FieldSelection, rows: &Var, total: &Var, offset: &Expr) -> Result<Expr> {
    let size = || Expr::call("size", vec![rows.expr()]);
    let non_empty = || Expr::binary(BinaryOp::Gt, size(), Expr::lit(0_i64));
    let mut entries = Vec::new();
    for child in &field.selection {
        let value = match child.name.as_str() {
            "hasNextPage" => Expr::binary(
                BinaryOp::Lt,
                Expr::binary(BinaryOp::Add, offset.clone(), size()),
                total.expr(),
            ),
            "hasPreviousPage" => Expr::binary(BinaryOp::Gt, offset.clone(), Expr::lit(0_i64)),
            "startCursor" => Expr::Case {
                branches: vec![(non_empty(), cursor_at(offset.clone()))],
                otherwise: Some(Box::new(Expr::null())),
            },
            "endCursor" => {
                let last = Expr::binary(
                    BinaryOp::Sub,
                    Expr::binary(BinaryOp::Add, offset.clone(), size()),
                    Expr::lit(1_i64),
                );
                Expr::Case {
                    branches: vec![(non_empty(), cursor_at(last))],
                    otherwise: Some(Box::new(Expr::null())),
                }
            }
            "__typename" => Expr::lit("PageInfo"),
            other => return Err(TranslateError::unknown_field("PageInfo", other)),
        };
        entries.push((child.response_key().to_owned(), value));
    }
    Ok(Expr::Map(entries))
}
