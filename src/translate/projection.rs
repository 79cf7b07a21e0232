//! Selection sets compiled into map projections.
//!
//! Attributes become `.prop` entries directly. Everything that needs its
//! own match (relationship fields, connections, aggregations and `@cypher`
//! fields) becomes a `CALL { }` returning one column, and the projection
//! reads that column.

use tracing::trace;

use super::authorization::guarded_fields;
use super::context::{Fragment, QueryAstContext};
use super::operators::Scope;
use super::read::{member_filters, MatchStep};
use super::request::{FieldSelection, JsonMap};
use super::sort::{Page, PageRequest};
use super::{hop, Compiler};
use crate::error::{Result, TranslateError};
use crate::query::ast::{
    Block, Clause, Expr, MapItem, NodePattern, Projection, ProjectionItem, Subquery, Var,
};
use crate::schema::{
    Attribute, AuthOperation, ConcreteEntity, Relationship, TargetKind, TypeKind,
};

const GEOGRAPHIC: &[&str] = &["longitude", "latitude", "height", "crs", "srid"];
const CARTESIAN: &[&str] = &["x", "y", "z", "crs", "srid"];

/// Key `__resolveType` marking which member a composite row came from.
pub(crate) const RESOLVE_TYPE: &str = "__resolveType";

fn item_key(item: &MapItem) -> Option<&str> {
    match item {
        MapItem::Property(name) | MapItem::Entry(name, _) => Some(name),
        MapItem::AllProperties => None,
    }
}

fn has_key(items: &[MapItem], key: &str) -> bool {
    items.iter().any(|item| item_key(item) == Some(key))
}

/// Names of the sort keys in `sort`.
pub(crate) fn sort_keys(sort: &[JsonMap]) -> Vec<&str> {
    sort.iter().flat_map(|map| map.keys().map(String::as_str)).collect()
}

/// Sort keys that only reach the projected map so rows can be ordered by
/// them: neither selected nor required by a selected custom resolver.
fn sort_only_keys<'s>(entity: &ConcreteEntity, selection: &[FieldSelection], sort: &[&'s str]) -> Vec<&'s str> {
    let wanted = |name: &str| {
        selection.iter().any(|field| {
            field.response_key() == name
                || entity
                    .attribute(&field.name)
                    .and_then(|a| a.annotations.custom_resolver.as_ref())
                    .is_some_and(|resolver| resolver.requires.iter().any(|r| r == name))
        })
    };
    sort.iter().copied().filter(|name| !wanted(name)).collect()
}

/// Keys a member's projected row keeps once ordering is done.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct VisibleKeys {
    member: String,
    keys: Vec<String>,
    trimmed: bool,
}

impl VisibleKeys {
    pub(crate) fn of(entity: &ConcreteEntity, items: &[MapItem], selection: &[FieldSelection], sort: &[&str]) -> Self {
        let hidden = sort_only_keys(entity, selection, sort);
        let mut keys = Vec::new();
        let mut trimmed = false;
        for key in items.iter().filter_map(item_key) {
            if hidden.contains(&key) {
                trimmed = true;
            } else {
                keys.push(key.to_owned());
            }
        }
        Self {
            member: entity.name.clone(),
            keys,
            trimmed,
        }
    }

    fn projection(&self, row: &Var) -> Expr {
        Expr::MapProjection {
            var: row.clone(),
            items: self.keys.iter().cloned().map(MapItem::Property).collect(),
        }
    }
}

/// `WITH row { .. } AS row` dropping sort-only keys, switching on
/// `__resolveType` when members keep different keys. `None` when nothing
/// was projected for sorting alone.
pub(crate) fn strip_sort_keys(row: &Var, visible: &[VisibleKeys]) -> Option<Clause> {
    let first = visible.first()?;
    if !visible.iter().any(|v| v.trimmed) {
        return None;
    }
    let value = if visible.iter().all(|v| v.keys == first.keys) {
        first.projection(row)
    } else {
        Expr::Case {
            branches: visible
                .iter()
                .map(|v| {
                    (
                        Expr::eq(row.prop(RESOLVE_TYPE), Expr::lit(v.member.as_str())),
                        v.projection(row),
                    )
                })
                .collect(),
            otherwise: None,
        }
    };
    Some(Clause::With {
        projection: Projection::single(value, row),
        where_: None,
    })
}

impl<'a> Compiler<'a> {
    /// Projection entries for `selection` read from `var`.
    ///
    /// `extra` names attributes that must appear under their own name even
    /// when unselected, such as sort keys applied to the projected map.
    pub(crate) fn project(
        &mut self,
        entity: &'a ConcreteEntity,
        selection: &[FieldSelection],
        extra: &[&str],
        var: &Var,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Vec<MapItem>>> {
        let mut out = Fragment::new(Vec::new());
        let mut required: Vec<&'a str> = Vec::new();

        for field in selection {
            let key = field.response_key();
            if field.name == "__typename" {
                out.value
                    .push(MapItem::Entry(key.to_owned(), Expr::lit(entity.name.as_str())));
                continue;
            }
            if let Some(attribute) = entity.attribute(&field.name) {
                if !attribute.is_readable() {
                    return Err(TranslateError::schema(format!(
                        "field '{}' of '{}' is not readable",
                        attribute.name, entity.name
                    )));
                }
                if let Some(resolver) = &attribute.annotations.custom_resolver {
                    required.extend(resolver.requires.iter().map(String::as_str));
                    continue;
                }
                if attribute.is_cypher() {
                    let column = self.cypher_field(attribute, field, var, &ctx.at(key))?;
                    let column = out.absorb(column);
                    out.value.push(MapItem::Entry(key.to_owned(), column.expr()));
                    continue;
                }
                let item = self.attribute_item(attribute, field, var)?;
                out.value.push(item);
                continue;
            }
            if let Some(rel) = entity.relationship(&field.name) {
                let column = self.relationship_field(rel, field, var, &ctx.at(key))?;
                let column = out.absorb(column);
                out.value.push(MapItem::Entry(key.to_owned(), column.expr()));
                continue;
            }
            if let Some(rel) = field
                .name
                .strip_suffix("Connection")
                .and_then(|name| entity.relationship(name))
            {
                let column = self.connection_field(entity, rel, field, var, &ctx.at(key))?;
                let column = out.absorb(column);
                out.value.push(MapItem::Entry(key.to_owned(), column.expr()));
                continue;
            }
            if let Some(rel) = field
                .name
                .strip_suffix("Aggregate")
                .and_then(|name| entity.relationship(name))
            {
                let column = self.aggregate_field(entity, rel, field, var, &ctx.at(key))?;
                let column = out.absorb(column);
                out.value.push(MapItem::Entry(key.to_owned(), column.expr()));
                continue;
            }
            return Err(TranslateError::unknown_field(&entity.name, &field.name));
        }

        for name in extra.iter().copied().chain(required) {
            if has_key(&out.value, name) {
                continue;
            }
            let attribute = entity
                .attribute(name)
                .ok_or_else(|| TranslateError::unknown_field(&entity.name, name))?;
            let item = self.attribute_item(attribute, &FieldSelection::field(name), var)?;
            out.value.push(item);
        }
        Ok(out)
    }

    pub(crate) fn attribute_item(&mut self, attribute: &Attribute, field: &FieldSelection, var: &Var) -> Result<MapItem> {
        let key = field.response_key();
        if attribute.is_spatial() {
            let value = self.point_projection(attribute, field, var)?;
            return Ok(MapItem::Entry(key.to_owned(), value));
        }
        if key == attribute.database_name {
            Ok(MapItem::Property(key.to_owned()))
        } else {
            Ok(MapItem::Entry(key.to_owned(), var.prop(&attribute.database_name)))
        }
    }

    /// `CASE WHEN v.p IS NOT NULL THEN { longitude: v.p.longitude, .. } ELSE NULL END`,
    /// restricted to the requested sub-fields.
    fn point_projection(&mut self, attribute: &Attribute, field: &FieldSelection, var: &Var) -> Result<Expr> {
        let known = if attribute.is_cartesian_point() {
            CARTESIAN
        } else {
            GEOGRAPHIC
        };
        let mut keys: Vec<(String, &str)> = Vec::new();
        for sub in &field.selection {
            let accessor = known
                .iter()
                .find(|k| **k == sub.name)
                .ok_or_else(|| TranslateError::unknown_field(attribute.ty.kind().name(), &sub.name))?;
            keys.push((sub.response_key().to_owned(), *accessor));
        }
        if keys.is_empty() {
            keys = known.iter().map(|k| ((*k).to_owned(), *k)).collect();
        }
        let record = |point: Expr| {
            Expr::Map(
                keys.iter()
                    .map(|(key, accessor)| (key.clone(), point.clone().prop(accessor)))
                    .collect(),
            )
        };
        let property = var.prop(&attribute.database_name);
        let value = if attribute.is_list() {
            let item = self.namer.fresh("var");
            Expr::ListComprehension {
                map: Some(Box::new(record(item.expr()))),
                var: item,
                list: Box::new(property.clone()),
                filter: None,
            }
        } else {
            record(property.clone())
        };
        Ok(Expr::Case {
            branches: vec![(Expr::IsNotNull(Box::new(property)), value)],
            otherwise: Some(Box::new(Expr::null())),
        })
    }

    /// Runs a `@cypher` statement with the parent bound as `this`.
    fn cypher_field(
        &mut self,
        attribute: &'a Attribute,
        field: &FieldSelection,
        parent: &Var,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Var>> {
        let Some(cypher) = attribute.annotations.cypher.as_ref() else {
            return Err(TranslateError::schema(format!(
                "field '{}' has no statement",
                attribute.name
            )));
        };
        let mut side = Fragment::new(());
        self.jwt(&mut side.params);

        let mut statement = Block::new();
        statement.push(Clause::with_vars([parent]));
        statement.push(Clause::With {
            projection: Projection::single(parent.expr(), &Var::new(crate::query::namer::ROOT)),
            where_: None,
        });
        statement.push(Clause::Raw(cypher.statement.clone()));

        let value = self.namer.fresh("this");
        let mut body = Fragment::new(Block::new());
        body.push(Clause::with_vars([parent]));
        body.push(Clause::call(statement));
        body.push(Clause::With {
            projection: Projection::single(Var::new(cypher.column_name.clone()).expr(), &value),
            where_: None,
        });

        let object = match attribute.ty.kind() {
            TypeKind::Object(name) | TypeKind::Interface(name) | TypeKind::Union(name) => Some(name.as_str()),
            _ => None,
        };
        if let Some(name) = object {
            let members = self.schema.concrete_members(name);
            let value_ctx = ctx.nested(&value, None);
            let projected = if let (true, [member]) = (attribute.is_object(), members.as_slice()) {
                let items = self.project(*member, &field.selection, &[], &value, &value_ctx)?;
                let items = body.splice(items);
                Expr::MapProjection {
                    var: value.clone(),
                    items,
                }
            } else {
                let mut branches = Vec::new();
                for member in members {
                    let selection = field.selection_for(&member.name);
                    let items = self.project(member, &selection, &[], &value, &value_ctx.at(&member.name))?;
                    let mut items = body.splice(items);
                    items.insert(0, MapItem::Entry(RESOLVE_TYPE.to_owned(), Expr::lit(member.name.as_str())));
                    branches.push((
                        Expr::HasLabels(value.clone(), member.labels.clone()),
                        Expr::MapProjection {
                            var: value.clone(),
                            items,
                        },
                    ));
                }
                Expr::Case {
                    branches,
                    otherwise: None,
                }
            };
            body.push(Clause::With {
                projection: Projection::single(projected, &value),
                where_: None,
            });
        }

        let column = self.namer.fresh("var");
        let collected = Expr::call("collect", vec![value.expr()]);
        let result = if attribute.is_list() {
            collected
        } else {
            Expr::call("head", vec![collected])
        };
        body.push(Clause::Return(Projection::single(result, &column)));
        side.params.merge(body.params);
        side.subqueries.push(Clause::call(body.value));
        Ok(side.map(|()| column))
    }

    /// Nested `CALL` collecting the related nodes of a relationship field.
    fn relationship_field(
        &mut self,
        rel: &'a Relationship,
        field: &FieldSelection,
        parent: &Var,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Var>> {
        let targets = self.targets(rel)?;
        let composite = rel.is_composite_target();
        let union = rel.target_kind == TargetKind::Union;
        let sort_fields = sort_keys(&field.args.sort);
        trace!(relationship = %rel.name, targets = targets.len(), "projection.relationship");

        let shared = composite.then(|| self.namer.fresh("this"));
        let mut side = Fragment::new(());
        let mut branches = Vec::new();
        let mut visible = Vec::new();
        let mut projected = None;
        for (member, filter) in member_filters(union, &targets, field.args.where_.as_ref())? {
            let node = self.namer.fresh("this");
            let node_ctx = ctx.nested(&node, None);
            let where_ctx = if union {
                node_ctx.at("where").at(&member.name)
            } else {
                node_ctx.at("where")
            };
            let selection = field.selection_for(&member.name);
            let read = selection.iter().map(|f| f.name.as_str()).chain(sort_fields.iter().copied());
            let fields = guarded_fields(member, read);

            let mut branch = Fragment::new(Block::new());
            branch.push(Clause::with_vars([parent]));
            let filter = match filter {
                Some(filter) => self.compile_where(Scope::Node(member), filter, &where_ctx)?,
                None => Fragment::new(None),
            };
            let step = MatchStep {
                pattern: hop(parent, rel, None, NodePattern::new(&node, &member.labels)),
                optional: false,
                entity: member,
                operation: AuthOperation::Read,
                fields: fields.clone(),
            };
            self.filtered_match(&mut branch, step, filter, &node_ctx)?;
            let items = self.project(member, &selection, &sort_fields, &node, &node_ctx)?;
            let mut items = branch.splice(items);
            if composite {
                items.insert(0, MapItem::Entry(RESOLVE_TYPE.to_owned(), Expr::lit(member.name.as_str())));
            }
            visible.push(VisibleKeys::of(member, &items, &selection, &sort_fields));
            self.validate_after(&mut branch, member, AuthOperation::Read, &fields, &node_ctx)?;
            let alias = shared.clone().unwrap_or_else(|| node.clone());
            branch.push(Clause::With {
                projection: Projection::single(Expr::MapProjection { var: node, items }, &alias),
                where_: None,
            });
            if composite {
                branch.push(Clause::Return(Projection::vars([&alias])));
            }
            side.params.merge(branch.params);
            branches.push(branch.value);
            projected = Some(alias);
        }
        let Some(row) = projected else {
            return Err(TranslateError::schema(format!(
                "relationship '{}' has no selectable members",
                rel.name
            )));
        };

        let mut body = Block::new();
        if composite {
            body.push(Clause::with_vars([parent]));
            body.push(Clause::Call(Subquery { branches }));
        } else {
            for branch in branches {
                body.append(branch);
            }
        }

        let order_by = self.sort_items(Scope::Node(targets[0]), &field.args.sort, |a| row.prop(&a.name))?;
        let page = if rel.list {
            self.page(
                &mut side.params,
                (!composite).then(|| targets[0]),
                PageRequest {
                    limit: field.args.limit,
                    offset: field.args.offset,
                    root: false,
                },
                &ctx.path,
            )?
        } else {
            Page::default()
        };
        if !order_by.is_empty() || page.skip.is_some() || page.limit.is_some() {
            body.push(Clause::With {
                projection: Projection {
                    items: vec![ProjectionItem::var(&row)],
                    order_by,
                    skip: page.skip,
                    limit: page.limit,
                    ..Projection::default()
                },
                where_: None,
            });
        }
        if let Some(strip) = strip_sort_keys(&row, &visible) {
            body.push(strip);
        }

        let column = self.namer.fresh("var");
        let collected = Expr::call("collect", vec![row.expr()]);
        let value = if rel.list {
            collected
        } else {
            Expr::call("head", vec![collected])
        };
        body.push(Clause::Return(Projection::single(value, &column)));
        side.subqueries.push(Clause::call(body));
        Ok(side.map(|()| column))
    }
}
