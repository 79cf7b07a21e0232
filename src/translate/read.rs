//! Read operations and the filtered match shared by every operation.

use tracing::debug;

use super::authorization::guarded_fields;
use super::context::{Fragment, QueryAstContext};
use super::operators::Scope;
use super::projection::{sort_keys, strip_sort_keys, VisibleKeys, RESOLVE_TYPE};
use super::request::{JsonMap, Request};
use super::sort::PageRequest;
use super::{object, Compiler};
use crate::error::{Result, TranslateError};
use crate::query::ast::{
    Block, Clause, Expr, MapItem, NodePattern, Pattern, Projection, ProjectionItem, Subquery,
};
use crate::schema::{
    AttributeAnnotations, AuthOperation, CompositeEntity, CompositeKind, ConcreteEntity, Entity,
    ValidationWhen,
};

/// A pattern match guarded by filters and authorization.
pub(crate) struct MatchStep<'a> {
    pub pattern: Pattern,
    pub optional: bool,
    pub entity: &'a ConcreteEntity,
    pub operation: AuthOperation,
    pub fields: Vec<&'a AttributeAnnotations>,
}

/// Pairs each concrete member with the part of `filter` that applies to it.
///
/// Union filters are keyed by member name and only the named members are
/// kept; any other filter applies to every member.
pub(crate) fn member_filters<'m, 'f>(
    union: bool,
    members: &[&'m ConcreteEntity],
    filter: Option<&'f JsonMap>,
) -> Result<Vec<(&'m ConcreteEntity, Option<&'f JsonMap>)>> {
    match filter {
        Some(map) if union && !map.is_empty() => map
            .iter()
            .map(|(key, value)| {
                let member = members
                    .iter()
                    .find(|m| &m.name == key)
                    .ok_or_else(|| TranslateError::malformed_key("union", key, "not a member of the union"))?;
                Ok((*member, Some(object(key, value)?)))
            })
            .collect(),
        Some(map) if !map.is_empty() => Ok(members.iter().map(|m| (*m, Some(map))).collect()),
        _ => Ok(members.iter().map(|m| (*m, None)).collect()),
    }
}

impl<'a> Compiler<'a> {
    /// Emits `MATCH`, the combined filter and the `BEFORE` assertions.
    ///
    /// With no pre-computed subqueries the predicate sits in the match's
    /// `WHERE`; otherwise the subqueries run first and the predicate moves
    /// to a `WITH * WHERE`.
    pub(crate) fn filtered_match(
        &mut self,
        out: &mut Fragment<Block>,
        step: MatchStep<'a>,
        filter: Fragment<Option<Expr>>,
        ctx: &QueryAstContext,
    ) -> Result<()> {
        let (entity, operation, fields) = (step.entity, step.operation, step.fields.clone());
        self.guarded_match(out, step, filter, ctx)?;
        self.validate_before(out, entity, operation, &fields, ctx)
    }

    /// [`Self::filtered_match`] without the `BEFORE` assertions.
    pub(crate) fn guarded_match(
        &mut self,
        out: &mut Fragment<Block>,
        step: MatchStep<'a>,
        filter: Fragment<Option<Expr>>,
        ctx: &QueryAstContext,
    ) -> Result<()> {
        let auth = self.authorization_filter(step.entity, step.operation, &step.fields, ctx)?;
        let mut side = Fragment::new(());
        let user = side.absorb(filter);
        let rules = side.absorb(auth);
        let predicate = Expr::all_of(user.into_iter().chain(rules));
        out.params.merge(side.params);
        if side.subqueries.is_empty() {
            out.push(Clause::Match {
                optional: step.optional,
                pattern: step.pattern,
                where_: predicate,
            });
        } else {
            out.push(Clause::Match {
                optional: step.optional,
                pattern: step.pattern,
                where_: None,
            });
            out.value.extend(side.subqueries);
            if let Some(predicate) = predicate {
                out.push(Clause::filter(predicate));
            }
        }
        Ok(())
    }

    pub(crate) fn validate_before(
        &mut self,
        out: &mut Fragment<Block>,
        entity: &'a ConcreteEntity,
        operation: AuthOperation,
        fields: &[&'a AttributeAnnotations],
        ctx: &QueryAstContext,
    ) -> Result<()> {
        let before = self.authorization_validate(entity, operation, ValidationWhen::Before, fields, ctx)?;
        if let Some(clause) = out.splice(before) {
            out.push(clause);
        }
        Ok(())
    }

    /// Pushes the `AFTER` assertion for `operation`, if any rule applies.
    pub(crate) fn validate_after(
        &mut self,
        out: &mut Fragment<Block>,
        entity: &'a ConcreteEntity,
        operation: AuthOperation,
        fields: &[&'a AttributeAnnotations],
        ctx: &QueryAstContext,
    ) -> Result<()> {
        let after = self.authorization_validate(entity, operation, ValidationWhen::After, fields, ctx)?;
        if let Some(clause) = out.splice(after) {
            out.push(clause);
        }
        Ok(())
    }

    /// Compiles an optional node filter below `ctx`'s `where` path.
    pub(crate) fn node_filter(
        &mut self,
        entity: &'a ConcreteEntity,
        filter: Option<&JsonMap>,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        match filter {
            Some(filter) => self.compile_where(Scope::Node(entity), filter, &ctx.at("where")),
            None => Ok(Fragment::new(None)),
        }
    }

    pub(crate) fn read(&mut self, request: &Request) -> Result<Fragment<Block>> {
        match self.entity(&request.entity)? {
            Entity::Concrete(entity) => self.read_concrete(entity, request),
            Entity::Composite(composite) => self.read_composite(composite, request),
        }
    }

    fn read_concrete(&mut self, entity: &'a ConcreteEntity, request: &Request) -> Result<Fragment<Block>> {
        let this = self.namer.root();
        let ctx = QueryAstContext::root(&this);
        let mut out = Fragment::new(Block::new());
        let sort_fields = sort_keys(&request.sort);
        let read = request.selection.iter().map(|f| f.name.as_str()).chain(sort_fields.iter().copied());
        let fields = guarded_fields(entity, read);

        let filter = self.node_filter(entity, request.where_.as_ref(), &ctx)?;
        let step = MatchStep {
            pattern: Pattern::node(NodePattern::new(&this, &entity.labels)),
            optional: false,
            entity,
            operation: AuthOperation::Read,
            fields: fields.clone(),
        };
        self.filtered_match(&mut out, step, filter, &ctx)?;

        let order_by = self.sort_items(Scope::Node(entity), &request.sort, |a| this.prop(&a.database_name))?;
        let page = self.page(
            &mut out.params,
            Some(entity),
            PageRequest {
                limit: request.limit,
                offset: request.offset,
                root: true,
            },
            &ctx.path,
        )?;
        if !order_by.is_empty() || page.skip.is_some() || page.limit.is_some() {
            out.push(Clause::With {
                projection: Projection {
                    star: true,
                    order_by,
                    skip: page.skip,
                    limit: page.limit,
                    ..Projection::default()
                },
                where_: None,
            });
        }

        let items = self.project(entity, &request.selection, &[], &this, &ctx)?;
        let items = out.splice(items);
        self.validate_after(&mut out, entity, AuthOperation::Read, &fields, &ctx)?;
        out.push(Clause::Return(Projection::single(
            Expr::MapProjection {
                var: this.clone(),
                items,
            },
            &this,
        )));
        Ok(out)
    }

    /// One `UNION` branch per member, each tagged with `__resolveType`;
    /// sorting and pagination apply to the combined rows.
    fn read_composite(&mut self, composite: &'a CompositeEntity, request: &Request) -> Result<Fragment<Block>> {
        let this = self.namer.root();
        let members = self.schema.concrete_members(&composite.name);
        let Some(first) = members.first().copied() else {
            return Err(TranslateError::schema(format!(
                "'{}' has no concrete members",
                composite.name
            )));
        };
        debug!(composite = %composite.name, members = members.len(), "read.composite");
        let union = composite.kind == CompositeKind::Union;
        let sort_fields = sort_keys(&request.sort);

        let mut out = Fragment::new(Block::new());
        let mut branches = Vec::new();
        let mut visible = Vec::new();
        for (member, filter) in member_filters(union, &members, request.where_.as_ref())? {
            let node = self.namer.fresh("this");
            let ctx = QueryAstContext::root(&this).retarget(&node);
            let member_ctx = if union { ctx.at(&member.name) } else { ctx.clone() };
            let selection = request.selection_for(&member.name);
            let read = selection.iter().map(|f| f.name.as_str()).chain(sort_fields.iter().copied());
            let fields = guarded_fields(member, read);

            let mut branch = Fragment::new(Block::new());
            let filter = self.node_filter(member, filter, &member_ctx)?;
            let step = MatchStep {
                pattern: Pattern::node(NodePattern::new(&node, &member.labels)),
                optional: false,
                entity: member,
                operation: AuthOperation::Read,
                fields: fields.clone(),
            };
            self.filtered_match(&mut branch, step, filter, &member_ctx)?;
            let items = self.project(member, &selection, &sort_fields, &node, &member_ctx)?;
            let mut items = branch.splice(items);
            items.insert(0, MapItem::Entry(RESOLVE_TYPE.to_owned(), Expr::lit(member.name.as_str())));
            visible.push(VisibleKeys::of(member, &items, &selection, &sort_fields));
            self.validate_after(&mut branch, member, AuthOperation::Read, &fields, &member_ctx)?;
            branch.push(Clause::With {
                projection: Projection::single(Expr::MapProjection { var: node, items }, &this),
                where_: None,
            });
            branch.push(Clause::Return(Projection::vars([&this])));
            out.params.merge(branch.params);
            branches.push(branch.value);
        }
        out.push(Clause::Call(Subquery { branches }));

        let order_by = self.sort_items(Scope::Node(first), &request.sort, |a| this.prop(&a.name))?;
        let page = self.page(
            &mut out.params,
            None,
            PageRequest {
                limit: request.limit,
                offset: request.offset,
                root: true,
            },
            this.name(),
        )?;
        if !order_by.is_empty() || page.skip.is_some() || page.limit.is_some() {
            out.push(Clause::With {
                projection: Projection {
                    items: vec![ProjectionItem::var(&this)],
                    order_by,
                    skip: page.skip,
                    limit: page.limit,
                    ..Projection::default()
                },
                where_: None,
            });
        }
        if let Some(strip) = strip_sort_keys(&this, &visible) {
            out.push(strip);
        }
        out.push(Clause::Return(Projection::vars([&this])));
        Ok(out)
    }
}
