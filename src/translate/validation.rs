//! Relationship cardinality assertions emitted after writes.
//!
//! Each assertion counts the relationships of one node inside its own
//! subquery and fails the query with a `RELATIONSHIP-REQUIRED` message when
//! the count breaks the declared cardinality.

use tracing::trace;

use super::{hop, Compiler};
use crate::error::{cardinality_message, Result};
use crate::query::ast::{BinaryOp, Block, Clause, Expr, NodePattern, Projection, ProjectionItem, Var};
use crate::schema::{ConcreteEntity, Relationship};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Cardinality {
    ExactlyOne,
    AtMostOne,
}

impl Cardinality {
    fn of(rel: &Relationship) -> Self {
        if rel.required {
            Cardinality::ExactlyOne
        } else {
            Cardinality::AtMostOne
        }
    }

    fn holds(self, count: Expr) -> Expr {
        match self {
            Cardinality::ExactlyOne => Expr::binary(BinaryOp::Eq, count, Expr::lit(1_i64)),
            Cardinality::AtMostOne => Expr::binary(BinaryOp::Lte, count, Expr::lit(1_i64)),
        }
    }
}

/// Violation text without the assertion prefix.
pub(crate) fn violation_message(
    subject: &str,
    field: &str,
    cardinality: Cardinality,
    specific: Option<&str>,
) -> String {
    let rule = match cardinality {
        Cardinality::ExactlyOne => "required exactly once",
        Cardinality::AtMostOne => "must be less than or equal to one",
    };
    match specific {
        Some(related) => format!("{subject}.{field} {rule} for a specific {related}"),
        None => format!("{subject}.{field} {rule}"),
    }
}

impl<'a> Compiler<'a> {
    /// Assertions for every to-one relationship of `entity`, plus one per
    /// related node for list relationships in `overwritten`.
    pub(crate) fn cardinality_checks(
        &mut self,
        entity: &'a ConcreteEntity,
        var: &Var,
        overwritten: &[&str],
    ) -> Result<Vec<Clause>> {
        let mut checks = Vec::new();
        for rel in entity.relationships.values() {
            let targets = self.targets(rel)?;
            if rel.is_to_one() {
                let cardinality = Cardinality::of(rel);
                let message = violation_message(&entity.name, &rel.name, cardinality, None);
                checks.push(self.count_assertion(var, rel, &targets, cardinality, &message, false));
            } else if overwritten.contains(&rel.name.as_str()) {
                let message =
                    violation_message(&entity.name, &rel.name, Cardinality::ExactlyOne, Some(&rel.target));
                checks.push(self.count_assertion(var, rel, &targets, Cardinality::ExactlyOne, &message, true));
            }
        }
        trace!(entity = %entity.name, checks = checks.len(), "validation.cardinality");
        Ok(checks)
    }

    /// Assertion on the far side of `origin.rel` after it was written.
    ///
    /// The message names the field that was written, not the inverse field
    /// that is counted.
    pub(crate) fn inverse_cardinality_check(
        &mut self,
        origin: &ConcreteEntity,
        rel: &Relationship,
        related: &'a ConcreteEntity,
        related_var: &Var,
    ) -> Result<Option<Clause>> {
        let Some(inverse) = self.schema.inverse_relationship(origin, rel, related) else {
            return Ok(None);
        };
        if !inverse.is_to_one() {
            return Ok(None);
        }
        let targets = self.targets(inverse)?;
        let cardinality = Cardinality::of(inverse);
        let message = violation_message(&origin.name, &rel.name, cardinality, Some(&related.name));
        Ok(Some(self.count_assertion(related_var, inverse, &targets, cardinality, &message, false)))
    }

    fn count_assertion(
        &mut self,
        var: &Var,
        rel: &Relationship,
        targets: &[&ConcreteEntity],
        cardinality: Cardinality,
        message: &str,
        per_node: bool,
    ) -> Clause {
        let edge = self.namer.fresh("this");
        let other = self.namer.fresh("this");
        let count = self.namer.fresh("var");
        let ignored = self.namer.fresh("var");
        let (node, where_) = match targets {
            [single] => (NodePattern::new(&other, &single.labels), None),
            _ => (
                NodePattern::bound(&other),
                Expr::any_of(
                    targets
                        .iter()
                        .map(|t| Expr::HasLabels(other.clone(), t.labels.clone())),
                ),
            ),
        };

        let mut body = Block::new();
        body.push(Clause::with_vars([var]));
        body.push(Clause::Match {
            optional: false,
            pattern: hop(var, rel, Some(&edge), node),
            where_,
        });
        let counted = Expr::call("count", vec![edge.expr()]);
        let mut grouped = Projection::single(counted, &count);
        if per_node {
            grouped.items.push(ProjectionItem::var(&other));
        }
        body.push(Clause::With {
            projection: grouped,
            where_: None,
        });
        body.push(Clause::assert_that(
            cardinality.holds(count.expr()),
            cardinality_message(message),
        ));
        let result = if per_node {
            Expr::call("collect", vec![count.expr()])
        } else {
            count.expr()
        };
        body.push(Clause::Return(Projection::single(result, &ignored)));
        Clause::call(body)
    }
}
