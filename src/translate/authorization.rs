//! Authorization rules compiled into predicates and assertions.
//!
//! Filter rules narrow the matched rows and validate rules become
//! `apoc.util.validate` calls that fail the query with `FORBIDDEN`. Both are
//! declared on entities and on individual fields; a field's rules apply when
//! the field is selected or written.

use serde_json::{Map, Value as Json};
use tracing::trace;

use super::context::{Fragment, QueryAstContext};
use super::operators::{FilterOperator, Scope};
use super::{object, Compiler};
use crate::auth::split_path;
use crate::error::{Result, TranslateError, FORBIDDEN_MESSAGE};
use crate::query::ast::{Clause, Expr};
use crate::query::Value;
use crate::schema::{
    AttributeAnnotations, AuthOperation, AuthorizationAnnotation, AuthorizationRule,
    ConcreteEntity, ValidationWhen,
};

/// Annotations of the named fields that carry authorization rules.
pub(crate) fn guarded_fields<'e, 'n>(
    entity: &'e ConcreteEntity,
    names: impl IntoIterator<Item = &'n str>,
) -> Vec<&'e AttributeAnnotations> {
    let mut out: Vec<&'e AttributeAnnotations> = Vec::new();
    for name in names {
        let annotations = entity
            .attribute(name)
            .map(|a| &a.annotations)
            .or_else(|| entity.relationship(name).map(|r| &r.annotations));
        if let Some(annotations) = annotations {
            if annotations.authorization.is_some() && !out.iter().any(|seen| std::ptr::eq(*seen, annotations)) {
                out.push(annotations);
            }
        }
    }
    out
}

impl<'a> Compiler<'a> {
    /// Conjunction of the filter rules that apply to `operation`.
    pub(crate) fn authorization_filter(
        &mut self,
        entity: &'a ConcreteEntity,
        operation: AuthOperation,
        fields: &[&'a AttributeAnnotations],
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        let rules: Vec<&'a AuthorizationRule> = rule_sets(entity, fields)
            .into_iter()
            .flat_map(|annotation| annotation.filter.iter())
            .filter(|rule| rule.applies_to(operation))
            .collect();
        self.rules_predicate(entity, &rules, ctx)
    }

    /// Assertion for the validate rules that apply to `operation` at `when`.
    pub(crate) fn authorization_validate(
        &mut self,
        entity: &'a ConcreteEntity,
        operation: AuthOperation,
        when: ValidationWhen,
        fields: &[&'a AttributeAnnotations],
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Clause>>> {
        let rules: Vec<&'a AuthorizationRule> = rule_sets(entity, fields)
            .into_iter()
            .flat_map(|annotation| annotation.validate.iter())
            .filter(|rule| rule.applies_to(operation) && rule.when.contains(&when))
            .collect();
        let predicate = self.rules_predicate(entity, &rules, ctx)?;
        Ok(predicate.map(|p| p.map(|p| Clause::assert_that(p, FORBIDDEN_MESSAGE))))
    }

    fn rules_predicate(
        &mut self,
        entity: &'a ConcreteEntity,
        rules: &[&'a AuthorizationRule],
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        let mut out = Fragment::new(None);
        if rules.is_empty() {
            return Ok(out);
        }
        trace!(entity = %entity.name, rules = rules.len(), "auth.rules");
        let auth_ctx = ctx.at("auth");
        let mut predicates = Vec::new();
        for (idx, rule) in rules.iter().enumerate() {
            if rule.require_authentication && !self.auth.is_authenticated {
                predicates.push(Expr::lit(false));
                continue;
            }
            let part = self.rule_where(entity, &rule.where_, &auth_ctx.indexed(idx))?;
            predicates.extend(out.absorb(part));
        }
        out.value = Expr::all_of(predicates);
        Ok(out)
    }

    /// `AND` / `OR` / `NOT` / `node` / `jwt` tree of a single rule.
    fn rule_where(
        &mut self,
        entity: &'a ConcreteEntity,
        filter: &Map<String, Json>,
        ctx: &QueryAstContext,
    ) -> Result<Fragment<Option<Expr>>> {
        let mut out = Fragment::new(None);
        let mut predicates = Vec::new();
        for (key, value) in filter {
            let key_ctx = ctx.at(key);
            match key.as_str() {
                "AND" | "OR" => {
                    let items = value.as_array().ok_or_else(|| {
                        TranslateError::invalid_value(key, "expected a list of rules")
                    })?;
                    let mut parts = Vec::new();
                    for (idx, item) in items.iter().enumerate() {
                        let part = self.rule_where(entity, object(key, item)?, &key_ctx.indexed(idx))?;
                        parts.extend(out.absorb(part));
                    }
                    predicates.extend(if key == "AND" {
                        Expr::all_of(parts)
                    } else {
                        Expr::any_of(parts)
                    });
                }
                "NOT" => {
                    let inner = self.rule_where(entity, object(key, value)?, &key_ctx)?;
                    if let Some(predicate) = out.absorb(inner) {
                        predicates.push(predicate.negate());
                    }
                }
                "node" => {
                    let Some(resolved) = self.substitute_claims(value) else {
                        predicates.push(Expr::lit(false));
                        continue;
                    };
                    let part = self.compile_where(Scope::Node(entity), object(key, &resolved)?, &key_ctx)?;
                    predicates.extend(out.absorb(part));
                }
                "jwt" => {
                    let part = self.jwt_where(object(key, value)?, &key_ctx)?;
                    predicates.extend(out.absorb(part));
                }
                other => {
                    return Err(TranslateError::malformed_key(
                        &entity.name,
                        other,
                        "authorization rules accept node, jwt, AND, OR and NOT",
                    ))
                }
            }
        }
        out.value = Expr::all_of(predicates);
        Ok(out)
    }

    /// Comparisons against the `$jwt` parameter.
    fn jwt_where(&mut self, filter: &Map<String, Json>, ctx: &QueryAstContext) -> Result<Fragment<Option<Expr>>> {
        let mut out = Fragment::new(None);
        let mut predicates = Vec::new();
        for (key, value) in filter {
            let (field, operator) = FilterOperator::split(key)
                .into_iter()
                .nth(1)
                .unwrap_or((key.as_str(), FilterOperator::Eq));
            let mut claim = self.jwt(&mut out.params);
            for segment in split_path(self.auth.claim_path(field)) {
                claim = claim.prop(&segment);
            }
            let predicate = if value.is_null() {
                match operator {
                    FilterOperator::Eq => Expr::IsNull(Box::new(claim)),
                    FilterOperator::Not => Expr::IsNotNull(Box::new(claim)),
                    _ => {
                        return Err(TranslateError::invalid_value(
                            key,
                            "null is only accepted by equality filters",
                        ))
                    }
                }
            } else {
                let param = self.bind(&mut out.params, &ctx.param_path(key), Value::from_json(value));
                operator.apply(claim, param)
            };
            predicates.push(predicate);
        }
        out.value = Expr::all_of(predicates);
        Ok(out)
    }

    /// Replaces `"$jwt.<field>"` leaves with claim values. `None` when a
    /// referenced claim is absent.
    fn substitute_claims(&self, value: &Json) -> Option<Json> {
        match value {
            Json::String(raw) => match raw.strip_prefix("$jwt.") {
                Some(field) => self.auth.claim(field).cloned(),
                None => Some(value.clone()),
            },
            Json::Array(items) => items
                .iter()
                .map(|item| self.substitute_claims(item))
                .collect::<Option<Vec<_>>>()
                .map(Json::Array),
            Json::Object(map) => map
                .iter()
                .map(|(k, v)| self.substitute_claims(v).map(|v| (k.clone(), v)))
                .collect::<Option<Map<_, _>>>()
                .map(Json::Object),
            other => Some(other.clone()),
        }
    }
}

/// Entity rules first, then field rules in the order given.
fn rule_sets<'a>(
    entity: &'a ConcreteEntity,
    fields: &[&'a AttributeAnnotations],
) -> Vec<&'a AuthorizationAnnotation> {
    entity
        .annotations
        .authorization
        .iter()
        .chain(fields.iter().copied().filter_map(|f| f.authorization.as_ref()))
        .collect()
}
