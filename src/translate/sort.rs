//! Sort keys and offset pagination.

use tracing::trace;

use super::operators::Scope;
use super::request::JsonMap;
use super::Compiler;
use crate::error::{Result, TranslateError};
use crate::query::ast::{Expr, SortItem};
use crate::query::namer;
use crate::query::{Params, Value};
use crate::schema::{Attribute, ConcreteEntity};

/// Bound `SKIP` and `LIMIT` expressions.
#[derive(Debug, Default)]
pub(crate) struct Page {
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
}

/// Requested pagination for one level.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct PageRequest {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Top-level reads fall back to the configured default limit.
    pub root: bool,
}

impl<'a> Compiler<'a> {
    /// Resolves sort maps against `scope`; `target` builds the sorted
    /// expression for an attribute.
    pub(crate) fn sort_items(
        &self,
        scope: Scope<'a>,
        sort: &[JsonMap],
        target: impl Fn(&'a Attribute) -> Expr,
    ) -> Result<Vec<SortItem>> {
        let mut items = Vec::new();
        for map in sort {
            for (field, direction) in map {
                let attribute = scope
                    .attribute(field)
                    .ok_or_else(|| TranslateError::unknown_field(scope.name(), field))?;
                if !attribute.is_sortable() {
                    return Err(TranslateError::invalid_value(
                        field,
                        "field cannot be used for sorting",
                    ));
                }
                let descending = match direction.as_str() {
                    Some("ASC") => false,
                    Some("DESC") => true,
                    _ => {
                        return Err(TranslateError::invalid_value(
                            field,
                            "sort direction must be ASC or DESC",
                        ))
                    }
                };
                items.push(SortItem {
                    expr: target(attribute),
                    descending,
                });
            }
        }
        Ok(items)
    }

    /// Binds `SKIP` / `LIMIT` after applying entity and global limits.
    pub(crate) fn page(
        &mut self,
        params: &mut Params,
        entity: Option<&ConcreteEntity>,
        request: PageRequest,
        path: &str,
    ) -> Result<Page> {
        let requested_limit = non_negative("limit", request.limit)?;
        let offset = non_negative("offset", request.offset)?;
        let annotation = entity.and_then(|e| e.annotations.limit.as_ref());

        let default = annotation
            .and_then(|l| l.default)
            .or(if request.root { self.options.default_limit } else { None });
        let max = match (annotation.and_then(|l| l.max), self.options.max_limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let limit = match (requested_limit.or(default), max) {
            (Some(limit), Some(max)) => Some(limit.min(max)),
            (limit, max) => limit.or(max),
        };
        trace!(?limit, ?offset, path, "sort.page");

        let mut page = Page::default();
        if let Some(offset) = offset {
            page.skip = Some(self.bind(params, &namer::join(path, "offset"), int(offset)));
        }
        if let Some(limit) = limit {
            page.limit = Some(self.bind(params, &namer::join(path, "limit"), int(limit)));
        }
        Ok(page)
    }
}

fn non_negative(argument: &str, value: Option<i64>) -> Result<Option<u64>> {
    match value {
        None => Ok(None),
        Some(v) => u64::try_from(v)
            .map(Some)
            .map_err(|_| TranslateError::pagination(argument, format!("{argument} must be non-negative, got {v}"))),
    }
}

fn int(value: u64) -> Value {
    Value::Int(i64::try_from(value).unwrap_or(i64::MAX))
}
