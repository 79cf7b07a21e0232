//! Filter key parsing: `<field><suffix>` into a field and an operator.

use crate::error::{Result, TranslateError};
use crate::query::ast::{BinaryOp, Expr};
use crate::schema::{Attribute, ConcreteEntity, EdgeProperties, Relationship};

/// Filter operators, keyed by suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FilterOperator {
    Eq,
    Not,
    In,
    NotIn,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Matches,
    Lt,
    Lte,
    Gt,
    Gte,
    Includes,
    NotIncludes,
    Distance,
}

/// Longest suffixes first so `_NOT_IN` is never read as `_IN`.
const SUFFIXES: &[(&str, FilterOperator)] = &[
    ("_NOT_STARTS_WITH", FilterOperator::NotStartsWith),
    ("_NOT_ENDS_WITH", FilterOperator::NotEndsWith),
    ("_NOT_CONTAINS", FilterOperator::NotContains),
    ("_NOT_INCLUDES", FilterOperator::NotIncludes),
    ("_STARTS_WITH", FilterOperator::StartsWith),
    ("_ENDS_WITH", FilterOperator::EndsWith),
    ("_CONTAINS", FilterOperator::Contains),
    ("_INCLUDES", FilterOperator::Includes),
    ("_DISTANCE", FilterOperator::Distance),
    ("_MATCHES", FilterOperator::Matches),
    ("_NOT_IN", FilterOperator::NotIn),
    ("_NOT", FilterOperator::Not),
    ("_LTE", FilterOperator::Lte),
    ("_GTE", FilterOperator::Gte),
    ("_LT", FilterOperator::Lt),
    ("_GT", FilterOperator::Gt),
    ("_IN", FilterOperator::In),
];

impl FilterOperator {
    /// Splits `key` into a field name and operator, if the suffix is known.
    pub fn split(key: &str) -> Vec<(&str, FilterOperator)> {
        let mut out = vec![(key, FilterOperator::Eq)];
        for (suffix, op) in SUFFIXES {
            if let Some(field) = key.strip_suffix(suffix) {
                if !field.is_empty() {
                    out.push((field, *op));
                }
            }
        }
        out
    }

    /// Whether the operator negates its positive form.
    pub fn is_negated(self) -> bool {
        matches!(
            self,
            FilterOperator::Not
                | FilterOperator::NotIn
                | FilterOperator::NotContains
                | FilterOperator::NotStartsWith
                | FilterOperator::NotEndsWith
                | FilterOperator::NotIncludes
        )
    }

    /// The positive form of a negated operator.
    pub fn positive(self) -> FilterOperator {
        match self {
            FilterOperator::Not => FilterOperator::Eq,
            FilterOperator::NotIn => FilterOperator::In,
            FilterOperator::NotContains => FilterOperator::Contains,
            FilterOperator::NotStartsWith => FilterOperator::StartsWith,
            FilterOperator::NotEndsWith => FilterOperator::EndsWith,
            FilterOperator::NotIncludes => FilterOperator::Includes,
            other => other,
        }
    }

    pub fn is_string(self) -> bool {
        matches!(
            self.positive(),
            FilterOperator::Contains
                | FilterOperator::StartsWith
                | FilterOperator::EndsWith
                | FilterOperator::Matches
        )
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            FilterOperator::Lt | FilterOperator::Lte | FilterOperator::Gt | FilterOperator::Gte
        )
    }

    /// Binary operator for comparison-shaped operators.
    pub fn binary(self) -> Option<BinaryOp> {
        Some(match self.positive() {
            FilterOperator::Eq | FilterOperator::Distance => BinaryOp::Eq,
            FilterOperator::In => BinaryOp::In,
            FilterOperator::Contains => BinaryOp::Contains,
            FilterOperator::StartsWith => BinaryOp::StartsWith,
            FilterOperator::EndsWith => BinaryOp::EndsWith,
            FilterOperator::Matches => BinaryOp::Matches,
            FilterOperator::Lt => BinaryOp::Lt,
            FilterOperator::Lte => BinaryOp::Lte,
            FilterOperator::Gt => BinaryOp::Gt,
            FilterOperator::Gte => BinaryOp::Gte,
            _ => return None,
        })
    }

    /// Rejects operators the attribute's type cannot support.
    pub fn check(self, attribute: &Attribute) -> std::result::Result<(), String> {
        let op = self.positive();
        if self.is_string() {
            if attribute.is_textual() && !attribute.is_list() {
                return Ok(());
            }
            return Err(format!(
                "string operator on non-string attribute '{}'",
                attribute.name
            ));
        }
        match op {
            FilterOperator::Lt | FilterOperator::Lte | FilterOperator::Gt | FilterOperator::Gte => {
                let orderable = attribute.is_numeric()
                    || attribute.is_temporal()
                    || attribute.is_textual()
                    || attribute.is_spatial();
                if orderable && !attribute.is_list() {
                    Ok(())
                } else {
                    Err(format!(
                        "ordering operator on non-orderable attribute '{}'",
                        attribute.name
                    ))
                }
            }
            FilterOperator::In if attribute.is_list() => Err(format!(
                "'_IN' on list attribute '{}', use '_INCLUDES'",
                attribute.name
            )),
            FilterOperator::Includes if !attribute.is_list() => Err(format!(
                "'_INCLUDES' on non-list attribute '{}'",
                attribute.name
            )),
            FilterOperator::Distance if !attribute.is_spatial() => Err(format!(
                "'_DISTANCE' on non-spatial attribute '{}'",
                attribute.name
            )),
            _ => Ok(()),
        }
    }

    /// Applies the positive comparison and negation to already-built operands.
    pub fn apply(self, lhs: Expr, rhs: Expr) -> Expr {
        let positive = match self.positive() {
            FilterOperator::Includes => Expr::binary(BinaryOp::In, rhs, lhs),
            other => match other.binary() {
                Some(op) => Expr::binary(op, lhs, rhs),
                None => Expr::eq(lhs, rhs),
            },
        };
        if self.is_negated() {
            positive.negate()
        } else {
            positive
        }
    }
}

/// Relationship quantifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RelationQuantifier {
    Some,
    None,
    All,
    Single,
}

impl RelationQuantifier {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "SOME" => Some(RelationQuantifier::Some),
            "NONE" | "NOT" => Some(RelationQuantifier::None),
            "ALL" => Some(RelationQuantifier::All),
            "SINGLE" => Some(RelationQuantifier::Single),
            _ => None,
        }
    }
}

/// What a filter key is compiled against.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Scope<'s> {
    Node(&'s ConcreteEntity),
    Edge(&'s EdgeProperties),
}

impl<'s> Scope<'s> {
    pub fn name(&self) -> &'s str {
        match *self {
            Scope::Node(entity) => &entity.name,
            Scope::Edge(props) => &props.name,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&'s Attribute> {
        match *self {
            Scope::Node(entity) => entity.attribute(name),
            Scope::Edge(props) => props.attribute(name),
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = &'s Attribute> {
        match *self {
            Scope::Node(entity) => entity.attributes.values(),
            Scope::Edge(props) => props.attributes.values(),
        }
    }

    pub fn relationship(&self, name: &str) -> Option<&'s Relationship> {
        match *self {
            Scope::Node(entity) => entity.relationship(name),
            Scope::Edge(_) => None,
        }
    }
}

/// A parsed filter key.
#[derive(Clone, Copy, Debug)]
pub(crate) enum FilterKey<'s> {
    Attribute {
        attribute: &'s Attribute,
        operator: FilterOperator,
    },
    Relationship {
        relationship: &'s Relationship,
        quantifier: RelationQuantifier,
        /// `rel` or `rel_NOT` rather than an explicit quantifier.
        bare: bool,
    },
    Connection {
        relationship: &'s Relationship,
        quantifier: RelationQuantifier,
    },
    Aggregate {
        relationship: &'s Relationship,
    },
    Typename,
}

/// Resolves `key` against `scope`.
pub(crate) fn parse_key<'s>(scope: Scope<'s>, key: &str) -> Result<FilterKey<'s>> {
    let malformed = |reason: String| TranslateError::malformed_key(scope.name(), key, reason);

    if key == "typename_IN" {
        return Ok(FilterKey::Typename);
    }
    if let Some(relationship) = scope.relationship(key) {
        return Ok(FilterKey::Relationship {
            relationship,
            quantifier: RelationQuantifier::Some,
            bare: true,
        });
    }
    if let Some(field) = key.strip_suffix("Aggregate") {
        if let Some(relationship) = scope.relationship(field) {
            return Ok(FilterKey::Aggregate { relationship });
        }
    }
    if let Some((head, suffix)) = key.rsplit_once('_') {
        if let Some(quantifier) = RelationQuantifier::from_suffix(suffix) {
            if let Some(relationship) = scope.relationship(head) {
                return Ok(FilterKey::Relationship {
                    relationship,
                    quantifier,
                    bare: suffix == "NOT",
                });
            }
            if let Some(field) = head.strip_suffix("Connection") {
                if let Some(relationship) = scope.relationship(field) {
                    return Ok(FilterKey::Connection {
                        relationship,
                        quantifier,
                    });
                }
            }
        }
    }
    if let Some(field) = key.strip_suffix("Connection") {
        if let Some(relationship) = scope.relationship(field) {
            return Ok(FilterKey::Connection {
                relationship,
                quantifier: RelationQuantifier::Some,
            });
        }
    }

    for (field, operator) in FilterOperator::split(key) {
        let Some(attribute) = scope.attribute(field) else {
            continue;
        };
        if !attribute.is_where_field() {
            return Err(malformed(format!("attribute '{field}' is not filterable")));
        }
        operator.check(attribute).map_err(malformed)?;
        return Ok(FilterKey::Attribute {
            attribute,
            operator,
        });
    }
    Err(malformed("no field or operator matches this key".to_owned()))
}
