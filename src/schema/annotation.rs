//! Annotations attached to entities, attributes and relationships.
//!
//! Every annotation deserializes with defaults so schema definitions only
//! spell out what differs from the common case.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Operations an authorization rule can be scoped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthOperation {
    /// Reading nodes or fields.
    Read,
    /// Aggregating over nodes.
    Aggregate,
    /// Creating nodes.
    Create,
    /// Updating nodes.
    Update,
    /// Deleting nodes.
    Delete,
    /// Connecting nodes through a relationship.
    CreateRelationship,
    /// Disconnecting nodes.
    DeleteRelationship,
}

impl AuthOperation {
    /// Every operation, in declaration order.
    pub const ALL: [AuthOperation; 7] = [
        AuthOperation::Read,
        AuthOperation::Aggregate,
        AuthOperation::Create,
        AuthOperation::Update,
        AuthOperation::Delete,
        AuthOperation::CreateRelationship,
        AuthOperation::DeleteRelationship,
    ];
}

impl fmt::Display for AuthOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthOperation::Read => "READ",
            AuthOperation::Aggregate => "AGGREGATE",
            AuthOperation::Create => "CREATE",
            AuthOperation::Update => "UPDATE",
            AuthOperation::Delete => "DELETE",
            AuthOperation::CreateRelationship => "CREATE_RELATIONSHIP",
            AuthOperation::DeleteRelationship => "DELETE_RELATIONSHIP",
        };
        f.write_str(name)
    }
}

/// When a validate rule is evaluated relative to the mutation it guards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationWhen {
    /// Right after the pattern match, before traversal or writes.
    Before,
    /// Right before the terminal return or write.
    After,
}

fn default_filter_operations() -> BTreeSet<AuthOperation> {
    AuthOperation::ALL
        .into_iter()
        .filter(|op| *op != AuthOperation::Create)
        .collect()
}

fn default_validate_operations() -> BTreeSet<AuthOperation> {
    AuthOperation::ALL.into_iter().collect()
}

fn default_when() -> BTreeSet<ValidationWhen> {
    [ValidationWhen::Before, ValidationWhen::After]
        .into_iter()
        .collect()
}

fn default_true() -> bool {
    true
}

/// A single declared authorization rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRule {
    /// Operations this rule applies to.
    pub operations: BTreeSet<AuthOperation>,
    /// Whether the rule only passes for authenticated requests.
    #[serde(default = "default_true")]
    pub require_authentication: bool,
    /// Evaluation points; only meaningful for validate rules.
    #[serde(default = "default_when")]
    pub when: BTreeSet<ValidationWhen>,
    /// Predicate tree over `node` and `jwt`.
    #[serde(rename = "where", default)]
    pub where_: serde_json::Map<String, serde_json::Value>,
}

impl AuthorizationRule {
    /// Creates a filter-style rule with the default operation scope.
    pub fn filter(where_: serde_json::Value) -> Self {
        Self {
            operations: default_filter_operations(),
            require_authentication: true,
            when: default_when(),
            where_: into_object(where_),
        }
    }

    /// Creates a validate-style rule with the default operation scope.
    pub fn validate(where_: serde_json::Value) -> Self {
        Self {
            operations: default_validate_operations(),
            require_authentication: true,
            when: default_when(),
            where_: into_object(where_),
        }
    }

    /// Restricts the rule to the given operations.
    pub fn on(mut self, operations: impl IntoIterator<Item = AuthOperation>) -> Self {
        self.operations = operations.into_iter().collect();
        self
    }

    /// Restricts the rule to the given evaluation points.
    pub fn when(mut self, when: impl IntoIterator<Item = ValidationWhen>) -> Self {
        self.when = when.into_iter().collect();
        self
    }

    /// Toggles the authentication requirement.
    pub fn require_authentication(mut self, required: bool) -> Self {
        self.require_authentication = required;
        self
    }

    /// Whether the rule applies to `operation`.
    pub fn applies_to(&self, operation: AuthOperation) -> bool {
        self.operations.contains(&operation)
    }
}

fn into_object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRule {
    operations: Option<BTreeSet<AuthOperation>>,
    #[serde(default = "default_true")]
    require_authentication: bool,
    #[serde(default = "default_when")]
    when: BTreeSet<ValidationWhen>,
    #[serde(rename = "where", default)]
    where_: serde_json::Map<String, serde_json::Value>,
}

impl RawRule {
    fn into_rule(self, default_ops: fn() -> BTreeSet<AuthOperation>) -> AuthorizationRule {
        AuthorizationRule {
            operations: self.operations.unwrap_or_else(default_ops),
            require_authentication: self.require_authentication,
            when: self.when,
            where_: self.where_,
        }
    }
}

/// Filter and validate rules declared on an entity or field.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AuthorizationAnnotation {
    /// Rules that silently narrow matched rows.
    pub filter: Vec<AuthorizationRule>,
    /// Rules that raise `Forbidden` when violated.
    pub validate: Vec<AuthorizationRule>,
}

impl<'de> Deserialize<'de> for AuthorizationAnnotation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            filter: Vec<RawRule>,
            #[serde(default)]
            validate: Vec<RawRule>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(AuthorizationAnnotation {
            filter: raw
                .filter
                .into_iter()
                .map(|r| r.into_rule(default_filter_operations))
                .collect(),
            validate: raw
                .validate
                .into_iter()
                .map(|r| r.into_rule(default_validate_operations))
                .collect(),
        })
    }
}

/// Computed field backed by a Cypher statement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CypherAnnotation {
    /// Statement run with `this` bound to the parent node.
    pub statement: String,
    /// Result column the statement returns.
    pub column_name: String,
}

/// Field resolved outside the database.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomResolverAnnotation {
    /// Sibling fields that must be projected for the resolver.
    #[serde(default)]
    pub requires: Vec<String>,
}

/// Identifier generation settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAnnotation {
    /// Generate a UUID on create.
    #[serde(default = "default_true")]
    pub autogenerate: bool,
}

/// Timestamp maintenance settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampAnnotation {
    /// Stamp the field on create.
    #[serde(default = "default_true")]
    pub on_create: bool,
    /// Stamp the field on update.
    #[serde(default = "default_true")]
    pub on_update: bool,
}

/// Read gating.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectableAnnotation {
    /// Field may be read.
    #[serde(default = "default_true")]
    pub on_read: bool,
    /// Field may be aggregated.
    #[serde(default = "default_true")]
    pub on_aggregate: bool,
}

/// Write gating.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettableAnnotation {
    /// Field may be set on create.
    #[serde(default = "default_true")]
    pub on_create: bool,
    /// Field may be set on update.
    #[serde(default = "default_true")]
    pub on_update: bool,
}

/// Filter gating.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterableAnnotation {
    /// Field may appear in value filters.
    #[serde(default = "default_true")]
    pub by_value: bool,
    /// Field may appear in aggregate filters.
    #[serde(default = "default_true")]
    pub by_aggregate: bool,
}

/// Per-attribute annotations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AttributeAnnotations {
    /// Field-level authorization.
    pub authorization: Option<AuthorizationAnnotation>,
    /// Computed field.
    pub cypher: Option<CypherAnnotation>,
    /// Externally resolved field.
    pub custom_resolver: Option<CustomResolverAnnotation>,
    /// Uniqueness constraint.
    pub unique: bool,
    /// Identifier generation.
    pub id: Option<IdAnnotation>,
    /// Global relay identifier.
    pub relay_id: bool,
    /// Value applied on create when the input omits the field.
    pub default: Option<serde_json::Value>,
    /// Timestamp maintenance.
    pub timestamp: Option<TimestampAnnotation>,
    /// Database property name when it differs from the field name.
    pub alias: Option<String>,
    /// Read gating.
    pub selectable: Option<SelectableAnnotation>,
    /// Write gating.
    pub settable: Option<SettableAnnotation>,
    /// Filter gating.
    pub filterable: Option<FilterableAnnotation>,
    /// Sort gating; `None` means sortable when the type allows it.
    pub sortable: Option<bool>,
    /// Value is supplied by a callback.
    pub populated_by: bool,
}

/// Limits applied to reads of an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitAnnotation {
    /// Applied when the request omits a limit.
    pub default: Option<u64>,
    /// Upper bound for requested limits.
    pub max: Option<u64>,
}

/// Per-entity annotations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityAnnotations {
    /// Type-level authorization.
    pub authorization: Option<AuthorizationAnnotation>,
    /// Read limits.
    pub limit: Option<LimitAnnotation>,
}
