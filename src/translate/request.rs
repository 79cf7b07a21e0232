//! Request shape accepted by the translator.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::schema::AuthOperation;

/// JSON object used for filter, sort and mutation inputs.
pub type JsonMap = Map<String, Json>;

/// Operation requested against an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Read matching nodes.
    Read,
    /// Create nodes from `mutationInput`.
    Create,
    /// Update matching nodes.
    Update,
    /// Delete matching nodes.
    Delete,
    /// Aggregate over matching nodes.
    Aggregate,
}

impl Operation {
    /// Authorization operation guarding the request's root entity.
    pub fn auth_operation(self) -> AuthOperation {
        match self {
            Operation::Read => AuthOperation::Read,
            Operation::Create => AuthOperation::Create,
            Operation::Update => AuthOperation::Update,
            Operation::Delete => AuthOperation::Delete,
            Operation::Aggregate => AuthOperation::Aggregate,
        }
    }
}

/// A translation request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Root entity name.
    pub entity: String,
    /// Requested operation.
    pub operation: Operation,
    /// Fields to return.
    #[serde(default)]
    pub selection: Vec<FieldSelection>,
    /// Root filter.
    #[serde(rename = "where", default)]
    pub where_: Option<JsonMap>,
    /// Sort keys, first is primary.
    #[serde(default)]
    pub sort: Vec<JsonMap>,
    /// Maximum number of rows.
    #[serde(default)]
    pub limit: Option<i64>,
    /// Rows to skip.
    #[serde(default)]
    pub offset: Option<i64>,
    /// Input of create, update and delete operations.
    #[serde(default)]
    pub mutation_input: Option<Json>,
    /// Per-member selections when `entity` is an interface or union.
    #[serde(default)]
    pub on: IndexMap<String, Vec<FieldSelection>>,
}

impl Request {
    /// Bare request for `entity` with no selection.
    pub fn new(entity: impl Into<String>, operation: Operation) -> Self {
        Self {
            entity: entity.into(),
            operation,
            selection: Vec::new(),
            where_: None,
            sort: Vec::new(),
            limit: None,
            offset: None,
            mutation_input: None,
            on: IndexMap::new(),
        }
    }

    /// Replaces the selection.
    pub fn select(mut self, selection: Vec<FieldSelection>) -> Self {
        self.selection = selection;
        self
    }

    /// Sets the root filter; non-object values clear it.
    pub fn filter(mut self, where_: Json) -> Self {
        self.where_ = match where_ {
            Json::Object(map) => Some(map),
            _ => None,
        };
        self
    }

    /// Sets the mutation input.
    pub fn input(mut self, input: Json) -> Self {
        self.mutation_input = Some(input);
        self
    }

    /// Root selection for a concrete member of a composite entity.
    pub fn selection_for(&self, member: &str) -> Vec<FieldSelection> {
        merge_selection(&self.selection, self.on.get(member))
    }
}

/// Arguments accepted by a selected field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SelectionArgs {
    /// Filter on related nodes or edges.
    #[serde(rename = "where")]
    pub where_: Option<JsonMap>,
    /// Sort keys.
    pub sort: Vec<JsonMap>,
    /// Offset pagination limit.
    pub limit: Option<i64>,
    /// Offset pagination skip.
    pub offset: Option<i64>,
    /// Cursor pagination page size.
    pub first: Option<i64>,
    /// Cursor pagination start, exclusive.
    pub after: Option<String>,
}

/// A node of the selection tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSelection {
    /// Schema field name.
    pub name: String,
    /// Response key, when different from the name.
    pub alias: Option<String>,
    /// Field arguments.
    pub args: SelectionArgs,
    /// Nested selection.
    pub selection: Vec<FieldSelection>,
    /// Per-type selections for composite targets.
    pub on: IndexMap<String, Vec<FieldSelection>>,
}

impl FieldSelection {
    /// Leaf selection of `name`.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Selection of `name` with nested fields.
    pub fn nested(name: impl Into<String>, selection: Vec<FieldSelection>) -> Self {
        Self {
            name: name.into(),
            selection,
            ..Self::default()
        }
    }

    /// Sets the alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets the arguments.
    pub fn args(mut self, args: SelectionArgs) -> Self {
        self.args = args;
        self
    }

    /// Key the field appears under in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Nested selection that applies to a concrete member named `member`.
    pub fn selection_for(&self, member: &str) -> Vec<FieldSelection> {
        merge_selection(&self.selection, self.on.get(member))
    }

    /// Finds a direct child by field name.
    pub fn child(&self, name: &str) -> Option<&FieldSelection> {
        self.selection.iter().find(|f| f.name == name)
    }
}

fn merge_selection(shared: &[FieldSelection], extra: Option<&Vec<FieldSelection>>) -> Vec<FieldSelection> {
    let mut out = shared.to_vec();
    for field in extra.into_iter().flatten() {
        if !out.iter().any(|f| f.response_key() == field.response_key()) {
            out.push(field.clone());
        }
    }
    out
}
