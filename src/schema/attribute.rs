//! Attribute types and the derived capability predicates.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::annotation::AttributeAnnotations;

/// Built-in scalar kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    /// `Boolean`.
    Boolean,
    /// `String`.
    String,
    /// 32-bit `Int`.
    Int,
    /// `Float`.
    Float,
    /// `ID`.
    Id,
}

/// Temporal kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporalKind {
    /// `Date`.
    Date,
    /// `DateTime`.
    DateTime,
    /// `LocalDateTime`.
    LocalDateTime,
    /// `Time`.
    Time,
    /// `LocalTime`.
    LocalTime,
    /// `Duration`.
    Duration,
}

impl TemporalKind {
    /// Cypher constructor function for the kind.
    pub fn cypher_function(self) -> &'static str {
        match self {
            TemporalKind::Date => "date",
            TemporalKind::DateTime => "datetime",
            TemporalKind::LocalDateTime => "localdatetime",
            TemporalKind::Time => "time",
            TemporalKind::LocalTime => "localtime",
            TemporalKind::Duration => "duration",
        }
    }

    /// Type name as written in schema definitions.
    pub fn type_name(self) -> &'static str {
        match self {
            TemporalKind::Date => "Date",
            TemporalKind::DateTime => "DateTime",
            TemporalKind::LocalDateTime => "LocalDateTime",
            TemporalKind::Time => "Time",
            TemporalKind::LocalTime => "LocalTime",
            TemporalKind::Duration => "Duration",
        }
    }
}

/// Spatial kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialKind {
    /// Geographic WGS-84 point.
    Point,
    /// Cartesian point.
    CartesianPoint,
}

/// Semantic type of a named (non-list) attribute.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name")]
pub enum TypeKind {
    /// Built-in scalar.
    Scalar(ScalarKind),
    /// 64-bit integer carried as a decimal string.
    BigInt,
    /// User-declared scalar.
    UserScalar(String),
    /// Enum.
    Enum(String),
    /// Temporal.
    Temporal(TemporalKind),
    /// Spatial.
    Spatial(SpatialKind),
    /// Reference to a concrete entity.
    Object(String),
    /// Reference to an interface.
    Interface(String),
    /// Reference to a union.
    Union(String),
}

impl TypeKind {
    /// Parses a built-in type name. Returns `None` for user-declared names.
    pub fn builtin(name: &str) -> Option<Self> {
        let kind = match name {
            "Boolean" => TypeKind::Scalar(ScalarKind::Boolean),
            "String" => TypeKind::Scalar(ScalarKind::String),
            "Int" => TypeKind::Scalar(ScalarKind::Int),
            "Float" => TypeKind::Scalar(ScalarKind::Float),
            "ID" => TypeKind::Scalar(ScalarKind::Id),
            "BigInt" => TypeKind::BigInt,
            "Date" => TypeKind::Temporal(TemporalKind::Date),
            "DateTime" => TypeKind::Temporal(TemporalKind::DateTime),
            "LocalDateTime" => TypeKind::Temporal(TemporalKind::LocalDateTime),
            "Time" => TypeKind::Temporal(TemporalKind::Time),
            "LocalTime" => TypeKind::Temporal(TemporalKind::LocalTime),
            "Duration" => TypeKind::Temporal(TemporalKind::Duration),
            "Point" => TypeKind::Spatial(SpatialKind::Point),
            "CartesianPoint" => TypeKind::Spatial(SpatialKind::CartesianPoint),
            _ => return None,
        };
        Some(kind)
    }

    /// Type name as written in schema definitions.
    pub fn name(&self) -> &str {
        match self {
            TypeKind::Scalar(ScalarKind::Boolean) => "Boolean",
            TypeKind::Scalar(ScalarKind::String) => "String",
            TypeKind::Scalar(ScalarKind::Int) => "Int",
            TypeKind::Scalar(ScalarKind::Float) => "Float",
            TypeKind::Scalar(ScalarKind::Id) => "ID",
            TypeKind::BigInt => "BigInt",
            TypeKind::Temporal(t) => t.type_name(),
            TypeKind::Spatial(SpatialKind::Point) => "Point",
            TypeKind::Spatial(SpatialKind::CartesianPoint) => "CartesianPoint",
            TypeKind::UserScalar(name)
            | TypeKind::Enum(name)
            | TypeKind::Object(name)
            | TypeKind::Interface(name)
            | TypeKind::Union(name) => name,
        }
    }
}

/// Declared type of an attribute, including nullability and list-ness.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    /// A single value.
    Named {
        /// Semantic kind.
        kind: TypeKind,
        /// Non-nullable.
        required: bool,
    },
    /// A list of values.
    List {
        /// Element type.
        of: Box<AttributeType>,
        /// Non-nullable list.
        required: bool,
    },
}

impl AttributeType {
    /// Nullable named type.
    pub fn named(kind: TypeKind) -> Self {
        AttributeType::Named {
            kind,
            required: false,
        }
    }

    /// Non-nullable named type.
    pub fn required(kind: TypeKind) -> Self {
        AttributeType::Named {
            kind,
            required: true,
        }
    }

    /// List of `of`.
    pub fn list(of: AttributeType, required: bool) -> Self {
        AttributeType::List {
            of: Box::new(of),
            required,
        }
    }

    /// Parses a type reference such as `[String!]!` against a resolver for
    /// non built-in names.
    pub fn parse<F>(type_ref: &str, resolve: &F) -> Option<Self>
    where
        F: Fn(&str) -> Option<TypeKind>,
    {
        let trimmed = type_ref.trim();
        let (body, required) = match trimmed.strip_suffix('!') {
            Some(body) => (body.trim_end(), true),
            None => (trimmed, false),
        };
        if let Some(inner) = body.strip_prefix('[') {
            let inner = inner.strip_suffix(']')?;
            let of = Self::parse(inner, resolve)?;
            return Some(AttributeType::list(of, required));
        }
        if body.is_empty() || body.contains(['[', ']', '!']) {
            return None;
        }
        let kind = TypeKind::builtin(body).or_else(|| resolve(body))?;
        Some(AttributeType::Named { kind, required })
    }

    /// Innermost semantic kind.
    pub fn kind(&self) -> &TypeKind {
        match self {
            AttributeType::Named { kind, .. } => kind,
            AttributeType::List { of, .. } => of.kind(),
        }
    }

    /// Element type for lists, the type itself otherwise.
    pub fn element(&self) -> &AttributeType {
        match self {
            AttributeType::List { of, .. } => of,
            named => named,
        }
    }

    /// Whether the type is a list.
    pub fn is_list(&self) -> bool {
        matches!(self, AttributeType::List { .. })
    }

    /// Whether the outermost type is non-nullable.
    pub fn is_required(&self) -> bool {
        match self {
            AttributeType::Named { required, .. } | AttributeType::List { required, .. } => {
                *required
            }
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Named { kind, required } => {
                write!(f, "{}{}", kind.name(), if *required { "!" } else { "" })
            }
            AttributeType::List { of, required } => {
                write!(f, "[{}]{}", of, if *required { "!" } else { "" })
            }
        }
    }
}

/// A typed, annotated field on an entity or relationship-properties type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Field name as exposed to requests.
    pub name: String,
    /// Property name in the database.
    pub database_name: String,
    /// Declared type.
    pub ty: AttributeType,
    /// Annotations.
    pub annotations: AttributeAnnotations,
}

impl Attribute {
    /// Creates an attribute whose database name equals its field name.
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        let name = name.into();
        Self {
            database_name: name.clone(),
            name,
            ty,
            annotations: AttributeAnnotations::default(),
        }
    }

    /// Replaces the annotations, honouring any alias they declare.
    pub fn with_annotations(mut self, annotations: AttributeAnnotations) -> Self {
        if let Some(alias) = &annotations.alias {
            self.database_name = alias.clone();
        }
        self.annotations = annotations;
        self
    }

    fn kind(&self) -> &TypeKind {
        self.ty.kind()
    }

    /// List-typed at the outer level.
    pub fn is_list(&self) -> bool {
        self.ty.is_list()
    }

    /// Non-null at the outer level.
    pub fn is_required(&self) -> bool {
        self.ty.is_required()
    }

    /// List whose elements are non-null.
    pub fn is_list_element_required(&self) -> bool {
        match &self.ty {
            AttributeType::List { of, .. } => of.is_required(),
            AttributeType::Named { .. } => false,
        }
    }

    /// `Boolean`.
    pub fn is_boolean(&self) -> bool {
        matches!(self.kind(), TypeKind::Scalar(ScalarKind::Boolean))
    }

    /// `ID`.
    pub fn is_id(&self) -> bool {
        matches!(self.kind(), TypeKind::Scalar(ScalarKind::Id))
    }

    /// `Int`.
    pub fn is_int(&self) -> bool {
        matches!(self.kind(), TypeKind::Scalar(ScalarKind::Int))
    }

    /// `Float`.
    pub fn is_float(&self) -> bool {
        matches!(self.kind(), TypeKind::Scalar(ScalarKind::Float))
    }

    /// `String`.
    pub fn is_string(&self) -> bool {
        matches!(self.kind(), TypeKind::Scalar(ScalarKind::String))
    }

    /// `BigInt`, bound as a 64-bit integer.
    pub fn is_big_int(&self) -> bool {
        matches!(self.kind(), TypeKind::BigInt)
    }

    /// Any date, time or duration kind.
    pub fn is_temporal(&self) -> bool {
        matches!(self.kind(), TypeKind::Temporal(_))
    }

    /// Temporal kind when the attribute is temporal.
    pub fn temporal_kind(&self) -> Option<TemporalKind> {
        match self.kind() {
            TypeKind::Temporal(kind) => Some(*kind),
            _ => None,
        }
    }

    /// `Date`.
    pub fn is_date(&self) -> bool {
        self.temporal_kind() == Some(TemporalKind::Date)
    }

    /// `DateTime`.
    pub fn is_date_time(&self) -> bool {
        self.temporal_kind() == Some(TemporalKind::DateTime)
    }

    /// `Duration`.
    pub fn is_duration(&self) -> bool {
        self.temporal_kind() == Some(TemporalKind::Duration)
    }

    /// Geographic or cartesian point.
    pub fn is_spatial(&self) -> bool {
        matches!(self.kind(), TypeKind::Spatial(_))
    }

    /// WGS-84 `Point`.
    pub fn is_point(&self) -> bool {
        matches!(self.kind(), TypeKind::Spatial(SpatialKind::Point))
    }

    /// `CartesianPoint`.
    pub fn is_cartesian_point(&self) -> bool {
        matches!(self.kind(), TypeKind::Spatial(SpatialKind::CartesianPoint))
    }

    /// Schema-declared enum.
    pub fn is_enum(&self) -> bool {
        matches!(self.kind(), TypeKind::Enum(_))
    }

    /// Scalar declared by the schema rather than built in.
    pub fn is_user_scalar(&self) -> bool {
        matches!(self.kind(), TypeKind::UserScalar(_))
    }

    /// One of the built-in GraphQL scalars.
    pub fn is_builtin_scalar(&self) -> bool {
        matches!(self.kind(), TypeKind::Scalar(_))
    }

    /// Built-in, big-integer or user scalar.
    pub fn is_scalar(&self) -> bool {
        self.is_builtin_scalar() || self.is_big_int() || self.is_user_scalar()
    }

    /// Supports arithmetic operators and numeric aggregations.
    pub fn is_numeric(&self) -> bool {
        self.is_int() || self.is_float() || self.is_big_int()
    }

    /// Reference to a concrete object type.
    pub fn is_object(&self) -> bool {
        matches!(self.kind(), TypeKind::Object(_))
    }

    /// Reference to an interface.
    pub fn is_interface(&self) -> bool {
        matches!(self.kind(), TypeKind::Interface(_))
    }

    /// Reference to a union.
    pub fn is_union(&self) -> bool {
        matches!(self.kind(), TypeKind::Union(_))
    }

    /// Interface or union reference.
    pub fn is_abstract(&self) -> bool {
        self.is_interface() || self.is_union()
    }

    /// Stored directly as a property value.
    pub fn is_primitive(&self) -> bool {
        self.is_scalar() || self.is_enum() || self.is_temporal() || self.is_spatial()
    }

    /// Text-like: strings and identifiers.
    pub fn is_textual(&self) -> bool {
        self.is_string() || self.is_id()
    }

    /// Computed by an attached Cypher statement.
    pub fn is_cypher(&self) -> bool {
        self.annotations.cypher.is_some()
    }

    /// Resolved outside the database.
    pub fn is_custom_resolvable(&self) -> bool {
        self.annotations.custom_resolver.is_some()
    }

    /// Unique or relay global identifier.
    pub fn is_unique(&self) -> bool {
        self.annotations.unique || self.annotations.relay_id
    }

    /// May be compared by value in `where`.
    pub fn is_filterable(&self) -> bool {
        self.annotations
            .filterable
            .as_ref()
            .map_or(true, |f| f.by_value)
            && !self.is_custom_resolvable()
    }

    /// Selectable inside aggregations.
    pub fn is_aggregable(&self) -> bool {
        self.annotations
            .selectable
            .as_ref()
            .map_or(true, |s| s.on_aggregate)
            && !self.is_custom_resolvable()
            && !self.is_cypher()
    }

    /// May be compared inside aggregate filters.
    pub fn is_aggregation_filterable(&self) -> bool {
        self.annotations
            .filterable
            .as_ref()
            .map_or(true, |f| f.by_aggregate)
            && !self.is_cypher()
            && !self.is_custom_resolvable()
    }

    /// Selectable on reads.
    pub fn is_readable(&self) -> bool {
        self.annotations
            .selectable
            .as_ref()
            .map_or(true, |s| s.on_read)
    }

    /// Single-valued primitive that is not computed outside the database.
    pub fn is_sortable(&self) -> bool {
        self.annotations.sortable.unwrap_or(true)
            && !self.is_list()
            && (self.is_scalar() || self.is_enum() || self.is_temporal())
            && !self.is_custom_resolvable()
            && !self.is_cypher()
    }

    /// May appear as a value filter key.
    pub fn is_where_field(&self) -> bool {
        self.is_primitive() && self.is_filterable() && !self.is_cypher()
    }

    /// Can carry a uniqueness constraint.
    pub fn is_constrainable(&self) -> bool {
        self.is_primitive() && !self.is_list() && !self.is_cypher()
    }

    /// Supports `_LT` / `_GT` style comparisons.
    pub fn is_numerical_or_temporal(&self) -> bool {
        self.is_numeric() || self.is_temporal()
    }

    /// Value comes from the request rather than the database or a callback.
    pub fn is_non_generated(&self) -> bool {
        let generated_id = self
            .annotations
            .id
            .as_ref()
            .map_or(false, |id| id.autogenerate);
        !self.is_cypher()
            && !self.is_custom_resolvable()
            && !generated_id
            && !self.annotations.populated_by
            && self.annotations.timestamp.is_none()
    }

    /// Settable on create.
    pub fn is_part_of_create_input(&self) -> bool {
        self.is_primitive()
            && self.is_non_generated()
            && self
                .annotations
                .settable
                .as_ref()
                .map_or(true, |s| s.on_create)
    }

    /// Settable on update.
    pub fn is_part_of_update_input(&self) -> bool {
        self.is_primitive()
            && self.is_non_generated()
            && self
                .annotations
                .settable
                .as_ref()
                .map_or(true, |s| s.on_update)
    }

    /// Appears as a key of the `where` input.
    pub fn is_part_of_where_input(&self) -> bool {
        self.is_where_field()
    }

    /// Supports `_PUSH` / `_POP` on update.
    pub fn is_array_method_field(&self) -> bool {
        self.is_list() && self.is_part_of_update_input()
    }

    /// Exposed under aggregation selections.
    pub fn is_aggregable_field(&self) -> bool {
        !self.is_list()
            && (self.is_numeric() || self.is_textual() || self.is_temporal())
            && self.is_aggregable()
    }

    /// Exposed under aggregation filters.
    pub fn is_aggregation_where_field(&self) -> bool {
        !self.is_list()
            && (self.is_numeric() || self.is_textual() || self.is_temporal())
            && self.is_aggregation_filterable()
    }
}
