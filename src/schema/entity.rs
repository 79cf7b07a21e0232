//! Entities and relationships.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::annotation::{AttributeAnnotations, EntityAnnotations};
use super::attribute::Attribute;

/// Traversal direction of a relationship, seen from the declaring entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// `(source)<-[:TYPE]-(target)`.
    In,
    /// `(source)-[:TYPE]->(target)`.
    Out,
}

impl Direction {
    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
        }
    }
}

/// Shape of a relationship target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    /// A concrete entity.
    Concrete,
    /// An interface; every implementation is a candidate.
    Interface,
    /// A union; every member is a candidate.
    Union,
}

/// Attributes stored on the relationship itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeProperties {
    /// Name of the properties type.
    pub name: String,
    /// Edge attributes.
    pub attributes: IndexMap<String, Attribute>,
}

impl EdgeProperties {
    /// Looks up an edge attribute.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }
}

/// Relationship-valued field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Field name.
    pub name: String,
    /// Relationship type label.
    pub rel_type: String,
    /// Direction from the declaring entity.
    pub direction: Direction,
    /// Target entity name.
    pub target: String,
    /// Shape of the target.
    pub target_kind: TargetKind,
    /// Many related nodes.
    pub list: bool,
    /// Non-nullable field.
    pub required: bool,
    /// Edge attributes, if declared.
    pub properties: Option<EdgeProperties>,
    /// Field annotations.
    pub annotations: AttributeAnnotations,
}

impl Relationship {
    /// Creates a nullable to-one relationship to a concrete entity.
    pub fn new(
        name: impl Into<String>,
        rel_type: impl Into<String>,
        direction: Direction,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            rel_type: rel_type.into(),
            direction,
            target: target.into(),
            target_kind: TargetKind::Concrete,
            list: false,
            required: false,
            properties: None,
            annotations: AttributeAnnotations::default(),
        }
    }

    /// Marks the relationship as a list.
    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    /// Marks the relationship as non-nullable.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the target kind.
    pub fn target_kind(mut self, kind: TargetKind) -> Self {
        self.target_kind = kind;
        self
    }

    /// Attaches edge properties.
    pub fn with_properties(mut self, properties: EdgeProperties) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Whether the target resolves to more than one concrete entity kind.
    pub fn is_composite_target(&self) -> bool {
        self.target_kind != TargetKind::Concrete
    }

    /// To-one relationship.
    pub fn is_to_one(&self) -> bool {
        !self.list
    }

    /// Nullable to-one relationship.
    pub fn is_nullable_to_one(&self) -> bool {
        !self.list && !self.required
    }
}

/// Graph-label backed entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConcreteEntity {
    /// Entity name.
    pub name: String,
    /// Node labels; never empty.
    pub labels: Vec<String>,
    /// Primitive and computed attributes in declaration order.
    pub attributes: IndexMap<String, Attribute>,
    /// Relationship fields in declaration order.
    pub relationships: IndexMap<String, Relationship>,
    /// Interfaces implemented by the entity.
    pub implements: Vec<String>,
    /// Entity annotations.
    pub annotations: EntityAnnotations,
}

impl ConcreteEntity {
    /// Creates an entity labelled with its own name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            labels: vec![name.clone()],
            name,
            attributes: IndexMap::new(),
            relationships: IndexMap::new(),
            implements: Vec::new(),
            annotations: EntityAnnotations::default(),
        }
    }

    /// Replaces the label set.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    /// Adds a relationship.
    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships
            .insert(relationship.name.clone(), relationship);
        self
    }

    /// Replaces the annotations.
    pub fn with_annotations(mut self, annotations: EntityAnnotations) -> Self {
        self.annotations = annotations;
        self
    }

    /// Looks up an attribute.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Looks up a relationship.
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    /// Whether the entity declares a field of either kind named `name`.
    pub fn has_field(&self, name: &str) -> bool {
        self.attributes.contains_key(name) || self.relationships.contains_key(name)
    }

    /// Whether the entity's label set is a subset of `labels`.
    pub fn matches_labels(&self, labels: &[String]) -> bool {
        self.labels.iter().all(|label| labels.contains(label))
    }
}

/// Interface or union.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositeKind {
    /// Interface with shared attributes.
    Interface,
    /// Union without shared attributes.
    Union,
}

/// Grouping of concrete entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositeEntity {
    /// Composite name.
    pub name: String,
    /// Interface or union.
    pub kind: CompositeKind,
    /// Concrete members in declaration order.
    pub members: Vec<String>,
    /// Shared attributes (interfaces only).
    pub attributes: IndexMap<String, Attribute>,
    /// Shared relationships (interfaces only).
    pub relationships: IndexMap<String, Relationship>,
}

impl CompositeEntity {
    /// Looks up a shared attribute.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Whether `name` is a member.
    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }
}

/// A queryable type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Entity {
    /// Label-backed entity.
    Concrete(ConcreteEntity),
    /// Interface or union.
    Composite(CompositeEntity),
}

impl Entity {
    /// Entity name.
    pub fn name(&self) -> &str {
        match self {
            Entity::Concrete(e) => &e.name,
            Entity::Composite(e) => &e.name,
        }
    }

    /// The concrete entity, if this is one.
    pub fn as_concrete(&self) -> Option<&ConcreteEntity> {
        match self {
            Entity::Concrete(e) => Some(e),
            Entity::Composite(_) => None,
        }
    }

    /// The composite entity, if this is one.
    pub fn as_composite(&self) -> Option<&CompositeEntity> {
        match self {
            Entity::Concrete(_) => None,
            Entity::Composite(e) => Some(e),
        }
    }
}
