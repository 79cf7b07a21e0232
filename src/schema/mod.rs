#![forbid(unsafe_code)]

//! Immutable schema model consulted during translation.
//!
//! A [`SchemaModel`] is built once per served schema and shared read-only
//! across requests; nothing in translation mutates it.

/// Entity, attribute and relationship annotations.
pub mod annotation;

/// Attribute types and derived capability predicates.
pub mod attribute;

/// Serializable schema definitions.
pub mod definition;

/// Concrete and composite entities, relationships.
pub mod entity;

use indexmap::IndexMap;

pub use annotation::{
    AttributeAnnotations, AuthOperation, AuthorizationAnnotation, AuthorizationRule,
    EntityAnnotations, LimitAnnotation, ValidationWhen,
};
pub use attribute::{Attribute, AttributeType, ScalarKind, SpatialKind, TemporalKind, TypeKind};
pub use definition::SchemaDefinition;
pub use entity::{
    CompositeEntity, CompositeKind, ConcreteEntity, Direction, EdgeProperties, Entity,
    Relationship, TargetKind,
};

use crate::error::{Result, TranslateError};

/// Read-only collection of entities keyed by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaModel {
    entities: IndexMap<String, Entity>,
}

impl SchemaModel {
    /// Builds a model, validating cross-entity invariants.
    pub fn new(entities: Vec<Entity>) -> Result<Self> {
        let mut map = IndexMap::new();
        for entity in entities {
            let name = entity.name().to_owned();
            if map.insert(name.clone(), entity).is_some() {
                return Err(TranslateError::schema(format!(
                    "entity '{name}' is declared more than once"
                )));
            }
        }
        let model = Self { entities: map };
        model.validate()?;
        Ok(model)
    }

    /// Resolves a deserialized definition into a validated model.
    pub fn from_definition(def: SchemaDefinition) -> Result<Self> {
        def.into_model()
    }

    /// Parses and resolves a JSON schema definition.
    pub fn from_json(raw: &str) -> Result<Self> {
        let def: SchemaDefinition = serde_json::from_str(raw)
            .map_err(|err| TranslateError::schema(format!("invalid schema definition: {err}")))?;
        Self::from_definition(def)
    }

    /// Parses and resolves a TOML schema definition.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let def: SchemaDefinition = toml::from_str(raw)
            .map_err(|err| TranslateError::schema(format!("invalid schema definition: {err}")))?;
        Self::from_definition(def)
    }

    fn validate(&self) -> Result<()> {
        for entity in self.entities.values() {
            match entity {
                Entity::Concrete(concrete) => {
                    if concrete.labels.is_empty() {
                        return Err(TranslateError::schema(format!(
                            "entity '{}' has no labels",
                            concrete.name
                        )));
                    }
                    for name in concrete.relationships.keys() {
                        if concrete.attributes.contains_key(name) {
                            return Err(TranslateError::schema(format!(
                                "field '{}.{name}' is declared more than once",
                                concrete.name
                            )));
                        }
                    }
                    for rel in concrete.relationships.values() {
                        self.check_target(&concrete.name, rel)?;
                    }
                    for interface in &concrete.implements {
                        match self.composite_entity(interface) {
                            Some(c) if c.kind == CompositeKind::Interface => {}
                            _ => {
                                return Err(TranslateError::schema(format!(
                                    "entity '{}' implements unknown interface '{interface}'",
                                    concrete.name
                                )))
                            }
                        }
                    }
                }
                Entity::Composite(composite) => {
                    for member in &composite.members {
                        if self.concrete_entity(member).is_none() {
                            return Err(TranslateError::schema(format!(
                                "'{}' member '{member}' is not a concrete entity",
                                composite.name
                            )));
                        }
                    }
                    for rel in composite.relationships.values() {
                        self.check_target(&composite.name, rel)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_target(&self, owner: &str, rel: &Relationship) -> Result<()> {
        let ok = match (rel.target_kind, self.entities.get(&rel.target)) {
            (TargetKind::Concrete, Some(Entity::Concrete(_))) => true,
            (TargetKind::Interface, Some(Entity::Composite(c))) => {
                c.kind == CompositeKind::Interface
            }
            (TargetKind::Union, Some(Entity::Composite(c))) => c.kind == CompositeKind::Union,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(TranslateError::schema(format!(
                "relationship '{owner}.{}' targets unknown entity '{}'",
                rel.name, rel.target
            )))
        }
    }

    /// Looks up any entity by name.
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Looks up a concrete entity by name.
    pub fn concrete_entity(&self, name: &str) -> Option<&ConcreteEntity> {
        self.entity(name).and_then(Entity::as_concrete)
    }

    /// Looks up an interface or union by name.
    pub fn composite_entity(&self, name: &str) -> Option<&CompositeEntity> {
        self.entity(name).and_then(Entity::as_composite)
    }

    /// All entities in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Concrete entities whose full label set is contained in `labels`.
    pub fn entities_by_labels(&self, labels: &[String]) -> Vec<&ConcreteEntity> {
        self.entities
            .values()
            .filter_map(Entity::as_concrete)
            .filter(|e| e.matches_labels(labels))
            .collect()
    }

    /// Concrete entities named `name` whose label set is contained in `labels`.
    pub fn entities_by_name_and_labels(&self, name: &str, labels: &[String]) -> Vec<&ConcreteEntity> {
        self.entities_by_labels(labels)
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }

    /// Concrete members behind an entity name, in declaration order.
    pub fn concrete_members(&self, name: &str) -> Vec<&ConcreteEntity> {
        match self.entity(name) {
            Some(Entity::Concrete(e)) => vec![e],
            Some(Entity::Composite(c)) => c
                .members
                .iter()
                .filter_map(|m| self.concrete_entity(m))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Concrete entities a relationship can reach.
    pub fn concrete_targets(&self, rel: &Relationship) -> Vec<&ConcreteEntity> {
        self.concrete_members(&rel.target)
    }

    /// The field on `related` that walks the same relationship type back to
    /// `origin`.
    pub fn inverse_relationship<'a>(
        &'a self,
        origin: &ConcreteEntity,
        rel: &Relationship,
        related: &'a ConcreteEntity,
    ) -> Option<&'a Relationship> {
        related.relationships.values().find(|candidate| {
            candidate.rel_type == rel.rel_type
                && candidate.direction == rel.direction.reversed()
                && self
                    .concrete_targets(candidate)
                    .iter()
                    .any(|target| target.name == origin.name)
        })
    }
}
