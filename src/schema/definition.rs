//! Serializable schema definition and its conversion into a [`SchemaModel`].
//!
//! Definitions are the hand-off format from the external schema-derivation
//! step. Relationship fields are declared like any other field, carrying a
//! `relationship` block; the conversion splits them from primitive
//! attributes and resolves every type reference.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::annotation::{
    AttributeAnnotations, AuthorizationAnnotation, EntityAnnotations, LimitAnnotation,
};
use super::attribute::{Attribute, AttributeType, TypeKind};
use super::entity::{
    CompositeEntity, CompositeKind, ConcreteEntity, Direction, EdgeProperties, Entity,
    Relationship, TargetKind,
};
use super::SchemaModel;
use crate::error::{Result, TranslateError};

/// Root of a schema definition document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct SchemaDefinition {
    /// Declared enum names.
    pub enums: Vec<String>,
    /// Declared user scalar names.
    pub scalars: Vec<String>,
    /// Concrete node types.
    pub nodes: Vec<NodeDefinition>,
    /// Interfaces.
    pub interfaces: Vec<InterfaceDefinition>,
    /// Unions.
    pub unions: Vec<UnionDefinition>,
    /// Relationship-properties types.
    pub relationship_properties: Vec<PropertiesDefinition>,
}

/// A concrete node type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDefinition {
    /// Type name.
    pub name: String,
    /// Node labels; defaults to the type name.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Implemented interfaces.
    #[serde(default)]
    pub implements: Vec<String>,
    /// Fields in declaration order.
    pub fields: Vec<FieldDefinition>,
    /// Type-level authorization.
    #[serde(default)]
    pub authorization: Option<AuthorizationAnnotation>,
    /// Read limits.
    #[serde(default)]
    pub limit: Option<LimitAnnotation>,
}

/// An interface type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceDefinition {
    /// Type name.
    pub name: String,
    /// Shared fields.
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

/// A union type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnionDefinition {
    /// Type name.
    pub name: String,
    /// Member node type names.
    pub members: Vec<String>,
}

/// A relationship-properties type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertiesDefinition {
    /// Type name.
    pub name: String,
    /// Edge fields.
    pub fields: Vec<FieldDefinition>,
}

/// A field declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name.
    pub name: String,
    /// Type reference, e.g. `[Post!]!`.
    #[serde(rename = "type")]
    pub type_ref: String,
    /// Present on relationship fields.
    #[serde(default)]
    pub relationship: Option<RelationshipDefinition>,
    /// Field annotations.
    #[serde(flatten)]
    pub annotations: AttributeAnnotations,
}

/// Relationship block of a field declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipDefinition {
    /// Relationship type label.
    #[serde(rename = "type")]
    pub rel_type: String,
    /// Direction from the declaring type.
    pub direction: Direction,
    /// Relationship-properties type name.
    #[serde(default)]
    pub properties: Option<String>,
}

struct TypeNames {
    kinds: BTreeMap<String, TypeKind>,
}

impl TypeNames {
    fn collect(def: &SchemaDefinition) -> Result<Self> {
        let mut kinds = BTreeMap::new();
        let declared = def
            .enums
            .iter()
            .map(|n| (n, TypeKind::Enum(n.clone())))
            .chain(def.scalars.iter().map(|n| (n, TypeKind::UserScalar(n.clone()))))
            .chain(def.nodes.iter().map(|n| (&n.name, TypeKind::Object(n.name.clone()))))
            .chain(
                def.interfaces
                    .iter()
                    .map(|n| (&n.name, TypeKind::Interface(n.name.clone()))),
            )
            .chain(def.unions.iter().map(|n| (&n.name, TypeKind::Union(n.name.clone()))));
        for (name, kind) in declared {
            if TypeKind::builtin(name).is_some() {
                return Err(TranslateError::schema(format!(
                    "type '{name}' shadows a built-in type"
                )));
            }
            if kinds.insert(name.clone(), kind).is_some() {
                return Err(TranslateError::schema(format!(
                    "type '{name}' is declared more than once"
                )));
            }
        }
        Ok(Self { kinds })
    }

    fn parse(&self, owner: &str, field: &FieldDefinition) -> Result<AttributeType> {
        AttributeType::parse(&field.type_ref, &|name: &str| self.kinds.get(name).cloned())
            .ok_or_else(|| {
                TranslateError::schema(format!(
                    "field '{owner}.{}' has unresolvable type '{}'",
                    field.name, field.type_ref
                ))
            })
    }
}

impl SchemaDefinition {
    /// Resolves the definition into an immutable schema model.
    pub fn into_model(self) -> Result<SchemaModel> {
        let names = TypeNames::collect(&self)?;

        let mut properties = BTreeMap::new();
        for props in &self.relationship_properties {
            let attributes = convert_attributes(&names, &props.name, &props.fields)?;
            properties.insert(
                props.name.clone(),
                EdgeProperties {
                    name: props.name.clone(),
                    attributes,
                },
            );
        }

        let mut entities = Vec::new();
        for node in &self.nodes {
            entities.push(Entity::Concrete(convert_node(&names, &properties, node)?));
        }

        for interface in &self.interfaces {
            let (attributes, relationships) =
                split_fields(&names, &properties, &interface.name, &interface.fields)?;
            let members = self
                .nodes
                .iter()
                .filter(|n| n.implements.contains(&interface.name))
                .map(|n| n.name.clone())
                .collect();
            entities.push(Entity::Composite(CompositeEntity {
                name: interface.name.clone(),
                kind: CompositeKind::Interface,
                members,
                attributes,
                relationships,
            }));
        }

        for union in &self.unions {
            entities.push(Entity::Composite(CompositeEntity {
                name: union.name.clone(),
                kind: CompositeKind::Union,
                members: union.members.clone(),
                attributes: IndexMap::new(),
                relationships: IndexMap::new(),
            }));
        }

        SchemaModel::new(entities)
    }
}

fn convert_node(
    names: &TypeNames,
    properties: &BTreeMap<String, EdgeProperties>,
    node: &NodeDefinition,
) -> Result<ConcreteEntity> {
    let (attributes, relationships) = split_fields(names, properties, &node.name, &node.fields)?;
    let labels = if node.labels.is_empty() {
        vec![node.name.clone()]
    } else {
        node.labels.clone()
    };
    Ok(ConcreteEntity {
        name: node.name.clone(),
        labels,
        attributes,
        relationships,
        implements: node.implements.clone(),
        annotations: EntityAnnotations {
            authorization: node.authorization.clone(),
            limit: node.limit,
        },
    })
}

fn convert_attributes(
    names: &TypeNames,
    owner: &str,
    fields: &[FieldDefinition],
) -> Result<IndexMap<String, Attribute>> {
    let mut attributes = IndexMap::new();
    for field in fields {
        if field.relationship.is_some() {
            return Err(TranslateError::schema(format!(
                "relationship properties '{owner}' cannot declare relationship field '{}'",
                field.name
            )));
        }
        let ty = names.parse(owner, field)?;
        let attribute = Attribute::new(&field.name, ty).with_annotations(field.annotations.clone());
        if attributes.insert(field.name.clone(), attribute).is_some() {
            return Err(duplicate_field(owner, &field.name));
        }
    }
    Ok(attributes)
}

type SplitFields = (IndexMap<String, Attribute>, IndexMap<String, Relationship>);

fn split_fields(
    names: &TypeNames,
    properties: &BTreeMap<String, EdgeProperties>,
    owner: &str,
    fields: &[FieldDefinition],
) -> Result<SplitFields> {
    let mut attributes = IndexMap::new();
    let mut relationships = IndexMap::new();
    let mut seen = BTreeSet::new();
    for field in fields {
        if !seen.insert(field.name.as_str()) {
            return Err(duplicate_field(owner, &field.name));
        }
        let ty = names.parse(owner, field)?;
        let Some(rel) = &field.relationship else {
            let attribute =
                Attribute::new(&field.name, ty).with_annotations(field.annotations.clone());
            attributes.insert(field.name.clone(), attribute);
            continue;
        };
        let (target, target_kind) = match ty.kind() {
            TypeKind::Object(name) => (name.clone(), TargetKind::Concrete),
            TypeKind::Interface(name) => (name.clone(), TargetKind::Interface),
            TypeKind::Union(name) => (name.clone(), TargetKind::Union),
            other => {
                return Err(TranslateError::schema(format!(
                    "relationship '{owner}.{}' must target an entity, found {}",
                    field.name,
                    other.name()
                )))
            }
        };
        let edge = match &rel.properties {
            Some(name) => Some(properties.get(name).cloned().ok_or_else(|| {
                TranslateError::schema(format!(
                    "relationship '{owner}.{}' references unknown properties type '{name}'",
                    field.name
                ))
            })?),
            None => None,
        };
        relationships.insert(
            field.name.clone(),
            Relationship {
                name: field.name.clone(),
                rel_type: rel.rel_type.clone(),
                direction: rel.direction,
                target,
                target_kind,
                list: ty.is_list(),
                required: ty.is_required(),
                properties: edge,
                annotations: field.annotations.clone(),
            },
        );
    }
    Ok((attributes, relationships))
}

fn duplicate_field(owner: &str, field: &str) -> TranslateError {
    TranslateError::schema(format!("field '{owner}.{field}' is declared more than once"))
}
