//! The slice of the persistence metadata model the load plan consumes.
//!
//! Entity persisters describe how an entity maps onto columns: its identifier, its basic
//! and composite attributes, and its associations. The load plan only reads this model;
//! [`MetadataRegistry`] is the in-memory provider used by the builder, the dev-cli and tests.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::LoadPlanError,
    strategy::{FetchStrategy, FetchStyle, FetchTiming},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    Bool,
    Int,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeType {
    Basic(BasicType),
    Composite(CompositeType),
    Entity(EntityAssociationType),
    Collection(CollectionType),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicType {
    pub column: String,
    pub sql_type: SqlType,
}

/// An embedded value type. Its sub-attributes are stored in the owning entity's table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeType {
    pub name: String,
    pub attributes: Vec<AttributeDefinition>,
}

/// A to-one association, stored as foreign key columns in the owning table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAssociationType {
    pub entity_name: String,
    pub join_columns: Vec<String>,
    #[serde(default = "default_to_one_fetch")]
    pub fetch: FetchStrategy,
}

/// A to-many association, stored as key columns in the element table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionType {
    pub element_entity: String,
    pub key_columns: Vec<String>,
    #[serde(default = "default_to_many_fetch")]
    pub fetch: FetchStrategy,
}

fn default_to_one_fetch() -> FetchStrategy {
    FetchStrategy::IMMEDIATE_JOIN
}

fn default_to_many_fetch() -> FetchStrategy {
    FetchStrategy::new(FetchTiming::Lazy, FetchStyle::Select)
}

impl AttributeDefinition {
    pub fn basic(name: &str, column: &str, sql_type: SqlType) -> Self {
        AttributeDefinition {
            name: name.to_string(),
            attribute_type: AttributeType::Basic(BasicType {
                column: column.to_string(),
                sql_type,
            }),
        }
    }

    pub fn composite(name: &str, type_name: &str, attributes: Vec<AttributeDefinition>) -> Self {
        AttributeDefinition {
            name: name.to_string(),
            attribute_type: AttributeType::Composite(CompositeType {
                name: type_name.to_string(),
                attributes,
            }),
        }
    }

    pub fn entity(
        name: &str,
        entity_name: &str,
        join_columns: &[&str],
        fetch: FetchStrategy,
    ) -> Self {
        AttributeDefinition {
            name: name.to_string(),
            attribute_type: AttributeType::Entity(EntityAssociationType {
                entity_name: entity_name.to_string(),
                join_columns: join_columns.iter().map(|c| c.to_string()).collect(),
                fetch,
            }),
        }
    }

    pub fn collection(
        name: &str,
        element_entity: &str,
        key_columns: &[&str],
        fetch: FetchStrategy,
    ) -> Self {
        AttributeDefinition {
            name: name.to_string(),
            attribute_type: AttributeType::Collection(CollectionType {
                element_entity: element_entity.to_string(),
                key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
                fetch,
            }),
        }
    }
}

impl AttributeType {
    /// Columns this attribute occupies in its owner's table, in declaration order.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            AttributeType::Basic(basic) => vec![basic.column.as_str()],
            AttributeType::Composite(composite) => composite
                .attributes
                .iter()
                .flat_map(|attribute| attribute.attribute_type.columns())
                .collect(),
            AttributeType::Entity(association) => {
                association.join_columns.iter().map(String::as_str).collect()
            }
            // the key columns live in the element table
            AttributeType::Collection(_) => Vec::new(),
        }
    }

    pub fn column_span(&self) -> usize {
        match self {
            AttributeType::Basic(_) => 1,
            AttributeType::Composite(composite) => composite
                .attributes
                .iter()
                .map(|attribute| attribute.attribute_type.column_span())
                .sum(),
            AttributeType::Entity(association) => association.join_columns.len(),
            AttributeType::Collection(_) => 0,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            AttributeType::Basic(_) => "basic",
            AttributeType::Composite(_) => "composite",
            AttributeType::Entity(_) => "entity",
            AttributeType::Collection(_) => "collection",
        }
    }
}

impl CompositeType {
    pub fn find_attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPersister {
    pub entity_name: String,
    pub identifier: AttributeDefinition,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
}

impl EntityPersister {
    pub fn new(
        entity_name: &str,
        identifier: AttributeDefinition,
        attributes: Vec<AttributeDefinition>,
    ) -> Self {
        EntityPersister {
            entity_name: entity_name.to_string(),
            identifier,
            attributes,
        }
    }

    /// The unqualified entity name, `Person` for `com.acme.Person`.
    pub fn short_name(&self) -> &str {
        self.entity_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.entity_name)
    }

    pub fn find_attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        if self.identifier.name == name {
            return Some(&self.identifier);
        }

        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    pub fn identifier_type(&self) -> Result<&BasicType, LoadPlanError> {
        match &self.identifier.attribute_type {
            AttributeType::Basic(basic) => Ok(basic),
            _ => Err(LoadPlanError::InvalidIdentifier(self.entity_name.clone())),
        }
    }
}

/// Supplies entity persisters to the load plan. Read-only from the load plan's perspective.
pub trait MetadataProvider: Send + Sync {
    fn entity_persister(&self, entity_name: &str) -> Option<Arc<EntityPersister>>;
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(try_from = "MetadataDocument")]
pub struct MetadataRegistry {
    persisters: FxHashMap<String, Arc<EntityPersister>>,
}

#[derive(Deserialize)]
struct MetadataDocument {
    entities: Vec<EntityPersister>,
}

impl TryFrom<MetadataDocument> for MetadataRegistry {
    type Error = LoadPlanError;

    fn try_from(document: MetadataDocument) -> Result<Self, Self::Error> {
        let mut registry = MetadataRegistry::default();
        for persister in document.entities {
            registry.register(persister)?;
        }

        Ok(registry)
    }
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, persister: EntityPersister) -> Result<(), LoadPlanError> {
        persister.identifier_type()?;
        self.persisters
            .insert(persister.entity_name.clone(), Arc::new(persister));

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.persisters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persisters.is_empty()
    }
}

impl MetadataProvider for MetadataRegistry {
    fn entity_persister(&self, entity_name: &str) -> Option<Arc<EntityPersister>> {
        self.persisters.get(entity_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> AttributeDefinition {
        AttributeDefinition::composite(
            "address",
            "Address",
            vec![
                AttributeDefinition::basic("street", "street", SqlType::Text),
                AttributeDefinition::entity(
                    "country",
                    "Country",
                    &["country_id"],
                    FetchStrategy::IMMEDIATE_JOIN,
                ),
                AttributeDefinition::collection(
                    "visits",
                    "Visit",
                    &["address_id"],
                    FetchStrategy::IMMEDIATE_JOIN,
                ),
            ],
        )
    }

    #[test]
    fn composite_columns_follow_declaration_order() {
        let attribute = address();

        assert_eq!(attribute.attribute_type.columns(), vec!["street", "country_id"]);
        assert_eq!(attribute.attribute_type.column_span(), 2);
    }

    #[test]
    fn registry_rejects_composite_identifiers() {
        let mut registry = MetadataRegistry::new();
        let result = registry.register(EntityPersister::new("Person", address(), vec![]));

        assert!(matches!(result, Err(LoadPlanError::InvalidIdentifier(name)) if name == "Person"));
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_deserializes_from_json() {
        let registry: MetadataRegistry = serde_json::from_str(
            r#"{
              "entities": [
                {
                  "entity_name": "com.acme.Country",
                  "identifier": { "name": "id", "type": { "kind": "basic", "column": "id", "sql_type": "int" } },
                  "attributes": [
                    { "name": "name", "type": { "kind": "basic", "column": "name", "sql_type": "text" } },
                    { "name": "capital", "type": { "kind": "entity", "entity_name": "com.acme.City", "join_columns": ["capital_id"] } }
                  ]
                }
              ]
            }"#,
        )
        .expect("metadata should deserialize");

        let country = registry
            .entity_persister("com.acme.Country")
            .expect("country should be registered");

        assert_eq!(country.short_name(), "Country");
        match &country
            .find_attribute("capital")
            .expect("capital attribute")
            .attribute_type
        {
            AttributeType::Entity(association) => {
                assert_eq!(association.fetch, FetchStrategy::IMMEDIATE_JOIN)
            }
            other => panic!("unexpected attribute type {}", other.kind_name()),
        }
    }
}
