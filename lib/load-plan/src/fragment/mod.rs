use std::{fmt::Debug, sync::Arc};

use crate::metadata::{AttributeDefinition, CompositeType, EntityPersister};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FragmentResolutionError {
    #[error("Attribute '{attribute}' is not part of '{owner}'")]
    UnknownAttribute { owner: String, attribute: String },
    #[error("Expected {expected} column fragments for '{owner}', got {found}")]
    ColumnSpanMismatch {
        owner: String,
        expected: usize,
        found: usize,
    },
}

/// Computes the column expressions used to read an attribute out of a result row.
pub trait SqlSelectFragmentResolver: Debug + Send + Sync {
    fn to_sql_select_fragments(
        &self,
        alias: &str,
        attribute: &AttributeDefinition,
    ) -> Result<Vec<String>, FragmentResolutionError>;
}

/// Yields every fragment of a single, already chosen attribute.
pub trait BaseSqlSelectFragmentResolver: Debug + Send + Sync {
    fn to_sql_select_fragments(&self, alias: &str) -> Result<Vec<String>, FragmentResolutionError>;
}

pub fn qualify(alias: &str, column: &str) -> String {
    format!("{alias}.{column}")
}

#[derive(Debug)]
pub struct EntityPersisterFragmentResolver {
    persister: Arc<EntityPersister>,
}

impl EntityPersisterFragmentResolver {
    pub fn new(persister: Arc<EntityPersister>) -> Self {
        EntityPersisterFragmentResolver { persister }
    }
}

impl SqlSelectFragmentResolver for EntityPersisterFragmentResolver {
    fn to_sql_select_fragments(
        &self,
        alias: &str,
        attribute: &AttributeDefinition,
    ) -> Result<Vec<String>, FragmentResolutionError> {
        let known = self
            .persister
            .find_attribute(&attribute.name)
            .is_some_and(|definition| definition == attribute);

        if !known {
            return Err(FragmentResolutionError::UnknownAttribute {
                owner: self.persister.entity_name.clone(),
                attribute: attribute.name.clone(),
            });
        }

        Ok(attribute
            .attribute_type
            .columns()
            .into_iter()
            .map(|column| qualify(alias, column))
            .collect())
    }
}

/// Base fragments of a composite: the owner's fragments for the composite attribute.
#[derive(Debug)]
pub struct OwnerAttributeFragments {
    owner_resolver: Arc<dyn SqlSelectFragmentResolver>,
    attribute: AttributeDefinition,
}

impl OwnerAttributeFragments {
    pub fn new(
        owner_resolver: Arc<dyn SqlSelectFragmentResolver>,
        attribute: AttributeDefinition,
    ) -> Self {
        OwnerAttributeFragments {
            owner_resolver,
            attribute,
        }
    }
}

impl BaseSqlSelectFragmentResolver for OwnerAttributeFragments {
    fn to_sql_select_fragments(&self, alias: &str) -> Result<Vec<String>, FragmentResolutionError> {
        self.owner_resolver
            .to_sql_select_fragments(alias, &self.attribute)
    }
}

/// Resolves sub-attributes of a composite by slicing the composite's base fragments.
///
/// Nested composites compose: the base of an inner composite is the outer composite's
/// resolver applied to the inner attribute.
#[derive(Debug)]
pub struct CompositeBasedSqlSelectFragmentResolver {
    composite_type: CompositeType,
    base: Box<dyn BaseSqlSelectFragmentResolver>,
}

impl CompositeBasedSqlSelectFragmentResolver {
    pub fn new(
        composite_type: CompositeType,
        base: impl BaseSqlSelectFragmentResolver + 'static,
    ) -> Self {
        CompositeBasedSqlSelectFragmentResolver {
            composite_type,
            base: Box::new(base),
        }
    }

    pub fn composite_type(&self) -> &CompositeType {
        &self.composite_type
    }

    /// Every fragment of the composite, in sub-attribute declaration order.
    pub fn all_fragments(&self, alias: &str) -> Result<Vec<String>, FragmentResolutionError> {
        let fragments = self.base.to_sql_select_fragments(alias)?;
        let expected: usize = self
            .composite_type
            .attributes
            .iter()
            .map(|attribute| attribute.attribute_type.column_span())
            .sum();

        if fragments.len() != expected {
            return Err(FragmentResolutionError::ColumnSpanMismatch {
                owner: self.composite_type.name.clone(),
                expected,
                found: fragments.len(),
            });
        }

        Ok(fragments)
    }
}

impl SqlSelectFragmentResolver for CompositeBasedSqlSelectFragmentResolver {
    fn to_sql_select_fragments(
        &self,
        alias: &str,
        attribute: &AttributeDefinition,
    ) -> Result<Vec<String>, FragmentResolutionError> {
        let fragments = self.all_fragments(alias)?;
        let mut offset = 0;

        for sub_attribute in &self.composite_type.attributes {
            let span = sub_attribute.attribute_type.column_span();
            if sub_attribute == attribute {
                return Ok(fragments[offset..offset + span].to_vec());
            }
            offset += span;
        }

        Err(FragmentResolutionError::UnknownAttribute {
            owner: self.composite_type.name.clone(),
            attribute: attribute.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{AttributeDefinition, AttributeType, SqlType},
        strategy::FetchStrategy,
    };

    fn person() -> Arc<EntityPersister> {
        Arc::new(EntityPersister::new(
            "Person",
            AttributeDefinition::basic("id", "id", SqlType::Int),
            vec![
                AttributeDefinition::basic("name", "name", SqlType::Text),
                AttributeDefinition::composite(
                    "addr",
                    "Address",
                    vec![
                        AttributeDefinition::basic("street", "street", SqlType::Text),
                        AttributeDefinition::basic("city", "city", SqlType::Text),
                    ],
                ),
                AttributeDefinition::composite(
                    "billing",
                    "Billing",
                    vec![
                        AttributeDefinition::basic("iban", "iban", SqlType::Text),
                        AttributeDefinition::composite(
                            "postal",
                            "Postal",
                            vec![
                                AttributeDefinition::basic("zip", "billing_zip", SqlType::Text),
                                AttributeDefinition::entity(
                                    "country",
                                    "Country",
                                    &["billing_country_id"],
                                    FetchStrategy::IMMEDIATE_JOIN,
                                ),
                            ],
                        ),
                    ],
                ),
            ],
        ))
    }

    fn composite_type_of(attribute: &AttributeDefinition) -> CompositeType {
        match &attribute.attribute_type {
            AttributeType::Composite(composite) => composite.clone(),
            other => panic!("expected a composite, got {}", other.kind_name()),
        }
    }

    fn composite_resolver(
        owner: Arc<dyn SqlSelectFragmentResolver>,
        attribute: &AttributeDefinition,
    ) -> CompositeBasedSqlSelectFragmentResolver {
        CompositeBasedSqlSelectFragmentResolver::new(
            composite_type_of(attribute),
            OwnerAttributeFragments::new(owner, attribute.clone()),
        )
    }

    #[test]
    fn composite_fragments_match_owner_composition() {
        let persister = person();
        let addr = persister.find_attribute("addr").expect("addr").clone();
        let owner: Arc<dyn SqlSelectFragmentResolver> =
            Arc::new(EntityPersisterFragmentResolver::new(persister));
        let resolver = composite_resolver(owner.clone(), &addr);

        let composed: Vec<String> = composite_type_of(&addr)
            .attributes
            .iter()
            .flat_map(|sub_attribute| {
                resolver
                    .to_sql_select_fragments("p1", sub_attribute)
                    .expect("sub attribute fragments")
            })
            .collect();

        assert_eq!(composed, vec!["p1.street", "p1.city"]);
        assert_eq!(
            composed,
            owner
                .to_sql_select_fragments("p1", &addr)
                .expect("owner fragments")
        );
    }

    #[test]
    fn nested_composites_compose_through_their_owner() {
        let persister = person();
        let billing = persister.find_attribute("billing").expect("billing").clone();
        let owner: Arc<dyn SqlSelectFragmentResolver> =
            Arc::new(EntityPersisterFragmentResolver::new(persister));
        let billing_resolver: Arc<dyn SqlSelectFragmentResolver> =
            Arc::new(composite_resolver(owner, &billing));
        let postal = composite_type_of(&billing)
            .find_attribute("postal")
            .expect("postal")
            .clone();
        let postal_resolver = composite_resolver(billing_resolver, &postal);
        let country = composite_type_of(&postal)
            .find_attribute("country")
            .expect("country")
            .clone();

        assert_eq!(
            postal_resolver
                .to_sql_select_fragments("x7", &country)
                .expect("country fragments"),
            vec!["x7.billing_country_id"]
        );
        assert_eq!(
            postal_resolver.all_fragments("x7").expect("postal fragments"),
            vec!["x7.billing_zip", "x7.billing_country_id"]
        );
    }

    #[test]
    fn unknown_attributes_are_reported() {
        let persister = person();
        let addr = persister.find_attribute("addr").expect("addr").clone();
        let owner: Arc<dyn SqlSelectFragmentResolver> =
            Arc::new(EntityPersisterFragmentResolver::new(persister));
        let resolver = composite_resolver(owner.clone(), &addr);
        let stranger = AttributeDefinition::basic("zip", "zip", SqlType::Text);

        assert_eq!(
            resolver.to_sql_select_fragments("p1", &stranger),
            Err(FragmentResolutionError::UnknownAttribute {
                owner: "Address".to_string(),
                attribute: "zip".to_string(),
            })
        );
        assert!(owner.to_sql_select_fragments("p1", &stranger).is_err());
    }
}
