use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    error::LoadPlanError,
    value::{EntityKey, Value},
};

/// Identity of a materialized entity within one processing context. Two handles are equal
/// exactly when they point at the same instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityHandle(usize);

impl EntityHandle {
    pub(crate) fn new(index: usize) -> Self {
        EntityHandle(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

pub type AttributeState = IndexMap<String, AttributeValue>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Null,
    Scalar(Value),
    Composite(AttributeState),
    Entity(EntityHandle),
    /// A to-one association that was not joined; only its key is known.
    Reference(EntityKey),
    Collection(Vec<EntityHandle>),
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => AttributeValue::Null,
            other => AttributeValue::Scalar(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityInstance {
    key: EntityKey,
    state: AttributeState,
}

impl EntityInstance {
    pub fn new(key: EntityKey, state: AttributeState) -> Self {
        EntityInstance { key, state }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn state(&self) -> &AttributeState {
        &self.state
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.state.get(name)
    }

    /// Looks an attribute up through embedded composites, `["address", "country"]`.
    pub fn attribute_at(&self, path: &[String]) -> Option<&AttributeValue> {
        let (last, parents) = path.split_last()?;
        let mut state = &self.state;

        for segment in parents {
            match state.get(segment)? {
                AttributeValue::Composite(inner) => state = inner,
                _ => return None,
            }
        }

        state.get(last)
    }

    pub fn set_attribute(
        &mut self,
        path: &[String],
        value: AttributeValue,
    ) -> Result<(), LoadPlanError> {
        // an absent value stays absent inside a composite that hydrated as null
        if value == AttributeValue::Null && self.is_under_null_composite(path) {
            return Ok(());
        }

        let slot = self.slot_mut(path)?;
        *slot = value;

        Ok(())
    }

    /// Makes sure a joined collection is present, even when the current row has no element.
    /// Inside a composite that hydrated as null the collection is left out.
    pub fn init_collection(&mut self, path: &[String]) -> Result<(), LoadPlanError> {
        if self.is_under_null_composite(path) {
            return Ok(());
        }

        let slot = self.slot_mut(path)?;
        if !matches!(slot, AttributeValue::Collection(_)) {
            *slot = AttributeValue::Collection(Vec::new());
        }

        Ok(())
    }

    pub fn add_collection_element(
        &mut self,
        path: &[String],
        element: EntityHandle,
    ) -> Result<(), LoadPlanError> {
        let slot = self.slot_mut(path)?;

        match slot {
            AttributeValue::Collection(elements) => {
                if !elements.contains(&element) {
                    elements.push(element);
                }
            }
            other => *other = AttributeValue::Collection(vec![element]),
        }

        Ok(())
    }

    /// Whether some composite along `path` is null or was never hydrated.
    fn is_under_null_composite(&self, path: &[String]) -> bool {
        let Some((_, parents)) = path.split_last() else {
            return false;
        };
        let mut state = &self.state;

        for segment in parents {
            match state.get(segment) {
                Some(AttributeValue::Composite(inner)) => state = inner,
                Some(AttributeValue::Null) | None => return true,
                Some(_) => return false,
            }
        }

        false
    }

    fn slot_mut(&mut self, path: &[String]) -> Result<&mut AttributeValue, LoadPlanError> {
        let Some((last, parents)) = path.split_last() else {
            return Err(LoadPlanError::InvariantViolation(format!(
                "empty attribute path on {}",
                self.key
            )));
        };
        let mut state = &mut self.state;

        for segment in parents {
            let entry = state
                .entry(segment.clone())
                .or_insert(AttributeValue::Null);

            // a null composite is materialized by the first non-null write below it
            if matches!(entry, AttributeValue::Null) {
                *entry = AttributeValue::Composite(AttributeState::new());
            }

            state = match entry {
                AttributeValue::Composite(inner) => inner,
                _ => {
                    return Err(LoadPlanError::InvariantViolation(format!(
                        "attribute '{}' of {} is not a composite",
                        segment, self.key
                    )))
                }
            };
        }

        Ok(state.entry(last.clone()).or_insert(AttributeValue::Null))
    }
}
