use std::fmt::{Display, Formatter as FmtFormatter, Result as FmtResult};

/// Dotted navigation path from the root entity to a node, `Person.address.country`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PropertyPath {
    segments: Vec<String>,
}

impl PropertyPath {
    pub fn root(entity_name: &str) -> Self {
        PropertyPath {
            segments: vec![entity_name.to_string()],
        }
    }

    pub fn append(&self, property: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(property.to_string());

        PropertyPath { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() <= 1
    }
}

impl Display for PropertyPath {
    fn fmt(&self, f: &mut FmtFormatter<'_>) -> FmtResult {
        write!(f, "{}", self.segments.join("."))
    }
}
