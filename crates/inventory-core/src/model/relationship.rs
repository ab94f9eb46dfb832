use serde::{Deserialize, Serialize};
use std::fmt;

use super::path::CanonicalPath;
use super::properties::Properties;

/// Direction of a relationship relative to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
            Direction::Both => Direction::Both,
        }
    }
}

/// Relationship names with built-in semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnown {
    Contains,
    IsParentOf,
    Defines,
    Incorporates,
    HasData,
}

impl WellKnown {
    pub const ALL: [WellKnown; 5] = [
        WellKnown::Contains,
        WellKnown::IsParentOf,
        WellKnown::Defines,
        WellKnown::Incorporates,
        WellKnown::HasData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WellKnown::Contains => "contains",
            WellKnown::IsParentOf => "isParentOf",
            WellKnown::Defines => "defines",
            WellKnown::Incorporates => "incorporates",
            WellKnown::HasData => "hasData",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|w| w.as_str() == name)
    }

    /// Whether relationships of this name are ever surfaced in notifications
    pub fn is_api_representable(&self) -> bool {
        !matches!(self, WellKnown::HasData)
    }
}

impl fmt::Display for WellKnown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed, named edge between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Surrogate id assigned by the backend
    pub id: String,
    pub name: String,
    pub source: CanonicalPath,
    pub target: CanonicalPath,
    pub properties: Properties,
}

impl Relationship {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        source: CanonicalPath,
        target: CanonicalPath,
        properties: Properties,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source,
            target,
            properties,
        }
    }

    pub fn well_known(&self) -> Option<WellKnown> {
        WellKnown::from_name(&self.name)
    }

    pub fn is_api_representable(&self) -> bool {
        self.well_known()
            .map(|w| w.is_api_representable())
            .unwrap_or(true)
    }

    /// Whether `path` is one of the endpoints
    pub fn touches(&self, path: &CanonicalPath) -> bool {
        &self.source == path || &self.target == path
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.source, self.name, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_names_roundtrip() {
        for w in WellKnown::ALL {
            assert_eq!(WellKnown::from_name(w.as_str()), Some(w));
        }
        assert_eq!(WellKnown::from_name("dependsOn"), None);
    }

    #[test]
    fn test_has_data_is_not_representable() {
        let owner = CanonicalPath::parse("/t;a/e;e/r;r").unwrap();
        let data = owner.extend(crate::model::EntityKind::StructuredData, "cfg").unwrap();
        let rel = Relationship::new("1", "hasData", owner.clone(), data, Properties::new());
        assert!(!rel.is_api_representable());
        let custom = Relationship::new("2", "dependsOn", owner.clone(), owner, Properties::new());
        assert!(custom.is_api_representable());
    }
}
