use serde::{Deserialize, Serialize};
use serde_json::json;

use super::path::{CanonicalPath, EntityKind};
use super::properties::Properties;

/// Data type of the values a metric reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricDataType {
    Gauge,
    Availability,
    Counter,
    CounterRate,
    GaugeRate,
    String,
}

/// Kind-specific defining fields of an entity
///
/// Everything in here except type references contributes to the identity
/// hash. Type references live in the `defines` relationship as well and are
/// not structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Definition {
    /// Tenants, environments, feeds, resource types, operation types
    Plain,
    Resource {
        resource_type: CanonicalPath,
    },
    Metric {
        metric_type: CanonicalPath,
        collection_interval: Option<u64>,
    },
    MetricType {
        unit: String,
        data_type: MetricDataType,
        collection_interval: Option<u64>,
    },
    Data {
        value: serde_json::Value,
    },
    MetadataPack {
        members: Vec<CanonicalPath>,
    },
}

impl Definition {
    /// Whether this definition is the right shape for `kind`
    pub fn matches_kind(&self, kind: EntityKind) -> bool {
        match self {
            Definition::Plain => matches!(
                kind,
                EntityKind::Tenant
                    | EntityKind::Environment
                    | EntityKind::Feed
                    | EntityKind::ResourceType
                    | EntityKind::OperationType
            ),
            Definition::Resource { .. } => kind == EntityKind::Resource,
            Definition::Metric { .. } => kind == EntityKind::Metric,
            Definition::MetricType { .. } => kind == EntityKind::MetricType,
            Definition::Data { .. } => kind == EntityKind::StructuredData,
            Definition::MetadataPack { .. } => kind == EntityKind::MetadataPack,
        }
    }

    /// The fields that take part in the identity hash, as canonical JSON
    ///
    /// Type references contribute only their last segment, so equal
    /// structures defined by equally named types hash alike wherever the
    /// types live.
    pub fn hashed_fields(&self) -> serde_json::Value {
        match self {
            Definition::Plain | Definition::MetadataPack { .. } => json!({}),
            Definition::Resource { resource_type } => {
                json!({ "type": resource_type.segment().to_string() })
            }
            Definition::Metric {
                metric_type,
                collection_interval,
            } => json!({
                "type": metric_type.segment().to_string(),
                "collectionInterval": collection_interval,
            }),
            Definition::MetricType {
                unit,
                data_type,
                collection_interval,
            } => json!({
                "unit": unit,
                "dataType": data_type,
                "collectionInterval": collection_interval,
            }),
            Definition::Data { value } => json!({ "value": value }),
        }
    }

    /// Path of the entity that `defines` this one, if any
    pub fn defined_by(&self) -> Option<&CanonicalPath> {
        match self {
            Definition::Resource { resource_type } => Some(resource_type),
            Definition::Metric { metric_type, .. } => Some(metric_type),
            _ => None,
        }
    }
}

/// A node of the inventory graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Canonical path (also the entity's identity)
    pub path: CanonicalPath,

    /// Optional human readable name
    pub name: Option<String>,

    /// User properties
    pub properties: Properties,

    /// Kind-specific defining fields
    pub definition: Definition,

    /// Identity hash, `None` until first computed (and always for non-hashable kinds)
    pub identity_hash: Option<String>,
}

impl Entity {
    /// Create an entity with no name, no properties and no hash yet
    pub fn new(path: CanonicalPath, definition: Definition) -> Self {
        Self {
            path,
            name: None,
            properties: Properties::new(),
            definition,
            identity_hash: None,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.path.kind()
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Copy of this entity carrying `hash`
    pub fn with_identity_hash(mut self, hash: impl Into<String>) -> Self {
        self.identity_hash = Some(hash.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_matches_kind() {
        let rt = CanonicalPath::parse("/t;a/rt;host").unwrap();
        assert!(Definition::Plain.matches_kind(EntityKind::Environment));
        assert!(!Definition::Plain.matches_kind(EntityKind::Resource));
        assert!(Definition::Resource { resource_type: rt }.matches_kind(EntityKind::Resource));
        assert!(Definition::Data { value: json!(1) }.matches_kind(EntityKind::StructuredData));
    }

    #[test]
    fn test_type_location_is_not_hashed() {
        let a = Definition::Resource {
            resource_type: CanonicalPath::parse("/t;a/rt;x").unwrap(),
        };
        let b = Definition::Resource {
            resource_type: CanonicalPath::parse("/t;b/f;feed/rt;x").unwrap(),
        };
        assert_eq!(a.hashed_fields(), b.hashed_fields());
    }

    #[test]
    fn test_type_name_is_hashed() {
        let a = Definition::Resource {
            resource_type: CanonicalPath::parse("/t;a/rt;host").unwrap(),
        };
        let b = Definition::Resource {
            resource_type: CanonicalPath::parse("/t;a/rt;router").unwrap(),
        };
        assert_ne!(a.hashed_fields(), b.hashed_fields());

        let m = |t: &str| Definition::Metric {
            metric_type: CanonicalPath::parse(t).unwrap(),
            collection_interval: None,
        };
        assert_ne!(m("/t;a/mt;cpu").hashed_fields(), m("/t;a/mt;mem").hashed_fields());
    }

    #[test]
    fn test_metric_type_fields_are_hashed() {
        let a = Definition::MetricType {
            unit: "ms".into(),
            data_type: MetricDataType::Gauge,
            collection_interval: Some(60),
        };
        let b = Definition::MetricType {
            unit: "s".into(),
            data_type: MetricDataType::Gauge,
            collection_interval: Some(60),
        };
        assert_ne!(a.hashed_fields(), b.hashed_fields());
    }
}
