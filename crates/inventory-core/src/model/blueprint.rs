//! Blueprints (what to create) and update objects (what to change)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::entity::{Definition, Entity, MetricDataType};
use super::path::{CanonicalPath, EntityKind, PathRef};
use super::properties::Properties;
use crate::errors::{InventoryError, Result};

/// Kind-specific part of a blueprint
///
/// Type and member references are kept as text (canonical or relative) and
/// resolved against the parent path when the entity is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BlueprintDefinition {
    Plain,
    Resource {
        resource_type: String,
    },
    Metric {
        metric_type: String,
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
        members: Vec<String>,
    },
}

/// Description of an entity to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub kind: EntityKind,
    pub id: String,
    pub name: Option<String>,
    pub properties: Properties,
    pub definition: BlueprintDefinition,
    /// Custom relationships from the new entity: name -> targets
    pub outgoing: BTreeMap<String, Vec<String>>,
    /// Custom relationships to the new entity: name -> sources
    pub incoming: BTreeMap<String, Vec<String>>,
}

impl Blueprint {
    fn new(kind: EntityKind, id: impl Into<String>, definition: BlueprintDefinition) -> Self {
        Self {
            kind,
            id: id.into(),
            name: None,
            properties: Properties::new(),
            definition,
            outgoing: BTreeMap::new(),
            incoming: BTreeMap::new(),
        }
    }

    pub fn tenant(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Tenant, id, BlueprintDefinition::Plain)
    }

    pub fn environment(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Environment, id, BlueprintDefinition::Plain)
    }

    pub fn feed(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Feed, id, BlueprintDefinition::Plain)
    }

    pub fn resource_type(id: impl Into<String>) -> Self {
        Self::new(EntityKind::ResourceType, id, BlueprintDefinition::Plain)
    }

    pub fn operation_type(id: impl Into<String>) -> Self {
        Self::new(EntityKind::OperationType, id, BlueprintDefinition::Plain)
    }

    pub fn resource(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self::new(
            EntityKind::Resource,
            id,
            BlueprintDefinition::Resource {
                resource_type: resource_type.into(),
            },
        )
    }

    pub fn metric(id: impl Into<String>, metric_type: impl Into<String>) -> Self {
        Self::new(
            EntityKind::Metric,
            id,
            BlueprintDefinition::Metric {
                metric_type: metric_type.into(),
                collection_interval: None,
            },
        )
    }

    pub fn metric_type(
        id: impl Into<String>,
        unit: impl Into<String>,
        data_type: MetricDataType,
    ) -> Self {
        Self::new(
            EntityKind::MetricType,
            id,
            BlueprintDefinition::MetricType {
                unit: unit.into(),
                data_type,
                collection_interval: None,
            },
        )
    }

    pub fn data(role: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(
            EntityKind::StructuredData,
            role,
            BlueprintDefinition::Data { value },
        )
    }

    pub fn metadata_pack(id: impl Into<String>, members: Vec<String>) -> Self {
        Self::new(
            EntityKind::MetadataPack,
            id,
            BlueprintDefinition::MetadataPack { members },
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.set(key, value);
        self
    }

    /// Set the collection interval of a metric or metric type blueprint
    pub fn with_collection_interval(mut self, interval: u64) -> Self {
        match &mut self.definition {
            BlueprintDefinition::Metric {
                collection_interval,
                ..
            }
            | BlueprintDefinition::MetricType {
                collection_interval,
                ..
            } => *collection_interval = Some(interval),
            _ => {}
        }
        self
    }

    /// Declare a custom relationship from the new entity to `target`
    pub fn with_outgoing(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.outgoing
            .entry(name.into())
            .or_default()
            .push(target.into());
        self
    }

    /// Declare a custom relationship from `source` to the new entity
    pub fn with_incoming(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.incoming
            .entry(name.into())
            .or_default()
            .push(source.into());
        self
    }

    /// Resolve references against `parent` and produce the entity's definition
    ///
    /// # Errors
    ///
    /// * `InvalidBlueprint` - If the definition does not fit the kind
    /// * `InvalidPath` / `IllegalContainment` - If a reference cannot be resolved
    pub fn resolve_definition(&self, parent: Option<&CanonicalPath>) -> Result<Definition> {
        let resolve = |text: &str| -> Result<CanonicalPath> {
            let reference = PathRef::parse(text)?;
            match (parent, &reference) {
                (_, PathRef::Canonical(path)) => Ok(path.clone()),
                (Some(base), _) => base.resolve(&reference),
                (None, _) => Err(InventoryError::InvalidPath {
                    path: text.to_string(),
                    reason: "relative reference without a parent to resolve against".to_string(),
                }),
            }
        };

        let definition = match &self.definition {
            BlueprintDefinition::Plain => Definition::Plain,
            BlueprintDefinition::Resource { resource_type } => Definition::Resource {
                resource_type: resolve(resource_type)?,
            },
            BlueprintDefinition::Metric {
                metric_type,
                collection_interval,
            } => Definition::Metric {
                metric_type: resolve(metric_type)?,
                collection_interval: *collection_interval,
            },
            BlueprintDefinition::MetricType {
                unit,
                data_type,
                collection_interval,
            } => Definition::MetricType {
                unit: unit.clone(),
                data_type: *data_type,
                collection_interval: *collection_interval,
            },
            BlueprintDefinition::Data { value } => Definition::Data {
                value: value.clone(),
            },
            BlueprintDefinition::MetadataPack { members } => Definition::MetadataPack {
                members: members
                    .iter()
                    .map(|m| resolve(m))
                    .collect::<Result<Vec<_>>>()?,
            },
        };

        if !definition.matches_kind(self.kind) {
            return Err(InventoryError::InvalidBlueprint {
                kind: self.kind.to_string(),
                reason: "definition does not match the entity kind".to_string(),
            });
        }

        match (&definition, self.kind) {
            (Definition::Resource { resource_type }, _)
                if resource_type.kind() != EntityKind::ResourceType =>
            {
                Err(InventoryError::InvalidBlueprint {
                    kind: self.kind.to_string(),
                    reason: format!("{} is not a resource type", resource_type),
                })
            }
            (Definition::Metric { metric_type, .. }, _)
                if metric_type.kind() != EntityKind::MetricType =>
            {
                Err(InventoryError::InvalidBlueprint {
                    kind: self.kind.to_string(),
                    reason: format!("{} is not a metric type", metric_type),
                })
            }
            (Definition::MetadataPack { members }, _)
                if members.is_empty()
                    || members.iter().any(|m| {
                        !matches!(m.kind(), EntityKind::ResourceType | EntityKind::MetricType)
                    }) =>
            {
                Err(InventoryError::InvalidBlueprint {
                    kind: self.kind.to_string(),
                    reason: "a metadata pack holds one or more resource or metric types"
                        .to_string(),
                })
            }
            _ => Ok(definition),
        }
    }
}

/// Changes to apply to an existing entity
///
/// `None` fields are left untouched. `properties` replaces the whole map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub name: Option<String>,
    pub properties: Option<Properties>,
    pub unit: Option<String>,
    pub data_type: Option<MetricDataType>,
    pub collection_interval: Option<u64>,
    pub value: Option<serde_json::Value>,
}

impl EntityUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_data_type(mut self, data_type: MetricDataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn with_collection_interval(mut self, interval: u64) -> Self {
        self.collection_interval = Some(interval);
        self
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Whether the update touches fields that take part in the identity hash
    pub fn touches_definition(&self) -> bool {
        self.unit.is_some()
            || self.data_type.is_some()
            || self.collection_interval.is_some()
            || self.value.is_some()
    }

    /// Produce the updated copy of `entity`
    ///
    /// # Errors
    ///
    /// Returns `InvalidUpdate` if a definition field does not exist on the
    /// entity's kind.
    pub fn apply_to(&self, entity: &Entity) -> Result<Entity> {
        let mut updated = entity.clone();
        if let Some(name) = &self.name {
            updated.name = Some(name.clone());
        }
        if let Some(properties) = &self.properties {
            updated.properties = properties.clone();
        }

        let invalid = |field: &str| InventoryError::InvalidUpdate {
            path: entity.path.to_string(),
            reason: format!("a {} has no '{}'", entity.kind(), field),
        };

        match &mut updated.definition {
            Definition::MetricType {
                unit,
                data_type,
                collection_interval,
            } => {
                if self.value.is_some() {
                    return Err(invalid("value"));
                }
                if let Some(u) = &self.unit {
                    *unit = u.clone();
                }
                if let Some(d) = self.data_type {
                    *data_type = d;
                }
                if let Some(i) = self.collection_interval {
                    *collection_interval = Some(i);
                }
            }
            Definition::Metric {
                collection_interval,
                ..
            } => {
                if self.unit.is_some() {
                    return Err(invalid("unit"));
                }
                if self.data_type.is_some() {
                    return Err(invalid("dataType"));
                }
                if self.value.is_some() {
                    return Err(invalid("value"));
                }
                if let Some(i) = self.collection_interval {
                    *collection_interval = Some(i);
                }
            }
            Definition::Data { value } => {
                if self.unit.is_some() || self.data_type.is_some() {
                    return Err(invalid("unit"));
                }
                if self.collection_interval.is_some() {
                    return Err(invalid("collectionInterval"));
                }
                if let Some(v) = &self.value {
                    *value = v.clone();
                }
            }
            Definition::Plain | Definition::Resource { .. } | Definition::MetadataPack { .. } => {
                if self.touches_definition() {
                    return Err(invalid("definition field"));
                }
            }
        }

        Ok(updated)
    }
}
