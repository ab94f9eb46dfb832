//! Per-kind customization of the create / update / delete pipelines
//!
//! Each entity kind gets an [`EntityHooks`] value: a set of optional plain
//! function pointers the generic pipelines call at fixed points. Kinds that
//! need nothing special get [`EntityHooks::NONE`].

use std::collections::BTreeSet;

use inventory_core::errors::{InventoryError, Result};
use inventory_core::model::{
    Action, Blueprint, CanonicalPath, Definition, Direction, Entity, EntityKind, EntityUpdate,
    Notification, Properties, WellKnown,
};

use crate::transaction::Transaction;

/// Validation before anything is persisted: (transaction, parent, blueprint)
pub type PreCreateHook = fn(&Transaction, Option<&CanonicalPath>, &Blueprint) -> Result<()>;
/// Kind-specific relationships right after the entity and its `contains` edge exist
pub type WireUpHook = fn(&mut Transaction, &Entity) -> Result<Vec<Notification>>;
pub type PreUpdateHook = fn(&Transaction, &Entity, &EntityUpdate) -> Result<()>;
/// Called for every member of the deleted subtree with the full doomed set
pub type PreDeleteHook = fn(&Transaction, &Entity, &BTreeSet<CanonicalPath>) -> Result<()>;
pub type PostHook = fn(&mut Transaction, &Entity) -> Result<()>;

#[derive(Clone, Copy, Default)]
pub struct EntityHooks {
    pub pre_create: Option<PreCreateHook>,
    pub wire_up: Option<WireUpHook>,
    pub post_create: Option<PostHook>,
    pub pre_update: Option<PreUpdateHook>,
    pub post_update: Option<PostHook>,
    pub pre_delete: Option<PreDeleteHook>,
    pub post_delete: Option<PostHook>,
}

impl EntityHooks {
    pub const NONE: EntityHooks = EntityHooks {
        pre_create: None,
        wire_up: None,
        post_create: None,
        pre_update: None,
        post_update: None,
        pre_delete: None,
        post_delete: None,
    };

    /// Hooks registered for `kind`
    pub fn for_kind(kind: EntityKind) -> EntityHooks {
        match kind {
            EntityKind::Resource => EntityHooks {
                wire_up: Some(wire_up_resource),
                ..Self::NONE
            },
            EntityKind::Metric => EntityHooks {
                wire_up: Some(wire_up_defines),
                ..Self::NONE
            },
            EntityKind::ResourceType | EntityKind::MetricType => EntityHooks {
                pre_update: Some(protect_pack_member_update),
                pre_delete: Some(protect_pack_member_delete),
                ..Self::NONE
            },
            EntityKind::StructuredData => EntityHooks {
                pre_create: Some(check_data_role),
                wire_up: Some(wire_up_data),
                ..Self::NONE
            },
            EntityKind::MetadataPack => EntityHooks {
                pre_create: Some(check_pack_members),
                wire_up: Some(wire_up_pack),
                ..Self::NONE
            },
            EntityKind::Tenant
            | EntityKind::Environment
            | EntityKind::Feed
            | EntityKind::OperationType => Self::NONE,
        }
    }
}

/// Structured data roles each owner kind accepts
pub fn data_roles(owner: EntityKind) -> &'static [&'static str] {
    match owner {
        EntityKind::Resource => &["configuration", "connectionConfiguration"],
        EntityKind::ResourceType => &["configurationSchema", "connectionConfigurationSchema"],
        EntityKind::OperationType => &["returnType", "parameterTypes"],
        _ => &[],
    }
}

/// Relate without going through the rule engine
///
/// Used only for relationships the inventory manages itself.
fn relate_internal(
    tx: &mut Transaction,
    source: &CanonicalPath,
    target: &CanonicalPath,
    relationship: WellKnown,
) -> Result<Notification> {
    let rel = tx
        .backend_mut()
        .relate(source, target, relationship.as_str(), Properties::new())?;
    Ok(Notification::relationship(Action::Created, rel))
}

fn wire_up_defines(tx: &mut Transaction, entity: &Entity) -> Result<Vec<Notification>> {
    let Some(definer) = entity.definition.defined_by() else {
        return Ok(Vec::new());
    };
    tx.backend().get(definer)?;
    let notification = relate_internal(tx, definer, &entity.path, WellKnown::Defines)?;
    Ok(vec![notification])
}

fn wire_up_resource(tx: &mut Transaction, entity: &Entity) -> Result<Vec<Notification>> {
    let mut out = wire_up_defines(tx, entity)?;
    if let Some(parent) = entity.path.parent() {
        if parent.kind() == EntityKind::Resource {
            out.push(relate_internal(tx, &parent, &entity.path, WellKnown::IsParentOf)?);
        }
    }
    Ok(out)
}

fn wire_up_data(tx: &mut Transaction, entity: &Entity) -> Result<Vec<Notification>> {
    let owner = entity.path.parent().ok_or_else(|| InventoryError::InvalidBlueprint {
        kind: entity.kind().to_string(),
        reason: "structured data needs an owner".to_string(),
    })?;
    // hasData is never surfaced
    relate_internal(tx, &owner, &entity.path, WellKnown::HasData)?;
    Ok(Vec::new())
}

fn wire_up_pack(tx: &mut Transaction, entity: &Entity) -> Result<Vec<Notification>> {
    let Definition::MetadataPack { members } = &entity.definition else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity(members.len());
    for member in members.clone() {
        out.push(relate_internal(tx, &entity.path, &member, WellKnown::Incorporates)?);
    }
    Ok(out)
}

fn check_data_role(
    _tx: &Transaction,
    parent: Option<&CanonicalPath>,
    blueprint: &Blueprint,
) -> Result<()> {
    let owner = parent.map(|p| p.kind());
    let roles = owner.map(data_roles).unwrap_or(&[]);
    if !roles.contains(&blueprint.id.as_str()) {
        return Err(InventoryError::InvalidBlueprint {
            kind: EntityKind::StructuredData.to_string(),
            reason: format!(
                "'{}' is not a data role of a {}",
                blueprint.id,
                owner.map(|k| k.name()).unwrap_or("root")
            ),
        });
    }
    Ok(())
}

fn check_pack_members(
    tx: &Transaction,
    parent: Option<&CanonicalPath>,
    blueprint: &Blueprint,
) -> Result<()> {
    let definition = blueprint.resolve_definition(parent)?;
    let Definition::MetadataPack { members } = definition else {
        return Ok(());
    };
    for member in &members {
        let tenant = parent.map(|p| p.tenant_id());
        if tenant != Some(member.tenant_id()) {
            return Err(InventoryError::InvalidBlueprint {
                kind: EntityKind::MetadataPack.to_string(),
                reason: format!("{} belongs to another tenant", member),
            });
        }
        tx.backend().get(member)?;
    }
    Ok(())
}

/// Metadata packs incorporating `path`
fn incorporating_packs(tx: &Transaction, path: &CanonicalPath) -> Result<Vec<CanonicalPath>> {
    Ok(tx
        .backend()
        .get_relationships(path, Direction::Incoming, &[WellKnown::Incorporates.as_str()])?
        .into_iter()
        .map(|r| r.source)
        .filter(|source| source.kind() == EntityKind::MetadataPack)
        .collect())
}

fn protect_pack_member_update(
    tx: &Transaction,
    entity: &Entity,
    update: &EntityUpdate,
) -> Result<()> {
    if !update.touches_definition() {
        return Ok(());
    }
    if let Some(pack) = incorporating_packs(tx, &entity.path)?.first() {
        return Err(InventoryError::MetadataPackProtected {
            path: entity.path.to_string(),
            reason: format!("defining fields are frozen by metadata pack {}", pack),
        });
    }
    Ok(())
}

fn protect_pack_member_delete(
    tx: &Transaction,
    entity: &Entity,
    doomed: &BTreeSet<CanonicalPath>,
) -> Result<()> {
    let surviving = incorporating_packs(tx, &entity.path)?
        .into_iter()
        .find(|pack| !doomed.contains(pack));
    if let Some(pack) = surviving {
        return Err(InventoryError::MetadataPackProtected {
            path: entity.path.to_string(),
            reason: format!("still a member of metadata pack {}", pack),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_without_customization_have_no_hooks() {
        let hooks = EntityHooks::for_kind(EntityKind::Environment);
        assert!(hooks.pre_create.is_none());
        assert!(hooks.wire_up.is_none());
        assert!(hooks.pre_delete.is_none());
    }

    #[test]
    fn test_type_kinds_are_pack_protected() {
        for kind in [EntityKind::ResourceType, EntityKind::MetricType] {
            let hooks = EntityHooks::for_kind(kind);
            assert!(hooks.pre_update.is_some());
            assert!(hooks.pre_delete.is_some());
        }
    }

    #[test]
    fn test_data_roles_depend_on_owner() {
        assert!(data_roles(EntityKind::Resource).contains(&"configuration"));
        assert!(data_roles(EntityKind::OperationType).contains(&"returnType"));
        assert!(data_roles(EntityKind::Environment).is_empty());
    }
}
