//! Entity create / update / delete pipelines
//!
//! Each function does its work inside the given transaction and records
//! what it changed in the transaction's ledger. Nothing is committed here.

use std::collections::{BTreeSet, HashSet};

use inventory_core::backend::Backend;
use inventory_core::errors::{InventoryError, Result};
use inventory_core::model::{
    Action, Blueprint, CanonicalPath, Direction, Entity, EntityChange, EntityKind, EntityUpdate,
    Notification, PathRef, Properties, WellKnown,
};
use inventory_core::rules::check_create;

use crate::hooks::EntityHooks;
use crate::transaction::Transaction;

/// Create the entity described by `blueprint` under `parent`
///
/// Tenants are created with no parent, everything else needs one. Custom
/// relationships of the blueprint whose other end does not exist yet are
/// created right before commit, so an entity created later in the same
/// transaction can still be referenced. Their notifications are
/// pass-through, so they are delivered ahead of the owner's `created`
/// notification rather than after its wire-up.
///
/// # Errors
///
/// * `InvalidBlueprint` / `IllegalContainment` - malformed request
/// * `EntityNotFound` - parent or a referenced type missing
/// * `EntityAlreadyExists` - the path is taken
/// * any rule engine error for the relationships being created
pub fn create(
    tx: &mut Transaction,
    parent: Option<&CanonicalPath>,
    blueprint: &Blueprint,
) -> Result<Entity> {
    let path = match parent {
        None if blueprint.kind == EntityKind::Tenant => CanonicalPath::tenant(blueprint.id.clone())?,
        Some(parent) if blueprint.kind != EntityKind::Tenant => {
            parent.extend(blueprint.kind, blueprint.id.clone())?
        }
        _ => {
            return Err(InventoryError::InvalidBlueprint {
                kind: blueprint.kind.to_string(),
                reason: "tenants, and only tenants, are created without a parent".to_string(),
            })
        }
    };

    let hooks = EntityHooks::for_kind(blueprint.kind);
    if let Some(pre_create) = hooks.pre_create {
        pre_create(tx, parent, blueprint)?;
    }
    if let Some(parent) = parent {
        tx.backend().get(parent)?;
    }

    let entity = Entity {
        name: blueprint.name.clone(),
        properties: blueprint.properties.clone(),
        ..Entity::new(path.clone(), blueprint.resolve_definition(parent)?)
    };
    let entity = tx.backend_mut().persist(entity)?;
    let mut change =
        EntityChange::new(entity.clone()).with(Notification::entity(Action::Created, entity.clone()));

    if let Some(parent) = parent {
        let contains = WellKnown::Contains.as_str();
        check_create(tx.backend(), parent, Direction::Outgoing, contains, &path)?;
        let rel = tx
            .backend_mut()
            .relate(parent, &path, contains, Properties::new())?;
        change.push(Notification::relationship(Action::Created, rel));
    }

    if let Some(wire_up) = hooks.wire_up {
        for notification in wire_up(tx, &entity)? {
            change.push(notification);
        }
    }

    let base = parent.unwrap_or(&path);
    let custom = blueprint
        .outgoing
        .iter()
        .map(|(name, refs)| (Direction::Outgoing, name, refs))
        .chain(
            blueprint
                .incoming
                .iter()
                .map(|(name, refs)| (Direction::Incoming, name, refs)),
        );
    for (direction, name, refs) in custom {
        for reference in refs {
            let other = resolve_reference(base, reference)?;
            if tx.backend().find(&other)?.is_some() {
                change.push(relate_checked(
                    tx.backend_mut(),
                    &path,
                    direction,
                    name,
                    &other,
                )?);
            } else {
                tracing::debug!(
                    path = %path,
                    relationship = %name,
                    other = %other,
                    "deferring relationship to a not yet existing entity"
                );
                let (origin, name) = (path.clone(), name.clone());
                tx.ledger_mut().add_action(Box::new(
                    move |backend: &mut dyn Backend| -> Result<Vec<Notification>> {
                        if backend.find(&other)?.is_none() {
                            return Err(InventoryError::EntityNotFound {
                                path: other.to_string(),
                            });
                        }
                        Ok(vec![relate_checked(backend, &origin, direction, &name, &other)?])
                    },
                ));
            }
        }
    }

    if let Some(post_create) = hooks.post_create {
        post_create(tx, &entity)?;
    }

    tx.ledger_mut().add_notifications(change);
    Ok(entity)
}

/// Apply `update` to the entity at `path`
///
/// # Errors
///
/// * `EntityNotFound` - no such entity
/// * `InvalidUpdate` - the update does not fit the entity kind
/// * `MetadataPackProtected` - defining fields of a pack member
pub fn update(tx: &mut Transaction, path: &CanonicalPath, update: &EntityUpdate) -> Result<Entity> {
    let previous = tx.backend().get(path)?;
    let hooks = EntityHooks::for_kind(path.kind());
    if let Some(pre_update) = hooks.pre_update {
        pre_update(tx, &previous, update)?;
    }

    let updated = tx.backend_mut().update(path, update)?;

    if let Some(post_update) = hooks.post_update {
        post_update(tx, &updated)?;
    }

    let notification = Notification::entity_updated(updated.clone(), previous, update.clone());
    tx.ledger_mut()
        .add_notifications(EntityChange::new(updated.clone()).with(notification));
    Ok(updated)
}

/// Delete the entity at `path` together with everything it contains
///
/// All checks run before the first write, so a rejected delete leaves the
/// transaction untouched.
///
/// # Errors
///
/// * `EntityNotFound` - no such entity
/// * `TypeInUse` - a member of the subtree still defines a surviving entity
/// * `MetadataPackProtected` - a member is incorporated by a surviving pack
pub fn delete(tx: &mut Transaction, path: &CanonicalPath) -> Result<()> {
    let root = tx.backend().get(path)?;
    let mut members = vec![root];
    members.extend(tx.backend().transitive_closure(
        path,
        Direction::Outgoing,
        &[WellKnown::Contains.as_str()],
    )?);
    let doomed: BTreeSet<CanonicalPath> = members.iter().map(|e| e.path.clone()).collect();

    for member in &members {
        for rel in tx.backend().get_relationships(
            &member.path,
            Direction::Outgoing,
            &[WellKnown::Defines.as_str()],
        )? {
            if !doomed.contains(&rel.target) {
                return Err(InventoryError::TypeInUse {
                    path: member.path.to_string(),
                    used_by: rel.target.to_string(),
                });
            }
        }
    }

    for member in &members {
        if let Some(pre_delete) = EntityHooks::for_kind(member.kind()).pre_delete {
            pre_delete(tx, member, &doomed)?;
        }
    }

    // every relationship is reported once, with the first member it touches
    let mut seen = HashSet::new();
    let mut changes = Vec::with_capacity(members.len());
    for member in &members {
        let mut change = EntityChange::new(member.clone())
            .with(Notification::entity(Action::Deleted, member.clone()));
        for rel in tx
            .backend()
            .get_relationships(&member.path, Direction::Both, &[])?
        {
            if seen.insert(rel.id.clone()) && rel.is_api_representable() {
                change.push(Notification::relationship(Action::Deleted, rel));
            }
        }
        changes.push(change);
    }

    for member in members.iter().rev() {
        tx.backend_mut().delete(&member.path)?;
    }
    tracing::debug!(path = %path, deleted = members.len(), "subtree deleted");

    for member in &members {
        if let Some(post_delete) = EntityHooks::for_kind(member.kind()).post_delete {
            post_delete(tx, member)?;
        }
    }

    for change in changes {
        tx.ledger_mut().add_notifications(change);
    }
    Ok(())
}

/// Resolve a canonical or relative reference against `base`
pub(crate) fn resolve_reference(base: &CanonicalPath, reference: &str) -> Result<CanonicalPath> {
    base.resolve(&PathRef::parse(reference)?)
}

/// Rule-check and create `name` between `origin` and `other`
pub(crate) fn relate_checked(
    backend: &mut dyn Backend,
    origin: &CanonicalPath,
    direction: Direction,
    name: &str,
    other: &CanonicalPath,
) -> Result<Notification> {
    check_create(&*backend, origin, direction, name, other)?;
    let (source, target) = match direction {
        Direction::Outgoing => (origin, other),
        Direction::Incoming => (other, origin),
        Direction::Both => {
            return Err(InventoryError::rule_violation(
                name,
                origin,
                other,
                "a relationship has exactly one direction",
            ))
        }
    };
    let rel = backend.relate(source, target, name, Properties::new())?;
    Ok(Notification::relationship(Action::Created, rel))
}
