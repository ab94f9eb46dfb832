//! Explicit relationship operations
//!
//! Relationship notifications produced here never touch identity hashes and
//! go straight to the ledger's pass-through list.

use inventory_core::errors::{InventoryError, Result};
use inventory_core::model::{Action, CanonicalPath, Direction, Notification, Properties, Relationship};
use inventory_core::rules::{check_create, check_delete};

use super::mutator::resolve_reference;
use crate::transaction::Transaction;

/// Relate `origin` and the entity `target_ref` points to
///
/// `target_ref` is canonical or relative to `origin`.
///
/// # Errors
///
/// * `EntityNotFound` - either end is missing
/// * any rule engine error
pub fn associate(
    tx: &mut Transaction,
    origin: &CanonicalPath,
    direction: Direction,
    name: &str,
    target_ref: &str,
) -> Result<Relationship> {
    let target = resolve_reference(origin, target_ref)?;
    tx.backend().get(origin)?;
    tx.backend().get(&target)?;
    check_create(tx.backend(), origin, direction, name, &target)?;

    let (source, target) = match direction {
        Direction::Outgoing => (origin.clone(), target),
        Direction::Incoming => (target, origin.clone()),
        Direction::Both => {
            return Err(InventoryError::rule_violation(
                name,
                origin,
                &target,
                "associations are created in a single direction",
            ))
        }
    };
    create_relationship(tx, &source, &target, name, Properties::new())
}

/// Create `origin -> target_ref` named `name` carrying `properties`
///
/// # Errors
///
/// Same as [`associate`].
pub fn link_with(
    tx: &mut Transaction,
    origin: &CanonicalPath,
    name: &str,
    target_ref: &str,
    properties: Properties,
) -> Result<Relationship> {
    let target = resolve_reference(origin, target_ref)?;
    tx.backend().get(origin)?;
    tx.backend().get(&target)?;
    check_create(tx.backend(), origin, Direction::Outgoing, name, &target)?;
    create_relationship(tx, origin, &target, name, properties)
}

fn create_relationship(
    tx: &mut Transaction,
    source: &CanonicalPath,
    target: &CanonicalPath,
    name: &str,
    properties: Properties,
) -> Result<Relationship> {
    let rel = tx.backend_mut().relate(source, target, name, properties)?;
    tx.ledger_mut()
        .add_pass_through([Notification::relationship(Action::Created, rel.clone())]);
    Ok(rel)
}

/// Remove the relationship `name` between `origin` and `target_ref`
///
/// # Errors
///
/// * `RelationshipNotFound` - no such relationship
/// * any rule engine error
pub fn disassociate(
    tx: &mut Transaction,
    origin: &CanonicalPath,
    direction: Direction,
    name: &str,
    target_ref: &str,
) -> Result<Relationship> {
    let target = resolve_reference(origin, target_ref)?;
    let (source, sink) = match direction {
        Direction::Outgoing => (origin, &target),
        Direction::Incoming => (&target, origin),
        Direction::Both => {
            return Err(InventoryError::rule_violation(
                name,
                origin,
                &target,
                "associations are removed in a single direction",
            ))
        }
    };
    let rel = tx
        .backend()
        .find_relationship(source, sink, name)?
        .ok_or_else(|| InventoryError::RelationshipNotFound {
            relationship: format!("{} -[{}]-> {}", source, name, sink),
        })?;
    check_delete(tx.backend(), origin, direction, name, &target)?;
    remove_relationship(tx, rel)
}

/// Replace the properties of relationship `id`
///
/// # Errors
///
/// Returns `RelationshipNotFound` if the id is unknown.
pub fn update_relationship(
    tx: &mut Transaction,
    id: &str,
    properties: Properties,
) -> Result<Relationship> {
    let previous = tx.backend().get_relationship_by_id(id)?;
    let updated = tx.backend_mut().update_relationship(id, properties.clone())?;
    tx.ledger_mut().add_pass_through([Notification::relationship_updated(
        updated.clone(),
        previous,
        properties,
    )]);
    Ok(updated)
}

/// Delete relationship `id`
///
/// # Errors
///
/// * `RelationshipNotFound` - the id is unknown
/// * any rule engine error
pub fn delete_relationship(tx: &mut Transaction, id: &str) -> Result<Relationship> {
    let rel = tx.backend().get_relationship_by_id(id)?;
    check_delete(
        tx.backend(),
        &rel.source,
        Direction::Outgoing,
        &rel.name,
        &rel.target,
    )?;
    remove_relationship(tx, rel)
}

fn remove_relationship(tx: &mut Transaction, rel: Relationship) -> Result<Relationship> {
    tx.backend_mut().delete_relationship(&rel.id)?;
    tx.ledger_mut()
        .add_pass_through([Notification::relationship(Action::Deleted, rel.clone())]);
    Ok(rel)
}
