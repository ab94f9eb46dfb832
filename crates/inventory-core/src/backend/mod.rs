//! Backend contract
//!
//! The write pipeline never talks to storage directly. Everything goes
//! through a [`Backend`], which is one open backend transaction, obtained
//! from a [`BackendProvider`].
//!
//! Existence checks return `Option`; the `get*` helpers turn absence into
//! the matching not-found error for call sites that require the element.

pub mod memory;
pub mod query;

use std::collections::{BTreeSet, VecDeque};

use crate::errors::{InventoryError, Result};
use crate::model::{CanonicalPath, Direction, Entity, EntityUpdate, Properties, Relationship};

pub use memory::MemoryBackend;
pub use query::{Page, Pager, Query, RelatedFilter};

/// Behavior flags a backend advertises to the transaction layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Whether a transaction frame should keep one backend transaction open
    /// for all of its operations
    pub single_transaction_frames: bool,
    /// Whether a failed commit must be followed by an explicit rollback
    pub rollback_required_after_failure: bool,
    /// Whether work done inside an open transaction survives its rollback
    ///
    /// Rolling back a single-transaction frame on such a backend still
    /// delivers the notifications of the frame's operations.
    pub persists_intermediate_work: bool,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            single_transaction_frames: true,
            rollback_required_after_failure: true,
            persists_intermediate_work: false,
        }
    }
}

/// Marker returned by [`Backend::savepoint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Savepoint(pub usize);

/// Source of backend transactions
pub trait BackendProvider: Send + Sync {
    /// Open a new backend transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot open a transaction.
    fn start_transaction(&self, mutating: bool) -> Result<Box<dyn Backend>>;

    fn capabilities(&self) -> BackendCapabilities;
}

/// One open backend transaction
pub trait Backend: Send {
    /// Look up an entity by path
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn find(&self, path: &CanonicalPath) -> Result<Option<Entity>>;

    /// Look up the relationship `name` from `source` to `target`
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn find_relationship(
        &self,
        source: &CanonicalPath,
        target: &CanonicalPath,
        name: &str,
    ) -> Result<Option<Relationship>>;

    /// Look up a relationship by surrogate id
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn find_relationship_by_id(&self, id: &str) -> Result<Option<Relationship>>;

    /// Relationships incident to `path` in `direction`, restricted to `names`
    /// unless `names` is empty
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn get_relationships(
        &self,
        path: &CanonicalPath,
        direction: Direction,
        names: &[&str],
    ) -> Result<Vec<Relationship>>;

    /// Run a query and return one page of matching entities in path order
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn query(&self, query: &Query, pager: &Pager) -> Result<Page<Entity>>;

    /// Store a new entity
    ///
    /// # Errors
    ///
    /// Returns `EntityAlreadyExists` if the path is taken.
    fn persist(&mut self, entity: Entity) -> Result<Entity>;

    /// Create a relationship
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if an endpoint is missing and
    /// `RelationshipAlreadyExists` for a duplicate.
    fn relate(
        &mut self,
        source: &CanonicalPath,
        target: &CanonicalPath,
        name: &str,
        properties: Properties,
    ) -> Result<Relationship>;

    /// Apply an update to a stored entity and return the new state
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` or the update's validation error.
    fn update(&mut self, path: &CanonicalPath, update: &EntityUpdate) -> Result<Entity>;

    /// Replace the properties of a relationship
    ///
    /// # Errors
    ///
    /// Returns `RelationshipNotFound` if the id is unknown.
    fn update_relationship(&mut self, id: &str, properties: Properties) -> Result<Relationship>;

    /// Store a recomputed identity hash
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the entity is gone.
    fn update_identity_hash(&mut self, path: &CanonicalPath, hash: &str) -> Result<Entity>;

    /// Remove an entity together with every relationship incident to it
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the entity is gone.
    fn delete(&mut self, path: &CanonicalPath) -> Result<()>;

    /// Remove a single relationship
    ///
    /// # Errors
    ///
    /// Returns `RelationshipNotFound` if the id is unknown.
    fn delete_relationship(&mut self, id: &str) -> Result<()>;

    /// Make the transaction's writes durable
    ///
    /// # Errors
    ///
    /// Returns `CommitConflict` or `BackendInconsistent` when a concurrent
    /// writer got in the way.
    fn commit(&mut self) -> Result<()>;

    /// Discard the transaction's writes
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn rollback(&mut self) -> Result<()>;

    /// Mark the current state of the transaction
    ///
    /// Returns `None` when the backend has no savepoints.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn savepoint(&mut self) -> Result<Option<Savepoint>> {
        Ok(None)
    }

    /// Undo everything written since `savepoint` and drop it
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the savepoint is unknown.
    fn rollback_to_savepoint(&mut self, savepoint: Savepoint) -> Result<()> {
        Err(InventoryError::Internal {
            message: format!("unknown savepoint {}", savepoint.0),
        })
    }

    /// Forget `savepoint` and every later one, keeping the writes
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn release_savepoint(&mut self, _savepoint: Savepoint) -> Result<()> {
        Ok(())
    }

    /// Surrogate ids this transaction handed out or still holds for reuse,
    /// oldest first
    fn issued_relationship_ids(&self) -> Vec<String> {
        Vec::new()
    }

    /// Use `ids`, in order, for the next relationships this transaction
    /// creates
    ///
    /// Replaying recorded operations on a fresh transaction then yields the
    /// same relationship ids as the first run.
    fn reissue_relationship_ids(&mut self, _ids: Vec<String>) {}

    /// Like [`Backend::find`], failing when the entity is absent
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if the entity does not exist.
    fn get(&self, path: &CanonicalPath) -> Result<Entity> {
        self.find(path)?
            .ok_or_else(|| InventoryError::EntityNotFound {
                path: path.to_string(),
            })
    }

    /// Like [`Backend::find_relationship_by_id`], failing when absent
    ///
    /// # Errors
    ///
    /// Returns `RelationshipNotFound` if the id is unknown.
    fn get_relationship_by_id(&self, id: &str) -> Result<Relationship> {
        self.find_relationship_by_id(id)?
            .ok_or_else(|| InventoryError::RelationshipNotFound {
                relationship: id.to_string(),
            })
    }

    /// Whether any relationship named `name` touches `path` in `direction`
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn has_relationship(
        &self,
        path: &CanonicalPath,
        direction: Direction,
        name: &str,
    ) -> Result<bool> {
        Ok(!self.get_relationships(path, direction, &[name])?.is_empty())
    }

    /// Entities reachable from `path` over `names`, breadth first
    ///
    /// The start entity itself is not part of the result. Every reachable
    /// entity appears once, at its shallowest distance.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn transitive_closure(
        &self,
        path: &CanonicalPath,
        direction: Direction,
        names: &[&str],
    ) -> Result<Vec<Entity>> {
        let mut seen = BTreeSet::new();
        seen.insert(path.clone());
        let mut queue = VecDeque::from([path.clone()]);
        let mut out = Vec::new();

        while let Some(current) = queue.pop_front() {
            for rel in self.get_relationships(&current, direction, names)? {
                let mut next = Vec::with_capacity(2);
                if direction != Direction::Incoming && rel.source == current {
                    next.push(rel.target.clone());
                }
                if direction != Direction::Outgoing && rel.target == current {
                    next.push(rel.source.clone());
                }
                for other in next {
                    if seen.insert(other.clone()) {
                        if let Some(entity) = self.find(&other)? {
                            out.push(entity);
                        }
                        queue.push_back(other);
                    }
                }
            }
        }

        Ok(out)
    }

    /// First entity matching `query`, if any
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    fn query_single(&self, query: &Query) -> Result<Option<Entity>> {
        Ok(self
            .query(query, &Pager::new(0, 1))?
            .items
            .into_iter()
            .next())
    }
}
