use crate::backend::Backend;
use crate::errors::{InventoryError, Result};
use crate::hash::IdentityHashTree;
use crate::model::{Action, Entity, EntityChange, Notification, Subject};

use super::processing_tree::{NodeId, ProcessingTree};

/// Side-effecting callback run right before commit
pub type PreCommitAction = Box<dyn FnMut(&mut dyn Backend) -> Result<Vec<Notification>> + Send>;

/// Ledger content at some earlier point, see [`PreCommitLedger::mark`]
#[derive(Debug, Clone)]
pub struct LedgerMark {
    tree: ProcessingTree,
    pass_through: usize,
    actions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    Accumulating,
    Processed,
}

/// Per-transaction collector of changes and pre-commit work
///
/// Changes to hashable entities go into the [`ProcessingTree`]; all other
/// notifications pass through unchanged. [`PreCommitLedger::process`] runs
/// the explicit actions, recomputes the identity hashes of every changed
/// subtree exactly once, stores the new hashes and produces the corrected
/// notification list.
pub struct PreCommitLedger {
    tree: ProcessingTree,
    pass_through: Vec<Notification>,
    actions: Vec<PreCommitAction>,
    corrected: Vec<Notification>,
    state: LedgerState,
}

impl Default for PreCommitLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PreCommitLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreCommitLedger")
            .field("tree_nodes", &self.tree.len())
            .field("pass_through", &self.pass_through.len())
            .field("actions", &self.actions.len())
            .field("state", &self.state)
            .finish()
    }
}

impl PreCommitLedger {
    pub fn new() -> Self {
        Self {
            tree: ProcessingTree::new(),
            pass_through: Vec::new(),
            actions: Vec::new(),
            corrected: Vec::new(),
            state: LedgerState::Accumulating,
        }
    }

    pub fn state(&self) -> LedgerState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty() && self.pass_through.is_empty() && self.actions.is_empty()
    }

    /// Record the notifications caused by one entity change
    pub fn add_notifications(&mut self, change: EntityChange) {
        if change.entity.kind().is_hashable() {
            self.tree.record(change);
        } else {
            self.pass_through.extend(change.notifications);
        }
    }

    /// Record notifications not tied to a hashable entity, e.g. associations
    pub fn add_pass_through(&mut self, notifications: impl IntoIterator<Item = Notification>) {
        self.pass_through.extend(notifications);
    }

    pub fn add_action(&mut self, action: PreCommitAction) {
        self.actions.push(action);
    }

    /// Hand the pending explicit actions to someone else
    pub fn take_actions(&mut self) -> Vec<PreCommitAction> {
        std::mem::take(&mut self.actions)
    }

    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    /// Remember what has been recorded so far
    pub fn mark(&self) -> LedgerMark {
        LedgerMark {
            tree: self.tree.clone(),
            pass_through: self.pass_through.len(),
            actions: self.actions.len(),
        }
    }

    /// Forget everything recorded after `mark` was taken
    pub fn restore(&mut self, mark: LedgerMark) {
        self.tree = mark.tree;
        self.pass_through.truncate(mark.pass_through);
        self.actions.truncate(mark.actions);
    }

    /// Run the explicit actions and fix identity hashes
    ///
    /// # Errors
    ///
    /// Propagates action and backend errors. Returns `InconsistentState` if a
    /// changed entity is neither present in the recomputed hash tree nor
    /// recorded as deleted.
    pub fn process(&mut self, backend: &mut dyn Backend) -> Result<()> {
        if self.state == LedgerState::Processed {
            return Err(InventoryError::Internal {
                message: "pre-commit ledger already processed".to_string(),
            });
        }

        for mut action in std::mem::take(&mut self.actions) {
            let produced = action(&mut *backend)?;
            self.pass_through.extend(produced);
        }

        let roots = self.tree.change_roots();
        tracing::debug!(
            change_roots = roots.len(),
            pass_through = self.pass_through.len(),
            "correcting identity hashes"
        );

        let mut corrected = Vec::new();
        for root in roots {
            let path = self.tree.node(root).path.clone();
            match backend.find(&path)? {
                Some(entity) => {
                    let hashes = IdentityHashTree::compute(backend, &entity)?;
                    self.merge(backend, root, Some(&hashes), &mut corrected)?;
                }
                None => self.merge(backend, root, None, &mut corrected)?,
            }
        }

        self.corrected = corrected;
        self.state = LedgerState::Processed;
        Ok(())
    }

    /// Walk one processing-tree node against its recomputed counterpart
    fn merge(
        &self,
        backend: &mut dyn Backend,
        id: NodeId,
        hashes: Option<&IdentityHashTree>,
        out: &mut Vec<Notification>,
    ) -> Result<()> {
        let node = self.tree.node(id);

        if hashes.is_none() && node.is_deleted() {
            // the whole subtree is gone, nothing left to hash
            out.extend(self.tree.subtree_notifications(id));
            return Ok(());
        }

        let Some(hashes) = hashes else {
            if node.is_changed() {
                return Err(InventoryError::InconsistentState {
                    message: format!(
                        "{} was changed but is neither stored nor marked deleted",
                        node.path
                    ),
                });
            }
            for child in node.children.values() {
                self.merge(backend, *child, None, out)?;
            }
            return Ok(());
        };

        let previous = hashes.entity.identity_hash.clone();
        let mut current = hashes.entity.clone();
        if hashes.is_stale() {
            current = backend.update_identity_hash(&node.path, &hashes.hash)?;
            tracing::debug!(
                path = %node.path,
                previous = previous.as_deref().unwrap_or("-"),
                hash = %hashes.hash,
                "identity hash updated"
            );
        }

        out.extend(
            node.notifications
                .iter()
                .cloned()
                .map(|n| with_current_hash(n, &current)),
        );

        if hashes.is_stale() && !node.has_own(Action::Created) && !node.has_own(Action::Deleted) {
            let notification = match previous {
                None => Notification::entity(Action::Created, current.clone()),
                Some(_) => Notification::identity_hash_changed(current.clone(), previous),
            };
            out.push(notification);
        }

        // both sides are ordered by segment
        let mut known = hashes.children.iter().peekable();
        for (segment, child) in &node.children {
            while known.next_if(|h| h.segment() < segment).is_some() {}
            let counterpart = known.next_if(|h| h.segment() == segment);
            self.merge(backend, *child, counterpart, out)?;
        }
        Ok(())
    }

    /// Pass-through notifications followed by the corrected ones
    ///
    /// # Errors
    ///
    /// Returns `Internal` if called before [`PreCommitLedger::process`].
    pub fn final_notifications(&self) -> Result<Vec<Notification>> {
        if self.state != LedgerState::Processed {
            return Err(InventoryError::Internal {
                message: "final notifications requested before processing".to_string(),
            });
        }
        let mut out = self.pass_through.clone();
        out.extend(self.corrected.iter().cloned());
        Ok(out)
    }

    /// Forget everything recorded so far
    pub fn reset(&mut self) {
        self.tree.clear();
        self.pass_through.clear();
        self.actions.clear();
        self.corrected.clear();
        self.state = LedgerState::Accumulating;
    }
}

/// Stamp the recomputed hash onto notifications about `current`
///
/// Deletions keep the hash of the entity that was removed.
fn with_current_hash(mut notification: Notification, current: &Entity) -> Notification {
    if notification.action == Action::Deleted {
        return notification;
    }
    if let Subject::Entity(entity) = &mut notification.subject {
        if entity.path == current.path {
            entity.identity_hash = current.identity_hash.clone();
        }
    }
    notification
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendProvider, MemoryBackend};
    use crate::model::{CanonicalPath, Definition, EntityKind, MetricDataType, Properties};

    fn metric_type(path: &CanonicalPath) -> Entity {
        Entity::new(
            path.clone(),
            Definition::MetricType {
                unit: "ms".into(),
                data_type: MetricDataType::Gauge,
                collection_interval: None,
            },
        )
    }

    #[test]
    fn test_non_hashable_changes_pass_through() {
        let backend = MemoryBackend::new();
        let mut tx = backend.start_transaction(true).unwrap();
        let tenant = tx
            .persist(Entity::new(CanonicalPath::tenant("t").unwrap(), Definition::Plain))
            .unwrap();

        let mut ledger = PreCommitLedger::new();
        ledger.add_notifications(
            EntityChange::new(tenant.clone()).with(Notification::entity(Action::Created, tenant)),
        );
        ledger.process(tx.as_mut()).unwrap();
        let out = ledger.final_notifications().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].action, Action::Created);
    }

    #[test]
    fn test_created_entity_gets_hash_and_single_notification() {
        let backend = MemoryBackend::new();
        let mut tx = backend.start_transaction(true).unwrap();
        let t = CanonicalPath::tenant("t").unwrap();
        let mt = t.extend(EntityKind::MetricType, "cpu").unwrap();
        tx.persist(Entity::new(t.clone(), Definition::Plain)).unwrap();
        let entity = tx.persist(metric_type(&mt)).unwrap();
        tx.relate(&t, &mt, "contains", Properties::new()).unwrap();

        let mut ledger = PreCommitLedger::new();
        ledger.add_notifications(
            EntityChange::new(entity.clone()).with(Notification::entity(Action::Created, entity)),
        );
        ledger.process(tx.as_mut()).unwrap();

        let out = ledger.final_notifications().unwrap();
        assert_eq!(out.len(), 1);
        let hash = out[0].subject.as_entity().unwrap().identity_hash.clone();
        assert!(hash.is_some());
        assert_eq!(tx.get(&mt).unwrap().identity_hash, hash);
    }

    #[test]
    fn test_changed_entity_missing_from_store_is_inconsistent() {
        let backend = MemoryBackend::new();
        let mut tx = backend.start_transaction(true).unwrap();
        let mt = CanonicalPath::parse("/t;t/mt;ghost").unwrap();

        let mut ledger = PreCommitLedger::new();
        let ghost = metric_type(&mt);
        ledger.add_notifications(
            EntityChange::new(ghost.clone()).with(Notification::entity(Action::Updated, ghost)),
        );
        let err = ledger.process(tx.as_mut()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_deleted_subtree_is_emitted_as_recorded() {
        let backend = MemoryBackend::new();
        let mut tx = backend.start_transaction(true).unwrap();
        let mt = CanonicalPath::parse("/t;t/mt;gone").unwrap();

        let mut ledger = PreCommitLedger::new();
        let gone = metric_type(&mt);
        ledger.add_notifications(
            EntityChange::new(gone.clone()).with(Notification::entity(Action::Deleted, gone)),
        );
        ledger.process(tx.as_mut()).unwrap();
        let out = ledger.final_notifications().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].action, Action::Deleted);
    }

    #[test]
    fn test_restore_forgets_later_records() {
        let t = Entity::new(CanonicalPath::tenant("t").unwrap(), Definition::Plain);
        let mt = metric_type(&CanonicalPath::parse("/t;t/mt;cpu").unwrap());
        let mut ledger = PreCommitLedger::new();
        ledger.add_notifications(
            EntityChange::new(t.clone()).with(Notification::entity(Action::Created, t)),
        );
        let mark = ledger.mark();

        ledger.add_notifications(
            EntityChange::new(mt.clone()).with(Notification::entity(Action::Created, mt)),
        );
        ledger.add_action(Box::new(|_: &mut dyn Backend| -> Result<Vec<Notification>> {
            Ok(Vec::new())
        }));
        ledger.restore(mark);

        assert_eq!(ledger.pending_actions(), 0);
        assert!(ledger.tree.is_empty());
        assert_eq!(ledger.pass_through.len(), 1);
    }

    #[test]
    fn test_recreated_entity_is_hashed_again() {
        let backend = MemoryBackend::new();
        let mut tx = backend.start_transaction(true).unwrap();
        let t = CanonicalPath::tenant("t").unwrap();
        let mt = t.extend(EntityKind::MetricType, "cpu").unwrap();
        tx.persist(Entity::new(t.clone(), Definition::Plain)).unwrap();
        let old = metric_type(&mt);
        let entity = tx.persist(metric_type(&mt)).unwrap();
        tx.relate(&t, &mt, "contains", Properties::new()).unwrap();

        let mut ledger = PreCommitLedger::new();
        ledger.add_notifications(
            EntityChange::new(old.clone()).with(Notification::entity(Action::Deleted, old)),
        );
        ledger.add_notifications(
            EntityChange::new(entity.clone()).with(Notification::entity(Action::Created, entity)),
        );
        ledger.process(tx.as_mut()).unwrap();

        let stored = tx.get(&mt).unwrap().identity_hash;
        assert!(stored.is_some());
        let out = ledger.final_notifications().unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].action, Action::Deleted);
        assert!(out[0].subject.as_entity().unwrap().identity_hash.is_none());
        assert_eq!(out[1].action, Action::Created);
        assert_eq!(out[1].subject.as_entity().unwrap().identity_hash, stored);
    }

    #[test]
    fn test_actions_run_once_and_reset_clears_state() {
        let backend = MemoryBackend::new();
        let mut tx = backend.start_transaction(true).unwrap();
        let mut ledger = PreCommitLedger::new();
        ledger.add_action(Box::new(|backend: &mut dyn Backend| -> Result<Vec<Notification>> {
            let t = backend.persist(Entity::new(
                CanonicalPath::tenant("late").unwrap(),
                Definition::Plain,
            ))?;
            Ok(vec![Notification::entity(Action::Created, t)])
        }));
        assert_eq!(ledger.pending_actions(), 1);
        ledger.process(tx.as_mut()).unwrap();
        assert_eq!(ledger.final_notifications().unwrap().len(), 1);
        assert!(ledger.process(tx.as_mut()).is_err());

        ledger.reset();
        assert_eq!(ledger.state(), LedgerState::Accumulating);
        assert!(ledger.is_empty());
        assert!(ledger.final_notifications().is_err());
    }
}
