//! Transaction: one backend transaction plus its pre-commit ledger

use inventory_core::backend::{Backend, BackendProvider, Savepoint};
use inventory_core::errors::Result;
use inventory_core::ledger::{LedgerMark, PreCommitAction, PreCommitLedger};
use inventory_core::model::Notification;

/// Backend savepoint together with the ledger content at that point
#[derive(Debug)]
pub struct TransactionSavepoint {
    backend: Savepoint,
    ledger: LedgerMark,
}

/// Unit of work handed to payloads
///
/// Payloads read and write through [`Transaction::backend`] /
/// [`Transaction::backend_mut`] and record what they changed in
/// [`Transaction::ledger_mut`]. Commit runs the ledger's pre-commit work,
/// commits the backend transaction and returns the final notifications.
pub struct Transaction {
    backend: Box<dyn Backend>,
    ledger: PreCommitLedger,
    mutating: bool,
    defer_actions: bool,
    deferred: Vec<PreCommitAction>,
}

impl Transaction {
    /// Open a transaction on `provider`
    ///
    /// # Errors
    ///
    /// Returns the provider's error if no backend transaction can be opened.
    pub fn begin(provider: &dyn BackendProvider, mutating: bool) -> Result<Self> {
        Ok(Self {
            backend: provider.start_transaction(mutating)?,
            ledger: PreCommitLedger::new(),
            mutating,
            defer_actions: false,
            deferred: Vec::new(),
        })
    }

    /// Keep explicit pre-commit actions out of this transaction's commit
    ///
    /// They are collected instead and can be picked up with
    /// [`Transaction::take_deferred_actions`] after commit.
    pub fn deferring_actions(mut self) -> Self {
        self.defer_actions = true;
        self
    }

    pub fn is_mutating(&self) -> bool {
        self.mutating
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }

    pub fn ledger(&self) -> &PreCommitLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut PreCommitLedger {
        &mut self.ledger
    }

    /// Backend and ledger at once, for payloads that need both
    pub fn parts(&mut self) -> (&mut dyn Backend, &mut PreCommitLedger) {
        (self.backend.as_mut(), &mut self.ledger)
    }

    /// Run pre-commit work, commit, and return the final notifications
    ///
    /// # Errors
    ///
    /// Propagates pre-commit failures and the backend's commit error.
    pub fn commit(&mut self) -> Result<Vec<Notification>> {
        if self.defer_actions {
            self.deferred.extend(self.ledger.take_actions());
        }
        self.ledger.process(self.backend.as_mut())?;
        self.backend.commit()?;
        self.ledger.final_notifications()
    }

    /// Run pre-commit work, then roll back instead of committing
    ///
    /// Returns the notifications a commit would have produced.
    ///
    /// # Errors
    ///
    /// Propagates pre-commit failures and the backend's rollback error.
    pub fn preview(&mut self) -> Result<Vec<Notification>> {
        self.ledger.process(self.backend.as_mut())?;
        let notifications = self.ledger.final_notifications()?;
        self.backend.rollback()?;
        Ok(notifications)
    }

    /// # Errors
    ///
    /// Returns the backend's rollback error.
    pub fn rollback(&mut self) -> Result<()> {
        self.backend.rollback()
    }

    /// Mark the current state, `None` if the backend has no savepoints
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub fn savepoint(&mut self) -> Result<Option<TransactionSavepoint>> {
        Ok(self
            .backend
            .savepoint()?
            .map(|backend| TransactionSavepoint {
                backend,
                ledger: self.ledger.mark(),
            }))
    }

    /// Undo backend writes and ledger records made since `savepoint`
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub fn rollback_to(&mut self, savepoint: TransactionSavepoint) -> Result<()> {
        self.backend.rollback_to_savepoint(savepoint.backend)?;
        self.ledger.restore(savepoint.ledger);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the backend's error.
    pub fn release(&mut self, savepoint: TransactionSavepoint) -> Result<()> {
        self.backend.release_savepoint(savepoint.backend)
    }

    /// Start over on a fresh backend transaction with an empty ledger
    ///
    /// The ledger instance is kept; its content is reset. Relationship ids
    /// handed out by the old backend transaction are handed out again, in
    /// the same order, so re-running the same payloads reproduces them.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if no backend transaction can be opened.
    pub fn restart(&mut self, provider: &dyn BackendProvider) -> Result<()> {
        let ids = self.backend.issued_relationship_ids();
        self.backend = provider.start_transaction(self.mutating)?;
        self.backend.reissue_relationship_ids(ids);
        self.ledger.reset();
        self.deferred.clear();
        Ok(())
    }

    pub fn take_deferred_actions(&mut self) -> Vec<PreCommitAction> {
        std::mem::take(&mut self.deferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_core::backend::MemoryBackend;
    use inventory_core::model::{
        Action, CanonicalPath, Definition, Entity, EntityChange, Notification,
    };

    fn tenant(id: &str) -> Entity {
        Entity::new(CanonicalPath::tenant(id).unwrap(), Definition::Plain)
    }

    #[test]
    fn test_commit_returns_ledger_notifications() {
        let backend = MemoryBackend::new();
        let mut tx = Transaction::begin(&backend, true).unwrap();
        let t = tx.backend_mut().persist(tenant("a")).unwrap();
        tx.ledger_mut()
            .add_notifications(EntityChange::new(t.clone()).with(Notification::entity(Action::Created, t)));
        let notifications = tx.commit().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(backend.commit_count(), 1);
    }

    #[test]
    fn test_deferred_actions_do_not_run_at_commit() {
        let backend = MemoryBackend::new();
        let mut tx = Transaction::begin(&backend, true).unwrap().deferring_actions();
        tx.ledger_mut().add_action(Box::new(|b: &mut dyn Backend| -> Result<Vec<Notification>> {
            b.persist(tenant("late"))?;
            Ok(Vec::new())
        }));
        tx.commit().unwrap();
        assert!(backend.entities().is_empty());
        assert_eq!(tx.take_deferred_actions().len(), 1);
    }

    #[test]
    fn test_rollback_to_savepoint_undoes_writes_and_records() {
        let backend = MemoryBackend::new();
        let mut tx = Transaction::begin(&backend, true).unwrap();
        let a = tx.backend_mut().persist(tenant("a")).unwrap();
        tx.ledger_mut()
            .add_notifications(EntityChange::new(a.clone()).with(Notification::entity(Action::Created, a)));
        let savepoint = tx.savepoint().unwrap().unwrap();

        let b = tx.backend_mut().persist(tenant("b")).unwrap();
        tx.ledger_mut()
            .add_notifications(EntityChange::new(b.clone()).with(Notification::entity(Action::Created, b)));
        tx.rollback_to(savepoint).unwrap();

        assert!(tx.backend().find(&CanonicalPath::tenant("b").unwrap()).unwrap().is_none());
        assert_eq!(tx.commit().unwrap().len(), 1);
        assert_eq!(backend.entities().len(), 1);
    }

    #[test]
    fn test_restart_reuses_relationship_ids() {
        let backend = MemoryBackend::new();
        let mut tx = Transaction::begin(&backend, true).unwrap();
        let relate = |tx: &mut Transaction| {
            let b = tx.backend_mut();
            b.persist(tenant("a")).unwrap();
            let a = CanonicalPath::tenant("a").unwrap();
            b.relate(&a, &a, "owns", Default::default()).unwrap()
        };
        let first = relate(&mut tx);
        tx.rollback().unwrap();
        tx.restart(&backend).unwrap();

        let second = relate(&mut tx);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_preview_reports_without_committing() {
        let backend = MemoryBackend::new();
        let mut tx = Transaction::begin(&backend, true).unwrap();
        let t = tx.backend_mut().persist(tenant("a")).unwrap();
        tx.ledger_mut()
            .add_notifications(EntityChange::new(t.clone()).with(Notification::entity(Action::Created, t)));
        assert_eq!(tx.preview().unwrap().len(), 1);
        assert!(backend.entities().is_empty());
        assert_eq!(backend.commit_count(), 0);
    }

    #[test]
    fn test_restart_clears_ledger() {
        let backend = MemoryBackend::new();
        let mut tx = Transaction::begin(&backend, true).unwrap();
        let t = tx.backend_mut().persist(tenant("a")).unwrap();
        tx.ledger_mut()
            .add_notifications(EntityChange::new(t.clone()).with(Notification::entity(Action::Created, t)));
        tx.rollback().unwrap();
        tx.restart(&backend).unwrap();
        assert!(tx.ledger().is_empty());
        assert!(tx.backend().find(&CanonicalPath::tenant("a").unwrap()).unwrap().is_none());
    }
}
