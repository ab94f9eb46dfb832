//! Transaction frames: several operations, one notification batch
//!
//! A frame batches operations so their notifications are delivered
//! together, once, when the frame commits. How the operations map onto
//! backend transactions depends on what the backend prefers:
//!
//! - **single**: one backend transaction for the whole frame. Every
//!   operation runs behind a savepoint and a failed one is rolled back to
//!   it, so it leaves no trace. Backends without savepoints throw the
//!   transaction away and replay the recorded operations on a fresh one. A
//!   commit conflict replays the whole frame. Replays reuse the
//!   relationship ids of the first run.
//! - **many**: every operation commits on its own (with retries) right
//!   away. Explicit pre-commit actions and notification delivery wait for
//!   the frame commit, which runs the actions in one last housekeeping
//!   transaction.

use std::sync::Arc;
use std::time::Instant;

use inventory_core::backend::BackendProvider;
use inventory_core::errors::{InventoryError, Result};
use inventory_core::ledger::PreCommitAction;
use inventory_core::model::Notification;
use inventory_core::{log_op_end, log_op_error, log_op_retry, log_op_start};
use inventory_core_types::FrameId;

use crate::config::TransactionConfig;
use crate::notify::NotificationSink;
use crate::retry::RetryDriver;
use crate::transaction::Transaction;

/// A recorded operation, re-runnable on a fresh transaction
type Replay = Box<dyn FnMut(&mut Transaction) -> Result<()> + Send>;

enum Strategy {
    Single {
        tx: Transaction,
        recorded: Vec<Replay>,
    },
    Many {
        notifications: Vec<Notification>,
        actions: Vec<PreCommitAction>,
    },
}

pub struct TransactionFrame {
    id: FrameId,
    provider: Arc<dyn BackendProvider>,
    config: TransactionConfig,
    sink: Arc<dyn NotificationSink>,
    strategy: Strategy,
    operations: usize,
    /// Set when a failed operation could not be undone
    poisoned: Option<String>,
}

impl std::fmt::Debug for TransactionFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionFrame")
            .field("id", &self.id)
            .field("single_transaction", &self.is_single_transaction())
            .field("operations", &self.operations)
            .finish()
    }
}

impl TransactionFrame {
    /// Open a frame, picking the strategy the backend asks for
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the shared backend transaction of a
    /// single-transaction frame cannot be opened.
    pub fn begin(
        provider: Arc<dyn BackendProvider>,
        config: TransactionConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let strategy = if provider.capabilities().single_transaction_frames {
            Strategy::Single {
                tx: Transaction::begin(provider.as_ref(), true)?,
                recorded: Vec::new(),
            }
        } else {
            Strategy::Many {
                notifications: Vec::new(),
                actions: Vec::new(),
            }
        };
        let id = FrameId::new();
        tracing::debug!(frame_id = %id, "transaction frame opened");
        Ok(Self {
            id,
            provider,
            config,
            sink,
            strategy,
            operations: 0,
            poisoned: None,
        })
    }

    pub fn id(&self) -> &FrameId {
        &self.id
    }

    pub fn is_single_transaction(&self) -> bool {
        matches!(self.strategy, Strategy::Single { .. })
    }

    /// Number of operations that succeeded in this frame so far
    pub fn operations(&self) -> usize {
        self.operations
    }

    /// Run one operation inside the frame
    ///
    /// # Errors
    ///
    /// Returns the operation's error. A failed operation has no effect on
    /// the frame. If its effects cannot be undone the frame is poisoned:
    /// later operations and the commit fail with `InconsistentState`.
    pub fn run<R, F>(&mut self, mut payload: F) -> Result<R>
    where
        R: 'static,
        F: FnMut(&mut Transaction) -> Result<R> + Send + 'static,
    {
        self.ensure_usable()?;
        let value = match &mut self.strategy {
            Strategy::Single { tx, recorded } => {
                let savepoint = tx.savepoint()?;
                match payload(tx) {
                    Ok(value) => {
                        if let Some(savepoint) = savepoint {
                            tx.release(savepoint)?;
                        }
                        recorded.push(Box::new(move |tx: &mut Transaction| payload(tx).map(|_| ())));
                        value
                    }
                    Err(err) => {
                        let undone = match savepoint {
                            Some(savepoint) => {
                                tracing::debug!(frame_id = %self.id, error = %err, "operation failed, back to savepoint");
                                tx.rollback_to(savepoint)
                            }
                            None => {
                                tracing::debug!(frame_id = %self.id, error = %err, "operation failed, rebuilding frame");
                                abandon(self.provider.as_ref(), tx);
                                tx.restart(self.provider.as_ref())
                                    .and_then(|()| replay(tx, recorded))
                            }
                        };
                        if let Err(undo_err) = undone {
                            tracing::error!(
                                frame_id = %self.id,
                                error = %err,
                                undo_error = %undo_err,
                                "failed operation could not be undone, frame poisoned"
                            );
                            self.poisoned = Some(undo_err.to_string());
                        }
                        return Err(err);
                    }
                }
            }
            Strategy::Many {
                notifications,
                actions,
            } => {
                let driver = RetryDriver::new(self.provider.clone(), self.config.clone())
                    .for_op("frame_operation");
                let mut tx = Transaction::begin(self.provider.as_ref(), true)?.deferring_actions();
                let committed = driver.run_in(&mut tx, payload)?;
                notifications.extend(committed.notifications);
                actions.extend(tx.take_deferred_actions());
                committed.value
            }
        };
        self.operations += 1;
        Ok(value)
    }

    fn ensure_usable(&self) -> Result<()> {
        match &self.poisoned {
            Some(reason) => Err(InventoryError::InconsistentState {
                message: format!("transaction frame {} is poisoned: {}", self.id, reason),
            }),
            None => Ok(()),
        }
    }

    /// Finish the frame and deliver its notifications
    ///
    /// Returns the delivered notifications.
    ///
    /// # Errors
    ///
    /// Returns `TransactionFailed` once the retry budget is spent, or the
    /// first non-retryable error of the commit (or of a replay), and
    /// `InconsistentState` for a poisoned frame.
    pub fn commit(self) -> Result<Vec<Notification>> {
        let started = Instant::now();
        log_op_start!("frame_commit", frame_id = %self.id, operations = self.operations);
        let usable = self.ensure_usable();

        let TransactionFrame {
            id,
            provider,
            config,
            sink,
            strategy,
            ..
        } = self;

        let outcome = match (usable, strategy) {
            (Err(err), _) => Err(err),
            (Ok(()), Strategy::Single { tx, recorded }) => {
                commit_single(provider.as_ref(), &config, tx, recorded)
            }
            (
                Ok(()),
                Strategy::Many {
                    notifications,
                    actions,
                },
            ) => housekeeping(provider, config, actions).map(|extra| {
                let mut all = notifications;
                all.extend(extra);
                all
            }),
        };

        match outcome {
            Ok(notifications) => {
                sink.deliver(&notifications);
                log_op_end!(
                    "frame_commit",
                    duration_ms = started.elapsed().as_millis() as u64,
                    frame_id = %id,
                    notification_count = notifications.len()
                );
                Ok(notifications)
            }
            Err(err) => {
                log_op_error!(
                    "frame_commit",
                    err.clone(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    frame_id = %id
                );
                Err(err)
            }
        }
    }

    /// Abandon the frame
    ///
    /// A single-transaction frame discards all of its work. Whether it still
    /// delivers depends on the backend: when work inside a transaction
    /// survives rollback, the recorded operations are re-run on a
    /// throwaway transaction to rebuild their notifications, which are then
    /// delivered. Otherwise nothing is delivered. In a many-transaction
    /// frame the operations are already committed, so this behaves like
    /// [`TransactionFrame::commit`].
    ///
    /// # Errors
    ///
    /// Returns the backend's rollback error, the error of a re-run
    /// operation, or the commit error of a many-transaction frame.
    pub fn rollback(mut self) -> Result<()> {
        if let Strategy::Single { tx, recorded } = &mut self.strategy {
            tracing::debug!(frame_id = %self.id, operations = self.operations, "frame rolled back");
            tx.rollback()?;
            if !self.provider.capabilities().persists_intermediate_work {
                return Ok(());
            }
            tx.restart(self.provider.as_ref())?;
            replay(tx, recorded)?;
            let notifications = tx.preview()?;
            tracing::debug!(
                frame_id = %self.id,
                notification_count = notifications.len(),
                "delivering rebuilt notifications of rolled back frame"
            );
            self.sink.deliver(&notifications);
            return Ok(());
        }
        self.commit().map(|_| ())
    }
}

fn abandon(provider: &dyn BackendProvider, tx: &mut Transaction) {
    if provider.capabilities().rollback_required_after_failure {
        if let Err(e) = tx.rollback() {
            tracing::warn!(error = %e, "rollback of frame transaction failed");
        }
    }
}

fn replay(tx: &mut Transaction, recorded: &mut [Replay]) -> Result<()> {
    for operation in recorded.iter_mut() {
        operation(tx)?;
    }
    Ok(())
}

fn commit_single(
    provider: &dyn BackendProvider,
    config: &TransactionConfig,
    mut tx: Transaction,
    mut recorded: Vec<Replay>,
) -> Result<Vec<Notification>> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let err = match tx.commit() {
            Ok(notifications) => return Ok(notifications),
            Err(err) => err,
        };

        abandon(provider, &mut tx);
        if !err.is_retryable() {
            return Err(err);
        }
        if attempt > config.retries {
            return Err(InventoryError::TransactionFailed {
                attempts: attempt,
                cause: Box::new(err),
            });
        }

        let wait = config.backoff(attempt - 1);
        log_op_retry!(
            "frame_commit",
            &err,
            attempt = attempt,
            wait_ms = wait.as_millis() as u64,
            replayed = recorded.len()
        );
        std::thread::sleep(wait);
        tx.restart(provider)?;
        if let Err(replay_err) = replay(&mut tx, &mut recorded) {
            tracing::warn!(error = %replay_err, conflict = %err, "frame replay after commit conflict failed");
            return Err(replay_err);
        }
    }
}

/// Run the deferred actions of a many-transaction frame
fn housekeeping(
    provider: Arc<dyn BackendProvider>,
    config: TransactionConfig,
    mut actions: Vec<PreCommitAction>,
) -> Result<Vec<Notification>> {
    if actions.is_empty() {
        return Ok(Vec::new());
    }
    tracing::debug!(actions = actions.len(), "running deferred frame actions");
    let driver = RetryDriver::new(provider, config).for_op("frame_housekeeping");
    let committed = driver.run(|tx| {
        let mut produced = Vec::new();
        for action in actions.iter_mut() {
            produced.extend(action(tx.backend_mut())?);
        }
        tx.ledger_mut().add_pass_through(produced);
        Ok(())
    })?;
    Ok(committed.notifications)
}
