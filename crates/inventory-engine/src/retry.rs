//! Retry driver
//!
//! Runs a payload and commits; when the commit (or the payload) fails with a
//! retryable backend conflict, the transaction is rolled back if the backend
//! asks for it, the ledger is reset, the driver sleeps for the configured
//! backoff and the payload runs again from scratch on a fresh backend
//! transaction. Any other error is returned as is. Running out of retries
//! yields `TransactionFailed` carrying the attempt count and the last cause.

use std::sync::Arc;

use inventory_core::backend::BackendProvider;
use inventory_core::errors::{InventoryError, Result};
use inventory_core::log_op_retry;
use inventory_core::model::Notification;
use inventory_core_types::RequestId;

use crate::config::TransactionConfig;
use crate::transaction::Transaction;

/// Result of a successfully committed payload
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<R> {
    pub value: R,
    pub notifications: Vec<Notification>,
    /// Number of attempts it took, starting at 1
    pub attempts: u32,
}

#[derive(Clone)]
pub struct RetryDriver {
    provider: Arc<dyn BackendProvider>,
    config: TransactionConfig,
    op: &'static str,
    request_id: Option<RequestId>,
}

impl RetryDriver {
    pub fn new(provider: Arc<dyn BackendProvider>, config: TransactionConfig) -> Self {
        Self {
            provider,
            config,
            op: "transaction",
            request_id: None,
        }
    }

    /// Name retry events after `op`
    pub fn for_op(mut self, op: &'static str) -> Self {
        self.op = op;
        self
    }

    /// Tag retry events with the request they belong to
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    pub fn provider(&self) -> &dyn BackendProvider {
        self.provider.as_ref()
    }

    /// Run `payload` in a new mutating transaction
    ///
    /// # Errors
    ///
    /// Returns the payload's non-retryable error, or `TransactionFailed`
    /// once the retry budget is spent.
    pub fn run<R, F>(&self, payload: F) -> Result<Committed<R>>
    where
        F: FnMut(&mut Transaction) -> Result<R>,
    {
        let mut tx = Transaction::begin(self.provider.as_ref(), true)?;
        self.run_in(&mut tx, payload)
    }

    /// Run `payload` in `tx`, restarting `tx` on retryable failures
    ///
    /// # Errors
    ///
    /// Returns the payload's non-retryable error, or `TransactionFailed`
    /// once the retry budget is spent.
    pub fn run_in<R, F>(&self, tx: &mut Transaction, mut payload: F) -> Result<Committed<R>>
    where
        F: FnMut(&mut Transaction) -> Result<R>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = payload(tx).and_then(|value| tx.commit().map(|n| (value, n)));

            let err = match outcome {
                Ok((value, notifications)) => {
                    if attempt > 1 {
                        tracing::debug!(attempts = attempt, "transaction committed after retry");
                    }
                    return Ok(Committed {
                        value,
                        notifications,
                        attempts: attempt,
                    });
                }
                Err(err) => err,
            };

            self.abandon(tx);

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt > self.config.retries {
                tracing::warn!(op = self.op, attempts = attempt, error = %err, "retry budget exhausted");
                return Err(InventoryError::TransactionFailed {
                    attempts: attempt,
                    cause: Box::new(err),
                });
            }

            let wait = self.config.backoff(attempt - 1);
            log_op_retry!(
                self.op,
                &err,
                attempt = attempt,
                wait_ms = wait.as_millis() as u64,
                request_id = self.request_id.as_ref().map(RequestId::as_str)
            );
            std::thread::sleep(wait);
            tx.restart(self.provider.as_ref())?;
        }
    }

    /// Release a failed attempt's backend transaction
    pub(crate) fn abandon(&self, tx: &mut Transaction) {
        if self.provider.capabilities().rollback_required_after_failure {
            if let Err(e) = tx.rollback() {
                tracing::warn!(error = %e, "rollback after failed attempt failed");
            }
        }
    }
}
