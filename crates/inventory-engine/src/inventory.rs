//! Inventory facade
//!
//! [`Inventory`] runs every write as its own logical operation: a fresh
//! transaction driven by the retry driver, notifications delivered to the
//! sink after commit. [`Inventory::frame`] opens a [`TransactionFrame`] for
//! batching. Both expose the same write surface through [`Mutations`].

use std::sync::Arc;
use std::time::Instant;

use inventory_core::backend::{Backend, BackendProvider, Page, Pager, Query};
use inventory_core::errors::Result;
use inventory_core::model::{
    Blueprint, CanonicalPath, Direction, Entity, EntityUpdate, Properties, Relationship,
};
use inventory_core::{log_op_end, log_op_error, log_op_start};
use inventory_core_types::RequestId;

use crate::commands;
use crate::config::InventoryConfig;
use crate::frame::TransactionFrame;
use crate::notify::{NotificationSink, TracingSink};
use crate::retry::RetryDriver;
use crate::transaction::Transaction;

/// Write operations shared by [`Inventory`] and [`TransactionFrame`]
///
/// Implementors only provide [`Mutations::run`]; every operation is a
/// payload over a [`Transaction`].
pub trait Mutations {
    /// Run `payload` as one operation named `op`
    ///
    /// # Errors
    ///
    /// Returns the payload's error or the transaction layer's.
    fn run<R, F>(&mut self, op: &'static str, payload: F) -> Result<R>
    where
        R: 'static,
        F: FnMut(&mut Transaction) -> Result<R> + Send + 'static;

    /// Create a tenant (`parent = None`) or an entity under `parent`
    ///
    /// # Errors
    ///
    /// See [`commands::create`].
    fn create(&mut self, parent: Option<&CanonicalPath>, blueprint: Blueprint) -> Result<Entity> {
        let parent = parent.cloned();
        self.run("create", move |tx| {
            commands::create(tx, parent.as_ref(), &blueprint)
        })
    }

    /// # Errors
    ///
    /// See [`commands::update`].
    fn update(&mut self, path: &CanonicalPath, update: EntityUpdate) -> Result<Entity> {
        let path = path.clone();
        self.run("update", move |tx| commands::update(tx, &path, &update))
    }

    /// # Errors
    ///
    /// See [`commands::delete`].
    fn delete(&mut self, path: &CanonicalPath) -> Result<()> {
        let path = path.clone();
        self.run("delete", move |tx| commands::delete(tx, &path))
    }

    /// # Errors
    ///
    /// See [`commands::associate`].
    fn associate(
        &mut self,
        origin: &CanonicalPath,
        direction: Direction,
        name: &str,
        target: &str,
    ) -> Result<Relationship> {
        let (origin, name, target) = (origin.clone(), name.to_string(), target.to_string());
        self.run("associate", move |tx| {
            commands::associate(tx, &origin, direction, &name, &target)
        })
    }

    /// # Errors
    ///
    /// See [`commands::disassociate`].
    fn disassociate(
        &mut self,
        origin: &CanonicalPath,
        direction: Direction,
        name: &str,
        target: &str,
    ) -> Result<Relationship> {
        let (origin, name, target) = (origin.clone(), name.to_string(), target.to_string());
        self.run("disassociate", move |tx| {
            commands::disassociate(tx, &origin, direction, &name, &target)
        })
    }

    /// # Errors
    ///
    /// See [`commands::link_with`].
    fn link_with(
        &mut self,
        origin: &CanonicalPath,
        name: &str,
        target: &str,
        properties: Properties,
    ) -> Result<Relationship> {
        let (origin, name, target) = (origin.clone(), name.to_string(), target.to_string());
        self.run("link_with", move |tx| {
            commands::link_with(tx, &origin, &name, &target, properties.clone())
        })
    }

    /// # Errors
    ///
    /// See [`commands::update_relationship`].
    fn update_relationship(&mut self, id: &str, properties: Properties) -> Result<Relationship> {
        let id = id.to_string();
        self.run("update_relationship", move |tx| {
            commands::update_relationship(tx, &id, properties.clone())
        })
    }

    /// # Errors
    ///
    /// See [`commands::delete_relationship`].
    fn delete_relationship(&mut self, id: &str) -> Result<Relationship> {
        let id = id.to_string();
        self.run("delete_relationship", move |tx| {
            commands::delete_relationship(tx, &id)
        })
    }
}

#[derive(Clone)]
pub struct Inventory {
    provider: Arc<dyn BackendProvider>,
    config: Arc<InventoryConfig>,
    sink: Arc<dyn NotificationSink>,
}

impl Inventory {
    /// Inventory logging delivered notifications
    pub fn new(provider: Arc<dyn BackendProvider>, config: InventoryConfig) -> Self {
        Self {
            provider,
            config: Arc::new(config),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    /// Open a frame batching several operations
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the frame's transaction cannot be opened.
    pub fn frame(&self) -> Result<TransactionFrame> {
        TransactionFrame::begin(
            self.provider.clone(),
            self.config.transaction.clone(),
            self.sink.clone(),
        )
    }

    /// # Errors
    ///
    /// Returns an error only if the backend fails.
    pub fn find(&self, path: &CanonicalPath) -> Result<Option<Entity>> {
        self.read(|backend| backend.find(path))
    }

    /// # Errors
    ///
    /// Returns `EntityNotFound` if the entity does not exist.
    pub fn get(&self, path: &CanonicalPath) -> Result<Entity> {
        self.read(|backend| backend.get(path))
    }

    /// Relationships of `path` in `direction`, optionally restricted by name
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend fails.
    pub fn relationships(
        &self,
        path: &CanonicalPath,
        direction: Direction,
        names: &[&str],
    ) -> Result<Vec<Relationship>> {
        self.read(|backend| backend.get_relationships(path, direction, names))
    }

    /// # Errors
    ///
    /// Returns an error only if the backend fails.
    pub fn query(&self, query: &Query, pager: &Pager) -> Result<Page<Entity>> {
        self.read(|backend| backend.query(query, pager))
    }

    fn read<R>(&self, f: impl FnOnce(&dyn Backend) -> Result<R>) -> Result<R> {
        let mut backend = self.provider.start_transaction(false)?;
        let out = f(backend.as_ref());
        backend.rollback()?;
        out
    }
}

impl Mutations for Inventory {
    fn run<R, F>(&mut self, op: &'static str, payload: F) -> Result<R>
    where
        R: 'static,
        F: FnMut(&mut Transaction) -> Result<R> + Send + 'static,
    {
        let request_id = RequestId::new();
        let started = Instant::now();
        log_op_start!(op, request_id = %request_id);

        let driver = RetryDriver::new(self.provider.clone(), self.config.transaction.clone())
            .for_op(op)
            .with_request_id(request_id.clone());
        match driver.run(payload) {
            Ok(committed) => {
                self.sink.deliver(&committed.notifications);
                log_op_end!(
                    op,
                    duration_ms = started.elapsed().as_millis() as u64,
                    request_id = %request_id,
                    attempts = committed.attempts,
                    notification_count = committed.notifications.len()
                );
                Ok(committed.value)
            }
            Err(err) => {
                log_op_error!(
                    op,
                    err.clone(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    request_id = %request_id
                );
                Err(err)
            }
        }
    }
}

impl Mutations for TransactionFrame {
    fn run<R, F>(&mut self, op: &'static str, payload: F) -> Result<R>
    where
        R: 'static,
        F: FnMut(&mut Transaction) -> Result<R> + Send + 'static,
    {
        tracing::debug!(frame_id = %self.id(), op, "frame operation");
        TransactionFrame::run(self, payload)
    }
}
