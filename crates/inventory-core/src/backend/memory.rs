//! In-memory reference backend
//!
//! Each transaction works on a private snapshot of the graph and records the
//! entity paths and relationship ids it wrote, plus the entities whose
//! relationships it read. Commit is first-committer-wins: if any transaction
//! that committed after our snapshot was taken wrote one of the keys we
//! wrote, or one of the entities whose relationships we read, commit fails
//! with `CommitConflict` and nothing is applied. Creating or deleting a
//! relationship also counts as a write to both endpoints, so two
//! transactions racing to attach something to the same entity cannot both
//! succeed, and a closure walked by the rule engine cannot be extended
//! behind its back.
//!
//! Savepoints are full copies of the private snapshot.
//!
//! Test hooks: [`MemoryBackend::fail_next_commits`] injects conflicts and
//! [`MemoryBackend::commit_count`] counts successful physical commits.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use super::query::{Page, Pager, Query};
use super::{Backend, BackendCapabilities, BackendProvider, Savepoint};
use crate::errors::{InventoryError, Result};
use crate::model::{CanonicalPath, Direction, Entity, EntityUpdate, Properties, Relationship};

#[derive(Debug, Clone, Default, PartialEq)]
struct Graph {
    entities: BTreeMap<CanonicalPath, Entity>,
    relationships: BTreeMap<String, Relationship>,
}

#[derive(Debug, Clone, Default)]
struct WriteSet {
    entities: BTreeSet<CanonicalPath>,
    relationships: BTreeSet<String>,
}

impl WriteSet {
    fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    fn touches_any(&self, paths: &BTreeSet<CanonicalPath>) -> bool {
        self.entities.iter().any(|p| paths.contains(p))
    }

    fn intersects(&self, other: &WriteSet) -> bool {
        self.entities.iter().any(|p| other.entities.contains(p))
            || self
                .relationships
                .iter()
                .any(|r| other.relationships.contains(r))
    }
}

#[derive(Debug, Default)]
struct Shared {
    graph: Graph,
    version: u64,
    /// Write sets of commits still relevant to some open transaction
    log: Vec<(u64, WriteSet)>,
    /// Snapshot versions of open transactions, with counts
    open: BTreeMap<u64, usize>,
    commits: u64,
    injected_failures: u32,
}

impl Shared {
    fn release(&mut self, base: u64) {
        if let Some(count) = self.open.get_mut(&base) {
            *count -= 1;
            if *count == 0 {
                self.open.remove(&base);
            }
        }
        match self.open.keys().next().copied() {
            Some(oldest) => self.log.retain(|(version, _)| *version > oldest),
            None => self.log.clear(),
        }
    }
}

/// Thread-safe in-memory graph store
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    shared: Arc<RwLock<Shared>>,
    capabilities: BackendCapabilities,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(RwLock::new(Shared::default())),
            capabilities: BackendCapabilities::default(),
        }
    }

    /// Same store with different advertised capabilities
    pub fn with_capabilities(mut self, capabilities: BackendCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Make the next `n` commits fail with `CommitConflict`
    pub fn fail_next_commits(&self, n: u32) {
        self.shared.write().injected_failures = n;
    }

    /// Number of successful commits of mutating transactions
    pub fn commit_count(&self) -> u64 {
        self.shared.read().commits
    }

    /// Committed entities in path order
    pub fn entities(&self) -> Vec<Entity> {
        self.shared.read().graph.entities.values().cloned().collect()
    }

    /// Committed relationships ordered by (name, source, target)
    pub fn relationships(&self) -> Vec<Relationship> {
        let mut out: Vec<_> = self
            .shared
            .read()
            .graph
            .relationships
            .values()
            .cloned()
            .collect();
        sort_relationships(&mut out);
        out
    }
}

impl BackendProvider for MemoryBackend {
    fn start_transaction(&self, mutating: bool) -> Result<Box<dyn Backend>> {
        let mut shared = self.shared.write();
        let base = shared.version;
        *shared.open.entry(base).or_insert(0) += 1;
        let graph = shared.graph.clone();
        drop(shared);

        tracing::trace!(base_version = base, mutating, "memory transaction started");
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            base,
            state: TxState {
                graph,
                ..TxState::default()
            },
            reads: Mutex::new(BTreeSet::new()),
            savepoints: Vec::new(),
            mutating,
            finished: false,
        }))
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }
}

fn sort_relationships(rels: &mut [Relationship]) {
    rels.sort_by(|a, b| {
        (&a.name, &a.source, &a.target, &a.id).cmp(&(&b.name, &b.source, &b.target, &b.id))
    });
}

/// Private, savepoint-able part of a transaction
#[derive(Debug, Clone, Default)]
struct TxState {
    graph: Graph,
    writes: WriteSet,
    issued: Vec<String>,
    reusable: VecDeque<String>,
}

struct MemoryTransaction {
    shared: Arc<RwLock<Shared>>,
    base: u64,
    state: TxState,
    /// Entities whose relationships were looked at
    reads: Mutex<BTreeSet<CanonicalPath>>,
    savepoints: Vec<TxState>,
    mutating: bool,
    finished: bool,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(InventoryError::Internal {
                message: "backend transaction already finished".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if !self.mutating {
            return Err(InventoryError::Internal {
                message: "write attempted in a read-only transaction".to_string(),
            });
        }
        Ok(())
    }

    fn read_relationships_of(&self, paths: &[&CanonicalPath]) {
        let mut reads = self.reads.lock();
        for path in paths {
            reads.insert((*path).clone());
        }
    }

    fn next_relationship_id(&mut self) -> String {
        let id = self
            .state
            .reusable
            .pop_front()
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
        self.state.issued.push(id.clone());
        id
    }

    fn entity_mut(&mut self, path: &CanonicalPath) -> Result<&mut Entity> {
        self.state.writes.entities.insert(path.clone());
        self.state
            .graph
            .entities
            .get_mut(path)
            .ok_or_else(|| InventoryError::EntityNotFound {
                path: path.to_string(),
            })
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.shared.write().release(self.base);
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.finish();
    }
}

impl Backend for MemoryTransaction {
    fn find(&self, path: &CanonicalPath) -> Result<Option<Entity>> {
        self.ensure_open()?;
        Ok(self.state.graph.entities.get(path).cloned())
    }

    fn find_relationship(
        &self,
        source: &CanonicalPath,
        target: &CanonicalPath,
        name: &str,
    ) -> Result<Option<Relationship>> {
        self.ensure_open()?;
        self.read_relationships_of(&[source, target]);
        Ok(self
            .state.graph
            .relationships
            .values()
            .find(|r| &r.source == source && &r.target == target && r.name == name)
            .cloned())
    }

    fn find_relationship_by_id(&self, id: &str) -> Result<Option<Relationship>> {
        self.ensure_open()?;
        Ok(self.state.graph.relationships.get(id).cloned())
    }

    fn get_relationships(
        &self,
        path: &CanonicalPath,
        direction: Direction,
        names: &[&str],
    ) -> Result<Vec<Relationship>> {
        self.ensure_open()?;
        self.read_relationships_of(&[path]);
        let mut out: Vec<_> = self
            .state.graph
            .relationships
            .values()
            .filter(|r| names.is_empty() || names.contains(&r.name.as_str()))
            .filter(|r| match direction {
                Direction::Outgoing => &r.source == path,
                Direction::Incoming => &r.target == path,
                Direction::Both => r.touches(path),
            })
            .cloned()
            .collect();
        sort_relationships(&mut out);
        Ok(out)
    }

    fn query(&self, query: &Query, pager: &Pager) -> Result<Page<Entity>> {
        self.ensure_open()?;
        let mut matched = Vec::new();
        for entity in self.state.graph.entities.values() {
            if !query.matches_entity(entity) {
                continue;
            }
            if let Some(related) = &query.related {
                let hit = self.state.graph.relationships.values().any(|r| {
                    r.name == related.name
                        && match related.direction {
                            Direction::Outgoing => {
                                r.source == entity.path && r.target == related.other
                            }
                            Direction::Incoming => {
                                r.target == entity.path && r.source == related.other
                            }
                            Direction::Both => {
                                r.touches(&entity.path) && r.touches(&related.other)
                            }
                        }
                });
                if !hit {
                    continue;
                }
            }
            matched.push(entity.clone());
        }
        Ok(pager.apply(matched))
    }

    fn persist(&mut self, entity: Entity) -> Result<Entity> {
        self.ensure_writable()?;
        if self.state.graph.entities.contains_key(&entity.path) {
            return Err(InventoryError::EntityAlreadyExists {
                path: entity.path.to_string(),
            });
        }
        self.state.writes.entities.insert(entity.path.clone());
        self.state.graph
            .entities
            .insert(entity.path.clone(), entity.clone());
        Ok(entity)
    }

    fn relate(
        &mut self,
        source: &CanonicalPath,
        target: &CanonicalPath,
        name: &str,
        properties: Properties,
    ) -> Result<Relationship> {
        self.ensure_writable()?;
        for endpoint in [source, target] {
            if !self.state.graph.entities.contains_key(endpoint) {
                return Err(InventoryError::EntityNotFound {
                    path: endpoint.to_string(),
                });
            }
        }
        if self.find_relationship(source, target, name)?.is_some() {
            return Err(InventoryError::RelationshipAlreadyExists {
                relationship: format!("{} -[{}]-> {}", source, name, target),
            });
        }

        let rel = Relationship::new(
            self.next_relationship_id(),
            name,
            source.clone(),
            target.clone(),
            properties,
        );
        self.state.writes.relationships.insert(rel.id.clone());
        self.state.writes.entities.insert(source.clone());
        self.state.writes.entities.insert(target.clone());
        self.state.graph.relationships.insert(rel.id.clone(), rel.clone());
        Ok(rel)
    }

    fn update(&mut self, path: &CanonicalPath, update: &EntityUpdate) -> Result<Entity> {
        self.ensure_writable()?;
        let entity = self.entity_mut(path)?;
        let updated = update.apply_to(entity)?;
        *entity = updated.clone();
        Ok(updated)
    }

    fn update_relationship(&mut self, id: &str, properties: Properties) -> Result<Relationship> {
        self.ensure_writable()?;
        self.state.writes.relationships.insert(id.to_string());
        let rel = self.state.graph.relationships.get_mut(id).ok_or_else(|| {
            InventoryError::RelationshipNotFound {
                relationship: id.to_string(),
            }
        })?;
        rel.properties = properties;
        Ok(rel.clone())
    }

    fn update_identity_hash(&mut self, path: &CanonicalPath, hash: &str) -> Result<Entity> {
        self.ensure_writable()?;
        let entity = self.entity_mut(path)?;
        entity.identity_hash = Some(hash.to_string());
        Ok(entity.clone())
    }

    fn delete(&mut self, path: &CanonicalPath) -> Result<()> {
        self.ensure_writable()?;
        if self.state.graph.entities.remove(path).is_none() {
            return Err(InventoryError::EntityNotFound {
                path: path.to_string(),
            });
        }
        self.state.writes.entities.insert(path.clone());

        let incident: Vec<Relationship> = self
            .state.graph
            .relationships
            .values()
            .filter(|r| r.touches(path))
            .cloned()
            .collect();
        for rel in incident {
            self.state.graph.relationships.remove(&rel.id);
            self.state.writes.relationships.insert(rel.id.clone());
            self.state.writes.entities.insert(rel.source);
            self.state.writes.entities.insert(rel.target);
        }
        Ok(())
    }

    fn delete_relationship(&mut self, id: &str) -> Result<()> {
        self.ensure_writable()?;
        let rel = self.state.graph.relationships.remove(id).ok_or_else(|| {
            InventoryError::RelationshipNotFound {
                relationship: id.to_string(),
            }
        })?;
        self.state.writes.relationships.insert(rel.id);
        self.state.writes.entities.insert(rel.source);
        self.state.writes.entities.insert(rel.target);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.mutating {
            self.finish();
            return Ok(());
        }

        let mut shared = self.shared.write();

        if shared.injected_failures > 0 {
            shared.injected_failures -= 1;
            drop(shared);
            self.finish();
            return Err(InventoryError::CommitConflict {
                message: "injected commit failure".to_string(),
            });
        }

        let reads = std::mem::take(&mut *self.reads.lock());
        let conflict = shared
            .log
            .iter()
            .filter(|(version, _)| *version > self.base)
            .find_map(|(version, writes)| {
                if writes.intersects(&self.state.writes) {
                    Some((*version, "writes"))
                } else if writes.touches_any(&reads) {
                    Some((*version, "reads"))
                } else {
                    None
                }
            });
        if let Some((version, overlap)) = conflict {
            drop(shared);
            self.finish();
            return Err(InventoryError::CommitConflict {
                message: format!(
                    "{} of snapshot {} overlap writes committed at version {}",
                    overlap, self.base, version
                ),
            });
        }

        for path in &self.state.writes.entities {
            match self.state.graph.entities.get(path) {
                Some(entity) => {
                    shared.graph.entities.insert(path.clone(), entity.clone());
                }
                None => {
                    shared.graph.entities.remove(path);
                }
            }
        }
        for id in &self.state.writes.relationships {
            match self.state.graph.relationships.get(id) {
                Some(rel) => {
                    shared.graph.relationships.insert(id.clone(), rel.clone());
                }
                None => {
                    shared.graph.relationships.remove(id);
                }
            }
        }

        shared.version += 1;
        shared.commits += 1;
        if !self.state.writes.is_empty() {
            let version = shared.version;
            shared
                .log
                .push((version, std::mem::take(&mut self.state.writes)));
        }
        tracing::trace!(version = shared.version, "memory transaction committed");
        drop(shared);
        self.finish();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.state.writes = WriteSet::default();
        self.savepoints.clear();
        self.finish();
        Ok(())
    }

    fn savepoint(&mut self) -> Result<Option<Savepoint>> {
        self.ensure_open()?;
        self.savepoints.push(self.state.clone());
        Ok(Some(Savepoint(self.savepoints.len() - 1)))
    }

    fn rollback_to_savepoint(&mut self, savepoint: Savepoint) -> Result<()> {
        self.ensure_open()?;
        if savepoint.0 >= self.savepoints.len() {
            return Err(InventoryError::Internal {
                message: format!("unknown savepoint {}", savepoint.0),
            });
        }
        self.savepoints.truncate(savepoint.0 + 1);
        if let Some(state) = self.savepoints.pop() {
            self.state = state;
        }
        Ok(())
    }

    fn release_savepoint(&mut self, savepoint: Savepoint) -> Result<()> {
        self.savepoints.truncate(savepoint.0);
        Ok(())
    }

    fn issued_relationship_ids(&self) -> Vec<String> {
        self.state
            .issued
            .iter()
            .chain(self.state.reusable.iter())
            .cloned()
            .collect()
    }

    fn reissue_relationship_ids(&mut self, ids: Vec<String>) {
        self.state.reusable = ids.into();
    }
}
