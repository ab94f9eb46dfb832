use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::backend::Backend;
use crate::errors::{InventoryError, Result};
use crate::model::{CanonicalPath, Direction, Entity, PathSegment, WellKnown};

/// Freshly computed identity hashes of a containment subtree
///
/// Each node carries the entity as currently stored (including its stored,
/// possibly stale, hash) next to the recomputed `hash`. Children are sorted
/// by path segment.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityHashTree {
    pub entity: Entity,
    pub hash: String,
    pub children: Vec<IdentityHashTree>,
}

impl IdentityHashTree {
    /// Recompute the hashes of `root` and everything it contains
    ///
    /// # Errors
    ///
    /// Returns `InvalidBlueprint` if `root` is not of a hashable kind, or a
    /// backend error.
    pub fn compute(backend: &dyn Backend, root: &Entity) -> Result<Self> {
        if !root.kind().is_hashable() {
            return Err(InventoryError::InvalidBlueprint {
                kind: root.kind().to_string(),
                reason: "entities of this kind carry no identity hash".to_string(),
            });
        }

        // breadth first, so every parent precedes its children
        let closure = backend.transitive_closure(
            &root.path,
            Direction::Outgoing,
            &[WellKnown::Contains.as_str()],
        )?;

        let mut children_of: HashMap<CanonicalPath, Vec<IdentityHashTree>> = HashMap::new();
        for entity in closure.into_iter().rev() {
            if !root.path.is_ancestor_of(&entity.path) {
                continue;
            }
            let children = children_of.remove(&entity.path).unwrap_or_default();
            let node = Self::node(entity, children)?;
            if let Some(parent) = node.entity.path.parent() {
                children_of.entry(parent).or_default().push(node);
            }
        }

        let children = children_of.remove(&root.path).unwrap_or_default();
        Self::node(root.clone(), children)
    }

    fn node(entity: Entity, mut children: Vec<IdentityHashTree>) -> Result<Self> {
        children.sort_by(|a, b| a.segment().cmp(b.segment()));
        let hash = compute_hash(&entity, &children)?;
        Ok(Self {
            entity,
            hash,
            children,
        })
    }

    pub fn path(&self) -> &CanonicalPath {
        &self.entity.path
    }

    pub fn segment(&self) -> &PathSegment {
        self.entity.path.segment()
    }

    /// Whether the stored hash differs from the recomputed one
    pub fn is_stale(&self) -> bool {
        self.entity.identity_hash.as_deref() != Some(self.hash.as_str())
    }

    /// Find the node for `path` in this tree
    pub fn find(&self, path: &CanonicalPath) -> Option<&IdentityHashTree> {
        if self.path() == path {
            return Some(self);
        }
        if !self.path().is_ancestor_of(path) {
            return None;
        }
        self.children.iter().find_map(|c| c.find(path))
    }
}

/// Hash of `entity` given its already hashed, segment-sorted children
///
/// # Errors
///
/// Returns `Serialization` if the canonical form cannot be encoded.
pub fn compute_hash(entity: &Entity, children: &[IdentityHashTree]) -> Result<String> {
    let children: Vec<_> = children
        .iter()
        .map(|c| json!([c.segment().to_string(), c.hash]))
        .collect();
    let canonical = serde_json::to_string(&json!({
        "kind": entity.kind().code(),
        "defining": entity.definition.hashed_fields(),
        "children": children,
    }))?;
    Ok(hash_string(&canonical))
}

fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendProvider, MemoryBackend};
    use crate::model::{Definition, EntityKind, MetricDataType, Properties};

    fn metric_type(path: CanonicalPath, unit: &str) -> Entity {
        Entity::new(
            path,
            Definition::MetricType {
                unit: unit.into(),
                data_type: MetricDataType::Gauge,
                collection_interval: None,
            },
        )
    }

    #[test]
    fn test_hash_is_hex_sha256_and_ignores_own_id() {
        let a = metric_type(CanonicalPath::parse("/t;x/mt;a").unwrap(), "ms");
        let b = metric_type(CanonicalPath::parse("/t;y/f;feed/mt;b").unwrap(), "ms");
        let ha = compute_hash(&a, &[]).unwrap();
        assert_eq!(ha.len(), 64);
        assert_eq!(ha, compute_hash(&b, &[]).unwrap());
    }

    #[test]
    fn test_defining_fields_change_the_hash() {
        let a = metric_type(CanonicalPath::parse("/t;x/mt;a").unwrap(), "ms");
        let b = metric_type(CanonicalPath::parse("/t;x/mt;a").unwrap(), "s");
        assert_ne!(compute_hash(&a, &[]).unwrap(), compute_hash(&b, &[]).unwrap());
    }

    #[test]
    fn test_tree_covers_contained_children() {
        let backend = MemoryBackend::new();
        let mut tx = backend.start_transaction(true).unwrap();
        let t = CanonicalPath::tenant("t").unwrap();
        let rt = t.extend(EntityKind::ResourceType, "host").unwrap();
        let ot = rt.extend(EntityKind::OperationType, "restart").unwrap();
        tx.persist(Entity::new(t.clone(), Definition::Plain)).unwrap();
        let rt_entity = tx.persist(Entity::new(rt.clone(), Definition::Plain)).unwrap();
        tx.persist(Entity::new(ot.clone(), Definition::Plain)).unwrap();
        tx.relate(&t, &rt, "contains", Properties::new()).unwrap();
        tx.relate(&rt, &ot, "contains", Properties::new()).unwrap();

        let tree = IdentityHashTree::compute(tx.as_ref(), &rt_entity).unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].path(), &ot);
        assert!(tree.is_stale());
        assert!(tree.find(&ot).is_some());
        assert!(tree.find(&t).is_none());

        let leaf_only = compute_hash(&rt_entity, &[]).unwrap();
        assert_ne!(tree.hash, leaf_only);
    }

    #[test]
    fn test_non_hashable_root_is_rejected() {
        let backend = MemoryBackend::new();
        let tx = backend.start_transaction(false).unwrap();
        let tenant = Entity::new(CanonicalPath::tenant("t").unwrap(), Definition::Plain);
        assert!(IdentityHashTree::compute(tx.as_ref(), &tenant).is_err());
    }
}
