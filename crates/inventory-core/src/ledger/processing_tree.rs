use std::collections::{BTreeMap, HashMap};

use crate::model::{Action, CanonicalPath, Entity, EntityChange, Notification, PathSegment};

/// Index of a node in the [`ProcessingTree`] arena
pub type NodeId = usize;

/// One path segment of the processing tree
#[derive(Debug, Clone)]
pub struct Node {
    pub segment: PathSegment,
    pub path: CanonicalPath,
    pub parent: Option<NodeId>,
    pub children: BTreeMap<PathSegment, NodeId>,
    /// Last recorded state, `None` for nodes only present as ancestors
    pub entity: Option<Entity>,
    pub notifications: Vec<Notification>,
}

impl Node {
    /// Whether a change of this very entity was recorded
    pub fn is_changed(&self) -> bool {
        self.entity.is_some()
    }

    /// Whether the last recorded create or delete of this entity was a delete
    ///
    /// An entity deleted and then created again at the same path is alive.
    pub fn is_deleted(&self) -> bool {
        self.notifications
            .iter()
            .rev()
            .filter(|n| n.entity_path() == Some(&self.path))
            .find(|n| n.is_entity_action(Action::Created) || n.is_entity_action(Action::Deleted))
            .is_some_and(|n| n.is_entity_action(Action::Deleted))
    }

    /// Whether an explicit `action` notification about this entity was recorded
    pub fn has_own(&self, action: Action) -> bool {
        self.notifications
            .iter()
            .any(|n| n.is_entity_action(action) && n.entity_path() == Some(&self.path))
    }
}

/// Containment-shaped index of everything changed in one transaction
///
/// Nodes live in an arena and refer to each other by index. Ancestors of a
/// recorded path are created on demand, so every recorded path hangs below
/// a tenant root.
#[derive(Debug, Clone, Default)]
pub struct ProcessingTree {
    nodes: Vec<Node>,
    index: HashMap<String, NodeId>,
    roots: BTreeMap<PathSegment, NodeId>,
}

impl ProcessingTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.roots.clear();
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn lookup(&self, path: &CanonicalPath) -> Option<NodeId> {
        self.index.get(&path.to_string()).copied()
    }

    /// Tenant-level nodes in segment order
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.values().copied()
    }

    /// Record a change, creating the node and its ancestors as needed
    pub fn record(&mut self, change: EntityChange) -> NodeId {
        let id = self.ensure(&change.entity.path);
        let node = &mut self.nodes[id];
        node.entity = Some(change.entity);
        node.notifications.extend(change.notifications);
        id
    }

    fn ensure(&mut self, path: &CanonicalPath) -> NodeId {
        if let Some(id) = self.lookup(path) {
            return id;
        }
        let parent = path.parent().map(|p| self.ensure(&p));
        let id = self.nodes.len();
        let segment = path.segment().clone();
        self.nodes.push(Node {
            segment: segment.clone(),
            path: path.clone(),
            parent,
            children: BTreeMap::new(),
            entity: None,
            notifications: Vec::new(),
        });
        self.index.insert(path.to_string(), id);
        match parent {
            Some(p) => {
                self.nodes[p].children.insert(segment, id);
            }
            None => {
                self.roots.insert(segment, id);
            }
        }
        id
    }

    /// Topmost hashable nodes, depth first in segment order
    ///
    /// Hashable kinds only contain hashable kinds, so these nodes are the
    /// roots of the disjoint changed subtrees whose hashes need fixing.
    pub fn change_roots(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.roots.values().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.segment.kind().is_hashable() {
                out.push(id);
            } else {
                stack.extend(node.children.values().rev().copied());
            }
        }
        out
    }

    /// Notifications of `id` and all its descendants, pre-order
    pub fn subtree_notifications(&self, id: NodeId) -> Vec<Notification> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            out.extend(node.notifications.iter().cloned());
            stack.extend(node.children.values().rev().copied());
        }
        out
    }
}
