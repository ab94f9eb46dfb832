use serde::{Deserialize, Serialize};

use crate::model::{CanonicalPath, Direction, Entity, EntityKind};

/// Relationship constraint of a [`Query`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedFilter {
    pub name: String,
    /// Direction as seen from the candidate entity
    pub direction: Direction,
    pub other: CanonicalPath,
}

/// Entity filter executed by a backend
///
/// All set criteria must hold. An empty query matches every entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    pub kind: Option<EntityKind>,
    /// Only entities strictly below this path
    pub under: Option<CanonicalPath>,
    pub related: Option<RelatedFilter>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn under(mut self, root: CanonicalPath) -> Self {
        self.under = Some(root);
        self
    }

    pub fn related(
        mut self,
        name: impl Into<String>,
        direction: Direction,
        other: CanonicalPath,
    ) -> Self {
        self.related = Some(RelatedFilter {
            name: name.into(),
            direction,
            other,
        });
        self
    }

    /// Check the criteria that only need the entity itself
    pub fn matches_entity(&self, entity: &Entity) -> bool {
        if let Some(kind) = self.kind {
            if entity.kind() != kind {
                return false;
            }
        }
        if let Some(root) = &self.under {
            if !root.is_ancestor_of(&entity.path) {
                return false;
            }
        }
        true
    }
}

/// Paging window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pager {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Pager {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    /// Cut one page out of the full, already ordered result
    pub fn apply<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let iter = items.into_iter().skip(self.offset);
        let items = match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        };
        Page { items, total }
    }
}

/// One page of results plus the size of the full result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
