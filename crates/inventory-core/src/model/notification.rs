//! Change notifications
//!
//! A notification records one change to one entity or relationship. The
//! pre-commit ledger owns them until commit succeeds and then hands the final
//! list to whoever delivers them.

use serde::{Deserialize, Serialize};

use super::blueprint::EntityUpdate;
use super::entity::Entity;
use super::path::CanonicalPath;
use super::properties::Properties;
use super::relationship::Relationship;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Created,
    Updated,
    Deleted,
    IdentityHashChanged,
}

/// What a notification is about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Subject {
    Entity(Entity),
    Relationship(Relationship),
}

impl Subject {
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Subject::Entity(e) => Some(e),
            Subject::Relationship(_) => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Subject::Relationship(r) => Some(r),
            Subject::Entity(_) => None,
        }
    }
}

/// Extra information attached to a notification
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionContext {
    #[default]
    None,
    /// State before the update plus the update that was applied
    EntityUpdate {
        previous: Box<Entity>,
        update: EntityUpdate,
    },
    RelationshipUpdate {
        previous: Box<Relationship>,
        properties: Properties,
    },
    IdentityHash { previous: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub action: Action,
    pub subject: Subject,
    pub context: ActionContext,
}

impl Notification {
    pub fn entity(action: Action, entity: Entity) -> Self {
        Self {
            action,
            subject: Subject::Entity(entity),
            context: ActionContext::None,
        }
    }

    pub fn relationship(action: Action, relationship: Relationship) -> Self {
        Self {
            action,
            subject: Subject::Relationship(relationship),
            context: ActionContext::None,
        }
    }

    pub fn entity_updated(entity: Entity, previous: Entity, update: EntityUpdate) -> Self {
        Self {
            action: Action::Updated,
            subject: Subject::Entity(entity),
            context: ActionContext::EntityUpdate {
                previous: Box::new(previous),
                update,
            },
        }
    }

    pub fn relationship_updated(
        relationship: Relationship,
        previous: Relationship,
        properties: Properties,
    ) -> Self {
        Self {
            action: Action::Updated,
            subject: Subject::Relationship(relationship),
            context: ActionContext::RelationshipUpdate {
                previous: Box::new(previous),
                properties,
            },
        }
    }

    pub fn identity_hash_changed(entity: Entity, previous: Option<String>) -> Self {
        Self {
            action: Action::IdentityHashChanged,
            subject: Subject::Entity(entity),
            context: ActionContext::IdentityHash { previous },
        }
    }

    /// Path of the entity subject, `None` for relationships
    pub fn entity_path(&self) -> Option<&CanonicalPath> {
        self.subject.as_entity().map(|e| &e.path)
    }

    pub fn is_entity_action(&self, action: Action) -> bool {
        self.action == action && self.subject.as_entity().is_some()
    }
}

/// Notifications caused by a change of a single entity
///
/// Relationship notifications whose primary owner is that entity (its
/// `contains` edge, type wire-up) travel with it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChange {
    pub entity: Entity,
    pub notifications: Vec<Notification>,
}

impl EntityChange {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            notifications: Vec::new(),
        }
    }

    pub fn with(mut self, notification: Notification) -> Self {
        self.notifications.push(notification);
        self
    }

    pub fn push(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Whether an explicit created/deleted notification for the entity itself is present
    pub fn has_entity_action(&self, action: Action) -> bool {
        self.notifications
            .iter()
            .any(|n| n.is_entity_action(action) && n.entity_path() == Some(&self.entity.path))
    }
}
