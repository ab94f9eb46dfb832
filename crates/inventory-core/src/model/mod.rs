pub mod blueprint;
pub mod entity;
pub mod notification;
pub mod path;
pub mod properties;
pub mod relationship;

pub use blueprint::{Blueprint, BlueprintDefinition, EntityUpdate};
pub use entity::{Definition, Entity, MetricDataType};
pub use notification::{Action, ActionContext, EntityChange, Notification, Subject};
pub use path::{CanonicalPath, EntityKind, PathRef, PathSegment};
pub use properties::Properties;
pub use relationship::{Direction, Relationship, WellKnown};
