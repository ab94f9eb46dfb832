//! Canonical and relative paths
//!
//! Every entity is addressed by a canonical path: a root-to-node sequence of
//! typed segments starting at a tenant. The textual form joins segments as
//! `code;id`, e.g. `/t;acme/e;prod/r;host-1`.
//!
//! Which kind may sit under which is fixed by [`EntityKind::can_contain`];
//! every constructor enforces it, so a `CanonicalPath` value is always
//! well-formed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{InventoryError, Result};

/// Kind of an inventory entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Tenant,
    Environment,
    Feed,
    ResourceType,
    MetricType,
    OperationType,
    MetadataPack,
    Resource,
    Metric,
    StructuredData,
}

impl EntityKind {
    /// Short code used in the textual path form
    pub fn code(&self) -> &'static str {
        match self {
            EntityKind::Tenant => "t",
            EntityKind::Environment => "e",
            EntityKind::Feed => "f",
            EntityKind::ResourceType => "rt",
            EntityKind::MetricType => "mt",
            EntityKind::OperationType => "ot",
            EntityKind::MetadataPack => "mp",
            EntityKind::Resource => "r",
            EntityKind::Metric => "m",
            EntityKind::StructuredData => "d",
        }
    }

    /// Parse a short code back into a kind
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "t" => Some(EntityKind::Tenant),
            "e" => Some(EntityKind::Environment),
            "f" => Some(EntityKind::Feed),
            "rt" => Some(EntityKind::ResourceType),
            "mt" => Some(EntityKind::MetricType),
            "ot" => Some(EntityKind::OperationType),
            "mp" => Some(EntityKind::MetadataPack),
            "r" => Some(EntityKind::Resource),
            "m" => Some(EntityKind::Metric),
            "d" => Some(EntityKind::StructuredData),
            _ => None,
        }
    }

    /// Human readable name
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Tenant => "tenant",
            EntityKind::Environment => "environment",
            EntityKind::Feed => "feed",
            EntityKind::ResourceType => "resourceType",
            EntityKind::MetricType => "metricType",
            EntityKind::OperationType => "operationType",
            EntityKind::MetadataPack => "metadataPack",
            EntityKind::Resource => "resource",
            EntityKind::Metric => "metric",
            EntityKind::StructuredData => "data",
        }
    }

    /// Whether entities of this kind carry an identity hash
    ///
    /// Hashable kinds only ever contain hashable kinds, so the topmost
    /// hashable entity on a path bounds every hash a change can affect.
    pub fn is_hashable(&self) -> bool {
        matches!(
            self,
            EntityKind::Feed
                | EntityKind::ResourceType
                | EntityKind::MetricType
                | EntityKind::OperationType
                | EntityKind::Resource
                | EntityKind::Metric
                | EntityKind::StructuredData
        )
    }

    /// Kinds that may be contained directly by this kind
    pub fn allowed_children(&self) -> &'static [EntityKind] {
        match self {
            EntityKind::Tenant => &[
                EntityKind::Environment,
                EntityKind::Feed,
                EntityKind::ResourceType,
                EntityKind::MetricType,
                EntityKind::MetadataPack,
            ],
            EntityKind::Environment => &[EntityKind::Resource, EntityKind::Metric],
            EntityKind::Feed => &[
                EntityKind::Resource,
                EntityKind::Metric,
                EntityKind::ResourceType,
                EntityKind::MetricType,
            ],
            EntityKind::Resource => &[
                EntityKind::Resource,
                EntityKind::Metric,
                EntityKind::StructuredData,
            ],
            EntityKind::ResourceType => &[EntityKind::OperationType, EntityKind::StructuredData],
            EntityKind::OperationType => &[EntityKind::StructuredData],
            EntityKind::MetricType
            | EntityKind::MetadataPack
            | EntityKind::Metric
            | EntityKind::StructuredData => &[],
        }
    }

    /// Check the containment grammar
    pub fn can_contain(&self, child: EntityKind) -> bool {
        self.allowed_children().contains(&child)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One typed step of a path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathSegment {
    kind: EntityKind,
    id: String,
}

impl PathSegment {
    /// Create a segment, validating the id
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if the id is blank or contains `/` or `;`.
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() || id.contains('/') || id.contains(';') {
            return Err(InventoryError::InvalidPath {
                path: format!("{};{}", kind.code(), id),
                reason: "segment id must be non-blank and must not contain '/' or ';'"
                    .to_string(),
            });
        }
        Ok(Self { kind, id })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn parse(text: &str, whole: &str) -> Result<Self> {
        let (code, id) = text.split_once(';').ok_or_else(|| InventoryError::InvalidPath {
            path: whole.to_string(),
            reason: format!("segment '{}' is not of the form kind;id", text),
        })?;
        let kind = EntityKind::from_code(code).ok_or_else(|| InventoryError::InvalidPath {
            path: whole.to_string(),
            reason: format!("unknown entity kind code '{}'", code),
        })?;
        Self::new(kind, id)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.kind.code(), self.id)
    }
}

/// Absolute, typed, root-to-node path uniquely identifying an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalPath {
    segments: Vec<PathSegment>,
}

impl CanonicalPath {
    /// Path of a tenant
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if the id is not a valid segment id.
    pub fn tenant(id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            segments: vec![PathSegment::new(EntityKind::Tenant, id)?],
        })
    }

    /// Build a path from raw segments, enforcing the containment grammar
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for an empty or non-tenant-rooted sequence and
    /// `IllegalContainment` when a step violates the grammar.
    pub fn from_segments(segments: Vec<PathSegment>) -> Result<Self> {
        match segments.first() {
            Some(first) if first.kind == EntityKind::Tenant => {}
            _ => {
                return Err(InventoryError::InvalidPath {
                    path: render(&segments),
                    reason: "canonical paths must start with a tenant".to_string(),
                })
            }
        }
        for pair in segments.windows(2) {
            if !pair[0].kind.can_contain(pair[1].kind) {
                return Err(InventoryError::IllegalContainment {
                    parent_kind: pair[0].kind.to_string(),
                    child_kind: pair[1].kind.to_string(),
                });
            }
        }
        Ok(Self { segments })
    }

    /// Path of a child of this entity
    ///
    /// # Errors
    ///
    /// Returns `IllegalContainment` if this kind cannot contain `kind`.
    pub fn extend(&self, kind: EntityKind, id: impl Into<String>) -> Result<Self> {
        if !self.kind().can_contain(kind) {
            return Err(InventoryError::IllegalContainment {
                parent_kind: self.kind().to_string(),
                child_kind: kind.to_string(),
            });
        }
        let mut segments = self.segments.clone();
        segments.push(PathSegment::new(kind, id)?);
        Ok(Self { segments })
    }

    /// Path of the containing entity, `None` for tenants
    pub fn parent(&self) -> Option<CanonicalPath> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Last segment
    pub fn segment(&self) -> &PathSegment {
        // never empty: every constructor pushes at least the tenant segment
        &self.segments[self.segments.len() - 1]
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn kind(&self) -> EntityKind {
        self.segment().kind
    }

    pub fn id(&self) -> &str {
        self.segment().id()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn tenant_id(&self) -> &str {
        self.segments[0].id()
    }

    /// Strict ancestry check
    pub fn is_ancestor_of(&self, other: &CanonicalPath) -> bool {
        other.segments.len() > self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// Parse the textual form `/t;x/e;y/...`
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` or `IllegalContainment` for malformed input.
    pub fn parse(text: &str) -> Result<Self> {
        let body = text
            .strip_prefix('/')
            .ok_or_else(|| InventoryError::InvalidPath {
                path: text.to_string(),
                reason: "canonical paths start with '/'".to_string(),
            })?;
        let segments = body
            .split('/')
            .map(|s| PathSegment::parse(s, text))
            .collect::<Result<Vec<_>>>()?;
        Self::from_segments(segments)
    }

    /// Resolve a canonical-or-relative reference against this path
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if the reference climbs above the tenant, or
    /// any error from [`CanonicalPath::extend`].
    pub fn resolve(&self, reference: &PathRef) -> Result<CanonicalPath> {
        match reference {
            PathRef::Canonical(path) => Ok(path.clone()),
            PathRef::Relative { up, segments } => {
                let mut base = self.clone();
                for _ in 0..*up {
                    base = base.parent().ok_or_else(|| InventoryError::InvalidPath {
                        path: reference.to_string(),
                        reason: format!("climbs above the root when resolved against {}", self),
                    })?;
                }
                for segment in segments {
                    base = base.extend(segment.kind, segment.id.clone())?;
                }
                Ok(base)
            }
        }
    }
}

fn render(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(&segment.to_string());
    }
    out
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.segments))
    }
}

impl FromStr for CanonicalPath {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CanonicalPath {
    type Error = InventoryError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CanonicalPath> for String {
    fn from(path: CanonicalPath) -> Self {
        path.to_string()
    }
}

/// A reference to an entity: either canonical or relative to some origin
///
/// Relative references are written as leading `..` steps followed by
/// segments, e.g. `../rt;host` or `d;configuration`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathRef {
    Canonical(CanonicalPath),
    Relative {
        up: usize,
        segments: Vec<PathSegment>,
    },
}

impl PathRef {
    /// Parse a reference; a leading `/` means canonical
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for malformed input.
    pub fn parse(text: &str) -> Result<Self> {
        if text.starts_with('/') {
            return Ok(PathRef::Canonical(CanonicalPath::parse(text)?));
        }
        let mut up = 0;
        let mut segments = Vec::new();
        for part in text.split('/') {
            if part == ".." {
                if !segments.is_empty() {
                    return Err(InventoryError::InvalidPath {
                        path: text.to_string(),
                        reason: "'..' may only appear at the start of a relative path"
                            .to_string(),
                    });
                }
                up += 1;
            } else {
                segments.push(PathSegment::parse(part, text)?);
            }
        }
        if up == 0 && segments.is_empty() {
            return Err(InventoryError::InvalidPath {
                path: text.to_string(),
                reason: "empty relative path".to_string(),
            });
        }
        Ok(PathRef::Relative { up, segments })
    }
}

impl From<CanonicalPath> for PathRef {
    fn from(path: CanonicalPath) -> Self {
        PathRef::Canonical(path)
    }
}

impl fmt::Display for PathRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathRef::Canonical(path) => write!(f, "{}", path),
            PathRef::Relative { up, segments } => {
                let mut parts: Vec<String> = (0..*up).map(|_| "..".to_string()).collect();
                parts.extend(segments.iter().map(|s| s.to_string()));
                f.write_str(&parts.join("/"))
            }
        }
    }
}
