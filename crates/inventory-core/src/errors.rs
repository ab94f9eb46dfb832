use thiserror::Error;

/// Result type alias using InventoryError
pub type Result<T> = std::result::Result<T, InventoryError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Stable, structured classification of every error the inventory core can
/// surface. Each kind maps to a stable error code usable for programmatic
/// handling, testing and external API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Validation
    InvalidInput,
    InvalidPath,
    IllegalContainment,
    RuleViolation,
    CycleDetected,
    DiamondDetected,
    ImmutableRelationship,
    TypeInUse,
    MetadataPackProtected,

    // Lookup
    NotFound,
    AlreadyExists,

    // Transactions
    Concurrency,
    TransactionFailed,

    // Integration
    Serialization,
    Config,

    // Internal
    InconsistentState,
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::InvalidPath => "ERR_INVALID_PATH",
            ExErrorKind::IllegalContainment => "ERR_ILLEGAL_CONTAINMENT",
            ExErrorKind::RuleViolation => "ERR_RULE_VIOLATION",
            ExErrorKind::CycleDetected => "ERR_CYCLE_DETECTED",
            ExErrorKind::DiamondDetected => "ERR_DIAMOND_DETECTED",
            ExErrorKind::ImmutableRelationship => "ERR_IMMUTABLE_RELATIONSHIP",
            ExErrorKind::TypeInUse => "ERR_TYPE_IN_USE",
            ExErrorKind::MetadataPackProtected => "ERR_METADATA_PACK_PROTECTED",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::TransactionFailed => "ERR_TRANSACTION_FAILED",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::InconsistentState => "ERR_INCONSISTENT_STATE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Structured representation of an error with classification fields for
/// programmatic handling and context for debugging.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    path: Option<String>,
    relationship: Option<String>,
    attempts: Option<u32>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            path: None,
            relationship: None,
            attempts: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add the canonical path of the offending entity
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add the name (or id) of the offending relationship
    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }

    /// Add the number of transaction attempts made
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the path context, if any
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Get the relationship context, if any
    pub fn relationship(&self) -> Option<&str> {
        self.relationship.as_deref()
    }

    /// Get the attempt count, if any
    pub fn attempts(&self) -> Option<u32> {
        self.attempts
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path)?;
        }
        if let Some(relationship) = &self.relationship {
            write!(f, " (relationship: {})", relationship)?;
        }
        if let Some(attempts) = self.attempts {
            write!(f, " (attempts: {})", attempts)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for inventory operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InventoryError {
    // ===== Validation Errors =====
    /// A textual path or path segment could not be parsed or resolved
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The parent kind cannot contain the child kind
    #[error("A {parent_kind} cannot contain a {child_kind}")]
    IllegalContainment {
        parent_kind: String,
        child_kind: String,
    },

    /// The blueprint is malformed for the entity kind it describes
    #[error("Invalid blueprint for {kind}: {reason}")]
    InvalidBlueprint { kind: String, reason: String },

    /// The update object does not apply to the entity it targets
    #[error("Invalid update of {path}: {reason}")]
    InvalidUpdate { path: String, reason: String },

    /// Relationship rule engine rejection
    #[error("Relationship '{relationship}' rejected between {origin} and {target}: {reason}")]
    RuleViolation {
        relationship: String,
        origin: String,
        target: String,
        reason: String,
    },

    /// Relationship would close a cycle over a containment-like relationship
    #[error("Relationship '{relationship}' from {source_path} to {target} would create a cycle")]
    CycleDetected {
        relationship: String,
        source_path: String,
        target: String,
    },

    /// Target already has an incoming exclusive relationship
    #[error("{target} already has an incoming '{relationship}' relationship")]
    DiamondDetected { relationship: String, target: String },

    /// Relationship is backend-internal and cannot be created or deleted explicitly
    #[error("Relationship '{relationship}' cannot be created or deleted explicitly")]
    ImmutableRelationship { relationship: String },

    /// A defining entity is still referenced by a live entity outside the deleted subtree
    #[error("Cannot delete {path}: it still defines {used_by}")]
    TypeInUse { path: String, used_by: String },

    /// Metadata pack membership is fixed at pack creation time
    #[error("Metadata pack protection: {reason} ({path})")]
    MetadataPackProtected { path: String, reason: String },

    // ===== Lookup Errors =====
    /// Entity not found at the given canonical path
    #[error("Entity not found: {path}")]
    EntityNotFound { path: String },

    /// Relationship not found
    #[error("Relationship not found: {relationship}")]
    RelationshipNotFound { relationship: String },

    /// Entity already exists at the given canonical path
    #[error("Entity already exists: {path}")]
    EntityAlreadyExists { path: String },

    /// An identical relationship already exists
    #[error("Relationship already exists: {relationship}")]
    RelationshipAlreadyExists { relationship: String },

    // ===== Transaction Errors =====
    /// Backend detected a conflicting concurrent commit
    #[error("Commit conflict: {message}")]
    CommitConflict { message: String },

    /// Backend reported an inconsistent state that a retry may resolve
    #[error("Backend reported inconsistent state: {message}")]
    BackendInconsistent { message: String },

    /// Retry budget exhausted
    #[error("Transaction failed after {attempts} attempts: {cause}")]
    TransactionFailed {
        attempts: u32,
        cause: Box<InventoryError>,
    },

    /// Processing tree and identity hash tree disagree (logic defect, never retried)
    #[error("Inconsistent state: {message}")]
    InconsistentState { message: String },

    // ===== Generic Errors =====
    /// Serialization error (JSON encoding/decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl InventoryError {
    /// Construct a [`InventoryError::RuleViolation`]
    pub fn rule_violation(
        relationship: &str,
        origin: impl std::fmt::Display,
        target: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        InventoryError::RuleViolation {
            relationship: relationship.to_string(),
            origin: origin.to_string(),
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Validation failure surfaced synchronously and never retried
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            InventoryError::InvalidPath { .. }
                | InventoryError::IllegalContainment { .. }
                | InventoryError::InvalidBlueprint { .. }
                | InventoryError::InvalidUpdate { .. }
                | InventoryError::RuleViolation { .. }
                | InventoryError::CycleDetected { .. }
                | InventoryError::DiamondDetected { .. }
                | InventoryError::ImmutableRelationship { .. }
                | InventoryError::TypeInUse { .. }
                | InventoryError::MetadataPackProtected { .. }
        )
    }

    /// Entity or relationship absent
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            InventoryError::EntityNotFound { .. } | InventoryError::RelationshipNotFound { .. }
        )
    }

    /// Duplicate entity or relationship
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            InventoryError::EntityAlreadyExists { .. }
                | InventoryError::RelationshipAlreadyExists { .. }
        )
    }

    /// Transient backend conflict that a fresh attempt may get past
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InventoryError::CommitConflict { .. } | InventoryError::BackendInconsistent { .. }
        )
    }

    /// Internal logic defect
    pub fn is_fatal(&self) -> bool {
        matches!(self, InventoryError::InconsistentState { .. })
    }
}

/// Conversion from InventoryError to ExError
impl From<InventoryError> for ExError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InvalidPath { path, reason } => ExError::new(ExErrorKind::InvalidPath)
                .with_path(path)
                .with_message(reason),

            InventoryError::IllegalContainment {
                parent_kind,
                child_kind,
            } => ExError::new(ExErrorKind::IllegalContainment).with_message(format!(
                "A {} cannot contain a {}",
                parent_kind, child_kind
            )),

            InventoryError::InvalidBlueprint { kind, reason } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_message(format!("Invalid {} blueprint: {}", kind, reason))
            }

            InventoryError::InvalidUpdate { path, reason } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_path(path)
                    .with_message(reason)
            }

            InventoryError::RuleViolation {
                relationship,
                origin,
                target,
                reason,
            } => ExError::new(ExErrorKind::RuleViolation)
                .with_path(origin)
                .with_relationship(relationship)
                .with_message(format!("{} (target: {})", reason, target)),

            InventoryError::CycleDetected {
                relationship,
                source_path,
                target,
            } => ExError::new(ExErrorKind::CycleDetected)
                .with_path(source_path)
                .with_relationship(relationship)
                .with_message(format!("Relating to {} would create a cycle", target)),

            InventoryError::DiamondDetected {
                relationship,
                target,
            } => ExError::new(ExErrorKind::DiamondDetected)
                .with_path(target)
                .with_relationship(relationship)
                .with_message("Target already has an incoming relationship of this kind"),

            InventoryError::ImmutableRelationship { relationship } => {
                ExError::new(ExErrorKind::ImmutableRelationship)
                    .with_relationship(relationship)
                    .with_message("Relationship is managed by the inventory itself")
            }

            InventoryError::TypeInUse { path, used_by } => ExError::new(ExErrorKind::TypeInUse)
                .with_path(path)
                .with_message(format!("Still defines {}", used_by)),

            InventoryError::MetadataPackProtected { path, reason } => {
                ExError::new(ExErrorKind::MetadataPackProtected)
                    .with_path(path)
                    .with_message(reason)
            }

            InventoryError::EntityNotFound { path } => ExError::new(ExErrorKind::NotFound)
                .with_path(path)
                .with_message("Entity not found"),

            InventoryError::RelationshipNotFound { relationship } => {
                ExError::new(ExErrorKind::NotFound)
                    .with_relationship(relationship)
                    .with_message("Relationship not found")
            }

            InventoryError::EntityAlreadyExists { path } => {
                ExError::new(ExErrorKind::AlreadyExists)
                    .with_path(path)
                    .with_message("Entity already exists")
            }

            InventoryError::RelationshipAlreadyExists { relationship } => {
                ExError::new(ExErrorKind::AlreadyExists)
                    .with_relationship(relationship)
                    .with_message("Relationship already exists")
            }

            InventoryError::CommitConflict { message } => {
                ExError::new(ExErrorKind::Concurrency).with_message(message)
            }

            InventoryError::BackendInconsistent { message } => {
                ExError::new(ExErrorKind::Concurrency).with_message(message)
            }

            InventoryError::TransactionFailed { attempts, cause } => {
                let cause: ExError = (*cause).into();
                ExError::new(ExErrorKind::TransactionFailed)
                    .with_attempts(attempts)
                    .with_message("Retry budget exhausted")
                    .with_source(cause)
            }

            InventoryError::InconsistentState { message } => {
                ExError::new(ExErrorKind::InconsistentState).with_message(message)
            }

            InventoryError::Serialization { message } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            InventoryError::Config { message } => {
                ExError::new(ExErrorKind::Config).with_message(message)
            }

            InventoryError::Internal { message } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

/// Conversion from serde_json::Error to InventoryError
impl From<serde_json::Error> for InventoryError {
    fn from(err: serde_json::Error) -> Self {
        InventoryError::Serialization {
            message: err.to_string(),
        }
    }
}
