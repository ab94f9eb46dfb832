use inventory_core::errors::{ExError, ExErrorKind, InventoryError};

#[test]
fn test_entity_not_found_verifiable_by_kind() {
    let err = InventoryError::EntityNotFound {
        path: "/t;t/e;gone".to_string(),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::NotFound);
    assert_eq!(ex_err.code(), "ERR_NOT_FOUND");
    assert_eq!(ex_err.path(), Some("/t;t/e;gone"));
}

#[test]
fn test_rule_violation_structured_fields() {
    let err = InventoryError::rule_violation(
        "contains",
        "/t;t/e;e",
        "/t;t/e;e/r;a",
        "containment can only be removed by deleting the contained entity",
    );

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::RuleViolation);
    assert_eq!(ex_err.code(), "ERR_RULE_VIOLATION");
    assert_eq!(ex_err.path(), Some("/t;t/e;e"));
    assert_eq!(ex_err.relationship(), Some("contains"));
    assert!(ex_err.message().contains("/t;t/e;e/r;a"));
}

#[test]
fn test_cycle_distinct_from_diamond() {
    let cycle: ExError = InventoryError::CycleDetected {
        relationship: "isParentOf".to_string(),
        source_path: "/t;t/e;e/r;b".to_string(),
        target: "/t;t/e;e/r;a".to_string(),
    }
    .into();
    let diamond: ExError = InventoryError::DiamondDetected {
        relationship: "contains".to_string(),
        target: "/t;t/e;e/r;a".to_string(),
    }
    .into();

    assert_eq!(cycle.code(), "ERR_CYCLE_DETECTED");
    assert_eq!(diamond.code(), "ERR_DIAMOND_DETECTED");
    assert_ne!(cycle.kind(), diamond.kind());
}

#[test]
fn test_error_kind_code_mapping() {
    // Test that each kind has a stable, unique code
    let kinds = vec![
        (ExErrorKind::InvalidInput, "ERR_INVALID_INPUT"),
        (ExErrorKind::IllegalContainment, "ERR_ILLEGAL_CONTAINMENT"),
        (ExErrorKind::ImmutableRelationship, "ERR_IMMUTABLE_RELATIONSHIP"),
        (ExErrorKind::TypeInUse, "ERR_TYPE_IN_USE"),
        (ExErrorKind::MetadataPackProtected, "ERR_METADATA_PACK_PROTECTED"),
        (ExErrorKind::AlreadyExists, "ERR_ALREADY_EXISTS"),
        (ExErrorKind::Concurrency, "ERR_CONCURRENCY"),
        (ExErrorKind::TransactionFailed, "ERR_TRANSACTION_FAILED"),
        (ExErrorKind::InconsistentState, "ERR_INCONSISTENT_STATE"),
    ];

    for (kind, expected_code) in kinds {
        assert_eq!(kind.code(), expected_code);
    }
}

#[test]
fn test_commit_conflicts_are_retryable_concurrency_errors() {
    for err in [
        InventoryError::CommitConflict {
            message: "write-write".to_string(),
        },
        InventoryError::BackendInconsistent {
            message: "stale index".to_string(),
        },
    ] {
        assert!(err.is_retryable());
        assert!(!err.is_validation());
        let ex_err: ExError = err.into();
        assert_eq!(ex_err.kind(), ExErrorKind::Concurrency);
    }
}

#[test]
fn test_transaction_failed_keeps_attempts_and_cause() {
    let err = InventoryError::TransactionFailed {
        attempts: 11,
        cause: Box::new(InventoryError::CommitConflict {
            message: "lost the race".to_string(),
        }),
    };
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("11 attempts"));

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::TransactionFailed);
    assert_eq!(ex_err.attempts(), Some(11));
    let cause = ex_err.source_error().unwrap();
    assert_eq!(cause.kind(), ExErrorKind::Concurrency);
    assert_eq!(cause.message(), "lost the race");
}

#[test]
fn test_inconsistent_state_is_fatal_and_not_retryable() {
    let err = InventoryError::InconsistentState {
        message: "changed node missing".to_string(),
    };
    assert!(err.is_fatal());
    assert!(!err.is_retryable());
    assert!(!err.is_validation());
}

#[test]
fn test_serde_json_error_converts_to_serialization() {
    let json_err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
    let err: InventoryError = json_err.into();
    assert!(matches!(err, InventoryError::Serialization { .. }));
    let ex_err: ExError = err.into();
    assert_eq!(ex_err.code(), "ERR_SERIALIZATION");
}
