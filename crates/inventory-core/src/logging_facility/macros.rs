//! Operation boundary macros
//!
//! An operation logs one `start`, any number of `retry` events, then
//! exactly one of `end` / `end_error`. Field names come from
//! `inventory_core_types::schema`, so callers need that crate in scope.

/// Emit one boundary event for `op` at `level`
#[doc(hidden)]
#[macro_export]
macro_rules! __op_event {
    ($level:ident, $op:expr, $event:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            component = module_path!(),
            op = $op,
            event = $event,
            $($($field)*)?
        )
    };
}

/// Log the start of an operation
///
/// ```
/// # use inventory_core::log_op_start;
/// log_op_start!("create");
/// log_op_start!("create", path = "/t;acme");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)*)?) => {
        $crate::__op_event!(
            info,
            $op,
            inventory_core_types::schema::EVENT_START
            $(, $($field)*)?
        )
    };
}

/// Log the successful end of an operation
///
/// ```
/// # use inventory_core::log_op_end;
/// log_op_end!("create", duration_ms = 3);
/// log_op_end!("create", duration_ms = 3, attempts = 1);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {
        $crate::__op_event!(
            info,
            $op,
            inventory_core_types::schema::EVENT_END,
            duration_ms = $duration
            $(, $($field)*)?
        )
    };
}

/// Log a failed attempt that is about to be retried
///
/// ```
/// # use inventory_core::log_op_retry;
/// # use inventory_core::errors::InventoryError;
/// let err = InventoryError::CommitConflict { message: "stale read".to_string() };
/// log_op_retry!("create", &err, attempt = 1, wait_ms = 300);
/// ```
#[macro_export]
macro_rules! log_op_retry {
    ($op:expr, $err:expr, attempt = $attempt:expr, wait_ms = $wait:expr $(, $($field:tt)*)?) => {{
        let err: &$crate::errors::InventoryError = $err;
        $crate::__op_event!(
            warn,
            $op,
            inventory_core_types::schema::EVENT_RETRY,
            attempt = $attempt,
            wait_ms = $wait,
            err_code = $crate::errors::ExError::from(err.clone()).code(),
            error = %err
            $(, $($field)*)?
        )
    }};
}

/// Log the failed end of an operation
///
/// The error is converted into an `ExError` (by value) to obtain its kind
/// and stable code.
///
/// ```
/// # use inventory_core::log_op_error;
/// # use inventory_core::errors::InventoryError;
/// let err = InventoryError::EntityNotFound { path: "/t;acme".to_string() };
/// log_op_error!("delete", err, duration_ms = 1);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        $crate::__op_event!(
            error,
            $op,
            inventory_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
            error = %ex_err
            $(, $($field)*)?
        )
    }};
}
