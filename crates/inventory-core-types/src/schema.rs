//! Field keys and event names of the structured log
//!
//! The logging macros of `inventory-core` and the test capture layer both
//! read from here, so a renamed field cannot drift between writer and reader.

pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_FRAME_ID: &str = "frame_id";

pub const FIELD_PATH: &str = "path";
pub const FIELD_RELATIONSHIP: &str = "relationship";

// retries
pub const FIELD_ATTEMPT: &str = "attempt";
pub const FIELD_ATTEMPTS: &str = "attempts";
pub const FIELD_WAIT_MS: &str = "wait_ms";

pub const FIELD_NOTIFICATION_COUNT: &str = "notification_count";
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// operation boundary events, in emission order
pub const EVENT_START: &str = "start";
pub const EVENT_RETRY: &str = "retry";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
