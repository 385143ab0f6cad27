//! Metric-name vocabulary and key constants.
//!
//! The dashboard views bucket hourly rows by these exact names; anything
//! outside the vocabulary still flows through raw storage and time series
//! queries but is ignored by the fixed views.

/// Global request metric recorded for every inbound HTTP request.
pub const METRIC_API_REQUEST: &str = "api_request";

/// Dimensioned request breakdowns derived by the collector.
pub const METRIC_REQUEST_BY_STATUS: &str = "request_by_status";
pub const METRIC_REQUEST_BY_METHOD: &str = "request_by_method";
pub const METRIC_REQUEST_BY_PATH: &str = "request_by_path";

/// Business metric vocabulary.
pub const METRIC_LOGIN: &str = "login";
pub const METRIC_REGISTRATION: &str = "registration";
pub const METRIC_ENROLLMENT_CREATED: &str = "enrollment_created";
pub const METRIC_LESSON_STARTED: &str = "lesson_started";
pub const METRIC_LESSON_COMPLETED: &str = "lesson_completed";
pub const METRIC_COURSE_COMPLETED: &str = "course_completed";
pub const METRIC_COMMENT_CREATED: &str = "comment_created";
pub const METRIC_REACTION_ADDED: &str = "reaction_added";

/// Dimension names used by the request breakdowns.
pub const DIM_STATUS: &str = "status";
pub const DIM_METHOD: &str = "method";
pub const DIM_PATH: &str = "path";

/// Prefix for counter keys mirrored into the cache
/// (`metrics:{hour_bucket}:{suffix}`).
pub const CACHE_KEY_PREFIX: &str = "metrics";
