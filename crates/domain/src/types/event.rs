//! Metric event model.
//!
//! A [`MetricEvent`] is an immutable fact recorded at the moment something
//! happened. Events are produced by the ingress adapters, buffered by the
//! emitter and consumed exactly once by the collector; the raw store keeps
//! them only for a short retention window.

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::buckets;
use crate::constants::METRIC_API_REQUEST;

/// Category of a metric event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Request,
    Business,
    Error,
}

impl EventType {
    /// Stable lowercase label used in counter keys and stored rows.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Request => "request",
            EventType::Business => "business",
            EventType::Error => "error",
        }
    }

    /// Parse a stored label back into an event type.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "request" => Some(EventType::Request),
            "business" => Some(EventType::Business),
            "error" => Some(EventType::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable metric event.
///
/// `event_id` is a UUIDv7, so the natural sort order is creation order.
/// `hour_bucket` is derived from `created_at` at construction time and is the
/// raw-event table's coarse partition key. Optional context fields stay
/// `None` when unknown; they are never coerced to sentinel zeroes, which is
/// what keeps the null-vs-zero distinction intact downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub event_name: String,
    pub hour_bucket: String,
    pub user_id: Option<Uuid>,
    pub request_id: Option<String>,
    pub path: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<u16>,
    pub duration_ms: Option<f64>,
    pub course_id: Option<Uuid>,
    pub lesson_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl MetricEvent {
    /// Create an event of the given type and name, stamped now.
    ///
    /// Construction never fails; every optional field starts absent.
    pub fn new(event_type: EventType, event_name: impl Into<String>) -> Self {
        Self::at(event_type, event_name, Utc::now())
    }

    /// Create an event with an explicit timestamp (tests, replays).
    pub fn at(
        event_type: EventType,
        event_name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type,
            event_name: event_name.into(),
            hour_bucket: buckets::hour_bucket(created_at),
            user_id: None,
            request_id: None,
            path: None,
            method: None,
            status_code: None,
            duration_ms: None,
            course_id: None,
            lesson_id: None,
            metadata: BTreeMap::new(),
            created_at,
        }
    }

    /// Inbound HTTP request event (`api_request`).
    pub fn request(
        method: impl Into<String>,
        path: impl Into<String>,
        status_code: u16,
        duration_ms: f64,
    ) -> Self {
        let mut event = Self::new(EventType::Request, METRIC_API_REQUEST);
        event.method = Some(method.into());
        event.path = Some(path.into());
        event.status_code = Some(status_code);
        event.duration_ms = Some(duration_ms);
        event
    }

    /// Business/domain event, named from the fixed vocabulary where possible.
    pub fn business(event_name: impl Into<String>) -> Self {
        Self::new(EventType::Business, event_name)
    }

    /// Error event; `kind` is lowercased into the name, e.g.
    /// `error("ValueError")` produces `error_valueerror`.
    pub fn error(kind: &str) -> Self {
        Self::new(EventType::Error, format!("error_{}", kind.to_lowercase()))
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_course(mut self, course_id: Uuid) -> Self {
        self.course_id = Some(course_id);
        self
    }

    pub fn with_lesson(mut self, lesson_id: Uuid) -> Self {
        self.lesson_id = Some(lesson_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Day bucket of the event's creation time.
    pub fn day_bucket(&self) -> String {
        buckets::day_bucket(self.created_at)
    }

    /// Hour-of-day (0..=23) of the event's creation time.
    pub fn hour(&self) -> u32 {
        self.created_at.hour()
    }

    /// Status class label (`2xx`, `4xx`, ...) when a status code is present.
    pub fn status_class(&self) -> Option<String> {
        self.status_code.map(|code| format!("{}xx", code / 100))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn hour_bucket_derived_at_construction() {
        let t = Utc.with_ymd_and_hms(2026, 8, 7, 4, 59, 59).single().unwrap();
        let event = MetricEvent::at(EventType::Business, "login", t);
        assert_eq!(event.hour_bucket, "2026-08-07-04");
        assert_eq!(event.day_bucket(), "2026-08-07");
        assert_eq!(event.hour(), 4);
    }

    #[test]
    fn event_ids_sort_in_creation_order() {
        let first = MetricEvent::new(EventType::Request, "api_request");
        // UUIDv7 ordering is millisecond-granular; step past the boundary.
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = MetricEvent::new(EventType::Request, "api_request");
        assert!(first.event_id < second.event_id);
    }

    #[test]
    fn request_constructor_fills_context() {
        let event = MetricEvent::request("GET", "/courses/:id", 200, 12.5);
        assert_eq!(event.event_type, EventType::Request);
        assert_eq!(event.event_name, "api_request");
        assert_eq!(event.method.as_deref(), Some("GET"));
        assert_eq!(event.status_code, Some(200));
        assert_eq!(event.duration_ms, Some(12.5));
        assert_eq!(event.status_class().as_deref(), Some("2xx"));
    }

    #[test]
    fn error_constructor_lowercases_kind() {
        let event = MetricEvent::error("ValueError");
        assert_eq!(event.event_name, "error_valueerror");
        assert_eq!(event.event_type, EventType::Error);
    }

    #[test]
    fn missing_optionals_stay_absent() {
        let event = MetricEvent::business("enrollment_created");
        assert!(event.duration_ms.is_none());
        assert!(event.status_code.is_none());
        assert!(event.status_class().is_none());
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn event_type_labels_round_trip() {
        for ty in [EventType::Request, EventType::Business, EventType::Error] {
            assert_eq!(EventType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(EventType::parse("unknown"), None);
    }
}
