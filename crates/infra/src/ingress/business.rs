//! Business-event recorder.
//!
//! Replaces the original decorator's reflective attribute-path walking with
//! a typed extractor the caller supplies: the wrapped operation's output is
//! handed to a closure that picks out the identifier fields. Emission can
//! never fail the wrapped operation.

use std::future::Future;
use std::sync::Arc;

use tidemark_core::MetricsEmitter;
use uuid::Uuid;

/// Identifier fields attached to a business event.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusinessIds {
    pub user_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    pub lesson_id: Option<Uuid>,
}

impl BusinessIds {
    pub fn user(user_id: Uuid) -> Self {
        Self { user_id: Some(user_id), ..Self::default() }
    }

    pub fn with_course(mut self, course_id: Uuid) -> Self {
        self.course_id = Some(course_id);
        self
    }

    pub fn with_lesson(mut self, lesson_id: Uuid) -> Self {
        self.lesson_id = Some(lesson_id);
        self
    }
}

/// Emits business events around domain operations.
pub struct BusinessEvents {
    emitter: Arc<MetricsEmitter>,
}

impl BusinessEvents {
    pub fn new(emitter: Arc<MetricsEmitter>) -> Self {
        Self { emitter }
    }

    /// Record a business event directly. The emitter's drop policy applies;
    /// the return value is intentionally ignored.
    pub fn record(&self, event_name: &str, ids: BusinessIds) {
        let _ = self.emitter.emit_business(event_name, ids.user_id, ids.course_id, ids.lesson_id);
    }

    /// Run `operation`; when it succeeds, extract ids from its output and
    /// record `event_name`. The operation's result passes through untouched
    /// and emission cannot fail it.
    pub async fn observe<T, E, Fut>(
        &self,
        event_name: &str,
        extract: impl Fn(&T) -> BusinessIds,
        operation: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let result = operation.await;
        if let Ok(value) = &result {
            self.record(event_name, extract(value));
        }
        result
    }
}
