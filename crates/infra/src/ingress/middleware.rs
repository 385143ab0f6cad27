//! HTTP request tracking middleware.
//!
//! Measures wall-clock duration per inbound request, normalizes the path so
//! per-path dimensions stay bounded, and emits an `api_request` event. Paths
//! in the skip set (health checks, the metrics endpoints themselves, docs)
//! are passed through untouched, before any measurement happens.
//!
//! Wire it into an axum router with:
//!
//! ```ignore
//! let tracking = RequestTracking::new(emitter, &config.ingress);
//! let app = Router::new()
//!     .route("/courses", get(list_courses))
//!     .layer(middleware::from_fn_with_state(tracking, track_requests));
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use once_cell::sync::Lazy;
use regex::Regex;
use tidemark_core::MetricsEmitter;
use tidemark_domain::IngressConfig;

const UUID_PATTERN: &str =
    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";

static UUID_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(UUID_PATTERN).expect("UUID_SEGMENT should compile - this is a bug"));

/// Replace UUID-looking and purely numeric path segments with `:id` so the
/// `request_by_path` dimension cannot grow without bound.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_id_segment(segment) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_id_segment(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    segment.chars().all(|c| c.is_ascii_digit()) || UUID_SEGMENT.is_match(segment)
}

/// Shared state for the tracking middleware.
#[derive(Clone)]
pub struct RequestTracking {
    emitter: Arc<MetricsEmitter>,
    skip_paths: Arc<Vec<String>>,
}

impl RequestTracking {
    pub fn new(emitter: Arc<MetricsEmitter>, config: &IngressConfig) -> Self {
        Self { emitter, skip_paths: Arc::new(config.skip_paths.clone()) }
    }

    /// Exact match or sub-path of any configured skip path.
    pub fn is_skipped(&self, path: &str) -> bool {
        self.skip_paths
            .iter()
            .any(|skip| path == skip || path.starts_with(&format!("{skip}/")))
    }
}

/// axum middleware that emits one request event per tracked response.
pub async fn track_requests(
    State(tracking): State<RequestTracking>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if tracking.is_skipped(&path) {
        return next.run(request).await;
    }

    let method = request.method().to_string();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(String::from);

    let started = Instant::now();
    let response = next.run(request).await;
    let duration_ms = started.elapsed().as_secs_f64() * 1_000.0;

    // Fire-and-forget; a full queue is the emitter's problem, not ours.
    tracking.emitter.emit_request(
        &method,
        &normalize_path(&path),
        response.status().as_u16(),
        duration_ms,
        request_id,
        None,
    );

    response
}
