use crate::capture::capture_record;
use crate::exclusion::ExclusionSet;
use crate::forwarder::LogForwarder;
use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use edgelog_core::{EdgelogConfig, EdgelogError};
use edgelog_observability::redact::HeaderRedactor;
use http::{HeaderMap, Method, Uri};
use std::sync::Arc;
use tracing::{debug, warn};

/// Edge interceptor: one log record per non-excluded request, handed to the
/// forwarder before the request continues to the application.
#[derive(Clone)]
pub struct Interceptor {
    inner: Arc<InterceptorInner>,
}

struct InterceptorInner {
    exclusions: ExclusionSet,
    redactor: HeaderRedactor,
    forwarder: LogForwarder,
}

impl Interceptor {
    pub fn new(
        exclusions: ExclusionSet,
        redactor: HeaderRedactor,
        forwarder: LogForwarder,
    ) -> Self {
        Self {
            inner: Arc::new(InterceptorInner {
                exclusions,
                redactor,
                forwarder,
            }),
        }
    }

    pub fn from_config(config: &EdgelogConfig, forwarder: LogForwarder) -> Result<Self, EdgelogError> {
        let exclusions = ExclusionSet::new(&config.ingest.path, &config.interceptor.exclude_paths)?;
        let redactor = HeaderRedactor::new(&config.interceptor.redact_headers);
        debug!(
            exclusions = ?exclusions.patterns(),
            redacting = !redactor.is_empty(),
            "Interceptor configured"
        );
        Ok(Self::new(exclusions, redactor, forwarder))
    }

    /// Capture and enqueue a record for this request. Returns whether a record
    /// was handed to the forwarder.
    pub fn observe(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> bool {
        if self.inner.exclusions.is_excluded(uri.path()) {
            return false;
        }
        match capture_record(method, uri, headers, &self.inner.redactor) {
            Ok(record) => {
                self.inner.forwarder.submit(record);
                true
            }
            Err(e) => {
                warn!(error = %e, path = uri.path(), "Could not capture request log record");
                false
            }
        }
    }

    /// Wrap every route of `router` with the interceptor.
    pub fn wrap<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self, intercept))
    }
}

/// Axum middleware entry point.
pub async fn intercept(
    State(interceptor): State<Interceptor>,
    request: Request,
    next: Next,
) -> Response {
    interceptor.observe(request.method(), request.uri(), request.headers());
    next.run(request).await
}
