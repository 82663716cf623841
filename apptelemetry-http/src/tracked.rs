use crate::{Bytes, HttpClient, HttpError, Request, Response};
use apptelemetry::telemetry::dependency_type;
use apptelemetry::{telemetry_debug, Dimensions, TelemetryTracker};
use async_trait::async_trait;
use http::Uri;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// An [`HttpClient`] that records every call it makes as a dependency.
///
/// Each call gets a fresh id from the id generator (a random UUID by
/// default), is timed, and produces exactly one dependency item on the
/// tracker once it completes: non-2xx responses are recorded as failed,
/// transport errors as failed with no result code. Responses and errors are
/// returned unchanged.
///
/// ```no_run
/// # use apptelemetry::TelemetryTracker;
/// # use apptelemetry_http::{HttpClient, TrackedHttpClient};
/// # use std::sync::Arc;
/// # fn wrap(client: impl HttpClient, tracker: Arc<TelemetryTracker>) {
/// let client = TrackedHttpClient::new(client, tracker);
/// # }
/// ```
#[derive(Clone)]
pub struct TrackedHttpClient<C> {
    inner: C,
    tracker: Arc<TelemetryTracker>,
    id_generator: IdGenerator,
}

impl<C: HttpClient> TrackedHttpClient<C> {
    /// Wraps `inner`, recording calls on `tracker`.
    pub fn new(inner: C, tracker: Arc<TelemetryTracker>) -> Self {
        TrackedHttpClient {
            inner,
            tracker,
            id_generator: Arc::new(|| uuid::Uuid::new_v4().simple().to_string()),
        }
    }

    /// Uses `generator` to create the id of each recorded dependency.
    pub fn with_id_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.id_generator = Arc::new(generator);
        self
    }

    /// The wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: fmt::Debug> fmt::Debug for TrackedHttpClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedHttpClient")
            .field("inner", &self.inner)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for TrackedHttpClient<C> {
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
        let id = (self.id_generator)();
        let name = format!("{} {}", request.method(), request.uri().path());
        let uri = request.uri().clone();

        let started = Instant::now();
        let result = self.inner.send_bytes(request).await;
        let duration = started.elapsed();

        let (result_code, success) = match &result {
            Ok(response) => (
                Some(response.status().as_str().to_string()),
                response.status().is_success(),
            ),
            Err(_) => (None, false),
        };
        telemetry_debug!(
            name: "TrackedHttpClient.Completed",
            success = success,
            duration_ms = duration.as_millis()
        );

        self.tracker.track_dependency(
            dependency_type::from_uri(&uri),
            id,
            name,
            target(&uri),
            Some(uri.to_string()),
            result_code,
            duration,
            success,
            Dimensions::new(),
        );

        result
    }
}

fn target(uri: &Uri) -> Option<String> {
    let host = uri.host()?;
    Some(match uri.port_u16() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
