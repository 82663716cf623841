//! The tracker applications record telemetry with.
//!
//! ```no_run
//! # use apptelemetry::{Dimensions, TelemetryPublisher, TelemetryTracker};
//! # async fn run(publisher: impl TelemetryPublisher + 'static) {
//! let tracker = TelemetryTracker::builder()
//!     .with_publisher(publisher)
//!     .with_tag("ai.cloud.role", "checkout")
//!     .build();
//!
//! tracker.track_event("CartCreated", Dimensions::new().with_property("tier", "gold"));
//!
//! for result in tracker.publish().await {
//!     if let Err(err) = result {
//!         eprintln!("publish failed: {err}");
//!     }
//! }
//! # }
//! ```
use crate::context::{self, OperationContext};
use crate::error::{TelemetryError, TelemetryResult};
use crate::publisher::{PublishResult, TelemetryPublisher};
use crate::telemetry::{
    AvailabilityTelemetry, DependencyTelemetry, Dimensions, EventTelemetry, ExceptionInfo,
    ExceptionTelemetry, KeyValues, MetricTelemetry, MetricValueAggregation, PageViewTelemetry,
    RequestTelemetry, SeverityLevel, Telemetry, TraceTelemetry,
};
use crate::{telemetry_debug, telemetry_error, telemetry_warn};
use chrono::Utc;
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::error::Error;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Collects telemetry items and publishes them on demand.
///
/// Items are queued by [`add`](Self::add) and the `track_*` operations and
/// leave the queue when [`publish`](Self::publish) drains it. Each item is
/// part of exactly one publish call: the first whose drain sees it.
///
/// The `track_*` operations stamp items with the current operation of the
/// calling chain (see [`OperationContext::current`]), falling back to the
/// tracker's root operation.
#[derive(Debug)]
pub struct TelemetryTracker {
    pending: Mutex<Vec<Telemetry>>,
    publishers: Vec<Box<dyn TelemetryPublisher>>,
    tags: KeyValues,
    root_operation: OperationContext,
}

impl TelemetryTracker {
    /// Create a new [`TelemetryTrackerBuilder`].
    pub fn builder() -> TelemetryTrackerBuilder {
        TelemetryTrackerBuilder::default()
    }

    /// Queues an item. Never blocks on publishing and never fails.
    pub fn add(&self, item: impl Into<Telemetry>) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item.into());
    }

    /// Number of items waiting for the next publish.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Tracker-level tags added to every published item.
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    /// The operation items tracked from this call chain are stamped with.
    pub fn current_operation(&self) -> OperationContext {
        OperationContext::current().unwrap_or_else(|| self.root_operation.clone())
    }

    /// Enters a nested operation on the current call chain.
    ///
    /// Installs a new operation built from the arguments and returns the one
    /// it replaced, which the caller hands to
    /// [`track_operation_end`](Self::track_operation_end) once the nested
    /// scope completes. The replaced context itself is never modified.
    ///
    /// The calling chain needs an operation scope: a future bound with
    /// [`OperationFutureExt`](crate::OperationFutureExt) or an
    /// [`OperationContext::attach`] guard. Without one nothing is installed,
    /// a warning is logged and the current operation is returned.
    pub fn track_operation_begin(
        &self,
        id: &str,
        name: Option<&str>,
        parent_id: Option<&str>,
        synthetic_source: Option<&str>,
    ) -> OperationContext {
        let operation = OperationContext::from_parts(Some(id), name, parent_id, synthetic_source);
        match context::replace_current(Some(operation)) {
            Some(previous) => previous.unwrap_or_else(|| self.root_operation.clone()),
            None => {
                telemetry_warn!(
                    name: "Tracker.OperationBeginIgnored",
                    operation_id = id,
                    reason = "no operation scope on this call chain"
                );
                self.current_operation()
            }
        }
    }

    /// Restores the operation returned by
    /// [`track_operation_begin`](Self::track_operation_begin).
    pub fn track_operation_end(&self, previous: OperationContext) {
        if context::replace_current(Some(previous)).is_none() {
            telemetry_debug!(
                name: "Tracker.OperationEndIgnored",
                reason = "no operation scope on this call chain"
            );
        }
    }

    /// Tracks the result of an availability test.
    #[allow(clippy::too_many_arguments)]
    pub fn track_availability(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        duration: Duration,
        success: bool,
        run_location: Option<String>,
        message: Option<String>,
        dimensions: Dimensions,
    ) {
        let Dimensions {
            measurements,
            properties,
            tags,
        } = dimensions;
        self.add(AvailabilityTelemetry {
            operation: self.current_operation(),
            time: Utc::now(),
            properties,
            tags,
            id: id.into(),
            name: name.into(),
            duration,
            success,
            run_location,
            message,
            measurements,
        });
    }

    /// Tracks a call to a remote component.
    #[allow(clippy::too_many_arguments)]
    pub fn track_dependency(
        &self,
        dependency_type: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
        target: Option<String>,
        data: Option<String>,
        result_code: Option<String>,
        duration: Duration,
        success: bool,
        dimensions: Dimensions,
    ) {
        let Dimensions {
            measurements,
            properties,
            tags,
        } = dimensions;
        self.add(DependencyTelemetry {
            operation: self.current_operation(),
            time: Utc::now(),
            properties,
            tags,
            dependency_type: dependency_type.into(),
            id: id.into(),
            name: name.into(),
            target,
            data,
            result_code,
            duration,
            success,
            measurements,
        });
    }

    /// Tracks a named event.
    pub fn track_event(&self, name: impl Into<String>, dimensions: Dimensions) {
        let Dimensions {
            measurements,
            properties,
            tags,
        } = dimensions;
        self.add(EventTelemetry {
            operation: self.current_operation(),
            time: Utc::now(),
            properties,
            tags,
            name: name.into(),
            measurements,
        });
    }

    /// Tracks an already captured error chain.
    pub fn track_exception(
        &self,
        exceptions: Vec<ExceptionInfo>,
        severity_level: Option<SeverityLevel>,
        dimensions: Dimensions,
    ) {
        let Dimensions {
            measurements,
            properties,
            tags,
        } = dimensions;
        self.add(ExceptionTelemetry {
            operation: self.current_operation(),
            time: Utc::now(),
            properties,
            tags,
            exceptions,
            severity_level,
            problem_id: None,
            measurements,
        });
    }

    /// Captures `err` with its causes and tracks it.
    pub fn track_error<E: Error + 'static>(
        &self,
        err: &E,
        severity_level: Option<SeverityLevel>,
        dimensions: Dimensions,
    ) {
        self.track_exception(ExceptionInfo::from_error(err), severity_level, dimensions);
    }

    /// Tracks a metric value.
    pub fn track_metric(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        value: f64,
        aggregation: Option<MetricValueAggregation>,
        dimensions: Dimensions,
    ) {
        self.add(MetricTelemetry {
            operation: self.current_operation(),
            time: Utc::now(),
            properties: dimensions.properties,
            tags: dimensions.tags,
            namespace: namespace.into(),
            name: name.into(),
            value,
            aggregation,
        });
    }

    /// Tracks a page view.
    pub fn track_page_view(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        url: Option<String>,
        duration: Duration,
        dimensions: Dimensions,
    ) {
        let Dimensions {
            measurements,
            properties,
            tags,
        } = dimensions;
        self.add(PageViewTelemetry {
            operation: self.current_operation(),
            time: Utc::now(),
            properties,
            tags,
            id: id.into(),
            name: name.into(),
            url,
            duration,
            measurements,
        });
    }

    /// Tracks an incoming request.
    #[allow(clippy::too_many_arguments)]
    pub fn track_request(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        url: Option<String>,
        response_code: impl Into<String>,
        success: bool,
        duration: Duration,
        dimensions: Dimensions,
    ) {
        let Dimensions {
            measurements,
            properties,
            tags,
        } = dimensions;
        self.add(RequestTelemetry {
            operation: self.current_operation(),
            time: Utc::now(),
            properties,
            tags,
            id: id.into(),
            name: name.into(),
            url,
            response_code: response_code.into(),
            source: None,
            success,
            duration,
            measurements,
        });
    }

    /// Tracks a diagnostic message.
    pub fn track_trace(
        &self,
        message: impl Into<String>,
        severity_level: SeverityLevel,
        dimensions: Dimensions,
    ) {
        self.add(TraceTelemetry {
            operation: self.current_operation(),
            time: Utc::now(),
            properties: dimensions.properties,
            tags: dimensions.tags,
            message: message.into(),
            severity_level,
        });
    }

    /// Drains the queue and hands the batch to every publisher concurrently.
    ///
    /// Returns one result per publisher, in configuration order. An empty
    /// queue returns an empty vector without calling any publisher. A failed
    /// or panicking publisher only affects its own slot. Drained items are
    /// not re-queued, whatever the outcome, and dropping the returned future
    /// cancels all publishers.
    pub async fn publish(&self) -> Vec<TelemetryResult<PublishResult>> {
        let batch = self.drain();
        if batch.is_empty() {
            telemetry_debug!(name: "Tracker.PublishSkipped", reason = "no pending items");
            return Vec::new();
        }
        if self.publishers.is_empty() {
            telemetry_warn!(
                name: "Tracker.NoPublishers",
                dropped_items = batch.len()
            );
            return Vec::new();
        }

        telemetry_debug!(
            name: "Tracker.Publish",
            item_count = batch.len(),
            publisher_count = self.publishers.len()
        );

        let batch = batch.as_slice();
        let tags = self.tags.as_slice();
        let results = join_all(
            self.publishers
                .iter()
                .map(|publisher| AssertUnwindSafe(publisher.publish(batch, tags)).catch_unwind()),
        )
        .await;

        results
            .into_iter()
            .enumerate()
            .map(|(index, result)| match result {
                Ok(Ok(result)) => {
                    if !result.success {
                        telemetry_warn!(
                            name: "Tracker.PublishRejected",
                            publisher_index = index,
                            item_count = result.count
                        );
                    }
                    Ok(result)
                }
                Ok(Err(err)) => {
                    telemetry_warn!(
                        name: "Tracker.PublisherFailed",
                        publisher_index = index,
                        error = format!("{err}")
                    );
                    Err(err)
                }
                Err(_) => {
                    telemetry_error!(name: "Tracker.PublisherPanicked", publisher_index = index);
                    Err(TelemetryError::PublisherPanicked)
                }
            })
            .collect()
    }

    fn drain(&self) -> Vec<Telemetry> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *pending)
    }
}

/// Builder for [`TelemetryTracker`].
#[derive(Debug, Default)]
pub struct TelemetryTrackerBuilder {
    publishers: Vec<Box<dyn TelemetryPublisher>>,
    tags: KeyValues,
    root_operation: OperationContext,
}

impl TelemetryTrackerBuilder {
    /// Adds a publisher. Results are reported in the order publishers are
    /// added.
    pub fn with_publisher<T: TelemetryPublisher + 'static>(mut self, publisher: T) -> Self {
        self.publishers.push(Box::new(publisher));
        self
    }

    /// Adds a tracker-level tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Adds tracker-level tags.
    pub fn with_tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the operation used when no operation is current.
    pub fn with_root_operation(mut self, operation: OperationContext) -> Self {
        self.root_operation = operation;
        self
    }

    /// Builds the tracker.
    pub fn build(self) -> TelemetryTracker {
        TelemetryTracker {
            pending: Mutex::new(Vec::new()),
            publishers: self.publishers,
            tags: self.tags,
            root_operation: self.root_operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OperationFutureExt;
    use crate::testing::InMemoryPublisher;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[derive(Debug)]
    struct FailingPublisher;

    #[async_trait]
    impl TelemetryPublisher for FailingPublisher {
        async fn publish(
            &self,
            _batch: &[Telemetry],
            _tracker_tags: &[(String, String)],
        ) -> TelemetryResult<PublishResult> {
            Err(TelemetryError::Other("ingestion unreachable".into()))
        }
    }

    #[derive(Debug)]
    struct PanickingPublisher;

    #[async_trait]
    impl TelemetryPublisher for PanickingPublisher {
        async fn publish(
            &self,
            _batch: &[Telemetry],
            _tracker_tags: &[(String, String)],
        ) -> TelemetryResult<PublishResult> {
            panic!("publisher bug")
        }
    }

    #[derive(Debug)]
    struct StalledPublisher;

    #[async_trait]
    impl TelemetryPublisher for StalledPublisher {
        async fn publish(
            &self,
            _batch: &[Telemetry],
            _tracker_tags: &[(String, String)],
        ) -> TelemetryResult<PublishResult> {
            futures_util::future::pending().await
        }
    }

    fn event_names(batch: &[Telemetry]) -> Vec<String> {
        batch
            .iter()
            .filter_map(|item| match item {
                Telemetry::Event(event) => Some(event.name.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn empty_queue_does_not_call_publishers() {
        let publisher = InMemoryPublisher::default();
        let tracker = TelemetryTracker::builder()
            .with_publisher(publisher.clone())
            .build();

        let results = tracker.publish().await;

        assert!(results.is_empty());
        assert_eq!(publisher.invocation_count(), 0);
    }

    #[tokio::test]
    async fn publish_drains_the_queue_once() {
        let publisher = InMemoryPublisher::default();
        let tracker = TelemetryTracker::builder()
            .with_publisher(publisher.clone())
            .with_tag("ai.cloud.role", "tests")
            .build();
        tracker.track_event("first", Dimensions::new());
        tracker.track_event("second", Dimensions::new());

        let results = tracker.publish().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().count, 2);
        assert_eq!(tracker.pending_count(), 0);

        let batches = publisher.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(event_names(&batches[0].items), vec!["first", "second"]);
        assert_eq!(
            batches[0].tracker_tags,
            vec![("ai.cloud.role".to_string(), "tests".to_string())]
        );

        assert!(tracker.publish().await.is_empty());
        assert_eq!(publisher.invocation_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_are_published_exactly_once() {
        let publisher = InMemoryPublisher::default();
        let tracker = Arc::new(
            TelemetryTracker::builder()
                .with_publisher(publisher.clone())
                .build(),
        );

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move {
                    tracker.track_event(format!("item-{i}"), Dimensions::new());
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        tracker.publish().await;

        let names = event_names(&publisher.batches()[0].items);
        let unique: HashSet<_> = names.iter().cloned().collect();
        assert_eq!(names.len(), 10);
        assert_eq!(unique.len(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn adds_racing_with_publish_are_neither_lost_nor_duplicated() {
        let publisher = InMemoryPublisher::default();
        let tracker = Arc::new(
            TelemetryTracker::builder()
                .with_publisher(publisher.clone())
                .build(),
        );

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move {
                    for i in 0..250 {
                        tracker.track_event(format!("{p}-{i}"), Dimensions::new());
                        if i % 50 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        let publishing = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                for _ in 0..20 {
                    tracker.publish().await;
                    tokio::task::yield_now().await;
                }
            })
        };
        for producer in producers {
            producer.await.unwrap();
        }
        publishing.await.unwrap();
        tracker.publish().await;

        let names: Vec<String> = publisher
            .batches()
            .iter()
            .flat_map(|batch| event_names(&batch.items))
            .collect();
        let unique: HashSet<_> = names.iter().cloned().collect();
        assert_eq!(names.len(), 1000);
        assert_eq!(unique.len(), 1000);
    }

    #[tokio::test]
    async fn failing_publisher_does_not_hide_successful_one() {
        let publisher = InMemoryPublisher::default();
        let tracker = TelemetryTracker::builder()
            .with_publisher(FailingPublisher)
            .with_publisher(publisher.clone())
            .with_publisher(PanickingPublisher)
            .build();
        tracker.track_trace("hello", SeverityLevel::Warning, Dimensions::new());

        let results = tracker.publish().await;

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], Err(TelemetryError::Other(_))));
        assert!(results[1].as_ref().unwrap().success);
        assert!(matches!(results[2], Err(TelemetryError::PublisherPanicked)));
        assert_eq!(publisher.batches()[0].items.len(), 1);
    }

    #[tokio::test]
    async fn publishers_see_the_same_batch() {
        let first = InMemoryPublisher::default();
        let second = InMemoryPublisher::default();
        let tracker = TelemetryTracker::builder()
            .with_publisher(first.clone())
            .with_publisher(second.clone())
            .build();
        tracker.track_metric("tests", "count", 6.0, None, Dimensions::new());
        tracker.track_event("done", Dimensions::new());

        tracker.publish().await;

        assert_eq!(first.batches()[0].items, second.batches()[0].items);
    }

    #[test]
    fn tracked_items_use_the_root_operation_by_default() {
        let root = OperationContext::new("root");
        let publisher = InMemoryPublisher::default();
        let tracker = TelemetryTracker::builder()
            .with_publisher(publisher)
            .with_root_operation(root.clone())
            .build();

        assert_eq!(tracker.current_operation(), root);
    }

    #[tokio::test]
    async fn operation_begin_and_end_scope_tracked_items() {
        let publisher = InMemoryPublisher::default();
        let tracker = TelemetryTracker::builder()
            .with_publisher(publisher.clone())
            .with_root_operation(OperationContext::new("root"))
            .build();

        async {
            let previous = tracker.track_operation_begin("op1", Some("GET /"), None, None);
            assert_eq!(previous.id(), Some("root"));
            tokio::task::yield_now().await;
            tracker.track_event("inside", Dimensions::new());

            let outer = tracker.track_operation_begin("op1", None, Some("op1.1"), None);
            tracker.track_event("nested", Dimensions::new());
            tracker.track_operation_end(outer);

            tracker.track_operation_end(previous);
            tracker.track_event("after", Dimensions::new());
        }
        .with_current_operation()
        .await;

        tracker.publish().await;
        let batch = &publisher.batches()[0].items;
        assert_eq!(batch[0].operation().id(), Some("op1"));
        assert_eq!(batch[0].operation().name(), Some("GET /"));
        assert_eq!(batch[1].operation().parent_id(), Some("op1.1"));
        assert_eq!(batch[2].operation().id(), Some("root"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn operations_begun_outside_a_scope_stay_off_other_tasks() {
        let publisher = InMemoryPublisher::default();
        let tracker = Arc::new(
            TelemetryTracker::builder()
                .with_publisher(publisher.clone())
                .with_root_operation(OperationContext::new("root"))
                .build(),
        );

        let request = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                let previous = tracker.track_operation_begin("request-A", None, None, None);
                assert_eq!(previous.id(), Some("root"));
                tokio::task::yield_now().await;
                tracker.track_event("request", Dimensions::new());
            })
        };
        let unrelated = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                tracker.track_event("unrelated", Dimensions::new());
            })
        };
        request.await.unwrap();
        unrelated.await.unwrap();

        tracker.publish().await;
        let batch = &publisher.batches()[0].items;
        assert_eq!(batch.len(), 2);
        for item in batch {
            assert_eq!(item.operation().id(), Some("root"));
        }
    }

    #[tokio::test]
    async fn skipped_operation_end_does_not_outlive_its_scope() {
        let tracker = TelemetryTracker::builder()
            .with_root_operation(OperationContext::new("root"))
            .build();

        async {
            tracker.track_operation_begin("request-A", None, None, None);
            tokio::task::yield_now().await;
            assert_eq!(tracker.current_operation().id(), Some("request-A"));
        }
        .with_current_operation()
        .await;
        assert_eq!(tracker.current_operation().id(), Some("root"));

        {
            let _guard = OperationContext::new("sync").attach();
            let previous = tracker.track_operation_begin("request-B", None, None, None);
            assert_eq!(previous.id(), Some("sync"));
            assert_eq!(tracker.current_operation().id(), Some("request-B"));
        }
        assert_eq!(tracker.current_operation().id(), Some("root"));
    }

    #[tokio::test]
    async fn cancelled_publish_does_not_requeue_items() {
        let tracker = TelemetryTracker::builder()
            .with_publisher(StalledPublisher)
            .build();
        tracker.track_event("first", Dimensions::new());
        tracker.track_event("second", Dimensions::new());

        let outcome = tokio::time::timeout(Duration::from_millis(20), tracker.publish()).await;

        assert!(outcome.is_err());
        assert_eq!(tracker.pending_count(), 0);
        assert!(tracker.publish().await.is_empty());
    }

    #[tokio::test]
    async fn track_helpers_fill_kind_fields() {
        let publisher = InMemoryPublisher::default();
        let tracker = TelemetryTracker::builder()
            .with_publisher(publisher.clone())
            .build();

        tracker.track_request(
            "r1",
            "GET /orders",
            Some("https://shop/orders".into()),
            "200",
            true,
            Duration::from_millis(12),
            Dimensions::new().with_measurement("rows", 3.0),
        );
        tracker.track_error(
            &std::io::Error::new(std::io::ErrorKind::Other, "boom"),
            Some(SeverityLevel::Error),
            Dimensions::new(),
        );

        tracker.publish().await;
        let batch = &publisher.batches()[0].items;
        match &batch[0] {
            Telemetry::Request(request) => {
                assert_eq!(request.response_code, "200");
                assert_eq!(request.measurements, vec![("rows".to_string(), 3.0)]);
            }
            other => panic!("unexpected item {other:?}"),
        }
        match &batch[1] {
            Telemetry::Exception(exception) => {
                assert_eq!(exception.exceptions[0].message, "boom");
                assert_eq!(exception.severity_level, Some(SeverityLevel::Error));
            }
            other => panic!("unexpected item {other:?}"),
        }
    }
}
