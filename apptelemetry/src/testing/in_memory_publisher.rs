use crate::error::TelemetryResult;
use crate::publisher::{PublishResult, TelemetryPublisher};
use crate::telemetry::Telemetry;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A publisher that keeps every batch it receives in memory.
///
/// Clones share the same storage, so a clone can be handed to the tracker
/// while the test keeps the original to inspect what was published.
///
/// # Example
///
/// ```
/// # use apptelemetry::testing::InMemoryPublisher;
/// # use apptelemetry::{Dimensions, TelemetryTracker};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let publisher = InMemoryPublisher::default();
/// let tracker = TelemetryTracker::builder()
///     .with_publisher(publisher.clone())
///     .build();
///
/// tracker.track_event("Started", Dimensions::new());
/// tracker.publish().await;
///
/// assert_eq!(publisher.batches()[0].items.len(), 1);
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryPublisher {
    batches: Arc<Mutex<Vec<PublishedBatch>>>,
}

/// One batch received by an [`InMemoryPublisher`].
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedBatch {
    /// The items of the batch.
    pub items: Vec<Telemetry>,
    /// Tracker-level tags passed with the batch.
    pub tracker_tags: Vec<(String, String)>,
}

impl InMemoryPublisher {
    /// Returns the batches received so far, oldest first.
    pub fn batches(&self) -> Vec<PublishedBatch> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many times `publish` was called.
    pub fn invocation_count(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Forgets every received batch.
    pub fn reset(&self) {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl TelemetryPublisher for InMemoryPublisher {
    async fn publish(
        &self,
        batch: &[Telemetry],
        tracker_tags: &[(String, String)],
    ) -> TelemetryResult<PublishResult> {
        self.batches.lock()?.push(PublishedBatch {
            items: batch.to_vec(),
            tracker_tags: tracker_tags.to_vec(),
        });
        Ok(PublishResult {
            count: batch.len(),
            duration: Duration::ZERO,
            success: true,
            time: Utc::now(),
            http: None,
        })
    }
}
