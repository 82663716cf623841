//! The publisher contract used by the tracker.
use crate::error::TelemetryResult;
use crate::telemetry::Telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::time::Duration;

/// Sends batches of telemetry somewhere.
///
/// The tracker calls every configured publisher concurrently with the same
/// borrowed batch, so implementations must only read the items. A publisher
/// that fails does so for itself only: its error is reported in its own slot
/// of the tracker's result.
#[async_trait]
pub trait TelemetryPublisher: Debug + Send + Sync {
    /// Publishes `batch`, adding `tracker_tags` to every item.
    ///
    /// Dropping the returned future cancels the attempt. Items are never
    /// handed back to the tracker.
    async fn publish(
        &self,
        batch: &[Telemetry],
        tracker_tags: &[(String, String)],
    ) -> TelemetryResult<PublishResult>;
}

/// Outcome of one publish call of one publisher.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishResult {
    /// Number of items in the batch.
    pub count: usize,
    /// Time spent sending the batch.
    pub duration: Duration,
    /// Whether the receiving end accepted the batch.
    pub success: bool,
    /// When the batch was sent.
    pub time: DateTime<Utc>,
    /// Details of the HTTP exchange, for publishers that use HTTP.
    pub http: Option<HttpExchange>,
}

/// The HTTP part of a [`PublishResult`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpExchange {
    /// HTTP status code of the response.
    pub status_code: u16,
    /// Raw response body. Never parsed by the publisher.
    pub response: String,
    /// The URL the batch was posted to.
    pub url: String,
}
