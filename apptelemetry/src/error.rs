//! Errors surfaced by the tracker and by publishers.
use std::sync::PoisonError;
use thiserror::Error;

/// Describe the result of operations in the publish pipeline.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors returned while publishing telemetry.
///
/// Each configured publisher produces its own result, so one of these values
/// only ever describes the failure of a single publisher.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    /// A publisher failed to deliver its batch.
    #[error("publish failed by {name}: {0}", name = .0.publisher_name())]
    PublishFailed(Box<dyn PublishError>),

    /// A publisher panicked while handling its batch. The other publishers of
    /// the same call are unaffected.
    #[error("publisher panicked while publishing")]
    PublisherPanicked,

    /// Other types of failures not covered by the variants above.
    #[error("{0}")]
    Other(String),
}

impl<T> From<T> for TelemetryError
where
    T: PublishError,
{
    fn from(err: T) -> Self {
        TelemetryError::PublishFailed(Box::new(err))
    }
}

impl<T> From<PoisonError<T>> for TelemetryError {
    fn from(err: PoisonError<T>) -> Self {
        TelemetryError::Other(err.to_string())
    }
}

/// Trait for publisher-specific errors.
pub trait PublishError: std::error::Error + Send + Sync + 'static {
    /// The name of the publisher that produced the error.
    fn publisher_name(&self) -> &'static str;
}
