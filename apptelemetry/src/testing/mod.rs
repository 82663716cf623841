//! Helpers for testing code that records telemetry.
mod in_memory_publisher;

pub use in_memory_publisher::{InMemoryPublisher, PublishedBatch};
