//! Typed client-side telemetry for the Application Insights data model.
//!
//! *[Supported Rust Versions](#supported-rust-versions)*
//!
//! # Overview
//!
//! This crate contains the pieces an application records telemetry with:
//!
//! - [`telemetry`]: the eight item kinds (availability, dependency, event,
//!   exception, metric, page view, request, trace) and the shared
//!   [`Dimensions`] accepted by the tracker.
//! - [`OperationContext`]: correlation identifiers with an ambient, per call
//!   chain "current" value that follows `.await` points through
//!   [`OperationFutureExt`].
//! - [`TelemetryTracker`]: a thread-safe queue that stamps items with the
//!   current operation and hands drained batches to every configured
//!   [`TelemetryPublisher`] concurrently.
//!
//! Sending items to the ingestion service lives in the
//! `apptelemetry-ingestion` crate; HTTP transports and dependency tracking of
//! outgoing calls live in `apptelemetry-http`.
//!
//! # Getting started
//!
//! ```no_run
//! use apptelemetry::{Dimensions, OperationContext, OperationFutureExt, TelemetryTracker};
//! # use apptelemetry::TelemetryPublisher;
//!
//! # async fn run(publisher: impl TelemetryPublisher + 'static) {
//! let tracker = TelemetryTracker::builder()
//!     .with_publisher(publisher)
//!     .build();
//!
//! async {
//!     tracker.track_event("OrderPlaced", Dimensions::new().with_measurement("total", 42.0));
//! }
//! .with_operation(OperationContext::new("4bf92f3577b34da6").with_name("POST /orders"))
//! .await;
//!
//! tracker.publish().await;
//! # }
//! ```
//!
//! # Crate Feature Flags
//!
//! * `internal-logs` (enabled by default): emits diagnostics about the
//!   tracker and publishers through `tracing`.
//! * `testing`: exposes [`testing::InMemoryPublisher`].
//!
//! # Supported Rust Versions
//!
//! This crate is built against the latest stable release. The minimum
//! supported version is 1.75. Increasing the minimum supported compiler
//! version is not considered a semver breaking change.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(
    docsrs,
    feature(doc_cfg, doc_auto_cfg),
    deny(rustdoc::broken_intra_doc_links)
)]

mod context;
mod error;
mod internal_logging;
mod publisher;
pub mod telemetry;
mod tracker;

#[cfg(any(feature = "testing", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

pub use context::{OperationContext, OperationFutureExt, OperationGuard, WithOperation};
pub use error::{PublishError, TelemetryError, TelemetryResult};
pub use publisher::{HttpExchange, PublishResult, TelemetryPublisher};
pub use telemetry::{
    AvailabilityTelemetry, DependencyTelemetry, Dimensions, EventTelemetry, ExceptionInfo,
    ExceptionTelemetry, MetricTelemetry, MetricValueAggregation, PageViewTelemetry,
    RequestTelemetry, SeverityLevel, StackFrameInfo, Telemetry, TraceTelemetry,
};
pub use tracker::{TelemetryTracker, TelemetryTrackerBuilder};

#[cfg(feature = "internal-logs")]
#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
