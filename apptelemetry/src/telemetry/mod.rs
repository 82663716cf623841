//! Telemetry items.
//!
//! Every item is a plain value built once at the call site and handed to the
//! tracker by value. Nothing mutates an item afterwards, which is what allows
//! one drained batch to be serialized by several publishers at the same time
//! without copying it.
//!
//! All kinds share the same common shape:
//!
//! | Field        | Meaning                                                   |
//! | ------------ | --------------------------------------------------------- |
//! | `operation`  | correlation identifiers of the logical operation          |
//! | `time`       | UTC timestamp of the observation                          |
//! | `properties` | ordered custom dimensions, written as `properties`        |
//! | `tags`       | ordered item-level tags, merged into the envelope `tags`  |
use crate::context::OperationContext;
use chrono::{DateTime, Utc};

mod availability;
pub mod dependency_type;
mod dependency;
mod event;
mod exception;
mod metric;
mod page_view;
mod request;
mod trace;

pub use availability::AvailabilityTelemetry;
pub use dependency::DependencyTelemetry;
pub use event::EventTelemetry;
pub use exception::{ExceptionInfo, ExceptionTelemetry, StackFrameInfo, MAX_EXCEPTION_MESSAGE_LENGTH};
pub use metric::{MetricTelemetry, MetricValueAggregation};
pub use page_view::PageViewTelemetry;
pub use request::RequestTelemetry;
pub use trace::{SeverityLevel, TraceTelemetry};

/// An ordered list of string key-value pairs. Keys are not required to be
/// unique.
pub type KeyValues = Vec<(String, String)>;

/// An ordered list of named numeric measurements.
pub type Measurements = Vec<(String, f64)>;

/// One telemetry item of any kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Telemetry {
    /// Result of an availability test.
    Availability(AvailabilityTelemetry),
    /// A call from the application to an external component.
    Dependency(DependencyTelemetry),
    /// A named business or diagnostic event.
    Event(EventTelemetry),
    /// An error with its chain of causes.
    Exception(ExceptionTelemetry),
    /// A single metric sample or pre-aggregated summary.
    Metric(MetricTelemetry),
    /// A page or screen shown to a user.
    PageView(PageViewTelemetry),
    /// An incoming request handled by the application.
    Request(RequestTelemetry),
    /// A diagnostic log message.
    Trace(TraceTelemetry),
}

macro_rules! each_kind {
    ($value:expr, $item:ident => $body:expr) => {
        match $value {
            Telemetry::Availability($item) => $body,
            Telemetry::Dependency($item) => $body,
            Telemetry::Event($item) => $body,
            Telemetry::Exception($item) => $body,
            Telemetry::Metric($item) => $body,
            Telemetry::PageView($item) => $body,
            Telemetry::Request($item) => $body,
            Telemetry::Trace($item) => $body,
        }
    };
}

impl Telemetry {
    /// The operation the item belongs to.
    pub fn operation(&self) -> &OperationContext {
        each_kind!(self, item => &item.operation)
    }

    /// When the item was observed.
    pub fn time(&self) -> DateTime<Utc> {
        each_kind!(self, item => item.time)
    }

    /// Custom properties of the item.
    pub fn properties(&self) -> &[(String, String)] {
        each_kind!(self, item => &item.properties)
    }

    /// Item-level tags.
    pub fn tags(&self) -> &[(String, String)] {
        each_kind!(self, item => &item.tags)
    }
}

macro_rules! impl_from_kind {
    ($($variant:ident($kind:ty)),+ $(,)?) => {
        $(
            impl From<$kind> for Telemetry {
                fn from(item: $kind) -> Self {
                    Telemetry::$variant(item)
                }
            }
        )+
    };
}

impl_from_kind!(
    Availability(AvailabilityTelemetry),
    Dependency(DependencyTelemetry),
    Event(EventTelemetry),
    Exception(ExceptionTelemetry),
    Metric(MetricTelemetry),
    PageView(PageViewTelemetry),
    Request(RequestTelemetry),
    Trace(TraceTelemetry),
);

/// Optional dimensions accepted by the `track_*` operations of the tracker.
///
/// Kinds that have no measurements on the wire (metrics and traces) ignore
/// [`Dimensions::measurements`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dimensions {
    /// Named numeric measurements.
    pub measurements: Measurements,
    /// Custom properties.
    pub properties: KeyValues,
    /// Item-level tags.
    pub tags: KeyValues,
}

impl Dimensions {
    /// Empty dimensions.
    pub fn new() -> Self {
        Dimensions::default()
    }

    /// Adds a measurement.
    pub fn with_measurement(mut self, name: impl Into<String>, value: f64) -> Self {
        self.measurements.push((name.into(), value));
        self
    }

    /// Adds a custom property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    /// Adds an item-level tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }
}
