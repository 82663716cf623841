use super::{KeyValues, Measurements};
use crate::context::OperationContext;
use chrono::{DateTime, Utc};
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Result of an availability test, e.g. a periodic check of a public endpoint.
#[derive(TypedBuilder, Clone, Debug, PartialEq)]
pub struct AvailabilityTelemetry {
    /// Operation the item belongs to.
    #[builder(default)]
    pub operation: OperationContext,
    /// When the item was observed.
    #[builder(default = Utc::now())]
    pub time: DateTime<Utc>,
    /// Custom properties.
    #[builder(default)]
    pub properties: KeyValues,
    /// Item-level tags.
    #[builder(default)]
    pub tags: KeyValues,
    /// Id of this test run.
    #[builder(setter(into))]
    pub id: String,
    /// Name of the test.
    #[builder(setter(into))]
    pub name: String,
    /// How long the test took.
    pub duration: Duration,
    /// Whether the test passed.
    pub success: bool,
    /// Where the test ran from.
    #[builder(setter(into, strip_option), default)]
    pub run_location: Option<String>,
    /// Diagnostic message, usually the failure reason.
    #[builder(setter(into, strip_option), default)]
    pub message: Option<String>,
    /// Custom measurements.
    #[builder(default)]
    pub measurements: Measurements,
}
