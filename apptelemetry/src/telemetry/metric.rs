use super::KeyValues;
use crate::context::OperationContext;
use chrono::{DateTime, Utc};
use typed_builder::TypedBuilder;

/// A metric value, optionally summarizing several samples.
#[derive(TypedBuilder, Clone, Debug, PartialEq)]
pub struct MetricTelemetry {
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
    /// Metric namespace, written as `ns`.
    #[builder(setter(into))]
    pub namespace: String,
    /// Name of the metric.
    #[builder(setter(into))]
    pub name: String,
    /// The value, or the sum of all samples when `aggregation` is set.
    pub value: f64,
    /// Summary of the samples when the value is pre-aggregated.
    #[builder(setter(strip_option), default)]
    pub aggregation: Option<MetricValueAggregation>,
}

/// Summary of the samples behind a pre-aggregated metric value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricValueAggregation {
    /// Number of samples.
    pub count: u32,
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
}

impl MetricValueAggregation {
    /// Creates a summary from its parts.
    pub fn new(count: u32, min: f64, max: f64) -> Self {
        MetricValueAggregation { count, min, max }
    }
}
