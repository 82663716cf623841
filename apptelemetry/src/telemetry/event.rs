use super::{KeyValues, Measurements};
use crate::context::OperationContext;
use chrono::{DateTime, Utc};
use typed_builder::TypedBuilder;

/// A named event.
#[derive(TypedBuilder, Clone, Debug, PartialEq)]
pub struct EventTelemetry {
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
    /// Name of the event.
    #[builder(setter(into))]
    pub name: String,
    /// Custom measurements.
    #[builder(default)]
    pub measurements: Measurements,
}
