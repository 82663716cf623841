use super::{KeyValues, Measurements};
use crate::context::OperationContext;
use chrono::{DateTime, Utc};
use std::time::Duration;
use typed_builder::TypedBuilder;

/// A page or screen displayed to a user.
#[derive(TypedBuilder, Clone, Debug, PartialEq)]
pub struct PageViewTelemetry {
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
    /// Id of this page view.
    #[builder(setter(into))]
    pub id: String,
    /// Name of the page.
    #[builder(setter(into))]
    pub name: String,
    /// URL of the page.
    #[builder(setter(into, strip_option), default)]
    pub url: Option<String>,
    /// Time it took to load the page.
    pub duration: Duration,
    /// Custom measurements.
    #[builder(default)]
    pub measurements: Measurements,
}
