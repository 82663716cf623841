use super::{KeyValues, Measurements};
use crate::context::OperationContext;
use chrono::{DateTime, Utc};
use std::time::Duration;
use typed_builder::TypedBuilder;

/// An incoming request handled by the application.
#[derive(TypedBuilder, Clone, Debug, PartialEq)]
pub struct RequestTelemetry {
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
    /// Id of the request.
    #[builder(setter(into))]
    pub id: String,
    /// Name of the request, e.g. `GET /orders/{id}`.
    #[builder(setter(into))]
    pub name: String,
    /// Request URL.
    #[builder(setter(into, strip_option), default)]
    pub url: Option<String>,
    /// Result of the request, e.g. the HTTP status code.
    #[builder(setter(into))]
    pub response_code: String,
    /// Source of the request, e.g. the caller's instrumentation key.
    #[builder(setter(into, strip_option), default)]
    pub source: Option<String>,
    /// Whether the request succeeded.
    pub success: bool,
    /// Time taken to serve the request.
    pub duration: Duration,
    /// Custom measurements.
    #[builder(default)]
    pub measurements: Measurements,
}
