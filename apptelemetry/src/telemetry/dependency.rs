use super::{KeyValues, Measurements};
use crate::context::OperationContext;
use chrono::{DateTime, Utc};
use std::time::Duration;
use typed_builder::TypedBuilder;

/// A call from the application to a remote component such as an HTTP API,
/// a database or a storage account.
#[derive(TypedBuilder, Clone, Debug, PartialEq)]
pub struct DependencyTelemetry {
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
    /// Dependency type, see [`dependency_type`](super::dependency_type).
    #[builder(setter(into))]
    pub dependency_type: String,
    /// Id of the call, used as parent id by the callee.
    #[builder(setter(into))]
    pub id: String,
    /// Name of the command, e.g. `GET /orders`.
    #[builder(setter(into))]
    pub name: String,
    /// Target site, usually the host.
    #[builder(setter(into, strip_option), default)]
    pub target: Option<String>,
    /// The full command, e.g. the URL or SQL statement.
    #[builder(setter(into, strip_option), default)]
    pub data: Option<String>,
    /// Result code, e.g. the HTTP status code.
    #[builder(setter(into, strip_option), default)]
    pub result_code: Option<String>,
    /// How long the call took.
    pub duration: Duration,
    /// Whether the call succeeded.
    pub success: bool,
    /// Custom measurements.
    #[builder(default)]
    pub measurements: Measurements,
}
