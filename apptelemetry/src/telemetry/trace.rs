use super::KeyValues;
use crate::context::OperationContext;
use chrono::{DateTime, Utc};
use std::fmt;
use typed_builder::TypedBuilder;

/// A diagnostic message.
#[derive(TypedBuilder, Clone, Debug, PartialEq)]
pub struct TraceTelemetry {
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
    /// The message.
    #[builder(setter(into))]
    pub message: String,
    /// Severity of the message.
    #[builder(default)]
    pub severity_level: SeverityLevel,
}

/// Severity of a trace or exception.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeverityLevel {
    /// Detailed diagnostics.
    Verbose = 0,
    /// Normal operation.
    #[default]
    Information = 1,
    /// Something unexpected that the application recovered from.
    Warning = 2,
    /// A failure of the current operation.
    Error = 3,
    /// A failure the application cannot recover from.
    Critical = 4,
}

impl SeverityLevel {
    const NAMES: [&'static str; 5] = ["Verbose", "Information", "Warning", "Error", "Critical"];

    /// The name used on the wire.
    pub fn as_str(&self) -> &'static str {
        SeverityLevel::NAMES[*self as usize]
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::SeverityLevel;

    #[test]
    fn severity_names_follow_their_index() {
        assert_eq!(SeverityLevel::Verbose.as_str(), "Verbose");
        assert_eq!(SeverityLevel::Information.as_str(), "Information");
        assert_eq!(SeverityLevel::Warning.as_str(), "Warning");
        assert_eq!(SeverityLevel::Error.as_str(), "Error");
        assert_eq!(SeverityLevel::Critical as usize, 4);
        assert_eq!(SeverityLevel::Critical.to_string(), "Critical");
    }
}
