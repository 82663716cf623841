//! Streaming JSON encoding of telemetry envelopes.
//!
//! Each item becomes one compact JSON object:
//!
//! ```text
//! {"data":{"baseData":{..},"baseType":".."},"iKey":"..","name":"..","properties":{..},"tags":{..},"time":".."}
//! ```
//!
//! Availability and metric items carry their `properties` inside `baseData`;
//! all other kinds carry them in the envelope. Empty `properties` and
//! `measurements` are left out. The encoder writes no separator between
//! items, which is the framing the ingestion endpoint expects.
mod writer;

use apptelemetry::telemetry::{
    AvailabilityTelemetry, DependencyTelemetry, EventTelemetry, ExceptionInfo,
    ExceptionTelemetry, MetricTelemetry, PageViewTelemetry, RequestTelemetry, StackFrameInfo,
    TraceTelemetry,
};
use apptelemetry::{OperationContext, Telemetry};
use chrono::SecondsFormat;
use std::io::{self, Write};
use uuid::Uuid;
use writer::JsonWriter;

/// Longest property key that is sent, in characters.
pub const MAX_PROPERTY_KEY_LENGTH: usize = 150;
/// Longest property value that is sent, in characters.
pub const MAX_PROPERTY_VALUE_LENGTH: usize = 8192;

struct Envelope {
    name: &'static str,
    base_type: &'static str,
    properties_in_base_data: bool,
}

fn envelope(item: &Telemetry) -> Envelope {
    let (name, base_type, properties_in_base_data) = match item {
        Telemetry::Availability(_) => ("AppAvailabilityResults", "AvailabilityData", true),
        Telemetry::Dependency(_) => ("AppDependencies", "RemoteDependencyData", false),
        Telemetry::Event(_) => ("AppEvents", "EventData", false),
        Telemetry::Exception(_) => ("AppExceptions", "ExceptionData", false),
        Telemetry::Metric(_) => ("AppMetrics", "MetricData", true),
        Telemetry::PageView(_) => ("AppPageViews", "PageViewData", false),
        Telemetry::Request(_) => ("AppRequests", "RequestData", false),
        Telemetry::Trace(_) => ("AppTraces", "MessageData", false),
    };
    Envelope {
        name,
        base_type,
        properties_in_base_data,
    }
}

/// Writes `item` as one JSON envelope.
///
/// `tags` is assembled from the operation of the item, then the item tags,
/// `tracker_tags` and `publisher_tags`. Keys repeated across those layers are
/// all written, so a reader that keeps the last value sees the publisher's.
pub fn write_telemetry<W: Write>(
    out: &mut W,
    item: &Telemetry,
    instrumentation_key: &Uuid,
    tracker_tags: &[(String, String)],
    publisher_tags: &[(String, String)],
) -> io::Result<()> {
    let envelope = envelope(item);
    let mut w = JsonWriter::new(out);

    w.begin_object()?;
    w.key("data")?;
    w.begin_object()?;
    w.key("baseData")?;
    w.begin_object()?;
    write_base_data(&mut w, item)?;
    if envelope.properties_in_base_data {
        write_properties(&mut w, item.properties())?;
    }
    w.end_object()?;
    w.field_str("baseType", envelope.base_type)?;
    w.end_object()?;

    w.field_str("iKey", &instrumentation_key.hyphenated().to_string())?;
    w.field_str("name", envelope.name)?;
    if !envelope.properties_in_base_data {
        write_properties(&mut w, item.properties())?;
    }

    w.key("tags")?;
    w.begin_object()?;
    write_operation_tags(&mut w, item.operation())?;
    for (key, value) in item.tags().iter().chain(tracker_tags).chain(publisher_tags) {
        write_pair(&mut w, key, value)?;
    }
    w.end_object()?;

    w.field_str(
        "time",
        &item.time().to_rfc3339_opts(SecondsFormat::Micros, true),
    )?;
    w.end_object()
}

fn write_base_data<W: Write>(w: &mut JsonWriter<'_, W>, item: &Telemetry) -> io::Result<()> {
    match item {
        Telemetry::Availability(item) => write_availability(w, item),
        Telemetry::Dependency(item) => write_dependency(w, item),
        Telemetry::Event(item) => write_event(w, item),
        Telemetry::Exception(item) => write_exception(w, item),
        Telemetry::Metric(item) => write_metric(w, item),
        Telemetry::PageView(item) => write_page_view(w, item),
        Telemetry::Request(item) => write_request(w, item),
        Telemetry::Trace(item) => write_trace(w, item),
    }
}

fn write_availability<W: Write>(
    w: &mut JsonWriter<'_, W>,
    item: &AvailabilityTelemetry,
) -> io::Result<()> {
    w.field_duration("duration", item.duration)?;
    w.field_str("id", &item.id)?;
    w.field_opt_str("message", item.message.as_deref())?;
    w.field_str("name", &item.name)?;
    w.field_opt_str("runLocation", item.run_location.as_deref())?;
    w.field_bool("success", item.success)?;
    write_measurements(w, &item.measurements)
}

fn write_dependency<W: Write>(
    w: &mut JsonWriter<'_, W>,
    item: &DependencyTelemetry,
) -> io::Result<()> {
    w.field_opt_str("data", item.data.as_deref())?;
    w.field_duration("duration", item.duration)?;
    w.field_str("id", &item.id)?;
    w.field_str("name", &item.name)?;
    w.field_opt_str("resultCode", item.result_code.as_deref())?;
    w.field_bool("success", item.success)?;
    w.field_opt_str("target", item.target.as_deref())?;
    w.field_str("type", &item.dependency_type)?;
    write_measurements(w, &item.measurements)
}

fn write_event<W: Write>(w: &mut JsonWriter<'_, W>, item: &EventTelemetry) -> io::Result<()> {
    w.field_str("name", &item.name)?;
    write_measurements(w, &item.measurements)
}

fn write_exception<W: Write>(
    w: &mut JsonWriter<'_, W>,
    item: &ExceptionTelemetry,
) -> io::Result<()> {
    w.key("exceptions")?;
    w.begin_array()?;
    for exception in &item.exceptions {
        write_exception_info(w, exception)?;
    }
    w.end_array()?;
    w.field_opt_str("problemId", item.problem_id.as_deref())?;
    if let Some(severity_level) = item.severity_level {
        w.field_str("severityLevel", severity_level.as_str())?;
    }
    write_measurements(w, &item.measurements)
}

fn write_exception_info<W: Write>(
    w: &mut JsonWriter<'_, W>,
    exception: &ExceptionInfo,
) -> io::Result<()> {
    w.begin_object()?;
    w.field_bool("hasFullStack", exception.has_full_stack)?;
    w.field_int("id", exception.id.into())?;
    w.field_str("message", &exception.normalized_message())?;
    w.field_int("outerId", exception.outer_id.into())?;
    if !exception.parsed_stack.is_empty() {
        w.key("parsedStack")?;
        w.begin_array()?;
        for frame in &exception.parsed_stack {
            write_stack_frame(w, frame)?;
        }
        w.end_array()?;
    }
    w.field_str("typeName", &exception.type_name)?;
    w.end_object()
}

fn write_stack_frame<W: Write>(w: &mut JsonWriter<'_, W>, frame: &StackFrameInfo) -> io::Result<()> {
    w.begin_object()?;
    w.field_str("assembly", &frame.assembly)?;
    w.field_opt_str("fileName", frame.file_name.as_deref())?;
    w.field_int("level", frame.level.into())?;
    w.field_int("line", frame.line.into())?;
    w.field_opt_str("method", frame.method.as_deref())?;
    w.end_object()
}

fn write_metric<W: Write>(w: &mut JsonWriter<'_, W>, item: &MetricTelemetry) -> io::Result<()> {
    w.key("metrics")?;
    w.begin_array()?;
    w.begin_object()?;
    if let Some(aggregation) = &item.aggregation {
        w.field_int("count", aggregation.count.into())?;
        w.field_float("max", aggregation.max)?;
        w.field_float("min", aggregation.min)?;
    }
    w.field_str("name", &item.name)?;
    w.field_str("ns", &item.namespace)?;
    w.field_float("value", item.value)?;
    w.end_object()?;
    w.end_array()
}

fn write_page_view<W: Write>(
    w: &mut JsonWriter<'_, W>,
    item: &PageViewTelemetry,
) -> io::Result<()> {
    w.field_duration("duration", item.duration)?;
    w.field_str("id", &item.id)?;
    w.field_str("name", &item.name)?;
    w.field_opt_str("url", item.url.as_deref())?;
    write_measurements(w, &item.measurements)
}

fn write_request<W: Write>(w: &mut JsonWriter<'_, W>, item: &RequestTelemetry) -> io::Result<()> {
    w.field_duration("duration", item.duration)?;
    w.field_str("id", &item.id)?;
    w.field_str("name", &item.name)?;
    w.field_str("responseCode", &item.response_code)?;
    w.field_opt_str("source", item.source.as_deref())?;
    w.field_bool("success", item.success)?;
    w.field_opt_str("url", item.url.as_deref())?;
    write_measurements(w, &item.measurements)
}

fn write_trace<W: Write>(w: &mut JsonWriter<'_, W>, item: &TraceTelemetry) -> io::Result<()> {
    w.field_str("message", &item.message)?;
    w.field_str("severityLevel", item.severity_level.as_str())
}

fn write_operation_tags<W: Write>(
    w: &mut JsonWriter<'_, W>,
    operation: &OperationContext,
) -> io::Result<()> {
    let tags = [
        ("ai.operation.id", operation.id()),
        ("ai.operation.name", operation.name()),
        ("ai.operation.parentId", operation.parent_id()),
        ("ai.operation.syntheticSource", operation.synthetic_source()),
    ];
    for (key, value) in tags {
        if let Some(value) = value {
            write_pair(w, key, value)?;
        }
    }
    Ok(())
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Writes `"key":"value"` unless either side is blank.
fn write_pair<W: Write>(w: &mut JsonWriter<'_, W>, key: &str, value: &str) -> io::Result<()> {
    if is_blank(key) || is_blank(value) {
        return Ok(());
    }
    w.field_str(key, value)
}

fn write_properties<W: Write>(
    w: &mut JsonWriter<'_, W>,
    properties: &[(String, String)],
) -> io::Result<()> {
    let mut properties = properties
        .iter()
        .filter(|(key, value)| !is_blank(key) && !is_blank(value))
        .peekable();
    if properties.peek().is_none() {
        return Ok(());
    }

    w.key("properties")?;
    w.begin_object()?;
    for (key, value) in properties {
        w.field_str(
            truncate(key, MAX_PROPERTY_KEY_LENGTH),
            truncate(value, MAX_PROPERTY_VALUE_LENGTH),
        )?;
    }
    w.end_object()
}

fn write_measurements<W: Write>(
    w: &mut JsonWriter<'_, W>,
    measurements: &[(String, f64)],
) -> io::Result<()> {
    let mut measurements = measurements
        .iter()
        .filter(|(name, _)| !is_blank(name))
        .peekable();
    if measurements.peek().is_none() {
        return Ok(());
    }

    w.key("measurements")?;
    w.begin_object()?;
    for (name, value) in measurements {
        w.field_float(name, *value)?;
    }
    w.end_object()
}

fn truncate(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}
