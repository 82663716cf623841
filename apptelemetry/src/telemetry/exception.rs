use super::{KeyValues, Measurements, SeverityLevel};
use crate::context::OperationContext;
use chrono::{DateTime, Utc};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::error::Error;
use typed_builder::TypedBuilder;

/// Longest exception message that is kept, in characters.
pub const MAX_EXCEPTION_MESSAGE_LENGTH: usize = 32768;

/// An error and its causes.
#[derive(TypedBuilder, Clone, Debug, PartialEq)]
pub struct ExceptionTelemetry {
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
    /// The error chain, outermost first.
    pub exceptions: Vec<ExceptionInfo>,
    /// Severity, if known.
    #[builder(setter(strip_option), default)]
    pub severity_level: Option<SeverityLevel>,
    /// Identifier used to group equivalent failures.
    #[builder(setter(into, strip_option), default)]
    pub problem_id: Option<String>,
    /// Custom measurements.
    #[builder(default)]
    pub measurements: Measurements,
}

/// Snapshot of one error in a chain of causes.
///
/// `id` numbers the chain from 1; `outer_id` is the id of the error this one
/// caused, 0 for the outermost.
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionInfo {
    /// Position in the chain, starting at 1.
    pub id: i32,
    /// Id of the error this one caused, 0 for the outermost.
    pub outer_id: i32,
    /// Type of the error.
    pub type_name: String,
    /// The error message.
    pub message: String,
    /// Whether `parsed_stack` holds the complete stack.
    pub has_full_stack: bool,
    /// Parsed stack frames, outermost record only.
    pub parsed_stack: Vec<StackFrameInfo>,
}

/// One frame of a parsed stack.
#[derive(Clone, Debug, PartialEq)]
pub struct StackFrameInfo {
    /// The crate the frame belongs to.
    pub assembly: String,
    /// Source file, if resolved.
    pub file_name: Option<String>,
    /// Depth of the frame, 0 is the innermost call.
    pub level: i32,
    /// Line in `file_name`, 0 if unknown.
    pub line: i32,
    /// Function name, if resolved.
    pub method: Option<String>,
}

impl ExceptionInfo {
    /// Captures `err` and its `source()` chain.
    ///
    /// The outermost record carries the type name of `E` and, when backtraces
    /// are enabled through `RUST_BACKTRACE`/`RUST_LIB_BACKTRACE`, a parsed
    /// stack of the capture site.
    pub fn from_error<E: Error + 'static>(err: &E) -> Vec<ExceptionInfo> {
        let mut chain = ExceptionInfo::from_dyn_error(err);
        if let Some(outermost) = chain.first_mut() {
            outermost.type_name = std::any::type_name::<E>().to_string();
            let backtrace = Backtrace::capture();
            if backtrace.status() == BacktraceStatus::Captured {
                outermost.parsed_stack = parse_backtrace(&backtrace.to_string());
                outermost.has_full_stack = !outermost.parsed_stack.is_empty();
            }
        }
        chain
    }

    /// Captures a type-erased error and its `source()` chain, without stacks.
    pub fn from_dyn_error(err: &(dyn Error + 'static)) -> Vec<ExceptionInfo> {
        let mut chain = Vec::new();
        let mut current = Some(err);
        while let Some(err) = current {
            let id = chain.len() as i32 + 1;
            chain.push(ExceptionInfo {
                id,
                outer_id: id - 1,
                type_name: "Error".to_string(),
                message: normalize_message(&err.to_string()),
                has_full_stack: false,
                parsed_stack: Vec::new(),
            });
            current = err.source();
        }
        chain
    }

    /// The message as it is sent: line breaks collapsed into spaces and at
    /// most [`MAX_EXCEPTION_MESSAGE_LENGTH`] characters.
    ///
    /// Records built by [`from_error`](Self::from_error) are already in this
    /// form; hand-built ones may not be.
    pub fn normalized_message(&self) -> Cow<'_, str> {
        if self.message.len() <= MAX_EXCEPTION_MESSAGE_LENGTH
            && !self.message.contains(&['\r', '\n'][..])
        {
            Cow::Borrowed(&self.message)
        } else {
            Cow::Owned(normalize_message(&self.message))
        }
    }
}

/// Collapses line breaks into spaces and caps the length.
fn normalize_message(message: &str) -> String {
    let mut normalized = String::with_capacity(message.len().min(MAX_EXCEPTION_MESSAGE_LENGTH));
    let mut chars = message.chars().peekable();
    let mut count = 0;
    while let Some(c) = chars.next() {
        if count == MAX_EXCEPTION_MESSAGE_LENGTH {
            break;
        }
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                normalized.push(' ');
            }
            '\n' => normalized.push(' '),
            c => normalized.push(c),
        }
        count += 1;
    }
    normalized
}

/// Parses the `Display` output of a captured [`Backtrace`].
///
/// Frames of the backtrace machinery and of this module are dropped; the
/// remaining frames are renumbered from 0.
fn parse_backtrace(rendered: &str) -> Vec<StackFrameInfo> {
    let mut frames: Vec<StackFrameInfo> = Vec::new();
    for line in rendered.lines() {
        let line = line.trim();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                let mut parts = location.rsplitn(3, ':');
                let _column = parts.next();
                let line_number = parts.next().and_then(|l| l.parse().ok());
                match (line_number, parts.next()) {
                    (Some(line_number), Some(file)) => {
                        frame.line = line_number;
                        frame.file_name = Some(file.to_string());
                    }
                    _ => frame.file_name = Some(location.to_string()),
                }
            }
        } else if let Some((index, symbol)) = line.split_once(": ") {
            if index.chars().all(|c| c.is_ascii_digit()) {
                frames.push(StackFrameInfo {
                    assembly: crate_of(symbol).to_string(),
                    file_name: None,
                    level: 0,
                    line: 0,
                    method: Some(symbol.to_string()),
                });
            }
        }
    }

    frames.retain(|frame| {
        let method = frame.method.as_deref().unwrap_or_default();
        !(method.starts_with("std::backtrace")
            || method.starts_with("<std::backtrace")
            || method.contains("telemetry::exception::ExceptionInfo"))
    });
    for (level, frame) in frames.iter_mut().enumerate() {
        frame.level = level as i32;
    }
    frames
}

fn crate_of(symbol: &str) -> &str {
    let symbol = symbol.trim_start_matches('<');
    symbol.split("::").next().unwrap_or(symbol)
}
