//! Diagnostics emitted by the tracker and by publishers.
//!
//! The macros (`telemetry_info!`, `telemetry_warn!`, `telemetry_debug!` and
//! `telemetry_error!`) are meant for this workspace and for custom
//! publishers, not for application logging. Events go through `tracing` only
//! when the calling crate enables its `internal-logs` feature, so nothing is
//! written unless the application installs a subscriber. Under `cfg(test)`
//! events are also printed to stdout and show up with `--nocapture`.
//!
//! Every event has a `name` of the form `Component.Event` followed by
//! optional `key = value` attributes:
//!
//! ```rust
//! use apptelemetry::telemetry_info;
//! telemetry_info!(name: "Tracker.Built", publishers = 2);
//! ```

#[doc(hidden)]
#[macro_export]
macro_rules! __telemetry_event {
    ($level:ident, $label:literal, $name:expr $(, $key:ident = $value:expr)*) => {{
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::$level!(
                name: $name,
                target: env!("CARGO_PKG_NAME"),
                name = $name
                $(, $key = { $value })*
            );
        }

        #[cfg(test)]
        {
            print!(concat!($label, ": name={}"), $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )*
            println!();
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name $(, &$value)*);
        }
    }};
}

/// Logs an informational event.
#[macro_export]
macro_rules! telemetry_info {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__telemetry_event!(info, "telemetry_info", $name $(, $key = $value)*)
    };
}

/// Logs a warning, e.g. a publisher that failed.
#[macro_export]
macro_rules! telemetry_warn {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__telemetry_event!(warn, "telemetry_warn", $name $(, $key = $value)*)
    };
}

/// Logs a debug event.
#[macro_export]
macro_rules! telemetry_debug {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__telemetry_event!(debug, "telemetry_debug", $name $(, $key = $value)*)
    };
}

/// Logs an error that the library cannot report through a result.
#[macro_export]
macro_rules! telemetry_error {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__telemetry_event!(error, "telemetry_error", $name $(, $key = $value)*)
    };
}
