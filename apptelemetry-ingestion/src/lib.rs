//! Publishes [`apptelemetry`] items to the Application Insights ingestion
//! endpoint.
//!
//! [`IngestionPublisher`] encodes a batch as a stream of JSON envelopes (see
//! [`encoder`]), compresses it with gzip and posts it to `v2/track`, or to
//! `v2.1/track` with a bearer token when an [`AccessTokenProvider`] is
//! configured.
//!
//! ```no_run
//! use apptelemetry::{Dimensions, TelemetryTracker};
//! use apptelemetry_ingestion::IngestionPublisher;
//!
//! # async fn run() -> Result<(), apptelemetry_ingestion::Error> {
//! let publisher = IngestionPublisher::builder()
//!     .with_connection_string(
//!         "InstrumentationKey=0123abcd-0000-4000-8000-00000000abcd;\
//!          IngestionEndpoint=https://westeurope-1.in.applicationinsights.azure.com/",
//!     )?
//!     .with_tag("ai.cloud.role", "checkout")
//!     .build()?;
//!
//! let tracker = TelemetryTracker::builder().with_publisher(publisher).build();
//! tracker.track_event("Started", Dimensions::new());
//!
//! for result in tracker.publish().await {
//!     match result {
//!         Ok(result) if result.success => {}
//!         Ok(result) => eprintln!("ingestion rejected the batch: {:?}", result.http),
//!         Err(err) => eprintln!("publish failed: {err}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! When neither the instrumentation key nor the endpoint is set on the
//! builder, both are read from the `APPLICATIONINSIGHTS_CONNECTION_STRING`
//! environment variable. The endpoint defaults to
//! `https://dc.services.visualstudio.com/`.
//!
//! ## Crate Feature Flags
//!
//! * `reqwest-client` (enabled by default): use [`reqwest`] as the default
//!   HTTP client.
//! * `reqwest-rustls`: use [`reqwest`] with TLS provided by `rustls`.
//! * `internal-logs` (enabled by default): diagnostics through `tracing`.
//!
//! [`reqwest`]: https://docs.rs/reqwest
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(
    docsrs,
    feature(doc_cfg, doc_auto_cfg),
    deny(rustdoc::broken_intra_doc_links)
)]

pub mod encoder;
mod env;
mod publisher;

pub use env::ENV_CONNECTION_STRING;
pub use publisher::{
    AccessTokenProvider, BearerToken, Compression, IngestionPublisher, IngestionPublisherBuilder,
    TokenError,
};

use apptelemetry::PublishError;
use apptelemetry_http::HttpError;

/// Errors of the ingestion publisher.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The ingestion endpoint is not an absolute http(s) URI.
    #[error("invalid ingestion endpoint: {0}")]
    InvalidEndpoint(String),

    /// The instrumentation key is missing or nil.
    #[error("instrumentation key must be set and must not be empty")]
    EmptyInstrumentationKey,

    /// The instrumentation key is not a UUID.
    #[error("invalid instrumentation key: {0}")]
    InvalidInstrumentationKey(String),

    /// The connection string could not be parsed.
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// No http client implementation found. User should provide one or enable features.
    #[error("http client must be set, users can enable the reqwest-client feature to use the http client implementation within the crate")]
    NoHttpClient,

    /// Building the request failed.
    #[error("http request failed with {0}")]
    RequestFailed(#[from] http::Error),

    /// Sending the request failed before a response was received.
    #[error("http transport failed: {0}")]
    Transport(#[source] HttpError),

    /// Encoding or compressing the batch failed.
    #[error("encoding the batch failed: {0}")]
    Encode(#[from] std::io::Error),

    /// The access token provider failed.
    #[error("acquiring an access token failed: {0}")]
    AccessToken(String),

    /// The access token cannot be sent as a header value.
    #[error("invalid header value")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
}

impl PublishError for Error {
    fn publisher_name(&self) -> &'static str {
        "ingestion"
    }
}
