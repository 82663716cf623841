use crate::encoder::write_telemetry;
use crate::env::{self, ConnectionString, DEFAULT_INGESTION_ENDPOINT};
use crate::Error;
use apptelemetry::{
    telemetry_debug, telemetry_warn, HttpExchange, PublishResult, Telemetry, TelemetryPublisher,
    TelemetryResult,
};
use apptelemetry_http::{Bytes, HttpClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use http::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use http::{HeaderValue, Method, Request, Uri};
use std::fmt::{self, Debug, Display, Formatter};
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use uuid::Uuid;

const CONTENT_TYPE_JSON_STREAM: &str = "application/x-json-stream";
const TRACK_PATH: &str = "v2/track";
const AUTHENTICATED_TRACK_PATH: &str = "v2.1/track";

/// Error returned by an [`AccessTokenProvider`].
pub type TokenError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Supplies bearer tokens for authenticated ingestion.
#[async_trait]
pub trait AccessTokenProvider: Debug + Send + Sync {
    /// Acquires a new token.
    async fn access_token(&self) -> Result<BearerToken, TokenError>;
}

/// A bearer token and the time it stops being valid.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    value: String,
    expires_on: DateTime<Utc>,
}

impl BearerToken {
    /// Creates a token.
    pub fn new(value: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        BearerToken {
            value: value.into(),
            expires_on,
        }
    }

    /// The token itself.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the token expires.
    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_on
    }
}

impl Debug for BearerToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("value", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Compression applied to the request body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    /// Compresses data using gzip.
    Gzip,
}

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Gzip => write!(f, "gzip"),
        }
    }
}

/// Publishes batches to the Application Insights ingestion endpoint.
///
/// Failed batches are not retried. A non-success status code is reported as
/// an `Ok` result with `success == false`, carrying the status code and the
/// raw response body.
#[derive(Debug)]
pub struct IngestionPublisher {
    client: Box<dyn HttpClient>,
    ingestion_url: Uri,
    instrumentation_key: Uuid,
    token_provider: Option<Box<dyn AccessTokenProvider>>,
    cached_token: Mutex<Option<BearerToken>>,
    tags: Vec<(String, String)>,
    compression: Option<Compression>,
}

impl IngestionPublisher {
    /// Create a new [`IngestionPublisherBuilder`].
    pub fn builder() -> IngestionPublisherBuilder {
        IngestionPublisherBuilder::default()
    }

    /// The URL batches are posted to.
    pub fn ingestion_url(&self) -> &Uri {
        &self.ingestion_url
    }

    fn encode(&self, batch: &[Telemetry], tracker_tags: &[(String, String)]) -> Result<Bytes, Error> {
        match self.compression {
            Some(Compression::Gzip) => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                self.write_batch(&mut encoder, batch, tracker_tags)?;
                Ok(encoder.finish()?.into())
            }
            None => {
                let mut out = Vec::new();
                self.write_batch(&mut out, batch, tracker_tags)?;
                Ok(out.into())
            }
        }
    }

    fn write_batch<W: Write>(
        &self,
        out: &mut W,
        batch: &[Telemetry],
        tracker_tags: &[(String, String)],
    ) -> io::Result<()> {
        for item in batch {
            write_telemetry(out, item, &self.instrumentation_key, tracker_tags, &self.tags)?;
        }
        Ok(())
    }

    /// Returns the cached token while it is valid, otherwise asks the
    /// provider for a new one. Concurrent calls may both refresh; the last
    /// token stored wins.
    async fn access_token(&self) -> Result<Option<String>, Error> {
        let Some(provider) = &self.token_provider else {
            return Ok(None);
        };

        let cached = self
            .cached_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(token) = cached.filter(|token| token.is_valid_at(Utc::now())) {
            return Ok(Some(token.value));
        }

        let token = provider
            .access_token()
            .await
            .map_err(|err| Error::AccessToken(err.to_string()))?;
        telemetry_debug!(
            name: "IngestionPublisher.TokenRefreshed",
            expires_on = token.expires_on.to_rfc3339()
        );
        let value = token.value.clone();
        *self
            .cached_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token);
        Ok(Some(value))
    }
}

#[async_trait]
impl TelemetryPublisher for IngestionPublisher {
    async fn publish(
        &self,
        batch: &[Telemetry],
        tracker_tags: &[(String, String)],
    ) -> TelemetryResult<PublishResult> {
        let body = self.encode(batch, tracker_tags)?;

        let mut request = Request::builder()
            .method(Method::POST)
            .uri(self.ingestion_url.clone())
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON_STREAM);
        if let Some(compression) = self.compression {
            request = request.header(CONTENT_ENCODING, compression.to_string());
        }
        if let Some(token) = self.access_token().await? {
            let mut authorization =
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(Error::from)?;
            authorization.set_sensitive(true);
            request = request.header(AUTHORIZATION, authorization);
        }
        let request = request.body(body).map_err(Error::from)?;

        let time = Utc::now();
        let started = Instant::now();
        let response = self
            .client
            .send_bytes(request)
            .await
            .map_err(Error::Transport)?;
        let duration = started.elapsed();

        let status = response.status();
        let success = status.is_success();
        if !success {
            telemetry_warn!(
                name: "IngestionPublisher.Rejected",
                status_code = status.as_u16(),
                item_count = batch.len()
            );
        }

        Ok(PublishResult {
            count: batch.len(),
            duration,
            success,
            time,
            http: Some(HttpExchange {
                status_code: status.as_u16(),
                response: String::from_utf8_lossy(response.body()).into_owned(),
                url: self.ingestion_url.to_string(),
            }),
        })
    }
}

/// Builder for [`IngestionPublisher`].
#[derive(Debug)]
pub struct IngestionPublisherBuilder {
    client: Option<Box<dyn HttpClient>>,
    ingestion_endpoint: Option<String>,
    instrumentation_key: Option<Uuid>,
    token_provider: Option<Box<dyn AccessTokenProvider>>,
    tags: Vec<(String, String)>,
    compression: Option<Compression>,
}

impl Default for IngestionPublisherBuilder {
    fn default() -> Self {
        IngestionPublisherBuilder {
            #[cfg(any(feature = "reqwest-client", feature = "reqwest-rustls"))]
            client: Some(Box::new(reqwest::Client::new())),
            #[cfg(not(any(feature = "reqwest-client", feature = "reqwest-rustls")))]
            client: None,

            ingestion_endpoint: None,
            instrumentation_key: None,
            token_provider: None,
            tags: Vec::new(),
            compression: Some(Compression::Gzip),
        }
    }
}

impl IngestionPublisherBuilder {
    /// Assign the ingestion endpoint, e.g.
    /// `https://westeurope-1.in.applicationinsights.azure.com/`.
    pub fn with_ingestion_endpoint<T: Into<String>>(mut self, endpoint: T) -> Self {
        self.ingestion_endpoint = Some(endpoint.into());
        self
    }

    /// Assign the instrumentation key of the target resource.
    pub fn with_instrumentation_key(mut self, instrumentation_key: Uuid) -> Self {
        self.instrumentation_key = Some(instrumentation_key);
        self
    }

    /// Assign the instrumentation key and ingestion endpoint from a
    /// connection string.
    pub fn with_connection_string(mut self, connection_string: &str) -> Result<Self, Error> {
        let ConnectionString {
            instrumentation_key,
            ingestion_endpoint,
        } = ConnectionString::parse(connection_string)?;
        self.instrumentation_key = Some(instrumentation_key);
        self.ingestion_endpoint = Some(ingestion_endpoint);
        Ok(self)
    }

    /// Assign client implementation
    pub fn with_http_client<T: HttpClient + 'static>(mut self, client: T) -> Self {
        self.client = Some(Box::new(client));
        self
    }

    /// Authenticate requests with tokens from `provider`. Authenticated
    /// batches are posted to `v2.1/track`.
    pub fn with_access_token_provider<T: AccessTokenProvider + 'static>(
        mut self,
        provider: T,
    ) -> Self {
        self.token_provider = Some(Box::new(provider));
        self
    }

    /// Add a tag written on every item after item and tracker tags.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Set the body compression. `None` sends the JSON stream as is.
    pub fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }

    /// Build the publisher, validating the endpoint and the instrumentation
    /// key.
    ///
    /// The environment is only consulted when neither the key nor the
    /// endpoint was set on the builder.
    pub fn build(self) -> Result<IngestionPublisher, Error> {
        let from_env = if self.instrumentation_key.is_none() && self.ingestion_endpoint.is_none() {
            env::connection_string()?
        } else {
            None
        };

        let instrumentation_key = self
            .instrumentation_key
            .or_else(|| from_env.as_ref().map(|cs| cs.instrumentation_key))
            .filter(|key| !key.is_nil())
            .ok_or(Error::EmptyInstrumentationKey)?;
        let ingestion_endpoint = self
            .ingestion_endpoint
            .or_else(|| from_env.map(|cs| cs.ingestion_endpoint))
            .unwrap_or_else(|| DEFAULT_INGESTION_ENDPOINT.to_string());
        let path = if self.token_provider.is_some() {
            AUTHENTICATED_TRACK_PATH
        } else {
            TRACK_PATH
        };
        let ingestion_url = build_ingestion_uri(&ingestion_endpoint, path)?;
        let client = self.client.ok_or(Error::NoHttpClient)?;

        Ok(IngestionPublisher {
            client,
            ingestion_url,
            instrumentation_key,
            token_provider: self.token_provider,
            cached_token: Mutex::new(None),
            tags: self.tags,
            compression: self.compression,
        })
    }
}

fn build_ingestion_uri(endpoint: &str, path: &str) -> Result<Uri, Error> {
    let invalid = |reason: &str| Error::InvalidEndpoint(format!("'{endpoint}' {reason}"));
    let uri: Uri = endpoint
        .parse()
        .map_err(|err: http::uri::InvalidUri| invalid(&err.to_string()))?;
    match uri.scheme_str() {
        None => return Err(invalid("is not absolute")),
        Some(scheme) if scheme.eq_ignore_ascii_case("file") => {
            return Err(invalid("must not be a file URI"))
        }
        Some(_) => {}
    }
    if uri.host().map_or(true, str::is_empty) {
        return Err(invalid("has no host"));
    }
    // `http::Uri` drops fragments while parsing, so look at the raw string.
    if uri.query().is_some() || endpoint.contains('#') {
        return Err(invalid("must not have a query or fragment"));
    }

    let path_and_query = format!("{}/{path}", uri.path().trim_end_matches('/'));
    let mut parts = uri.into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse()
            .map_err(|err: http::uri::InvalidUri| invalid(&err.to_string()))?,
    );
    Uri::from_parts(parts).map_err(|err| invalid(&err.to_string()))
}

#[cfg(test)]
mod tests;
