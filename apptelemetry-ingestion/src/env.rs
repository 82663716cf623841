use crate::Error;
use std::env;
use uuid::Uuid;

/// Default ingestion endpoint of the public cloud.
pub(crate) const DEFAULT_INGESTION_ENDPOINT: &str = "https://dc.services.visualstudio.com/";

/// Connection string of the Application Insights resource, e.g.
/// "InstrumentationKey=00000000-0000-0000-0000-000000000000;IngestionEndpoint=https://westeurope-1.in.applicationinsights.azure.com/"
pub const ENV_CONNECTION_STRING: &str = "APPLICATIONINSIGHTS_CONNECTION_STRING";

/// The parts of a connection string the publisher uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConnectionString {
    pub(crate) instrumentation_key: Uuid,
    pub(crate) ingestion_endpoint: String,
}

impl ConnectionString {
    /// Parses `key=value` pairs separated by `;`. Keys are case-insensitive
    /// and unknown keys are ignored.
    pub(crate) fn parse(s: &str) -> Result<Self, Error> {
        let mut instrumentation_key = None;
        let mut ingestion_endpoint = None;
        for pair in s.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::InvalidConnectionString(format!("malformed pair '{pair}'")))?;
            let value = value.trim();
            if key.trim().eq_ignore_ascii_case("InstrumentationKey") {
                instrumentation_key = Some(
                    Uuid::parse_str(value)
                        .map_err(|err| Error::InvalidInstrumentationKey(err.to_string()))?,
                );
            } else if key.trim().eq_ignore_ascii_case("IngestionEndpoint") {
                ingestion_endpoint = Some(value.to_string());
            }
        }

        Ok(ConnectionString {
            instrumentation_key: instrumentation_key.ok_or_else(|| {
                Error::InvalidConnectionString("missing InstrumentationKey".to_string())
            })?,
            ingestion_endpoint: ingestion_endpoint
                .filter(|endpoint| !endpoint.is_empty())
                .unwrap_or_else(|| DEFAULT_INGESTION_ENDPOINT.to_string()),
        })
    }
}

/// Reads the connection string from the environment, if one is set.
pub(crate) fn connection_string() -> Result<Option<ConnectionString>, Error> {
    match env::var(ENV_CONNECTION_STRING)
        .ok()
        .filter(|var| !var.trim().is_empty())
    {
        Some(value) => ConnectionString::parse(&value).map(Some),
        None => Ok(None),
    }
}
