//! Dependency type names and their inference from a target host.
//!
//! ```
//! use apptelemetry::telemetry::dependency_type;
//!
//! assert_eq!(dependency_type::from_host("foo.blob.core.windows.net"), dependency_type::AZURE_BLOB);
//! assert_eq!(dependency_type::from_host("example.com"), dependency_type::HTTP);
//! ```

/// Azure Blob storage.
pub const AZURE_BLOB: &str = "Azure blob";
/// Azure Table storage.
pub const AZURE_TABLE: &str = "Azure table";
/// Azure Queue storage.
pub const AZURE_QUEUE: &str = "Azure queue";
/// Azure Cosmos DB.
pub const AZURE_DOCUMENT_DB: &str = "Azure DocumentDB";
/// Azure Service Bus and Event Hubs namespaces.
pub const AZURE_SERVICE_BUS: &str = "Azure Service Bus";
/// Azure IoT Hub.
pub const AZURE_IOT_HUB: &str = "Azure IoT Hub";
/// Azure Cognitive Search.
pub const AZURE_SEARCH: &str = "Azure Search";
/// SQL databases.
pub const SQL: &str = "SQL";
/// Any other HTTP endpoint.
pub const HTTP: &str = "Http";
/// Work done inside the process.
pub const IN_PROC: &str = "InProc";

const CLOUD_SUFFIXES: [&str; 4] = [
    "core.windows.net",
    "core.chinacloudapi.cn",
    "core.cloudapi.de",
    "core.usgovcloudapi.net",
];

const STORAGE_SERVICES: [(&str, &str); 3] = [
    ("blob", AZURE_BLOB),
    ("table", AZURE_TABLE),
    ("queue", AZURE_QUEUE),
];

const HOST_SUFFIXES: [(&str, &str); 6] = [
    (".documents.azure.com", AZURE_DOCUMENT_DB),
    (".servicebus.windows.net", AZURE_SERVICE_BUS),
    (".azure-devices.net", AZURE_IOT_HUB),
    (".search.windows.net", AZURE_SEARCH),
    (".database.windows.net", SQL),
    (".documents.azure.cn", AZURE_DOCUMENT_DB),
];

/// Classifies a host name. Unknown hosts are [`HTTP`].
pub fn from_host(host: &str) -> &'static str {
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    for cloud in CLOUD_SUFFIXES {
        for (service, dependency_type) in STORAGE_SERVICES {
            let suffix = format!(".{service}.{cloud}");
            if host.ends_with(&suffix) {
                return dependency_type;
            }
        }
    }

    HOST_SUFFIXES
        .iter()
        .find(|(suffix, _)| host.ends_with(suffix))
        .map(|(_, dependency_type)| *dependency_type)
        .unwrap_or(HTTP)
}

/// Classifies the host of a URI. URIs without a host are [`HTTP`].
pub fn from_uri(uri: &http::Uri) -> &'static str {
    uri.host().map(from_host).unwrap_or(HTTP)
}
