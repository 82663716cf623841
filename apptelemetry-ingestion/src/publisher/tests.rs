use super::*;
use apptelemetry::{Dimensions, EventTelemetry, TelemetryError, TelemetryTracker};
use apptelemetry_http::{HttpError, Response};
use chrono::Duration as TimeDelta;
use flate2::read::GzDecoder;
use serde_json::Value;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const KEY: &str = "0123abcd-0000-4000-8000-00000000abcd";

#[derive(Debug, Clone)]
struct MockClient {
    status: u16,
    body: &'static str,
    fail: bool,
    requests: Arc<Mutex<Vec<Request<Bytes>>>>,
}

impl MockClient {
    fn responding(status: u16, body: &'static str) -> Self {
        MockClient {
            status,
            body,
            fail: false,
            requests: Arc::default(),
        }
    }

    fn unreachable() -> Self {
        MockClient {
            fail: true,
            ..MockClient::responding(0, "")
        }
    }

    fn requests(&self) -> Vec<Request<Bytes>> {
        self.requests.lock().unwrap().drain(..).collect()
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
        self.requests.lock().unwrap().push(request);
        if self.fail {
            return Err("connection reset by peer".into());
        }
        Ok(Response::builder()
            .status(self.status)
            .body(Bytes::from_static(self.body.as_bytes()))?)
    }
}

#[derive(Debug, Default, Clone)]
struct CountingTokenProvider {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl AccessTokenProvider for CountingTokenProvider {
    async fn access_token(&self) -> Result<BearerToken, TokenError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(BearerToken::new(
            format!("token-{call}"),
            Utc::now() + TimeDelta::hours(1),
        ))
    }
}

#[derive(Debug)]
struct FailingTokenProvider;

#[async_trait]
impl AccessTokenProvider for FailingTokenProvider {
    async fn access_token(&self) -> Result<BearerToken, TokenError> {
        Err("credential unavailable".into())
    }
}

fn builder(client: &MockClient) -> IngestionPublisherBuilder {
    IngestionPublisher::builder()
        .with_http_client(client.clone())
        .with_instrumentation_key(Uuid::parse_str(KEY).unwrap())
        .with_ingestion_endpoint("https://ingest.example.com/")
}

fn events(names: &[&str]) -> Vec<Telemetry> {
    names
        .iter()
        .map(|name| EventTelemetry::builder().name(*name).build().into())
        .collect()
}

fn inflate(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(body).read_to_end(&mut out).unwrap();
    out
}

fn parse_stream(body: &[u8]) -> Vec<Value> {
    serde_json::Deserializer::from_slice(body)
        .into_iter::<Value>()
        .map(Result::unwrap)
        .collect()
}

#[tokio::test]
async fn posts_a_gzipped_json_stream() {
    let client = MockClient::responding(200, r#"{"itemsReceived":2,"itemsAccepted":2,"errors":[]}"#);
    let publisher = builder(&client).with_tag("ai.cloud.role", "api").build().unwrap();

    let result = publisher
        .publish(&events(&["first", "second"]), &[("k".into(), "v".into())])
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.count, 2);
    let http = result.http.unwrap();
    assert_eq!(http.status_code, 200);
    assert_eq!(http.url, "https://ingest.example.com/v2/track");
    assert_eq!(
        http.response,
        r#"{"itemsReceived":2,"itemsAccepted":2,"errors":[]}"#
    );

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method(), Method::POST);
    assert_eq!(request.uri(), "https://ingest.example.com/v2/track");
    assert_eq!(request.headers()[CONTENT_TYPE], "application/x-json-stream");
    assert_eq!(request.headers()[CONTENT_ENCODING], "gzip");
    assert!(request.headers().get(AUTHORIZATION).is_none());

    let items = parse_stream(&inflate(request.body()));
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["data"]["baseData"]["name"], "first");
    assert_eq!(items[1]["data"]["baseData"]["name"], "second");
    assert_eq!(items[0]["iKey"], KEY);
    assert_eq!(items[0]["tags"]["k"], "v");
    assert_eq!(items[0]["tags"]["ai.cloud.role"], "api");
}

#[tokio::test]
async fn uncompressed_bodies_have_no_content_encoding() {
    let client = MockClient::responding(200, "");
    let publisher = builder(&client).with_compression(None).build().unwrap();

    publisher.publish(&events(&["only"]), &[]).await.unwrap();

    let request = &client.requests()[0];
    assert!(request.headers().get(CONTENT_ENCODING).is_none());
    let items = parse_stream(request.body());
    assert_eq!(items[0]["name"], "AppEvents");
}

#[tokio::test]
async fn publisher_tags_come_last() {
    let client = MockClient::responding(200, "");
    let publisher = builder(&client)
        .with_compression(None)
        .with_tag("k", "v3")
        .build()
        .unwrap();
    let item: Telemetry = EventTelemetry::builder()
        .name("e")
        .tags(vec![("k".into(), "v".into())])
        .build()
        .into();

    publisher
        .publish(&[item], &[("k".into(), "v2".into())])
        .await
        .unwrap();

    let request = &client.requests()[0];
    let body = std::str::from_utf8(request.body()).unwrap();
    assert!(body.contains(r#""tags":{"k":"v","k":"v2","k":"v3"}"#));
    assert_eq!(parse_stream(request.body())[0]["tags"]["k"], "v3");
}

#[tokio::test]
async fn rejected_batches_are_reported_not_raised() {
    let client = MockClient::responding(400, r#"{"itemsReceived":1,"itemsAccepted":0}"#);
    let publisher = builder(&client).build().unwrap();

    let result = publisher.publish(&events(&["e"]), &[]).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.count, 1);
    let http = result.http.unwrap();
    assert_eq!(http.status_code, 400);
    assert_eq!(http.response, r#"{"itemsReceived":1,"itemsAccepted":0}"#);
}

#[tokio::test]
async fn transport_errors_are_returned() {
    let client = MockClient::unreachable();
    let publisher = builder(&client).build().unwrap();

    let err = publisher.publish(&events(&["e"]), &[]).await.unwrap_err();

    assert!(matches!(err, TelemetryError::PublishFailed(_)));
    assert_eq!(
        err.to_string(),
        "publish failed by ingestion: http transport failed: connection reset by peer"
    );
}

#[tokio::test]
async fn tokens_are_cached_until_they_expire() {
    let client = MockClient::responding(200, "");
    let provider = CountingTokenProvider::default();
    let publisher = builder(&client)
        .with_access_token_provider(provider.clone())
        .build()
        .unwrap();
    assert_eq!(
        publisher.ingestion_url(),
        "https://ingest.example.com/v2.1/track"
    );

    publisher.publish(&events(&["a"]), &[]).await.unwrap();
    publisher.publish(&events(&["b"]), &[]).await.unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    if let Some(token) = publisher.cached_token.lock().unwrap().as_mut() {
        token.expires_on = Utc::now() - TimeDelta::seconds(1);
    }
    publisher.publish(&events(&["c"]), &[]).await.unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

    let requests = client.requests();
    let authorization: Vec<_> = requests
        .iter()
        .map(|request| request.headers()[AUTHORIZATION].to_str().unwrap().to_string())
        .collect();
    assert_eq!(
        authorization,
        vec!["Bearer token-0", "Bearer token-0", "Bearer token-1"]
    );
    assert!(requests
        .iter()
        .all(|request| request.uri() == "https://ingest.example.com/v2.1/track"));
}

#[tokio::test]
async fn token_provider_failures_fail_the_publish() {
    let client = MockClient::responding(200, "");
    let publisher = builder(&client)
        .with_access_token_provider(FailingTokenProvider)
        .build()
        .unwrap();

    let err = publisher.publish(&events(&["e"]), &[]).await.unwrap_err();

    assert!(err.to_string().contains("credential unavailable"));
    assert!(client.requests().is_empty());
}

#[test]
fn endpoints_are_validated() {
    let client = MockClient::responding(200, "");
    for endpoint in [
        "not a uri",
        "/relative/path",
        "file:///var/lib/telemetry",
        "\\\\server\\share",
        "https://ingest.example.com/?region=west",
        "https://ingest.example.com/#track",
    ] {
        let result = builder(&client).with_ingestion_endpoint(endpoint).build();
        assert!(
            matches!(result, Err(Error::InvalidEndpoint(_))),
            "{endpoint} should be rejected"
        );
    }

    let publisher = builder(&client)
        .with_ingestion_endpoint("https://ingest.example.com/base")
        .build()
        .unwrap();
    assert_eq!(
        publisher.ingestion_url(),
        "https://ingest.example.com/base/v2/track"
    );

    let publisher = builder(&client)
        .with_ingestion_endpoint("https://ingest.example.com:8443/base/")
        .build()
        .unwrap();
    assert_eq!(
        publisher.ingestion_url(),
        "https://ingest.example.com:8443/base/v2/track"
    );
}

#[test]
fn programmatic_configuration_ignores_the_environment() {
    let client = MockClient::responding(200, "");
    temp_env::with_var(crate::ENV_CONNECTION_STRING, Some("garbage"), || {
        let publisher = IngestionPublisher::builder()
            .with_http_client(client.clone())
            .with_instrumentation_key(Uuid::parse_str(KEY).unwrap())
            .build()
            .unwrap();
        assert_eq!(
            publisher.ingestion_url(),
            "https://dc.services.visualstudio.com/v2/track"
        );
    });

    temp_env::with_var(
        crate::ENV_CONNECTION_STRING,
        Some(format!(
            "InstrumentationKey={KEY};IngestionEndpoint=https://westeurope-1.in.applicationinsights.azure.com/"
        )),
        || {
            let publisher = IngestionPublisher::builder()
                .with_http_client(client.clone())
                .with_instrumentation_key(Uuid::parse_str("11111111-2222-4333-8444-555555555555").unwrap())
                .build()
                .unwrap();
            assert_eq!(
                publisher.ingestion_url(),
                "https://dc.services.visualstudio.com/v2/track"
            );

            let result = IngestionPublisher::builder()
                .with_http_client(client.clone())
                .with_ingestion_endpoint("https://ingest.example.com/")
                .build();
            assert!(matches!(result, Err(Error::EmptyInstrumentationKey)));
        },
    );
}

#[test]
fn nil_instrumentation_key_is_rejected() {
    let client = MockClient::responding(200, "");
    let result = builder(&client).with_instrumentation_key(Uuid::nil()).build();
    assert!(matches!(result, Err(Error::EmptyInstrumentationKey)));
}

#[test]
fn configuration_falls_back_to_the_environment() {
    let client = MockClient::responding(200, "");
    temp_env::with_var(
        crate::ENV_CONNECTION_STRING,
        Some(format!(
            "InstrumentationKey={KEY};IngestionEndpoint=https://westeurope-1.in.applicationinsights.azure.com/"
        )),
        || {
            let publisher = IngestionPublisher::builder()
                .with_http_client(client.clone())
                .build()
                .unwrap();
            assert_eq!(publisher.instrumentation_key, Uuid::parse_str(KEY).unwrap());
            assert_eq!(
                publisher.ingestion_url(),
                "https://westeurope-1.in.applicationinsights.azure.com/v2/track"
            );
        },
    );

    temp_env::with_var_unset(crate::ENV_CONNECTION_STRING, || {
        let result = IngestionPublisher::builder()
            .with_http_client(client.clone())
            .build();
        assert!(matches!(result, Err(Error::EmptyInstrumentationKey)));

        let publisher = IngestionPublisher::builder()
            .with_http_client(client.clone())
            .with_instrumentation_key(Uuid::parse_str(KEY).unwrap())
            .build()
            .unwrap();
        assert_eq!(
            publisher.ingestion_url(),
            "https://dc.services.visualstudio.com/v2/track"
        );
    });
}

#[test]
fn connection_string_sets_key_and_endpoint() {
    let client = MockClient::responding(200, "");
    let publisher = IngestionPublisher::builder()
        .with_http_client(client)
        .with_connection_string(&format!(
            "InstrumentationKey={KEY};IngestionEndpoint=https://eastus.in.applicationinsights.azure.com"
        ))
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(
        publisher.ingestion_url(),
        "https://eastus.in.applicationinsights.azure.com/v2/track"
    );
}

#[tokio::test]
async fn tracker_fans_out_to_the_ingestion_publisher() {
    let client = MockClient::responding(200, "{}");
    let failing = MockClient::unreachable();
    let tracker = TelemetryTracker::builder()
        .with_publisher(builder(&failing).build().unwrap())
        .with_publisher(builder(&client).build().unwrap())
        .with_tag("ai.cloud.roleInstance", "host-1")
        .build();
    tracker.track_event("Started", Dimensions::new());

    let results = tracker.publish().await;

    assert_eq!(results.len(), 2);
    assert!(results[0].is_err());
    assert!(results[1].as_ref().unwrap().success);
    let items = parse_stream(&inflate(client.requests()[0].body()));
    assert_eq!(items[0]["tags"]["ai.cloud.roleInstance"], "host-1");
}
