use async_trait::async_trait;
use std::fmt::Debug;

#[doc(no_inline)]
pub use bytes::Bytes;
#[doc(no_inline)]
pub use http::{Request, Response};

mod tracked;

pub use tracked::TrackedHttpClient;

/// Error of an [`HttpClient`]: anything that prevented a response from being
/// received.
pub type HttpError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The HTTP transport used to post telemetry and to make tracked calls.
///
/// Applications pick the client and therefore the async runtime; the
/// `reqwest` feature provides an implementation for `reqwest::Client`.
#[async_trait]
pub trait HttpClient: Debug + Send + Sync {
    /// Sends `request` and returns the response with its full body.
    ///
    /// Non-success status codes are returned as responses, not as errors.
    /// An error means no response was received, e.g. the connection failed
    /// or timed out.
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError>;
}

#[cfg(feature = "reqwest")]
mod reqwest {
    use apptelemetry::telemetry_debug;

    use super::{async_trait, Bytes, HttpClient, HttpError, Request, Response};

    #[async_trait]
    impl HttpClient for reqwest::Client {
        async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            telemetry_debug!(name: "ReqwestClient.Send");
            let request = request.try_into()?;
            let mut response = self.execute(request).await?;
            let headers = std::mem::take(response.headers_mut());
            let mut http_response = Response::builder()
                .status(response.status())
                .body(response.bytes().await?)?;
            *http_response.headers_mut() = headers;

            Ok(http_response)
        }
    }
}
