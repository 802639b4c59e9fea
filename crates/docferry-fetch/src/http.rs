//! HTTP transport abstraction.
//!
//! The engine speaks to the network through [`HttpClient`] so tests can
//! script a remote without sockets and production can swap stacks. The
//! contract mirrors what the transfer engine actually needs: a header
//! probe and a streaming, optionally ranged GET.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::error::Result;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Response body chunks, mapped into the engine's error type.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// What a header probe learned about a remote document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteInfo {
    /// Content length, when the server reported one.
    pub size: Option<u64>,
    /// Whether the server advertised `Accept-Ranges: bytes`.
    pub supports_range: bool,
}

/// Whether the server honoured a range request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// `200`: the body is the whole document, regardless of any Range
    /// header we sent.
    Full,
    /// `206`: the body continues from the requested offset.
    Partial,
}

/// A streaming response ready to be written to disk.
pub struct FetchResponse {
    pub kind: BodyKind,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

/// Asynchronous HTTP client abstraction.
///
/// Implementations handle redirects, timeouts and header policy
/// themselves. Errors use the crate's [`FetchError`](crate::FetchError)
/// directly: the retry policy classifies failures by HTTP status, which an
/// opaque error type would hide.
pub trait HttpClient: Send + Sync {
    /// Probe a URL's headers without transferring the body.
    ///
    /// Implementations should fall back to a header-only `GET` when the
    /// server rejects `HEAD`.
    fn probe(&self, url: &str) -> impl Future<Output = Result<RemoteInfo>> + Send;

    /// Open a streaming `GET`, ranged from `resume_from` when given.
    ///
    /// A server may answer a ranged request with `200`; callers must
    /// inspect [`FetchResponse::kind`] rather than assume `206`.
    fn get(
        &self,
        url: &str,
        resume_from: Option<u64>,
    ) -> impl Future<Output = Result<FetchResponse>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use futures_util::TryStreamExt;
    use reqwest::StatusCode;
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
    use tracing::warn;

    use super::*;
    use crate::config::EngineConfig;
    use crate::error::FetchError;

    /// Production HTTP client over `reqwest`.
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        /// Build a client carrying the engine's timeout, User-Agent and
        /// static headers. Invalid configured headers are skipped with a
        /// warning rather than failing construction.
        pub fn new(config: &EngineConfig) -> std::result::Result<Self, reqwest::Error> {
            let mut headers = HeaderMap::new();
            for (name, value) in &config.extra_headers {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        headers.insert(name, value);
                    }
                    _ => warn!(header = %name, "skipping invalid static header"),
                }
            }

            let client = reqwest::Client::builder()
                .user_agent(&config.user_agent)
                .default_headers(headers)
                .timeout(config.request_timeout)
                .build()?;
            Ok(Self { client })
        }
    }

    impl HttpClient for ReqwestClient {
        async fn probe(&self, url: &str) -> Result<RemoteInfo> {
            let mut response = self
                .client
                .head(url)
                .send()
                .await
                .map_err(request_error)?;

            // Some servers reject HEAD outright; a bare GET carries the
            // same headers and the body is dropped unread.
            if response.status() == StatusCode::METHOD_NOT_ALLOWED {
                response = self.client.get(url).send().await.map_err(request_error)?;
            }

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            let supports_range = response
                .headers()
                .get(reqwest::header::ACCEPT_RANGES)
                .is_some_and(|value| value.as_bytes() == b"bytes");
            let size = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok());

            Ok(RemoteInfo {
                size,
                supports_range,
            })
        }

        async fn get(&self, url: &str, resume_from: Option<u64>) -> Result<FetchResponse> {
            let mut request = self.client.get(url);
            if let Some(offset) = resume_from {
                request = request.header(reqwest::header::RANGE, format!("bytes={offset}-"));
            }

            let response = request.send().await.map_err(request_error)?;
            let status = response.status();
            let kind = match status {
                StatusCode::PARTIAL_CONTENT => BodyKind::Partial,
                status if status.is_success() => BodyKind::Full,
                status => {
                    return Err(FetchError::Status {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }
            };

            let content_length = response.content_length();
            let body: ByteStream = Box::pin(response.bytes_stream().map_err(stream_error));

            Ok(FetchResponse {
                kind,
                content_length,
                body,
            })
        }
    }

    fn request_error(err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Connect(err.to_string())
        }
    }

    fn stream_error(err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Stream(err.to_string())
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
