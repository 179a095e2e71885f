//! HTTP transport shared by the credential store and the dispatcher.
//!
//! Thin layer over reqwest: sends a built request through the optional
//! middleware pipeline, checks the HTTP status and decodes the body into an
//! [`Envelope`].

use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

use crate::envelope::Envelope;
use crate::error::WechatError;

use super::ResponseFormat;

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.weixin.qq.com";
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub(crate) type MiddlewareFuture =
    Pin<Box<dyn Future<Output = Result<reqwest::Response, reqwest::Error>> + Send>>;
pub(crate) type MiddlewareExecutor =
    Arc<dyn Fn(reqwest::Request) -> MiddlewareFuture + Send + Sync>;

/// Cheaply cloneable handle over one `reqwest::Client` and an optional
/// middleware executor.
#[derive(Clone)]
pub struct WechatClient {
    http: Client,
    base_url: String,
    middleware_executor: Option<MiddlewareExecutor>,
}

impl std::fmt::Debug for WechatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WechatClient")
            .field("base_url", &self.base_url)
            .field("layered", &self.middleware_executor.is_some())
            .finish_non_exhaustive()
    }
}

impl WechatClient {
    pub fn builder() -> WechatClientBuilder {
        WechatClientBuilder::default()
    }

    /// Origin joined to relative URL templates, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying [`reqwest::Client`] used to build requests.
    pub fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn with_middleware_executor(mut self, executor: MiddlewareExecutor) -> Self {
        self.middleware_executor = Some(executor);
        self
    }

    pub(crate) async fn send_request(
        &self,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, reqwest::Error> {
        if let Some(executor) = &self.middleware_executor {
            (executor)(request).await
        } else {
            self.http.execute(request).await
        }
    }

    /// Send `request` and decode the body as `format`.
    ///
    /// # Errors
    /// - `Transport` for connection failures, timeouts and non-2xx statuses
    /// - `Decode` for bodies that do not match `format`
    ///
    /// A well-formed error envelope is returned as-is; classifying it is the
    /// caller's job.
    pub async fn execute(
        &self,
        request: reqwest::Request,
        format: ResponseFormat,
    ) -> Result<Envelope, WechatError> {
        let response = self.send_request(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WechatError::transport(format!(
                "unexpected HTTP status {status} from {}",
                response.url().path()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Envelope::decode(format, body.to_vec(), content_type)
    }
}

impl Service<reqwest::Request> for WechatClient {
    type Response = reqwest::Response;
    type Error = reqwest::Error;
    type Future = MiddlewareFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: reqwest::Request) -> Self::Future {
        let client = self.http.clone();
        Box::pin(async move { client.execute(req).await })
    }
}

/// Configures the shared [`WechatClient`].
///
/// ```rust
/// use std::time::Duration;
/// use wechat_mp_client::client::WechatClient;
///
/// let client = WechatClient::builder()
///     .timeout(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// assert_eq!(client.base_url(), "https://api.weixin.qq.com");
/// ```
#[derive(Debug)]
pub struct WechatClientBuilder {
    base_url: String,
    timeout: Duration,
    connect_timeout: Duration,
}

impl Default for WechatClientBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl WechatClientBuilder {
    /// Origin that relative URL templates are joined to.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Whole-request deadline, unless a descriptor carries its own (30s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// TCP/TLS connect deadline (10s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// # Errors
    /// `LocalValidation` when the base URL is not http(s), `Transport` when
    /// reqwest cannot initialise its TLS backend.
    pub fn build(self) -> Result<WechatClient, WechatError> {
        let Self {
            base_url,
            timeout,
            connect_timeout,
        } = self;

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(WechatError::validation(format!(
                "base_url must be an http(s) origin, got {base_url:?}"
            )));
        }

        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(WechatClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            middleware_executor: None,
        })
    }
}
