//! Request/response logging with credential redaction.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::{Request, Response, Url};
use tower::{Layer, Service};

/// Query parameters whose values never reach the log.
const REDACTED_PARAMS: &[&str] = &["access_token", "appsecret", "secret", "sign", "key"];

const REDACTED: &str = "[REDACTED]";

/// Logs method, redacted URL, status and latency of every request.
///
/// Query values of `access_token`, `secret`, `appsecret`, `sign` and `key` are
/// replaced with `[REDACTED]`. Transport failures are logged at `warn`.
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    verbose: bool,
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log at `debug` with request/response markers instead of one `info` line.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }
}

impl<S> Layer<S> for LoggingMiddleware {
    type Service = LoggingMiddlewareService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingMiddlewareService {
            inner,
            verbose: self.verbose,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingMiddlewareService<S> {
    inner: S,
    verbose: bool,
}

/// Render `url` with sensitive query values replaced.
pub(crate) fn redact_url(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            let value = if REDACTED_PARAMS
                .iter()
                .any(|sensitive| name.eq_ignore_ascii_case(sensitive))
            {
                REDACTED.to_string()
            } else {
                value.into_owned()
            };
            (name.into_owned(), value)
        })
        .collect();

    let mut redacted = url.clone();
    redacted.set_query(None);
    let query = pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{redacted}?{query}")
}

struct RequestLine {
    method: String,
    url: String,
    verbose: bool,
}

impl RequestLine {
    fn sent(&self) {
        if self.verbose {
            debug!("[wechat] >>> {} {}", self.method, self.url);
        }
    }

    fn completed(&self, status: reqwest::StatusCode, elapsed: Duration) {
        if self.verbose {
            debug!(
                "[wechat] <<< {} {} {} ({:?})",
                self.method, self.url, status, elapsed
            );
        } else {
            info!("[wechat] {} {} {} ({:?})", self.method, self.url, status, elapsed);
        }
    }

    fn failed(&self, error: &dyn std::fmt::Display, elapsed: Duration) {
        warn!(
            "[wechat] {} {} failed after {:?}: {}",
            self.method, self.url, elapsed, error
        );
    }
}

impl<S> Service<Request> for LoggingMiddlewareService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: std::fmt::Display + Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let line = RequestLine {
            method: req.method().to_string(),
            url: redact_url(req.url()),
            verbose: self.verbose,
        };
        let mut inner = self.inner.clone();

        Box::pin(async move {
            line.sent();
            let start = Instant::now();
            match inner.call(req).await {
                Ok(response) => {
                    line.completed(response.status(), start.elapsed());
                    Ok(response)
                }
                Err(e) => {
                    line.failed(&e, start.elapsed());
                    Err(e)
                }
            }
        })
    }
}
