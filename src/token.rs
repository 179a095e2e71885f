//! Access token management
//!
//! [`CredentialStore`] caches the access token for one app identity. Reads take a
//! shared lock; refreshes are serialized behind a separate mutex and re-check the
//! cache once acquired, so callers racing on an expired token share a single
//! issuance call. A failed issuance is shared the same way: callers that queued
//! behind it receive its error instead of issuing again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

use crate::client::{RequestDescriptor, ResponseFormat, WechatClient};
use crate::error::{ErrorKind, WechatError};
use crate::types::{AccessToken, AppId, AppSecret};

pub(crate) const DEFAULT_REFRESH_MARGIN_SECS: u64 = 5 * 60;
pub(crate) const DEFAULT_ISSUANCE_ATTEMPTS: u32 = 3;
pub(crate) const DEFAULT_TOKEN_TEMPLATE: &str =
    "/cgi-bin/token?grant_type=client_credential&appid={appid}&secret={secret}";
/// Lifetime assumed when the platform omits `expires_in`.
pub(crate) const DEFAULT_TOKEN_TTL_SECS: u64 = 7200;
const RETRY_BASE_DELAY_MS: u64 = 100;
const RETRY_MAX_DELAY_MS: u64 = 5_000;

/// Issued access token with its lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    token: AccessToken,
    issued_at: Instant,
    ttl: Duration,
}

impl Credential {
    pub fn new(token: AccessToken, issued_at: Instant, ttl: Duration) -> Self {
        Self {
            token,
            issued_at,
            ttl,
        }
    }

    pub fn token(&self) -> &str {
        self.token.as_str()
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Valid iff `now < issued_at + ttl - margin`.
    pub fn is_valid(&self, margin: Duration) -> bool {
        match self.ttl.checked_sub(margin) {
            Some(usable) => Instant::now() < self.issued_at + usable,
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub(crate) access_token: String,
    #[serde(default)]
    pub(crate) expires_in: Option<u64>,
}

impl TokenResponse {
    fn ttl(&self) -> Duration {
        let secs = self
            .expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        Duration::from_secs(secs)
    }
}

/// Outcome of the last finished issuance, kept for callers queued behind it.
#[derive(Debug, Default)]
struct LastIssuance {
    failure: Option<(ErrorKind, i64, String)>,
}

/// Holds zero or one [`Credential`] for an app identity
pub struct CredentialStore {
    client: WechatClient,
    appid: AppId,
    secret: AppSecret,
    token_template: String,
    cache: RwLock<Option<Credential>>,
    refresh_lock: Mutex<LastIssuance>,
    /// Finished issuance attempts; only written while `refresh_lock` is held.
    issuances: AtomicU64,
    refresh_margin: Duration,
    issuance_attempts: u32,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("appid", &self.appid)
            .field("token_template", &self.token_template)
            .field("refresh_margin", &self.refresh_margin)
            .field("issuance_attempts", &self.issuance_attempts)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    pub fn new(client: WechatClient, appid: AppId, secret: AppSecret) -> Self {
        Self {
            client,
            appid,
            secret,
            token_template: DEFAULT_TOKEN_TEMPLATE.to_string(),
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(LastIssuance::default()),
            issuances: AtomicU64::new(0),
            refresh_margin: Duration::from_secs(DEFAULT_REFRESH_MARGIN_SECS),
            issuance_attempts: DEFAULT_ISSUANCE_ATTEMPTS,
        }
    }

    /// Override the issuance URL template (`{appid}` and `{secret}` slots).
    pub fn with_token_template(mut self, template: impl Into<String>) -> Self {
        self.token_template = template.into();
        self
    }

    /// Safety margin subtracted from the issued lifetime.
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Attempts made on transient issuance failures; at least one.
    pub fn with_issuance_attempts(mut self, attempts: u32) -> Self {
        self.issuance_attempts = attempts.max(1);
        self
    }

    pub fn appid(&self) -> &str {
        self.appid.as_str()
    }

    /// Returns a valid credential, issuing a new one when needed.
    pub async fn get_credential(&self) -> Result<Credential, WechatError> {
        if let Some(credential) = self.cached_valid().await {
            return Ok(credential);
        }

        let seen = self.issuances.load(Ordering::Acquire);
        let mut last = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(credential) = self.cached_valid().await {
            return Ok(credential);
        }
        if self.issuances.load(Ordering::Acquire) != seen {
            if let Some((kind, code, message)) = &last.failure {
                return Err(WechatError::new(*kind, *code, message.clone()));
            }
        }

        let outcome = self.issue().await;
        last.failure = outcome
            .as_ref()
            .err()
            .map(|e| (e.kind(), e.code(), e.message().to_string()));
        self.issuances.fetch_add(1, Ordering::Release);

        let credential = outcome?;
        *self.cache.write().await = Some(credential.clone());
        Ok(credential)
    }

    async fn issue(&self) -> Result<Credential, WechatError> {
        let response = self
            .fetch_token_with_retry()
            .await
            .map_err(WechatError::into_acquisition)?;
        let ttl = response.ttl();
        let token = AccessToken::new(response.access_token).map_err(|_| {
            WechatError::decode("issuance response carried no access_token").into_acquisition()
        })?;

        log::debug!(
            "issued access token for {} (expires in {}s)",
            self.appid.as_str(),
            ttl.as_secs()
        );
        Ok(Credential::new(token, Instant::now(), ttl))
    }

    /// Drop the cached credential unconditionally.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Drop the cached credential only if it is still `rejected`.
    ///
    /// Returns `true` when the cache was cleared.
    pub async fn invalidate_if_current(&self, rejected: &Credential) -> bool {
        let mut cache = self.cache.write().await;
        match cache.as_ref() {
            Some(current) if current.token == rejected.token => {
                *cache = None;
                true
            }
            _ => false,
        }
    }

    async fn cached_valid(&self) -> Option<Credential> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|credential| credential.is_valid(self.refresh_margin))
            .cloned()
    }

    async fn fetch_token_with_retry(&self) -> Result<TokenResponse, WechatError> {
        let mut last_error = None;

        for attempt in 0..self.issuance_attempts {
            match self.fetch_token().await {
                Ok(response) => return Ok(response),
                Err(e) if e.kind() == ErrorKind::Transport => {
                    log::warn!(
                        "access token issuance attempt {} of {} failed: {}",
                        attempt + 1,
                        self.issuance_attempts,
                        e
                    );
                    last_error = Some(e);
                    if attempt + 1 < self.issuance_attempts {
                        tokio::time::sleep(issuance_backoff(attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| WechatError::transport("no issuance attempt made")))
    }

    async fn fetch_token(&self) -> Result<TokenResponse, WechatError> {
        let descriptor = RequestDescriptor::get(self.token_template.as_str())
            .param("appid", self.appid.as_str())
            .param("secret", self.secret.as_str())
            .response(ResponseFormat::Json);
        let request = descriptor.build(self.client.http(), self.client.base_url(), None)?;
        let envelope = self
            .client
            .execute(request, ResponseFormat::Json)
            .await?
            .into_result()?;
        envelope.parse()
    }
}

/// Exponential backoff with up to 50% random jitter, capped at
/// `RETRY_MAX_DELAY_MS`.
fn issuance_backoff(attempt: u32) -> Duration {
    let base = RETRY_BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(16));
    let jitter = match base / 2 {
        0 => 0,
        bound => (uuid::Uuid::new_v4().as_u128() % u128::from(bound)) as u64,
    };
    Duration::from_millis(base.saturating_add(jitter).min(RETRY_MAX_DELAY_MS))
}
