use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Request as ReqwestRequest, Response as ReqwestResponse};
use tower::{Layer, Service};

use crate::api::{PayConfig, WechatContext};
use crate::config::{keys, ApiUrls};
use crate::error::WechatError;
use crate::storage::{LocalStorage, MediaStorage};
use crate::token::CredentialStore;
use crate::types::{AppId, AppSecret};

use super::wechat_client::{MiddlewareExecutor, WechatClient, WechatClientBuilder};
use super::{Dispatcher, WechatMp};

const DEFAULT_MEDIA_CACHE_DIR: &str = "wechat-media";

/// Token policy knobs; unset fields keep the store's defaults.
#[derive(Debug, Default, Clone, Copy)]
struct TokenPolicy {
    refresh_margin: Option<Duration>,
    issuance_attempts: Option<u32>,
}

impl TokenPolicy {
    fn apply(self, mut store: CredentialStore) -> CredentialStore {
        if let Some(margin) = self.refresh_margin {
            store = store.with_refresh_margin(margin);
        }
        if let Some(attempts) = self.issuance_attempts {
            store = store.with_issuance_attempts(attempts);
        }
        store
    }
}

/// Assembles a [`WechatMp`]: identity, transport, token policy, URL
/// templates, media cache and the optional payment merchant.
///
/// `M` is an optional tower layer wrapped around every HTTP exchange,
/// token issuance included.
#[must_use]
#[derive(Default)]
pub struct WechatMpBuilder<M = ()> {
    appid: Option<AppId>,
    secret: Option<AppSecret>,
    transport: WechatClientBuilder,
    token: TokenPolicy,
    urls: ApiUrls,
    media_cache_dir: Option<PathBuf>,
    storage: Option<Arc<dyn MediaStorage>>,
    pay: Option<PayConfig>,
    middleware: Option<M>,
}

impl<M> std::fmt::Debug for WechatMpBuilder<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WechatMpBuilder")
            .field("appid", &self.appid)
            .field("transport", &self.transport)
            .field("token", &self.token)
            .field("media_cache_dir", &self.media_cache_dir)
            .field("pay", &self.pay)
            .field("middleware", &self.middleware.is_some())
            .finish_non_exhaustive()
    }
}

impl<M> WechatMpBuilder<M> {
    pub fn appid(mut self, appid: AppId) -> Self {
        self.appid = Some(appid);
        self
    }

    pub fn secret(mut self, secret: AppSecret) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Origin for relative URL templates (default `https://api.weixin.qq.com`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.transport = self.transport.base_url(url);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.timeout(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.connect_timeout(timeout);
        self
    }

    /// Refresh the access token this long before it expires (default 5 minutes).
    pub fn refresh_margin(mut self, margin: Duration) -> Self {
        self.token.refresh_margin = Some(margin);
        self
    }

    /// Attempts per token issuance when the token endpoint is unreachable (default 3).
    pub fn issuance_attempts(mut self, attempts: u32) -> Self {
        self.token.issuance_attempts = Some(attempts);
        self
    }

    /// Replace the whole URL template mapping.
    pub fn urls(mut self, urls: ApiUrls) -> Self {
        self.urls = urls;
        self
    }

    /// Override one URL template.
    pub fn url(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.urls = self.urls.with(key, template);
        self
    }

    /// Directory of the media download cache (default `$TMPDIR/wechat-media`).
    pub fn media_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media_cache_dir = Some(dir.into());
        self
    }

    pub fn storage(mut self, storage: Arc<dyn MediaStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Enable the payment endpoints with a merchant id and signing key.
    pub fn pay(mut self, mch_id: impl Into<String>, key: impl Into<String>) -> Self {
        self.pay = Some(PayConfig {
            mch_id: mch_id.into(),
            key: key.into(),
        });
        self
    }

    pub fn with_middleware<L>(self, middleware: L) -> WechatMpBuilder<L>
    where
        L: Layer<WechatClient> + Clone + Send + Sync + 'static,
    {
        let Self {
            appid,
            secret,
            transport,
            token,
            urls,
            media_cache_dir,
            storage,
            pay,
            middleware: _,
        } = self;

        WechatMpBuilder {
            appid,
            secret,
            transport,
            token,
            urls,
            media_cache_dir,
            storage,
            pay,
            middleware: Some(middleware),
        }
    }

    /// # Errors
    /// `LocalValidation` for a missing appid or secret, an empty merchant id
    /// or key, a non-http(s) base URL, or a URL mapping without a token
    /// template.
    pub fn build(self) -> Result<WechatMp, WechatError>
    where
        M: Layer<WechatClient> + Clone + Send + Sync + 'static,
        M::Service: Service<ReqwestRequest, Response = ReqwestResponse, Error = reqwest::Error>
            + Clone
            + Send
            + Sync
            + 'static,
        <M::Service as Service<ReqwestRequest>>::Future: Send + 'static,
    {
        let appid = self
            .appid
            .ok_or_else(|| WechatError::validation("appid is required"))?;
        let secret = self
            .secret
            .ok_or_else(|| WechatError::validation("secret is required"))?;
        if matches!(&self.pay, Some(pay) if pay.mch_id.is_empty() || pay.key.is_empty()) {
            return Err(WechatError::validation(
                "payment merchant id and key must not be empty",
            ));
        }

        let mut client = self.transport.build()?;
        if let Some(layer) = self.middleware {
            let executor = layered_executor(layer.layer(client.clone()));
            client = client.with_middleware_executor(executor);
        }

        let store = CredentialStore::new(client.clone(), appid, secret)
            .with_token_template(self.urls.get(keys::TOKEN)?);
        let dispatcher = Dispatcher::new(client, Arc::new(self.token.apply(store)));

        let cache_dir = self
            .media_cache_dir
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_MEDIA_CACHE_DIR));
        let storage: Arc<dyn MediaStorage> = self.storage.unwrap_or_else(|| Arc::new(LocalStorage));

        let context = WechatContext::new(dispatcher, self.urls, cache_dir, storage);
        let context = match self.pay {
            Some(pay) => context.with_pay(pay),
            None => context,
        };

        Ok(WechatMp::from(Arc::new(context)))
    }
}

/// Erase the layered service type so the client can hold it.
fn layered_executor<S>(service: S) -> MiddlewareExecutor
where
    S: Service<ReqwestRequest, Response = ReqwestResponse, Error = reqwest::Error>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    Arc::new(move |request: ReqwestRequest| {
        let mut service = service.clone();
        Box::pin(async move { service.call(request).await })
    })
}
