//! WeChat API trait and context
//!
//! Endpoint wrappers hold an `Arc<WechatContext>` instead of inheriting shared
//! state; the context owns the dispatcher (and through it the credential store),
//! the URL templates and the media cache settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::client::{Dispatcher, RequestDescriptor};
use crate::config::ApiUrls;
use crate::envelope::Envelope;
use crate::error::WechatError;
use crate::storage::MediaStorage;
use crate::token::CredentialStore;

/// Merchant settings for the payment endpoints
#[derive(Clone)]
pub struct PayConfig {
    pub mch_id: String,
    pub key: String,
}

impl std::fmt::Debug for PayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayConfig")
            .field("mch_id", &self.mch_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Shared resources for endpoint wrappers.
#[derive(Clone)]
pub struct WechatContext {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) urls: ApiUrls,
    pub(crate) media_cache_dir: PathBuf,
    pub(crate) storage: Arc<dyn MediaStorage>,
    pub(crate) pay: Option<PayConfig>,
}

impl std::fmt::Debug for WechatContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WechatContext")
            .field("dispatcher", &self.dispatcher)
            .field("media_cache_dir", &self.media_cache_dir)
            .field("pay", &self.pay)
            .finish_non_exhaustive()
    }
}

impl WechatContext {
    pub fn new(
        dispatcher: Dispatcher,
        urls: ApiUrls,
        media_cache_dir: impl Into<PathBuf>,
        storage: Arc<dyn MediaStorage>,
    ) -> Self {
        Self {
            dispatcher,
            urls,
            media_cache_dir: media_cache_dir.into(),
            storage,
            pay: None,
        }
    }

    pub fn with_pay(mut self, pay: PayConfig) -> Self {
        self.pay = Some(pay);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn credentials(&self) -> &CredentialStore {
        self.dispatcher.credentials()
    }

    pub fn appid(&self) -> &str {
        self.dispatcher.credentials().appid()
    }

    pub fn urls(&self) -> &ApiUrls {
        &self.urls
    }

    pub fn media_cache_dir(&self) -> &Path {
        &self.media_cache_dir
    }

    pub(crate) fn pay_config(&self) -> Result<&PayConfig, WechatError> {
        self.pay
            .as_ref()
            .ok_or_else(|| WechatError::validation("payment merchant id and key are not configured"))
    }

    /// Start a descriptor from the template registered under `key`.
    pub(crate) fn get(&self, key: &str) -> Result<RequestDescriptor, WechatError> {
        Ok(RequestDescriptor::get(self.urls.get(key)?))
    }

    pub(crate) fn post(&self, key: &str) -> Result<RequestDescriptor, WechatError> {
        Ok(RequestDescriptor::post(self.urls.get(key)?))
    }

    pub(crate) async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Envelope, WechatError> {
        self.dispatcher.dispatch(descriptor).await
    }
}

/// Trait for WeChat API implementations.
pub trait WechatApi: Send + Sync {
    /// Get a reference to the WeChat context
    fn context(&self) -> &WechatContext;

    /// Name used in log lines.
    fn api_name(&self) -> &'static str {
        "unknown"
    }
}
