//! Unified WeChat client

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::api::{
    BillType, Following, JsPayRequest, MediaApi, MediaType, Message, MessageApi, PayApi,
    PayPackage, PrepayResult, RefundStatus, TradeType, UserApi, WechatContext,
};
use crate::envelope::Envelope;
use crate::error::WechatError;

use super::RequestDescriptor;

/// Unified WeChat client
///
/// Entry point of the crate. All calls share one credential store, so the
/// access token is issued once and refreshed for everyone.
///
/// # Example
///
/// ```rust,ignore
/// use wechat_mp_client::WechatMp;
/// use wechat_mp_client::types::{AppId, AppSecret};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let wechat = WechatMp::builder()
///         .appid(AppId::new("wx1234567890abcdef")?)
///         .secret(AppSecret::new("your_secret")?)
///         .media_cache_dir("/var/cache/wechat")
///         .build()?;
///
///     let media_id = wechat.upload_media("a.jpg", &std::fs::read("a.jpg")?).await?;
///     let path = wechat.download_media(&media_id, "jpg").await?;
///     println!("cached at {}", path.display());
///
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct WechatMp {
    context: Arc<WechatContext>,
}

impl From<Arc<WechatContext>> for WechatMp {
    fn from(context: Arc<WechatContext>) -> Self {
        Self { context }
    }
}

impl WechatMp {
    pub fn builder() -> super::builder::WechatMpBuilder {
        super::builder::WechatMpBuilder::default()
    }

    pub fn appid(&self) -> &str {
        self.context.appid()
    }

    pub fn context(&self) -> &Arc<WechatContext> {
        &self.context
    }

    /// Current access token, issuing a new one if needed.
    pub async fn get_access_token(&self) -> Result<String, WechatError> {
        let credential = self.context.credentials().get_credential().await?;
        Ok(credential.token().to_string())
    }

    /// Drop the cached access token; the next call issues a fresh one.
    pub async fn invalidate_token(&self) {
        self.context.credentials().invalidate().await;
    }

    /// Dispatch an arbitrary descriptor with the shared credential handling.
    pub async fn call(&self, descriptor: &RequestDescriptor) -> Result<Envelope, WechatError> {
        self.context.dispatch(descriptor).await
    }

    // Media API

    /// Upload media, picking its type from the file name or content.
    pub async fn upload_media(&self, file_name: &str, data: &[u8]) -> Result<String, WechatError> {
        MediaApi::new(self.context.clone())
            .upload_media_auto(file_name, data)
            .await
    }

    pub async fn upload_media_as(
        &self,
        file_name: &str,
        data: &[u8],
        media_type: MediaType,
    ) -> Result<String, WechatError> {
        MediaApi::new(self.context.clone())
            .upload_media(file_name, data, media_type)
            .await
    }

    pub async fn upload_media_file(&self, path: impl AsRef<Path>) -> Result<String, WechatError> {
        MediaApi::new(self.context.clone())
            .upload_media_file(path)
            .await
    }

    /// Download media into the local cache and return its path.
    pub async fn download_media(&self, media_id: &str, ext: &str) -> Result<PathBuf, WechatError> {
        MediaApi::new(self.context.clone())
            .download_media(media_id, ext)
            .await
    }

    pub async fn download_media_bytes(&self, media_id: &str) -> Result<Vec<u8>, WechatError> {
        MediaApi::new(self.context.clone())
            .download_media_bytes(media_id)
            .await
    }

    // User API

    pub async fn get_following(&self, next_openid: Option<&str>) -> Result<Following, WechatError> {
        UserApi::new(self.context.clone())
            .get_following(next_openid)
            .await
    }

    pub async fn get_all_following(&self) -> Result<Vec<String>, WechatError> {
        UserApi::new(self.context.clone()).get_all_following().await
    }

    // Message API

    pub async fn send_message(&self, touser: &str, message: Message) -> Result<(), WechatError> {
        MessageApi::new(self.context.clone())
            .send(touser, message)
            .await
    }

    pub async fn send_text(&self, touser: &str, content: &str) -> Result<(), WechatError> {
        MessageApi::new(self.context.clone())
            .send_text(touser, content)
            .await
    }

    // Pay API

    pub async fn unified_order(
        &self,
        package: &PayPackage,
        trade_type: TradeType,
        openid: Option<&str>,
    ) -> Result<PrepayResult, WechatError> {
        PayApi::new(self.context.clone())
            .unified_order(package, trade_type, openid)
            .await
    }

    pub fn jsapi_pay_request(&self, prepay_id: &str) -> Result<JsPayRequest, WechatError> {
        PayApi::new(self.context.clone()).jsapi_pay_request(prepay_id)
    }

    pub async fn query_refund(&self, out_trade_no: &str) -> Result<RefundStatus, WechatError> {
        PayApi::new(self.context.clone())
            .query_refund(out_trade_no)
            .await
    }

    pub async fn download_bill(
        &self,
        bill_date: NaiveDate,
        bill_type: BillType,
    ) -> Result<String, WechatError> {
        PayApi::new(self.context.clone())
            .download_bill(bill_date, bill_type)
            .await
    }
}
