//! Payment API
//!
//! Merchant endpoints exchange signed XML documents and do not use the access
//! token. Requests are signed with the merchant key: non-empty parameters are
//! sorted by name, joined as `k=v&...&key=KEY` and hashed with MD5 (upper-case
//! hex).
//!
//! # Example
//!
//! ```rust,ignore
//! let package = PayPackage::builder()
//!     .body("Coffee")
//!     .out_trade_no("T20240101001")
//!     .total_fee(12.5)
//!     .spbill_create_ip("127.0.0.1")
//!     .notify_url("https://example.com/notify")
//!     .build()?;
//!
//! let prepay = pay_api.unified_order(&package, TradeType::Jsapi, Some(openid)).await?;
//! let js_request = pay_api.jsapi_pay_request(&prepay.prepay_id)?;
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Serialize;

use crate::client::ResponseFormat;
use crate::config::keys;
use crate::error::WechatError;
use crate::xml;

use super::{WechatApi, WechatContext};

const BEIJING_OFFSET_HOURS: i64 = 8;

/// Format as `yyyyMMddHHmmss` in GMT+8.
pub fn format_pay_time(time: DateTime<Utc>) -> String {
    (time.naive_utc() + TimeDelta::hours(BEIJING_OFFSET_HOURS))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// Convert yuan to an integer number of fen; the rounded amount must be at
/// least one fen.
pub fn yuan_to_fen(yuan: f64) -> Result<i64, WechatError> {
    let fen = (yuan * 100.0).round();
    if !fen.is_finite() || fen < 1.0 {
        return Err(WechatError::validation(format!(
            "total_fee must be at least 0.01 yuan, got {yuan}"
        )));
    }
    Ok(fen as i64)
}

/// MD5 signature over the non-empty parameters, excluding `sign`.
pub fn sign_md5<'a, I>(params: I, key: &str) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let sorted: BTreeMap<&str, &str> = params
        .into_iter()
        .filter(|(name, value)| !value.is_empty() && *name != "sign")
        .collect();

    let mut plain = String::new();
    for (name, value) in sorted {
        plain.push_str(name);
        plain.push('=');
        plain.push_str(value);
        plain.push('&');
    }
    plain.push_str("key=");
    plain.push_str(key);

    format!("{:x}", md5::compute(plain.as_bytes())).to_uppercase()
}

fn nonce_str() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Order information for the unified order endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayPackage {
    body: String,
    attach: Option<String>,
    out_trade_no: String,
    total_fee: i64,
    spbill_create_ip: String,
    time_start: Option<String>,
    time_expire: Option<String>,
    goods_tag: Option<String>,
    notify_url: String,
}

impl PayPackage {
    pub fn builder() -> PayPackageBuilder {
        PayPackageBuilder::default()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn out_trade_no(&self) -> &str {
        &self.out_trade_no
    }

    /// Amount in fen
    pub fn total_fee(&self) -> i64 {
        self.total_fee
    }

    pub fn notify_url(&self) -> &str {
        &self.notify_url
    }

    /// Wire parameters in request order (unsigned).
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("body", self.body.clone()),
            ("out_trade_no", self.out_trade_no.clone()),
            ("total_fee", self.total_fee.to_string()),
            ("spbill_create_ip", self.spbill_create_ip.clone()),
            ("notify_url", self.notify_url.clone()),
        ];
        let optional = [
            ("attach", &self.attach),
            ("time_start", &self.time_start),
            ("time_expire", &self.time_expire),
            ("goods_tag", &self.goods_tag),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                params.push((name, value.clone()));
            }
        }
        params
    }
}

#[derive(Debug, Default)]
pub struct PayPackageBuilder {
    body: Option<String>,
    attach: Option<String>,
    out_trade_no: Option<String>,
    total_fee: Option<f64>,
    spbill_create_ip: Option<String>,
    time_start: Option<DateTime<Utc>>,
    time_expire: Option<DateTime<Utc>>,
    goods_tag: Option<String>,
    notify_url: Option<String>,
}

impl PayPackageBuilder {
    /// Goods description (required)
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Opaque data echoed back in the payment notification
    pub fn attach(mut self, attach: impl Into<String>) -> Self {
        self.attach = Some(attach.into());
        self
    }

    /// Merchant order number, at most 32 characters (required)
    pub fn out_trade_no(mut self, out_trade_no: impl Into<String>) -> Self {
        self.out_trade_no = Some(out_trade_no.into());
        self
    }

    /// Order amount in yuan (required)
    pub fn total_fee(mut self, yuan: f64) -> Self {
        self.total_fee = Some(yuan);
        self
    }

    /// Client IP (required)
    pub fn spbill_create_ip(mut self, ip: impl Into<String>) -> Self {
        self.spbill_create_ip = Some(ip.into());
        self
    }

    pub fn time_start(mut self, time: DateTime<Utc>) -> Self {
        self.time_start = Some(time);
        self
    }

    pub fn time_expire(mut self, time: DateTime<Utc>) -> Self {
        self.time_expire = Some(time);
        self
    }

    pub fn goods_tag(mut self, tag: impl Into<String>) -> Self {
        self.goods_tag = Some(tag.into());
        self
    }

    /// Payment notification callback URL (required)
    pub fn notify_url(mut self, url: impl Into<String>) -> Self {
        self.notify_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<PayPackage, WechatError> {
        fn required(value: Option<String>, name: &str) -> Result<String, WechatError> {
            value
                .filter(|v| !v.is_empty())
                .ok_or_else(|| WechatError::validation(format!("{name} is required")))
        }

        let out_trade_no = required(self.out_trade_no, "out_trade_no")?;
        if out_trade_no.len() > 32 {
            return Err(WechatError::validation(
                "out_trade_no must be at most 32 characters",
            ));
        }
        let total_fee = self
            .total_fee
            .ok_or_else(|| WechatError::validation("total_fee is required"))
            .and_then(yuan_to_fen)?;

        Ok(PayPackage {
            body: required(self.body, "body")?,
            attach: self.attach,
            out_trade_no,
            total_fee,
            spbill_create_ip: required(self.spbill_create_ip, "spbill_create_ip")?,
            time_start: self.time_start.map(format_pay_time),
            time_expire: self.time_expire.map(format_pay_time),
            goods_tag: self.goods_tag,
            notify_url: required(self.notify_url, "notify_url")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeType {
    Jsapi,
    Native,
    App,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Jsapi => "JSAPI",
            TradeType::Native => "NATIVE",
            TradeType::App => "APP",
        }
    }
}

/// Statement type for bill downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillType {
    All,
    Success,
    Refund,
}

impl BillType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillType::All => "ALL",
            BillType::Success => "SUCCESS",
            BillType::Refund => "REFUND",
        }
    }

    pub fn value(&self) -> u8 {
        match self {
            BillType::All => 0,
            BillType::Success => 1,
            BillType::Refund => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundStatus {
    Success,
    Fail,
    Processing,
    /// Undetermined; resubmit with the original refund number.
    NotSure,
    /// Refunded to the merchant's account; needs manual handling.
    Change,
}

impl FromStr for RefundStatus {
    type Err = WechatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(RefundStatus::Success),
            "FAIL" => Ok(RefundStatus::Fail),
            "PROCESSING" => Ok(RefundStatus::Processing),
            "NOTSURE" => Ok(RefundStatus::NotSure),
            "CHANGE" => Ok(RefundStatus::Change),
            other => Err(WechatError::decode(format!("unknown refund status `{other}`"))),
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepayResult {
    pub prepay_id: String,
    pub trade_type: String,
    /// QR code URL, NATIVE trade type only
    pub code_url: Option<String>,
}

/// Parameters for `WeixinJSBridge.invoke('getBrandWCPayRequest', ...)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsPayRequest {
    pub app_id: String,
    pub time_stamp: String,
    pub nonce_str: String,
    pub package: String,
    pub sign_type: String,
    pub pay_sign: String,
}

/// Payment API
pub struct PayApi {
    context: Arc<WechatContext>,
}

impl PayApi {
    pub fn new(context: Arc<WechatContext>) -> Self {
        Self { context }
    }

    /// Sign `params`, add `appid`, `mch_id`, `nonce_str` and `sign`, and encode as XML.
    fn signed_document(&self, mut params: Vec<(&'static str, String)>) -> Result<String, WechatError> {
        let pay = self.context.pay_config()?;
        params.push(("appid", self.context.appid().to_string()));
        params.push(("mch_id", pay.mch_id.clone()));
        params.push(("nonce_str", nonce_str()));

        let sign = sign_md5(params.iter().map(|(k, v)| (*k, v.as_str())), &pay.key);
        params.push(("sign", sign));

        xml::encode(params.iter().map(|(k, v)| (*k, v.as_str())))
    }

    /// Create a prepay order
    ///
    /// POST https://api.mch.weixin.qq.com/pay/unifiedorder
    ///
    /// `openid` is required for [`TradeType::Jsapi`].
    pub async fn unified_order(
        &self,
        package: &PayPackage,
        trade_type: TradeType,
        openid: Option<&str>,
    ) -> Result<PrepayResult, WechatError> {
        let mut params = package.params();
        params.push(("trade_type", trade_type.as_str().to_string()));
        match (trade_type, openid) {
            (_, Some(openid)) if !openid.is_empty() => params.push(("openid", openid.to_string())),
            (TradeType::Jsapi, _) => {
                return Err(WechatError::validation("openid is required for JSAPI payments"))
            }
            _ => {}
        }

        let descriptor = self
            .context
            .post(keys::PAY_UNIFIED_ORDER)?
            .xml(self.signed_document(params)?);
        let envelope = self.context.dispatch(&descriptor).await?;

        Ok(PrepayResult {
            prepay_id: envelope.str_field("prepay_id")?.to_string(),
            trade_type: envelope
                .str_field("trade_type")
                .unwrap_or(trade_type.as_str())
                .to_string(),
            code_url: envelope.str_field("code_url").ok().map(str::to_string),
        })
    }

    /// Build the signed parameters for a JSAPI payment. No network call.
    pub fn jsapi_pay_request(&self, prepay_id: &str) -> Result<JsPayRequest, WechatError> {
        if prepay_id.is_empty() {
            return Err(WechatError::validation("prepay_id must not be empty"));
        }
        let pay = self.context.pay_config()?;

        let app_id = self.context.appid().to_string();
        let time_stamp = Utc::now().timestamp().to_string();
        let nonce_str = nonce_str();
        let package = format!("prepay_id={prepay_id}");
        let sign_type = "MD5".to_string();

        let pay_sign = sign_md5(
            [
                ("appId", app_id.as_str()),
                ("timeStamp", time_stamp.as_str()),
                ("nonceStr", nonce_str.as_str()),
                ("package", package.as_str()),
                ("signType", sign_type.as_str()),
            ],
            &pay.key,
        );

        Ok(JsPayRequest {
            app_id,
            time_stamp,
            nonce_str,
            package,
            sign_type,
            pay_sign,
        })
    }

    /// Query the status of the first refund of an order
    ///
    /// POST https://api.mch.weixin.qq.com/pay/refundquery
    pub async fn query_refund(&self, out_trade_no: &str) -> Result<RefundStatus, WechatError> {
        if out_trade_no.is_empty() {
            return Err(WechatError::validation("out_trade_no must not be empty"));
        }

        let descriptor = self
            .context
            .post(keys::PAY_REFUND_QUERY)?
            .xml(self.signed_document(vec![("out_trade_no", out_trade_no.to_string())])?);
        let envelope = self.context.dispatch(&descriptor).await?;

        envelope.str_field("refund_status_0")?.parse()
    }

    /// Download the statement for `bill_date`
    ///
    /// POST https://api.mch.weixin.qq.com/pay/downloadbill
    ///
    /// Returns the raw statement text; failures come back as XML envelopes.
    pub async fn download_bill(
        &self,
        bill_date: NaiveDate,
        bill_type: BillType,
    ) -> Result<String, WechatError> {
        let params = vec![
            ("bill_date", bill_date.format("%Y%m%d").to_string()),
            ("bill_type", bill_type.as_str().to_string()),
        ];
        let descriptor = self
            .context
            .post(keys::PAY_DOWNLOAD_BILL)?
            .xml(self.signed_document(params)?)
            .response(ResponseFormat::Binary);

        let bytes = self.context.dispatch(&descriptor).await?.into_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| WechatError::decode(format!("statement is not UTF-8: {e}")))
    }
}

impl WechatApi for PayApi {
    fn api_name(&self) -> &'static str {
        "pay"
    }

    fn context(&self) -> &WechatContext {
        &self.context
    }
}
