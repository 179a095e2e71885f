//! URL template configuration
//!
//! [`ApiUrls`] maps endpoint keys to URL templates. Templates are paths relative
//! to the client's base URL or absolute `http(s)://` URLs, with `{name}`
//! placeholders filled per call; `{access_token}` is the credential slot.
//!
//! How the mapping is loaded is up to the caller. It deserializes from any
//! serde format as a flat key/template map and overlays the defaults.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::WechatError;

pub mod keys {
    pub const TOKEN: &str = "token";
    pub const MEDIA_UPLOAD: &str = "media_upload";
    pub const MEDIA_DOWNLOAD: &str = "media_download";
    pub const FOLLOWING: &str = "following";
    pub const CUSTOM_SEND: &str = "custom_send";
    pub const PAY_UNIFIED_ORDER: &str = "pay_unified_order";
    pub const PAY_REFUND_QUERY: &str = "pay_refund_query";
    pub const PAY_DOWNLOAD_BILL: &str = "pay_download_bill";
}

const DEFAULTS: &[(&str, &str)] = &[
    (keys::TOKEN, crate::token::DEFAULT_TOKEN_TEMPLATE),
    (
        keys::MEDIA_UPLOAD,
        "/cgi-bin/media/upload?access_token={access_token}&type={type}",
    ),
    (
        keys::MEDIA_DOWNLOAD,
        "/cgi-bin/media/get?access_token={access_token}&media_id={media_id}",
    ),
    (
        keys::FOLLOWING,
        "/cgi-bin/user/get?access_token={access_token}&next_openid={next_openid}",
    ),
    (
        keys::CUSTOM_SEND,
        "/cgi-bin/message/custom/send?access_token={access_token}",
    ),
    (
        keys::PAY_UNIFIED_ORDER,
        "https://api.mch.weixin.qq.com/pay/unifiedorder",
    ),
    (
        keys::PAY_REFUND_QUERY,
        "https://api.mch.weixin.qq.com/pay/refundquery",
    ),
    (
        keys::PAY_DOWNLOAD_BILL,
        "https://api.mch.weixin.qq.com/pay/downloadbill",
    ),
];

/// Endpoint key → URL template mapping
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "HashMap<String, String>")]
pub struct ApiUrls {
    templates: HashMap<String, String>,
}

impl Default for ApiUrls {
    fn default() -> Self {
        Self {
            templates: DEFAULTS
                .iter()
                .map(|(key, template)| (key.to_string(), template.to_string()))
                .collect(),
        }
    }
}

impl From<HashMap<String, String>> for ApiUrls {
    fn from(overrides: HashMap<String, String>) -> Self {
        let mut urls = Self::default();
        urls.templates.extend(overrides);
        urls
    }
}

impl ApiUrls {
    /// Template for `key`.
    ///
    /// # Errors
    /// `LocalValidation` for unknown keys.
    pub fn get(&self, key: &str) -> Result<&str, WechatError> {
        self.templates
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| WechatError::validation(format!("no URL template for `{key}`")))
    }

    pub fn set(&mut self, key: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(key.into(), template.into());
    }

    pub fn with(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.set(key, template);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults_cover_all_keys() {
        let urls = ApiUrls::default();
        for key in [
            keys::TOKEN,
            keys::MEDIA_UPLOAD,
            keys::MEDIA_DOWNLOAD,
            keys::FOLLOWING,
            keys::CUSTOM_SEND,
            keys::PAY_UNIFIED_ORDER,
            keys::PAY_REFUND_QUERY,
            keys::PAY_DOWNLOAD_BILL,
        ] {
            assert!(urls.get(key).is_ok(), "missing default for {key}");
        }
    }

    #[test]
    fn test_unknown_key() {
        let err = ApiUrls::default().get("menu_create").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocalValidation);
    }

    #[test]
    fn test_override() {
        let urls = ApiUrls::default().with(keys::PAY_UNIFIED_ORDER, "/pay/unifiedorder");
        assert_eq!(urls.get(keys::PAY_UNIFIED_ORDER).unwrap(), "/pay/unifiedorder");
    }

    #[test]
    fn test_deserialize_overlays_defaults() {
        let urls: ApiUrls =
            serde_json::from_str(r#"{"media_download": "/media/get?media_id={media_id}&access_token={access_token}"}"#)
                .unwrap();
        assert_eq!(
            urls.get(keys::MEDIA_DOWNLOAD).unwrap(),
            "/media/get?media_id={media_id}&access_token={access_token}"
        );
        assert!(urls.get(keys::MEDIA_UPLOAD).unwrap().contains("/cgi-bin/media/upload"));
    }
}
