//! Uniform view over decoded platform responses
//!
//! Every structured response is reduced to an error code, an error message and
//! a payload. JSON bodies report failures through `errcode`/`errmsg`; payment
//! XML bodies through `return_code`/`result_code`. Binary downloads are wrapped
//! in a success envelope unless the platform answered with a JSON or XML error body.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::ResponseFormat;
use crate::error::{codes, WechatError};
use crate::xml;

const XML_SUCCESS: &str = "SUCCESS";

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Structured(Value),
    Binary {
        data: Vec<u8>,
        content_type: Option<String>,
    },
}

/// Decoded response
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    code: i64,
    message: String,
    payload: Payload,
}

impl Envelope {
    pub fn new(code: i64, message: impl Into<String>, payload: Payload) -> Self {
        Self {
            code,
            message: message.into(),
            payload,
        }
    }

    /// Wrap raw bytes in a success envelope.
    pub fn binary(data: Vec<u8>, content_type: Option<String>) -> Self {
        Self::new(0, "ok", Payload::Binary { data, content_type })
    }

    /// Decode a response body according to the declared format.
    pub fn decode(
        format: ResponseFormat,
        body: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<Self, WechatError> {
        match format {
            ResponseFormat::Json => Self::from_json(&body),
            ResponseFormat::Xml => Self::from_xml(&body),
            ResponseFormat::Binary => {
                if looks_like_json_error(content_type.as_deref(), &body) {
                    if let Ok(value) = serde_json::from_slice::<Value>(&body) {
                        if value.get("errcode").is_some() {
                            return Self::from_value(value);
                        }
                    }
                }
                if starts_with(&body, b"<xml>") {
                    if let Ok(envelope) = Self::from_xml(&body) {
                        if !envelope.is_success() {
                            return Ok(envelope);
                        }
                    }
                }
                Ok(Self::binary(body, content_type))
            }
        }
    }

    pub fn from_json(body: &[u8]) -> Result<Self, WechatError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| WechatError::decode(format!("malformed JSON body: {e}")).with_source(e))?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, WechatError> {
        let code = match value.get("errcode") {
            None | Some(Value::Null) => 0,
            Some(raw) => raw
                .as_i64()
                .ok_or_else(|| WechatError::decode(format!("errcode is not an integer: {raw}")))?,
        };
        let message = value
            .get("errmsg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Self::new(code, message, Payload::Structured(value)))
    }

    pub fn from_xml(body: &[u8]) -> Result<Self, WechatError> {
        let value = xml::decode(body)?;

        if let Some(raw) = value.get("errcode") {
            let code = raw
                .as_str()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .ok_or_else(|| WechatError::decode(format!("errcode is not an integer: {raw}")))?;
            let message = text_field(&value, "errmsg").unwrap_or_default().to_string();
            return Ok(Self::new(code, message, Payload::Structured(value)));
        }

        if let Some(return_code) = text_field(&value, "return_code") {
            if return_code != XML_SUCCESS {
                let message = text_field(&value, "return_msg")
                    .unwrap_or(return_code)
                    .to_string();
                return Ok(Self::new(
                    codes::PAY_FAILURE,
                    message,
                    Payload::Structured(value),
                ));
            }
        }

        if let Some(result_code) = text_field(&value, "result_code") {
            if result_code != XML_SUCCESS {
                let err_code = text_field(&value, "err_code").unwrap_or(result_code);
                let message = match text_field(&value, "err_code_des") {
                    Some(description) => format!("{err_code}: {description}"),
                    None => err_code.to_string(),
                };
                return Ok(Self::new(
                    codes::PAY_FAILURE,
                    message,
                    Payload::Structured(value),
                ));
            }
        }

        let message = text_field(&value, "return_msg").unwrap_or("ok").to_string();
        Ok(Self::new(0, message, Payload::Structured(value)))
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Turn a failure envelope into its classified error.
    pub fn into_result(self) -> Result<Self, WechatError> {
        WechatError::check_api(self.code, &self.message)?;
        Ok(self)
    }

    fn structured(&self) -> Result<&Value, WechatError> {
        match &self.payload {
            Payload::Structured(value) => Ok(value),
            Payload::Binary { .. } => Err(WechatError::decode(
                "expected a structured response, got binary content",
            )),
        }
    }

    /// Raw field of the structured payload.
    pub fn field(&self, name: &str) -> Result<&Value, WechatError> {
        self.structured()?
            .get(name)
            .ok_or_else(|| WechatError::missing_field(name))
    }

    pub fn str_field(&self, name: &str) -> Result<&str, WechatError> {
        self.field(name)?
            .as_str()
            .ok_or_else(|| WechatError::decode(format!("field `{name}` is not a string")))
    }

    /// Integer field; numeric strings from XML payloads are accepted.
    pub fn i64_field(&self, name: &str) -> Result<i64, WechatError> {
        let value = self.field(name)?;
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| WechatError::decode(format!("field `{name}` is not an integer")))
    }

    /// Deserialize the whole structured payload into a typed shape.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, WechatError> {
        let value = self.structured()?.clone();
        Ok(serde_json::from_value(value)?)
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, WechatError> {
        match self.payload {
            Payload::Binary { data, .. } => Ok(data),
            Payload::Structured(_) => Err(WechatError::decode(
                "expected binary content, got a structured response",
            )),
        }
    }
}

fn text_field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value.get(name).and_then(Value::as_str)
}

fn starts_with(body: &[u8], prefix: &[u8]) -> bool {
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    body[start..].starts_with(prefix)
}

fn looks_like_json_error(content_type: Option<&str>, body: &[u8]) -> bool {
    let declared = content_type
        .map(|ct| ct.contains("json") || ct.starts_with("text/plain"))
        .unwrap_or(false);
    declared && starts_with(body, b"{")
}
