//! Request descriptors
//!
//! A [`RequestDescriptor`] is the ready-to-send form of one outbound call. It is
//! rendered into a fresh [`reqwest::Request`] on every attempt, so the dispatcher
//! can resend it after a credential refresh.

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::WechatError;

/// Placeholder name reserved for the access token.
pub const ACCESS_TOKEN_SLOT: &str = "access_token";

/// Characters that must be encoded in substituted URL values.
const URL_VALUE_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b'=')
    .add(b'?')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Expected shape of the response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Xml,
    /// Raw bytes; only JSON error bodies are decoded.
    Binary,
}

/// One file part of a multipart body
#[derive(Debug, Clone)]
pub struct Part {
    pub name: String,
    pub file_name: String,
    pub data: Vec<u8>,
    pub mime: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
    Xml(String),
    Raw {
        data: Vec<u8>,
        content_type: String,
    },
    Multipart(Vec<Part>),
}

/// Fully specified outbound call
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: HttpMethod,
    template: String,
    params: Vec<(String, String)>,
    body: Body,
    response: ResponseFormat,
    timeout: Option<Duration>,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, template: impl Into<String>) -> Self {
        Self {
            method,
            template: template.into(),
            params: Vec::new(),
            body: Body::Empty,
            response: ResponseFormat::Json,
            timeout: None,
        }
    }

    pub fn get(template: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, template)
    }

    pub fn post(template: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, template)
    }

    /// Fill the `{name}` placeholder of the URL template.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn json(self, value: serde_json::Value) -> Self {
        self.body(Body::Json(value))
    }

    pub fn xml(self, document: impl Into<String>) -> Self {
        self.body(Body::Xml(document.into())).response(ResponseFormat::Xml)
    }

    pub fn form(self, fields: Vec<(String, String)>) -> Self {
        self.body(Body::Form(fields))
    }

    pub fn part(mut self, part: Part) -> Self {
        match &mut self.body {
            Body::Multipart(parts) => parts.push(part),
            _ => self.body = Body::Multipart(vec![part]),
        }
        self
    }

    pub fn response(mut self, format: ResponseFormat) -> Self {
        self.response = format;
        self
    }

    /// Per-call timeout, overriding the client default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn response_format(&self) -> ResponseFormat {
        self.response
    }

    pub fn body_ref(&self) -> &Body {
        &self.body
    }

    /// Whether the URL template carries the `{access_token}` slot.
    pub fn needs_credential(&self) -> bool {
        self.template.contains("{access_token}")
    }

    /// Render the URL, substituting params and the access token.
    ///
    /// Relative templates are resolved against `base_url`.
    pub fn render_url(
        &self,
        base_url: &str,
        access_token: Option<&str>,
    ) -> Result<String, WechatError> {
        let mut rendered = String::with_capacity(self.template.len() + 64);
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| {
                WechatError::validation(format!("unterminated placeholder in {}", self.template))
            })?;
            let name = &after[..end];

            let value = if name == ACCESS_TOKEN_SLOT {
                access_token.ok_or_else(|| {
                    WechatError::validation("access_token slot present but no credential given")
                })?
            } else {
                self.params
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.as_str())
                    .ok_or_else(|| {
                        WechatError::validation(format!(
                            "missing value for `{{{name}}}` in {}",
                            self.template
                        ))
                    })?
            };
            rendered.extend(utf8_percent_encode(value, URL_VALUE_ENCODE_SET));
            rest = &after[end + 1..];
        }
        rendered.push_str(rest);

        if rendered.starts_with("http://") || rendered.starts_with("https://") {
            Ok(rendered)
        } else {
            Ok(format!("{}{}", base_url.trim_end_matches('/'), rendered))
        }
    }

    pub(crate) fn build(
        &self,
        http: &reqwest::Client,
        base_url: &str,
        access_token: Option<&str>,
    ) -> Result<reqwest::Request, WechatError> {
        let url = self.render_url(base_url, access_token)?;
        let mut builder = match self.method {
            HttpMethod::Get => http.get(url),
            HttpMethod::Post => http.post(url),
        };

        builder = match &self.body {
            Body::Empty => builder,
            Body::Form(fields) => builder.form(fields),
            Body::Json(value) => builder.json(value),
            Body::Xml(document) => builder
                .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
                .body(document.clone()),
            Body::Raw { data, content_type } => builder
                .header(reqwest::header::CONTENT_TYPE, content_type.as_str())
                .body(data.clone()),
            Body::Multipart(parts) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    let mut file = reqwest::multipart::Part::bytes(part.data.clone())
                        .file_name(part.file_name.clone());
                    if let Some(mime) = &part.mime {
                        file = file.mime_str(mime)?;
                    }
                    form = form.part(part.name.clone(), file);
                }
                builder.multipart(form)
            }
        };

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(builder.build()?)
    }
}
