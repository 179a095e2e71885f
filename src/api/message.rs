//! Customer Service Message API
//!
//! Sends messages to followers who interacted with the account in the last
//! 48 hours.
//!
//! # Example
//!
//! ```rust,ignore
//! let api = MessageApi::new(context);
//! api.send_text("OPENID", "Hello!").await?;
//! api.send("OPENID", Message::image(media_id)).await?;
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::config::keys;
use crate::error::WechatError;

use super::{WechatApi, WechatContext};

/// Message types for customer service messages
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "msgtype", rename_all = "lowercase")]
pub enum Message {
    Text { text: TextMessage },
    Image { image: MediaMessage },
    Voice { voice: MediaMessage },
}

impl Message {
    pub fn text(content: impl Into<String>) -> Self {
        Message::Text {
            text: TextMessage {
                content: content.into(),
            },
        }
    }

    pub fn image(media_id: impl Into<String>) -> Self {
        Message::Image {
            image: MediaMessage {
                media_id: media_id.into(),
            },
        }
    }

    pub fn voice(media_id: impl Into<String>) -> Self {
        Message::Voice {
            voice: MediaMessage {
                media_id: media_id.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TextMessage {
    pub content: String,
}

/// Media message content; `media_id` comes from the upload API
#[derive(Debug, Clone, Serialize)]
pub struct MediaMessage {
    pub media_id: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    touser: &'a str,
    #[serde(flatten)]
    message: &'a Message,
}

/// Customer Service Message API
pub struct MessageApi {
    context: Arc<WechatContext>,
}

impl MessageApi {
    pub fn new(context: Arc<WechatContext>) -> Self {
        Self { context }
    }

    /// Send a customer service message
    ///
    /// POST /cgi-bin/message/custom/send?access_token=ACCESS_TOKEN
    pub async fn send(&self, touser: &str, message: Message) -> Result<(), WechatError> {
        if touser.is_empty() {
            return Err(WechatError::validation("touser must not be empty"));
        }

        let body = serde_json::to_value(SendRequest {
            touser,
            message: &message,
        })?;
        let descriptor = self.context.post(keys::CUSTOM_SEND)?.json(body);

        self.context.dispatch(&descriptor).await?;
        Ok(())
    }

    pub async fn send_text(&self, touser: &str, content: &str) -> Result<(), WechatError> {
        self.send(touser, Message::text(content)).await
    }
}

impl WechatApi for MessageApi {
    fn api_name(&self) -> &'static str {
        "message"
    }

    fn context(&self) -> &WechatContext {
        &self.context
    }
}
