//! WeChat Official Account API client core
//!
//! Shared plumbing for calling the WeChat server APIs: one access-token store
//! per application with single-flight refresh, a dispatcher that retries once
//! when the platform reports an expired token, a uniform envelope over JSON
//! and XML responses, and a single tagged error type.
//!
//! On top of that sit a few endpoint wrappers: media upload/download with a
//! local read-through cache, follower listing, customer service messages and
//! merchant payments.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wechat_mp_client::{WechatMp, types::{AppId, AppSecret}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let wechat = WechatMp::builder()
//!         .appid(AppId::new("wx1234567890abcdef")?)
//!         .secret(AppSecret::new("your_secret")?)
//!         .build()?;
//!
//!     let page = wechat.get_following(None).await?;
//!     for openid in &page.openids {
//!         wechat.send_text(openid, "Hello!").await?;
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Endpoint wrappers (media, user, message, pay)
//! - [`client`] - HTTP transport, request descriptors and the dispatcher
//! - [`config`] - URL template mapping
//! - [`envelope`] - Decoded response view
//! - [`error`] - Error taxonomy
//! - [`middleware`] - Tower middleware for the transport
//! - [`storage`] - Filesystem seam for the media cache
//! - [`token`] - Access token store
//! - [`types`] - Validated identifiers
//! - [`xml`] - Flat XML codec for payment documents
//!
//! ## Error Handling
//!
//! Every fallible call returns [`WechatError`]; branch on its [`ErrorKind`]:
//!
//! ```rust,ignore
//! use wechat_mp_client::ErrorKind;
//!
//! match wechat.send_text(openid, "hi").await {
//!     Ok(()) => {}
//!     Err(e) if e.kind() == ErrorKind::RemoteRejected => {
//!         eprintln!("rejected: {} - {}", e.code(), e.message());
//!     }
//!     Err(e) if e.is_transient() => { /* retry later */ }
//!     Err(e) => return Err(e.into()),
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod middleware;
pub mod storage;
pub mod token;
pub mod types;
pub mod xml;

pub use client::{
    Dispatcher, RequestDescriptor, ResponseFormat, WechatClient, WechatClientBuilder, WechatMp,
    WechatMpBuilder,
};
pub use envelope::{Envelope, Payload};
pub use error::{ErrorKind, WechatError};
