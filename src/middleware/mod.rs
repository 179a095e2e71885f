//! Tower middleware for the HTTP transport.
//!
//! Layers wrap [`WechatClient`](crate::client::WechatClient) and see every
//! request, including token issuance. Install one with
//! [`WechatMpBuilder::with_middleware`](crate::client::WechatMpBuilder::with_middleware).
//!
//! ```ignore
//! use wechat_mp_client::middleware::LoggingMiddleware;
//!
//! let wechat = WechatMp::builder()
//!     .appid(appid)
//!     .secret(secret)
//!     .with_middleware(LoggingMiddleware::new().verbose())
//!     .build()?;
//! ```

pub use tower::{Layer, Service, ServiceBuilder};

mod logging;

pub use logging::{LoggingMiddleware, LoggingMiddlewareService};
