//! Endpoint wrappers
//!
//! - [`media`] - Media upload, download and the local media cache
//! - [`user`] - Follower listing
//! - [`message`] - Customer service messages
//! - [`pay`] - Merchant payment (unified order, refund query, bills)
//!
//! Every wrapper holds an `Arc<WechatContext>` and goes through the same
//! dispatcher, so they share one credential store.

pub mod media;
pub mod message;
pub mod pay;
pub mod r#trait;
pub mod user;

pub use media::{classify, MediaApi, MediaType};
pub use message::{MediaMessage, Message, MessageApi, TextMessage};
pub use pay::{
    sign_md5, BillType, JsPayRequest, PayApi, PayPackage, PayPackageBuilder, PrepayResult,
    RefundStatus, TradeType,
};
pub use r#trait::{PayConfig, WechatApi, WechatContext};
pub use user::{Following, UserApi};
