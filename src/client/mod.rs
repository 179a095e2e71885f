//! HTTP client, request descriptors and dispatch

mod request;
pub use request::{
    Body, HttpMethod, Part, RequestDescriptor, ResponseFormat, ACCESS_TOKEN_SLOT,
};

mod wechat_client;
pub use wechat_client::{WechatClient, WechatClientBuilder};

mod dispatcher;
pub use dispatcher::Dispatcher;

mod wechat_mp;
pub use wechat_mp::WechatMp;

mod builder;
pub use builder::WechatMpBuilder;
