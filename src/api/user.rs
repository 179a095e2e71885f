//! User directory API
//!
//! Paged listing of the Official Account's followers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::keys;
use crate::error::WechatError;

use super::{WechatApi, WechatContext};

#[derive(Debug, Default, Deserialize)]
struct FollowingData {
    #[serde(default)]
    openid: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FollowingResponse {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    count: u64,
    #[serde(default)]
    data: Option<FollowingData>,
    #[serde(default)]
    next_openid: String,
}

/// One page of followers
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Following {
    /// Total number of followers
    pub total: u64,
    /// Number of openids in this page (at most 10000)
    pub count: u64,
    pub openids: Vec<String>,
    /// Cursor for the next page; `None` once the listing is exhausted.
    pub next_openid: Option<String>,
}

impl From<FollowingResponse> for Following {
    fn from(raw: FollowingResponse) -> Self {
        let openids = raw.data.unwrap_or_default().openid;
        let next_openid = if raw.next_openid.is_empty() || raw.count == 0 {
            None
        } else {
            Some(raw.next_openid)
        };
        Self {
            total: raw.total,
            count: raw.count,
            openids,
            next_openid,
        }
    }
}

/// User directory API
pub struct UserApi {
    context: Arc<WechatContext>,
}

impl UserApi {
    pub fn new(context: Arc<WechatContext>) -> Self {
        Self { context }
    }

    /// List followers
    ///
    /// GET /cgi-bin/user/get?access_token=ACCESS_TOKEN&next_openid=NEXT_OPENID
    ///
    /// Pass `None` for the first page, then the previous page's `next_openid`.
    pub async fn get_following(&self, next_openid: Option<&str>) -> Result<Following, WechatError> {
        let descriptor = self
            .context
            .get(keys::FOLLOWING)?
            .param("next_openid", next_openid.unwrap_or_default());

        let envelope = self.context.dispatch(&descriptor).await?;
        let raw: FollowingResponse = envelope.parse()?;
        Ok(raw.into())
    }

    /// Walk every page and collect all follower openids.
    ///
    /// Stops early when a page adds nothing or repeats the previous cursor, so
    /// every request grows the result until `total` is reached.
    pub async fn get_all_following(&self) -> Result<Vec<String>, WechatError> {
        let mut openids = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.get_following(cursor.as_deref()).await?;

            let added = page.openids.len();
            openids.extend(page.openids);

            let Some(next) = page.next_openid else { break };
            if openids.len() as u64 >= page.total {
                break;
            }
            if added == 0 || cursor.as_deref() == Some(next.as_str()) {
                log::warn!(
                    "follower listing stalled at cursor {next:?} with {} of {} openids",
                    openids.len(),
                    page.total
                );
                break;
            }
            cursor = Some(next);
        }
        Ok(openids)
    }
}

impl WechatApi for UserApi {
    fn api_name(&self) -> &'static str {
        "user"
    }

    fn context(&self) -> &WechatContext {
        &self.context
    }
}
