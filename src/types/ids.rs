use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WechatError;

/// String newtype whose constructor runs `$check` and rejects on `Err(reason)`.
macro_rules! checked_string {
    ($(#[$meta:meta])* $name:ident, $check:expr) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, WechatError> {
                let value = value.into();
                let check: fn(&str) -> Result<(), String> = $check;
                check(&value).map_err(|reason| {
                    WechatError::validation(format!("invalid {}: {reason}", stringify!($name)))
                })?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = WechatError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

fn non_empty(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err("must not be blank".to_string())
    } else {
        Ok(())
    }
}

checked_string!(
    /// Official Account AppID: `wx` followed by 16 alphanumerics.
    AppId,
    |id| {
        if !id.starts_with("wx") {
            return Err(format!("{id:?} does not start with \"wx\""));
        }
        if id.len() != 18 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("{id:?} is not 18 ASCII alphanumerics"));
        }
        Ok(())
    }
);

checked_string!(
    /// Official Account AppSecret. Never printed by `Debug`.
    AppSecret,
    non_empty
);

checked_string!(
    /// Access token issued by `/cgi-bin/token`.
    AccessToken,
    non_empty
);

impl fmt::Debug for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AppId").field(&self.0).finish()
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AppSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AppSecret(***)")
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head: String = self.0.chars().take(6).collect();
        write!(f, "AccessToken({head}..)")
    }
}
