//! Error types for the WeChat client
//!
//! Every failure surfaces as a single [`WechatError`] value. Callers branch on
//! [`WechatError::kind`] rather than on a hierarchy of error types.

use std::fmt;

use thiserror::Error;

/// Local sentinel codes for failures that never reached the platform.
pub mod codes {
    /// Connection, timeout, non-2xx status or local IO failure.
    pub const TRANSPORT: i64 = -1001;
    /// Malformed body or unexpected payload shape.
    pub const DECODE: i64 = -1002;
    /// The issuance call failed without a platform error code.
    pub const CREDENTIAL_ACQUISITION: i64 = -1003;
    /// Caller input rejected before any request was built.
    pub const LOCAL_VALIDATION: i64 = -1004;
    /// Payment XML envelope reporting `FAIL` in `return_code` or `result_code`.
    pub const PAY_FAILURE: i64 = -1005;
    /// Platform "system busy" code.
    pub const SYSTEM_BUSY: i64 = -1;
}

/// Platform codes meaning the access token was rejected (expired, invalid or missing).
const CREDENTIAL_EXPIRY_CODES: &[i64] = &[40001, 40014, 41001, 42001];

/// Returns `true` when `code` says the access token must be refreshed.
pub fn is_credential_expiry_code(code: i64) -> bool {
    CREDENTIAL_EXPIRY_CODES.contains(&code)
}

/// Discriminator for [`WechatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection, timeout or IO failure. Not retried by the dispatcher.
    Transport,
    /// Malformed or unexpected response body.
    Decode,
    /// The access token issuance call failed.
    CredentialAcquisition,
    /// Well-formed envelope carrying a non-zero error code.
    RemoteRejected,
    /// Envelope reporting an expired or invalid access token.
    CredentialExpired,
    /// Malformed caller input, detected before any network attempt.
    LocalValidation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Decode => "decode",
            ErrorKind::CredentialAcquisition => "credential acquisition",
            ErrorKind::RemoteRejected => "remote rejected",
            ErrorKind::CredentialExpired => "credential expired",
            ErrorKind::LocalValidation => "local validation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// WeChat client error
#[derive(Debug, Error)]
#[error("{kind} error (code={code}): {message}")]
pub struct WechatError {
    kind: ErrorKind,
    code: i64,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl WechatError {
    pub fn new(kind: ErrorKind, code: i64, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, codes::TRANSPORT, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, codes::DECODE, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LocalValidation, codes::LOCAL_VALIDATION, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::decode(format!("missing field `{field}` in response"))
    }

    /// Classify a platform-reported error code.
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        let kind = if is_credential_expiry_code(code) {
            ErrorKind::CredentialExpired
        } else {
            ErrorKind::RemoteRejected
        };
        Self::new(kind, code, message)
    }

    /// Returns `Ok(())` for `errcode == 0`, otherwise the classified error.
    pub fn check_api(code: i64, message: &str) -> Result<(), WechatError> {
        if code == 0 {
            Ok(())
        } else {
            Err(Self::remote(code, message))
        }
    }

    pub(crate) fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Re-tag this error as a failed access token issuance.
    ///
    /// Platform codes are kept; local sentinels become
    /// [`codes::CREDENTIAL_ACQUISITION`].
    pub(crate) fn into_acquisition(self) -> Self {
        let code = if self.code < 0 && self.code != codes::SYSTEM_BUSY {
            codes::CREDENTIAL_ACQUISITION
        } else {
            self.code
        };
        Self {
            kind: ErrorKind::CredentialAcquisition,
            code,
            message: format!("access token issuance failed: {}", self.message),
            source: self.source,
        }
    }

    /// An expiry reported again after the single refresh is surfaced as a rejection.
    pub(crate) fn into_rejected(mut self) -> Self {
        self.kind = ErrorKind::RemoteRejected;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` for failures worth retrying later.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            ErrorKind::Transport => true,
            ErrorKind::RemoteRejected | ErrorKind::CredentialAcquisition => {
                self.code == codes::SYSTEM_BUSY
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for WechatError {
    fn from(e: reqwest::Error) -> Self {
        let base = if e.is_decode() {
            Self::decode(e.to_string())
        } else if e.is_timeout() {
            Self::transport(format!("request timed out: {e}"))
        } else {
            Self::transport(e.to_string())
        };
        base.with_source(e)
    }
}

impl From<serde_json::Error> for WechatError {
    fn from(e: serde_json::Error) -> Self {
        Self::decode(e.to_string()).with_source(e)
    }
}

impl From<std::io::Error> for WechatError {
    fn from(e: std::io::Error) -> Self {
        Self::transport(format!("io error: {e}")).with_source(e)
    }
}
