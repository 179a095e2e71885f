//! Request dispatch with credential injection
//!
//! [`Dispatcher::dispatch`] attaches the current access token, sends the call and
//! classifies the envelope. A credential-expiry code triggers one refresh and
//! one resend; every other failure propagates unchanged.

use std::sync::Arc;

use crate::envelope::Envelope;
use crate::error::{ErrorKind, WechatError};
use crate::token::{Credential, CredentialStore};

use super::{RequestDescriptor, WechatClient};

#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: WechatClient,
    credentials: Arc<CredentialStore>,
}

impl Dispatcher {
    pub fn new(client: WechatClient, credentials: Arc<CredentialStore>) -> Self {
        Self {
            client,
            credentials,
        }
    }

    pub fn client(&self) -> &WechatClient {
        &self.client
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Send `descriptor` and return the successful envelope.
    pub async fn dispatch(&self, descriptor: &RequestDescriptor) -> Result<Envelope, WechatError> {
        let (credential, first) = self.attempt(descriptor).await?;

        let err = match first {
            Err(e) if e.kind() == ErrorKind::CredentialExpired => e,
            other => return other,
        };

        let Some(rejected) = credential else {
            return Err(err.into_rejected());
        };

        log::warn!(
            "access token rejected by {} (code={}), refreshing and retrying once",
            descriptor.template(),
            err.code()
        );
        self.credentials.invalidate_if_current(&rejected).await;

        let (_, second) = self.attempt(descriptor).await?;
        second.map_err(|e| {
            if e.kind() == ErrorKind::CredentialExpired {
                e.into_rejected()
            } else {
                e
            }
        })
    }

    /// One send. The outer `Result` carries failures that must not be retried;
    /// the inner one the classified envelope.
    async fn attempt(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<(Option<Credential>, Result<Envelope, WechatError>), WechatError> {
        let credential = if descriptor.needs_credential() {
            Some(self.credentials.get_credential().await?)
        } else {
            None
        };

        let request = descriptor.build(
            self.client.http(),
            self.client.base_url(),
            credential.as_ref().map(Credential::token),
        )?;
        log::debug!(
            "dispatching {} {}",
            request.method(),
            descriptor.template()
        );

        let envelope = self
            .client
            .execute(request, descriptor.response_format())
            .await?;

        Ok((credential, envelope.into_result()))
    }
}
