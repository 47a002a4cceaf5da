//! Per-channel client construction and credential resolution

use async_trait::async_trait;
use parley_common::config::{ChannelCredentialConfig, GraphConfig};
use parley_storage::models::Channel;
use std::collections::HashMap;
use std::sync::Arc;

use super::adapter::{AdapterError, PlatformSendAdapter};
use super::graph::GraphApiClient;

/// Usable bearer credential for one channel
#[derive(Clone)]
pub struct ChannelCredential {
    pub access_token: String,
    pub business_account_id: Option<String>,
}

impl std::fmt::Debug for ChannelCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCredential")
            .field("access_token", &"<redacted>")
            .field("business_account_id", &self.business_account_id)
            .finish()
    }
}

/// Resolves the credential of a channel; storage and decryption live elsewhere
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, channel: &Channel) -> Result<ChannelCredential, AdapterError>;
}

/// Credentials from the `[[channels]]` configuration table
pub struct StaticCredentials {
    by_platform_id: HashMap<String, ChannelCredential>,
}

impl StaticCredentials {
    pub fn new(entries: &[ChannelCredentialConfig]) -> Self {
        let by_platform_id = entries
            .iter()
            .map(|entry| {
                (
                    entry.platform_id.clone(),
                    ChannelCredential {
                        access_token: entry.access_token.clone(),
                        business_account_id: entry.business_account_id.clone(),
                    },
                )
            })
            .collect();
        Self { by_platform_id }
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn resolve(&self, channel: &Channel) -> Result<ChannelCredential, AdapterError> {
        self.by_platform_id
            .get(&channel.platform_id)
            .cloned()
            .ok_or_else(|| AdapterError::NotConfigured(channel.platform_id.clone()))
    }
}

/// Hands out the send adapter for a channel
#[async_trait]
pub trait ChannelClients: Send + Sync {
    async fn client_for(
        &self,
        channel: &Channel,
    ) -> Result<Arc<dyn PlatformSendAdapter>, AdapterError>;
}

/// Builds a [`GraphApiClient`] per channel over one shared connection pool
pub struct GraphChannelClients {
    http: reqwest::Client,
    config: GraphConfig,
    credentials: Arc<dyn CredentialResolver>,
}

impl GraphChannelClients {
    pub fn new(
        config: GraphConfig,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            http: GraphApiClient::http_client(&config)?,
            config,
            credentials,
        })
    }
}

#[async_trait]
impl ChannelClients for GraphChannelClients {
    async fn client_for(
        &self,
        channel: &Channel,
    ) -> Result<Arc<dyn PlatformSendAdapter>, AdapterError> {
        let platform = channel.platform_enum().ok_or_else(|| {
            AdapterError::Rejected(format!("unsupported platform {}", channel.platform))
        })?;
        let credential = self.credentials.resolve(channel).await?;

        Ok(Arc::new(
            GraphApiClient::new(
                self.http.clone(),
                &self.config,
                platform,
                channel.platform_id.clone(),
                credential.access_token,
            )
            .with_business_account(credential.business_account_id),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn channel(platform_id: &str) -> Channel {
        Channel {
            id: uuid::Uuid::new_v4(),
            platform: "whatsapp".to_string(),
            platform_id: platform_id.to_string(),
            name: "Shop".to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_static_credentials() {
        let resolver = StaticCredentials::new(&[ChannelCredentialConfig {
            platform_id: "10001".to_string(),
            access_token: "secret-token".to_string(),
            business_account_id: None,
        }]);

        let credential = resolver.resolve(&channel("10001")).await.unwrap();
        assert_eq!(credential.access_token, "secret-token");
        assert!(!format!("{:?}", credential).contains("secret-token"));

        let err = resolver.resolve(&channel("20002")).await.unwrap_err();
        assert_eq!(err, AdapterError::NotConfigured("20002".to_string()));
    }
}
