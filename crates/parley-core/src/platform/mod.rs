//! Platform Module - Outbound provider clients and external collaborators

mod adapter;
mod clients;
mod graph;
mod sync;

pub use adapter::{AdapterError, MediaKind, PlatformSendAdapter, ProviderTemplate, SendReceipt};
pub use clients::{
    ChannelClients, ChannelCredential, CredentialResolver, GraphChannelClients, StaticCredentials,
};
pub use graph::GraphApiClient;
pub use sync::{ExternalSync, NoopExternalSync};

#[cfg(test)]
pub(crate) mod testing {
    //! Recording adapter used by the pipeline tests

    use super::*;
    use async_trait::async_trait;
    use parley_storage::models::Channel;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Sent {
        Text { to: String, text: String },
        Template { to: String, name: String, components: serde_json::Value },
    }

    #[derive(Default)]
    pub struct MockAdapter {
        pub sent: Mutex<Vec<Sent>>,
        pub failures: Mutex<HashMap<String, AdapterError>>,
        pub templates: Mutex<Vec<ProviderTemplate>>,
    }

    impl MockAdapter {
        pub fn fail_for(&self, recipient: &str, error: AdapterError) {
            self.failures
                .lock()
                .unwrap()
                .insert(recipient.to_string(), error);
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn record(&self, to: &str, sent: Sent) -> Result<SendReceipt, AdapterError> {
            if let Some(err) = self.failures.lock().unwrap().get(to) {
                return Err(err.clone());
            }
            let mut log = self.sent.lock().unwrap();
            log.push(sent);
            Ok(SendReceipt {
                message_id: format!("wamid.mock{}", log.len()),
            })
        }
    }

    #[async_trait]
    impl PlatformSendAdapter for MockAdapter {
        async fn send_text(&self, recipient: &str, text: &str) -> Result<SendReceipt, AdapterError> {
            self.record(
                recipient,
                Sent::Text {
                    to: recipient.to_string(),
                    text: text.to_string(),
                },
            )
        }

        async fn send_template(
            &self,
            recipient: &str,
            name: &str,
            _language: &str,
            components: serde_json::Value,
        ) -> Result<SendReceipt, AdapterError> {
            self.record(
                recipient,
                Sent::Template {
                    to: recipient.to_string(),
                    name: name.to_string(),
                    components,
                },
            )
        }

        async fn send_media(
            &self,
            recipient: &str,
            _kind: MediaKind,
            url: &str,
            _caption: Option<&str>,
        ) -> Result<SendReceipt, AdapterError> {
            self.record(
                recipient,
                Sent::Text {
                    to: recipient.to_string(),
                    text: url.to_string(),
                },
            )
        }

        async fn list_templates(&self) -> Result<Vec<ProviderTemplate>, AdapterError> {
            Ok(self.templates.lock().unwrap().clone())
        }
    }

    /// Returns the same adapter for every channel
    pub struct MockClients(pub Arc<MockAdapter>);

    #[async_trait]
    impl ChannelClients for MockClients {
        async fn client_for(
            &self,
            _channel: &Channel,
        ) -> Result<Arc<dyn PlatformSendAdapter>, AdapterError> {
            Ok(self.0.clone())
        }
    }
}
