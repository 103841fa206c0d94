// Resolves the signed-in user to a durable client record, creating one at most once

use crate::backend::{ApiError, ClientDirectory};
use crate::models::{NewClient, UserIdentity};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Client directory unavailable: {0}")]
    DirectoryUnavailable(#[from] ApiError),

    #[error("Client mapping store error: {0}")]
    MappingStore(String),

    #[error("User identity has no email address")]
    MissingEmail,
}

// Persists the user identity -> client id mapping between sessions
#[async_trait]
pub trait ClientMappingStore: Send + Sync + 'static {
    async fn load(&self, user_id: &str) -> Result<Option<String>, ClientError>;

    async fn save(&self, user_id: &str, client_id: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Default)]
pub struct InMemoryClientMappings {
    mappings: DashMap<String, String>,
}

impl InMemoryClientMappings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientMappingStore for InMemoryClientMappings {
    async fn load(&self, user_id: &str) -> Result<Option<String>, ClientError> {
        Ok(self.mappings.get(user_id).map(|id| id.value().clone()))
    }

    async fn save(&self, user_id: &str, client_id: &str) -> Result<(), ClientError> {
        self.mappings
            .insert(user_id.to_string(), client_id.to_string());
        Ok(())
    }
}

pub struct ClientResolver {
    directory: Arc<dyn ClientDirectory>,
    mappings: Arc<dyn ClientMappingStore>,
    // Serializes resolution so concurrent callers cannot both create a client
    resolve_lock: Mutex<()>,
}

impl ClientResolver {
    pub fn new(directory: Arc<dyn ClientDirectory>, mappings: Arc<dyn ClientMappingStore>) -> Self {
        Self {
            directory,
            mappings,
            resolve_lock: Mutex::new(()),
        }
    }

    pub async fn resolve(&self, identity: &UserIdentity) -> Result<String, ClientError> {
        let email = identity.email.trim();
        if email.is_empty() {
            return Err(ClientError::MissingEmail);
        }

        let _guard = self.resolve_lock.lock().await;

        if let Some(client_id) = self.mappings.load(&identity.id).await? {
            match self.directory.get_client(&client_id).await? {
                Some(client) => {
                    debug!(user_id = %identity.id, client_id = %client.id, "Client resolved from stored mapping");
                    return Ok(client.id);
                }
                None => {
                    warn!(user_id = %identity.id, client_id = %client_id, "Mapped client no longer exists upstream");
                }
            }
        }

        let existing = self.directory.search_clients(email).await?;
        if let Some(client) = existing.into_iter().find(|c| c.has_email(email)) {
            self.mappings.save(&identity.id, &client.id).await?;
            info!(user_id = %identity.id, client_id = %client.id, "Client found by email");
            return Ok(client.id);
        }

        let created = self
            .directory
            .create_client(NewClient::from_email(email))
            .await?;
        self.mappings.save(&identity.id, &created.id).await?;
        info!(user_id = %identity.id, client_id = %created.id, "Client created");
        Ok(created.id)
    }
}
