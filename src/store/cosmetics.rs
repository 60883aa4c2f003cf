//! Cosmetic/identity lookup. Attributes are opaque to the simulation.

use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::config::Config;

use super::client::RestClient;

pub trait CosmeticResolver: Send + Sync {
    /// Attributes for an agent, given what the agent asked for at join time
    fn resolve<'a>(&'a self, agent_id: Uuid, requested: Option<Value>) -> BoxFuture<'a, Option<Value>>;
}

/// Uses the agent-supplied value as-is
pub struct PassthroughCosmetics;

impl CosmeticResolver for PassthroughCosmetics {
    fn resolve<'a>(&'a self, _agent_id: Uuid, requested: Option<Value>) -> BoxFuture<'a, Option<Value>> {
        Box::pin(async move { requested })
    }
}

/// Looks the agent up at `GET agents/{id}`; lookup failures fall back to the request
pub struct RestCosmetics {
    client: RestClient,
}

impl RestCosmetics {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

impl CosmeticResolver for RestCosmetics {
    fn resolve<'a>(&'a self, agent_id: Uuid, requested: Option<Value>) -> BoxFuture<'a, Option<Value>> {
        Box::pin(async move {
            match self.client.get_json::<Value>(&format!("agents/{}", agent_id)).await {
                Ok(Some(found)) => Some(found),
                Ok(None) => requested,
                Err(e) => {
                    warn!(agent_id = %agent_id, error = %e, "Cosmetic lookup failed");
                    requested
                }
            }
        })
    }
}

pub fn cosmetic_resolver(config: &Config) -> Arc<dyn CosmeticResolver> {
    match &config.cosmetics_url {
        Some(url) => Arc::new(RestCosmetics::new(RestClient::new(url, None))),
        None => Arc::new(PassthroughCosmetics),
    }
}
