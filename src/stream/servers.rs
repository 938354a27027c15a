//! Server resolver
//!
//! Fetches the server catalog of an episode and picks the default
//! (category, server) pair: sub, then dub, then raw.

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::UpstreamClient;
use crate::error::{Result, StreamError};
use crate::models::{EpisodeRef, ServerCatalog, ServerSelection};

/// Default selection for a catalog
///
/// The category is the first non-empty one in sub → dub → raw order. The
/// server is `preferred` when that category offers it, otherwise the first
/// server listed.
pub fn default_selection(
    catalog: &ServerCatalog,
    preferred: Option<&str>,
) -> Result<ServerSelection> {
    let category = catalog
        .first_available()
        .ok_or_else(|| StreamError::NoServersAvailable(catalog.episode.clone()))?;

    let servers = catalog.servers(category);
    let server = preferred
        .and_then(|p| servers.iter().find(|s| s.name == p))
        .or_else(|| servers.first())
        .map(|s| s.name.clone())
        .ok_or_else(|| StreamError::NoServersAvailable(catalog.episode.clone()))?;

    Ok(ServerSelection::new(category, server))
}

pub struct ServerResolver {
    client: Arc<UpstreamClient>,
}

impl ServerResolver {
    pub fn new(client: Arc<UpstreamClient>) -> Self {
        Self { client }
    }

    /// Fetch the server catalog, no extra policy
    pub async fn resolve(&self, episode: &EpisodeRef) -> Result<ServerCatalog> {
        self.client.fetch_servers(episode).await
    }

    /// Fetch the catalog and pick its default selection
    pub async fn resolve_with_default(
        &self,
        episode: &EpisodeRef,
        preferred: Option<&str>,
    ) -> Result<(ServerCatalog, ServerSelection)> {
        let catalog = self.resolve(episode).await?;
        match default_selection(&catalog, preferred) {
            Ok(selection) => {
                info!(%episode, %selection, "default server selected");
                Ok((catalog, selection))
            }
            Err(e) => {
                warn!(%episode, "episode has no servers");
                Err(e)
            }
        }
    }
}
