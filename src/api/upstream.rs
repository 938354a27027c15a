//! Upstream catalog/streaming API client
//!
//! Every endpoint answers with a `{data: T}` envelope. Each operation is one
//! logical call through the [`ProxyRouter`].

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

use super::proxy::ProxyRouter;
use crate::config::{Config, DEFAULT_SERVER};
use crate::error::{Result, StreamError};
use crate::models::{
    AnimeInfo, AnimePage, Category, EpisodeCount, EpisodeList, EpisodeRef, HomeData,
    ServerCatalog, ServerDescriptor, SkipRange,
};

const API_PREFIX: &str = "/api/v2/hianime";

/// `{data: T}` wrapper shared by all endpoints
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Decode a `{data: T}` body, mapping any shape mismatch to a schema error
fn decode_envelope<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str::<Envelope<T>>(body)
        .map(|e| e.data)
        .map_err(|e| StreamError::Schema(format!("{}: {}", what, e)))
}

// =============================================================================
// Response Structures
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoRaw {
    #[serde(default)]
    server_id: Option<u32>,
    server_name: String,
}

impl ServerInfoRaw {
    fn into_descriptor(self) -> ServerDescriptor {
        ServerDescriptor {
            name: self.server_name,
            numeric_id: self.server_id.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServersRaw {
    sub: Option<Vec<ServerInfoRaw>>,
    dub: Option<Vec<ServerInfoRaw>>,
    raw: Option<Vec<ServerInfoRaw>>,
}

impl ServersRaw {
    fn into_catalog(self, episode: &EpisodeRef) -> Result<ServerCatalog> {
        if self.sub.is_none() && self.dub.is_none() && self.raw.is_none() {
            return Err(StreamError::Schema(
                "episode servers: none of sub/dub/raw present".to_string(),
            ));
        }
        let convert = |list: Option<Vec<ServerInfoRaw>>| -> Vec<ServerDescriptor> {
            list.unwrap_or_default()
                .into_iter()
                .map(ServerInfoRaw::into_descriptor)
                .collect()
        };
        Ok(ServerCatalog {
            episode: episode.clone(),
            sub: convert(self.sub),
            dub: convert(self.dub),
            raw: convert(self.raw),
        })
    }
}

/// One playable source as reported upstream
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSource {
    pub url: String,
    #[serde(default, alias = "isM3U8")]
    pub is_m3u8: bool,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl MediaSource {
    pub fn is_hls(&self) -> bool {
        self.is_m3u8
            || self.kind.as_deref() == Some("hls")
            || self.url.contains(".m3u8")
    }
}

/// Subtitle/thumbnail track as reported upstream
#[derive(Debug, Clone, Deserialize)]
pub struct RawTrack {
    #[serde(default, alias = "label")]
    pub lang: String,
    #[serde(alias = "file")]
    pub url: String,
    #[serde(default)]
    pub kind: Option<String>,
}

impl RawTrack {
    pub fn is_thumbnails(&self) -> bool {
        self.kind.as_deref() == Some("thumbnails") || self.lang.eq_ignore_ascii_case("thumbnails")
    }
}

/// Decoded sources payload, guaranteed to hold at least one source
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesPayload {
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub sources: Vec<MediaSource>,
    #[serde(default, alias = "tracks")]
    pub subtitles: Vec<RawTrack>,
    #[serde(default)]
    pub intro: Option<SkipRange>,
    #[serde(default)]
    pub outro: Option<SkipRange>,
}

#[derive(Debug, Deserialize)]
struct AnimeInfoEnvelope {
    anime: AnimeInfoInner,
}

#[derive(Debug, Deserialize)]
struct AnimeInfoInner {
    info: AnimeInfoRaw,
}

#[derive(Debug, Deserialize)]
struct AnimeInfoRaw {
    id: String,
    name: String,
    #[serde(default)]
    poster: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    stats: Option<AnimeStatsRaw>,
}

#[derive(Debug, Deserialize)]
struct AnimeStatsRaw {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    episodes: EpisodeCount,
}

impl AnimeInfoRaw {
    fn into_info(self) -> AnimeInfo {
        let (kind, episodes) = match self.stats {
            Some(stats) => (stats.kind, stats.episodes),
            None => (None, EpisodeCount::default()),
        };
        AnimeInfo {
            id: self.id,
            name: self.name,
            poster: self.poster,
            description: self.description,
            kind,
            episodes,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Typed client for the upstream API
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    base_url: String,
    router: ProxyRouter,
}

impl UpstreamClient {
    /// Create a client from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let client = super::build_http_client(config)?;
        let proxies = super::proxy::ProxyList::parse(&config.api_proxies)?;
        Ok(Self::with_base_url(
            config.base_url.clone(),
            ProxyRouter::new(client, proxies),
        ))
    }

    /// Create a client with a custom base URL and router (for testing)
    pub fn with_base_url(base_url: impl Into<String>, router: ProxyRouter) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            router,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn router(&self) -> &ProxyRouter {
        &self.router
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let url = self.endpoint(path);
        let routed = self.router.route(&url).await?;
        debug!(url = %url, route = ?routed.route, bytes = routed.body.len(), "upstream response");
        decode_envelope(&routed.body, what)
    }

    /// Home page sections
    pub async fn fetch_home(&self) -> Result<HomeData> {
        self.get("/home", "home").await
    }

    /// Episode list of a title (pass `EpisodeRef::title_id()`)
    pub async fn fetch_episode_list(&self, title_id: &str) -> Result<EpisodeList> {
        let path = format!("/anime/{}/episodes", urlencoding::encode(title_id));
        self.get(&path, "episode list").await
    }

    /// Server catalog of one episode
    pub async fn fetch_servers(&self, episode: &EpisodeRef) -> Result<ServerCatalog> {
        info!(%episode, "fetching episode servers");
        let path = format!(
            "/episode/servers?animeEpisodeId={}",
            urlencoding::encode(episode.as_str())
        );
        let raw: ServersRaw = self.get(&path, "episode servers").await?;
        raw.into_catalog(episode)
    }

    /// Streaming sources for (episode, server, category)
    ///
    /// An empty server name falls back to `hd-1`. Fails with
    /// [`StreamError::EmptySource`] when upstream lists no sources.
    pub async fn fetch_sources(
        &self,
        episode: &EpisodeRef,
        server: &str,
        category: Category,
    ) -> Result<SourcesPayload> {
        let server = if server.is_empty() { DEFAULT_SERVER } else { server };
        info!(%episode, server, %category, "fetching episode sources");

        let path = format!(
            "/episode/sources?animeEpisodeId={}&server={}&category={}",
            urlencoding::encode(episode.as_str()),
            urlencoding::encode(server),
            category
        );
        let payload: SourcesPayload = self.get(&path, "episode sources").await?;

        if payload.sources.is_empty() {
            return Err(StreamError::EmptySource {
                episode: episode.clone(),
                server: server.to_string(),
                category,
            });
        }
        Ok(payload)
    }

    /// Search results page
    pub async fn fetch_search(&self, query: &str, page: u32) -> Result<AnimePage> {
        let path = format!("/search?q={}&page={}", urlencoding::encode(query), page.max(1));
        self.get(&path, "search").await
    }

    /// Category listing page (e.g. "most-popular")
    pub async fn fetch_category(&self, name: &str, page: u32) -> Result<AnimePage> {
        let path = format!("/category/{}?page={}", urlencoding::encode(name), page.max(1));
        self.get(&path, "category").await
    }

    /// Genre listing page
    pub async fn fetch_genre(&self, name: &str, page: u32) -> Result<AnimePage> {
        let path = format!("/genre/{}?page={}", urlencoding::encode(name), page.max(1));
        self.get(&path, "genre").await
    }

    /// Title details
    pub async fn fetch_anime_info(&self, title_id: &str) -> Result<AnimeInfo> {
        let path = format!("/anime/{}", urlencoding::encode(title_id));
        let raw: AnimeInfoEnvelope = self.get(&path, "anime info").await?;
        Ok(raw.anime.info.into_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_envelope_missing_data() {
        let err = decode_envelope::<EpisodeList>(r#"{"status":200}"#, "episode list").unwrap_err();
        match err {
            StreamError::Schema(msg) => {
                assert!(msg.starts_with("episode list"));
                assert!(msg.contains("data"));
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_servers_all_absent_is_schema_error() {
        let raw: ServersRaw = serde_json::from_str(r#"{"episodeId":"x","episodeNo":1}"#).unwrap();
        assert!(matches!(
            raw.into_catalog(&EpisodeRef::new("x")),
            Err(StreamError::Schema(_))
        ));
    }

    #[test]
    fn test_servers_partial_lists() {
        let raw: ServersRaw = serde_json::from_str(
            r#"{"sub":[{"serverId":4,"serverName":"hd-1"}],"dub":[]}"#,
        )
        .unwrap();
        let catalog = raw.into_catalog(&EpisodeRef::new("x?ep=1")).unwrap();
        assert_eq!(catalog.sub[0].name, "hd-1");
        assert_eq!(catalog.sub[0].numeric_id, 4);
        assert!(catalog.dub.is_empty());
        assert!(catalog.raw.is_empty());
    }

    #[test]
    fn test_sources_payload_aliases() {
        let payload: SourcesPayload = serde_json::from_str(
            r#"{
                "sources": [{"url": "https://h/master.m3u8", "type": "hls"}],
                "tracks": [
                    {"file": "https://h/en.vtt", "label": "English", "kind": "captions"},
                    {"file": "https://h/thumbs.vtt", "kind": "thumbnails"}
                ],
                "intro": {"start": 31, "end": 110}
            }"#,
        )
        .unwrap();
        assert!(payload.sources[0].is_hls());
        assert_eq!(payload.subtitles.len(), 2);
        assert_eq!(payload.subtitles[0].lang, "English");
        assert!(payload.subtitles[1].is_thumbnails());
        assert_eq!(payload.intro.unwrap().end, 110.0);
        assert!(payload.headers.is_empty());
    }
}
