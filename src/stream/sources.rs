//! Source resolver
//!
//! Turns (episode, selection) into a [`StreamManifestRef`]. Failures are
//! surfaced unchanged; retry policy belongs to the orchestration layer.
//!
//! The media host checks the Referer, which a browser cannot set on a
//! cross-origin request. The referer is therefore embedded in the stream
//! proxy URL and forwarded by the proxy server-side.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::{ProxyList, SourcesPayload, UpstreamClient};
use crate::error::{Result, StreamError};
use crate::models::{EpisodeRef, ServerSelection, StreamManifestRef, SubtitleTrack};

pub struct SourceResolver {
    client: Arc<UpstreamClient>,
    stream_proxies: ProxyList,
    fallback_referer: String,
}

impl SourceResolver {
    pub fn new(
        client: Arc<UpstreamClient>,
        stream_proxies: ProxyList,
        fallback_referer: impl Into<String>,
    ) -> Self {
        Self {
            client,
            stream_proxies,
            fallback_referer: fallback_referer.into(),
        }
    }

    /// Resolve the manifest for `selection`
    pub async fn resolve(
        &self,
        episode: &EpisodeRef,
        selection: &ServerSelection,
    ) -> Result<StreamManifestRef> {
        let payload = self
            .client
            .fetch_sources(episode, &selection.server, selection.category)
            .await?;
        let manifest = self.build_manifest(episode, selection, payload)?;
        info!(
            %episode,
            %selection,
            subtitles = manifest.subtitle_tracks.len(),
            "resolved stream manifest"
        );
        Ok(manifest)
    }

    /// Assemble the manifest from a decoded payload
    pub fn build_manifest(
        &self,
        episode: &EpisodeRef,
        selection: &ServerSelection,
        payload: SourcesPayload,
    ) -> Result<StreamManifestRef> {
        let source = payload
            .sources
            .iter()
            .find(|s| s.is_hls() && !s.url.is_empty())
            .or_else(|| payload.sources.iter().find(|s| !s.url.is_empty()))
            .ok_or_else(|| StreamError::EmptySource {
                episode: episode.clone(),
                server: selection.server.clone(),
                category: selection.category,
            })?;

        let mut required_headers = payload.headers.clone();
        let referer = required_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("referer"))
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.fallback_referer.clone());
        required_headers.retain(|k, _| !k.eq_ignore_ascii_case("referer"));
        required_headers.insert("Referer".to_string(), referer.clone());

        let mut forwarded = BTreeMap::new();
        forwarded.insert("Referer".to_string(), referer);
        let playback_url = self.stream_proxies.wrap_with_headers(&source.url, &forwarded);
        debug!(manifest = %source.url, playback_url = %playback_url, "proxied manifest url");

        let subtitle_proxy = self.stream_proxies.first();
        let subtitle_tracks = payload
            .subtitles
            .iter()
            .filter(|t| !t.is_thumbnails() && !t.url.is_empty())
            .map(|t| SubtitleTrack {
                language: t.lang.clone(),
                url: t.url.clone(),
                src_lang: SubtitleTrack::src_lang_for(&t.lang),
                playback_url: ProxyList::wrap_with(subtitle_proxy, &t.url),
            })
            .collect();

        Ok(StreamManifestRef {
            episode: episode.clone(),
            selection: selection.clone(),
            manifest_url: source.url.clone(),
            playback_url,
            required_headers,
            subtitle_tracks,
            intro: payload.intro,
            outro: payload.outro,
        })
    }
}
