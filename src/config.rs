//! Configuration management
//!
//! Handles config file loading/saving and environment overrides.
//! Config is stored at ~/.config/animestream/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upstream API root
pub const DEFAULT_BASE_URL: &str = "https://hianime-up.vercel.app";

/// API proxies answering with a `{contents: "..."}` envelope
pub const DEFAULT_API_PROXIES: &str = "https://api.allorigins.win/get?url=";

/// Manifest proxies that forward a `headers` query parameter server-side
pub const DEFAULT_STREAM_PROXIES: &str = "https://newproxy-chi.vercel.app/m3u8-proxy?url=";

/// Referer the media host accepts when upstream omits one
pub const DEFAULT_FALLBACK_REFERER: &str = "https://megacloud.club/";

pub const DEFAULT_SERVER: &str = "hd-1";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// What to do when playback gives up on a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailoverPolicy {
    /// Surface the failure and wait for the user to pick a server
    #[default]
    Manual,
    /// Switch to the next untried server without asking
    Automatic,
}

impl FailoverPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Some(FailoverPolicy::Manual),
            "automatic" | "auto" => Some(FailoverPolicy::Automatic),
            _ => None,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream API base URL
    pub base_url: String,
    /// Origin sent as Referer/Origin on upstream calls
    pub site_origin: String,
    pub user_agent: String,
    /// Comma-delimited API proxy templates
    pub api_proxies: String,
    /// Comma-delimited manifest proxy templates
    pub stream_proxies: String,
    pub fallback_referer: String,
    /// Server used when upstream is asked without one
    pub default_server: String,
    pub request_timeout_secs: u64,
    /// Delay before a full HLS rebuild
    pub rebuild_delay_ms: u64,
    /// Full rebuilds allowed per manifest before giving up
    pub max_rebuilds: u32,
    /// Maximum "continue watching" records
    pub resume_capacity: usize,
    pub failover: FailoverPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            site_origin: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            api_proxies: DEFAULT_API_PROXIES.to_string(),
            stream_proxies: DEFAULT_STREAM_PROXIES.to_string(),
            fallback_referer: DEFAULT_FALLBACK_REFERER.to_string(),
            default_server: DEFAULT_SERVER.to_string(),
            request_timeout_secs: 30,
            rebuild_delay_ms: 1000,
            max_rebuilds: 3,
            resume_capacity: 20,
            failover: FailoverPolicy::Manual,
        }
    }
}

impl Config {
    /// Get config file path (~/.config/animestream/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("animestream").join("config.toml"))
    }

    /// Load config from file, or default if not found, then apply env overrides
    pub fn load() -> Self {
        let mut config: Config = Self::path()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| match toml::from_str(&s) {
                Ok(c) => Some(c),
                Err(e) => {
                    tracing::warn!("ignoring malformed config file: {}", e);
                    None
                }
            })
            .unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(&path, toml).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Environment variables take precedence over the config file:
    /// `ANIMESTREAM_BASE_URL`, `ANIMESTREAM_API_PROXIES`,
    /// `ANIMESTREAM_STREAM_PROXIES`, `ANIMESTREAM_FAILOVER`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ANIMESTREAM_BASE_URL") {
            self.base_url = url;
        }
        if let Some(list) = lookup("ANIMESTREAM_API_PROXIES") {
            self.api_proxies = list;
        }
        if let Some(list) = lookup("ANIMESTREAM_STREAM_PROXIES") {
            self.stream_proxies = list;
        }
        if let Some(policy) = lookup("ANIMESTREAM_FAILOVER") {
            match FailoverPolicy::parse(&policy) {
                Some(p) => self.failover = p,
                None => tracing::warn!("unknown ANIMESTREAM_FAILOVER value {:?}", policy),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rebuild_delay(&self) -> Duration {
        Duration::from_millis(self.rebuild_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.default_server, "hd-1");
        assert_eq!(config.max_rebuilds, 3);
        assert_eq!(config.resume_capacity, 20);
        assert_eq!(config.rebuild_delay(), Duration::from_secs(1));
        assert_eq!(config.failover, FailoverPolicy::Manual);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ANIMESTREAM_BASE_URL", "http://localhost:4000"),
            ("ANIMESTREAM_STREAM_PROXIES", "http://a/?url=,http://b/?url="),
            ("ANIMESTREAM_FAILOVER", "auto"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.base_url, "http://localhost:4000");
        assert_eq!(config.stream_proxies, "http://a/?url=,http://b/?url=");
        assert_eq!(config.api_proxies, DEFAULT_API_PROXIES);
        assert_eq!(config.failover, FailoverPolicy::Automatic);
    }

    #[test]
    fn test_unknown_failover_keeps_current() {
        let mut config = Config::default();
        config.apply_env(|k| (k == "ANIMESTREAM_FAILOVER").then(|| "sometimes".to_string()));
        assert_eq!(config.failover, FailoverPolicy::Manual);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("max_rebuilds = 5\nfailover = \"automatic\"").unwrap();
        assert_eq!(config.max_rebuilds, 5);
        assert_eq!(config.failover, FailoverPolicy::Automatic);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }
}
