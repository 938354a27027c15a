//! Upstream access
//!
//! - Proxy: direct-then-proxy routing, envelope unwrapping, proxy URL building
//! - Upstream: typed endpoint calls over the `{data: T}` envelope

pub mod proxy;
pub mod upstream;

pub use proxy::{ProxyList, ProxyRouter, Route, RoutedBody};
pub use upstream::{MediaSource, RawTrack, SourcesPayload, UpstreamClient};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, REFERER, USER_AGENT};

use crate::config::Config;
use crate::error::{Result, StreamError};

/// Browser-like HTTP client shared by all upstream calls
pub fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    let origin = config.site_origin.trim_end_matches('/');
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, header_value(&config.user_agent)?);
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(REFERER, header_value(&format!("{}/", origin))?);
    headers.insert(ORIGIN, header_value(origin)?);

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| StreamError::Config(format!("failed to build HTTP client: {}", e)))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| StreamError::Config(format!("invalid header value {:?}", value)))
}
