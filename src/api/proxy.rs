//! Proxy router
//!
//! Every upstream call goes direct first. When that attempt breaks at the
//! network level or returns a transient status, the same request is retried
//! exactly once through a CORS-bypass proxy picked at random from the
//! configured list. Proxies answering with a `{contents: "..."}` envelope
//! are unwrapped before the body is handed back.

use rand::seq::SliceRandom;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{Result, StreamError};

/// Non-empty list of proxy URL templates
///
/// Each template takes the percent-encoded target URL as a suffix,
/// e.g. `https://proxy.example/get?url=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyList {
    templates: Vec<String>,
}

impl ProxyList {
    /// Build from templates; blank entries are dropped
    pub fn new<I, S>(templates: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let templates: Vec<String> = templates
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if templates.is_empty() {
            return Err(StreamError::Config(
                "proxy list must contain at least one URL".to_string(),
            ));
        }
        Ok(Self { templates })
    }

    /// Parse a comma-delimited list
    pub fn parse(list: &str) -> Result<Self> {
        Self::new(list.split(','))
    }

    pub fn templates(&self) -> &[String] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Uniformly random template, no affinity
    pub fn choose(&self) -> &str {
        self.templates
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(&self.templates[0])
    }

    pub fn first(&self) -> &str {
        &self.templates[0]
    }

    /// `template + percent-encoded url`
    pub fn wrap_with(template: &str, url: &str) -> String {
        format!("{}{}", template, urlencoding::encode(url))
    }

    /// Wrap `url` through a random template
    pub fn wrap(&self, url: &str) -> String {
        Self::wrap_with(self.choose(), url)
    }

    /// Wrap `url` and append the headers the proxy must forward server-side
    pub fn wrap_with_headers(&self, url: &str, headers: &BTreeMap<String, String>) -> String {
        Self::wrap_with_headers_using(self.choose(), url, headers)
    }

    pub fn wrap_with_headers_using(
        template: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> String {
        let base = Self::wrap_with(template, url);
        if headers.is_empty() {
            return base;
        }
        // A BTreeMap of strings always serializes
        let json = serde_json::to_string(headers).unwrap_or_else(|_| "{}".to_string());
        format!("{}&headers={}", base, urlencoding::encode(&json))
    }
}

/// Which path produced a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Direct,
    /// Proxied through the given template
    Proxy(String),
}

/// Response body plus the route that produced it
#[derive(Debug, Clone)]
pub struct RoutedBody {
    pub body: String,
    pub route: Route,
}

/// Why a single attempt failed
#[derive(Debug)]
enum AttemptError {
    Network(String),
    Status(StatusCode),
}

impl AttemptError {
    fn is_transient(&self) -> bool {
        match self {
            AttemptError::Network(_) => true,
            AttemptError::Status(status) => is_transient_status(*status),
        }
    }
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Network(reason) => write!(f, "{}", reason),
            AttemptError::Status(status) => write!(f, "HTTP {}", status),
        }
    }
}

/// Statuses worth one proxied retry: blocked origin, timeouts, rate limits, 5xx
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::FORBIDDEN
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Unwrap a `{contents: "<json>"}` proxy envelope, or return the body as-is
pub fn unwrap_envelope(body: String) -> String {
    let parsed: serde_json::Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(_) => return body,
    };

    match parsed.get("contents") {
        Some(serde_json::Value::String(inner)) => inner.clone(),
        Some(inner @ serde_json::Value::Object(_)) => inner.to_string(),
        _ => body,
    }
}

/// Direct-then-proxy request router
#[derive(Debug, Clone)]
pub struct ProxyRouter {
    client: reqwest::Client,
    proxies: ProxyList,
}

impl ProxyRouter {
    pub fn new(client: reqwest::Client, proxies: ProxyList) -> Self {
        Self { client, proxies }
    }

    pub fn proxies(&self) -> &ProxyList {
        &self.proxies
    }

    /// GET `url` directly, falling back to one proxied attempt
    pub async fn route(&self, url: &str) -> Result<RoutedBody> {
        debug!(url, "direct request");
        let direct_err = match self.attempt(url).await {
            Ok(body) => {
                return Ok(RoutedBody {
                    body,
                    route: Route::Direct,
                })
            }
            Err(e) if e.is_transient() => e,
            Err(e) => {
                debug!(url, error = %e, "direct request failed, not retrying");
                return Err(StreamError::transport(url, e));
            }
        };

        let template = self.proxies.choose().to_string();
        let proxied = ProxyList::wrap_with(&template, url);
        warn!(url, error = %direct_err, proxy = %template, "direct request failed, retrying through proxy");

        match self.attempt(&proxied).await {
            Ok(body) => Ok(RoutedBody {
                body: unwrap_envelope(body),
                route: Route::Proxy(template),
            }),
            Err(proxy_err) => {
                warn!(url, error = %proxy_err, "proxied request failed");
                Err(StreamError::transport(
                    url,
                    format!("direct: {}; proxy: {}", direct_err, proxy_err),
                ))
            }
        }
    }

    async fn attempt(&self, url: &str) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status));
        }

        response
            .text()
            .await
            .map_err(|e| AttemptError::Network(format!("Failed to read response body: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comma_list() {
        let list = ProxyList::parse("https://a/?url=, ,https://b/?url=").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.templates()[1], "https://b/?url=");
        assert_eq!(list.first(), "https://a/?url=");
    }

    #[test]
    fn test_empty_list_is_config_error() {
        assert!(matches!(
            ProxyList::parse(" , "),
            Err(StreamError::Config(_))
        ));
    }

    #[test]
    fn test_choose_stays_in_list() {
        let list = ProxyList::parse("https://a/?url=,https://b/?url=,https://c/?url=").unwrap();
        for _ in 0..50 {
            assert!(list.templates().iter().any(|t| t == list.choose()));
        }
    }

    #[test]
    fn test_wrap_percent_encodes_target() {
        let wrapped = ProxyList::wrap_with("https://p/get?url=", "https://h/x.m3u8?a=1&b=2");
        assert_eq!(
            wrapped,
            "https://p/get?url=https%3A%2F%2Fh%2Fx.m3u8%3Fa%3D1%26b%3D2"
        );
    }

    #[test]
    fn test_wrap_with_headers_embeds_json() {
        let mut headers = BTreeMap::new();
        headers.insert("Referer".to_string(), "https://megacloud.club/".to_string());
        let wrapped =
            ProxyList::wrap_with_headers_using("https://p/m3u8-proxy?url=", "https://h/m.m3u8", &headers);
        assert!(wrapped.starts_with("https://p/m3u8-proxy?url=https%3A%2F%2Fh%2Fm.m3u8&headers="));
        let encoded = wrapped.split("&headers=").nth(1).unwrap();
        let decoded = urlencoding::decode(encoded).unwrap();
        assert_eq!(decoded, r#"{"Referer":"https://megacloud.club/"}"#);
    }

    #[test]
    fn test_wrap_without_headers_has_no_param() {
        let wrapped = ProxyList::wrap_with_headers_using("https://p/?url=", "u", &BTreeMap::new());
        assert_eq!(wrapped, "https://p/?url=u");
    }

    #[test]
    fn test_unwrap_envelope_string_contents() {
        let body = r#"{"contents":"{\"data\":{\"ok\":true}}","status":{"http_code":200}}"#;
        assert_eq!(unwrap_envelope(body.to_string()), r#"{"data":{"ok":true}}"#);
    }

    #[test]
    fn test_unwrap_envelope_passthrough() {
        let body = r#"{"data":{"ok":true}}"#.to_string();
        assert_eq!(unwrap_envelope(body.clone()), body);
        assert_eq!(unwrap_envelope("not json".to_string()), "not json");
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::FORBIDDEN));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
    }
}
