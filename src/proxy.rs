use reqwest::{Client, Proxy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::error::{McpError, McpResult};

/// Forward-proxy settings, read once at startup from the conventional
/// `HTTP(S)_PROXY` / `NO_PROXY` variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProxyConfig {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    #[serde(default)]
    pub no_proxy: Vec<String>,
}

/// Which client an outbound call goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Proxy,
}

impl ProxyConfig {
    /// Build from an arbitrary variable lookup. Upper-case names win over
    /// lower-case ones; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |upper: &str, lower: &str| {
            lookup(upper)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| lookup(lower).filter(|v| !v.trim().is_empty()))
                .map(|v| v.trim().to_string())
        };

        let no_proxy = read("NO_PROXY", "no_proxy")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            http_proxy: read("HTTP_PROXY", "http_proxy"),
            https_proxy: read("HTTPS_PROXY", "https_proxy"),
            no_proxy,
        }
    }

    /// The proxy to use, preferring the HTTPS-specific setting.
    pub fn proxy_url(&self) -> Option<&str> {
        self.https_proxy.as_deref().or(self.http_proxy.as_deref())
    }

    pub fn bypasses(&self, host: &str) -> bool {
        self.no_proxy.iter().any(|pattern| matches_no_proxy(host, pattern))
    }

    pub fn route_for(&self, host: &str) -> Route {
        if self.proxy_url().is_none() || self.bypasses(host) {
            Route::Direct
        } else {
            Route::Proxy
        }
    }
}

/// `.example.com` matches `example.com` and any subdomain of it; anything
/// else must equal the host exactly.
pub fn matches_no_proxy(host: &str, pattern: &str) -> bool {
    match pattern.strip_prefix('.') {
        Some(bare) => host.ends_with(pattern) || host == bare,
        None => host == pattern,
    }
}

enum ProxiedClient {
    Ready(Client),
    Misconfigured(String),
}

/// Pre-built HTTP clients for both routes. A bad proxy URL does not stop
/// startup; it surfaces on each call that would have used the proxy.
pub struct HttpClients {
    direct: Client,
    proxied: Option<ProxiedClient>,
    proxy: ProxyConfig,
}

impl HttpClients {
    pub fn new(proxy: ProxyConfig, connection: &ConnectionConfig) -> anyhow::Result<Self> {
        let direct = Self::builder(connection).no_proxy().build()?;

        let proxied = proxy.proxy_url().map(|url| {
            match Proxy::all(url).and_then(|p| Self::builder(connection).proxy(p).build()) {
                Ok(client) => {
                    debug!(proxy = %url, "Configured outbound proxy");
                    ProxiedClient::Ready(client)
                }
                Err(e) => {
                    warn!("Proxy '{}' is unusable, calls routed through it will fail: {}", url, e);
                    ProxiedClient::Misconfigured(format!("invalid proxy '{}': {}", url, e))
                }
            }
        });

        Ok(Self {
            direct,
            proxied,
            proxy,
        })
    }

    fn builder(connection: &ConnectionConfig) -> reqwest::ClientBuilder {
        Client::builder()
            .timeout(Duration::from_secs(connection.timeout_seconds))
            .pool_max_idle_per_host(connection.max_idle_per_host as usize)
            .pool_idle_timeout(Duration::from_secs(connection.pool_idle_timeout_seconds))
    }

    /// Pick the client for `host`, re-evaluating the bypass list every call.
    pub fn client_for(&self, host: &str) -> McpResult<&Client> {
        match (self.proxy.route_for(host), &self.proxied) {
            (Route::Proxy, Some(ProxiedClient::Ready(client))) => {
                debug!(host, "Routing through proxy");
                Ok(client)
            }
            (Route::Proxy, Some(ProxiedClient::Misconfigured(reason))) => {
                Err(McpError::RequestSetup(reason.clone()))
            }
            _ => Ok(&self.direct),
        }
    }

    pub fn is_proxied(&self, host: &str) -> bool {
        matches!(
            (self.proxy.route_for(host), &self.proxied),
            (Route::Proxy, Some(ProxiedClient::Ready(_)))
        )
    }
}
