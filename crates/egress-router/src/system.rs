//! The platform default policy: a snapshot of the conventional proxy
//! environment variables.
//!
//! This is what occupies the process-wide slot before any proxy is set, and
//! what a clear restores.

use std::error::Error as StdError;
use std::net::IpAddr;

use http::Uri;

use crate::policy::{is_http_scheme, RoutingPolicy};
use crate::target::{ProxyTarget, RoutingDecision};

/// Proxy settings read from `HTTP_PROXY`, `HTTPS_PROXY` and `NO_PROXY`
/// (upper case first, then lower case).
#[derive(Debug, Clone, Default)]
pub struct SystemPolicy {
    http: Option<ProxyTarget>,
    https: Option<ProxyTarget>,
    no_proxy: Vec<String>,
}

impl SystemPolicy {
    pub fn from_env() -> Self {
        Self::from_vars(
            env_var("HTTP_PROXY", "http_proxy").as_deref(),
            env_var("HTTPS_PROXY", "https_proxy").as_deref(),
            env_var("NO_PROXY", "no_proxy").as_deref(),
        )
    }

    pub fn from_vars(http: Option<&str>, https: Option<&str>, no_proxy: Option<&str>) -> Self {
        let policy = Self {
            http: http.and_then(parse_proxy_var),
            https: https.and_then(parse_proxy_var),
            no_proxy: no_proxy.map(parse_no_proxy).unwrap_or_default(),
        };
        tracing::debug!(
            http = ?policy.http,
            https = ?policy.https,
            no_proxy = ?policy.no_proxy,
            "System proxy settings captured"
        );
        policy
    }

    fn bypassed(&self, host: &str) -> bool {
        let host = host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase();
        let host_ip = host.parse::<IpAddr>().ok();

        self.no_proxy.iter().any(|pattern| {
            if pattern == "*" {
                return true;
            }
            if let (Some(ip), Ok(pattern_ip)) = (host_ip, pattern.parse::<IpAddr>()) {
                return ip == pattern_ip;
            }
            let domain = pattern.trim_start_matches('.');
            host == domain || host.ends_with(&format!(".{domain}"))
        })
    }
}

impl RoutingPolicy for SystemPolicy {
    fn select(&self, uri: &Uri) -> RoutingDecision {
        if !is_http_scheme(uri) {
            return RoutingDecision::Direct;
        }
        let host = match uri.host() {
            Some(h) if !h.is_empty() => h,
            _ => return RoutingDecision::Direct,
        };
        if self.bypassed(host) {
            return RoutingDecision::Direct;
        }

        let secure = uri
            .scheme_str()
            .is_some_and(|s| s.eq_ignore_ascii_case("https"));
        let target = if secure { &self.https } else { &self.http };
        match target {
            Some(t) => RoutingDecision::ViaProxy(t.clone()),
            None => RoutingDecision::Direct,
        }
    }

    fn connect_failed(
        &self,
        uri: &Uri,
        proxy: Option<&ProxyTarget>,
        err: &(dyn StdError + 'static),
    ) -> anyhow::Result<()> {
        tracing::debug!(uri = %uri, proxy = ?proxy, error = %err, "Connection attempt failed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

fn env_var(upper: &str, lower: &str) -> Option<String> {
    std::env::var(upper)
        .or_else(|_| std::env::var(lower))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Accepts `scheme://host:port` or bare `host:port`; the port defaults to the
/// scheme's well-known port.
fn parse_proxy_var(raw: &str) -> Option<ProxyTarget> {
    let raw = raw.trim();
    let uri: Uri = if raw.contains("://") {
        raw.parse().ok()?
    } else {
        format!("http://{raw}").parse().ok()?
    };
    let host = uri.host()?.trim_start_matches('[').trim_end_matches(']');
    let default_port = match uri.scheme_str() {
        Some(s) if s.eq_ignore_ascii_case("https") => 443,
        _ => 80,
    };
    let port = uri.port_u16().unwrap_or(default_port);
    ProxyTarget::new(host, i64::from(port)).ok()
}

fn parse_no_proxy(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
