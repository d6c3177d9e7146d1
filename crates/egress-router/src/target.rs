//! Upstream proxy endpoint and per-request routing decisions.

use std::fmt;

use serde::Serialize;

use crate::error::{Result, RouteError};

/// One upstream HTTP proxy endpoint. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProxyTarget {
    host: String,
    port: u16,
}

impl ProxyTarget {
    /// Validate and build a target. The host is trimmed; a blank host or a
    /// port outside `1..=65535` is rejected.
    pub fn new(host: &str, port: i64) -> Result<Self> {
        let trimmed = host.trim();
        if trimmed.is_empty() {
            return Err(RouteError::InvalidTarget {
                host: host.to_string(),
                port,
                reason: "host is blank",
            });
        }
        let port = match u16::try_from(port) {
            Ok(p) if p != 0 => p,
            _ => {
                return Err(RouteError::InvalidTarget {
                    host: host.to_string(),
                    port,
                    reason: "port must be within 1..=65535",
                })
            }
        };
        Ok(Self {
            host: trimmed.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// URL form understood by HTTP clients (`http://host:port`).
    pub fn proxy_url(&self) -> String {
        format!("http://{}", self.authority())
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

/// Outcome of consulting a policy for one request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum RoutingDecision {
    Direct,
    #[serde(rename = "proxy")]
    ViaProxy(ProxyTarget),
}

impl RoutingDecision {
    pub fn is_direct(&self) -> bool {
        matches!(self, RoutingDecision::Direct)
    }

    pub fn target(&self) -> Option<&ProxyTarget> {
        match self {
            RoutingDecision::Direct => None,
            RoutingDecision::ViaProxy(target) => Some(target),
        }
    }
}
