//! Routing policies: the upstream-proxy engine and its bypass rules.
//!
//! A policy is consulted inline on whichever thread is opening a connection.
//! `select` must not block, perform I/O, or fail.

use std::error::Error as StdError;
use std::sync::Arc;

use http::Uri;
use uuid::Uuid;

use crate::target::{ProxyTarget, RoutingDecision};

/// A process-wide connection routing policy.
pub trait RoutingPolicy: Send + Sync {
    /// Decide how a request to `uri` should connect.
    fn select(&self, uri: &Uri) -> RoutingDecision;

    /// Notification that a connection attempt made according to this policy's
    /// decision failed. `proxy` is the upstream that was tried, if any.
    fn connect_failed(
        &self,
        _uri: &Uri,
        _proxy: Option<&ProxyTarget>,
        _err: &(dyn StdError + 'static),
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Short label used in logs and status reports.
    fn name(&self) -> &'static str;

    /// The upstream this policy routes through, when it has a single one.
    fn upstream(&self) -> Option<&ProxyTarget> {
        None
    }

    /// Identifies one installation of a policy in logs and status reports.
    fn installation_id(&self) -> Option<Uuid> {
        None
    }
}

/// Parse `raw` and consult `policy`. Blank or unparseable input is `Direct`.
pub fn decide_with(policy: &dyn RoutingPolicy, raw: &str) -> RoutingDecision {
    let raw = raw.trim();
    if raw.is_empty() {
        return RoutingDecision::Direct;
    }
    match raw.parse::<Uri>() {
        Ok(uri) => policy.select(&uri),
        Err(e) => {
            tracing::trace!(error = %e, "Unparseable URI, connecting directly");
            RoutingDecision::Direct
        }
    }
}

/// Always connects directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectPolicy;

impl RoutingPolicy for DirectPolicy {
    fn select(&self, _uri: &Uri) -> RoutingDecision {
        RoutingDecision::Direct
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Routes HTTP(S) traffic through one upstream proxy, bypassing loopback and
/// private IPv4 destinations.
///
/// Failure notifications are forwarded to the policy that was installed
/// before this one, if any.
pub struct UpstreamPolicy {
    target: ProxyTarget,
    fallback: Option<Arc<dyn RoutingPolicy>>,
    installation_id: Uuid,
}

impl UpstreamPolicy {
    pub fn new(target: ProxyTarget, fallback: Option<Arc<dyn RoutingPolicy>>) -> Self {
        Self {
            target,
            fallback,
            installation_id: Uuid::new_v4(),
        }
    }

    pub fn target(&self) -> &ProxyTarget {
        &self.target
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

impl RoutingPolicy for UpstreamPolicy {
    fn select(&self, uri: &Uri) -> RoutingDecision {
        if !is_http_scheme(uri) {
            return RoutingDecision::Direct;
        }

        let host = uri.host().map(str::trim).unwrap_or("");
        if host.is_empty() || is_local_host(host) {
            return RoutingDecision::Direct;
        }

        if let Some(octets) = parse_ipv4_literal(host) {
            if is_private_ipv4(octets) {
                return RoutingDecision::Direct;
            }
        }

        RoutingDecision::ViaProxy(self.target.clone())
    }

    fn connect_failed(
        &self,
        uri: &Uri,
        proxy: Option<&ProxyTarget>,
        err: &(dyn StdError + 'static),
    ) -> anyhow::Result<()> {
        let Some(fallback) = &self.fallback else {
            return Ok(());
        };
        if let Err(e) = fallback.connect_failed(uri, proxy, err) {
            tracing::debug!(
                error = %e,
                fallback = fallback.name(),
                installation_id = %self.installation_id,
                "Previous policy failed to handle connect failure, ignoring"
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "upstream"
    }

    fn upstream(&self) -> Option<&ProxyTarget> {
        Some(&self.target)
    }

    fn installation_id(&self) -> Option<Uuid> {
        Some(self.installation_id)
    }
}

pub(crate) fn is_http_scheme(uri: &Uri) -> bool {
    uri.scheme_str()
        .is_some_and(|s| s.eq_ignore_ascii_case("http") || s.eq_ignore_ascii_case("https"))
}

fn is_local_host(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1"
}

/// Parse a dotted-quad IPv4 literal: exactly four dot-separated groups of
/// ASCII digits, each 0-255. Any other shape yields `None`.
pub fn parse_ipv4_literal(host: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut parts = host.split('.');
    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: u32 = part.parse().ok()?;
        *octet = u8::try_from(value).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(octets)
}

/// Loopback, RFC 1918 and link-local IPv4 ranges.
pub fn is_private_ipv4(octets: [u8; 4]) -> bool {
    match octets {
        [10, ..] | [127, ..] => true,
        [169, 254, ..] | [192, 168, ..] => true,
        [172, b, ..] => (16..=31).contains(&b),
        _ => false,
    }
}
