//! reqwest integration: clients that either bypass every proxy or consult the
//! installed policy for each request.

use reqwest::{Client, ClientBuilder, Proxy, Request, Response};

use crate::lifecycle::ProxyController;
use crate::target::RoutingDecision;

/// `User-Agent` sent by every client built here.
pub const USER_AGENT: &str = concat!("egress-router/", env!("CARGO_PKG_VERSION"));

/// Settings shared by the direct and routed clients.
pub fn base_builder() -> ClientBuilder {
    Client::builder().user_agent(USER_AGENT)
}

/// Builder for a client that always connects directly, ignoring both the
/// installed policy and the proxy environment.
pub fn direct_client_builder() -> ClientBuilder {
    base_builder().no_proxy()
}

/// Builder for a client whose every request is routed by `controller`.
pub fn routed_client_builder(controller: &'static ProxyController) -> ClientBuilder {
    let proxy = Proxy::custom(move |url| match controller.decide(url.as_str()) {
        RoutingDecision::Direct => None,
        RoutingDecision::ViaProxy(target) => Some(target.proxy_url()),
    });
    base_builder().proxy(proxy)
}

/// A routed client that reports connection failures back to the policy.
#[derive(Clone)]
pub struct RoutedClient {
    client: Client,
    controller: &'static ProxyController,
}

impl RoutedClient {
    pub fn new(controller: &'static ProxyController) -> reqwest::Result<Self> {
        Ok(Self {
            client: routed_client_builder(controller).build()?,
            controller,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Execute `request`. Connect errors are reported to the installed
    /// policy, together with the upstream chosen when the request started.
    pub async fn send(&self, request: Request) -> reqwest::Result<Response> {
        let url = request.url().to_string();
        let decision = self.controller.peek(&url);
        match self.client.execute(request).await {
            Err(e) if e.is_connect() => {
                tracing::debug!(url = %url, decision = ?decision, error = %e, "Connection failed");
                self.controller.report_connect_failure(&url, decision.target(), &e);
                Err(e)
            }
            other => other,
        }
    }
}
