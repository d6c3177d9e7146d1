//! Process-wide outbound routing policy.
//!
//! Decides, per request URI, whether to connect directly or through a single
//! upstream HTTP proxy, keeping loopback and private-network traffic direct.
//! The active policy lives in a process-wide slot; [`set_proxy`] installs the
//! upstream policy and [`clear_proxy`] restores whatever was there before the
//! first install.

pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod policy;
pub mod server;
pub mod slot;
pub mod stats;
pub mod system;
pub mod target;

use std::sync::LazyLock;

pub use error::{Result, RouteError};
pub use lifecycle::{ProxyController, ProxyStatus};
pub use policy::{DirectPolicy, RoutingPolicy, UpstreamPolicy};
pub use slot::{AtomicPolicySlot, PolicySlot};
pub use system::SystemPolicy;
pub use target::{ProxyTarget, RoutingDecision};

static CONTROLLER: LazyLock<ProxyController> =
    LazyLock::new(|| ProxyController::new(slot::global()));

/// The controller bound to the process-wide slot.
pub fn controller() -> &'static ProxyController {
    &CONTROLLER
}

/// Route HTTP(S) traffic process-wide through `host:port`. Invalid input
/// clears the proxy instead.
pub fn set_proxy(host: &str, port: i64) -> Result<bool> {
    controller().set_proxy(host, port)
}

/// Restore the process-wide policy that preceded the first [`set_proxy`].
pub fn clear_proxy() -> Result<bool> {
    controller().clear_proxy()
}

/// Routing decision for `uri` under the process-wide policy.
pub fn decide(uri: &str) -> RoutingDecision {
    controller().decide(uri)
}
