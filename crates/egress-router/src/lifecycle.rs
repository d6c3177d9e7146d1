//! Selector lifecycle: install and remove the upstream policy in a slot,
//! restoring whatever was there before the first install.

use std::error::Error as StdError;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use http::Uri;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::policy::{decide_with, RoutingPolicy, UpstreamPolicy};
use crate::slot::PolicySlot;
use crate::stats::RouteStats;
use crate::target::{ProxyTarget, RoutingDecision};

/// Owns the set/clear lifecycle for one policy slot.
///
/// The policy found in the slot on the first successful `set_proxy` is
/// captured once and never replaced; every later clear restores it.
pub struct ProxyController {
    slot: Arc<dyn PolicySlot>,
    previous: OnceLock<Arc<dyn RoutingPolicy>>,
    // Serializes set/clear. Never taken on the decision path.
    control: Mutex<()>,
    stats: RouteStats,
}

/// What the slot currently holds, as seen by the control API.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatus {
    pub active: bool,
    pub policy: &'static str,
    pub target: Option<ProxyTarget>,
    pub installation_id: Option<Uuid>,
    pub previous_captured: bool,
}

impl ProxyController {
    pub fn new(slot: Arc<dyn PolicySlot>) -> Self {
        Self {
            slot,
            previous: OnceLock::new(),
            control: Mutex::new(()),
            stats: RouteStats::new(),
        }
    }

    /// Route through `host:port`. A blank host or a port outside
    /// `1..=65535` is treated as [`clear_proxy`](Self::clear_proxy).
    ///
    /// Returns `Ok(true)` for every valid call; `Err` only when the slot
    /// refuses the install.
    pub fn set_proxy(&self, host: &str, port: i64) -> Result<bool> {
        let target = match ProxyTarget::new(host, port) {
            Ok(target) => target,
            Err(e) => {
                tracing::info!(reason = %e, "Invalid proxy target, clearing proxy instead");
                return self.clear_proxy();
            }
        };

        let span = egress_tracing::proxy_command_span!("set", target.host(), target.port());
        let _enter = span.enter();
        let _guard = self.lock();

        let previous = Arc::clone(self.previous.get_or_init(|| {
            let current = self.slot.current();
            tracing::debug!(policy = current.name(), "Captured previous policy");
            current
        }));

        let policy = UpstreamPolicy::new(target.clone(), Some(previous));
        let installation_id = policy.installation_id();
        if let Err(e) = self.slot.install(Arc::new(policy)) {
            span.record("outcome", "failed");
            tracing::warn!(error = %e, upstream = %target, "Failed to install upstream proxy policy");
            return Err(e);
        }

        span.record("outcome", "installed");
        if let Some(id) = installation_id {
            span.record("installation_id", tracing::field::display(id));
        }
        self.stats.inc_sets();
        tracing::info!(upstream = %target, "Upstream proxy policy installed");
        Ok(true)
    }

    /// Restore the captured previous policy. A no-op when nothing was ever
    /// captured; safe to call repeatedly.
    pub fn clear_proxy(&self) -> Result<bool> {
        let span = egress_tracing::proxy_command_span!("clear");
        let _enter = span.enter();
        let _guard = self.lock();
        self.stats.inc_clears();

        let Some(previous) = self.previous.get() else {
            span.record("outcome", "noop");
            tracing::debug!("No previous policy captured, nothing to clear");
            return Ok(true);
        };

        if let Err(e) = self.slot.install(Arc::clone(previous)) {
            span.record("outcome", "failed");
            tracing::warn!(error = %e, "Failed to restore previous policy");
            return Err(e);
        }

        span.record("outcome", "restored");
        tracing::info!(policy = previous.name(), "Previous policy restored");
        Ok(true)
    }

    /// Routing decision for `raw` under the currently installed policy.
    pub fn decide(&self, raw: &str) -> RoutingDecision {
        let policy = self.slot.current();
        let decision = decide_with(policy.as_ref(), raw);
        self.stats.record_decision(&decision);
        tracing::trace!(uri = raw, policy = policy.name(), decision = ?decision, "Route decided");
        decision
    }

    /// Like [`decide`](Self::decide) but without touching the counters.
    pub fn peek(&self, raw: &str) -> RoutingDecision {
        decide_with(self.slot.current().as_ref(), raw)
    }

    /// Tell the installed policy that a connection made on its decision
    /// failed. Errors raised by the policy are dropped.
    pub fn report_connect_failure(
        &self,
        raw: &str,
        proxy: Option<&ProxyTarget>,
        err: &(dyn StdError + 'static),
    ) {
        self.stats.inc_connect_failures();
        let Ok(uri) = raw.parse::<Uri>() else {
            return;
        };
        let policy = self.slot.current();
        if let Err(e) = policy.connect_failed(&uri, proxy, err) {
            tracing::debug!(error = %e, policy = policy.name(), "Connect-failure hook failed, ignoring");
        }
    }

    pub fn status(&self) -> ProxyStatus {
        let policy = self.slot.current();
        let target = policy.upstream().cloned();
        ProxyStatus {
            active: target.is_some(),
            policy: policy.name(),
            target,
            installation_id: policy.installation_id(),
            previous_captured: self.previous.get().is_some(),
        }
    }

    pub fn stats(&self) -> &RouteStats {
        &self.stats
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::error::RouteError;
    use crate::policy::DirectPolicy;
    use crate::slot::{same_policy, AtomicPolicySlot};

    fn setup() -> (Arc<AtomicPolicySlot>, Arc<dyn RoutingPolicy>, ProxyController) {
        let original: Arc<dyn RoutingPolicy> = Arc::new(DirectPolicy);
        let slot = Arc::new(AtomicPolicySlot::new(original.clone()));
        let controller = ProxyController::new(slot.clone());
        (slot, original, controller)
    }

    fn via(host: &str, port: i64) -> RoutingDecision {
        RoutingDecision::ViaProxy(ProxyTarget::new(host, port).unwrap())
    }

    #[test]
    fn test_set_proxy_routes_public_traffic() {
        let (_slot, _original, controller) = setup();
        assert_eq!(controller.decide("http://8.8.8.8/x"), RoutingDecision::Direct);

        assert!(controller.set_proxy("proxy.local", 8080).unwrap());
        assert_eq!(controller.decide("http://8.8.8.8/x"), via("proxy.local", 8080));
        assert_eq!(controller.decide("http://192.168.1.1/x"), RoutingDecision::Direct);
        assert_eq!(controller.decide("not a uri"), RoutingDecision::Direct);
    }

    #[test]
    fn test_clear_restores_original() {
        let (slot, original, controller) = setup();
        controller.set_proxy("proxy.local", 8080).unwrap();
        assert!(!same_policy(&slot.current(), &original));

        assert!(controller.clear_proxy().unwrap());
        assert!(same_policy(&slot.current(), &original));
        assert_eq!(controller.decide("http://8.8.8.8/x"), RoutingDecision::Direct);
    }

    #[test]
    fn test_invalid_set_behaves_as_clear() {
        for (host, port) in [("", 8080), ("  ", 8080), ("proxy.local", 0), ("proxy.local", 70000)] {
            let (slot, original, controller) = setup();
            controller.set_proxy("proxy.local", 8080).unwrap();

            assert!(controller.set_proxy(host, port).unwrap());
            assert!(same_policy(&slot.current(), &original), "{host:?}:{port}");
        }
    }

    #[test]
    fn test_invalid_set_before_any_set_is_noop() {
        let (slot, original, controller) = setup();
        assert!(controller.set_proxy("", 8080).unwrap());
        assert!(same_policy(&slot.current(), &original));
        assert!(!controller.status().previous_captured);
    }

    #[test]
    fn test_clear_without_set_is_noop() {
        let (slot, original, controller) = setup();
        assert!(controller.clear_proxy().unwrap());
        assert!(same_policy(&slot.current(), &original));
        assert!(!controller.status().previous_captured);
    }

    #[test]
    fn test_clear_twice_is_idempotent() {
        let (slot, original, controller) = setup();
        controller.set_proxy("proxy.local", 8080).unwrap();
        controller.clear_proxy().unwrap();
        let after_first = slot.current();

        assert!(controller.clear_proxy().unwrap());
        assert!(same_policy(&slot.current(), &after_first));
        assert!(same_policy(&slot.current(), &original));
    }

    #[test]
    fn test_repeated_set_restores_policy_before_first_set() {
        let (slot, original, controller) = setup();
        controller.set_proxy("proxy-a.local", 8080).unwrap();
        controller.set_proxy("proxy-b.local", 9090).unwrap();
        assert_eq!(controller.decide("https://example.com/"), via("proxy-b.local", 9090));

        controller.clear_proxy().unwrap();
        assert!(same_policy(&slot.current(), &original));
    }

    #[test]
    fn test_previous_capture_survives_later_cycles() {
        let (slot, original, controller) = setup();
        controller.set_proxy("proxy-a.local", 8080).unwrap();
        controller.clear_proxy().unwrap();

        // Someone else swaps the slot between cycles; the first capture wins.
        let intruder: Arc<dyn RoutingPolicy> = Arc::new(DirectPolicy);
        slot.install(intruder.clone()).unwrap();

        controller.set_proxy("proxy-b.local", 9090).unwrap();
        controller.clear_proxy().unwrap();
        assert!(same_policy(&slot.current(), &original));
        assert!(!same_policy(&slot.current(), &intruder));
    }

    #[test]
    fn test_sealed_slot_surfaces_install_failure() {
        let (slot, original, controller) = setup();
        slot.seal();

        let err = controller.set_proxy("proxy.local", 8080).unwrap_err();
        assert!(matches!(err, RouteError::SlotSealed { .. }));
        assert!(same_policy(&slot.current(), &original));

        // The capture happened before the install was refused.
        assert!(controller.status().previous_captured);
        assert!(controller.clear_proxy().is_err());
    }

    #[test]
    fn test_status_reports_installed_target() {
        let (_slot, _original, controller) = setup();
        let status = controller.status();
        assert!(!status.active);
        assert_eq!(status.policy, "direct");
        assert!(status.installation_id.is_none());

        controller.set_proxy(" proxy.local ", 3128).unwrap();
        let status = controller.status();
        assert!(status.active);
        assert_eq!(status.policy, "upstream");
        assert_eq!(status.target, Some(ProxyTarget::new("proxy.local", 3128).unwrap()));
        assert!(status.installation_id.is_some());
        assert!(status.previous_captured);
    }

    #[test]
    fn test_stats_track_decisions_and_commands() {
        let (_slot, _original, controller) = setup();
        controller.decide("http://8.8.8.8/");
        controller.set_proxy("proxy.local", 8080).unwrap();
        controller.decide("http://8.8.8.8/");
        controller.decide("http://10.0.0.1/");
        controller.clear_proxy().unwrap();

        let snapshot = controller.stats().snapshot();
        assert_eq!(snapshot.direct_decisions, 2);
        assert_eq!(snapshot.proxied_decisions, 1);
        assert_eq!(snapshot.proxy_sets, 1);
        assert_eq!(snapshot.proxy_clears, 1);
    }

    struct RecordingPolicy {
        failures: AtomicUsize,
    }

    impl RoutingPolicy for RecordingPolicy {
        fn select(&self, _uri: &Uri) -> RoutingDecision {
            RoutingDecision::Direct
        }

        fn connect_failed(
            &self,
            _uri: &Uri,
            _proxy: Option<&ProxyTarget>,
            _err: &(dyn StdError + 'static),
        ) -> anyhow::Result<()> {
            self.failures.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("hook failure")
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    #[test]
    fn test_connect_failures_reach_original_policy() {
        let original = Arc::new(RecordingPolicy {
            failures: AtomicUsize::new(0),
        });
        let slot = Arc::new(AtomicPolicySlot::new(original.clone()));
        let controller = ProxyController::new(slot);
        controller.set_proxy("proxy.local", 8080).unwrap();

        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let target = ProxyTarget::new("proxy.local", 8080).unwrap();
        controller.report_connect_failure("https://example.com/", Some(&target), &err);

        assert_eq!(original.failures.load(Ordering::SeqCst), 1);
        assert_eq!(controller.stats().snapshot().connect_failures, 1);
    }

    #[test]
    fn test_concurrent_decisions_never_observe_torn_state() {
        let (_slot, _original, controller) = setup();
        let a = via("proxy-a.local", 8080);
        let b = via("proxy-b.local", 9090);
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    while !done.load(Ordering::Acquire) {
                        let decision = controller.decide("https://example.com/video");
                        assert!(
                            decision == RoutingDecision::Direct || decision == a || decision == b,
                            "unexpected decision {decision:?}"
                        );
                        assert_eq!(
                            controller.decide("http://192.168.0.10/cast"),
                            RoutingDecision::Direct
                        );
                    }
                });
            }

            for i in 0..500 {
                match i % 3 {
                    0 => controller.set_proxy("proxy-a.local", 8080).unwrap(),
                    1 => controller.set_proxy("proxy-b.local", 9090).unwrap(),
                    _ => controller.clear_proxy().unwrap(),
                };
            }
            done.store(true, Ordering::Release);
        });

        controller.clear_proxy().unwrap();
        assert_eq!(controller.decide("https://example.com/video"), RoutingDecision::Direct);
    }
}
