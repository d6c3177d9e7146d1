//! The process-wide controller and slot. Everything here shares global state,
//! so the whole lifecycle runs in a single test.

use std::sync::Arc;

use egress_router::slot::{self, same_policy, PolicySlot};
use egress_router::{ProxyTarget, RoutingDecision, RoutingPolicy};

#[test]
fn test_global_set_and_clear_lifecycle() {
    let global = slot::global();
    let original: Arc<dyn RoutingPolicy> = global.current();

    // Clearing before anything was set leaves the platform default alone.
    assert!(egress_router::clear_proxy().unwrap());
    assert!(egress_router::clear_proxy().unwrap());
    assert!(same_policy(&global.current(), &original));

    assert!(egress_router::set_proxy("proxy-a.local", 8080).unwrap());
    assert!(egress_router::set_proxy("proxy-b.local", 9090).unwrap());
    assert_eq!(
        egress_router::decide("http://8.8.8.8/x"),
        RoutingDecision::ViaProxy(ProxyTarget::new("proxy-b.local", 9090).unwrap())
    );
    assert_eq!(egress_router::decide("http://127.0.0.1/x"), RoutingDecision::Direct);
    assert_eq!(egress_router::decide("http://localhost/x"), RoutingDecision::Direct);

    let status = egress_router::controller().status();
    assert!(status.active);
    assert_eq!(status.policy, "upstream");

    // Restores the policy from before the first set, not the one before B.
    assert!(egress_router::clear_proxy().unwrap());
    assert!(same_policy(&global.current(), &original));

    // Invalid input clears.
    egress_router::set_proxy("proxy-c.local", 3128).unwrap();
    assert!(egress_router::set_proxy("proxy-c.local", 0).unwrap());
    assert!(same_policy(&global.current(), &original));
    assert_eq!(egress_router::controller().status().policy, "system");
}
