//! The process-wide policy slot.
//!
//! Installs are a single atomic pointer swap; readers never lock and always
//! observe either the old or the new policy in full.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;

use crate::error::{Result, RouteError};
use crate::policy::RoutingPolicy;
use crate::system::SystemPolicy;

/// Get-current / install-new primitives of a policy slot.
pub trait PolicySlot: Send + Sync {
    fn current(&self) -> Arc<dyn RoutingPolicy>;

    fn install(&self, policy: Arc<dyn RoutingPolicy>) -> Result<()>;
}

/// Lock-free slot backed by [`ArcSwap`].
pub struct AtomicPolicySlot {
    active: ArcSwap<Arc<dyn RoutingPolicy>>,
    sealed: AtomicBool,
}

impl AtomicPolicySlot {
    pub fn new(initial: Arc<dyn RoutingPolicy>) -> Self {
        Self {
            active: ArcSwap::from_pointee(initial),
            sealed: AtomicBool::new(false),
        }
    }

    /// Refuse every later install. Cannot be undone.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
        tracing::info!(policy = self.current().name(), "Policy slot sealed");
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }
}

impl PolicySlot for AtomicPolicySlot {
    fn current(&self) -> Arc<dyn RoutingPolicy> {
        let guard = self.active.load();
        Arc::clone(&**guard)
    }

    fn install(&self, policy: Arc<dyn RoutingPolicy>) -> Result<()> {
        if self.is_sealed() {
            return Err(RouteError::SlotSealed {
                policy: policy.name(),
            });
        }
        self.active.store(Arc::new(policy));
        Ok(())
    }
}

static GLOBAL_SLOT: LazyLock<Arc<AtomicPolicySlot>> =
    LazyLock::new(|| Arc::new(AtomicPolicySlot::new(Arc::new(SystemPolicy::from_env()))));

/// The process-wide slot, seeded with the environment's proxy settings on
/// first use.
pub fn global() -> Arc<AtomicPolicySlot> {
    Arc::clone(&GLOBAL_SLOT)
}

/// Whether two handles point at the same policy instance.
pub fn same_policy(a: &Arc<dyn RoutingPolicy>, b: &Arc<dyn RoutingPolicy>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
