//! Backend resource objects.
//!
//! Every resource carries a shared [`ResourceCore`] that records its identity,
//! debug name, the last submission that used it and how many open
//! recordings still reference it. The disposal coordinator only sees cores
//! and raw native handles, never the resource objects themselves.

mod buffer;
mod fence;
mod framebuffer;
mod layout;
mod pipeline;
mod sampler;
mod texture;

pub use buffer::{Buffer, BufferRange};
pub use fence::Fence;
pub use framebuffer::Framebuffer;
pub use layout::{BindableResource, ResourceLayout, ResourceSet};
pub use pipeline::Pipeline;
pub use sampler::Sampler;
pub use texture::{Texture, TextureView};

pub(crate) use pipeline::{RealizedPipeline, SharedPipeline};
pub(crate) use texture::{TextureOrigin, ViewTarget};

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::{HalError, HalResult, UsageError};
use crate::types::ResourceId;

/// Capability surface shared by every resource kind.
pub trait DeviceResource: Send + Sync {
    /// Unique identifier.
    fn id(&self) -> ResourceId;
    /// Current debug name.
    fn name(&self) -> Option<String>;
    /// Assign a debug name, forwarded to the driver.
    fn set_name(&self, name: &str);
    /// Hand the resource to the disposal coordinator. Repeated calls are
    /// ignored.
    fn dispose(&self);
    /// Whether [`dispose`](Self::dispose) has been called.
    fn is_disposed(&self) -> bool;
}

const STATE_LIVE: u8 = 0;
const STATE_PENDING: u8 = 1;
const STATE_DESTROYED: u8 = 2;

/// Lifetime bookkeeping shared between a resource and the device.
#[derive(Debug)]
pub(crate) struct ResourceCore {
    id: ResourceId,
    kind: &'static str,
    name: RwLock<Option<String>>,
    last_use: AtomicU64,
    pending_refs: AtomicU32,
    state: AtomicU8,
}

impl ResourceCore {
    pub fn new(kind: &'static str, name: Option<String>) -> Self {
        Self {
            id: ResourceId::next(),
            kind,
            name: RwLock::new(name),
            last_use: AtomicU64::new(0),
            pending_refs: AtomicU32::new(0),
            state: AtomicU8::new(STATE_LIVE),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.write() = Some(name.to_string());
    }

    /// Human-readable identity for diagnostics.
    pub fn describe(&self) -> String {
        match self.name.read().as_deref() {
            Some(name) => format!("{} {} ({name:?})", self.kind, self.id),
            None => format!("{} {}", self.kind, self.id),
        }
    }

    /// Timeline value of the last submission referencing this resource.
    pub fn last_use(&self) -> u64 {
        self.last_use.load(Ordering::Acquire)
    }

    pub fn record_use(&self, value: u64) {
        self.last_use.fetch_max(value, Ordering::AcqRel);
    }

    /// Number of open recordings referencing this resource.
    pub fn pending_refs(&self) -> u32 {
        self.pending_refs.load(Ordering::Acquire)
    }

    pub fn add_pending(&self) {
        self.pending_refs.fetch_add(1, Ordering::AcqRel);
    }

    pub fn release_pending(&self) {
        let previous = self.pending_refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "pending reference underflow on {}", self.describe());
    }

    /// Transition Live -> Pending. Returns false if already disposed.
    pub fn begin_disposal(&self) -> bool {
        self.state
            .compare_exchange(STATE_LIVE, STATE_PENDING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn mark_destroyed(&self) {
        self.state.store(STATE_DESTROYED, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.state.load(Ordering::Acquire) != STATE_LIVE
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_DESTROYED
    }

    /// Fail with [`UsageError::ResourceDisposed`] if disposed.
    pub fn ensure_live(&self) -> HalResult<()> {
        if self.is_disposed() {
            return Err(HalError::Usage(UsageError::ResourceDisposed(self.describe())));
        }
        Ok(())
    }
}

/// Mapped-subresource bookkeeping for mappable resources.
#[derive(Debug, Default)]
pub(crate) struct MapTracker {
    mapped: Mutex<Vec<u32>>,
}

impl MapTracker {
    /// Claim a subresource, failing with [`UsageError::AlreadyMapped`].
    pub fn claim(&self, subresource: u32) -> HalResult<()> {
        let mut mapped = self.mapped.lock();
        if mapped.contains(&subresource) {
            return Err(HalError::Usage(UsageError::AlreadyMapped { subresource }));
        }
        mapped.push(subresource);
        Ok(())
    }

    pub fn release(&self, subresource: u32) {
        self.mapped.lock().retain(|s| *s != subresource);
    }
}

/// Implements [`DeviceResource`] and disposal-on-drop for a resource type
/// with `core`, `device` fields and a `raw_objects()` method.
macro_rules! impl_device_resource {
    ($ty:ty) => {
        impl $crate::resources::DeviceResource for $ty {
            fn id(&self) -> $crate::types::ResourceId {
                self.core.id()
            }

            fn name(&self) -> Option<String> {
                self.core.name()
            }

            fn set_name(&self, name: &str) {
                self.core.set_name(name);
                self.device.label_objects(&self.raw_objects(), name);
            }

            fn dispose(&self) {
                self.device.retire(&self.core, self.raw_objects());
            }

            fn is_disposed(&self) -> bool {
                self.core.is_disposed()
            }
        }

        impl Drop for $ty {
            fn drop(&mut self) {
                if !self.core.is_disposed() {
                    self.device.retire(&self.core, self.raw_objects());
                }
            }
        }
    };
}

pub(crate) use impl_device_resource;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposal_state_machine() {
        let core = ResourceCore::new("Buffer", None);
        assert!(!core.is_disposed());
        assert!(core.ensure_live().is_ok());

        assert!(core.begin_disposal());
        assert!(!core.begin_disposal());
        assert!(core.is_disposed());
        assert!(!core.is_destroyed());
        assert!(matches!(
            core.ensure_live(),
            Err(HalError::Usage(UsageError::ResourceDisposed(_)))
        ));

        core.mark_destroyed();
        assert!(core.is_destroyed());
    }

    #[test]
    fn test_last_use_is_monotonic() {
        let core = ResourceCore::new("Texture", Some("albedo".into()));
        core.record_use(5);
        core.record_use(3);
        assert_eq!(core.last_use(), 5);
        assert!(core.describe().contains("albedo"));
    }

    #[test]
    fn test_map_tracker() {
        let tracker = MapTracker::default();
        tracker.claim(0).unwrap();
        tracker.claim(3).unwrap();
        assert_eq!(
            tracker.claim(0),
            Err(HalError::Usage(UsageError::AlreadyMapped { subresource: 0 }))
        );
        tracker.release(0);
        tracker.claim(0).unwrap();
        assert!(tracker.claim(3).is_err());
    }

    #[test]
    fn test_pending_refs() {
        let core = ResourceCore::new("Sampler", None);
        core.add_pending();
        core.add_pending();
        core.release_pending();
        assert_eq!(core.pending_refs(), 1);
    }
}
