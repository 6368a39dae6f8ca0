//! CPU-visible fence.

use std::sync::Arc;

use super::ResourceCore;
use crate::device::GraphicsDevice;
use crate::native::RawObject;
use crate::sync::Signal;

/// Binary signal tied to the device timeline.
///
/// A fence passed to
/// [`GraphicsDevice::submit_commands`](crate::GraphicsDevice::submit_commands)
/// is reset on submission and signalled once that submission completes.
pub struct Fence {
    pub(crate) core: Arc<ResourceCore>,
    pub(crate) device: Arc<GraphicsDevice>,
    pub(crate) signal: Arc<Signal>,
}

impl Fence {
    pub(crate) fn new(device: Arc<GraphicsDevice>, signaled: bool) -> Self {
        Self {
            core: Arc::new(ResourceCore::new("Fence", None)),
            device,
            signal: Arc::new(Signal::new(signaled)),
        }
    }

    /// Poll the fence.
    pub fn is_signaled(&self) -> bool {
        self.signal.is_signaled()
    }

    /// Timeline value of the submission this fence was last attached to.
    pub fn submission(&self) -> u64 {
        self.signal.pending_value()
    }

    pub(crate) fn raw_objects(&self) -> Vec<RawObject> {
        Vec::new()
    }
}

super::impl_device_resource!(Fence);

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("id", &self.core.id())
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

static_assertions::assert_impl_all!(Fence: Send, Sync);
