//! GPU sampler resource.

use std::sync::Arc;

use super::ResourceCore;
use crate::device::GraphicsDevice;
use crate::native::{RawObject, RawSampler};
use crate::types::SamplerDescription;

/// A GPU sampler resource.
pub struct Sampler {
    pub(crate) core: Arc<ResourceCore>,
    pub(crate) device: Arc<GraphicsDevice>,
    description: SamplerDescription,
    raw: RawSampler,
}

impl Sampler {
    pub(crate) fn new(device: Arc<GraphicsDevice>, description: SamplerDescription, raw: RawSampler) -> Self {
        Self {
            core: Arc::new(ResourceCore::new("Sampler", description.label.clone())),
            device,
            description,
            raw,
        }
    }

    /// Get the sampler description.
    pub fn description(&self) -> &SamplerDescription {
        &self.description
    }

    pub fn raw_handle(&self) -> RawSampler {
        self.raw
    }

    pub(crate) fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }

    pub(crate) fn raw_objects(&self) -> Vec<RawObject> {
        vec![RawObject::Sampler(self.raw)]
    }
}

super::impl_device_resource!(Sampler);

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("id", &self.core.id())
            .field("mag_filter", &self.description.mag_filter)
            .field("min_filter", &self.description.min_filter)
            .field("label", &self.description.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Sampler: Send, Sync);
