//! Framebuffer resource.

use std::sync::Arc;

use super::{ResourceCore, Texture};
use crate::device::GraphicsDevice;
use crate::native::{NativeRenderTargets, RawObject};
use crate::types::{FramebufferDescription, OutputDescription};

/// A set of color targets and an optional depth target rendered together.
///
/// Framebuffers hold strong references to their attachment textures. They
/// own no native object; the native pass is opened from
/// [`render_targets`](Self::render_targets) when the framebuffer is bound.
pub struct Framebuffer {
    pub(crate) core: Arc<ResourceCore>,
    pub(crate) device: Arc<GraphicsDevice>,
    description: FramebufferDescription,
    outputs: OutputDescription,
    targets: NativeRenderTargets,
}

impl Framebuffer {
    pub(crate) fn new(
        device: Arc<GraphicsDevice>,
        description: FramebufferDescription,
        width: u32,
        height: u32,
    ) -> Self {
        let colors = description
            .color_targets
            .iter()
            .map(|a| a.target.attachment(a.mip_level, a.array_layer))
            .collect();
        let depth = description
            .depth_target
            .as_ref()
            .map(|a| a.target.attachment(a.mip_level, a.array_layer));
        let sample_count = description
            .color_targets
            .first()
            .or(description.depth_target.as_ref())
            .map_or(1, |a| a.target.description().sample_count);
        let outputs = OutputDescription {
            color_formats: description.color_targets.iter().map(|a| a.target.format()).collect(),
            depth_format: description.depth_target.as_ref().map(|a| a.target.format()),
            sample_count,
        };

        Self {
            core: Arc::new(ResourceCore::new("Framebuffer", None)),
            device,
            description,
            outputs,
            targets: NativeRenderTargets {
                colors,
                depth,
                width,
                height,
            },
        }
    }

    /// Renderable width in pixels.
    pub fn width(&self) -> u32 {
        self.targets.width
    }

    /// Renderable height in pixels.
    pub fn height(&self) -> u32 {
        self.targets.height
    }

    /// Formats of the attachments, for matching against pipelines.
    pub fn outputs(&self) -> &OutputDescription {
        &self.outputs
    }

    pub fn color_target_count(&self) -> usize {
        self.description.color_targets.len()
    }

    /// Color target texture at `index`.
    pub fn color_target(&self, index: usize) -> Option<&Arc<Texture>> {
        self.description.color_targets.get(index).map(|a| &a.target)
    }

    pub fn depth_target(&self) -> Option<&Arc<Texture>> {
        self.description.depth_target.as_ref().map(|a| &a.target)
    }

    /// All attachment textures.
    pub(crate) fn textures(&self) -> impl Iterator<Item = &Arc<Texture>> {
        self.description
            .color_targets
            .iter()
            .chain(self.description.depth_target.as_ref())
            .map(|a| &a.target)
    }

    pub(crate) fn render_targets(&self) -> &NativeRenderTargets {
        &self.targets
    }

    pub(crate) fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }

    pub(crate) fn raw_objects(&self) -> Vec<RawObject> {
        Vec::new()
    }
}

super::impl_device_resource!(Framebuffer);

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("id", &self.core.id())
            .field("width", &self.targets.width)
            .field("height", &self.targets.height)
            .field("outputs", &self.outputs)
            .finish()
    }
}

static_assertions::assert_impl_all!(Framebuffer: Send, Sync);
